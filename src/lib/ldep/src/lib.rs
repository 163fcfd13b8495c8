pub mod cli;
pub mod emit;
pub mod error;
pub mod graph;
pub mod listfile;
pub mod scan;
pub mod walk;

pub use error::LdepError;
pub use graph::{Context, LinkSetId, ObjIdx, SymId};
