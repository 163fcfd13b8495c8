//! Error taxonomy for the dependency solver.

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum LdepError {
    #[error("unable to open '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{file}:{line}: malformed symbol line: '{text}'")]
    MalformedSymbolLine {
        file: String,
        line: usize,
        text: String,
    },

    #[error("{file}:{line}: unrecognized symbol type '{code}'")]
    UnrecognizedSymbolType {
        file: String,
        line: usize,
        code: char,
    },

    #[error("list file '{path}' names unknown object '{object}'")]
    UnknownObjectInListFile { path: String, object: String },

    #[error("object name '{name}' is ambiguous; matches {count} objects")]
    AmbiguousObject { name: String, count: usize },

    #[error("main symbol '{symbol}' not found")]
    MainSymbolNotFound { symbol: String },

    #[error("main symbol '{symbol}' is not defined by any object")]
    MainSymbolUndefined { symbol: String },

    #[error("refusing to remove '{object}': required by the Application link set")]
    RejectedByMandatorySet { object: String },
}
