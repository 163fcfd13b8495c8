//! CLI surface for the `ldep` binary, grounded in `ldep.c`'s option table
//! (§6 "Analyzer CLI surface").

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "ldep", about = "Dependency solver / link-set analyzer")]
pub struct Cli {
    /// `nm -g -fposix` listing files; stdin is read if none are given.
    pub nm_files: Vec<PathBuf>,

    /// Root the Application (mandatory) set at the object exporting this
    /// symbol, overriding the first-file convention.
    #[arg(short = 'A', value_name = "SYMBOL")]
    pub main_symbol: Option<String>,

    /// Append a library search path (repeatable).
    #[arg(short = 'L', value_name = "DIR")]
    pub search_paths: Vec<PathBuf>,

    /// Add objects named in a list file to the Optional set (repeatable,
    /// order-preserving).
    #[arg(short = 'o', value_name = "LIST")]
    pub optional_lists: Vec<PathBuf>,

    /// Remove objects named in a list file (repeatable, order-preserving).
    #[arg(short = 'x', value_name = "LIST")]
    pub exclude_lists: Vec<PathBuf>,

    /// Emit a linker directive script with EXTERN() references.
    #[arg(short = 'e', value_name = "FILE")]
    pub emit_script: Option<PathBuf>,

    /// Emit a C source file declaring an embeddable symbol table.
    #[arg(short = 'C', value_name = "FILE")]
    pub emit_source: Option<PathBuf>,

    /// Omit the Application set from emitted output.
    #[arg(short = 'O')]
    pub omit_application: bool,

    /// Tolerate list-file unlinks rejected by the mandatory set.
    #[arg(short = 'F')]
    pub sloppy_unlink: bool,

    /// Lenient symbol-type scanning (fold local type letters, accept `?`).
    #[arg(short = 'f')]
    pub lenient: bool,

    /// Check for multiply defined symbols.
    #[arg(short = 'm')]
    pub check_multi_defs: bool,

    /// Dump each object's flat transitive dependency list.
    #[arg(short = 'd')]
    pub dump_deps: bool,

    /// Dump the full symbol table.
    #[arg(short = 's')]
    pub dump_symbols: bool,

    /// Build only; suppress the summary banner normally printed to stdout.
    #[arg(short = 'q')]
    pub quiet: bool,

    /// Trace object linking (maps onto a `tracing` target filter).
    #[arg(short = 'l')]
    pub trace_link: bool,

    /// Trace object unlinking (maps onto a `tracing` target filter).
    #[arg(short = 'u')]
    pub trace_unlink: bool,

    /// Interactive query mode (line-oriented symbol/object lookup REPL).
    #[arg(short = 'i')]
    pub interactive: bool,
}
