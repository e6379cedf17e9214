//! nginx configuration analysis core
//!
//! Parse nginx configuration (plain files with includes, or `nginx -T`
//! dumps) into a scoped directive tree, and reason symbolically about the
//! values of nginx variables and the strings regexes can match.

pub mod ast;
pub mod cli;
pub mod emitter;
pub mod parser;
pub mod symbolic;

pub use ast::{Node, NodeId, NodeKind, SourceLocation, Tree};
pub use parser::{Diagnostics, NginxParser, ParseError, ParseOptions, Warning, WarningKind};
pub use symbolic::{compile_script, Capture, Regexp, RegexpError, Variable, VariableValue};

use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Invalid regular expression: {0}")]
    Regexp(#[from] RegexpError),

    #[error("Emission error: {0}")]
    Emission(#[from] std::fmt::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A parsed configuration together with the warnings raised while building it
#[derive(Debug)]
pub struct Parsed {
    pub tree: Tree,
    pub diagnostics: Diagnostics,
    /// Whether the input was an `nginx -T` dump
    pub dump: bool,
}

/// Parse configuration text
pub fn parse_str(content: &str, options: ParseOptions) -> Result<Parsed> {
    let mut parser = NginxParser::new(options);
    let tree = parser.parse(content, None)?;
    Ok(Parsed {
        tree,
        dump: parser.is_dump(),
        diagnostics: parser.take_diagnostics(),
    })
}

/// Parse a configuration file. Relative includes resolve against the
/// file's directory unless `options.cwd` is set.
pub fn parse_file(path: &Path, mut options: ParseOptions) -> Result<Parsed> {
    if options.cwd.as_os_str().is_empty() {
        if let Some(parent) = path.parent() {
            options.cwd = parent.to_path_buf();
        }
    }

    let mut parser = NginxParser::new(options);
    let tree = parser.parse_file(path)?;
    Ok(Parsed {
        tree,
        dump: parser.is_dump(),
        diagnostics: parser.take_diagnostics(),
    })
}

/// Write a tree back as configuration text
pub fn emit(tree: &Tree, options: emitter::EmitterOptions) -> Result<String> {
    Ok(emitter::NginxEmitter::new(options).emit(tree)?)
}
