//! Configuration parsing: text to records, records to a [`Tree`](crate::ast::Tree)

pub mod grammar;
pub mod lexer;
#[allow(clippy::module_inception)]
pub mod parser;
pub mod registry;

pub use grammar::{locate_problem, parse_records, Record, RecordKind, SyntaxError};
pub use lexer::decode_config;
pub use parser::NginxParser;
pub use registry::Registry;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

use crate::ast::SourceLocation;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at {file}:{line}:{column}: {message}")]
    Syntax {
        file: String,
        offset: usize,
        line: usize,
        column: usize,
        message: String,
    },
}

impl ParseError {
    pub(crate) fn syntax(file: &str, err: SyntaxError) -> Self {
        ParseError::Syntax {
            file: file.to_string(),
            offset: err.offset,
            line: err.line,
            column: err.column,
            message: err.message,
        }
    }
}

/// Parser options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseOptions {
    /// Base directory for relative include paths
    pub cwd: PathBuf,
    /// Follow include directives
    pub allow_includes: bool,
    /// Maximum nesting of included files
    pub max_include_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            cwd: PathBuf::new(),
            allow_includes: true,
            max_include_depth: 10,
        }
    }
}

/// What a parse warning is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// An include pattern matched nothing
    IncludeNotFound,
    /// An included file could not be read or parsed
    IncludeFailed,
    /// A file includes itself, directly or indirectly
    IncludeCycle,
    /// Includes nested deeper than `max_include_depth`
    IncludeDepth,
    /// A block whose body could not be parsed was skipped
    UnparsedBlock,
    /// A directive with malformed arguments fell back to the generic form
    InvalidDirective,
}

/// Parse warning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
    pub location: Option<SourceLocation>,
}

/// Non-fatal problems found while building a tree
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    pub warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning and log it
    pub fn warn(
        &mut self,
        kind: WarningKind,
        message: impl Into<String>,
        location: Option<SourceLocation>,
    ) {
        let message = message.into();
        warn!("{}", message);
        self.warnings.push(Warning {
            kind,
            message,
            location,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn count(&self, kind: WarningKind) -> usize {
        self.warnings.iter().filter(|w| w.kind == kind).count()
    }
}
