//! Typed payloads of the block directives that scope or provide variables.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::directive::numbered_captures;
use super::NodeId;
use crate::symbolic::{compile_script, Regexp, RegexpError, Variable, VariableValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationModifier {
    /// `=`
    Exact,
    /// `^~`
    Prefix,
    /// `~`
    Regex,
    /// `~*`
    RegexCaseless,
}

impl LocationModifier {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "=" => Some(Self::Exact),
            "^~" => Some(Self::Prefix),
            "~" => Some(Self::Regex),
            "~*" => Some(Self::RegexCaseless),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "=",
            Self::Prefix => "^~",
            Self::Regex => "~",
            Self::RegexCaseless => "~*",
        }
    }
}

impl fmt::Display for LocationModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `location [modifier] path { ... }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub modifier: Option<LocationModifier>,
    pub path: String,
}

impl Location {
    pub fn from_args(args: &[String]) -> Result<Self, String> {
        match args {
            [path] => Ok(Self {
                modifier: None,
                path: path.clone(),
            }),
            [modifier, path] => {
                let modifier = LocationModifier::parse(modifier)
                    .ok_or_else(|| format!("unknown location modifier {modifier:?}"))?;
                Ok(Self {
                    modifier: Some(modifier),
                    path: path.clone(),
                })
            }
            _ => Err(format!("location expects one or two arguments, got {args:?}")),
        }
    }

    pub fn is_regex(&self) -> bool {
        matches!(
            self.modifier,
            Some(LocationModifier::Regex | LocationModifier::RegexCaseless)
        )
    }

    /// The path as a pattern, for regex locations
    pub fn regexp(&self) -> Option<Result<Regexp, RegexpError>> {
        self.is_regex().then(|| {
            Regexp::new(&self.path, self.modifier == Some(LocationModifier::Regex))
        })
    }

    /// A regex location that targets a file extension without `$`
    pub fn needs_anchor(&self) -> bool {
        matches!(self.regexp(), Some(Ok(regexp)) if regexp.needs_tail_anchor())
    }

    pub(crate) fn variables(&self, provider: NodeId) -> Result<Vec<Variable>, RegexpError> {
        match self.regexp() {
            Some(regexp) => Ok(numbered_captures(Arc::new(regexp?), provider, None)),
            None => Ok(Vec::new()),
        }
    }
}

/// `if (condition) { ... }`, split by argument count:
/// `($slow)`, `(!-e $path)` or `($request_method = POST)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IfCondition {
    pub variable: Option<String>,
    pub operand: Option<String>,
    pub value: Option<String>,
}

impl IfCondition {
    pub fn from_args(args: &[String]) -> Result<Self, String> {
        let (variable, operand, value) = match args {
            [variable] => (Some(variable), None, None),
            [operand, value] => (None, Some(operand), Some(value)),
            [variable, operand, value] => (Some(variable), Some(operand), Some(value)),
            _ => return Err(format!("unknown \"if\" definition, args: {args:?}")),
        };
        Ok(Self {
            variable: variable.cloned(),
            operand: operand.cloned(),
            value: value.cloned(),
        })
    }

    pub fn is_regex(&self) -> bool {
        matches!(
            self.operand.as_deref(),
            Some("~" | "~*" | "!~" | "!~*")
        )
    }

    pub fn regexp(&self) -> Option<Result<Regexp, RegexpError>> {
        if !self.is_regex() {
            return None;
        }
        let value = self.value.as_deref()?;
        let case_sensitive = matches!(self.operand.as_deref(), Some("~" | "!~"));
        Some(Regexp::new(value, case_sensitive))
    }

    /// Captures of the regex operand, bounded by the tested variable when it
    /// compiles to a single reference such as `$http_referer`.
    pub(crate) fn variables(&self, provider: NodeId) -> Result<Vec<Variable>, RegexpError> {
        let Some(regexp) = self.regexp() else {
            return Ok(Vec::new());
        };
        let regexp = Arc::new(regexp?);

        let boundary = self.variable.as_deref().and_then(|variable| {
            let mut script = compile_script(variable);
            (script.len() == 1).then(|| script.remove(0).value)
        });
        Ok(numbered_captures(regexp, provider, boundary))
    }
}

/// `map $source $variable { ... }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapBlock {
    pub source: String,
    /// Defined variable without the leading `$`
    pub variable: String,
}

impl MapBlock {
    pub fn from_args(args: &[String]) -> Result<Self, String> {
        match args {
            [source, variable] => Ok(Self {
                source: source.clone(),
                variable: variable.trim_start_matches('$').to_string(),
            }),
            _ => Err(format!("map expects a source and a variable, got {args:?}")),
        }
    }
}

/// `geo [$source] $variable { ... }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeoBlock {
    pub source: String,
    pub variable: String,
}

impl GeoBlock {
    pub fn from_args(args: &[String]) -> Result<Self, String> {
        let (source, variable) = match args {
            [variable] => ("$remote_addr".to_string(), variable),
            [source, variable] => (source.clone(), variable),
            _ => return Err(format!("geo expects one or two arguments, got {args:?}")),
        };
        Ok(Self {
            source,
            variable: variable.trim_start_matches('$').to_string(),
        })
    }
}

/// The single composite variable a `map` or `geo` block defines
pub(crate) fn hash_variable(name: &str, entries: Vec<Variable>, provider: NodeId) -> Variable {
    Variable::new(name, VariableValue::Entries(entries)).with_provider(provider)
}
