//! Typed payloads of simple directives.

use std::sync::Arc;

use serde::Serialize;

use super::NodeId;
use crate::symbolic::{capture_groups, Capture, Regexp, RegexpError, Variable, VariableValue};

/// `add_header <name> <value> [always]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddHeader {
    /// Lower-cased header name
    pub header: String,
    pub value: String,
    pub always: bool,
}

impl AddHeader {
    pub fn from_args(args: &[String]) -> Result<Self, String> {
        match args {
            [header, value, rest @ ..] => Ok(Self {
                header: header.to_lowercase(),
                value: value.clone(),
                always: rest.first().is_some_and(|flag| flag == "always"),
            }),
            _ => Err(format!("add_header expects a name and a value, got {args:?}")),
        }
    }
}

/// `set $variable value`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetDirective {
    /// Variable name without the leading `$`
    pub variable: String,
    pub value: String,
}

impl SetDirective {
    pub fn from_args(args: &[String]) -> Result<Self, String> {
        match args {
            [variable, value] => Ok(Self {
                variable: variable.trim_start_matches('$').to_string(),
                value: value.clone(),
            }),
            _ => Err(format!("set expects a variable and a value, got {args:?}")),
        }
    }

    pub(crate) fn variables(&self, provider: NodeId) -> Vec<Variable> {
        vec![Variable::new(
            self.variable.clone(),
            VariableValue::Literal(self.value.clone()),
        )
        .with_provider(provider)
        .with_script(true)]
    }
}

/// `rewrite <regex> <replacement> [flag]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewriteDirective {
    pub pattern: String,
    pub replace: String,
    pub flag: Option<String>,
}

impl RewriteDirective {
    pub fn from_args(args: &[String]) -> Result<Self, String> {
        match args {
            [pattern, replace, rest @ ..] => Ok(Self {
                pattern: pattern.clone(),
                replace: replace.clone(),
                flag: rest.first().cloned(),
            }),
            _ => Err(format!("rewrite expects a regex and a replacement, got {args:?}")),
        }
    }

    pub fn regexp(&self) -> Result<Regexp, RegexpError> {
        Regexp::new(&self.pattern, true)
    }

    pub(crate) fn variables(&self, provider: NodeId) -> Result<Vec<Variable>, RegexpError> {
        Ok(numbered_captures(Arc::new(self.regexp()?), provider, None))
    }
}

/// A `key value;` line inside `map` or `geo`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapEntry {
    pub src_val: String,
    pub dest_val: Option<String>,
    /// Key starts with `~` (or `~*` for case-insensitive)
    pub is_regex: bool,
}

impl MapEntry {
    pub fn from_args(name: &str, args: &[String]) -> Self {
        Self {
            src_val: name.to_string(),
            dest_val: args.first().cloned(),
            is_regex: name.starts_with('~'),
        }
    }

    /// The key as a pattern, for `~` and `~*` keys
    pub fn regexp(&self) -> Option<Result<Regexp, RegexpError>> {
        if !self.is_regex {
            return None;
        }
        let (pattern, case_sensitive) = match self.src_val.strip_prefix("~*") {
            Some(pattern) => (pattern, false),
            None => (&self.src_val[1..], true),
        };
        Some(Regexp::new(pattern, case_sensitive))
    }

    /// This entry as a member of the enclosing map's variable
    pub(crate) fn as_variable(&self, provider: NodeId) -> Result<Variable, RegexpError> {
        let value = match self.regexp() {
            Some(regexp) => VariableValue::Capture(Capture::new(Arc::new(regexp?), 0)),
            None => VariableValue::Literal(self.dest_val.clone().unwrap_or_default()),
        };
        Ok(Variable::new(self.src_val.clone(), value)
            .with_provider(provider)
            .with_ctx(self.src_val.clone()))
    }
}

/// Variables for every capture group except the whole match (`"0"`)
pub(crate) fn numbered_captures(
    regexp: Arc<Regexp>,
    provider: NodeId,
    boundary: Option<VariableValue>,
) -> Vec<Variable> {
    capture_groups(&regexp)
        .into_iter()
        .filter(|(name, _)| name != "0")
        .map(|(name, capture)| {
            Variable::new(name, VariableValue::Capture(capture))
                .with_boundary(boundary.clone())
                .with_provider(provider)
        })
        .collect()
}
