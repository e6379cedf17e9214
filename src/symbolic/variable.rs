//! Symbolic nginx variables and script compilation.

use once_cell::sync::Lazy;
use regex::Regex;

use super::builtins;
use super::regexp::Capture;
use crate::ast::NodeId;

static REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$(?:\{([A-Za-z0-9_]+)\}|([1-9])|([A-Za-z_][A-Za-z0-9_]*))")
        .expect("variable reference pattern is valid")
});

/// What a variable's runtime value is known to look like
#[derive(Debug, Clone)]
pub enum VariableValue {
    /// Fixed text; with `has_script` set it may itself reference variables
    Literal(String),
    /// Whatever a regex capture group matched
    Capture(Capture),
    /// One of several values, e.g. the entries of a `map`
    Entries(Vec<Variable>),
    /// A reference nothing in scope defines
    Unknown,
}

impl VariableValue {
    fn can_contain(&self, c: char) -> bool {
        match self {
            VariableValue::Literal(text) => text.contains(c),
            VariableValue::Capture(capture) => capture.can_contain_literal(c),
            VariableValue::Entries(entries) => entries.iter().any(|v| v.can_contain(c)),
            VariableValue::Unknown => true,
        }
    }

    fn can_startswith(&self, c: char) -> bool {
        match self {
            VariableValue::Literal(text) => text.starts_with(c),
            VariableValue::Capture(capture) => capture.can_startswith(c),
            VariableValue::Entries(entries) => entries.iter().any(|v| v.can_startswith(c)),
            VariableValue::Unknown => true,
        }
    }

    fn must_contain(&self, c: char) -> bool {
        match self {
            VariableValue::Literal(text) => text.contains(c),
            VariableValue::Capture(capture) => capture.must_contain(c),
            VariableValue::Entries(entries) => {
                !entries.is_empty() && entries.iter().all(|v| v.must_contain(c))
            }
            VariableValue::Unknown => false,
        }
    }

    fn must_startswith(&self, c: char) -> bool {
        match self {
            VariableValue::Literal(text) => text.starts_with(c),
            VariableValue::Capture(capture) => capture.must_startswith(c),
            VariableValue::Entries(entries) => {
                !entries.is_empty() && entries.iter().all(|v| v.must_startswith(c))
            }
            VariableValue::Unknown => false,
        }
    }
}

/// A named (or anonymous literal) value with optional boundary
///
/// The boundary is the value of the variable a capture was taken from: a
/// group `(.*)` matched against `$http_referer` can never contain more than
/// `$http_referer` itself.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: Option<String>,
    pub value: VariableValue,
    pub boundary: Option<VariableValue>,
    pub provider: Option<NodeId>,
    pub has_script: bool,
    pub ctx: Option<String>,
}

impl Variable {
    pub fn new(name: impl Into<String>, value: VariableValue) -> Self {
        Self {
            name: Some(name.into()),
            value,
            boundary: None,
            provider: None,
            has_script: false,
            ctx: None,
        }
    }

    /// Anonymous fixed text, as produced for the literal parts of a script
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            name: None,
            value: VariableValue::Literal(text.into()),
            boundary: None,
            provider: None,
            has_script: false,
            ctx: None,
        }
    }

    pub fn unknown(name: impl Into<String>) -> Self {
        Self::new(name, VariableValue::Unknown)
    }

    pub fn with_boundary(mut self, boundary: Option<VariableValue>) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn with_provider(mut self, provider: NodeId) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_script(mut self, has_script: bool) -> Self {
        self.has_script = has_script;
        self
    }

    pub fn with_ctx(mut self, ctx: impl Into<String>) -> Self {
        self.ctx = Some(ctx.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn capture(&self) -> Option<&Capture> {
        match &self.value {
            VariableValue::Capture(capture) => Some(capture),
            _ => None,
        }
    }

    /// Segments of a script-bearing literal
    fn depends(&self) -> Option<Vec<Variable>> {
        match &self.value {
            VariableValue::Literal(text) if self.has_script => Some(compile_script(text)),
            _ => None,
        }
    }

    fn bounded(&self, check: impl Fn(&VariableValue) -> bool) -> bool {
        match &self.boundary {
            None | Some(VariableValue::Unknown) => true,
            Some(boundary) => check(boundary),
        }
    }

    /// Whether user input could put `c` into this variable
    pub fn can_contain(&self, c: char) -> bool {
        if !self.bounded(|b| b.can_contain(c)) {
            return false;
        }
        if let Some(depends) = self.depends() {
            return depends.iter().any(|v| v.can_contain(c));
        }
        match &self.value {
            VariableValue::Capture(capture) => capture.can_contain(c),
            VariableValue::Entries(entries) => entries.iter().any(|v| v.can_contain(c)),
            VariableValue::Literal(_) | VariableValue::Unknown => false,
        }
    }

    pub fn can_startswith(&self, c: char) -> bool {
        if !self.bounded(|b| b.can_startswith(c)) {
            return false;
        }
        if let Some(depends) = self.depends() {
            return depends.first().is_some_and(|v| v.can_startswith(c));
        }
        match &self.value {
            VariableValue::Capture(capture) => capture.can_startswith(c),
            VariableValue::Entries(entries) => entries.iter().any(|v| v.can_startswith(c)),
            VariableValue::Literal(_) | VariableValue::Unknown => false,
        }
    }

    pub fn must_contain(&self, c: char) -> bool {
        if self
            .boundary
            .as_ref()
            .is_some_and(|b| b.must_contain(c))
        {
            return true;
        }
        if let Some(depends) = self.depends() {
            return depends.iter().any(|v| v.must_contain(c));
        }
        self.value.must_contain(c)
    }

    pub fn must_startswith(&self, c: char) -> bool {
        if self
            .boundary
            .as_ref()
            .is_some_and(|b| b.must_startswith(c))
        {
            return true;
        }
        if let Some(depends) = self.depends() {
            return depends.first().is_some_and(|v| v.must_startswith(c));
        }
        self.value.must_startswith(c)
    }

    /// The text this variable always evaluates to, if it is fully literal
    pub fn final_value(&self) -> Option<String> {
        if let Some(depends) = self.depends() {
            return depends.iter().map(Variable::final_value).collect();
        }
        match &self.value {
            VariableValue::Literal(text) => Some(text.clone()),
            _ => None,
        }
    }
}

/// Split `script` into literal text and variable references, resolving
/// references against the built-in variables only.
pub fn compile_script(script: &str) -> Vec<Variable> {
    compile_script_with(script, builtins::lookup)
}

/// Split `script` into literal text and variable references.
///
/// `resolve` receives each reference name without `$` or braces; names it
/// cannot resolve are kept as [`VariableValue::Unknown`].
pub fn compile_script_with<F>(script: &str, mut resolve: F) -> Vec<Variable>
where
    F: FnMut(&str) -> Option<Variable>,
{
    let mut segments = Vec::new();
    let mut last = 0;

    for caps in REFERENCE.captures_iter(script) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if whole.start() > last {
            segments.push(Variable::literal(&script[last..whole.start()]));
        }
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map_or("", |m| m.as_str());
        segments.push(resolve(name).unwrap_or_else(|| Variable::unknown(name)));
        last = whole.end();
    }

    if last < script.len() {
        segments.push(Variable::literal(&script[last..]));
    }
    segments
}
