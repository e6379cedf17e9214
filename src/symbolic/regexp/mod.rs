//! Symbolic regular expressions
//!
//! A [`Regexp`] is never executed against input. It answers questions about
//! the language a pattern accepts ("can a match start with `/`?", "must the
//! first capture contain `.`?") and enumerates representative strings.
//! The facts are conservative in the direction detection rules need:
//! `can_*` may over-approximate, `must_*` never claims more than holds.

mod generate;
mod parse;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

pub use parse::{Anchor, CharClass, Expr};

/// Pattern compilation failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegexpError {
    #[error("{message} at position {position} in pattern {pattern:?}")]
    Syntax {
        pattern: String,
        position: usize,
        message: String,
    },
}

/// A parsed PCRE-style pattern
#[derive(Debug, Clone)]
pub struct Regexp {
    source: String,
    case_sensitive: bool,
    root: Expr,
    groups: Vec<Expr>,
    group_sources: Vec<String>,
    names: Vec<(String, usize)>,
}

impl Regexp {
    /// Compile `pattern`. An inline `(?i)` anywhere in the pattern makes the
    /// whole expression case-insensitive regardless of `case_sensitive`.
    pub fn new(pattern: &str, case_sensitive: bool) -> Result<Self, RegexpError> {
        let parsed = parse::parse_pattern(pattern)?;

        let mut groups = vec![Expr::Empty; parsed.group_sources.len()];
        collect_groups(&parsed.root, &mut groups);

        Ok(Self {
            source: pattern.to_string(),
            case_sensitive: case_sensitive && !parsed.caseless,
            root: parsed.root,
            groups,
            group_sources: parsed.group_sources,
            names: parsed.names,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Number of capturing groups, not counting the implicit group 0
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Expression of a group; 0 is the whole pattern
    pub fn group(&self, index: usize) -> Option<&Expr> {
        match index {
            0 => Some(&self.root),
            n => self.groups.get(n - 1),
        }
    }

    /// Pattern text of a group; 0 is the whole pattern
    pub fn group_source(&self, index: usize) -> Option<&str> {
        match index {
            0 => Some(&self.source),
            n => self.group_sources.get(n - 1).map(String::as_str),
        }
    }

    pub fn can_startswith(&self, c: char) -> bool {
        can_startswith(&self.root, c, self.case_sensitive)
    }

    pub fn must_startswith(&self, c: char) -> bool {
        must_startswith(&self.root, c, self.case_sensitive)
    }

    pub fn can_contain(&self, c: char, skip_literal: bool) -> bool {
        can_contain(&self.root, c, self.case_sensitive, skip_literal)
    }

    pub fn must_contain(&self, c: char) -> bool {
        must_contain(&self.root, c, self.case_sensitive)
    }

    /// Whether every alternative ends with `$`, `\z` or `\Z`
    pub fn is_end_anchored(&self) -> bool {
        ends_anchored(&self.root)
    }

    /// Detects an unanchored file-extension tail such as `\.php`: the
    /// pattern ends with an escaped dot followed by letters or digits and no
    /// end anchor, so `/x.php.txt` would match too.
    pub fn needs_tail_anchor(&self) -> bool {
        needs_tail_anchor(&self.root)
    }

    /// Finite set of strings the whole pattern matches, when small
    pub fn literals(&self) -> Option<Vec<String>> {
        literals(&self.root)
    }
}

impl fmt::Display for Regexp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Capture groups as `(name, capture)` pairs: `"0"`, the numbered groups,
/// then every named group again under its name.
pub fn capture_groups(regexp: &Arc<Regexp>) -> Vec<(String, Capture)> {
    let mut groups: Vec<(String, Capture)> = (0..=regexp.group_count())
        .map(|index| (index.to_string(), Capture::new(Arc::clone(regexp), index)))
        .collect();
    for (name, index) in &regexp.names {
        groups.push((name.clone(), Capture::new(Arc::clone(regexp), *index)));
    }
    groups
}

/// One capture group of a shared [`Regexp`]
#[derive(Debug, Clone)]
pub struct Capture {
    regexp: Arc<Regexp>,
    group: usize,
}

impl Capture {
    pub fn new(regexp: Arc<Regexp>, group: usize) -> Self {
        Self { regexp, group }
    }

    /// The whole-match capture of a freshly compiled pattern
    pub fn whole(pattern: &str, case_sensitive: bool) -> Result<Self, RegexpError> {
        Ok(Self::new(Arc::new(Regexp::new(pattern, case_sensitive)?), 0))
    }

    pub fn regexp(&self) -> &Arc<Regexp> {
        &self.regexp
    }

    pub fn group(&self) -> usize {
        self.group
    }

    fn expr(&self) -> &Expr {
        self.regexp.group(self.group).unwrap_or(&Expr::Empty)
    }

    pub fn can_startswith(&self, c: char) -> bool {
        can_startswith(self.expr(), c, self.regexp.case_sensitive)
    }

    pub fn must_startswith(&self, c: char) -> bool {
        must_startswith(self.expr(), c, self.regexp.case_sensitive)
    }

    /// Literal characters of the pattern are not counted: a literal `/` in
    /// the group is part of the configuration, not attacker input.
    pub fn can_contain(&self, c: char) -> bool {
        can_contain(self.expr(), c, self.regexp.case_sensitive, true)
    }

    pub fn can_contain_literal(&self, c: char) -> bool {
        can_contain(self.expr(), c, self.regexp.case_sensitive, false)
    }

    pub fn must_contain(&self, c: char) -> bool {
        must_contain(self.expr(), c, self.regexp.case_sensitive)
    }

    pub fn literals(&self) -> Option<Vec<String>> {
        literals(self.expr())
    }

    /// Strings this group alone can produce
    pub fn generate(
        &self,
        placeholder: char,
        max_repeat: u32,
    ) -> impl Iterator<Item = String> + '_ {
        let options = generate::GenOptions {
            placeholder,
            anchored: false,
            max_repeat,
        };
        self.expr().generate(options)
    }
}

impl fmt::Display for Capture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.regexp.group_source(self.group).unwrap_or_default())
    }
}

fn collect_groups(expr: &Expr, groups: &mut Vec<Expr>) {
    match expr {
        Expr::Group { index, body } => {
            if let Some(slot) = index.and_then(|i| groups.get_mut(i - 1)) {
                *slot = (**body).clone();
            }
            collect_groups(body, groups);
        }
        Expr::Concat(items) | Expr::Alternation(items) => {
            for item in items {
                collect_groups(item, groups);
            }
        }
        Expr::Repeat { body, .. } | Expr::Lookaround(body) => collect_groups(body, groups),
        _ => {}
    }
}

fn char_eq(a: char, b: char, case_sensitive: bool) -> bool {
    a == b || (!case_sensitive && a.to_lowercase().eq(b.to_lowercase()))
}

/// Something a match can begin with
enum First<'a> {
    Literal(char),
    Class(&'a CharClass),
    Any,
    /// Backreference: whatever the referenced group matched
    Unknown,
}

/// Push the possible first atoms of `expr`; returns whether `expr` can match
/// the empty string (and so lets the next element contribute too).
fn first_atoms<'a>(expr: &'a Expr, out: &mut Vec<First<'a>>) -> bool {
    match expr {
        Expr::Empty | Expr::Anchor(_) | Expr::Lookaround(_) => true,
        Expr::Literal(c) => {
            out.push(First::Literal(*c));
            false
        }
        Expr::Any => {
            out.push(First::Any);
            false
        }
        Expr::Class(class) => {
            out.push(First::Class(class));
            false
        }
        Expr::Backref(_) => {
            out.push(First::Unknown);
            true
        }
        Expr::Concat(items) => {
            for item in items {
                if !first_atoms(item, out) {
                    return false;
                }
            }
            true
        }
        Expr::Alternation(branches) => {
            let mut nullable = false;
            for branch in branches {
                nullable |= first_atoms(branch, out);
            }
            nullable
        }
        Expr::Group { body, .. } => first_atoms(body, out),
        Expr::Repeat { body, min, max } => {
            if *max == Some(0) {
                return true;
            }
            let nullable = first_atoms(body, out);
            *min == 0 || nullable
        }
    }
}

fn can_startswith(expr: &Expr, c: char, case_sensitive: bool) -> bool {
    let mut atoms = Vec::new();
    first_atoms(expr, &mut atoms);
    atoms.iter().any(|atom| match atom {
        First::Literal(l) => char_eq(*l, c, case_sensitive),
        First::Class(class) => class.matches(c, case_sensitive),
        First::Any => c != '\n',
        First::Unknown => true,
    })
}

fn must_startswith(expr: &Expr, c: char, case_sensitive: bool) -> bool {
    let mut atoms = Vec::new();
    let nullable = first_atoms(expr, &mut atoms);
    !nullable
        && !atoms.is_empty()
        && atoms.iter().all(|atom| match atom {
            First::Literal(l) => char_eq(*l, c, case_sensitive),
            First::Class(class) => class
                .single()
                .is_some_and(|only| char_eq(only, c, case_sensitive)),
            First::Any | First::Unknown => false,
        })
}

fn can_contain(expr: &Expr, c: char, case_sensitive: bool, skip_literal: bool) -> bool {
    match expr {
        Expr::Empty | Expr::Anchor(_) | Expr::Lookaround(_) => false,
        Expr::Literal(l) => !skip_literal && char_eq(*l, c, case_sensitive),
        Expr::Any => c != '\n',
        Expr::Class(class) => class.matches(c, case_sensitive),
        Expr::Backref(_) => true,
        Expr::Concat(items) | Expr::Alternation(items) => items
            .iter()
            .any(|item| can_contain(item, c, case_sensitive, skip_literal)),
        Expr::Group { body, .. } => can_contain(body, c, case_sensitive, skip_literal),
        Expr::Repeat { body, max, .. } => {
            *max != Some(0) && can_contain(body, c, case_sensitive, skip_literal)
        }
    }
}

fn must_contain(expr: &Expr, c: char, case_sensitive: bool) -> bool {
    match expr {
        Expr::Literal(l) => char_eq(*l, c, case_sensitive),
        Expr::Class(class) => class
            .single()
            .is_some_and(|only| char_eq(only, c, case_sensitive)),
        Expr::Concat(items) => items.iter().any(|item| must_contain(item, c, case_sensitive)),
        Expr::Alternation(branches) => {
            !branches.is_empty()
                && branches
                    .iter()
                    .all(|branch| must_contain(branch, c, case_sensitive))
        }
        Expr::Group { body, .. } => must_contain(body, c, case_sensitive),
        Expr::Repeat { body, min, .. } => *min > 0 && must_contain(body, c, case_sensitive),
        _ => false,
    }
}

fn ends_anchored(expr: &Expr) -> bool {
    match expr {
        Expr::Anchor(anchor) => anchor.is_end(),
        Expr::Concat(items) => items
            .iter()
            .rev()
            .find(|item| !matches!(item, Expr::Empty | Expr::Lookaround(_)))
            .is_some_and(ends_anchored),
        Expr::Alternation(branches) => branches.iter().all(ends_anchored),
        Expr::Group { body, .. } => ends_anchored(body),
        _ => false,
    }
}

fn needs_tail_anchor(expr: &Expr) -> bool {
    match expr {
        Expr::Alternation(branches) => branches.iter().any(needs_tail_anchor),
        Expr::Group { body, .. } => needs_tail_anchor(body),
        Expr::Concat(items) => {
            if items.last().is_some_and(ends_anchored) {
                return false;
            }
            let kept = items.len()
                - items
                    .iter()
                    .rev()
                    .take_while(|item| is_alnum_run(item))
                    .count();
            kept < items.len() && kept > 0 && is_escaped_dot(&items[kept - 1])
        }
        _ => false,
    }
}

fn is_escaped_dot(expr: &Expr) -> bool {
    match expr {
        Expr::Literal('.') => true,
        Expr::Class(class) => class.single() == Some('.'),
        _ => false,
    }
}

/// Matches only ASCII letters and digits, at least one of them
fn is_alnum_run(expr: &Expr) -> bool {
    match expr {
        Expr::Literal(c) => c.is_ascii_alphanumeric(),
        Expr::Class(class) => class.is_alnum_only(),
        Expr::Repeat { body, min, .. } => *min >= 1 && is_alnum_run(body),
        Expr::Group { body, .. } => is_alnum_run(body),
        Expr::Concat(items) | Expr::Alternation(items) => {
            !items.is_empty() && items.iter().all(is_alnum_run)
        }
        _ => false,
    }
}

const LITERALS_LIMIT: usize = 64;

fn literals(expr: &Expr) -> Option<Vec<String>> {
    let result = match expr {
        Expr::Empty | Expr::Anchor(_) | Expr::Lookaround(_) => vec![String::new()],
        Expr::Literal(c) => vec![c.to_string()],
        Expr::Class(class) => vec![class.single()?.to_string()],
        Expr::Any | Expr::Backref(_) => return None,
        Expr::Group { body, .. } => literals(body)?,
        Expr::Concat(items) => {
            let mut acc = vec![String::new()];
            for item in items {
                let tails = literals(item)?;
                if acc.len() * tails.len() > LITERALS_LIMIT {
                    return None;
                }
                acc = acc
                    .iter()
                    .flat_map(|head| tails.iter().map(move |tail| format!("{head}{tail}")))
                    .collect();
            }
            acc
        }
        Expr::Alternation(branches) => {
            let mut acc = Vec::new();
            for branch in branches {
                acc.extend(literals(branch)?);
            }
            acc
        }
        Expr::Repeat { body, min, max } => {
            let max = (*max)?;
            let bodies = literals(body)?;
            let mut acc = Vec::new();
            for count in *min..=max {
                for body in &bodies {
                    acc.push(body.repeat(count as usize));
                }
                if acc.len() > LITERALS_LIMIT {
                    return None;
                }
            }
            acc
        }
    };
    if result.len() > LITERALS_LIMIT {
        return None;
    }
    Some(result)
}
