//! Bounded enumeration of strings a pattern accepts.

use std::iter;

use super::{Anchor, Expr, Regexp};

type Strings<'a> = Box<dyn Iterator<Item = String> + 'a>;

#[derive(Debug, Clone, Copy)]
pub(super) struct GenOptions {
    pub placeholder: char,
    pub anchored: bool,
    pub max_repeat: u32,
}

impl Regexp {
    /// Lazily enumerate representative matches.
    ///
    /// Character classes, `.` and backreferences produce `placeholder`;
    /// lookarounds produce nothing. `^` and `$` are emitted only when
    /// `anchored` is set. Bounded repeats are unrolled, unbounded ones stop at
    /// `max(min, max_repeat)`. Every call starts a fresh enumeration.
    pub fn generate(
        &self,
        placeholder: char,
        anchored: bool,
        max_repeat: u32,
    ) -> impl Iterator<Item = String> + '_ {
        self.root.generate(GenOptions {
            placeholder,
            anchored,
            max_repeat,
        })
    }
}

fn single<'a>(text: String) -> Strings<'a> {
    Box::new(iter::once(text))
}

impl Expr {
    pub(super) fn generate<'a>(&'a self, options: GenOptions) -> Strings<'a> {
        match self {
            Expr::Empty | Expr::Lookaround(_) => single(String::new()),
            Expr::Literal(c) => single(c.to_string()),
            Expr::Any | Expr::Class(_) | Expr::Backref(_) => {
                single(options.placeholder.to_string())
            }
            Expr::Anchor(anchor) => single(anchor_text(*anchor, options.anchored)),
            Expr::Group { body, .. } => body.generate(options),
            Expr::Alternation(branches) => Box::new(
                branches
                    .iter()
                    .flat_map(move |branch| branch.generate(options)),
            ),
            Expr::Concat(items) => {
                items
                    .iter()
                    .fold(single(String::new()), |acc, item| -> Strings<'a> {
                        Box::new(acc.flat_map(move |prefix| {
                            item.generate(options)
                                .map(move |suffix| format!("{prefix}{suffix}"))
                        }))
                    })
            }
            Expr::Repeat { body, min, max } => {
                let min = *min;
                let max = max.unwrap_or_else(|| min.max(options.max_repeat));
                Box::new((min..=max).flat_map(move |count| -> Strings<'a> {
                    if count == 0 {
                        single(String::new())
                    } else {
                        Box::new(
                            body.generate(options)
                                .map(move |text| text.repeat(count as usize)),
                        )
                    }
                }))
            }
        }
    }
}

fn anchor_text(anchor: Anchor, anchored: bool) -> String {
    match anchor {
        Anchor::LineStart | Anchor::SubjectStart if anchored => "^".to_string(),
        Anchor::LineEnd | Anchor::SubjectEnd if anchored => "$".to_string(),
        _ => String::new(),
    }
}
