//! PCRE-subset pattern parser
//!
//! Turns an nginx regular expression into an [`Expr`] tree. The grammar is
//! the practical subset that shows up in `location`, `if`, `map` and
//! `rewrite` directives; anything the analysis cannot use (lookarounds,
//! atomic groups, inline comments) is still accepted so that a pattern
//! nginx itself would load never fails here.

use super::RegexpError;

/// Largest repeat bound PCRE accepts in `{n,m}`
const REPEAT_LIMIT: u32 = 65535;

/// Zero-width position assertions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// `^`
    LineStart,
    /// `$`
    LineEnd,
    /// `\A`
    SubjectStart,
    /// `\z` and `\Z`
    SubjectEnd,
    /// `\b`
    WordBoundary,
    /// `\B`
    NotWordBoundary,
    /// `\G`
    Continue,
}

impl Anchor {
    pub fn is_end(self) -> bool {
        matches!(self, Anchor::LineEnd | Anchor::SubjectEnd)
    }
}

/// Shorthand and POSIX character categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Digit,
    Word,
    Space,
    HorizontalSpace,
    VerticalSpace,
    Alpha,
    Alnum,
    Upper,
    Lower,
    Punct,
    XDigit,
    Print,
    Graph,
    Cntrl,
    Blank,
    Ascii,
    /// `\p{..}` properties, approximated as letters and digits
    Property,
}

impl Category {
    fn from_posix(name: &str) -> Option<Self> {
        Some(match name {
            "alpha" => Category::Alpha,
            "alnum" => Category::Alnum,
            "digit" => Category::Digit,
            "upper" => Category::Upper,
            "lower" => Category::Lower,
            "space" => Category::Space,
            "punct" => Category::Punct,
            "xdigit" => Category::XDigit,
            "print" => Category::Print,
            "graph" => Category::Graph,
            "cntrl" => Category::Cntrl,
            "blank" => Category::Blank,
            "ascii" => Category::Ascii,
            "word" => Category::Word,
            _ => return None,
        })
    }

    pub fn matches(self, c: char) -> bool {
        match self {
            Category::Digit => c.is_ascii_digit(),
            Category::Word => c.is_alphanumeric() || c == '_',
            Category::Space => c.is_whitespace(),
            Category::HorizontalSpace => c == ' ' || c == '\t' || c == '\u{a0}',
            Category::VerticalSpace => matches!(c, '\n' | '\r' | '\u{0b}' | '\u{0c}' | '\u{85}'),
            Category::Alpha => c.is_ascii_alphabetic(),
            Category::Alnum => c.is_ascii_alphanumeric(),
            Category::Upper => c.is_ascii_uppercase(),
            Category::Lower => c.is_ascii_lowercase(),
            Category::Punct => c.is_ascii_punctuation(),
            Category::XDigit => c.is_ascii_hexdigit(),
            Category::Print => (' '..='~').contains(&c),
            Category::Graph => c.is_ascii_graphic(),
            Category::Cntrl => c.is_ascii_control(),
            Category::Blank => c == ' ' || c == '\t',
            Category::Ascii => c.is_ascii(),
            Category::Property => c.is_alphanumeric(),
        }
    }

    /// Whether every character of the category is an ASCII letter or digit
    /// (or `_`, which extension patterns routinely allow through `\w`).
    fn is_alnum_only(self) -> bool {
        matches!(
            self,
            Category::Digit
                | Category::Word
                | Category::Alpha
                | Category::Alnum
                | Category::Upper
                | Category::Lower
                | Category::XDigit
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassItem {
    Char(char),
    Range(char, char),
    Category { category: Category, negated: bool },
}

impl ClassItem {
    fn matches(&self, c: char) -> bool {
        match *self {
            ClassItem::Char(x) => x == c,
            ClassItem::Range(lo, hi) => lo <= c && c <= hi,
            ClassItem::Category { category, negated } => category.matches(c) != negated,
        }
    }
}

/// A bracketed class or a standalone shorthand such as `\d`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharClass {
    pub negated: bool,
    pub items: Vec<ClassItem>,
}

impl CharClass {
    fn category(category: Category, negated: bool) -> Self {
        Self {
            negated: false,
            items: vec![ClassItem::Category { category, negated }],
        }
    }

    pub fn matches(&self, c: char, case_sensitive: bool) -> bool {
        let hit = |ch: char| self.items.iter().any(|item| item.matches(ch));
        let found = if case_sensitive {
            hit(c)
        } else {
            hit(c) || c.to_lowercase().any(hit) || c.to_uppercase().any(hit)
        };
        found != self.negated
    }

    /// The only character a non-negated one-item class like `[/]` accepts
    pub fn single(&self) -> Option<char> {
        match (self.negated, self.items.as_slice()) {
            (false, [ClassItem::Char(c)]) => Some(*c),
            _ => None,
        }
    }

    pub fn is_alnum_only(&self) -> bool {
        !self.negated
            && !self.items.is_empty()
            && self.items.iter().all(|item| match *item {
                ClassItem::Char(c) => c.is_ascii_alphanumeric(),
                ClassItem::Range(lo, hi) => {
                    ('a'..='z').contains(&lo) && ('a'..='z').contains(&hi)
                        || ('A'..='Z').contains(&lo) && ('A'..='Z').contains(&hi)
                        || ('0'..='9').contains(&lo) && ('0'..='9').contains(&hi)
                }
                ClassItem::Category { category, negated } => !negated && category.is_alnum_only(),
            })
    }
}

/// Parsed pattern tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Empty,
    Literal(char),
    /// `.`
    Any,
    Class(CharClass),
    Concat(Vec<Expr>),
    Alternation(Vec<Expr>),
    /// Parenthesized group; `index` is set for capturing groups
    Group {
        index: Option<usize>,
        body: Box<Expr>,
    },
    Repeat {
        body: Box<Expr>,
        min: u32,
        max: Option<u32>,
    },
    Anchor(Anchor),
    /// Lookahead or lookbehind; zero-width, content kept for completeness
    Lookaround(Box<Expr>),
    Backref(usize),
}

/// Result of parsing a whole pattern
#[derive(Debug, Clone)]
pub struct ParsedPattern {
    pub root: Expr,
    /// Pattern text of each capturing group body, indexed by group number - 1
    pub group_sources: Vec<String>,
    pub names: Vec<(String, usize)>,
    /// `(?i)` seen anywhere in the pattern
    pub caseless: bool,
}

enum Escaped {
    Char(char),
    Class(CharClass),
    Anchor(Anchor),
    Backref(usize),
    Quoted(String),
    Nothing,
}

pub fn parse_pattern(pattern: &str) -> Result<ParsedPattern, RegexpError> {
    let mut parser = PatternParser {
        source: pattern,
        chars: pattern.chars().collect(),
        pos: 0,
        group_count: 0,
        group_spans: Vec::new(),
        names: Vec::new(),
        caseless: false,
    };
    parser.skip_verbs()?;
    let root = parser.alternation()?;
    if parser.pos < parser.chars.len() {
        return Err(parser.error("unbalanced parenthesis"));
    }

    let group_sources = parser
        .group_spans
        .iter()
        .map(|&(start, end)| parser.chars[start..end].iter().collect())
        .collect();

    Ok(ParsedPattern {
        root,
        group_sources,
        names: parser.names,
        caseless: parser.caseless,
    })
}

struct PatternParser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
    group_count: usize,
    group_spans: Vec<(usize, usize)>,
    names: Vec<(String, usize)>,
    caseless: bool,
}

impl<'a> PatternParser<'a> {
    fn error(&self, message: &str) -> RegexpError {
        RegexpError::Syntax {
            pattern: self.source.to_string(),
            position: self.pos,
            message: message.to_string(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, s: &str) -> bool {
        let len = s.chars().count();
        if self.pos + len > self.chars.len() {
            return false;
        }
        if self.chars[self.pos..self.pos + len].iter().copied().eq(s.chars()) {
            self.pos += len;
            true
        } else {
            false
        }
    }

    /// Leading PCRE verbs such as `(*ANYCRLF)` or `(*UTF8)` carry no
    /// matching semantics we care about.
    fn skip_verbs(&mut self) -> Result<(), RegexpError> {
        while self.peek() == Some('(') && self.peek_at(1) == Some('*') {
            match self.chars[self.pos..].iter().position(|&c| c == ')') {
                Some(offset) => self.pos += offset + 1,
                None => return Err(self.error("unterminated PCRE extension")),
            }
        }
        Ok(())
    }

    fn alternation(&mut self) -> Result<Expr, RegexpError> {
        let mut branches = vec![self.concat()?];
        while self.eat('|') {
            branches.push(self.concat()?);
        }
        Ok(if branches.len() == 1 {
            branches.remove(0)
        } else {
            Expr::Alternation(branches)
        })
    }

    fn concat(&mut self) -> Result<Expr, RegexpError> {
        let mut items = Vec::new();
        while let Some(c) = self.peek() {
            if c == '|' || c == ')' {
                break;
            }
            let atom = self.atom()?;
            let atom = self.quantified(atom)?;
            match atom {
                Expr::Empty => {}
                Expr::Concat(inner) => items.extend(inner),
                other => items.push(other),
            }
        }
        Ok(match items.len() {
            0 => Expr::Empty,
            1 => items.remove(0),
            _ => Expr::Concat(items),
        })
    }

    fn quantified(&mut self, mut atom: Expr) -> Result<Expr, RegexpError> {
        loop {
            let (min, max) = match self.peek() {
                Some('*') => {
                    self.pos += 1;
                    (0, None)
                }
                Some('+') => {
                    self.pos += 1;
                    (1, None)
                }
                Some('?') => {
                    self.pos += 1;
                    (0, Some(1))
                }
                Some('{') => match self.counted_repeat() {
                    Some(bounds) => bounds,
                    None => return Ok(atom),
                },
                _ => return Ok(atom),
            };
            if matches!(atom, Expr::Empty) {
                return Err(self.error("nothing to repeat"));
            }
            if min > REPEAT_LIMIT || max.is_some_and(|max| max > REPEAT_LIMIT) {
                return Err(self.error("number too big in {} quantifier"));
            }
            if let Some(max) = max {
                if max < min {
                    return Err(self.error("min repeat greater than max repeat"));
                }
            }
            // lazy and possessive suffixes do not change the accepted language
            if !self.eat('?') {
                self.eat('+');
            }
            atom = Expr::Repeat {
                body: Box::new(atom),
                min,
                max,
            };
        }
    }

    /// `{n}`, `{n,}`, `{n,m}` or `{,m}`; anything else leaves `{` literal.
    fn counted_repeat(&mut self) -> Option<(u32, Option<u32>)> {
        let start = self.pos;
        self.pos += 1;
        let min = self.number();
        let result = if self.eat('}') {
            min.map(|n| (n, Some(n)))
        } else if self.eat(',') {
            let max = self.number();
            if self.eat('}') && (min.is_some() || max.is_some()) {
                Some((min.unwrap_or(0), max))
            } else {
                None
            }
        } else {
            None
        };
        if result.is_none() {
            self.pos = start;
        }
        result
    }

    fn number(&mut self) -> Option<u32> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if start == self.pos {
            return None;
        }
        // too long for u32 is still a number; the repeat limit rejects it
        Some(
            self.chars[start..self.pos]
                .iter()
                .collect::<String>()
                .parse()
                .unwrap_or(u32::MAX),
        )
    }

    fn atom(&mut self) -> Result<Expr, RegexpError> {
        let c = match self.next() {
            Some(c) => c,
            None => return Ok(Expr::Empty),
        };
        match c {
            '(' => self.group(),
            '[' => self.class().map(Expr::Class),
            '.' => Ok(Expr::Any),
            '^' => Ok(Expr::Anchor(Anchor::LineStart)),
            '$' => Ok(Expr::Anchor(Anchor::LineEnd)),
            '\\' => Ok(match self.escape(false)? {
                Escaped::Char(c) => Expr::Literal(c),
                Escaped::Class(class) => Expr::Class(class),
                Escaped::Anchor(anchor) => Expr::Anchor(anchor),
                Escaped::Backref(index) => Expr::Backref(index),
                Escaped::Quoted(text) => {
                    Expr::Concat(text.chars().map(Expr::Literal).collect())
                }
                Escaped::Nothing => Expr::Empty,
            }),
            '*' | '+' | '?' => {
                self.pos -= 1;
                Err(self.error("nothing to repeat"))
            }
            other => Ok(Expr::Literal(other)),
        }
    }

    fn group(&mut self) -> Result<Expr, RegexpError> {
        if !self.eat('?') {
            return self.capturing_group(None);
        }

        if self.eat(':') || self.eat('>') || self.eat('|') {
            return self.group_body(None);
        }
        if self.eat('=') || self.eat('!') || self.eat_str("<=") || self.eat_str("<!") {
            let body = self.alternation()?;
            self.close_group()?;
            return Ok(Expr::Lookaround(Box::new(body)));
        }
        if self.eat('#') {
            while let Some(c) = self.next() {
                if c == ')' {
                    return Ok(Expr::Empty);
                }
            }
            return Err(self.error("missing ) after comment"));
        }
        if self.eat_str("P=") {
            let name = self.name_until(')')?;
            return self.named_backref(&name);
        }
        if self.eat_str("P<") || self.eat('<') {
            let name = self.name_until('>')?;
            return self.capturing_group(Some(name));
        }
        if self.eat('\'') {
            let name = self.name_until('\'')?;
            return self.capturing_group(Some(name));
        }

        // inline flags: (?i) (?i-s) (?i:...)
        let mut enabled = true;
        while let Some(c) = self.peek() {
            match c {
                '-' => enabled = false,
                'i' => {
                    if enabled {
                        self.caseless = true;
                    }
                }
                c if c.is_ascii_alphabetic() => {}
                ')' => {
                    self.pos += 1;
                    return Ok(Expr::Empty);
                }
                ':' => {
                    self.pos += 1;
                    return self.group_body(None);
                }
                _ => return Err(self.error("unknown extension")),
            }
            self.pos += 1;
        }
        Err(self.error("missing ), unterminated subpattern"))
    }

    fn capturing_group(&mut self, name: Option<String>) -> Result<Expr, RegexpError> {
        self.group_count += 1;
        let index = self.group_count;
        self.group_spans.push((self.pos, self.pos));
        if let Some(name) = name {
            if self.names.iter().any(|(n, _)| *n == name) {
                return Err(self.error("redefinition of group name"));
            }
            self.names.push((name, index));
        }
        let start = self.pos;
        let body = self.alternation()?;
        self.group_spans[index - 1] = (start, self.pos);
        self.close_group()?;
        Ok(Expr::Group {
            index: Some(index),
            body: Box::new(body),
        })
    }

    fn group_body(&mut self, index: Option<usize>) -> Result<Expr, RegexpError> {
        let body = self.alternation()?;
        self.close_group()?;
        Ok(Expr::Group {
            index,
            body: Box::new(body),
        })
    }

    fn close_group(&mut self) -> Result<(), RegexpError> {
        if self.eat(')') {
            Ok(())
        } else {
            Err(self.error("missing ), unterminated subpattern"))
        }
    }

    fn name_until(&mut self, terminator: char) -> Result<String, RegexpError> {
        let mut name = String::new();
        while let Some(c) = self.next() {
            if c == terminator {
                if name.is_empty() {
                    return Err(self.error("missing group name"));
                }
                return Ok(name);
            }
            if !(c.is_ascii_alphanumeric() || c == '_') {
                return Err(self.error("bad character in group name"));
            }
            name.push(c);
        }
        Err(self.error("missing group name terminator"))
    }

    fn named_backref(&self, name: &str) -> Result<Expr, RegexpError> {
        self.names
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, index)| Expr::Backref(index))
            .ok_or_else(|| self.error("unknown group name"))
    }

    fn class(&mut self) -> Result<CharClass, RegexpError> {
        let negated = self.eat('^');
        let mut items = Vec::new();
        let mut first = true;

        loop {
            let c = self
                .next()
                .ok_or_else(|| self.error("unterminated character set"))?;
            if c == ']' && !first {
                break;
            }
            first = false;

            let start = match c {
                '[' if self.peek() == Some(':') => {
                    items.push(self.posix_class()?);
                    continue;
                }
                '\\' => match self.escape(true)? {
                    Escaped::Char(c) => c,
                    Escaped::Class(class) => {
                        items.extend(class.items);
                        continue;
                    }
                    Escaped::Quoted(text) => {
                        items.extend(text.chars().map(ClassItem::Char));
                        continue;
                    }
                    _ => continue,
                },
                other => other,
            };

            if self.peek() == Some('-') && self.peek_at(1).is_some_and(|n| n != ']') {
                self.pos += 1;
                let end = match self.next() {
                    Some('\\') => match self.escape(true)? {
                        Escaped::Char(c) => Some(c),
                        Escaped::Class(class) => {
                            items.push(ClassItem::Char(start));
                            items.push(ClassItem::Char('-'));
                            items.extend(class.items);
                            None
                        }
                        _ => None,
                    },
                    Some(c) => Some(c),
                    None => return Err(self.error("unterminated character set")),
                };
                if let Some(end) = end {
                    if end < start {
                        return Err(self.error("bad character range"));
                    }
                    items.push(ClassItem::Range(start, end));
                }
                continue;
            }
            items.push(ClassItem::Char(start));
        }

        Ok(CharClass { negated, items })
    }

    fn posix_class(&mut self) -> Result<ClassItem, RegexpError> {
        let start = self.pos;
        self.pos += 1;
        let negated = self.eat('^');
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_lowercase() {
                name.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.eat_str(":]") {
            if let Some(category) = Category::from_posix(&name) {
                return Ok(ClassItem::Category { category, negated });
            }
            return Err(self.error("unknown POSIX class name"));
        }
        // not a POSIX class after all, `[` is literal
        self.pos = start;
        Ok(ClassItem::Char('['))
    }

    fn escape(&mut self, in_class: bool) -> Result<Escaped, RegexpError> {
        let c = self
            .next()
            .ok_or_else(|| self.error("bad escape (end of pattern)"))?;
        let category = |category, negated| Ok(Escaped::Class(CharClass::category(category, negated)));
        match c {
            'd' => category(Category::Digit, false),
            'D' => category(Category::Digit, true),
            'w' => category(Category::Word, false),
            'W' => category(Category::Word, true),
            's' => category(Category::Space, false),
            'S' => category(Category::Space, true),
            'h' => category(Category::HorizontalSpace, false),
            'H' => category(Category::HorizontalSpace, true),
            'v' => category(Category::VerticalSpace, false),
            'V' => category(Category::VerticalSpace, true),
            'p' | 'P' => {
                if self.eat('{') {
                    while let Some(n) = self.next() {
                        if n == '}' {
                            break;
                        }
                    }
                } else {
                    self.next();
                }
                category(Category::Property, c == 'P')
            }
            'b' if in_class => Ok(Escaped::Char('\u{08}')),
            'b' => Ok(Escaped::Anchor(Anchor::WordBoundary)),
            'B' if !in_class => Ok(Escaped::Anchor(Anchor::NotWordBoundary)),
            'A' if !in_class => Ok(Escaped::Anchor(Anchor::SubjectStart)),
            'z' | 'Z' if !in_class => Ok(Escaped::Anchor(Anchor::SubjectEnd)),
            'G' if !in_class => Ok(Escaped::Anchor(Anchor::Continue)),
            'n' => Ok(Escaped::Char('\n')),
            't' => Ok(Escaped::Char('\t')),
            'r' => Ok(Escaped::Char('\r')),
            'f' => Ok(Escaped::Char('\u{0c}')),
            'e' => Ok(Escaped::Char('\u{1b}')),
            'a' => Ok(Escaped::Char('\u{07}')),
            '0' => {
                let mut value = 0u32;
                for _ in 0..2 {
                    match self.peek().and_then(|d| d.to_digit(8)) {
                        Some(d) => {
                            value = value * 8 + d;
                            self.pos += 1;
                        }
                        None => break,
                    }
                }
                Ok(Escaped::Char(char::from_u32(value).unwrap_or('\0')))
            }
            '1'..='9' if !in_class => {
                let mut index = c.to_digit(10).unwrap_or(0) as usize;
                while let Some(d) = self.peek().and_then(|d| d.to_digit(10)) {
                    index = index
                        .checked_mul(10)
                        .and_then(|index| index.checked_add(d as usize))
                        .ok_or_else(|| self.error("group reference number too big"))?;
                    self.pos += 1;
                }
                Ok(Escaped::Backref(index))
            }
            'x' => self.hex_escape(),
            'c' => {
                let ctrl = self
                    .next()
                    .ok_or_else(|| self.error("\\c at end of pattern"))?;
                let code = (ctrl.to_ascii_uppercase() as u32) ^ 0x40;
                Ok(Escaped::Char(char::from_u32(code).unwrap_or('\0')))
            }
            'k' if !in_class => {
                let terminator = match self.next() {
                    Some('<') => '>',
                    Some('{') => '}',
                    Some('\'') => '\'',
                    _ => return Err(self.error("\\k is not followed by a group name")),
                };
                let name = self.name_until(terminator)?;
                match self.named_backref(&name)? {
                    Expr::Backref(index) => Ok(Escaped::Backref(index)),
                    _ => Ok(Escaped::Nothing),
                }
            }
            'g' if !in_class => self.g_reference(),
            'Q' => {
                let mut text = String::new();
                while self.peek().is_some() {
                    if self.eat_str("\\E") {
                        break;
                    }
                    if let Some(c) = self.next() {
                        text.push(c);
                    }
                }
                Ok(Escaped::Quoted(text))
            }
            'E' => Ok(Escaped::Nothing),
            other => Ok(Escaped::Char(other)),
        }
    }

    fn hex_escape(&mut self) -> Result<Escaped, RegexpError> {
        let mut digits = String::new();
        if self.eat('{') {
            while let Some(c) = self.next() {
                if c == '}' {
                    break;
                }
                digits.push(c);
            }
        } else {
            for _ in 0..2 {
                match self.peek() {
                    Some(c) if c.is_ascii_hexdigit() => {
                        digits.push(c);
                        self.pos += 1;
                    }
                    _ => break,
                }
            }
        }
        if digits.is_empty() {
            return Ok(Escaped::Char('\0'));
        }
        u32::from_str_radix(&digits, 16)
            .ok()
            .and_then(char::from_u32)
            .map(Escaped::Char)
            .ok_or_else(|| self.error("bad hexadecimal escape"))
    }

    /// `\g1`, `\g{1}`, `\g{-1}` and `\g{name}`
    fn g_reference(&mut self) -> Result<Escaped, RegexpError> {
        let braced = self.eat('{');
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if braced && c == '}' {
                self.pos += 1;
                break;
            }
            if !braced && !(c.is_ascii_digit() || (c == '-' && text.is_empty())) {
                break;
            }
            text.push(c);
            self.pos += 1;
        }
        if let Ok(relative) = text.parse::<i64>() {
            let index = if relative < 0 {
                self.group_count as i64 + 1 + relative
            } else {
                relative
            };
            if index <= 0 {
                return Err(self.error("invalid group reference"));
            }
            return Ok(Escaped::Backref(index as usize));
        }
        match self.named_backref(&text)? {
            Expr::Backref(index) => Ok(Escaped::Backref(index)),
            _ => Ok(Escaped::Nothing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcre_verb_removal() {
        let parsed = parse_pattern("(*ANYCRLF)/(?P<target>.+?)$").unwrap();
        assert_eq!(parsed.names, vec![("target".to_string(), 1)]);
        assert_eq!(
            parsed.root,
            Expr::Concat(vec![
                Expr::Literal('/'),
                Expr::Group {
                    index: Some(1),
                    body: Box::new(Expr::Repeat {
                        body: Box::new(Expr::Any),
                        min: 1,
                        max: None,
                    }),
                },
                Expr::Anchor(Anchor::LineEnd),
            ])
        );
    }

    #[test]
    fn test_incomplete_pcre_verb() {
        let err = parse_pattern("(*ANYCRLF").unwrap_err();
        assert!(err.to_string().contains("unterminated PCRE extension"));
    }

    #[test]
    fn test_group_sources() {
        let parsed = parse_pattern(r"^/(\w+)/(?<rest>.*\.php)$").unwrap();
        assert_eq!(parsed.group_sources, vec![r"\w+".to_string(), r".*\.php".to_string()]);
    }

    #[test]
    fn test_counted_repeat_and_literal_brace() {
        let parsed = parse_pattern("a{2,3}b{").unwrap();
        assert_eq!(
            parsed.root,
            Expr::Concat(vec![
                Expr::Repeat {
                    body: Box::new(Expr::Literal('a')),
                    min: 2,
                    max: Some(3),
                },
                Expr::Literal('b'),
                Expr::Literal('{'),
            ])
        );
    }

    #[test]
    fn test_class_parsing() {
        let parsed = parse_pattern(r"[^a-z\d_-]").unwrap();
        let Expr::Class(class) = parsed.root else {
            panic!("expected class");
        };
        assert!(class.negated);
        assert!(!class.matches('q', true));
        assert!(!class.matches('7', true));
        assert!(!class.matches('-', true));
        assert!(class.matches('/', true));
        assert!(!class.matches('Q', false));
    }

    #[test]
    fn test_inline_caseless_flag() {
        assert!(parse_pattern("(?i)^/admin").unwrap().caseless);
        assert!(!parse_pattern("(?-i)^/admin").unwrap().caseless);
    }

    #[test]
    fn test_errors() {
        assert!(parse_pattern("(abc").is_err());
        assert!(parse_pattern("abc)").is_err());
        assert!(parse_pattern("*abc").is_err());
        assert!(parse_pattern("[abc").is_err());
        assert!(parse_pattern("[z-a]").is_err());
        assert!(parse_pattern(r"\k<missing>").is_err());
    }

    #[test]
    fn test_oversized_numbers() {
        assert!(parse_pattern(r"^/(a)\99999999999999999999999").is_err());
        assert!(parse_pattern("a{4000000000}").is_err());
        assert!(parse_pattern("a{99999999999}").is_err());
        assert!(parse_pattern("a{1,65536}").is_err());
        assert!(parse_pattern("a{65535}").is_ok());
    }
}
