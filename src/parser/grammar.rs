//! Statement grammar
//!
//! Turns configuration text into [`Record`]s. Each statement form is tried in
//! a fixed order and the first one that parses wins. A block body is parsed
//! once; a body that does not parse becomes an unparsed block keeping the raw
//! body text.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::char,
    combinator::opt,
    multi::{many0, many1},
    sequence::preceded,
    IResult,
};
use serde::Serialize;
use thiserror::Error;

use super::lexer::{
    comment, condition_args, condition_span, exact_keyword, keyword, space0, space1, value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Comment,
    Directive,
    Include,
    HashValue,
    FileDelimiter,
    Block,
    UnparsedBlock,
}

/// One parsed statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub kind: RecordKind,
    /// Keyword; comment text for comments, path for file delimiters
    pub name: String,
    pub args: Vec<String>,
    pub children: Vec<Record>,
    /// Verbatim body of an unparsed block
    pub raw_body: Option<String>,
    pub line: usize,
    pub column: usize,
}

impl Record {
    fn new(kind: RecordKind, name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            args,
            children: Vec::new(),
            raw_body: None,
            line: 0,
            column: 0,
        }
    }

    fn with_children(mut self, children: Vec<Record>) -> Self {
        self.children = children;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}, column {column}: {message}")]
pub struct SyntaxError {
    /// Character offset of the statement that failed
    pub offset: usize,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

/// Best-effort position of the failure inside an unparsed block body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    pub line: usize,
    pub column: usize,
    pub snippet: String,
}

const SNIPPET_LEN: usize = 50;

/// Parse a whole configuration text
pub fn parse_records(source: &str) -> Result<Vec<Record>, SyntaxError> {
    let grammar = Grammar::new(source);
    let mut records = Vec::new();
    let mut rest = source;

    loop {
        rest = rest.trim_start_matches([' ', '\t', '\r', '\n']);
        if rest.is_empty() {
            return Ok(records);
        }
        match grammar.statement(rest) {
            Ok((remaining, record)) => {
                records.push(record);
                rest = remaining;
            }
            Err(_) => {
                let (line, column) = grammar.position(rest);
                let offset = source[..grammar.byte_offset(rest)].chars().count();
                let found: String = rest.chars().take(20).collect();
                return Err(SyntaxError {
                    offset,
                    line,
                    column,
                    message: format!("unable to parse statement starting with {found:?}"),
                });
            }
        }
    }
}

/// Re-parse the body of an unparsed block to point at what broke it
pub fn locate_problem(raw_body: &str) -> Option<Problem> {
    let err = parse_records(raw_body).err()?;
    let line_text = raw_body.lines().nth(err.line - 1).unwrap_or_default();
    let snippet = line_text
        .chars()
        .skip(err.column - 1)
        .take(SNIPPET_LEN)
        .collect();
    Some(Problem {
        line: err.line,
        column: err.column,
        snippet,
    })
}

struct Grammar<'s> {
    source: &'s str,
    /// Byte offset of the first character of every line
    line_starts: Vec<usize>,
}

type Res<'a, T> = IResult<&'a str, T>;

impl<'s> Grammar<'s> {
    fn new(source: &'s str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(index, _)| index + 1))
            .collect();
        Self {
            source,
            line_starts,
        }
    }

    /// Offset of `rest`, any slice of the source
    fn byte_offset(&self, rest: &str) -> usize {
        rest.as_ptr() as usize - self.source.as_ptr() as usize
    }

    /// 1-based line and column of where `rest` starts
    fn position(&self, rest: &str) -> (usize, usize) {
        let byte = self.byte_offset(rest);
        let line = self.line_starts.partition_point(|&start| start <= byte);
        let line_start = self.line_starts[line - 1];
        let column = self.source[line_start..byte].chars().count() + 1;
        (line, column)
    }

    fn located(&self, start: &str, mut record: Record) -> Record {
        let (line, column) = self.position(start);
        record.line = line;
        record.column = column;
        record
    }

    fn statement<'a>(&self, input: &'a str) -> Res<'a, Record> {
        let (rest, record) = alt((
            |i| self.if_block(i),
            |i| self.location_block(i),
            |i| self.hash_block(i),
            |i| self.generic_block(i),
            |i| self.include(i),
            |i| self.directive(i),
            |i| self.file_delimiter(i),
            |i| self.comment(i),
            |i| self.hash_value(i),
        ))(input)?;
        Ok((rest, self.located(input, record)))
    }

    /// `{ statements }`, the opening brace still ahead. The body is parsed
    /// once: if it does not parse, the block is kept as an unparsed block
    /// with its raw text. A `{` that is never closed fails the whole parse.
    fn block<'a>(&self, input: &'a str, name: &str, args: Vec<String>) -> Res<'a, Record> {
        let (rest, raw) = match balanced_braces(input) {
            Ok(found) => found,
            Err(nom::Err::Error(e)) if input.starts_with('{') => {
                return Err(nom::Err::Failure(e));
            }
            Err(e) => return Err(e),
        };

        let record = match self.statements(raw) {
            Some(children) => Record::new(RecordKind::Block, name, args).with_children(children),
            None => {
                let mut record = Record::new(RecordKind::UnparsedBlock, name, args);
                record.raw_body = Some(raw.to_string());
                record
            }
        };
        Ok((rest, record))
    }

    /// Every statement of a block body, or `None` if any of them fails
    fn statements(&self, body: &str) -> Option<Vec<Record>> {
        let mut records = Vec::new();
        let mut rest = body;
        loop {
            rest = rest.trim_start_matches([' ', '\t', '\r', '\n']);
            if rest.is_empty() {
                return Some(records);
            }
            let (remaining, record) = self.statement(rest).ok()?;
            records.push(record);
            rest = remaining;
        }
    }

    /// Trailing `# comment` between a block header and its `{`
    fn header_end<'a>(&self, input: &'a str) -> Res<'a, ()> {
        let (input, _) = space0(input)?;
        let (input, _) = opt(comment)(input)?;
        let (input, _) = space0(input)?;
        Ok((input, ()))
    }

    fn values<'a>(&self, input: &'a str) -> Res<'a, Vec<String>> {
        many0(preceded(space1, value))(input)
    }

    fn if_block<'a>(&self, input: &'a str) -> Res<'a, Record> {
        let (input, name) = exact_keyword("if")(input)?;
        let (input, _) = space0(input)?;
        let (input, span) = condition_span(input)?;
        let (_, args) = condition_args(&span[1..span.len() - 1])?;
        let (input, _) = self.header_end(input)?;
        self.block(input, name, args)
    }

    fn location_block<'a>(&self, input: &'a str) -> Res<'a, Record> {
        let (input, name) = exact_keyword("location")(input)?;
        let (input, modifier) = opt(preceded(space1, location_modifier))(input)?;
        let (input, _) = space0(input)?;
        let (input, path) = value(input)?;
        let (input, _) = self.header_end(input)?;

        let args = modifier
            .map(str::to_string)
            .into_iter()
            .chain(std::iter::once(path))
            .collect();
        self.block(input, name, args)
    }

    fn hash_block<'a>(&self, input: &'a str) -> Res<'a, Record> {
        let (input, name) = alt((tag("charset"), tag("types"), tag("map"), tag("geo")))(input)?;
        let (input, args) = many1(preceded(space1, value))(input)?;
        let (input, _) = space0(input)?;
        let (input, _) = char('{')(input)?;
        let (input, children) = many0(preceded(
            space0,
            |i: &'a str| -> Res<'a, Record> {
                let (rest, record) = alt((|i| self.include(i), |i| self.hash_value(i)))(i)?;
                Ok((rest, self.located(i, record)))
            },
        ))(input)?;
        let (input, _) = space0(input)?;
        let (input, _) = char('}')(input)?;
        Ok((
            input,
            Record::new(RecordKind::Block, name, args).with_children(children),
        ))
    }

    fn generic_block<'a>(&self, input: &'a str) -> Res<'a, Record> {
        let (input, name) = keyword(input)?;
        let (input, args) = self.values(input)?;
        let (input, _) = self.header_end(input)?;
        self.block(input, name, args)
    }

    fn include<'a>(&self, input: &'a str) -> Res<'a, Record> {
        let (input, name) = exact_keyword("include")(input)?;
        let (input, _) = space1(input)?;
        let (input, path) = value(input)?;
        let (input, _) = space0(input)?;
        let (input, _) = char(';')(input)?;
        Ok((input, Record::new(RecordKind::Include, name, vec![path])))
    }

    fn directive<'a>(&self, input: &'a str) -> Res<'a, Record> {
        let (input, name) = keyword(input)?;
        let (input, args) = self.values(input)?;
        let (input, _) = space0(input)?;
        let (input, _) = char(';')(input)?;
        Ok((input, Record::new(RecordKind::Directive, name, args)))
    }

    /// `# configuration file /etc/nginx/nginx.conf:` as printed by `nginx -T`
    fn file_delimiter<'a>(&self, input: &'a str) -> Res<'a, Record> {
        let (input, _) = tag("# configuration file ")(input)?;
        let (input, _) = space0(input)?;
        let (input, path) = take_while1(|c: char| {
            c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '/')
        })(input)?;
        let (input, _) = space0(input)?;
        let (input, _) = char(':')(input)?;
        Ok((input, Record::new(RecordKind::FileDelimiter, path, Vec::new())))
    }

    fn comment<'a>(&self, input: &'a str) -> Res<'a, Record> {
        let (input, text) = comment(input)?;
        Ok((input, Record::new(RecordKind::Comment, text, Vec::new())))
    }

    /// `key [value];` inside `map`, `geo`, `types` and `charset_map`
    fn hash_value<'a>(&self, input: &'a str) -> Res<'a, Record> {
        let (input, key) = value(input)?;
        let (input, second) = opt(preceded(space0, value))(input)?;
        let (input, _) = space0(input)?;
        let (input, _) = char(';')(input)?;
        Ok((
            input,
            Record::new(RecordKind::HashValue, key, second.into_iter().collect()),
        ))
    }
}

fn location_modifier(input: &str) -> Res<'_, &str> {
    alt((
        exact_keyword("="),
        exact_keyword("~*"),
        exact_keyword("~"),
        exact_keyword("^~"),
    ))(input)
}

/// `{ ... }` with nested braces balanced; returns the text between the
/// outer braces. Quoted strings are skipped, as are comments starting a
/// token, and a backslash escapes the next character.
fn balanced_braces(input: &str) -> Res<'_, &str> {
    let (body, _) = char('{')(input)?;
    let mut depth = 1usize;
    let mut quote: Option<char> = None;
    let mut in_comment = false;
    let mut escaped = false;
    let mut token_start = true;

    for (index, c) in body.char_indices() {
        if in_comment {
            in_comment = c != '\n';
            token_start = true;
            continue;
        }
        if escaped {
            escaped = false;
            token_start = false;
            continue;
        }
        if let Some(q) = quote {
            if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' | '\'' => quote = Some(c),
            '#' if token_start => in_comment = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&body[index + 1..], &body[..index]));
                }
            }
            _ => {}
        }
        token_start = c.is_whitespace() || matches!(c, '{' | '}' | ';');
    }

    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Vec<Record> {
        parse_records(source).unwrap()
    }

    #[test]
    fn test_simple_directive() {
        let records = parse("worker_processes 4;");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, RecordKind::Directive);
        assert_eq!(records[0].name, "worker_processes");
        assert_eq!(records[0].args, vec!["4"]);
    }

    #[test]
    fn test_block_with_lines() {
        let records = parse("\n\nhttp {\n    server {\n        listen 80;\n    }\n}\n");
        let http = &records[0];
        assert_eq!((http.line, http.column), (3, 1));
        let server = &http.children[0];
        assert_eq!((server.line, server.column), (4, 5));
        assert_eq!(server.children[0].line, 5);
    }

    #[test]
    fn test_location_modifiers() {
        let records = parse("location ~* \\.php$ {} location = / {} location /a {}");
        assert_eq!(records[0].args, vec!["~*", "\\.php$"]);
        assert_eq!(records[1].args, vec!["=", "/"]);
        assert_eq!(records[2].args, vec!["/a"]);
    }

    #[test]
    fn test_if_block() {
        let records = parse("if ($request_method = POST) { return 405; }");
        assert_eq!(records[0].name, "if");
        assert_eq!(records[0].args, vec!["$request_method", "=", "POST"]);
        assert_eq!(records[0].children[0].name, "return");
    }

    #[test]
    fn test_comment_before_brace() {
        let records = parse("location / # the root\n{\n    root /srv;\n}");
        assert_eq!(records[0].args, vec!["/"]);
        assert_eq!(records[0].children.len(), 1);
    }

    #[test]
    fn test_map_block_hash_values() {
        let records = parse("map $uri $target {\n    default 0;\n    ~^/old/(.*) /new/$1;\n    include maps/*.map;\n}");
        let map = &records[0];
        assert_eq!(map.args, vec!["$uri", "$target"]);
        let kinds: Vec<RecordKind> = map.children.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![RecordKind::HashValue, RecordKind::HashValue, RecordKind::Include]
        );
        assert_eq!(map.children[1].name, "~^/old/(.*)");
        assert_eq!(map.children[1].args, vec!["/new/$1"]);
    }

    #[test]
    fn test_types_block_falls_back_to_directives() {
        let records = parse("types {\n    text/html html htm;\n}");
        assert_eq!(records[0].kind, RecordKind::Block);
        assert_eq!(records[0].children[0].kind, RecordKind::Directive);
        assert_eq!(records[0].children[0].args, vec!["html", "htm"]);
    }

    #[test]
    fn test_file_delimiter_and_comment() {
        let records = parse("# configuration file /etc/nginx/nginx.conf:\n# plain comment\n");
        assert_eq!(records[0].kind, RecordKind::FileDelimiter);
        assert_eq!(records[0].name, "/etc/nginx/nginx.conf");
        assert_eq!(records[1].kind, RecordKind::Comment);
        assert_eq!(records[1].name, "plain comment");
    }

    #[test]
    fn test_unparsed_block_keeps_body() {
        let records = parse("content_by_lua_block {\n    ngx.say(\"}\")\n}\nlisten 80;");
        assert_eq!(records[0].kind, RecordKind::UnparsedBlock);
        assert_eq!(
            records[0].raw_body.as_deref(),
            Some("\n    ngx.say(\"}\")\n")
        );
        assert_eq!(records[1].name, "listen");
        assert_eq!(records[1].line, 4);
    }

    #[test]
    fn test_syntax_error_position() {
        let err = parse_records("events {}\nhttp {\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 1);
        assert_eq!(err.offset, 10);
    }

    #[test]
    fn test_locate_problem() {
        let problem = locate_problem("\n    ngx.say(\"hi\")\n").unwrap();
        assert_eq!(problem.line, 2);
        assert_eq!(problem.column, 5);
        assert_eq!(problem.snippet, "ngx.say(\"hi\")");
        assert!(locate_problem("listen 80;").is_none());
    }

    #[test]
    fn test_deeply_nested_unclosed_blocks_fail() {
        let source = format!("http {{\n{}", "location / {\n".repeat(40));
        let err = parse_records(&source).unwrap_err();
        assert_eq!((err.line, err.column), (1, 1));
    }

    #[test]
    fn test_nested_broken_body_is_parsed_once() {
        let mut source = String::from("ngx.say(1)\n");
        for _ in 0..40 {
            source = format!("location / {{\n{source}}}\n");
        }
        let records = parse(&format!("http {{\n{source}}}"));
        let mut record = &records[0].children[0];
        while record.kind == RecordKind::Block {
            record = &record.children[0];
        }
        assert_eq!(record.kind, RecordKind::UnparsedBlock);
        assert_eq!(record.name, "location");
        assert_eq!(record.raw_body.as_deref(), Some("\nngx.say(1)\n"));
    }

    #[test]
    fn test_braces_in_comments_do_not_count() {
        let records = parse("server {\n    # don't close { here\n    listen 80;\n}\nlisten 81;");
        assert_eq!(records[0].kind, RecordKind::Block);
        assert_eq!(records[0].children[1].name, "listen");
        assert_eq!(records[1].args, vec!["81"]);
    }
}
