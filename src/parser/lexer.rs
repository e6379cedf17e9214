//! nginx configuration lexer
//!
//! Token-level nom parsers shared by the statement grammar: keywords,
//! quoted and unquoted values, comments and the `if` condition modifiers.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, one_of},
    combinator::{map, not, opt, peek, recognize},
    sequence::{pair, terminated},
    IResult,
};
use once_cell::sync::Lazy;
use regex::Regex;

static UNQUOTED_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\([^\s;]*\)|\$\{\w+\}|\\[(){};\s]|[^\s;{}])+")
        .expect("unquoted value pattern is valid")
});

static CONDITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\((?:[^()\n\r\\]|\(.*\)|\\.)+?\)").expect("condition pattern is valid")
});

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Decode raw configuration bytes.
///
/// Files starting with a UTF-8 byte order mark are read as UTF-8 (lossily,
/// mark removed); everything else is read as Latin-1, which accepts any byte.
pub fn decode_config(bytes: &[u8]) -> String {
    match bytes.strip_prefix(UTF8_BOM) {
        Some(rest) => String::from_utf8_lossy(rest).into_owned(),
        None => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

fn error<T>(input: &str, kind: nom::error::ErrorKind) -> IResult<&str, T> {
    Err(nom::Err::Error(nom::error::Error::new(input, kind)))
}

pub(crate) fn is_keyword_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '-' | '_' | '/')
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// Whitespace between tokens, possibly none
pub fn space0(input: &str) -> IResult<&str, &str> {
    take_while(|c: char| matches!(c, ' ' | '\t' | '\r' | '\n'))(input)
}

/// Mandatory whitespace between tokens
pub fn space1(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| matches!(c, ' ' | '\t' | '\r' | '\n'))(input)
}

/// Directive or block name
pub fn keyword(input: &str) -> IResult<&str, &str> {
    take_while1(is_keyword_char)(input)
}

/// `word` as a whole keyword, not the prefix of a longer identifier
pub fn exact_keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    terminated(tag(word), not(peek(ident_char)))
}

fn ident_char(input: &str) -> IResult<&str, char> {
    match input.chars().next() {
        Some(c) if is_ident_char(c) => Ok((&input[c.len_utf8()..], c)),
        _ => error(input, nom::error::ErrorKind::Char),
    }
}

/// Quoted or unquoted argument value
pub fn value(input: &str) -> IResult<&str, String> {
    alt((double_quoted, single_quoted, unquoted))(input)
}

/// Quoted value. Only the quote characters and the backslash itself are
/// unescaped; any other backslash sequence is kept as written so that
/// regexes like `"\d+"` survive.
fn quoted(quote: char) -> impl Fn(&str) -> IResult<&str, String> {
    move |input: &str| {
        let (rest, _) = char(quote)(input)?;
        let mut result = String::new();
        let mut chars = rest.chars().peekable();
        let mut consumed = 0;

        while let Some(c) = chars.next() {
            consumed += c.len_utf8();
            match c {
                c if c == quote => return Ok((&rest[consumed..], result)),
                '\\' => {
                    if let Some(&next) = chars.peek() {
                        consumed += next.len_utf8();
                        chars.next();
                        match next {
                            '"' | '\'' | '\\' => result.push(next),
                            _ => {
                                result.push('\\');
                                result.push(next);
                            }
                        }
                    } else {
                        result.push('\\');
                    }
                }
                _ => result.push(c),
            }
        }

        error(input, nom::error::ErrorKind::Char)
    }
}

fn double_quoted(input: &str) -> IResult<&str, String> {
    quoted('"')(input)
}

fn single_quoted(input: &str) -> IResult<&str, String> {
    quoted('\'')(input)
}

fn unquoted(input: &str) -> IResult<&str, String> {
    match UNQUOTED_VALUE.find(input) {
        Some(found) if found.end() > 0 => {
            Ok((&input[found.end()..], found.as_str().to_string()))
        }
        _ => error(input, nom::error::ErrorKind::TakeWhile1),
    }
}

/// Whether `text` can be written back without quotes
pub fn is_plain_value(text: &str) -> bool {
    !text.is_empty()
        && !text.starts_with(['"', '\''])
        && UNQUOTED_VALUE
            .find(text)
            .is_some_and(|found| found.end() == text.len())
}

/// `# ...` up to the end of the line, text trimmed
pub fn comment(input: &str) -> IResult<&str, String> {
    let (rest, _) = char('#')(input)?;
    let (rest, text) = take_while(|c: char| c != '\n')(rest)?;
    Ok((rest, text.trim().to_string()))
}

/// Raw `( ... )` span of an `if` condition, parentheses included
pub fn condition_span(input: &str) -> IResult<&str, &str> {
    match CONDITION.find(input) {
        Some(found) => Ok((&input[found.end()..], found.as_str())),
        None => error(input, nom::error::ErrorKind::RegexpFind),
    }
}

/// `!`-prefixable comparison or file test operator
fn if_modifier(input: &str) -> IResult<&str, String> {
    let operator = alt((
        terminated(tag("~*"), not(peek(ident_char))),
        terminated(tag("~"), not(peek(ident_char))),
        terminated(tag("="), not(peek(ident_char))),
        recognize(pair(char('-'), one_of("fdex"))),
    ));
    map(recognize(pair(opt(char('!')), operator)), str::to_string)(input)
}

fn condition_variable(input: &str) -> IResult<&str, String> {
    map(
        take_while1(|c: char| c.is_ascii_alphanumeric() || matches!(c, '$' | '_' | '-')),
        str::to_string,
    )(input)
}

/// Split the inside of an `if (...)` into its one to three arguments
pub fn condition_args(inner: &str) -> IResult<&str, Vec<String>> {
    let (input, _) = space0(inner)?;

    if let Ok((rest, operator)) = if_modifier(input) {
        let (rest, _) = space0(rest)?;
        if let Ok((rest, operand)) = value(rest) {
            return Ok((rest, vec![operator, operand]));
        }
    }

    let (rest, variable) = condition_variable(input)?;
    match condition_tail(rest) {
        Ok((rest, (operator, operand))) => Ok((rest, vec![variable, operator, operand])),
        Err(_) => Ok((rest, vec![variable])),
    }
}

fn condition_tail(input: &str) -> IResult<&str, (String, String)> {
    let (input, _) = space1(input)?;
    let (input, operator) = if_modifier(input)?;
    let (input, _) = space0(input)?;
    let (input, operand) = value(input)?;
    Ok((input, (operator, operand)))
}
