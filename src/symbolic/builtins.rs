//! Value shapes of nginx built-in variables
//!
//! Each built-in is described by a regular expression over the values it
//! can take at runtime, e.g. `$uri` is always `/` followed by anything but a
//! space or tab. Prefixed families such as `$http_*` and `$arg_*` share one
//! shape.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use tracing::warn;

use super::regexp::{Capture, Regexp};
use super::variable::{Variable, VariableValue};

const EXACT: &[(&str, &str)] = &[
    ("uri", r"/[^\x20\t]*"),
    ("document_uri", r"/[^\x20\t]*"),
    ("request_uri", r"/[^\s]*"),
    ("args", r"[^\s]*"),
    ("query_string", r"[^\s]*"),
    ("is_args", r"\??"),
    ("request", r"[^\r\n]*"),
    ("request_method", r"[A-Z]+"),
    ("request_body", r"[\s\S]*"),
    ("request_filename", r"/[^\s]*"),
    ("request_id", r"[0-9a-f]{32}"),
    ("host", r"[^\s/]+"),
    ("hostname", r"[a-zA-Z0-9.-]+"),
    ("server_name", r"[^\s]+"),
    ("server_addr", r"[0-9a-fA-F.:]+"),
    ("server_port", r"[0-9]+"),
    ("server_protocol", r"HTTP/[0-9.]+"),
    ("scheme", r"https?"),
    ("https", r"(on)?"),
    ("remote_addr", r"[0-9a-fA-F.:]+"),
    ("remote_port", r"[0-9]+"),
    ("remote_user", r"[^:\s]*"),
    ("binary_remote_addr", r"[\s\S]+"),
    ("realip_remote_addr", r"[0-9a-fA-F.:]+"),
    ("document_root", r"/[^\s]*"),
    ("realpath_root", r"/[^\s]*"),
    ("content_type", r"[^\r\n]*"),
    ("content_length", r"[0-9]*"),
    ("body_bytes_sent", r"[0-9]+"),
    ("bytes_sent", r"[0-9]+"),
    ("status", r"[0-9]{3}"),
    ("msec", r"[0-9]+\.[0-9]+"),
    ("nginx_version", r"[0-9.]+"),
    ("pid", r"[0-9]+"),
    ("connection", r"[0-9]+"),
    ("time_local", r"[0-9A-Za-z/: +-]+"),
    ("time_iso8601", r"[0-9T:+-]+"),
];

const PREFIXED: &[(&str, &str)] = &[
    ("arg_", r"[^\s&]*"),
    ("http_", r"[^\r\n]*"),
    ("sent_http_", r"[^\r\n]*"),
    ("sent_trailer_", r"[^\r\n]*"),
    ("upstream_http_", r"[^\r\n]*"),
    ("upstream_trailer_", r"[^\r\n]*"),
    ("cookie_", r"[^;\s]*"),
    ("upstream_cookie_", r"[^;\s]*"),
];

static EXACT_TABLE: Lazy<HashMap<&'static str, Arc<Regexp>>> =
    Lazy::new(|| EXACT.iter().filter_map(|&(name, pattern)| compile(name, pattern)).collect());

static PREFIX_TABLE: Lazy<Vec<(&'static str, Arc<Regexp>)>> = Lazy::new(|| {
    let mut table: Vec<_> = PREFIXED
        .iter()
        .filter_map(|&(prefix, pattern)| compile(prefix, pattern))
        .collect();
    // longest prefix wins: `sent_http_` before `http_`
    table.sort_by_key(|(prefix, _)| std::cmp::Reverse(prefix.len()));
    table
});

fn compile(name: &'static str, pattern: &str) -> Option<(&'static str, Arc<Regexp>)> {
    match Regexp::new(pattern, true) {
        Ok(regexp) => Some((name, Arc::new(regexp))),
        Err(e) => {
            warn!("Built-in variable ${} has an invalid value pattern: {}", name, e);
            None
        }
    }
}

fn regexp_for(name: &str) -> Option<&'static Arc<Regexp>> {
    if let Some(regexp) = EXACT_TABLE.get(name) {
        return Some(regexp);
    }
    PREFIX_TABLE
        .iter()
        .find(|(prefix, _)| name.len() > prefix.len() && name.starts_with(prefix))
        .map(|(_, regexp)| regexp)
}

pub fn is_builtin(name: &str) -> bool {
    regexp_for(name).is_some()
}

/// The built-in variable `name` (without `$`), if nginx defines one
pub fn lookup(name: &str) -> Option<Variable> {
    let regexp = regexp_for(name)?;
    Some(Variable::new(
        name,
        VariableValue::Capture(Capture::new(Arc::clone(regexp), 0)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_builtin_compiles() {
        assert_eq!(EXACT_TABLE.len(), EXACT.len());
        assert_eq!(PREFIX_TABLE.len(), PREFIXED.len());
    }

    #[test]
    fn test_uri_shape() {
        let uri = lookup("uri").unwrap();
        assert!(uri.must_startswith('/'));
        assert!(uri.can_contain('.'));
        assert!(!uri.can_contain(' '));
    }

    #[test]
    fn test_prefixed_lookup() {
        assert!(is_builtin("http_referer"));
        assert!(is_builtin("arg_redirect"));
        assert!(is_builtin("sent_http_location"));
        assert!(!is_builtin("http_"));
        assert!(!is_builtin("my_custom_var"));

        let referer = lookup("http_referer").unwrap();
        assert!(referer.can_contain('/'));
        assert!(!referer.can_contain('\n'));
    }
}
