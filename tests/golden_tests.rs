//! Golden file tests for ngx-audit
//!
//! These tests parse fixture files and compare the reconstructed configuration
//! against snapshots. Run `cargo insta review` to update snapshots after
//! intentional changes.

use ngx_audit::emitter::{EmitterOptions, NginxEmitter};
use ngx_audit::ParseOptions;
use std::path::PathBuf;

fn dump_fixture(fixture_path: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(fixture_path);

    let parsed =
        ngx_audit::parse_file(&path, ParseOptions::default()).expect("Failed to parse config");
    assert!(
        parsed.diagnostics.is_empty(),
        "unexpected warnings: {:?}",
        parsed.diagnostics.warnings
    );

    let emitter = NginxEmitter::new(EmitterOptions::default());
    emitter.emit(&parsed.tree).expect("Failed to emit config")
}

#[test]
fn test_nginx_basic() {
    let output = dump_fixture("basic.conf");
    insta::assert_snapshot!("nginx_basic", output);
}

#[test]
fn test_nginx_with_includes() {
    let output = dump_fixture("with_includes/nginx.conf");
    insta::assert_snapshot!("nginx_with_includes", output);
}

#[test]
fn test_nginx_dump() {
    let output = dump_fixture("dump.conf");
    insta::assert_snapshot!("nginx_dump", output);
}
