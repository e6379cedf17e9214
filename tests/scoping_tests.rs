//! Variable resolution across parsed configurations

use ngx_audit::{NodeKind, ParseOptions, Tree, VariableValue};

fn parse(content: &str) -> Tree {
    ngx_audit::parse_str(content, ParseOptions::default())
        .expect("Failed to parse config")
        .tree
}

const CONFIG: &str = r#"
http {
    map $host $backend {
        default app0;
        example.com app1;
        ~^(?<sub>[a-z]+)\.example\.com$ $sub;
    }

    server {
        set $static_root /srv/static;

        location ~ /proxy/(.*)$ {
            proxy_pass http://$1;
        }

        location / {
            add_header X-Uri $uri;
            return 302 https://example.com$request_uri;
        }

        location /assets/ {
            alias $static_root/assets/;
            proxy_pass http://$backend;
        }

        if ($http_referer ~ ^https?://(.+)$) {
            set $referer_host $1;
        }
    }
}
"#;

#[test]
fn test_location_capture_reaches_directives() {
    let tree = parse(CONFIG);
    let location = tree
        .root()
        .find_recursive("location")
        .into_iter()
        .find(|n| n.as_location().is_some_and(|l| l.is_regex()))
        .unwrap();
    let proxy_pass = location.some("proxy_pass", false).unwrap();

    let parts = proxy_pass.compile_script(&proxy_pass.args()[0]);
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].final_value().as_deref(), Some("http://"));
    assert_eq!(parts[1].provider, Some(location.id()));
    assert!(parts[1].can_contain('/'));
    assert!(parts[1].can_contain('@'));
}

#[test]
fn test_builtin_shapes() {
    let tree = parse(CONFIG);
    let root_location = tree
        .root()
        .find_recursive("location")
        .into_iter()
        .find(|n| n.args() == ["/"])
        .unwrap();

    let add_header = root_location.some("add_header", false).unwrap();
    assert!(matches!(add_header.kind(), NodeKind::AddHeader(h) if h.header == "x-uri"));
    let uri = &add_header.compile_script("$uri")[0];
    assert!(uri.must_startswith('/'));
    assert!(uri.can_contain('\n'));

    let redirect = root_location.some("return", false).unwrap();
    let parts = redirect.compile_script(&redirect.args()[1]);
    assert_eq!(parts.len(), 2);
    assert!(!parts[1].can_contain('\n'));
    assert!(!parts[1].can_contain(' '));
}

#[test]
fn test_set_and_map_definitions() {
    let tree = parse(CONFIG);
    let assets = tree
        .root()
        .find_recursive("location")
        .into_iter()
        .find(|n| n.args() == ["/assets/"])
        .unwrap();

    let alias = assets.some("alias", false).unwrap();
    let parts = alias.compile_script("$static_root/assets/");
    assert_eq!(parts[0].final_value().as_deref(), Some("/srv/static"));
    assert!(parts[0].must_startswith('/'));

    let proxy_pass = assets.some("proxy_pass", false).unwrap();
    let backend = &proxy_pass.compile_script("$backend")[0];
    assert_eq!(backend.final_value(), None);
    match &backend.value {
        VariableValue::Entries(entries) => {
            assert_eq!(entries.len(), 3);
            assert_eq!(entries[1].final_value().as_deref(), Some("app1"));
            assert_eq!(entries[2].ctx.as_deref(), Some(r"~^(?<sub>[a-z]+)\.example\.com$"));
        }
        other => panic!("unexpected value {other:?}"),
    }
    assert!(backend.can_startswith('a'));
}

#[test]
fn test_if_capture_is_bounded_by_source_variable() {
    let tree = parse(CONFIG);
    let condition = tree.root().find_recursive("if")[0];
    let variables = condition.variables();
    assert_eq!(variables.len(), 1);

    let host = &variables[0];
    assert_eq!(host.name(), Some("1"));
    assert!(host.boundary.is_some());
    assert!(host.can_contain('/'));
    assert!(!host.can_contain('\r'));

    let set = condition.some("set", false).unwrap();
    let resolved = set.resolve_variable("$1").unwrap();
    assert_eq!(resolved.provider, Some(condition.id()));
}

#[test]
fn test_unknown_reference_is_opaque() {
    let tree = parse("server { return 200 $undefined_thing; }");
    let ret = tree.root().find_recursive("return")[0];
    let parts = ret.compile_script("$undefined_thing");
    assert!(matches!(parts[0].value, VariableValue::Unknown));
    assert_eq!(parts[0].name(), Some("undefined_thing"));
}
