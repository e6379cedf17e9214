//! nginx configuration tree builder

use super::grammar::{locate_problem, parse_records, Record, RecordKind};
use super::lexer::decode_config;
use super::{Diagnostics, ParseError, ParseOptions, Registry, WarningKind};
use crate::ast::{MapEntry, NodeData, NodeId, NodeKind, SourceLocation, Tree};
use glob::glob;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Label used for configuration text that did not come from a file
const STRING_SOURCE: &str = "<string>";

/// Files of an `nginx -T` dump, in dump order
type DumpFiles = Vec<(String, Vec<Record>)>;

/// One parse session: options, include state and collected warnings
pub struct NginxParser {
    options: ParseOptions,
    registry: Registry,
    /// Directory relative include patterns are resolved against
    cwd: PathBuf,
    /// Set once the input turned out to be a configuration dump
    dump: Option<DumpFiles>,
    /// Files currently being expanded, outermost first
    path_stack: Vec<String>,
    diagnostics: Diagnostics,
}

impl Default for NginxParser {
    fn default() -> Self {
        Self::new(ParseOptions::default())
    }
}

impl NginxParser {
    pub fn new(options: ParseOptions) -> Self {
        Self::with_registry(options, Registry::builtin())
    }

    pub fn with_registry(options: ParseOptions, registry: Registry) -> Self {
        Self {
            cwd: options.cwd.clone(),
            options,
            registry,
            dump: None,
            path_stack: Vec::new(),
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Diagnostics {
        std::mem::take(&mut self.diagnostics)
    }

    /// Whether the last input was an `nginx -T` dump
    pub fn is_dump(&self) -> bool {
        self.dump.is_some()
    }

    /// Read, decode and parse a configuration file
    pub fn parse_file(&mut self, path: &Path) -> Result<Tree, ParseError> {
        let bytes = fs::read(path)?;
        let content = decode_config(&bytes);
        self.parse(&content, Some(&path.to_string_lossy()))
    }

    /// Parse configuration text into a fresh tree
    pub fn parse(&mut self, content: &str, path_info: Option<&str>) -> Result<Tree, ParseError> {
        let mut tree = Tree::new();
        self.parse_into(&mut tree, Tree::ROOT, content, path_info)?;
        Ok(tree)
    }

    /// Parse configuration text and append the result under `parent`
    pub fn parse_into(
        &mut self,
        tree: &mut Tree,
        parent: NodeId,
        content: &str,
        path_info: Option<&str>,
    ) -> Result<(), ParseError> {
        self.parse_scoped(tree, parent, content, path_info, false)
    }

    /// [`parse_into`](Self::parse_into) for content spliced into a scope;
    /// `in_hash` makes every statement an entry of the enclosing `map`/`geo`
    fn parse_scoped(
        &mut self,
        tree: &mut Tree,
        parent: NodeId,
        content: &str,
        path_info: Option<&str>,
        in_hash: bool,
    ) -> Result<(), ParseError> {
        let file = path_info.unwrap_or(STRING_SOURCE).to_string();
        debug!("Parsing {}", file);

        let records = parse_records(content).map_err(|e| {
            error!("Failed to parse config \"{}\": {}", file, e);
            ParseError::syntax(&file, e)
        })?;

        let starts_dump = records
            .first()
            .is_some_and(|record| record.kind == RecordKind::FileDelimiter);
        let (file, records) = if starts_dump && self.path_stack.is_empty() {
            info!("Switched to parse nginx configuration dump.");
            self.prepare_dump(records).unwrap_or((file, Vec::new()))
        } else {
            (file, records)
        };

        self.path_stack.push(file.clone());
        self.build(tree, parent, &records, &file, in_hash);
        self.path_stack.pop();
        Ok(())
    }

    /// Split a dump into its files; returns the root file and its records
    fn prepare_dump(&mut self, records: Vec<Record>) -> Option<(String, Vec<Record>)> {
        let mut files: DumpFiles = Vec::new();
        let mut current = 0;

        for record in records {
            if record.kind == RecordKind::FileDelimiter {
                current = match files.iter().position(|(name, _)| *name == record.name) {
                    Some(index) => {
                        files[index].1.clear();
                        index
                    }
                    None => {
                        files.push((record.name, Vec::new()));
                        files.len() - 1
                    }
                };
            } else if let Some((_, body)) = files.get_mut(current) {
                body.push(record);
            }
        }

        let (root, records) = files.first().cloned()?;
        self.cwd = Path::new(&root)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        self.dump = Some(files);
        Some((root, records))
    }

    fn build(
        &mut self,
        tree: &mut Tree,
        parent: NodeId,
        records: &[Record],
        file: &str,
        in_hash: bool,
    ) {
        for record in records {
            let args: Vec<String> = record.args.iter().map(|a| a.trim().to_string()).collect();
            let location =
                SourceLocation::new(PathBuf::from(file), record.line).with_column(record.column);

            match record.kind {
                RecordKind::Comment | RecordKind::FileDelimiter => {}
                RecordKind::Include => {
                    self.resolve_include(tree, parent, &args, file, location, in_hash);
                }
                RecordKind::UnparsedBlock => self.skip_unparsed(record, file, location),
                RecordKind::Block => {
                    let kind = self.construct(true, &record.name, &args, &location);
                    let opens_hash = matches!(kind, NodeKind::Map(_) | NodeKind::Geo(_));
                    let data = NodeData::new(record.name.trim(), args, kind).with_location(location);
                    let id = tree.append(parent, data);
                    self.build(tree, id, &record.children, file, opens_hash);
                }
                RecordKind::Directive | RecordKind::HashValue => {
                    let name = record.name.trim();
                    let kind = if in_hash {
                        NodeKind::MapEntry(MapEntry::from_args(name, &args))
                    } else if record.kind == RecordKind::Directive {
                        self.construct(false, name, &args, &location)
                    } else {
                        NodeKind::Directive
                    };
                    tree.append(parent, NodeData::new(name, args, kind).with_location(location));
                }
            }
        }
    }

    /// Typed variant from the registry, or the generic one with a warning
    fn construct(
        &mut self,
        block: bool,
        name: &str,
        args: &[String],
        location: &SourceLocation,
    ) -> NodeKind {
        let result = if block {
            self.registry.block(name, args)
        } else {
            self.registry.directive(name, args)
        };
        result.unwrap_or_else(|reason| {
            self.diagnostics.warn(
                WarningKind::InvalidDirective,
                format!("Invalid \"{}\" at {}: {}", name, location, reason),
                Some(location.clone()),
            );
            if block {
                NodeKind::Block
            } else {
                NodeKind::Directive
            }
        })
    }

    fn skip_unparsed(&mut self, record: &Record, file: &str, location: SourceLocation) {
        self.diagnostics.warn(
            WarningKind::UnparsedBlock,
            format!(
                "Skipped RAW block \"{}\" at {}: its body could not be parsed",
                record.name, location
            ),
            Some(location),
        );

        if let Some(problem) = record.raw_body.as_deref().and_then(locate_problem) {
            let line = record.line + problem.line - 1;
            let near = SourceLocation::new(PathBuf::from(file), line).with_column(problem.column);
            self.diagnostics.warn(
                WarningKind::UnparsedBlock,
                format!("Problem near {}: {:?}", near, problem.snippet),
                Some(near),
            );
        }
    }

    fn resolve_include(
        &mut self,
        tree: &mut Tree,
        parent: NodeId,
        args: &[String],
        file: &str,
        location: SourceLocation,
        in_hash: bool,
    ) {
        let Some(pattern) = args.first() else {
            self.diagnostics.warn(
                WarningKind::InvalidDirective,
                format!("Include without a path at {}", location),
                Some(location),
            );
            return;
        };

        if self.dump.is_none() && !self.options.allow_includes {
            debug!("Includes are disabled, skipping \"{}\" at {}", pattern, location);
            return;
        }

        // the root file is on the stack too
        if self.path_stack.len() > self.options.max_include_depth {
            self.diagnostics.warn(
                WarningKind::IncludeDepth,
                format!(
                    "Skipping include \"{}\" at {}: maximum include depth ({}) exceeded",
                    pattern, location, self.options.max_include_depth
                ),
                Some(location),
            );
            return;
        }

        if self.dump.is_some() {
            self.include_from_dump(tree, parent, pattern, location, in_hash);
        } else {
            self.include_from_fs(tree, parent, pattern, file, location, in_hash);
        }
    }

    fn include_from_fs(
        &mut self,
        tree: &mut Tree,
        parent: NodeId,
        pattern: &str,
        file: &str,
        location: SourceLocation,
        in_hash: bool,
    ) {
        let full_pattern = self.cwd.join(pattern).to_string_lossy().into_owned();
        let mut paths: Vec<PathBuf> = match glob(&full_pattern) {
            Ok(paths) => paths.filter_map(Result::ok).collect(),
            Err(e) => {
                self.diagnostics.warn(
                    WarningKind::IncludeFailed,
                    format!("Invalid include pattern \"{}\" at {}: {}", full_pattern, location, e),
                    Some(location),
                );
                return;
            }
        };
        // Sort for consistent ordering
        paths.sort();

        if paths.is_empty() {
            self.diagnostics.warn(
                WarningKind::IncludeNotFound,
                format!("Included file \"{}\" not found from \"{}\"", full_pattern, file),
                Some(location),
            );
            return;
        }

        for path in paths {
            let label = path.to_string_lossy().into_owned();

            if !path.exists() {
                self.diagnostics.warn(
                    WarningKind::IncludeNotFound,
                    format!("Included file \"{}\" vanished before it could be read", label),
                    Some(location.clone()),
                );
                continue;
            }
            if !path.is_file() {
                self.diagnostics.warn(
                    WarningKind::IncludeFailed,
                    format!("Included path \"{}\" is not a regular file", label),
                    Some(location.clone()),
                );
                continue;
            }
            if self.path_stack.contains(&label) {
                self.diagnostics.warn(
                    WarningKind::IncludeCycle,
                    format!("Include cycle: \"{}\" is already being parsed", label),
                    Some(location.clone()),
                );
                continue;
            }

            let content = match fs::read(&path) {
                Ok(bytes) => decode_config(&bytes),
                Err(e) => {
                    self.diagnostics.warn(
                        WarningKind::IncludeFailed,
                        format!("Unable to read included file \"{}\": {}", label, e),
                        Some(location.clone()),
                    );
                    continue;
                }
            };

            if let Err(e) = self.parse_scoped(tree, parent, &content, Some(&label), in_hash) {
                self.diagnostics.warn(
                    WarningKind::IncludeFailed,
                    format!("Failed to parse included file \"{}\": {}", label, e),
                    Some(location.clone()),
                );
            }
        }
    }

    fn include_from_dump(
        &mut self,
        tree: &mut Tree,
        parent: NodeId,
        pattern: &str,
        location: SourceLocation,
        in_hash: bool,
    ) {
        let full_pattern = self.cwd.join(pattern).to_string_lossy().into_owned();
        let matcher = match glob::Pattern::new(&full_pattern) {
            Ok(matcher) => matcher,
            Err(e) => {
                self.diagnostics.warn(
                    WarningKind::IncludeFailed,
                    format!("Invalid include pattern \"{}\" at {}: {}", full_pattern, location, e),
                    Some(location),
                );
                return;
            }
        };

        let matched: DumpFiles = self
            .dump
            .iter()
            .flatten()
            .filter(|(name, _)| matcher.matches(name))
            .cloned()
            .collect();

        if matched.is_empty() {
            self.diagnostics.warn(
                WarningKind::IncludeNotFound,
                format!("Included file \"{}\" is not part of the dump", full_pattern),
                Some(location),
            );
            return;
        }

        for (name, records) in matched {
            if self.path_stack.contains(&name) {
                self.diagnostics.warn(
                    WarningKind::IncludeCycle,
                    format!("Include cycle: \"{}\" is already being parsed", name),
                    Some(location.clone()),
                );
                continue;
            }

            let data = NodeData::new(
                "include",
                vec![name.clone()],
                NodeKind::Include {
                    file_path: name.clone(),
                },
            )
            .with_location(location.clone());
            let id = tree.append(parent, data);

            self.path_stack.push(name.clone());
            self.build(tree, id, &records, &name, in_hash);
            self.path_stack.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn parse(input: &str) -> (Tree, Diagnostics) {
        let mut parser = NginxParser::default();
        let tree = parser.parse(input, None).unwrap();
        (tree, parser.take_diagnostics())
    }

    #[test]
    fn test_parse_simple_directive() {
        let (tree, diagnostics) = parse("worker_processes 4;");
        let root = tree.root();
        let children: Vec<_> = root.children().collect();

        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name(), "worker_processes");
        assert_eq!(children[0].args(), ["4"]);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_parse_nested_blocks() {
        let input = r#"
            http {
                server {
                    location / {
                        proxy_pass http://backend;
                    }
                }
            }
        "#;
        let (tree, _) = parse(input);

        let http = tree.root().some("http", false).unwrap();
        assert_eq!(http.kind(), &NodeKind::Http);
        assert_eq!(http.line(), Some(2));

        let server = http.some("server", false).unwrap();
        let location = server.some("location", false).unwrap();
        assert_eq!(location.as_location().unwrap().path, "/");
        assert_eq!(location.line(), Some(4));

        let proxy_pass = location.some("proxy_pass", false).unwrap();
        assert_eq!(proxy_pass.parent(), Some(location));
    }

    #[test]
    fn test_location_regex_variables() {
        let (tree, _) = parse("location ~ ^/files/(.*)$ { alias /var/www/$1; }");
        let location = tree.root().some("location", false).unwrap();
        let loc = location.as_location().unwrap();
        assert_eq!(loc.modifier, Some(crate::ast::LocationModifier::Regex));

        let variables = location.variables();
        assert_eq!(variables.len(), 1);
        assert_eq!(variables[0].name(), Some("1"));
        assert!(variables[0].can_contain('/'));
        assert!(variables[0].can_contain('.'));

        let alias = location.some("alias", false).unwrap();
        assert!(matches!(alias.kind(), NodeKind::Alias { path } if path == "/var/www/$1"));
    }

    #[test]
    fn test_single_argument_if() {
        let (tree, _) = parse("if ($slow) { limit_rate 10k; }");
        let node = tree.root().some("if", false).unwrap();
        let condition = node.as_if().unwrap();
        assert_eq!(condition.variable.as_deref(), Some("$slow"));
        assert_eq!(condition.operand, None);
        assert_eq!(condition.value, None);
        assert!(!condition.is_regex());
        assert!(node.variables().is_empty());
    }

    #[test]
    fn test_map_entries_and_variable() {
        let input = "map $uri $new {\n    default 0;\n    /old /new;\n    ~*^/a/(.*) /b/$1;\n}";
        let (tree, _) = parse(input);
        let map = tree.root().some("map", false).unwrap();
        let entries: Vec<_> = map.children().collect();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.as_map_entry().is_some()));
        assert!(entries[2].as_map_entry().unwrap().is_regex);

        let variables = map.variables();
        assert_eq!(variables.len(), 1);
        assert_eq!(variables[0].name(), Some("new"));
        match &variables[0].value {
            crate::symbolic::VariableValue::Entries(values) => assert_eq!(values.len(), 3),
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn test_malformed_map_falls_back() {
        let (tree, diagnostics) = parse("map $only { default 0; }");
        let node = tree.root().some("map", false).unwrap();
        assert_eq!(node.kind(), &NodeKind::Block);
        assert_eq!(diagnostics.count(WarningKind::InvalidDirective), 1);
    }

    #[test]
    fn test_unparsed_block_is_skipped() {
        let (tree, diagnostics) =
            parse("server {\n    content_by_lua_block {\n        ngx.say(1)\n    }\n    listen 80;\n}");
        let server = tree.root().some("server", false).unwrap();
        let names: Vec<&str> = server.children().map(|c| c.name()).collect();
        assert_eq!(names, vec!["listen"]);
        assert_eq!(diagnostics.count(WarningKind::UnparsedBlock), 2);
        assert_eq!(diagnostics.warnings[1].location.as_ref().unwrap().line, 3);
    }

    #[test]
    fn test_syntax_error_is_fatal() {
        let mut parser = NginxParser::default();
        let err = parser.parse("http {\n", Some("broken.conf")).unwrap_err();
        assert!(matches!(err, ParseError::Syntax { line: 1, .. }));
    }

    #[test]
    fn test_include_without_matches() {
        let dir = TempDir::new().unwrap();
        let mut parser = NginxParser::new(ParseOptions {
            cwd: dir.path().to_path_buf(),
            ..Default::default()
        });
        let tree = parser.parse("include sites/*.conf;", None).unwrap();
        assert!(tree.is_empty());
        assert_eq!(parser.diagnostics().count(WarningKind::IncludeNotFound), 1);
    }

    #[test]
    fn test_includes_disabled() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.conf"), "gzip on;").unwrap();
        let mut parser = NginxParser::new(ParseOptions {
            cwd: dir.path().to_path_buf(),
            allow_includes: false,
            ..Default::default()
        });
        let tree = parser.parse("include a.conf;\nworker_processes 1;", None).unwrap();
        let names: Vec<&str> = tree.root().children().map(|c| c.name()).collect();
        assert_eq!(names, vec!["worker_processes"]);
        assert!(parser.diagnostics().is_empty());
    }

    #[test]
    fn test_glob_include_sorted() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("conf.d")).unwrap();
        fs::write(dir.path().join("conf.d/b.conf"), "b_directive 2;").unwrap();
        fs::write(dir.path().join("conf.d/a.conf"), "a_directive 1;").unwrap();
        let mut parser = NginxParser::new(ParseOptions {
            cwd: dir.path().to_path_buf(),
            ..Default::default()
        });
        let tree = parser
            .parse("http {\n    include conf.d/*.conf;\n}", None)
            .unwrap();
        let http = tree.root().some("http", false).unwrap();
        let names: Vec<&str> = http.children().map(|c| c.name()).collect();
        assert_eq!(names, vec!["a_directive", "b_directive"]);
        let a = http.some("a_directive", false).unwrap();
        assert!(a.location().unwrap().file.ends_with("conf.d/a.conf"));
    }

    #[test]
    fn test_include_cycle_terminates() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("self.conf"), "keepalive_timeout 5;\ninclude self.conf;").unwrap();
        let mut parser = NginxParser::new(ParseOptions {
            cwd: dir.path().to_path_buf(),
            ..Default::default()
        });
        let tree = parser.parse("include self.conf;", None).unwrap();
        assert_eq!(tree.root().find("keepalive_timeout", false).len(), 1);
        assert_eq!(parser.diagnostics().count(WarningKind::IncludeCycle), 1);
    }

    #[test]
    fn test_include_depth_limit() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.conf"), "include b.conf;").unwrap();
        fs::write(dir.path().join("b.conf"), "deep on;").unwrap();
        let mut parser = NginxParser::new(ParseOptions {
            cwd: dir.path().to_path_buf(),
            max_include_depth: 1,
            ..Default::default()
        });
        let tree = parser.parse("include a.conf;", None).unwrap();
        assert!(tree.root().some("deep", true).is_none());
        assert_eq!(parser.diagnostics().count(WarningKind::IncludeDepth), 1);
    }

    #[test]
    fn test_broken_include_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken.conf"), "server {").unwrap();
        let mut parser = NginxParser::new(ParseOptions {
            cwd: dir.path().to_path_buf(),
            ..Default::default()
        });
        let tree = parser.parse("include broken.conf;\nuser nginx;", None).unwrap();
        assert!(tree.root().some("user", false).is_some());
        assert_eq!(parser.diagnostics().count(WarningKind::IncludeFailed), 1);
    }

    #[test]
    fn test_dump_mode() {
        let dump = "# configuration file /etc/nginx/nginx.conf:\n\
                    user nginx;\n\
                    http {\n    include conf.d/*.conf;\n}\n\
                    \n\
                    # configuration file /etc/nginx/conf.d/a.conf:\n\
                    server {\n    listen 80;\n}\n";
        let mut parser = NginxParser::default();
        let tree = parser.parse(dump, None).unwrap();
        assert!(parser.is_dump());

        let user = tree.root().some("user", false).unwrap();
        assert_eq!(
            user.location().unwrap().file,
            PathBuf::from("/etc/nginx/nginx.conf")
        );

        let http = tree.root().some("http", false).unwrap();
        let include = http.some("include", false).unwrap();
        assert!(matches!(
            include.kind(),
            NodeKind::Include { file_path } if file_path == "/etc/nginx/conf.d/a.conf"
        ));
        let wrapped: Vec<&str> = include.children().map(|c| c.name()).collect();
        assert_eq!(wrapped, vec!["server"]);
        assert_eq!(http.some("listen", true), None);
        assert!(http.some("server", true).is_some());
    }

    #[test]
    fn test_dump_include_inside_map() {
        let dump = "# configuration file /etc/nginx/nginx.conf:\n\
                    map $host $backend {\n    include maps/hosts.map;\n}\n\
                    # configuration file /etc/nginx/maps/hosts.map:\n\
                    example.com app1;\n\
                    default app0;\n";
        let mut parser = NginxParser::default();
        let tree = parser.parse(dump, None).unwrap();
        let map = tree.root().some("map", false).unwrap();
        let include = map.some("include", false).unwrap();
        assert!(include.children().all(|c| c.as_map_entry().is_some()));

        match &map.variables()[0].value {
            crate::symbolic::VariableValue::Entries(values) => {
                let names: Vec<_> = values.iter().filter_map(|v| v.name()).collect();
                assert_eq!(names, vec!["example.com", "default"]);
            }
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn test_file_include_inside_map() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("hosts.map"), "example.com app1;\n~^/x(.*) app2;\n").unwrap();
        let mut parser = NginxParser::new(ParseOptions {
            cwd: dir.path().to_path_buf(),
            ..Default::default()
        });
        let tree = parser
            .parse("map $host $backend {\n    default app0;\n    include hosts.map;\n}", None)
            .unwrap();

        let map = tree.root().some("map", false).unwrap();
        assert!(map.children().all(|c| c.as_map_entry().is_some()));
        assert!(map.children().nth(2).unwrap().as_map_entry().unwrap().is_regex);

        match &map.variables()[0].value {
            crate::symbolic::VariableValue::Entries(values) => {
                let names: Vec<_> = values.iter().filter_map(|v| v.name()).collect();
                assert_eq!(names, vec!["default", "example.com", "~^/x(.*)"]);
            }
            other => panic!("unexpected value {other:?}"),
        }
    }
}
