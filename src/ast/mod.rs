//! Directive tree
//!
//! A parsed configuration is an arena of nodes owned by [`Tree`]. Nodes are
//! addressed by [`NodeId`] and queried through the borrowed [`Node`] handle,
//! which carries the scoping rules: which blocks open a new context, which
//! nodes provide variables, and how variable references resolve.

mod block;
mod directive;

pub use block::{GeoBlock, IfCondition, Location, LocationModifier, MapBlock};
pub use directive::{AddHeader, MapEntry, RewriteDirective, SetDirective};

use once_cell::unsync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

use crate::symbolic::{builtins, compile_script_with, RegexpError, Variable, VariableValue};

/// Source location reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub line: usize,
    pub column: Option<usize>,
}

impl SourceLocation {
    pub fn new(file: PathBuf, line: usize) -> Self {
        Self {
            file,
            line,
            column: None,
        }
    }

    pub fn with_column(mut self, column: usize) -> Self {
        self.column = Some(column);
        self
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)?;
        if let Some(column) = self.column {
            write!(f, ":{column}")?;
        }
        Ok(())
    }
}

/// Index of a node inside its [`Tree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Node variants, one per directive or block with special meaning
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Root,
    /// Any block without dedicated handling (`events`, `upstream`, ...)
    Block,
    Http,
    Server,
    Location(Location),
    If(IfCondition),
    Include { file_path: String },
    Map(MapBlock),
    Geo(GeoBlock),
    /// Any directive without dedicated handling
    Directive,
    AddHeader(AddHeader),
    Set(SetDirective),
    Rewrite(RewriteDirective),
    Alias { path: String },
    MapEntry(MapEntry),
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Root => "root",
            NodeKind::Block => "block",
            NodeKind::Http => "http",
            NodeKind::Server => "server",
            NodeKind::Location(_) => "location",
            NodeKind::If(_) => "if",
            NodeKind::Include { .. } => "include",
            NodeKind::Map(_) => "map",
            NodeKind::Geo(_) => "geo",
            NodeKind::Directive => "directive",
            NodeKind::AddHeader(_) => "add_header",
            NodeKind::Set(_) => "set",
            NodeKind::Rewrite(_) => "rewrite",
            NodeKind::Alias { .. } => "alias",
            NodeKind::MapEntry(_) => "map_entry",
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(
            self,
            NodeKind::Root
                | NodeKind::Block
                | NodeKind::Http
                | NodeKind::Server
                | NodeKind::Location(_)
                | NodeKind::If(_)
                | NodeKind::Include { .. }
                | NodeKind::Map(_)
                | NodeKind::Geo(_)
        )
    }

    /// Whether a block opens its own scope. Blocks that do not (`if`,
    /// `include`, `map`, `geo`) are transparent to flat searches.
    pub fn self_context(&self) -> bool {
        self.is_block()
            && !matches!(
                self,
                NodeKind::If(_) | NodeKind::Include { .. } | NodeKind::Map(_) | NodeKind::Geo(_)
            )
    }

    pub fn provides_variables(&self) -> bool {
        match self {
            NodeKind::Location(location) => location.is_regex(),
            NodeKind::If(condition) => condition.is_regex(),
            NodeKind::Map(_) | NodeKind::Geo(_) | NodeKind::Set(_) | NodeKind::Rewrite(_) => true,
            _ => false,
        }
    }
}

/// Storage of one node
#[derive(Debug)]
pub struct NodeData {
    pub name: String,
    pub args: Vec<String>,
    pub kind: NodeKind,
    pub location: Option<SourceLocation>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    variables: OnceCell<Vec<Variable>>,
}

impl NodeData {
    pub fn new(name: impl Into<String>, args: Vec<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            args,
            kind,
            location: None,
            parent: None,
            children: Vec::new(),
            variables: OnceCell::new(),
        }
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

/// Arena of nodes; node 0 is the synthetic root
#[derive(Debug)]
pub struct Tree {
    nodes: Vec<NodeData>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    pub const ROOT: NodeId = NodeId(0);

    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData::new("", Vec::new(), NodeKind::Root)],
        }
    }

    pub fn root(&self) -> Node<'_> {
        self.node(Self::ROOT)
    }

    /// Handle for `id`. Ids come from this tree, so they are always valid.
    pub fn node(&self, id: NodeId) -> Node<'_> {
        Node { tree: self, id }
    }

    /// Number of nodes, the root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Attach `data` as the last child of `parent`
    pub fn append(&mut self, parent: NodeId, mut data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        data.parent = Some(parent);
        self.nodes.push(data);
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Every node in insertion order, root first
    pub fn iter(&self) -> impl Iterator<Item = Node<'_>> + '_ {
        (0..self.nodes.len()).map(move |index| self.node(NodeId(index)))
    }
}

/// Borrowed view of one node with the scoped query API
#[derive(Clone, Copy)]
pub struct Node<'t> {
    tree: &'t Tree,
    id: NodeId,
}

impl PartialEq for Node<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && std::ptr::eq(self.tree, other.tree)
    }
}

impl Eq for Node<'_> {}

impl std::fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("args", &self.args())
            .finish()
    }
}

impl<'t> Node<'t> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tree(&self) -> &'t Tree {
        self.tree
    }

    pub fn data(&self) -> &'t NodeData {
        &self.tree.nodes[self.id.0]
    }

    pub fn name(&self) -> &'t str {
        &self.data().name
    }

    pub fn args(&self) -> &'t [String] {
        &self.data().args
    }

    pub fn kind(&self) -> &'t NodeKind {
        &self.data().kind
    }

    pub fn location(&self) -> Option<&'t SourceLocation> {
        self.data().location.as_ref()
    }

    pub fn line(&self) -> Option<usize> {
        self.location().map(|location| location.line)
    }

    pub fn is_block(&self) -> bool {
        self.kind().is_block()
    }

    pub fn self_context(&self) -> bool {
        self.kind().self_context()
    }

    pub fn provides_variables(&self) -> bool {
        self.kind().provides_variables()
    }

    pub fn parent(&self) -> Option<Node<'t>> {
        self.data().parent.map(|id| self.tree.node(id))
    }

    /// Ancestors, nearest first, ending at the root
    pub fn parents(&self) -> impl Iterator<Item = Node<'t>> {
        std::iter::successors(self.parent(), |node| node.parent())
    }

    pub fn children(&self) -> impl Iterator<Item = Node<'t>> + 't {
        let tree = self.tree;
        self.data()
            .children
            .iter()
            .map(move |&id| tree.node(id))
    }

    /// First child named `name`. With `flat`, blocks that do not open their
    /// own context (`if`, `include`, `map`, `geo`) are searched too.
    pub fn some(&self, name: &str, flat: bool) -> Option<Node<'t>> {
        for child in self.children() {
            if child.name() == name {
                return Some(child);
            }
            if flat && child.is_block() && !child.self_context() {
                if let Some(found) = child.some(name, flat) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// All children named `name`, in document order. With `flat`, the
    /// search descends through every transparent block but never into a
    /// nested `server` or `location`.
    pub fn find(&self, name: &str, flat: bool) -> Vec<Node<'t>> {
        let mut found = Vec::new();
        self.collect(name, flat, &mut found);
        found
    }

    fn collect(&self, name: &str, flat: bool, found: &mut Vec<Node<'t>>) {
        for child in self.children() {
            if child.name() == name {
                found.push(child);
            }
            if flat && child.is_block() && !child.self_context() {
                child.collect(name, flat, found);
            }
        }
    }

    /// All descendants named `name`, regardless of scope
    pub fn find_recursive(&self, name: &str) -> Vec<Node<'t>> {
        let mut found = Vec::new();
        self.collect_recursive(name, &mut found);
        found
    }

    fn collect_recursive(&self, name: &str, found: &mut Vec<Node<'t>>) {
        for child in self.children() {
            if child.name() == name {
                found.push(child);
            }
            if child.is_block() {
                child.collect_recursive(name, found);
            }
        }
    }

    /// Variables this node provides. Computed on first access.
    pub fn variables(&self) -> &'t [Variable] {
        self.data()
            .variables
            .get_or_init(|| match self.compute_variables() {
                Ok(variables) => variables,
                Err(e) => {
                    warn!(
                        "Skipping variables of {} at {}: {}",
                        self.name(),
                        self.describe_location(),
                        e
                    );
                    Vec::new()
                }
            })
    }

    fn compute_variables(&self) -> Result<Vec<Variable>, RegexpError> {
        match self.kind() {
            NodeKind::Location(location) => location.variables(self.id),
            NodeKind::If(condition) => condition.variables(self.id),
            NodeKind::Set(set) => Ok(set.variables(self.id)),
            NodeKind::Rewrite(rewrite) => rewrite.variables(self.id),
            NodeKind::Map(map) => Ok(vec![block::hash_variable(
                &map.variable,
                self.hash_entries(),
                self.id,
            )]),
            NodeKind::Geo(geo) => Ok(vec![block::hash_variable(
                &geo.variable,
                self.hash_entries(),
                self.id,
            )]),
            _ => Ok(Vec::new()),
        }
    }

    /// Entries of a `map`/`geo` block, looking through include nodes
    fn hash_entries(&self) -> Vec<Variable> {
        let is_geo = matches!(self.kind(), NodeKind::Geo(_));
        let mut entries = Vec::new();
        let mut pending: Vec<Node<'t>> = self.children().collect();
        pending.reverse();

        while let Some(node) = pending.pop() {
            match node.kind() {
                NodeKind::MapEntry(entry) if is_geo => entries.push(
                    Variable::new(
                        entry.src_val.clone(),
                        VariableValue::Literal(entry.dest_val.clone().unwrap_or_default()),
                    )
                    .with_provider(node.id)
                    .with_ctx(entry.src_val.clone()),
                ),
                NodeKind::MapEntry(entry) => match entry.as_variable(node.id) {
                    Ok(variable) => entries.push(variable),
                    Err(e) => warn!(
                        "Skipping map entry {:?} at {}: {}",
                        entry.src_val,
                        node.describe_location(),
                        e
                    ),
                },
                NodeKind::Include { .. } => {
                    let mut nested: Vec<Node<'t>> = node.children().collect();
                    nested.reverse();
                    pending.extend(nested);
                }
                _ => {}
            }
        }
        entries
    }

    /// Look `name` up the way nginx would at this node: the node's own
    /// `rewrite` captures, then in each enclosing scope the latest `set` or
    /// `rewrite` before this node, any `map`/`geo`, and the captures of a
    /// regex `location`/`if`. Built-ins come last.
    pub fn resolve_variable(&self, name: &str) -> Option<Variable> {
        let name = name.trim_start_matches('$');
        if matches!(self.kind(), NodeKind::Rewrite(_)) {
            if let Some(found) = self.own_variable(name) {
                return Some(found);
            }
        }

        let mut anchor = (!self.is_block()).then_some(self.id);
        let scopes = std::iter::once(*self)
            .filter(Node::is_block)
            .chain(self.parents());

        for scope in scopes {
            if let Some(found) = scope.scoped_definition(name, anchor) {
                return Some(found);
            }
            if matches!(scope.kind(), NodeKind::Location(_) | NodeKind::If(_)) {
                if let Some(found) = scope.own_variable(name) {
                    return Some(found);
                }
            }
            anchor = Some(scope.id);
        }
        builtins::lookup(name)
    }

    fn own_variable(&self, name: &str) -> Option<Variable> {
        self.variables()
            .iter()
            .find(|v| v.name() == Some(name))
            .cloned()
    }

    /// Definition of `name` visible in this scope from its child `before`
    /// (every child when `None`)
    fn scoped_definition(&self, name: &str, before: Option<NodeId>) -> Option<Variable> {
        let mut latest = None;
        let mut hashed = None;
        self.collect_definitions(name, before, false, &mut latest, &mut hashed);
        latest.or(hashed)
    }

    /// `set`/`rewrite` count only before `before`; `map`/`geo` apply anywhere
    fn collect_definitions(
        &self,
        name: &str,
        before: Option<NodeId>,
        hashes_only: bool,
        latest: &mut Option<Variable>,
        hashed: &mut Option<Variable>,
    ) {
        let mut preceding = !hashes_only;
        for child in self.children() {
            if Some(child.id) == before {
                preceding = false;
                continue;
            }
            match child.kind() {
                NodeKind::Set(_) | NodeKind::Rewrite(_) if preceding => {
                    if let Some(found) = child.own_variable(name) {
                        *latest = Some(found);
                    }
                }
                NodeKind::Map(_) | NodeKind::Geo(_) if hashed.is_none() => {
                    *hashed = child.own_variable(name);
                }
                NodeKind::Include { .. } | NodeKind::If(_) => {
                    child.collect_definitions(name, None, !preceding, latest, hashed);
                }
                _ => {}
            }
        }
    }

    /// [`compile_script`](crate::symbolic::compile_script) with references
    /// resolved in this node's scope
    pub fn compile_script(&self, script: &str) -> Vec<Variable> {
        compile_script_with(script, |name| self.resolve_variable(name))
    }

    pub fn as_location(&self) -> Option<&'t Location> {
        match self.kind() {
            NodeKind::Location(location) => Some(location),
            _ => None,
        }
    }

    pub fn as_if(&self) -> Option<&'t IfCondition> {
        match self.kind() {
            NodeKind::If(condition) => Some(condition),
            _ => None,
        }
    }

    pub fn as_map_entry(&self) -> Option<&'t MapEntry> {
        match self.kind() {
            NodeKind::MapEntry(entry) => Some(entry),
            _ => None,
        }
    }

    /// `internal;` present in this location
    pub fn is_internal(&self) -> bool {
        self.as_location().is_some() && self.some("internal", true).is_some()
    }

    /// `server_name` directives of a server block
    pub fn server_names(&self) -> Vec<Node<'t>> {
        match self.kind() {
            NodeKind::Server => self.find("server_name", true),
            _ => Vec::new(),
        }
    }

    fn describe_location(&self) -> String {
        self.location()
            .map_or_else(|| "<unknown>".to_string(), ToString::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn directive(name: &str, values: &[&str]) -> NodeData {
        NodeData::new(name, args(values), NodeKind::Directive)
    }

    #[test]
    fn test_append_links_parent() {
        let mut tree = Tree::new();
        let http = tree.append(Tree::ROOT, NodeData::new("http", vec![], NodeKind::Http));
        let gzip = tree.append(http, directive("gzip", &["on"]));

        let node = tree.node(gzip);
        assert_eq!(node.parent().map(|p| p.id()), Some(http));
        assert_eq!(tree.root().children().count(), 1);
        let chain: Vec<NodeId> = node.parents().map(|p| p.id()).collect();
        assert_eq!(chain, vec![http, Tree::ROOT]);
    }

    #[test]
    fn test_flat_find_stops_at_self_context() {
        let mut tree = Tree::new();
        let server = tree.append(Tree::ROOT, NodeData::new("server", vec![], NodeKind::Server));
        tree.append(server, directive("add_header", &["X-A", "1"]));
        let cond = IfCondition::from_args(&args(&["$slow"])).unwrap();
        let if_block = tree.append(server, NodeData::new("if", args(&["$slow"]), NodeKind::If(cond)));
        tree.append(if_block, directive("add_header", &["X-B", "1"]));
        let location = Location::from_args(&args(&["/"])).unwrap();
        let loc = tree.append(
            server,
            NodeData::new("location", args(&["/"]), NodeKind::Location(location)),
        );
        tree.append(loc, directive("add_header", &["X-C", "1"]));

        let server = tree.node(server);
        let flat: Vec<&str> = server
            .find("add_header", true)
            .iter()
            .map(|n| n.args()[0].as_str())
            .collect();
        assert_eq!(flat, vec!["X-A", "X-B"]);
        assert_eq!(server.find("add_header", false).len(), 1);
        assert_eq!(server.find_recursive("add_header").len(), 3);
        assert_eq!(
            server.some("add_header", true).map(|n| n.args()[0].as_str()),
            Some("X-A")
        );
    }

    #[test]
    fn test_variables_are_cached() {
        let mut tree = Tree::new();
        let location = Location::from_args(&args(&["~", "^/(a)/(b)$"])).unwrap();
        let id = tree.append(
            Tree::ROOT,
            NodeData::new("location", args(&["~", "^/(a)/(b)$"]), NodeKind::Location(location)),
        );
        let node = tree.node(id);
        let first = node.variables().as_ptr();
        assert_eq!(node.variables().len(), 2);
        assert_eq!(first, node.variables().as_ptr());
    }

    #[test]
    fn test_resolve_variable_prefers_enclosing_capture() {
        let mut tree = Tree::new();
        let server = tree.append(Tree::ROOT, NodeData::new("server", vec![], NodeKind::Server));
        let set = SetDirective::from_args(&args(&["$target", "/static"])).unwrap();
        tree.append(server, NodeData::new("set", args(&["$target", "/static"]), NodeKind::Set(set)));
        let location = Location::from_args(&args(&["~", "^/files/(.*)$"])).unwrap();
        let loc = tree.append(
            server,
            NodeData::new("location", args(&["~", "^/files/(.*)$"]), NodeKind::Location(location)),
        );
        let alias = tree.append(
            loc,
            NodeData::new(
                "alias",
                args(&["/var/www/$1"]),
                NodeKind::Alias { path: "/var/www/$1".into() },
            ),
        );

        let alias = tree.node(alias);
        let parts = alias.compile_script("/var/www/$1$target$uri$nope");
        assert_eq!(parts.len(), 5);
        assert!(parts[1].can_contain('/'));
        assert_eq!(parts[1].provider, Some(loc));
        assert_eq!(parts[2].final_value().as_deref(), Some("/static"));
        assert!(parts[3].capture().is_some());
        assert!(matches!(parts[4].value, VariableValue::Unknown));
    }

    fn parse(input: &str) -> Tree {
        crate::parser::NginxParser::default().parse(input, None).unwrap()
    }

    #[test]
    fn test_rewrite_captures_resolve() {
        let tree = parse(
            "server {\n    rewrite ^/old/(.*)$ /new/$1 last;\n    return 301 /moved/$1;\n}",
        );
        let rewrite = tree.root().find_recursive("rewrite")[0];
        let parts = rewrite.compile_script("/new/$1");
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].provider, Some(rewrite.id()));
        assert!(parts[1].can_contain('/'));

        let ret = tree.root().find_recursive("return")[0];
        let parts = ret.compile_script("/moved/$1");
        assert_eq!(parts[1].provider, Some(rewrite.id()));
        assert!(!matches!(parts[1].value, VariableValue::Unknown));
    }

    #[test]
    fn test_latest_preceding_set_wins() {
        let tree = parse(
            "server {\n    set $a one;\n    return 200 $a;\n    set $a two;\n    location / {\n        return 200 $a;\n    }\n    set $a three;\n}",
        );
        let returns = tree.root().find_recursive("return");
        let first = returns[0].resolve_variable("$a").unwrap();
        assert_eq!(first.final_value().as_deref(), Some("one"));
        let nested = returns[1].resolve_variable("$a").unwrap();
        assert_eq!(nested.final_value().as_deref(), Some("two"));
    }

    #[test]
    fn test_map_visible_regardless_of_position() {
        let tree = parse("http {\n    server { return 200 $m; }\n    map $host $m { default x; }\n}");
        let ret = tree.root().find_recursive("return")[0];
        let found = ret.resolve_variable("m").unwrap();
        assert!(matches!(found.value, VariableValue::Entries(_)));
    }

    #[test]
    fn test_invalid_location_regex_has_no_variables() {
        let tree = parse(r"location ~ ^/(a)\99999999999999999999999 { }");
        let location = tree.root().some("location", false).unwrap();
        assert!(location.variables().is_empty());
    }
}
