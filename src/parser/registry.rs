//! Keyword to node-variant table
//!
//! Keywords with dedicated handling map to a constructor that validates the
//! arguments and builds the typed [`NodeKind`]. Everything else becomes a
//! generic block or directive.

use std::collections::HashMap;

use crate::ast::{
    AddHeader, GeoBlock, IfCondition, Location, MapBlock, NodeKind, RewriteDirective,
    SetDirective,
};

/// Builds a node variant from its arguments, or explains why it cannot
pub type Constructor = fn(&[String]) -> Result<NodeKind, String>;

#[derive(Clone)]
pub struct Registry {
    blocks: HashMap<&'static str, Constructor>,
    directives: HashMap<&'static str, Constructor>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut blocks: Vec<_> = self.blocks.keys().collect();
        let mut directives: Vec<_> = self.directives.keys().collect();
        blocks.sort();
        directives.sort();
        f.debug_struct("Registry")
            .field("blocks", &blocks)
            .field("directives", &directives)
            .finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Registry {
    /// Registry without any keyword; every node is generic
    pub fn empty() -> Self {
        Self {
            blocks: HashMap::new(),
            directives: HashMap::new(),
        }
    }

    /// The keywords this crate understands
    pub fn builtin() -> Self {
        let mut registry = Self::empty();

        registry.register_block("http", |_| Ok(NodeKind::Http));
        registry.register_block("server", |_| Ok(NodeKind::Server));
        registry.register_block("location", |args| {
            Location::from_args(args).map(NodeKind::Location)
        });
        registry.register_block("if", |args| IfCondition::from_args(args).map(NodeKind::If));
        registry.register_block("map", |args| MapBlock::from_args(args).map(NodeKind::Map));
        registry.register_block("geo", |args| GeoBlock::from_args(args).map(NodeKind::Geo));

        registry.register_directive("add_header", |args| {
            AddHeader::from_args(args).map(NodeKind::AddHeader)
        });
        registry.register_directive("set", |args| SetDirective::from_args(args).map(NodeKind::Set));
        registry.register_directive("rewrite", |args| {
            RewriteDirective::from_args(args).map(NodeKind::Rewrite)
        });
        registry.register_directive("alias", |args| match args {
            [path, ..] => Ok(NodeKind::Alias { path: path.clone() }),
            [] => Err("alias expects a path".to_string()),
        });

        registry
    }

    pub fn register_block(&mut self, name: &'static str, constructor: Constructor) {
        self.blocks.insert(name, constructor);
    }

    pub fn register_directive(&mut self, name: &'static str, constructor: Constructor) {
        self.directives.insert(name, constructor);
    }

    /// Variant for a block named `name`; [`NodeKind::Block`] when unknown
    pub fn block(&self, name: &str, args: &[String]) -> Result<NodeKind, String> {
        match self.blocks.get(name) {
            Some(constructor) => constructor(args),
            None => Ok(NodeKind::Block),
        }
    }

    /// Variant for a directive named `name`; [`NodeKind::Directive`] when unknown
    pub fn directive(&self, name: &str, args: &[String]) -> Result<NodeKind, String> {
        match self.directives.get(name) {
            Some(constructor) => constructor(args),
            None => Ok(NodeKind::Directive),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_known_and_unknown() {
        let registry = Registry::builtin();
        assert_eq!(registry.block("http", &[]), Ok(NodeKind::Http));
        assert_eq!(registry.block("events", &[]), Ok(NodeKind::Block));
        assert_eq!(
            registry.directive("listen", &args(&["80"])),
            Ok(NodeKind::Directive)
        );
        assert!(matches!(
            registry.directive("alias", &args(&["/srv/"])),
            Ok(NodeKind::Alias { .. })
        ));
    }

    #[test]
    fn test_constructor_refusal() {
        let registry = Registry::builtin();
        assert!(registry.block("map", &args(&["$host"])).is_err());
        assert!(registry.directive("set", &args(&["$x"])).is_err());
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = Registry::empty();
        assert_eq!(registry.block("server", &[]), Ok(NodeKind::Block));
        registry.register_block("server", |_| Ok(NodeKind::Server));
        assert_eq!(registry.block("server", &[]), Ok(NodeKind::Server));
    }
}
