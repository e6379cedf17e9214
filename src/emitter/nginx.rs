//! nginx configuration output
//!
//! Writes a [`Tree`] back as configuration text. Comments and skipped raw
//! blocks are not part of the tree and are lost; included files are written
//! inline at the place of their `include`.

use crate::ast::{Node, NodeKind, Tree};
use crate::parser::lexer::is_plain_value;
use std::fmt::{self, Write};

/// Options for configuration output
#[derive(Debug, Clone, Default)]
pub struct EmitterOptions {
    /// Add a `# file:line` comment above every block
    pub include_source_refs: bool,
    /// Indent string (default: 4 spaces)
    pub indent: String,
}

/// Emitter for writing a directive tree as nginx configuration
#[derive(Debug, Default)]
pub struct NginxEmitter {
    options: EmitterOptions,
}

impl NginxEmitter {
    pub fn new(options: EmitterOptions) -> Self {
        Self { options }
    }

    /// Emit the whole tree
    pub fn emit(&self, tree: &Tree) -> Result<String, fmt::Error> {
        let mut output = String::new();
        self.emit_children(&mut output, tree.root(), 0)?;
        Ok(output)
    }

    fn indent(&self) -> &str {
        if self.options.indent.is_empty() {
            "    "
        } else {
            &self.options.indent
        }
    }

    fn emit_children(&self, output: &mut String, node: Node<'_>, depth: usize) -> fmt::Result {
        for child in node.children() {
            self.emit_one(output, child, depth)?;
        }
        Ok(())
    }

    fn emit_one(&self, output: &mut String, node: Node<'_>, depth: usize) -> fmt::Result {
        let pad = self.indent().repeat(depth);

        match node.kind() {
            NodeKind::Root => return self.emit_children(output, node, depth),
            // included content takes the place of the include
            NodeKind::Include { .. } => return self.emit_children(output, node, depth),
            _ => {}
        }

        if node.is_block() {
            if self.options.include_source_refs {
                if let Some(location) = node.location() {
                    writeln!(output, "{}# {}", pad, location)?;
                }
            }
            writeln!(output, "{}{} {{", pad, header(node))?;
            self.emit_children(output, node, depth + 1)?;
            writeln!(output, "{}}}", pad)
        } else {
            writeln!(output, "{}{};", pad, header(node))
        }
    }
}

/// Statement text up to the `{` or `;`
fn header(node: Node<'_>) -> String {
    let mut parts = Vec::with_capacity(node.args().len() + 1);
    parts.push(match node.kind() {
        NodeKind::MapEntry(_) => quote_arg(node.name()),
        _ => node.name().to_string(),
    });

    match node.kind() {
        NodeKind::If(_) => {
            let condition: Vec<String> = node.args().iter().map(|a| quote_arg(a)).collect();
            parts.push(format!("({})", condition.join(" ")));
        }
        _ => parts.extend(node.args().iter().map(|a| quote_arg(a))),
    }

    parts.join(" ")
}

/// Argument as it has to be written to parse back to the same text
pub fn quote_arg(value: &str) -> String {
    if is_plain_value(value) {
        value.to_string()
    } else {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    }
}
