//! Profiling call tree as the core sees it.
//!
//! The measurement-archive reader is an external collaborator; this module
//! only defines the read-only shape it hands over, plus a JSON loader for
//! trees exported by such a reader.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Arena slot of a node inside its [`ProfileTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// Instrumented source construct (function, loop, block).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Region {
    /// Raw, possibly mangled symbol.
    pub name: String,
    /// Originating source file as recorded on the measurement machine.
    /// Empty for synthetic regions.
    pub module_path: String,
    /// 1-indexed, inclusive.
    pub begin_line: Option<usize>,
    /// 1-indexed, inclusive.
    pub end_line: Option<usize>,
}

impl Region {
    pub fn new(name: impl Into<String>, module_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module_path: module_path.into(),
            begin_line: None,
            end_line: None,
        }
    }

    pub fn with_lines(mut self, begin: usize, end: usize) -> Self {
        self.begin_line = Some(begin);
        self.end_line = Some(end);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ProfileNode {
    pub id: NodeId,
    pub region: Region,
    pub children: Vec<NodeId>,
}

/// Nested node as serialized by the archive exporter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawNode {
    pub region: Region,
    pub children: Vec<RawNode>,
}

impl RawNode {
    pub fn leaf(region: Region) -> Self {
        Self {
            region,
            children: vec![],
        }
    }

    pub fn with_children(region: Region, children: Vec<RawNode>) -> Self {
        Self { region, children }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RawProfile {
    roots: Vec<RawNode>,
}

/// Immutable call tree; one or more roots.
#[derive(Debug, Clone, Default)]
pub struct ProfileTree {
    nodes: Vec<ProfileNode>,
    roots: Vec<NodeId>,
}

impl ProfileTree {
    /// Flatten nested nodes into an arena. Ids follow depth-first document order.
    pub fn from_roots(roots: Vec<RawNode>) -> Self {
        let mut tree = Self::default();
        let mut pending: Vec<(RawNode, Option<NodeId>)> =
            roots.into_iter().rev().map(|raw| (raw, None)).collect();

        while let Some((raw, parent)) = pending.pop() {
            let id = NodeId(tree.nodes.len());
            tree.nodes.push(ProfileNode {
                id,
                region: raw.region,
                children: Vec::with_capacity(raw.children.len()),
            });
            match parent {
                Some(parent) => tree.nodes[parent.0].children.push(id),
                None => tree.roots.push(id),
            }
            pending.extend(raw.children.into_iter().rev().map(|child| (child, Some(id))));
        }
        tree
    }

    /// Load `{"roots": [...]}` from a JSON export.
    pub fn load_json(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read profile: {}", path.display()))?;
        Self::from_json_str(&text)
            .with_context(|| format!("Failed to parse profile: {}", path.display()))
    }

    /// Parse a JSON export of any nesting depth.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let mut json = serde_json::Deserializer::from_str(text);
        json.disable_recursion_limit();
        let raw = RawProfile::deserialize(serde_stacker::Deserializer::new(&mut json))?;
        json.end()?;
        Ok(Self::from_roots(raw.roots))
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn node(&self, id: NodeId) -> Option<&ProfileNode> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
