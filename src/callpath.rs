use crate::profile::{NodeId, ProfileTree};
use crate::symbols::{SymbolNormalizer, CALL_PATH_SEPARATOR};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::rc::Rc;

/// Flat `call path -> node` index over a whole profiling tree.
///
/// Keys are in document order of the depth-first walk. Two nodes with the
/// same normalized root-to-node chain share one key: the later one wins and
/// the key keeps its first position. The number of such overwrites is kept in
/// [`CallPathIndex::collisions`].
#[derive(Debug, Default, Clone)]
pub struct CallPathIndex {
    paths: IndexMap<String, NodeId>,
    /// parent call path -> direct child call paths, in index order.
    children: HashMap<String, Vec<String>>,
    collisions: usize,
}

impl CallPathIndex {
    pub fn build(tree: &ProfileTree, normalizer: &dyn SymbolNormalizer) -> Self {
        let mut index = Self::default();
        index.walk(tree, normalizer);
        index.link_children();
        index
    }

    /// Pre-order walk over all roots with an explicit stack.
    fn walk(&mut self, tree: &ProfileTree, normalizer: &dyn SymbolNormalizer) {
        let mut pending: Vec<(NodeId, Option<Rc<str>>)> =
            tree.roots().iter().rev().map(|&root| (root, None)).collect();

        while let Some((id, parent_path)) = pending.pop() {
            let Some(node) = tree.node(id) else { continue };

            let name = normalizer.normalize(&node.region.name);
            let path = match parent_path.as_deref() {
                Some(parent) => format!("{parent}{CALL_PATH_SEPARATOR}{name}"),
                None => name,
            };

            if let Some(previous) = self.paths.insert(path.clone(), id) {
                self.collisions += 1;
                tracing::warn!(
                    call_path = %path,
                    previous = previous.0,
                    replacement = id.0,
                    "duplicate call path; later node replaces earlier one"
                );
            }

            let path: Rc<str> = path.into();
            pending.extend(node.children.iter().rev().map(|&child| (child, Some(Rc::clone(&path)))));
        }
    }

    /// Derive the parent/child relation from the keys themselves, so it stays
    /// consistent with whatever survived collisions.
    fn link_children(&mut self) {
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for path in self.paths.keys() {
            if let Some(parent) = parent_of(path) {
                children
                    .entry(parent.to_string())
                    .or_default()
                    .push(path.clone());
            }
        }
        self.children = children;
    }

    pub fn get(&self, call_path: &str) -> Option<NodeId> {
        self.paths.get(call_path).copied()
    }

    pub fn contains(&self, call_path: &str) -> bool {
        self.paths.contains_key(call_path)
    }

    /// Direct children of `call_path` (exactly one more segment).
    pub fn children_of(&self, call_path: &str) -> &[String] {
        self.children
            .get(call_path)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn call_paths(&self) -> impl Iterator<Item = &str> {
        self.paths.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn collisions(&self) -> usize {
        self.collisions
    }
}

/// `a->b->c` -> `a->b`; roots have no parent.
pub fn parent_of(call_path: &str) -> Option<&str> {
    call_path
        .rsplit_once(CALL_PATH_SEPARATOR)
        .map(|(parent, _)| parent)
}

/// Trailing segment of a call path.
pub fn leaf_name(call_path: &str) -> &str {
    call_path
        .rsplit_once(CALL_PATH_SEPARATOR)
        .map_or(call_path, |(_, leaf)| leaf)
}
