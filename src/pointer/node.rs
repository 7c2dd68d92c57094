/*!
 * Pointer Trie
 *
 * URLs are split into parts (`protocol`, then one part per path segment) and
 * stored in a trie of `FilePointerPartNode`s. Every node caches the file its
 * URL resolved to and holds the shared state of the pointers created for it,
 * one state per listener.
 */

use smartstring::alias::String as SmartString;
use std::sync::Arc;

use super::pointer::PointerState;
use crate::core::types::FileId;

#[derive(Default)]
pub(crate) struct FilePointerPartNode {
    part: SmartString,
    children: Vec<FilePointerPartNode>,
    pub file: Option<FileId>,
    pub leaves: Vec<Arc<PointerState>>,
}

#[inline]
fn part_eq(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a.eq_ignore_ascii_case(b) || a.to_lowercase() == b.to_lowercase()
    }
}

impl FilePointerPartNode {
    pub fn new(part: &str) -> Self {
        Self {
            part: part.into(),
            ..Default::default()
        }
    }

    pub fn part(&self) -> &str {
        &self.part
    }

    fn child_index(&self, part: &str, case_sensitive: bool) -> Option<usize> {
        self.children
            .iter()
            .position(|c| part_eq(&c.part, part, case_sensitive))
    }

    /// Node at `parts` below this one
    pub fn find(&self, parts: &[&str], case_sensitive: bool) -> Option<&FilePointerPartNode> {
        let mut current = self;
        for part in parts {
            let idx = current.child_index(part, case_sensitive)?;
            current = &current.children[idx];
        }
        Some(current)
    }

    pub fn find_mut(
        &mut self,
        parts: &[&str],
        case_sensitive: bool,
    ) -> Option<&mut FilePointerPartNode> {
        let mut current = self;
        for part in parts {
            let idx = current.child_index(part, case_sensitive)?;
            current = &mut current.children[idx];
        }
        Some(current)
    }

    /// Node at `parts`, creating missing nodes on the way
    pub fn find_or_create(&mut self, parts: &[&str], case_sensitive: bool) -> &mut FilePointerPartNode {
        let mut current = self;
        for part in parts {
            let idx = match current.child_index(part, case_sensitive) {
                Some(idx) => idx,
                None => {
                    current.children.push(FilePointerPartNode::new(part));
                    current.children.len() - 1
                }
            };
            current = &mut current.children[idx];
        }
        current
    }

    /// Unlink and return the node at `parts` (which must be non-empty)
    pub fn detach(&mut self, parts: &[&str], case_sensitive: bool) -> Option<FilePointerPartNode> {
        let (last, parent_parts) = parts.split_last()?;
        let parent = self.find_mut(parent_parts, case_sensitive)?;
        let idx = parent.child_index(last, case_sensitive)?;
        Some(parent.children.swap_remove(idx))
    }

    /// Insert `node` at `parts` (non-empty), merging with an existing node
    pub fn attach(&mut self, parts: &[&str], mut node: FilePointerPartNode, case_sensitive: bool) {
        let Some((last, parent_parts)) = parts.split_last() else {
            return;
        };
        node.part = (*last).into();
        let parent = self.find_or_create(parent_parts, case_sensitive);
        match parent.child_index(last, case_sensitive) {
            Some(idx) => parent.children[idx].merge(node, case_sensitive),
            None => parent.children.push(node),
        }
    }

    /// Fold `other` into this node; states sharing a listener become one
    fn merge(&mut self, other: FilePointerPartNode, case_sensitive: bool) {
        if other.file.is_some() {
            self.file = other.file;
            for leaf in &self.leaves {
                leaf.set_file(other.file);
            }
        }
        for moved in other.leaves {
            match self.leaves.iter().find(|s| s.has_listener(&moved.listener)) {
                Some(existing) => existing.absorb(&moved),
                None => self.leaves.push(moved),
            }
        }
        for child in other.children {
            match self.child_index(&child.part, case_sensitive) {
                Some(idx) => self.children[idx].merge(child, case_sensitive),
                None => self.children.push(child),
            }
        }
    }

    /// Remove empty nodes along `parts`, deepest first
    pub fn prune(&mut self, parts: &[&str], case_sensitive: bool) {
        let Some((first, rest)) = parts.split_first() else {
            return;
        };
        if let Some(idx) = self.child_index(first, case_sensitive) {
            self.children[idx].prune(rest, case_sensitive);
            if self.children[idx].is_empty() {
                self.children.swap_remove(idx);
            }
        }
    }

    /// No pointers here or below
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty() && self.children.is_empty()
    }

    /// Visit this node and every node below it
    pub fn for_each<F: FnMut(&FilePointerPartNode)>(&self, f: &mut F) {
        f(self);
        for child in &self.children {
            child.for_each(f);
        }
    }

    pub fn for_each_mut<F: FnMut(&mut FilePointerPartNode)>(&mut self, f: &mut F) {
        f(self);
        for child in &mut self.children {
            child.for_each_mut(f);
        }
    }

    /// Nodes in this subtree, including this one
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(|c| c.node_count()).sum::<usize>()
    }

    /// Pointer states in this subtree
    pub fn leaf_count(&self) -> usize {
        self.leaves.len() + self.children.iter().map(|c| c.leaf_count()).sum::<usize>()
    }
}
