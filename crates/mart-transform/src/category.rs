//! Product category hierarchy.
//!
//! Categories reference their parent explicitly. The tree stores nodes in a
//! vector and links them by index, so walks never chase strings.

use std::collections::HashMap;

use crate::error::TransformError;

/// Separator between names in a rendered category path.
pub const PATH_SEPARATOR: &str = " > ";

#[derive(Debug, Clone)]
struct Node {
    name: String,
    /// Name of the declared parent, kept for error reporting.
    parent_name: Option<String>,
    parent: Option<usize>,
}

/// Index-based category tree.
#[derive(Debug, Clone, Default)]
pub struct CategoryTree {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
}

impl CategoryTree {
    /// Builds a tree from `(name, parent)` pairs. A later pair for the same
    /// name replaces the earlier one.
    pub fn from_pairs<I, N, P>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (N, Option<P>)>,
        N: Into<String>,
        P: Into<String>,
    {
        let mut tree = CategoryTree::default();
        for (name, parent) in pairs {
            let name = name.into();
            let parent_name = parent.map(Into::into);
            match tree.index.get(&name) {
                Some(&id) => tree.nodes[id].parent_name = parent_name,
                None => {
                    tree.index.insert(name.clone(), tree.nodes.len());
                    tree.nodes.push(Node {
                        name,
                        parent_name,
                        parent: None,
                    });
                }
            }
        }
        for id in 0..tree.nodes.len() {
            let parent = tree.nodes[id]
                .parent_name
                .as_ref()
                .and_then(|parent| tree.index.get(parent).copied());
            tree.nodes[id].parent = parent;
        }
        tree
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn parent(&self, name: &str) -> Option<&str> {
        let id = *self.index.get(name)?;
        self.nodes[id]
            .parent
            .map(|parent| self.nodes[parent].name.as_str())
    }

    /// Ancestors of `name`, nearest first.
    ///
    /// Fails when the chain revisits a node or names a parent that is not in
    /// the tree.
    pub fn ancestors(&self, name: &str) -> Result<Vec<&str>, TransformError> {
        let Some(&start) = self.index.get(name) else {
            return Err(TransformError::UnknownParent {
                category: name.to_string(),
                parent: name.to_string(),
            });
        };
        let mut visited = vec![false; self.nodes.len()];
        visited[start] = true;
        let mut chain = Vec::new();
        let mut current = start;
        loop {
            let node = &self.nodes[current];
            let Some(parent_name) = node.parent_name.as_deref() else {
                return Ok(chain);
            };
            let Some(parent) = node.parent else {
                return Err(TransformError::UnknownParent {
                    category: name.to_string(),
                    parent: parent_name.to_string(),
                });
            };
            if visited[parent] {
                let mut names = vec![name];
                names.extend(chain.iter().copied());
                names.push(self.nodes[parent].name.as_str());
                return Err(TransformError::CategoryCycle {
                    category: name.to_string(),
                    chain: names.join(" -> "),
                });
            }
            visited[parent] = true;
            chain.push(self.nodes[parent].name.as_str());
            current = parent;
        }
    }

    /// Level of a category; roots are level 1.
    pub fn depth(&self, name: &str) -> Result<usize, TransformError> {
        self.ancestors(name).map(|ancestors| ancestors.len() + 1)
    }

    /// Root-to-node path rendered with [`PATH_SEPARATOR`].
    pub fn path(&self, name: &str) -> Result<String, TransformError> {
        let mut names = self.ancestors(name)?;
        names.reverse();
        names.push(name);
        Ok(names.join(PATH_SEPARATOR))
    }

    /// Direct children of a category, sorted by name.
    pub fn children(&self, name: &str) -> Vec<&str> {
        let Some(&id) = self.index.get(name) else {
            return Vec::new();
        };
        let mut children: Vec<&str> = self
            .nodes
            .iter()
            .filter(|node| node.parent == Some(id))
            .map(|node| node.name.as_str())
            .collect();
        children.sort_unstable();
        children
    }

    /// Categories without a parent, sorted by name.
    pub fn roots(&self) -> Vec<&str> {
        let mut roots: Vec<&str> = self
            .nodes
            .iter()
            .filter(|node| node.parent_name.is_none())
            .map(|node| node.name.as_str())
            .collect();
        roots.sort_unstable();
        roots
    }

    /// Categories whose parent chain contains a cycle, sorted by name.
    pub fn cycles(&self) -> Vec<&str> {
        let mut cyclic: Vec<&str> = self
            .nodes
            .iter()
            .filter(|node| {
                matches!(
                    self.ancestors(&node.name),
                    Err(TransformError::CategoryCycle { .. })
                )
            })
            .map(|node| node.name.as_str())
            .collect();
        cyclic.sort_unstable();
        cyclic
    }
}
