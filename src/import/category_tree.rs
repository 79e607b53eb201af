use std::collections::HashMap;

use anyhow::{anyhow, Result};

use crate::storage::Category;

/// A user's categories as an arena keyed by id, with a child index.
///
/// Built from the flat list storage returns. Traversal never recurses:
/// [`CategoryTree::iter`] keeps an explicit stack of child iterators.
#[derive(Debug, Clone)]
pub struct CategoryTree {
    nodes: HashMap<i64, Category>,
    children: HashMap<i64, Vec<i64>>,
    root: i64,
}

impl CategoryTree {
    /// Fails when the list holds no root category.
    pub fn build(categories: Vec<Category>) -> Result<Self> {
        let root = categories
            .iter()
            .filter(|c| c.is_root())
            .map(|c| c.id)
            .min()
            .ok_or_else(|| anyhow!("User has no root category"))?;

        let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
        for category in &categories {
            if let Some(parent) = category.parent_id {
                children.entry(parent).or_default().push(category.id);
            }
        }

        let nodes: HashMap<i64, Category> = categories.into_iter().map(|c| (c.id, c)).collect();
        for ids in children.values_mut() {
            ids.sort_by_key(|id| nodes.get(id).map(|c| (c.sort_order, c.id)));
        }

        Ok(Self {
            nodes,
            children,
            root,
        })
    }

    pub fn root(&self) -> &Category {
        // `build` guarantees the root id is present.
        &self.nodes[&self.root]
    }

    pub fn get(&self, id: i64) -> Option<&Category> {
        self.nodes.get(&id)
    }

    fn child_ids(&self, id: i64) -> &[i64] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Direct children of a category in display order.
    pub fn children(&self, id: i64) -> impl Iterator<Item = &Category> {
        self.child_ids(id).iter().filter_map(|c| self.nodes.get(c))
    }

    /// Categories reachable from the root, root first, depth-first in display order.
    pub fn iter(&self) -> PreOrder<'_> {
        PreOrder {
            tree: self,
            stack: Vec::new(),
            pending_root: Some(self.root()),
        }
    }

    /// Name → category lookup used to resolve outline labels.
    ///
    /// The root is registered under `None`. When two categories share a
    /// name, the first one in [`Self::iter`] order wins.
    pub fn name_map(&self) -> HashMap<Option<String>, Category> {
        let mut map = HashMap::new();
        for category in self.iter() {
            map.entry(category.name.clone())
                .or_insert_with(|| category.clone());
        }
        map
    }
}

pub struct PreOrder<'a> {
    tree: &'a CategoryTree,
    stack: Vec<std::slice::Iter<'a, i64>>,
    pending_root: Option<&'a Category>,
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = &'a Category;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(root) = self.pending_root.take() {
            self.stack.push(self.tree.child_ids(root.id).iter());
            return Some(root);
        }

        loop {
            let top = self.stack.last_mut()?;
            match top.next() {
                Some(id) => {
                    if let Some(category) = self.tree.nodes.get(id) {
                        self.stack.push(self.tree.child_ids(category.id).iter());
                        return Some(category);
                    }
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}
