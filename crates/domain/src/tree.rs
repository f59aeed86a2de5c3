use std::collections::{HashMap, HashSet, VecDeque};

use crate::models::Comment;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub id: String,
    pub parent_comment_id: Option<String>,
    pub deleted: bool,
}

impl From<&Comment> for TreeNode {
    fn from(c: &Comment) -> Self {
        Self {
            id: c.id.clone(),
            parent_comment_id: c.parent_comment_id.clone(),
            deleted: c.deleted,
        }
    }
}

/// Arena of comments keyed by id, plus a derived parent -> children index.
#[derive(Debug, Clone, Default)]
pub struct CommentTree {
    nodes: HashMap<String, TreeNode>,
    children: HashMap<String, Vec<String>>,
}

impl CommentTree {
    pub fn from_nodes(nodes: impl IntoIterator<Item = TreeNode>) -> Self {
        let mut tree = Self::default();
        for node in nodes {
            tree.insert(node);
        }
        tree
    }

    pub fn from_comments<'a>(comments: impl IntoIterator<Item = &'a Comment>) -> Self {
        Self::from_nodes(comments.into_iter().map(TreeNode::from))
    }

    pub fn insert(&mut self, node: TreeNode) {
        if let Some(old) = self.nodes.get(&node.id) {
            if let Some(p) = &old.parent_comment_id {
                if let Some(siblings) = self.children.get_mut(p) {
                    siblings.retain(|c| c != &node.id);
                }
            }
        }
        if let Some(p) = &node.parent_comment_id {
            self.children.entry(p.clone()).or_default().push(node.id.clone());
        }
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn remove(&mut self, id: &str) -> Option<TreeNode> {
        let node = self.nodes.remove(id)?;
        if let Some(p) = &node.parent_comment_id {
            if let Some(siblings) = self.children.get_mut(p) {
                siblings.retain(|c| c != id);
            }
        }
        Some(node)
    }

    pub fn get(&self, id: &str) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn children(&self, id: &str) -> impl Iterator<Item = &TreeNode> {
        self.children
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|c| self.nodes.get(c))
    }

    pub fn live_children(&self, id: &str) -> Vec<&TreeNode> {
        self.children(id).filter(|c| !c.deleted).collect()
    }

    /// Root first, then descendants breadth-first. Empty if `root` is unknown.
    /// A corrupted parent chain that loops back is visited once.
    pub fn subtree(&self, root: &str) -> Vec<&TreeNode> {
        let Some(root_node) = self.nodes.get(root) else {
            return Vec::new();
        };

        let mut out = vec![root_node];
        let mut seen: HashSet<&str> = HashSet::from([root]);
        let mut queue: VecDeque<&str> = VecDeque::from([root]);

        while let Some(current) = queue.pop_front() {
            for child in self.children(current) {
                if seen.insert(child.id.as_str()) {
                    out.push(child);
                    queue.push_back(child.id.as_str());
                }
            }
        }
        out
    }

    pub fn subtree_ids(&self, root: &str) -> Vec<String> {
        self.subtree(root).into_iter().map(|n| n.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, parent: Option<&str>, deleted: bool) -> TreeNode {
        TreeNode {
            id: id.into(),
            parent_comment_id: parent.map(Into::into),
            deleted,
        }
    }

    #[test]
    fn subtree_walks_all_descendants() {
        let tree = CommentTree::from_nodes([
            node("a", None, false),
            node("b", Some("a"), false),
            node("c", Some("b"), true),
            node("d", Some("a"), false),
            node("x", None, false),
        ]);

        let ids = tree.subtree_ids("a");
        assert_eq!(ids[0], "a");
        assert_eq!(ids.len(), 4);
        assert!(!ids.contains(&"x".to_string()));
        assert_eq!(tree.live_children("a").len(), 2);
        assert!(tree.live_children("b").is_empty());
    }

    #[test]
    fn subtree_survives_cycles() {
        let tree =
            CommentTree::from_nodes([node("a", Some("b"), false), node("b", Some("a"), false)]);
        assert_eq!(tree.subtree_ids("a").len(), 2);
    }

    #[test]
    fn unknown_root_is_empty() {
        let tree = CommentTree::from_nodes([node("a", None, false)]);
        assert!(tree.subtree("zzz").is_empty());
    }

    #[test]
    fn reinsert_moves_child_index() {
        let mut tree = CommentTree::from_nodes([
            node("a", None, false),
            node("b", None, false),
            node("c", Some("a"), false),
        ]);
        tree.insert(node("c", Some("b"), false));
        assert_eq!(tree.children("a").count(), 0);
        assert_eq!(tree.children("b").count(), 1);

        tree.remove("c");
        assert_eq!(tree.children("b").count(), 0);
        assert_eq!(tree.len(), 2);
    }
}
