//! Id-indexed snapshot of the card hierarchy.
//!
//! All walks (ancestors, descendants, breadcrumbs, move validation) run over
//! an in-memory arena built once from the card view, so every traversal is
//! bounded by the number of cards and tolerates a corrupted parent chain.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::{CoreError, CoreResult};
use crate::types::Card;

/// A card with its children, for rendering the hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeNode {
    pub card: Card,
    pub children: Vec<TreeNode>,
}

pub struct CardTree {
    cards: Vec<Card>,
    index: HashMap<String, usize>,
    /// Child slots per parent id; `None` holds the roots. Sorted by position.
    children: HashMap<Option<String>, Vec<usize>>,
}

impl CardTree {
    pub fn new(cards: Vec<Card>) -> Self {
        let index: HashMap<String, usize> = cards
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();

        let mut children: HashMap<Option<String>, Vec<usize>> = HashMap::new();
        for (i, card) in cards.iter().enumerate() {
            // Dangling parents are treated as roots.
            let parent = card
                .parent_id
                .clone()
                .filter(|p| index.contains_key(p));
            children.entry(parent).or_default().push(i);
        }
        for slots in children.values_mut() {
            slots.sort_by(|&a, &b| {
                let (ca, cb) = (&cards[a], &cards[b]);
                ca.position
                    .cmp(&cb.position)
                    .then(ca.created_at.cmp(&cb.created_at))
                    .then(ca.id.cmp(&cb.id))
            });
        }

        Self {
            cards,
            index,
            children,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Card> {
        self.index.get(id).map(|&i| &self.cards[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Direct children in sibling order. `None` lists the roots.
    pub fn children(&self, parent: Option<&str>) -> Vec<&Card> {
        self.children
            .get(&parent.map(str::to_string))
            .map(|slots| slots.iter().map(|&i| &self.cards[i]).collect())
            .unwrap_or_default()
    }

    /// Ancestors, nearest first.
    pub fn ancestors(&self, id: &str) -> Vec<&Card> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        seen.insert(id.to_string());
        let mut current = self.get(id).and_then(|c| c.parent_id.as_deref());
        while let Some(parent_id) = current {
            if !seen.insert(parent_id.to_string()) {
                break;
            }
            let Some(parent) = self.get(parent_id) else {
                break;
            };
            out.push(parent);
            current = parent.parent_id.as_deref();
        }
        out
    }

    /// Path from the root down to (and including) `id`.
    pub fn breadcrumb(&self, id: &str) -> Vec<&Card> {
        let Some(card) = self.get(id) else {
            return Vec::new();
        };
        let mut path = self.ancestors(id);
        path.reverse();
        path.push(card);
        path
    }

    /// All descendants in pre-order.
    pub fn descendants(&self, id: &str) -> Vec<&Card> {
        let mut out = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut stack: Vec<&Card> = self.children(Some(id)).into_iter().rev().collect();
        while let Some(card) = stack.pop() {
            if !seen.insert(card.id.as_str()) {
                continue;
            }
            out.push(card);
            stack.extend(self.children(Some(&card.id)).into_iter().rev());
        }
        out
    }

    pub fn is_descendant(&self, ancestor: &str, candidate: &str) -> bool {
        self.ancestors(candidate).iter().any(|c| c.id == ancestor)
    }

    /// Reject a re-parenting that would make `id` its own ancestor.
    pub fn validate_move(&self, id: &str, new_parent: Option<&str>) -> CoreResult<()> {
        if !self.contains(id) {
            return Err(CoreError::card_not_found(id));
        }
        let Some(parent) = new_parent else {
            return Ok(());
        };
        if !self.contains(parent) {
            return Err(CoreError::card_not_found(parent));
        }
        if parent == id {
            return Err(CoreError::InvalidArgument(format!(
                "card {id} cannot be its own parent"
            )));
        }
        if self.is_descendant(id, parent) {
            return Err(CoreError::InvalidArgument(format!(
                "card {parent} is a descendant of {id}; moving there would create a cycle"
            )));
        }
        Ok(())
    }

    /// The whole hierarchy as nested nodes, roots first.
    pub fn forest(&self) -> Vec<TreeNode> {
        self.children(None)
            .into_iter()
            .map(|c| self.subtree(c))
            .collect()
    }

    fn subtree(&self, card: &Card) -> TreeNode {
        TreeNode {
            card: card.clone(),
            children: self
                .children(Some(&card.id))
                .into_iter()
                .map(|c| self.subtree(c))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MetaMap;

    fn card(id: &str, parent: Option<&str>, position: i64) -> Card {
        Card {
            id: id.into(),
            title: id.to_uppercase(),
            content: String::new(),
            card_type: "note".into(),
            metadata: MetaMap::new(),
            parent_id: parent.map(str::to_string),
            position,
            created_at: 0,
            modified_at: 0,
        }
    }

    // root
    // ├── a
    // │   ├── a1
    // │   └── a2
    // │       └── a2x
    // └── b
    fn sample() -> CardTree {
        CardTree::new(vec![
            card("b", Some("root"), 5),
            card("a2x", Some("a2"), 0),
            card("root", None, 0),
            card("a", Some("root"), 1),
            card("a2", Some("a"), 9),
            card("a1", Some("a"), 2),
        ])
    }

    fn ids(cards: &[&Card]) -> Vec<String> {
        cards.iter().map(|c| c.id.clone()).collect()
    }

    #[test]
    fn children_follow_position_order() {
        let tree = sample();
        assert_eq!(ids(&tree.children(Some("root"))), vec!["a", "b"]);
        assert_eq!(ids(&tree.children(Some("a"))), vec!["a1", "a2"]);
        assert_eq!(ids(&tree.children(None)), vec!["root"]);
    }

    #[test]
    fn ancestors_and_breadcrumb() {
        let tree = sample();
        assert_eq!(ids(&tree.ancestors("a2x")), vec!["a2", "a", "root"]);
        assert_eq!(ids(&tree.breadcrumb("a2x")), vec!["root", "a", "a2", "a2x"]);
        assert!(tree.breadcrumb("missing").is_empty());
    }

    #[test]
    fn descendants_pre_order() {
        let tree = sample();
        assert_eq!(ids(&tree.descendants("root")), vec!["a", "a1", "a2", "a2x", "b"]);
        assert!(tree.descendants("b").is_empty());
    }

    #[test]
    fn move_under_descendant_rejected() {
        let tree = sample();
        let err = tree.validate_move("a", Some("a2x")).unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");
        let err = tree.validate_move("a", Some("a")).unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");
        assert!(tree.validate_move("a2x", Some("b")).is_ok());
        assert!(tree.validate_move("a", None).is_ok());
        assert_eq!(tree.validate_move("a", Some("zzz")).unwrap_err().code(), "NOT_FOUND");
    }

    #[test]
    fn corrupted_cycle_does_not_hang() {
        let tree = CardTree::new(vec![card("x", Some("y"), 0), card("y", Some("x"), 0)]);
        assert_eq!(ids(&tree.ancestors("x")), vec!["y"]);
        assert!(tree.forest().is_empty());
        assert_eq!(ids(&tree.descendants("x")), vec!["y"]);
    }

    #[test]
    fn forest_nests_children() {
        let tree = sample();
        let forest = tree.forest();
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].children.len(), 2);
        assert_eq!(forest[0].children[0].children[1].children[0].card.id, "a2x");
    }
}
