//! Hierarchy edits that must keep the parent relation acyclic.

use bartleby_core::tree::CardTree;
use bartleby_core::{Card, CoreResult};
use bartleby_ledger::SqliteStore;

use crate::commands::{self, Committed};

/// Move a card, rejecting self-parenting and moves under a descendant before
/// anything is appended.
pub fn move_card_in_tree(
    store: &SqliteStore,
    id: &str,
    new_parent_id: Option<&str>,
    position: Option<i64>,
) -> CoreResult<Committed<Card>> {
    let tree = CardTree::new(store.all_cards()?);
    tree.validate_move(id, new_parent_id)?;
    commands::move_card(store, id, new_parent_id, position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{create_card, NewCard};

    fn nest(s: &SqliteStore) -> (String, String, String) {
        let root = create_card(s, NewCard::new("root", "chapter")).unwrap().value.id;
        let mid = create_card(s, NewCard::new("mid", "scene").under(root.clone()))
            .unwrap()
            .value
            .id;
        let leaf = create_card(s, NewCard::new("leaf", "note").under(mid.clone()))
            .unwrap()
            .value
            .id;
        (root, mid, leaf)
    }

    #[test]
    fn moving_under_descendant_appends_nothing() {
        let s = SqliteStore::open_in_memory().unwrap();
        let (root, mid, leaf) = nest(&s);
        let before = s.event_count().unwrap();

        let err = move_card_in_tree(&s, &root, Some(&leaf), None).unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");
        let err = move_card_in_tree(&s, &mid, Some(&mid), None).unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");
        assert_eq!(s.event_count().unwrap(), before);
        assert_eq!(s.get_card(&root).unwrap().unwrap().parent_id, None);
    }

    #[test]
    fn legal_moves_go_through() {
        let s = SqliteStore::open_in_memory().unwrap();
        let (root, mid, leaf) = nest(&s);

        let out = move_card_in_tree(&s, &leaf, Some(&root), None).unwrap();
        assert_eq!(out.value.parent_id.as_deref(), Some(root.as_str()));
        assert_eq!(out.value.position, 1);

        let out = move_card_in_tree(&s, &mid, None, Some(7)).unwrap();
        assert_eq!(out.value.parent_id, None);
        assert_eq!(out.value.position, 7);

        let err = move_card_in_tree(&s, "ghost", None, None).unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }
}
