//! Keeps inline-derived `mentions` links in step with a card's text.
//!
//! Reconciliation reads the views, diffs the card's resolved references
//! against the links it already has, and issues link commands through the
//! ordinary command layer. Running it again on unchanged text emits nothing.

use std::collections::HashSet;

use bartleby_core::wikiref::resolve_references;
use bartleby_core::{
    CardId, CoreError, CoreResult, CreatedFrom, Event, Link, LinkChanges, MetaMap, MetaValue,
    INLINE_REF_A, INLINE_REF_B, MENTIONS_LINK_TYPE,
};
use bartleby_ledger::SqliteStore;
use tracing::{debug, warn};

use crate::commands::{self, NewLink};

/// A resolved target and the literal text of its first occurrence.
struct Mention {
    target: CardId,
    text: String,
}

/// Resolved, de-duplicated references in `content`, in document order.
/// Ghost and ambiguous references never produce mentions.
fn mentions_in(card_id: &str, content: &str, store: &SqliteStore) -> CoreResult<Vec<Mention>> {
    let cards = store.all_cards()?;
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for r in resolve_references(content, &cards) {
        let Some(target) = r.resolved_card_id() else {
            continue;
        };
        if target == card_id {
            warn!(card_id, reference = %r.reference.text, "skipping self-reference");
            continue;
        }
        if seen.insert(target.to_string()) {
            out.push(Mention {
                target: target.to_string(),
                text: r.reference.text.clone(),
            });
        }
    }
    Ok(out)
}

fn other_side_key(key: &str) -> &'static str {
    if key == INLINE_REF_A {
        INLINE_REF_B
    } else {
        INLINE_REF_A
    }
}

/// Links this card's text may have contributed to: inline-origin links, and
/// any link carrying this side's inline-reference key.
fn inline_links_of(store: &SqliteStore, card_id: &str) -> CoreResult<Vec<Link>> {
    Ok(commands::links_touching(store, card_id)?
        .into_iter()
        .filter(|l| {
            l.created_from.is_inline() || l.inline_ref(l.inline_key_for(card_id)).is_some()
        })
        .collect())
}

/// Synchronize the links derived from `card_id`'s stored content. Returns the
/// link events emitted, in order.
pub fn reconcile_card(store: &SqliteStore, card_id: &str) -> CoreResult<Vec<Event>> {
    let card = store
        .get_card(card_id)?
        .ok_or_else(|| CoreError::card_not_found(card_id))?;
    let mentions = mentions_in(card_id, &card.content, store)?;
    let existing = inline_links_of(store, card_id)?;

    let mut events = Vec::new();
    let mut still_valid: HashSet<String> = HashSet::new();

    for mention in &mentions {
        match store.find_link_between(card_id, &mention.target)? {
            Some(link) => {
                still_valid.insert(link.id.clone());
                let key = link.inline_key_for(card_id);
                if link.inline_ref(key) == Some(mention.text.as_str()) {
                    continue;
                }
                let mut metadata = link.metadata.clone();
                metadata.insert(key.to_string(), MetaValue::from(mention.text.as_str()));
                let out = commands::update_link(
                    store,
                    &link.id,
                    LinkChanges {
                        link_type: None,
                        metadata: Some(metadata),
                    },
                )?;
                events.push(out.event);
            }
            None => {
                let (a, b, created_from, key) = if card_id < mention.target.as_str() {
                    (card_id, mention.target.as_str(), CreatedFrom::InlineA, INLINE_REF_A)
                } else {
                    (mention.target.as_str(), card_id, CreatedFrom::InlineB, INLINE_REF_B)
                };
                let mut metadata = MetaMap::new();
                metadata.insert(key.to_string(), MetaValue::from(mention.text.as_str()));
                let out = commands::create_link(
                    store,
                    NewLink {
                        card_a_id: a.to_string(),
                        card_b_id: b.to_string(),
                        link_type: MENTIONS_LINK_TYPE.to_string(),
                        created_from: Some(created_from),
                        metadata: Some(metadata),
                    },
                )?;
                still_valid.insert(out.value.id.clone());
                events.push(out.event);
            }
        }
    }

    for link in existing.iter().filter(|l| !still_valid.contains(&l.id)) {
        let key = link.inline_key_for(card_id);
        let mut metadata = link.metadata.clone();
        let stripped = metadata.remove(key).is_some();
        let orphaned = link.created_from != CreatedFrom::Explicit
            && !metadata.contains_key(other_side_key(key));

        if orphaned {
            events.push(commands::delete_link(store, &link.id)?);
        } else if stripped {
            let out = commands::update_link(
                store,
                &link.id,
                LinkChanges {
                    link_type: None,
                    metadata: Some(metadata),
                },
            )?;
            events.push(out.event);
        }
    }

    debug!(card_id, mentions = mentions.len(), emitted = events.len(), "reconciled");
    Ok(events)
}
