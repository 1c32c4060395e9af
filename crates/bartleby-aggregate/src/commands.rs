//! One command per mutation kind. Each validates its preconditions against
//! the current views, builds exactly one event, and commits append + apply
//! in one transaction.
//!
//! Commands here never trigger reconciliation; `Workspace` composes that.

use std::collections::HashSet;

use bartleby_core::event::{new_event, new_id};
use bartleby_core::tree::CardTree;
use bartleby_core::{
    Card, CardChanges, CardCreated, CardDeleted, CardId, CardMoved, CardUpdated, ConfigPatch,
    ConfigUpdated, CoreError, CoreResult, CreatedFrom, Event, EventBody, Link, LinkChanges,
    LinkCreated, LinkDeleted, LinkFilter, LinkUpdated, MetaMap, ProjectConfig,
};
use bartleby_ledger::projector;
use bartleby_ledger::SqliteStore;
use serde::Serialize;
use tracing::debug;

/// Result of a committed command: the resulting row, the primary event, and
/// any link events reconciliation emitted as a consequence.
#[derive(Debug, Clone, Serialize)]
pub struct Committed<T> {
    pub value: T,
    pub event: Event,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reconciled: Vec<Event>,
}

impl<T> Committed<T> {
    pub fn new(value: T, event: Event) -> Self {
        Self {
            value,
            event,
            reconciled: Vec::new(),
        }
    }

    /// Every event this command appended, primary first.
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        std::iter::once(&self.event).chain(self.reconciled.iter())
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewCard {
    pub title: String,
    pub content: Option<String>,
    pub card_type: String,
    pub metadata: Option<MetaMap>,
    pub parent_id: Option<CardId>,
    pub position: Option<i64>,
}

impl NewCard {
    pub fn new(title: impl Into<String>, card_type: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            card_type: card_type.into(),
            ..Default::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn under(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewLink {
    pub card_a_id: CardId,
    pub card_b_id: CardId,
    pub link_type: String,
    pub created_from: Option<CreatedFrom>,
    pub metadata: Option<MetaMap>,
}

impl NewLink {
    pub fn new(a: impl Into<String>, b: impl Into<String>, link_type: impl Into<String>) -> Self {
        Self {
            card_a_id: a.into(),
            card_b_id: b.into(),
            link_type: link_type.into(),
            ..Default::default()
        }
    }
}

/// Build the event, then append and apply it atomically.
fn emit(store: &SqliteStore, body: EventBody) -> CoreResult<Event> {
    let floor = store.last_event_timestamp()?;
    let event = new_event(body, floor);
    projector::commit(store, &event)?;
    debug!(
        event_id = %event.id,
        event_type = event.event_type(),
        subject = event.body.subject_id().unwrap_or("-"),
        "event committed"
    );
    Ok(event)
}

fn require_non_blank(field: &str, value: &str) -> CoreResult<()> {
    if value.trim().is_empty() {
        return Err(CoreError::InvalidArgument(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_card(store: &SqliteStore, id: &str) -> CoreResult<Card> {
    store
        .get_card(id)?
        .ok_or_else(|| CoreError::card_not_found(id))
}

fn require_link(store: &SqliteStore, id: &str) -> CoreResult<Link> {
    store
        .get_link(id)?
        .ok_or_else(|| CoreError::link_not_found(id))
}

fn read_back_card(store: &SqliteStore, id: &str) -> CoreResult<Card> {
    store
        .get_card(id)?
        .ok_or_else(|| CoreError::Storage(format!("card {id} missing after commit")))
}

fn read_back_link(store: &SqliteStore, id: &str) -> CoreResult<Link> {
    store
        .get_link(id)?
        .ok_or_else(|| CoreError::Storage(format!("link {id} missing after commit")))
}

fn next_position(store: &SqliteStore, parent: Option<&str>) -> CoreResult<i64> {
    match store.max_sibling_position(parent)? {
        None => Ok(0),
        Some(p) => p.checked_add(1).ok_or_else(|| {
            CoreError::InvalidArgument(
                "no position left after the last sibling; pass an explicit position".to_string(),
            )
        }),
    }
}

// ── Cards ───────────────────────────────────────────────────────────

pub fn create_card(store: &SqliteStore, input: NewCard) -> CoreResult<Committed<Card>> {
    require_non_blank("title", &input.title)?;
    require_non_blank("card type", &input.card_type)?;
    if let Some(parent) = &input.parent_id {
        require_card(store, parent)?;
    }
    let position = match input.position {
        Some(p) => p,
        None => next_position(store, input.parent_id.as_deref())?,
    };

    let card_id = new_id();
    let event = emit(
        store,
        EventBody::CardCreated(CardCreated {
            card_id: card_id.clone(),
            title: input.title,
            content: input.content.unwrap_or_default(),
            card_type: input.card_type,
            metadata: input.metadata.unwrap_or_default(),
            parent_id: input.parent_id,
            position,
        }),
    )?;
    Ok(Committed::new(read_back_card(store, &card_id)?, event))
}

pub fn update_card(
    store: &SqliteStore,
    id: &str,
    changes: CardChanges,
) -> CoreResult<Committed<Card>> {
    require_card(store, id)?;
    if let Some(title) = &changes.title {
        require_non_blank("title", title)?;
    }
    if let Some(card_type) = &changes.card_type {
        require_non_blank("card type", card_type)?;
    }
    let event = emit(
        store,
        EventBody::CardUpdated(CardUpdated {
            card_id: id.to_string(),
            changes,
        }),
    )?;
    Ok(Committed::new(read_back_card(store, id)?, event))
}

/// Delete a card. Descendants and incident links are removed by the storage
/// cascade; their ids are recorded in the event for log readers.
pub fn delete_card(store: &SqliteStore, id: &str) -> CoreResult<Event> {
    require_card(store, id)?;

    let tree = CardTree::new(store.all_cards()?);
    let cascaded_card_ids: Vec<CardId> = tree.descendants(id).iter().map(|c| c.id.clone()).collect();
    let doomed: HashSet<&str> = cascaded_card_ids
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(id))
        .collect();
    let mut cascaded_link_ids: Vec<String> = store
        .all_links()?
        .into_iter()
        .filter(|l| doomed.contains(l.card_a_id.as_str()) || doomed.contains(l.card_b_id.as_str()))
        .map(|l| l.id)
        .collect();
    cascaded_link_ids.sort();

    emit(
        store,
        EventBody::CardDeleted(CardDeleted {
            card_id: id.to_string(),
            cascaded_card_ids,
            cascaded_link_ids,
        }),
    )
}

/// Re-parent and/or reorder a card. Does not check for cycles; see
/// [`crate::tree_edit::move_card_in_tree`].
pub fn move_card(
    store: &SqliteStore,
    id: &str,
    new_parent_id: Option<&str>,
    new_position: Option<i64>,
) -> CoreResult<Committed<Card>> {
    let card = require_card(store, id)?;
    if let Some(parent) = new_parent_id {
        require_card(store, parent)?;
    }
    let new_position = match new_position {
        Some(p) => p,
        None => next_position(store, new_parent_id)?,
    };
    let event = emit(
        store,
        EventBody::CardMoved(CardMoved {
            card_id: id.to_string(),
            old_parent_id: card.parent_id,
            new_parent_id: new_parent_id.map(str::to_string),
            old_position: card.position,
            new_position,
        }),
    )?;
    Ok(Committed::new(read_back_card(store, id)?, event))
}

// ── Links ───────────────────────────────────────────────────────────

/// Create a link. At most one link may exist per unordered card pair.
pub fn create_link(store: &SqliteStore, input: NewLink) -> CoreResult<Committed<Link>> {
    require_non_blank("link type", &input.link_type)?;
    if input.card_a_id == input.card_b_id {
        return Err(CoreError::InvalidArgument(format!(
            "cannot link card {} to itself",
            input.card_a_id
        )));
    }
    require_card(store, &input.card_a_id)?;
    require_card(store, &input.card_b_id)?;
    if let Some(existing) = store.find_link_between(&input.card_a_id, &input.card_b_id)? {
        return Err(CoreError::Conflict(format!(
            "cards {} and {} are already linked by {}",
            input.card_a_id, input.card_b_id, existing.id
        )));
    }

    let link_id = new_id();
    let event = emit(
        store,
        EventBody::LinkCreated(LinkCreated {
            link_id: link_id.clone(),
            card_a_id: input.card_a_id,
            card_b_id: input.card_b_id,
            link_type: input.link_type,
            created_from: input.created_from.unwrap_or(CreatedFrom::Explicit),
            metadata: input.metadata.unwrap_or_default(),
        }),
    )?;
    Ok(Committed::new(read_back_link(store, &link_id)?, event))
}

pub fn update_link(
    store: &SqliteStore,
    id: &str,
    changes: LinkChanges,
) -> CoreResult<Committed<Link>> {
    require_link(store, id)?;
    if let Some(link_type) = &changes.link_type {
        require_non_blank("link type", link_type)?;
    }
    let event = emit(
        store,
        EventBody::LinkUpdated(LinkUpdated {
            link_id: id.to_string(),
            changes,
        }),
    )?;
    Ok(Committed::new(read_back_link(store, id)?, event))
}

pub fn delete_link(store: &SqliteStore, id: &str) -> CoreResult<Event> {
    require_link(store, id)?;
    emit(
        store,
        EventBody::LinkDeleted(LinkDeleted {
            link_id: id.to_string(),
        }),
    )
}

/// Links touching `card_id`, newest first.
pub fn links_touching(store: &SqliteStore, card_id: &str) -> CoreResult<Vec<Link>> {
    store.list_links(&LinkFilter {
        card_id: Some(card_id.to_string()),
        link_type: None,
    })
}

// ── Config ──────────────────────────────────────────────────────────

/// Merge `changes` into the project config. The event records exactly the
/// keys present in the patch.
pub fn update_config(
    store: &SqliteStore,
    changes: ConfigPatch,
) -> CoreResult<Committed<ProjectConfig>> {
    if changes.is_empty() {
        return Err(CoreError::InvalidArgument(
            "config update names no keys".to_string(),
        ));
    }
    let event = emit(store, EventBody::ConfigUpdated(ConfigUpdated { changes }))?;
    Ok(Committed::new(store.get_config()?, event))
}

/// Record the default config on first boot. No-op once the log has events.
pub fn bootstrap_config(store: &SqliteStore) -> CoreResult<Option<Event>> {
    store.with_tx(|s| {
        if s.event_count()? > 0 {
            return Ok(None);
        }
        let event = emit(
            s,
            EventBody::ConfigUpdated(ConfigUpdated {
                changes: ProjectConfig::bootstrap().as_patch(),
            }),
        )?;
        Ok(Some(event))
    })
}
