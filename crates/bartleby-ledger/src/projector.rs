//! Event -> view mutation. The only writer of the `cards`, `links` and
//! `config` tables.
//!
//! `apply` is deterministic in the event alone: timestamps come from the
//! event, never the clock, so replaying the log reproduces the views.

use bartleby_core::{Card, CoreResult, Event, EventBody, Link};
use tracing::debug;

use crate::sqlite_store::SqliteStore;

/// Apply one event to the materialized views.
pub fn apply(store: &SqliteStore, event: &Event) -> CoreResult<()> {
    debug!(event_id = %event.id, event_type = event.event_type(), "apply");
    let ts = event.timestamp;
    match &event.body {
        EventBody::CardCreated(p) => store.insert_card(&Card {
            id: p.card_id.clone(),
            title: p.title.clone(),
            content: p.content.clone(),
            card_type: p.card_type.clone(),
            metadata: p.metadata.clone(),
            parent_id: p.parent_id.clone(),
            position: p.position,
            created_at: ts,
            modified_at: ts,
        }),
        EventBody::CardUpdated(p) => store.patch_card(&p.card_id, &p.changes, ts),
        // Descendants and incident links follow through the FK cascade.
        EventBody::CardDeleted(p) => store.delete_card_row(&p.card_id),
        EventBody::CardMoved(p) => {
            store.move_card_row(&p.card_id, p.new_parent_id.as_deref(), p.new_position, ts)
        }
        EventBody::LinkCreated(p) => store.insert_link(&Link {
            id: p.link_id.clone(),
            card_a_id: p.card_a_id.clone(),
            card_b_id: p.card_b_id.clone(),
            link_type: p.link_type.clone(),
            created_from: p.created_from,
            metadata: p.metadata.clone(),
            created_at: ts,
        }),
        EventBody::LinkUpdated(p) => store.patch_link(&p.link_id, &p.changes),
        EventBody::LinkDeleted(p) => store.delete_link_row(&p.link_id),
        EventBody::ConfigUpdated(p) => {
            for (key, value) in p.changes.entries()? {
                store.upsert_config_entry(&key, &value)?;
            }
            Ok(())
        }
    }
}

/// Append `event` to the log and apply it, as one transaction.
pub fn commit(store: &SqliteStore, event: &Event) -> CoreResult<()> {
    store.with_tx(|s| {
        s.append_event(event)?;
        apply(s, event)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bartleby_core::event::new_event;
    use bartleby_core::{
        CardChanges, CardCreated, CardDeleted, CardMoved, CardUpdated, ConfigPatch,
        ConfigUpdated, CreatedFrom, LinkChanges, LinkCreated, LinkDeleted, LinkUpdated, MetaMap,
        ProjectConfig,
    };

    fn at(body: EventBody, ts: i64) -> Event {
        let mut e = new_event(body, None);
        e.timestamp = ts;
        e
    }

    fn created(id: &str, parent: Option<&str>, ts: i64) -> Event {
        at(
            EventBody::CardCreated(CardCreated {
                card_id: id.into(),
                title: format!("Card {id}"),
                content: String::new(),
                card_type: "note".into(),
                metadata: MetaMap::new(),
                parent_id: parent.map(str::to_string),
                position: 0,
            }),
            ts,
        )
    }

    fn linked(id: &str, a: &str, b: &str, ts: i64) -> Event {
        at(
            EventBody::LinkCreated(LinkCreated {
                link_id: id.into(),
                card_a_id: a.into(),
                card_b_id: b.into(),
                link_type: "supports".into(),
                created_from: CreatedFrom::Explicit,
                metadata: MetaMap::new(),
            }),
            ts,
        )
    }

    #[test]
    fn card_lifecycle() {
        let store = SqliteStore::open_in_memory().unwrap();
        commit(&store, &created("a", None, 10)).unwrap();
        let card = store.get_card("a").unwrap().unwrap();
        assert_eq!(card.created_at, 10);
        assert_eq!(card.modified_at, 10);

        commit(
            &store,
            &at(
                EventBody::CardUpdated(CardUpdated {
                    card_id: "a".into(),
                    changes: CardChanges {
                        title: Some("Renamed".into()),
                        ..Default::default()
                    },
                }),
                20,
            ),
        )
        .unwrap();
        let card = store.get_card("a").unwrap().unwrap();
        assert_eq!(card.title, "Renamed");
        assert_eq!(card.content, "");
        assert_eq!(card.modified_at, 20);
        assert_eq!(card.created_at, 10);

        commit(&store, &created("p", None, 25)).unwrap();
        commit(
            &store,
            &at(
                EventBody::CardMoved(CardMoved {
                    card_id: "a".into(),
                    old_parent_id: None,
                    new_parent_id: Some("p".into()),
                    old_position: 0,
                    new_position: 3,
                }),
                30,
            ),
        )
        .unwrap();
        let card = store.get_card("a").unwrap().unwrap();
        assert_eq!(card.parent_id.as_deref(), Some("p"));
        assert_eq!(card.position, 3);
        assert_eq!(card.modified_at, 30);

        commit(
            &store,
            &at(
                EventBody::CardDeleted(CardDeleted {
                    card_id: "p".into(),
                    cascaded_card_ids: vec!["a".into()],
                    cascaded_link_ids: Vec::new(),
                }),
                40,
            ),
        )
        .unwrap();
        assert!(store.get_card("p").unwrap().is_none());
        assert!(store.get_card("a").unwrap().is_none());
        assert_eq!(store.event_count().unwrap(), 5);
    }

    #[test]
    fn link_lifecycle() {
        let store = SqliteStore::open_in_memory().unwrap();
        commit(&store, &created("a", None, 1)).unwrap();
        commit(&store, &created("b", None, 2)).unwrap();
        commit(&store, &linked("l", "a", "b", 3)).unwrap();
        assert_eq!(store.get_link("l").unwrap().unwrap().created_at, 3);

        let mut meta = MetaMap::new();
        meta.insert("note".into(), "why".into());
        commit(
            &store,
            &at(
                EventBody::LinkUpdated(LinkUpdated {
                    link_id: "l".into(),
                    changes: LinkChanges {
                        metadata: Some(meta.clone()),
                        ..Default::default()
                    },
                }),
                4,
            ),
        )
        .unwrap();
        let link = store.get_link("l").unwrap().unwrap();
        assert_eq!(link.metadata, meta);
        assert_eq!(link.link_type, "supports");

        commit(
            &store,
            &at(
                EventBody::LinkDeleted(LinkDeleted {
                    link_id: "l".into(),
                }),
                5,
            ),
        )
        .unwrap();
        assert!(store.get_link("l").unwrap().is_none());
    }

    #[test]
    fn config_update_replaces_only_named_keys() {
        let store = SqliteStore::open_in_memory().unwrap();
        commit(
            &store,
            &at(
                EventBody::ConfigUpdated(ConfigUpdated {
                    changes: ProjectConfig::bootstrap().as_patch(),
                }),
                1,
            ),
        )
        .unwrap();

        let mut meta = MetaMap::new();
        meta.insert("title".into(), "My Novel".into());
        commit(
            &store,
            &at(
                EventBody::ConfigUpdated(ConfigUpdated {
                    changes: ConfigPatch {
                        project_metadata: Some(meta),
                        ..Default::default()
                    },
                }),
                2,
            ),
        )
        .unwrap();

        let config = store.get_config().unwrap();
        assert_eq!(config.title(), Some("My Novel"));
        assert_eq!(config.card_types, ProjectConfig::bootstrap().card_types);
        assert_eq!(config.link_types, ProjectConfig::bootstrap().link_types);
    }

    #[test]
    fn failed_apply_leaves_no_event() {
        let store = SqliteStore::open_in_memory().unwrap();
        // Parent does not exist: the view insert fails, so the append rolls back.
        let err = commit(&store, &created("orphan", Some("ghost"), 1)).unwrap_err();
        assert_eq!(err.code(), "STORAGE_ERROR");
        assert_eq!(store.event_count().unwrap(), 0);
        assert!(store.get_card("orphan").unwrap().is_none());
    }
}
