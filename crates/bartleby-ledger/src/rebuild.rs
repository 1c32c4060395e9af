use bartleby_core::CoreResult;
use tracing::info;

use crate::projector;
use crate::sqlite_store::SqliteStore;

/// Counts reported after a full replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildReport {
    pub events_applied: usize,
    pub cards: usize,
    pub links: usize,
}

/// Clear every view and replay the whole log through the projector.
///
/// Runs in a single transaction: if any event fails to apply, the previous
/// views are left untouched and the error is returned.
pub fn rebuild_views(store: &SqliteStore) -> CoreResult<RebuildReport> {
    let report = store.with_tx(|s| {
        s.clear_views()?;
        let events = s.read_all()?;
        for event in &events {
            projector::apply(s, event)?;
        }
        Ok(RebuildReport {
            events_applied: events.len(),
            cards: s.all_cards()?.len(),
            links: s.all_links()?.len(),
        })
    })?;
    info!(
        events = report.events_applied,
        cards = report.cards,
        links = report.links,
        "views rebuilt"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bartleby_core::event::new_event;
    use bartleby_core::{
        CardChanges, CardCreated, CardDeleted, CardUpdated, ConfigUpdated, CreatedFrom, Event,
        EventBody, LinkCreated, MetaMap, ProjectConfig,
    };
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn tmp_db_path() -> std::path::PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!(
            "bartleby_rebuild_{}_{n}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir.join("bartleby.db")
    }

    fn card(id: &str, parent: Option<&str>) -> EventBody {
        EventBody::CardCreated(CardCreated {
            card_id: id.into(),
            title: id.to_uppercase(),
            content: format!("body of {id}"),
            card_type: "note".into(),
            metadata: MetaMap::new(),
            parent_id: parent.map(str::to_string),
            position: 0,
        })
    }

    fn link(id: &str, a: &str, b: &str) -> EventBody {
        EventBody::LinkCreated(LinkCreated {
            link_id: id.into(),
            card_a_id: a.into(),
            card_b_id: b.into(),
            link_type: "mentions".into(),
            created_from: CreatedFrom::InlineA,
            metadata: MetaMap::new(),
        })
    }

    fn commit_all(store: &SqliteStore, bodies: Vec<EventBody>) {
        for body in bodies {
            let floor = store.last_event_timestamp().unwrap();
            let event: Event = new_event(body, floor);
            projector::commit(store, &event).unwrap();
        }
    }

    fn history() -> Vec<EventBody> {
        vec![
            EventBody::ConfigUpdated(ConfigUpdated {
                changes: ProjectConfig::bootstrap().as_patch(),
            }),
            card("root", None),
            card("child", Some("root")),
            card("leaf", Some("child")),
            card("side", None),
            link("l1", "leaf", "side"),
            link("l2", "root", "side"),
            EventBody::CardUpdated(CardUpdated {
                card_id: "side".into(),
                changes: CardChanges {
                    content: Some("edited".into()),
                    ..Default::default()
                },
            }),
            EventBody::CardDeleted(CardDeleted {
                card_id: "child".into(),
                cascaded_card_ids: vec!["leaf".into()],
                cascaded_link_ids: vec!["l1".into()],
            }),
        ]
    }

    #[test]
    fn replay_matches_incremental_state() {
        let path = tmp_db_path();
        let store = SqliteStore::open_or_create(&path, 5000).unwrap();
        commit_all(&store, history());
        let before = store.view_snapshot().unwrap();

        let report = rebuild_views(&store).unwrap();
        assert_eq!(report.events_applied, 9);
        assert_eq!(report.cards, 2);
        assert_eq!(report.links, 1);
        assert_eq!(store.view_snapshot().unwrap(), before);
    }

    #[test]
    fn replay_reproduces_delete_cascade() {
        let store = SqliteStore::open_in_memory().unwrap();
        commit_all(&store, history());
        rebuild_views(&store).unwrap();
        assert!(store.get_card("leaf").unwrap().is_none());
        assert!(store.get_link("l1").unwrap().is_none());
        assert!(store.get_link("l2").unwrap().is_some());
    }

    #[test]
    fn rebuild_is_repeatable() {
        let store = SqliteStore::open_in_memory().unwrap();
        commit_all(&store, history());
        let first = rebuild_views(&store).unwrap();
        let snapshot = store.view_snapshot().unwrap();
        let second = rebuild_views(&store).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.view_snapshot().unwrap(), snapshot);
        assert_eq!(store.event_count().unwrap(), 9);
    }

    #[test]
    fn failed_replay_keeps_previous_views() {
        let store = SqliteStore::open_in_memory().unwrap();
        commit_all(&store, history());
        let before = store.view_snapshot().unwrap();

        // A log entry whose projection violates the parent foreign key.
        let bad = new_event(card("stray", Some("nowhere")), store.last_event_timestamp().unwrap());
        store.append_event(&bad).unwrap();

        let err = rebuild_views(&store).unwrap_err();
        assert_eq!(err.code(), "STORAGE_ERROR");
        assert_eq!(store.view_snapshot().unwrap(), before);
    }

    #[test]
    fn empty_log_rebuilds_to_empty_views() {
        let store = SqliteStore::open_in_memory().unwrap();
        let report = rebuild_views(&store).unwrap();
        assert_eq!(report.events_applied, 0);
        assert!(store.all_cards().unwrap().is_empty());
        assert_eq!(store.get_config().unwrap(), ProjectConfig::default());
    }
}
