//! The explicitly owned context every operation runs through.
//!
//! `Workspace::open` is the one-time initialization step: it lays out
//! `.bartleby/`, takes the process lock, opens the store (creating the schema)
//! and records the default config on first boot. All access to the store goes
//! through one mutex, so an append + apply pair, and the reconciliation a
//! command triggers, never interleave with another command or a rebuild.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use bartleby_core::tree::{CardTree, TreeNode};
use bartleby_core::wikiref::{self, ResolvedReference};
use bartleby_core::{
    event_type, Card, CardChanges, CardFilter, ConfigPatch, CoreError, CoreResult, Event, Link,
    LinkChanges, LinkFilter, ProjectConfig,
};
use bartleby_ledger::{
    rebuild_views, BartlebyPaths, RebuildReport, Settings, SqliteStore, WorkspaceLock,
};
use serde::Serialize;
use tracing::info;

use crate::commands::{self, Committed, NewCard, NewLink};
use crate::network::{self, Network};
use crate::{reconcile, search, tree_edit};

/// A link seen from one of its cards, with the card at the other end.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkedCard {
    pub link: Link,
    pub card: Card,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardDetail {
    pub card: Card,
    pub links: Vec<LinkedCard>,
}

/// A reference that matches more than one card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmbiguousReference {
    pub text: String,
    pub matches: Vec<Card>,
}

pub struct Workspace {
    paths: Option<BartlebyPaths>,
    settings: Settings,
    store: Mutex<SqliteStore>,
    _lock: Option<WorkspaceLock>,
}

impl Workspace {
    /// Open (initializing if needed) the workspace rooted at `root`.
    pub fn open(root: &Path) -> CoreResult<Self> {
        let paths = BartlebyPaths::discover(root);
        paths.ensure_layout()?;
        let lock = WorkspaceLock::acquire(&paths)?;
        let settings = Settings::load(&paths.settings_json)?;
        let store = SqliteStore::open_or_create(&paths.db_file, settings.busy_timeout_ms)?;
        if commands::bootstrap_config(&store)?.is_some() {
            info!(root = %paths.root.display(), "bootstrapped project config");
        }
        info!(db = %paths.db_file.display(), "workspace opened");
        Ok(Self {
            paths: Some(paths),
            settings,
            store: Mutex::new(store),
            _lock: Some(lock),
        })
    }

    /// A private workspace backed by an in-memory database.
    pub fn open_in_memory() -> CoreResult<Self> {
        let store = SqliteStore::open_in_memory()?;
        commands::bootstrap_config(&store)?;
        Ok(Self {
            paths: None,
            settings: Settings::default(),
            store: Mutex::new(store),
            _lock: None,
        })
    }

    /// Checkpoint the database and release the workspace lock.
    pub fn close(self) {
        if let Some(paths) = &self.paths {
            info!(root = %paths.root.display(), "workspace closed");
        }
        drop(self);
    }

    pub fn paths(&self) -> Option<&BartlebyPaths> {
        self.paths.as_ref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn store(&self) -> CoreResult<MutexGuard<'_, SqliteStore>> {
        self.store
            .lock()
            .map_err(|_| CoreError::Storage("workspace store mutex poisoned".to_string()))
    }

    /// Read under the store mutex.
    fn read<T>(&self, f: impl FnOnce(&SqliteStore) -> CoreResult<T>) -> CoreResult<T> {
        let store = self.store()?;
        f(&store)
    }

    /// Run a command and everything it triggers as one transaction.
    fn command<T>(&self, f: impl FnOnce(&SqliteStore) -> CoreResult<T>) -> CoreResult<T> {
        let store = self.store()?;
        store.with_tx(f)
    }

    // ── Cards ───────────────────────────────────────────────────────

    /// Create a card; non-empty content is reconciled into `mentions` links.
    pub fn create_card(&self, input: NewCard) -> CoreResult<Committed<Card>> {
        self.command(|s| {
            let mut out = commands::create_card(s, input)?;
            if !out.value.content.is_empty() {
                out.reconciled = reconcile::reconcile_card(s, &out.value.id)?;
            }
            Ok(out)
        })
    }

    /// Patch a card; a content change is reconciled into `mentions` links.
    pub fn update_card(&self, id: &str, changes: CardChanges) -> CoreResult<Committed<Card>> {
        self.command(|s| {
            let content_changed = changes.content.is_some();
            let mut out = commands::update_card(s, id, changes)?;
            if content_changed {
                out.reconciled = reconcile::reconcile_card(s, id)?;
            }
            Ok(out)
        })
    }

    pub fn delete_card(&self, id: &str) -> CoreResult<Event> {
        self.command(|s| commands::delete_card(s, id))
    }

    /// Unguarded move; callers editing the tree use [`Self::move_card_in_tree`].
    pub fn move_card(
        &self,
        id: &str,
        new_parent_id: Option<&str>,
        position: Option<i64>,
    ) -> CoreResult<Committed<Card>> {
        self.command(|s| commands::move_card(s, id, new_parent_id, position))
    }

    /// Move with the cycle guard applied first.
    pub fn move_card_in_tree(
        &self,
        id: &str,
        new_parent_id: Option<&str>,
        position: Option<i64>,
    ) -> CoreResult<Committed<Card>> {
        self.command(|s| tree_edit::move_card_in_tree(s, id, new_parent_id, position))
    }

    pub fn get_card(&self, id: &str) -> CoreResult<Option<Card>> {
        self.read(|s| s.get_card(id))
    }

    pub fn list_cards(&self, filter: &CardFilter) -> CoreResult<Vec<Card>> {
        self.read(|s| s.list_cards(filter))
    }

    pub fn search_cards(&self, query: &str) -> CoreResult<Vec<Card>> {
        self.read(|s| search::search_cards(s, query, self.settings.search_limit))
    }

    /// The whole hierarchy as nested nodes.
    pub fn card_tree(&self) -> CoreResult<Vec<TreeNode>> {
        self.read(|s| Ok(CardTree::new(s.all_cards()?).forest()))
    }

    /// Path from the root down to `id`.
    pub fn breadcrumb(&self, id: &str) -> CoreResult<Vec<Card>> {
        self.read(|s| {
            let tree = CardTree::new(s.all_cards()?);
            if !tree.contains(id) {
                return Err(CoreError::card_not_found(id));
            }
            Ok(tree.breadcrumb(id).into_iter().cloned().collect())
        })
    }

    /// A card with every link touching it, newest link first.
    pub fn card_detail(&self, id: &str) -> CoreResult<CardDetail> {
        self.read(|s| {
            let card = s.get_card(id)?.ok_or_else(|| CoreError::card_not_found(id))?;
            let links = linked_cards(s, id)?;
            Ok(CardDetail { card, links })
        })
    }

    // ── Links ───────────────────────────────────────────────────────

    pub fn create_link(&self, input: NewLink) -> CoreResult<Committed<Link>> {
        self.command(|s| commands::create_link(s, input))
    }

    pub fn update_link(&self, id: &str, changes: LinkChanges) -> CoreResult<Committed<Link>> {
        self.command(|s| commands::update_link(s, id, changes))
    }

    pub fn delete_link(&self, id: &str) -> CoreResult<Event> {
        self.command(|s| commands::delete_link(s, id))
    }

    pub fn get_link(&self, id: &str) -> CoreResult<Option<Link>> {
        self.read(|s| s.get_link(id))
    }

    pub fn list_links(&self, filter: &LinkFilter) -> CoreResult<Vec<Link>> {
        self.read(|s| s.list_links(filter))
    }

    pub fn links_for_card(&self, card_id: &str) -> CoreResult<Vec<LinkedCard>> {
        self.read(|s| {
            if s.get_card(card_id)?.is_none() {
                return Err(CoreError::card_not_found(card_id));
            }
            linked_cards(s, card_id)
        })
    }

    pub fn network(
        &self,
        center_id: &str,
        depth: usize,
        link_types: &[String],
    ) -> CoreResult<Network> {
        self.read(|s| network::card_network(s, center_id, depth, link_types))
    }

    // ── Config ──────────────────────────────────────────────────────

    pub fn get_config(&self) -> CoreResult<ProjectConfig> {
        self.read(|s| s.get_config())
    }

    pub fn update_config(&self, changes: ConfigPatch) -> CoreResult<Committed<ProjectConfig>> {
        self.command(|s| commands::update_config(s, changes))
    }

    // ── Events ──────────────────────────────────────────────────────

    pub fn events_since(&self, timestamp: i64, limit: usize) -> CoreResult<Vec<Event>> {
        self.read(|s| s.read_since(timestamp, limit))
    }

    pub fn all_events(&self) -> CoreResult<Vec<Event>> {
        self.read(|s| s.read_all())
    }

    pub fn events_by_type(&self, kind: &str, limit: usize) -> CoreResult<Vec<Event>> {
        if !event_type::ALL.contains(&kind) {
            return Err(CoreError::InvalidArgument(format!(
                "unknown event type '{kind}'"
            )));
        }
        self.read(|s| s.read_by_type(kind, limit))
    }

    /// Clear and replay every view. Exclusive with commands.
    pub fn rebuild_views(&self) -> CoreResult<RebuildReport> {
        let store = self.store()?;
        rebuild_views(&store)
    }

    // ── References ──────────────────────────────────────────────────

    pub fn resolve_references(&self, text: &str) -> CoreResult<Vec<ResolvedReference>> {
        self.read(|s| Ok(wikiref::resolve_references(text, &s.all_cards()?)))
    }

    /// Literal text of every reference that matches no card.
    pub fn unresolved_references(&self, text: &str) -> CoreResult<Vec<String>> {
        Ok(self
            .resolve_references(text)?
            .into_iter()
            .filter(ResolvedReference::is_ghost)
            .map(|r| r.reference.text)
            .collect())
    }

    pub fn ambiguous_references(&self, text: &str) -> CoreResult<Vec<AmbiguousReference>> {
        self.read(|s| {
            let cards = s.all_cards()?;
            Ok(wikiref::parse_references(text)
                .iter()
                .filter_map(|r| {
                    let matches = wikiref::matching_cards(r, &cards);
                    (matches.len() > 1).then(|| AmbiguousReference {
                        text: r.text.clone(),
                        matches: matches.into_iter().cloned().collect(),
                    })
                })
                .collect())
        })
    }

    /// Re-run reconciliation on a card's stored content.
    pub fn reconcile_card(&self, id: &str) -> CoreResult<Vec<Event>> {
        self.command(|s| reconcile::reconcile_card(s, id))
    }
}

fn linked_cards(store: &SqliteStore, card_id: &str) -> CoreResult<Vec<LinkedCard>> {
    let mut out = Vec::new();
    for link in commands::links_touching(store, card_id)? {
        if let Some(card) = store.get_card(link.other_end(card_id))? {
            out.push(LinkedCard { link, card });
        }
    }
    Ok(out)
}
