use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Event id / entity id format: lowercase hyphenated UUIDv4.
pub type EventId = String;
pub type CardId = String;
pub type LinkId = String;

/// Link type created by inline `[[...]]` references.
pub const MENTIONS_LINK_TYPE: &str = "mentions";

/// Metadata key holding the literal reference text written on the A side.
pub const INLINE_REF_A: &str = "inlineRefA";
/// Metadata key holding the literal reference text written on the B side.
pub const INLINE_REF_B: &str = "inlineRefB";

// ── Metadata ────────────────────────────────────────────────────────

/// Schema-less key/value container for card and link metadata.
pub type MetaMap = BTreeMap<String, MetaValue>;

/// A single metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<MetaValue>),
    Map(MetaMap),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for MetaValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for MetaValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for MetaValue {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

// ── Cards ───────────────────────────────────────────────────────────

/// A node of the content tree (materialized view row).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: CardId,
    pub title: String,
    pub content: String,
    pub card_type: String,
    pub metadata: MetaMap,
    pub parent_id: Option<CardId>,
    pub position: i64,
    pub created_at: i64,
    pub modified_at: i64,
}

/// Partial card update. Only present fields are patched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetaMap>,
}

impl CardChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.card_type.is_none()
            && self.metadata.is_none()
    }
}

/// Filter for listing cards.
#[derive(Debug, Clone, Default)]
pub struct CardFilter {
    pub card_type: Option<String>,
    /// `Some(None)` selects root cards, `Some(Some(id))` children of `id`.
    pub parent_id: Option<Option<CardId>>,
}

// ── Links ───────────────────────────────────────────────────────────

/// Provenance of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CreatedFrom {
    #[serde(rename = "explicit")]
    Explicit,
    #[serde(rename = "inline-A")]
    InlineA,
    #[serde(rename = "inline-B")]
    InlineB,
}

impl CreatedFrom {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::InlineA => "inline-A",
            Self::InlineB => "inline-B",
        }
    }

    pub fn is_inline(self) -> bool {
        matches!(self, Self::InlineA | Self::InlineB)
    }
}

impl fmt::Display for CreatedFrom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CreatedFrom {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s {
            "explicit" => Ok(Self::Explicit),
            "inline-A" => Ok(Self::InlineA),
            "inline-B" => Ok(Self::InlineB),
            other => Err(CoreError::InvalidArgument(format!(
                "unknown link provenance '{other}'"
            ))),
        }
    }
}

/// An edge between two cards (materialized view row).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub id: LinkId,
    pub card_a_id: CardId,
    pub card_b_id: CardId,
    pub link_type: String,
    pub created_from: CreatedFrom,
    pub metadata: MetaMap,
    pub created_at: i64,
}

impl Link {
    pub fn touches(&self, card_id: &str) -> bool {
        self.card_a_id == card_id || self.card_b_id == card_id
    }

    /// The endpoint that is not `card_id`.
    pub fn other_end(&self, card_id: &str) -> &str {
        if self.card_a_id == card_id {
            &self.card_b_id
        } else {
            &self.card_a_id
        }
    }

    /// Metadata key for inline references written by `card_id`'s side.
    pub fn inline_key_for(&self, card_id: &str) -> &'static str {
        if self.card_a_id == card_id {
            INLINE_REF_A
        } else {
            INLINE_REF_B
        }
    }

    pub fn inline_ref(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(MetaValue::as_str)
    }
}

/// Partial link update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetaMap>,
}

impl LinkChanges {
    pub fn is_empty(&self) -> bool {
        self.link_type.is_none() && self.metadata.is_none()
    }
}

/// Filter for listing links.
#[derive(Debug, Clone, Default)]
pub struct LinkFilter {
    pub card_id: Option<CardId>,
    pub link_type: Option<String>,
}

// ── Project config ──────────────────────────────────────────────────

/// Card or link type descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bidirectional: Option<bool>,
}

impl TypeDescriptor {
    fn card(id: &str, label: &str, color: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            color: Some(color.to_string()),
            bidirectional: None,
        }
    }

    fn link(id: &str, label: &str, bidirectional: bool) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            color: None,
            bidirectional: Some(bidirectional),
        }
    }
}

/// Singleton project configuration. Each field is one row of the `config` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    #[serde(default)]
    pub project_metadata: MetaMap,
    #[serde(default)]
    pub card_types: Vec<TypeDescriptor>,
    #[serde(default)]
    pub link_types: Vec<TypeDescriptor>,
}

impl ProjectConfig {
    /// Configuration recorded on first boot.
    pub fn bootstrap() -> Self {
        let mut project_metadata = MetaMap::new();
        project_metadata.insert("title".to_string(), "Untitled Project".into());
        Self {
            project_metadata,
            card_types: vec![
                TypeDescriptor::card("chapter", "Chapter", "#3b82f6"),
                TypeDescriptor::card("scene", "Scene", "#8b5cf6"),
                TypeDescriptor::card("character", "Character", "#ec4899"),
                TypeDescriptor::card("location", "Location", "#10b981"),
                TypeDescriptor::card("note", "Note", "#6b7280"),
            ],
            link_types: vec![
                TypeDescriptor::link("parent-child", "Parent/Child", true),
                TypeDescriptor::link("sequence", "Follows", false),
                TypeDescriptor::link(MENTIONS_LINK_TYPE, "Mentions", true),
                TypeDescriptor::link("contradicts", "Contradicts", true),
                TypeDescriptor::link("supports", "Supports", true),
                TypeDescriptor::link("character-in", "Character In", true),
                TypeDescriptor::link("located-at", "Located At", true),
            ],
        }
    }

    /// The full config expressed as a patch touching every key.
    pub fn as_patch(&self) -> ConfigPatch {
        ConfigPatch {
            project_metadata: Some(self.project_metadata.clone()),
            card_types: Some(self.card_types.clone()),
            link_types: Some(self.link_types.clone()),
        }
    }

    /// Shallow merge: keys present in `patch` replace wholesale.
    pub fn merge(&mut self, patch: &ConfigPatch) {
        if let Some(meta) = &patch.project_metadata {
            self.project_metadata = meta.clone();
        }
        if let Some(types) = &patch.card_types {
            self.card_types = types.clone();
        }
        if let Some(types) = &patch.link_types {
            self.link_types = types.clone();
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.project_metadata.get("title").and_then(MetaValue::as_str)
    }
}

/// Changed top-level config keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_metadata: Option<MetaMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_types: Option<Vec<TypeDescriptor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_types: Option<Vec<TypeDescriptor>>,
}

impl ConfigPatch {
    pub fn is_empty(&self) -> bool {
        self.project_metadata.is_none() && self.card_types.is_none() && self.link_types.is_none()
    }

    /// `(key, json value)` for each present key, in stable order.
    pub fn entries(&self) -> CoreResult<Vec<(String, serde_json::Value)>> {
        let value = serde_json::to_value(self)?;
        Ok(match value {
            serde_json::Value::Object(map) => map.into_iter().collect(),
            _ => Vec::new(),
        })
    }
}

// ── Events ──────────────────────────────────────────────────────────

/// Wire names of the event types.
pub mod event_type {
    pub const CARD_CREATED: &str = "card.created";
    pub const CARD_UPDATED: &str = "card.updated";
    pub const CARD_DELETED: &str = "card.deleted";
    pub const CARD_MOVED: &str = "card.moved";
    pub const LINK_CREATED: &str = "link.created";
    pub const LINK_UPDATED: &str = "link.updated";
    pub const LINK_DELETED: &str = "link.deleted";
    pub const CONFIG_UPDATED: &str = "config.updated";

    pub const ALL: [&str; 8] = [
        CARD_CREATED,
        CARD_UPDATED,
        CARD_DELETED,
        CARD_MOVED,
        LINK_CREATED,
        LINK_UPDATED,
        LINK_DELETED,
        CONFIG_UPDATED,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardCreated {
    pub card_id: CardId,
    pub title: String,
    pub content: String,
    pub card_type: String,
    pub metadata: MetaMap,
    pub parent_id: Option<CardId>,
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardUpdated {
    pub card_id: CardId,
    pub changes: CardChanges,
}

/// Cascaded ids are recorded for readers of the log; the storage cascade
/// performs the actual removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardDeleted {
    pub card_id: CardId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cascaded_card_ids: Vec<CardId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cascaded_link_ids: Vec<LinkId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardMoved {
    pub card_id: CardId,
    pub old_parent_id: Option<CardId>,
    pub new_parent_id: Option<CardId>,
    pub old_position: i64,
    pub new_position: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkCreated {
    pub link_id: LinkId,
    pub card_a_id: CardId,
    pub card_b_id: CardId,
    pub link_type: String,
    pub created_from: CreatedFrom,
    pub metadata: MetaMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkUpdated {
    pub link_id: LinkId,
    pub changes: LinkChanges,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkDeleted {
    pub link_id: LinkId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdated {
    pub changes: ConfigPatch,
}

/// Type-specific event payload, serialized as `{"type": ..., "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EventBody {
    #[serde(rename = "card.created")]
    CardCreated(CardCreated),
    #[serde(rename = "card.updated")]
    CardUpdated(CardUpdated),
    #[serde(rename = "card.deleted")]
    CardDeleted(CardDeleted),
    #[serde(rename = "card.moved")]
    CardMoved(CardMoved),
    #[serde(rename = "link.created")]
    LinkCreated(LinkCreated),
    #[serde(rename = "link.updated")]
    LinkUpdated(LinkUpdated),
    #[serde(rename = "link.deleted")]
    LinkDeleted(LinkDeleted),
    #[serde(rename = "config.updated")]
    ConfigUpdated(ConfigUpdated),
}

impl EventBody {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CardCreated(_) => event_type::CARD_CREATED,
            Self::CardUpdated(_) => event_type::CARD_UPDATED,
            Self::CardDeleted(_) => event_type::CARD_DELETED,
            Self::CardMoved(_) => event_type::CARD_MOVED,
            Self::LinkCreated(_) => event_type::LINK_CREATED,
            Self::LinkUpdated(_) => event_type::LINK_UPDATED,
            Self::LinkDeleted(_) => event_type::LINK_DELETED,
            Self::ConfigUpdated(_) => event_type::CONFIG_UPDATED,
        }
    }

    /// Id of the card or link the event is about; `None` for config events.
    pub fn subject_id(&self) -> Option<&str> {
        match self {
            Self::CardCreated(p) => Some(&p.card_id),
            Self::CardUpdated(p) => Some(&p.card_id),
            Self::CardDeleted(p) => Some(&p.card_id),
            Self::CardMoved(p) => Some(&p.card_id),
            Self::LinkCreated(p) => Some(&p.link_id),
            Self::LinkUpdated(p) => Some(&p.link_id),
            Self::LinkDeleted(p) => Some(&p.link_id),
            Self::ConfigUpdated(_) => None,
        }
    }
}

/// An immutable fact in the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    /// Epoch milliseconds; non-decreasing in append order.
    pub timestamp: i64,
    #[serde(flatten)]
    pub body: EventBody,
}

impl Event {
    pub fn event_type(&self) -> &'static str {
        self.body.kind()
    }

    /// The payload alone, as stored in the `events.payload` column.
    pub fn payload_json(&self) -> CoreResult<serde_json::Value> {
        let mut tagged = serde_json::to_value(&self.body)?;
        Ok(tagged
            .get_mut("payload")
            .map(serde_json::Value::take)
            .unwrap_or(serde_json::Value::Null))
    }

    /// Rebuild an event from its stored columns.
    pub fn from_parts(
        id: String,
        timestamp: i64,
        event_type: &str,
        payload: serde_json::Value,
    ) -> CoreResult<Self> {
        if !event_type::ALL.contains(&event_type) {
            return Err(CoreError::Storage(format!(
                "unknown event type '{event_type}' in log"
            )));
        }
        let body: EventBody = serde_json::from_value(serde_json::json!({
            "type": event_type,
            "payload": payload,
        }))?;
        Ok(Self {
            id,
            timestamp,
            body,
        })
    }
}
