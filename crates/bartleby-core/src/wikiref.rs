//! Wiki-style `[[...]]` references: lexical parsing and resolution against
//! the card universe.
//!
//! Three forms are recognized inside the brackets:
//! - `[[#<id>]]`: direct card id,
//! - `[[<type>:<title>]]`: title restricted to a card type (split on the first colon),
//! - `[[<title>]]`: plain title.
//!
//! Parsing performs no lookups. Resolution never picks among several matches:
//! more than one candidate is reported as ambiguous.

use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::types::{Card, CardId};

fn wiki_link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\[([^\]]+)\]\]").expect("wiki link pattern is valid"))
}

/// What a reference points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RefTarget {
    #[serde(rename_all = "camelCase")]
    Id {
        card_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Title {
        card_type: Option<String>,
        title: String,
    },
}

/// One `[[...]]` occurrence in a text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedReference {
    /// Literal source text including the brackets.
    pub text: String,
    pub target: RefTarget,
    /// Character offsets, start inclusive, end exclusive.
    pub span: Range<usize>,
}

/// Extract every reference from `markdown`, in document order.
pub fn parse_references(markdown: &str) -> Vec<ParsedReference> {
    let mut refs = Vec::new();
    // Running byte -> char offset conversion; matches arrive left to right.
    let mut byte_cursor = 0;
    let mut char_cursor = 0;

    for caps in wiki_link_regex().captures_iter(markdown) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        char_cursor += markdown[byte_cursor..whole.start()].chars().count();
        let start = char_cursor;
        let end = start + whole.as_str().chars().count();
        char_cursor = end;
        byte_cursor = whole.end();

        refs.push(ParsedReference {
            text: whole.as_str().to_string(),
            target: parse_target(inner.as_str().trim()),
            span: start..end,
        });
    }
    refs
}

fn parse_target(inner: &str) -> RefTarget {
    if let Some(id) = inner.strip_prefix('#') {
        return RefTarget::Id {
            card_id: id.to_string(),
        };
    }
    match inner.split_once(':') {
        Some((card_type, title)) => RefTarget::Title {
            card_type: Some(card_type.trim())
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            title: title.trim().to_string(),
        },
        None => RefTarget::Title {
            card_type: None,
            title: inner.to_string(),
        },
    }
}

/// Outcome of resolving one reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Resolution {
    #[serde(rename_all = "camelCase")]
    Resolved { card_id: CardId },
    /// Ghost reference: nothing matches.
    Unresolved,
    Ambiguous { candidates: Vec<CardId> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedReference {
    pub reference: ParsedReference,
    pub match_count: usize,
    pub resolution: Resolution,
}

impl ResolvedReference {
    pub fn resolved_card_id(&self) -> Option<&str> {
        match &self.resolution {
            Resolution::Resolved { card_id } => Some(card_id),
            _ => None,
        }
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self.resolution, Resolution::Ambiguous { .. })
    }

    pub fn is_ghost(&self) -> bool {
        matches!(self.resolution, Resolution::Unresolved)
    }
}

/// Cards a reference matches, in the order of `cards`.
pub fn matching_cards<'a>(reference: &ParsedReference, cards: &'a [Card]) -> Vec<&'a Card> {
    match &reference.target {
        RefTarget::Id { card_id } => cards.iter().filter(|c| &c.id == card_id).take(1).collect(),
        RefTarget::Title { card_type, title } => {
            let wanted = title.to_lowercase();
            cards
                .iter()
                .filter(|c| card_type.as_ref().map_or(true, |t| &c.card_type == t))
                .filter(|c| c.title.to_lowercase() == wanted)
                .collect()
        }
    }
}

/// Resolve a single reference against `cards`.
pub fn resolve_reference(reference: &ParsedReference, cards: &[Card]) -> ResolvedReference {
    let matches = matching_cards(reference, cards);
    let resolution = match matches.as_slice() {
        [] => Resolution::Unresolved,
        [only] => Resolution::Resolved {
            card_id: only.id.clone(),
        },
        many => Resolution::Ambiguous {
            candidates: many.iter().map(|c| c.id.clone()).collect(),
        },
    };
    ResolvedReference {
        reference: reference.clone(),
        match_count: matches.len(),
        resolution,
    }
}

/// Parse and resolve every reference in `markdown`.
pub fn resolve_references(markdown: &str, cards: &[Card]) -> Vec<ResolvedReference> {
    parse_references(markdown)
        .iter()
        .map(|r| resolve_reference(r, cards))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MetaMap;

    fn card(id: &str, title: &str, card_type: &str) -> Card {
        Card {
            id: id.into(),
            title: title.into(),
            content: String::new(),
            card_type: card_type.into(),
            metadata: MetaMap::new(),
            parent_id: None,
            position: 0,
            created_at: 0,
            modified_at: 0,
        }
    }

    #[test]
    fn parses_three_forms_in_order() {
        let refs = parse_references("a [[#abc]] b [[Location: Old Mill]] c [[Card B]]");
        assert_eq!(refs.len(), 3);
        assert_eq!(
            refs[0].target,
            RefTarget::Id {
                card_id: "abc".into()
            }
        );
        assert_eq!(
            refs[1].target,
            RefTarget::Title {
                card_type: Some("Location".into()),
                title: "Old Mill".into()
            }
        );
        assert_eq!(
            refs[2].target,
            RefTarget::Title {
                card_type: None,
                title: "Card B".into()
            }
        );
        assert_eq!(refs[2].text, "[[Card B]]");
    }

    #[test]
    fn typed_form_splits_on_first_colon_only() {
        let refs = parse_references("[[scene: 10:30 train]]");
        assert_eq!(
            refs[0].target,
            RefTarget::Title {
                card_type: Some("scene".into()),
                title: "10:30 train".into()
            }
        );
    }

    #[test]
    fn spans_are_character_offsets() {
        let text = "éé [[X]] ü [[Y]]";
        let refs = parse_references(text);
        assert_eq!(refs[0].span, 3..8);
        assert_eq!(refs[1].span, 11..16);
        let chars: Vec<char> = text.chars().collect();
        let literal: String = chars[refs[1].span.clone()].iter().collect();
        assert_eq!(literal, "[[Y]]");
    }

    #[test]
    fn no_brackets_no_references() {
        assert!(parse_references("plain [text] and [single]").is_empty());
        assert!(parse_references("").is_empty());
        assert!(parse_references("[[]]").is_empty());
    }

    #[test]
    fn title_resolution_is_case_insensitive() {
        let cards = vec![card("1", "Card B", "note")];
        let r = resolve_references("see [[card b]]", &cards);
        assert_eq!(r[0].resolved_card_id(), Some("1"));
        assert_eq!(r[0].match_count, 1);
    }

    #[test]
    fn two_matches_are_ambiguous_not_resolved() {
        let cards = vec![card("1", "Location", "note"), card("2", "Location", "scene")];
        let r = resolve_references("[[Location]]", &cards);
        assert_eq!(r[0].match_count, 2);
        assert!(r[0].is_ambiguous());
        assert_eq!(r[0].resolved_card_id(), None);
    }

    #[test]
    fn type_qualifier_narrows_candidates() {
        let cards = vec![card("1", "Location", "note"), card("2", "Location", "scene")];
        let r = resolve_references("[[scene:Location]]", &cards);
        assert_eq!(r[0].resolved_card_id(), Some("2"));
    }

    #[test]
    fn empty_type_qualifier_matches_any_type() {
        for text in ["[[:Card B]]", "[[ : Card B ]]"] {
            let refs = parse_references(text);
            assert_eq!(
                refs[0].target,
                RefTarget::Title {
                    card_type: None,
                    title: "Card B".into()
                }
            );
        }
        let cards = vec![card("1", "Card B", "note")];
        let r = resolve_references("[[:Card B]]", &cards);
        assert_eq!(r[0].match_count, 1);
        assert_eq!(r[0].resolved_card_id(), Some("1"));
    }

    #[test]
    fn unknown_title_is_ghost() {
        let cards = vec![card("1", "Card B", "note")];
        let r = resolve_references("[[Card C]]", &cards);
        assert!(r[0].is_ghost());
        assert_eq!(r[0].match_count, 0);
    }

    #[test]
    fn direct_id_resolves_only_when_present() {
        let cards = vec![card("1", "Card B", "note")];
        let r = resolve_references("[[#1]] [[#2]]", &cards);
        assert_eq!(r[0].resolved_card_id(), Some("1"));
        assert!(r[1].is_ghost());
    }
}
