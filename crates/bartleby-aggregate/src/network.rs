use std::collections::{HashMap, HashSet, VecDeque};

use bartleby_core::{Card, CoreError, CoreResult, Link};
use bartleby_ledger::SqliteStore;
use serde::Serialize;

/// Cards and links reachable from a center card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Network {
    pub center: Card,
    /// Reached cards in discovery order, excluding the center.
    pub cards: Vec<Card>,
    pub links: Vec<Link>,
}

/// Breadth-first walk outward from `center_id`, up to `depth` hops,
/// optionally following only the given link types.
///
/// Runs over a snapshot of the views taken up front; each card and link is
/// reported once.
pub fn card_network(
    store: &SqliteStore,
    center_id: &str,
    depth: usize,
    link_types: &[String],
) -> CoreResult<Network> {
    let cards: HashMap<String, Card> = store
        .all_cards()?
        .into_iter()
        .map(|c| (c.id.clone(), c))
        .collect();
    let center = cards
        .get(center_id)
        .cloned()
        .ok_or_else(|| CoreError::card_not_found(center_id))?;

    let mut adjacency: HashMap<&str, Vec<&Link>> = HashMap::new();
    // Newest first, matching list order.
    let all_links = store.all_links()?;
    for link in all_links
        .iter()
        .filter(|l| link_types.is_empty() || link_types.contains(&l.link_type))
    {
        adjacency.entry(link.card_a_id.as_str()).or_default().push(link);
        adjacency.entry(link.card_b_id.as_str()).or_default().push(link);
    }

    let mut visited: HashSet<&str> = HashSet::from([center_id]);
    let mut seen_links: HashSet<&str> = HashSet::new();
    let mut out_cards = Vec::new();
    let mut out_links = Vec::new();
    let mut queue: VecDeque<(&str, usize)> = VecDeque::from([(center_id, 0)]);

    while let Some((card_id, hops)) = queue.pop_front() {
        if hops >= depth {
            continue;
        }
        for link in adjacency.get(card_id).into_iter().flatten() {
            if seen_links.insert(link.id.as_str()) {
                out_links.push((*link).clone());
            }
            let other = link.other_end(card_id);
            if visited.insert(other) {
                if let Some(card) = cards.get(other) {
                    out_cards.push(card.clone());
                    queue.push_back((other, hops + 1));
                }
            }
        }
    }

    Ok(Network {
        center,
        cards: out_cards,
        links: out_links,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{create_card, create_link, NewCard, NewLink};

    // a -supports- b -mentions- c -supports- d
    fn chain() -> (SqliteStore, Vec<String>) {
        let s = SqliteStore::open_in_memory().unwrap();
        let ids: Vec<String> = ["a", "b", "c", "d"]
            .iter()
            .map(|t| create_card(&s, NewCard::new(*t, "note")).unwrap().value.id)
            .collect();
        create_link(&s, NewLink::new(&ids[0], &ids[1], "supports")).unwrap();
        create_link(&s, NewLink::new(&ids[1], &ids[2], "mentions")).unwrap();
        create_link(&s, NewLink::new(&ids[2], &ids[3], "supports")).unwrap();
        (s, ids)
    }

    fn titles(cards: &[Card]) -> Vec<&str> {
        cards.iter().map(|c| c.title.as_str()).collect()
    }

    #[test]
    fn depth_limits_hops() {
        let (s, ids) = chain();
        let net = card_network(&s, &ids[0], 1, &[]).unwrap();
        assert_eq!(net.center.title, "a");
        assert_eq!(titles(&net.cards), vec!["b"]);
        assert_eq!(net.links.len(), 1);

        let net = card_network(&s, &ids[0], 3, &[]).unwrap();
        assert_eq!(titles(&net.cards), vec!["b", "c", "d"]);
        assert_eq!(net.links.len(), 3);

        let net = card_network(&s, &ids[0], 0, &[]).unwrap();
        assert!(net.cards.is_empty());
        assert!(net.links.is_empty());
    }

    #[test]
    fn link_type_filter_stops_traversal() {
        let (s, ids) = chain();
        let net = card_network(&s, &ids[0], 5, &["supports".to_string()]).unwrap();
        assert_eq!(titles(&net.cards), vec!["b"]);
        assert!(net.links.iter().all(|l| l.link_type == "supports"));
    }

    #[test]
    fn cycles_are_visited_once() {
        let (s, ids) = chain();
        create_link(&s, NewLink::new(&ids[3], &ids[0], "supports")).unwrap();
        let net = card_network(&s, &ids[1], 10, &[]).unwrap();
        assert_eq!(net.cards.len(), 3);
        assert_eq!(net.links.len(), 4);
        assert!(net.cards.iter().all(|c| c.id != ids[1]));
    }

    #[test]
    fn missing_center_is_not_found() {
        let (s, _) = chain();
        assert_eq!(card_network(&s, "ghost", 1, &[]).unwrap_err().code(), "NOT_FOUND");
    }
}
