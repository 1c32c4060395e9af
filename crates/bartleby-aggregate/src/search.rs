use bartleby_core::{Card, CoreResult};
use bartleby_ledger::SqliteStore;

/// Case-insensitive substring match over title and content, most recently
/// modified first, at most `limit` results. A blank query matches nothing.
pub fn search_cards(store: &SqliteStore, query: &str, limit: usize) -> CoreResult<Vec<Card>> {
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }
    let needle = query.to_lowercase();
    let mut hits: Vec<Card> = store
        .all_cards()?
        .into_iter()
        .filter(|c| {
            c.title.to_lowercase().contains(&needle) || c.content.to_lowercase().contains(&needle)
        })
        .collect();
    hits.sort_by(|a, b| {
        b.modified_at
            .cmp(&a.modified_at)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.truncate(limit);
    Ok(hits)
}
