use std::path::Path;

use crate::render::{card_line, link_line, print_json};

pub fn execute(
    cwd: &Path,
    id: &str,
    depth: usize,
    link_types: &[String],
    json: bool,
) -> anyhow::Result<()> {
    let ws = crate::open_workspace(cwd)?;
    let network = ws.network(id, depth, link_types)?;
    if json {
        return print_json(&network);
    }

    println!("center: {}", card_line(&network.center));
    println!("\ncards ({}):", network.cards.len());
    for card in &network.cards {
        println!("  {}", card_line(card));
    }
    println!("\nlinks ({}):", network.links.len());
    for link in &network.links {
        println!("  {}", link_line(link));
    }
    Ok(())
}
