use std::path::{Path, PathBuf};

use bartleby_aggregate::{Committed, NewCard, Workspace};
use bartleby_core::{Card, CardChanges, CardFilter};
use clap::Subcommand;

use crate::render::{card_line, link_line, parse_meta, print_json, print_tree};

// ── CLI Schema ──

#[derive(Subcommand)]
pub enum CardCmd {
    /// Create a card
    Create {
        /// Card title
        title: String,
        /// Card type (defaults to the `default_card_type` setting)
        #[arg(long = "type")]
        card_type: Option<String>,
        /// Markdown content
        #[arg(long, conflicts_with = "content_file")]
        content: Option<String>,
        /// Read markdown content from a file
        #[arg(long)]
        content_file: Option<PathBuf>,
        /// Parent card id
        #[arg(long)]
        parent: Option<String>,
        /// Sibling position (defaults to after the last sibling)
        #[arg(long)]
        position: Option<i64>,
        /// Metadata entry key=value (repeatable)
        #[arg(long = "meta")]
        meta: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a card with its links
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Change a card's title, content, type or metadata
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, conflicts_with = "content_file")]
        content: Option<String>,
        #[arg(long)]
        content_file: Option<PathBuf>,
        #[arg(long = "type")]
        card_type: Option<String>,
        /// Replace metadata with these key=value entries (repeatable)
        #[arg(long = "meta")]
        meta: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Move a card in the tree
    Move {
        id: String,
        /// New parent card id
        #[arg(long, conflicts_with = "root")]
        parent: Option<String>,
        /// Make the card a top-level card
        #[arg(long)]
        root: bool,
        /// Sibling position (defaults to after the last sibling)
        #[arg(long)]
        position: Option<i64>,
    },
    /// Delete a card, its descendants and their links
    Delete { id: String },
    /// List cards
    List {
        #[arg(long = "type")]
        card_type: Option<String>,
        /// Only children of this card
        #[arg(long, conflicts_with = "roots")]
        parent: Option<String>,
        /// Only top-level cards
        #[arg(long)]
        roots: bool,
        #[arg(long)]
        json: bool,
    },
    /// Search titles and content
    Search {
        query: String,
        #[arg(long)]
        json: bool,
    },
    /// Print the card hierarchy
    Tree {
        #[arg(long)]
        json: bool,
    },
}

// ── Dispatch ──

pub fn run(cmd: CardCmd, cwd: &Path) -> anyhow::Result<()> {
    let ws = crate::open_workspace(cwd)?;
    match cmd {
        CardCmd::Create {
            title,
            card_type,
            content,
            content_file,
            parent,
            position,
            meta,
            json,
        } => {
            let input = NewCard {
                title,
                content: read_content(content, content_file)?,
                card_type: card_type.unwrap_or_else(|| ws.settings().default_card_type.clone()),
                metadata: parse_meta(&meta)?,
                parent_id: parent,
                position,
            };
            let out = ws.create_card(input)?;
            report_committed(&out, json, "Created")
        }
        CardCmd::Show { id, json } => show(&ws, &id, json),
        CardCmd::Update {
            id,
            title,
            content,
            content_file,
            card_type,
            meta,
            json,
        } => {
            let changes = CardChanges {
                title,
                content: read_content(content, content_file)?,
                card_type,
                metadata: parse_meta(&meta)?,
            };
            if changes.is_empty() {
                anyhow::bail!("nothing to update (pass --title, --content, --type or --meta)");
            }
            let out = ws.update_card(&id, changes)?;
            report_committed(&out, json, "Updated")
        }
        CardCmd::Move {
            id,
            parent,
            root,
            position,
        } => {
            let parent = match (parent, root) {
                (Some(p), _) => Some(p),
                (None, true) => None,
                // Neither flag: reorder within the current parent.
                (None, false) => ws
                    .get_card(&id)?
                    .ok_or_else(|| bartleby_core::CoreError::card_not_found(&id))?
                    .parent_id,
            };
            let out = ws.move_card_in_tree(&id, parent.as_deref(), position)?;
            println!(
                "Moved {} under {} at position {}",
                out.value.id,
                out.value.parent_id.as_deref().unwrap_or("(root)"),
                out.value.position
            );
            Ok(())
        }
        CardCmd::Delete { id } => {
            let event = ws.delete_card(&id)?;
            if let bartleby_core::EventBody::CardDeleted(p) = &event.body {
                println!(
                    "Deleted {id} ({} descendant cards, {} links)",
                    p.cascaded_card_ids.len(),
                    p.cascaded_link_ids.len()
                );
            }
            Ok(())
        }
        CardCmd::List {
            card_type,
            parent,
            roots,
            json,
        } => {
            let filter = CardFilter {
                card_type,
                parent_id: match (parent, roots) {
                    (Some(p), _) => Some(Some(p)),
                    (None, true) => Some(None),
                    (None, false) => None,
                },
            };
            print_cards(&ws.list_cards(&filter)?, json)
        }
        CardCmd::Search { query, json } => print_cards(&ws.search_cards(&query)?, json),
        CardCmd::Tree { json } => {
            let forest = ws.card_tree()?;
            if json {
                return print_json(&forest);
            }
            if forest.is_empty() {
                println!("No cards yet.");
            }
            print_tree(&forest, 0);
            Ok(())
        }
    }
}

// ── Command Implementations ──

fn read_content(
    inline: Option<String>,
    file: Option<PathBuf>,
) -> anyhow::Result<Option<String>> {
    match (inline, file) {
        (Some(text), _) => Ok(Some(text)),
        (None, Some(path)) => Ok(Some(std::fs::read_to_string(&path).map_err(|e| {
            anyhow::anyhow!("cannot read {}: {e}", path.display())
        })?)),
        (None, None) => Ok(None),
    }
}

fn report_committed(out: &Committed<Card>, json: bool, verb: &str) -> anyhow::Result<()> {
    if json {
        return print_json(out);
    }
    println!("{verb} {}", card_line(&out.value));
    for event in &out.reconciled {
        println!("  reconciled: {} {}", event.event_type(), event.body.subject_id().unwrap_or("-"));
    }
    Ok(())
}

fn show(ws: &Workspace, id: &str, json: bool) -> anyhow::Result<()> {
    let detail = ws.card_detail(id)?;
    if json {
        return print_json(&detail);
    }
    let crumbs: Vec<String> = ws.breadcrumb(id)?.into_iter().map(|c| c.title).collect();
    let card = &detail.card;
    println!("{}", card_line(card));
    println!("path:     {}", crumbs.join(" / "));
    println!("position: {}", card.position);
    if !card.metadata.is_empty() {
        println!("metadata: {}", serde_json::to_string(&card.metadata)?);
    }
    if !card.content.is_empty() {
        println!("\n{}\n", card.content);
    }
    if detail.links.is_empty() {
        println!("(no links)");
    }
    for linked in &detail.links {
        println!("{}  ->  {}", link_line(&linked.link), linked.card.title);
    }
    Ok(())
}

fn print_cards(cards: &[Card], json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(cards);
    }
    if cards.is_empty() {
        println!("No cards match.");
        return Ok(());
    }
    for card in cards {
        println!("{}", card_line(card));
    }
    println!("\n({} cards)", cards.len());
    Ok(())
}
