use std::path::Path;

use bartleby_aggregate::NewLink;
use bartleby_core::{CreatedFrom, LinkChanges, LinkFilter};
use clap::Subcommand;

use crate::render::{link_line, parse_meta, print_json};

#[derive(Subcommand)]
pub enum LinkCmd {
    /// Link two cards
    Create {
        /// First card id
        card_a: String,
        /// Second card id
        card_b: String,
        /// Link type (e.g. supports, contradicts, sequence)
        #[arg(long = "type")]
        link_type: String,
        /// Provenance: explicit, inline-A or inline-B
        #[arg(long, default_value = "explicit")]
        from: String,
        /// Metadata entry key=value (repeatable)
        #[arg(long = "meta")]
        meta: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Change a link's type or metadata
    Update {
        id: String,
        #[arg(long = "type")]
        link_type: Option<String>,
        /// Replace metadata with these key=value entries (repeatable)
        #[arg(long = "meta")]
        meta: Vec<String>,
    },
    /// Delete a link
    Delete { id: String },
    /// List links, newest first
    List {
        /// Only links touching this card
        #[arg(long)]
        card: Option<String>,
        #[arg(long = "type")]
        link_type: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

pub fn run(cmd: LinkCmd, cwd: &Path) -> anyhow::Result<()> {
    let ws = crate::open_workspace(cwd)?;
    match cmd {
        LinkCmd::Create {
            card_a,
            card_b,
            link_type,
            from,
            meta,
            json,
        } => {
            let created_from: CreatedFrom = from.parse()?;
            let out = ws.create_link(NewLink {
                card_a_id: card_a,
                card_b_id: card_b,
                link_type,
                created_from: Some(created_from),
                metadata: parse_meta(&meta)?,
            })?;
            if json {
                return print_json(&out);
            }
            println!("Created {}", link_line(&out.value));
            Ok(())
        }
        LinkCmd::Update {
            id,
            link_type,
            meta,
        } => {
            let changes = LinkChanges {
                link_type,
                metadata: parse_meta(&meta)?,
            };
            if changes.is_empty() {
                anyhow::bail!("nothing to update (pass --type or --meta)");
            }
            let out = ws.update_link(&id, changes)?;
            println!("Updated {}", link_line(&out.value));
            Ok(())
        }
        LinkCmd::Delete { id } => {
            ws.delete_link(&id)?;
            println!("Deleted link {id}");
            Ok(())
        }
        LinkCmd::List {
            card,
            link_type,
            json,
        } => {
            let links = ws.list_links(&LinkFilter {
                card_id: card,
                link_type,
            })?;
            if json {
                return print_json(&links);
            }
            if links.is_empty() {
                println!("No links match.");
                return Ok(());
            }
            for link in &links {
                println!("{}", link_line(link));
            }
            println!("\n({} links)", links.len());
            Ok(())
        }
    }
}
