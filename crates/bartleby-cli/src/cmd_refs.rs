use std::path::Path;

use bartleby_core::wikiref::Resolution;
use bartleby_core::CoreError;
use serde::Serialize;

use crate::render::print_json;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefsReport<'a> {
    card_id: &'a str,
    references: Vec<bartleby_core::wikiref::ResolvedReference>,
    unresolved: Vec<String>,
    ambiguous: Vec<bartleby_aggregate::AmbiguousReference>,
}

pub fn execute(cwd: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let ws = crate::open_workspace(cwd)?;
    let card = ws.get_card(id)?.ok_or_else(|| CoreError::card_not_found(id))?;

    let references = ws.resolve_references(&card.content)?;
    let report = RefsReport {
        card_id: id,
        unresolved: ws.unresolved_references(&card.content)?,
        ambiguous: ws.ambiguous_references(&card.content)?,
        references,
    };
    if json {
        return print_json(&report);
    }

    if report.references.is_empty() {
        println!("No references in {}.", card.title);
        return Ok(());
    }
    for r in &report.references {
        let status = match &r.resolution {
            Resolution::Resolved { card_id } => format!("-> {card_id}"),
            Resolution::Unresolved => "ghost".to_string(),
            Resolution::Ambiguous { candidates } => {
                format!("ambiguous ({} matches)", candidates.len())
            }
        };
        let span = &r.reference.span;
        println!("{:>5}..{:<5} {}  {status}", span.start, span.end, r.reference.text);
    }
    for a in &report.ambiguous {
        let titles: Vec<String> = a
            .matches
            .iter()
            .map(|c| format!("{} [{}] {}", c.id, c.card_type, c.title))
            .collect();
        println!("\n{} could mean:\n  {}", a.text, titles.join("\n  "));
    }
    println!(
        "\n({} references, {} ghost, {} ambiguous)",
        report.references.len(),
        report.unresolved.len(),
        report.ambiguous.len()
    );
    Ok(())
}
