use std::path::Path;

pub fn execute(cwd: &Path) -> anyhow::Result<()> {
    let ws = crate::open_workspace(cwd)?;
    let report = ws.rebuild_views()?;
    println!(
        "Rebuilt views from {} events ({} cards, {} links).",
        report.events_applied, report.cards, report.links
    );
    ws.close();
    Ok(())
}
