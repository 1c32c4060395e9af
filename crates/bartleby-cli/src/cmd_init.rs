use bartleby_aggregate::Workspace;
use bartleby_ledger::{BartlebyPaths, Settings};
use std::path::Path;

pub fn execute(repo_root: &Path) -> anyhow::Result<()> {
    let paths = BartlebyPaths::discover(repo_root);

    if paths.is_initialized() {
        // Opening re-applies the schema if the directory was partially created.
        Workspace::open(repo_root)?.close();
        println!("Already initialized at {}", paths.bartleby_dir.display());
        return Ok(());
    }

    let ws = Workspace::open(repo_root)?;
    if !paths.settings_json.exists() {
        Settings::default().save(&paths.settings_json)?;
    }
    let title = ws.get_config()?.title().unwrap_or("Untitled Project").to_string();
    ws.close();

    println!(
        "Initialized Bartleby workspace \"{title}\" at {}",
        paths.bartleby_dir.display()
    );
    Ok(())
}
