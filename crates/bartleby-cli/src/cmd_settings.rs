use std::path::Path;

use bartleby_ledger::{BartlebyPaths, Settings};
use clap::Subcommand;

#[derive(Subcommand)]
pub enum SettingsCmd {
    /// Set a setting
    Set {
        /// busy_timeout_ms, search_limit, default_card_type or log_filter
        key: String,
        value: String,
    },
    /// Get a setting
    Get { key: String },
    /// List all settings
    List,
}

pub fn run(cmd: SettingsCmd, cwd: &Path) -> anyhow::Result<()> {
    let paths = BartlebyPaths::discover(crate::workspace_root(cwd)?);
    match cmd {
        SettingsCmd::Set { key, value } => {
            let mut settings = Settings::load(&paths.settings_json)?;
            settings.set(&key, &value)?;
            settings.save(&paths.settings_json)?;
            println!("Set {key} = {value}");
        }
        SettingsCmd::Get { key } => {
            let settings = Settings::load(&paths.settings_json)?;
            let (_, value) = settings
                .entries()
                .into_iter()
                .find(|(k, _)| *k == key)
                .ok_or_else(|| anyhow::anyhow!("unknown setting '{key}'"))?;
            println!("{value}");
        }
        SettingsCmd::List => {
            for (key, value) in Settings::load(&paths.settings_json)?.entries() {
                println!("{key} = {value}");
            }
        }
    }
    Ok(())
}
