use std::path::Path;

use bartleby_core::{ConfigPatch, MetaValue};
use clap::Subcommand;

use crate::render::print_json;

const CONFIG_KEYS: [&str; 3] = ["projectMetadata", "cardTypes", "linkTypes"];

#[derive(Subcommand)]
pub enum ConfigCmd {
    /// Show the project configuration
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Set the project title
    SetTitle { title: String },
    /// Replace one top-level key with a JSON value
    Set {
        /// projectMetadata, cardTypes or linkTypes
        key: String,
        /// JSON value
        value: String,
    },
}

pub fn run(cmd: ConfigCmd, cwd: &Path) -> anyhow::Result<()> {
    let ws = crate::open_workspace(cwd)?;
    match cmd {
        ConfigCmd::Show { json } => {
            let config = ws.get_config()?;
            if json {
                return print_json(&config);
            }
            println!("title: {}", config.title().unwrap_or("(untitled)"));
            println!("card types:");
            for t in &config.card_types {
                println!("  {:<12} {}", t.id, t.label);
            }
            println!("link types:");
            for t in &config.link_types {
                let direction = if t.bidirectional.unwrap_or(true) { "<->" } else { "->" };
                println!("  {:<12} {} {direction}", t.id, t.label);
            }
            Ok(())
        }
        ConfigCmd::SetTitle { title } => {
            // Project metadata is replaced wholesale, so carry the other entries.
            let mut metadata = ws.get_config()?.project_metadata;
            metadata.insert("title".to_string(), MetaValue::from(title));
            let out = ws.update_config(ConfigPatch {
                project_metadata: Some(metadata),
                ..Default::default()
            })?;
            println!("Project title set to \"{}\"", out.value.title().unwrap_or(""));
            Ok(())
        }
        ConfigCmd::Set { key, value } => {
            let patch = patch_for(&key, &value)?;
            ws.update_config(patch)?;
            println!("Updated {key}");
            Ok(())
        }
    }
}

fn patch_for(key: &str, value: &str) -> anyhow::Result<ConfigPatch> {
    if !CONFIG_KEYS.contains(&key) {
        anyhow::bail!(
            "unknown config key '{key}' (expected one of: {})",
            CONFIG_KEYS.join(", ")
        );
    }
    let value: serde_json::Value = serde_json::from_str(value)
        .map_err(|e| anyhow::anyhow!("value for {key} is not valid JSON: {e}"))?;
    let mut object = serde_json::Map::new();
    object.insert(key.to_string(), value);
    serde_json::from_value(serde_json::Value::Object(object))
        .map_err(|e| anyhow::anyhow!("invalid value for {key}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_for_known_key() {
        let patch = patch_for("cardTypes", r#"[{"id":"beat","label":"Beat"}]"#).unwrap();
        let types = patch.card_types.unwrap();
        assert_eq!(types[0].id, "beat");
        assert!(patch.project_metadata.is_none());
        assert!(patch.link_types.is_none());
    }

    #[test]
    fn patch_for_rejects_unknown_key_and_bad_shape() {
        assert!(patch_for("theme", "{}").is_err());
        assert!(patch_for("cardTypes", "not json").is_err());
        assert!(patch_for("cardTypes", r#"{"id":"x"}"#).is_err());
    }
}
