use std::path::Path;

use crate::render::event_line;

pub struct LogParams<'a> {
    pub cwd: &'a Path,
    pub since: Option<i64>,
    pub event_type: Option<&'a str>,
    pub limit: usize,
    pub json: bool,
}

pub fn execute(params: &LogParams<'_>) -> anyhow::Result<()> {
    let ws = crate::open_workspace(params.cwd)?;

    let events = match params.event_type {
        Some(kind) => {
            let mut events = ws.events_by_type(kind, params.limit)?;
            if let Some(since) = params.since {
                events.retain(|e| e.timestamp > since);
            }
            events
        }
        None => ws.events_since(params.since.unwrap_or(i64::MIN), params.limit)?,
    };

    if events.is_empty() {
        println!("No events match the filter.");
        return Ok(());
    }

    if params.json {
        for e in &events {
            println!("{}", serde_json::to_string(e)?);
        }
    } else {
        for e in &events {
            println!("{}", event_line(e));
        }
        println!("\n({} events shown)", events.len());
    }
    Ok(())
}
