use bartleby_core::event::format_timestamp;
use bartleby_core::tree::TreeNode;
use bartleby_core::{Card, Event, Link, MetaMap, MetaValue};
use serde::Serialize;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `id  [type]  title`
pub fn card_line(card: &Card) -> String {
    format!("{}  [{}]  {}", card.id, card.card_type, card.title)
}

/// `id  a --type--> b  (provenance)`
pub fn link_line(link: &Link) -> String {
    format!(
        "{}  {} --{}--> {}  ({})",
        link.id, link.card_a_id, link.link_type, link.card_b_id, link.created_from
    )
}

/// `[timestamp] type  subject  event-id`
pub fn event_line(event: &Event) -> String {
    format!(
        "[{}] {:<15} {}  {}",
        format_timestamp(event.timestamp),
        event.event_type(),
        event.body.subject_id().unwrap_or("-"),
        event.id
    )
}

pub fn print_tree(nodes: &[TreeNode], depth: usize) {
    for node in nodes {
        println!("{}{}", "  ".repeat(depth), card_line(&node.card));
        print_tree(&node.children, depth + 1);
    }
}

/// Parse repeated `key=value` pairs. Values read as JSON scalars when they
/// parse as one, otherwise as text.
pub fn parse_meta(pairs: &[String]) -> anyhow::Result<Option<MetaMap>> {
    if pairs.is_empty() {
        return Ok(None);
    }
    let mut map = MetaMap::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("metadata must be key=value, got '{pair}'"))?;
        let key = key.trim();
        if key.is_empty() {
            anyhow::bail!("metadata key is empty in '{pair}'");
        }
        map.insert(key.to_string(), parse_meta_value(raw));
    }
    Ok(Some(map))
}

fn parse_meta_value(raw: &str) -> MetaValue {
    match raw {
        "null" => MetaValue::Null,
        "true" => MetaValue::Bool(true),
        "false" => MetaValue::Bool(false),
        _ => {
            if let Ok(n) = raw.parse::<i64>() {
                MetaValue::Int(n)
            } else if let Some(f) = raw.parse::<f64>().ok().filter(|f| f.is_finite()) {
                MetaValue::Float(f)
            } else {
                MetaValue::Text(raw.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_pairs_infer_scalars() {
        let pairs = vec![
            "pov=Ada".to_string(),
            "words=1200".to_string(),
            "draft=true".to_string(),
            "ratio=0.5".to_string(),
            "note=a=b".to_string(),
        ];
        let map = parse_meta(&pairs).unwrap().unwrap();
        assert_eq!(map["pov"], MetaValue::Text("Ada".into()));
        assert_eq!(map["words"], MetaValue::Int(1200));
        assert_eq!(map["draft"], MetaValue::Bool(true));
        assert_eq!(map["ratio"], MetaValue::Float(0.5));
        assert_eq!(map["note"], MetaValue::Text("a=b".into()));
    }

    #[test]
    fn non_finite_numbers_stay_text() {
        let pairs = vec!["a=nan".to_string(), "b=inf".to_string(), "c=-1e3".to_string()];
        let map = parse_meta(&pairs).unwrap().unwrap();
        assert_eq!(map["a"], MetaValue::Text("nan".into()));
        assert_eq!(map["b"], MetaValue::Text("inf".into()));
        assert_eq!(map["c"], MetaValue::Float(-1000.0));
    }

    #[test]
    fn meta_pairs_reject_malformed() {
        assert!(parse_meta(&["novalue".to_string()]).is_err());
        assert!(parse_meta(&["=x".to_string()]).is_err());
        assert!(parse_meta(&[]).unwrap().is_none());
    }

    #[test]
    fn event_line_shows_type_and_subject() {
        let mut event = bartleby_core::event::new_event(
            bartleby_core::EventBody::LinkDeleted(bartleby_core::LinkDeleted {
                link_id: "l-1".into(),
            }),
            None,
        );
        event.timestamp = 0;
        let line = event_line(&event);
        assert!(line.starts_with("[1970-01-01T00:00:00Z] link.deleted"));
        assert!(line.contains("l-1"));
    }
}
