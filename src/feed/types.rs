use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// One gallery entry. `path` is the identity key: assigned by the upload
/// pipeline and never rewritten afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GalleryItem {
    #[serde(default, deserialize_with = "nullable_string")]
    pub title: String,
    #[serde(rename = "tag", default, deserialize_with = "loose_tags")]
    pub tags: Vec<String>,
    pub path: String,
    #[serde(default, deserialize_with = "loose_timestamp")]
    pub date: i64,
}

impl GalleryItem {
    pub fn new(title: &str, tags: &[&str], path: &str, date: i64) -> Self {
        Self {
            title: title.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            path: path.to_string(),
            date,
        }
    }

    /// Case-insensitive substring match against the title or any tag.
    /// `needle` must already be lowercase.
    pub fn matches(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self.tags.iter().any(|t| t.to_lowercase().contains(needle))
    }
}

fn nullable_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

/// Records written by older clients store `tag` as `""` after a form reset,
/// or as a bare string.
fn loose_tags<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Tags {
        List(Vec<String>),
        One(String),
    }

    Ok(match Option::<Tags>::deserialize(d)? {
        Some(Tags::List(tags)) => tags,
        Some(Tags::One(tag)) if !tag.trim().is_empty() => vec![tag],
        _ => Vec::new(),
    })
}

fn loose_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Stamp {
        Int(i64),
        Float(f64),
        Text(String),
    }

    Ok(match Option::<Stamp>::deserialize(d)? {
        Some(Stamp::Int(v)) => v,
        Some(Stamp::Float(v)) => v as i64,
        Some(Stamp::Text(s)) => s.trim().parse().unwrap_or(0),
        None => 0,
    })
}

/// Point-in-time copy of a collection, keyed by the server-assigned key.
/// Keys sort chronologically, so iteration order is oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedSnapshot {
    entries: BTreeMap<String, GalleryItem>,
}

impl FeedSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, item: GalleryItem) {
        self.entries.insert(key, item);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Items ordered newest first, the order the feed displays them in.
    pub fn newest_first(&self) -> Vec<GalleryItem> {
        self.entries.values().rev().cloned().collect()
    }

    /// Keep only the `n` entries with the greatest keys.
    pub fn last(mut self, n: usize) -> Self {
        while self.entries.len() > n {
            self.entries.pop_first();
        }
        self
    }

    /// Build a snapshot from a JSON object of `key -> record`. `null` means an
    /// empty collection; children that are not valid records are skipped.
    pub fn from_json(value: &serde_json::Value) -> Self {
        let mut snapshot = Self::new();
        let Some(children) = value.as_object() else {
            if !value.is_null() {
                tracing::warn!("collection payload is not an object, treating as empty");
            }
            return snapshot;
        };
        for (key, child) in children {
            match serde_json::from_value::<GalleryItem>(child.clone()) {
                Ok(item) => snapshot.insert(key.clone(), item),
                Err(e) => tracing::warn!(key = %key, error = %e, "skipping malformed gallery record"),
            }
        }
        snapshot
    }
}

impl FromIterator<(String, GalleryItem)> for FeedSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, GalleryItem)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_uses_tag_field_name() {
        let item = GalleryItem::new("Sunset", &["sky"], "https://cdn/x.png", 1700000000000);
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["tag"], json!(["sky"]));
        assert!(value.get("tags").is_none());
    }

    #[test]
    fn test_loose_records_parse() {
        let item: GalleryItem = serde_json::from_value(json!({
            "title": null,
            "tag": "",
            "path": "https://cdn/a.png",
            "date": ""
        }))
        .unwrap();
        assert_eq!(item.title, "");
        assert!(item.tags.is_empty());
        assert_eq!(item.date, 0);

        let item: GalleryItem = serde_json::from_value(json!({
            "title": "One",
            "tag": "solo",
            "path": "p",
            "date": 1.7e12
        }))
        .unwrap();
        assert_eq!(item.tags, vec!["solo".to_string()]);
        assert_eq!(item.date, 1_700_000_000_000);
    }

    #[test]
    fn test_from_json_skips_records_without_path() {
        let snapshot = FeedSnapshot::from_json(&json!({
            "-a": {"title": "ok", "path": "p1", "date": 1},
            "-b": {"title": "no path"},
        }));
        assert_eq!(snapshot.len(), 1);
        assert!(FeedSnapshot::from_json(&serde_json::Value::Null).is_empty());
    }

    #[test]
    fn test_newest_first_reverses_key_order() {
        let snapshot: FeedSnapshot = vec![
            ("-001".to_string(), GalleryItem::new("old", &[], "p1", 1)),
            ("-002".to_string(), GalleryItem::new("new", &[], "p2", 2)),
        ]
        .into_iter()
        .collect();
        let titles: Vec<_> = snapshot.newest_first().into_iter().map(|i| i.title).collect();
        assert_eq!(titles, vec!["new", "old"]);
        assert_eq!(snapshot.last(1).keys().collect::<Vec<_>>(), vec!["-002"]);
    }

    #[test]
    fn test_matches_title_or_tag_case_insensitive() {
        let item = GalleryItem::new("Cat pic", &["Cute"], "p", 0);
        assert!(item.matches("cat"));
        assert!(item.matches("cute"));
        assert!(!item.matches("dog"));
    }
}
