use serde::{Deserialize, Serialize};

use crate::messages::TranscriptLine;

/// What a summary provider returns for a compacted window: a free-text
/// synthesis, ordered atomic facts, and named entities mentioned.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryOutline {
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub entities: Vec<String>,
}

impl SummaryOutline {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            key_points: Vec::new(),
            entities: Vec::new(),
        }
    }

    pub fn with_key_points(mut self, points: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.key_points = points.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_entities(mut self, entities: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.entities = entities.into_iter().map(Into::into).collect();
        self
    }

    /// Trim fields, drop empty key points, and dedupe entities while
    /// preserving first-seen order. Entities are a set; providers are not
    /// trusted to return one.
    pub fn normalized(self) -> Self {
        let summary = self.summary.trim().to_owned();
        let key_points: Vec<String> = self
            .key_points
            .into_iter()
            .map(|p| p.trim().to_owned())
            .filter(|p| !p.is_empty())
            .collect();
        let mut entities: Vec<String> = Vec::new();
        for entity in self.entities {
            let entity = entity.trim().to_owned();
            if !entity.is_empty() && !entities.contains(&entity) {
                entities.push(entity);
            }
        }
        Self {
            summary,
            key_points,
            entities,
        }
    }
}

/// Request handed to a summary provider: the transcript window to compact.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRequest {
    pub lines: Vec<TranscriptLine>,
    pub max_summary_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Role;

    #[test]
    fn builder_sets_fields() {
        let outline = SummaryOutline::new("discussed roadmap")
            .with_key_points(["ship v2", "drop legacy sync"])
            .with_entities(["Alice", "Roadmap"]);
        assert_eq!(outline.key_points.len(), 2);
        assert_eq!(outline.entities, vec!["Alice", "Roadmap"]);
    }

    #[test]
    fn normalized_dedupes_entities_in_order() {
        let outline = SummaryOutline::new(" text ")
            .with_entities(["Alice", "Bob", "Alice", " Bob ", ""])
            .normalized();
        assert_eq!(outline.summary, "text");
        assert_eq!(outline.entities, vec!["Alice", "Bob"]);
    }

    #[test]
    fn normalized_drops_empty_key_points() {
        let outline = SummaryOutline::new("s")
            .with_key_points(["a", "  ", "b"])
            .normalized();
        assert_eq!(outline.key_points, vec!["a", "b"]);
    }

    #[test]
    fn outline_serde_uses_camel_case() {
        let outline = SummaryOutline::new("s").with_key_points(["p"]);
        let json = serde_json::to_value(&outline).unwrap();
        assert_eq!(json["keyPoints"][0], "p");
    }

    #[test]
    fn outline_deserializes_with_missing_lists() {
        let outline: SummaryOutline = serde_json::from_str(r#"{"summary":"s"}"#).unwrap();
        assert!(outline.key_points.is_empty());
        assert!(outline.entities.is_empty());
    }

    #[test]
    fn request_serde_roundtrip() {
        let req = SummaryRequest {
            lines: vec![TranscriptLine::new(Role::User, "hi")],
            max_summary_tokens: 256,
        };
        let json = serde_json::to_string(&req).unwrap();
        let parsed: SummaryRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.lines.len(), 1);
        assert_eq!(parsed.max_summary_tokens, 256);
    }
}
