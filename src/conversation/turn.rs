//! Conversation turns and their content

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Identity of a turn.
///
/// Locally-minted turns carry a temporary id until the authoritative one
/// arrives; the two never collide because local ids render as `local-<n>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TurnId {
    Local(u64),
    Remote(String),
}

impl TurnId {
    pub fn is_local(&self) -> bool {
        matches!(self, TurnId::Local(_))
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnId::Local(n) => write!(f, "local-{n}"),
            TurnId::Remote(id) => write!(f, "{id}"),
        }
    }
}

/// Who produced a turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Human,
    Assistant,
    Tool { name: String },
}

impl Role {
    pub fn label(&self) -> &str {
        match self {
            Role::Human => "You",
            Role::Assistant => "Assistant",
            Role::Tool { name } => name,
        }
    }
}

/// Image reference as sent by the runtime: a bare URL or `{url, detail}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageRef {
    Url(String),
    Detailed {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl ImageRef {
    pub fn url(&self) -> &str {
        match self {
            ImageRef::Url(url) => url,
            ImageRef::Detailed { url, .. } => url,
        }
    }
}

/// One block of structured content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ImageUrl {
        image_url: ImageRef,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    /// Any tag we do not know. Renders as nothing.
    #[serde(other)]
    Unknown,
}

/// Turn content: plain text or an ordered list of blocks
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl<'de> Deserialize<'de> for Content {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Content::from_value(Value::deserialize(deserializer)?))
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl Content {
    /// Lenient decoding: a malformed block becomes `ContentBlock::Unknown`
    /// instead of failing the whole message.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(text) => Content::Text(text),
            Value::Array(items) => Content::Blocks(
                items
                    .into_iter()
                    .map(|item| serde_json::from_value(item).unwrap_or(ContentBlock::Unknown))
                    .collect(),
            ),
            Value::Null => Content::Text(String::new()),
            _ => Content::Blocks(vec![ContentBlock::Unknown]),
        }
    }

    /// Text blocks concatenated in order; non-text blocks contribute nothing.
    pub fn text(&self) -> String {
        match self {
            Content::Text(text) => text.clone(),
            Content::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }

    fn is_text_only(&self) -> bool {
        match self {
            Content::Text(_) => true,
            Content::Blocks(blocks) => blocks
                .iter()
                .all(|block| matches!(block, ContentBlock::Text { .. })),
        }
    }

    /// Content equality as used for echo reconciliation.
    ///
    /// Text-only content compares by its trimmed text, so `"hi"` and
    /// `[{"type":"text","text":"hi"}]` are the same turn.
    pub fn is_equivalent(&self, other: &Content) -> bool {
        if self.is_text_only() && other.is_text_only() {
            self.text().trim() == other.text().trim()
        } else {
            self == other
        }
    }

    /// Tool invocations proposed in this content
    pub fn tool_uses(&self) -> impl Iterator<Item = (&str, &str, &Value)> {
        let blocks: &[ContentBlock] = match self {
            Content::Blocks(blocks) => blocks,
            Content::Text(_) => &[],
        };
        blocks.iter().filter_map(|block| match block {
            ContentBlock::ToolUse { id, name, input } => Some((id.as_str(), name.as_str(), input)),
            _ => None,
        })
    }
}

/// One entry in the ordered history
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTurn {
    pub id: TurnId,
    pub role: Role,
    pub content: Content,
}

impl ConversationTurn {
    pub fn new(id: TurnId, role: Role, content: impl Into<Content>) -> Self {
        Self {
            id,
            role,
            content: content.into(),
        }
    }

    pub fn human(id: impl Into<String>, content: impl Into<Content>) -> Self {
        Self::new(TurnId::Remote(id.into()), Role::Human, content)
    }

    pub fn assistant(id: impl Into<String>, content: impl Into<Content>) -> Self {
        Self::new(TurnId::Remote(id.into()), Role::Assistant, content)
    }

    pub fn tool(id: impl Into<String>, name: impl Into<String>, content: impl Into<Content>) -> Self {
        Self::new(
            TurnId::Remote(id.into()),
            Role::Tool { name: name.into() },
            content,
        )
    }

    /// Present only for tool turns
    pub fn tool_name(&self) -> Option<&str> {
        match &self.role {
            Role::Tool { name } => Some(name),
            _ => None,
        }
    }

    pub fn text(&self) -> String {
        self.content.text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_string_and_block_content_decode() {
        let text: Content = serde_json::from_value(json!("hello")).unwrap();
        assert_eq!(text, Content::Text("hello".to_string()));

        let blocks: Content = serde_json::from_value(json!([
            {"type": "text", "text": "Booking "},
            {"type": "tool_use", "id": "toolu_1", "name": "book_time_entry", "input": {"hours": 8}},
            {"type": "text", "text": "now."}
        ]))
        .unwrap();
        assert_eq!(blocks.text(), "Booking now.");
        assert_eq!(blocks.tool_uses().count(), 1);
    }

    #[test]
    fn test_unknown_and_malformed_blocks_are_noops() {
        let content: Content = serde_json::from_value(json!([
            {"type": "thinking", "thinking": "hmm"},
            {"type": "text"},
            {"type": "text", "text": "ok"}
        ]))
        .unwrap();
        match &content {
            Content::Blocks(blocks) => {
                assert_eq!(blocks[0], ContentBlock::Unknown);
                assert_eq!(blocks[1], ContentBlock::Unknown);
            }
            other => panic!("expected blocks, got {other:?}"),
        }
        assert_eq!(content.text(), "ok");
    }

    #[test]
    fn test_image_url_forms() {
        let content: Content = serde_json::from_value(json!([
            {"type": "image_url", "image_url": "https://x/a.png"},
            {"type": "image_url", "image_url": {"url": "https://x/b.png", "detail": "low"}}
        ]))
        .unwrap();
        let Content::Blocks(blocks) = content else {
            panic!("expected blocks");
        };
        let urls: Vec<&str> = blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ImageUrl { image_url } => Some(image_url.url()),
                _ => None,
            })
            .collect();
        assert_eq!(urls, vec!["https://x/a.png", "https://x/b.png"]);
    }

    #[test]
    fn test_equivalence_across_representations() {
        let plain = Content::from("log 8 hours");
        let blocks = Content::Blocks(vec![ContentBlock::Text {
            text: "log 8 hours ".to_string(),
        }]);
        assert!(plain.is_equivalent(&blocks));
        assert!(!plain.is_equivalent(&Content::from("log 4 hours")));

        let with_tool = Content::Blocks(vec![
            ContentBlock::Text {
                text: "log 8 hours".to_string(),
            },
            ContentBlock::Unknown,
        ]);
        assert!(!plain.is_equivalent(&with_tool));
    }

    #[test]
    fn test_local_id_display() {
        assert_eq!(TurnId::Local(3).to_string(), "local-3");
        assert_eq!(TurnId::Remote("run-1".into()).to_string(), "run-1");
    }
}
