//! MessageCard 线上格式
//!
//! ```json
//! {
//!   "@type": "MessageCard",
//!   "@context": "http://schema.org/extensions",
//!   "title": "...",
//!   "text": "...",
//!   "themeColor": "ffc83d",
//!   "sections": [{ "title": "Properties", "facts": [{ "name": "Level", "value": "Warning" }] }],
//!   "potentialAction": [{ "@type": "OpenUri", "name": "...", "targets": [{ "uri": "...", "os": "default" }] }]
//! }
//! ```
//!
//! 字段顺序即结构体声明顺序，`sections` / `potentialAction` 为空时不输出。

use serde::{Deserialize, Serialize};

pub const CARD_TYPE: &str = "MessageCard";
pub const CARD_CONTEXT: &str = "http://schema.org/extensions";
pub const ACTION_OPEN_URI: &str = "OpenUri";
pub const DEFAULT_OS: &str = "default";

/// 通知卡片
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCard {
    #[serde(rename = "@type")]
    pub card_type: String,
    #[serde(rename = "@context")]
    pub context: String,
    pub title: String,
    pub text: String,
    #[serde(rename = "themeColor")]
    pub theme_color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sections: Option<Vec<Section>>,
    #[serde(rename = "potentialAction", default, skip_serializing_if = "Option::is_none")]
    pub potential_action: Option<Vec<Action>>,
}

impl MessageCard {
    pub fn new(title: impl Into<String>, text: impl Into<String>, theme_color: impl Into<String>) -> Self {
        Self {
            card_type: CARD_TYPE.to_string(),
            context: CARD_CONTEXT.to_string(),
            title: title.into(),
            text: text.into(),
            theme_color: theme_color.into(),
            sections: None,
            potential_action: None,
        }
    }

    /// 序列化为 UTF-8 JSON
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// 一组带标题的 facts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub facts: Vec<Fact>,
}

/// name/value 对
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    pub name: String,
    pub value: String,
}

impl Fact {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// 按钮动作
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "@type")]
    pub action_type: String,
    pub name: String,
    pub targets: Vec<ActionTarget>,
}

impl Action {
    /// OpenUri 动作，只有一个 target
    pub fn open_uri(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            action_type: ACTION_OPEN_URI.to_string(),
            name: name.into(),
            targets: vec![ActionTarget::new(uri)],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionTarget {
    pub uri: String,
    pub os: String,
}

impl ActionTarget {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            os: DEFAULT_OS.to_string(),
        }
    }
}
