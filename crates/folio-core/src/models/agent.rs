use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub(crate) struct AgentQuery<'a> {
    pub prompt: &'a str,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct AgentSource {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// Answer from `POST /agent/query`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct AgentReply {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub sources: Vec<AgentSource>,
}

impl AgentReply {
    /// Text to show; falls back to the raw payload when the agent sent no text.
    pub fn display_text(&self) -> String {
        match self.text.as_deref() {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => serde_json::to_string_pretty(self).unwrap_or_default(),
        }
    }
}
