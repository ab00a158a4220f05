use serde::{Deserialize, Serialize};

// Serde renames are spelled out so the wire form always matches
// `as_str()`; the derived snake_case would produce "open_ai_style".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "openai_style")]
    OpenAiStyle,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "dashscope")]
    DashScope,
    #[serde(rename = "custom")]
    Custom,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAiStyle => "openai_style",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::DashScope => "dashscope",
            ProviderKind::Custom => "custom",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "openai" | "openai_style" => Some(ProviderKind::OpenAiStyle),
            "anthropic" | "claude" => Some(ProviderKind::Anthropic),
            "dashscope" | "qwen" => Some(ProviderKind::DashScope),
            "custom" => Some(ProviderKind::Custom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl ProviderConfig {
    pub fn is_usable(&self) -> bool {
        self.enabled && !self.api_url.trim().is_empty() && !self.model.trim().is_empty()
    }
}

fn default_max_context_tokens() -> u32 {
    4096
}

fn default_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_aliases() {
        assert_eq!(ProviderKind::from_str("OpenAI"), Some(ProviderKind::OpenAiStyle));
        assert_eq!(ProviderKind::from_str("claude"), Some(ProviderKind::Anthropic));
        assert_eq!(ProviderKind::from_str("qwen"), Some(ProviderKind::DashScope));
        assert_eq!(ProviderKind::from_str("nonsense"), None);
    }

    #[test]
    fn serde_form_matches_as_str() {
        for kind in [
            ProviderKind::OpenAiStyle,
            ProviderKind::Anthropic,
            ProviderKind::DashScope,
            ProviderKind::Custom,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
            let parsed: ProviderKind = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, kind);
            assert_eq!(ProviderKind::from_str(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn disabled_provider_is_not_usable() {
        let config = ProviderConfig {
            kind: ProviderKind::OpenAiStyle,
            api_url: "https://api.example.com/v1".to_string(),
            api_key: "key".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_context_tokens: 4096,
            enabled: false,
        };
        assert!(!config.is_usable());
    }
}
