use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One chat turn. The `image_*` fields are set together or not at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub image_base64: Option<String>,
    #[serde(default)]
    pub image_mime_type: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    pub fn user_with_image(
        content: impl Into<String>,
        image_base64: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            image_base64: Some(image_base64.into()),
            image_mime_type: Some(mime_type.into()),
        }
    }

    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            image_base64: None,
            image_mime_type: None,
        }
    }

    pub fn has_image(&self) -> bool {
        self.image_base64.is_some()
    }

    pub(crate) fn mime_type(&self) -> &str {
        self.image_mime_type.as_deref().unwrap_or("image/jpeg")
    }

    pub(crate) fn data_url(&self) -> Option<String> {
        self.image_base64
            .as_deref()
            .map(|data| format!("data:{};base64,{}", self.mime_type(), data))
    }
}
