use serde_json::{json, Value};

use crate::message::{ChatMessage, Role};
use crate::provider::{ProviderConfig, ProviderKind};

pub(crate) const MAX_OUTPUT_TOKENS: u32 = 4096;
pub(crate) const ANTHROPIC_VERSION: &str = "2023-06-01";

pub(crate) struct PreparedRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Value,
}

/// Format the wire request for one provider dialect. `context` is the
/// prior conversation in order; `message` is the new user turn.
pub(crate) fn build_request(
    provider: &ProviderConfig,
    system_prompt: Option<&str>,
    context: &[ChatMessage],
    message: &ChatMessage,
) -> PreparedRequest {
    let base = provider.api_url.trim_end_matches('/');
    match provider.kind {
        ProviderKind::OpenAiStyle | ProviderKind::Custom => PreparedRequest {
            url: format!("{base}/chat/completions"),
            headers: vec![("Authorization", format!("Bearer {}", provider.api_key))],
            body: openai_body(provider, system_prompt, context, message),
        },
        ProviderKind::Anthropic => PreparedRequest {
            url: format!("{base}/messages"),
            headers: vec![
                ("x-api-key", provider.api_key.clone()),
                ("anthropic-version", ANTHROPIC_VERSION.to_string()),
            ],
            body: anthropic_body(provider, system_prompt, context, message),
        },
        ProviderKind::DashScope => PreparedRequest {
            url: format!("{base}/services/aigc/text-generation/generation"),
            headers: vec![
                ("Authorization", format!("Bearer {}", provider.api_key)),
                ("X-DashScope-SSE", "enable".to_string()),
            ],
            body: dashscope_body(provider, system_prompt, context, message),
        },
    }
}

fn openai_body(
    provider: &ProviderConfig,
    system_prompt: Option<&str>,
    context: &[ChatMessage],
    message: &ChatMessage,
) -> Value {
    let mut messages = Vec::new();
    if let Some(system) = system_prompt {
        messages.push(json!({"role": "system", "content": system}));
    }
    for entry in context {
        messages.push(openai_message(entry));
    }
    messages.push(openai_message(message));
    json!({
        "model": provider.model,
        "messages": messages,
        "stream": true,
        "max_tokens": MAX_OUTPUT_TOKENS,
    })
}

fn openai_message(message: &ChatMessage) -> Value {
    match message.data_url() {
        Some(url) => {
            let mut parts = Vec::new();
            if !message.content.trim().is_empty() {
                parts.push(json!({"type": "text", "text": message.content}));
            }
            parts.push(json!({"type": "image_url", "image_url": {"url": url}}));
            json!({"role": message.role.as_str(), "content": parts})
        }
        None => json!({"role": message.role.as_str(), "content": message.content}),
    }
}

fn anthropic_body(
    provider: &ProviderConfig,
    system_prompt: Option<&str>,
    context: &[ChatMessage],
    message: &ChatMessage,
) -> Value {
    // System turns never appear in `messages`; they fold into the
    // top-level `system` string.
    let mut system_parts: Vec<&str> = Vec::new();
    if let Some(system) = system_prompt {
        system_parts.push(system);
    }
    let mut messages = Vec::new();
    for entry in context.iter().chain(std::iter::once(message)) {
        if entry.role == Role::System {
            system_parts.push(entry.content.as_str());
            continue;
        }
        messages.push(anthropic_message(entry));
    }
    let mut body = json!({
        "model": provider.model,
        "messages": messages,
        "max_tokens": MAX_OUTPUT_TOKENS,
        "stream": true,
    });
    if !system_parts.is_empty() {
        body["system"] = json!(system_parts.join("\n\n"));
    }
    body
}

fn anthropic_message(message: &ChatMessage) -> Value {
    match message.image_base64.as_deref() {
        Some(data) => {
            let mut parts = vec![json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": message.mime_type(),
                    "data": data,
                },
            })];
            if !message.content.trim().is_empty() {
                parts.push(json!({"type": "text", "text": message.content}));
            }
            json!({"role": message.role.as_str(), "content": parts})
        }
        None => json!({"role": message.role.as_str(), "content": message.content}),
    }
}

fn dashscope_body(
    provider: &ProviderConfig,
    system_prompt: Option<&str>,
    context: &[ChatMessage],
    message: &ChatMessage,
) -> Value {
    let mut messages = Vec::new();
    if let Some(system) = system_prompt {
        messages.push(json!({"role": "system", "content": system}));
    }
    for entry in context {
        messages.push(dashscope_message(entry));
    }
    messages.push(dashscope_message(message));
    json!({
        "model": provider.model,
        "input": {"messages": messages},
        "parameters": {
            "result_format": "message",
            "incremental_output": true,
        },
    })
}

fn dashscope_message(message: &ChatMessage) -> Value {
    match message.data_url() {
        Some(url) => {
            let mut parts = Vec::new();
            if !message.content.trim().is_empty() {
                parts.push(json!({"type": "text", "text": message.content}));
            }
            parts.push(json!({"type": "image", "image": url}));
            json!({"role": message.role.as_str(), "content": parts})
        }
        None => json!({"role": message.role.as_str(), "content": message.content}),
    }
}
