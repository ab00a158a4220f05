use futures_util::{Stream, StreamExt};
use reqwest_eventsource::{Error as EventSourceError, Event};
use serde_json::Value;

use crate::provider::ProviderKind;
use crate::state::ResponseState;

/// Frame payload that terminates OpenAI-style and DashScope streams.
pub(crate) const DONE_FRAME: &str = "[DONE]";

/// Pull the text delta out of one SSE frame payload.
///
/// Frames without a delta (role announcements, ping events, stop markers)
/// return `None` silently; payloads that fail to parse as JSON also return
/// `None` after a warning, and the stream continues.
pub(crate) fn extract_delta(kind: ProviderKind, payload: &str) -> Option<String> {
    let value: Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!("skipping unparseable stream frame: {err}");
            return None;
        }
    };
    let delta = match kind {
        ProviderKind::OpenAiStyle | ProviderKind::Custom => openai_delta(&value),
        ProviderKind::Anthropic => anthropic_delta(&value),
        ProviderKind::DashScope => dashscope_delta(&value),
    };
    delta.map(str::to_string)
}

fn openai_delta(value: &Value) -> Option<&str> {
    value
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
}

fn anthropic_delta(value: &Value) -> Option<&str> {
    if value.get("type").and_then(Value::as_str) != Some("content_block_delta") {
        return None;
    }
    value.get("delta")?.get("text")?.as_str()
}

fn dashscope_delta(value: &Value) -> Option<&str> {
    value
        .get("output")?
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
}

/// Consume one event stream to completion, emitting state transitions.
///
/// Non-empty deltas accumulate and emit `Streaming`; `[DONE]` or stream end
/// emits `Success(accumulated)`; a transport failure emits
/// `Success(accumulated)` when anything arrived, otherwise `Error`.
pub(crate) async fn drive_stream<S>(
    kind: ProviderKind,
    mut events: S,
    emit: &mut (dyn FnMut(ResponseState) + Send),
) where
    S: Stream<Item = Result<Event, EventSourceError>> + Unpin,
{
    let mut accumulated = String::new();
    while let Some(event) = events.next().await {
        match event {
            Ok(Event::Open) => {}
            Ok(Event::Message(frame)) => {
                let payload = frame.data.trim();
                if payload == DONE_FRAME {
                    break;
                }
                if let Some(delta) = extract_delta(kind, payload) {
                    if !delta.is_empty() {
                        accumulated.push_str(&delta);
                        emit(ResponseState::Streaming {
                            delta,
                            accumulated: accumulated.clone(),
                        });
                    }
                }
            }
            Err(EventSourceError::StreamEnded) => break,
            Err(err) => {
                if accumulated.is_empty() {
                    emit(ResponseState::Error {
                        message: err.to_string(),
                    });
                } else {
                    emit(ResponseState::Success {
                        content: accumulated,
                    });
                }
                return;
            }
        }
    }
    emit(ResponseState::Success {
        content: accumulated,
    });
}
