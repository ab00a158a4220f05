/// State machine of one streaming request. Observers see a strictly
/// monotonic sequence: Idle → Loading → Streaming* → Success | Error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseState {
    Idle,
    Loading,
    Streaming { delta: String, accumulated: String },
    Success { content: String },
    Error { message: String },
}

impl ResponseState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResponseState::Success { .. } | ResponseState::Error { .. }
        )
    }

    /// A new request may only start from here.
    pub fn accepts_new_request(&self) -> bool {
        matches!(self, ResponseState::Idle) || self.is_terminal()
    }
}
