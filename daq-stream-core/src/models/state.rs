use std::fmt;

use serde::{Deserialize, Serialize};

/// Device session state machine.
///
/// State transitions:
/// ```text
/// closed → open → streaming → stopped
///            ↓                   ↓
///          closed ←──────────────┘
/// ```
/// Release is accepted from every state and always lands in `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Closed,
    Open,
    Streaming,
    Stopped,
}

impl SessionState {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }

    /// Whether the session still holds a driver handle.
    pub fn holds_handle(&self) -> bool {
        !self.is_closed()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::Streaming => "streaming",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
