use shared::error::ApiError;
use thiserror::Error;

/// Failures talking to the match server, over HTTP or the push channel.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("server returned {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid server payload: {0}")]
    Decode(String),
    #[error("invalid server url: {0}")]
    InvalidUrl(String),
    #[error("push channel failed: {0}")]
    Push(String),
}

impl TransportError {
    pub(crate) fn rejected(status: u16, body: &str) -> Self {
        let message = match serde_json::from_str::<ApiError>(body) {
            Ok(api_error) => api_error.message,
            Err(_) if body.trim().is_empty() => "empty response body".to_string(),
            Err(_) => body.trim().to_string(),
        };
        Self::Rejected { status, message }
    }

    /// Transient failures are worth retrying for idempotent reads. Rejections
    /// below 500 are final.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Rejected { status, .. } => *status >= 500,
            TransportError::Request(err) => err.is_timeout() || err.is_connect(),
            TransportError::Push(_) => true,
            TransportError::Decode(_) | TransportError::InvalidUrl(_) => false,
        }
    }
}

/// Reasons the turn gate refuses an action. Display strings are shown to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("Create or join a match first")]
    NoActiveMatch,
    #[error("Only team captains can make picks/bans")]
    NotCaptain,
    #[error("It is currently {team_name}'s turn")]
    WrongTurn { team_name: String },
    #[error("Match is already completed")]
    MatchCompleted,
}

/// Problems with user input that are caught before any request is issued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("Enter a match ID to join.")]
    MissingMatchId,
    #[error("Select a team index (0 or 1).")]
    InvalidTeam,
    #[error("Team names must not be empty.")]
    MissingTeamName,
    #[error("Slots per team must be at least 1.")]
    InvalidSlots,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Another action is still in flight")]
    Busy,
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error("Action rejected by server")]
    Rejected(#[source] TransportError),
    #[error("Session closed before the action settled")]
    SessionClosed,
}

#[derive(Debug, Error)]
pub enum LobbyError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("Failed to create match")]
    CreateFailed(#[source] TransportError),
}
