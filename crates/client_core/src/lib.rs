//! Client-side coordination core for a map veto: who the viewer is, what the
//! latest server snapshot says, whether the viewer may act, and sending that
//! action exactly once.

pub mod api;
pub mod dispatcher;
pub mod error;
pub mod gate;
pub mod identity;
pub mod lobby;
pub mod push;
pub mod reconciler;
pub mod route;
pub mod session;

pub use api::{HttpMatchApi, MatchApi, RetryPolicy, DEFAULT_REQUEST_TIMEOUT};
pub use dispatcher::{ActionDispatcher, DispatchGuard, InFlightToken};
pub use error::{DispatchError, GateError, InputError, LobbyError, TransportError};
pub use gate::{TurnGate, ValidatedAction};
pub use identity::{
    lookup_stored_auth, resolve_identity, CaptainAuthStore, IdentityContext,
    MissingCaptainAuthStore, StoredAuthLookup,
};
pub use lobby::{join_as_spectator, join_match, CreateMatchRequest};
pub use push::{MissingPushConnector, PushConnector, PushEvent, PushStream, WsPushConnector};
pub use reconciler::{ApplyOutcome, SnapshotRegister, UpdateSource};
pub use route::{LoggingNavigator, MatchRoute, Navigator};
pub use session::{
    ActionOutcome, SessionCore, SessionEvent, SessionOptions, VetoClient, VetoSession,
    MIN_POLL_INTERVAL,
};
