//! Per-route match session: one identity, one snapshot register, at most one
//! live push channel, and a polling fallback. Created on route entry and torn
//! down on route exit.

use std::{
    fmt,
    sync::{Arc, Weak},
    time::{Duration, Instant},
};

use anyhow::{anyhow, Result};
use futures::StreamExt;
use shared::{
    domain::{ActionKind, MapId, MatchId},
    protocol::MatchSnapshot,
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, error, info, warn};

use crate::{
    api::{get_state_with_retry, MatchApi, RetryPolicy},
    dispatcher::{ActionDispatcher, DispatchGuard, InFlightToken},
    error::{DispatchError, InputError, LobbyError, TransportError},
    gate::{TurnGate, ValidatedAction},
    identity::{lookup_stored_auth, resolve_identity, CaptainAuthStore, IdentityContext},
    lobby::{self, CreateMatchRequest},
    push::{PushConnector, PushEvent, PushStream},
    reconciler::{ApplyOutcome, SnapshotRegister, UpdateSource},
    route::{MatchRoute, Navigator},
};

pub const BOOTSTRAP_FAILURE_MESSAGE: &str = "Failed to load match. Redirecting...";
pub const POLL_FAILURE_MESSAGE: &str = "Failed to load state";
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub missed_heartbeats: u32,
    pub retry: RetryPolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(5),
            missed_heartbeats: 3,
            retry: RetryPolicy::default(),
        }
    }
}

impl SessionOptions {
    /// Poll period actually used; never below [`MIN_POLL_INTERVAL`].
    pub fn effective_poll_interval(&self) -> Duration {
        self.poll_interval.max(MIN_POLL_INTERVAL)
    }

    /// Silence on a live push channel after which polling takes over.
    pub fn push_stale_after(&self) -> Duration {
        self.heartbeat_interval
            .saturating_mul(self.missed_heartbeats.max(1))
    }
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    IdentityResolved(IdentityContext),
    SnapshotUpdated {
        match_id: MatchId,
        source: UpdateSource,
        snapshot: Arc<MatchSnapshot>,
    },
    BusyChanged(bool),
    PushChannelChanged {
        match_id: MatchId,
        live: bool,
    },
    Error(String),
    Closed {
        match_id: MatchId,
    },
}

#[derive(Debug)]
pub enum ActionOutcome {
    Applied {
        snapshot: Arc<MatchSnapshot>,
        outcome: ApplyOutcome,
    },
    Rejected(DispatchError),
    /// The session was torn down while the request was outstanding.
    Discarded,
}

/// Synchronous session state. All asynchronous sources funnel through here.
#[derive(Debug)]
pub struct SessionCore {
    identity: IdentityContext,
    register: SnapshotRegister,
    dispatch: DispatchGuard,
    error_message: Option<String>,
    push_live: bool,
    last_push_activity: Option<Instant>,
}

impl SessionCore {
    pub fn new(identity: IdentityContext) -> Self {
        Self {
            identity,
            register: SnapshotRegister::new(),
            dispatch: DispatchGuard::default(),
            error_message: None,
            push_live: false,
            last_push_activity: None,
        }
    }

    pub fn identity(&self) -> &IdentityContext {
        &self.identity
    }

    pub fn snapshot(&self) -> Option<Arc<MatchSnapshot>> {
        self.register.current()
    }

    pub fn generation(&self) -> u64 {
        self.register.generation()
    }

    pub fn gate(&self) -> TurnGate<'_> {
        TurnGate::new(self.register.current_ref(), &self.identity)
    }

    pub fn is_active(&self) -> bool {
        self.register.is_active()
    }

    pub fn is_busy(&self) -> bool {
        self.dispatch.is_busy()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Replaces whatever message was shown before.
    pub fn report_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(match_id = %self.identity.match_id, "session: {message}");
        self.error_message = Some(message);
    }

    pub fn clear_error(&mut self) {
        self.error_message = None;
    }

    pub fn apply_snapshot(&mut self, source: UpdateSource, snapshot: MatchSnapshot) -> ApplyOutcome {
        self.register.apply(source, snapshot)
    }

    pub fn apply_poll_result(
        &mut self,
        snapshot: MatchSnapshot,
        observed_generation: u64,
    ) -> ApplyOutcome {
        self.register
            .apply_if_current(UpdateSource::Poll, snapshot, observed_generation)
    }

    /// Claims the in-flight slot and runs the gate against the current snapshot.
    pub fn begin_action(
        &mut self,
        map_id: MapId,
    ) -> Result<(InFlightToken, ValidatedAction), DispatchError> {
        if !self.is_active() {
            return Err(DispatchError::SessionClosed);
        }

        let token = match self.dispatch.try_begin() {
            Ok(token) => token,
            Err(err) => {
                self.report_error(err.to_string());
                return Err(err);
            }
        };

        let validation = self.gate().validate_action(map_id);
        match validation {
            Ok(action) => {
                self.clear_error();
                Ok((token, action))
            }
            Err(err) => {
                self.dispatch.settle(token);
                self.report_error(err.to_string());
                Err(err.into())
            }
        }
    }

    pub fn settle_action(
        &mut self,
        token: InFlightToken,
        result: Result<MatchSnapshot, DispatchError>,
    ) -> ActionOutcome {
        self.dispatch.settle(token);
        if !self.is_active() {
            debug!(match_id = %self.identity.match_id, "session: dropping action result after teardown");
            return ActionOutcome::Discarded;
        }

        match result {
            Ok(snapshot) => {
                let outcome = self.register.apply(UpdateSource::ActionResult, snapshot);
                match self.register.current() {
                    Some(snapshot) => ActionOutcome::Applied { snapshot, outcome },
                    None => ActionOutcome::Discarded,
                }
            }
            Err(err) => {
                self.report_error(err.to_string());
                ActionOutcome::Rejected(err)
            }
        }
    }

    pub fn is_push_live(&self) -> bool {
        self.push_live
    }

    pub fn mark_push_live(&mut self, now: Instant) {
        self.push_live = true;
        self.last_push_activity = Some(now);
    }

    pub fn record_push_activity(&mut self, now: Instant) {
        self.last_push_activity = Some(now);
    }

    pub fn mark_push_down(&mut self) {
        self.push_live = false;
    }

    pub fn needs_poll(&self, now: Instant, stale_after: Duration) -> bool {
        if !self.is_active() {
            return false;
        }
        if !self.push_live {
            return true;
        }
        match self.last_push_activity {
            Some(at) => now.saturating_duration_since(at) >= stale_after,
            None => true,
        }
    }

    pub fn teardown(&mut self) {
        self.register.close();
        self.push_live = false;
    }
}

#[derive(Default)]
struct SessionTasks {
    push: Option<JoinHandle<()>>,
    poll: Option<JoinHandle<()>>,
}

impl SessionTasks {
    fn abort_all(&mut self) {
        if let Some(task) = self.push.take() {
            task.abort();
        }
        if let Some(task) = self.poll.take() {
            task.abort();
        }
    }
}

impl Drop for SessionTasks {
    fn drop(&mut self) {
        self.abort_all();
    }
}

pub struct VetoSession {
    match_id: MatchId,
    core: Mutex<SessionCore>,
    tasks: Mutex<SessionTasks>,
    api: Arc<dyn MatchApi>,
    dispatcher: ActionDispatcher,
    push: Arc<dyn PushConnector>,
    options: SessionOptions,
    events: broadcast::Sender<SessionEvent>,
}

impl fmt::Debug for VetoSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VetoSession")
            .field("match_id", &self.match_id)
            .finish_non_exhaustive()
    }
}

impl VetoSession {
    fn new(
        identity: IdentityContext,
        api: Arc<dyn MatchApi>,
        push: Arc<dyn PushConnector>,
        options: SessionOptions,
        events: broadcast::Sender<SessionEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            match_id: identity.match_id.clone(),
            core: Mutex::new(SessionCore::new(identity)),
            tasks: Mutex::new(SessionTasks::default()),
            dispatcher: ActionDispatcher::new(Arc::clone(&api)),
            api,
            push,
            options,
            events,
        })
    }

    pub fn match_id(&self) -> &MatchId {
        &self.match_id
    }

    pub async fn identity(&self) -> IdentityContext {
        self.core.lock().await.identity().clone()
    }

    pub async fn snapshot(&self) -> Option<Arc<MatchSnapshot>> {
        self.core.lock().await.snapshot()
    }

    pub async fn error_message(&self) -> Option<String> {
        self.core.lock().await.error_message().map(str::to_string)
    }

    pub async fn is_busy(&self) -> bool {
        self.core.lock().await.is_busy()
    }

    pub async fn is_active(&self) -> bool {
        self.core.lock().await.is_active()
    }

    pub async fn is_push_live(&self) -> bool {
        self.core.lock().await.is_push_live()
    }

    pub async fn current_action_kind(&self) -> Option<ActionKind> {
        self.core.lock().await.gate().current_action_kind()
    }

    pub async fn is_viewer_authorized(&self) -> bool {
        self.core.lock().await.gate().is_viewer_authorized()
    }

    pub async fn is_viewers_turn(&self) -> bool {
        self.core.lock().await.gate().is_viewers_turn()
    }

    /// Validates and sends an action for `map_id`. A second call while one is
    /// outstanding fails with [`DispatchError::Busy`] without touching the server.
    pub async fn select_map(self: &Arc<Self>, map_id: MapId) -> Result<Arc<MatchSnapshot>, DispatchError> {
        let begun = self.core.lock().await.begin_action(map_id);
        let (token, action) = match begun {
            Ok(begun) => begun,
            Err(err) => {
                self.emit(SessionEvent::Error(err.to_string()));
                return Err(err);
            }
        };
        self.emit(SessionEvent::BusyChanged(true));

        // Settling runs in its own task so a dropped caller cannot leave the
        // session busy.
        let session = Arc::clone(self);
        let settled = tokio::spawn(async move {
            let result = session.dispatcher.dispatch(&action).await;
            let outcome = session.core.lock().await.settle_action(token, result);
            session.emit(SessionEvent::BusyChanged(false));
            outcome
        })
        .await
        .map_err(|err| {
            error!(match_id = %self.match_id, "dispatch: settle task failed: {err}");
            DispatchError::SessionClosed
        })?;

        match settled {
            ActionOutcome::Applied { snapshot, outcome } => {
                if outcome == ApplyOutcome::Replaced {
                    self.announce(UpdateSource::ActionResult, Arc::clone(&snapshot));
                }
                Ok(snapshot)
            }
            ActionOutcome::Rejected(err) => {
                self.emit(SessionEvent::Error(err.to_string()));
                Err(err)
            }
            ActionOutcome::Discarded => Err(DispatchError::SessionClosed),
        }
    }

    /// Closes the push channel, stops polling and refuses any later result.
    pub async fn teardown(&self) {
        let was_active = {
            let mut core = self.core.lock().await;
            let was_active = core.is_active();
            core.teardown();
            was_active
        };
        self.tasks.lock().await.abort_all();
        if was_active {
            info!(match_id = %self.match_id, "session: torn down");
            self.emit(SessionEvent::Closed {
                match_id: self.match_id.clone(),
            });
        }
    }

    pub async fn apply(&self, source: UpdateSource, snapshot: MatchSnapshot) -> ApplyOutcome {
        let (outcome, current) = {
            let mut core = self.core.lock().await;
            let outcome = core.apply_snapshot(source, snapshot);
            (outcome, core.snapshot())
        };
        if let (ApplyOutcome::Replaced, Some(current)) = (outcome, current) {
            self.announce(source, current);
        }
        outcome
    }

    async fn apply_poll_result(&self, snapshot: MatchSnapshot, observed_generation: u64) {
        let (outcome, current) = {
            let mut core = self.core.lock().await;
            let outcome = core.apply_poll_result(snapshot, observed_generation);
            (outcome, core.snapshot())
        };
        if let (ApplyOutcome::Replaced, Some(current)) = (outcome, current) {
            self.announce(UpdateSource::Poll, current);
        }
    }

    async fn report_error(&self, message: impl Into<String>) {
        let message = message.into();
        {
            let mut core = self.core.lock().await;
            if !core.is_active() {
                debug!(match_id = %self.match_id, "session: dropping error after teardown: {message}");
                return;
            }
            core.report_error(message.clone());
        }
        self.emit(SessionEvent::Error(message));
    }

    fn announce(&self, source: UpdateSource, snapshot: Arc<MatchSnapshot>) {
        self.emit(SessionEvent::SnapshotUpdated {
            match_id: self.match_id.clone(),
            source,
            snapshot,
        });
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    async fn bootstrap(self: &Arc<Self>) -> Result<(), TransportError> {
        let snapshot =
            match get_state_with_retry(self.api.as_ref(), &self.match_id, self.options.retry).await
            {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    if self.is_active().await {
                        error!(match_id = %self.match_id, "session: initial load failed: {err}");
                        self.report_error(BOOTSTRAP_FAILURE_MESSAGE).await;
                    }
                    return Err(err);
                }
            };

        if self.apply(UpdateSource::Bootstrap, snapshot).await == ApplyOutcome::Discarded {
            return Ok(());
        }

        if let Err(err) = self.open_push_channel().await {
            self.report_error(format!("Live updates unavailable: {err}"))
                .await;
        }

        let mut tasks = self.tasks.lock().await;
        if !self.core.lock().await.is_active() {
            return Ok(());
        }
        let poll = self.spawn_poll_fallback();
        if let Some(previous) = tasks.poll.replace(poll) {
            previous.abort();
        }
        Ok(())
    }

    async fn open_push_channel(self: &Arc<Self>) -> Result<(), TransportError> {
        let stream = self.push.connect(&self.match_id).await?;

        let mut tasks = self.tasks.lock().await;
        {
            let mut core = self.core.lock().await;
            if !core.is_active() {
                return Ok(());
            }
            core.mark_push_live(Instant::now());
        }
        let task = tokio::spawn(run_push_channel(Arc::downgrade(self), stream));
        if let Some(previous) = tasks.push.replace(task) {
            previous.abort();
        }
        drop(tasks);

        info!(match_id = %self.match_id, "session: push channel live");
        self.emit(SessionEvent::PushChannelChanged {
            match_id: self.match_id.clone(),
            live: true,
        });
        Ok(())
    }

    async fn push_channel_closed(&self) {
        let was_active = {
            let mut core = self.core.lock().await;
            core.mark_push_down();
            core.is_active()
        };
        if was_active {
            info!(match_id = %self.match_id, "session: push channel closed");
            self.emit(SessionEvent::PushChannelChanged {
                match_id: self.match_id.clone(),
                live: false,
            });
        }
    }

    fn spawn_poll_fallback(self: &Arc<Self>) -> JoinHandle<()> {
        let session = Arc::downgrade(self);
        let period = self.options.effective_poll_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(session) = session.upgrade() else {
                    break;
                };
                if !session.poll_once().await {
                    break;
                }
            }
        })
    }

    /// One fallback tick. Returns false once the session is closed.
    async fn poll_once(self: &Arc<Self>) -> bool {
        let (needs_poll, push_live, generation) = {
            let core = self.core.lock().await;
            if !core.is_active() {
                return false;
            }
            (
                core.needs_poll(Instant::now(), self.options.push_stale_after()),
                core.is_push_live(),
                core.generation(),
            )
        };
        if !needs_poll {
            return true;
        }

        if !push_live {
            if let Err(err) = self.open_push_channel().await {
                debug!(match_id = %self.match_id, "session: push reconnect failed: {err}");
            }
        }

        match get_state_with_retry(self.api.as_ref(), &self.match_id, self.options.retry).await {
            Ok(snapshot) => self.apply_poll_result(snapshot, generation).await,
            Err(err) => {
                warn!(match_id = %self.match_id, "session: poll failed: {err}");
                self.report_error(POLL_FAILURE_MESSAGE).await;
            }
        }
        true
    }
}

async fn run_push_channel(session: Weak<VetoSession>, mut stream: PushStream) {
    while let Some(item) = stream.next().await {
        let Some(live) = session.upgrade() else {
            return;
        };
        match item {
            Ok(PushEvent::Snapshot(snapshot)) => {
                live.core
                    .lock()
                    .await
                    .record_push_activity(Instant::now());
                live.apply(UpdateSource::Push, snapshot).await;
            }
            Ok(PushEvent::Heartbeat) => {
                live.core
                    .lock()
                    .await
                    .record_push_activity(Instant::now());
            }
            Err(TransportError::Decode(reason)) => {
                live.report_error(format!("Ignored malformed live update: {reason}"))
                    .await;
            }
            Err(err) => {
                live.report_error(format!("Live update channel failed: {err}"))
                    .await;
                break;
            }
        }
    }
    if let Some(live) = session.upgrade() {
        live.push_channel_closed().await;
    }
}

/// Owns the collaborators and the single active match session.
pub struct VetoClient {
    api: Arc<dyn MatchApi>,
    push: Arc<dyn PushConnector>,
    auth_store: Arc<dyn CaptainAuthStore>,
    navigator: Arc<dyn Navigator>,
    options: SessionOptions,
    events: broadcast::Sender<SessionEvent>,
    active: Mutex<Option<Arc<VetoSession>>>,
}

impl VetoClient {
    pub fn new(
        api: Arc<dyn MatchApi>,
        push: Arc<dyn PushConnector>,
        auth_store: Arc<dyn CaptainAuthStore>,
        navigator: Arc<dyn Navigator>,
        options: SessionOptions,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            api,
            push,
            auth_store,
            navigator,
            options,
            events,
            active: Mutex::new(None),
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn create_match(&self, request: &CreateMatchRequest) -> Result<MatchId, LobbyError> {
        let created = lobby::create_match(self.api.as_ref(), request).await;
        if let Err(err) = &created {
            let _ = self.events.send(SessionEvent::Error(err.to_string()));
        }
        created
    }

    /// Enters a match route, replacing any previous session.
    ///
    /// On a failed initial load the navigator is sent back to the entry point
    /// and the session is torn down before the error is returned.
    pub async fn enter(&self, route: MatchRoute) -> Result<Arc<VetoSession>> {
        if route.match_id.is_empty() {
            let err = InputError::MissingMatchId;
            let _ = self.events.send(SessionEvent::Error(err.to_string()));
            return Err(err.into());
        }

        let session = {
            let mut active = self.active.lock().await;
            if let Some(previous) = active.take() {
                previous.teardown().await;
            }

            let stored = lookup_stored_auth(self.auth_store.as_ref(), &route).await;
            let identity = resolve_identity(&route, &stored, self.navigator.as_ref());
            let _ = self
                .events
                .send(SessionEvent::IdentityResolved(identity.clone()));

            let session = VetoSession::new(
                identity,
                Arc::clone(&self.api),
                Arc::clone(&self.push),
                self.options,
                self.events.clone(),
            );
            *active = Some(Arc::clone(&session));
            session
        };

        // The lock is released while loading so `leave` and a newer `enter`
        // can tear this session down immediately.
        let loaded = session.bootstrap().await;
        if !session.is_active().await {
            info!(match_id = %session.match_id, "session: closed while loading");
            return Err(anyhow!(
                "session for match {} closed before it finished loading",
                session.match_id
            ));
        }

        if let Err(err) = loaded {
            self.release(&session).await;
            session.teardown().await;
            self.navigator.leave_to_entry();
            return Err(anyhow!(err).context(BOOTSTRAP_FAILURE_MESSAGE));
        }
        Ok(session)
    }

    async fn release(&self, session: &Arc<VetoSession>) {
        let mut active = self.active.lock().await;
        if active
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, session))
        {
            active.take();
        }
    }

    pub async fn active_session(&self) -> Option<Arc<VetoSession>> {
        self.active.lock().await.clone()
    }

    pub async fn leave(&self) {
        if let Some(session) = self.active.lock().await.take() {
            session.teardown().await;
        }
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
