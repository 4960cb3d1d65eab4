//! Session lifecycle: creation, reuse, persistence and time-based expiry.
//!
//! [`SessionManager`] is the single owner of the canonical session and
//! cart pair. Other components reach that state through the shared session
//! core and its narrow mutation methods instead of any ambient
//! global.

use alloc::sync::Arc;
use core::time::Duration;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::cart::Cart;
use crate::client::Backend;
use crate::clock::Clock;
use crate::config::{EngineConfig, MIN_INTERVAL};
use crate::error::{Result, SelfOrderError};
use crate::models::{Notice, Session, SessionId, SessionKey, SessionState, TableId};
use crate::storage::Storage;

/// Capacity of the notice channel. Slow subscribers skip old notices.
const NOTICE_CAPACITY: usize = 64;

/// Outcome of one expiry check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryCheck {
    /// No session is active; nothing was checked.
    Inactive,
    /// The session is valid.
    Valid {
        /// Time left.
        remaining: TimeDelta,
    },
    /// The session is valid but ends soon; a warning was emitted.
    Warned {
        /// Time left.
        remaining: TimeDelta,
    },
    /// The session has ended.
    Expired,
}

/// Canonical mutable state of the guest's session.
#[derive(Debug, Default)]
pub(crate) struct SessionContext {
    /// Active (or last) session.
    pub(crate) session: Option<Session>,
    /// Lifecycle state.
    pub(crate) state: SessionState,
    /// Cart owned by the session.
    pub(crate) cart: Cart,
    /// No expiry warning is emitted before this instant.
    pub(crate) warn_until: Option<DateTime<Utc>>,
}

impl SessionContext {
    /// Returns the session if it may still be used.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::SessionExpired`] once the session ended
    /// and [`SelfOrderError::InvalidSession`] before one was established.
    pub(crate) fn active(&self) -> Result<&Session> {
        match self.state {
            SessionState::Valid => self
                .session
                .as_ref()
                .ok_or_else(|| SelfOrderError::invalid_session("no active session")),
            SessionState::Expired => Err(SelfOrderError::SessionExpired),
            SessionState::Uninitialized | SessionState::Initializing => {
                Err(SelfOrderError::invalid_session("session not initialized"))
            }
        }
    }
}

/// State and collaborators shared by the session, cart and checkout
/// components.
#[derive(Debug)]
pub(crate) struct SessionCore<B, S> {
    /// Backend collaborator.
    pub(crate) backend: Arc<B>,
    /// Client storage.
    pub(crate) storage: Arc<S>,
    /// Time source for expiry decisions.
    clock: Arc<dyn Clock>,
    /// Session, state and cart.
    context: Mutex<SessionContext>,
    /// UI notices.
    notices: broadcast::Sender<Notice>,
    /// Timing knobs.
    pub(crate) config: EngineConfig,
    /// Cancelled on teardown; parent of every session-scoped task.
    lifetime: Mutex<CancellationToken>,
}

impl<B: Backend, S: Storage> SessionCore<B, S> {
    /// Locks the session context.
    ///
    /// A session whose expiry has passed is expired in place first, so no
    /// caller ever sees it as active between two scheduled checks.
    pub(crate) fn context(&self) -> MutexGuard<'_, SessionContext> {
        let now = self.now();
        let mut ctx = self.context.lock().unwrap_or_else(PoisonError::into_inner);
        let lapsed = ctx.state == SessionState::Valid
            && ctx.session.as_ref().is_some_and(|session| session.is_expired_at(now));
        if lapsed {
            self.expire(&mut ctx);
        }
        ctx
    }

    /// Current wall-clock time.
    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Publishes a notice to every subscriber.
    pub(crate) fn notify(&self, notice: Notice) {
        if self.notices.send(notice).is_err() {
            tracing::trace!("notice dropped, no subscribers");
        }
    }

    /// Token cancelled when the current session is torn down.
    pub(crate) fn lifetime(&self) -> CancellationToken {
        self.lifetime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Cancels the current lifetime and starts a fresh one.
    fn renew_lifetime(&self) {
        let mut token = self.lifetime.lock().unwrap_or_else(PoisonError::into_inner);
        token.cancel();
        *token = CancellationToken::new();
    }

    /// Cancels every session-scoped background task.
    fn cancel_lifetime(&self) {
        self.lifetime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    /// Returns the stored cart if it belongs to `session`.
    fn stored_cart_for(&self, session: &SessionId) -> Cart {
        match self.storage.cart() {
            Ok(Some(stored)) if stored.session == *session => Cart::from_lines(stored.lines),
            Ok(_) => Cart::default(),
            Err(err) => {
                tracing::warn!(error = %err, "could not read stored cart");
                Cart::default()
            }
        }
    }

    /// Makes `session` the active session and persists it.
    ///
    /// Re-installing the session that is already active keeps its cart
    /// and warning state.
    fn install(&self, session: Session) {
        {
            let mut ctx = self.context();
            let continuing = ctx.state == SessionState::Valid
                && ctx.session.as_ref().is_some_and(|active| active.id == session.id);
            if !continuing {
                ctx.cart = self.stored_cart_for(&session.id);
                ctx.warn_until = None;
                self.renew_lifetime();
            }
            ctx.session = Some(session.clone());
            ctx.state = SessionState::Valid;
        }
        if let Err(err) = self.storage.set_session(&session) {
            tracing::warn!(error = %err, "could not persist session");
        }
        tracing::debug!(session = %session.id, expires_at = %session.expires_at, "session active");
    }

    /// Step 1 of initialization: a session already held in memory.
    fn reuse_held(
        &self,
        held: Option<Session>,
        key: &SessionKey,
        now: DateTime<Utc>,
    ) -> Option<Session> {
        let candidate = held.or_else(|| {
            let ctx = self.context();
            if ctx.state == SessionState::Valid {
                ctx.session.clone()
            } else {
                None
            }
        });
        let session = candidate.filter(|session| session.is_valid_for(key, now))?;
        tracing::debug!(session = %session.id, "reusing in-memory session");
        self.install(session.clone());
        Some(session)
    }

    /// Step 2 of initialization: a session found in client storage.
    fn restore_stored(&self, key: &SessionKey, now: DateTime<Utc>) -> Option<Session> {
        let stored = match self.storage.session() {
            Ok(stored) => stored,
            Err(err) => {
                tracing::warn!(error = %err, "could not read stored session");
                None
            }
        };
        let session = stored.filter(|session| session.is_valid_for(key, now))?;
        tracing::debug!(session = %session.id, "restored session from storage");
        self.install(session.clone());
        Some(session)
    }

    /// Step 3 of initialization: a brand-new session from the backend.
    async fn create(&self, key: &SessionKey, table: Option<&TableId>) -> Result<Session> {
        let previous = core::mem::replace(&mut self.context().state, SessionState::Initializing);
        match self.backend.create_session(key, table).await {
            Ok(session) => {
                if let Err(err) = self.storage.clear_cart() {
                    tracing::warn!(error = %err, "could not clear stale cart");
                }
                self.install(session.clone());
                Ok(session)
            }
            Err(err) => {
                self.context().state = previous;
                tracing::warn!(error = %err, "backend refused to create a session");
                Err(creation_failure(err))
            }
        }
    }

    /// Runs one expiry check against the clock.
    pub(crate) fn check_expiry(&self) -> ExpiryCheck {
        let now = self.now();
        let mut ctx = self.context();
        match ctx.state {
            SessionState::Valid => {}
            SessionState::Expired => return ExpiryCheck::Expired,
            SessionState::Uninitialized | SessionState::Initializing => {
                return ExpiryCheck::Inactive;
            }
        }
        let Some(remaining) = ctx.session.as_ref().map(|session| session.remaining_at(now)) else {
            return ExpiryCheck::Inactive;
        };

        if remaining <= TimeDelta::zero() {
            self.expire(&mut ctx);
            return ExpiryCheck::Expired;
        }
        if remaining < self.config.warning_threshold()
            && ctx.warn_until.is_none_or(|deadline| now >= deadline)
        {
            ctx.warn_until = Some(now + self.config.warning_cooldown());
            tracing::debug!(remaining_secs = remaining.num_seconds(), "session expiring soon");
            self.notify(Notice::ExpiryWarning { remaining });
            return ExpiryCheck::Warned { remaining };
        }
        ExpiryCheck::Valid { remaining }
    }

    /// Moves the session to the terminal `Expired` state.
    fn expire(&self, ctx: &mut SessionContext) {
        ctx.state = SessionState::Expired;
        ctx.cart.clear();
        ctx.warn_until = None;
        if let Err(err) = self.storage.clear_session() {
            tracing::warn!(error = %err, "could not clear stored session");
        }
        if let Err(err) = self.storage.clear_cart() {
            tracing::warn!(error = %err, "could not clear stored cart");
        }
        self.cancel_lifetime();
        tracing::info!("session expired");
        self.notify(Notice::SessionExpired);
    }
}

/// Maps a session creation failure to the error surfaced to the guest.
///
/// Refusals become [`SelfOrderError::InvalidSession`]; transport failures
/// stay retryable.
fn creation_failure(err: SelfOrderError) -> SelfOrderError {
    match err {
        SelfOrderError::Api { status, message } if (400..500).contains(&status) => {
            SelfOrderError::invalid_session(message)
        }
        SelfOrderError::MalformedPayload(message) => SelfOrderError::invalid_session(message),
        other => other,
    }
}

/// Owns session creation, validation, persistence and expiry.
///
/// Dropping the manager tears the session down: the recurring expiry
/// check and any payment watch are cancelled.
///
/// # States
///
/// `Uninitialized → Initializing → Valid → Expired`. `Expired` is
/// terminal; only a new successful [`SessionManager::initialize`] leaves it.
#[derive(Debug)]
pub struct SessionManager<B, S> {
    /// Shared state.
    core: Arc<SessionCore<B, S>>,
}

impl<B: Backend + 'static, S: Storage + 'static> SessionManager<B, S> {
    /// Creates a manager with no session.
    #[inline]
    #[must_use]
    pub fn new(backend: Arc<B>, storage: Arc<S>, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        let (notices, _receiver) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            core: Arc::new(SessionCore {
                backend,
                storage,
                clock,
                context: Mutex::new(SessionContext::default()),
                notices,
                config,
                lifetime: Mutex::new(CancellationToken::new()),
            }),
        }
    }

    /// Shared state for sibling components.
    pub(crate) fn core(&self) -> Arc<SessionCore<B, S>> {
        Arc::clone(&self.core)
    }

    /// Establishes a valid session for the presented key.
    ///
    /// Resolution order: the explicitly `held` session (or the one already
    /// active in memory), then a session in client storage issued for the
    /// same key and not yet expired, then a brand-new session from the
    /// backend. Whatever is found is persisted. A new session starts with
    /// an empty cart; a reused one keeps its stored cart.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::InvalidSession`] if no key was presented
    /// or the backend refuses it. Transport failures are returned as-is
    /// and leave the previous state untouched.
    #[inline]
    #[tracing::instrument(skip_all, fields(key = %key))]
    pub async fn initialize(
        &self,
        key: SessionKey,
        table: Option<TableId>,
        held: Option<Session>,
    ) -> Result<Session> {
        if key.is_blank() {
            return Err(SelfOrderError::invalid_session("no token or slug presented"));
        }
        let now = self.core.now();
        if let Some(session) = self.core.reuse_held(held, &key, now) {
            return Ok(session);
        }
        if let Some(session) = self.core.restore_stored(&key, now) {
            return Ok(session);
        }
        self.core.create(&key, table.as_ref()).await
    }

    /// Runs one expiry check now.
    ///
    /// Warns at most once per cooldown while less than the warning
    /// threshold remains. Once the expiry has passed the session becomes
    /// `Expired`, its cart and stored snapshot are cleared, the UI is
    /// notified and every session-scoped task is cancelled.
    #[inline]
    pub fn check_expiry(&self) -> ExpiryCheck {
        self.core.check_expiry()
    }

    /// Starts the recurring expiry check on the current tokio runtime.
    ///
    /// The task stops when the session expires or is torn down. Call this
    /// after [`Self::initialize`]; a later new session cancels it. A zero
    /// interval is raised to one millisecond.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::Config`] outside a tokio runtime.
    #[inline]
    pub fn schedule_expiry_checks(&self, every: Duration) -> Result<JoinHandle<()>> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|err| {
            SelfOrderError::Config(format!("expiry checks need a tokio runtime: {err}"))
        })?;
        let period = every.max(MIN_INTERVAL);
        let core = Arc::clone(&self.core);
        let token = core.lifetime();
        tracing::debug!(interval_ms = period.as_millis(), "scheduling expiry checks");
        Ok(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = token.cancelled() => {
                        tracing::debug!("expiry checks cancelled");
                        break;
                    }
                    _tick = ticker.tick() => {
                        if core.check_expiry() == ExpiryCheck::Expired {
                            break;
                        }
                    }
                }
            }
        }))
    }

    /// Asks the backend for a later expiry.
    ///
    /// On success the in-memory and stored session are updated and the
    /// warning cooldown is reset.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::ExtendFailed`] if the backend call fails,
    /// or [`SelfOrderError::SessionExpired`] if the session ended first.
    #[inline]
    #[tracing::instrument(skip_all)]
    pub async fn extend(&self) -> Result<Session> {
        let id = self.core.context().active()?.id.clone();
        let expires_at = self
            .core
            .backend
            .extend_session(&id)
            .await
            .map_err(|err| SelfOrderError::ExtendFailed {
                source: Box::new(err),
            })?;

        let session = {
            let mut ctx = self.core.context();
            let state = ctx.state;
            let Some(session) = ctx
                .session
                .as_mut()
                .filter(|session| state == SessionState::Valid && session.id == id)
            else {
                return Err(if state == SessionState::Expired {
                    SelfOrderError::SessionExpired
                } else {
                    SelfOrderError::invalid_session("session changed while extending")
                });
            };
            session.expires_at = expires_at;
            let extended = session.clone();
            ctx.warn_until = None;
            extended
        };
        if let Err(err) = self.core.storage.set_session(&session) {
            tracing::warn!(error = %err, "could not persist extended session");
        }
        tracing::debug!(expires_at = %expires_at, "session extended");
        self.core.notify(Notice::SessionExtended { expires_at });
        Ok(session)
    }

    /// Cancels every session-scoped background task.
    #[inline]
    pub fn teardown(&self) {
        self.core.cancel_lifetime();
    }

    /// Current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.core.context().state
    }

    /// The active session, if any.
    #[inline]
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        let ctx = self.core.context();
        ctx.active().ok().cloned()
    }

    /// Time left on the active session.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> Option<TimeDelta> {
        let now = self.core.now();
        let ctx = self.core.context();
        ctx.active().ok().map(|session| session.remaining_at(now))
    }

    /// Subscribes to UI notices.
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.core.notices.subscribe()
    }
}

impl<B, S> Drop for SessionManager<B, S> {
    #[inline]
    fn drop(&mut self) {
        self.core
            .lifetime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }
}
