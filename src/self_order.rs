//! High-level entry point wiring the session, cart, catalog and checkout
//! components around one backend and one client storage.

use alloc::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::cart::CartEngine;
use crate::catalog::CatalogResolver;
use crate::checkout::CheckoutOrchestrator;
use crate::client::Backend;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{Result, SelfOrderError};
use crate::models::{Notice, PaymentEvent, Session, SessionKey, TableId};
use crate::payment::{PaymentSource, PaymentWatcher};
use crate::session::SessionManager;
use crate::storage::Storage;

/// Builder for constructing a [`SelfOrder`] engine.
#[derive(Debug)]
pub struct SelfOrderBuilder<B, S> {
    /// Backend collaborator.
    backend: Option<B>,
    /// Client storage.
    storage: Option<S>,
    /// Time source; the system clock when unset.
    clock: Option<Arc<dyn Clock>>,
    /// Timing knobs.
    config: EngineConfig,
    /// Payment event source; polling when unset.
    payment_source: Option<PaymentSource>,
}

impl<B: Backend + 'static, S: Storage + 'static> SelfOrderBuilder<B, S> {
    /// Sets the backend collaborator.
    #[inline]
    #[must_use]
    pub fn backend(mut self, backend: B) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Sets the client storage.
    #[inline]
    #[must_use]
    pub fn storage(mut self, storage: S) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Overrides the time source (useful for simulations and tests).
    #[inline]
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the timing configuration.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Receives payment status events pushed by the backend on `events`.
    ///
    /// Without this the engine polls [`Backend::payment_status`] every
    /// [`EngineConfig::payment_poll_interval`].
    #[inline]
    #[must_use]
    pub fn payment_events(mut self, events: broadcast::Sender<PaymentEvent>) -> Self {
        self.payment_source = Some(PaymentSource::Push(events));
        self
    }

    /// Builds the engine.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::Config`] if the backend or the storage
    /// was not provided.
    #[inline]
    pub fn build(self) -> Result<SelfOrder<B, S>> {
        let backend = Arc::new(
            self.backend
                .ok_or_else(|| SelfOrderError::Config("backend is required".to_owned()))?,
        );
        let storage = Arc::new(
            self.storage
                .ok_or_else(|| SelfOrderError::Config("storage backend is required".to_owned()))?,
        );
        let clock = self.clock.unwrap_or_else(system_clock);
        let source = self.payment_source.unwrap_or_else(|| PaymentSource::Poll {
            interval: self.config.payment_poll_interval(),
        });
        let expiry_interval = self.config.expiry_check_interval();

        let session = SessionManager::new(Arc::clone(&backend), storage, clock, self.config);
        let core = session.core();
        let cart = CartEngine::new(Arc::clone(&core));
        let checkout = CheckoutOrchestrator::new(
            core,
            cart.clone(),
            PaymentWatcher::new(Arc::clone(&backend), source),
        );
        Ok(SelfOrder {
            catalog: CatalogResolver::new(backend),
            session,
            cart,
            checkout,
            expiry_interval,
            expiry_task: None,
        })
    }
}

/// Default time source.
fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

/// Guest ordering engine for one browser tab.
///
/// # Examples
///
/// ```no_run
/// use selforder_rs::models::{SessionKey, TableId};
/// use selforder_rs::self_order::SelfOrder;
/// use selforder_rs::storage::InMemoryStorage;
/// use selforder_rs::client::HttpBackend;
///
/// # async fn run() -> selforder_rs::error::Result<()> {
/// let backend = HttpBackend::builder()
///     .base_url("https://pos.example.com")
///     .build()?;
/// let mut engine = SelfOrder::builder()
///     .backend(backend)
///     .storage(InMemoryStorage::new())
///     .build()?;
/// let session = engine
///     .start(SessionKey::token("qr-token"), Some(TableId::from("T-07")), None)
///     .await?;
/// let items = engine.catalog().list_items(&session.profile, None).await?;
/// if let Some(first) = items.first() {
///     engine.cart().add_catalog_item(first, 1)?;
/// }
/// let _view = engine.checkout_mut().initiate_checkout().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SelfOrder<B, S> {
    /// Session lifecycle.
    session: SessionManager<B, S>,
    /// Cart of the active session.
    cart: CartEngine<B, S>,
    /// Menu browsing.
    catalog: CatalogResolver<B>,
    /// Checkout flow.
    checkout: CheckoutOrchestrator<B, S>,
    /// Interval of the recurring expiry check.
    expiry_interval: core::time::Duration,
    /// Recurring expiry check of the current session.
    expiry_task: Option<JoinHandle<()>>,
}

impl<B: Backend + 'static, S: Storage + 'static> SelfOrder<B, S> {
    /// Creates a new builder for configuring the engine.
    #[inline]
    #[must_use]
    pub fn builder() -> SelfOrderBuilder<B, S> {
        SelfOrderBuilder {
            backend: None,
            storage: None,
            clock: None,
            config: EngineConfig::default(),
            payment_source: None,
        }
    }

    /// Establishes the session and starts its recurring expiry check.
    ///
    /// See [`SessionManager::initialize`] for the resolution order. A
    /// session other than the previous one starts the checkout flow over
    /// on the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::InvalidSession`] if the key is missing or
    /// refused, a transport error if the backend is unreachable, and
    /// [`SelfOrderError::Config`] outside a tokio runtime.
    #[inline]
    pub async fn start(
        &mut self,
        key: SessionKey,
        table: Option<TableId>,
        held: Option<Session>,
    ) -> Result<Session> {
        let session = self.session.initialize(key, table, held).await?;
        self.checkout.follow_session();
        if let Some(previous) = self.expiry_task.take() {
            previous.abort();
        }
        self.expiry_task = Some(self.session.schedule_expiry_checks(self.expiry_interval)?);
        Ok(session)
    }

    /// Session lifecycle.
    #[inline]
    #[must_use]
    pub const fn session(&self) -> &SessionManager<B, S> {
        &self.session
    }

    /// Cart of the active session.
    #[inline]
    #[must_use]
    pub const fn cart(&self) -> &CartEngine<B, S> {
        &self.cart
    }

    /// Menu browsing.
    #[inline]
    #[must_use]
    pub const fn catalog(&self) -> &CatalogResolver<B> {
        &self.catalog
    }

    /// Checkout flow, read-only.
    #[inline]
    #[must_use]
    pub const fn checkout(&self) -> &CheckoutOrchestrator<B, S> {
        &self.checkout
    }

    /// Checkout flow.
    #[inline]
    #[must_use]
    pub const fn checkout_mut(&mut self) -> &mut CheckoutOrchestrator<B, S> {
        &mut self.checkout
    }

    /// Subscribes to UI notices.
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.session.subscribe()
    }
}

impl<B, S> Drop for SelfOrder<B, S> {
    #[inline]
    fn drop(&mut self) {
        if let Some(task) = self.expiry_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use chrono::TimeDelta;
    use rust_decimal::Decimal;

    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{OrderType, ProfileId, SessionState, ViewMode};
    use crate::storage::InMemoryStorage;
    use crate::testing::{FakeBackend, catalog_item, epoch};

    type Engine = SelfOrder<Arc<FakeBackend>, Arc<InMemoryStorage>>;

    fn build_engine(backend: &Arc<FakeBackend>, storage: &Arc<InMemoryStorage>, clock: &Arc<ManualClock>) -> Engine {
        let shared_clock: Arc<dyn Clock> = Arc::<ManualClock>::clone(clock);
        SelfOrder::builder()
            .backend(Arc::clone(backend))
            .storage(Arc::clone(storage))
            .clock(shared_clock)
            .config(EngineConfig {
                expiry_check_interval_ms: 1_000,
                ..EngineConfig::default()
            })
            .build()
            .unwrap()
    }

    #[test]
    fn builder_requires_backend_and_storage() {
        let no_backend = SelfOrder::<FakeBackend, InMemoryStorage>::builder()
            .storage(InMemoryStorage::new())
            .build()
            .unwrap_err();
        assert!(no_backend.to_string().contains("backend is required"));

        let no_storage = SelfOrder::<FakeBackend, InMemoryStorage>::builder()
            .backend(FakeBackend::new())
            .build()
            .unwrap_err();
        assert!(matches!(no_storage, SelfOrderError::Config(_)));
    }

    #[tokio::test]
    async fn dine_in_order_end_to_end() {
        let backend = Arc::new(FakeBackend::with_order_type(OrderType::DineIn, false));
        backend.script(|script| {
            script.items = vec![catalog_item("COFFEE", 15_000), catalog_item("CAKE", 25_000)];
        });
        let storage = Arc::new(InMemoryStorage::new());
        let clock = Arc::new(ManualClock::new(epoch()));
        let mut engine = build_engine(&backend, &storage, &clock);

        let session = engine
            .start(SessionKey::slug("table-7"), Some(TableId::from("T-07")), None)
            .await
            .unwrap();
        assert_eq!(session.profile, ProfileId::from("Main"));

        let _items = engine.catalog().list_items(&session.profile, None).await.unwrap();
        let cake = engine.catalog().search("cake");
        engine.cart().add_catalog_item(cake.first().unwrap(), 2).unwrap();
        assert_eq!(engine.cart().total(), Decimal::from(50_000));

        let view = engine.checkout_mut().initiate_checkout().await.unwrap();
        assert_eq!(view, ViewMode::Confirmation);
        assert!(engine.checkout().order_id().is_some());
        assert!(engine.cart().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn started_engine_expires_on_schedule() {
        let backend = Arc::new(FakeBackend::new());
        let storage = Arc::new(InMemoryStorage::new());
        let clock = Arc::new(ManualClock::new(epoch()));
        let mut engine = build_engine(&backend, &storage, &clock);
        let mut notices = engine.subscribe();

        let _session = engine
            .start(SessionKey::token("tok-1"), None, None)
            .await
            .unwrap();
        clock.advance(TimeDelta::hours(2));
        tokio::time::sleep(Duration::from_millis(1_500)).await;

        assert_eq!(engine.session().state(), SessionState::Expired);
        assert!(storage.session().unwrap().is_none());
        assert_eq!(notices.try_recv().unwrap(), Notice::SessionExpired);
    }

    #[tokio::test]
    async fn restarting_reuses_the_session() {
        let backend = Arc::new(FakeBackend::new());
        let storage = Arc::new(InMemoryStorage::new());
        let clock = Arc::new(ManualClock::new(epoch()));
        let mut engine = build_engine(&backend, &storage, &clock);

        let first = engine.start(SessionKey::token("tok-1"), None, None).await.unwrap();
        let second = engine.start(SessionKey::token("tok-1"), None, None).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(backend.script(|script| script.sessions_created), 1);
    }
}
