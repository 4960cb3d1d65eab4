//! Payment watcher: turns a payment request into a stream of its status
//! events.
//!
//! Two sources deliver the same `Paid`/`Expired` contract. The push source
//! filters a backend-fed broadcast channel by correlation id; the poll
//! source asks [`Backend::payment_status`] on a fixed interval for
//! deployments without push delivery.

use alloc::sync::Arc;
use core::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::client::Backend;
use crate::config::MIN_INTERVAL;
use crate::error::{Result, SelfOrderError};
use crate::models::{CorrelationId, PaymentEvent, PaymentRequest, PaymentStatus};

/// Events buffered per subscription. Both event kinds end the watch, so
/// one slot is all that is ever used.
const EVENT_BUFFER: usize = 1;

/// Where payment status events come from.
#[derive(Debug, Clone)]
pub enum PaymentSource {
    /// Events pushed by the backend. Every watch subscribes to this
    /// channel and keeps only events for its own correlation id.
    Push(broadcast::Sender<PaymentEvent>),
    /// Query the backend for the request's status on a fixed interval.
    Poll {
        /// Time between two queries; zero is raised to one millisecond.
        interval: Duration,
    },
}

/// Starts payment watches against one source.
#[derive(Debug)]
pub struct PaymentWatcher<B> {
    /// Backend used by the poll source.
    backend: Arc<B>,
    /// Event source.
    source: PaymentSource,
}

impl<B: Backend + 'static> PaymentWatcher<B> {
    /// Creates a watcher over `source`.
    #[inline]
    #[must_use]
    pub const fn new(backend: Arc<B>, source: PaymentSource) -> Self {
        Self { backend, source }
    }

    /// Event source in use.
    #[inline]
    #[must_use]
    pub const fn source(&self) -> &PaymentSource {
        &self.source
    }

    /// Starts watching `request`.
    ///
    /// The watch ends after the first `Paid` or `Expired` event, when the
    /// subscription is stopped or dropped, or when `parent` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::Config`] outside a tokio runtime.
    #[inline]
    pub fn watch(&self, request: &PaymentRequest, parent: &CancellationToken) -> Result<PaymentSubscription> {
        let runtime = watch_runtime()?;
        Ok(self.watch_on(&runtime, request, parent))
    }

    /// Starts watching `request` on `runtime`.
    pub(crate) fn watch_on(
        &self,
        runtime: &tokio::runtime::Handle,
        request: &PaymentRequest,
        parent: &CancellationToken,
    ) -> PaymentSubscription {
        let token = parent.child_token();
        let (sender, events) = mpsc::channel(EVENT_BUFFER);
        let correlation = request.correlation_id.clone();
        let _task = match self.source.clone() {
            PaymentSource::Push(pushed) => runtime.spawn(forward_pushed(
                pushed.subscribe(),
                correlation.clone(),
                sender,
                token.clone(),
            )),
            PaymentSource::Poll { interval } => runtime.spawn(poll_status(
                Arc::clone(&self.backend),
                request.clone(),
                interval,
                sender,
                token.clone(),
            )),
        };
        tracing::info!(correlation = %correlation, "watching payment");
        PaymentSubscription {
            correlation_id: correlation,
            events,
            token,
        }
    }
}

/// Runtime payment watches are spawned on.
///
/// # Errors
///
/// Returns [`SelfOrderError::Config`] outside a tokio runtime.
pub(crate) fn watch_runtime() -> Result<tokio::runtime::Handle> {
    tokio::runtime::Handle::try_current().map_err(|err| {
        SelfOrderError::Config(format!("payment watch needs a tokio runtime: {err}"))
    })
}

/// Live watch of one payment request.
///
/// Dropping the subscription stops the watch.
#[derive(Debug)]
pub struct PaymentSubscription {
    /// Request being watched.
    correlation_id: CorrelationId,
    /// Events for this request.
    events: mpsc::Receiver<PaymentEvent>,
    /// Stops the background task.
    token: CancellationToken,
}

impl PaymentSubscription {
    /// Request being watched.
    #[inline]
    #[must_use]
    pub const fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Waits for the next event.
    ///
    /// Returns `None` once the watch has ended without (further) events.
    #[inline]
    pub async fn next(&mut self) -> Option<PaymentEvent> {
        self.events.recv().await
    }

    /// Stops the watch. Pending and future events are discarded.
    #[inline]
    pub fn stop(&mut self) {
        self.token.cancel();
        self.events.close();
    }

    /// Returns `true` once the watch was stopped or its parent cancelled.
    #[inline]
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for PaymentSubscription {
    #[inline]
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Forwards the first pushed event matching `correlation`.
async fn forward_pushed(
    mut pushed: broadcast::Receiver<PaymentEvent>,
    correlation: CorrelationId,
    out: mpsc::Sender<PaymentEvent>,
    token: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            () = token.cancelled() => break,
            received = pushed.recv() => received,
        };
        match received {
            Ok(event) if event.correlation_id == correlation => {
                let _sent = out.send(event).await;
                break;
            }
            Ok(event) => {
                tracing::trace!(correlation = %event.correlation_id, "ignoring foreign payment event");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "payment event stream lagged");
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::debug!(correlation = %correlation, "payment event stream closed");
                break;
            }
        }
    }
}

/// Queries the status of `request` until it leaves `Pending`.
///
/// `Cancelled` is reported as an expired request; both leave the cart in
/// place and allow a retry.
async fn poll_status<B: Backend>(
    backend: Arc<B>,
    request: PaymentRequest,
    every: Duration,
    out: mpsc::Sender<PaymentEvent>,
    token: CancellationToken,
) {
    let correlation = request.correlation_id;
    let mut ticker = tokio::time::interval(every.max(MIN_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _tick = ticker.tick() => {}
        }
        let polled = tokio::select! {
            () = token.cancelled() => break,
            polled = backend.payment_status(&correlation) => polled,
        };
        let report = match polled {
            Ok(report) => report,
            Err(err) => {
                tracing::warn!(correlation = %correlation, error = %err, "payment status query failed");
                continue;
            }
        };
        let event = match report.status {
            PaymentStatus::Pending => continue,
            PaymentStatus::Paid => {
                let Some(order_id) = report.order_id.or_else(|| request.order_id.clone()) else {
                    tracing::warn!(correlation = %correlation, "paid status without an order id");
                    continue;
                };
                PaymentEvent::paid(correlation.clone(), order_id)
            }
            PaymentStatus::Expired | PaymentStatus::Cancelled => PaymentEvent::expired(correlation.clone()),
        };
        let _sent = out.send(event).await;
        break;
    }
}
