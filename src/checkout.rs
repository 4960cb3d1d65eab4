//! Checkout flow: the view state machine from cart to confirmation.
//!
//! ```text
//! Catalog/Cart --initiate--> Checkout --submit--> Payment --paid--> Confirmation
//!       |  (dine-in)                |  (no payment)     |
//!       +---------------------------+-------------------+--> Confirmation
//! ```
//!
//! Dine-in orders skip the checkout screen and fire straight to the
//! kitchen. Takeaway orders always stop on the checkout screen for
//! confirmation and may be payment-gated. A failed submission never moves
//! the flow; the cart is only cleared once an order is final.

use alloc::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cart::CartEngine;
use crate::client::Backend;
use crate::error::{Result, SelfOrderError};
use crate::models::{
    CartItem, Notice, OrderId, OrderSubmission, OrderType, PaymentEvent, PaymentEventKind,
    PaymentRequest, PaymentStatus, SessionId, TakeawayOutcome, ViewMode,
};
use crate::payment::{PaymentSubscription, PaymentWatcher, watch_runtime};
use crate::session::SessionCore;
use crate::storage::Storage;

/// The order being placed. Lives only as long as the checkout flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutTransaction {
    /// Cart snapshot sent with the last submission.
    pub lines: Vec<CartItem>,
    /// Fulfillment path.
    pub order_type: OrderType,
    /// Order id, once the backend assigned one.
    pub order_id: Option<OrderId>,
    /// Payment request of a payment-gated takeaway order.
    pub payment: Option<PaymentRequest>,
}

/// What a payment event did to the flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// The event was stale, foreign or arrived outside the payment view.
    Ignored,
    /// The payment went through and the order is confirmed.
    Paid {
        /// Confirmed order.
        order_id: OrderId,
    },
    /// The request lapsed; the cart is kept for a retry.
    Expired,
}

/// Drives the guest from the cart to a confirmed order.
///
/// Methods take `&mut self`: the flow has exactly one driver, the UI.
/// The flow belongs to one session; once that session ends or another
/// one replaces it, the next call drops the order in flight and returns
/// to the catalog.
#[derive(Debug)]
pub struct CheckoutOrchestrator<B, S> {
    /// Shared session state.
    core: Arc<SessionCore<B, S>>,
    /// Cart of the session.
    cart: CartEngine<B, S>,
    /// Starts payment watches.
    watcher: PaymentWatcher<B>,
    /// Current screen.
    view: ViewMode,
    /// Order in flight or just confirmed.
    transaction: Option<CheckoutTransaction>,
    /// Watch of the pending payment request.
    subscription: Option<PaymentSubscription>,
    /// Session the flow state belongs to.
    session: Option<SessionId>,
}

impl<B: Backend + 'static, S: Storage + 'static> CheckoutOrchestrator<B, S> {
    /// Creates a flow on the catalog view.
    pub(crate) const fn new(
        core: Arc<SessionCore<B, S>>,
        cart: CartEngine<B, S>,
        watcher: PaymentWatcher<B>,
    ) -> Self {
        Self {
            core,
            cart,
            watcher,
            view: ViewMode::Catalog,
            transaction: None,
            subscription: None,
            session: None,
        }
    }

    /// Current screen.
    #[inline]
    #[must_use]
    pub const fn view(&self) -> ViewMode {
        self.view
    }

    /// Order in flight or just confirmed.
    #[inline]
    #[must_use]
    pub const fn transaction(&self) -> Option<&CheckoutTransaction> {
        self.transaction.as_ref()
    }

    /// Order id assigned by the backend, if any.
    #[inline]
    #[must_use]
    pub fn order_id(&self) -> Option<&OrderId> {
        self.transaction.as_ref().and_then(|tx| tx.order_id.as_ref())
    }

    /// Payment request being shown, if any.
    #[inline]
    #[must_use]
    pub fn payment_request(&self) -> Option<&PaymentRequest> {
        self.transaction.as_ref().and_then(|tx| tx.payment.as_ref())
    }

    /// Cart the flow checks out.
    #[inline]
    #[must_use]
    pub const fn cart(&self) -> &CartEngine<B, S> {
        &self.cart
    }

    /// Starts checkout and returns the resulting view.
    ///
    /// Dine-in orders are submitted right away and end on
    /// [`ViewMode::Confirmation`]. Takeaway orders move to
    /// [`ViewMode::Checkout`] and wait for [`Self::submit_takeaway`].
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::EmptyCart`] for an empty cart,
    /// [`SelfOrderError::SessionExpired`] once the session ended,
    /// [`SelfOrderError::SubmissionFailed`] if a dine-in submission fails,
    /// and [`SelfOrderError::InvalidTransition`] from the payment or
    /// confirmation views.
    #[inline]
    #[tracing::instrument(skip_all)]
    pub async fn initiate_checkout(&mut self) -> Result<ViewMode> {
        self.follow_session();
        self.require(
            matches!(self.view, ViewMode::Catalog | ViewMode::Cart | ViewMode::Checkout),
            "start checkout",
        )?;
        let order_type = {
            let ctx = self.core.context();
            let session = ctx.active()?;
            if ctx.cart.is_empty() {
                return Err(SelfOrderError::EmptyCart);
            }
            session.order_type
        };
        match order_type {
            OrderType::DineIn => {
                let _order_id = self.submit_dine_in().await?;
            }
            OrderType::Takeaway => {
                self.view = ViewMode::Checkout;
            }
        }
        Ok(self.view)
    }

    /// Sends the cart as a dine-in ticket and confirms the order.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::SubmissionFailed`] if the backend call
    /// fails; the view and cart are left as they were.
    #[inline]
    #[tracing::instrument(skip_all)]
    pub async fn submit_dine_in(&mut self) -> Result<OrderId> {
        const ACTION: &str = "submit a dine-in order";
        self.follow_session();
        self.require(matches!(self.view, ViewMode::Catalog | ViewMode::Cart), ACTION)?;
        let (submission, transaction) = self.prepare(OrderType::DineIn, ACTION)?;
        let order_id = self
            .core
            .backend
            .submit_dine_in(&submission)
            .await
            .map_err(SelfOrderError::submission)?;
        self.transaction = Some(transaction);
        self.finalize(order_id.clone());
        Ok(order_id)
    }

    /// Sends the confirmed takeaway order and returns the resulting view.
    ///
    /// Ends on [`ViewMode::Confirmation`] when no payment is needed, or
    /// on [`ViewMode::Payment`] with a payment watch running.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::InvalidTransition`] outside the checkout
    /// view and [`SelfOrderError::SubmissionFailed`] if the backend call
    /// fails; the flow then stays on the checkout view.
    #[inline]
    #[tracing::instrument(skip_all)]
    pub async fn submit_takeaway(&mut self) -> Result<ViewMode> {
        const ACTION: &str = "submit a takeaway order";
        self.follow_session();
        self.require(self.view == ViewMode::Checkout, ACTION)?;
        self.place_takeaway(ACTION).await
    }

    /// Resubmits a takeaway order whose payment request lapsed.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::InvalidTransition`] unless the payment
    /// view shows an expired request, and
    /// [`SelfOrderError::SubmissionFailed`] if the backend call fails.
    #[inline]
    #[tracing::instrument(skip_all)]
    pub async fn retry_payment(&mut self) -> Result<ViewMode> {
        const ACTION: &str = "retry the payment";
        self.follow_session();
        let lapsed = self
            .payment_request()
            .is_some_and(|request| request.status == PaymentStatus::Expired);
        self.require(self.view == ViewMode::Payment && lapsed, ACTION)?;
        self.place_takeaway(ACTION).await
    }

    /// Applies a payment status event to the flow.
    ///
    /// A `Paid` event clears the cart, records the order id and, after the
    /// configured confirmation pause, shows the confirmation. An `Expired`
    /// event keeps the cart and allows [`Self::retry_payment`]. Events
    /// for another request, or arriving after the payment view was left,
    /// are ignored.
    #[inline]
    #[tracing::instrument(skip_all, fields(correlation = %event.correlation_id))]
    pub async fn apply_payment_event(&mut self, event: PaymentEvent) -> PaymentOutcome {
        let awaited = self
            .payment_request()
            .filter(|request| request.status == PaymentStatus::Pending)
            .is_some_and(|request| request.correlation_id == event.correlation_id);
        if self.view != ViewMode::Payment || !awaited {
            tracing::debug!("ignoring stale payment event");
            return PaymentOutcome::Ignored;
        }
        match event.kind {
            PaymentEventKind::Paid { order_id } => {
                self.set_payment_status(PaymentStatus::Paid);
                self.stop_watch();
                self.cart.clear();
                if let Some(tx) = self.transaction.as_mut() {
                    tx.order_id = Some(order_id.clone());
                }
                tracing::info!(order = %order_id, "payment received");
                self.core.notify(Notice::PaymentSucceeded {
                    order_id: order_id.clone(),
                });
                tokio::time::sleep(self.core.config.confirmation_delay()).await;
                self.finalize(order_id.clone());
                PaymentOutcome::Paid { order_id }
            }
            PaymentEventKind::Expired => {
                self.set_payment_status(PaymentStatus::Expired);
                self.stop_watch();
                tracing::info!("payment request expired");
                self.core.notify(Notice::PaymentExpired {
                    correlation_id: event.correlation_id,
                });
                PaymentOutcome::Expired
            }
        }
    }

    /// Waits for the pending payment to settle.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::PaymentExpired`] if the request lapsed,
    /// [`SelfOrderError::SessionExpired`] if the session ended first (the
    /// flow is then back on the catalog), and
    /// [`SelfOrderError::InvalidTransition`] when no payment is being
    /// watched.
    #[inline]
    pub async fn await_payment(&mut self) -> Result<OrderId> {
        loop {
            let Some(subscription) = self.subscription.as_mut() else {
                return Err(SelfOrderError::InvalidTransition {
                    from: self.view,
                    action: "wait for a payment",
                });
            };
            let Some(event) = subscription.next().await else {
                self.subscription = None;
                self.follow_session();
                return Err(if self.session.is_none() {
                    SelfOrderError::SessionExpired
                } else {
                    SelfOrderError::PaymentExpired
                });
            };
            match self.apply_payment_event(event).await {
                PaymentOutcome::Paid { order_id } => return Ok(order_id),
                PaymentOutcome::Expired => return Err(SelfOrderError::PaymentExpired),
                PaymentOutcome::Ignored => {}
            }
        }
    }

    /// Abandons the payment and returns to the checkout view.
    ///
    /// The cart is untouched; the request is left orphaned.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::InvalidTransition`] outside the payment
    /// view.
    #[inline]
    pub fn cancel_payment(&mut self) -> Result<()> {
        self.follow_session();
        self.require(self.view == ViewMode::Payment, "cancel the payment")?;
        self.stop_watch();
        if self
            .payment_request()
            .is_some_and(|request| request.status == PaymentStatus::Pending)
        {
            self.set_payment_status(PaymentStatus::Cancelled);
        }
        tracing::debug!("payment cancelled");
        self.view = ViewMode::Checkout;
        Ok(())
    }

    /// Shows the cart.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::InvalidTransition`] from the payment and
    /// confirmation views.
    #[inline]
    pub fn show_cart(&mut self) -> Result<()> {
        self.navigate(ViewMode::Cart, "show the cart")
    }

    /// Shows the menu.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::InvalidTransition`] from the payment and
    /// confirmation views.
    #[inline]
    pub fn show_catalog(&mut self) -> Result<()> {
        self.navigate(ViewMode::Catalog, "show the menu")
    }

    /// Leaves the checkout screen for the cart.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::InvalidTransition`] outside the checkout
    /// view.
    #[inline]
    pub fn back_to_cart(&mut self) -> Result<()> {
        self.follow_session();
        self.require(self.view == ViewMode::Checkout, "go back to the cart")?;
        self.view = ViewMode::Cart;
        Ok(())
    }

    /// Leaves the confirmation for a fresh order.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::InvalidTransition`] outside the
    /// confirmation view.
    #[inline]
    pub fn start_new_order(&mut self) -> Result<()> {
        self.follow_session();
        self.require(self.view == ViewMode::Confirmation, "start a new order")?;
        self.transaction = None;
        self.view = ViewMode::Catalog;
        Ok(())
    }

    /// Submits the takeaway order and routes on the outcome.
    ///
    /// The watch runtime is checked before anything reaches the backend,
    /// so a created order always ends on a view that owns it.
    async fn place_takeaway(&mut self, action: &'static str) -> Result<ViewMode> {
        let (submission, transaction) = self.prepare(OrderType::Takeaway, action)?;
        let runtime = watch_runtime()?;
        let outcome = self
            .core
            .backend
            .submit_takeaway(&submission)
            .await
            .map_err(SelfOrderError::submission)?;
        self.transaction = Some(transaction);
        match outcome {
            TakeawayOutcome::Finalized { order_id } => self.finalize(order_id),
            TakeawayOutcome::PaymentRequired { request } => self.begin_payment(request, &runtime),
        }
        Ok(self.view)
    }

    /// Snapshots the cart into a submission for the active session.
    ///
    /// The returned transaction replaces the current one only once the
    /// backend accepted the submission.
    fn prepare(
        &self,
        order_type: OrderType,
        action: &'static str,
    ) -> Result<(OrderSubmission, CheckoutTransaction)> {
        let ctx = self.core.context();
        let session = ctx.active()?;
        if session.order_type != order_type {
            return Err(SelfOrderError::InvalidTransition {
                from: self.view,
                action,
            });
        }
        if ctx.cart.is_empty() {
            return Err(SelfOrderError::EmptyCart);
        }
        let table = match order_type {
            OrderType::DineIn => session.table.clone(),
            OrderType::Takeaway => None,
        };
        let lines = ctx.cart.lines().to_vec();
        let submission = OrderSubmission::new(session.id.clone(), order_type, table, &lines);
        tracing::debug!(
            session = %session.id,
            lines = lines.len(),
            total = %submission.total,
            "submitting {order_type} order"
        );
        let transaction = CheckoutTransaction {
            lines,
            order_type,
            order_id: None,
            payment: None,
        };
        Ok((submission, transaction))
    }

    /// Shows a payment request and starts watching it on `runtime`.
    fn begin_payment(&mut self, request: PaymentRequest, runtime: &tokio::runtime::Handle) {
        self.stop_watch();
        let subscription = self.watcher.watch_on(runtime, &request, &self.core.lifetime());
        tracing::info!(correlation = %request.correlation_id, amount = %request.amount, "payment required");
        if let Some(tx) = self.transaction.as_mut() {
            tx.order_id.clone_from(&request.order_id);
            tx.payment = Some(request);
        }
        self.subscription = Some(subscription);
        self.view = ViewMode::Payment;
    }

    /// Drops flow state left from a session that ended or was replaced.
    pub(crate) fn follow_session(&mut self) {
        let current = self
            .core
            .context()
            .active()
            .ok()
            .map(|session| session.id.clone());
        if current == self.session {
            return;
        }
        if self.session.is_some() {
            tracing::debug!(view = %self.view, "session changed, resetting checkout");
            self.stop_watch();
            self.transaction = None;
            self.view = ViewMode::Catalog;
        }
        self.session = current;
    }

    /// Makes the order final: clears the cart and shows the confirmation.
    fn finalize(&mut self, order_id: OrderId) {
        self.stop_watch();
        self.cart.clear();
        if let Some(tx) = self.transaction.as_mut() {
            tx.order_id = Some(order_id.clone());
        }
        self.view = ViewMode::Confirmation;
        tracing::info!(order = %order_id, "order confirmed");
        self.core.notify(Notice::OrderConfirmed { order_id });
    }

    /// Ends the payment watch, if any.
    fn stop_watch(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.stop();
        }
    }

    /// Updates the status of the shown payment request.
    fn set_payment_status(&mut self, status: PaymentStatus) {
        if let Some(request) = self.transaction.as_mut().and_then(|tx| tx.payment.as_mut()) {
            request.status = status;
        }
    }

    /// Moves between the browsing views.
    fn navigate(&mut self, to: ViewMode, action: &'static str) -> Result<()> {
        self.follow_session();
        self.require(
            matches!(self.view, ViewMode::Catalog | ViewMode::Cart | ViewMode::Checkout),
            action,
        )?;
        self.view = to;
        Ok(())
    }

    /// Refuses `action` unless `allowed`.
    const fn require(&self, allowed: bool, action: &'static str) -> Result<()> {
        if allowed {
            Ok(())
        } else {
            Err(SelfOrderError::InvalidTransition {
                from: self.view,
                action,
            })
        }
    }
}
