//! Request/response surface of the ordering backend.
//!
//! All business rules (pricing, inventory, access control) live behind
//! [`Backend`]. The engine only ever sees normalized, fully typed models;
//! raw payload shapes stay inside the implementations.

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::{HttpBackend, HttpBackendBuilder};

use alloc::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    CartLine, CatalogItem, CorrelationId, GroupId, ItemCode, ItemGroup, OrderId, OrderSubmission,
    PaymentStatusReport, ProfileId, Session, SessionId, SessionKey, TableId, TakeawayOutcome,
    VariantSet,
};

/// Backend collaborator the session engine talks to.
///
/// Every method is a potential suspension point. Futures are `Send` so
/// the engine can drive them from spawned tasks (cart save-through,
/// payment polling).
pub trait Backend: core::fmt::Debug + Send + Sync {
    /// Creates (or validates) a session for a token or slug.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend refuses the key or is unreachable.
    fn create_session(
        &self,
        key: &SessionKey,
        table: Option<&TableId>,
    ) -> impl Future<Output = Result<Session>> + Send;

    /// Pushes the expiry of `session` out and returns the new expiry.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend refuses or is unreachable.
    fn extend_session(
        &self,
        session: &SessionId,
    ) -> impl Future<Output = Result<DateTime<Utc>>> + Send;

    /// Lists the item groups of a sales profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    fn item_groups(&self, profile: &ProfileId)
    -> impl Future<Output = Result<Vec<ItemGroup>>> + Send;

    /// Lists the items of a sales profile, optionally restricted to a group.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    fn items(
        &self,
        profile: &ProfileId,
        group: Option<&GroupId>,
    ) -> impl Future<Output = Result<Vec<CatalogItem>>> + Send;

    /// Resolves a template item to its concrete variants.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::SelfOrderError::NoVariants`] if the template
    /// has none, or a transport error.
    fn item_variants(&self, template: &ItemCode) -> impl Future<Output = Result<VariantSet>> + Send;

    /// Best-effort save of the cart snapshot to the session record.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails. Callers treat it as a soft
    /// warning.
    fn save_cart(
        &self,
        session: &SessionId,
        lines: &[CartLine],
    ) -> impl Future<Output = Result<()>> + Send;

    /// Submits a dine-in order. Always ticket-only.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the backend rejects the
    /// order.
    fn submit_dine_in(
        &self,
        order: &OrderSubmission,
    ) -> impl Future<Output = Result<OrderId>> + Send;

    /// Submits a takeaway order, which may come back payment-gated.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the backend rejects the
    /// order.
    fn submit_takeaway(
        &self,
        order: &OrderSubmission,
    ) -> impl Future<Output = Result<TakeawayOutcome>> + Send;

    /// Queries the status of a payment request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    fn payment_status(
        &self,
        correlation: &CorrelationId,
    ) -> impl Future<Output = Result<PaymentStatusReport>> + Send;
}

impl<B: Backend> Backend for Arc<B> {
    #[inline]
    fn create_session(
        &self,
        key: &SessionKey,
        table: Option<&TableId>,
    ) -> impl Future<Output = Result<Session>> + Send {
        (**self).create_session(key, table)
    }

    #[inline]
    fn extend_session(
        &self,
        session: &SessionId,
    ) -> impl Future<Output = Result<DateTime<Utc>>> + Send {
        (**self).extend_session(session)
    }

    #[inline]
    fn item_groups(
        &self,
        profile: &ProfileId,
    ) -> impl Future<Output = Result<Vec<ItemGroup>>> + Send {
        (**self).item_groups(profile)
    }

    #[inline]
    fn items(
        &self,
        profile: &ProfileId,
        group: Option<&GroupId>,
    ) -> impl Future<Output = Result<Vec<CatalogItem>>> + Send {
        (**self).items(profile, group)
    }

    #[inline]
    fn item_variants(&self, template: &ItemCode) -> impl Future<Output = Result<VariantSet>> + Send {
        (**self).item_variants(template)
    }

    #[inline]
    fn save_cart(
        &self,
        session: &SessionId,
        lines: &[CartLine],
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).save_cart(session, lines)
    }

    #[inline]
    fn submit_dine_in(
        &self,
        order: &OrderSubmission,
    ) -> impl Future<Output = Result<OrderId>> + Send {
        (**self).submit_dine_in(order)
    }

    #[inline]
    fn submit_takeaway(
        &self,
        order: &OrderSubmission,
    ) -> impl Future<Output = Result<TakeawayOutcome>> + Send {
        (**self).submit_takeaway(order)
    }

    #[inline]
    fn payment_status(
        &self,
        correlation: &CorrelationId,
    ) -> impl Future<Output = Result<PaymentStatusReport>> + Send {
        (**self).payment_status(correlation)
    }
}
