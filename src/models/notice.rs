//! Notifications pushed to the UI layer.

use chrono::{DateTime, TimeDelta, Utc};

use super::{CorrelationId, OrderId};

/// Something the guest should be told about.
///
/// Published on a broadcast channel; the UI decides how to render each
/// kind (banner, toast, full-screen state).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The session ends soon. Emitted at most once per cooldown window.
    ExpiryWarning {
        /// Time left.
        remaining: TimeDelta,
    },
    /// The session ended; the guest must re-scan.
    SessionExpired,
    /// The session was extended.
    SessionExtended {
        /// New expiry.
        expires_at: DateTime<Utc>,
    },
    /// Best-effort cart save to the backend failed. Soft warning only.
    CartSaveFailed {
        /// Failure description.
        message: String,
    },
    /// A payment was confirmed.
    PaymentSucceeded {
        /// Order the payment settled.
        order_id: OrderId,
    },
    /// A payment request lapsed; the guest may retry.
    PaymentExpired {
        /// Lapsed request.
        correlation_id: CorrelationId,
    },
    /// The order is final and the confirmation screen is showing.
    OrderConfirmed {
        /// Confirmed order.
        order_id: OrderId,
    },
}
