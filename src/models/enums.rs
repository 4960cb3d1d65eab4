//! Enumeration types for constrained session and checkout values.

use serde::{Deserialize, Serialize};

/// How an order is fulfilled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderType {
    /// Eaten at a table; tickets fire straight to the kitchen.
    DineIn,
    /// Picked up at the counter; may be gated on payment.
    Takeaway,
}

impl OrderType {
    /// Parses the loosely formatted order type labels the backend emits
    /// (`"Dine In"`, `"dine-in"`, `"Take Away"`, `"takeaway"`, ...).
    ///
    /// Returns `None` for anything unrecognised.
    #[inline]
    #[must_use]
    pub fn parse_label(label: &str) -> Option<Self> {
        let normalized: String = label
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|ch| ch.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "dinein" | "dine" => Some(Self::DineIn),
            "takeaway" | "takeout" | "pickup" => Some(Self::Takeaway),
            _ => None,
        }
    }
}

impl core::fmt::Display for OrderType {
    #[inline]
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match *self {
            Self::DineIn => f.write_str("dine-in"),
            Self::Takeaway => f.write_str("takeaway"),
        }
    }
}

/// Lifecycle state of the guest session.
///
/// `Expired` is terminal; only a fresh `initialize` leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    /// No session has been requested yet.
    #[default]
    Uninitialized,
    /// Resolution is in flight.
    Initializing,
    /// A session is held and still inside its expiry window.
    Valid,
    /// The expiry passed or the session was torn down.
    Expired,
}

/// Screen the guest is currently on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewMode {
    /// Browsing the menu.
    #[default]
    Catalog,
    /// Reviewing the cart.
    Cart,
    /// Confirming a takeaway order before submission.
    Checkout,
    /// Waiting for an external payment to complete.
    Payment,
    /// Order accepted.
    Confirmation,
}

impl core::fmt::Display for ViewMode {
    #[inline]
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match *self {
            Self::Catalog => "catalog",
            Self::Cart => "cart",
            Self::Checkout => "checkout",
            Self::Payment => "payment",
            Self::Confirmation => "confirmation",
        };
        f.write_str(label)
    }
}

/// Status of a payment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PaymentStatus {
    /// Issued, waiting for the guest to pay.
    #[default]
    Pending,
    /// Confirmed paid.
    Paid,
    /// Lapsed before payment arrived.
    Expired,
    /// Abandoned by the guest.
    Cancelled,
}

impl PaymentStatus {
    /// Parses backend status labels case-insensitively.
    #[inline]
    #[must_use]
    pub fn parse_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "pending" | "unpaid" | "waiting" => Some(Self::Pending),
            "paid" | "success" | "completed" => Some(Self::Paid),
            "expired" | "timeout" => Some(Self::Expired),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Returns `true` once no further transition is expected.
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}
