//! Payment request and payment status event models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::loose;
use super::{CorrelationId, OrderId, PaymentStatus};
use crate::error::{Result, SelfOrderError};

/// A backend-issued request for the guest to pay a takeaway order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    /// Matches asynchronous status events to this request.
    pub correlation_id: CorrelationId,
    /// Order the payment settles, when the backend already created it.
    pub order_id: Option<OrderId>,
    /// Amount due.
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    /// QR image (data URL or link) for wallet apps.
    pub qr_image: Option<String>,
    /// Hosted payment page.
    pub payment_url: Option<String>,
    /// Instant after which the request lapses.
    pub expires_at: Option<DateTime<Utc>>,
    /// Current status.
    pub status: PaymentStatus,
}

impl PaymentRequest {
    /// Builds a typed request from a raw record.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::MalformedPayload`] if the correlation id is
    /// missing; without it no status event could ever be matched.
    #[inline]
    pub fn from_record(record: PaymentRequestRecord) -> Result<Self> {
        let correlation = record
            .correlation_id
            .or(record.name)
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                SelfOrderError::MalformedPayload("payment request without correlation id".to_owned())
            })?;
        Ok(Self {
            correlation_id: CorrelationId::new(correlation),
            order_id: record.order.filter(|order| !order.is_empty()).map(OrderId::new),
            amount: record.amount.unwrap_or_default(),
            qr_image: record.qr_image.filter(|image| !image.is_empty()),
            payment_url: record.payment_url.filter(|link| !link.is_empty()),
            expires_at: record.expires_at,
            status: record
                .status
                .as_deref()
                .and_then(PaymentStatus::parse_label)
                .unwrap_or_default(),
        })
    }
}

/// Raw payment request as emitted by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PaymentRequestRecord {
    /// Correlation id.
    #[serde(default)]
    pub correlation_id: Option<String>,
    /// Record name, used when no explicit correlation id is sent.
    #[serde(default)]
    pub name: Option<String>,
    /// Linked order.
    #[serde(default)]
    pub order: Option<String>,
    /// Amount due.
    #[serde(default, deserialize_with = "loose::decimal")]
    pub amount: Option<Decimal>,
    /// QR image.
    #[serde(default)]
    pub qr_image: Option<String>,
    /// Payment page.
    #[serde(default)]
    pub payment_url: Option<String>,
    /// Expiry.
    #[serde(default, deserialize_with = "loose::timestamp")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Status label.
    #[serde(default)]
    pub status: Option<String>,
}

/// What happened to a payment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum PaymentEventKind {
    /// Payment confirmed; the order is final.
    Paid {
        /// Order the payment settled.
        order_id: OrderId,
    },
    /// The request lapsed unpaid.
    Expired,
}

/// Asynchronous payment status event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEvent {
    /// Request the event belongs to.
    pub correlation_id: CorrelationId,
    /// Transition.
    #[serde(flatten)]
    pub kind: PaymentEventKind,
}

impl PaymentEvent {
    /// Creates a `Paid` event.
    #[inline]
    #[must_use]
    pub const fn paid(correlation_id: CorrelationId, order_id: OrderId) -> Self {
        Self {
            correlation_id,
            kind: PaymentEventKind::Paid { order_id },
        }
    }

    /// Creates an `Expired` event.
    #[inline]
    #[must_use]
    pub const fn expired(correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            kind: PaymentEventKind::Expired,
        }
    }
}

/// Result of a payment status query, used by the polling source.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PaymentStatusReport {
    /// Current status.
    pub status: PaymentStatus,
    /// Order id, once known.
    #[serde(default)]
    pub order_id: Option<OrderId>,
}

impl PaymentStatusReport {
    /// Builds a report from a raw status record.
    #[inline]
    #[must_use]
    pub fn from_record(record: PaymentStatusRecord) -> Self {
        Self {
            status: record
                .status
                .as_deref()
                .and_then(PaymentStatus::parse_label)
                .unwrap_or_default(),
            order_id: record.order.filter(|order| !order.is_empty()).map(OrderId::new),
        }
    }
}

/// Raw payment status response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PaymentStatusRecord {
    /// Status label.
    #[serde(default)]
    pub status: Option<String>,
    /// Order id.
    #[serde(default)]
    pub order: Option<String>,
}
