//! Order submission request/response models.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{CartItem, CartLine, OrderId, OrderType, PaymentRequest, PaymentRequestRecord, SessionId, TableId};
use crate::error::{Result, SelfOrderError};

/// Order payload sent on checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSubmission {
    /// Session placing the order.
    pub session: SessionId,
    /// Fulfillment path.
    pub order_type: OrderType,
    /// Table for dine-in orders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<TableId>,
    /// Cart snapshot.
    pub items: Vec<CartLine>,
    /// Sum of line amounts.
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
}

impl OrderSubmission {
    /// Snapshots `lines` into a submission.
    #[inline]
    #[must_use]
    pub fn new(
        session: SessionId,
        order_type: OrderType,
        table: Option<TableId>,
        lines: &[CartItem],
    ) -> Self {
        Self {
            session,
            order_type,
            table,
            items: lines.iter().map(CartItem::to_line).collect(),
            total: lines.iter().map(CartItem::amount).sum(),
        }
    }
}

/// Raw response to an order submission.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Created order.
    #[serde(default)]
    pub order: Option<String>,
    /// Payment request, for payment-gated takeaway orders.
    #[serde(default)]
    pub payment_request: Option<PaymentRequestRecord>,
}

impl OrderRecord {
    /// Extracts the order id of a ticket-only submission.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::MalformedPayload`] if no order id is present.
    #[inline]
    pub fn into_order_id(self) -> Result<OrderId> {
        self.order
            .filter(|order| !order.trim().is_empty())
            .map(OrderId::new)
            .ok_or_else(|| SelfOrderError::MalformedPayload("order response without order id".to_owned()))
    }
}

/// Successful takeaway submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum TakeawayOutcome {
    /// No payment required; the order is final.
    Finalized {
        /// Created order.
        order_id: OrderId,
    },
    /// The guest must pay before the ticket fires.
    PaymentRequired {
        /// Request to present.
        request: PaymentRequest,
    },
}

impl TakeawayOutcome {
    /// Classifies a raw response. A payment request wins over a bare order
    /// id because the ticket must not fire before payment.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::MalformedPayload`] if neither an order id
    /// nor a usable payment request is present.
    #[inline]
    pub fn from_record(record: OrderRecord) -> Result<Self> {
        if let Some(raw) = record.payment_request {
            let mut request = PaymentRequest::from_record(raw)?;
            if request.order_id.is_none() {
                request.order_id = record.order.filter(|order| !order.is_empty()).map(OrderId::new);
            }
            return Ok(Self::PaymentRequired { request });
        }
        let order_id = OrderRecord {
            order: record.order,
            payment_request: None,
        }
        .into_order_id()?;
        Ok(Self::Finalized { order_id })
    }
}
