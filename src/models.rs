//! Data models for the guest ordering session.
//!
//! This module contains strongly-typed representations of sessions, cart
//! lines, catalog items, orders and payments, the raw backend records
//! they are normalized from, newtype ID wrappers, and enumeration types
//! for constrained values.

mod cart_item;
mod catalog;
mod enums;
mod ids;
mod loose;
mod notice;
mod order;
mod payment;
mod session;

pub use cart_item::{CartItem, CartLine, StoredCart};
pub use catalog::{
    CatalogItem, CatalogItemRecord, ItemGroup, Variant, VariantFilter, VariantSet, VariantsRecord,
};
pub use enums::{OrderType, PaymentStatus, SessionState, ViewMode};
pub use ids::{BranchId, CorrelationId, GroupId, ItemCode, OrderId, ProfileId, SessionId, TableId};
pub use notice::Notice;
pub use order::{OrderRecord, OrderSubmission, TakeawayOutcome};
pub use payment::{
    PaymentEvent, PaymentEventKind, PaymentRequest, PaymentRequestRecord, PaymentStatusRecord,
    PaymentStatusReport,
};
pub use session::{ExtendRecord, KeyKind, Session, SessionKey, SessionRecord, SessionRequest};
