//! Scripted in-process backend for exercising the engine in tests.

use alloc::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;

use crate::client::Backend;
use crate::error::{Result, SelfOrderError};
use crate::models::{
    CartLine, CatalogItem, CorrelationId, GroupId, ItemCode, ItemGroup, OrderId, OrderSubmission,
    OrderType, PaymentRequest, PaymentStatus, PaymentStatusReport, ProfileId, Session, SessionId,
    SessionKey, TableId, TakeawayOutcome, VariantSet,
};

/// Fixed start instant shared by engine tests.
pub(crate) fn epoch() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default()
}

/// Mutable script and call log of a [`FakeBackend`].
#[derive(Debug)]
pub(crate) struct Script {
    /// Expiry handed to newly created sessions.
    pub(crate) expires_at: DateTime<Utc>,
    /// Order type of new sessions; `None` infers it from the table.
    pub(crate) order_type: Option<OrderType>,
    /// Payment flag of new sessions.
    pub(crate) payment_required: bool,
    /// Refuse to create sessions.
    pub(crate) reject_sessions: bool,
    /// Fail extend calls.
    pub(crate) fail_extend: bool,
    /// Fail cart saves.
    pub(crate) fail_save: bool,
    /// Fail the next order submissions.
    pub(crate) fail_submit: bool,
    /// Groups returned for any profile.
    pub(crate) groups: Vec<ItemGroup>,
    /// Items returned for any profile.
    pub(crate) items: Vec<CatalogItem>,
    /// Variant sets by template.
    pub(crate) variants: BTreeMap<ItemCode, VariantSet>,
    /// Statuses reported by the polling endpoint.
    pub(crate) statuses: BTreeMap<CorrelationId, PaymentStatusReport>,
    /// Number of sessions created.
    pub(crate) sessions_created: u32,
    /// Cart snapshots received, in arrival order.
    pub(crate) saved_carts: Vec<Vec<CartLine>>,
    /// Orders received.
    pub(crate) submissions: Vec<OrderSubmission>,
    /// Payment status queries received.
    pub(crate) status_queries: u32,
}

/// In-process [`Backend`] driven by a [`Script`].
#[derive(Debug)]
pub(crate) struct FakeBackend {
    /// Script and call log.
    script: Mutex<Script>,
}

impl FakeBackend {
    /// Backend issuing sessions that expire one hour after [`epoch`].
    pub(crate) fn new() -> Self {
        Self {
            script: Mutex::new(Script {
                expires_at: epoch() + TimeDelta::hours(1),
                order_type: None,
                payment_required: false,
                reject_sessions: false,
                fail_extend: false,
                fail_save: false,
                fail_submit: false,
                groups: Vec::new(),
                items: Vec::new(),
                variants: BTreeMap::new(),
                statuses: BTreeMap::new(),
                sessions_created: 0,
                saved_carts: Vec::new(),
                submissions: Vec::new(),
                status_queries: 0,
            }),
        }
    }

    /// Backend issuing sessions of a fixed order type.
    pub(crate) fn with_order_type(order_type: OrderType, payment_required: bool) -> Self {
        let backend = Self::new();
        backend.script(|script| {
            script.order_type = Some(order_type);
            script.payment_required = payment_required;
        });
        backend
    }

    /// Reads or edits the script.
    pub(crate) fn script<R, F: FnOnce(&mut Script) -> R>(&self, op: F) -> R {
        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        op(&mut script)
    }

    /// Transport-like failure used for every scripted failure.
    fn unavailable() -> SelfOrderError {
        SelfOrderError::Api {
            status: 503,
            message: "backend unavailable".to_owned(),
        }
    }
}

impl Backend for FakeBackend {
    async fn create_session(&self, key: &SessionKey, table: Option<&TableId>) -> Result<Session> {
        self.script(|script| {
            if script.reject_sessions {
                return Err(SelfOrderError::Api {
                    status: 403,
                    message: "unknown table".to_owned(),
                });
            }
            script.sessions_created += 1;
            let order_type = script.order_type.unwrap_or(if table.is_some() {
                OrderType::DineIn
            } else {
                OrderType::Takeaway
            });
            Ok(Session {
                id: SessionId::new(format!("SO-SESS-{:04}", script.sessions_created)),
                key: key.clone(),
                profile: ProfileId::from("Main"),
                branch: None,
                table: table.cloned(),
                order_type,
                guest_allowed: true,
                payment_required: script.payment_required,
                expires_at: script.expires_at,
                disclaimer: None,
                branding: None,
            })
        })
    }

    async fn extend_session(&self, _session: &SessionId) -> Result<DateTime<Utc>> {
        self.script(|script| {
            if script.fail_extend {
                return Err(Self::unavailable());
            }
            script.expires_at += TimeDelta::hours(1);
            Ok(script.expires_at)
        })
    }

    async fn item_groups(&self, _profile: &ProfileId) -> Result<Vec<ItemGroup>> {
        Ok(self.script(|script| script.groups.clone()))
    }

    async fn items(&self, _profile: &ProfileId, group: Option<&GroupId>) -> Result<Vec<CatalogItem>> {
        Ok(self.script(|script| {
            script
                .items
                .iter()
                .filter(|item| group.is_none_or(|wanted| item.item_group.as_ref() == Some(wanted)))
                .cloned()
                .collect()
        }))
    }

    async fn item_variants(&self, template: &ItemCode) -> Result<VariantSet> {
        self.script(|script| {
            script
                .variants
                .get(template)
                .cloned()
                .ok_or_else(|| SelfOrderError::NoVariants(template.clone()))
        })
    }

    async fn save_cart(&self, _session: &SessionId, lines: &[CartLine]) -> Result<()> {
        self.script(|script| {
            if script.fail_save {
                return Err(Self::unavailable());
            }
            script.saved_carts.push(lines.to_vec());
            Ok(())
        })
    }

    async fn submit_dine_in(&self, order: &OrderSubmission) -> Result<OrderId> {
        self.script(|script| {
            if script.fail_submit {
                return Err(Self::unavailable());
            }
            script.submissions.push(order.clone());
            Ok(OrderId::new(format!("SO-ORD-{:04}", script.submissions.len())))
        })
    }

    async fn submit_takeaway(&self, order: &OrderSubmission) -> Result<TakeawayOutcome> {
        self.script(|script| {
            if script.fail_submit {
                return Err(Self::unavailable());
            }
            script.submissions.push(order.clone());
            let sequence = script.submissions.len();
            let order_id = OrderId::new(format!("SO-ORD-{sequence:04}"));
            if !script.payment_required {
                return Ok(TakeawayOutcome::Finalized { order_id });
            }
            Ok(TakeawayOutcome::PaymentRequired {
                request: PaymentRequest {
                    correlation_id: CorrelationId::new(format!("PR-{sequence:04}")),
                    order_id: Some(order_id),
                    amount: order.total,
                    qr_image: None,
                    payment_url: Some(format!("https://pay.example.com/PR-{sequence:04}")),
                    expires_at: None,
                    status: PaymentStatus::Pending,
                },
            })
        })
    }

    async fn payment_status(&self, correlation: &CorrelationId) -> Result<PaymentStatusReport> {
        Ok(self.script(|script| {
            script.status_queries += 1;
            script.statuses.get(correlation).cloned().unwrap_or_default()
        }))
    }
}

/// A plain catalog item priced in whole units.
pub(crate) fn catalog_item(code: &str, price: i64) -> CatalogItem {
    CatalogItem {
        item_code: ItemCode::from(code),
        item_name: code.to_lowercase(),
        has_variants: false,
        price: Decimal::from(price),
        image: None,
        item_group: None,
    }
}
