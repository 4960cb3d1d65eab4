//! Guest session model and its backend record.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::loose;
use super::{BranchId, OrderType, ProfileId, SessionId, TableId};
use crate::error::{Result, SelfOrderError};

/// Which kind of credential a [`SessionKey`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyKind {
    /// Opaque token issued for a table or counter.
    Token,
    /// Human-friendly slug the backend resolves.
    Slug,
}

/// What the guest presented when opening the ordering page: either the
/// direct token encoded in the QR code or a short slug.
///
/// Two keys are equal only when both kind and value match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    /// Credential kind.
    kind: KeyKind,
    /// Raw presented value.
    value: String,
}

impl SessionKey {
    /// A direct token.
    #[inline]
    #[must_use]
    pub fn token<T: Into<String>>(value: T) -> Self {
        Self {
            kind: KeyKind::Token,
            value: value.into(),
        }
    }

    /// A slug.
    #[inline]
    #[must_use]
    pub fn slug<T: Into<String>>(value: T) -> Self {
        Self {
            kind: KeyKind::Slug,
            value: value.into(),
        }
    }

    /// Returns the credential kind.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> KeyKind {
        self.kind
    }

    /// Returns the raw presented value.
    #[inline]
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns `true` when nothing usable was presented.
    #[inline]
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.value.trim().is_empty()
    }
}

impl core::fmt::Display for SessionKey {
    #[inline]
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.kind {
            KeyKind::Token => write!(f, "token:{}", self.value),
            KeyKind::Slug => write!(f, "slug:{}", self.value),
        }
    }
}

/// A guest's time-boxed ordering context.
///
/// A session is usable only while the clock is before [`Session::expires_at`]
/// and the client presents the same [`SessionKey`] it was issued for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Identity token the backend uses to address this session.
    pub id: SessionId,
    /// Token or slug the session was opened with.
    pub key: SessionKey,
    /// Sales profile orders are booked against.
    pub profile: ProfileId,
    /// Branch the profile belongs to.
    pub branch: Option<BranchId>,
    /// Table reference; absent for takeaway.
    pub table: Option<TableId>,
    /// Fulfillment path.
    pub order_type: OrderType,
    /// Whether guests may order without signing in.
    pub guest_allowed: bool,
    /// Whether takeaway orders are gated on payment.
    pub payment_required: bool,
    /// Instant after which the session is unusable.
    pub expires_at: DateTime<Utc>,
    /// Disclaimer shown before ordering.
    pub disclaimer: Option<String>,
    /// Branding reference (logo or theme name).
    pub branding: Option<String>,
}

impl Session {
    /// Builds a typed session from a raw backend record.
    ///
    /// Missing flags default to `guest_allowed = true` and
    /// `payment_required = false`. A missing order type is inferred from
    /// the table: present means dine-in, absent means takeaway.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::InvalidSession`] if the record has no
    /// name, no sales profile or no expiry.
    #[inline]
    pub fn from_record(
        record: SessionRecord,
        key: SessionKey,
        table_hint: Option<TableId>,
    ) -> Result<Self> {
        let name = record
            .name
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| SelfOrderError::invalid_session("backend returned a session without a name"))?;
        let profile = record
            .pos_profile
            .filter(|profile| !profile.trim().is_empty())
            .ok_or_else(|| SelfOrderError::invalid_session("session has no sales profile"))?;
        let expires_at = record
            .expires_at
            .ok_or_else(|| SelfOrderError::invalid_session("session has no expiry"))?;
        let table = record
            .table
            .filter(|table| !table.trim().is_empty())
            .map(TableId::new)
            .or(table_hint);
        let order_type = record
            .order_type
            .as_deref()
            .and_then(OrderType::parse_label)
            .unwrap_or(if table.is_some() {
                OrderType::DineIn
            } else {
                OrderType::Takeaway
            });

        Ok(Self {
            id: SessionId::new(name),
            key,
            profile: ProfileId::new(profile),
            branch: record.branch.filter(|branch| !branch.is_empty()).map(BranchId::new),
            table,
            order_type,
            guest_allowed: record.allow_guest.unwrap_or(true),
            payment_required: record.require_payment.unwrap_or(false),
            expires_at,
            disclaimer: record.disclaimer.filter(|text| !text.trim().is_empty()),
            branding: record.branding.filter(|text| !text.trim().is_empty()),
        })
    }

    /// Time left before expiry; negative once expired.
    #[inline]
    #[must_use]
    pub fn remaining_at(&self, now: DateTime<Utc>) -> TimeDelta {
        self.expires_at.signed_duration_since(now)
    }

    /// Returns `true` once `now` has reached the expiry.
    #[inline]
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Returns `true` if this session may be reused for `key` at `now`.
    #[inline]
    #[must_use]
    pub fn is_valid_for(&self, key: &SessionKey, now: DateTime<Utc>) -> bool {
        self.key == *key && !self.is_expired_at(now)
    }
}

/// Session record as emitted by the backend, fields optional and loosely
/// typed. Normalize with [`Session::from_record`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Session name.
    #[serde(default)]
    pub name: Option<String>,
    /// Sales profile.
    #[serde(default)]
    pub pos_profile: Option<String>,
    /// Branch.
    #[serde(default)]
    pub branch: Option<String>,
    /// Table.
    #[serde(default)]
    pub table: Option<String>,
    /// Order type label (`"Dine In"`, `"Takeaway"`, ...).
    #[serde(default)]
    pub order_type: Option<String>,
    /// Guest access flag.
    #[serde(default, deserialize_with = "loose::flag")]
    pub allow_guest: Option<bool>,
    /// Payment gating flag.
    #[serde(default, deserialize_with = "loose::flag")]
    pub require_payment: Option<bool>,
    /// Expiry in any supported timestamp layout.
    #[serde(default, deserialize_with = "loose::timestamp")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Disclaimer text.
    #[serde(default)]
    pub disclaimer: Option<String>,
    /// Branding reference.
    #[serde(default)]
    pub branding: Option<String>,
}

/// Request body for creating or validating a session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionRequest {
    /// Direct token, if one was presented.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Slug, if one was presented.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    /// Table the guest appears to be sitting at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<TableId>,
}

impl SessionRequest {
    /// Builds the request for a presented key and optional table hint.
    #[inline]
    #[must_use]
    pub fn new(key: &SessionKey, table: Option<TableId>) -> Self {
        let (token, slug) = match key.kind() {
            KeyKind::Token => (Some(key.value().to_owned()), None),
            KeyKind::Slug => (None, Some(key.value().to_owned())),
        };
        Self { token, slug, table }
    }
}

/// Response to an extend request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExtendRecord {
    /// New expiry.
    #[serde(default, deserialize_with = "loose::timestamp")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ExtendRecord {
    /// Extracts the new expiry.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::MalformedPayload`] if the expiry is missing.
    #[inline]
    pub fn into_expiry(self) -> Result<DateTime<Utc>> {
        self.expires_at
            .ok_or_else(|| SelfOrderError::MalformedPayload("extend response has no expiry".to_owned()))
    }
}
