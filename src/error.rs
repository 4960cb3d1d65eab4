//! Error types for the self-order session engine.

use crate::models::{ItemCode, ViewMode};

/// All errors that can occur while driving a guest ordering session.
#[derive(Debug, thiserror::Error)]
pub enum SelfOrderError {
    /// HTTP transport error from the underlying client.
    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status code.
    #[error("backend error (HTTP {status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the response body.
        message: String,
    },

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Client storage backend failed.
    #[error("storage error: {0}")]
    Storage(Box<dyn core::error::Error + Send + Sync>),

    /// The engine or a client was configured incompletely.
    #[error("configuration error: {0}")]
    Config(String),

    /// A backend payload lacked a field the engine cannot default.
    #[error("malformed backend payload: {0}")]
    MalformedPayload(String),

    /// Token/slug missing or mismatched, or the backend refused to issue a
    /// session.
    #[error("invalid session: {reason}")]
    InvalidSession {
        /// Human readable cause.
        reason: String,
    },

    /// The session passed its expiry; the guest must re-scan.
    #[error("session expired, scan the QR code again")]
    SessionExpired,

    /// The backend refused or failed to push the expiry out.
    #[error("could not extend session: {source}")]
    ExtendFailed {
        /// Underlying failure.
        source: Box<SelfOrderError>,
    },

    /// Checkout was requested with nothing in the cart.
    #[error("cart is empty")]
    EmptyCart,

    /// A quantity below one was passed to a cart mutation.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(i64),

    /// A cart line index that does not exist.
    #[error("cart line {0} does not exist")]
    LineNotFound(usize),

    /// A template item was added without choosing a variant.
    #[error("item {0} has variants, pick one before adding it")]
    TemplateNotAddable(ItemCode),

    /// The backend returned no variants for a template.
    #[error("item {0} has no variants")]
    NoVariants(ItemCode),

    /// Order submission failed; the cart is untouched and the guest may
    /// retry.
    #[error("order submission failed: {source}")]
    SubmissionFailed {
        /// Underlying failure.
        source: Box<SelfOrderError>,
    },

    /// The payment request lapsed before payment arrived.
    #[error("payment request expired")]
    PaymentExpired,

    /// Best-effort cart save to the backend failed. Local state is kept.
    #[error("cart save-through failed: {source}")]
    BackendSaveFailed {
        /// Underlying failure.
        source: Box<SelfOrderError>,
    },

    /// A checkout action was issued from a view that does not allow it.
    #[error("cannot {action} from the {from} view")]
    InvalidTransition {
        /// View the flow was in.
        from: ViewMode,
        /// Action that was refused.
        action: &'static str,
    },
}

impl SelfOrderError {
    /// Returns `true` for transient conditions the guest can simply retry.
    #[inline]
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match *self {
            #[cfg(feature = "http")]
            Self::Http(_) => true,
            Self::Api { status, .. } => status >= 500 || status == 429,
            Self::SubmissionFailed { .. }
            | Self::PaymentExpired
            | Self::BackendSaveFailed { .. }
            | Self::ExtendFailed { .. } => true,
            Self::Serialization(_)
            | Self::Storage(_)
            | Self::Config(_)
            | Self::MalformedPayload(_)
            | Self::InvalidSession { .. }
            | Self::SessionExpired
            | Self::EmptyCart
            | Self::InvalidQuantity(_)
            | Self::LineNotFound(_)
            | Self::TemplateNotAddable(_)
            | Self::NoVariants(_)
            | Self::InvalidTransition { .. } => false,
        }
    }

    /// Wraps a failure as a retryable submission failure.
    pub(crate) fn submission(source: Self) -> Self {
        Self::SubmissionFailed {
            source: Box::new(source),
        }
    }

    /// Builds an [`SelfOrderError::InvalidSession`] from any message.
    pub(crate) fn invalid_session<T: Into<String>>(reason: T) -> Self {
        Self::InvalidSession {
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for results with [`SelfOrderError`].
pub type Result<T> = core::result::Result<T, SelfOrderError>;
