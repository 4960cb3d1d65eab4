//! Newtype wrappers for identifiers handed out by the ordering backend.
//!
//! The backend names every record with an opaque string. Wrapping each
//! kind keeps a session id from being passed where an item code belongs.

use serde::{Deserialize, Serialize};

/// Macro to define a newtype ID wrapping a `String` inner type.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from the given string.
            #[inline]
            #[must_use]
            pub const fn new(value: String) -> Self {
                Self(value)
            }

            /// Returns a reference to the inner string.
            #[inline]
            #[must_use]
            pub fn as_inner(&self) -> &str {
                &self.0
            }

            /// Consumes the wrapper and returns the inner string.
            #[inline]
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            #[inline]
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<String> for $name {
            #[inline]
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            #[inline]
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }
    };
}

define_string_id! {
    /// Backend name of a guest ordering session.
    SessionId
}

define_string_id! {
    /// Sales (POS) profile a session orders against.
    ProfileId
}

define_string_id! {
    /// Restaurant branch a session belongs to.
    BranchId
}

define_string_id! {
    /// Table the QR code was printed for.
    TableId
}

define_string_id! {
    /// Code of a sellable item, template or variant.
    ItemCode
}

define_string_id! {
    /// Name of an item group (menu section).
    GroupId
}

define_string_id! {
    /// Identifier of a submitted order.
    OrderId
}

define_string_id! {
    /// Correlates asynchronous payment status events with the request
    /// that caused them.
    CorrelationId
}
