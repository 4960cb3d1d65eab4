//! In-memory storage backend.
//!
//! Provides [`InMemoryStorage`], a thread-safe in-memory implementation of
//! [`super::Storage`]. It behaves like a tab that is never reloaded, and
//! is ideal for tests.

use std::sync::Mutex;

use crate::error::{Result, SelfOrderError};
use crate::models::{Session, StoredCart};

/// Thread-safe in-memory storage.
///
/// # Example
///
/// ```rust
/// use selforder_rs::storage::{InMemoryStorage, Storage};
///
/// let storage = InMemoryStorage::new();
/// assert!(storage.session().unwrap().is_none());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    /// All state behind a single mutex for thread-safe interior mutability.
    inner: Mutex<Inner>,
}

/// Inner mutable state.
#[derive(Debug, Default)]
struct Inner {
    /// Stored session.
    session: Option<Session>,
    /// Stored cart.
    cart: Option<StoredCart>,
}

impl InMemoryStorage {
    /// Creates a new empty in-memory storage.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the inner lock and applies a closure.
    fn with_lock<R, F: FnOnce(&mut Inner) -> R>(&self, op: F) -> Result<R> {
        let mut inner = self.inner.lock().map_err(|err| lock_error(&err))?;
        Ok(op(&mut inner))
    }
}

/// Wraps a mutex poison error.
fn lock_error<T>(err: &std::sync::PoisonError<T>) -> SelfOrderError {
    SelfOrderError::Storage(err.to_string().into())
}

impl super::Storage for InMemoryStorage {
    #[inline]
    fn session(&self) -> Result<Option<Session>> {
        self.with_lock(|inner| inner.session.clone())
    }

    #[inline]
    fn set_session(&self, session: &Session) -> Result<()> {
        self.with_lock(|inner| inner.session = Some(session.clone()))
    }

    #[inline]
    fn clear_session(&self) -> Result<()> {
        self.with_lock(|inner| inner.session = None)
    }

    #[inline]
    fn cart(&self) -> Result<Option<StoredCart>> {
        self.with_lock(|inner| inner.cart.clone())
    }

    #[inline]
    fn set_cart(&self, cart: &StoredCart) -> Result<()> {
        self.with_lock(|inner| inner.cart = Some(cart.clone()))
    }

    #[inline]
    fn clear_cart(&self) -> Result<()> {
        self.with_lock(|inner| inner.cart = None)
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use rust_decimal::Decimal;

    use super::*;
    use crate::models::{CartItem, ItemCode, OrderType, ProfileId, SessionId, SessionKey};
    use crate::storage::Storage;

    fn test_session() -> Session {
        Session {
            id: SessionId::from("S-1"),
            key: SessionKey::token("tok"),
            profile: ProfileId::from("Main"),
            branch: None,
            table: None,
            order_type: OrderType::Takeaway,
            guest_allowed: true,
            payment_required: false,
            expires_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            disclaimer: None,
            branding: None,
        }
    }

    #[test]
    fn session_lifecycle() {
        let s = InMemoryStorage::new();
        assert!(s.session().unwrap().is_none());
        s.set_session(&test_session()).unwrap();
        assert_eq!(s.session().unwrap(), Some(test_session()));
        s.clear_session().unwrap();
        assert!(s.session().unwrap().is_none());
    }

    #[test]
    fn cart_lifecycle_is_independent_of_session() {
        let s = InMemoryStorage::new();
        s.set_session(&test_session()).unwrap();
        let cart = StoredCart {
            session: SessionId::from("S-1"),
            lines: vec![CartItem::new(ItemCode::from("TEA"), "Tea", Decimal::from(9_000))],
        };
        s.set_cart(&cart).unwrap();
        assert_eq!(s.cart().unwrap(), Some(cart));
        s.clear_cart().unwrap();
        assert!(s.cart().unwrap().is_none());
        assert!(s.session().unwrap().is_some());
    }
}
