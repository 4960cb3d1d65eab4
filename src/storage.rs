//! Pluggable client storage for the session and cart snapshots.
//!
//! Plays the role of browser-tab storage: a small key space holding the
//! active session and its cart so both survive a reload. Writes are
//! synchronous; the engine calls them inline right after each mutation.

#[cfg(feature = "storage-file")]
mod file;
mod memory;

#[cfg(feature = "storage-file")]
pub use file::FileStorage;
pub use memory::InMemoryStorage;

use crate::error::Result;
use crate::models::{Session, StoredCart};

/// Storage backend for the active session and cart.
///
/// All methods take `&self`; implementations use interior mutability
/// (e.g. `Mutex`) for mutation. The engine assumes a single writer per
/// key space and does no cross-process coordination of its own.
pub trait Storage: core::fmt::Debug + Send + Sync {
    /// Returns the stored session snapshot.
    ///
    /// Returns `Ok(None)` if no session has been stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails to read.
    fn session(&self) -> Result<Option<Session>>;

    /// Replaces the stored session snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails to write.
    fn set_session(&self, session: &Session) -> Result<()>;

    /// Removes the stored session snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails to write.
    fn clear_session(&self) -> Result<()>;

    /// Returns the stored cart.
    ///
    /// Returns `Ok(None)` if no cart has been stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails to read.
    fn cart(&self) -> Result<Option<StoredCart>>;

    /// Replaces the stored cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails to write.
    fn set_cart(&self, cart: &StoredCart) -> Result<()>;

    /// Removes the stored cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails to write.
    fn clear_cart(&self) -> Result<()>;
}

impl<S: Storage + ?Sized> Storage for alloc::sync::Arc<S> {
    #[inline]
    fn session(&self) -> Result<Option<Session>> {
        (**self).session()
    }

    #[inline]
    fn set_session(&self, session: &Session) -> Result<()> {
        (**self).set_session(session)
    }

    #[inline]
    fn clear_session(&self) -> Result<()> {
        (**self).clear_session()
    }

    #[inline]
    fn cart(&self) -> Result<Option<StoredCart>> {
        (**self).cart()
    }

    #[inline]
    fn set_cart(&self, cart: &StoredCart) -> Result<()> {
        (**self).set_cart(cart)
    }

    #[inline]
    fn clear_cart(&self) -> Result<()> {
        (**self).clear_cart()
    }
}
