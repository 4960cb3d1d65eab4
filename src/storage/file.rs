//! JSON-file-based storage backend.
//!
//! Stores each key in a separate JSON file under a configurable
//! directory (default: `$XDG_DATA_HOME/selforder-rs/`).

use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Result, SelfOrderError};
use crate::models::{Session, StoredCart};

/// Application name used for the XDG data directory.
const APP_NAME: &str = "selforder-rs";

/// File name for the session snapshot.
const SESSION_FILE: &str = "session.json";
/// File name for the cart snapshot.
const CART_FILE: &str = "cart.json";
/// Sentinel file used for cross-process file locking.
const LOCK_FILE: &str = "storage.lock";

/// File-backed storage that persists the session and cart as JSON files.
///
/// # Concurrency
///
/// Thread safety within a single process is provided by an in-process
/// [`Mutex`]. Two processes pointed at the same directory are serialized
/// by an advisory file lock on `storage.lock`. Reads take a shared lock,
/// writes an exclusive one.
///
/// # File layout
///
/// ```text
/// <dir>/
///   storage.lock          (cross-process lock sentinel)
///   session.json
///   cart.json
/// ```
#[derive(Debug)]
pub struct FileStorage {
    /// Root directory containing all JSON files.
    dir: PathBuf,
    /// Mutex serializing concurrent in-process access.
    lock: Mutex<()>,
    /// Sentinel file for cross-process advisory locking.
    lock_file: fs::File,
}

impl FileStorage {
    /// Creates a new file storage rooted at the given directory.
    ///
    /// Creates the directory (and parents) if it does not exist, and
    /// opens (or creates) the `storage.lock` sentinel file.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the lock
    /// file cannot be opened.
    #[inline]
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).map_err(storage_io_error)?;
        let lock_file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE))
            .map_err(storage_io_error)?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
            lock_file,
        })
    }

    /// Returns the default XDG-compliant data directory for this
    /// application.
    ///
    /// On Linux: `$XDG_DATA_HOME/selforder-rs/` (typically
    /// `~/.local/share/selforder-rs/`).
    ///
    /// # Errors
    ///
    /// Returns an error if the platform data directory cannot be determined.
    #[inline]
    pub fn default_dir() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|data_path| data_path.join(APP_NAME))
            .ok_or_else(|| {
                SelfOrderError::Storage("could not determine platform data directory".into())
            })
    }

    /// Returns the full path for a given file name.
    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Acquires an in-process mutex guard and a shared (read) file lock,
    /// executes `op`, then releases the file lock.
    fn with_shared_lock<R, F: FnOnce() -> Result<R>>(&self, op: F) -> Result<R> {
        let _guard: MutexGuard<'_, ()> = self.lock.lock().map_err(|err| lock_poison_error(&err))?;
        self.lock_file.lock_shared().map_err(storage_io_error)?;
        let result = op();
        // Only surface the unlock error when the operation succeeded.
        if let Err(err) = self.lock_file.unlock()
            && result.is_ok()
        {
            return Err(storage_io_error(err));
        }
        result
    }

    /// Acquires an in-process mutex guard and an exclusive (write) file
    /// lock, executes `op`, then releases the file lock.
    fn with_exclusive_lock<R, F: FnOnce() -> Result<R>>(&self, op: F) -> Result<R> {
        let _guard: MutexGuard<'_, ()> = self.lock.lock().map_err(|err| lock_poison_error(&err))?;
        self.lock_file.lock().map_err(storage_io_error)?;
        let result = op();
        if let Err(err) = self.lock_file.unlock()
            && result.is_ok()
        {
            return Err(storage_io_error(err));
        }
        result
    }

    /// Reads and deserializes a JSON file. Returns `None` if the file does
    /// not exist.
    fn read_value<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.path(name);
        self.with_shared_lock(|| match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)
                .map(Some)
                .map_err(SelfOrderError::from),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(storage_io_error(err)),
        })
    }

    /// Atomically writes a serialized JSON file (write-to-tmp then rename).
    fn write_value<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.path(name);
        let tmp_path = self.path(&format!("{name}.tmp"));
        let json = serde_json::to_string_pretty(value).map_err(SelfOrderError::from)?;
        self.with_exclusive_lock(|| {
            fs::write(&tmp_path, json).map_err(storage_io_error)?;
            fs::rename(&tmp_path, &path).map_err(storage_io_error)
        })
    }

    /// Removes a file; a missing file is not an error.
    fn remove_value(&self, name: &str) -> Result<()> {
        let path = self.path(name);
        self.with_exclusive_lock(|| match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(storage_io_error(err)),
        })
    }
}

/// Wraps an I/O error as a storage error.
fn storage_io_error(err: std::io::Error) -> SelfOrderError {
    SelfOrderError::Storage(Box::new(err))
}

/// Wraps a mutex poison error.
fn lock_poison_error<T>(err: &std::sync::PoisonError<T>) -> SelfOrderError {
    SelfOrderError::Storage(err.to_string().into())
}

impl super::Storage for FileStorage {
    #[inline]
    fn session(&self) -> Result<Option<Session>> {
        self.read_value(SESSION_FILE)
    }

    #[inline]
    fn set_session(&self, session: &Session) -> Result<()> {
        self.write_value(SESSION_FILE, session)
    }

    #[inline]
    fn clear_session(&self) -> Result<()> {
        self.remove_value(SESSION_FILE)
    }

    #[inline]
    fn cart(&self) -> Result<Option<StoredCart>> {
        self.read_value(CART_FILE)
    }

    #[inline]
    fn set_cart(&self, cart: &StoredCart) -> Result<()> {
        self.write_value(CART_FILE, cart)
    }

    #[inline]
    fn clear_cart(&self) -> Result<()> {
        self.remove_value(CART_FILE)
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use rust_decimal::Decimal;

    use super::*;
    use crate::models::{CartItem, ItemCode, OrderType, ProfileId, SessionId, SessionKey, TableId};
    use crate::storage::Storage;

    fn temp_storage() -> (FileStorage, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();
        (storage, dir)
    }

    fn test_session() -> Session {
        Session {
            id: SessionId::from("S-1"),
            key: SessionKey::slug("table-7"),
            profile: ProfileId::from("Main"),
            branch: None,
            table: Some(TableId::from("T-07")),
            order_type: OrderType::DineIn,
            guest_allowed: true,
            payment_required: false,
            expires_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            disclaimer: Some("No refunds".to_owned()),
            branding: None,
        }
    }

    #[test]
    fn lockfile_created_on_construction() {
        let (storage, _dir) = temp_storage();
        assert!(storage.path(LOCK_FILE).exists());
    }

    #[test]
    fn missing_files_read_as_none() {
        let (storage, _dir) = temp_storage();
        assert!(storage.session().unwrap().is_none());
        assert!(storage.cart().unwrap().is_none());
    }

    #[test]
    fn session_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();
            storage.set_session(&test_session()).unwrap();
        }
        let reopened = FileStorage::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(reopened.session().unwrap(), Some(test_session()));
    }

    #[test]
    fn cart_roundtrip_keeps_line_order() {
        let (storage, _dir) = temp_storage();
        let cart = StoredCart {
            session: SessionId::from("S-1"),
            lines: vec![
                CartItem::new(ItemCode::from("TEA"), "Tea", Decimal::from(9_000)),
                CartItem::new(ItemCode::from("TEA"), "Tea", Decimal::from(9_000)).with_note("iced"),
            ],
        };
        storage.set_cart(&cart).unwrap();
        assert_eq!(storage.cart().unwrap(), Some(cart));
        assert!(!storage.path(&format!("{CART_FILE}.tmp")).exists());
    }

    #[test]
    fn clear_is_idempotent_and_keeps_lockfile() {
        let (storage, _dir) = temp_storage();
        storage.set_session(&test_session()).unwrap();
        storage.clear_session().unwrap();
        storage.clear_session().unwrap();
        storage.clear_cart().unwrap();
        assert!(storage.session().unwrap().is_none());
        assert!(storage.path(LOCK_FILE).exists());
    }

    #[test]
    fn corrupt_file_is_a_serialization_error() {
        let (storage, _dir) = temp_storage();
        fs::write(storage.path(SESSION_FILE), "{not json").unwrap();
        let err = storage.session().unwrap_err();
        assert!(matches!(err, SelfOrderError::Serialization(_)));
    }
}
