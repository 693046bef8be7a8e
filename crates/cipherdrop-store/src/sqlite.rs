//! SQLite implementation of the RegistryStore trait.
//!
//! This is the persistent storage backend. It uses rusqlite with bundled
//! SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::debug;

use cipherdrop_core::{CiphertextHandle, Identity, RegistryEntry};

use crate::error::{Result, StoreError};
use crate::migration::{self, now_millis};
use crate::traits::{CommitResult, RegistryStore};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime. Commits run inside an IMMEDIATE
/// transaction so the entry and its sequence row land together.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn identity_from_blob(bytes: Vec<u8>) -> Result<Identity> {
    Identity::try_from(bytes.as_slice())
        .map_err(|_| StoreError::InvalidData(format!("identity has {} bytes", bytes.len())))
}

fn handle_from_blob(bytes: Vec<u8>) -> Result<CiphertextHandle> {
    let arr: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| StoreError::InvalidData(format!("handle has {} bytes", bytes.len())))?;
    Ok(CiphertextHandle::from_bytes(arr))
}

fn index_from_column(index: i64) -> Result<u64> {
    u64::try_from(index)
        .map_err(|_| StoreError::InvalidData(format!("negative insertion index {}", index)))
}

fn select_entry(conn: &Connection, identity: &Identity) -> Result<Option<RegistryEntry>> {
    let row: Option<(Vec<u8>, i64)> = conn
        .query_row(
            "SELECT handle, insertion_index FROM registrations WHERE identity = ?1",
            params![identity.as_bytes().as_slice()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    row.map(|(handle, index)| {
        Ok(RegistryEntry {
            identity: *identity,
            handle: handle_from_blob(handle)?,
            insertion_index: index_from_column(index)?,
        })
    })
    .transpose()
}

#[async_trait]
impl RegistryStore for SqliteStore {
    async fn commit_registration(
        &self,
        identity: &Identity,
        handle: &CiphertextHandle,
    ) -> Result<CommitResult> {
        let identity = *identity;
        let handle = *handle;

        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if let Some(existing) = select_entry(&tx, &identity)? {
                return Ok(CommitResult::AlreadyRegistered { existing });
            }

            let next_index: i64 =
                tx.query_row("SELECT COUNT(*) FROM submitters", [], |row| row.get(0))?;

            tx.execute(
                "INSERT INTO registrations (identity, handle, insertion_index, committed_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    identity.as_bytes().as_slice(),
                    handle.as_bytes().as_slice(),
                    next_index,
                    now_millis()
                ],
            )?;
            tx.execute(
                "INSERT INTO submitters (insertion_index, identity) VALUES (?1, ?2)",
                params![next_index, identity.as_bytes().as_slice()],
            )?;
            tx.commit()?;

            let insertion_index = index_from_column(next_index)?;
            debug!(%identity, insertion_index, "committed registration");
            Ok(CommitResult::Committed(insertion_index))
        })
        .await
    }

    async fn get_entry(&self, identity: &Identity) -> Result<Option<RegistryEntry>> {
        let identity = *identity;
        self.run(move |conn| select_entry(conn, &identity)).await
    }

    async fn list_submitters(&self) -> Result<Vec<Identity>> {
        self.run(|conn| {
            let mut stmt =
                conn.prepare("SELECT identity FROM submitters ORDER BY insertion_index ASC")?;
            let rows = stmt.query_map([], |row| row.get::<_, Vec<u8>>(0))?;

            let mut submitters = Vec::new();
            for row in rows {
                submitters.push(identity_from_blob(row?)?);
            }
            Ok(submitters)
        })
        .await
    }

    async fn submitter_at(&self, index: u64) -> Result<Option<Identity>> {
        let Ok(index) = i64::try_from(index) else {
            return Ok(None);
        };

        self.run(move |conn| {
            let row: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT identity FROM submitters WHERE insertion_index = ?1",
                    params![index],
                    |row| row.get(0),
                )
                .optional()?;
            row.map(identity_from_blob).transpose()
        })
        .await
    }

    async fn count(&self) -> Result<u64> {
        self.run(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM submitters", [], |row| row.get(0))?;
            index_from_column(count)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StoreExt;
    use cipherdrop_core::Keypair;

    fn identity(seed: u8) -> Identity {
        Keypair::from_seed(&[seed; 32]).identity()
    }

    #[tokio::test]
    async fn test_sqlite_commit_and_read() {
        let store = SqliteStore::open_memory().unwrap();
        let alice = identity(1);
        let handle = CiphertextHandle::from_bytes([0xaa; 32]);

        assert_eq!(
            store.commit_registration(&alice, &handle).await.unwrap(),
            CommitResult::Committed(0)
        );
        assert_eq!(store.get_handle(&alice).await.unwrap(), Some(handle));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_first_write_wins() {
        let store = SqliteStore::open_memory().unwrap();
        let alice = identity(1);
        let first = CiphertextHandle::from_bytes([0x01; 32]);

        store.commit_registration(&alice, &first).await.unwrap();
        let second = store
            .commit_registration(&alice, &CiphertextHandle::from_bytes([0x02; 32]))
            .await
            .unwrap();

        assert!(matches!(second, CommitResult::AlreadyRegistered { .. }));
        assert_eq!(store.get_handle(&alice).await.unwrap(), Some(first));
        assert_eq!(store.list_submitters().await.unwrap(), vec![alice]);
    }

    #[tokio::test]
    async fn test_sqlite_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.db");
        let alice = identity(1);
        let bob = identity(2);

        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .commit_registration(&alice, &CiphertextHandle::from_bytes([1; 32]))
                .await
                .unwrap();
            store
                .commit_registration(&bob, &CiphertextHandle::from_bytes([2; 32]))
                .await
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.list_submitters().await.unwrap(), vec![alice, bob]);
        assert_eq!(store.submitter_at(1).await.unwrap(), Some(bob));
        let entry = store.get_entry(&bob).await.unwrap().unwrap();
        assert_eq!(entry.insertion_index, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sqlite_concurrent_same_identity() {
        let store = Arc::new(SqliteStore::open_memory().unwrap());
        let alice = identity(1);

        let tasks: Vec<_> = (0..8u8)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .commit_registration(&alice, &CiphertextHandle::from_bytes([i + 1; 32]))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut committed = 0;
        for task in tasks {
            if matches!(task.await.unwrap(), CommitResult::Committed(_)) {
                committed += 1;
            }
        }

        assert_eq!(committed, 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_unregistered_default() {
        let store = SqliteStore::open_memory().unwrap();
        assert!(!store.is_registered(&identity(9)).await.unwrap());
        assert_eq!(store.submitter_at(0).await.unwrap(), None);
        assert_eq!(store.submitter_at(u64::MAX).await.unwrap(), None);
    }
}
