//! Connection reuse for the search store.
//!
//! A `DuckDB` file may only be opened once per process, so extra connections
//! are cloned from the one opened by [`ConnectionPool::open`]. Up to
//! `max_idle` of them are parked between calls.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use ::duckdb::Connection;

struct Slots {
    origin: Connection,
    parked: Vec<Connection>,
}

/// Shared handle to one `DuckDB` file.
#[derive(Clone)]
pub struct ConnectionPool {
    db_path: Arc<PathBuf>,
    max_idle: usize,
    slots: Arc<Mutex<Slots>>,
}

impl ConnectionPool {
    /// Opens the database file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or configured.
    pub fn open(path: impl Into<PathBuf>, max_idle: usize) -> Result<Self, ::duckdb::Error> {
        let db_path = path.into();
        let origin = Connection::open(&db_path)?;
        origin.execute_batch("PRAGMA disable_progress_bar;")?;

        Ok(Self {
            db_path: Arc::new(db_path),
            max_idle: max_idle.max(1),
            slots: Arc::new(Mutex::new(Slots {
                origin,
                parked: Vec::new(),
            })),
        })
    }

    /// Runs `work` on a parked connection, or on a fresh clone when none is parked.
    ///
    /// The connection is parked again afterwards, even when `work` fails.
    ///
    /// # Errors
    /// Returns the error of `work`, or the clone failure converted into `E`.
    pub fn with_connection<T, E>(
        &self,
        work: impl FnOnce(&Connection) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<::duckdb::Error>,
    {
        let connection = {
            let mut slots = self.slots();
            match slots.parked.pop() {
                Some(connection) => connection,
                None => slots.origin.try_clone()?,
            }
        };

        let outcome = work(&connection);

        let mut slots = self.slots();
        if slots.parked.len() < self.max_idle {
            slots.parked.push(connection);
        }
        outcome
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    #[cfg(test)]
    fn parked_len(&self) -> usize {
        self.slots().parked.len()
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().expect("duckdb pool mutex poisoned")
    }
}
