//! Single `DuckDB` session with a liveness probe and one reopen attempt.

use std::path::{Path, PathBuf};

use ::duckdb::Connection;
use tracing::{debug, warn};

use crate::WarehouseError;

/// The one logical connection a [`crate::Warehouse`] talks through.
///
/// Every operation goes through [`Session::connection`], which probes the
/// connection first and reopens it once when the probe fails.
pub struct Session {
    db_path: PathBuf,
    reconnect: bool,
    connection: Option<Connection>,
}

impl Session {
    /// Open the database file, creating it if needed.
    ///
    /// # Errors
    /// Returns [`WarehouseError::Connection`] when the file cannot be opened or
    /// configured.
    pub fn open(path: impl Into<PathBuf>, reconnect: bool) -> Result<Self, WarehouseError> {
        let db_path = path.into();
        let connection = open_connection(&db_path).map_err(|error| {
            WarehouseError::Connection(format!("cannot open {}: {error}", db_path.display()))
        })?;
        debug!(path = %db_path.display(), "opened duckdb session");

        Ok(Self {
            db_path,
            reconnect,
            connection: Some(connection),
        })
    }

    /// A live connection.
    ///
    /// When the probe fails and reconnection is enabled, the session is
    /// reopened once. The operation that asked is not retried here.
    pub fn connection(&mut self) -> Result<&Connection, WarehouseError> {
        if !self.connection.as_ref().is_some_and(is_alive) {
            if !self.reconnect {
                return Err(WarehouseError::Connection(String::from(
                    "liveness probe failed and reconnection is disabled",
                )));
            }
            warn!(path = %self.db_path.display(), "liveness probe failed, reopening session");
            self.reopen()?;
        }

        self.connection
            .as_ref()
            .ok_or_else(|| WarehouseError::Connection(String::from("session is closed")))
    }

    /// Close the current connection and open the file again.
    ///
    /// The old handle is released first so the file is never held twice.
    pub fn reopen(&mut self) -> Result<(), WarehouseError> {
        drop(self.connection.take());
        let connection = open_connection(&self.db_path).map_err(|error| {
            WarehouseError::Connection(format!(
                "reconnect to {} failed: {error}",
                self.db_path.display()
            ))
        })?;
        if !is_alive(&connection) {
            return Err(WarehouseError::Connection(format!(
                "reopened session to {} is not responding",
                self.db_path.display()
            )));
        }

        self.connection = Some(connection);
        debug!(path = %self.db_path.display(), "session reopened");
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        self.db_path.as_path()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("db_path", &self.db_path)
            .field("reconnect", &self.reconnect)
            .finish_non_exhaustive()
    }
}

fn open_connection(path: &Path) -> Result<Connection, ::duckdb::Error> {
    let connection = Connection::open(path)?;
    connection.execute_batch("PRAGMA disable_progress_bar;")?;
    Ok(connection)
}

fn is_alive(connection: &Connection) -> bool {
    connection
        .query_row("SELECT 1", [], |row| row.get::<_, i32>(0))
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reopened_session_sees_committed_data() {
        let temp = tempdir().expect("tempdir");
        let mut session =
            Session::open(temp.path().join("session.duckdb"), true).expect("open session");

        session
            .connection()
            .expect("connection")
            .execute_batch("CREATE TABLE probe (id INTEGER); INSERT INTO probe VALUES (7);")
            .expect("seed");

        session.reopen().expect("reopen");

        let id: i32 = session
            .connection()
            .expect("connection")
            .query_row("SELECT id FROM probe", [], |row| row.get(0))
            .expect("select");
        assert_eq!(id, 7);
    }

    #[test]
    fn opening_inside_a_missing_directory_is_a_connection_error() {
        let temp = tempdir().expect("tempdir");
        let error = Session::open(temp.path().join("missing").join("db.duckdb"), true)
            .expect_err("must fail");
        assert!(matches!(error, WarehouseError::Connection(_)));
    }
}
