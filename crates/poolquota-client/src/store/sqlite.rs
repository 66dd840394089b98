use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, ffi::ErrorCode, params};

use crate::migrations::{BLOB_COLUMNS, run_pending};
use crate::state::{ensure_state_directory, resolve_state_home, state_db_path};
use crate::store::BlobStore;
use crate::{ClientError, ClientResult};

const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

/// Blob store backed by the `blobs` table of the state database.
#[derive(Debug)]
pub struct SqliteBlobStore {
    connection: Connection,
    db_path: PathBuf,
}

impl SqliteBlobStore {
    /// Opens (creating and migrating if needed) the store under the state home.
    pub fn open(home_override: Option<&Path>) -> ClientResult<Self> {
        let state_home = resolve_state_home(home_override)?;
        ensure_state_directory(&state_home)?;
        Self::open_at(&state_db_path(&state_home))
    }

    pub fn open_at(db_path: &Path) -> ClientResult<Self> {
        let mut connection =
            Connection::open(db_path).map_err(|error| store_error(db_path, &error))?;
        connection
            .busy_timeout(BUSY_TIMEOUT)
            .map_err(|error| store_error(db_path, &error))?;
        run_pending(&mut connection).map_err(|error| migration_error(db_path, &error))?;
        check_blob_columns(&connection, db_path)?;
        tracing::debug!(db_path = %db_path.display(), "state store opened");

        Ok(Self {
            connection,
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

impl BlobStore for SqliteBlobStore {
    fn write_blob(&mut self, name: &str, body: &str) -> ClientResult<()> {
        self.connection
            .execute(
                "INSERT INTO blobs (name, body) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET
                    body = excluded.body,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![name, body],
            )
            .map_err(|error| store_error(&self.db_path, &error))?;
        Ok(())
    }

    fn read_blob(&self, name: &str) -> ClientResult<Option<String>> {
        self.connection
            .query_row("SELECT body FROM blobs WHERE name = ?1", [name], |row| {
                row.get::<_, String>(0)
            })
            .optional()
            .map_err(|error| store_error(&self.db_path, &error))
    }
}

/// Maps a SQLite failure on the state database to a `store_*` error.
fn store_error(db_path: &Path, error: &rusqlite::Error) -> ClientError {
    match error.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            ClientError::store_locked(db_path)
        }
        Some(ErrorCode::NotADatabase) => ClientError::store_corrupt(db_path),
        Some(ErrorCode::CannotOpen | ErrorCode::ReadOnly) => {
            ClientError::store_permission_denied(db_path, &error.to_string())
        }
        _ => ClientError::store_failed(db_path, &error.to_string()),
    }
}

fn migration_error(db_path: &Path, error: &rusqlite_migration::Error) -> ClientError {
    if let rusqlite_migration::Error::RusqliteError { err, .. } = error {
        let mapped = store_error(db_path, err);
        if mapped.code != "store_failed" {
            return mapped;
        }
    }
    ClientError::store_failed(db_path, &error.to_string())
}

fn check_blob_columns(connection: &Connection, db_path: &Path) -> ClientResult<()> {
    let mut statement = connection
        .prepare("PRAGMA table_info(blobs)")
        .map_err(|error| store_error(db_path, &error))?;
    let columns = statement
        .query_map([], |row| row.get::<_, String>(1))
        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
        .map_err(|error| store_error(db_path, &error))?;

    if BLOB_COLUMNS
        .iter()
        .all(|required| columns.iter().any(|column| column == required))
    {
        Ok(())
    } else {
        Err(ClientError::store_corrupt(db_path))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use rusqlite::Connection;

    use crate::store::BlobStore;

    use super::SqliteBlobStore;

    #[test]
    fn blobs_survive_reopening_the_store() {
        let temp = tempfile::tempdir();
        assert!(temp.is_ok());
        if let Ok(temp) = temp {
            let store = SqliteBlobStore::open(Some(temp.path()));
            assert!(store.is_ok());
            if let Ok(mut store) = store {
                assert!(store.write_blob("run_a/drug", "{\"a\":1}").is_ok());
                assert!(store.write_blob("run_a/drug", "{\"a\":2}").is_ok());
                assert!(store.write_blob("run_b/drug", "{}").is_ok());
            }

            let reopened = SqliteBlobStore::open(Some(temp.path()));
            assert!(reopened.is_ok());
            if let Ok(store) = reopened {
                assert!(matches!(store.read_blob("run_a/drug"), Ok(Some(body)) if body == "{\"a\":2}"));
                assert!(matches!(store.read_blob("run_b/drug"), Ok(Some(body)) if body == "{}"));
                assert!(matches!(store.read_blob("run_a/alcohol"), Ok(None)));
            }
        }
    }

    #[test]
    fn garbage_database_file_maps_to_store_corrupt() {
        let temp = tempfile::tempdir();
        assert!(temp.is_ok());
        if let Ok(temp) = temp {
            let db_path = temp.path().join("state.db");
            assert!(fs::write(&db_path, b"definitely not sqlite, just padding bytes").is_ok());
            let opened = SqliteBlobStore::open_at(&db_path);
            assert!(opened.is_err());
            if let Err(error) = opened {
                assert_eq!(error.code, "store_corrupt");
                assert!(error.is_internal());
            }
        }
    }

    #[test]
    fn a_blobs_table_missing_columns_is_corrupt() {
        let temp = tempfile::tempdir();
        assert!(temp.is_ok());
        if let Ok(temp) = temp {
            let db_path = temp.path().join("state.db");
            let seeded = Connection::open(&db_path).and_then(|connection| {
                connection.execute_batch(
                    "CREATE TABLE blobs (name TEXT PRIMARY KEY NOT NULL);
                     PRAGMA user_version = 1;",
                )
            });
            assert!(seeded.is_ok());
            let opened = SqliteBlobStore::open_at(&db_path);
            assert!(opened.is_err());
            if let Err(error) = opened {
                assert_eq!(error.code, "store_corrupt");
            }
        }
    }
}
