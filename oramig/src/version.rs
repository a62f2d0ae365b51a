use crate::cleanup;
use crate::connection::{Connection, Value};
use crate::driver::{OracleDriver, NIL_VERSION};
use crate::error::Error;

/// ORA-00955: name is already used by an existing object.
const NAME_ALREADY_USED: i32 = 955;

impl<C: Connection> OracleDriver<C> {
    /// Make sure the version table exists. Safe to call any number of times.
    /// The advisory lock is held while the table is created and always released afterwards.
    pub fn ensure_version_table(&mut self) -> Result<(), Error> {
        self.lock()?;
        cleanup::always(&mut *self, Self::create_version_table, Self::unlock)
    }

    fn create_version_table(&mut self) -> Result<(), Error> {
        let query = format!(
            "CREATE TABLE {} (version NUMBER(19) NOT NULL PRIMARY KEY, dirty CHAR(1) NOT NULL)",
            self.config.migrations_table()
        );
        match self.conn.execute(&query, &[]) {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::info!(
                    table = %self.config.migrations_table(),
                    "Created version table"
                );
                Ok(())
            }
            Err(e) if e.code() == Some(NAME_ALREADY_USED) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    table = %self.config.migrations_table(),
                    "Version table already exists"
                );
                Ok(())
            }
            Err(e) => Err(Error::query(query, e)),
        }
    }

    /// Replace the recorded state with `(version, dirty)` in one transaction.
    ///
    /// A negative version leaves the table empty, which [version](Self::version) reports as
    /// [NIL_VERSION]. When the write fails the transaction is rolled back, and a failing
    /// rollback is reported together with the original error.
    pub fn set_version(&mut self, version: i64, dirty: bool) -> Result<(), Error> {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("oracle_set_version", version, dirty).entered();

        self.conn.begin().map_err(|e| Error::Transaction {
            details: "transaction start failed".to_string(),
            cause: e,
        })?;

        cleanup::on_failure(
            &mut *self,
            |driver| driver.replace_version_row(version, dirty),
            |driver| {
                #[cfg(feature = "tracing")]
                tracing::warn!("Rolling back version update");
                driver.conn.rollback().map_err(|e| Error::Transaction {
                    details: "transaction rollback failed".to_string(),
                    cause: e,
                })
            },
        )?;

        self.conn.commit().map_err(|e| Error::Transaction {
            details: "transaction commit failed".to_string(),
            cause: e,
        })?;

        #[cfg(feature = "tracing")]
        tracing::debug!("Recorded migration version");
        Ok(())
    }

    // DELETE rather than TRUNCATE: TRUNCATE is DDL and would commit the open transaction.
    fn replace_version_row(&mut self, version: i64, dirty: bool) -> Result<(), Error> {
        let table = self.config.migrations_table();
        let query = format!("DELETE FROM {}", table);
        self.conn
            .execute(&query, &[])
            .map_err(|e| Error::query(query, e))?;

        if version >= 0 {
            let query = format!("INSERT INTO {} (version, dirty) VALUES (:1, :2)", table);
            self.conn
                .execute(
                    &query,
                    &[Value::Int(version), Value::Text(as_char(dirty).to_string())],
                )
                .map_err(|e| Error::query(query, e))?;
        }
        Ok(())
    }

    /// The recorded `(version, dirty)` state, `(NIL_VERSION, false)` when none was recorded.
    pub fn version(&mut self) -> Result<(i64, bool), Error> {
        let query = format!(
            "SELECT version, dirty FROM {} FETCH NEXT 1 ROWS ONLY",
            self.config.migrations_table()
        );
        let rows = self
            .conn
            .query(&query, &[])
            .map_err(|e| Error::query(query.as_str(), e))?;

        let Some(row) = rows.first() else {
            return Ok((NIL_VERSION, false));
        };
        let version = row.first().and_then(Value::as_int).ok_or_else(|| {
            Error::query_with(
                format!("unexpected value in version column: {:?}", row.first()),
                query.as_str(),
                None,
            )
        })?;
        let dirty = read_bool(row.get(1).unwrap_or(&Value::Null))?;
        Ok((version, dirty))
    }
}

fn as_char(flag: bool) -> &'static str {
    if flag {
        "Y"
    } else {
        "N"
    }
}

fn read_bool(value: &Value) -> Result<bool, Error> {
    match value.as_text() {
        Some("Y") | Some("y") => Ok(true),
        Some("N") | Some("n") => Ok(false),
        other => Err(Error::InvalidDirtyFlag {
            value: other.unwrap_or_default().to_string(),
        }),
    }
}
