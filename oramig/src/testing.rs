//! Testing utilities for code built on top of the driver.
//!
//! [FakeServer] is an in-memory stand-in for one Oracle database. It understands the statements
//! the driver issues (version table DDL and DML, catalog queries, session context lookups and
//! `DBMS_LOCK` calls), keeps tables and advisory locks shared across every [FakeConnection] it
//! hands out, and can be told to fail specific statements.
//!
//! # Example
//!
//! ```ignore
//! use oramig::testing::FakeServer;
//! use oramig::{OracleDriver, Options};
//!
//! let server = FakeServer::new();
//! let mut driver = OracleDriver::with_connection(server.connect(), Options::default())?;
//! driver.set_version(1, false)?;
//! assert_eq!(driver.version()?, (1, false));
//! assert_eq!(server.tables(), vec!["SCHEMA_MIGRATIONS"]);
//! ```

use crate::connection::{Connection, LockHandle, LockPrimitive, Row, Value};
use crate::error::{DbError, Error};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone)]
struct Table {
    name: String,
    rows: Vec<Row>,
}

#[derive(Debug, Default)]
struct ServerState {
    service_name: String,
    schema_name: String,
    tables: Vec<Table>,
    statements: Vec<String>,
    failures: Vec<(String, DbError)>,
    results: Vec<(String, i32)>,
    // lock name -> handle
    lock_handles: HashMap<String, String>,
    // handle -> owning session
    lock_owners: HashMap<String, u64>,
    next_session: u64,
}

impl ServerState {
    /// Log a statement and return the failure registered for it, if any.
    fn record(&mut self, statement: &str) -> Result<(), DbError> {
        self.statements.push(statement.to_string());
        let upper = statement.to_ascii_uppercase();
        match self
            .failures
            .iter()
            .find(|(pattern, _)| upper.contains(pattern.as_str()))
        {
            Some((_, err)) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn forced_result(&self, statement: &str) -> Option<i32> {
        let upper = statement.to_ascii_uppercase();
        self.results
            .iter()
            .find(|(pattern, _)| upper.contains(pattern.as_str()))
            .map(|(_, code)| *code)
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table, DbError> {
        self.tables
            .iter_mut()
            .find(|t| t.name == name)
            .ok_or_else(|| DbError::ora(942, "table or view does not exist"))
    }

    fn interpret(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        let sql = sql.trim();
        let upper = sql.to_ascii_uppercase();

        if upper.contains("SYS_CONTEXT('USERENV', 'SERVICE_NAME')") {
            return Ok(vec![vec![text_or_null(&self.service_name)]]);
        }
        if upper.contains("SYS_CONTEXT('USERENV', 'CURRENT_SCHEMA')") {
            return Ok(vec![vec![text_or_null(&self.schema_name)]]);
        }
        if upper == "SELECT 1 FROM DUAL" {
            return Ok(vec![vec![Value::Int(1)]]);
        }
        if upper.contains("FROM USER_TABLES") {
            return Ok(self
                .tables
                .iter()
                .map(|t| vec![Value::Text(t.name.clone())])
                .collect());
        }

        const CREATE: &str = "CREATE TABLE";
        const DROP: &str = "DROP TABLE";
        const DELETE: &str = "DELETE FROM";
        const INSERT: &str = "INSERT INTO";
        const SELECT: &str = "SELECT VERSION, DIRTY FROM";

        if upper.starts_with(CREATE) {
            let name = identifier_at(sql, CREATE.len())?;
            if self.tables.iter().any(|t| t.name == name) {
                return Err(DbError::ora(
                    955,
                    "name is already used by an existing object",
                ));
            }
            self.tables.push(Table {
                name,
                rows: Vec::new(),
            });
            Ok(Vec::new())
        } else if upper.starts_with(DROP) {
            let name = identifier_at(sql, DROP.len())?;
            let position = self
                .tables
                .iter()
                .position(|t| t.name == name)
                .ok_or_else(|| DbError::ora(942, "table or view does not exist"))?;
            self.tables.remove(position);
            Ok(Vec::new())
        } else if upper.starts_with(DELETE) {
            let name = identifier_at(sql, DELETE.len())?;
            self.table_mut(&name)?.rows.clear();
            Ok(Vec::new())
        } else if upper.starts_with(INSERT) {
            let name = identifier_at(sql, INSERT.len())?;
            self.table_mut(&name)?.rows.push(params.to_vec());
            Ok(Vec::new())
        } else if upper.starts_with(SELECT) {
            let name = identifier_at(sql, SELECT.len())?;
            Ok(self.table_mut(&name)?.rows.iter().take(1).cloned().collect())
        } else if upper.starts_with("BEGIN") && upper.ends_with("END;") {
            // anonymous PL/SQL blocks are accepted and have no effect
            Ok(Vec::new())
        } else {
            Err(DbError::ora(900, "invalid SQL statement"))
        }
    }

    fn release_session(&mut self, session: u64) {
        self.lock_owners.retain(|_, owner| *owner != session);
    }
}

fn text_or_null(text: &str) -> Value {
    if text.is_empty() {
        Value::Null
    } else {
        Value::Text(text.to_string())
    }
}

/// Read a table name starting at `offset`. Unquoted names are folded to upper case the way the
/// server folds them; quoted names keep their case.
fn identifier_at(sql: &str, offset: usize) -> Result<String, DbError> {
    let rest = sql[offset..].trim_start();
    if let Some(quoted) = rest.strip_prefix('"') {
        let mut name = String::new();
        let mut chars = quoted.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '"' {
                name.push(c);
            } else if chars.peek() == Some(&'"') {
                chars.next();
                name.push('"');
            } else {
                return Ok(name);
            }
        }
        return Err(DbError::ora(1740, "missing double quote in identifier"));
    }

    let name: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '#' | '.'))
        .collect();
    if name.is_empty() {
        Err(DbError::ora(903, "invalid table name"))
    } else {
        Ok(name.to_ascii_uppercase())
    }
}

/// An in-memory database shared by every connection it hands out.
#[derive(Debug, Clone)]
pub struct FakeServer {
    state: Arc<Mutex<ServerState>>,
}

impl Default for FakeServer {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeServer {
    /// A server reporting service `FREEPDB1` and schema `MIGRATE`.
    pub fn new() -> Self {
        Self::with_names("FREEPDB1", "MIGRATE")
    }

    /// A server reporting the given names. An empty name is reported as `NULL`.
    pub fn with_names(service_name: &str, schema_name: &str) -> Self {
        let state = ServerState {
            service_name: service_name.to_string(),
            schema_name: schema_name.to_string(),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a new session.
    pub fn connect(&self) -> FakeConnection {
        let mut state = self.state();
        state.next_session += 1;
        FakeConnection {
            server: self.clone(),
            session: state.next_session,
            snapshot: None,
            call_timeout: None,
        }
    }

    /// Fail every later statement whose text contains `pattern` (case-insensitive).
    ///
    /// Besides SQL text, sessions log `PING`, `BEGIN TRANSACTION`, `COMMIT`, `ROLLBACK`,
    /// `CLOSE` and `DBMS_LOCK.<CALL> <argument>` for the lock calls.
    pub fn fail_on(&self, pattern: &str, err: DbError) {
        self.state()
            .failures
            .push((pattern.to_ascii_uppercase(), err));
    }

    /// Make every later `DBMS_LOCK` call whose log line contains `pattern` return `code`.
    pub fn result_on(&self, pattern: &str, code: i32) {
        self.state()
            .results
            .push((pattern.to_ascii_uppercase(), code));
    }

    /// Create an empty table outside of any session.
    pub fn create_table(&self, name: &str) {
        let mut state = self.state();
        if !state.tables.iter().any(|t| t.name == name) {
            state.tables.push(Table {
                name: name.to_string(),
                rows: Vec::new(),
            });
        }
    }

    /// Table names in creation order.
    pub fn tables(&self) -> Vec<String> {
        self.state().tables.iter().map(|t| t.name.clone()).collect()
    }

    pub fn rows(&self, table: &str) -> Option<Vec<Row>> {
        self.state()
            .tables
            .iter()
            .find(|t| t.name == table)
            .map(|t| t.rows.clone())
    }

    /// Append a row directly, creating the table if needed.
    pub fn insert_row(&self, table: &str, row: Row) {
        self.create_table(table);
        if let Ok(t) = self.state().table_mut(table) {
            t.rows.push(row);
        }
    }

    pub fn is_lock_held(&self, name: &str) -> bool {
        let state = self.state();
        state
            .lock_handles
            .get(name)
            .is_some_and(|handle| state.lock_owners.contains_key(handle))
    }

    /// Every statement received so far, across all sessions.
    pub fn statements(&self) -> Vec<String> {
        self.state().statements.clone()
    }
}

/// One session on a [FakeServer]. Dropping it frees the advisory locks it holds.
#[derive(Debug)]
pub struct FakeConnection {
    server: FakeServer,
    session: u64,
    // tables as they were when the open transaction started
    snapshot: Option<Vec<Table>>,
    call_timeout: Option<Duration>,
}

impl FakeConnection {
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout
    }

    pub fn session_id(&self) -> u64 {
        self.session
    }

    /// Whether a transaction is open. `false` means statements are autocommitted.
    pub fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }
}

impl Connection for FakeConnection {
    fn ping(&mut self) -> Result<(), DbError> {
        self.server.state().record("PING")
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<(), DbError> {
        self.query(sql, params).map(|_| ())
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        let mut state = self.server.state();
        state.record(sql)?;
        state.interpret(sql, params)
    }

    fn begin(&mut self) -> Result<(), DbError> {
        let mut state = self.server.state();
        state.record("BEGIN TRANSACTION")?;
        self.snapshot = Some(state.tables.clone());
        Ok(())
    }

    // A failed commit or rollback still ends the transaction; the session is back in
    // autocommit mode either way.
    fn commit(&mut self) -> Result<(), DbError> {
        self.snapshot = None;
        self.server.state().record("COMMIT")
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        let snapshot = self.snapshot.take();
        let mut state = self.server.state();
        state.record("ROLLBACK")?;
        if let Some(tables) = snapshot {
            state.tables = tables;
        }
        Ok(())
    }

    fn set_call_timeout(&mut self, timeout: Option<Duration>) -> Result<(), DbError> {
        self.call_timeout = timeout;
        Ok(())
    }

    fn close(self) -> Result<(), Error> {
        let mut state = self.server.state();
        state.release_session(self.session);
        Ok(state.record("CLOSE")?)
    }
}

impl LockPrimitive for FakeConnection {
    fn allocate(&mut self, name: &str) -> Result<LockHandle, Error> {
        let statement = format!("DBMS_LOCK.ALLOCATE_UNIQUE {}", name);
        let mut state = self.server.state();
        state.record(&statement).map_err(|e| {
            Error::query_with(
                format!("error creating lock with name {}", name),
                statement.as_str(),
                Some(e),
            )
        })?;

        let next = 1_073_741_824 + state.lock_handles.len();
        let handle = state
            .lock_handles
            .entry(name.to_string())
            .or_insert_with(|| next.to_string())
            .clone();
        Ok(LockHandle::new(handle))
    }

    fn request(&mut self, handle: &LockHandle) -> Result<i32, Error> {
        let statement = format!("DBMS_LOCK.REQUEST {}", handle);
        let mut state = self.server.state();
        state
            .record(&statement)
            .map_err(|e| Error::query(statement.as_str(), e))?;
        if let Some(code) = state.forced_result(&statement) {
            return Ok(code);
        }

        let handle = handle.as_str();
        if !state.lock_handles.values().any(|h| h == handle) {
            return Ok(5);
        }
        match state.lock_owners.get(handle).copied() {
            Some(owner) if owner == self.session => Ok(4),
            Some(_) => Ok(1),
            None => {
                state.lock_owners.insert(handle.to_string(), self.session);
                Ok(0)
            }
        }
    }

    fn release(&mut self, handle: &LockHandle) -> Result<i32, Error> {
        let statement = format!("DBMS_LOCK.RELEASE {}", handle);
        let mut state = self.server.state();
        state
            .record(&statement)
            .map_err(|e| Error::query(statement.as_str(), e))?;
        if let Some(code) = state.forced_result(&statement) {
            return Ok(code);
        }

        let handle = handle.as_str();
        if !state.lock_handles.values().any(|h| h == handle) {
            return Ok(5);
        }
        match state.lock_owners.get(handle).copied() {
            Some(owner) if owner == self.session => {
                state.lock_owners.remove(handle);
                Ok(0)
            }
            _ => Ok(4),
        }
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.server.state().release_session(self.session);
    }
}
