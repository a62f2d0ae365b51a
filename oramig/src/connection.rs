//! The seam between the driver logic and a live database session.
//!
//! [OracleDriver](crate::OracleDriver) only talks to the database through these traits. The
//! production implementation is [OracleConnection](crate::oracle::OracleConnection); tests use
//! the in-memory [FakeServer](crate::testing::FakeServer).

use crate::error::{DbError, Error};
use std::time::Duration;

/// A bind parameter or a fetched column value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Int(i64),
    Text(String),
}

impl Value {
    /// Text content of the value. `NULL` and the empty string are the same thing in Oracle.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Null => None,
        }
    }
}

pub type Row = Vec<Value>;

/// Opaque token naming an allocated advisory lock on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle(String);

impl LockHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The engine's native advisory lock: allocate a handle for a name, then request and release it.
///
/// Request and release report the engine's result code; `0` means success. Interpreting other
/// codes is left to [AdvisoryLock](crate::lock::AdvisoryLock).
pub trait LockPrimitive {
    fn allocate(&mut self, name: &str) -> Result<LockHandle, Error>;
    /// Request exclusive ownership without waiting.
    fn request(&mut self, handle: &LockHandle) -> Result<i32, Error>;
    fn release(&mut self, handle: &LockHandle) -> Result<i32, Error>;
}

/// One dedicated session. Statements run in autocommit mode unless a transaction was started
/// with [Connection::begin].
pub trait Connection: LockPrimitive {
    fn ping(&mut self) -> Result<(), DbError>;
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<(), DbError>;
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError>;
    fn begin(&mut self) -> Result<(), DbError>;
    fn commit(&mut self) -> Result<(), DbError>;
    fn rollback(&mut self) -> Result<(), DbError>;
    fn set_call_timeout(&mut self, timeout: Option<Duration>) -> Result<(), DbError>;
    /// Release the session and whatever handle it was acquired from.
    fn close(self) -> Result<(), Error>
    where
        Self: Sized;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_reads_as_null() {
        assert_eq!(Value::Text(String::new()).as_text(), None);
        assert_eq!(Value::Null.as_text(), None);
        assert_eq!(Value::Text("APP".to_string()).as_text(), Some("APP"));
    }

    #[test]
    fn numbers_read_from_text_columns() {
        assert_eq!(Value::Int(42).as_int(), Some(42));
        assert_eq!(Value::Text(" 17 ".to_string()).as_int(), Some(17));
        assert_eq!(Value::Text("Y".to_string()).as_int(), None);
        assert_eq!(Value::Null.as_int(), None);
    }
}
