use std::fmt;

/// A failure reported by the database engine itself.
///
/// Native driver errors are captured as their ORA code and message so that [Error] stays
/// `Clone` and `PartialEq`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct DbError {
    code: Option<i32>,
    message: String,
}

impl DbError {
    pub fn new(code: Option<i32>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Build an error for an `ORA-nnnnn` code, formatting the message the way the server does.
    pub fn ora(code: i32, text: &str) -> Self {
        Self::new(Some(code), format!("ORA-{:05}: {}", code, text))
    }

    /// The ORA error number, when the failure came from the server.
    pub fn code(&self) -> Option<i32> {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(feature = "oracle")]
impl From<oracle::Error> for DbError {
    fn from(value: oracle::Error) -> Self {
        let code = value.db_error().map(|e| e.code());
        Self::new(code, value.to_string())
    }
}

/// Error type for the oramig crate.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("no database name")]
    NoDatabaseName,
    #[error("no schema")]
    NoSchema,
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("already locked")]
    Locked,
    #[error("lock request on handle {handle} returned {code} ({})", describe_request_code(.code))]
    LockRequest { handle: String, code: i32 },
    #[error("lock release on handle {handle} returned {code} ({})", describe_release_code(.code))]
    Unlock { handle: String, code: i32 },
    #[error("unexpected value in dirty column: {value:?}")]
    InvalidDirtyFlag { value: String },
    #[error("database is dirty at version {version}")]
    Dirty { version: i64 },
    #[error("{details}{} in query: {query}", cause_suffix(.cause))]
    Query {
        details: String,
        query: String,
        cause: Option<DbError>,
    },
    #[error("{details}: {cause}")]
    Transaction { details: String, cause: DbError },
    #[error(transparent)]
    Database(#[from] DbError),
    #[error("{0}")]
    Io(String),
    #[error("{0}")]
    Multiple(ErrorList),
    #[error("{0}")]
    Generic(String),
}

impl Error {
    /// A statement failed on the server; the statement text is kept for diagnosis.
    pub fn query(query: impl Into<String>, cause: DbError) -> Self {
        Self::Query {
            details: "query failed".to_string(),
            query: query.into(),
            cause: Some(cause),
        }
    }

    /// Like [Error::query], with a description of what was being attempted.
    pub fn query_with(
        details: impl Into<String>,
        query: impl Into<String>,
        cause: Option<DbError>,
    ) -> Self {
        Self::Query {
            details: details.into(),
            query: query.into(),
            cause,
        }
    }

    /// Combine `other` into this error. Neither error is discarded; nested lists are flattened.
    pub fn append(self, other: Error) -> Error {
        let mut list = match self {
            Error::Multiple(list) => list,
            err => ErrorList(vec![err]),
        };
        match other {
            Error::Multiple(ErrorList(errors)) => list.0.extend(errors),
            err => list.0.push(err),
        }
        Error::Multiple(list)
    }

    /// The engine error behind this failure, if there is one.
    pub fn db_error(&self) -> Option<&DbError> {
        match self {
            Error::Query { cause, .. } => cause.as_ref(),
            Error::Transaction { cause, .. } => Some(cause),
            Error::Database(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        Self::Generic(value)
    }
}

/// Several errors reported together, e.g. a failed statement followed by a failed rollback.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ErrorList(Vec<Error>);

impl ErrorList {
    pub fn errors(&self) -> &[Error] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.len() == 1 {
            return write!(f, "1 error occurred: {}", self.0[0]);
        }
        write!(f, "{} errors occurred:", self.0.len())?;
        for err in &self.0 {
            write!(f, "\n\t* {}", err)?;
        }
        Ok(())
    }
}

fn cause_suffix(cause: &Option<DbError>) -> String {
    match cause {
        Some(cause) => format!(": {}", cause),
        None => String::new(),
    }
}

// Result codes of DBMS_LOCK.REQUEST.
fn describe_request_code(code: &i32) -> &'static str {
    match *code {
        1 => "timeout, held by another session",
        2 => "deadlock",
        3 => "parameter error",
        4 => "already own lock",
        5 => "illegal lock handle",
        _ => "unknown result",
    }
}

// Result codes of DBMS_LOCK.RELEASE.
fn describe_release_code(code: &i32) -> &'static str {
    match *code {
        3 => "parameter error",
        4 => "do not own lock",
        5 => "illegal lock handle",
        _ => "unknown result",
    }
}
