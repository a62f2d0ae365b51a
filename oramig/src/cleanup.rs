//! Scoped cleanup that never hides an error.
//!
//! Both helpers run a body against some state and then a cleanup step against the same state.
//! When both fail, the cleanup error is appended to the body error with [Error::append], so the
//! caller sees the original cause first and the cleanup failure after it.

use crate::error::Error;

/// Run `body`, then always run `cleanup`.
pub(crate) fn always<S, T>(
    state: &mut S,
    body: impl FnOnce(&mut S) -> Result<T, Error>,
    cleanup: impl FnOnce(&mut S) -> Result<(), Error>,
) -> Result<T, Error>
where
    S: ?Sized,
{
    let result = body(state);
    merge(result, cleanup(state))
}

/// Run `body`; only if it fails, run `cleanup` (e.g. a rollback).
pub(crate) fn on_failure<S, T>(
    state: &mut S,
    body: impl FnOnce(&mut S) -> Result<T, Error>,
    cleanup: impl FnOnce(&mut S) -> Result<(), Error>,
) -> Result<T, Error>
where
    S: ?Sized,
{
    match body(state) {
        Ok(value) => Ok(value),
        Err(err) => match cleanup(state) {
            Ok(()) => Err(err),
            Err(cleanup_err) => Err(err.append(cleanup_err)),
        },
    }
}

/// Combine a body result with the result of its cleanup step.
///
/// A cleanup failure after a successful body is returned on its own; after a failed body it is
/// appended to the body's error.
pub fn merge<T>(result: Result<T, Error>, cleanup: Result<(), Error>) -> Result<T, Error> {
    match (result, cleanup) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(cleanup_err)) => Err(cleanup_err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(cleanup_err)) => Err(err.append(cleanup_err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Calls(Vec<&'static str>);

    fn fail(msg: &str) -> Error {
        Error::Generic(msg.to_string())
    }

    #[test]
    fn always_runs_cleanup_after_success() {
        let mut calls = Calls::default();
        let value = always(
            &mut calls,
            |c| {
                c.0.push("body");
                Ok(7)
            },
            |c| {
                c.0.push("cleanup");
                Ok(())
            },
        )
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.0, vec!["body", "cleanup"]);
    }

    #[test]
    fn always_reports_cleanup_failure_when_body_succeeds() {
        let mut calls = Calls::default();
        let result: Result<(), Error> = always(&mut calls, |_| Ok(()), |_| Err(fail("unlock")));
        assert_eq!(result, Err(fail("unlock")));
    }

    #[test]
    fn always_appends_cleanup_failure_to_body_failure() {
        let mut calls = Calls::default();
        let result: Result<(), Error> = always(
            &mut calls,
            |_| Err(fail("create")),
            |c| {
                c.0.push("cleanup");
                Err(fail("unlock"))
            },
        );
        assert_eq!(result, Err(fail("create").append(fail("unlock"))));
        assert_eq!(calls.0, vec!["cleanup"]);
    }

    #[test]
    fn on_failure_skips_cleanup_after_success() {
        let mut calls = Calls::default();
        let result = on_failure(
            &mut calls,
            |_| Ok("done"),
            |c| {
                c.0.push("rollback");
                Ok(())
            },
        );
        assert_eq!(result, Ok("done"));
        assert!(calls.0.is_empty());
    }

    #[test]
    fn on_failure_keeps_original_error_when_cleanup_succeeds() {
        let mut calls = Calls::default();
        let result: Result<(), Error> = on_failure(
            &mut calls,
            |_| Err(fail("insert")),
            |c| {
                c.0.push("rollback");
                Ok(())
            },
        );
        assert_eq!(result, Err(fail("insert")));
        assert_eq!(calls.0, vec!["rollback"]);
    }

    #[test]
    fn on_failure_combines_both_errors() {
        let mut calls = Calls::default();
        let result: Result<(), Error> =
            on_failure(&mut calls, |_| Err(fail("insert")), |_| Err(fail("rollback")));
        assert_eq!(result, Err(fail("insert").append(fail("rollback"))));
    }
}
