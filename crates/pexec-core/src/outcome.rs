//! Immutable outcome of one upstream resolution

use crate::error::{ExecError, ExecResult};

/// What a [`Downstream`](crate::Downstream) received
///
/// Exactly one variant is set. `Complete` is the success that carries no
/// value. An outcome is built once by whichever downstream signal fired
/// and consumed once.
#[derive(Debug)]
pub enum Outcome<T> {
    /// Completed with a value
    Success(T),

    /// Completed without a value
    Complete,

    /// Failed with an error
    Failure(ExecError),
}

impl<T> Outcome<T> {
    #[inline]
    pub fn success(value: T) -> Self {
        Outcome::Success(value)
    }

    #[inline]
    pub fn failure(error: ExecError) -> Self {
        Outcome::Failure(error)
    }

    #[inline]
    pub fn complete() -> Self {
        Outcome::Complete
    }

    /// Build from a fallible value
    #[inline]
    pub fn from_result(result: ExecResult<T>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(e) => Outcome::Failure(e),
        }
    }

    /// True for both `Success` and `Complete`
    #[inline]
    pub fn is_success(&self) -> bool {
        !self.is_failure()
    }

    #[inline]
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    /// The carried error, if any
    #[inline]
    pub fn error(&self) -> Option<&ExecError> {
        match self {
            Outcome::Failure(e) => Some(e),
            _ => None,
        }
    }

    /// Extract the value, turning a failure back into an error
    ///
    /// This is how an asynchronous failure becomes a synchronous one at
    /// the blocking bridge. `Complete` yields `Ok(None)`.
    #[inline]
    pub fn into_value(self) -> ExecResult<Option<T>> {
        match self {
            Outcome::Success(value) => Ok(Some(value)),
            Outcome::Complete => Ok(None),
            Outcome::Failure(e) => Err(e),
        }
    }

    /// Convert to a plain result, asking `on_complete` for the value a
    /// valueless completion stands for
    pub fn into_result<F>(self, on_complete: F) -> ExecResult<T>
    where
        F: FnOnce() -> ExecResult<T>,
    {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Complete => on_complete(),
            Outcome::Failure(e) => Err(e),
        }
    }

    /// Map the success value, leaving `Complete` and `Failure` untouched
    pub fn map<O, F>(self, f: F) -> Outcome<O>
    where
        F: FnOnce(T) -> O,
    {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::Complete => Outcome::Complete,
            Outcome::Failure(e) => Outcome::Failure(e),
        }
    }
}

impl<T> From<ExecResult<T>> for Outcome<T> {
    fn from(result: ExecResult<T>) -> Self {
        Outcome::from_result(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_value() {
        assert_eq!(Outcome::success(42).into_value().unwrap(), Some(42));
        assert_eq!(Outcome::<i32>::complete().into_value().unwrap(), None);

        let err = Outcome::<i32>::failure(ExecError::msg("boom"))
            .into_value()
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_success_includes_complete() {
        assert!(Outcome::success(1).is_success());
        assert!(Outcome::<i32>::complete().is_success());
        assert!(Outcome::<i32>::failure(ExecError::msg("x")).is_failure());
        assert!(Outcome::<i32>::complete().error().is_none());
    }

    #[test]
    fn test_into_result_maps_complete() {
        assert_eq!(Outcome::success(7).into_result(|| Ok(0)).unwrap(), 7);
        assert_eq!(Outcome::<i32>::complete().into_result(|| Ok(0)).unwrap(), 0);
        assert!(Outcome::<i32>::complete()
            .into_result(|| Err(ExecError::msg("empty")))
            .is_err());
    }

    #[test]
    fn test_map_passes_failure_through() {
        let out = Outcome::<i32>::failure(ExecError::msg("x")).map(|v| v * 2);
        assert_eq!(out.error().map(|e| e.to_string()), Some("x".to_string()));

        let out = Outcome::success(21).map(|v| v * 2);
        assert_eq!(out.into_value().unwrap(), Some(42));
    }

    #[test]
    fn test_from_result() {
        let ok: ExecResult<u8> = Ok(1);
        assert!(Outcome::from(ok).is_success());

        let err: ExecResult<u8> = Err(ExecError::NoExecution);
        assert!(matches!(Outcome::from(err), Outcome::Failure(ExecError::NoExecution)));
    }
}
