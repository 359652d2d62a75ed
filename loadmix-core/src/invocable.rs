//! Invocable tests and their outcomes.
//!
//! An [`Invocable`] is one simulated unit of work (typically one HTTP request).
//! Invoking it yields an [`Outcome`] that at minimum reports success or
//! failure. A failure to even produce an outcome (connection refused, timeout)
//! is an [`InvocationError`], which callers propagate rather than record.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Numeric test identifier, e.g. `1`, `2`, `999`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TestId(pub u32);

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The result of one invocation.
pub trait Outcome {
    fn is_successful(&self) -> bool;
}

impl Outcome for bool {
    fn is_successful(&self) -> bool {
        *self
    }
}

/// Error raised by an invocable that could not complete.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("test {test} transport failure: {message}")]
    Transport { test: TestId, message: String },
    #[error("test {test} timed out")]
    Timeout { test: TestId },
    #[error("test {test} failed: {message}")]
    Other { test: TestId, message: String },
}

impl InvocationError {
    pub fn test(&self) -> TestId {
        match self {
            Self::Transport { test, .. } | Self::Timeout { test } | Self::Other { test, .. } => {
                *test
            }
        }
    }
}

/// One invocable test action.
///
/// Implementors take `&self`; tests that keep per-call state use interior
/// mutability. The invoker only borrows tests for the duration of a loop.
pub trait Invocable {
    type Output: Outcome;

    fn id(&self) -> TestId;

    fn description(&self) -> &str {
        ""
    }

    fn invoke(&self) -> Result<Self::Output, InvocationError>;
}

impl<T: Invocable + ?Sized> Invocable for &T {
    type Output = T::Output;

    fn id(&self) -> TestId {
        (**self).id()
    }

    fn description(&self) -> &str {
        (**self).description()
    }

    fn invoke(&self) -> Result<Self::Output, InvocationError> {
        (**self).invoke()
    }
}

impl<T: Invocable + ?Sized> Invocable for Box<T> {
    type Output = T::Output;

    fn id(&self) -> TestId {
        (**self).id()
    }

    fn description(&self) -> &str {
        (**self).description()
    }

    fn invoke(&self) -> Result<Self::Output, InvocationError> {
        (**self).invoke()
    }
}

/// Render a test the way the harness logs it: `Test 1 (security)`.
pub fn describe<T: Invocable + ?Sized>(test: &T) -> String {
    let description = test.description();
    if description.is_empty() {
        format!("Test {}", test.id())
    } else {
        format!("Test {} ({description})", test.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        id: TestId,
        description: &'static str,
        succeed: bool,
    }

    impl Invocable for Fixed {
        type Output = bool;

        fn id(&self) -> TestId {
            self.id
        }

        fn description(&self) -> &str {
            self.description
        }

        fn invoke(&self) -> Result<bool, InvocationError> {
            Ok(self.succeed)
        }
    }

    #[test]
    fn boxed_and_borrowed_tests_delegate() {
        let fixed = Fixed {
            id: TestId(7),
            description: "home",
            succeed: true,
        };
        let borrowed = &fixed;
        assert_eq!(borrowed.id(), TestId(7));
        assert!(borrowed.invoke().unwrap().is_successful());

        let boxed: Box<dyn Invocable<Output = bool>> = Box::new(Fixed {
            id: TestId(8),
            description: "",
            succeed: false,
        });
        assert_eq!(boxed.id(), TestId(8));
        assert!(!boxed.invoke().unwrap().is_successful());
    }

    #[test]
    fn describe_omits_empty_description() {
        let named = Fixed {
            id: TestId(999),
            description: "My test",
            succeed: true,
        };
        let unnamed = Fixed {
            id: TestId(1),
            description: "",
            succeed: true,
        };
        assert_eq!(describe(&named), "Test 999 (My test)");
        assert_eq!(describe(&unnamed), "Test 1");
    }

    #[test]
    fn invocation_error_reports_its_test() {
        let err = InvocationError::Timeout { test: TestId(3) };
        assert_eq!(err.test(), TestId(3));
        assert_eq!(err.to_string(), "test 3 timed out");
    }
}
