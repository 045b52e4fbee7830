//! Assertions shared by the test suites.

#[macro_export]
macro_rules! assert_panics {
    ($e:expr) => {{
        use std::panic::catch_unwind;
        use std::stringify;
        let expr_string = stringify!($e);
        let result = catch_unwind(|| $e);
        if result.is_ok() {
            panic!("assert_panics!({}) failed.", expr_string);
        }
    }};
}

/// Asserts that an `eyre::Result` failed with the given library error.
#[macro_export]
macro_rules! assert_error_matches {
    ($result:expr, $error_type:ty, $pattern:pat) => {{
        match $result {
            Ok(_) => panic!("expected an error, got Ok"),
            Err(report) => match report.downcast_ref::<$error_type>() {
                Some(error) => assert!(
                    matches!(error, $pattern),
                    "unexpected error: {:?}",
                    error
                ),
                None => panic!("unexpected error type: {}", report),
            },
        }
    }};
}
