//! Custom assertion macros and utilities
//!
//! Provides assertion macros with more descriptive failure messages for
//! results and queue state.

/// Assert that a result is ok and return the value
#[macro_export]
macro_rules! assert_ok {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
    ($result:expr, $message:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("{}: {:?}", $message, e),
        }
    };
}

/// Assert that a result is an error, optionally of a given variant
#[macro_export]
macro_rules! assert_err {
    ($result:expr) => {
        assert!($result.is_err(), "Expected Err, got Ok");
    };
    ($result:expr, $pattern:pat) => {
        match $result {
            Err($pattern) => {}
            Ok(value) => panic!("Expected Err, got Ok: {:?}", value),
            Err(e) => panic!("Expected different error variant, got: {:?}", e),
        }
    };
}

/// Assert the number of entries persisted in a queue
#[macro_export]
macro_rules! assert_pending {
    ($queue:expr, $expected:expr) => {
        let pending = $queue.len().await.expect("queue length");
        assert_eq!(
            pending, $expected,
            "Expected {} pending entries, found {}",
            $expected, pending
        );
    };
}
