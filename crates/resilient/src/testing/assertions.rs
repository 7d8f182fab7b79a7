//! Assertions for resilience tests

#![allow(clippy::missing_panics_doc)]

use std::time::Duration;

/// Assert that an outcome failed with a message containing `substring`
///
/// ```
/// use resilient::{Failure, Outcome};
///
/// let outcome: Outcome<()> = Err(Failure::value("Connection timeout occurred"));
/// resilient::assert_failure_contains!(outcome, "timeout");
/// ```
#[macro_export]
macro_rules! assert_failure_contains {
    ($outcome:expr, $substring:expr) => {
        match &$outcome {
            Ok(_) => panic!("Expected failure but got Ok"),
            Err(e) => {
                let message = format!("{}", e);
                assert!(
                    message.contains($substring),
                    "Failure message '{}' does not contain '{}'",
                    message,
                    $substring
                );
            }
        }
    };
}

/// Assert how many times an operation was invoked
#[macro_export]
macro_rules! assert_attempts {
    ($actual:expr, $expected:expr) => {
        assert_eq!($actual, $expected, "Expected {} attempts but got {}", $expected, $actual);
    };
}

/// Assert that a duration is within `tolerance` of `expected`
///
/// ```
/// use std::time::Duration;
///
/// use resilient::testing::assert_duration_in_range;
///
/// let actual = Duration::from_millis(105);
/// assert_duration_in_range(actual, Duration::from_millis(100), Duration::from_millis(10));
/// ```
pub fn assert_duration_in_range(actual: Duration, expected: Duration, tolerance: Duration) {
    let min = expected.saturating_sub(tolerance);
    let max = expected.saturating_add(tolerance);

    assert!(actual >= min && actual <= max, "Duration {actual:?} not in range [{min:?}, {max:?}]");
}

/// Assert that `delay` is a jittered version of `computed`: within
/// `[0.5 * computed, computed)`
pub fn assert_jittered(delay: Duration, computed: Duration) {
    let floor = computed.mul_f64(0.5);
    assert!(
        delay >= floor && delay < computed,
        "Delay {delay:?} outside jitter range [{floor:?}, {computed:?})"
    );
}
