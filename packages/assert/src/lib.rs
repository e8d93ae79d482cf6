#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Loud assertions for synchronization invariants.
//!
//! A broken invariant here means the admission contract itself is broken, so
//! the macros never return quietly: they print a highlighted banner with a
//! captured backtrace and then panic. Setting `TURNSTILE_ASSERT_EXIT=1` turns
//! the panic into an immediate `std::process::exit(1)`, which is useful when
//! a panic would only unwind a single worker task.

pub use colored;
pub use turnstile_env_utils;

/// Environment variable that switches failed invariants from panicking to
/// exiting the process.
pub const EXIT_ENV_VAR: &str = "TURNSTILE_ASSERT_EXIT";

/// Returns `true` when failed invariants should exit the process instead of
/// panicking.
#[must_use]
pub fn exit_on_failure() -> bool {
    turnstile_env_utils::default_env(EXIT_ENV_VAR, "0") == "1"
}

#[doc(hidden)]
pub fn fail(message: &str) -> ! {
    use colored::Colorize as _;

    eprintln!(
        "{}\n{}",
        format!("invariant violated: \"{message}\"").red().bold(),
        std::backtrace::Backtrace::force_capture()
    );

    if exit_on_failure() {
        std::process::exit(1);
    }

    panic!("invariant violated: {message}");
}

#[macro_export]
macro_rules! assert_invariant {
    ($evaluate:expr $(,)?) => {
        if !($evaluate) {
            $crate::fail(stringify!($evaluate));
        }
    };
    ($evaluate:expr, $($message:tt)+) => {
        if !($evaluate) {
            $crate::fail(&format!($($message)+));
        }
    };
}

#[macro_export]
macro_rules! invariant_violated {
    ($($message:tt)+) => {
        $crate::fail(&format!($($message)+))
    };
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test_log::test]
    fn passing_invariant_is_silent() {
        let held = 2;
        assert_invariant!(held <= 3);
        assert_invariant!(held <= 3, "held {held} exceeds capacity");
    }

    #[test_log::test]
    #[should_panic(expected = "invariant violated: held 4 exceeds capacity 3")]
    fn failing_invariant_panics_with_message() {
        let held = 4;
        assert_invariant!(held <= 3, "held {held} exceeds capacity {}", 3);
    }

    #[test_log::test]
    #[should_panic(expected = "invariant violated: 1 + 1 == 3")]
    fn failing_invariant_without_message_uses_expression() {
        assert_invariant!(1 + 1 == 3);
    }

    #[test_log::test]
    #[should_panic(expected = "invariant violated: release without grant")]
    fn invariant_violated_always_fails() {
        invariant_violated!("release without grant");
    }

    #[test_log::test]
    #[serial]
    fn exit_on_failure_defaults_to_false() {
        // SAFETY: serialized with every other test touching the variable
        unsafe { std::env::remove_var(EXIT_ENV_VAR) };

        assert!(!exit_on_failure());
    }
}
