//! Process-wide tracing setup shared by the binaries and black-box tests.

pub mod tracing;

/// JSON logs filtered by `RUST_LOG` (default `info`). Safe to call more than
/// once; later calls are no-ops.
pub fn init() {
    tracing::init(tracing::DEFAULT_FILTER);
}

/// Human-readable logs captured by the test harness.
pub fn init_for_tests() {
    tracing::init_test_writer("debug");
}
