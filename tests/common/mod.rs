/// Common test utilities and mock infrastructure
///
/// This module provides shared functionality for integration tests:
/// - Stub external tools honoring the orchestrator's subprocess contracts
/// - Throwaway tool/data directory fixtures
/// - One-time tracing setup per test binary

pub mod mock_tools;

// One subscriber per test binary; RUST_LOG controls verbosity.
#[ctor::ctor]
fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
