pub mod builders;
pub mod backends;

use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Route controller, shim and runner diagnostics into the test harness.
///
/// Builds run in-process through the test backends, so this one subscriber
/// sees the controller and every task. `RELBUILD_LOG` takes a level or a
/// filter directive such as `relbuild::ipc=debug`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(relbuild::logging::LOG_ENV)
            .unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Bound a whole build (or a single notification) so a hung socket or a
/// stuck command fails the test instead of hanging it.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(10), f)
        .await
        .expect("build did not finish within 10 seconds")
}

/// Scratch root for one build: config, build directory and logs all go
/// under it. Removed on drop.
pub fn scratch_dir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("relbuild-test-")
        .tempdir()
        .expect("creating scratch dir")
}
