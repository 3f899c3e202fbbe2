use shared::config::HarnessConfig;
use std::sync::Once;
use tracing::debug;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Install the test subscriber once per process.
///
/// Reads `.env` first so `CARBON_TEST_LOG` can live there.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let dotenv = dotenvy::dotenv();
        let config = HarnessConfig::from_env();

        let installed = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(&config.log_filter))
            .with_test_writer()
            .try_init()
            .is_ok();

        if installed {
            match dotenv {
                Ok(path) => debug!("Loaded environment variables from {}", path.display()),
                Err(_) => debug!("No .env file found, using system environment variables"),
            }
        }
    });
}
