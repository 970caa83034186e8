//! Tracing setup (ambient stack, §1).
//!
//! A single process-wide subscriber: env-filter driven verbosity, plain
//! compact output by default, JSON lines when `AGENTCORE_LOG_FORMAT=json`.

use std::sync::Once;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let json = std::env::var("AGENTCORE_LOG_FORMAT").as_deref() == Ok("json");

        let registry = tracing_subscriber::registry().with(filter);

        if json {
            let _ = registry
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .try_init();
        } else {
            let _ = registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .compact()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .try_init();
        }
    });
}
