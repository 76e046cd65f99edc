//! Logger setup for embedders and tests.
//!
//! The engine only emits records through `log` (and `tracing`, whose events
//! are forwarded to `log` when no subscriber is installed). Nothing is printed
//! until one of the functions below installs an `env_logger` backend.
//!
//! Where records come from:
//!
//! - `tensorplan::allocator` - `debug!` per alloc/free, `trace!` free-map dumps,
//!   `info!` when the backing buffer is materialized
//! - `tensorplan::graph::optimize` - `debug!` per rewrite, `info!` totals
//! - `tensorplan::graph::memory` - `info!` planned bytes, `warn!` on an empty graph
//!
//! `RUST_LOG` directives are applied on top of the level passed in, so
//!
//! ```bash
//! RUST_LOG=tensorplan::allocator=trace cargo test
//! ```
//!
//! works with every initializer here.

use env_logger::{Builder, Env};
use log::LevelFilter;
use std::io::Write;
use std::sync::Once;

static INIT: Once = Once::new();

/// Install the engine logger at `level`.
///
/// Only the first call has any effect.
pub fn init(level: LevelFilter) {
    INIT.call_once(|| {
        let mut builder = Builder::new();
        builder.filter_level(level);
        if let Ok(directives) = std::env::var("RUST_LOG") {
            builder.parse_filters(&directives);
        }
        builder
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{:5}] {} - {}",
                    record.level(),
                    record.module_path().unwrap_or("tensorplan"),
                    record.args()
                )
            })
            .init();
    });
}

/// Install the engine logger at `warn`, or whatever `RUST_LOG` asks for.
pub fn init_from_env() {
    init(LevelFilter::Warn);
}

/// Logger for test binaries.
///
/// Output goes through the test harness capture. Safe to call from every
/// test; later calls are ignored.
pub fn init_test() {
    let _ = Builder::from_env(Env::default().default_filter_or("warn"))
        .is_test(true)
        .try_init();
}
