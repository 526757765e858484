//! # Runtime Configuration
//!
//! Coroutine runtime settings read from the environment.
//!
//! ### `BRRTC_STACK_SIZE`
//!
//! Stack size for request coroutines, decimal (`16384`) or hex (`0x4000`).
//! Default: `0x8000` (32 KB). Every request runs the whole middleware chain
//! on its connection's coroutine, so deep chains or large handler frames
//! need more.
//!
//! ### `BRRTC_WORKERS`
//!
//! Number of `may` worker threads. Default: one per CPU (the `may` default).
//!
//! ```rust
//! use brrtcore::runtime_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env();
//! assert!(config.stack_size > 0);
//! ```

use std::env;

/// Default coroutine stack size
pub const DEFAULT_STACK_SIZE: usize = 0x8000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Stack size for coroutines in bytes
    pub stack_size: usize,
    /// Worker threads; `None` keeps the runtime default
    pub workers: Option<usize>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            workers: None,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        let stack_size = env::var("BRRTC_STACK_SIZE")
            .ok()
            .and_then(|v| parse_size(&v))
            .unwrap_or(DEFAULT_STACK_SIZE);
        let workers = env::var("BRRTC_WORKERS")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .filter(|w| *w > 0);
        RuntimeConfig {
            stack_size,
            workers,
        }
    }

    /// Push the settings into the global `may` configuration
    pub fn apply(&self) {
        let config = may::config();
        config.set_stack_size(self.stack_size);
        if let Some(workers) = self.workers {
            config.set_workers(workers);
        }
    }
}

/// Parse `16384` or `0x4000`; zero is rejected
pub(crate) fn parse_size(value: &str) -> Option<usize> {
    let value = value.trim();
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    };
    parsed.filter(|size| *size > 0)
}
