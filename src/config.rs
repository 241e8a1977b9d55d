//! Environment-driven configuration.
//!
//! The environment is read once at startup; the resulting value is passed by
//! reference and never re-queried.

/// Tuning knobs read from the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// 0 = silent, 1 = solver timings, 2 = additionally dump the IR.
    pub verbose: u32,
    /// SMT wall-clock cap in milliseconds.
    pub timeout: u64,
    /// SMT memory cap in MiB.
    pub memory_limit: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            verbose: env_u64("SMTGCC_VERBOSE").unwrap_or(0) as u32,
            timeout: env_u64("SMTGCC_TIMEOUT").unwrap_or(120_000),
            memory_limit: env_u64("SMTGCC_MEMORY_LIMIT").unwrap_or(10 * 1024),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            verbose: 0,
            timeout: 120_000,
            memory_limit: 10 * 1024,
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.trim().parse().ok()
}
