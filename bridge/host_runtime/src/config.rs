use std::time::Duration;

pub const DEFAULT_DISPATCH_QUEUE_CAP: usize = 4096;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_HISTORY_LIMIT: usize = 100;
pub const DEFAULT_OUTBOUND_QUEUE_CAP: usize = 256;

const DISPATCH_QUEUE_CAP_VAR: &str = "APP_BRIDGE_DISPATCH_QUEUE_CAP";
const REQUEST_TIMEOUT_MS_VAR: &str = "APP_BRIDGE_REQUEST_TIMEOUT_MS";
const HISTORY_LIMIT_VAR: &str = "APP_BRIDGE_HISTORY_LIMIT";
const OUTBOUND_QUEUE_CAP_VAR: &str = "APP_BRIDGE_OUTBOUND_QUEUE_CAP";

/// Runtime tunables, read from `APP_BRIDGE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Capacity of the dispatch queue feeding the worker.
    pub dispatch_queue_cap: usize,
    /// Bound on a native round trip. `None` waits forever.
    pub request_timeout: Option<Duration>,
    /// Maximum number of entries kept per page history.
    pub history_limit: usize,
    /// Capacity of the transport's outbound frame queue.
    pub outbound_queue_cap: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            dispatch_queue_cap: DEFAULT_DISPATCH_QUEUE_CAP,
            request_timeout: Some(Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS)),
            history_limit: DEFAULT_HISTORY_LIMIT,
            outbound_queue_cap: DEFAULT_OUTBOUND_QUEUE_CAP,
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Unparseable or zero
    /// values fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let request_timeout = match lookup(REQUEST_TIMEOUT_MS_VAR)
            .and_then(|raw| raw.trim().parse::<u64>().ok())
        {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
            None => Some(Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS)),
        };

        Self {
            dispatch_queue_cap: parse_positive(&lookup, DISPATCH_QUEUE_CAP_VAR)
                .unwrap_or(DEFAULT_DISPATCH_QUEUE_CAP),
            request_timeout,
            history_limit: parse_positive(&lookup, HISTORY_LIMIT_VAR)
                .unwrap_or(DEFAULT_HISTORY_LIMIT),
            outbound_queue_cap: parse_positive(&lookup, OUTBOUND_QUEUE_CAP_VAR)
                .unwrap_or(DEFAULT_OUTBOUND_QUEUE_CAP),
        }
    }
}

fn parse_positive<F>(lookup: &F, key: &str) -> Option<usize>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
}
