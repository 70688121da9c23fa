//! Dispatch configuration, populated from environment variables.

use std::time::Duration;

/// Default number of fan-out branches allowed in flight at once.
pub const DEFAULT_MAX_FANOUT: usize = 16;

/// Runtime configuration for a [`Dispatcher`](crate::Dispatcher) and the
/// services it builds.
///
/// All fields are populated from environment variables with sensible
/// defaults, so dispatch works with zero configuration. Values that fail to
/// parse fall back to the default.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `CONDUIT_DISPATCH_TIMEOUT_MS` | `0` (off) | Upper bound on one whole dispatch, fan-out included |
/// | `CONDUIT_SEND_TIMEOUT_MS` | `0` (off) | Upper bound on each transporter call, for services built from definitions |
/// | `CONDUIT_MAX_FANOUT` | `16` | Concurrent branches per fan-out; `0` means unbounded |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// When set, a dispatch still running after this long is abandoned and
    /// answered with `timeout`. Outstanding fan-out branches are dropped.
    pub dispatch_timeout: Option<Duration>,

    /// Send timeout handed to services built by
    /// [`build_service`](crate::build_service) and
    /// [`build_registry`](crate::build_registry). The dispatcher itself never
    /// reads it: a service made with [`Service::new`](crate::Service::new)
    /// keeps whatever [`Service::with_send_timeout`](crate::Service::with_send_timeout)
    /// gave it.
    pub send_timeout: Option<Duration>,

    /// How many fan-out branches may be in flight at once. `0` lets every
    /// branch start immediately.
    pub max_fanout: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            dispatch_timeout: None,
            send_timeout: None,
            max_fanout: DEFAULT_MAX_FANOUT,
        }
    }
}

impl DispatchConfig {
    /// Populate config from environment variables, applying defaults where absent.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Populate config from an arbitrary key lookup. [`from_env`](Self::from_env)
    /// is this with `std::env::var`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let millis = |key: &str| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
        };

        Self {
            dispatch_timeout: millis("CONDUIT_DISPATCH_TIMEOUT_MS"),
            send_timeout: millis("CONDUIT_SEND_TIMEOUT_MS"),
            max_fanout: lookup("CONDUIT_MAX_FANOUT")
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(DEFAULT_MAX_FANOUT),
        }
    }

    /// The concurrency limit to hand to a fan-out of `branches` branches.
    /// Never zero.
    pub fn fanout_limit(&self, branches: usize) -> usize {
        match self.max_fanout {
            0 => branches.max(1),
            n => n,
        }
    }
}
