use std::time::Duration;

/// Delay used by throttled and plain delayed invocations when none is given.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(150);

/// Delay before settled calls are swept out of their collection.
pub const DEFAULT_SWEEP_DELAY: Duration = Duration::from_millis(3000);

/// Startup configuration for a [`RequestQueue`](crate::RequestQueue).
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Instance name for logging
    pub name: String,

    /// Timer root names, e.g. `auth` or `authTimeout`
    pub timers: Vec<String>,

    /// Call collection root names; mirrors `timers` when `None`
    pub collections: Option<Vec<String>>,

    /// Timer delay when a trigger gives none or a negative one
    pub default_delay: Duration,
    /// Wait between a settlement and the sweep that removes it
    pub sweep_delay: Duration,
}

impl QueueConfig {
    /// Create a configuration whose call collections mirror the timers.
    pub fn new<I, S>(name: impl Into<String>, timers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        QueueConfig {
            name: name.into(),
            timers: timers.into_iter().map(Into::into).collect(),
            collections: None,
            default_delay: DEFAULT_DELAY,
            sweep_delay: DEFAULT_SWEEP_DELAY,
        }
    }

    /// Register call collections independently of the timers.
    pub fn with_collections<I, S>(mut self, collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.collections = Some(collections.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn with_sweep_delay(mut self, delay: Duration) -> Self {
        self.sweep_delay = delay;
        self
    }

    /// Collection root names after applying the mirror-the-timers fallback.
    pub(crate) fn collection_roots(&self) -> Vec<String> {
        match &self.collections {
            Some(collections) if !collections.is_empty() => collections.clone(),
            _ => self
                .timers
                .iter()
                .map(|timer| strip_suffix_ignore_case(timer.trim(), "timeout").to_string())
                .collect(),
        }
    }
}

/// Resolve a caller-supplied millisecond delay, falling back on absent or negative input.
pub fn delay_or(millis: Option<i64>, default: Duration) -> Duration {
    match millis {
        Some(ms) if ms >= 0 => Duration::from_millis(ms as u64),
        _ => default,
    }
}

fn strip_suffix_ignore_case<'a>(value: &'a str, suffix: &str) -> &'a str {
    let split = value.len().saturating_sub(suffix.len());
    match (value.get(..split), value.get(split..)) {
        (Some(head), Some(tail)) if tail.eq_ignore_ascii_case(suffix) => head,
        _ => value,
    }
}
