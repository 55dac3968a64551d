//! Per-layer watch settings.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};

/// Interval used by polling watchers unless configured otherwise.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

const DEFAULT_CAPACITY: usize = 16;

/// Decides whether two payloads differ.
///
/// ```rust
/// use jubako::watcher::CompareFunc;
///
/// let compare = CompareFunc::sha256();
/// assert!(compare.changed(b"a = 1", b"a = 2"));
/// assert!(!compare.changed(b"a = 1", b"a = 1"));
/// ```
#[derive(Clone)]
pub struct CompareFunc(Arc<dyn Fn(&[u8], &[u8]) -> bool + Send + Sync>);

impl CompareFunc {
    /// Wrap a custom comparison returning `true` when the payloads differ.
    pub fn new(f: impl Fn(&[u8], &[u8]) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Byte-for-byte comparison.
    #[must_use]
    pub fn bytes() -> Self {
        Self::new(|old, new| old != new)
    }

    /// Compare SHA-256 digests.
    #[must_use]
    pub fn sha256() -> Self {
        Self::new(|old, new| Sha256::digest(old) != Sha256::digest(new))
    }

    /// Returns `true` when `new` differs from `old`.
    #[must_use]
    pub fn changed(&self, old: &[u8], new: &[u8]) -> bool {
        (self.0)(old, new)
    }
}

impl Default for CompareFunc {
    fn default() -> Self {
        Self::bytes()
    }
}

impl fmt::Debug for CompareFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CompareFunc")
    }
}

/// Settings applied when a layer's watcher is created.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use jubako::watcher::{CompareFunc, WatchOptions};
///
/// let opts = WatchOptions::default()
///     .with_poll_interval(Duration::from_secs(5))
///     .with_compare(CompareFunc::sha256());
/// assert_eq!(opts.poll_interval(), Duration::from_secs(5));
/// ```
#[derive(Clone, Debug)]
pub struct WatchOptions {
    poll_interval: Duration,
    compare: CompareFunc,
    capacity: usize,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            compare: CompareFunc::default(),
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl WatchOptions {
    /// Set the polling interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the comparison used by polling watchers.
    #[must_use]
    pub fn with_compare(mut self, compare: CompareFunc) -> Self {
        self.compare = compare;
        self
    }

    /// Set the result channel capacity. Zero is raised to one.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Polling interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Comparison used by polling watchers.
    #[must_use]
    pub fn compare(&self) -> CompareFunc {
        self.compare.clone()
    }

    /// Result channel capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}
