//! In-memory byte buffer source.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::{Fingerprint, Source, UpdateFn, ensure_active, fingerprint};
use crate::watcher::{PollingWatcher, Watcher, WatcherInitializer};
use crate::{JubakoError, JubakoResult};

/// Serves configuration bytes from memory.
///
/// Read-only unless built with [`BytesSource::writable`]. [`BytesSource::replace`]
/// swaps the buffer as an external writer would, which polling watchers then
/// pick up.
///
/// # Examples
///
/// ```rust
/// use jubako::source::{BytesSource, Source};
/// use tokio_util::sync::CancellationToken;
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let source = BytesSource::new("inline", r#"{"port": 8080}"#);
/// let bytes = source.load(&CancellationToken::new()).await?;
/// assert_eq!(bytes, br#"{"port": 8080}"#);
/// assert!(!source.can_save());
/// # Ok::<_, std::sync::Arc<jubako::JubakoError>>(())
/// # }).unwrap();
/// ```
#[derive(Debug)]
pub struct BytesSource {
    name: String,
    data: Mutex<Vec<u8>>,
    loaded: Mutex<Option<Fingerprint>>,
    writable: bool,
}

impl BytesSource {
    /// Create a read-only source named `name`.
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: Mutex::new(data.into()),
            loaded: Mutex::new(None),
            writable: false,
        }
    }

    /// Allow [`Source::save`].
    #[must_use]
    pub const fn writable(mut self) -> Self {
        self.writable = true;
        self
    }

    /// Replace the buffer without going through [`Source::save`].
    pub fn replace(&self, data: impl Into<Vec<u8>>) {
        *self.data.lock() = data.into();
    }

    /// Copy of the current buffer.
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        self.data.lock().clone()
    }
}

#[async_trait]
impl Source for BytesSource {
    fn kind(&self) -> &'static str {
        "bytes"
    }

    fn resource(&self) -> String {
        self.name.clone()
    }

    async fn load(&self, ctx: &CancellationToken) -> JubakoResult<Vec<u8>> {
        ensure_active(ctx)?;
        let data = self.data.lock().clone();
        *self.loaded.lock() = Some(fingerprint(&data));
        Ok(data)
    }

    async fn save(&self, ctx: &CancellationToken, update: UpdateFn<'_>) -> JubakoResult<()> {
        ensure_active(ctx)?;
        if !self.writable {
            return Err(Arc::new(JubakoError::SaveNotSupported {
                layer: self.name.clone(),
            }));
        }
        let mut data = self.data.lock();
        let mut loaded = self.loaded.lock();
        if loaded.is_some_and(|seen| seen != fingerprint(&data)) {
            return Err(Arc::new(JubakoError::SourceModified {
                resource: self.name.clone(),
            }));
        }
        let next = update(&data)?;
        *loaded = Some(fingerprint(&next));
        *data = next;
        Ok(())
    }

    fn can_save(&self) -> bool {
        self.writable
    }

    fn watch(&self) -> Option<WatcherInitializer> {
        Some(Box::new(|params| {
            Ok(Box::new(PollingWatcher::new(params)) as Box<dyn Watcher>)
        }))
    }
}
