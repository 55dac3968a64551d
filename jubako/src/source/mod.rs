//! Byte-level configuration sources.
//!
//! A [`Source`] only moves bytes; parsing belongs to
//! [`crate::document::Document`]. Every operation takes a
//! [`CancellationToken`] and checks it before touching I/O.

mod bytes;
mod file;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::watcher::WatcherInitializer;
use crate::{JubakoError, JubakoResult};

pub use bytes::BytesSource;
pub use file::{FileEvents, FileSource};

/// Computes the bytes to store from the bytes currently stored.
pub type UpdateFn<'a> = Box<dyn FnOnce(&[u8]) -> JubakoResult<Vec<u8>> + Send + 'a>;

/// Loads and optionally stores raw configuration bytes.
#[async_trait]
pub trait Source: fmt::Debug + Send + Sync {
    /// Short diagnostic name such as `file` or `bytes`.
    fn kind(&self) -> &'static str;

    /// Identity used in error messages, for example the file path.
    fn resource(&self) -> String;

    /// Read the current bytes.
    ///
    /// # Errors
    ///
    /// Returns [`JubakoError::Cancelled`] when `ctx` is cancelled,
    /// [`JubakoError::NotExist`] for missing resources and
    /// [`JubakoError::Source`] for other I/O failures.
    async fn load(&self, ctx: &CancellationToken) -> JubakoResult<Vec<u8>>;

    /// Replace the stored bytes with the output of `update`, which receives
    /// the bytes stored at the moment of the write.
    ///
    /// # Errors
    ///
    /// Returns [`JubakoError::SaveNotSupported`] for read-only sources and
    /// [`JubakoError::SourceModified`] when the stored bytes changed since
    /// the last load.
    async fn save(&self, ctx: &CancellationToken, _update: UpdateFn<'_>) -> JubakoResult<()> {
        ensure_active(ctx)?;
        Err(Arc::new(JubakoError::SaveNotSupported {
            layer: self.resource(),
        }))
    }

    /// Whether [`Source::save`] is supported.
    fn can_save(&self) -> bool {
        false
    }

    /// Factory for a watcher reporting changes, if the source can be
    /// watched.
    fn watch(&self) -> Option<WatcherInitializer> {
        None
    }
}

/// Fail with [`JubakoError::Cancelled`] when `ctx` is cancelled.
///
/// # Errors
///
/// Returns [`JubakoError::Cancelled`] when the token has been cancelled.
pub fn ensure_active(ctx: &CancellationToken) -> JubakoResult<()> {
    if ctx.is_cancelled() {
        Err(Arc::new(JubakoError::Cancelled))
    } else {
        Ok(())
    }
}

/// SHA-256 content fingerprint used for optimistic concurrency checks.
pub(crate) type Fingerprint = [u8; 32];

pub(crate) fn fingerprint(bytes: &[u8]) -> Fingerprint {
    Sha256::digest(bytes).into()
}
