//! Filesystem source with atomic writes and change notifications.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use notify::{EventKind, RecursiveMode, Watcher as _};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Fingerprint, Source, UpdateFn, ensure_active, fingerprint};
use crate::watcher::{
    NotifyFn, PollingWatcher, Subscription, SubscriptionHandler, SubscriptionWatcher, Watcher,
    WatcherInitializer,
};
use crate::{JubakoError, JubakoResult};

/// Reads and writes one configuration file.
///
/// Saves write a sibling temporary file and rename it over the target, so
/// readers never observe a partial write. A save fails with
/// [`JubakoError::SourceModified`] when the file changed after the last
/// load. Watching uses filesystem notifications unless
/// [`FileSource::polling`] is set.
#[derive(Debug)]
pub struct FileSource {
    path: Utf8PathBuf,
    polling: bool,
    loaded: Mutex<Option<Fingerprint>>,
}

impl FileSource {
    /// Create a source for `path`.
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            polling: false,
            loaded: Mutex::new(None),
        }
    }

    /// Watch by polling instead of filesystem notifications.
    #[must_use]
    pub const fn polling(mut self) -> Self {
        self.polling = true;
        self
    }

    /// Path of the file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn io_error(&self, err: io::Error) -> Arc<JubakoError> {
        if err.kind() == io::ErrorKind::NotFound {
            JubakoError::not_exist(self.path.as_str())
        } else {
            JubakoError::source(self.path.as_str(), err)
        }
    }
}

/// Return the parent directory of `path`, falling back to `"."` when the path
/// has no parent or the parent is empty.
fn parent_or_dot(path: &Utf8Path) -> &Utf8Path {
    path.parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."))
}

/// Open the parent directory of `path` via `cap-std` and extract the file name.
fn open_parent_dir_and_name(path: &Utf8Path) -> io::Result<(Dir, String)> {
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::other("cannot determine file name for configuration path"))?;
    let dir = Dir::open_ambient_dir(parent_or_dot(path), ambient_authority())?;
    Ok((dir, file_name.to_owned()))
}

fn read_file(path: &Utf8Path) -> io::Result<Vec<u8>> {
    let (dir, name) = open_parent_dir_and_name(path)?;
    dir.read(name)
}

fn read_optional(path: &Utf8Path) -> io::Result<Option<Vec<u8>>> {
    match read_file(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

fn write_atomic(path: &Utf8Path, bytes: &[u8]) -> io::Result<()> {
    let (dir, name) = open_parent_dir_and_name(path)?;
    let tmp = format!(".{name}.{}.tmp", std::process::id());
    if let Err(err) = dir.write(&tmp, bytes) {
        dir.remove_file(&tmp).ok();
        return Err(err);
    }
    dir.rename(&tmp, &dir, &name).inspect_err(|_| {
        dir.remove_file(&tmp).ok();
    })
}

async fn blocking<T: Send + 'static>(
    path: &Utf8Path,
    op: impl FnOnce() -> io::Result<T> + Send + 'static,
) -> JubakoResult<io::Result<T>> {
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|err| JubakoError::source(path.as_str(), err))
}

#[async_trait]
impl Source for FileSource {
    fn kind(&self) -> &'static str {
        "file"
    }

    fn resource(&self) -> String {
        self.path.to_string()
    }

    async fn load(&self, ctx: &CancellationToken) -> JubakoResult<Vec<u8>> {
        ensure_active(ctx)?;
        let path = self.path.clone();
        let bytes = blocking(&self.path, move || read_file(&path))
            .await?
            .map_err(|err| self.io_error(err))?;
        *self.loaded.lock() = Some(fingerprint(&bytes));
        debug!(path = %self.path, len = bytes.len(), "read configuration file");
        Ok(bytes)
    }

    async fn save(&self, ctx: &CancellationToken, update: UpdateFn<'_>) -> JubakoResult<()> {
        ensure_active(ctx)?;
        let path = self.path.clone();
        let current = blocking(&self.path, move || read_optional(&path))
            .await?
            .map_err(|err| self.io_error(err))?;
        let seen = *self.loaded.lock();
        let modified = match (&seen, &current) {
            (Some(seen), Some(bytes)) => *seen != fingerprint(bytes),
            (Some(_), None) => true,
            (None, _) => false,
        };
        if modified {
            return Err(Arc::new(JubakoError::SourceModified {
                resource: self.path.to_string(),
            }));
        }
        let next = update(current.as_deref().unwrap_or_default())?;
        ensure_active(ctx)?;
        let next_fingerprint = fingerprint(&next);
        let path = self.path.clone();
        blocking(&self.path, move || write_atomic(&path, &next))
            .await?
            .map_err(|err| self.io_error(err))?;
        *self.loaded.lock() = Some(next_fingerprint);
        debug!(
            path = %self.path,
            sha256 = %hex::encode(next_fingerprint),
            "wrote configuration file"
        );
        Ok(())
    }

    fn can_save(&self) -> bool {
        true
    }

    fn watch(&self) -> Option<WatcherInitializer> {
        let path = self.path.clone();
        let polling = self.polling;
        Some(Box::new(move |params| {
            let watcher: Box<dyn Watcher> = if polling {
                Box::new(PollingWatcher::new(params))
            } else {
                Box::new(SubscriptionWatcher::new(
                    Arc::new(FileEvents::new(path)),
                    params,
                ))
            };
            Ok(watcher)
        }))
    }
}

/// Filesystem notifications for one file.
///
/// Watches the parent directory so atomic replacements are seen, and
/// reports event-only notifications for the file's name. Access events are
/// ignored.
#[derive(Clone, Debug)]
pub struct FileEvents {
    path: Utf8PathBuf,
}

impl FileEvents {
    /// Watch `path`.
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SubscriptionHandler for FileEvents {
    fn subscribe(&self, notify: NotifyFn) -> JubakoResult<Subscription> {
        let file_name = self
            .path
            .file_name()
            .map(str::to_owned)
            .ok_or_else(|| JubakoError::invalid_path(self.path.as_str(), "not a file path"))?;
        let resource = self.path.to_string();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Access(_)) {
                        return;
                    }
                    let ours = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().is_some_and(|n| n == file_name.as_str()));
                    if ours {
                        notify(None, None);
                    }
                }
                Err(err) => notify(None, Some(JubakoError::source(resource.clone(), err))),
            }
        })
        .map_err(|err| JubakoError::source(self.path.as_str(), err))?;
        watcher
            .watch(
                parent_or_dot(&self.path).as_std_path(),
                RecursiveMode::NonRecursive,
            )
            .map_err(|err| JubakoError::source(self.path.as_str(), err))?;
        Ok(Subscription::new(watcher))
    }
}
