//! The file_sd output writer.
//!
//! A single task drains the batch channel and maintains the published
//! source→group map. Each incoming batch replaces the map wholesale:
//! groups without targets (tombstones, and instances that carry no
//! address) drop out. When the map actually changed, the whole document is
//! rendered as one JSON array of `{targets, labels}` objects and moved
//! into place with a temp-file-plus-rename so readers never observe a
//! half-written file.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use tokio::sync::mpsc;

use crate::target::TargetGroup;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to serialize target groups: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to write temporary target file: {0}")]
    Write(#[source] std::io::Error),
    #[error("failed to replace target file: {0}")]
    Replace(#[source] tempfile::PersistError),
}

pub type Result<T> = std::result::Result<T, Error>;

pub struct FileSdWriter {
    path: PathBuf,
    groups: BTreeMap<String, TargetGroup>,
    /// Set when a write failed, so the next batch rewrites the file even
    /// if its content is unchanged.
    dirty: bool,
}

impl FileSdWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            groups: BTreeMap::default(),
            dirty: false,
        }
    }

    /// Replaces the published map with the batch's contents.
    ///
    /// Returns whether the map changed. Tombstones and address-less groups
    /// contribute nothing, which is what retracts a removed source from
    /// the document.
    fn apply(&mut self, batch: Vec<TargetGroup>) -> bool {
        let mut groups = BTreeMap::new();
        for group in batch {
            if group.targets.is_empty() {
                continue;
            }
            groups.insert(group.source.clone(), group);
        }

        if groups == self.groups {
            return false;
        }
        self.groups = groups;
        true
    }

    fn write(&self) -> Result<()> {
        let entries: Vec<&TargetGroup> = self.groups.values().collect();
        let data = serde_json::to_vec_pretty(&entries).map_err(Error::Serialize)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = tempfile::NamedTempFile::new_in(dir).map_err(Error::Write)?;
        file.write_all(&data).map_err(Error::Write)?;
        file.persist(&self.path).map_err(Error::Replace)?;

        Ok(())
    }

    /// Drains the batch channel until the discovery side closes it.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Vec<TargetGroup>>) {
        while let Some(batch) = rx.recv().await {
            let changed = self.apply(batch);
            if !changed && !self.dirty {
                log::debug!("target groups unchanged, skipping write");
                continue;
            }

            match self.write() {
                Ok(()) => {
                    self.dirty = false;
                    log::debug!(
                        "wrote {} target groups to `{}`",
                        self.groups.len(),
                        self.path.display()
                    );
                }
                Err(err) => {
                    self.dirty = true;
                    log::error!("failed to write `{}`: {err}", self.path.display());
                }
            }
        }
        log::debug!("discovery channel closed, stopping target writer");
    }
}
