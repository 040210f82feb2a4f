//! Bundling successful outputs for download.
//!
//! [`BatchExporter`] names every output `{prefix}-{position}.{ext}` (1-based)
//! and tries to pack them into one archive. If no archiver is available or
//! bundling fails, every item is emitted individually through an
//! [`ItemSink`] instead, one at a time.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tar::{Builder, Header};
use tracing::{info, warn};

use crate::engine::BatchState;
use crate::error::ExportError;
use crate::generator::GeneratedImage;

/// One output to export, before naming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportItem {
    pub payload: Vec<u8>,
    pub extension: String,
}

impl TryFrom<&GeneratedImage> for ExportItem {
    type Error = ExportError;

    fn try_from(image: &GeneratedImage) -> Result<Self, Self::Error> {
        let payload = image.bytes().map_err(|e| ExportError::InvalidPayload {
            name: image.source.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            payload,
            extension: image.extension().to_string(),
        })
    }
}

/// Decode every successful output of a run, in index order.
///
/// An undecodable output fails the whole call with the index it came from.
pub fn items_from_successes(state: &BatchState<GeneratedImage>) -> Result<Vec<ExportItem>, ExportError> {
    state
        .successes_by_index()
        .into_iter()
        .map(|success| {
            ExportItem::try_from(&success.output).map_err(|e| match e {
                ExportError::InvalidPayload { name, reason } => ExportError::InvalidPayload {
                    name: format!("item {} ({name})", success.index + 1),
                    reason,
                },
                other => other,
            })
        })
        .collect()
}

/// A named output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub payload: Vec<u8>,
}

/// A finished archive and the names of its entries, in order.
#[derive(Debug, Clone)]
pub struct Archive {
    pub bytes: Vec<u8>,
    pub entries: Vec<String>,
}

pub trait Archiver {
    fn bundle(&self, entries: &[ArchiveEntry]) -> Result<Archive, ExportError>;
}

/// Destination for the per-item fallback.
pub trait ItemSink {
    fn emit(&mut self, entry: &ArchiveEntry) -> Result<(), ExportError>;
}

/// Uncompressed tar with normalized headers.
#[derive(Debug, Default, Clone, Copy)]
pub struct TarArchiver;

impl Archiver for TarArchiver {
    fn bundle(&self, entries: &[ArchiveEntry]) -> Result<Archive, ExportError> {
        let mut builder = Builder::new(Vec::new());
        for entry in entries {
            let mut header = Header::new_gnu();
            header.set_path(&entry.name)?;
            header.set_size(entry.payload.len() as u64);
            header.set_mtime(0);
            header.set_uid(0);
            header.set_gid(0);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, entry.payload.as_slice())?;
        }
        let bytes = builder.into_inner()?;
        Ok(Archive {
            bytes,
            entries: entries.iter().map(|e| e.name.clone()).collect(),
        })
    }
}

/// Writes each item as its own file inside a directory.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            written: Vec::new(),
        }
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl ItemSink for DirectorySink {
    fn emit(&mut self, entry: &ArchiveEntry) -> Result<(), ExportError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(&entry.name);
        fs::write(&path, &entry.payload)?;
        self.written.push(path);
        Ok(())
    }
}

#[derive(Debug)]
pub enum ExportOutcome {
    Archive(Archive),
    Individual { emitted: usize },
}

#[derive(Debug, Clone)]
pub struct BatchExporter {
    prefix: String,
    stagger: Duration,
}

impl BatchExporter {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            stagger: Duration::ZERO,
        }
    }

    /// Pause between individual emissions on the fallback path.
    pub fn with_stagger(mut self, stagger: Duration) -> Self {
        self.stagger = stagger;
        self
    }

    /// Name items `{prefix}-{position}.{ext}` in the order given.
    pub fn name_entries(&self, items: Vec<ExportItem>) -> Vec<ArchiveEntry> {
        items
            .into_iter()
            .enumerate()
            .map(|(i, item)| ArchiveEntry {
                name: format!("{}-{}.{}", self.prefix, i + 1, item.extension),
                payload: item.payload,
            })
            .collect()
    }

    /// Bundle `items`, falling back to per-item emission.
    ///
    /// The fallback always attempts every item. It only fails if at least one
    /// item could not be emitted.
    pub async fn export(
        &self,
        items: Vec<ExportItem>,
        archiver: Option<&dyn Archiver>,
        sink: &mut dyn ItemSink,
    ) -> Result<ExportOutcome, ExportError> {
        let entries = self.name_entries(items);

        match archiver {
            Some(archiver) => match archiver.bundle(&entries) {
                Ok(archive) => {
                    info!(entries = archive.entries.len(), "bundled outputs");
                    return Ok(ExportOutcome::Archive(archive));
                }
                Err(e) => warn!(error = %e, "bundling failed, emitting items individually"),
            },
            None => warn!("no archiver available, emitting items individually"),
        }

        let total = entries.len();
        let mut emitted = 0;
        let mut first_error = None;
        for (i, entry) in entries.iter().enumerate() {
            if i > 0 && !self.stagger.is_zero() {
                tokio::time::sleep(self.stagger).await;
            }
            match sink.emit(entry) {
                Ok(()) => emitted += 1,
                Err(e) => {
                    warn!(name = %entry.name, error = %e, "failed to emit item");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            None => Ok(ExportOutcome::Individual { emitted }),
            Some(source) => Err(ExportError::Fallback {
                emitted,
                total,
                source: Box::new(source),
            }),
        }
    }
}

/// Write an archive to `path`, creating parent directories.
pub fn write_archive(archive: &Archive, path: &Path) -> Result<(), ExportError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, &archive.bytes)?;
    Ok(())
}
