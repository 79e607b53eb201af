//! Import bundle traversal.
//!
//! A bundle is either a bare OPML document or a zip archive holding a
//! `subscriptions.xml` and/or a `starred.json`. [`BundleReader`] walks the
//! bundle forward once and yields each recognised member; zip members are
//! copied into their own temporary file, removed when the member is dropped.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use thiserror::Error;
use zip::ZipArchive;

/// Entry name suffix of the subscription list inside a zip bundle.
pub const SUBSCRIPTIONS_FILE: &str = "subscriptions.xml";
/// Entry name suffix of the starred-items export inside a zip bundle.
pub const STARRED_FILE: &str = "starred.json";

/// Largest uncompressed member copied out of an archive (256 MiB).
const MAX_MEMBER_BYTES: u64 = 256 * 1024 * 1024;

/// Local file header, empty archive and spanned archive signatures.
const ZIP_SIGNATURES: [[u8; 4]; 3] = [
    [b'P', b'K', 0x03, 0x04],
    [b'P', b'K', 0x05, 0x06],
    [b'P', b'K', 0x07, 0x08],
];

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Failed to read import bundle: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Archive entry {name} exceeds {limit} bytes")]
    MemberTooLarge { name: String, limit: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleKind {
    Opml,
    Zip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Subscriptions,
    Starred,
}

impl MemberKind {
    fn from_entry_name(name: &str) -> Option<Self> {
        if name.ends_with(SUBSCRIPTIONS_FILE) {
            Some(MemberKind::Subscriptions)
        } else if name.ends_with(STARRED_FILE) {
            Some(MemberKind::Starred)
        } else {
            None
        }
    }
}

/// Detect the bundle type from its first bytes. Anything that is not a zip
/// is read as OPML.
pub fn sniff_bundle_kind(path: &Path) -> Result<BundleKind, ArchiveError> {
    let mut magic = [0u8; 4];
    let mut file = File::open(path)?;
    let mut filled = 0;
    while filled < magic.len() {
        match file.read(&mut magic[filled..])? {
            0 => break,
            n => filled += n,
        }
    }

    if filled == magic.len() && ZIP_SIGNATURES.contains(&magic) {
        Ok(BundleKind::Zip)
    } else {
        Ok(BundleKind::Opml)
    }
}

/// One recognised file of a bundle, readable at [`BundleMember::path`].
#[derive(Debug)]
pub struct BundleMember {
    kind: MemberKind,
    entry_name: String,
    path: PathBuf,
    /// Set for members copied out of an archive.
    temp: Option<TempPath>,
}

impl BundleMember {
    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    pub fn entry_name(&self) -> &str {
        &self.entry_name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BundleMember {
    fn drop(&mut self) {
        if let Some(temp) = self.temp.take() {
            if let Err(e) = temp.close() {
                tracing::debug!(
                    entry = %self.entry_name,
                    error = %e,
                    "Failed to remove extracted archive member"
                );
            }
        }
    }
}

enum Source {
    Opml { path: PathBuf, done: bool },
    Zip {
        archive: ZipArchive<BufReader<File>>,
        next_index: usize,
    },
}

/// Forward-only reader over the members of an import bundle.
///
/// Blocking: zip decompression and temp-file copies happen on the calling
/// thread, so async callers run it under `spawn_blocking`.
pub struct BundleReader {
    source: Source,
    temp_dir: Option<PathBuf>,
}

impl BundleReader {
    /// Open a bundle, sniffing its type. Temporary member files are created
    /// in `temp_dir`, or the system temp directory when `None`.
    pub fn open(path: &Path, temp_dir: Option<&Path>) -> Result<Self, ArchiveError> {
        let source = match sniff_bundle_kind(path)? {
            BundleKind::Opml => Source::Opml {
                path: path.to_path_buf(),
                done: false,
            },
            BundleKind::Zip => Source::Zip {
                archive: ZipArchive::new(BufReader::new(File::open(path)?))?,
                next_index: 0,
            },
        };
        Ok(Self {
            source,
            temp_dir: temp_dir.map(Path::to_path_buf),
        })
    }

    pub fn kind(&self) -> BundleKind {
        match self.source {
            Source::Opml { .. } => BundleKind::Opml,
            Source::Zip { .. } => BundleKind::Zip,
        }
    }

    /// Next recognised member in archive order, or `None` at the end.
    ///
    /// Entries whose names match neither member file are skipped without
    /// being decompressed.
    pub fn next_member(&mut self) -> Result<Option<BundleMember>, ArchiveError> {
        match &mut self.source {
            Source::Opml { path, done } => {
                if *done {
                    return Ok(None);
                }
                *done = true;
                Ok(Some(BundleMember {
                    kind: MemberKind::Subscriptions,
                    entry_name: path.display().to_string(),
                    path: path.clone(),
                    temp: None,
                }))
            }
            Source::Zip {
                archive,
                next_index,
            } => {
                while *next_index < archive.len() {
                    let index = *next_index;
                    *next_index += 1;

                    // Unrelated entries are never opened
                    let Some(name) = archive.name_for_index(index).map(str::to_owned) else {
                        continue;
                    };
                    let Some(kind) = MemberKind::from_entry_name(&name) else {
                        tracing::debug!(entry = %name, "Skipping unrelated archive entry");
                        continue;
                    };

                    let mut entry = archive.by_index(index)?;
                    let temp = extract_to_temp(&mut entry, &name, self.temp_dir.as_deref())?;
                    tracing::debug!(entry = %name, ?kind, "Extracted archive member");
                    return Ok(Some(BundleMember {
                        kind,
                        entry_name: name,
                        path: temp.to_path_buf(),
                        temp: Some(temp),
                    }));
                }
                Ok(None)
            }
        }
    }
}

fn extract_to_temp<R: Read>(
    entry: &mut R,
    name: &str,
    temp_dir: Option<&Path>,
) -> Result<TempPath, ArchiveError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("import-member-");
    let mut file = match temp_dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };

    let copied = std::io::copy(&mut entry.take(MAX_MEMBER_BYTES + 1), &mut file)?;
    if copied > MAX_MEMBER_BYTES {
        return Err(ArchiveError::MemberTooLarge {
            name: name.to_string(),
            limit: MAX_MEMBER_BYTES,
        });
    }
    Ok(file.into_temp_path())
}
