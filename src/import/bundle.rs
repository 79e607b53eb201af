use std::path::{Path, PathBuf};

use crate::archive::{ArchiveError, BundleMember, BundleReader};

/// Async adapter over [`BundleReader`]: every blocking step runs under
/// `spawn_blocking`.
pub struct BundleWalker {
    reader: Option<BundleReader>,
}

impl BundleWalker {
    pub async fn open(path: &Path, temp_dir: Option<&Path>) -> Result<Self, ArchiveError> {
        let path = path.to_path_buf();
        let temp_dir: Option<PathBuf> = temp_dir.map(Path::to_path_buf);
        let reader = tokio::task::spawn_blocking(move || {
            BundleReader::open(&path, temp_dir.as_deref())
        })
        .await
        .map_err(join_error)??;
        Ok(Self {
            reader: Some(reader),
        })
    }

    pub async fn next_member(&mut self) -> Result<Option<BundleMember>, ArchiveError> {
        let Some(mut reader) = self.reader.take() else {
            return Ok(None);
        };
        let (reader, member) = tokio::task::spawn_blocking(move || {
            let member = reader.next_member();
            (reader, member)
        })
        .await
        .map_err(join_error)?;

        let member = member?;
        if member.is_some() {
            self.reader = Some(reader);
        }
        Ok(member)
    }
}

fn join_error(e: tokio::task::JoinError) -> ArchiveError {
    ArchiveError::Io(std::io::Error::other(e))
}
