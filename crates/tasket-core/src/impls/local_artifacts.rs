//! LocalArtifactStore - ローカルディレクトリにタスクログを書き出す
//!
//! ファイル名は `task-<id>.log`。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::domain::TaskId;
use crate::ports::{ArtifactError, ArtifactStore};

#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    dir: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: TaskId) -> PathBuf {
        self.dir.join(format!("task-{id}.log"))
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn append(&self, id: TaskId, text: &str) -> Result<(), ArtifactError> {
        fs::create_dir_all(&self.dir).await?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(id))
            .await?;
        file.write_all(text.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn remove(&self, id: TaskId) -> Result<(), ArtifactError> {
        match fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
