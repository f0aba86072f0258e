//! Where served bytes come from

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

/// Supplies the complete contents of a requested file
pub trait FileSource: Send + 'static {
    fn load(&self, filename: &str) -> impl Future<Output = io::Result<Vec<u8>>> + Send;
}

/// Serves from the filesystem
///
/// A regular file is served whatever name is requested. A directory serves
/// the requested name inside it and refuses names that resolve outside it.
#[derive(Debug, Clone)]
pub struct FsSource {
    path: PathBuf,
}

impl FsSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn resolve(&self, filename: &str) -> io::Result<PathBuf> {
        let metadata = tokio::fs::metadata(&self.path).await?;
        if !metadata.is_dir() {
            return Ok(self.path.clone());
        }

        let root = tokio::fs::canonicalize(&self.path).await?;
        let requested = tokio::fs::canonicalize(root.join(filename)).await?;
        if !requested.starts_with(&root) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{filename} is outside {}", root.display()),
            ));
        }
        Ok(requested)
    }
}

impl FileSource for FsSource {
    async fn load(&self, filename: &str) -> io::Result<Vec<u8>> {
        let path = self.resolve(filename).await?;
        log::debug!("Reading {}", path.display());
        tokio::fs::read(&path).await
    }
}

/// Serves the same bytes for every request
impl FileSource for Vec<u8> {
    async fn load(&self, _filename: &str) -> io::Result<Vec<u8>> {
        Ok(self.clone())
    }
}
