use async_trait::async_trait;
use tokio::fs::File;

use super::{ArchiveSource, Fetch};
use crate::error::FetchError;

/// Opens archives from the local filesystem as forward-only streams
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFetcher;

#[async_trait]
impl Fetch for LocalFetcher {
    async fn open(&self, path: &str) -> Result<ArchiveSource, FetchError> {
        let io_err = |source| FetchError::Io {
            origin: path.to_string(),
            source,
        };

        let file = File::open(path).await.map_err(io_err)?;
        let size = file.metadata().await.map_err(io_err)?.len();

        Ok(ArchiveSource::new(path, file).with_content_length(Some(size)))
    }
}
