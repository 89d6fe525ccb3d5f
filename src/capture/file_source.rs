use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::{collections::VecDeque, path::PathBuf, sync::Mutex};

use super::ImageSource;

/// Image source backed by files on disk. Each `capture` consumes the oldest
/// queued path, so callers stage a path and then trigger the capture.
#[derive(Debug, Default)]
pub struct FileImageSource {
    queue: Mutex<VecDeque<PathBuf>>,
}

impl FileImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self, path: impl Into<PathBuf>) {
        let mut queue = match self.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        queue.push_back(path.into());
    }

    fn next_path(&self) -> Option<PathBuf> {
        let mut queue = match self.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        queue.pop_front()
    }
}

#[async_trait]
impl ImageSource for FileImageSource {
    async fn capture(&self) -> Result<Vec<u8>> {
        let path = self
            .next_path()
            .ok_or_else(|| anyhow!("no photo staged for capture"))?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read photo {}", path.display()))
    }
}
