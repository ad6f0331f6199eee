//! Pipeline cache

use super::{handle::Owned, Gpu};
use crate::{Error, Result};
use ash::vk;
#[allow(unused_imports)]
use log::{debug, error, info, log, trace, warn};
use std::{
    fs::{self, File},
    io::{self, Write},
    path::PathBuf,
    sync::Arc,
};

/// GPU pipeline cache
///
/// Compute pipelines are rebuilt every time the frame shape changes. This
/// cache avoids recompiling the kernel each time, and across runs when a
/// persistence path is provided.
pub(crate) struct PersistentPipelineCache {
    /// In-RAM cache
    cache: Owned<vk::PipelineCache>,

    /// Path to be used for on-disk persistence
    path: Option<PathBuf>,
}
//
impl PersistentPipelineCache {
    /// Attempt to load the pipeline cache from disk, otherwise create a new one
    pub fn new(gpu: &Arc<Gpu>, path: Option<PathBuf>) -> Result<Self> {
        let data = match path.as_deref().map(fs::read) {
            Some(Ok(data)) => {
                debug!("Loaded {} bytes of pipeline cache", data.len());
                data
            }
            Some(Err(e)) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Some(Err(e)) => {
                warn!("Failed to read pipeline cache, starting from scratch: {e}");
                Vec::new()
            }
            None => Vec::new(),
        };

        // The driver validates the header and ignores data from other devices,
        // but it may still reject a corrupted file outright
        let cache = match Self::create(gpu, &data) {
            Err(e) if !data.is_empty() => {
                warn!("Pipeline cache was rejected, starting from scratch: {e}");
                Self::create(gpu, &[])?
            }
            other => other?,
        };
        Ok(Self { cache, path })
    }

    /// Raw handle
    pub fn handle(&self) -> vk::PipelineCache {
        self.cache.handle()
    }

    /// Write the pipeline cache back to disk
    pub fn write(&self) -> io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        // SAFETY: Cache is valid
        let data = unsafe {
            self.cache
                .gpu()
                .raw
                .get_pipeline_cache_data(self.cache.handle())
                .map_err(io::Error::other)?
        };

        if let Some(dir) = path.parent() {
            if !dir.try_exists()? {
                fs::create_dir_all(dir)?;
            }
        }

        let wal_path = path.with_extension("wal");
        let mut file = File::create(&wal_path)?;
        match file.write_all(&data) {
            Ok(()) => fs::rename(wal_path, path),
            Err(e) => {
                fs::remove_file(wal_path)?;
                Err(e)
            }
        }
    }

    /// Create a pipeline cache with some initial data
    fn create(gpu: &Arc<Gpu>, data: &[u8]) -> Result<Owned<vk::PipelineCache>> {
        let create_info = vk::PipelineCacheCreateInfo::builder().initial_data(data);
        // SAFETY: Initial data is either empty or was produced by a driver
        unsafe {
            let cache = gpu
                .raw
                .create_pipeline_cache(&create_info, None)
                .map_err(Error::resource("vkCreatePipelineCache"))?;
            Ok(Owned::new(gpu, cache))
        }
    }
}
//
impl Drop for PersistentPipelineCache {
    fn drop(&mut self) {
        if let Err(e) = self.write() {
            error!("Failed to write pipeline cache to disk: {e}");
        }
    }
}
