use crate::backend::{DecodedImage, ImageCodec};
use crate::jpeg;
use chrono::DateTime;
use lora_core::{ImageId, LinkError, LinkResult};
use log::debug;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Writes received JPEG streams as-is under an output directory.
pub struct JpegFileStore {
    root: PathBuf,
}

impl JpegFileStore {
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        fs::create_dir_all(path.as_ref())?;
        Ok(Self { root: path.as_ref().to_path_buf() })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn get_path(&self, image_id: &ImageId, completed_at: f64) -> PathBuf {
        self.root.join(file_name(image_id, completed_at))
    }
}

/// `<id>_<YYYYMMDD_HHMMSS>.jpg`, UTC. Characters unsafe in a path become '_'.
pub fn file_name(image_id: &ImageId, completed_at: f64) -> String {
    let stem: String = image_id
        .as_str()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let stamp = DateTime::from_timestamp(completed_at.floor() as i64, 0)
        .map(|t| t.format("%Y%m%d_%H%M%S").to_string())
        .unwrap_or_else(|| "00000000_000000".to_string());
    format!("{}_{}.jpg", stem, stamp)
}

impl ImageCodec for JpegFileStore {
    fn decode(&self, data: &[u8]) -> LinkResult<DecodedImage> {
        let (width, height) = jpeg::frame_size(data).map_err(|e| LinkError::ReconstructionFailed(e.to_string()))?;
        Ok(DecodedImage { bytes: data.to_vec(), width, height })
    }

    fn save(&mut self, image: &DecodedImage, image_id: &ImageId, completed_at: f64) -> LinkResult<PathBuf> {
        let path = self.get_path(image_id, completed_at);
        let tmp_path = path.with_extension("tmp");

        // 1. Write .tmp
        {
            let mut file = OpenOptions::new()
                .write(true).create(true).truncate(true)
                .open(&tmp_path)?;
            file.write_all(&image.bytes)?;
            // 2. FSYNC
            file.sync_all()?;
        }

        // 3. Rename (Atomic)
        fs::rename(&tmp_path, &path)?;

        // 4. Sync Parent Dir
        if let Ok(f) = File::open(&self.root) { let _ = f.sync_all(); }

        debug!("Stored {} bytes at {}", image.bytes.len(), path.display());
        Ok(path)
    }
}
