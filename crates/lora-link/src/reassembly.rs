use std::collections::BTreeMap;

use log::{info, warn};
use lora_core::ImageId;
use lora_store::ImageCodec;

use crate::session::Reconstruction;

/// Turns a complete fragment map back into an image via the codec.
pub struct Reassembler {
    codec: Box<dyn ImageCodec>,
}

impl Reassembler {
    pub fn new(codec: Box<dyn ImageCodec>) -> Self {
        Self { codec }
    }

    /// Payloads concatenated in ascending index order.
    /// Arrival order does not matter.
    pub fn concat(fragments: &BTreeMap<u16, Vec<u8>>) -> Vec<u8> {
        let len = fragments.values().map(Vec::len).sum();
        let mut out = Vec::with_capacity(len);
        for payload in fragments.values() {
            out.extend_from_slice(payload);
        }
        out
    }

    /// Codec errors end here as `Reconstruction::Failed`.
    pub fn reconstruct(
        &mut self,
        image_id: &ImageId,
        fragments: &BTreeMap<u16, Vec<u8>>,
        completed_at: f64,
    ) -> Reconstruction {
        let data = Self::concat(fragments);

        let image = match self.codec.decode(&data) {
            Ok(image) => image,
            Err(e) => {
                warn!("Failed to reconstruct '{}' ({} bytes): {}", image_id, data.len(), e);
                return Reconstruction::Failed(e.to_string());
            }
        };

        match self.codec.save(&image, image_id, completed_at) {
            Ok(path) => {
                info!("Image '{}' saved to {} ({}x{} pixels)", image_id, path.display(), image.width, image.height);
                Reconstruction::Saved { path, width: image.width, height: image.height }
            }
            Err(e) => {
                warn!("Failed to store '{}': {}", image_id, e);
                Reconstruction::Failed(e.to_string())
            }
        }
    }
}
