use std::path::PathBuf;
use lora_core::{ImageId, LinkResult};

/// A byte stream the codec accepted as an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Abstract image codec and sink for reassembled streams.
pub trait ImageCodec: Send {
    /// Fails with `ReconstructionFailed` if the stream is not a decodable image.
    fn decode(&self, data: &[u8]) -> LinkResult<DecodedImage>;

    /// Persist under a name derived from the id and completion time
    /// (seconds since the Unix epoch). Returns the written path.
    fn save(&mut self, image: &DecodedImage, image_id: &ImageId, completed_at: f64) -> LinkResult<PathBuf>;
}
