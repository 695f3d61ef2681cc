//! Codec and persistence boundary for reassembled image streams.
#![forbid(unsafe_code)]

pub mod backend;
pub mod fs_backend;
pub mod jpeg;

pub use backend::{DecodedImage, ImageCodec};
pub use fs_backend::JpegFileStore;
