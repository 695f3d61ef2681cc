use lora_core::{LinkConfig, LinkError, LinkResult};

/// One indexed chunk of an image byte stream. The index never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub index: usize,
    pub payload: Vec<u8>,
}

/// Splits a buffer into chunks of `max_payload - fragment_overhead` bytes.
#[derive(Debug, Clone, Copy)]
pub struct Fragmenter {
    chunk_size: usize,
    max_fragments: usize,
}

impl Fragmenter {
    pub fn new(config: &LinkConfig) -> LinkResult<Self> {
        Ok(Self { chunk_size: config.chunk_size()?, max_fragments: config.max_fragments })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn fragment_count(&self, len: usize) -> usize {
        len.div_ceil(self.chunk_size)
    }

    /// Fails with `SessionTooLarge` before producing anything if the ceiling is exceeded.
    pub fn split(&self, data: &[u8]) -> LinkResult<Vec<Fragment>> {
        let count = self.fragment_count(data.len());
        if count > self.max_fragments {
            return Err(LinkError::SessionTooLarge { fragments: count, ceiling: self.max_fragments });
        }

        Ok(data
            .chunks(self.chunk_size)
            .enumerate()
            .map(|(index, chunk)| Fragment { index, payload: chunk.to_vec() })
            .collect())
    }
}
