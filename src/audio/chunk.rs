// ABOUTME: Decoded PCM chunk representation
// ABOUTME: A server timestamp plus an ordered, possibly fragmented byte chain

use bytes::Bytes;

/// A timestamp (server time, microseconds) plus an ordered chain of one or more contiguous byte
/// fragments whose concatenation is interleaved PCM. Fragmentation exists only because the
/// source platform's allocator may not yield one block large enough for the whole chunk; a `Vec`
/// of fragments already gives the iterative walk called for instead of a hand-rolled linked list.
#[derive(Debug, Clone)]
pub struct PcmChunk {
    pub timestamp_us: i64,
    pub fragments: Vec<Bytes>,
}

impl PcmChunk {
    pub fn single(timestamp_us: i64, data: Bytes) -> Self {
        Self {
            timestamp_us,
            fragments: vec![data],
        }
    }

    pub fn len(&self) -> usize {
        self.fragments.iter().map(|f| f.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Concatenate all fragments into one contiguous buffer. Used by tests and by the decoder
    /// when a single contiguous slice is more convenient than walking fragments.
    pub fn to_contiguous(&self) -> Bytes {
        if self.fragments.len() == 1 {
            return self.fragments[0].clone();
        }
        let mut out = Vec::with_capacity(self.len());
        for fragment in &self.fragments {
            out.extend_from_slice(fragment);
        }
        Bytes::from(out)
    }

    /// Split into fragments no larger than `max_fragment_len`, simulating a heap whose largest
    /// free block is smaller than the whole chunk. An iterative walk, not recursive.
    pub fn fragment(timestamp_us: i64, data: Bytes, max_fragment_len: usize) -> Self {
        assert!(max_fragment_len > 0, "fragment length must be positive");
        let mut fragments = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            let end = (offset + max_fragment_len).min(data.len());
            fragments.push(data.slice(offset..end));
            offset = end;
        }
        if fragments.is_empty() {
            fragments.push(Bytes::new());
        }
        Self {
            timestamp_us,
            fragments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_fragment_chunk_has_len_of_its_data() {
        let chunk = PcmChunk::single(0, Bytes::from_static(&[1, 2, 3, 4]));
        assert_eq!(chunk.len(), 4);
        assert_eq!(chunk.fragments.len(), 1);
    }

    #[test]
    fn fragmented_chain_concatenates_back_to_original() {
        let data = Bytes::from((0u8..16).collect::<Vec<u8>>());
        let chunk = PcmChunk::fragment(0, data.clone(), 4);
        assert_eq!(chunk.fragments.len(), 4);
        assert_eq!(chunk.to_contiguous(), data);
    }

    #[test]
    fn quarter_sized_block_yields_four_fragments() {
        let data = Bytes::from(vec![7u8; 100]);
        let chunk = PcmChunk::fragment(0, data.clone(), 25);
        assert_eq!(chunk.fragments.len(), 4);
        assert_eq!(chunk.to_contiguous(), data);
    }
}
