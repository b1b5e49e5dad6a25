/// A sub-range of one of the loading buffers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct BufferRange {
    pub offset: u64,
    pub size: u64,
}

impl BufferRange {
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    pub fn as_usize_range(&self) -> std::ops::Range<usize> {
        self.offset as usize..self.end() as usize
    }
}

/// Buffers are bound as raw views, which need word aligned offsets.
pub fn round_up_4(size: u64) -> u64 {
    (size + 3) & !3
}

/// Places `size` bytes at the current end of a buffer and grows `total` by the aligned size.
pub fn append_buffer_range(total: &mut u64, size: u64) -> BufferRange {
    let range = BufferRange { offset: *total, size };
    *total += round_up_4(size);
    range
}
