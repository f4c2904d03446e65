use bytes::{
    BufMut,
    BytesMut,
};

/// In-memory batch of CSV lines awaiting a disk flush, together with the
/// timestamp bounds seen since the last reset. `min_ts <= max_ts` whenever
/// the block is non-empty.
#[derive(Default)]
pub struct Block {
    buffer: BytesMut,
    min_ts: i64,
    max_ts: i64,
}

impl Block {
    pub fn add_bytes(&mut self, ts: i64, line: &[u8]) {
        if self.buffer.is_empty() {
            self.min_ts = ts;
            self.max_ts = ts;
        } else {
            self.min_ts = self.min_ts.min(ts);
            self.max_ts = self.max_ts.max(ts);
        }
        self.buffer.put_slice(line);
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.min_ts = 0;
        self.max_ts = 0;
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn min_ts(&self) -> i64 {
        self.min_ts
    }

    pub fn max_ts(&self) -> i64 {
        self.max_ts
    }
}
