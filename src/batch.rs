//! Batch accounting and NDJSON assembly.

use bytes::{BufMut, Bytes, BytesMut};

/// Encoded size a record contributes to a batch: payload plus the newline the
/// encoder appends. Counting the separator up front keeps the byte predictor
/// conservative with respect to the final payload.
pub(crate) fn record_cost(record: &Bytes) -> usize {
    record.len() + 1
}

/// An in-progress batch: records in insertion order plus a running encoded
/// byte total.
#[derive(Debug, Default)]
pub(crate) struct Batch {
    records: Vec<Bytes>,
    bytes: usize,
}

impl Batch {
    pub fn with_capacity(records: usize) -> Self {
        Self {
            records: Vec::with_capacity(records),
            bytes: 0,
        }
    }

    pub fn push(&mut self, record: Bytes) {
        self.bytes += record_cost(&record);
        self.records.push(record);
    }

    /// Whether `record` can join without overflowing `max_bytes`.
    pub fn fits(&self, record: &Bytes, max_bytes: usize) -> bool {
        self.bytes + record_cost(record) <= max_bytes
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.bytes = 0;
    }

    /// Concatenate `record || '\n'` per record. Total; the buffer is
    /// pre-sized from the running byte total, so no reallocation occurs.
    pub fn encode_ndjson(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.bytes);
        for record in &self.records {
            buf.extend_from_slice(record);
            buf.put_u8(b'\n');
        }
        buf.freeze()
    }
}
