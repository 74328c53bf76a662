// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Blob assembly for tests.

use cfgdata_areas::{
    BlobHeader, RecordHeader, RecordKind, ReferData, ARRAY_HEADER_SIZE, BLOB_HEADER_SIZE,
};
use packed_struct::PackedStruct;

/// Items used by array tests: id in byte 0, skip flag in bit 15, 16 bits of
/// data in bytes 2..4.
pub const ITEM_SKIP_BIT: u8 = 15;

pub fn array_item(id: u8, data: u16) -> [u8; 4] {
    let data = data.to_le_bytes();
    [id, 0, data[0], data[1]]
}

pub fn array_payload(bitmap: &[u8], items: &[[u8; 4]]) -> Vec<u8> {
    let mut payload = vec![
        (ARRAY_HEADER_SIZE + bitmap.len()) as u8,
        0,
        4,
        items.len() as u8,
        0,
        8,
        ITEM_SKIP_BIT,
        0,
    ];
    payload.extend_from_slice(bitmap);
    for item in items {
        payload.extend_from_slice(item);
    }
    payload
}

/// Encodes one record, padding the payload to a whole number of words.
pub fn record_bytes(tag: u16, kind: RecordKind, conditions: &[u32], payload: &[u8]) -> Vec<u8> {
    let padded = (payload.len() + 3) & !3;
    let mut header = RecordHeader(0);
    header.set_tag(tag);
    header.set_flags(kind as u8);
    header.set_condition_count(conditions.len() as u8);
    header.set_length(((4 + conditions.len() * 4 + padded) / 4) as u16);

    let mut bytes = header.to_le_bytes().to_vec();
    for c in conditions {
        bytes.extend_from_slice(&c.to_le_bytes());
    }
    bytes.extend_from_slice(payload);
    bytes.resize(bytes.len() + padded - payload.len(), 0);
    bytes
}

pub struct BlobBuilder {
    records: Vec<u8>,
    internal_at: Option<usize>,
    capacity: usize,
}

/// A blob meant to be merged into another one.
pub fn patch() -> BlobBuilder {
    BlobBuilder::new()
}

impl BlobBuilder {
    pub fn new() -> BlobBuilder {
        BlobBuilder {
            records: Vec::new(),
            internal_at: None,
            capacity: 0,
        }
    }

    pub fn plain(mut self, tag: u16, conditions: &[u32], payload: &[u8]) -> Self {
        self.records
            .extend(record_bytes(tag, RecordKind::Plain, conditions, payload));
        self
    }

    pub fn array(mut self, tag: u16, conditions: &[u32], payload: &[u8]) -> Self {
        self.records
            .extend(record_bytes(tag, RecordKind::Array, conditions, payload));
        self
    }

    pub fn refer(
        mut self,
        tag: u16,
        conditions: &[u32],
        platform_id: u16,
        target: u16,
        internal: bool,
    ) -> Self {
        let mut refer = ReferData(0);
        refer.set_platform_id(platform_id);
        refer.set_tag(target);
        refer.set_is_internal(internal);
        self.records.extend(record_bytes(
            tag,
            RecordKind::Refer,
            conditions,
            &refer.0.to_le_bytes(),
        ));
        self
    }

    /// Records added from here on form the internal/default run.
    pub fn internal_here(mut self) -> Self {
        self.internal_at = Some(self.records.len());
        self
    }

    /// Total length of the blob; never less than what the records need.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let used = BLOB_HEADER_SIZE + self.records.len();
        let total = used.max(self.capacity);

        let mut header = BlobHeader::new(total as u32);
        header.used_length = used as u32;
        if let Some(at) = self.internal_at {
            header.internal_data_offset = ((BLOB_HEADER_SIZE + at) / 4) as u16;
        }

        let mut bytes = header.pack().unwrap().to_vec();
        bytes.extend_from_slice(&self.records);
        bytes.resize(total, 0);
        bytes
    }
}
