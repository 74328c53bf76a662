// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::Error;
use byteorder::{ByteOrder, LittleEndian};
use cfgdata_areas::{
    RecordHeader, RecordKind, ReferData, CONDITION_SIZE, RECORD_HEADER_SIZE, REFER_SIZE,
};
use serde::Serialize;

/// One record inside a blob, borrowed from the blob's bytes.
#[derive(Copy, Clone, Debug)]
pub struct Record<'a> {
    offset: usize,
    header: RecordHeader,
    bytes: &'a [u8],
}

/// Reads the record starting at `offset`, refusing anything that would
/// reach past `end`.
pub fn record_at(bytes: &[u8], offset: usize, end: usize) -> Result<Record<'_>, Error> {
    let end = end.min(bytes.len());
    let out_of_bounds = Error::RecordOutOfBounds { offset, used: end };

    let header_end = offset
        .checked_add(RECORD_HEADER_SIZE)
        .filter(|&e| e <= end)
        .ok_or(Error::RecordOutOfBounds { offset, used: end })?;
    let mut raw = [0u8; RECORD_HEADER_SIZE];
    raw.copy_from_slice(&bytes[offset..header_end]);
    let header = RecordHeader::from_le_bytes(raw);

    let length = header.byte_length();
    if length == 0 {
        return Err(Error::EmptyRecord { offset });
    }
    if length < header.prefix_length() || offset + length > end {
        return Err(out_of_bounds);
    }

    Ok(Record {
        offset,
        header,
        bytes: &bytes[offset..offset + length],
    })
}

impl<'a> Record<'a> {
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn header(&self) -> RecordHeader {
        self.header
    }

    pub fn tag(&self) -> u16 {
        self.header.tag()
    }

    pub fn kind(&self) -> RecordKind {
        self.header.kind()
    }

    /// Total length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Offset of the next record
    pub fn end(&self) -> usize {
        self.offset + self.len()
    }

    /// Absolute offset of the payload within the blob
    pub fn payload_offset(&self) -> usize {
        self.offset + self.header.prefix_length()
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.bytes[self.header.prefix_length()..]
    }

    pub fn conditions(&self) -> impl Iterator<Item = u32> + 'a {
        self.bytes[RECORD_HEADER_SIZE..self.header.prefix_length()]
            .chunks_exact(CONDITION_SIZE)
            .map(LittleEndian::read_u32)
    }

    pub fn first_condition(&self) -> Option<u32> {
        self.conditions().next()
    }

    /// True if any condition intersects `mask`.
    pub fn applies_to(&self, mask: u32) -> bool {
        self.conditions().any(|c| c & mask != 0)
    }

    /// Decodes the payload of an indirection record.
    pub fn refer(&self) -> Result<ReferData, Error> {
        let payload = self.payload();
        if payload.len() < REFER_SIZE {
            return Err(Error::PayloadMismatch {
                tag: self.tag(),
                expected: REFER_SIZE,
                found: payload.len(),
            });
        }
        Ok(ReferData(LittleEndian::read_u32(payload)))
    }
}

/// Walks consecutive records. A malformed record is reported once and ends
/// the walk.
pub struct Records<'a> {
    bytes: &'a [u8],
    offset: usize,
    end: usize,
    failed: bool,
}

impl<'a> Records<'a> {
    pub fn new(bytes: &'a [u8], start: usize, end: usize) -> Records<'a> {
        Records {
            bytes,
            offset: start,
            end,
            failed: false,
        }
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<Record<'a>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.end {
            return None;
        }
        match record_at(self.bytes, self.offset, self.end) {
            Ok(record) => {
                self.offset = record.end();
                Some(Ok(record))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Printable description of a record, for listings.
#[derive(Clone, Debug, Serialize)]
pub struct RecordSummary {
    pub offset: usize,
    pub tag: u16,
    pub kind: RecordKind,
    pub version: u8,
    pub length: usize,
    pub conditions: Vec<u32>,
    pub payload: String,
}

impl From<&Record<'_>> for RecordSummary {
    fn from(record: &Record<'_>) -> RecordSummary {
        RecordSummary {
            offset: record.offset(),
            tag: record.tag(),
            kind: record.kind(),
            version: record.header().version(),
            length: record.len(),
            conditions: record.conditions().collect(),
            payload: hex::encode(record.payload()),
        }
    }
}
