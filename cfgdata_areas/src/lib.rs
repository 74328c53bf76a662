// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! On-media layout of a platform configuration blob.
//!
//! A blob is a [`BlobHeader`] followed by back-to-back records. Every record
//! starts with a [`RecordHeader`], carries `condition_count` 32-bit platform
//! masks, and ends with a payload whose shape is selected by the record kind.
//! All multi-byte quantities are little-endian.

use bitfield::bitfield;
use packed_struct::prelude::*;
use serde::{Deserialize, Serialize};

/// Marker at the start of every blob
pub const BLOB_SIGNATURE: [u8; 4] = *b"CFGD";

/// Size of [`BlobHeader`] as packed
pub const BLOB_HEADER_SIZE: usize = 16;

/// Size of [`RecordHeader`]; also the record length granule
pub const RECORD_HEADER_SIZE: usize = 4;

/// Size of a single condition entry
pub const CONDITION_SIZE: usize = 4;

/// Size of the indirection payload
pub const REFER_SIZE: usize = 4;

/// Size of the fixed part of an array payload, before the bitmap
pub const ARRAY_HEADER_SIZE: usize = 8;

/// Tag of the record that carries the platform identity. This record always
/// applies and its payload starts with the 16-bit platform id.
pub const PLATFORM_ID_TAG: u16 = 0x0F0;

/// Platform whose records form the default run of a partitioned blob
pub const DEFAULT_PLATFORM_ID: u16 = 0;

/// Condition value that applies to every platform
pub const ALL_PLATFORMS: u32 = 0xFFFF_FFFF;

/// Value written to [`ArrayHeader::marker`] once an array has been merged
pub const ARRAY_MERGED_MARKER: u8 = 0x80;

/// Returns the single-bit condition mask of a platform id. Ids that do not fit
/// in a 32-bit mask match nothing.
pub fn platform_mask(platform_id: u16) -> u32 {
    1u32.checked_shl(u32::from(platform_id)).unwrap_or(0)
}

#[derive(Clone, Debug, PackedStruct, PartialEq, Eq)]
#[repr(C)]
#[packed_struct(size_bytes = "16", bit_numbering = "msb0", endian = "msb")]
pub struct BlobHeader {
    pub signature: [u8; 4],
    /// Byte offset of the first record
    pub header_length: u8,
    pub attribute: u8,
    /// Start of the built-in/default record run in 4-byte units, 0 when the
    /// blob has not been partitioned
    #[packed_field(endian = "lsb")]
    pub internal_data_offset: u16,
    #[packed_field(endian = "lsb")]
    pub used_length: u32,
    #[packed_field(endian = "lsb")]
    pub total_length: u32,
}

impl BlobHeader {
    pub fn new(total_length: u32) -> BlobHeader {
        BlobHeader {
            signature: BLOB_SIGNATURE,
            header_length: BLOB_HEADER_SIZE as u8,
            attribute: 0,
            internal_data_offset: 0,
            used_length: BLOB_HEADER_SIZE as u32,
            total_length,
        }
    }

    /// Byte offset of the internal/default run, if the blob is partitioned
    pub fn internal_start(&self) -> Option<usize> {
        match self.internal_data_offset {
            0 => None,
            n => Some(usize::from(n) * 4),
        }
    }
}

/// Selects where a tag lookup starts scanning
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Region {
    /// Every record, patches first
    #[default]
    General,
    /// Only the built-in/default run
    Internal,
}

#[derive(PrimitiveEnum, Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordKind {
    Plain = 0x0,
    Array = 0x1,
    Refer = 0x2,
}

/// Low bits of [`RecordHeader::flags`] that select the payload kind
pub const RECORD_KIND_MASK: u8 = 0x3;

bitfield! {
    /// Stored as a little-endian `u32` in front of every record.
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct RecordHeader(u32);
    impl Debug;
    pub u8, condition_count, set_condition_count: 1, 0;
    /// Total record length in 4-byte units
    pub u16, length, set_length: 11, 2;
    pub u8, flags, set_flags: 15, 12;
    pub u8, version, set_version: 19, 16;
    pub u16, tag, set_tag: 31, 20;
}

impl RecordHeader {
    pub fn from_le_bytes(bytes: [u8; RECORD_HEADER_SIZE]) -> RecordHeader {
        RecordHeader(u32::from_le_bytes(bytes))
    }

    pub fn to_le_bytes(self) -> [u8; RECORD_HEADER_SIZE] {
        self.0.to_le_bytes()
    }

    /// Record length in bytes
    pub fn byte_length(&self) -> usize {
        usize::from(self.length()) * 4
    }

    /// Bytes taken by the header and its conditions
    pub fn prefix_length(&self) -> usize {
        RECORD_HEADER_SIZE + usize::from(self.condition_count()) * CONDITION_SIZE
    }

    /// Flag value 3 is not assigned and reads as plain data.
    pub fn kind(&self) -> RecordKind {
        RecordKind::from_primitive(self.flags() & RECORD_KIND_MASK).unwrap_or(RecordKind::Plain)
    }
}

bitfield! {
    /// Payload of an indirection record: resolve `tag` for `platform_id`
    /// instead.
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct ReferData(u32);
    impl Debug;
    pub u16, platform_id, set_platform_id: 15, 0;
    pub u16, tag, set_tag: 27, 16;
    pub is_internal, set_is_internal: 28;
}

impl ReferData {
    pub fn from_le_bytes(bytes: [u8; REFER_SIZE]) -> ReferData {
        ReferData(u32::from_le_bytes(bytes))
    }

    pub fn region(&self) -> Region {
        if self.is_internal() {
            Region::Internal
        } else {
            Region::General
        }
    }
}

/// Fixed head of an array payload. The slot bitmap follows it directly and
/// the `item_count` items of `item_size` bytes follow the bitmap.
#[derive(Clone, Debug, PackedStruct, PartialEq, Eq)]
#[repr(C)]
#[packed_struct(size_bytes = "8", bit_numbering = "msb0", endian = "msb")]
pub struct ArrayHeader {
    /// Fixed head plus bitmap, in bytes
    pub header_size: u8,
    /// Set to [`ARRAY_MERGED_MARKER`] once merged
    pub marker: u8,
    pub item_size: u8,
    pub item_count: u8,
    /// Bit position of the item id inside an item
    pub id_bit_offset: u8,
    pub id_bit_width: u8,
    /// Bit that marks an item as skipped
    pub skip_bit_offset: u8,
    pub reserved: u8,
}

impl ArrayHeader {
    /// Bytes taken by all item slots
    pub fn items_length(&self) -> usize {
        usize::from(self.item_size) * usize::from(self.item_count)
    }
}
