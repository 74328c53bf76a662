// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fixed-slot array payloads and their merge.
//!
//! The merge only ever rewrites slots of the base table. Every platform's
//! base table must therefore already hold a slot for every item id any
//! override will carry; override items without a matching slot are dropped.

use crate::bits::{bit_is_set, extract_item_id, write_bit};
use crate::Error;
use cfgdata_areas::{ArrayHeader, ARRAY_HEADER_SIZE, ARRAY_MERGED_MARKER};
use log::{debug, trace};
use packed_struct::PackedStructSlice;
use std::ops::Range;

/// Decoded shape of an array payload
#[derive(Clone, Debug)]
pub struct ArrayLayout {
    pub header: ArrayHeader,
    /// Position of the slot bitmap within the payload
    pub bitmap: Range<usize>,
    /// Position of the first item within the payload
    pub items_start: usize,
}

impl ArrayLayout {
    pub fn parse(tag: u16, payload: &[u8]) -> Result<ArrayLayout, Error> {
        let shape = |reason| Error::ArrayShape { tag, reason };

        if payload.len() < ARRAY_HEADER_SIZE {
            return Err(shape("shorter than the array header"));
        }
        let header = ArrayHeader::unpack_from_slice(&payload[..ARRAY_HEADER_SIZE])?;
        let bitmap_len = payload
            .len()
            .checked_sub(ARRAY_HEADER_SIZE + header.items_length())
            .ok_or_else(|| shape("items run past the end of the record"))?;
        if usize::from(header.header_size) != ARRAY_HEADER_SIZE + bitmap_len {
            return Err(shape("header size disagrees with the bitmap length"));
        }
        if bitmap_len * 8 < usize::from(header.item_count) {
            return Err(shape("bitmap has fewer bits than there are slots"));
        }
        let item_bits = usize::from(header.item_size) * 8;
        if usize::from(header.skip_bit_offset) >= item_bits {
            return Err(shape("skip bit lies outside the item"));
        }
        if usize::from(header.id_bit_offset) >= item_bits {
            return Err(shape("item id lies outside the item"));
        }
        if usize::from(header.id_bit_offset % 8) + usize::from(header.id_bit_width) > 32 {
            return Err(shape("item id field is wider than a word"));
        }

        Ok(ArrayLayout {
            bitmap: ARRAY_HEADER_SIZE..ARRAY_HEADER_SIZE + bitmap_len,
            items_start: ARRAY_HEADER_SIZE + bitmap_len,
            header,
        })
    }

    pub fn item_count(&self) -> usize {
        usize::from(self.header.item_count)
    }

    pub fn item_range(&self, index: usize) -> Range<usize> {
        let size = usize::from(self.header.item_size);
        let start = self.items_start + index * size;
        start..start + size
    }

    pub fn item_id(&self, item: &[u8]) -> u32 {
        extract_item_id(self.header.id_bit_offset, self.header.id_bit_width, item)
    }
}

/// Merges the override array `ovr` into the base array `base` in place.
pub fn merge(tag: u16, base: &mut [u8], ovr: &[u8]) -> Result<(), Error> {
    let mut base_layout = ArrayLayout::parse(tag, base)?;
    let ovr_layout = ArrayLayout::parse(tag, ovr)?;
    if base_layout.header.item_size != ovr_layout.header.item_size {
        return Err(Error::ArrayItemSizeMismatch {
            tag,
            expected: base_layout.header.item_size,
            found: ovr_layout.header.item_size,
        });
    }

    // The override's bitmap says which slots it vouches for.
    let copy = base_layout.bitmap.len().min(ovr_layout.bitmap.len());
    base[base_layout.bitmap.start..][..copy]
        .copy_from_slice(&ovr[ovr_layout.bitmap.start..][..copy]);
    base_layout.header.marker = ARRAY_MERGED_MARKER;
    base_layout
        .header
        .pack_to_slice(&mut base[..ARRAY_HEADER_SIZE])?;

    let skip_bit = usize::from(base_layout.header.skip_bit_offset);
    for slot in 0..base_layout.item_count() {
        if !bit_is_set(&base[base_layout.bitmap.clone()], slot) {
            write_bit(&mut base[base_layout.item_range(slot)], skip_bit, true);
        }
    }

    for index in 0..ovr_layout.item_count() {
        let item = &ovr[ovr_layout.item_range(index)];
        let id = ovr_layout.item_id(item);
        let slot = (0..base_layout.item_count())
            .find(|&slot| base_layout.item_id(&base[base_layout.item_range(slot)]) == id);
        match slot {
            Some(slot) => {
                trace!("tag {tag:#05x}: item {id:#x} replaces slot {slot}");
                write_bit(&mut base[base_layout.bitmap.clone()], slot, true);
                base[base_layout.item_range(slot)].copy_from_slice(item);
            }
            None => debug!("tag {tag:#05x}: item {id:#x} has no base slot, dropped"),
        }
    }
    Ok(())
}
