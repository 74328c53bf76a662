// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Flattening a live blob into a blob for a single platform.
//!
//! The output starts as a copy of the default run, which acts as the
//! template: it fixes which tags exist and how large each payload is. Every
//! record of the template is then overwritten with whatever the live blob
//! resolves for the active platform.

use crate::{array, cursor, CfgBlob, Error, Platform};
use byteorder::{ByteOrder, LittleEndian};
use cfgdata_areas::{
    platform_mask, RecordKind, Region, ALL_PLATFORMS, BLOB_HEADER_SIZE, CONDITION_SIZE,
    DEFAULT_PLATFORM_ID, PLATFORM_ID_TAG, RECORD_HEADER_SIZE,
};
use log::{debug, trace};
use packed_struct::PackedStructSlice;
use std::ops::Range;

impl<B: AsRef<[u8]>> CfgBlob<B> {
    /// Locates the default run: the records from the start of the internal
    /// region (or of all records, if the blob is not partitioned) up to the
    /// first record whose first condition excludes the template platform.
    ///
    /// Only the first condition is looked at. Blobs are authored with the
    /// records of one platform partition kept together, which this relies on.
    pub fn default_run<P: Platform + ?Sized>(&self, platform: &P) -> Result<Range<usize>, Error> {
        let (start, mask) = match self.header().internal_start() {
            Some(start) => (start, platform_mask(DEFAULT_PLATFORM_ID)),
            None => (
                self.region_start(Region::General),
                platform_mask(platform.platform_id()),
            ),
        };

        let mut end = start;
        for record in self.records_from(start) {
            let record = record?;
            match record.first_condition() {
                Some(c) if c != 0 && c & mask == 0 => break,
                _ => end = record.end(),
            }
        }
        trace!("default run {start:#x}..{end:#x} (mask {mask:#x})");
        Ok(start..end)
    }

    /// Size in bytes of the blob [`CfgBlob::build`] would produce.
    pub fn estimate_built_size<P: Platform + ?Sized>(&self, platform: &P) -> Result<u32, Error> {
        let run = self.default_run(platform)?;
        Ok((run.len() + self.header_length()) as u32)
    }

    /// Builds a self-contained blob for `platform` into `out`, returning its
    /// length.
    ///
    /// On error `out` holds a partial result that must not be used.
    pub fn build<P: Platform + ?Sized>(&self, platform: &P, out: &mut [u8]) -> Result<usize, Error> {
        let run = self.default_run(platform)?;
        let header_length = self.header_length();
        let size = run.len() + header_length;
        if out.len() < size {
            return Err(Error::BufferTooSmall {
                needed: size,
                available: out.len(),
            });
        }

        let live = self.as_bytes();
        out[..header_length].copy_from_slice(&live[..header_length]);
        out[header_length..size].copy_from_slice(&live[run]);

        let mut header = self.header().clone();
        header.internal_data_offset = 0;
        header.used_length = size as u32;
        header.total_length = size as u32;
        header.pack_to_slice(&mut out[..BLOB_HEADER_SIZE])?;

        let platform_id = platform.platform_id();
        let mask = platform_mask(platform_id);
        let mut offset = header_length;
        while offset < size {
            let record = cursor::record_at(out, offset, size)?;
            let tag = record.tag();
            let kind = record.kind();
            let has_condition = record.header().condition_count() > 0;
            let payload = record.payload_offset()..record.end();
            let next = record.end();

            match self.find(mask, tag, Region::General)? {
                Some(found) => {
                    if has_condition {
                        let at = offset + RECORD_HEADER_SIZE;
                        let value = if tag == PLATFORM_ID_TAG {
                            ALL_PLATFORMS
                        } else {
                            mask
                        };
                        LittleEndian::write_u32(&mut out[at..at + CONDITION_SIZE], value);
                    }
                    if kind == RecordKind::Array {
                        trace!("tag {tag:#05x}: merging array from {:#x}", found.offset());
                        array::merge(tag, &mut out[payload], found.payload())?;
                    } else {
                        let src = found.payload();
                        if src.len() != payload.len() {
                            return Err(Error::PayloadMismatch {
                                tag,
                                expected: payload.len(),
                                found: src.len(),
                            });
                        }
                        out[payload].copy_from_slice(src);
                    }
                }
                None if tag == PLATFORM_ID_TAG => {
                    if payload.len() < 2 {
                        return Err(Error::PayloadMismatch {
                            tag,
                            expected: 2,
                            found: payload.len(),
                        });
                    }
                    LittleEndian::write_u16(&mut out[payload.start..payload.start + 2], platform_id);
                }
                None => return Err(Error::NotFound(tag)),
            }
            offset = next;
        }

        debug!("built {size} byte blob for platform {platform_id}");
        Ok(size)
    }

    /// Convenience wrapper around [`CfgBlob::build`] that allocates the
    /// output.
    pub fn build_to_vec<P: Platform + ?Sized>(&self, platform: &P) -> Result<Vec<u8>, Error> {
        let mut out = vec![0u8; self.estimate_built_size(platform)? as usize];
        let len = self.build(platform, &mut out)?;
        out.truncate(len);
        Ok(out)
    }
}
