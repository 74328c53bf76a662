// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tag lookup.
//!
//! Patches are always stored physically ahead of whatever was in the blob
//! before them, so the first applicable record found by a forward walk is the
//! one with the highest priority. There is no separate priority field.

use crate::{CfgBlob, Error, Platform, Record};
use cfgdata_areas::{platform_mask, RecordKind, Region};
use log::trace;

impl<B: AsRef<[u8]>> CfgBlob<B> {
    /// Finds the first record for `tag` that applies to `mask`, scanning
    /// from the start of `region`. An indirection is followed once; a second
    /// indirection on the way resolves to nothing.
    pub fn find(&self, mask: u32, tag: u16, region: Region) -> Result<Option<Record<'_>>, Error> {
        self.find_at_depth(mask, tag, region, 0)
    }

    fn find_at_depth(
        &self,
        mask: u32,
        tag: u16,
        region: Region,
        hop: u8,
    ) -> Result<Option<Record<'_>>, Error> {
        for record in self.records_from(self.region_start(region)) {
            let record = record?;
            if record.tag() != tag || !record.applies_to(mask) {
                continue;
            }
            if record.kind() != RecordKind::Refer {
                trace!("tag {tag:#05x} mask {mask:#x}: record at {:#x}", record.offset());
                return Ok(Some(record));
            }
            if hop > 0 {
                trace!(
                    "tag {tag:#05x}: chained indirection at {:#x} refused",
                    record.offset()
                );
                return Ok(None);
            }
            let refer = record.refer()?;
            trace!(
                "tag {tag:#05x}: indirection at {:#x} to tag {:#05x} of platform {} ({:?})",
                record.offset(),
                refer.tag(),
                refer.platform_id(),
                refer.region()
            );
            return self.find_at_depth(
                platform_mask(refer.platform_id()),
                refer.tag(),
                refer.region(),
                hop + 1,
            );
        }
        Ok(None)
    }

    /// Finds `tag` for the platform we are running on.
    pub fn find_current<P: Platform + ?Sized>(
        &self,
        platform: &P,
        tag: u16,
    ) -> Result<Option<Record<'_>>, Error> {
        self.find(platform_mask(platform.platform_id()), tag, Region::General)
    }

    /// Finds `tag` for an explicitly named platform.
    pub fn find_by_platform(
        &self,
        platform_id: u16,
        tag: u16,
        region: Region,
    ) -> Result<Option<Record<'_>>, Error> {
        self.find(platform_mask(platform_id), tag, region)
    }

    /// Payload of `tag` for the platform we are running on.
    pub fn find_payload<P: Platform + ?Sized>(
        &self,
        platform: &P,
        tag: u16,
    ) -> Result<Option<&[u8]>, Error> {
        Ok(self.find_current(platform, tag)?.map(|r| r.payload()))
    }

    pub fn find_payload_by_platform(
        &self,
        platform_id: u16,
        tag: u16,
        region: Region,
    ) -> Result<Option<&[u8]>, Error> {
        Ok(self
            .find_by_platform(platform_id, tag, region)?
            .map(|r| r.payload()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{patch, BlobBuilder};

    const TAG: u16 = 0x200;

    #[test]
    fn default_payload_without_patches() {
        let bytes = BlobBuilder::new()
            .plain(TAG, &[0b0010], &[0xB0, 0, 0, 0])
            .plain(TAG, &[0b0001], &[0xA0, 0, 0, 0])
            .build();
        let blob = CfgBlob::load(&bytes[..]).unwrap();
        assert_eq!(blob.find_payload(&0u16, TAG).unwrap(), Some(&[0xA0, 0, 0, 0][..]));
        assert_eq!(blob.find_payload(&1u16, TAG).unwrap(), Some(&[0xB0, 0, 0, 0][..]));
        assert_eq!(blob.find_payload(&2u16, TAG).unwrap(), None);
        assert_eq!(blob.find_payload(&0u16, TAG + 1).unwrap(), None);
    }

    #[test]
    fn any_condition_matches_first_record_wins() {
        let bytes = BlobBuilder::new()
            .plain(TAG, &[0b0100, 0b1000], &[1, 0, 0, 0])
            .plain(TAG, &[0b1000], &[2, 0, 0, 0])
            .build();
        let blob = CfgBlob::load(&bytes[..]).unwrap();
        assert_eq!(blob.find_payload(&3u16, TAG).unwrap(), Some(&[1, 0, 0, 0][..]));
        assert_eq!(blob.find_payload(&2u16, TAG).unwrap(), Some(&[1, 0, 0, 0][..]));
    }

    #[test]
    fn later_patch_overrides_earlier_patch() {
        for partitioned in [false, true] {
            let mut builder = BlobBuilder::new();
            if partitioned {
                builder = builder.internal_here();
            }
            let mut bytes = builder
                .plain(TAG, &[0xFF], &[0xD0, 0, 0, 0])
                .capacity(0x100)
                .build();
            let p1 = patch().plain(TAG, &[0b0110], &[0xD1, 0, 0, 0]).build();
            let p2 = patch().plain(TAG, &[0b0010], &[0xD2, 0, 0, 0]).build();

            let mut blob = CfgBlob::load(&mut bytes[..]).unwrap();
            blob.add(&p1).unwrap();
            blob.add(&p2).unwrap();

            let found = blob.find_payload(&1u16, TAG).unwrap();
            if partitioned {
                assert_eq!(found, Some(&[0xD2, 0, 0, 0][..]));
            } else {
                // appended patches sit behind the defaults
                assert_eq!(found, Some(&[0xD0, 0, 0, 0][..]));
            }
            if partitioned {
                assert_eq!(blob.find_payload(&2u16, TAG).unwrap(), Some(&[0xD1, 0, 0, 0][..]));
                assert_eq!(blob.find_payload(&5u16, TAG).unwrap(), Some(&[0xD0, 0, 0, 0][..]));
            }
        }
    }

    #[test]
    fn single_indirection_resolves() {
        let bytes = BlobBuilder::new()
            .refer(TAG, &[0b0010], 3, 0x300, false)
            .plain(0x300, &[0b1000], &[0xBB, 0, 0, 0])
            .build();
        let blob = CfgBlob::load(&bytes[..]).unwrap();
        let record = blob.find_current(&1u16, TAG).unwrap().unwrap();
        assert_eq!(record.tag(), 0x300);
        assert_eq!(record.payload(), &[0xBB, 0, 0, 0]);
    }

    #[test]
    fn chained_indirection_fails() {
        let bytes = BlobBuilder::new()
            .refer(TAG, &[0b0010], 3, 0x300, false)
            .refer(0x300, &[0b1000], 4, 0x400, false)
            .plain(0x400, &[0b1_0000], &[0xCC, 0, 0, 0])
            .build();
        let blob = CfgBlob::load(&bytes[..]).unwrap();
        assert!(blob.find_current(&1u16, TAG).unwrap().is_none());
        // the middle link on its own is a single hop
        assert_eq!(
            blob.find_payload(&3u16, 0x300).unwrap(),
            Some(&[0xCC, 0, 0, 0][..])
        );
    }

    #[test]
    fn indirection_into_internal_region() {
        let mut bytes = BlobBuilder::new()
            .internal_here()
            .plain(0x300, &[0b0001], &[0x01, 0, 0, 0])
            .capacity(0x80)
            .build();
        // a patch that shadows tag 0x300 and points tag 0x200 at the default
        let p = patch()
            .plain(0x300, &[0b0001], &[0x02, 0, 0, 0])
            .refer(TAG, &[0b0100], 0, 0x300, true)
            .build();
        let mut blob = CfgBlob::load(&mut bytes[..]).unwrap();
        blob.add(&p).unwrap();

        assert_eq!(blob.find_payload(&2u16, TAG).unwrap(), Some(&[0x01, 0, 0, 0][..]));
        assert_eq!(blob.find_payload(&0u16, 0x300).unwrap(), Some(&[0x02, 0, 0, 0][..]));
        assert_eq!(
            blob.find_payload_by_platform(0, 0x300, Region::Internal).unwrap(),
            Some(&[0x01, 0, 0, 0][..])
        );
    }

    #[test]
    fn record_without_conditions_never_applies() {
        let bytes = BlobBuilder::new().plain(TAG, &[], &[1, 0, 0, 0]).build();
        let blob = CfgBlob::load(&bytes[..]).unwrap();
        assert!(blob.find(0xFFFF_FFFF, TAG, Region::General).unwrap().is_none());
    }

    #[test]
    fn corrupt_record_is_an_error() {
        let mut bytes = BlobBuilder::new()
            .plain(0x100, &[1], &[0; 4])
            .plain(TAG, &[1], &[0; 4])
            .build();
        bytes[16 + 12] = 0xFC;
        let blob = CfgBlob::load(&bytes[..]).unwrap();
        assert!(blob.find_current(&0u16, TAG).is_err());
    }
}
