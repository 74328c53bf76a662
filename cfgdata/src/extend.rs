// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::blob::{check_header, read_header};
use crate::{CfgBlob, Error, Records};
use log::debug;

impl<B: AsRef<[u8]> + AsMut<[u8]>> CfgBlob<B> {
    /// Merges the records of `patch` into this blob with priority over every
    /// record already present.
    ///
    /// Without an internal region the records are appended. With one, all
    /// existing records move up by the size of the patch and the patch
    /// lands directly behind the header, so the default run always stays last.
    pub fn add(&mut self, patch: &[u8]) -> Result<(), Error> {
        let patch_header = read_header(patch)?;
        let patch_start = usize::from(patch_header.header_length);
        let patch_used = patch_header.used_length as usize;
        if patch_used < patch_start {
            return Err(Error::NegativePatchSize {
                used: patch_header.used_length,
                header: patch_header.header_length,
            });
        }
        check_header(&patch_header, patch.len())?;

        let records = &patch[patch_start..patch_used];
        let len = records.len();
        if len % 4 != 0 {
            return Err(Error::MisalignedPatch(len));
        }
        // Nothing lands in the live blob unless every patch record is sound.
        for record in Records::new(patch, patch_start, patch_used) {
            record?;
        }

        let used = self.used_length();
        let available = self.total_length() - used;
        if len > available {
            return Err(Error::OutOfResources {
                needed: len,
                available,
            });
        }

        let start = self.header_length();
        match self.header().internal_start() {
            None => {
                debug!("appending {len} bytes of patch records at {used:#x}");
                self.bytes_mut()[used..used + len].copy_from_slice(records);
            }
            Some(internal) => {
                let internal_data_offset = u16::try_from((internal + len) / 4).map_err(|_| {
                    Error::OutOfResources {
                        needed: len,
                        available: usize::from(u16::MAX) * 4 - internal,
                    }
                })?;
                debug!(
                    "inserting {len} bytes of patch records at {start:#x}, \
                     default run moves to {:#x}",
                    internal + len
                );
                let bytes = self.bytes_mut();
                bytes.copy_within(start..used, start + len);
                bytes[start..start + len].copy_from_slice(records);
                self.header_mut().internal_data_offset = internal_data_offset;
            }
        }

        self.header_mut().used_length = (used + len) as u32;
        self.store_header()
    }
}
