// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::cursor::{self, Record, Records};
use crate::Error;
use cfgdata_areas::{BlobHeader, Region, BLOB_HEADER_SIZE, BLOB_SIGNATURE};
use packed_struct::PackedStructSlice;

/// Reads a blob header, checking only the signature.
pub fn read_header(bytes: &[u8]) -> Result<BlobHeader, Error> {
    if bytes.len() < BLOB_HEADER_SIZE {
        return Err(Error::BadHeader("shorter than a blob header"));
    }
    let header = BlobHeader::unpack_from_slice(&bytes[..BLOB_HEADER_SIZE])?;
    if header.signature != BLOB_SIGNATURE {
        return Err(Error::BadSignature(header.signature));
    }
    Ok(header)
}

/// Checks the length and offset fields of a header against each other and
/// against the size of the backing buffer.
pub fn check_header(header: &BlobHeader, buffer_len: usize) -> Result<(), Error> {
    let header_length = usize::from(header.header_length);
    let used = header.used_length as usize;
    let total = header.total_length as usize;

    if header_length < BLOB_HEADER_SIZE {
        return Err(Error::BadHeader("header length below the fixed header size"));
    }
    if used < header_length {
        return Err(Error::BadHeader("used length below header length"));
    }
    if total < used {
        return Err(Error::BadHeader("used length exceeds total length"));
    }
    if total > buffer_len {
        return Err(Error::BadHeader("total length exceeds the buffer"));
    }
    if let Some(internal) = header.internal_start() {
        if internal < header_length || internal > used {
            return Err(Error::BadHeader("internal data offset outside the used area"));
        }
    }
    Ok(())
}

/// A configuration blob over some byte storage.
///
/// The header is cached and written back whenever it changes, so the storage
/// always holds a consistent blob.
#[derive(Debug, Clone)]
pub struct CfgBlob<B> {
    data: B,
    header: BlobHeader,
}

impl<B: AsRef<[u8]>> CfgBlob<B> {
    pub fn load(data: B) -> Result<Self, Error> {
        let header = read_header(data.as_ref())?;
        check_header(&header, data.as_ref().len())?;
        Ok(CfgBlob { data, header })
    }

    pub fn header(&self) -> &BlobHeader {
        &self.header
    }

    /// The populated part of the blob, header included
    pub fn as_bytes(&self) -> &[u8] {
        &self.data.as_ref()[..self.used_length()]
    }

    pub fn into_inner(self) -> B {
        self.data
    }

    pub fn header_length(&self) -> usize {
        usize::from(self.header.header_length)
    }

    pub fn used_length(&self) -> usize {
        self.header.used_length as usize
    }

    pub fn total_length(&self) -> usize {
        self.header.total_length as usize
    }

    /// Byte offset where a scan of `region` begins. An unpartitioned blob is
    /// all default data, so its internal region starts with the first record.
    pub fn region_start(&self, region: Region) -> usize {
        match (region, self.header.internal_start()) {
            (Region::Internal, Some(start)) => start,
            _ => self.header_length(),
        }
    }

    pub fn record_at(&self, offset: usize) -> Result<Record<'_>, Error> {
        cursor::record_at(self.data.as_ref(), offset, self.used_length())
    }

    /// Records from `start` to the end of the used area
    pub fn records_from(&self, start: usize) -> Records<'_> {
        Records::new(self.data.as_ref(), start, self.used_length())
    }

    pub fn records(&self) -> Records<'_> {
        self.records_from(self.header_length())
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> CfgBlob<B> {
    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }

    pub(crate) fn header_mut(&mut self) -> &mut BlobHeader {
        &mut self.header
    }

    pub(crate) fn store_header(&mut self) -> Result<(), Error> {
        self.header
            .pack_to_slice(&mut self.data.as_mut()[..BLOB_HEADER_SIZE])?;
        Ok(())
    }

    /// Declares every record currently in the blob to be the built-in default
    /// run. Records added afterwards land ahead of it.
    pub fn mark_internal(&mut self) -> Result<(), Error> {
        if self.header.internal_data_offset != 0 {
            return Ok(());
        }
        if self.header_length() % 4 != 0 {
            return Err(Error::BadHeader("header length is not word aligned"));
        }
        self.header.internal_data_offset = (self.header_length() / 4) as u16;
        self.store_header()
    }
}

impl CfgBlob<Vec<u8>> {
    /// Raises the capacity of an owned blob to `total_length` bytes. A smaller
    /// value than the current capacity is ignored.
    pub fn grow(&mut self, total_length: u32) -> Result<(), Error> {
        if total_length <= self.header.total_length {
            return Ok(());
        }
        self.data.resize(total_length as usize, 0);
        self.header.total_length = total_length;
        self.store_header()
    }
}
