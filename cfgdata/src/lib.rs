// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Run-time engine for platform configuration blobs: tag lookup with
//! platform conditions, patch merging with override priority, and
//! flattening into a single-platform blob for later boot stages.

pub mod array;
pub mod bits;
pub mod blob;
pub mod build;
pub mod cursor;
pub mod extend;
pub mod resolve;
pub mod verify;

#[cfg(test)]
pub(crate) mod testutil;

pub use blob::CfgBlob;
pub use cursor::{Record, RecordSummary, Records};

/// Source of the identity of the hardware variant we are running on.
pub trait Platform {
    fn platform_id(&self) -> u16;
}

impl Platform for u16 {
    fn platform_id(&self) -> u16 {
        *self
    }
}

/// Coarse classification of [`Error`], matching how callers react to a
/// failure.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The input blob is malformed or not a configuration blob at all
    Unsupported,
    /// The destination blob cannot hold the patch
    OutOfResources,
    /// The caller's output buffer is too small
    BufferTooSmall,
    /// A mandatory tag has no value for the active platform
    NotFound,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("bad blob signature {0:02x?}")]
    BadSignature([u8; 4]),

    #[error("malformed blob header: {0}")]
    BadHeader(&'static str),

    #[error("record at {offset:#x} runs past the used length ({used:#x})")]
    RecordOutOfBounds { offset: usize, used: usize },

    #[error("record at {offset:#x} has a zero length")]
    EmptyRecord { offset: usize },

    #[error("patch used length {used:#x} is below its header length {header:#x}")]
    NegativePatchSize { used: u32, header: u8 },

    #[error("patch record area of {0} bytes is not a whole number of words")]
    MisalignedPatch(usize),

    #[error("payload of tag {tag:#05x} is {found} bytes, expected {expected}")]
    PayloadMismatch {
        tag: u16,
        expected: usize,
        found: usize,
    },

    #[error("array payload of tag {tag:#05x} is malformed: {reason}")]
    ArrayShape { tag: u16, reason: &'static str },

    #[error("array items of tag {tag:#05x} are {found} bytes, expected {expected}")]
    ArrayItemSizeMismatch { tag: u16, expected: u8, found: u8 },

    #[error("no room for patch: need {needed} bytes, {available} available")]
    OutOfResources { needed: usize, available: usize },

    #[error("output buffer too small: need {needed} bytes, got {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("tag {0:#05x} has no value for the active platform")]
    NotFound(u16),

    #[error("verification failed; see log for details")]
    VerificationFailed,

    #[error("struct packing error: {0}")]
    PackingError(#[from] packed_struct::PackingError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::OutOfResources { .. } => ErrorKind::OutOfResources,
            Error::BufferTooSmall { .. } => ErrorKind::BufferTooSmall,
            Error::NotFound(_) => ErrorKind::NotFound,
            _ => ErrorKind::Unsupported,
        }
    }
}
