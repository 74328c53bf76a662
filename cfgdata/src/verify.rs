// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::array::ArrayLayout;
use crate::blob::{check_header, read_header};
use crate::{cursor, Error, Record};
use cfgdata_areas::{
    platform_mask, RecordKind, ReferData, Region, DEFAULT_PLATFORM_ID, PLATFORM_ID_TAG,
    RECORD_KIND_MASK,
};
use log::{debug as okay, info, trace, warn};
use std::io::Write as _;

macro_rules! error {
    ($failed:ident, $($arg:tt)*) => {
        $failed = true;
        log::error!($($arg)*);
    }
}

/// Initializes a logger that pretty-prints logging from `verify_blob`
pub fn init_verify_logger(verbose: bool) {
    let mut builder = env_logger::Builder::from_default_env();
    builder
        .format(|buf, record| {
            let mut level_style = buf.style();

            level_style.set_color(match record.level() {
                log::Level::Info => env_logger::fmt::Color::Cyan,
                log::Level::Trace => env_logger::fmt::Color::Blue,
                log::Level::Warn => env_logger::fmt::Color::Yellow,
                log::Level::Error => env_logger::fmt::Color::Red,
                log::Level::Debug => env_logger::fmt::Color::Green,
            });

            writeln!(
                buf,
                "{: <5} | {}",
                level_style.value(match record.level() {
                    log::Level::Info => "",
                    log::Level::Trace => "",
                    log::Level::Warn => "WARN",
                    log::Level::Error => "ERROR",
                    log::Level::Debug => "OKAY",
                }),
                record.args().to_string().replace('\n', "\n      | ")
            )
        })
        .filter(
            None,
            if verbose {
                log::LevelFilter::Trace
            } else {
                log::LevelFilter::Debug
            },
        )
        .init();
}

/// Checks the structure of a blob, logging every finding. Returns
/// [`Error::VerificationFailed`] if anything would trip up the engine.
pub fn verify_blob(bytes: &[u8]) -> Result<(), Error> {
    let mut failed = false;

    info!("=== Header ===");
    let header = match read_header(bytes) {
        Ok(header) => header,
        Err(e) => {
            log::error!("{e}");
            return Err(Error::VerificationFailed);
        }
    };
    okay!("Blob signature is 'CFGD'");
    trace!("{header:#x?}");

    if let Err(e) = check_header(&header, bytes.len()) {
        log::error!("{e}");
        return Err(Error::VerificationFailed);
    }
    okay!(
        "Lengths are consistent: {} byte header, {} of {} bytes used",
        header.header_length,
        header.used_length,
        header.total_length
    );

    let start = usize::from(header.header_length);
    let used = header.used_length as usize;
    let internal = header.internal_start();
    match internal {
        Some(at) => trace!("internal/default run starts at {at:#x}"),
        None => trace!("blob is not partitioned"),
    }

    info!("=== Records ===");
    let mut records = Vec::new();
    let mut offset = start;
    while offset < used {
        match cursor::record_at(bytes, offset, used) {
            Ok(record) => {
                offset = record.end();
                records.push(record);
            }
            Err(e) => {
                error!(failed, "{e}; not walking any further");
                break;
            }
        }
    }
    if !failed {
        okay!("{} records span the used area exactly", records.len());
    }

    if let Some(at) = internal {
        if !records.iter().any(|r| r.offset() == at) && at != used {
            error!(
                failed,
                "Internal data offset {at:#x} does not fall on a record boundary"
            );
        }
    }

    for record in &records {
        trace!(
            "{:#06x}: tag {:#05x} {:?} v{} {} bytes, conditions {:x?}",
            record.offset(),
            record.tag(),
            record.kind(),
            record.header().version(),
            record.len(),
            record.conditions().collect::<Vec<_>>()
        );
        if record.header().condition_count() == 0 {
            warn!(
                "Record at {:#x} (tag {:#05x}) has no conditions and never applies",
                record.offset(),
                record.tag()
            );
        }
        if record.header().flags() & RECORD_KIND_MASK == RECORD_KIND_MASK {
            warn!(
                "Record at {:#x} has unassigned kind 3, treated as plain data",
                record.offset()
            );
        }
        match record.kind() {
            RecordKind::Refer => failed |= check_refer(record, &records, start, internal),
            RecordKind::Array => failed |= check_array(record),
            RecordKind::Plain => {}
        }
    }

    info!("=== Default run ===");
    let run_start = internal.unwrap_or(start);
    let template: Vec<_> = records.iter().filter(|r| r.offset() >= run_start).collect();
    if template.iter().any(|r| r.tag() == PLATFORM_ID_TAG) {
        okay!("Platform id record present");
    } else {
        warn!("No platform id record; flattened blobs will not identify their platform");
    }
    if internal.is_some() {
        let mask = platform_mask(DEFAULT_PLATFORM_ID);
        let excluded = |r: &&&Record<'_>| {
            r.first_condition()
                .map_or(false, |c| c != 0 && c & mask == 0)
        };
        if let Some(stop) = template.iter().find(excluded) {
            let stragglers = template
                .iter()
                .filter(|r| r.offset() > stop.offset())
                .filter(|r| !excluded(r) && r.header().condition_count() > 0)
                .count();
            if stragglers > 0 {
                warn!(
                    "{stragglers} default record(s) lie past the end of the default \
                     run at {:#x} and will not be flattened",
                    stop.offset()
                );
            } else {
                okay!("Default run is contiguous");
            }
        } else {
            okay!("Default run is contiguous");
        }
    }

    if failed {
        Err(Error::VerificationFailed)
    } else {
        Ok(())
    }
}

/// Record an indirection lands on, scanning from the start of its region the
/// same way [`crate::CfgBlob::region_start`] does.
fn refer_target<'r, 'a>(
    refer: &ReferData,
    records: &'r [Record<'a>],
    start: usize,
    internal: Option<usize>,
) -> Option<&'r Record<'a>> {
    let from = match (refer.region(), internal) {
        (Region::Internal, Some(at)) => at,
        _ => start,
    };
    let mask = platform_mask(refer.platform_id());
    records
        .iter()
        .filter(|r| r.offset() >= from)
        .find(|r| r.tag() == refer.tag() && r.applies_to(mask))
}

fn check_refer(
    record: &Record<'_>,
    records: &[Record<'_>],
    start: usize,
    internal: Option<usize>,
) -> bool {
    let mut failed = false;
    let refer = match record.refer() {
        Ok(refer) => refer,
        Err(e) => {
            error!(failed, "{e}");
            return failed;
        }
    };
    match refer_target(&refer, records, start, internal) {
        None => warn!(
            "Indirection at {:#x} points at tag {:#05x} of platform {}, which does not exist",
            record.offset(),
            refer.tag(),
            refer.platform_id()
        ),
        Some(t) if t.kind() == RecordKind::Refer => {
            error!(
                failed,
                "Indirection at {:#x} leads to another indirection at {:#x}; \
                 only one hop is followed",
                record.offset(),
                t.offset()
            );
        }
        Some(t) => okay!(
            "Indirection at {:#x} resolves to record at {:#x}",
            record.offset(),
            t.offset()
        ),
    }
    failed
}

fn check_array(record: &Record<'_>) -> bool {
    let mut failed = false;
    let layout = match ArrayLayout::parse(record.tag(), record.payload()) {
        Ok(layout) => layout,
        Err(e) => {
            error!(failed, "Record at {:#x}: {e}", record.offset());
            return failed;
        }
    };
    let h = &layout.header;
    trace!(
        "    {} items of {} bytes, id bits {}+{}, skip bit {}, bitmap {} bytes",
        h.item_count,
        h.item_size,
        h.id_bit_offset,
        h.id_bit_width,
        h.skip_bit_offset,
        layout.bitmap.len()
    );
    let id_end = usize::from(h.id_bit_offset) + usize::from(h.id_bit_width);
    if id_end > usize::from(h.item_size) * 8 {
        error!(
            failed,
            "Array at {:#x}: item id bits end past the item",
            record.offset()
        );
    }
    let skip = usize::from(h.skip_bit_offset);
    if (usize::from(h.id_bit_offset)..id_end).contains(&skip) {
        warn!(
            "Array at {:#x}: skip bit overlaps the item id",
            record.offset()
        );
    }
    if !failed {
        okay!("Array at {:#x} is well formed", record.offset());
    }
    failed
}
