use std::fs::File;
use std::ops::Deref;

use lazy_static::lazy_static;
use regex::bytes::Regex;

use crate::simulator::RECORD_SIZE;

/// An in-memory view of a trace file, either mapped or read outright
pub enum TraceData {
    #[cfg(unix)]
    Mapped(memmap2::Mmap),
    Buffered(Vec<u8>),
}

impl Deref for TraceData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            #[cfg(unix)]
            TraceData::Mapped(m) => m,
            TraceData::Buffered(b) => b,
        }
    }
}

/// Loads a trace file into memory
pub fn map_trace(file: File) -> Result<TraceData, String> {
    // Compatibility on other systems
    #[cfg(not(unix))]
    {
        use std::io::Read;
        let mut file = file;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .map_err(|e| format!("Couldn't read the trace file: {e}"))?;
        Ok(TraceData::Buffered(buf))
    }
    // Memory map the file for speed on unix systems, and let the OS know the
    // simulator reads it front to back
    #[cfg(unix)]
    {
        use memmap2::{Advice, Mmap};
        unsafe {
            let m = Mmap::map(&file).map_err(|e| format!("Couldn't memory map the file: {e}"))?;
            m.advise(Advice::Sequential)
                .map_err(|e| format!("Failed to provide access advice to the OS, {e}"))?;
            Ok(TraceData::Mapped(m))
        }
    }
}

lazy_static! {
    static ref RECORD_PATTERN: Regex =
        Regex::new(r"\A[0-9]{3} [RW] [0-9A-Fa-f]{16} [0-9]{3}\n\z").unwrap();
}

/// Checks every record of a trace against the record format
///
/// The simulator itself skips field validation for speed, so a trace of
/// questionable provenance should be run through this first. Linear in the
/// trace size, one pass
///
/// # Arguments
///
/// * `bytes`: The full trace contents
///
/// returns: Result<(), String>
pub fn validate_trace(bytes: &[u8]) -> Result<(), String> {
    if bytes.len() % RECORD_SIZE != 0 {
        return Err(format!(
            "Trace length {} is not a multiple of the {RECORD_SIZE} byte record size",
            bytes.len()
        ));
    }
    for (number, record) in bytes.chunks_exact(RECORD_SIZE).enumerate() {
        if !RECORD_PATTERN.is_match(record) {
            return Err(format!(
                "Malformed trace record on line {}: {:?}",
                number + 1,
                String::from_utf8_lossy(record)
            ));
        }
    }
    Ok(())
}
