use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::cache::Cache;
use crate::config::CacheConfig;

/// Trace records are fixed width: `TTT M AAAAAAAAAAAAAAAA SSS\n`, where
/// `TTT` is the originating thread id in decimal, `M` is `R` or `W`,
/// `A..A` is the 16 hex digit byte address, and `SSS` is the access size in
/// bytes in decimal
pub const RECORD_SIZE: usize = 27;
const TID_OFFSET: usize = 0;
const TID_UPPER: usize = TID_OFFSET + 3;
const MODE_OFFSET: usize = TID_UPPER + 1;
const ADDRESS_OFFSET: usize = MODE_OFFSET + 2;
const ADDRESS_UPPER: usize = ADDRESS_OFFSET + 16;
const SIZE_OFFSET: usize = ADDRESS_UPPER + 1;
const SIZE_UPPER: usize = SIZE_OFFSET + 3;

/// The simulator replays trace records through a cache, handling the thread
/// filter and line alignment, and collects results
///
/// Memory operations are observed per thread, but the model is fed from a
/// single designated thread; records from every other thread are discarded
/// before they reach the cache. It supports calling simulate multiple times,
/// and will update the time taken to simulate and the results accordingly
pub struct Simulator {
    cache: Cache,
    monitored_thread: u16,
    result: SimulationResult,
    simulation_time: Duration,
}

/// The result of a simulation run. Can be serialised to the output format
#[derive(Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct SimulationResult {
    pub hits: u64,
    pub misses: u64,
    pub reads: u64,
    pub writes: u64,
    /// Records discarded because they came from an unmonitored thread
    pub filtered: u64,
    /// Accesses which straddled a line boundary and were split in two
    pub line_crossings: u64,
}

impl Simulator {
    /// Creates a new simulator for a given geometry
    ///
    /// The geometry is validated here, so an invalid one is reported before
    /// any trace is read
    ///
    /// # Arguments
    ///
    /// * `config`: The cache geometry, usually resulting from parsing JSON
    /// * `monitored_thread`: The single thread id whose accesses are simulated
    ///
    /// returns: Result<Simulator, String>
    pub fn new(config: &CacheConfig, monitored_thread: u16) -> Result<Self, String> {
        Ok(Self {
            cache: Cache::new(config)?,
            monitored_thread,
            result: SimulationResult::default(),
            simulation_time: Duration::new(0, 0),
        })
    }

    /// Simulates the cache over a byte array of trace records
    ///
    /// The byte array must have a length which is a multiple of the record
    /// size (not contain partial records). For speed, the fields themselves
    /// are not verified; if the trace may be malformed it should be run
    /// through [`crate::io::validate_trace`] first. While this won't panic,
    /// on bad input it may produce incorrect results
    ///
    /// Note that reads from the byte array are *guaranteed to be sequential*.
    /// This means that when using something like mmap, one can advise the
    /// operating system that sequential reads will be used, which can
    /// increase read performance
    ///
    /// # Arguments
    ///
    /// * `bytes`: The input byte array
    ///
    /// returns: Result<&SimulationResult, String>
    pub fn simulate(&mut self, bytes: &[u8]) -> Result<&SimulationResult, String> {
        if bytes.len() % RECORD_SIZE != 0 {
            return Err(format!(
                "Trace length {} is not a multiple of the {RECORD_SIZE} byte record size",
                bytes.len()
            ));
        }
        let start = Instant::now();
        let mut i: usize = 0;
        while i < bytes.len() {
            // Alias for clarity, no overhead when compiled
            let record = &bytes[i..i + RECORD_SIZE];
            i += RECORD_SIZE;
            let tid = parse_decimal((&record[TID_OFFSET..TID_UPPER]).try_into().unwrap());
            if tid != self.monitored_thread {
                self.result.filtered += 1;
                continue;
            }
            if record[MODE_OFFSET] == b'W' {
                self.result.writes += 1;
            } else {
                self.result.reads += 1;
            }
            let address = parse_address((&record[ADDRESS_OFFSET..ADDRESS_UPPER]).try_into().unwrap());
            let size = parse_decimal((&record[SIZE_OFFSET..SIZE_UPPER]).try_into().unwrap());
            self.access(address, size);
        }
        self.simulation_time += start.elapsed();
        self.result.hits = self.cache.total_hits();
        self.result.misses = self.cache.total_misses();
        Ok(&self.result)
    }

    /// Feeds one sized memory operation to the cache
    ///
    /// An operation of `size` bytes touches one line, or two when it crosses
    /// a line boundary; each touched line is one cache access. A zero size
    /// saturates and behaves as a one byte access
    fn access(&mut self, address: u64, size: u16) {
        let line_bits = self.cache.line_bits();
        let first_line = address >> line_bits;
        let last_line = address.wrapping_add(u64::from(size).saturating_sub(1)) >> line_bits;
        self.cache.access(first_line);
        if last_line != first_line {
            self.cache.access(last_line);
            self.result.line_crossings += 1;
        }
    }

    /// Gets the wall-clock execution time for processing
    pub fn get_execution_time(&self) -> &Duration {
        &self.simulation_time
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn monitored_thread(&self) -> u16 {
        self.monitored_thread
    }
}

const HEX_NIBBLE: [u8; 256] = hex_nibble_table();

const fn hex_nibble_table() -> [u8; 256] {
    let mut output = [0u8; 256];
    let mut input = 0usize;
    while input < 256 {
        output[input] = map_hex_char(input as u8);
        input += 1;
    }
    output
}

const fn map_hex_char(input: u8) -> u8 {
    if input >= b'0' && input <= b'9' {
        input - b'0'
    } else if input >= b'A' && input <= b'F' {
        input - b'A' + 10
    } else if input >= b'a' && input <= b'f' {
        input - b'a' + 10
    } else {
        0
    }
}

/// Parses a 64-bit value from a 16 byte hexadecimal address
///
/// For small geometries the address parse ends up being the bottleneck by a
/// significant margin when done through the standard library, so we use a
/// custom implementation over a nibble lookup table, which the compiler
/// unrolls fully
///
/// This omits checks for the input format. While it is guaranteed not to
/// panic, if the input format is incorrect it may produce incorrect results
///
/// # Arguments
///
/// * `buf`: The byte buffer
///
/// returns: u64
///
/// # Examples
///
/// ```
/// use csim::simulator::parse_address;
/// let address = b"000000000000000A";
/// assert_eq!(parse_address(address), 10);
/// ```
pub fn parse_address(buf: &[u8; 16]) -> u64 {
    let mut res: u64 = 0;
    let mut x = 0;
    while x < 16 {
        res <<= 4;
        res |= HEX_NIBBLE[buf[x] as usize] as u64;
        x += 1;
    }
    debug_assert_eq!(
        {
            let addr_as_str = std::str::from_utf8(buf).unwrap();
            u64::from_str_radix(addr_as_str, 16).unwrap()
        },
        res
    );
    res
}

/// This exists for the same reasons as parse_address, but uses simple
/// multiplication instead of a lookup table; the input is small enough that
/// the difference from a table is negligible
///
/// Used for both the thread id and the access size, which share the 3 digit
/// decimal field layout
///
/// # Arguments
///
/// * `buf`: The input
///
/// returns: u16
///
/// # Examples
///
/// ```
/// use csim::simulator::parse_decimal;
/// let size = b"010";
/// assert_eq!(parse_decimal(size), 10);
/// ```
pub fn parse_decimal(buf: &[u8; 3]) -> u16 {
    let mut res = (buf[2] - b'0') as u16;
    res += 10u16 * (buf[1] - b'0') as u16;
    res += 100u16 * (buf[0] - b'0') as u16;
    debug_assert_eq!(
        {
            let size_as_str = std::str::from_utf8(buf).unwrap();
            size_as_str.parse::<u16>().unwrap()
        },
        res
    );
    res
}
