use std::collections::HashMap;

use crate::config::CacheConfig;

/// Sentinel for "no neighbour" in the recency list links
const NIL: u32 = u32::MAX;

/// One resident cache line in the recency arena
///
/// The links are arena indices rather than pointers, which sidesteps
/// ownership cycles entirely and keeps the whole list in one allocation
struct Line {
    addr: u64,
    prev: u32,
    next: u32,
}

/// The LRU state for a single cache set
///
/// A set holds up to `capacity` (the associativity) resident lines. Recency
/// is tracked with a doubly-linked list threaded through a slot arena, with
/// `head` the most recently used line and `tail` the least; `index` maps a
/// line address to its arena slot so hits, promotions, and evictions are all
/// O(1)
///
/// Slots are allocated in order until the arena reaches capacity, after which
/// the evicted tail slot is reused in place. Once full, a set stays exactly
/// full
pub struct RecencySet {
    capacity: usize,
    lines: Vec<Line>,
    index: HashMap<u64, u32>,
    head: u32,
    tail: u32,
    hits: u64,
    misses: u64,
}

impl RecencySet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            lines: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            head: NIL,
            tail: NIL,
            hits: 0,
            misses: 0,
        }
    }

    /// Touches a line address, updating recency and the hit/miss counters
    ///
    /// On a hit the line moves to the most-recently-used position. On a miss
    /// it is inserted there, evicting the least-recently-used line if the set
    /// is already full. Every address value is acceptable; the operation
    /// cannot fail
    ///
    /// # Arguments
    ///
    /// * `addr`: A line address, already right-shifted by the line bits
    ///
    /// returns: ()
    pub fn access(&mut self, addr: u64) {
        debug_assert_eq!(self.index.len(), self.lines.len());
        if let Some(&slot) = self.index.get(&addr) {
            self.promote(slot);
            self.hits += 1;
        } else {
            let slot = if self.lines.len() < self.capacity {
                let slot = self.lines.len() as u32;
                self.lines.push(Line { addr, prev: NIL, next: NIL });
                slot
            } else {
                // Reuse the evicted tail slot for the incoming line
                let slot = self.tail;
                let line = &mut self.lines[slot as usize];
                let evicted = line.addr;
                line.addr = addr;
                self.index.remove(&evicted);
                self.detach(slot);
                slot
            };
            self.push_front(slot);
            self.index.insert(addr, slot);
            self.misses += 1;
            debug_assert!(self.lines.len() <= self.capacity);
        }
    }

    /// Whether a line address is currently resident
    pub fn contains(&self, addr: u64) -> bool {
        self.index.contains_key(&addr)
    }

    /// The number of resident lines, at most the capacity
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// The least-recently-used resident address, the next eviction candidate
    pub fn lru(&self) -> Option<u64> {
        if self.tail == NIL {
            None
        } else {
            Some(self.lines[self.tail as usize].addr)
        }
    }

    fn promote(&mut self, slot: u32) {
        if self.head == slot {
            return;
        }
        self.detach(slot);
        self.push_front(slot);
    }

    fn detach(&mut self, slot: u32) {
        let Line { prev, next, .. } = self.lines[slot as usize];
        if prev != NIL {
            self.lines[prev as usize].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.lines[next as usize].prev = prev;
        } else {
            self.tail = prev;
        }
    }

    fn push_front(&mut self, slot: u32) {
        let old_head = self.head;
        {
            let line = &mut self.lines[slot as usize];
            line.prev = NIL;
            line.next = old_head;
        }
        if old_head != NIL {
            self.lines[old_head as usize].prev = slot;
        } else {
            self.tail = slot;
        }
        self.head = slot;
    }
}

/// A set-associative cache with LRU replacement
///
/// The cache owns one `RecencySet` per set and routes each line address to
/// its set by masking with `num_sets - 1`. The low bits of the *line* address
/// select the set, exactly as the index bits do in hardware; strided access
/// patterns concentrating in few sets is faithful behaviour, so this must not
/// be swapped for a mixing hash
pub struct Cache {
    line_bits: u32,
    set_mask: u64,
    sets: Vec<RecencySet>,
}

impl Cache {
    /// Builds a cache from a geometry, validating it first
    ///
    /// All power-of-two and ordering constraints are checked here, once,
    /// before any access is processed; an invalid geometry is unrecoverable
    /// for the run
    ///
    /// # Arguments
    ///
    /// * `config`: The cache geometry
    ///
    /// returns: Result<Cache, String>
    pub fn new(config: &CacheConfig) -> Result<Self, String> {
        config.validate()?;
        let num_sets = config.num_sets();
        Ok(Self {
            line_bits: config.line_bits(),
            set_mask: num_sets - 1,
            sets: (0..num_sets)
                .map(|_| RecencySet::new(config.associativity as usize))
                .collect(),
        })
    }

    /// The set a line address maps to
    ///
    /// This runs once per memory access, potentially billions of times per
    /// trace, hence the bitmask modulo; `num_sets` is a power of two by
    /// construction
    pub fn set_index(&self, line_addr: u64) -> usize {
        (line_addr & self.set_mask) as usize
    }

    /// Touches a line address in its set
    ///
    /// The conversion from byte address to line address (right shift by
    /// `line_bits`) is the caller's responsibility, as a sized memory
    /// operation may straddle two lines and must be split before reaching
    /// the cache
    pub fn access(&mut self, line_addr: u64) {
        let set = self.set_index(line_addr);
        self.sets[set].access(line_addr);
    }

    /// The number of low bits of a byte address covered by one line
    pub fn line_bits(&self) -> u32 {
        self.line_bits
    }

    pub fn num_sets(&self) -> usize {
        self.sets.len()
    }

    pub fn sets(&self) -> &[RecencySet] {
        &self.sets
    }

    /// Total hits across all sets. Walked at reporting time only
    pub fn total_hits(&self) -> u64 {
        self.sets.iter().map(RecencySet::hits).sum()
    }

    /// Total misses across all sets. Walked at reporting time only
    pub fn total_misses(&self) -> u64 {
        self.sets.iter().map(RecencySet::misses).sum()
    }

    /// Counts sets which have never reached capacity. Useful for analysing
    /// cache performance or debugging
    pub fn unfilled_set_count(&self) -> usize {
        self.sets.iter().filter(|s| s.len() < s.capacity()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;

    fn geometry(line_size: u64, cache_size: u64, associativity: u64) -> CacheConfig {
        CacheConfig {
            line_size,
            cache_size,
            associativity,
        }
    }

    #[test]
    fn repeated_access_hits_after_first_miss() {
        for capacity in [1usize, 2, 8] {
            let mut set = RecencySet::new(capacity);
            for _ in 0..=capacity {
                set.access(42);
            }
            assert_eq!(set.misses(), 1);
            assert_eq!(set.hits(), capacity as u64);
            assert_eq!(set.len(), 1);
        }
    }

    #[test]
    fn distinct_addresses_evict_the_oldest() {
        let capacity = 4;
        let mut set = RecencySet::new(capacity);
        for addr in 0..=capacity as u64 {
            set.access(addr);
        }
        assert_eq!(set.misses(), capacity as u64 + 1);
        assert_eq!(set.hits(), 0);
        assert!(!set.contains(0));
        for addr in 1..=capacity as u64 {
            assert!(set.contains(addr));
        }
        assert_eq!(set.len(), capacity);
        assert_eq!(set.lru(), Some(1));
    }

    #[test]
    fn promotion_is_idempotent() {
        let mut once = RecencySet::new(4);
        for addr in [1, 2, 1] {
            once.access(addr);
        }
        let mut twice = RecencySet::new(4);
        for addr in [1, 2, 1, 1] {
            twice.access(addr);
        }
        assert_eq!(twice.hits(), once.hits() + 1);
        assert_eq!(twice.misses(), once.misses());
        assert_eq!(twice.len(), once.len());
        assert_eq!(twice.lru(), once.lru());
        for addr in [1, 2] {
            assert_eq!(twice.contains(addr), once.contains(addr));
        }
    }

    #[test]
    fn promoting_the_lru_entry_changes_the_victim() {
        let mut set = RecencySet::new(2);
        set.access(10);
        set.access(20);
        set.access(10);
        // 20 is now the oldest, so a new line pushes it out
        set.access(30);
        assert!(set.contains(10));
        assert!(!set.contains(20));
        assert!(set.contains(30));
    }

    /// A naive recency list, kept only as an oracle for the arena version
    struct ReferenceLru {
        capacity: usize,
        order: Vec<u64>,
    }

    impl ReferenceLru {
        fn access(&mut self, addr: u64) -> bool {
            if let Some(pos) = self.order.iter().position(|&a| a == addr) {
                self.order.remove(pos);
                self.order.insert(0, addr);
                true
            } else {
                self.order.insert(0, addr);
                if self.order.len() > self.capacity {
                    self.order.pop();
                }
                false
            }
        }
    }

    #[test]
    fn random_streams_match_the_reference_model() {
        fastrand::seed(0x5EED);
        for _ in 0..50 {
            let capacity = 1 << fastrand::usize(0..5);
            let universe = 1 + fastrand::u64(0..3 * capacity as u64);
            let mut set = RecencySet::new(capacity);
            let mut reference = ReferenceLru {
                capacity,
                order: Vec::new(),
            };
            let mut hits = 0u64;
            let mut misses = 0u64;
            for _ in 0..2000 {
                let addr = fastrand::u64(0..universe);
                if reference.access(addr) {
                    hits += 1;
                } else {
                    misses += 1;
                }
                set.access(addr);
                assert_eq!(set.hits(), hits);
                assert_eq!(set.misses(), misses);
                assert_eq!(set.len(), reference.order.len());
                assert!(set.len() <= capacity);
                assert_eq!(set.lru(), reference.order.last().copied());
            }
        }
    }

    #[test]
    fn addresses_route_to_their_low_bit_set() {
        let cache = Cache::new(&geometry(64, 32768, 8)).unwrap();
        assert_eq!(cache.num_sets(), 64);
        assert_eq!(cache.set_index(0), 0);
        assert_eq!(cache.set_index(63), 63);
        assert_eq!(cache.set_index(64), 0);
        assert_eq!(cache.set_index(0x7FFF_FFC1), 1);
    }

    #[test]
    fn one_line_per_set_then_a_hit() {
        let mut cache = Cache::new(&geometry(64, 32768, 8)).unwrap();
        for line in 0..64u64 {
            cache.access(line);
        }
        assert_eq!(cache.total_misses(), 64);
        assert_eq!(cache.total_hits(), 0);
        cache.access(0);
        assert_eq!(cache.total_hits(), 1);
        assert_eq!(cache.total_misses(), 64);
    }

    #[test]
    fn direct_mapped_conflicts_thrash() {
        // Two lines landing in the same set of a direct-mapped cache evict
        // each other on every access
        for n in [2u64, 5, 17] {
            let mut cache = Cache::new(&geometry(64, 4096, 1)).unwrap();
            let sets = cache.num_sets() as u64;
            for i in 0..n {
                cache.access(if i % 2 == 0 { 3 } else { 3 + sets });
            }
            assert_eq!(cache.total_misses(), n);
            assert_eq!(cache.total_hits(), 0);
        }
    }

    #[test]
    fn counters_conserve_the_access_count() {
        fastrand::seed(1);
        let mut cache = Cache::new(&geometry(32, 2048, 4)).unwrap();
        let accesses = 10_000u64;
        for _ in 0..accesses {
            cache.access(fastrand::u64(0..512));
        }
        assert_eq!(cache.total_hits() + cache.total_misses(), accesses);
    }

    #[test]
    fn unfilled_sets_are_reported() {
        let mut cache = Cache::new(&geometry(64, 8192, 2)).unwrap();
        assert_eq!(cache.unfilled_set_count(), 64);
        cache.access(0);
        cache.access(64);
        assert_eq!(cache.unfilled_set_count(), 63);
    }
}
