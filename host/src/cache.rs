//! The two-way set-associative write-back cache sitting between the
//! interpreter and external serial memory.
//!
//! This is the hot path of every guest load and store. See the module's
//! design notes for the tie-break rules this implementation must
//! preserve: way 0 wins an initial miss with no LRU bit set yet, and
//! `flush_line` is the single writeback rule shared by eviction and
//! explicit flush.

use crate::backing_store::BackingStore;
use crate::config::{CACHE_LINE_SIZE, CACHE_SET_SIZE, INDEX_BITS, OFFSET_BITS};
use bitflags::bitflags;

bitflags! {
    /// Per-line status bits.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    struct LineFlags: u8 {
        /// The line holds meaningful data.
        const VALID = 0b001;
        /// The line has been written since its last refill.
        const DIRTY = 0b010;
        /// This way is the next eviction candidate within its set.
        const LRU = 0b100;
    }
}

#[derive(Debug, Clone, Copy)]
struct Line {
    tag: u32,
    flags: LineFlags,
    data: [u8; CACHE_LINE_SIZE],
}

impl Default for Line {
    fn default() -> Self {
        Self {
            tag: 0,
            flags: LineFlags::empty(),
            data: [0; CACHE_LINE_SIZE],
        }
    }
}

/// The number of ways per set. Fixed by design; not a [`crate::config`]
/// knob because the tie-break rules below are written in terms of
/// exactly two ways.
const WAYS: usize = 2;

/// The guest-physical-address cache.
#[derive(Debug)]
pub struct Cache {
    sets: [[Line; WAYS]; CACHE_SET_SIZE],
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            sets: [[Line::default(); WAYS]; CACHE_SET_SIZE],
        }
    }
}

struct Decomposed {
    tag: u32,
    index: usize,
    offset: usize,
}

fn decompose(addr: u32) -> Decomposed {
    let offset = (addr as usize) & (CACHE_LINE_SIZE - 1);
    let index = ((addr as usize) >> OFFSET_BITS) & (CACHE_SET_SIZE - 1);
    let tag = addr >> (OFFSET_BITS + INDEX_BITS);
    Decomposed { tag, index, offset }
}

fn line_base_addr(tag: u32, index: usize) -> u32 {
    (tag << (OFFSET_BITS + INDEX_BITS)) | ((index as u32) << OFFSET_BITS)
}

impl Cache {
    /// Creates an empty cache. Equivalent to [`Self::reset`] on a fresh
    /// value, kept separate so callers can tell "never touched" from
    /// "explicitly cleared" in logs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidates every line without writing back dirty data. Used at
    /// VM-loop start before a cold boot or resume; guest RAM is about to
    /// be overwritten wholesale by image loading or snapshot restore, so
    /// any pending writeback would be wasted work.
    pub fn reset(&mut self) {
        for set in &mut self.sets {
            for line in set {
                *line = Line::default();
            }
        }
    }

    /// Writes back every dirty, valid line without invalidating it.
    ///
    /// Must be called exactly once, immediately before a hibernation
    /// snapshot of backing RAM, so the snapshot reflects guest-visible
    /// state rather than whatever is still sitting in the cache.
    pub fn flush(&mut self, store: &mut impl BackingStore) {
        for (index, set) in self.sets.iter_mut().enumerate() {
            for way in set {
                flush_line(way, index, store);
            }
        }
    }

    /// Reads `size` (1, 2, or 4) bytes at `addr`.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if the access would cross a line
    /// boundary. The interpreter's own aligned-access decoding makes
    /// this unreachable in practice; the cache does not attempt to
    /// split or clamp such a request.
    pub fn read(&mut self, addr: u32, size: usize, store: &mut impl BackingStore) -> u32 {
        debug_assert!(size == 1 || size == 2 || size == 4);
        let d = decompose(addr);
        debug_assert!(d.offset + size <= CACHE_LINE_SIZE, "cross-line access at {addr:#x}");
        let way = self.lookup_or_refill(&d, store);
        let line = &self.sets[d.index][way];
        read_sized(&line.data, d.offset, size)
    }

    /// Writes `size` (1, 2, or 4) bytes of `value` at `addr`, marking the
    /// line dirty.
    ///
    /// # Panics
    ///
    /// Same cross-line precondition as [`Self::read`].
    pub fn write(&mut self, addr: u32, size: usize, value: u32, store: &mut impl BackingStore) {
        debug_assert!(size == 1 || size == 2 || size == 4);
        let d = decompose(addr);
        debug_assert!(d.offset + size <= CACHE_LINE_SIZE, "cross-line access at {addr:#x}");
        let way = self.lookup_or_refill(&d, store);
        let line = &mut self.sets[d.index][way];
        write_sized(&mut line.data, d.offset, size, value);
        line.flags |= LineFlags::DIRTY;
    }

    /// Finds the hit way for `d`, or evicts and refills a victim, setting
    /// the LRU bit on the sibling either way. Returns the way index now
    /// holding `d`'s line.
    fn lookup_or_refill(&mut self, d: &Decomposed, store: &mut impl BackingStore) -> usize {
        let set = &mut self.sets[d.index];

        if let Some(hit) = (0..WAYS).find(|&w| {
            set[w].flags.contains(LineFlags::VALID) && set[w].tag == d.tag
        }) {
            Self::touch(set, hit);
            return hit;
        }

        let victim = (0..WAYS)
            .find(|&w| set[w].flags.contains(LineFlags::LRU))
            .unwrap_or(0);

        flush_line(&mut set[victim], d.index, store);

        let base = line_base_addr(d.tag, d.index);
        store.read(base, &mut set[victim].data);
        set[victim].tag = d.tag;
        set[victim].flags = LineFlags::VALID;

        Self::touch(set, victim);
        victim
    }

    /// Clears `touched`'s LRU bit and sets it on the sibling way.
    fn touch(set: &mut [Line; WAYS], touched: usize) {
        for (w, line) in set.iter_mut().enumerate() {
            line.flags.set(LineFlags::LRU, w != touched);
        }
    }
}

/// Writes `line` back to `store` if dirty and valid, then clears dirty.
/// Shared by eviction and [`Cache::flush`] — one writeback rule, not two.
fn flush_line(line: &mut Line, index: usize, store: &mut impl BackingStore) {
    if line.flags.contains(LineFlags::VALID) && line.flags.contains(LineFlags::DIRTY) {
        let base = line_base_addr(line.tag, index);
        store.write(base, &line.data);
        line.flags.remove(LineFlags::DIRTY);
    }
}

fn read_sized(data: &[u8; CACHE_LINE_SIZE], offset: usize, size: usize) -> u32 {
    match size {
        1 => data[offset] as u32,
        2 => u16::from_le_bytes([data[offset], data[offset + 1]]) as u32,
        4 => u32::from_le_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]),
        _ => unreachable!(),
    }
}

fn write_sized(data: &mut [u8; CACHE_LINE_SIZE], offset: usize, size: usize, value: u32) {
    match size {
        1 => data[offset] = value as u8,
        2 => data[offset..offset + 2].copy_from_slice(&(value as u16).to_le_bytes()),
        4 => data[offset..offset + 4].copy_from_slice(&value.to_le_bytes()),
        _ => unreachable!(),
    }
}
