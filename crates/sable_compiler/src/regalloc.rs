//! Register allocation.
//!
//! Registers live in a growable bitset of 32-bit chunks. Allocation is
//! first-fit from the lowest index, so the same sequence of requests always
//! yields the same registers. Registers `0xF0..=0xFF` are reserved for the
//! eight temporaries plus headroom and are never handed out by
//! [`RegAlloc::alloc`].

/// Highest register index a far operand can name.
pub const MAX_REGISTER: u32 = 0xFFFF;

/// First register of the reserved temporary range.
pub const TEMP_BASE: u32 = 0xF0;

/// Chunk 7 covers registers 224..256; its upper half is the reserved range.
const RESERVED_CHUNK: usize = 7;
const RESERVED_BITS: u32 = 0xFFFF_0000;

/// Tags for short-lived temporaries. Each tag can be held once at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Temp {
    /// First operand of an instruction.
    T0 = 0,
    /// Second operand of an instruction.
    T1 = 1,
    /// Third operand of an instruction.
    T2 = 2,
    /// Staging register for far-to-far copies.
    T3 = 3,
    /// Spare.
    T4 = 4,
    /// Holds a reference cell during a write-back.
    T5 = 5,
    /// Spare.
    T6 = 6,
    /// Spare.
    T7 = 7,
}

impl Temp {
    /// Operand temporaries in order.
    pub const OPERANDS: [Temp; 3] = [Temp::T0, Temp::T1, Temp::T2];

    const fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// Bitset register allocator for one frame.
#[derive(Clone, Debug, Default)]
pub struct RegAlloc {
    chunks: Vec<u32>,
    /// Highest register ever allocated.
    max: Option<u32>,
    /// Temporary tags currently held.
    temps: u8,
    /// No chunk below this one has a free bit.
    cursor: usize,
}

impl RegAlloc {
    /// Creates an empty allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the highest register ever allocated, if any.
    #[must_use]
    pub const fn max(&self) -> Option<u32> {
        self.max
    }

    /// Raises the high-water mark to at least `register`.
    pub fn raise_max(&mut self, register: u32) {
        self.max = Some(self.max.map_or(register, |m| m.max(register)));
    }

    fn push_chunk(&mut self) {
        let chunk = if self.chunks.len() == RESERVED_CHUNK {
            RESERVED_BITS
        } else {
            0
        };
        self.chunks.push(chunk);
    }

    /// Allocates the lowest free register, or `None` past the 16-bit limit.
    pub fn alloc(&mut self) -> Option<u32> {
        let mut index = self.cursor;
        loop {
            if index == self.chunks.len() {
                self.push_chunk();
            }
            let block = self.chunks[index];
            if block != u32::MAX {
                let bit = block.trailing_ones();
                let register = u32::try_from(index).ok()? * 32 + bit;
                if register > MAX_REGISTER {
                    return None;
                }
                self.chunks[index] |= 1 << bit;
                self.cursor = index;
                self.raise_max(register);
                return Some(register);
            }
            index += 1;
        }
    }

    /// Allocates a temporary for `tag`. It is an ordinary register when one
    /// is free below `0x100`, otherwise the tag's reserved register.
    ///
    /// # Panics
    ///
    /// Panics if `tag` is already held; that is a compiler defect.
    pub fn alloc_temp(&mut self, tag: Temp) -> u32 {
        assert!(
            self.temps & tag.bit() == 0,
            "temporary register {tag:?} already in use"
        );
        self.temps |= tag.bit();
        let old_max = self.max;
        match self.alloc() {
            Some(register) if register <= 0xFF => register,
            other => {
                if let Some(register) = other {
                    self.free(register);
                }
                self.max = old_max;
                let register = TEMP_BASE + u32::from(tag as u8);
                self.raise_max(register);
                register
            }
        }
    }

    /// Frees a register. Reserved registers are ignored.
    pub fn free(&mut self, register: u32) {
        if (TEMP_BASE..=0xFF).contains(&register) {
            return;
        }
        let chunk = (register / 32) as usize;
        if let Some(block) = self.chunks.get_mut(chunk) {
            *block &= !(1 << (register % 32));
            self.cursor = self.cursor.min(chunk);
        }
    }

    /// Releases a temporary obtained from [`alloc_temp`](Self::alloc_temp).
    pub fn free_temp(&mut self, register: u32, tag: Temp) {
        self.temps &= !tag.bit();
        self.free(register);
    }

    /// Marks a register live without allocating it.
    pub fn touch(&mut self, register: u32) {
        let chunk = (register / 32) as usize;
        while self.chunks.len() <= chunk {
            self.push_chunk();
        }
        self.chunks[chunk] |= 1 << (register % 32);
        self.raise_max(register);
    }

    /// Returns true if a register is marked live.
    #[must_use]
    pub fn check(&self, register: u32) -> bool {
        let chunk = (register / 32) as usize;
        self.chunks
            .get(chunk)
            .is_some_and(|block| block & (1 << (register % 32)) != 0)
    }

    /// Returns true if no temporary tag is held.
    #[must_use]
    pub const fn temps_clear(&self) -> bool {
        self.temps == 0
    }

    /// Returns the live-register bitset with the reserved range cleared.
    #[must_use]
    pub fn live_bits(&self) -> Vec<u32> {
        let mut bits = self.chunks.clone();
        if let Some(block) = bits.get_mut(RESERVED_CHUNK) {
            *block &= !RESERVED_BITS;
        }
        while bits.last() == Some(&0) {
            bits.pop();
        }
        bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_fit_allocation() {
        let mut ra = RegAlloc::new();
        assert_eq!(ra.alloc(), Some(0));
        assert_eq!(ra.alloc(), Some(1));
        assert_eq!(ra.alloc(), Some(2));
        ra.free(1);
        assert_eq!(ra.alloc(), Some(1));
        assert_eq!(ra.alloc(), Some(3));
        assert_eq!(ra.max(), Some(3));
    }

    #[test]
    fn reserved_range_is_skipped() {
        let mut ra = RegAlloc::new();
        for expected in 0..TEMP_BASE {
            assert_eq!(ra.alloc(), Some(expected));
        }
        assert_eq!(ra.alloc(), Some(0x100));
        assert!(ra.check(0xF5));
    }

    #[test]
    fn free_ignores_reserved() {
        let mut ra = RegAlloc::new();
        ra.touch(0xF3);
        ra.free(0xF3);
        assert!(ra.check(0xF3));
    }

    #[test]
    fn temps_use_low_registers_when_free() {
        let mut ra = RegAlloc::new();
        ra.alloc();
        let t = ra.alloc_temp(Temp::T0);
        assert_eq!(t, 1);
        ra.free_temp(t, Temp::T0);
        assert!(!ra.check(1));
        assert!(ra.temps_clear());
    }

    #[test]
    fn temps_fall_back_to_reserved_registers() {
        let mut ra = RegAlloc::new();
        for _ in 0..TEMP_BASE {
            ra.alloc();
        }
        let max = ra.max();
        let t = ra.alloc_temp(Temp::T2);
        assert_eq!(t, 0xF2);
        assert!(!ra.check(0x100));
        assert_eq!(ra.max(), Some(0xF2).max(max));
        ra.free_temp(t, Temp::T2);
        assert!(ra.check(0xF2));
    }

    #[test]
    #[should_panic(expected = "already in use")]
    fn double_temp_panics() {
        let mut ra = RegAlloc::new();
        ra.alloc_temp(Temp::T1);
        ra.alloc_temp(Temp::T1);
    }

    #[test]
    fn runs_out_past_16_bits() {
        let mut ra = RegAlloc::new();
        let mut last = None;
        while let Some(r) = ra.alloc() {
            last = Some(r);
        }
        assert_eq!(last, Some(MAX_REGISTER));
    }

    #[test]
    fn live_bits_hide_reserved_range() {
        let mut ra = RegAlloc::new();
        ra.touch(3);
        ra.touch(0xF0);
        assert_eq!(ra.live_bits(), vec![0b1000]);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Clone, Debug)]
    enum Op {
        Alloc,
        Free(usize),
    }

    fn ops() -> impl Strategy<Value = Vec<Op>> {
        prop::collection::vec(
            prop_oneof![Just(Op::Alloc), any::<usize>().prop_map(Op::Free)],
            0..200,
        )
    }

    fn run(ops: &[Op]) -> Vec<u32> {
        let mut ra = RegAlloc::new();
        let mut live: Vec<u32> = Vec::new();
        let mut issued = Vec::new();
        for op in ops {
            match op {
                Op::Alloc => {
                    let r = ra.alloc().unwrap();
                    assert!(!live.contains(&r), "issued live register {r}");
                    live.push(r);
                    issued.push(r);
                }
                Op::Free(i) if !live.is_empty() => {
                    let r = live.swap_remove(i % live.len());
                    ra.free(r);
                }
                Op::Free(_) => {}
            }
        }
        issued
    }

    proptest! {
        #[test]
        fn allocation_is_deterministic_and_disjoint(ops in ops()) {
            prop_assert_eq!(run(&ops), run(&ops));
        }

        #[test]
        fn allocation_is_lowest_free(ops in ops()) {
            let mut ra = RegAlloc::new();
            let mut live = std::collections::BTreeSet::new();
            for op in &ops {
                match op {
                    Op::Alloc => {
                        let expected = (0..).find(|r| !live.contains(r)).unwrap();
                        let r = ra.alloc().unwrap();
                        prop_assert_eq!(r, expected);
                        live.insert(r);
                    }
                    Op::Free(i) if !live.is_empty() => {
                        let r = *live.iter().nth(i % live.len()).unwrap();
                        live.remove(&r);
                        ra.free(r);
                    }
                    Op::Free(_) => {}
                }
            }
        }
    }
}
