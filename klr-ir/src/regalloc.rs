//! Register Allocation
//!
//! Every instruction gets a linear position in block order, starting at 1;
//! parameters live from position 0. Each parameter, local and value-producing
//! instruction gets a half-open interval `[start, end)` over those positions.
//!
//! `LinearScanAllocator` sweeps the positions once, returning the registers of
//! intervals that end before handing out registers to intervals that start.
//! There is no spilling: running out of registers is an error.
//! `UniqueAllocator` gives every interval its own register and is the simpler
//! choice for debug builds.

use crate::function::Function;
use crate::value::{InstId, ValueId};
use log::{debug, trace};
use thiserror::Error;

/// Size of the virtual register file
pub const MAX_REGISTERS: usize = 256;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegAllocError {
    #[error("No available registers for {value} at position {pos} ({count} registers)")]
    OutOfRegisters {
        value: String,
        pos: u32,
        count: usize,
    },

    #[error("Value {0} has no register")]
    Unallocated(String),
}

/// Live range of a value over linear positions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveInterval {
    pub value: ValueId,
    pub start: u32,
    /// Exclusive
    pub end: u32,
    pub reg: Option<u32>,
}

impl LiveInterval {
    pub fn new(value: ValueId, start: u32, end: u32) -> Self {
        LiveInterval {
            value,
            start,
            end,
            reg: None,
        }
    }

    pub fn contains(&self, pos: u32) -> bool {
        pos >= self.start && pos < self.end
    }

    pub fn overlaps(&self, other: &LiveInterval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Result of register allocation
#[derive(Debug, Clone, Default)]
pub struct Allocation {
    pub intervals: Vec<LiveInterval>,
    /// Highest register number used plus one
    pub registers_used: u32,
}

impl Allocation {
    pub fn interval(&self, value: ValueId) -> Option<&LiveInterval> {
        self.intervals.iter().find(|i| i.value == value)
    }
}

pub trait RegisterAllocator {
    fn allocate(&mut self, func: &mut Function) -> Result<Allocation, RegAllocError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocatorKind {
    LinearScan,
    Unique,
}

impl Default for AllocatorKind {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            AllocatorKind::Unique
        } else {
            AllocatorKind::LinearScan
        }
    }
}

impl AllocatorKind {
    pub fn allocator(self) -> Box<dyn RegisterAllocator> {
        match self {
            AllocatorKind::LinearScan => Box::new(LinearScanAllocator::new()),
            AllocatorKind::Unique => Box::new(UniqueAllocator),
        }
    }
}

/// Allocate registers for `func` with the chosen strategy
pub fn allocate_registers(
    func: &mut Function,
    kind: AllocatorKind,
) -> Result<Allocation, RegAllocError> {
    kind.allocator().allocate(func)
}

/// Number every instruction in block order, starting at 1. Returns the last
/// position.
pub fn number_positions(func: &mut Function) -> u32 {
    let mut pos = 0;
    for inst in func.linear_order() {
        pos += 1;
        func.inst_mut(inst).pos = pos;
    }
    pos
}

/// Instructions that define a value needing a register
pub fn produces_value(func: &Function, inst: InstId) -> bool {
    func.opcode(inst).has_value()
        && func
            .value(inst.0)
            .ty
            .as_ref()
            .is_some_and(|ty| !ty.is_void())
}

/// Number positions and compute one interval per parameter, used local and
/// value-producing instruction. Every interval covers at least one position.
pub fn compute_intervals(func: &mut Function) -> Vec<LiveInterval> {
    number_positions(func);
    let func = &*func;
    let pos_of = |inst: InstId| func.inst(inst).pos;
    let last_use = |value: ValueId| func.uses(value).iter().map(|u| pos_of(u.inst)).max();

    let mut intervals = Vec::new();
    for param in func.params() {
        let end = last_use(*param).unwrap_or(0).max(1);
        intervals.push(LiveInterval::new(*param, 0, end));
    }

    for local in func.locals() {
        let uses = func.uses(*local);
        if uses.is_empty() {
            continue;
        }
        let first_store = uses
            .iter()
            .filter(|u| u.slot == 0 && func.opcode(u.inst).is_store())
            .map(|u| pos_of(u.inst))
            .min();
        let first_use = uses.iter().map(|u| pos_of(u.inst)).min().unwrap_or(0);
        let start = first_store.unwrap_or(first_use).min(first_use);
        let end = last_use(*local).unwrap_or(start).max(start + 1);
        intervals.push(LiveInterval::new(*local, start, end));
    }

    for inst in func.linear_order() {
        if !produces_value(func, inst) {
            continue;
        }
        let start = pos_of(inst);
        let end = last_use(inst.0).unwrap_or(start).max(start + 1);
        intervals.push(LiveInterval::new(inst.0, start, end));
    }

    intervals.sort_by_key(|i| (i.start, i.value));
    intervals
}

fn clear_registers(func: &mut Function) {
    let ids: Vec<ValueId> = func.values().map(|(id, _)| id).collect();
    for id in ids {
        func.value_mut(id).reg = None;
    }
}

/// Free register numbers, one bit per register
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegPool {
    free: [u64; MAX_REGISTERS / 64],
    count: usize,
}

impl RegPool {
    pub fn new(count: usize) -> Self {
        assert!(count <= MAX_REGISTERS, "at most {} registers", MAX_REGISTERS);
        let mut free = [0u64; MAX_REGISTERS / 64];
        for reg in 0..count {
            free[reg / 64] |= 1u64 << (reg % 64);
        }
        RegPool { free, count }
    }

    /// Take the lowest free register
    pub fn take(&mut self) -> Option<u32> {
        for (word, bits) in self.free.iter_mut().enumerate() {
            if *bits != 0 {
                let bit = bits.trailing_zeros();
                *bits &= !(1u64 << bit);
                return Some(word as u32 * 64 + bit);
            }
        }
        None
    }

    pub fn release(&mut self, reg: u32) {
        let (word, bit) = (reg as usize / 64, reg % 64);
        assert!(
            (reg as usize) < self.count && self.free[word] & (1u64 << bit) == 0,
            "register {} released twice",
            reg
        );
        self.free[word] |= 1u64 << bit;
    }

    pub fn available(&self) -> u32 {
        self.free.iter().map(|w| w.count_ones()).sum()
    }
}

/// Linear scan over a fixed pool of registers
#[derive(Debug, Clone)]
pub struct LinearScanAllocator {
    num_registers: usize,
}

impl Default for LinearScanAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearScanAllocator {
    pub fn new() -> Self {
        Self {
            num_registers: MAX_REGISTERS,
        }
    }

    /// Allocator for a smaller register file; at most `MAX_REGISTERS`
    pub fn with_registers(num_registers: usize) -> Self {
        assert!(num_registers <= MAX_REGISTERS);
        Self { num_registers }
    }
}

impl RegisterAllocator for LinearScanAllocator {
    fn allocate(&mut self, func: &mut Function) -> Result<Allocation, RegAllocError> {
        clear_registers(func);
        let mut intervals = compute_intervals(func);
        let max_pos = intervals.iter().map(|i| i.end).max().unwrap_or(0);
        let mut pool = RegPool::new(self.num_registers);
        let mut active: Vec<usize> = Vec::new();
        let mut next = 0;
        let mut used = 0;

        for pos in 0..=max_pos {
            // Expire first so a value defined where another dies can reuse it
            active.retain(|&idx| {
                let interval = &intervals[idx];
                if interval.end <= pos {
                    if let Some(reg) = interval.reg {
                        trace!("pos {}: free r{} of {:?}", pos, reg, interval.value);
                        pool.release(reg);
                    }
                    false
                } else {
                    true
                }
            });

            while next < intervals.len() && intervals[next].start == pos {
                let value = intervals[next].value;
                let Some(reg) = pool.take() else {
                    return Err(RegAllocError::OutOfRegisters {
                        value: func.display_name(value),
                        pos,
                        count: self.num_registers,
                    });
                };
                debug!("pos {}: r{} -> {}", pos, reg, func.display_name(value));
                intervals[next].reg = Some(reg);
                func.value_mut(value).reg = Some(reg);
                used = used.max(reg + 1);
                active.push(next);
                next += 1;
            }
        }

        Ok(Allocation {
            intervals,
            registers_used: used,
        })
    }
}

/// One register per value, never reused
#[derive(Debug, Clone, Copy, Default)]
pub struct UniqueAllocator;

impl RegisterAllocator for UniqueAllocator {
    fn allocate(&mut self, func: &mut Function) -> Result<Allocation, RegAllocError> {
        clear_registers(func);
        let mut intervals = compute_intervals(func);
        for (reg, interval) in intervals.iter_mut().enumerate() {
            let reg = reg as u32;
            debug!("r{} -> {}", reg, func.display_name(interval.value));
            interval.reg = Some(reg);
            func.value_mut(interval.value).reg = Some(reg);
        }
        Ok(Allocation {
            registers_used: intervals.len() as u32,
            intervals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IrBuilder;
    use crate::value::{Constant, FuncId};
    use klr_common::TypeDesc;
    use pretty_assertions::assert_eq;

    /// `%0 = load a; %1 = add %0, 1; %2 = add %1, 2; ret %2`
    fn chain() -> Function {
        let mut func = Function::new(FuncId(0), "chain", TypeDesc::Int32);
        let a = func.add_param("a", TypeDesc::Int32);
        let entry = func.append_block("entry");
        let mut b = IrBuilder::at_end(&mut func, entry);
        let load = b.build_load(a).unwrap();
        let x = b.build_add(load, Constant::int32(1)).unwrap();
        let y = b.build_add(x, Constant::int32(2)).unwrap();
        b.build_ret(y).unwrap();
        func
    }

    #[test]
    fn test_reg_pool() {
        let mut pool = RegPool::new(130);
        assert_eq!(pool.available(), 130);
        for expected in 0..130 {
            assert_eq!(pool.take(), Some(expected));
        }
        assert_eq!(pool.take(), None);
        pool.release(70);
        assert_eq!(pool.take(), Some(70));
    }

    #[test]
    #[should_panic(expected = "released twice")]
    fn test_double_release_panics() {
        let mut pool = RegPool::new(4);
        pool.release(1);
    }

    #[test]
    fn test_intervals() {
        let mut func = chain();
        let intervals = compute_intervals(&mut func);
        let spans: Vec<(u32, u32)> = intervals.iter().map(|i| (i.start, i.end)).collect();
        // a: [0,1), load: [1,2), x: [2,3), y: [3,4)
        assert_eq!(spans, vec![(0, 1), (1, 2), (2, 3), (3, 4)]);
    }

    #[test]
    fn test_linear_scan_reuses_registers() {
        let mut func = chain();
        let alloc = LinearScanAllocator::with_registers(2).allocate(&mut func).unwrap();
        assert_eq!(alloc.registers_used, 1);
        assert!(alloc.intervals.iter().all(|i| i.reg == Some(0)));
    }

    #[test]
    fn test_unique_allocator_never_reuses() {
        let mut func = chain();
        let alloc = UniqueAllocator.allocate(&mut func).unwrap();
        let regs: Vec<Option<u32>> = alloc.intervals.iter().map(|i| i.reg).collect();
        assert_eq!(regs, vec![Some(0), Some(1), Some(2), Some(3)]);
        assert_eq!(func.value(func.params()[0]).reg, Some(0));
    }

    #[test]
    fn test_out_of_registers() {
        let mut func = Function::new(FuncId(0), "wide", TypeDesc::Int32);
        let a = func.add_param("a", TypeDesc::Int32);
        let entry = func.append_block("entry");
        let mut b = IrBuilder::at_end(&mut func, entry);
        let l1 = b.build_load(a).unwrap();
        let l2 = b.build_load(a).unwrap();
        let l3 = b.build_load(a).unwrap();
        let s1 = b.build_add(l1, l2).unwrap();
        let s2 = b.build_add(s1, l3).unwrap();
        b.build_ret(s2).unwrap();

        let err = LinearScanAllocator::with_registers(2)
            .allocate(&mut func)
            .unwrap_err();
        assert!(matches!(err, RegAllocError::OutOfRegisters { count: 2, .. }));

        let alloc = LinearScanAllocator::with_registers(3).allocate(&mut func).unwrap();
        assert_eq!(alloc.registers_used, 3);
    }

    #[test]
    fn test_unused_values_get_registers() {
        let mut func = Function::new(FuncId(0), "unused", TypeDesc::Void);
        let a = func.add_param("a", TypeDesc::Int32);
        let entry = func.append_block("entry");
        let mut b = IrBuilder::at_end(&mut func, entry);
        let load = b.build_load(a).unwrap();
        b.build_ret_void();

        LinearScanAllocator::new().allocate(&mut func).unwrap();
        assert!(func.value(a).reg.is_some());
        assert!(func.value(load.0).reg.is_some());
    }

    #[test]
    fn test_overlapping_intervals_differ() {
        let mut func = Function::new(FuncId(0), "mix", TypeDesc::Int32);
        let a = func.add_param("a", TypeDesc::Int32);
        let p = func.add_param("p", TypeDesc::Int32);
        let entry = func.append_block("entry");
        let mut b = IrBuilder::at_end(&mut func, entry);
        let t = b.add_local("t", TypeDesc::Int32);
        let la = b.build_load(a).unwrap();
        b.build_store(t, la).unwrap();
        let lp = b.build_load(p).unwrap();
        let m = b.build_mul(lp, Constant::int32(3)).unwrap();
        let lt = b.build_load(t).unwrap();
        let s = b.build_add(m, lt).unwrap();
        let s2 = b.build_add(s, la).unwrap();
        b.build_ret(s2).unwrap();

        let alloc = LinearScanAllocator::new().allocate(&mut func).unwrap();
        for (i, x) in alloc.intervals.iter().enumerate() {
            for y in &alloc.intervals[i + 1..] {
                if x.overlaps(y) {
                    assert_ne!(x.reg, y.reg, "{:?} and {:?}", x, y);
                }
            }
        }
    }

    #[test]
    fn test_default_kind() {
        let expected = if cfg!(debug_assertions) {
            AllocatorKind::Unique
        } else {
            AllocatorKind::LinearScan
        };
        assert_eq!(AllocatorKind::default(), expected);
    }
}
