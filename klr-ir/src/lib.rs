//! Koala IR - Intermediate Representation
//!
//! Control-flow graph of basic blocks holding typed instructions, with
//! use-def tracking on every operand. On top of the graph sit the pass
//! framework, the scalar optimizations (load/store elimination, constant
//! folding and propagation, block cleanup), instruction selection for the
//! Koala VM, linear-scan register allocation and the textual/Graphviz dumps.

pub mod builder;
pub mod function;
pub mod module;
pub mod opcode;
pub mod pass;
pub mod passes;
pub mod printer;
pub mod regalloc;
pub mod samples;
pub mod stream;
pub mod value;
pub mod verify;

pub use builder::IrBuilder;
pub use function::Function;
pub use module::{Global, Module};
pub use opcode::{CmpKind, Opcode};
pub use pass::{Pass, PassGroup, PassOptions, DEFAULT_PIPELINE, PASS_NAMES};
pub use printer::{print_cfg, print_dot, print_function, print_module};
pub use regalloc::{
    allocate_registers, Allocation, AllocatorKind, LinearScanAllocator, LiveInterval,
    RegAllocError, RegisterAllocator, UniqueAllocator,
};
pub use stream::{finalize, FinalizedFunction};
pub use value::{BlockId, Constant, EdgeId, FuncId, FuncRef, GlobalId, InstId, Operand, ValueId};
pub use verify::{verify_function, VerifyError};

#[cfg(test)]
mod tests;
