//! Value and use-def data model
//!
//! Every entity an instruction can read (parameters, locals, global
//! references, blocks and other instructions) is a value living in its
//! function's arena and is addressed by a `ValueId`. Each value keeps the
//! list of `Use`s that currently read it, and every use-tracked operand of an
//! instruction appears exactly once in that list.
//!
//! Constants and call targets are embedded in operands directly and carry no
//! use tracking.

use crate::opcode::Opcode;
use klr_common::TypeDesc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle of a value in a function arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

impl ValueId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle of a basic block (blocks are values, so they can be branch targets)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub ValueId);

/// Handle of an instruction (instructions are values, their result is read by uses)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(pub ValueId);

/// Handle of a CFG edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub u32);

/// Handle of a global variable in a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalId(pub u32);

/// Handle of a function in a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub u32);

impl From<BlockId> for ValueId {
    fn from(id: BlockId) -> Self {
        id.0
    }
}

impl From<InstId> for ValueId {
    fn from(id: InstId) -> Self {
        id.0
    }
}

/// Literal constant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Int { value: i64, ty: TypeDesc },
    Float { value: f64, ty: TypeDesc },
    Bool(bool),
    Str(String),
}

impl Constant {
    pub fn int(value: i64) -> Self {
        Constant::Int { value, ty: TypeDesc::int() }
    }

    pub fn int8(value: i8) -> Self {
        Constant::Int { value: value as i64, ty: TypeDesc::Int8 }
    }

    pub fn int16(value: i16) -> Self {
        Constant::Int { value: value as i64, ty: TypeDesc::Int16 }
    }

    pub fn int32(value: i32) -> Self {
        Constant::Int { value: value as i64, ty: TypeDesc::Int32 }
    }

    pub fn int64(value: i64) -> Self {
        Constant::Int { value, ty: TypeDesc::Int64 }
    }

    pub fn float32(value: f32) -> Self {
        Constant::Float { value: value as f64, ty: TypeDesc::Float32 }
    }

    pub fn float64(value: f64) -> Self {
        Constant::Float { value, ty: TypeDesc::Float64 }
    }

    pub fn bool(value: bool) -> Self {
        Constant::Bool(value)
    }

    pub fn string(value: impl Into<String>) -> Self {
        Constant::Str(value.into())
    }

    pub fn ty(&self) -> TypeDesc {
        match self {
            Constant::Int { ty, .. } | Constant::Float { ty, .. } => ty.clone(),
            Constant::Bool(_) => TypeDesc::Bool,
            Constant::Str(_) => TypeDesc::Str,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Constant::Int { value, .. } => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int { value, .. } => write!(f, "{}", value),
            Constant::Float { value, .. } => write!(f, "{:?}", value),
            Constant::Bool(value) => write!(f, "{}", if *value { "True" } else { "False" }),
            Constant::Str(value) => write!(f, "{:?}", value),
        }
    }
}

/// Call target embedded in a `call` instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncRef {
    pub id: FuncId,
    pub name: String,
    pub ret: TypeDesc,
}

/// One operand slot of an instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Use-tracked reference to a value in the same function
    Use(ValueId),
    /// Embedded literal
    Const(Constant),
    /// Embedded call target
    Func(FuncRef),
    /// Detached slot
    Empty,
}

impl Operand {
    pub fn as_use(&self) -> Option<ValueId> {
        match self {
            Operand::Use(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_const(&self) -> Option<&Constant> {
        match self {
            Operand::Const(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Operand::Empty)
    }
}

impl From<ValueId> for Operand {
    fn from(id: ValueId) -> Self {
        Operand::Use(id)
    }
}

impl From<InstId> for Operand {
    fn from(id: InstId) -> Self {
        Operand::Use(id.0)
    }
}

impl From<BlockId> for Operand {
    fn from(id: BlockId) -> Self {
        Operand::Use(id.0)
    }
}

impl From<Constant> for Operand {
    fn from(c: Constant) -> Self {
        Operand::Const(c)
    }
}

/// One def-use edge: operand `slot` of instruction `inst` reads the value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Use {
    pub inst: InstId,
    pub slot: u32,
}

/// Instruction payload
#[derive(Debug, Clone)]
pub struct InstData {
    pub opcode: Opcode,
    /// Sized once at construction
    pub operands: Box<[Operand]>,
    pub block: BlockId,
    /// Linear position, assigned by register allocation
    pub pos: u32,
    /// Protected loop edge, never merged away by block elimination
    pub loop_edge: bool,
    /// Result computed by constant folding
    pub result: Option<Constant>,
}

/// Basic block payload
#[derive(Debug, Clone, Default)]
pub struct BlockData {
    pub insts: Vec<InstId>,
    /// Locals declared in this block
    pub locals: Vec<ValueId>,
    pub in_edges: Vec<EdgeId>,
    pub out_edges: Vec<EdgeId>,
    pub has_branch: bool,
    pub has_ret: bool,
    /// Transient marker for reachability walks
    pub visited: bool,
}

/// Directed CFG arc
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub src: BlockId,
    pub dst: BlockId,
}

/// Kind tag with per-kind payload
#[derive(Debug, Clone)]
pub enum ValueKind {
    /// Function-local reference to a module global
    Global(GlobalId),
    Param { index: usize },
    Local { block: BlockId },
    Block(BlockData),
    Inst(InstData),
}

impl ValueKind {
    pub fn describe(&self) -> &'static str {
        match self {
            ValueKind::Global(_) => "global",
            ValueKind::Param { .. } => "parameter",
            ValueKind::Local { .. } => "local",
            ValueKind::Block(_) => "block",
            ValueKind::Inst(_) => "instruction",
        }
    }
}

/// A value in the function arena
#[derive(Debug, Clone)]
pub struct ValueData {
    pub kind: ValueKind,
    pub ty: Option<TypeDesc>,
    pub name: String,
    /// Printing tag, assigned by `Function::renumber`
    pub tag: Option<u32>,
    /// Register, assigned by register allocation
    pub reg: Option<u32>,
    pub(crate) uses: Vec<Use>,
}

impl ValueData {
    pub fn new(kind: ValueKind, ty: Option<TypeDesc>, name: impl Into<String>) -> Self {
        Self {
            kind,
            ty,
            name: name.into(),
            tag: None,
            reg: None,
            uses: Vec::new(),
        }
    }

    pub fn uses(&self) -> &[Use] {
        &self.uses
    }

    pub fn is_used(&self) -> bool {
        !self.uses.is_empty()
    }

    /// Variables are the values load/store operate on
    pub fn is_variable(&self) -> bool {
        matches!(
            self.kind,
            ValueKind::Global(_) | ValueKind::Param { .. } | ValueKind::Local { .. }
        )
    }

    pub fn is_inst(&self) -> bool {
        matches!(self.kind, ValueKind::Inst(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_types() {
        assert_eq!(Constant::int32(7).ty(), TypeDesc::Int32);
        assert_eq!(Constant::int8(-1).as_int(), Some(-1));
        assert_eq!(Constant::float64(1.5).ty(), TypeDesc::Float64);
        assert_eq!(Constant::bool(true).ty(), TypeDesc::Bool);
        assert_eq!(Constant::string("hi").ty(), TypeDesc::Str);
        assert_eq!(Constant::string("hi").as_int(), None);
    }

    #[test]
    fn test_constant_display() {
        assert_eq!(Constant::int32(600).to_string(), "600");
        assert_eq!(Constant::float64(2.0).to_string(), "2.0");
        assert_eq!(Constant::bool(false).to_string(), "False");
        assert_eq!(Constant::string("a").to_string(), "\"a\"");
    }

    #[test]
    fn test_operand_conversions() {
        let v = ValueId(3);
        assert_eq!(Operand::from(v).as_use(), Some(v));
        assert_eq!(Operand::from(InstId(v)).as_use(), Some(v));
        assert_eq!(Operand::from(Constant::int(1)).as_const(), Some(&Constant::int(1)));
        assert!(Operand::Empty.is_empty());
    }
}
