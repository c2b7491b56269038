//! Opcodes shared by the IR and the target bytecode
//!
//! The IR starts out with generic opcodes (`load`, `store`, `branch`, `add`,
//! `cmplt`, ...). Instruction selection rewrites some of them in place into
//! target opcodes (`move`, `const_int_3`, `jmp_icmplt_imm8`, ...) which the
//! bytecode emitter consumes directly.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Comparison kinds, shared by compare and compare-and-branch opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpKind {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl CmpKind {
    pub fn suffix(&self) -> &'static str {
        match self {
            CmpKind::Eq => "eq",
            CmpKind::Ne => "ne",
            CmpKind::Lt => "lt",
            CmpKind::Gt => "gt",
            CmpKind::Le => "le",
            CmpKind::Ge => "ge",
        }
    }
}

/// Instruction opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    // IR-only opcodes, gone after load removal and instruction selection
    Load,
    Store,
    Branch,

    // Generic arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    /// Generic comparison, produces a bool
    Cmp(CmpKind),

    Call,
    Jmp,
    Return,
    ReturnNone,

    // Target opcodes produced by instruction selection
    Move,
    ConstLoad,
    ConstIntM1,
    /// `const_int_0` ..= `const_int_5`
    ConstInt(u8),
    ConstIntImm8,
    /// `const_float_0` ..= `const_float_3`
    ConstFloat(u8),
    JmpTrue,
    JmpIntCmp(CmpKind),
    JmpIntCmpImm8(CmpKind),
    JmpCmp(CmpKind),
}

impl Opcode {
    /// Whether the instruction defines a new value that needs a register.
    ///
    /// Stores and their lowered forms write into an existing variable and
    /// branches/returns define nothing.
    pub fn has_value(&self) -> bool {
        !matches!(
            self,
            Opcode::Store
                | Opcode::Branch
                | Opcode::Jmp
                | Opcode::Return
                | Opcode::ReturnNone
                | Opcode::Move
                | Opcode::ConstLoad
                | Opcode::ConstIntM1
                | Opcode::ConstInt(_)
                | Opcode::ConstIntImm8
                | Opcode::ConstFloat(_)
                | Opcode::JmpTrue
                | Opcode::JmpIntCmp(_)
                | Opcode::JmpIntCmpImm8(_)
                | Opcode::JmpCmp(_)
        )
    }

    /// Opcodes constant folding may evaluate statically
    pub fn is_foldable(&self) -> bool {
        matches!(self, Opcode::Add | Opcode::Sub | Opcode::Mul)
    }

    pub fn is_cmp(&self) -> bool {
        matches!(self, Opcode::Cmp(_))
    }

    /// Store-like opcodes: operand 0 is the written variable
    pub fn is_store(&self) -> bool {
        matches!(
            self,
            Opcode::Store
                | Opcode::Move
                | Opcode::ConstLoad
                | Opcode::ConstIntM1
                | Opcode::ConstInt(_)
                | Opcode::ConstIntImm8
                | Opcode::ConstFloat(_)
        )
    }

    /// Conditional branches in either IR or lowered form
    pub fn is_cond_branch(&self) -> bool {
        matches!(
            self,
            Opcode::Branch
                | Opcode::JmpTrue
                | Opcode::JmpIntCmp(_)
                | Opcode::JmpIntCmpImm8(_)
                | Opcode::JmpCmp(_)
        )
    }

    pub fn is_terminator(&self) -> bool {
        self.is_cond_branch() || matches!(self, Opcode::Jmp | Opcode::Return | Opcode::ReturnNone)
    }

    /// Instructions without side effects which may be deleted once unused
    pub fn is_pure(&self) -> bool {
        matches!(
            self,
            Opcode::Load
                | Opcode::Add
                | Opcode::Sub
                | Opcode::Mul
                | Opcode::Div
                | Opcode::Mod
                | Opcode::Cmp(_)
        )
    }

    pub fn mnemonic(&self) -> String {
        match self {
            Opcode::Load => "load".to_string(),
            Opcode::Store => "store".to_string(),
            Opcode::Branch => "branch".to_string(),
            Opcode::Add => "add".to_string(),
            Opcode::Sub => "sub".to_string(),
            Opcode::Mul => "mul".to_string(),
            Opcode::Div => "div".to_string(),
            Opcode::Mod => "mod".to_string(),
            Opcode::Cmp(kind) => format!("cmp{}", kind.suffix()),
            Opcode::Call => "call".to_string(),
            Opcode::Jmp => "jmp".to_string(),
            Opcode::Return => "ret".to_string(),
            Opcode::ReturnNone => "ret void".to_string(),
            Opcode::Move => "move".to_string(),
            Opcode::ConstLoad => "const_load".to_string(),
            Opcode::ConstIntM1 => "const_int_m1".to_string(),
            Opcode::ConstInt(n) => format!("const_int_{}", n),
            Opcode::ConstIntImm8 => "const_int_imm8".to_string(),
            Opcode::ConstFloat(n) => format!("const_float_{}", n),
            Opcode::JmpTrue => "jmp_true".to_string(),
            Opcode::JmpIntCmp(kind) => format!("jmp_icmp{}", kind.suffix()),
            Opcode::JmpIntCmpImm8(kind) => format!("jmp_icmp{}_imm8", kind.suffix()),
            Opcode::JmpCmp(kind) => format!("jmp_cmp{}", kind.suffix()),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}
