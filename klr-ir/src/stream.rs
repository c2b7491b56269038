//! Finalized instruction stream handed to the bytecode emitter
//!
//! After passes and register allocation, every operand is resolved to a
//! register, an embedded constant, a block index or a symbol name.

use crate::function::Function;
use crate::opcode::Opcode;
use crate::regalloc::{produces_value, RegAllocError};
use crate::value::{BlockId, Constant, Operand, ValueId, ValueKind};
use klr_common::TypeDesc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamOperand {
    Reg(u32),
    Const(Constant),
    /// Index into `FinalizedFunction::blocks`
    Block(usize),
    Func(String),
    Global(String),
    /// Unused slot, e.g. the second operand of `jmp_true`
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInst {
    pub opcode: Opcode,
    pub dest: Option<u32>,
    pub operands: Vec<StreamOperand>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamBlock {
    pub label: String,
    pub insts: Vec<StreamInst>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedFunction {
    pub name: String,
    pub ret: TypeDesc,
    /// Registers holding the parameters, in order
    pub params: Vec<u32>,
    pub num_registers: u32,
    pub blocks: Vec<StreamBlock>,
}

fn register(func: &Function, id: ValueId) -> Result<u32, RegAllocError> {
    func.value(id)
        .reg
        .ok_or_else(|| RegAllocError::Unallocated(func.display_name(id)))
}

fn block_index(func: &Function, bb: BlockId) -> usize {
    match func.blocks().iter().position(|b| *b == bb) {
        Some(index) => index,
        None => panic!("{} is not in the block list", func.display_name(bb.0)),
    }
}

fn resolve(func: &Function, operand: &Operand) -> Result<StreamOperand, RegAllocError> {
    let resolved = match operand {
        Operand::Use(id) => match &func.value(*id).kind {
            ValueKind::Block(_) => StreamOperand::Block(block_index(func, BlockId(*id))),
            ValueKind::Global(_) => StreamOperand::Global(func.value(*id).name.clone()),
            _ => StreamOperand::Reg(register(func, *id)?),
        },
        Operand::Const(c) => StreamOperand::Const(c.clone()),
        Operand::Func(f) => StreamOperand::Func(f.name.clone()),
        Operand::Empty => StreamOperand::None,
    };
    Ok(resolved)
}

/// Resolve a register-allocated function into its emitter-facing form
pub fn finalize(func: &Function) -> Result<FinalizedFunction, RegAllocError> {
    let mut num_registers = 0;
    let mut note = |reg: u32| num_registers = num_registers.max(reg + 1);

    let mut params = Vec::with_capacity(func.params().len());
    for param in func.params() {
        let reg = register(func, *param)?;
        note(reg);
        params.push(reg);
    }

    let mut blocks = Vec::with_capacity(func.blocks().len());
    for (index, bb) in func.blocks().iter().enumerate() {
        let name = &func.value(bb.0).name;
        let label = if name.is_empty() {
            format!("bb{}", index)
        } else {
            name.clone()
        };

        let mut insts = Vec::with_capacity(func.insts(*bb).len());
        for inst in func.insts(*bb) {
            let dest = if produces_value(func, *inst) {
                let reg = register(func, inst.0)?;
                note(reg);
                Some(reg)
            } else {
                None
            };
            let operands = func
                .operands(*inst)
                .iter()
                .map(|op| resolve(func, op))
                .collect::<Result<Vec<_>, _>>()?;
            for op in &operands {
                if let StreamOperand::Reg(reg) = op {
                    note(*reg);
                }
            }
            insts.push(StreamInst {
                opcode: func.opcode(*inst),
                dest,
                operands,
            });
        }
        blocks.push(StreamBlock { label, insts });
    }

    Ok(FinalizedFunction {
        name: func.name.clone(),
        ret: func.ret.clone(),
        params,
        num_registers,
        blocks,
    })
}

impl FinalizedFunction {
    pub fn opcodes(&self) -> Vec<Opcode> {
        self.blocks
            .iter()
            .flat_map(|b| b.insts.iter().map(|i| i.opcode))
            .collect()
    }
}
