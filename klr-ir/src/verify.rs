//! Structural verifier
//!
//! Checks the invariants every pass must restore before returning: edges are
//! present in exactly their three lists, use-lists mirror instruction operands
//! one-to-one, blocks and instructions are live and correctly parented, and
//! a terminator is always the last instruction of its block.

use crate::function::Function;
use crate::opcode::Opcode;
use crate::value::{BlockId, EdgeId, InstId, Operand, Use, ValueId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VerifyError {
    #[error("edge e{edge} ({src} -> {dst}) is listed {count} times in {list}")]
    EdgeMembership {
        edge: u32,
        src: String,
        dst: String,
        list: &'static str,
        count: usize,
    },

    #[error("block {block} lists edge e{edge} which does not touch it")]
    ForeignEdge { block: String, edge: u32 },

    #[error("block {block} lists deleted edge e{edge}")]
    DeletedEdge { block: String, edge: u32 },

    #[error("{block} is not a live block")]
    DeadBlock { block: String },

    #[error("instruction {inst} in {block} is deleted or claims another block")]
    WrongParent { inst: String, block: String },

    #[error("operand {slot} of {inst} refers to a deleted value")]
    DanglingOperand { inst: String, slot: u32 },

    #[error("operand {slot} of {inst} appears {count} times in the use-list of {value}")]
    UseMismatch {
        inst: String,
        slot: u32,
        value: String,
        count: usize,
    },

    #[error("use-list of {value} has an entry for operand {slot} of {inst} which reads something else")]
    StaleUse {
        value: String,
        inst: String,
        slot: u32,
    },

    #[error("branch target {slot} of {inst} is not a block")]
    BadTarget { inst: String, slot: u32 },

    #[error("terminator {inst} is not the last instruction of {block}")]
    EarlyTerminator { inst: String, block: String },
}

struct Verifier<'a> {
    func: &'a Function,
}

impl<'a> Verifier<'a> {
    fn name(&self, id: impl Into<ValueId>) -> String {
        let id = id.into();
        if self.func.is_live(id) {
            self.func.display_name(id)
        } else {
            format!("<deleted v{}>", id.0)
        }
    }

    fn all_blocks(&self) -> Vec<BlockId> {
        let mut blocks = vec![self.func.start()];
        blocks.extend(self.func.blocks().iter().copied());
        blocks.push(self.func.end());
        blocks
    }

    fn check_edges(&self) -> Result<(), VerifyError> {
        let func = self.func;
        for &e in func.edges() {
            let edge = func.edge(e);
            for end in [edge.src, edge.dst] {
                if func.as_block(end.0).is_none() {
                    return Err(VerifyError::DeadBlock { block: self.name(end) });
                }
            }
            let counts = [
                ("the edge list", func.edges().iter().filter(|x| **x == e).count()),
                (
                    "the source's out-edges",
                    func.block(edge.src).out_edges.iter().filter(|x| **x == e).count(),
                ),
                (
                    "the destination's in-edges",
                    func.block(edge.dst).in_edges.iter().filter(|x| **x == e).count(),
                ),
            ];
            for (list, count) in counts {
                if count != 1 {
                    return Err(VerifyError::EdgeMembership {
                        edge: e.0,
                        src: self.name(edge.src),
                        dst: self.name(edge.dst),
                        list,
                        count,
                    });
                }
            }
        }

        for bb in self.all_blocks() {
            let data = func.block(bb);
            let lists: [(&Vec<EdgeId>, bool); 2] = [(&data.in_edges, true), (&data.out_edges, false)];
            for (list, incoming) in lists {
                for &e in list {
                    if !func.edges().contains(&e) {
                        return Err(VerifyError::DeletedEdge {
                            block: self.name(bb),
                            edge: e.0,
                        });
                    }
                    let edge = func.edge(e);
                    let end = if incoming { edge.dst } else { edge.src };
                    if end != bb {
                        return Err(VerifyError::ForeignEdge {
                            block: self.name(bb),
                            edge: e.0,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn check_operand(&self, inst: InstId, slot: u32, operand: &Operand) -> Result<(), VerifyError> {
        let Operand::Use(id) = operand else {
            return Ok(());
        };
        if !self.func.is_live(*id) {
            return Err(VerifyError::DanglingOperand {
                inst: self.name(inst),
                slot,
            });
        }
        let expected = Use { inst, slot };
        let count = self.func.uses(*id).iter().filter(|u| **u == expected).count();
        if count != 1 {
            return Err(VerifyError::UseMismatch {
                inst: self.name(inst),
                slot,
                value: self.name(*id),
                count,
            });
        }
        Ok(())
    }

    fn check_targets(&self, inst: InstId) -> Result<(), VerifyError> {
        let opcode = self.func.opcode(inst);
        let slots: &[u32] = match opcode {
            Opcode::Jmp => &[0],
            op if op.is_cond_branch() => &[2, 3],
            _ => &[],
        };
        for &slot in slots {
            let ok = self
                .func
                .operand(inst, slot)
                .as_use()
                .and_then(|id| self.func.as_block(id))
                .is_some();
            if !ok {
                return Err(VerifyError::BadTarget {
                    inst: self.name(inst),
                    slot,
                });
            }
        }
        Ok(())
    }

    fn check_blocks(&self) -> Result<(), VerifyError> {
        let func = self.func;
        for &bb in func.blocks() {
            if func.as_block(bb.0).is_none() {
                return Err(VerifyError::DeadBlock {
                    block: self.name(bb),
                });
            }
            let insts = func.insts(bb);
            for (i, &inst) in insts.iter().enumerate() {
                if func.as_inst(inst.0).is_none() || func.inst(inst).block != bb {
                    return Err(VerifyError::WrongParent {
                        inst: self.name(inst),
                        block: self.name(bb),
                    });
                }
                for (slot, operand) in func.operands(inst).iter().enumerate() {
                    self.check_operand(inst, slot as u32, operand)?;
                }
                self.check_targets(inst)?;
                if func.opcode(inst).is_terminator() && i + 1 != insts.len() {
                    return Err(VerifyError::EarlyTerminator {
                        inst: self.name(inst),
                        block: self.name(bb),
                    });
                }
            }
        }
        Ok(())
    }

    fn check_use_lists(&self) -> Result<(), VerifyError> {
        let func = self.func;
        for (id, data) in func.values() {
            for u in data.uses() {
                let reads_back = func.as_inst(u.inst.0).is_some()
                    && func.operands(u.inst).get(u.slot as usize) == Some(&Operand::Use(id));
                if !reads_back {
                    return Err(VerifyError::StaleUse {
                        value: self.name(id),
                        inst: self.name(u.inst),
                        slot: u.slot,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Check the structural invariants of a function
pub fn verify_function(func: &Function) -> Result<(), VerifyError> {
    let verifier = Verifier { func };
    verifier.check_edges()?;
    verifier.check_blocks()?;
    verifier.check_use_lists()?;
    Ok(())
}
