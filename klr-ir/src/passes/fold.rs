//! Constant folding and constant propagation
//!
//! Propagation walks the uses of every variable in program order and forwards
//! the value of the most recent constant store. It does not look at control
//! flow at all, so a store on one side of a branch is forwarded into code on
//! the other side. That limitation is accepted: callers only rely on it for
//! straight-line code.

use crate::function::Function;
use crate::opcode::Opcode;
use crate::value::{Constant, InstId, Operand, ValueId};
use klr_common::TypeDesc;
use log::{debug, trace};

/// Evaluate a foldable binary opcode on two constants of the same kind
pub fn fold_binary(opcode: Opcode, lhs: &Constant, rhs: &Constant) -> Option<Constant> {
    match (lhs, rhs) {
        (Constant::Int { value: a, ty }, Constant::Int { value: b, ty: rhs_ty }) if ty == rhs_ty => {
            let value = match opcode {
                Opcode::Add => a.wrapping_add(*b),
                Opcode::Sub => a.wrapping_sub(*b),
                Opcode::Mul => a.wrapping_mul(*b),
                _ => return None,
            };
            Some(Constant::Int {
                value: wrap_to_width(value, ty),
                ty: ty.clone(),
            })
        }
        (Constant::Float { value: a, ty }, Constant::Float { value: b, ty: rhs_ty })
            if ty == rhs_ty =>
        {
            let value = match opcode {
                Opcode::Add => a + b,
                Opcode::Sub => a - b,
                Opcode::Mul => a * b,
                _ => return None,
            };
            let value = if *ty == TypeDesc::Float32 {
                value as f32 as f64
            } else {
                value
            };
            Some(Constant::Float { value, ty: ty.clone() })
        }
        _ => None,
    }
}

/// Two's-complement wrap of an i64 result to the width of `ty`
fn wrap_to_width(value: i64, ty: &TypeDesc) -> i64 {
    match ty {
        TypeDesc::Int8 => value as i8 as i64,
        TypeDesc::Int16 => value as i16 as i64,
        TypeDesc::Int32 => value as i32 as i64,
        _ => value,
    }
}

/// Replace foldable instructions with constant operands by their result
pub fn constant_folding(func: &mut Function) {
    let mut folded = 0;
    for inst in func.linear_order() {
        let opcode = func.opcode(inst);
        if !opcode.is_foldable() {
            continue;
        }
        let result = match (func.operand(inst, 0), func.operand(inst, 1)) {
            (Operand::Const(lhs), Operand::Const(rhs)) => fold_binary(opcode, lhs, rhs),
            _ => None,
        };
        let Some(result) = result else {
            continue;
        };

        trace!("folded {} ({}) to {}", func.display_name(inst.0), opcode, result);
        func.inst_mut(inst).result = Some(result.clone());
        func.replace_all_uses(inst.0, Operand::Const(result));
        func.delete_inst(inst);
        folded += 1;
    }
    debug!("constant-folding: folded {} instructions in '{}'", folded, func.name);
}

/// Forward constants stored into variables to the reads that follow them
pub fn constant_propagation(func: &mut Function) {
    let index = func.program_index();
    let calls = func.call_positions(&index);

    let mut vars: Vec<(ValueId, bool)> = Vec::new();
    vars.extend(func.params().iter().map(|v| (*v, false)));
    vars.extend(func.locals().iter().map(|v| (*v, false)));
    vars.extend(func.global_refs().iter().map(|(_, v)| (*v, true)));

    let mut propagated = 0;
    for (var, is_global) in vars {
        let mut known: Option<(Constant, usize)> = None;
        for u in func.ordered_uses(var, &index) {
            if !func.is_live(u.inst.0) || func.operand(u.inst, u.slot).as_use() != Some(var) {
                continue;
            }
            let pos = index[&u.inst];

            // A callee may write the global
            if is_global {
                if let Some((_, store_pos)) = &known {
                    if calls.iter().any(|c| *c > *store_pos && *c < pos) {
                        known = None;
                    }
                }
            }

            let opcode = func.opcode(u.inst);
            if opcode.is_store() && u.slot == 0 {
                known = func
                    .operand(u.inst, 1)
                    .as_const()
                    .map(|c| (c.clone(), pos));
                continue;
            }

            let Some((constant, _)) = &known else {
                continue;
            };
            let constant = constant.clone();
            trace!(
                "propagating {} into {} ({})",
                constant,
                func.display_name(u.inst.0),
                opcode
            );
            if opcode == Opcode::Load {
                forward_load(func, u.inst, constant);
            } else {
                func.redirect(u, Operand::Const(constant));
            }
            propagated += 1;
        }
    }
    debug!("constant-propagation: rewrote {} uses in '{}'", propagated, func.name);
}

/// A load of a known constant is the constant itself
fn forward_load(func: &mut Function, load: InstId, constant: Constant) {
    func.replace_all_uses(load.0, Operand::Const(constant));
    func.delete_inst(load);
}
