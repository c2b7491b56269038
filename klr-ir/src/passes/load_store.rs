//! Redundant load and dead store elimination

use crate::function::Function;
use crate::opcode::Opcode;
use crate::value::{InstId, Operand, ValueId};
use log::{debug, trace};

/// Replace every load by the variable it reads.
///
/// Readers of the load now read the variable directly, which is only correct
/// while reads and writes of a variable are in linear program order.
pub fn remove_load(func: &mut Function) {
    let mut removed = 0;
    for inst in func.linear_order() {
        if func.opcode(inst) != Opcode::Load {
            continue;
        }
        let var = func.operand(inst, 0).clone();
        func.replace_all_uses(inst.0, var);
        func.delete_inst(inst);
        removed += 1;
    }
    debug!("remove-load: removed {} loads from '{}'", removed, func.name);
}

/// Delete a store together with the computation that only fed it
fn delete_store(func: &mut Function, store: InstId) {
    trace!("removing store {:?} in '{}'", store.0, func.name);
    let value = func.detach(store, 1);
    func.delete_inst(store);
    if let Operand::Use(id) = value {
        if let Some(inst) = func.as_inst(id) {
            func.remove_if_dead(inst);
        }
    }
}

/// Delete a store that is overwritten before anything reads the variable.
///
/// Globals are included, but a call between two stores to a global keeps
/// the earlier one since the callee may read it.
pub fn remove_store(func: &mut Function) {
    let index = func.program_index();
    let calls = func.call_positions(&index);

    let mut vars: Vec<(ValueId, bool)> = Vec::new();
    vars.extend(func.params().iter().map(|v| (*v, false)));
    vars.extend(func.locals().iter().map(|v| (*v, false)));
    vars.extend(func.global_refs().iter().map(|(_, v)| (*v, true)));

    let mut removed = 0;
    for (var, is_global) in vars {
        let mut pending: Option<(InstId, usize)> = None;
        for u in func.ordered_uses(var, &index) {
            if !func.is_live(u.inst.0) || func.operand(u.inst, u.slot).as_use() != Some(var) {
                continue;
            }
            let pos = index[&u.inst];

            if is_global {
                if let Some((_, store_pos)) = pending {
                    if calls.iter().any(|c| *c > store_pos && *c < pos) {
                        pending = None;
                    }
                }
            }

            if func.opcode(u.inst).is_store() && u.slot == 0 {
                if let Some((prev, _)) = pending.replace((u.inst, pos)) {
                    delete_store(func, prev);
                    removed += 1;
                }
            } else {
                pending = None;
            }
        }
    }
    debug!("remove-store: removed {} stores from '{}'", removed, func.name);
}

/// Drop locals that are never read: every store into them is dead, and a
/// local nothing refers to any more is removed from the function.
pub fn remove_unused(func: &mut Function) {
    let mut removed = 0;
    for local in func.locals().to_vec() {
        let uses = func.uses(local).to_vec();
        let write_only = uses
            .iter()
            .all(|u| u.slot == 0 && func.opcode(u.inst).is_store());
        if !write_only {
            continue;
        }
        for u in uses {
            delete_store(func, u.inst);
        }
        func.remove_local(local);
        removed += 1;
    }
    debug!("remove-unused: removed {} locals from '{}'", removed, func.name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IrBuilder;
    use crate::module::Module;
    use crate::value::Constant;
    use klr_common::TypeDesc;
    use pretty_assertions::assert_eq;

    fn module() -> (Module, crate::value::FuncId) {
        let mut m = Module::new("test");
        let f = m.add_function("f", &[("a", TypeDesc::Int32)], TypeDesc::Int32);
        (m, f)
    }

    #[test]
    fn test_remove_load_reads_variable() {
        let (mut m, f) = module();
        let func = m.function_mut(f);
        let bb = func.append_block("entry");
        let mut b = IrBuilder::at_end(func, bb);
        let a = b.param(0).unwrap();
        let load = b.build_load(a).unwrap();
        let add = b.build_add(load, Constant::int32(1)).unwrap();
        b.build_ret(add).unwrap();

        remove_load(func);
        assert!(!func.is_live(load.0));
        assert_eq!(func.operand(add, 0), &Operand::Use(a));
        assert_eq!(func.uses(a).len(), 1);
    }

    #[test]
    fn test_consecutive_stores_keep_the_later() {
        let (mut m, f) = module();
        let func = m.function_mut(f);
        let bb = func.append_block("entry");
        let mut b = IrBuilder::at_end(func, bb);
        let x = b.add_local("x", TypeDesc::Int32);
        let first = b.build_store(x, Constant::int32(1)).unwrap();
        let second = b.build_store(x, Constant::int32(2)).unwrap();
        let load = b.build_load(x).unwrap();
        let third = b.build_store(x, Constant::int32(3)).unwrap();
        b.build_ret(load).unwrap();

        remove_store(func);
        assert!(!func.is_live(first.0));
        assert!(func.is_live(second.0));
        assert!(func.is_live(third.0));
    }

    #[test]
    fn test_dead_store_value_is_removed() {
        let (mut m, f) = module();
        let func = m.function_mut(f);
        let bb = func.append_block("entry");
        let mut b = IrBuilder::at_end(func, bb);
        let a = b.param(0).unwrap();
        let x = b.add_local("x", TypeDesc::Int32);
        let load = b.build_load(a).unwrap();
        let add = b.build_add(load, Constant::int32(1)).unwrap();
        b.build_store(x, add).unwrap();
        b.build_store(x, Constant::int32(0)).unwrap();
        let read = b.build_load(x).unwrap();
        b.build_ret(read).unwrap();

        remove_store(func);
        assert!(!func.is_live(add.0));
        assert!(!func.is_live(load.0));
        assert!(func.uses(a).is_empty());
    }

    #[test]
    fn test_read_through_store_keeps_earlier_store() {
        let (mut m, f) = module();
        let func = m.function_mut(f);
        let bb = func.append_block("entry");
        let mut b = IrBuilder::at_end(func, bb);
        let x = b.add_local("x", TypeDesc::Int32);
        let y = b.add_local("y", TypeDesc::Int32);
        let first = b.build_store(x, Constant::int32(1)).unwrap();
        let load = b.build_load(x).unwrap();
        b.build_store(y, load).unwrap();
        b.build_store(x, Constant::int32(2)).unwrap();

        // Afterwards `store y, x` reads x between the two stores
        remove_load(func);
        remove_store(func);
        assert!(func.is_live(first.0));
    }

    #[test]
    fn test_consecutive_global_stores_keep_the_later() {
        let (mut m, f) = module();
        let g = m.add_global("g", TypeDesc::Int32);
        let gref = m.global_ref(f, g);
        let func = m.function_mut(f);
        let bb = func.append_block("entry");
        let mut b = IrBuilder::at_end(func, bb);
        let first = b.build_store(gref, Constant::int32(1)).unwrap();
        let second = b.build_store(gref, Constant::int32(2)).unwrap();
        let load = b.build_load(gref).unwrap();
        b.build_ret(load).unwrap();

        remove_store(func);
        assert!(!func.is_live(first.0));
        assert!(func.is_live(second.0));
        assert_eq!(func.uses(gref).len(), 2);
    }

    #[test]
    fn test_call_between_global_stores_keeps_both() {
        let (mut m, f) = module();
        let g = m.add_global("g", TypeDesc::Int32);
        let side = m.add_function("side", &[], TypeDesc::Void);
        let gref = m.global_ref(f, g);
        let callee = m.callee(side);
        let func = m.function_mut(f);
        let bb = func.append_block("entry");
        let mut b = IrBuilder::at_end(func, bb);
        let first = b.build_store(gref, Constant::int32(1)).unwrap();
        b.build_call(&callee, Vec::new()).unwrap();
        let second = b.build_store(gref, Constant::int32(2)).unwrap();
        let load = b.build_load(gref).unwrap();
        b.build_ret(load).unwrap();

        remove_store(func);
        assert!(func.is_live(first.0));
        assert!(func.is_live(second.0));
    }

    #[test]
    fn test_remove_unused_local() {
        let (mut m, f) = module();
        let func = m.function_mut(f);
        let bb = func.append_block("entry");
        let mut b = IrBuilder::at_end(func, bb);
        let x = b.add_local("x", TypeDesc::Int32);
        let kept = b.add_local("kept", TypeDesc::Int32);
        b.build_store(x, Constant::int32(1)).unwrap();
        b.build_store(kept, Constant::int32(2)).unwrap();
        let load = b.build_load(kept).unwrap();
        let ret = b.build_ret(load).unwrap();

        remove_unused(func);
        assert!(!func.is_live(x));
        assert_eq!(func.locals(), &[kept]);
        assert_eq!(func.block(bb).locals, vec![kept]);
        assert_eq!(func.insts(bb).len(), 3);
        assert_eq!(func.insts(bb).last(), Some(&ret));
    }
}
