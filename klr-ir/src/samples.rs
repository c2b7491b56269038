//! Hand-built sample functions
//!
//! Front ends are out of scope for this workspace, so the driver and the
//! scenario tests build their input IR here. Each builder mirrors what the
//! front end emits for a short Koala snippet: every variable read is a
//! `load`, every assignment a `store`.

use crate::builder::IrBuilder;
use crate::module::Module;
use crate::opcode::CmpKind;
use crate::value::{Constant, FuncId};
use klr_common::{IrError, TypeDesc};

/// Functions created by `sample_module`, in order
pub const SAMPLE_NAMES: &[&str] = &["foo", "fib", "unreachable", "diamond", "tick", "bump"];

/// ```text
/// def foo(a int32, b int32) int32:
///     var c = 100
///     c = 200 + 300
///     var d = c + 100
///     return d
/// ```
pub fn foo(module: &mut Module) -> Result<FuncId, IrError> {
    let fid = module.add_function(
        "foo",
        &[("a", TypeDesc::Int32), ("b", TypeDesc::Int32)],
        TypeDesc::Int32,
    );
    let func = module.function_mut(fid);
    let entry = func.append_block("entry");
    let mut b = IrBuilder::at_end(func, entry);

    let c = b.add_local("c", TypeDesc::Int32);
    let d = b.add_local("d", TypeDesc::Int32);
    b.build_store(c, Constant::int32(100))?;
    let sum = b.build_add(Constant::int32(200), Constant::int32(300))?;
    b.build_store(c, sum)?;
    let c_val = b.build_load(c)?;
    let d_init = b.build_add(c_val, Constant::int32(100))?;
    b.build_store(d, d_init)?;
    let d_val = b.build_load(d)?;
    b.build_ret(d_val)?;
    Ok(fid)
}

/// ```text
/// def fib(n int32) int32:
///     if n < 2:
///         return n
///     return fib(n - 1) + fib(n - 2)
/// ```
pub fn fib(module: &mut Module) -> Result<FuncId, IrError> {
    let fid = module.add_function("fib", &[("n", TypeDesc::Int32)], TypeDesc::Int32);
    let callee = module.callee(fid);
    let func = module.function_mut(fid);
    let entry = func.append_block("entry");
    let small = func.append_block("small");
    let recurse = func.append_block("recurse");
    let mut b = IrBuilder::at_end(func, entry);
    let n = b.param(0)?;

    let n_val = b.build_load(n)?;
    let cond = b.build_cmp(CmpKind::Lt, n_val, Constant::int32(2))?;
    b.build_cond_branch(cond, small, recurse)?;

    b.position_at_end(small);
    let n_val = b.build_load(n)?;
    b.build_ret(n_val)?;

    b.position_at_end(recurse);
    let n_val = b.build_load(n)?;
    let arg = b.build_sub(n_val, Constant::int32(1))?;
    let first = b.build_call(&callee, vec![arg.into()])?;
    let n_val = b.build_load(n)?;
    let arg = b.build_sub(n_val, Constant::int32(2))?;
    let second = b.build_call(&callee, vec![arg.into()])?;
    let sum = b.build_add(first, second)?;
    b.build_ret(sum)?;
    Ok(fid)
}

/// Code after a `return`, only reachable from itself
///
/// ```text
/// def unreachable(a int32) int32:
///     return 1
///     while true:
///         a = a + 1
/// ```
pub fn unreachable(module: &mut Module) -> Result<FuncId, IrError> {
    let fid = module.add_function("unreachable", &[("a", TypeDesc::Int32)], TypeDesc::Int32);
    let func = module.function_mut(fid);
    let entry = func.append_block("entry");
    let dead = func.append_block("dead");
    let mut b = IrBuilder::at_end(func, entry);
    let a = b.param(0)?;

    b.build_ret(Constant::int32(1))?;

    b.position_at_end(dead);
    let a_val = b.build_load(a)?;
    let next = b.build_add(a_val, Constant::int32(1))?;
    b.build_store(a, next)?;
    b.build_loop_jmp(dead);
    Ok(fid)
}

/// Both arms of the `if` are bare jumps to the join block; the `else` arm is
/// a loop latch and has to survive only-jump elimination.
///
/// ```text
/// def diamond(a int32) int32:
///     if a > 0:
///         pass
///     else:
///         pass
///     return a
/// ```
pub fn diamond(module: &mut Module) -> Result<FuncId, IrError> {
    let fid = module.add_function("diamond", &[("a", TypeDesc::Int32)], TypeDesc::Int32);
    let func = module.function_mut(fid);
    let entry = func.append_block("entry");
    let then_bb = func.append_block("then");
    let else_bb = func.append_block("else");
    let join = func.append_block("join");
    let mut b = IrBuilder::at_end(func, entry);
    let a = b.param(0)?;

    let a_val = b.build_load(a)?;
    let cond = b.build_cmp(CmpKind::Gt, a_val, Constant::int32(0))?;
    b.build_cond_branch(cond, then_bb, else_bb)?;

    b.position_at_end(then_bb);
    b.build_jmp(join);

    b.position_at_end(else_bb);
    b.build_loop_jmp(join);

    b.position_at_end(join);
    let a_val = b.build_load(a)?;
    b.build_ret(a_val)?;
    Ok(fid)
}

/// A callee that may touch globals; `bump` calls it between a store to a
/// global and the read that follows.
pub fn tick(module: &mut Module) -> Result<FuncId, IrError> {
    let fid = module.add_function("tick", &[], TypeDesc::Void);
    let func = module.function_mut(fid);
    let entry = func.append_block("entry");
    IrBuilder::at_end(func, entry).build_ret_void();
    Ok(fid)
}

/// ```text
/// var count int
///
/// def bump() int:
///     count = 1
///     tick()
///     return count
/// ```
pub fn bump(module: &mut Module, tick: FuncId) -> Result<FuncId, IrError> {
    let count = match module.globals.iter().find(|g| g.name == "count") {
        Some(global) => global.id,
        None => module.add_global("count", TypeDesc::int()),
    };
    let fid = module.add_function("bump", &[], TypeDesc::int());
    let callee = module.callee(tick);
    let count_ref = module.global_ref(fid, count);
    let func = module.function_mut(fid);
    let entry = func.append_block("entry");
    let mut b = IrBuilder::at_end(func, entry);

    b.build_store(count_ref, Constant::int(1))?;
    b.build_call(&callee, Vec::new())?;
    let value = b.build_load(count_ref)?;
    b.build_ret(value)?;
    Ok(fid)
}

/// Module holding every sample, named after `SAMPLE_NAMES`
pub fn sample_module() -> Result<Module, IrError> {
    let mut module = Module::new("samples");
    foo(&mut module)?;
    fib(&mut module)?;
    unreachable(&mut module)?;
    diamond(&mut module)?;
    let tick_id = tick(&mut module)?;
    bump(&mut module, tick_id)?;
    Ok(module)
}
