use crate::module::Module;
use crate::opcode::{CmpKind, Opcode};
use crate::pass::{PassGroup, PassOptions, DEFAULT_PIPELINE};
use crate::printer::print_function;
use crate::samples;
use crate::value::{FuncId, Operand};
use crate::verify::verify_function;
use pretty_assertions::assert_eq;

fn run(module: &mut Module, fid: FuncId, names: &[&str]) {
    let group = PassGroup::from_names(names, &PassOptions::default()).unwrap();
    group.run(module.function_mut(fid));
}

fn opcodes(module: &Module, fid: FuncId) -> Vec<Vec<Opcode>> {
    let func = module.function(fid);
    func.blocks()
        .iter()
        .map(|bb| func.insts(*bb).iter().map(|i| func.opcode(*i)).collect())
        .collect()
}

// ========================================================================
// Straight-line code collapses to its constant result
// ========================================================================

#[test]
fn test_foo_folds_to_constant_return() {
    let mut module = Module::new("test");
    let fid = samples::foo(&mut module).unwrap();
    run(&mut module, fid, DEFAULT_PIPELINE);

    let text = print_function(module.function_mut(fid));
    let expected = "\
func @foo(param %a int32, param %b int32) int32 {
%entry:
    ret 600 int32
}
";
    assert_eq!(text, expected);
    assert!(module.function(fid).locals().is_empty());
}

#[test]
fn test_default_pipeline_is_idempotent() {
    let mut module = samples::sample_module().unwrap();
    for index in 0..module.functions.len() {
        let fid = FuncId(index as u32);
        run(&mut module, fid, DEFAULT_PIPELINE);
        let once = print_function(module.function_mut(fid));
        run(&mut module, fid, DEFAULT_PIPELINE);
        let twice = print_function(module.function_mut(fid));
        assert_eq!(once, twice, "{}", module.function(fid).name);
    }
}

#[test]
fn test_every_sample_survives_every_pass() {
    let mut module = samples::sample_module().unwrap();
    let mut names: Vec<&str> = DEFAULT_PIPELINE.to_vec();
    names.push("insn-select");
    for index in 0..module.functions.len() {
        let fid = FuncId(index as u32);
        run(&mut module, fid, &names);
        assert_eq!(verify_function(module.function(fid)), Ok(()));
    }
}

// ========================================================================
// Lowering
// ========================================================================

#[test]
fn test_fib_lowers_without_loads_or_stores() {
    let mut module = Module::new("test");
    let fid = samples::fib(&mut module).unwrap();
    run(&mut module, fid, &["remove-load", "remove-store", "insn-select"]);

    assert_eq!(
        opcodes(&module, fid),
        vec![
            vec![Opcode::JmpIntCmpImm8(CmpKind::Lt)],
            vec![Opcode::Return],
            vec![
                Opcode::Sub,
                Opcode::Call,
                Opcode::Sub,
                Opcode::Call,
                Opcode::Add,
                Opcode::Return,
            ],
        ]
    );

    let func = module.function(fid);
    let entry = func.blocks()[0];
    let branch = func.insts(entry)[0];
    let n = func.params()[0];
    assert_eq!(func.operand(branch, 0), &Operand::Use(n));
    assert_eq!(func.operand(branch, 1).as_const().and_then(|c| c.as_int()), Some(2));
    assert_eq!(func.uses(n).len(), 4);
}

#[test]
fn test_selection_lowers_foo_stores() {
    let mut module = Module::new("test");
    let fid = samples::foo(&mut module).unwrap();
    run(&mut module, fid, &["remove-load", "remove-store", "insn-select"]);

    // `c = 100` is dead, `c = 200 + 300` and `d = c + 100` move a result
    assert_eq!(
        opcodes(&module, fid),
        vec![vec![
            Opcode::Add,
            Opcode::Move,
            Opcode::Add,
            Opcode::Move,
            Opcode::Return,
        ]]
    );
}

// ========================================================================
// Globals
// ========================================================================

#[test]
fn test_call_blocks_global_propagation() {
    let mut module = Module::new("test");
    let tick = samples::tick(&mut module).unwrap();
    let fid = samples::bump(&mut module, tick).unwrap();
    run(&mut module, fid, DEFAULT_PIPELINE);

    let func = module.function(fid);
    let entry = func.blocks()[0];
    let ret = *func.insts(entry).last().unwrap();
    let (_, count) = func.global_refs()[0];
    assert_eq!(func.opcode(ret), Opcode::Return);
    assert_eq!(func.operand(ret, 0), &Operand::Use(count));
    // The callee may read the stored value
    assert_eq!(func.insts(entry).len(), 3);
}
