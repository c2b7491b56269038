//! Textual IR dump
//!
//! Every printing entry point renumbers the function first, so the output only
//! depends on the current block and instruction order.

use crate::function::Function;
use crate::module::Module;
use crate::opcode::Opcode;
use crate::value::{BlockId, InstId, Operand};
use std::fmt::Write;

/// `%c int32`, `100 int32`, `@fib`
pub fn format_operand(func: &Function, operand: &Operand) -> String {
    match operand {
        Operand::Use(id) => {
            let name = func.display_name(*id);
            match &func.value(*id).ty {
                Some(ty) => format!("{} {}", name, ty),
                None => name,
            }
        }
        Operand::Const(c) => format!("{} {}", c, c.ty()),
        Operand::Func(f) => format!("@{}", f.name),
        Operand::Empty => "undef".to_string(),
    }
}

fn format_label(func: &Function, operand: &Operand) -> String {
    match operand {
        Operand::Use(id) => format!("label {}", func.display_name(*id)),
        other => format_operand(func, other),
    }
}

/// One instruction line without indentation
pub fn format_inst(func: &Function, inst: InstId) -> String {
    let data = func.inst(inst);
    let ops = &data.operands;
    let opcode = data.opcode;
    let def = format!("{} = ", func.display_name(inst.0));

    match opcode {
        Opcode::Load => format!("{}load {}", def, format_operand(func, &ops[0])),
        Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod | Opcode::Cmp(_) => {
            format!(
                "{}{} {}, {}",
                def,
                opcode,
                format_operand(func, &ops[0]),
                format_operand(func, &ops[1])
            )
        }
        Opcode::Store | Opcode::Move | Opcode::ConstLoad | Opcode::ConstIntImm8 => format!(
            "{} {}, {}",
            opcode,
            format_operand(func, &ops[0]),
            format_operand(func, &ops[1])
        ),
        // The constant is implied by the opcode
        Opcode::ConstIntM1 | Opcode::ConstInt(_) | Opcode::ConstFloat(_) => {
            format!("{} {}", opcode, format_operand(func, &ops[0]))
        }
        Opcode::Call => {
            let mut line = String::new();
            let void = func.value(inst.0).ty.as_ref().map_or(true, |ty| ty.is_void());
            if !void {
                line.push_str(&def);
            }
            line.push_str("call ");
            let args: Vec<String> = ops.iter().map(|op| format_operand(func, op)).collect();
            line.push_str(&args.join(", "));
            line
        }
        Opcode::Jmp => {
            let mut line = format!("jmp {}", format_label(func, &ops[0]));
            if data.loop_edge {
                line.push_str(", !klr.loop");
            }
            line
        }
        Opcode::Branch
        | Opcode::JmpTrue
        | Opcode::JmpIntCmp(_)
        | Opcode::JmpIntCmpImm8(_)
        | Opcode::JmpCmp(_) => {
            let mut line = format!("{} {}, ", opcode, format_operand(func, &ops[0]));
            if !ops[1].is_empty() {
                let _ = write!(line, "{}, ", format_operand(func, &ops[1]));
            }
            let _ = write!(
                line,
                "{}, {}",
                format_label(func, &ops[2]),
                format_label(func, &ops[3])
            );
            line
        }
        Opcode::Return => format!("ret {}", format_operand(func, &ops[0])),
        Opcode::ReturnNone => "ret void".to_string(),
    }
}

fn format_block(func: &Function, bb: BlockId, first: bool, out: &mut String) {
    let _ = write!(out, "{}:", func.display_name(bb.0));
    let preds = func.preds(bb);
    if preds.is_empty() {
        out.push_str("  ; no preds");
    } else if preds[0] != func.start() {
        let names: Vec<String> = preds.iter().map(|p| func.display_name(p.0)).collect();
        let _ = write!(out, "  ; preds = {}", names.join(", "));
    }
    out.push('\n');

    if first {
        for local in func.locals() {
            if func.value(*local).is_used() {
                let _ = writeln!(out, "    local {}", format_operand(func, &Operand::Use(*local)));
            }
        }
    }
    for inst in func.insts(bb) {
        let _ = writeln!(out, "    {}", format_inst(func, *inst));
    }
}

fn render_function(func: &Function) -> String {
    let mut out = String::new();
    let params: Vec<String> = func
        .params()
        .iter()
        .map(|p| format!("param {}", format_operand(func, &Operand::Use(*p))))
        .collect();
    let _ = writeln!(out, "func @{}({}) {} {{", func.name, params.join(", "), func.ret);
    for (i, bb) in func.blocks().iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        format_block(func, *bb, i == 0, &mut out);
    }
    out.push_str("}\n");
    out
}

/// Render a function: header, blocks with their predecessors, instructions
pub fn print_function(func: &mut Function) -> String {
    func.renumber();
    render_function(func)
}

/// Render the predecessor and successor lists of every block, including the
/// synthetic start and end blocks
pub fn print_cfg(func: &mut Function) -> String {
    func.renumber();
    let func = &*func;

    let list = |blocks: Vec<BlockId>| {
        if blocks.is_empty() {
            "no".to_string()
        } else {
            blocks
                .iter()
                .map(|b| func.display_name(b.0))
                .collect::<Vec<_>>()
                .join(", ")
        }
    };

    let mut out = format!("basic blocks of @{}:\n", func.name);
    let mut all = vec![func.start()];
    all.extend(func.blocks().iter().copied());
    all.push(func.end());
    for bb in all {
        let _ = writeln!(out, "\n{}:", func.display_name(bb.0));
        let _ = writeln!(out, "    preds: {}", list(func.preds(bb)));
        let _ = writeln!(out, "    succs: {}", list(func.succs(bb)));
    }
    out
}

/// Render globals and every function of a module
pub fn print_module(module: &mut Module) -> String {
    let mut out = format!("module {}\n", module.name);
    for global in &module.globals {
        let _ = writeln!(out, "global @{} {}", global.name, global.ty);
    }
    for func in module.functions.iter_mut() {
        out.push('\n');
        out.push_str(&print_function(func));
    }
    out
}

fn dot_name(func: &Function, bb: BlockId) -> String {
    func.display_name(bb.0).trim_start_matches('%').to_string()
}

fn dot_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '"' | '{' | '}' | '|' | '<' | '>' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Graphviz rendering of the CFG; branching blocks get `T`/`F` ports
pub fn print_dot(func: &mut Function) -> String {
    func.renumber();
    let func = &*func;

    let mut out = format!("digraph \"{}\" {{\n", func.name);
    out.push_str("  node[shape=record margin=0.1 fontsize=10, fontname=\"Ubuntu Mono\"]\n");
    for bb in func.blocks() {
        let name = dot_name(func, *bb);
        let _ = write!(out, "  \"{}\"[label=\"{{<h>%{}:", name, dot_escape(&name));
        for inst in func.insts(*bb) {
            let _ = write!(out, "\\l\\ \\ \\ {}", dot_escape(&format_inst(func, *inst)));
        }
        if func.block(*bb).has_branch && func.succs(*bb).len() == 2 {
            out.push_str("|{<t>T|<f>F}}\"]\n");
        } else {
            out.push_str("\\l}\"]\n");
        }
    }

    let mut sources = vec![func.start()];
    sources.extend(func.blocks().iter().copied());
    for bb in sources {
        let ported = func.block(bb).has_branch && func.succs(bb).len() == 2;
        for (i, succ) in func.succs(bb).into_iter().enumerate() {
            let src = if ported {
                format!("\"{}\":{}", dot_name(func, bb), if i == 0 { 't' } else { 'f' })
            } else {
                format!("\"{}\"", dot_name(func, bb))
            };
            let dst = if succ == func.end() {
                format!("\"{}\"", dot_name(func, succ))
            } else {
                format!("\"{}\":h", dot_name(func, succ))
            };
            let _ = writeln!(out, "  {} -> {}", src, dst);
        }
    }
    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IrBuilder;
    use crate::opcode::CmpKind;
    use crate::value::Constant;
    use klr_common::TypeDesc;
    use pretty_assertions::assert_eq;

    fn sample() -> Module {
        let mut m = Module::new("demo");
        let f = m.add_function("max", &[("a", TypeDesc::Int32)], TypeDesc::Int32);
        let func = m.function_mut(f);
        let entry = func.append_block("entry");
        let small = func.append_block("");
        let exit = func.append_block("exit");
        let mut b = IrBuilder::at_end(func, entry);
        let a = b.param(0).unwrap();
        let t = b.add_local("t", TypeDesc::Int32);
        let load = b.build_load(a).unwrap();
        b.build_store(t, load).unwrap();
        let cmp = b.build_cmp(CmpKind::Lt, load, Constant::int32(10)).unwrap();
        b.build_cond_branch(cmp, small, exit).unwrap();
        b.position_at_end(small);
        b.build_loop_jmp(exit);
        b.position_at_end(exit);
        let v = b.build_load(t).unwrap();
        b.build_ret(v).unwrap();
        m
    }

    #[test]
    fn test_print_function() {
        let mut m = sample();
        let text = print_function(&mut m.functions[0]);
        let expected = "\
func @max(param %a int32) int32 {
%entry:
    local %t int32
    %0 = load %a int32
    store %t int32, %0 int32
    %1 = cmplt %0 int32, 10 int32
    branch %1 bool, label %bb1, label %exit

%bb1:  ; preds = %entry
    jmp label %exit, !klr.loop

%exit:  ; preds = %entry, %bb1
    %2 = load %t int32
    ret %2 int32
}
";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_print_cfg() {
        let mut m = sample();
        let text = print_cfg(&mut m.functions[0]);
        assert!(text.contains("%start:\n    preds: no\n    succs: %entry\n"));
        assert!(text.contains("%entry:\n    preds: %start\n    succs: %bb1, %exit\n"));
        assert!(text.contains("%end:\n    preds: %exit\n    succs: no\n"));
    }

    #[test]
    fn test_print_module() {
        let mut m = sample();
        m.add_global("counter", TypeDesc::Int64);
        let text = print_module(&mut m);
        assert!(text.starts_with("module demo\nglobal @counter int\n\nfunc @max("));
    }

    #[test]
    fn test_print_dot() {
        let mut m = sample();
        let dot = print_dot(&mut m.functions[0]);
        assert!(dot.starts_with("digraph \"max\" {\n"));
        assert!(dot.contains("\"entry\":t -> \"bb1\":h\n"));
        assert!(dot.contains("\"entry\":f -> \"exit\":h\n"));
        assert!(dot.contains("\"exit\" -> \"end\"\n"));
        assert!(dot.contains("\"start\" -> \"entry\":h\n"));
    }

    #[test]
    fn test_dot_escape() {
        assert_eq!(dot_escape("a{b}|\"c\""), "a\\{b\\}\\|\\\"c\\\"");
    }
}
