//! Instruction selection
//!
//! Rewrites generic stores and branches in place into target opcodes. Stores
//! keep their `[var, value]` operands, a fused compare-and-branch takes over
//! the comparison's operands in slots 0 and 1 of the branch.

use crate::function::Function;
use crate::opcode::Opcode;
use crate::value::{Constant, InstId, Operand};
use log::{debug, trace};

/// Target encoding limits used by instruction selection
#[derive(Debug, Clone, PartialEq)]
pub struct SelectConfig {
    /// Inclusive range of integers encodable as an immediate operand
    pub imm_min: i64,
    pub imm_max: i64,
    /// Integers `0..=fast_int_max` have a dedicated opcode
    pub fast_int_max: u8,
    /// Whether -1 has a dedicated opcode
    pub fast_int_m1: bool,
    /// Integral floats `0.0..=fast_float_max` have a dedicated opcode
    pub fast_float_max: u8,
}

impl Default for SelectConfig {
    fn default() -> Self {
        Self {
            imm_min: i8::MIN as i64,
            imm_max: i8::MAX as i64,
            fast_int_max: 5,
            fast_int_m1: true,
            fast_float_max: 3,
        }
    }
}

impl SelectConfig {
    pub fn is_imm(&self, value: i64) -> bool {
        value >= self.imm_min && value <= self.imm_max
    }

    /// Opcode storing `constant` into a variable
    pub fn store_const_opcode(&self, constant: &Constant) -> Opcode {
        match constant {
            Constant::Int { value: -1, .. } if self.fast_int_m1 => Opcode::ConstIntM1,
            Constant::Int { value, .. } if (0..=self.fast_int_max as i64).contains(value) => {
                Opcode::ConstInt(*value as u8)
            }
            Constant::Int { value, .. } if self.is_imm(*value) => Opcode::ConstIntImm8,
            Constant::Int { .. } => Opcode::ConstLoad,
            Constant::Float { value, .. }
                if value.fract() == 0.0 && *value >= 0.0 && *value <= self.fast_float_max as f64 =>
            {
                Opcode::ConstFloat(*value as u8)
            }
            Constant::Float { .. } => Opcode::ConstLoad,
            Constant::Bool(value) => Opcode::ConstInt(*value as u8),
            Constant::Str(_) => Opcode::ConstLoad,
        }
    }
}

fn lower_store(func: &mut Function, inst: InstId, config: &SelectConfig) {
    let opcode = match func.operand(inst, 1) {
        Operand::Const(constant) => config.store_const_opcode(constant),
        _ => Opcode::Move,
    };
    func.inst_mut(inst).opcode = opcode;
}

fn lower_branch(func: &mut Function, inst: InstId, config: &SelectConfig) {
    let cmp = func
        .operand(inst, 0)
        .as_use()
        .and_then(|id| func.as_inst(id))
        .filter(|cmp| func.opcode(*cmp).is_cmp());
    let Some(cmp) = cmp else {
        func.inst_mut(inst).opcode = Opcode::JmpTrue;
        return;
    };
    let Opcode::Cmp(kind) = func.opcode(cmp) else {
        return;
    };

    let lhs = func.operand(cmp, 0).clone();
    let rhs = func.operand(cmp, 1).clone();
    let is_int = func.operand_ty(&lhs).is_some_and(|ty| ty.is_int());
    let opcode = if !is_int {
        Opcode::JmpCmp(kind)
    } else if rhs.as_const().and_then(Constant::as_int).is_some_and(|v| config.is_imm(v)) {
        Opcode::JmpIntCmpImm8(kind)
    } else {
        Opcode::JmpIntCmp(kind)
    };

    func.set_operand(inst, 0, lhs);
    func.set_operand(inst, 1, rhs);
    func.inst_mut(inst).opcode = opcode;
    func.remove_if_dead(cmp);
}

/// Lower stores and conditional branches into target opcodes
pub fn select_instructions(func: &mut Function, config: &SelectConfig) {
    let mut lowered = 0;
    for inst in func.linear_order() {
        if !func.is_live(inst.0) {
            continue;
        }
        match func.opcode(inst) {
            Opcode::Store => lower_store(func, inst, config),
            Opcode::Branch => lower_branch(func, inst, config),
            _ => continue,
        }
        trace!("selected {} for {:?}", func.opcode(inst), inst.0);
        lowered += 1;
    }
    debug!("insn-select: lowered {} instructions in '{}'", lowered, func.name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IrBuilder;
    use crate::module::Module;
    use crate::opcode::CmpKind;
    use klr_common::TypeDesc;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_store_const_opcodes() {
        let config = SelectConfig::default();
        let cases = [
            (Constant::int32(-1), Opcode::ConstIntM1),
            (Constant::int32(0), Opcode::ConstInt(0)),
            (Constant::int32(5), Opcode::ConstInt(5)),
            (Constant::int32(6), Opcode::ConstIntImm8),
            (Constant::int32(-128), Opcode::ConstIntImm8),
            (Constant::int32(128), Opcode::ConstLoad),
            (Constant::float64(2.0), Opcode::ConstFloat(2)),
            (Constant::float64(2.5), Opcode::ConstLoad),
            (Constant::float64(4.0), Opcode::ConstLoad),
            (Constant::bool(true), Opcode::ConstInt(1)),
            (Constant::string("s"), Opcode::ConstLoad),
        ];
        for (constant, expected) in cases {
            assert_eq!(config.store_const_opcode(&constant), expected, "{}", constant);
        }
    }

    #[test]
    fn test_custom_thresholds() {
        let config = SelectConfig {
            imm_min: -32768,
            imm_max: 32767,
            fast_int_max: 1,
            fast_int_m1: false,
            fast_float_max: 0,
        };
        assert_eq!(config.store_const_opcode(&Constant::int32(-1)), Opcode::ConstIntImm8);
        assert_eq!(config.store_const_opcode(&Constant::int32(2)), Opcode::ConstIntImm8);
        assert_eq!(config.store_const_opcode(&Constant::int32(1000)), Opcode::ConstIntImm8);
        assert_eq!(config.store_const_opcode(&Constant::float64(1.0)), Opcode::ConstLoad);
    }

    fn branch_on(rhs: Constant, lhs_ty: TypeDesc) -> (Module, crate::value::FuncId, InstId) {
        let mut m = Module::new("test");
        let f = m.add_function("f", &[("a", lhs_ty)], TypeDesc::Int32);
        let func = m.function_mut(f);
        let entry = func.append_block("entry");
        let yes = func.append_block("yes");
        let no = func.append_block("no");
        let mut b = IrBuilder::at_end(func, entry);
        let a = b.param(0).unwrap();
        let load = b.build_load(a).unwrap();
        let cmp = b.build_cmp(CmpKind::Lt, load, rhs).unwrap();
        let br = b.build_cond_branch(cmp, yes, no).unwrap();
        b.position_at_end(yes);
        b.build_ret(Constant::int32(1)).unwrap();
        b.position_at_end(no);
        b.build_ret(Constant::int32(0)).unwrap();
        (m, f, br)
    }

    #[test]
    fn test_fuse_int_compare_immediate() {
        let (mut m, f, br) = branch_on(Constant::int32(2), TypeDesc::Int32);
        let func = m.function_mut(f);
        select_instructions(func, &SelectConfig::default());
        assert_eq!(func.opcode(br), Opcode::JmpIntCmpImm8(CmpKind::Lt));
        assert_eq!(func.operand(br, 1), &Operand::Const(Constant::int32(2)));
        let entry = func.blocks()[0];
        // the comparison is gone, the load feeding it is now read by the branch
        assert_eq!(func.insts(entry).len(), 2);
    }

    #[test]
    fn test_fuse_int_compare_large_constant() {
        let (mut m, f, br) = branch_on(Constant::int32(1000), TypeDesc::Int32);
        let func = m.function_mut(f);
        select_instructions(func, &SelectConfig::default());
        assert_eq!(func.opcode(br), Opcode::JmpIntCmp(CmpKind::Lt));
    }

    #[test]
    fn test_fuse_float_compare() {
        let (mut m, f, br) = branch_on(Constant::float64(0.5), TypeDesc::Float64);
        let func = m.function_mut(f);
        select_instructions(func, &SelectConfig::default());
        assert_eq!(func.opcode(br), Opcode::JmpCmp(CmpKind::Lt));
    }

    #[test]
    fn test_branch_on_plain_bool() {
        let mut m = Module::new("test");
        let f = m.add_function("f", &[("flag", TypeDesc::Bool)], TypeDesc::Int32);
        let func = m.function_mut(f);
        let entry = func.append_block("entry");
        let yes = func.append_block("yes");
        let mut b = IrBuilder::at_end(func, entry);
        let flag = b.param(0).unwrap();
        let load = b.build_load(flag).unwrap();
        let br = b.build_cond_branch(load, yes, yes).unwrap();
        b.position_at_end(yes);
        b.build_ret(Constant::int32(1)).unwrap();

        select_instructions(func, &SelectConfig::default());
        assert_eq!(func.opcode(br), Opcode::JmpTrue);
        assert_eq!(func.operand(br, 0), &Operand::Use(load.0));
    }

    #[test]
    fn test_variable_store_becomes_move() {
        let mut m = Module::new("test");
        let f = m.add_function("f", &[("a", TypeDesc::Int32)], TypeDesc::Void);
        let func = m.function_mut(f);
        let entry = func.append_block("entry");
        let mut b = IrBuilder::at_end(func, entry);
        let a = b.param(0).unwrap();
        let x = b.add_local("x", TypeDesc::Int32);
        let load = b.build_load(a).unwrap();
        let store = b.build_store(x, load).unwrap();
        let konst = b.build_store(x, Constant::int32(3)).unwrap();
        b.build_ret_void();

        select_instructions(func, &SelectConfig::default());
        assert_eq!(func.opcode(store), Opcode::Move);
        assert_eq!(func.opcode(konst), Opcode::ConstInt(3));
    }
}
