//! CFG builder
//!
//! `IrBuilder` borrows a function and inserts typed instructions at a cursor.
//! Construction validates the operand contract: loads and stores act on
//! variables, stored and computed values are constants or instruction
//! results, and both sides of a binary operation share one type. Branches and
//! returns also link the CFG edges they imply.

use crate::function::Function;
use crate::opcode::{CmpKind, Opcode};
use crate::value::*;
use klr_common::{IrError, TypeDesc};
use log::trace;

/// Insertion point inside the current block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    Head,
    Tail,
    Before(InstId),
    After(InstId),
}

pub struct IrBuilder<'f> {
    func: &'f mut Function,
    block: BlockId,
    cursor: Cursor,
}

impl<'f> IrBuilder<'f> {
    pub fn at_end(func: &'f mut Function, block: BlockId) -> Self {
        Self { func, block, cursor: Cursor::Tail }
    }

    pub fn position_at_end(&mut self, block: BlockId) {
        self.block = block;
        self.cursor = Cursor::Tail;
    }

    pub fn position_at_head(&mut self, block: BlockId) {
        self.block = block;
        self.cursor = Cursor::Head;
    }

    pub fn position_before(&mut self, inst: InstId) {
        self.block = self.func.inst(inst).block;
        self.cursor = Cursor::Before(inst);
    }

    pub fn position_after(&mut self, inst: InstId) {
        self.block = self.func.inst(inst).block;
        self.cursor = Cursor::After(inst);
    }

    pub fn block(&self) -> BlockId {
        self.block
    }

    pub fn func(&self) -> &Function {
        self.func
    }

    pub fn append_block(&mut self, name: &str) -> BlockId {
        self.func.append_block(name)
    }

    pub fn param(&self, index: usize) -> Result<ValueId, IrError> {
        self.func.param(index)
    }

    /// Declare a local in the current block
    pub fn add_local(&mut self, name: &str, ty: TypeDesc) -> ValueId {
        self.func.add_local(self.block, name, ty)
    }

    fn insert(&mut self, opcode: Opcode, ty: Option<TypeDesc>, operands: Vec<Operand>) -> InstId {
        let insts = self.func.insts(self.block);
        let index = match self.cursor {
            Cursor::Head => 0,
            Cursor::Tail => insts.len(),
            Cursor::Before(anchor) => self.anchor_index(anchor),
            Cursor::After(anchor) => self.anchor_index(anchor) + 1,
        };
        let inst = self.func.insert_inst(self.block, index, opcode, ty, operands);
        // Keep successive inserts in program order
        if matches!(self.cursor, Cursor::Head | Cursor::After(_)) {
            self.cursor = Cursor::After(inst);
        }
        trace!("built {} in '{}'", opcode, self.func.name);
        inst
    }

    fn anchor_index(&self, anchor: InstId) -> usize {
        match self.func.insts(self.block).iter().position(|i| *i == anchor) {
            Some(index) => index,
            None => panic!("cursor anchor {:?} is not in the current block", anchor.0),
        }
    }

    // ---------------------------------------------------------------------
    // Operand validation
    // ---------------------------------------------------------------------

    fn describe(&self, operand: &Operand) -> String {
        match operand {
            Operand::Use(id) => format!(
                "{} {}",
                self.func.value(*id).kind.describe(),
                self.func.display_name(*id)
            ),
            Operand::Const(c) => format!("constant {}", c),
            Operand::Func(f) => format!("function @{}", f.name),
            Operand::Empty => "nothing".to_string(),
        }
    }

    fn expect_var(&self, op: &'static str, operand: &Operand) -> Result<TypeDesc, IrError> {
        match operand {
            Operand::Use(id) if self.func.value(*id).is_variable() => {
                Ok(self.func.value(*id).ty.clone().unwrap_or(TypeDesc::Void))
            }
            _ => Err(IrError::invalid_operand(
                op,
                "a local/param/global var",
                self.describe(operand),
            )),
        }
    }

    fn expect_value(&self, op: &'static str, operand: &Operand) -> Result<TypeDesc, IrError> {
        let ok = match operand {
            Operand::Const(_) => true,
            Operand::Use(id) => self.func.value(*id).is_inst(),
            _ => false,
        };
        match self.func.operand_ty(operand) {
            Some(ty) if ok && !ty.is_void() => Ok(ty),
            _ => Err(IrError::invalid_operand(
                op,
                "a constant or instruction result",
                self.describe(operand),
            )),
        }
    }

    fn expect_same(op: &'static str, lhs: TypeDesc, rhs: TypeDesc) -> Result<TypeDesc, IrError> {
        if lhs == rhs {
            Ok(lhs)
        } else {
            Err(IrError::TypeMismatch { op, lhs, rhs })
        }
    }

    // ---------------------------------------------------------------------
    // Memory
    // ---------------------------------------------------------------------

    /// Read a variable into a new temporary
    pub fn build_load(&mut self, var: impl Into<Operand>) -> Result<InstId, IrError> {
        let var = var.into();
        let ty = self.expect_var("load", &var)?;
        Ok(self.insert(Opcode::Load, Some(ty), vec![var]))
    }

    /// Write a constant or instruction result into a variable
    pub fn build_store(
        &mut self,
        var: impl Into<Operand>,
        value: impl Into<Operand>,
    ) -> Result<InstId, IrError> {
        let (var, value) = (var.into(), value.into());
        let var_ty = self.expect_var("store", &var)?;
        let value_ty = self.expect_value("store", &value)?;
        Self::expect_same("store", var_ty, value_ty)?;
        Ok(self.insert(Opcode::Store, None, vec![var, value]))
    }

    // ---------------------------------------------------------------------
    // Arithmetic and comparison
    // ---------------------------------------------------------------------

    pub fn build_binary(
        &mut self,
        opcode: Opcode,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
    ) -> Result<InstId, IrError> {
        let (lhs, rhs) = (lhs.into(), rhs.into());
        let op = match opcode {
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Mod => "mod",
            other => {
                return Err(IrError::InternalError {
                    message: format!("'{}' is not a binary operator", other),
                })
            }
        };
        let lhs_ty = self.expect_value(op, &lhs)?;
        let rhs_ty = self.expect_value(op, &rhs)?;
        let ty = Self::expect_same(op, lhs_ty, rhs_ty)?;
        Ok(self.insert(opcode, Some(ty), vec![lhs, rhs]))
    }

    pub fn build_add(
        &mut self,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
    ) -> Result<InstId, IrError> {
        self.build_binary(Opcode::Add, lhs, rhs)
    }

    pub fn build_sub(
        &mut self,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
    ) -> Result<InstId, IrError> {
        self.build_binary(Opcode::Sub, lhs, rhs)
    }

    pub fn build_mul(
        &mut self,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
    ) -> Result<InstId, IrError> {
        self.build_binary(Opcode::Mul, lhs, rhs)
    }

    /// Comparison, the result is always `bool`
    pub fn build_cmp(
        &mut self,
        kind: CmpKind,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
    ) -> Result<InstId, IrError> {
        let (lhs, rhs) = (lhs.into(), rhs.into());
        let lhs_ty = self.expect_value("cmp", &lhs)?;
        let rhs_ty = self.expect_value("cmp", &rhs)?;
        Self::expect_same("cmp", lhs_ty, rhs_ty)?;
        Ok(self.insert(Opcode::Cmp(kind), Some(TypeDesc::Bool), vec![lhs, rhs]))
    }

    // ---------------------------------------------------------------------
    // Calls
    // ---------------------------------------------------------------------

    pub fn build_call(&mut self, callee: &FuncRef, args: Vec<Operand>) -> Result<InstId, IrError> {
        let mut operands = Vec::with_capacity(args.len() + 1);
        operands.push(Operand::Func(callee.clone()));
        for arg in args {
            let ok = match &arg {
                Operand::Const(_) => true,
                Operand::Use(id) => !matches!(self.func.value(*id).kind, ValueKind::Block(_)),
                _ => false,
            };
            if !ok {
                return Err(IrError::invalid_operand(
                    "call",
                    "a value argument",
                    self.describe(&arg),
                ));
            }
            operands.push(arg);
        }
        Ok(self.insert(Opcode::Call, Some(callee.ret.clone()), operands))
    }

    // ---------------------------------------------------------------------
    // Control flow
    // ---------------------------------------------------------------------

    pub fn build_jmp(&mut self, target: BlockId) -> InstId {
        let inst = self.insert(Opcode::Jmp, None, vec![target.into()]);
        self.func.link_edge(self.block, target);
        self.func.block_mut(self.block).has_branch = true;
        inst
    }

    /// Jump flagged as a loop edge, never removed by only-jump elimination
    pub fn build_loop_jmp(&mut self, target: BlockId) -> InstId {
        let inst = self.build_jmp(target);
        self.func.inst_mut(inst).loop_edge = true;
        inst
    }

    /// Two-way branch. Slots are `[cond, -, then, else]`; slot 1 is only
    /// filled once selection fuses a comparison into the branch.
    pub fn build_cond_branch(
        &mut self,
        cond: impl Into<Operand>,
        then_block: BlockId,
        else_block: BlockId,
    ) -> Result<InstId, IrError> {
        let cond = cond.into();
        if self.func.operand_ty(&cond) != Some(TypeDesc::Bool) {
            return Err(IrError::invalid_operand(
                "branch",
                "a bool condition",
                self.describe(&cond),
            ));
        }
        let inst = self.insert(
            Opcode::Branch,
            None,
            vec![cond, Operand::Empty, then_block.into(), else_block.into()],
        );
        self.func.link_edge(self.block, then_block);
        self.func.link_edge(self.block, else_block);
        self.func.block_mut(self.block).has_branch = true;
        Ok(inst)
    }

    pub fn build_ret(&mut self, value: impl Into<Operand>) -> Result<InstId, IrError> {
        let value = value.into();
        let ty = self.expect_value("ret", &value)?;
        Self::expect_same("ret", self.func.ret.clone(), ty)?;
        let inst = self.insert(Opcode::Return, None, vec![value]);
        self.link_end();
        Ok(inst)
    }

    pub fn build_ret_void(&mut self) -> InstId {
        let inst = self.insert(Opcode::ReturnNone, None, Vec::new());
        self.link_end();
        inst
    }

    fn link_end(&mut self) {
        let end = self.func.end();
        self.func.link_edge(self.block, end);
        self.func.block_mut(self.block).has_ret = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn func() -> Function {
        let mut f = Function::new(FuncId(0), "f", TypeDesc::Int32);
        f.add_param("a", TypeDesc::Int32);
        f
    }

    #[test]
    fn test_store_requires_variable() {
        let mut f = func();
        let bb = f.append_block("entry");
        let mut b = IrBuilder::at_end(&mut f, bb);
        let err = b.build_store(Constant::int32(1), Constant::int32(2)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "'store' requires a local/param/global var, got constant 1"
        );
    }

    #[test]
    fn test_store_rejects_bare_local() {
        let mut f = func();
        let bb = f.append_block("entry");
        let mut b = IrBuilder::at_end(&mut f, bb);
        let c = b.add_local("c", TypeDesc::Int32);
        let d = b.add_local("d", TypeDesc::Int32);
        assert!(matches!(
            b.build_store(d, c),
            Err(IrError::InvalidOperand { op: "store", .. })
        ));
        let load = b.build_load(c).unwrap();
        assert!(b.build_store(d, load).is_ok());
    }

    #[test]
    fn test_type_mismatch() {
        let mut f = func();
        let bb = f.append_block("entry");
        let mut b = IrBuilder::at_end(&mut f, bb);
        let err = b.build_add(Constant::int32(1), Constant::int64(2)).unwrap_err();
        assert_eq!(
            err,
            IrError::TypeMismatch {
                op: "add",
                lhs: TypeDesc::Int32,
                rhs: TypeDesc::Int64
            }
        );
    }

    #[test]
    fn test_cmp_is_bool() {
        let mut f = func();
        let bb = f.append_block("entry");
        let mut b = IrBuilder::at_end(&mut f, bb);
        let a = b.param(0).unwrap();
        let load = b.build_load(a).unwrap();
        let cmp = b.build_cmp(CmpKind::Lt, load, Constant::int32(1)).unwrap();
        assert_eq!(b.func().value(cmp.0).ty, Some(TypeDesc::Bool));
        assert!(b.build_cond_branch(load, bb, bb).is_err());
    }

    #[test]
    fn test_cursor_positions() {
        let mut f = func();
        let bb = f.append_block("entry");
        let mut b = IrBuilder::at_end(&mut f, bb);
        let a = b.param(0).unwrap();
        let last = b.build_load(a).unwrap();
        b.position_at_head(bb);
        let first = b.build_load(a).unwrap();
        let second = b.build_load(a).unwrap();
        b.position_before(last);
        let third = b.build_load(a).unwrap();
        b.position_after(last);
        let fifth = b.build_load(a).unwrap();
        assert_eq!(f.insts(bb), &[first, second, third, last, fifth]);
    }

    #[test]
    fn test_branch_links_edges() {
        let mut f = func();
        let entry = f.append_block("entry");
        let then_bb = f.append_block("then");
        let else_bb = f.append_block("else");
        let mut b = IrBuilder::at_end(&mut f, entry);
        let cond = b
            .build_cmp(CmpKind::Eq, Constant::int32(1), Constant::int32(1))
            .unwrap();
        let br = b.build_cond_branch(cond, then_bb, else_bb).unwrap();
        b.position_at_end(then_bb);
        b.build_ret(Constant::int32(0)).unwrap();
        b.position_at_end(else_bb);
        b.build_loop_jmp(then_bb);

        assert_eq!(f.succs(entry), vec![then_bb, else_bb]);
        assert_eq!(f.succs(then_bb), vec![f.end()]);
        assert_eq!(f.preds(then_bb), vec![entry, else_bb]);
        assert_eq!(f.operands(br).len(), 4);
        assert!(f.block(entry).has_branch);
        assert!(f.block(then_bb).has_ret);
        assert_eq!(f.uses(then_bb.0).len(), 2);
    }

    #[test]
    fn test_call_arguments() {
        let mut f = func();
        let bb = f.append_block("entry");
        let callee = FuncRef {
            id: FuncId(0),
            name: "f".to_string(),
            ret: TypeDesc::Int32,
        };
        let mut b = IrBuilder::at_end(&mut f, bb);
        let a = b.param(0).unwrap();
        let call = b.build_call(&callee, vec![a.into()]).unwrap();
        assert_eq!(b.func().operands(call).len(), 2);
        assert!(b.build_call(&callee, vec![bb.into()]).is_err());
    }
}
