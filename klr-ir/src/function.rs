//! Function arena
//!
//! A `Function` exclusively owns its blocks, edges, parameters, locals and
//! instructions. All of them are stored in one value arena and addressed by
//! stable handles; deleting an entity leaves a tombstone so that stale handles
//! are caught instead of silently aliasing a new value.
//!
//! Two synthetic blocks, *start* and *end*, live in the arena but not in the
//! block list. The first appended block gets an edge from *start* and every
//! return links to *end*.

use crate::opcode::Opcode;
use crate::value::*;
use klr_common::{IrError, TypeDesc};
use log::trace;
use std::cmp::Reverse;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Function {
    pub id: FuncId,
    pub name: String,
    pub ret: TypeDesc,
    values: Vec<Option<ValueData>>,
    edges: Vec<Option<Edge>>,
    edge_list: Vec<EdgeId>,
    blocks: Vec<BlockId>,
    params: Vec<ValueId>,
    locals: Vec<ValueId>,
    global_refs: Vec<(GlobalId, ValueId)>,
    start: BlockId,
    end: BlockId,
}

impl Function {
    pub fn new(id: FuncId, name: impl Into<String>, ret: TypeDesc) -> Self {
        let mut func = Self {
            id,
            name: name.into(),
            ret,
            values: Vec::new(),
            edges: Vec::new(),
            edge_list: Vec::new(),
            blocks: Vec::new(),
            params: Vec::new(),
            locals: Vec::new(),
            global_refs: Vec::new(),
            start: BlockId(ValueId(0)),
            end: BlockId(ValueId(0)),
        };
        func.start = BlockId(func.alloc(ValueData::new(
            ValueKind::Block(BlockData::default()),
            None,
            "start",
        )));
        func.end = BlockId(func.alloc(ValueData::new(
            ValueKind::Block(BlockData::default()),
            None,
            "end",
        )));
        func
    }

    fn alloc(&mut self, data: ValueData) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(Some(data));
        id
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    pub fn start(&self) -> BlockId {
        self.start
    }

    pub fn end(&self) -> BlockId {
        self.end
    }

    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    pub fn params(&self) -> &[ValueId] {
        &self.params
    }

    pub fn locals(&self) -> &[ValueId] {
        &self.locals
    }

    /// Function-local references to module globals
    pub fn global_refs(&self) -> &[(GlobalId, ValueId)] {
        &self.global_refs
    }

    pub fn edges(&self) -> &[EdgeId] {
        &self.edge_list
    }

    pub fn param(&self, index: usize) -> Result<ValueId, IrError> {
        self.params.get(index).copied().ok_or(IrError::ParamOutOfRange {
            index,
            count: self.params.len(),
        })
    }

    pub fn is_live(&self, id: ValueId) -> bool {
        matches!(self.values.get(id.index()), Some(Some(_)))
    }

    pub fn value(&self, id: ValueId) -> &ValueData {
        match self.values.get(id.index()) {
            Some(Some(data)) => data,
            _ => panic!("use of deleted value {:?} in function '{}'", id, self.name),
        }
    }

    pub fn value_mut(&mut self, id: ValueId) -> &mut ValueData {
        match self.values.get_mut(id.index()) {
            Some(Some(data)) => data,
            _ => panic!("use of deleted value {:?}", id),
        }
    }

    /// Iterate over all live values of the arena
    pub fn values(&self) -> impl Iterator<Item = (ValueId, &ValueData)> {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref().map(|v| (ValueId(i as u32), v)))
    }

    pub fn block(&self, bb: BlockId) -> &BlockData {
        match &self.value(bb.0).kind {
            ValueKind::Block(data) => data,
            other => panic!("{:?} is a {}, not a block", bb.0, other.describe()),
        }
    }

    pub fn block_mut(&mut self, bb: BlockId) -> &mut BlockData {
        match &mut self.value_mut(bb.0).kind {
            ValueKind::Block(data) => data,
            other => panic!("{:?} is a {}, not a block", bb.0, other.describe()),
        }
    }

    pub fn inst(&self, inst: InstId) -> &InstData {
        match &self.value(inst.0).kind {
            ValueKind::Inst(data) => data,
            other => panic!("{:?} is a {}, not an instruction", inst.0, other.describe()),
        }
    }

    pub fn inst_mut(&mut self, inst: InstId) -> &mut InstData {
        match &mut self.value_mut(inst.0).kind {
            ValueKind::Inst(data) => data,
            other => panic!("{:?} is a {}, not an instruction", inst.0, other.describe()),
        }
    }

    pub fn opcode(&self, inst: InstId) -> Opcode {
        self.inst(inst).opcode
    }

    pub fn operands(&self, inst: InstId) -> &[Operand] {
        &self.inst(inst).operands
    }

    pub fn operand(&self, inst: InstId, slot: u32) -> &Operand {
        &self.inst(inst).operands[slot as usize]
    }

    pub fn insts(&self, bb: BlockId) -> &[InstId] {
        &self.block(bb).insts
    }

    pub fn uses(&self, id: ValueId) -> &[Use] {
        &self.value(id).uses
    }

    pub fn as_block(&self, id: ValueId) -> Option<BlockId> {
        match self.values.get(id.index()) {
            Some(Some(ValueData { kind: ValueKind::Block(_), .. })) => Some(BlockId(id)),
            _ => None,
        }
    }

    pub fn as_inst(&self, id: ValueId) -> Option<InstId> {
        match self.values.get(id.index()) {
            Some(Some(ValueData { kind: ValueKind::Inst(_), .. })) => Some(InstId(id)),
            _ => None,
        }
    }

    /// Type of whatever an operand refers to
    pub fn operand_ty(&self, operand: &Operand) -> Option<TypeDesc> {
        match operand {
            Operand::Use(id) => self.value(*id).ty.clone(),
            Operand::Const(c) => Some(c.ty()),
            Operand::Func(f) => Some(f.ret.clone()),
            Operand::Empty => None,
        }
    }

    /// Printable reference: `%name`, `%bb<tag>` or `%<tag>`
    pub fn display_name(&self, id: ValueId) -> String {
        let data = self.value(id);
        if !data.name.is_empty() {
            return format!("%{}", data.name);
        }
        match (&data.kind, data.tag) {
            (ValueKind::Block(_), Some(tag)) => format!("%bb{}", tag),
            (_, Some(tag)) => format!("%{}", tag),
            _ => "%?".to_string(),
        }
    }

    // ---------------------------------------------------------------------
    // Parameters, locals and globals
    // ---------------------------------------------------------------------

    pub fn add_param(&mut self, name: impl Into<String>, ty: TypeDesc) -> ValueId {
        let index = self.params.len();
        let id = self.alloc(ValueData::new(ValueKind::Param { index }, Some(ty), name));
        self.params.push(id);
        id
    }

    /// Declare a local in `bb`; locals are tracked function-wide as well
    pub fn add_local(&mut self, bb: BlockId, name: impl Into<String>, ty: TypeDesc) -> ValueId {
        let id = self.alloc(ValueData::new(ValueKind::Local { block: bb }, Some(ty), name));
        self.block_mut(bb).locals.push(id);
        self.locals.push(id);
        id
    }

    /// Drop a local that is no longer read or written
    pub fn remove_local(&mut self, local: ValueId) {
        let block = match self.value(local).kind {
            ValueKind::Local { block } => block,
            ref other => panic!("{:?} is a {}, not a local", local, other.describe()),
        };
        assert!(
            self.uses(local).is_empty(),
            "removing local {} which is still used",
            self.display_name(local)
        );
        if self.is_live(block.0) {
            self.block_mut(block).locals.retain(|l| *l != local);
        }
        self.locals.retain(|l| *l != local);
        self.values[local.index()] = None;
    }

    /// Intern the function-local reference value for a module global
    pub fn import_global(&mut self, global: GlobalId, name: &str, ty: TypeDesc) -> ValueId {
        if let Some((_, id)) = self.global_refs.iter().find(|(g, _)| *g == global) {
            return *id;
        }
        let id = self.alloc(ValueData::new(ValueKind::Global(global), Some(ty), name));
        self.global_refs.push((global, id));
        id
    }

    // ---------------------------------------------------------------------
    // Blocks
    // ---------------------------------------------------------------------

    fn new_block(&mut self, name: impl Into<String>) -> BlockId {
        BlockId(self.alloc(ValueData::new(
            ValueKind::Block(BlockData::default()),
            None,
            name,
        )))
    }

    /// Append a block; the very first one is linked from *start*
    pub fn append_block(&mut self, name: impl Into<String>) -> BlockId {
        let bb = self.new_block(name);
        self.blocks.push(bb);
        if self.blocks.len() == 1 {
            let start = self.start;
            self.link_edge(start, bb);
        }
        bb
    }

    pub fn insert_block_after(&mut self, after: BlockId, name: impl Into<String>) -> BlockId {
        let pos = self.block_index(after) + 1;
        let bb = self.new_block(name);
        self.blocks.insert(pos, bb);
        bb
    }

    pub fn insert_block_before(&mut self, before: BlockId, name: impl Into<String>) -> BlockId {
        let pos = self.block_index(before);
        let bb = self.new_block(name);
        self.blocks.insert(pos, bb);
        bb
    }

    fn block_index(&self, bb: BlockId) -> usize {
        match self.blocks.iter().position(|b| *b == bb) {
            Some(pos) => pos,
            None => panic!("{:?} is not in the block list of '{}'", bb.0, self.name),
        }
    }

    /// Remove a block and its instructions.
    ///
    /// The caller must have removed every edge touching the block and every
    /// use of the block as a branch target. Operands held by the block's own
    /// instructions are detached here; their results must only be read from
    /// inside the block.
    pub fn delete_block(&mut self, bb: BlockId) {
        let data = self.block(bb);
        assert!(
            data.in_edges.is_empty() && data.out_edges.is_empty(),
            "deleting {} which still has edges",
            self.display_name(bb.0)
        );
        assert!(
            self.uses(bb.0).is_empty(),
            "deleting {} which is still a branch target",
            self.display_name(bb.0)
        );

        let insts = data.insts.clone();
        let locals = data.locals.clone();
        for inst in &insts {
            self.detach_all(*inst);
        }
        for inst in insts.iter().rev() {
            self.delete_inst(*inst);
        }

        let pos = self.block_index(bb);
        self.blocks.remove(pos);

        // Locals stay function-wide, re-home them to the entry block
        if let Some(&entry) = self.blocks.first() {
            for local in &locals {
                self.value_mut(*local).kind = ValueKind::Local { block: entry };
            }
            self.block_mut(entry).locals.extend(locals);
        }

        trace!("deleted block {:?} from '{}'", bb.0, self.name);
        self.values[bb.0.index()] = None;
    }

    // ---------------------------------------------------------------------
    // Edges
    // ---------------------------------------------------------------------

    pub fn edge(&self, e: EdgeId) -> Edge {
        match self.edges.get(e.0 as usize) {
            Some(Some(edge)) => *edge,
            _ => panic!("use of deleted edge {:?}", e),
        }
    }

    /// Link `src -> dst` in all three edge lists
    pub fn link_edge(&mut self, src: BlockId, dst: BlockId) -> EdgeId {
        let id = EdgeId(self.edges.len() as u32);
        self.edges.push(Some(Edge { src, dst }));
        self.edge_list.push(id);
        self.block_mut(src).out_edges.push(id);
        self.block_mut(dst).in_edges.push(id);
        id
    }

    /// Unlink an edge from all three edge lists
    pub fn remove_edge(&mut self, e: EdgeId) {
        let Edge { src, dst } = self.edge(e);

        let pos = self.edge_list.iter().position(|x| *x == e);
        let out = self.block(src).out_edges.iter().position(|x| *x == e);
        let inc = self.block(dst).in_edges.iter().position(|x| *x == e);
        match (pos, out, inc) {
            (Some(pos), Some(out), Some(inc)) => {
                self.edge_list.remove(pos);
                self.block_mut(src).out_edges.remove(out);
                self.block_mut(dst).in_edges.remove(inc);
            }
            _ => panic!("edge {:?} is missing from one of its edge lists", e),
        }
        self.edges[e.0 as usize] = None;
    }

    /// Retarget the source of an edge, keeping its handle
    pub fn set_edge_src(&mut self, e: EdgeId, new_src: BlockId) {
        let Edge { src, dst } = self.edge(e);
        self.block_mut(src).out_edges.retain(|x| *x != e);
        self.block_mut(new_src).out_edges.push(e);
        self.edges[e.0 as usize] = Some(Edge { src: new_src, dst });
    }

    /// Retarget the destination of an edge, keeping its handle
    pub fn set_edge_dst(&mut self, e: EdgeId, new_dst: BlockId) {
        let Edge { src, dst } = self.edge(e);
        self.block_mut(dst).in_edges.retain(|x| *x != e);
        self.block_mut(new_dst).in_edges.push(e);
        self.edges[e.0 as usize] = Some(Edge { src, dst: new_dst });
    }

    pub fn preds(&self, bb: BlockId) -> Vec<BlockId> {
        self.block(bb).in_edges.iter().map(|e| self.edge(*e).src).collect()
    }

    pub fn succs(&self, bb: BlockId) -> Vec<BlockId> {
        self.block(bb).out_edges.iter().map(|e| self.edge(*e).dst).collect()
    }

    // ---------------------------------------------------------------------
    // Instructions and use-def chains
    // ---------------------------------------------------------------------

    /// Create an instruction at `index` of `bb` and attach its operands
    pub fn insert_inst(
        &mut self,
        bb: BlockId,
        index: usize,
        opcode: Opcode,
        ty: Option<TypeDesc>,
        operands: Vec<Operand>,
    ) -> InstId {
        let slots = vec![Operand::Empty; operands.len()].into_boxed_slice();
        let data = InstData {
            opcode,
            operands: slots,
            block: bb,
            pos: 0,
            loop_edge: false,
            result: None,
        };
        let inst = InstId(self.alloc(ValueData::new(ValueKind::Inst(data), ty, "")));
        for (slot, operand) in operands.into_iter().enumerate() {
            self.attach(inst, slot as u32, operand);
        }
        self.block_mut(bb).insts.insert(index, inst);
        inst
    }

    /// Fill an empty operand slot, registering the use when tracked
    pub fn attach(&mut self, inst: InstId, slot: u32, operand: Operand) {
        assert!(
            self.operand(inst, slot).is_empty(),
            "operand {} of {:?} is already attached",
            slot,
            inst.0
        );
        if let Operand::Use(id) = &operand {
            let id = *id;
            self.value_mut(id).uses.push(Use { inst, slot });
        }
        self.inst_mut(inst).operands[slot as usize] = operand;
    }

    /// Empty an operand slot, unregistering its use. Returns the old operand.
    pub fn detach(&mut self, inst: InstId, slot: u32) -> Operand {
        let old = std::mem::replace(
            &mut self.inst_mut(inst).operands[slot as usize],
            Operand::Empty,
        );
        if let Operand::Use(id) = &old {
            let uses = &mut self.value_mut(*id).uses;
            match uses.iter().position(|u| u.inst == inst && u.slot == slot) {
                Some(pos) => {
                    uses.remove(pos);
                }
                None => panic!("use {:?}/{} missing from use-list of {:?}", inst.0, slot, id),
            }
        }
        old
    }

    pub fn detach_all(&mut self, inst: InstId) {
        for slot in 0..self.operands(inst).len() as u32 {
            self.detach(inst, slot);
        }
    }

    /// Replace an operand, returning the previous one
    pub fn set_operand(&mut self, inst: InstId, slot: u32, operand: Operand) -> Operand {
        let old = self.detach(inst, slot);
        self.attach(inst, slot, operand);
        old
    }

    /// Move one use onto a different operand
    pub fn redirect(&mut self, u: Use, operand: Operand) {
        self.set_operand(u.inst, u.slot, operand);
    }

    /// Redirect every use of `id` to `operand`
    pub fn replace_all_uses(&mut self, id: ValueId, operand: Operand) {
        assert_ne!(operand, Operand::Use(id), "replacing {:?} with itself", id);
        let uses = self.value(id).uses.clone();
        for u in uses {
            self.redirect(u, operand.clone());
        }
    }

    /// Delete an instruction whose result is no longer read
    pub fn delete_inst(&mut self, inst: InstId) {
        let uses = self.uses(inst.0).len();
        assert!(
            uses == 0,
            "deleting {} ({}) which still has {} uses",
            self.display_name(inst.0),
            self.opcode(inst),
            uses
        );
        self.detach_all(inst);
        let bb = self.inst(inst).block;
        self.block_mut(bb).insts.retain(|i| *i != inst);
        self.values[inst.0.index()] = None;
    }

    /// Delete a side-effect free instruction once nothing reads it, then
    /// retry on the instructions it read
    pub fn remove_if_dead(&mut self, inst: InstId) -> bool {
        if self.as_inst(inst.0).is_none() {
            return false;
        }
        if !self.opcode(inst).is_pure() || !self.uses(inst.0).is_empty() {
            return false;
        }
        let inputs: Vec<InstId> = self
            .operands(inst)
            .iter()
            .filter_map(|op| op.as_use())
            .filter_map(|id| self.as_inst(id))
            .collect();
        trace!("removing dead {} ({})", self.display_name(inst.0), self.opcode(inst));
        self.delete_inst(inst);
        for input in inputs {
            self.remove_if_dead(input);
        }
        true
    }

    // ---------------------------------------------------------------------
    // Ordering
    // ---------------------------------------------------------------------

    /// All instructions in block-list order
    pub fn linear_order(&self) -> Vec<InstId> {
        self.blocks
            .iter()
            .flat_map(|bb| self.block(*bb).insts.iter().copied())
            .collect()
    }

    /// Program index of every instruction
    pub fn program_index(&self) -> HashMap<InstId, usize> {
        self.linear_order()
            .into_iter()
            .enumerate()
            .map(|(i, inst)| (inst, i))
            .collect()
    }

    /// Program positions of every call, ascending
    pub fn call_positions(&self, index: &HashMap<InstId, usize>) -> Vec<usize> {
        let mut calls: Vec<usize> = index
            .iter()
            .filter(|(inst, _)| self.opcode(**inst) == Opcode::Call)
            .map(|(_, pos)| *pos)
            .collect();
        calls.sort_unstable();
        calls
    }

    /// Uses of `id` sorted by program order of the reading instruction.
    /// Within one instruction higher slots come first, so the value a store
    /// reads is seen before the variable it writes.
    pub fn ordered_uses(&self, id: ValueId, index: &HashMap<InstId, usize>) -> Vec<Use> {
        let mut uses = self.value(id).uses.clone();
        uses.sort_by_key(|u| {
            (
                index.get(&u.inst).copied().unwrap_or(usize::MAX),
                Reverse(u.slot),
            )
        });
        uses
    }

    /// Assign printing tags: blocks get `bb0, bb1, ...`, every other unnamed
    /// value a sequential number in definition order
    pub fn renumber(&mut self) {
        let mut order: Vec<ValueId> = Vec::new();
        order.extend(self.params.iter().copied());
        order.extend(self.locals.iter().copied());
        order.extend(self.global_refs.iter().map(|(_, id)| *id));
        for bb in &self.blocks {
            for inst in &self.block(*bb).insts {
                if self.opcode(*inst).has_value() {
                    order.push(inst.0);
                }
            }
        }

        for data in self.values.iter_mut().flatten() {
            data.tag = None;
        }

        let mut next = 0;
        for id in order {
            let data = self.value_mut(id);
            if data.name.is_empty() {
                data.tag = Some(next);
                next += 1;
            }
        }

        let blocks = self.blocks.clone();
        for (i, bb) in blocks.into_iter().enumerate() {
            self.value_mut(bb.0).tag = Some(i as u32);
        }
    }
}
