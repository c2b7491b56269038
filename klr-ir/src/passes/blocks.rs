//! Block-level CFG cleanup: unreachable blocks and jump-only blocks

use crate::function::Function;
use crate::opcode::Opcode;
use crate::value::{BlockId, EdgeId, Operand};
use log::{debug, trace, warn};
use std::collections::BTreeSet;

/// Mark every block reachable from *start*
fn mark_reachable(func: &mut Function) {
    let mut all: Vec<BlockId> = func.blocks().to_vec();
    all.push(func.start());
    all.push(func.end());
    for bb in all {
        func.block_mut(bb).visited = false;
    }

    let mut stack = vec![func.start()];
    while let Some(bb) = stack.pop() {
        if func.block(bb).visited {
            continue;
        }
        func.block_mut(bb).visited = true;
        for succ in func.succs(bb) {
            if !func.block(succ).visited {
                stack.push(succ);
            }
        }
    }
}

/// Delete every block not reachable from *start*
pub fn remove_unreachable_blocks(func: &mut Function) {
    mark_reachable(func);
    let dead: Vec<BlockId> = func
        .blocks()
        .iter()
        .copied()
        .filter(|bb| !func.block(*bb).visited)
        .collect();
    if dead.is_empty() {
        return;
    }

    // An edge between two dead blocks shows up twice, unlink it once
    let mut edges: BTreeSet<EdgeId> = BTreeSet::new();
    for bb in &dead {
        let data = func.block(*bb);
        edges.extend(data.in_edges.iter().copied());
        edges.extend(data.out_edges.iter().copied());
    }
    for e in edges {
        func.remove_edge(e);
    }

    // Dead code may refer to other dead blocks and instructions in any
    // order, so release every operand before deleting anything
    for bb in &dead {
        for inst in func.insts(*bb).to_vec() {
            func.detach_all(inst);
        }
    }
    for bb in &dead {
        trace!("removing unreachable block {}", func.display_name(bb.0));
        func.delete_block(*bb);
    }
    debug!(
        "remove-unreachable-block: removed {} blocks from '{}'",
        dead.len(),
        func.name
    );
}

/// A block holding nothing but an unprotected jump to another block
fn only_jump_target(func: &Function, bb: BlockId) -> Option<BlockId> {
    let insts = func.insts(bb);
    if insts.len() != 1 {
        return None;
    }
    let jmp = insts[0];
    let data = func.inst(jmp);
    if data.opcode != Opcode::Jmp || data.loop_edge {
        return None;
    }
    let target = data.operands[0].as_use().and_then(|id| func.as_block(id))?;
    (target != bb).then_some(target)
}

/// Bypass `bb`: predecessors branch straight to `target`
fn bypass_block(func: &mut Function, bb: BlockId, target: BlockId) {
    trace!(
        "bypassing {} -> {}",
        func.display_name(bb.0),
        func.display_name(target.0)
    );
    for e in func.block(bb).in_edges.clone() {
        func.set_edge_dst(e, target);
    }
    func.replace_all_uses(bb.0, Operand::Use(target.0));
    for e in func.block(bb).out_edges.clone() {
        func.remove_edge(e);
    }
    func.delete_block(bb);
}

/// Drop an empty block; a block that is still a branch target stays.
///
/// An empty block has no successor to forward its predecessors to, so
/// deleting it would leave the branch operand naming a dead block.
fn remove_empty_block(func: &mut Function, bb: BlockId) -> bool {
    if !func.uses(bb.0).is_empty() {
        warn!(
            "empty block {} in '{}' is still a branch target, keeping it",
            func.display_name(bb.0),
            func.name
        );
        return false;
    }
    let data = func.block(bb);
    let edges: Vec<EdgeId> = data.in_edges.iter().chain(&data.out_edges).copied().collect();
    for e in edges {
        func.remove_edge(e);
    }
    func.delete_block(bb);
    true
}

/// Remove blocks consisting of a single jump, and empty blocks, until none
/// are left. Removing one block may turn its predecessor into a candidate.
pub fn remove_only_jump_blocks(func: &mut Function) {
    let mut removed = 0;
    let mut kept: BTreeSet<BlockId> = BTreeSet::new();
    loop {
        let mut changed = false;
        for bb in func.blocks().to_vec() {
            if func.insts(bb).is_empty() {
                if kept.contains(&bb) {
                    continue;
                }
                if remove_empty_block(func, bb) {
                    removed += 1;
                    changed = true;
                } else {
                    kept.insert(bb);
                }
                continue;
            }
            if let Some(target) = only_jump_target(func, bb) {
                bypass_block(func, bb, target);
                removed += 1;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    debug!(
        "remove-only-jump-block: removed {} blocks from '{}'",
        removed, func.name
    );
}
