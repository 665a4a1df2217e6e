use std::collections::{BTreeMap, BTreeSet};

use crate::attribute_info::CodeAttribute;
use crate::code_attribute::Instruction;
use crate::error::MethodError;

use super::cfg_types::*;
use super::util::{decode, jump_target, next_address};

/// Build a control flow graph from a CodeAttribute.
///
/// Block leaders are the method entry, every branch and switch target, the instruction after any
/// control transfer, and the boundaries and handlers of every exception table entry. A branch into
/// the middle of an instruction or past the end of the code is rejected.
pub fn build_cfg(code_attr: &CodeAttribute) -> Result<ControlFlowGraph, MethodError> {
    let addressed = decode(&code_attr.code)?;
    let code_len = code_attr.code.len() as u32;
    if addressed.is_empty() {
        return Ok(ControlFlowGraph {
            blocks: BTreeMap::new(),
            entry: 0,
            exception_edges: Vec::new(),
        });
    }
    let starts: BTreeSet<u32> = addressed.iter().map(|(a, _)| *a).collect();

    // Step 1: Identify block leaders
    let mut leaders = BTreeSet::new();
    leaders.insert(0u32);

    for ex in &code_attr.exception_table {
        leaders.insert(ex.start_pc as u32);
        leaders.insert(ex.handler_pc as u32);
        if (ex.end_pc as u32) < code_len {
            leaders.insert(ex.end_pc as u32);
        }
    }

    for (i, (addr, instr)) in addressed.iter().enumerate() {
        let next_addr = next_address(&addressed, i, code_len);
        for target in instr.jump_targets(*addr) {
            leaders.insert(target);
        }
        if instr.ends_block() && next_addr < code_len {
            leaders.insert(next_addr);
        }
    }

    for &leader in &leaders {
        if !starts.contains(&leader) {
            return Err(MethodError::InvalidBytecode {
                offset: leader,
                message: format!("control transfer to {} is not an instruction boundary", leader),
            });
        }
    }

    // Step 2: Build basic blocks
    let leader_vec: Vec<u32> = leaders.iter().copied().collect();
    let mut blocks = BTreeMap::new();
    let addr_to_idx: BTreeMap<u32, usize> =
        addressed.iter().enumerate().map(|(i, (a, _))| (*a, i)).collect();

    for (li, &leader_addr) in leader_vec.iter().enumerate() {
        let start_idx = addr_to_idx[&leader_addr];
        let end_idx = leader_vec
            .get(li + 1)
            .and_then(|next| addr_to_idx.get(next).copied())
            .unwrap_or(addressed.len());
        if start_idx >= end_idx {
            continue;
        }

        let block_instrs: Vec<AddressedInstruction> = addressed[start_idx..end_idx]
            .iter()
            .map(|(a, i)| AddressedInstruction {
                address: *a,
                instruction: i.clone(),
            })
            .collect();

        let last_idx = end_idx - 1;
        let (last_addr, last_instr) = &addressed[last_idx];
        let last_next = next_address(&addressed, last_idx, code_len);
        let terminator = build_terminator(last_instr, *last_addr, last_next);

        blocks.insert(
            leader_addr,
            BasicBlock {
                id: leader_addr,
                end: last_next,
                instructions: block_instrs,
                terminator,
            },
        );
    }

    // Every successor must be a block; falling off the end of the code is invalid.
    for block in blocks.values() {
        let cfg_succs = successors_of(&block.terminator);
        for s in cfg_succs {
            if !blocks.contains_key(&s) {
                return Err(MethodError::InvalidBytecode {
                    offset: block.last_address(),
                    message: format!("control flows to {} outside the method code", s),
                });
            }
        }
    }

    // Step 3: Exception edges
    let exception_edges: Vec<ExceptionEdge> = code_attr
        .exception_table
        .iter()
        .map(|e| ExceptionEdge {
            start_pc: e.start_pc as u32,
            end_pc: e.end_pc as u32,
            handler_block: e.handler_pc as u32,
            catch_type: e.catch_type,
        })
        .collect();

    tracing::trace!(
        blocks = blocks.len(),
        handlers = exception_edges.len(),
        "built control flow graph"
    );

    Ok(ControlFlowGraph {
        blocks,
        entry: 0,
        exception_edges,
    })
}

fn successors_of(term: &Terminator) -> Vec<BlockId> {
    match term {
        Terminator::FallThrough { target } | Terminator::Goto { target } => vec![*target],
        Terminator::ConditionalBranch { if_true, if_false, .. } => vec![*if_true, *if_false],
        Terminator::TableSwitch { default, targets, .. } => {
            let mut v = targets.clone();
            v.push(*default);
            v
        }
        Terminator::LookupSwitch { default, pairs } => {
            let mut v: Vec<BlockId> = pairs.iter().map(|(_, t)| *t).collect();
            v.push(*default);
            v
        }
        Terminator::Jsr { target, return_addr } => vec![*target, *return_addr],
        Terminator::Return | Terminator::Throw | Terminator::Ret => vec![],
    }
}

fn build_terminator(instr: &Instruction, addr: u32, next: u32) -> Terminator {
    let cond = |condition: BranchCondition, off: i16| Terminator::ConditionalBranch {
        condition,
        if_true: jump_target(addr, off as i32),
        if_false: next,
    };
    match instr {
        Instruction::Goto(off) => Terminator::Goto {
            target: jump_target(addr, *off as i32),
        },
        Instruction::GotoW(off) => Terminator::Goto {
            target: jump_target(addr, *off),
        },
        Instruction::Ifeq(off) => cond(BranchCondition::IntZero(CompareOp::Eq), *off),
        Instruction::Ifne(off) => cond(BranchCondition::IntZero(CompareOp::Ne), *off),
        Instruction::Iflt(off) => cond(BranchCondition::IntZero(CompareOp::Lt), *off),
        Instruction::Ifge(off) => cond(BranchCondition::IntZero(CompareOp::Ge), *off),
        Instruction::Ifgt(off) => cond(BranchCondition::IntZero(CompareOp::Gt), *off),
        Instruction::Ifle(off) => cond(BranchCondition::IntZero(CompareOp::Le), *off),
        Instruction::IfIcmpeq(off) => cond(BranchCondition::IntCompare(CompareOp::Eq), *off),
        Instruction::IfIcmpne(off) => cond(BranchCondition::IntCompare(CompareOp::Ne), *off),
        Instruction::IfIcmplt(off) => cond(BranchCondition::IntCompare(CompareOp::Lt), *off),
        Instruction::IfIcmpge(off) => cond(BranchCondition::IntCompare(CompareOp::Ge), *off),
        Instruction::IfIcmpgt(off) => cond(BranchCondition::IntCompare(CompareOp::Gt), *off),
        Instruction::IfIcmple(off) => cond(BranchCondition::IntCompare(CompareOp::Le), *off),
        Instruction::IfAcmpeq(off) => cond(BranchCondition::RefCompare(CompareOp::Eq), *off),
        Instruction::IfAcmpne(off) => cond(BranchCondition::RefCompare(CompareOp::Ne), *off),
        Instruction::Ifnull(off) => cond(BranchCondition::RefNull(true), *off),
        Instruction::Ifnonnull(off) => cond(BranchCondition::RefNull(false), *off),
        Instruction::Tableswitch { default, low, high, offsets } => Terminator::TableSwitch {
            default: jump_target(addr, *default),
            low: *low,
            high: *high,
            targets: offsets.iter().map(|off| jump_target(addr, *off)).collect(),
        },
        Instruction::Lookupswitch { default, pairs, .. } => Terminator::LookupSwitch {
            default: jump_target(addr, *default),
            pairs: pairs
                .iter()
                .map(|(key, off)| (*key, jump_target(addr, *off)))
                .collect(),
        },
        Instruction::Return
        | Instruction::Ireturn
        | Instruction::Lreturn
        | Instruction::Freturn
        | Instruction::Dreturn
        | Instruction::Areturn => Terminator::Return,
        Instruction::Athrow => Terminator::Throw,
        Instruction::Jsr(off) => Terminator::Jsr {
            target: jump_target(addr, *off as i32),
            return_addr: next,
        },
        Instruction::JsrW(off) => Terminator::Jsr {
            target: jump_target(addr, *off),
            return_addr: next,
        },
        Instruction::Ret(_) | Instruction::RetWide(_) => Terminator::Ret,
        _ => Terminator::FallThrough { target: next },
    }
}

/// Sentinel node standing for "method exit" in the post-dominator tree.
pub const EXIT: BlockId = u32::MAX;

/// Immediate-dominator tree computed with the Cooper/Harvey/Kennedy iteration.
#[derive(Clone, Debug, Default)]
pub struct DominatorTree {
    idom: BTreeMap<BlockId, BlockId>,
    order: BTreeMap<BlockId, usize>,
}

impl DominatorTree {
    /// `rpo` lists the nodes reachable from `rpo[0]` in reverse postorder; `preds` gives the
    /// predecessors of each node in the same graph.
    pub fn compute(rpo: &[BlockId], preds: &BTreeMap<BlockId, Vec<BlockId>>) -> Self {
        let order: BTreeMap<BlockId, usize> =
            rpo.iter().enumerate().map(|(i, b)| (*b, i)).collect();
        let mut idom: BTreeMap<BlockId, BlockId> = BTreeMap::new();
        let root = match rpo.first() {
            Some(r) => *r,
            None => return DominatorTree::default(),
        };
        idom.insert(root, root);

        let mut changed = true;
        while changed {
            changed = false;
            for &b in rpo.iter().skip(1) {
                let mut new_idom: Option<BlockId> = None;
                for p in preds.get(&b).map(|v| v.as_slice()).unwrap_or(&[]) {
                    if !idom.contains_key(p) {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => *p,
                        Some(cur) => intersect(&idom, &order, *p, cur),
                    });
                }
                if let Some(n) = new_idom {
                    if idom.get(&b) != Some(&n) {
                        idom.insert(b, n);
                        changed = true;
                    }
                }
            }
        }
        DominatorTree { idom, order }
    }

    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        match self.idom.get(&block) {
            Some(&d) if d != block => Some(d),
            _ => None,
        }
    }

    pub fn contains(&self, block: BlockId) -> bool {
        self.idom.contains_key(&block)
    }

    /// True when every path from the root to `b` passes through `a` (reflexive).
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if !self.idom.contains_key(&b) {
            return false;
        }
        let mut cur = b;
        loop {
            if cur == a {
                return true;
            }
            match self.idom.get(&cur) {
                Some(&next) if next != cur => cur = next,
                _ => return false,
            }
        }
    }

    /// Position of the node in the reverse postorder used for the computation.
    pub fn rpo_index(&self, block: BlockId) -> Option<usize> {
        self.order.get(&block).copied()
    }
}

fn intersect(
    idom: &BTreeMap<BlockId, BlockId>,
    order: &BTreeMap<BlockId, usize>,
    mut a: BlockId,
    mut b: BlockId,
) -> BlockId {
    let pos = |x: BlockId| order.get(&x).copied().unwrap_or(usize::MAX);
    while a != b {
        while pos(a) > pos(b) {
            match idom.get(&a) {
                Some(&n) if n != a => a = n,
                _ => return b,
            }
        }
        while pos(b) > pos(a) {
            match idom.get(&b) {
                Some(&n) if n != b => b = n,
                _ => return a,
            }
        }
    }
    a
}

/// Dominators over normal and exceptional edges from the method entry.
pub fn dominators<G: FlowGraph>(cfg: &G) -> DominatorTree {
    let rpo = cfg.reverse_postorder();
    let preds = cfg.all_predecessor_map();
    DominatorTree::compute(&rpo, &preds)
}

/// Post-dominators over normal edges. Returning, throwing and `ret` blocks flow into [`EXIT`];
/// blocks that cannot reach an exit (infinite loops) have no post-dominator.
pub fn post_dominators<G: FlowGraph>(cfg: &G) -> DominatorTree {
    // Reverse graph: successors become predecessors.
    let mut rev_succs: BTreeMap<BlockId, Vec<BlockId>> = BTreeMap::new();
    let mut rev_preds: BTreeMap<BlockId, Vec<BlockId>> = BTreeMap::new();
    for b in cfg.block_ids() {
        let succs = cfg.successors(b);
        if succs.is_empty() {
            rev_succs.entry(EXIT).or_default().push(b);
            rev_preds.entry(b).or_default().push(EXIT);
        }
        for s in succs {
            rev_succs.entry(s).or_default().push(b);
            rev_preds.entry(b).or_default().push(s);
        }
    }

    let mut visited = BTreeSet::new();
    let mut postorder = Vec::new();
    let mut stack: Vec<(BlockId, usize)> = vec![(EXIT, 0)];
    visited.insert(EXIT);
    while let Some((node, idx)) = stack.last_mut() {
        let next = rev_succs.get(node).and_then(|v| v.get(*idx)).copied();
        *idx += 1;
        match next {
            Some(n) => {
                if visited.insert(n) {
                    stack.push((n, 0));
                }
            }
            None => {
                postorder.push(*node);
                stack.pop();
            }
        }
    }
    postorder.reverse();
    DominatorTree::compute(&postorder, &rev_preds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute_info::ExceptionEntry;

    fn code(bytes: &[u8]) -> CodeAttribute {
        CodeAttribute {
            max_stack: 4,
            max_locals: 4,
            code_length: bytes.len() as u32,
            code: bytes.to_vec(),
            exception_table_length: 0,
            exception_table: Vec::new(),
            attributes_count: 0,
            attributes: Vec::new(),
        }
    }

    #[test]
    fn diamond_has_join_post_dominator() {
        // 0: iload_0; 1: ifeq +7 -> 8; 4: iconst_1; 5: goto +4 -> 9; 8: iconst_2; 9: ireturn
        let cfg = build_cfg(&code(&[0x1a, 0x99, 0x00, 0x07, 0x04, 0xa7, 0x00, 0x04, 0x05, 0xac]))
            .unwrap();
        assert_eq!(cfg.blocks.keys().copied().collect::<Vec<_>>(), vec![0, 4, 8, 9]);
        assert_eq!(cfg.successors(0), vec![8, 4]);
        let pdom = post_dominators(&cfg);
        assert_eq!(pdom.idom(0), Some(9));
        let dom = dominators(&cfg);
        assert_eq!(dom.idom(9), Some(0));
        assert!(dom.dominates(0, 8));
        assert!(!dom.dominates(4, 9));
    }

    #[test]
    fn exception_range_bounds_split_blocks() {
        // 0: iconst_0; 1: istore_1; 2: iinc 1 1; 5: return; 6: astore_2; 7: return
        let mut attr = code(&[0x03, 0x3c, 0x84, 0x01, 0x01, 0xb1, 0x4d, 0xb1]);
        attr.exception_table.push(ExceptionEntry {
            start_pc: 2,
            end_pc: 5,
            handler_pc: 6,
            catch_type: 0,
        });
        attr.exception_table_length = 1;
        let cfg = build_cfg(&attr).unwrap();
        assert_eq!(cfg.blocks.keys().copied().collect::<Vec<_>>(), vec![0, 2, 5, 6]);
        assert_eq!(cfg.exception_successors(2), vec![6]);
        assert!(cfg.exception_successors(0).is_empty());
        assert_eq!(cfg.reverse_postorder().len(), 4);
    }

    #[test]
    fn rejects_branch_into_instruction() {
        // 0: goto +1 -> 1 (middle of goto)
        let err = build_cfg(&code(&[0xa7, 0x00, 0x01])).unwrap_err();
        assert!(matches!(err, MethodError::InvalidBytecode { offset: 1, .. }));
    }

    #[test]
    fn ret_is_distinct_from_return() {
        // 0: jsr +4 -> 4; 3: return; 4: astore_1; 5: ret 1
        let cfg = build_cfg(&code(&[0xa8, 0x00, 0x04, 0xb1, 0x4c, 0xa9, 0x01])).unwrap();
        assert_eq!(
            cfg.blocks[&0].terminator,
            Terminator::Jsr { target: 4, return_addr: 3 }
        );
        assert_eq!(cfg.blocks[&4].terminator, Terminator::Ret);
    }
}
