use std::collections::{BTreeMap, BTreeSet};

use crate::code_attribute::Instruction;

pub use super::expr::CompareOp;

/// Block ID is the bytecode offset of the first instruction in the block.
pub type BlockId = u32;

/// An instruction paired with its bytecode address.
#[derive(Clone, Debug)]
pub struct AddressedInstruction {
    pub address: u32,
    pub instruction: Instruction,
}

/// How a basic block ends.
#[derive(Clone, Debug, PartialEq)]
pub enum Terminator {
    FallThrough { target: BlockId },
    Goto { target: BlockId },
    ConditionalBranch {
        condition: BranchCondition,
        if_true: BlockId,
        if_false: BlockId,
    },
    TableSwitch {
        default: BlockId,
        low: i32,
        high: i32,
        targets: Vec<BlockId>,
    },
    LookupSwitch {
        default: BlockId,
        pairs: Vec<(i32, BlockId)>,
    },
    Return,
    Throw,
    /// Subroutine call; control resumes at `return_addr` after the subroutine's `ret`.
    Jsr { target: BlockId, return_addr: BlockId },
    /// Subroutine exit.
    Ret,
}

impl Terminator {
    /// Case values paired with their targets, in key order, for either switch form.
    pub fn switch_cases(&self) -> Option<(Vec<(i32, BlockId)>, BlockId)> {
        match self {
            Terminator::TableSwitch { default, low, targets, .. } => Some((
                targets
                    .iter()
                    .enumerate()
                    .map(|(i, t)| (low.wrapping_add(i as i32), *t))
                    .collect(),
                *default,
            )),
            Terminator::LookupSwitch { default, pairs } => Some((pairs.clone(), *default)),
            _ => None,
        }
    }
}

/// The condition for a conditional branch.
#[derive(Clone, Debug, PartialEq)]
pub enum BranchCondition {
    IntZero(CompareOp),
    IntCompare(CompareOp),
    RefCompare(CompareOp),
    RefNull(bool),
}

/// A basic block in the CFG.
#[derive(Clone, Debug)]
pub struct BasicBlock {
    pub id: BlockId,
    /// Address just past the last instruction.
    pub end: u32,
    pub instructions: Vec<AddressedInstruction>,
    pub terminator: Terminator,
}

impl BasicBlock {
    /// Address of the instruction that ends the block.
    pub fn last_address(&self) -> u32 {
        self.instructions.last().map(|i| i.address).unwrap_or(self.id)
    }
}

/// An exception handler edge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionEdge {
    pub start_pc: u32,
    pub end_pc: u32,
    pub handler_block: BlockId,
    pub catch_type: u16,
}

impl ExceptionEdge {
    pub fn covers(&self, pc: u32) -> bool {
        pc >= self.start_pc && pc < self.end_pc
    }
}

/// The control flow graph for a single method.
#[derive(Clone, Debug)]
pub struct ControlFlowGraph {
    pub blocks: BTreeMap<BlockId, BasicBlock>,
    pub entry: BlockId,
    pub exception_edges: Vec<ExceptionEdge>,
}

impl Terminator {
    /// Normal-flow successors; switch targets sorted and deduplicated.
    pub fn targets(&self) -> Vec<BlockId> {
        match self {
            Terminator::FallThrough { target } => vec![*target],
            Terminator::Goto { target } => vec![*target],
            Terminator::ConditionalBranch { if_true, if_false, .. } => {
                if if_true == if_false {
                    vec![*if_true]
                } else {
                    vec![*if_true, *if_false]
                }
            }
            Terminator::TableSwitch { default, targets, .. } => {
                let mut succs: Vec<BlockId> = targets.clone();
                succs.push(*default);
                succs.sort();
                succs.dedup();
                succs
            }
            Terminator::LookupSwitch { default, pairs, .. } => {
                let mut succs: Vec<BlockId> = pairs.iter().map(|(_, t)| *t).collect();
                succs.push(*default);
                succs.sort();
                succs.dedup();
                succs
            }
            Terminator::Return | Terminator::Throw | Terminator::Ret => vec![],
            Terminator::Jsr { target, return_addr } => vec![*target, *return_addr],
        }
    }
}

/// Handlers whose protected range contains the start of `block_id`.
pub fn handlers_covering(edges: &[ExceptionEdge], block_id: BlockId) -> Vec<BlockId> {
    let mut out: Vec<BlockId> = edges
        .iter()
        .filter(|e| e.covers(block_id))
        .map(|e| e.handler_block)
        .collect();
    out.sort();
    out.dedup();
    out
}

/// Graph queries shared by the raw CFG and the simulated blocks the structurer rewrites.
pub trait FlowGraph {
    fn entry(&self) -> BlockId;
    fn block_ids(&self) -> Vec<BlockId>;
    fn contains(&self, block_id: BlockId) -> bool;
    /// Get all normal-flow successor block IDs for a given block.
    fn successors(&self, block_id: BlockId) -> Vec<BlockId>;
    /// Handlers whose protected range contains this block.
    fn exception_successors(&self, block_id: BlockId) -> Vec<BlockId>;

    fn all_successors(&self, block_id: BlockId) -> Vec<BlockId> {
        let mut out = self.successors(block_id);
        for h in self.exception_successors(block_id) {
            if !out.contains(&h) {
                out.push(h);
            }
        }
        out
    }

    /// Normal-flow predecessors of every block.
    fn predecessor_map(&self) -> BTreeMap<BlockId, Vec<BlockId>> {
        let ids = self.block_ids();
        let mut preds: BTreeMap<BlockId, Vec<BlockId>> = ids.iter().map(|&b| (b, Vec::new())).collect();
        for &b in &ids {
            for s in self.successors(b) {
                preds.entry(s).or_default().push(b);
            }
        }
        preds
    }

    /// Predecessors including exceptional edges into handlers.
    fn all_predecessor_map(&self) -> BTreeMap<BlockId, Vec<BlockId>> {
        let ids = self.block_ids();
        let mut preds: BTreeMap<BlockId, Vec<BlockId>> = ids.iter().map(|&b| (b, Vec::new())).collect();
        for &b in &ids {
            for s in self.all_successors(b) {
                let list = preds.entry(s).or_default();
                if !list.contains(&b) {
                    list.push(b);
                }
            }
        }
        preds
    }

    /// Returns block IDs reachable from the entry (through normal and exceptional edges)
    /// in reverse postorder.
    fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut visited = BTreeSet::new();
        let mut postorder = Vec::new();
        let mut stack: Vec<(BlockId, Vec<BlockId>)> = Vec::new();
        let entry = self.entry();
        if self.contains(entry) {
            visited.insert(entry);
            stack.push((entry, self.all_successors(entry)));
        }
        while let Some((block, pending)) = stack.last_mut() {
            if pending.is_empty() {
                postorder.push(*block);
                stack.pop();
                continue;
            }
            let next = pending.remove(0);
            if self.contains(next) && visited.insert(next) {
                let succs = self.all_successors(next);
                stack.push((next, succs));
            }
        }
        postorder.reverse();
        postorder
    }
}

impl FlowGraph for ControlFlowGraph {
    fn entry(&self) -> BlockId {
        self.entry
    }

    fn block_ids(&self) -> Vec<BlockId> {
        self.blocks.keys().copied().collect()
    }

    fn contains(&self, block_id: BlockId) -> bool {
        self.blocks.contains_key(&block_id)
    }

    fn successors(&self, block_id: BlockId) -> Vec<BlockId> {
        self.blocks
            .get(&block_id)
            .map(|b| b.terminator.targets())
            .unwrap_or_default()
    }

    fn exception_successors(&self, block_id: BlockId) -> Vec<BlockId> {
        handlers_covering(&self.exception_edges, block_id)
    }
}
