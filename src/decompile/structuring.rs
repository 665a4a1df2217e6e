use std::collections::{BTreeMap, BTreeSet};

use crate::constant_info::ConstantPool;
use crate::error::MethodError;

use super::cfg::{dominators, post_dominators, DominatorTree, EXIT};
use super::cfg_types::*;
use super::descriptor::JvmType;
use super::expr::*;
use super::stack_sim::{resolve_duplicates, SimulatedMethod};
use super::structured_types::*;
use super::util::Budget;
use super::webs::split_webs;

const THROWABLE: &str = "java/lang/Throwable";

/// Convert the simulated blocks of one method into a structured body.
///
/// Runs the expression-level merges (short-circuit conditions, ternaries,
/// straight-line blocks) to a fixpoint, resolves `dup` bindings, then rebuilds
/// loops, conditionals, switches and exception regions from the dominator trees.
pub fn structure_method(
    cfg: &ControlFlowGraph,
    simulated: SimulatedMethod,
    pool: &ConstantPool,
    max_locals: u16,
    budget: &mut Budget,
) -> Result<StructuredBody, MethodError> {
    let SimulatedMethod { blocks, arena } = simulated;
    let mut graph = MethodGraph::new(blocks, cfg.exception_edges.clone(), cfg.entry);
    if graph.blocks.is_empty() {
        return Ok(StructuredBody::default());
    }
    graph.simplify(budget)?;
    resolve_duplicates(&mut graph.blocks, &arena, max_locals)?;
    graph.normalize_ranges();
    split_webs(&mut graph.blocks, &graph.exception_edges, graph.entry);

    let mut structurer = Structurer::new(&graph, pool, budget)?;
    let (mut statements, _) = structurer.emit_range(Some(graph.entry), &Scope::default(), false)?;
    structurer.check_complete()?;
    tracing::trace!(
        blocks = graph.blocks.len(),
        loops = structurer.loops.len(),
        "structured method"
    );

    walk_bodies_mut(&mut statements, &mut recover_synchronized);
    if matches!(statements.last().and_then(StructuredStmt::as_stmt), Some(Stmt::Return(None))) {
        statements.pop();
    }
    Ok(StructuredBody::new(statements))
}

// ============================================================================
// Block graph after simulation
// ============================================================================

/// Simulated blocks of one method, rewritten in place by the expression-level merges.
#[derive(Clone, Debug)]
pub struct MethodGraph {
    pub blocks: BTreeMap<BlockId, SimulatedBlock>,
    pub exception_edges: Vec<ExceptionEdge>,
    pub entry: BlockId,
}

impl FlowGraph for MethodGraph {
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

impl MethodGraph {
    pub fn new(
        blocks: BTreeMap<BlockId, SimulatedBlock>,
        exception_edges: Vec<ExceptionEdge>,
        entry: BlockId,
    ) -> Self {
        let mut graph = MethodGraph { blocks, exception_edges, entry };
        graph.normalize_ranges();
        graph
    }

    /// Start every protected range at its first live block and drop ranges
    /// that protect nothing reachable.
    pub fn normalize_ranges(&mut self) {
        let blocks = &self.blocks;
        self.exception_edges.retain_mut(|edge| {
            if !blocks.contains_key(&edge.handler_block) || edge.start_pc >= edge.end_pc {
                return false;
            }
            match blocks.range(edge.start_pc..edge.end_pc).next() {
                Some((&first, _)) => {
                    edge.start_pc = first;
                    true
                }
                None => false,
            }
        });
    }

    /// Indices of the protected ranges covering a block.
    fn coverage(&self, block: BlockId) -> Vec<usize> {
        self.exception_edges
            .iter()
            .enumerate()
            .filter(|(_, e)| e.covers(block))
            .map(|(i, _)| i)
            .collect()
    }

    fn is_handler(&self, block: BlockId) -> bool {
        self.exception_edges.iter().any(|e| e.handler_block == block)
    }

    /// Whether `b` can be folded into its only predecessor `a`.
    fn absorbable(&self, a: BlockId, b: BlockId, preds: &BTreeMap<BlockId, Vec<BlockId>>) -> bool {
        a != b
            && b != self.entry
            && preds.get(&b).map_or(false, |p| p.as_slice() == [a])
            && !self.is_handler(b)
            && self.coverage(a) == self.coverage(b)
    }

    /// Apply the expression-level merges until none fires, then reject any join
    /// that still needs a value from more than one predecessor.
    pub fn simplify(&mut self, budget: &mut Budget) -> Result<(), MethodError> {
        loop {
            budget.step(self.entry)?;
            if self.merge_short_circuit() || self.collapse_ternary() || self.merge_straight_line() {
                continue;
            }
            break;
        }
        self.check_stack_slots()
    }

    /// `if (a) goto X; if (b) goto X;` and its three siblings become one branch
    /// on `a || b`, `a || !b`, `a && b` or `a && !b`.
    fn merge_short_circuit(&mut self) -> bool {
        let preds = self.predecessor_map();
        let mut plan = None;
        'search: for (&a, block) in &self.blocks {
            let Terminator::ConditionalBranch { if_true: at, if_false: af, .. } = block.terminator else {
                continue;
            };
            if at == af || block.branch_condition.is_none() {
                continue;
            }
            for (b, b_is_false_arm) in [(af, true), (at, false)] {
                if !self.absorbable(a, b, &preds) {
                    continue;
                }
                let Some(inner) = self.blocks.get(&b) else { continue };
                let Terminator::ConditionalBranch { if_true: bt, if_false: bf, .. } = inner.terminator else {
                    continue;
                };
                if !inner.statements.is_empty()
                    || inner.branch_condition.is_none()
                    || inner.exit_stack != block.exit_stack
                    || bt == bf
                    || bt == b
                    || bf == b
                {
                    continue;
                }
                // (and, negate inner, if_true, if_false)
                let shape = if b_is_false_arm {
                    if bt == at {
                        Some((false, false, at, bf))
                    } else if bf == at {
                        Some((false, true, at, bt))
                    } else {
                        None
                    }
                } else if bf == af {
                    Some((true, false, bt, af))
                } else if bt == af {
                    Some((true, true, bf, af))
                } else {
                    None
                };
                if let Some(shape) = shape {
                    plan = Some((a, b, shape));
                    break 'search;
                }
            }
        }
        let Some((a, b, (and, negate_inner, if_true, if_false))) = plan else { return false };
        let Some(inner) = self.blocks.remove(&b) else { return false };
        let Some(outer) = self.blocks.get_mut(&a) else { return false };
        let (Some(left), Some(right)) = (outer.branch_condition.take(), inner.branch_condition) else {
            return false;
        };
        let right = if negate_inner { right.negate() } else { right };
        outer.branch_condition = Some(Expr::Logical { and, left: Box::new(left), right: Box::new(right) });
        if let Terminator::ConditionalBranch { if_true: t, if_false: f, .. } = &mut outer.terminator {
            *t = if_true;
            *f = if_false;
        }
        outer.branch_loc.end = inner.branch_loc.end;
        true
    }

    /// Two single-value arms meeting at a join become one `c ? x : y` value on
    /// the branching block's stack.
    fn collapse_ternary(&mut self) -> bool {
        let preds = self.predecessor_map();
        let mut plan = None;
        for (&a, block) in &self.blocks {
            let Terminator::ConditionalBranch { if_true: t, if_false: f, .. } = block.terminator else {
                continue;
            };
            if t == f || t == a || f == a || block.branch_condition.is_none() {
                continue;
            }
            let depth = block.exit_stack.len();
            let arm = |id: BlockId| -> Option<(BlockId, &Expr)> {
                if !self.absorbable(a, id, &preds) {
                    return None;
                }
                let sim = self.blocks.get(&id)?;
                let join = match sim.terminator {
                    Terminator::FallThrough { target } | Terminator::Goto { target } => target,
                    _ => return None,
                };
                if !sim.statements.is_empty()
                    || sim.exit_stack.len() != depth + 1
                    || sim.exit_stack[..depth] != block.exit_stack[..]
                {
                    return None;
                }
                Some((join, &sim.exit_stack[depth]))
            };
            let (Some((jt, vt)), Some((jf, vf))) = (arm(t), arm(f)) else { continue };
            if jt != jf || jt == a || jt == t || jt == f {
                continue;
            }
            plan = Some((a, t, f, jt, vt.clone(), vf.clone()));
            break;
        }
        let Some((a, t, f, join, then_value, else_value)) = plan else { return false };
        self.blocks.remove(&t);
        self.blocks.remove(&f);
        let Some(block) = self.blocks.get_mut(&a) else { return false };
        let Some(condition) = block.branch_condition.take() else { return false };
        block.exit_stack.push(Expr::Ternary {
            condition: Box::new(condition),
            then_expr: Box::new(then_value),
            else_expr: Box::new(else_value),
        });
        block.terminator = Terminator::Goto { target: join };
        let incoming = block.exit_stack.clone();

        let preds = self.predecessor_map();
        if preds.get(&join).map_or(false, |p| p.as_slice() == [a]) {
            for (index, value) in incoming.iter().enumerate() {
                self.substitute_slot(join, index, value);
            }
            if let Some(j) = self.blocks.get_mut(&join) {
                j.entry_stack = incoming;
            }
        }
        true
    }

    /// Replace every `StackSlot { block, index }` placeholder with `value`.
    fn substitute_slot(&mut self, block: BlockId, index: usize, value: &Expr) {
        let mut replace = |e: &mut Expr| {
            if matches!(e, Expr::StackSlot { block: b, index: i, .. } if *b == block && *i == index) {
                *e = value.clone();
            }
        };
        for sim in self.blocks.values_mut() {
            for s in &mut sim.statements {
                s.stmt.for_each_expr_mut(&mut |e| e.transform(&mut replace));
            }
            for e in sim
                .branch_condition
                .iter_mut()
                .chain(sim.switch_value.iter_mut())
                .chain(sim.exit_stack.iter_mut())
                .chain(sim.entry_stack.iter_mut())
            {
                e.transform(&mut replace);
            }
        }
    }

    /// A block reached only by falling out of its predecessor joins it.
    fn merge_straight_line(&mut self) -> bool {
        let preds = self.predecessor_map();
        let plan = self.blocks.iter().find_map(|(&a, block)| match block.terminator {
            Terminator::FallThrough { target } | Terminator::Goto { target }
                if self.blocks.contains_key(&target) && self.absorbable(a, target, &preds) =>
            {
                Some((a, target))
            }
            _ => None,
        });
        let Some((a, b)) = plan else { return false };
        let Some(next) = self.blocks.remove(&b) else { return false };
        let Some(block) = self.blocks.get_mut(&a) else { return false };
        block.statements.extend(next.statements);
        block.exit_stack = next.exit_stack;
        block.terminator = next.terminator;
        block.branch_condition = next.branch_condition;
        block.switch_value = next.switch_value;
        block.branch_loc = next.branch_loc;
        true
    }

    fn check_stack_slots(&self) -> Result<(), MethodError> {
        for sim in self.blocks.values() {
            let mut found = None;
            let mut check = |e: &Expr| {
                e.visit(&mut |inner| {
                    if let Expr::StackSlot { block, .. } = inner {
                        found.get_or_insert(*block);
                    }
                })
            };
            for s in &sim.statements {
                s.stmt.for_each_expr(&mut check);
            }
            sim.branch_condition.iter().chain(sim.switch_value.iter()).for_each(&mut check);
            if let Some(offset) = found {
                return Err(MethodError::UnsupportedStackMerge { offset });
            }
        }
        Ok(())
    }
}

// ============================================================================
// Structurer
// ============================================================================

struct NaturalLoop {
    body: BTreeSet<BlockId>,
    latches: Vec<BlockId>,
}

/// An enclosing statement that `break` or `continue` can target.
struct Frame {
    /// Loop header; `None` for a switch.
    header: Option<BlockId>,
    continue_target: Option<BlockId>,
    body: BTreeSet<BlockId>,
    follow: Option<BlockId>,
    label: Option<String>,
}

impl Frame {
    fn looping(header: BlockId, continue_target: BlockId, body: BTreeSet<BlockId>, follow: Option<BlockId>) -> Self {
        Frame { header: Some(header), continue_target: Some(continue_target), body, follow, label: None }
    }

    fn switch(follow: Option<BlockId>) -> Self {
        Frame { header: None, continue_target: None, body: BTreeSet::new(), follow, label: None }
    }

    fn wrap(self, stmt: StructuredStmt) -> StructuredStmt {
        match self.label {
            Some(label) => StructuredStmt::Labeled { label, body: Box::new(stmt) },
            None => stmt,
        }
    }
}

/// Where a statement sequence must stop.
#[derive(Clone, Debug, Default)]
struct Scope {
    stops: BTreeSet<BlockId>,
    /// Protected range `[start, end)` of the innermost try body being emitted.
    region: Option<(u32, u32)>,
}

impl Scope {
    fn with_stops(&self, extra: impl IntoIterator<Item = BlockId>) -> Scope {
        let mut scope = self.clone();
        scope.stops.extend(extra);
        scope
    }

    fn in_region(&self, block: BlockId) -> bool {
        self.region.map_or(true, |(start, end)| block >= start && block < end)
    }
}

/// Exception ranges that open a try statement at one block.
struct TryGroup {
    end: u32,
    members: Vec<usize>,
    /// Handler blocks in table order with their catch types (`None` catches anything).
    handlers: Vec<(BlockId, Vec<Option<String>>)>,
}

struct Structurer<'g, 'b> {
    graph: &'g MethodGraph,
    pool: &'g ConstantPool,
    preds: BTreeMap<BlockId, Vec<BlockId>>,
    doms: DominatorTree,
    pdoms: DominatorTree,
    loops: BTreeMap<BlockId, NaturalLoop>,
    emitted: BTreeSet<BlockId>,
    /// Blocks emitted inside an inlined subroutine.
    inlined: BTreeSet<BlockId>,
    /// Empty jump blocks bypassed when choosing where a statement continues.
    trampolines: BTreeSet<BlockId>,
    consumed: BTreeSet<usize>,
    /// Leading statements of a block already accounted for elsewhere.
    skip: BTreeMap<BlockId, usize>,
    frames: Vec<Frame>,
    labels: u32,
    budget: &'b mut Budget,
}

impl<'g, 'b> Structurer<'g, 'b> {
    fn new(graph: &'g MethodGraph, pool: &'g ConstantPool, budget: &'b mut Budget) -> Result<Self, MethodError> {
        let doms = dominators(graph);
        let pdoms = post_dominators(graph);
        let loops = find_loops(graph, &doms)?;
        Ok(Structurer {
            graph,
            pool,
            preds: graph.predecessor_map(),
            doms,
            pdoms,
            loops,
            emitted: BTreeSet::new(),
            inlined: BTreeSet::new(),
            trampolines: BTreeSet::new(),
            consumed: BTreeSet::new(),
            skip: BTreeMap::new(),
            frames: Vec::new(),
            labels: 0,
            budget,
        })
    }

    fn block(&self, id: BlockId) -> Result<&'g SimulatedBlock, MethodError> {
        let graph = self.graph;
        graph.blocks.get(&id).ok_or_else(|| MethodError::InvalidBytecode {
            offset: id,
            message: "branch into the middle of an instruction".into(),
        })
    }

    /// Statements of a block still to be emitted, without subroutine bookkeeping.
    fn remaining(&self, id: BlockId) -> Vec<LocatedStmt> {
        let skip = self.skip.get(&id).copied().unwrap_or(0);
        self.graph
            .blocks
            .get(&id)
            .map(|b| {
                b.statements
                    .iter()
                    .skip(skip)
                    .filter(|s| !is_subroutine_plumbing(&s.stmt))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn block_statements(&self, id: BlockId) -> Vec<StructuredStmt> {
        self.remaining(id).into_iter().map(StructuredStmt::Simple).collect()
    }

    fn check_complete(&self) -> Result<(), MethodError> {
        match self
            .graph
            .blocks
            .keys()
            .find(|b| !self.emitted.contains(b) && !self.inlined.contains(b))
        {
            Some(&missing) => Err(MethodError::IrreducibleFlow { offset: missing }),
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Sequences
    // ------------------------------------------------------------------

    /// Emit blocks starting at `start` until the flow leaves the scope.
    ///
    /// Returns the statements and the block where a stop or the region edge was
    /// hit. With `entered` the first block is emitted without those checks.
    fn emit_range(
        &mut self,
        start: Option<BlockId>,
        scope: &Scope,
        entered: bool,
    ) -> Result<(Vec<StructuredStmt>, Option<BlockId>), MethodError> {
        let mut out = Vec::new();
        let mut cur = start;
        let mut first = entered;
        while let Some(b) = cur {
            if !std::mem::take(&mut first) {
                if scope.stops.contains(&b) {
                    return Ok((out, Some(b)));
                }
                if let Some(jump) = self.jump_to(b) {
                    out.push(jump);
                    return Ok((out, None));
                }
                if !scope.in_region(b) {
                    return Ok((out, Some(b)));
                }
            }
            cur = self.emit_node(b, scope, &mut out)?;
        }
        Ok((out, None))
    }

    fn emit_node(
        &mut self,
        b: BlockId,
        scope: &Scope,
        out: &mut Vec<StructuredStmt>,
    ) -> Result<Option<BlockId>, MethodError> {
        self.budget.step(b)?;
        if self.emitted.contains(&b) {
            return self.emit_copy(b, out);
        }
        let try_group = self.try_group(b);
        let active = self.frames.iter().any(|f| f.header == Some(b));
        if let Some(lp) = self.loops.get(&b).filter(|_| !active) {
            let try_encloses_loop = try_group
                .as_ref()
                .map_or(false, |g| lp.body.iter().all(|&x| x >= b && x < g.end));
            if !try_encloses_loop {
                return self.emit_loop(b, scope, out);
            }
        }
        if let Some(group) = try_group {
            return self.emit_try(b, group, scope, out);
        }
        self.emit_block(b, scope, out)
    }

    /// A block reached a second time: small exits are duplicated, anything else
    /// has no structured form.
    fn emit_copy(&mut self, b: BlockId, out: &mut Vec<StructuredStmt>) -> Result<Option<BlockId>, MethodError> {
        let block = self.block(b)?;
        let small_exit = matches!(block.terminator, Terminator::Return | Terminator::Throw)
            && block.statements.len() <= 3
            && !self.loops.contains_key(&b);
        if !small_exit {
            return Err(MethodError::IrreducibleFlow { offset: b });
        }
        out.extend(self.block_statements(b));
        Ok(None)
    }

    fn emit_block(
        &mut self,
        b: BlockId,
        scope: &Scope,
        out: &mut Vec<StructuredStmt>,
    ) -> Result<Option<BlockId>, MethodError> {
        self.emitted.insert(b);
        let block = self.block(b)?;
        out.extend(self.block_statements(b));
        match &block.terminator {
            Terminator::FallThrough { target } | Terminator::Goto { target } => Ok(Some(*target)),
            Terminator::Return | Terminator::Throw | Terminator::Ret => Ok(None),
            Terminator::Jsr { target, return_addr } => {
                let body = self.inline_subroutine(*target)?;
                out.extend(body);
                Ok(Some(*return_addr))
            }
            Terminator::ConditionalBranch { if_true, if_false, .. } => {
                self.emit_if(block, *if_true, *if_false, scope, out)
            }
            Terminator::TableSwitch { .. } | Terminator::LookupSwitch { .. } => {
                self.emit_switch(block, scope, out)
            }
        }
    }

    /// Emit the subroutine body in place; each `jsr` site gets its own copy.
    fn inline_subroutine(&mut self, target: BlockId) -> Result<Vec<StructuredStmt>, MethodError> {
        let saved = self.emitted.clone();
        let (body, _) = self.emit_range(Some(target), &Scope::default(), true)?;
        let fresh: Vec<BlockId> = self.emitted.difference(&saved).copied().collect();
        self.inlined.extend(fresh);
        self.emitted = saved;
        Ok(body)
    }

    // ------------------------------------------------------------------
    // break / continue
    // ------------------------------------------------------------------

    fn jump_to(&mut self, b: BlockId) -> Option<StructuredStmt> {
        let innermost_loop = self.frames.iter().rposition(|f| f.continue_target.is_some());
        let innermost = self.frames.len().checked_sub(1);
        for i in (0..self.frames.len()).rev() {
            let is_continue = self.frames[i].continue_target == Some(b);
            let is_break = self.frames[i].follow == Some(b);
            if !is_continue && !is_break {
                continue;
            }
            let plain = if is_continue { Some(i) == innermost_loop } else { Some(i) == innermost };
            let label = if plain { None } else { Some(self.label_for(i)) };
            return Some(if is_continue {
                StructuredStmt::Continue { label }
            } else {
                StructuredStmt::Break { label }
            });
        }
        None
    }

    fn label_for(&mut self, frame: usize) -> String {
        if let Some(label) = &self.frames[frame].label {
            return label.clone();
        }
        self.labels += 1;
        let label = format!("label{}", self.labels);
        self.frames[frame].label = Some(label.clone());
        label
    }

    fn is_jump_target(&self, b: BlockId) -> bool {
        self.frames
            .iter()
            .any(|f| f.continue_target == Some(b) || f.follow == Some(b))
    }

    // ------------------------------------------------------------------
    // if / switch
    // ------------------------------------------------------------------

    /// Where the arms of a branch at `b` meet again, limited to the innermost loop.
    fn join_of(&self, b: BlockId) -> Option<BlockId> {
        let join = self.pdoms.idom(b).filter(|&j| j != EXIT)?;
        if let Some(frame) = self.frames.iter().rev().find(|f| f.continue_target.is_some()) {
            let inside = frame.body.contains(&join)
                || frame.continue_target == Some(join)
                || frame.follow == Some(join);
            if !inside {
                return None;
            }
        }
        Some(join)
    }

    fn emit_if(
        &mut self,
        block: &SimulatedBlock,
        if_true: BlockId,
        if_false: BlockId,
        scope: &Scope,
        out: &mut Vec<StructuredStmt>,
    ) -> Result<Option<BlockId>, MethodError> {
        let condition = block.branch_condition.clone().ok_or_else(|| MethodError::InvalidBytecode {
            offset: block.branch_loc.end,
            message: "conditional branch without a condition".into(),
        })?;
        if if_true == if_false {
            if condition.has_side_effects() {
                out.push(StructuredStmt::simple(block.branch_loc, Stmt::ExprStmt(condition)));
            }
            return Ok(Some(if_true));
        }
        let join = self.join_of(block.id);
        let arm_scope = scope.with_stops(join);
        let then_body = if Some(if_false) == join {
            Vec::new()
        } else {
            self.emit_range(Some(if_false), &arm_scope, false)?.0
        };
        let else_body = if Some(if_true) == join {
            Vec::new()
        } else {
            self.emit_range(Some(if_true), &arm_scope, false)?.0
        };
        push_if(out, condition.negate(), then_body, else_body, block.branch_loc, join.is_none());
        Ok(join)
    }

    fn emit_switch(
        &mut self,
        block: &SimulatedBlock,
        scope: &Scope,
        out: &mut Vec<StructuredStmt>,
    ) -> Result<Option<BlockId>, MethodError> {
        let (pairs, default) = block.terminator.switch_cases().unwrap_or_default();
        let value = block.switch_value.clone().ok_or_else(|| MethodError::InvalidBytecode {
            offset: block.branch_loc.end,
            message: "switch without a scrutinee".into(),
        })?;
        let follow = self.join_of(block.id);

        // Keys sharing the default target (tableswitch gaps) add nothing.
        let mut keys: BTreeMap<BlockId, Vec<i32>> = BTreeMap::new();
        for (key, target) in pairs.into_iter().filter(|&(_, t)| t != default) {
            keys.entry(target).or_default().push(key);
        }
        if Some(default) != follow {
            keys.entry(default).or_default();
        }
        let targets: Vec<BlockId> = keys.keys().copied().collect();

        self.frames.push(Frame::switch(follow));
        let mut cases = Vec::new();
        for (&target, values) in &keys {
            let others = targets.iter().copied().filter(|&t| t != target);
            let case_scope = Scope { stops: others.collect(), region: scope.region };
            let body = if Some(target) == follow {
                vec![StructuredStmt::Break { label: None }]
            } else {
                self.emit_range(Some(target), &case_scope, false)?.0
            };
            cases.push(SwitchCase {
                values: values.iter().map(|&v| SwitchValue::Int(v)).collect(),
                is_default: target == default,
                body,
            });
        }
        let frame = self.frames.pop().unwrap_or_else(|| Frame::switch(follow));

        if let Some(last) = cases.last_mut() {
            if matches!(last.body.last(), Some(StructuredStmt::Break { label: None })) {
                last.body.pop();
            }
        }
        out.push(frame.wrap(StructuredStmt::Switch { expr: value, loc: block.branch_loc, cases }));
        Ok(follow)
    }

    // ------------------------------------------------------------------
    // Loops
    // ------------------------------------------------------------------

    fn emit_loop(
        &mut self,
        h: BlockId,
        scope: &Scope,
        out: &mut Vec<StructuredStmt>,
    ) -> Result<Option<BlockId>, MethodError> {
        let (body, latches) = match self.loops.get(&h) {
            Some(lp) => (lp.body.clone(), lp.latches.clone()),
            None => return self.emit_block(h, scope, out),
        };
        let header = self.block(h)?;
        let inner = Scope { stops: BTreeSet::new(), region: scope.region };

        if let Some((condition, entry, follow)) = self.pure_condition(h, &body) {
            let update = self.update_latch(h, &latches);
            self.emitted.insert(h);
            self.frames.push(Frame::looping(h, update.unwrap_or(h), body, Some(follow)));
            let (mut stmts, _) = self.emit_range(Some(entry), &inner.with_stops(update), false)?;
            strip_trailing_continue(&mut stmts);
            let stmt = match update {
                Some(u) => {
                    self.emitted.insert(u);
                    StructuredStmt::For {
                        init: Vec::new(),
                        condition: Some(condition),
                        loc: header.branch_loc,
                        update: self.remaining(u),
                        body: stmts,
                    }
                }
                None => StructuredStmt::While { condition, loc: header.branch_loc, body: stmts },
            };
            self.push_loop(out, stmt);
            return Ok(Some(follow));
        }

        if let [latch] = latches[..] {
            if let Some((condition, follow)) = self.latch_condition(h, latch, &body) {
                let loc = self.block(latch)?.branch_loc;
                self.frames.push(Frame::looping(h, latch, body, Some(follow)));
                let mut stmts = if latch == h {
                    self.emitted.insert(h);
                    self.block_statements(h)
                } else {
                    let (mut stmts, _) = self.emit_range(Some(h), &inner.with_stops([latch]), true)?;
                    self.emitted.insert(latch);
                    stmts.extend(self.block_statements(latch));
                    stmts
                };
                strip_trailing_continue(&mut stmts);
                self.push_loop(out, StructuredStmt::DoWhile { body: stmts, condition, loc });
                return Ok(Some(follow));
            }
        }

        let follow = self.loop_follow(&body);
        self.frames.push(Frame::looping(h, h, body, follow));
        let (mut stmts, _) = self.emit_range(Some(h), &inner, true)?;
        strip_trailing_continue(&mut stmts);
        let stmt = StructuredStmt::While {
            condition: Expr::boolean(true),
            loc: Location::at(h),
            body: stmts,
        };
        self.push_loop(out, stmt);
        Ok(follow)
    }

    fn push_loop(&mut self, out: &mut Vec<StructuredStmt>, stmt: StructuredStmt) {
        match self.frames.pop() {
            Some(frame) => out.push(frame.wrap(stmt)),
            None => out.push(stmt),
        }
    }

    /// Header that only tests the condition: `(condition to stay, body entry, exit)`.
    fn pure_condition(&self, h: BlockId, body: &BTreeSet<BlockId>) -> Option<(Expr, BlockId, BlockId)> {
        let block = self.graph.blocks.get(&h)?;
        if !self.remaining(h).is_empty() {
            return None;
        }
        let Terminator::ConditionalBranch { if_true, if_false, .. } = block.terminator else {
            return None;
        };
        let condition = block.branch_condition.clone()?;
        match (body.contains(&if_true), body.contains(&if_false)) {
            (true, false) => Some((condition, if_true, if_false)),
            (false, true) => Some((condition.negate(), if_false, if_true)),
            _ => None,
        }
    }

    /// A latch made only of updates and reached from several places becomes the
    /// `for` update clause so `continue` can target it.
    fn update_latch(&self, h: BlockId, latches: &[BlockId]) -> Option<BlockId> {
        let [u] = latches[..] else { return None };
        if u == h || self.preds.get(&u).map_or(0, Vec::len) < 2 {
            return None;
        }
        let block = self.graph.blocks.get(&u)?;
        if !matches!(block.terminator, Terminator::Goto { target } | Terminator::FallThrough { target } if target == h) {
            return None;
        }
        let stmts = self.remaining(u);
        let updates_only = !stmts.is_empty()
            && stmts.iter().all(|s| match &s.stmt {
                Stmt::Iinc { .. } | Stmt::LocalStore { .. } => true,
                Stmt::ExprStmt(e) => matches!(e, Expr::IncDec { .. } | Expr::Assign { .. }),
                _ => false,
            });
        updates_only.then_some(u)
    }

    /// Conditional back edge of a do-while: `(condition to loop again, exit)`.
    fn latch_condition(&self, h: BlockId, latch: BlockId, body: &BTreeSet<BlockId>) -> Option<(Expr, BlockId)> {
        let block = self.graph.blocks.get(&latch)?;
        let Terminator::ConditionalBranch { if_true, if_false, .. } = block.terminator else {
            return None;
        };
        let condition = block.branch_condition.clone()?;
        if if_true == h && !body.contains(&if_false) {
            Some((condition, if_false))
        } else if if_false == h && !body.contains(&if_true) {
            Some((condition.negate(), if_true))
        } else {
            None
        }
    }

    /// Exit of an unconditional loop: the non-returning exit that post-dominates
    /// the others, else the last one.
    fn loop_follow(&self, body: &BTreeSet<BlockId>) -> Option<BlockId> {
        let mut exits: Vec<BlockId> = Vec::new();
        for &b in body {
            for s in self.graph.successors(b) {
                if !body.contains(&s) && !exits.contains(&s) {
                    exits.push(s);
                }
            }
        }
        exits.retain(|e| {
            self.graph
                .blocks
                .get(e)
                .map_or(false, |b| !matches!(b.terminator, Terminator::Return | Terminator::Throw))
        });
        exits
            .iter()
            .copied()
            .find(|&c| exits.iter().all(|&o| self.pdoms.dominates(c, o)))
            .or_else(|| exits.iter().copied().max())
    }

    // ------------------------------------------------------------------
    // try / catch / finally
    // ------------------------------------------------------------------

    /// The outermost unconsumed protected region starting at `b`, with every
    /// later segment of the same handlers up to the first handler.
    fn try_group(&self, b: BlockId) -> Option<TryGroup> {
        let edges = &self.graph.exception_edges;
        let live = |i: &usize| !self.consumed.contains(i);
        let starting: Vec<usize> = (0..edges.len())
            .filter(|i| live(i) && edges[*i].start_pc == b)
            .collect();
        if starting.is_empty() {
            return None;
        }
        let limit = starting
            .iter()
            .map(|&i| edges[i].handler_block)
            .filter(|&h| h > b)
            .min()
            .unwrap_or(u32::MAX);
        let hull = |i: usize| -> u32 {
            let key = (edges[i].handler_block, edges[i].catch_type);
            (0..edges.len())
                .filter(|j| live(j))
                .map(|j| &edges[j])
                .filter(|e| (e.handler_block, e.catch_type) == key && e.start_pc >= b && e.end_pc <= limit)
                .map(|e| e.end_pc)
                .fold(edges[i].end_pc, u32::max)
        };
        let end = starting.iter().map(|&i| hull(i)).max()?;
        let keys: BTreeSet<(BlockId, u16)> = starting
            .iter()
            .filter(|&&i| hull(i) == end)
            .map(|&i| (edges[i].handler_block, edges[i].catch_type))
            .collect();
        let members: Vec<usize> = (0..edges.len())
            .filter(|i| live(i))
            .filter(|&i| {
                let e = &edges[i];
                keys.contains(&(e.handler_block, e.catch_type)) && e.start_pc >= b && e.end_pc <= end
            })
            .collect();

        let mut handlers: Vec<(BlockId, Vec<Option<String>>)> = Vec::new();
        for &i in &members {
            let e = &edges[i];
            let ty = match e.catch_type {
                0 => None,
                idx => Some(self.pool.class_name(idx).unwrap_or(THROWABLE).to_string()),
            };
            match handlers.iter_mut().find(|(h, _)| *h == e.handler_block) {
                Some((_, types)) => {
                    if !types.contains(&ty) {
                        types.push(ty);
                    }
                }
                None => handlers.push((e.handler_block, vec![ty])),
            }
        }
        Some(TryGroup { end, members, handlers })
    }

    /// `store t; F...; throw t` along a chain of single-predecessor blocks. A `jsr` in the
    /// chain contributes the subroutine's statements.
    fn finally_body(&self, h: BlockId) -> Option<(Vec<LocatedStmt>, Vec<BlockId>)> {
        let mut stmts: Vec<LocatedStmt> = Vec::new();
        let mut chain = vec![h];
        let mut cur = h;
        loop {
            let block = self.graph.blocks.get(&cur)?;
            stmts.extend(block.statements.iter().filter(|s| !is_subroutine_plumbing(&s.stmt)).cloned());
            match block.terminator {
                Terminator::Throw => break,
                Terminator::Jsr { target, return_addr }
                    if !chain.contains(&return_addr)
                        && self.preds.get(&return_addr).map_or(false, |p| p.as_slice() == [cur]) =>
                {
                    stmts.extend(self.subroutine_statements(target)?);
                    chain.push(return_addr);
                    cur = return_addr;
                }
                Terminator::FallThrough { target } | Terminator::Goto { target }
                    if target != h
                        && !chain.contains(&target)
                        && self.preds.get(&target).map_or(false, |p| p.as_slice() == [cur]) =>
                {
                    chain.push(target);
                    cur = target;
                }
                _ => return None,
            }
        }
        let (first, rest) = stmts.split_first()?;
        let (last, middle) = rest.split_last()?;
        let Stmt::LocalStore { var, value: Expr::CaughtException(_) } = &first.stmt else {
            return None;
        };
        match &last.stmt {
            Stmt::Throw(Expr::LocalLoad(v)) if v == var => {}
            _ => return None,
        }
        if middle.iter().any(|s| s.stmt.is_exit()) {
            return None;
        }
        Some((middle.to_vec(), chain))
    }

    /// Straight-line subroutine body from `target` to its `ret`.
    fn subroutine_statements(&self, target: BlockId) -> Option<Vec<LocatedStmt>> {
        let mut stmts = Vec::new();
        let mut seen = BTreeSet::new();
        let mut cur = target;
        while seen.insert(cur) {
            let block = self.graph.blocks.get(&cur)?;
            stmts.extend(block.statements.iter().filter(|s| !is_subroutine_plumbing(&s.stmt)).cloned());
            match block.terminator {
                Terminator::Ret => return Some(stmts),
                Terminator::FallThrough { target } | Terminator::Goto { target } => cur = target,
                _ => return None,
            }
        }
        None
    }

    fn catch_variable(&self, h: BlockId, types: &[String]) -> (LocalVar, usize) {
        let caught = match types {
            [single] => JvmType::Reference(single.clone()),
            _ => JvmType::Reference(THROWABLE.into()),
        };
        let first = self.graph.blocks.get(&h).and_then(|b| b.statements.first());
        match first.map(|s| &s.stmt) {
            Some(Stmt::LocalStore { var, value: Expr::CaughtException(_) }) => {
                let mut var = var.clone();
                if var.name.is_none() || var.ty == JvmType::object() {
                    var.ty = caught;
                }
                (var, 1)
            }
            _ => {
                let mut var = LocalVar::new(u16::MAX, caught);
                var.name = Some("ex".into());
                (var, 0)
            }
        }
    }

    /// Skip through blocks that do nothing but jump.
    fn resolve_trampoline(&mut self, mut b: BlockId) -> BlockId {
        let mut seen = BTreeSet::new();
        while seen.insert(b) {
            let Some(block) = self.graph.blocks.get(&b) else { break };
            let target = match block.terminator {
                Terminator::FallThrough { target } | Terminator::Goto { target } => target,
                _ => break,
            };
            if self.trampolines.contains(&b) {
                b = target;
                continue;
            }
            if !self.remaining(b).is_empty()
                || self.emitted.contains(&b)
                || self.loops.contains_key(&b)
                || self.is_jump_target(b)
                || self.try_group(b).is_some()
            {
                break;
            }
            self.emitted.insert(b);
            self.trampolines.insert(b);
            b = target;
        }
        b
    }

    /// Blocks where control leaves the try statement normally.
    fn try_exits(&self, start: BlockId, end: u32, handlers: &[BlockId]) -> BTreeSet<BlockId> {
        let mut exits = BTreeSet::new();
        for (&b, _) in self.graph.blocks.range(start..end) {
            for s in self.graph.successors(b) {
                if (s < start || s >= end) && !handlers.contains(&s) && !self.is_jump_target(s) {
                    exits.insert(s);
                }
            }
        }
        for &h in handlers {
            let mut cur = h;
            while let Some(next) = self.pdoms.idom(cur).filter(|&p| p != EXIT) {
                if !self.doms.dominates(h, next) {
                    if !self.is_jump_target(next) {
                        exits.insert(next);
                    }
                    break;
                }
                cur = next;
            }
        }
        exits
    }

    fn emit_try(
        &mut self,
        b: BlockId,
        group: TryGroup,
        scope: &Scope,
        out: &mut Vec<StructuredStmt>,
    ) -> Result<Option<BlockId>, MethodError> {
        self.consumed.extend(group.members.iter().copied());
        let mut finally = group
            .handlers
            .iter()
            .find(|(_, types)| types.iter().all(Option::is_none))
            .and_then(|(h, _)| self.finally_body(*h).map(|(body, chain)| (*h, body, chain)));
        if let Some((h, _, _)) = &finally {
            let h = *h;
            let all: Vec<usize> = (0..self.graph.exception_edges.len())
                .filter(|&i| self.graph.exception_edges[i].handler_block == h)
                .collect();
            self.consumed.extend(all);
        }

        let handler_blocks: Vec<BlockId> = group.handlers.iter().map(|(h, _)| *h).collect();
        let exits = self.try_exits(b, group.end, &handler_blocks);

        let body_scope = Scope { stops: scope.stops.clone(), region: Some((b, group.end)) };
        let (mut try_body, exit) = self.emit_range(Some(b), &body_scope, true)?;

        // Finally copies: before each jump out of the body, and on the normal exit
        // either as the body's tail or as the head of the block after it.
        let mut normal_exit_ok = true;
        if let Some((_, fin, _)) = &finally {
            if !fin.is_empty() {
                strip_finally(&mut try_body, fin, false);
                if let Some(x) = exit.filter(|x| !scope.stops.contains(x)) {
                    let head = self.remaining(x);
                    if head.len() >= fin.len() && head[..fin.len()] == fin[..] {
                        *self.skip.entry(x).or_insert(0) += fin.len();
                    } else if !strip_suffix(&mut try_body, fin) {
                        normal_exit_ok = false;
                    }
                }
            }
        }
        if !normal_exit_ok {
            tracing::debug!(offset = b, "finally copy not found on normal exit; keeping handler as catch");
            finally = None;
        }
        if let Some((_, _, chain)) = &finally {
            self.emitted.extend(chain.iter().copied());
        }

        let mut stops: BTreeSet<BlockId> = exits.clone();
        let resolved: Vec<BlockId> = exits.iter().map(|&x| self.resolve_trampoline(x)).collect();
        stops.extend(resolved);
        let mut follow = exit.map(|x| self.resolve_trampoline(x));

        let finally_handler = finally.as_ref().map(|(h, _, _)| *h);
        let mut catches = Vec::new();
        for (h, types) in &group.handlers {
            if Some(*h) == finally_handler {
                continue;
            }
            let names: Vec<String> = types
                .iter()
                .map(|t| t.clone().unwrap_or_else(|| THROWABLE.to_string()))
                .collect();
            let (var, skip) = self.catch_variable(*h, &names);
            self.skip.insert(*h, skip);
            let catch_scope = Scope { stops: scope.stops.union(&stops).copied().collect(), region: scope.region };
            let (mut body, catch_exit) = self.emit_range(Some(*h), &catch_scope, true)?;
            if skip == 0 {
                let caught = Expr::LocalLoad(var.clone());
                transform_exprs(&mut body, &mut |e| {
                    if matches!(e, Expr::CaughtException(_)) {
                        *e = caught.clone();
                    }
                });
            }
            if let Some((_, fin, _)) = &finally {
                strip_finally(&mut body, fin, true);
            }
            if follow.is_none() {
                follow = catch_exit.map(|x| self.resolve_trampoline(x));
            }
            catches.push(CatchClause { exception_types: names, var, body });
        }

        let finally_body = finally.map(|(_, fin, _)| fin.into_iter().map(StructuredStmt::Simple).collect());
        out.push(StructuredStmt::TryCatch { try_body, catches, finally_body });
        Ok(follow)
    }
}

// ============================================================================
// Loops and reducibility
// ============================================================================

/// Natural loops keyed by header. A retreating edge whose target does not
/// dominate its source makes the method irreducible.
fn find_loops(graph: &MethodGraph, doms: &DominatorTree) -> Result<BTreeMap<BlockId, NaturalLoop>, MethodError> {
    let mut on_stack: BTreeSet<BlockId> = BTreeSet::new();
    let mut visited: BTreeSet<BlockId> = BTreeSet::new();
    let mut back_edges: Vec<(BlockId, BlockId)> = Vec::new();
    let mut stack: Vec<(BlockId, Vec<BlockId>)> = Vec::new();
    if graph.contains(graph.entry) {
        visited.insert(graph.entry);
        on_stack.insert(graph.entry);
        stack.push((graph.entry, graph.all_successors(graph.entry)));
    }
    while let Some(top) = stack.last_mut() {
        let node = top.0;
        if top.1.is_empty() {
            on_stack.remove(&node);
            stack.pop();
            continue;
        }
        let next = top.1.remove(0);
        if on_stack.contains(&next) {
            if !doms.dominates(next, node) {
                let offset = graph.blocks.get(&node).map_or(node, |b| b.branch_loc.end);
                return Err(MethodError::IrreducibleFlow { offset });
            }
            back_edges.push((node, next));
        } else if graph.contains(next) && visited.insert(next) {
            on_stack.insert(next);
            stack.push((next, graph.all_successors(next)));
        }
    }

    let preds = graph.all_predecessor_map();
    let mut loops: BTreeMap<BlockId, NaturalLoop> = BTreeMap::new();
    for (latch, header) in back_edges {
        let lp = loops.entry(header).or_insert_with(|| NaturalLoop {
            body: BTreeSet::from([header]),
            latches: Vec::new(),
        });
        lp.latches.push(latch);
        let mut work = vec![latch];
        while let Some(x) = work.pop() {
            if lp.body.insert(x) {
                work.extend(preds.get(&x).into_iter().flatten().copied());
            }
        }
    }
    Ok(loops)
}

// ============================================================================
// Statement-list helpers
// ============================================================================

fn push_if(
    out: &mut Vec<StructuredStmt>,
    condition: Expr,
    then_body: Vec<StructuredStmt>,
    else_body: Vec<StructuredStmt>,
    loc: Location,
    no_join: bool,
) {
    match (then_body.is_empty(), else_body.is_empty()) {
        (true, true) => {
            if condition.has_side_effects() {
                out.push(StructuredStmt::If { condition, loc, then_body, else_body: None });
            }
        }
        (true, false) => out.push(StructuredStmt::If {
            condition: condition.negate(),
            loc,
            then_body: else_body,
            else_body: None,
        }),
        (false, true) => out.push(StructuredStmt::If { condition, loc, then_body, else_body: None }),
        (false, false) => {
            let then_jumps = ends_with_jump(&then_body);
            let else_jumps = ends_with_jump(&else_body);
            if no_join && else_jumps && (!then_jumps || else_body.len() <= then_body.len()) {
                out.push(StructuredStmt::If {
                    condition: condition.negate(),
                    loc,
                    then_body: else_body,
                    else_body: None,
                });
                out.extend(then_body);
            } else if no_join && then_jumps {
                out.push(StructuredStmt::If { condition, loc, then_body, else_body: None });
                out.extend(else_body);
            } else {
                out.push(StructuredStmt::If { condition, loc, then_body, else_body: Some(else_body) });
            }
        }
    }
}

/// `jsr`, `ret` and the store of the return address; inlining replaces them.
fn is_subroutine_plumbing(stmt: &Stmt) -> bool {
    matches!(stmt, Stmt::Jsr { .. } | Stmt::Ret { .. } | Stmt::LocalStore { value: Expr::ReturnAddress, .. })
}

fn strip_trailing_continue(body: &mut Vec<StructuredStmt>) {
    if matches!(body.last(), Some(StructuredStmt::Continue { label: None })) {
        body.pop();
    }
}

fn is_finally_copy(window: &[StructuredStmt], fin: &[LocatedStmt]) -> bool {
    window.len() == fin.len()
        && window
            .iter()
            .zip(fin)
            .all(|(s, f)| matches!(s, StructuredStmt::Simple(ls) if ls == f))
}

/// Remove the finally copies javac places before `return`, `break` and
/// `continue`, folding `tmp = v; F; return tmp` back to `return v`.
fn strip_finally(body: &mut Vec<StructuredStmt>, fin: &[LocatedStmt], at_tail: bool) {
    if fin.is_empty() {
        return;
    }
    walk_bodies_mut(body, &mut |list| {
        let mut i = 0;
        while i < list.len() {
            let leaves = match &list[i] {
                StructuredStmt::Simple(s) => matches!(s.stmt, Stmt::Return(_)),
                StructuredStmt::Break { .. } | StructuredStmt::Continue { .. } => true,
                _ => false,
            };
            if leaves && i >= fin.len() && is_finally_copy(&list[i - fin.len()..i], fin) {
                list.drain(i - fin.len()..i);
                i -= fin.len();
                fold_return_temp(list, i);
            }
            i += 1;
        }
    });
    if at_tail {
        strip_suffix(body, fin);
    }
}

fn fold_return_temp(list: &mut Vec<StructuredStmt>, at: usize) {
    if at == 0 {
        return;
    }
    let value = match (&list[at - 1], &list[at]) {
        (
            StructuredStmt::Simple(LocatedStmt { stmt: Stmt::LocalStore { var, value }, .. }),
            StructuredStmt::Simple(LocatedStmt { stmt: Stmt::Return(Some(Expr::LocalLoad(tmp))), .. }),
        ) if var == tmp => value.clone(),
        _ => return,
    };
    list.remove(at - 1);
    if let StructuredStmt::Simple(s) = &mut list[at - 1] {
        s.stmt = Stmt::Return(Some(value));
    }
}

fn strip_suffix(body: &mut Vec<StructuredStmt>, fin: &[LocatedStmt]) -> bool {
    if fin.is_empty() {
        return true;
    }
    if body.len() >= fin.len() && is_finally_copy(&body[body.len() - fin.len()..], fin) {
        body.truncate(body.len() - fin.len());
        return true;
    }
    false
}

/// Lock of the `monitorenter` at `i` guarding the try at `i + 1`, and whether the statement
/// before `i` stores the lock temporary.
///
/// javac copies the lock into a temporary `t` and releases `t`: `monitorenter (t = x)` when
/// the copy is folded into the enter, `t = x; monitorenter x` when `x` was cheap to reload.
fn synchronized_lock(list: &[StructuredStmt], i: usize) -> Option<(Expr, Location, bool)> {
    let StructuredStmt::Simple(LocatedStmt { stmt: Stmt::Monitor { enter: true, object: enter }, loc }) = &list[i] else {
        return None;
    };
    let StructuredStmt::TryCatch { try_body, catches, finally_body: Some(fin) } = list.get(i + 1)? else {
        return None;
    };
    if !catches.is_empty() {
        return None;
    }
    let [StructuredStmt::Simple(LocatedStmt { stmt: Stmt::Monitor { enter: false, object: exit }, .. })] = fin.as_slice()
    else {
        return None;
    };
    let reads = |var: &LocalVar| {
        let mut used = false;
        visit_exprs(try_body, &mut |e| used |= matches!(e, Expr::LocalLoad(v) if v == var));
        used
    };

    if let Expr::Assign { target, value } = enter {
        return match target.as_ref() {
            Expr::LocalLoad(t) if **target == *exit && !reads(t) => Some(((**value).clone(), *loc, false)),
            _ => None,
        };
    }
    let previous = i.checked_sub(1).and_then(|p| match &list[p] {
        StructuredStmt::Simple(LocatedStmt { stmt: Stmt::LocalStore { var, value }, .. }) => Some((var, value)),
        _ => None,
    });
    match previous {
        Some((t, value)) if *exit == Expr::LocalLoad(t.clone()) && (enter == exit || enter == value) && !reads(t) => {
            Some((value.clone(), *loc, true))
        }
        _ => (enter == exit).then(|| (enter.clone(), *loc, false)),
    }
}

/// `monitorenter x; try { ... } finally { monitorexit x; }` becomes `synchronized (x)`.
fn recover_synchronized(list: &mut Vec<StructuredStmt>) {
    let mut i = 0;
    while i + 1 < list.len() {
        let Some((object, loc, drop_store)) = synchronized_lock(list, i) else {
            i += 1;
            continue;
        };
        let StructuredStmt::TryCatch { try_body: body, .. } = list.remove(i + 1) else {
            i += 1;
            continue;
        };
        list[i] = StructuredStmt::Synchronized { object, loc, body };
        if drop_store {
            list.remove(i - 1);
        } else {
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute_info::{CodeAttribute, ExceptionEntry};
    use crate::decompile::cfg::build_cfg;
    use crate::decompile::stack_sim::{simulate_method, MethodContext};

    fn code(bytes: &[u8], exceptions: Vec<ExceptionEntry>) -> CodeAttribute {
        CodeAttribute {
            max_stack: 8,
            max_locals: 4,
            code_length: bytes.len() as u32,
            code: bytes.to_vec(),
            exception_table_length: exceptions.len() as u16,
            exception_table: exceptions,
            attributes_count: 0,
            attributes: vec![],
        }
    }

    fn structure_with(pool: &ConstantPool, attr: &CodeAttribute) -> Result<Vec<StructuredStmt>, MethodError> {
        let ctx = MethodContext {
            pool,
            code: attr,
            class_name: "Test",
            is_static: true,
            bootstrap_methods: &[],
        };
        let cfg = build_cfg(attr)?;
        let mut budget = Budget::unlimited();
        let simulated = simulate_method(&ctx, &cfg, &mut budget)?;
        structure_method(&cfg, simulated, pool, attr.max_locals, &mut budget).map(|b| b.statements)
    }

    fn structure(bytes: &[u8]) -> Result<Vec<StructuredStmt>, MethodError> {
        structure_with(&ConstantPool::default(), &code(bytes, vec![]))
    }

    fn int_local(i: u16) -> Expr {
        Expr::LocalLoad(LocalVar::new(i, JvmType::Int))
    }

    #[test]
    fn loop_entered_in_the_middle_is_irreducible() {
        // 0: iload_0; 1: ifeq 10; 4: iinc 0 1; 7: goto 10; 10: iinc 0 -1; 13: goto 4
        let bytes = [
            0x1a, 0x99, 0x00, 0x09, 0x84, 0x00, 0x01, 0xa7, 0x00, 0x03, 0x84, 0x00, 0xff, 0xa7, 0xff, 0xf7,
        ];
        assert_eq!(structure(&bytes), Err(MethodError::IrreducibleFlow { offset: 7 }));
    }

    #[test]
    fn value_arms_collapse_into_ternary() {
        // 0: iload_0; 1: ifeq 8; 4: iconst_1; 5: goto 9; 8: iconst_2; 9: ireturn
        let body = structure(&[0x1a, 0x99, 0x00, 0x07, 0x04, 0xa7, 0x00, 0x04, 0x05, 0xac]).unwrap();
        assert_eq!(body.len(), 1);
        match body[0].as_stmt() {
            Some(Stmt::Return(Some(Expr::Ternary { then_expr, else_expr, .. }))) => {
                assert_eq!(then_expr.int_value(), Some(2));
                assert_eq!(else_expr.int_value(), Some(1));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn top_tested_loop_becomes_while() {
        // 0: iload_0; 1: ifle 10; 4: iinc 0 -1; 7: goto 0; 10: return
        let body = structure(&[0x1a, 0x9e, 0x00, 0x09, 0x84, 0x00, 0xff, 0xa7, 0xff, 0xf9, 0xb1]).unwrap();
        assert_eq!(body.len(), 1);
        match &body[0] {
            StructuredStmt::While { condition, body, .. } => {
                assert_eq!(
                    *condition,
                    Expr::Compare { op: CompareOp::Gt, left: Box::new(int_local(0)), right: Box::new(Expr::int(0)) }
                );
                assert_eq!(body.len(), 1);
                assert!(matches!(body[0].as_stmt(), Some(Stmt::Iinc { amount: -1, .. })));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn bottom_tested_loop_becomes_do_while() {
        // 0: iinc 0 1; 3: iload_0; 4: bipush 10; 6: if_icmplt 0; 9: return
        let body = structure(&[0x84, 0x00, 0x01, 0x1a, 0x10, 0x0a, 0xa1, 0xff, 0xfa, 0xb1]).unwrap();
        match &body[..] {
            [StructuredStmt::DoWhile { body, condition: Expr::Compare { op: CompareOp::Lt, .. }, .. }] => {
                assert!(matches!(body[0].as_stmt(), Some(Stmt::Iinc { amount: 1, .. })));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn shared_false_target_merges_into_and() {
        // 0: iload_0; 1: ifeq 11; 4: iload_1; 5: ifeq 11; 8: iinc 2 1; 11: return
        let body = structure(&[0x1a, 0x99, 0x00, 0x0a, 0x1b, 0x99, 0x00, 0x06, 0x84, 0x02, 0x01, 0xb1]).unwrap();
        match &body[..] {
            [StructuredStmt::If { condition: Expr::Logical { and: true, left, right }, then_body, else_body: None, .. }] => {
                assert!(matches!(**left, Expr::Compare { op: CompareOp::Ne, .. }));
                assert!(matches!(**right, Expr::Compare { op: CompareOp::Ne, .. }));
                assert_eq!(then_body.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn typed_handler_becomes_catch_clause() {
        // 0: iinc 0 1; 3: goto 10; 6: astore_1; 7: iinc 0 2; 10: return
        let mut pool = ConstantPool::default();
        let class = pool.add_class("java/io/IOException").unwrap();
        let attr = code(
            &[0x84, 0x00, 0x01, 0xa7, 0x00, 0x07, 0x4c, 0x84, 0x00, 0x02, 0xb1],
            vec![ExceptionEntry { start_pc: 0, end_pc: 3, handler_pc: 6, catch_type: class }],
        );
        let body = structure_with(&pool, &attr).unwrap();
        match &body[..] {
            [StructuredStmt::TryCatch { try_body, catches, finally_body: None }] => {
                assert!(matches!(try_body[0].as_stmt(), Some(Stmt::Iinc { amount: 1, .. })));
                assert_eq!(catches.len(), 1);
                assert_eq!(catches[0].exception_types, vec!["java/io/IOException".to_string()]);
                assert_eq!(catches[0].var.index, 1);
                assert!(matches!(catches[0].body[0].as_stmt(), Some(Stmt::Iinc { amount: 2, .. })));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn switch_keeps_fallthrough_between_cases() {
        // 0: iload_0; 1: lookupswitch { 1 -> 28, 2 -> 31, default -> 37 }
        // 28: iinc 1 1; 31: iinc 1 2; 34: goto 40; 37: iinc 1 3; 40: return
        let bytes = [
            0x1a, 0xab, 0x00, 0x00, 0x00, 0x00, 0x00, 0x24, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x01,
            0x00, 0x00, 0x00, 0x1b, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x1e, 0x84, 0x01, 0x01, 0x84,
            0x01, 0x02, 0xa7, 0x00, 0x06, 0x84, 0x01, 0x03, 0xb1,
        ];
        let body = structure(&bytes).unwrap();
        let StructuredStmt::Switch { expr, cases, .. } = &body[0] else {
            panic!("unexpected {:?}", body);
        };
        assert_eq!(*expr, int_local(0));
        assert_eq!(cases.len(), 3);

        assert_eq!(cases[0].values, vec![SwitchValue::Int(1)]);
        assert_eq!(cases[0].body.len(), 1);
        assert!(matches!(cases[0].body[0].as_stmt(), Some(Stmt::Iinc { amount: 1, .. })));

        assert_eq!(cases[1].values, vec![SwitchValue::Int(2)]);
        assert!(matches!(cases[1].body[..], [_, StructuredStmt::Break { label: None }]));

        assert!(cases[2].is_default && cases[2].values.is_empty());
        assert!(matches!(cases[2].body[..], [StructuredStmt::Simple(_)]));
    }

    #[test]
    fn tableswitch_gaps_reaching_default_get_no_label() {
        // 0: iload_0; 1: tableswitch 1..3 { 1 -> 28, 2 -> 40, 3 -> 34, default -> 40 }
        // 28: iinc 1 1; 31: goto 43; 34: iinc 1 2; 37: goto 43; 40: iinc 1 3; 43: return
        let bytes = [
            0x1a, 0xaa, 0x00, 0x00, 0x00, 0x00, 0x00, 0x27, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x03,
            0x00, 0x00, 0x00, 0x1b, 0x00, 0x00, 0x00, 0x27, 0x00, 0x00, 0x00, 0x21, 0x84, 0x01, 0x01, 0xa7,
            0x00, 0x0c, 0x84, 0x01, 0x02, 0xa7, 0x00, 0x06, 0x84, 0x01, 0x03, 0xb1,
        ];
        let body = structure(&bytes).unwrap();
        let StructuredStmt::Switch { cases, .. } = &body[0] else {
            panic!("unexpected {:?}", body);
        };
        assert_eq!(cases.len(), 3);
        assert_eq!(cases[0].values, vec![SwitchValue::Int(1)]);
        assert_eq!(cases[1].values, vec![SwitchValue::Int(3)]);
        assert!(cases[2].is_default && cases[2].values.is_empty());
    }

    #[test]
    fn javac_monitor_pair_becomes_synchronized() {
        // 0: aload_0; 1: dup; 2: astore_1; 3: monitorenter; 4: iconst_0; 5: istore_3;
        // 6: aload_1; 7: monitorexit; 8: goto 16;
        // 11: astore_2; 12: aload_1; 13: monitorexit; 14: aload_2; 15: athrow; 16: return
        let attr = code(
            &[0x2a, 0x59, 0x4c, 0xc2, 0x03, 0x3e, 0x2b, 0xc3, 0xa7, 0x00, 0x08, 0x4d, 0x2b, 0xc3, 0x2c, 0xbf, 0xb1],
            vec![
                ExceptionEntry { start_pc: 4, end_pc: 8, handler_pc: 11, catch_type: 0 },
                ExceptionEntry { start_pc: 11, end_pc: 14, handler_pc: 11, catch_type: 0 },
            ],
        );
        let body = structure_with(&ConstantPool::default(), &attr).unwrap();
        match &body[0] {
            StructuredStmt::Synchronized { object: Expr::LocalLoad(lock), body, .. } => {
                assert_eq!(lock.index, 0);
                assert_eq!(body.len(), 1);
                assert!(matches!(body[0].as_stmt(), Some(Stmt::LocalStore { var, .. }) if var.index == 3));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(!body.iter().any(|s| matches!(s.as_stmt(), Some(Stmt::Monitor { .. }))));
    }

    #[test]
    fn inlined_finally_copy_is_removed() {
        // 0: iinc 0 1; 3: iinc 0 2; 6: goto 15; 9: astore_1; 10: iinc 0 2; 13: aload_1; 14: athrow; 15: return
        let attr = code(
            &[0x84, 0x00, 0x01, 0x84, 0x00, 0x02, 0xa7, 0x00, 0x09, 0x4c, 0x84, 0x00, 0x02, 0x2b, 0xbf, 0xb1],
            vec![ExceptionEntry { start_pc: 0, end_pc: 3, handler_pc: 9, catch_type: 0 }],
        );
        let body = structure_with(&ConstantPool::default(), &attr).unwrap();
        match &body[0] {
            StructuredStmt::TryCatch { try_body, catches, finally_body: Some(fin) } => {
                assert!(catches.is_empty());
                assert_eq!(try_body.len(), 1);
                assert!(matches!(try_body[0].as_stmt(), Some(Stmt::Iinc { amount: 1, .. })));
                assert_eq!(fin.len(), 1);
                assert!(matches!(fin[0].as_stmt(), Some(Stmt::Iinc { amount: 2, .. })));
            }
            other => panic!("unexpected {:?}", other),
        }
        // the normal-path copy of the finally body is not repeated after the try
        assert!(!body[1..].iter().any(|s| matches!(s.as_stmt(), Some(Stmt::Iinc { amount: 2, .. }))));
    }

    #[test]
    fn subroutine_called_from_handler_is_finally() {
        // 0: iinc 0 1; 3: jsr 15; 6: goto 21; 9: astore_1; 10: jsr 15; 13: aload_1; 14: athrow;
        // 15: astore_2; 16: iinc 0 2; 19: ret 2; 21: return
        let attr = code(
            &[
                0x84, 0x00, 0x01, 0xa8, 0x00, 0x0c, 0xa7, 0x00, 0x0f, 0x4c, 0xa8, 0x00, 0x05, 0x2b, 0xbf, 0x4d, 0x84,
                0x00, 0x02, 0xa9, 0x02, 0xb1,
            ],
            vec![ExceptionEntry { start_pc: 0, end_pc: 6, handler_pc: 9, catch_type: 0 }],
        );
        let body = structure_with(&ConstantPool::default(), &attr).unwrap();
        match &body[0] {
            StructuredStmt::TryCatch { try_body, catches, finally_body: Some(fin) } => {
                assert!(catches.is_empty());
                assert!(matches!(try_body[..], [StructuredStmt::Simple(LocatedStmt { stmt: Stmt::Iinc { amount: 1, .. }, .. })]));
                assert!(matches!(fin[..], [StructuredStmt::Simple(LocatedStmt { stmt: Stmt::Iinc { amount: 2, .. }, .. })]));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
