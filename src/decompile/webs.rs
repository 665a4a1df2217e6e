//! Def-use webs for locals without debug information.
//!
//! `javac` hands a slot to a new variable once the old one is dead, often with another
//! type. Reaching definitions over the simulated blocks join every read with the stores
//! that can reach it, and each connected group of stores and reads becomes a variable
//! of its own. A group holding a debug-table access takes that variable's identity; a
//! group that reaches method entry stays with the parameter occupying the slot.

use std::collections::{BTreeMap, BTreeSet};

use super::cfg_types::{BlockId, ExceptionEdge, Terminator};
use super::expr::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Access {
    Read,
    /// A store. Stores inside one arm of a conditional expression do not kill.
    Write { kills: bool },
    /// `iinc` and `++`/`--`: a read and a store of the same variable.
    Update { kills: bool },
}

/// Slot index and storage category.
type Slot = (u16, u8);

/// Definitions reaching a point, per slot. Ids past the occurrences stand for method entry.
type Reaching = BTreeMap<Slot, BTreeSet<usize>>;

struct Event {
    occurrence: usize,
    slot: Slot,
    access: Access,
}

fn visit_expr(e: &mut Expr, conditional: bool, f: &mut dyn FnMut(&mut LocalVar, Access)) {
    match e {
        Expr::LocalLoad(var) => f(var, Access::Read),
        Expr::Assign { target, value } if matches!(**target, Expr::LocalLoad(_)) => {
            visit_expr(value, conditional, f);
            if let Expr::LocalLoad(var) = target.as_mut() {
                f(var, Access::Write { kills: !conditional });
            }
        }
        Expr::IncDec { target, .. } if matches!(**target, Expr::LocalLoad(_)) => {
            if let Expr::LocalLoad(var) = target.as_mut() {
                f(var, Access::Update { kills: !conditional });
            }
        }
        Expr::Logical { left, right, .. } => {
            visit_expr(left, conditional, f);
            visit_expr(right, true, f);
        }
        Expr::Ternary { condition, then_expr, else_expr } => {
            visit_expr(condition, conditional, f);
            visit_expr(then_expr, true, f);
            visit_expr(else_expr, true, f);
        }
        other => other.for_each_child_mut(&mut |child| visit_expr(child, conditional, f)),
    }
}

fn visit_stmt(stmt: &mut Stmt, f: &mut dyn FnMut(&mut LocalVar, Access)) {
    match stmt {
        Stmt::LocalStore { var, value } => {
            visit_expr(value, false, f);
            f(var, Access::Write { kills: true });
        }
        Stmt::Iinc { var, .. } => f(var, Access::Update { kills: true }),
        other => other.for_each_expr_mut(&mut |e| visit_expr(e, false, f)),
    }
}

/// Every local access of a block in evaluation order.
fn visit_block(block: &mut SimulatedBlock, f: &mut dyn FnMut(&mut LocalVar, Access)) {
    for s in &mut block.statements {
        visit_stmt(&mut s.stmt, f);
    }
    for e in block.branch_condition.iter_mut().chain(block.switch_value.iter_mut()) {
        visit_expr(e, false, f);
    }
}

fn apply(state: &mut Reaching, event: &Event) {
    match event.access {
        Access::Read => {}
        Access::Write { kills } | Access::Update { kills } => {
            if kills {
                state.retain(|(index, _), _| *index != event.slot.0);
            }
            state.entry(event.slot).or_default().insert(event.occurrence);
        }
    }
}

fn merge(into: &mut Reaching, from: Option<&Reaching>) {
    for (slot, defs) in from.into_iter().flatten() {
        into.entry(*slot).or_default().extend(defs.iter().copied());
    }
}

/// Disjoint sets over occurrence ids; the smallest id is the representative.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(size: usize) -> Self {
        UnionFind { parent: (0..size).collect() }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra.max(rb)] = ra.min(rb);
        }
    }
}

/// Tags every local access without debug information with the web it belongs to.
///
/// Methods with subroutines are left alone: definitions inside a `jsr` target do not
/// flow to the return site in this graph.
pub fn split_webs(blocks: &mut BTreeMap<BlockId, SimulatedBlock>, exception_edges: &[ExceptionEdge], entry: BlockId) {
    if blocks.values().any(|b| matches!(b.terminator, Terminator::Jsr { .. } | Terminator::Ret)) {
        return;
    }

    let mut events: BTreeMap<BlockId, Vec<Event>> = BTreeMap::new();
    let mut debug_vars: Vec<Option<LocalVar>> = Vec::new();
    for (&id, block) in blocks.iter_mut() {
        let list = events.entry(id).or_default();
        visit_block(block, &mut |var, access| {
            let occurrence = debug_vars.len();
            debug_vars.push(var.origin.is_some().then(|| var.clone()));
            list.push(Event { occurrence, slot: (var.index, category(&var.ty)), access });
        });
    }
    let occurrences = debug_vars.len();
    if occurrences == 0 {
        return;
    }

    let slots: BTreeSet<Slot> = events.values().flatten().map(|e| e.slot).collect();
    let entry_nodes: BTreeMap<Slot, usize> = slots.iter().enumerate().map(|(i, s)| (*s, occurrences + i)).collect();
    let entry_state: Reaching = entry_nodes.iter().map(|(s, n)| (*s, BTreeSet::from([*n]))).collect();

    let ids: Vec<BlockId> = blocks.keys().copied().collect();
    let mut preds: BTreeMap<BlockId, Vec<BlockId>> = BTreeMap::new();
    for (&id, block) in blocks.iter() {
        for t in block.terminator.targets() {
            preds.entry(t).or_default().push(id);
        }
    }
    // A handler sees every definition made anywhere in the blocks it protects.
    let mut protected: BTreeMap<BlockId, Vec<BlockId>> = BTreeMap::new();
    for edge in exception_edges {
        for &id in ids.iter().filter(|&&id| edge.covers(id)) {
            protected.entry(edge.handler_block).or_default().push(id);
        }
    }
    let mut generated: BTreeMap<BlockId, Reaching> = BTreeMap::new();
    for (&id, list) in &events {
        let defs = generated.entry(id).or_default();
        for e in list.iter().filter(|e| e.access != Access::Read) {
            defs.entry(e.slot).or_default().insert(e.occurrence);
        }
    }

    let mut ins: BTreeMap<BlockId, Reaching> = BTreeMap::new();
    let mut outs: BTreeMap<BlockId, Reaching> = BTreeMap::new();
    let mut rounds = 0;
    loop {
        rounds += 1;
        let mut changed = false;
        for &b in &ids {
            let mut state = if b == entry { entry_state.clone() } else { Reaching::new() };
            for p in preds.get(&b).into_iter().flatten() {
                merge(&mut state, outs.get(p));
            }
            for c in protected.get(&b).into_iter().flatten() {
                merge(&mut state, ins.get(c));
                merge(&mut state, generated.get(c));
            }
            let mut out = state.clone();
            for e in events.get(&b).into_iter().flatten() {
                apply(&mut out, e);
            }
            if ins.get(&b) != Some(&state) {
                ins.insert(b, state);
                changed = true;
            }
            if outs.get(&b) != Some(&out) {
                outs.insert(b, out);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let mut sets = UnionFind::new(occurrences + entry_nodes.len());
    for &b in &ids {
        let mut state = ins.remove(&b).unwrap_or_default();
        for e in events.get(&b).into_iter().flatten() {
            if e.access == Access::Read || matches!(e.access, Access::Update { .. }) {
                match state.get(&e.slot).filter(|defs| !defs.is_empty()) {
                    Some(defs) => {
                        for &d in defs {
                            sets.union(e.occurrence, d);
                        }
                    }
                    None => {
                        if let Some(&node) = entry_nodes.get(&e.slot) {
                            sets.union(e.occurrence, node);
                        }
                    }
                }
            }
            apply(&mut state, e);
        }
    }

    let mut named: BTreeMap<usize, LocalVar> = BTreeMap::new();
    for (occurrence, var) in debug_vars.into_iter().enumerate() {
        if let Some(var) = var {
            named.entry(sets.find(occurrence)).or_insert(var);
        }
    }
    let at_entry: BTreeSet<usize> = entry_nodes.values().map(|&n| sets.find(n)).collect();

    let mut numbers: BTreeMap<usize, u32> = BTreeMap::new();
    let mut occurrence = 0;
    for block in blocks.values_mut() {
        visit_block(block, &mut |var, _| {
            let root = sets.find(occurrence);
            occurrence += 1;
            if var.origin.is_some() {
                return;
            }
            if let Some(debug) = named.get(&root) {
                var.origin = debug.origin;
                if var.name.is_none() {
                    var.name = debug.name.clone();
                }
                var.signature = debug.signature.clone();
                if category(&debug.ty) == category(&var.ty) {
                    var.ty = debug.ty.clone();
                }
            } else if !at_entry.contains(&root) {
                let next = numbers.len() as u32;
                var.web = Some(*numbers.entry(root).or_insert(next));
            }
        });
    }
    tracing::trace!(rounds, webs = numbers.len(), "split local webs");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompile::cfg_types::BranchCondition;
    use crate::decompile::descriptor::JvmType;

    fn block(id: BlockId, statements: Vec<Stmt>, terminator: Terminator) -> SimulatedBlock {
        SimulatedBlock {
            id,
            statements: statements.into_iter().map(|s| LocatedStmt::new(Location::at(id), s)).collect(),
            entry_stack: vec![],
            exit_stack: vec![],
            terminator,
            branch_condition: None,
            switch_value: None,
            branch_loc: Location::at(id),
        }
    }

    fn object(index: u16) -> LocalVar {
        LocalVar::new(index, JvmType::object())
    }

    fn call(var: &LocalVar) -> Stmt {
        Stmt::ExprStmt(Expr::MethodCall {
            kind: InvokeKind::Virtual,
            object: Some(Box::new(Expr::LocalLoad(var.clone()))),
            class_name: "java/lang/Object".into(),
            method_name: "hashCode".into(),
            descriptor: "()I".into(),
            args: vec![],
            return_type: JvmType::Int,
        })
    }

    fn webs_of(blocks: &BTreeMap<BlockId, SimulatedBlock>) -> Vec<Option<u32>> {
        let mut out = Vec::new();
        for b in blocks.values() {
            for s in &b.statements {
                match &s.stmt {
                    Stmt::LocalStore { var, .. } => out.push(var.web),
                    Stmt::ExprStmt(Expr::MethodCall { object: Some(o), .. }) => {
                        if let Expr::LocalLoad(v) = o.as_ref() {
                            out.push(v.web);
                        }
                    }
                    _ => {}
                }
            }
        }
        out
    }

    #[test]
    fn reused_slot_splits_into_two_webs() {
        let slot = object(1);
        let mut blocks = BTreeMap::from([(
            0,
            block(
                0,
                vec![
                    Stmt::LocalStore { var: slot.clone(), value: Expr::StringLiteral("abc".into()) },
                    call(&slot),
                    Stmt::LocalStore { var: slot.clone(), value: Expr::NullLiteral },
                    call(&slot),
                ],
                Terminator::Return,
            ),
        )]);
        split_webs(&mut blocks, &[], 0);
        assert_eq!(webs_of(&blocks), vec![Some(0), Some(0), Some(1), Some(1)]);
    }

    #[test]
    fn stores_merging_at_a_join_share_a_web() {
        let slot = object(1);
        let store = |value| Stmt::LocalStore { var: slot.clone(), value };
        let mut head = block(0, vec![], Terminator::ConditionalBranch {
                condition: BranchCondition::IntZero(CompareOp::Ne),
                if_true: 5,
                if_false: 10,
            });
        head.branch_condition = Some(Expr::int(1));
        let mut blocks = BTreeMap::from([
            (0, head),
            (5, block(5, vec![store(Expr::StringLiteral("a".into()))], Terminator::Goto { target: 20 })),
            (10, block(10, vec![store(Expr::NullLiteral)], Terminator::FallThrough { target: 20 })),
            (20, block(20, vec![call(&slot)], Terminator::Return)),
        ]);
        split_webs(&mut blocks, &[], 0);
        assert_eq!(webs_of(&blocks), vec![Some(0), Some(0), Some(0)]);
    }

    #[test]
    fn read_reaching_entry_stays_on_the_parameter() {
        let param = object(0);
        let mut blocks = BTreeMap::from([(
            0,
            block(
                0,
                vec![call(&param), Stmt::LocalStore { var: param.clone(), value: Expr::NullLiteral }, call(&param)],
                Terminator::Return,
            ),
        )]);
        split_webs(&mut blocks, &[], 0);
        assert_eq!(webs_of(&blocks), vec![None, Some(0), Some(0)]);
    }

    #[test]
    fn handler_sees_stores_from_the_protected_block() {
        let slot = object(1);
        let caught = object(2);
        let mut blocks = BTreeMap::from([
            (
                0,
                block(
                    0,
                    vec![
                        Stmt::LocalStore { var: slot.clone(), value: Expr::StringLiteral("a".into()) },
                        Stmt::LocalStore { var: slot.clone(), value: Expr::StringLiteral("b".into()) },
                    ],
                    Terminator::Return,
                ),
            ),
            (
                8,
                block(
                    8,
                    vec![
                        Stmt::LocalStore { var: caught, value: Expr::CaughtException(JvmType::object()) },
                        call(&slot),
                    ],
                    Terminator::Return,
                ),
            ),
        ]);
        let edges = [ExceptionEdge { start_pc: 0, end_pc: 8, handler_block: 8, catch_type: 0 }];
        split_webs(&mut blocks, &edges, 0);
        let webs = webs_of(&blocks);
        // both stores reach the handler's read
        assert_eq!(webs[0], webs[1]);
        assert_eq!(webs[0], webs[3]);
    }

    #[test]
    fn debug_table_identity_spreads_over_its_web() {
        let bare = object(1);
        let mut named = object(1);
        named.origin = Some(3);
        named.name = Some("text".into());
        named.ty = JvmType::Reference("java/lang/String".into());
        let mut blocks = BTreeMap::from([(
            0,
            block(
                0,
                vec![Stmt::LocalStore { var: bare, value: Expr::StringLiteral("a".into()) }, call(&named)],
                Terminator::Return,
            ),
        )]);
        split_webs(&mut blocks, &[], 0);
        let Stmt::LocalStore { var, .. } = &blocks[&0].statements[0].stmt else { panic!("store expected") };
        assert_eq!(var.origin, Some(3));
        assert_eq!(var.name.as_deref(), Some("text"));
        assert_eq!(var.web, None);
    }
}
