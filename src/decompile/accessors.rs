//! Synthetic accessor elimination.
//!
//! Before nestmates, `javac` reached private members across a nested-class boundary
//! through static `access$NNN` methods on the owning class. Each accessor whose body is
//! exactly one field read, one field write, one field update or one forwarded call is
//! recorded here, and call sites anywhere in the compilation unit are rewritten into the
//! direct access. Accessors with other bodies are tracked too, so the finalizer can keep
//! the ones still being called.

use std::collections::BTreeMap;

use crate::constant_info::ConstantPool;

use super::descriptor::{parse_method_descriptor, JvmType};
use super::expr::*;
use super::java_ast::JavaClass;
use super::structured_types::*;

/// Field reached through an accessor.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldTarget {
    pub class_name: String,
    pub field_name: String,
    pub field_type: JvmType,
    pub is_static: bool,
}

/// Method reached through a forwarding accessor.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodTarget {
    pub kind: InvokeKind,
    pub class_name: String,
    pub method_name: String,
    pub descriptor: String,
    pub return_type: JvmType,
    /// The accessor's first parameter is the receiver.
    pub has_receiver: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AccessorShape {
    Getter(FieldTarget),
    Setter { field: FieldTarget, returns_value: bool },
    /// `x++`, `--x` and friends; the value of the expression is returned.
    Increment { field: FieldTarget, increment: bool, prefix: bool },
    /// `x op= value` with the value as the last parameter.
    Compound { field: FieldTarget, op: BinOp },
    Forward(MethodTarget),
}

/// `(owner, name, descriptor)` of an accessor method.
pub type AccessorKey = (String, String, String);

#[derive(Clone, Debug)]
struct Entry {
    /// `None` for an accessor whose body has no known shape.
    shape: Option<AccessorShape>,
    uses: usize,
}

/// Accessors of one compilation unit with the number of call sites still referring to each.
#[derive(Clone, Debug, Default)]
pub struct AccessorTable {
    entries: BTreeMap<AccessorKey, Entry>,
}

pub fn is_accessor_name(name: &str) -> bool {
    name.strip_prefix("access$").map_or(false, |rest| !rest.is_empty())
}

/// Local slot of every parameter of a static method.
fn parameter_slots(params: &[JvmType]) -> Vec<u16> {
    let mut slot = 0u16;
    params
        .iter()
        .map(|p| {
            let s = slot;
            slot = slot.saturating_add(if p.is_wide() { 2 } else { 1 });
            s
        })
        .collect()
}

fn is_param(e: &Expr, slot: u16) -> bool {
    matches!(e, Expr::LocalLoad(v) if v.index == slot)
}

/// All expressions are the parameters at `slots`, in order.
fn are_params(exprs: &[&Expr], slots: &[u16]) -> bool {
    exprs.len() == slots.len() && exprs.iter().zip(slots).all(|(e, s)| is_param(e, *s))
}

fn field_getter(e: &Expr, slots: &[u16]) -> Option<FieldTarget> {
    let Expr::FieldGet { object, class_name, field_name, field_type } = e else { return None };
    let objects: Vec<&Expr> = object.iter().map(|o| o.as_ref()).collect();
    are_params(&objects, slots).then(|| FieldTarget {
        class_name: class_name.clone(),
        field_name: field_name.clone(),
        field_type: field_type.clone(),
        is_static: object.is_none(),
    })
}

fn forwarded_call(e: &Expr, slots: &[u16]) -> Option<MethodTarget> {
    let Expr::MethodCall { kind, object, class_name, method_name, descriptor, args, return_type } = e else {
        return None;
    };
    if method_name == "<init>" {
        return None;
    }
    let operands: Vec<&Expr> = object.iter().map(|o| o.as_ref()).chain(args.iter()).collect();
    are_params(&operands, slots).then(|| MethodTarget {
        kind: *kind,
        class_name: class_name.clone(),
        method_name: method_name.clone(),
        descriptor: descriptor.clone(),
        return_type: return_type.clone(),
        has_receiver: object.is_some(),
    })
}

fn setter(stmt: &Stmt, slots: &[u16]) -> Option<(FieldTarget, Expr)> {
    let Stmt::FieldStore { object, class_name, field_name, field_type, value } = stmt else { return None };
    let (value_slot, object_slots) = slots.split_last()?;
    let objects: Vec<&Expr> = object.iter().collect();
    if !are_params(&objects, object_slots) || !is_param(value, *value_slot) {
        return None;
    }
    let field = FieldTarget {
        class_name: class_name.clone(),
        field_name: field_name.clone(),
        field_type: field_type.clone(),
        is_static: object.is_none(),
    };
    Some((field, value.clone()))
}

fn is_one(e: &Expr) -> bool {
    matches!(e, Expr::IntLiteral { value: 1, .. } | Expr::LongLiteral(1))
        || matches!(e, Expr::FloatLiteral(v) if *v == 1.0)
        || matches!(e, Expr::DoubleLiteral(v) if *v == 1.0)
}

/// `return x.f++` or `return x.f += v` through an accessor; narrow fields wrap the
/// arithmetic in a cast.
fn field_update(e: &Expr, slots: &[u16]) -> Option<AccessorShape> {
    match e {
        Expr::IncDec { target, increment, prefix } => Some(AccessorShape::Increment {
            field: field_getter(target, slots)?,
            increment: *increment,
            prefix: *prefix,
        }),
        Expr::Assign { target, value } => {
            let value = match value.as_ref() {
                Expr::Cast { operand, .. } => operand.as_ref(),
                v => v,
            };
            let Expr::BinaryOp { op, left, right } = value else { return None };
            if left != target {
                return None;
            }
            if matches!(op, BinOp::Add | BinOp::Sub) && is_one(right) {
                if let Some(field) = field_getter(target, slots) {
                    return Some(AccessorShape::Increment { field, increment: *op == BinOp::Add, prefix: true });
                }
            }
            let (value_slot, object_slots) = slots.split_last()?;
            if !is_param(right, *value_slot) {
                return None;
            }
            Some(AccessorShape::Compound { field: field_getter(target, object_slots)?, op: *op })
        }
        _ => None,
    }
}

/// Classifies an accessor body; `None` when it does anything beyond the single access.
pub fn match_accessor(descriptor: &str, body: &[StructuredStmt]) -> Option<AccessorShape> {
    let (params, ret) = parse_method_descriptor(descriptor)?;
    let slots = parameter_slots(&params);
    let stmts: Vec<&Stmt> = body.iter().map(StructuredStmt::as_stmt).collect::<Option<_>>()?;
    match stmts.as_slice() {
        [Stmt::Return(Some(e))] if ret != JvmType::Void => {
            if let Some(field) = field_getter(e, &slots) {
                return Some(AccessorShape::Getter(field));
            }
            if let Some(target) = forwarded_call(e, &slots) {
                return Some(AccessorShape::Forward(target));
            }
            if let Some(shape) = field_update(e, &slots) {
                return Some(shape);
            }
            if let Expr::Assign { target, value } = e {
                let store = match target.as_ref() {
                    Expr::FieldGet { object, class_name, field_name, field_type } => Stmt::FieldStore {
                        object: object.as_deref().cloned(),
                        class_name: class_name.clone(),
                        field_name: field_name.clone(),
                        field_type: field_type.clone(),
                        value: value.as_ref().clone(),
                    },
                    _ => return None,
                };
                let (field, _) = setter(&store, &slots)?;
                return Some(AccessorShape::Setter { field, returns_value: true });
            }
            None
        }
        [store, Stmt::Return(Some(returned))] if ret != JvmType::Void => {
            let (field, value) = setter(store, &slots)?;
            (*returned == value).then_some(AccessorShape::Setter { field, returns_value: true })
        }
        [Stmt::ExprStmt(e)] if ret == JvmType::Void => forwarded_call(e, &slots).map(AccessorShape::Forward),
        [store] if ret == JvmType::Void => {
            let (field, _) = setter(store, &slots)?;
            Some(AccessorShape::Setter { field, returns_value: false })
        }
        _ => None,
    }
}

fn field_get(field: &FieldTarget, object: Option<Expr>) -> Expr {
    Expr::FieldGet {
        object: object.map(Box::new),
        class_name: field.class_name.clone(),
        field_name: field.field_name.clone(),
        field_type: field.field_type.clone(),
    }
}

impl AccessorTable {
    /// Records `name` on `owner`; returns whether its body has a known accessor shape.
    pub fn register(&mut self, owner: &str, name: &str, descriptor: &str, body: &[StructuredStmt]) -> bool {
        let shape = match_accessor(descriptor, body);
        if shape.is_none() {
            tracing::warn!(class = owner, method = name, "synthetic accessor has an unrecognized body");
        }
        let recognized = shape.is_some();
        self.entries.insert(key(owner, name, descriptor), Entry { shape, uses: 0 });
        recognized
    }

    /// Registers every static synthetic `access$` method of `class` and its nested classes.
    pub fn collect(&mut self, class: &JavaClass) {
        for method in &class.methods {
            if method.is_static && method.is_synthetic && is_accessor_name(&method.name) {
                if let Some(body) = &method.body {
                    self.register(&class.internal_name, &method.name, &method.descriptor, &body.statements);
                }
            }
        }
        for inner in &class.inner_classes {
            self.collect(inner);
        }
    }

    /// Forgets every recognized shape: calls stay as they are and no declaration is dropped.
    pub fn keep_declarations(&mut self) {
        for entry in self.entries.values_mut() {
            entry.shape = None;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn shape(&self, owner: &str, name: &str, descriptor: &str) -> Option<&AccessorShape> {
        self.entries.get(&key(owner, name, descriptor)).and_then(|e| e.shape.as_ref())
    }

    /// Call sites still referring to the accessor.
    pub fn usage(&self, owner: &str, name: &str, descriptor: &str) -> Option<usize> {
        self.entries.get(&key(owner, name, descriptor)).map(|e| e.uses)
    }

    /// A recognized accessor with no remaining callers; its declaration can go.
    pub fn is_consumed(&self, owner: &str, name: &str, descriptor: &str) -> bool {
        self.shape(owner, name, descriptor).is_some() && self.usage(owner, name, descriptor) == Some(0)
    }

    /// Some call site still goes through the accessor, so its declaration must be shown.
    pub fn is_still_called(&self, owner: &str, name: &str, descriptor: &str) -> bool {
        self.usage(owner, name, descriptor).map_or(false, |uses| uses > 0)
    }

    /// Adds the accessor calls found in `body` to the usage counts.
    pub fn count_calls(&mut self, body: &[StructuredStmt]) {
        visit_exprs(body, &mut |e| {
            if let Some(k) = call_key(e) {
                if let Some(entry) = self.entries.get_mut(&k) {
                    entry.uses += 1;
                }
            }
        });
    }

    /// Rewrites accessor calls in `body` into direct accesses. Field accesses get a
    /// Fieldref in `pool`. Returns the number of rewritten call sites.
    pub fn rewrite(&mut self, body: &mut Vec<StructuredStmt>, pool: &mut ConstantPool) -> usize {
        let mut rewritten = 0;
        walk_bodies_mut(body, &mut |list| {
            for stmt in list.iter_mut() {
                let StructuredStmt::Simple(located) = stmt else { continue };
                let Stmt::ExprStmt(call) = &located.stmt else { continue };
                let Some(k) = call_key(call) else { continue };
                let Some(entry) = self.entries.get_mut(&k) else { continue };
                let Some(AccessorShape::Setter { field, .. }) = &entry.shape else { continue };
                let Expr::MethodCall { args, .. } = call else { continue };
                let mut args = args.clone();
                let Some(value) = args.pop() else { continue };
                located.stmt = Stmt::FieldStore {
                    object: if field.is_static { None } else { args.pop() },
                    class_name: field.class_name.clone(),
                    field_name: field.field_name.clone(),
                    field_type: field.field_type.clone(),
                    value,
                };
                append_field_ref(pool, field);
                entry.uses = entry.uses.saturating_sub(1);
                rewritten += 1;
            }
        });
        transform_exprs(body, &mut |e| {
            let Some(k) = call_key(e) else { return };
            let Some(entry) = self.entries.get_mut(&k) else { return };
            let Some(shape) = &entry.shape else { return };
            let Expr::MethodCall { args, .. } = e else { return };
            let mut args = std::mem::take(args);
            let replacement = match shape {
                AccessorShape::Getter(field) => {
                    append_field_ref(pool, field);
                    field_get(field, if field.is_static { None } else { args.pop() })
                }
                AccessorShape::Setter { field, .. } => {
                    let value = args.pop().unwrap_or(Expr::Unresolved("value".into()));
                    append_field_ref(pool, field);
                    Expr::Assign {
                        target: Box::new(field_get(field, if field.is_static { None } else { args.pop() })),
                        value: Box::new(value),
                    }
                }
                AccessorShape::Increment { field, increment, prefix } => {
                    append_field_ref(pool, field);
                    Expr::IncDec {
                        target: Box::new(field_get(field, if field.is_static { None } else { args.pop() })),
                        increment: *increment,
                        prefix: *prefix,
                    }
                }
                AccessorShape::Compound { field, op } => {
                    let value = args.pop().unwrap_or(Expr::Unresolved("value".into()));
                    append_field_ref(pool, field);
                    let target = field_get(field, if field.is_static { None } else { args.pop() });
                    let mut sum = Expr::BinaryOp { op: *op, left: Box::new(target.clone()), right: Box::new(value) };
                    if field.field_type.is_int_like() && !matches!(field.field_type, JvmType::Int | JvmType::Boolean) {
                        sum = Expr::Cast { target_type: field.field_type.clone(), operand: Box::new(sum) };
                    }
                    Expr::Assign { target: Box::new(target), value: Box::new(sum) }
                }
                AccessorShape::Forward(target) => {
                    let object = if target.has_receiver && !args.is_empty() {
                        Some(Box::new(args.remove(0)))
                    } else {
                        None
                    };
                    Expr::MethodCall {
                        kind: target.kind,
                        object,
                        class_name: target.class_name.clone(),
                        method_name: target.method_name.clone(),
                        descriptor: target.descriptor.clone(),
                        args,
                        return_type: target.return_type.clone(),
                    }
                }
            };
            *e = replacement;
            entry.uses = entry.uses.saturating_sub(1);
            rewritten += 1;
        });
        rewritten
    }
}

fn key(owner: &str, name: &str, descriptor: &str) -> AccessorKey {
    (owner.to_string(), name.to_string(), descriptor.to_string())
}

fn call_key(e: &Expr) -> Option<AccessorKey> {
    match e {
        Expr::MethodCall { kind: InvokeKind::Static, class_name, method_name, descriptor, .. }
            if is_accessor_name(method_name) =>
        {
            Some(key(class_name, method_name, descriptor))
        }
        _ => None,
    }
}

fn append_field_ref(pool: &mut ConstantPool, field: &FieldTarget) {
    if pool
        .add_field_ref(&field.class_name, &field.field_name, &field.field_type.to_descriptor())
        .is_none()
    {
        tracing::warn!(field = %field.field_name, "constant pool full, field reference not appended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outer_param() -> Expr {
        Expr::LocalLoad(LocalVar::new(0, JvmType::Reference("Outer".into())))
    }

    fn x_of(object: Expr) -> Expr {
        Expr::FieldGet {
            object: Some(Box::new(object)),
            class_name: "Outer".into(),
            field_name: "x".into(),
            field_type: JvmType::Int,
        }
    }

    fn simple(stmt: Stmt) -> StructuredStmt {
        StructuredStmt::simple(Location::at(0), stmt)
    }

    fn accessor_call(args: Vec<Expr>, descriptor: &str, ret: JvmType) -> Expr {
        Expr::MethodCall {
            kind: InvokeKind::Static,
            object: None,
            class_name: "Outer".into(),
            method_name: "access$000".into(),
            descriptor: descriptor.into(),
            args,
            return_type: ret,
        }
    }

    #[test]
    fn getter_call_becomes_field_read() {
        let mut table = AccessorTable::default();
        let body = vec![simple(Stmt::Return(Some(x_of(outer_param()))))];
        assert!(table.register("Outer", "access$000", "(LOuter;)I", &body));

        let obj = Expr::LocalLoad(LocalVar::new(1, JvmType::Reference("Outer".into())));
        let mut caller = vec![simple(Stmt::Return(Some(accessor_call(vec![obj.clone()], "(LOuter;)I", JvmType::Int))))];
        table.count_calls(&caller);
        assert_eq!(table.usage("Outer", "access$000", "(LOuter;)I"), Some(1));

        let mut pool = ConstantPool::default();
        assert_eq!(table.rewrite(&mut caller, &mut pool), 1);
        assert_eq!(caller[0].as_stmt(), Some(&Stmt::Return(Some(x_of(obj)))));
        assert!(table.is_consumed("Outer", "access$000", "(LOuter;)I"));
        assert!(pool.entries().iter().any(|c| matches!(c, crate::constant_info::ConstantInfo::FieldRef(_))));
    }

    #[test]
    fn setter_returning_value_matches_split_store() {
        let value = Expr::LocalLoad(LocalVar::new(1, JvmType::Int));
        let body = vec![
            simple(Stmt::FieldStore {
                object: Some(outer_param()),
                class_name: "Outer".into(),
                field_name: "x".into(),
                field_type: JvmType::Int,
                value: value.clone(),
            }),
            simple(Stmt::Return(Some(value))),
        ];
        match match_accessor("(LOuter;I)I", &body) {
            Some(AccessorShape::Setter { field, returns_value: true }) => assert_eq!(field.field_name, "x"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn void_setter_call_statement_becomes_store() {
        let mut table = AccessorTable::default();
        let body = vec![simple(Stmt::FieldStore {
            object: None,
            class_name: "Outer".into(),
            field_name: "count".into(),
            field_type: JvmType::Long,
            value: Expr::LocalLoad(LocalVar::new(0, JvmType::Long)),
        })];
        assert!(table.register("Outer", "access$102", "(J)V", &body));
        let mut caller = vec![simple(Stmt::ExprStmt(Expr::MethodCall {
            kind: InvokeKind::Static,
            object: None,
            class_name: "Outer".into(),
            method_name: "access$102".into(),
            descriptor: "(J)V".into(),
            args: vec![Expr::LongLiteral(5)],
            return_type: JvmType::Void,
        }))];
        table.count_calls(&caller);
        table.rewrite(&mut caller, &mut ConstantPool::default());
        match caller[0].as_stmt() {
            Some(Stmt::FieldStore { object: None, field_name, value: Expr::LongLiteral(5), .. }) => {
                assert_eq!(field_name, "count")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn non_trivial_body_is_not_an_accessor() {
        let body = vec![
            simple(Stmt::Iinc { var: LocalVar::new(1, JvmType::Int), amount: 1 }),
            simple(Stmt::Return(Some(x_of(outer_param())))),
        ];
        assert_eq!(match_accessor("(LOuter;I)I", &body), None);
        // Reads the wrong parameter.
        let body = vec![simple(Stmt::Return(Some(x_of(Expr::LocalLoad(LocalVar::new(1, JvmType::object()))))))];
        assert_eq!(match_accessor("(LOuter;LOuter;)I", &body), None);
    }

    #[test]
    fn postfix_increment_accessor_becomes_field_update() {
        let mut table = AccessorTable::default();
        let body = vec![simple(Stmt::Return(Some(Expr::IncDec {
            target: Box::new(x_of(outer_param())),
            increment: true,
            prefix: false,
        })))];
        assert!(table.register("Outer", "access$008", "(LOuter;)I", &body));

        let obj = Expr::LocalLoad(LocalVar::new(1, JvmType::Reference("Outer".into())));
        let mut caller = vec![simple(Stmt::ExprStmt(Expr::MethodCall {
            kind: InvokeKind::Static,
            object: None,
            class_name: "Outer".into(),
            method_name: "access$008".into(),
            descriptor: "(LOuter;)I".into(),
            args: vec![obj.clone()],
            return_type: JvmType::Int,
        }))];
        table.count_calls(&caller);
        assert_eq!(table.rewrite(&mut caller, &mut ConstantPool::default()), 1);
        let expected = Expr::IncDec { target: Box::new(x_of(obj)), increment: true, prefix: false };
        assert_eq!(caller[0].as_stmt(), Some(&Stmt::ExprStmt(expected)));
        assert!(table.is_consumed("Outer", "access$008", "(LOuter;)I"));
    }

    #[test]
    fn compound_and_prefix_updates_are_recognized() {
        let target = x_of(outer_param());
        let plus = |right: Expr| Expr::BinaryOp { op: BinOp::Add, left: Box::new(target.clone()), right: Box::new(right) };

        let prefix = vec![simple(Stmt::Return(Some(Expr::Assign {
            target: Box::new(target.clone()),
            value: Box::new(plus(Expr::int(1))),
        })))];
        assert!(matches!(
            match_accessor("(LOuter;)I", &prefix),
            Some(AccessorShape::Increment { increment: true, prefix: true, .. })
        ));

        let compound = vec![simple(Stmt::Return(Some(Expr::Assign {
            target: Box::new(target.clone()),
            value: Box::new(plus(Expr::LocalLoad(LocalVar::new(1, JvmType::Int)))),
        })))];
        let mut table = AccessorTable::default();
        assert!(table.register("Outer", "access$012", "(LOuter;I)I", &compound));
        let obj = Expr::LocalLoad(LocalVar::new(2, JvmType::Reference("Outer".into())));
        let mut caller = vec![simple(Stmt::Return(Some(Expr::MethodCall {
            kind: InvokeKind::Static,
            object: None,
            class_name: "Outer".into(),
            method_name: "access$012".into(),
            descriptor: "(LOuter;I)I".into(),
            args: vec![obj.clone(), Expr::int(3)],
            return_type: JvmType::Int,
        })))];
        table.count_calls(&caller);
        table.rewrite(&mut caller, &mut ConstantPool::default());
        let sum = Expr::BinaryOp { op: BinOp::Add, left: Box::new(x_of(obj.clone())), right: Box::new(Expr::int(3)) };
        let expected = Expr::Assign { target: Box::new(x_of(obj)), value: Box::new(sum) };
        assert_eq!(caller[0].as_stmt(), Some(&Stmt::Return(Some(expected))));
    }

    #[test]
    fn unrecognized_accessor_stays_while_called() {
        let mut table = AccessorTable::default();
        let doubled = Expr::BinaryOp { op: BinOp::Mul, left: Box::new(x_of(outer_param())), right: Box::new(Expr::int(2)) };
        let body = vec![simple(Stmt::Return(Some(doubled)))];
        assert!(!table.register("Outer", "access$000", "(LOuter;)I", &body));

        let obj = Expr::LocalLoad(LocalVar::new(1, JvmType::Reference("Outer".into())));
        let mut caller = vec![simple(Stmt::Return(Some(accessor_call(vec![obj], "(LOuter;)I", JvmType::Int))))];
        table.count_calls(&caller);
        assert_eq!(table.rewrite(&mut caller, &mut ConstantPool::default()), 0);
        assert!(table.is_still_called("Outer", "access$000", "(LOuter;)I"));
        assert!(!table.is_consumed("Outer", "access$000", "(LOuter;)I"));
    }
}
