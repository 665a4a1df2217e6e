use std::collections::BTreeMap;

use super::descriptor::{parse_method_descriptor, JvmType};
use super::expr::*;
use super::java_ast::{ClassKind, EnumConstant, JavaClass};
use super::structured_types::*;

const ASSERTIONS_DISABLED: &str = "$assertionsDisabled";

/// Options controlling which desugaring passes to apply.
#[derive(Clone, Debug)]
pub struct DesugarOptions {
    pub foreach: bool,
    pub enum_switch: bool,
    pub string_switch: bool,
    pub assert: bool,
    pub autobox: bool,
}

impl Default for DesugarOptions {
    fn default() -> Self {
        Self {
            foreach: true,
            enum_switch: true,
            string_switch: true,
            assert: true,
            autobox: true,
        }
    }
}

/// `(class, $SwitchMap$ field)` to the case index each enum constant was given.
pub type SwitchMaps = BTreeMap<(String, String), BTreeMap<i32, (String, String)>>;

/// Run all enabled desugaring passes on a structured body.
pub fn desugar(body: &mut StructuredBody, maps: &SwitchMaps, options: &DesugarOptions) {
    walk_bodies_mut(&mut body.statements, &mut |list| {
        if options.enum_switch {
            desugar_enum_switch(list, maps);
        }
        if options.string_switch {
            desugar_string_switch(list);
        }
        if options.foreach {
            desugar_foreach_in_block(list);
        }
        if options.assert {
            desugar_assert_in_block(list);
        }
    });
    if options.autobox {
        transform_exprs(&mut body.statements, &mut desugar_autobox);
    }
}

/// Class-level idioms (enum constants, the `Enum` super call) followed by [`desugar`]
/// over every method body, recursing into nested classes.
pub fn desugar_class(class: &mut JavaClass, maps: &SwitchMaps, options: &DesugarOptions) {
    // Nested classes first: constant bodies leave `inner_classes` below.
    for inner in &mut class.inner_classes {
        desugar_class(inner, maps, options);
    }
    if class.kind == ClassKind::Enum {
        recover_enum_constants(class);
    }
    for method in &mut class.methods {
        if let Some(body) = &mut method.body {
            desugar(body, maps, options);
        }
    }
}

fn for_each_simple(body: &[StructuredStmt], f: &mut dyn FnMut(&Stmt)) {
    for stmt in body {
        if let StructuredStmt::Simple(s) = stmt {
            f(&s.stmt);
        }
        stmt.for_each_body(&mut |inner| for_each_simple(inner, f));
    }
}

fn reads(body: &[StructuredStmt], var: &LocalVar) -> bool {
    let mut found = false;
    visit_exprs(body, &mut |e| found |= matches!(e, Expr::LocalLoad(v) if v == var));
    found
}

fn stored(stmt: &StructuredStmt) -> Option<(&LocalVar, &Expr)> {
    match stmt.as_stmt()? {
        Stmt::LocalStore { var, value } => Some((var, value)),
        _ => None,
    }
}

/// The call a boolean-returning condition tests, in any of the shapes `ifeq`/`ifne` leave.
fn tested_call(e: &Expr) -> Option<&Expr> {
    match e {
        Expr::MethodCall { .. } => Some(e),
        Expr::Compare { op: CompareOp::Ne, left, right } if right.int_value() == Some(0) => {
            matches!(**left, Expr::MethodCall { .. }).then_some(&**left)
        }
        Expr::Compare { op: CompareOp::Eq, left, right } if right.int_value() == Some(1) => {
            matches!(**left, Expr::MethodCall { .. }).then_some(&**left)
        }
        _ => None,
    }
}

fn call_on<'a>(e: &'a Expr, name: &str) -> Option<(&'a Expr, &'a [Expr])> {
    match e {
        Expr::MethodCall { object: Some(object), method_name, args, .. } if method_name == name => {
            Some((object, args.as_slice()))
        }
        _ => None,
    }
}

// ----------------------------------------------------------------------------
// switch on enum
// ----------------------------------------------------------------------------

/// Collects `$SwitchMap$...[E.C.ordinal()] = n` assignments from static initializers.
pub fn collect_switch_maps(class: &JavaClass, maps: &mut SwitchMaps) {
    for method in class.methods.iter().filter(|m| m.is_static_init()) {
        let Some(body) = &method.body else { continue };
        for_each_simple(&body.statements, &mut |stmt| {
            let Stmt::ArrayStore { array, index, value } = stmt else { return };
            let Expr::FieldGet { object: None, class_name, field_name, .. } = array else { return };
            if !field_name.starts_with("$SwitchMap$") {
                return;
            }
            let Some((constant, [])) = call_on(index, "ordinal") else { return };
            let Expr::FieldGet { object: None, class_name: enum_class, field_name: const_name, .. } = constant else {
                return;
            };
            if let Some(n) = value.int_value() {
                maps.entry((class_name.clone(), field_name.clone()))
                    .or_default()
                    .insert(n, (enum_class.clone(), const_name.clone()));
            }
        });
    }
    for inner in &class.inner_classes {
        collect_switch_maps(inner, maps);
    }
}

fn desugar_enum_switch(list: &mut [StructuredStmt], maps: &SwitchMaps) {
    for stmt in list.iter_mut() {
        let StructuredStmt::Switch { expr, cases, .. } = stmt else { continue };
        let Expr::ArrayLoad { array, index, .. } = expr else { continue };
        let Expr::FieldGet { object: None, class_name, field_name, .. } = array.as_ref() else { continue };
        let Some(map) = maps.get(&(class_name.clone(), field_name.clone())) else { continue };
        let Some((scrutinee, [])) = call_on(index, "ordinal") else { continue };

        let mut labels = Vec::with_capacity(cases.len());
        for case in cases.iter() {
            let mut values = Vec::with_capacity(case.values.len());
            for value in &case.values {
                let SwitchValue::Int(n) = value else { break };
                let Some((type_name, const_name)) = map.get(n) else { break };
                values.push(SwitchValue::Enum { type_name: type_name.clone(), const_name: const_name.clone() });
            }
            if values.len() != case.values.len() {
                break;
            }
            labels.push(values);
        }
        if labels.len() != cases.len() {
            continue;
        }
        let scrutinee = scrutinee.clone();
        for (case, values) in cases.iter_mut().zip(labels) {
            case.values = values;
        }
        *expr = scrutinee;
    }
}

// ----------------------------------------------------------------------------
// switch on String
// ----------------------------------------------------------------------------

/// Collects `if (s.equals("lit")) tmp = k;` chains from one `hashCode()` case body.
fn string_labels(body: &[StructuredStmt], s: &LocalVar, tmp: &LocalVar, out: &mut BTreeMap<i32, String>) -> bool {
    for stmt in body {
        match stmt {
            StructuredStmt::Break { label: None } => {}
            StructuredStmt::If { condition, then_body, else_body, .. } => {
                let Some((receiver, [Expr::StringLiteral(lit)])) = tested_call(condition).and_then(|c| call_on(c, "equals"))
                else {
                    return false;
                };
                if !matches!(receiver, Expr::LocalLoad(v) if v == s) {
                    return false;
                }
                let k = match then_body.as_slice() {
                    [assign] | [assign, StructuredStmt::Break { label: None }] => match stored(assign) {
                        Some((v, value)) if v == tmp => value.int_value(),
                        _ => None,
                    },
                    _ => None,
                };
                let Some(k) = k else { return false };
                out.insert(k, lit.clone());
                if let Some(else_body) = else_body {
                    if !string_labels(else_body, s, tmp, out) {
                        return false;
                    }
                }
            }
            _ => return false,
        }
    }
    true
}

fn desugar_string_switch(list: &mut Vec<StructuredStmt>) {
    let mut i = 0;
    while i + 3 < list.len() {
        if let Some(consumed) = fold_string_switch(list, i) {
            i += consumed;
        } else {
            i += 1;
        }
    }
}

/// Folds `s = x; tmp = -1; switch (s.hashCode()) {...} switch (tmp) {...}` starting at `i`.
/// Returns how far to advance on success.
fn fold_string_switch(list: &mut Vec<StructuredStmt>, i: usize) -> Option<usize> {
    let (s, source) = stored(&list[i]).map(|(v, e)| (v.clone(), e.clone()))?;
    if !s.ty.is_reference() {
        return None;
    }
    let (tmp, init) = stored(&list[i + 1])?;
    if init.int_value() != Some(-1) {
        return None;
    }
    let tmp = tmp.clone();
    let StructuredStmt::Switch { expr: hash_expr, cases: hash_cases, .. } = &list[i + 2] else { return None };
    // The copy has no declared type yet; the `String.hashCode()` owner identifies it.
    if !matches!(hash_expr, Expr::MethodCall { class_name, .. } if class_name == "java/lang/String") {
        return None;
    }
    let (receiver, []) = call_on(hash_expr, "hashCode")? else { return None };
    if !matches!(receiver, Expr::LocalLoad(v) if *v == s) {
        return None;
    }
    let mut labels = BTreeMap::new();
    for case in hash_cases {
        if !string_labels(&case.body, &s, &tmp, &mut labels) {
            return None;
        }
    }
    let StructuredStmt::Switch { expr: Expr::LocalLoad(index_var), cases, .. } = &list[i + 3] else { return None };
    if *index_var != tmp {
        return None;
    }
    let mut new_values = Vec::with_capacity(cases.len());
    for case in cases {
        let mut values = Vec::with_capacity(case.values.len());
        for value in &case.values {
            match value {
                SwitchValue::Int(k) => values.push(SwitchValue::String(labels.get(k)?.clone())),
                _ => return None,
            }
        }
        new_values.push(values);
    }

    if reads(&list[i + 4..], &tmp) {
        return None;
    }
    let keep_copy = reads(&list[i + 3..], &s);
    let StructuredStmt::Switch { loc, mut cases, .. } = list.remove(i + 3) else { return None };
    for (case, values) in cases.iter_mut().zip(new_values) {
        case.values = values;
    }
    let expr = if keep_copy { Expr::LocalLoad(s) } else { source };
    let folded = StructuredStmt::Switch { expr, loc, cases };
    if keep_copy {
        list.splice(i + 1..i + 3, std::iter::once(folded));
        Some(2)
    } else {
        list.splice(i..i + 3, std::iter::once(folded));
        Some(1)
    }
}

// ----------------------------------------------------------------------------
// for-each
// ----------------------------------------------------------------------------

/// Detect Iterator-based and array-index for-each patterns in a block:
/// ```java
/// Iterator it = coll.iterator();
/// while (it.hasNext()) { T x = (T) it.next(); ... }
///
/// T[] arr = expr; int len = arr.length; int i = 0;
/// while (i < len) { T x = arr[i]; ...; i++; }
/// ```
/// Rewrites both to ForEach.
fn desugar_foreach_in_block(stmts: &mut Vec<StructuredStmt>) {
    let mut i = 0;
    while i < stmts.len() {
        if i + 1 < stmts.len() && fold_iterator_loop(stmts, i) {
            i += 1;
            continue;
        }
        if i + 2 < stmts.len() && fold_array_loop(stmts, i) {
            i += 1;
            continue;
        }
        i += 1;
    }
}

/// Init, condition, body and update of a `while` or a `for` with a condition.
fn loop_parts(
    stmt: &StructuredStmt,
) -> Option<(&[StructuredStmt], &Expr, &[StructuredStmt], &[LocatedStmt], Location)> {
    match stmt {
        StructuredStmt::While { condition, body, loc } => Some((&[][..], condition, body.as_slice(), &[][..], *loc)),
        StructuredStmt::For { init, condition: Some(condition), update, body, loc } => {
            Some((init.as_slice(), condition, body.as_slice(), update.as_slice(), *loc))
        }
        _ => None,
    }
}

fn fold_iterator_loop(stmts: &mut Vec<StructuredStmt>, i: usize) -> bool {
    let Some((it, init)) = stored(&stmts[i]) else { return false };
    let Some((iterable, [])) = call_on(init, "iterator") else { return false };
    let Some((init, condition, body, update, loc)) = loop_parts(&stmts[i + 1]) else { return false };
    if !init.is_empty() || !update.is_empty() {
        return false;
    }
    let Some((receiver, [])) = tested_call(condition).and_then(|c| call_on(c, "hasNext")) else { return false };
    if !matches!(receiver, Expr::LocalLoad(v) if v == it) {
        return false;
    }
    let Some((var, first)) = body.first().and_then(stored) else { return false };
    let next = match first {
        Expr::Cast { operand, .. } => operand.as_ref(),
        other => other,
    };
    if !matches!(call_on(next, "next"), Some((Expr::LocalLoad(v), [])) if v == it) {
        return false;
    }
    if reads(&body[1..], it) || reads(&stmts[i + 2..], it) {
        return false;
    }
    let (mut var, iterable) = (var.clone(), iterable.clone());
    if let (None, Expr::Cast { target_type, .. }) = (var.origin, first) {
        var.ty = target_type.clone();
    }
    let body = body[1..].to_vec();
    let foreach = StructuredStmt::ForEach { var, iterable, loc, body };
    stmts.splice(i..i + 2, std::iter::once(foreach));
    true
}

fn zero_store(stmt: &StructuredStmt) -> Option<&LocalVar> {
    stored(stmt).filter(|(_, value)| value.int_value() == Some(0)).map(|(var, _)| var)
}

/// `arr = x; len = arr.length; i = 0; while (i < len) { v = arr[i]; ...; i++; }`, with the
/// index initialisation either standing alone or folded into a `for` header.
fn fold_array_loop(stmts: &mut Vec<StructuredStmt>, i: usize) -> bool {
    let Some((arr, array_expr)) = stored(&stmts[i]) else { return false };
    if !arr.ty.is_reference() {
        return false;
    }
    let Some((len, len_expr)) = stored(&stmts[i + 1]) else { return false };
    if !matches!(len_expr, Expr::ArrayLength { array } if matches!(array.as_ref(), Expr::LocalLoad(v) if v == arr)) {
        return false;
    }
    let (idx, consumed) = match loop_parts(&stmts[i + 2]) {
        Some(([init], ..)) => match zero_store(init) {
            Some(idx) => (idx, 3),
            None => return false,
        },
        _ => match zero_store(&stmts[i + 2]) {
            Some(idx) if i + 3 < stmts.len() => (idx, 4),
            _ => return false,
        },
    };
    let Some((init, condition, body, update, loc)) = loop_parts(&stmts[i + consumed - 1]) else { return false };
    if consumed == 4 && !init.is_empty() {
        return false;
    }
    let is_idx = |e: &Expr| matches!(e, Expr::LocalLoad(v) if v == idx);
    match condition {
        Expr::Compare { op: CompareOp::Lt, left, right }
            if is_idx(left) && matches!(right.as_ref(), Expr::LocalLoad(v) if v == len) => {}
        _ => return false,
    }
    let is_step = |s: &Stmt| matches!(s, Stmt::Iinc { var, amount: 1 } if var == idx);
    let body_end = match update {
        [u] if is_step(&u.stmt) => body.len(),
        [] if body.last().and_then(StructuredStmt::as_stmt).map_or(false, is_step) => body.len() - 1,
        _ => return false,
    };
    let Some((var, first)) = body.first().and_then(stored) else { return false };
    match first {
        Expr::ArrayLoad { array, index, .. }
            if matches!(array.as_ref(), Expr::LocalLoad(v) if v == arr) && is_idx(index) => {}
        _ => return false,
    }
    if body_end < 1 {
        return false;
    }
    let rest = &body[1..body_end];
    if [arr, len, idx].iter().any(|v| reads(rest, v) || reads(&stmts[i + consumed..], v)) {
        return false;
    }
    let foreach = StructuredStmt::ForEach {
        var: var.clone(),
        iterable: array_expr.clone(),
        loc,
        body: rest.to_vec(),
    };
    stmts.splice(i..i + consumed, std::iter::once(foreach));
    true
}

// ----------------------------------------------------------------------------
// assert
// ----------------------------------------------------------------------------

fn is_assertions_disabled(e: &Expr) -> bool {
    matches!(e, Expr::FieldGet { object: None, field_name, .. } if field_name == ASSERTIONS_DISABLED)
}

/// `!$assertionsDisabled` in the shapes the condition builder produces.
fn is_assertions_enabled(e: &Expr) -> bool {
    match e {
        Expr::Not(inner) => is_assertions_disabled(inner),
        Expr::Compare { op: CompareOp::Eq, left, right } => is_assertions_disabled(left) && right.int_value() == Some(0),
        _ => false,
    }
}

/// Message of a `throw new AssertionError(...)` body.
fn assertion_error(body: &[StructuredStmt]) -> Option<Option<Expr>> {
    match body {
        [StructuredStmt::Simple(LocatedStmt { stmt: Stmt::Throw(Expr::New { class_name, args, .. }), .. })]
            if class_name == "java/lang/AssertionError" && args.len() <= 1 =>
        {
            Some(args.first().cloned())
        }
        _ => None,
    }
}

/// Detect `if (!$assertionsDisabled && !cond) throw new AssertionError(msg)` pattern.
fn desugar_assert_in_block(stmts: &mut [StructuredStmt]) {
    for stmt in stmts.iter_mut() {
        let StructuredStmt::If { condition, then_body, else_body: None, loc } = stmt else { continue };
        let (failure, message) = match condition {
            Expr::Logical { and: true, left, right } if is_assertions_enabled(left) => {
                let Some(message) = assertion_error(then_body) else { continue };
                ((**right).clone(), message)
            }
            c if is_assertions_enabled(c) => match then_body.as_slice() {
                [StructuredStmt::If { condition: inner, then_body: throw, else_body: None, .. }] => {
                    let Some(message) = assertion_error(throw) else { continue };
                    (inner.clone(), message)
                }
                body => {
                    let Some(message) = assertion_error(body) else { continue };
                    (Expr::boolean(true), message)
                }
            },
            _ => continue,
        };
        *stmt = StructuredStmt::Assert { condition: failure.negate(), message, loc: *loc };
    }
}

// ----------------------------------------------------------------------------
// enum
// ----------------------------------------------------------------------------

/// Moves `NAME = new E("NAME", ordinal, args...)` out of `<clinit>` into the enum constant
/// list and strips the `super(name, ordinal)` call from constructors. A constant created
/// through its own subclass (`new E$1(...)`) takes that nested class along as its body.
fn recover_enum_constants(class: &mut JavaClass) {
    let this = class.internal_name.clone();
    let constant_fields: Vec<String> =
        class.fields.iter().filter(|f| f.is_enum_constant).map(|f| f.name.clone()).collect();
    let mut constants: Vec<(EnumConstant, String)> = Vec::new();

    for method in &mut class.methods {
        if let Some(body) = &mut method.body {
            if method.name == "<clinit>" {
                body.statements.retain(|stmt| {
                    let Some(Stmt::FieldStore { object: None, class_name, field_name, value, .. }) = stmt.as_stmt() else {
                        return true;
                    };
                    if *class_name != this {
                        return true;
                    }
                    if field_name == "$VALUES" {
                        return false;
                    }
                    let Expr::New { class_name: created, args, .. } = value else { return true };
                    match args.as_slice() {
                        [Expr::StringLiteral(name), ordinal, rest @ ..]
                            if name == field_name
                                && ordinal.int_value().is_some()
                                && constant_fields.contains(field_name) =>
                        {
                            let constant = EnumConstant { name: name.clone(), arguments: rest.to_vec(), body: None };
                            constants.push((constant, created.clone()));
                            false
                        }
                        _ => true,
                    }
                });
            } else if method.name == "<init>" {
                body.statements.retain(|stmt| {
                    !matches!(stmt.as_stmt(), Some(Stmt::ExprStmt(Expr::MethodCall {
                        kind: InvokeKind::Special, object: Some(o), class_name, method_name, ..
                    })) if **o == Expr::This && class_name == "java/lang/Enum" && method_name == "<init>")
                });
            }
        }
        if method.name == "<init>" {
            method.hidden_parameters = method.parameters.len().min(2);
        }
    }

    class.enum_constants = constants
        .into_iter()
        .map(|(mut constant, created)| {
            if created != this {
                if let Some(pos) = class.inner_classes.iter().position(|c| c.internal_name == created) {
                    let mut body = class.inner_classes.remove(pos);
                    // The subclass constructor only forwards to the enum's own.
                    body.methods.retain(|m| !m.is_constructor());
                    tracing::debug!(constant = %constant.name, class = %created, "enum constant has a class body");
                    constant.body = Some(Box::new(body));
                }
            }
            constant
        })
        .collect();
}

// ----------------------------------------------------------------------------
// autoboxing
// ----------------------------------------------------------------------------

/// Removes `Integer.valueOf(int)` boxing and `x.intValue()` unboxing calls.
fn desugar_autobox(expr: &mut Expr) {
    let unwrapped = match expr {
        Expr::MethodCall { kind: InvokeKind::Static, class_name, method_name, descriptor, args, .. }
            if method_name == "valueOf" && is_wrapper_class(class_name) && args.len() == 1 =>
        {
            let boxes_primitive = parse_method_descriptor(descriptor)
                .map_or(false, |(params, _)| matches!(params.as_slice(), [p] if !p.is_reference()));
            if boxes_primitive {
                args.pop()
            } else {
                None
            }
        }
        Expr::MethodCall { kind: InvokeKind::Virtual, object, class_name, method_name, args, .. }
            if is_unbox_method(method_name) && args.is_empty() && is_wrapper_class(class_name) =>
        {
            object.take().map(|o| *o)
        }
        _ => None,
    };
    if let Some(inner) = unwrapped {
        *expr = inner;
    }
}

fn is_wrapper_class(name: &str) -> bool {
    matches!(
        name,
        "java/lang/Integer"
            | "java/lang/Long"
            | "java/lang/Float"
            | "java/lang/Double"
            | "java/lang/Byte"
            | "java/lang/Short"
            | "java/lang/Character"
            | "java/lang/Boolean"
    )
}

fn is_unbox_method(name: &str) -> bool {
    matches!(
        name,
        "intValue"
            | "longValue"
            | "floatValue"
            | "doubleValue"
            | "byteValue"
            | "shortValue"
            | "charValue"
            | "booleanValue"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple(stmt: Stmt) -> StructuredStmt {
        StructuredStmt::simple(Location::at(0), stmt)
    }

    fn local(index: u16, ty: JvmType) -> LocalVar {
        LocalVar::new(index, ty)
    }

    fn call(object: Expr, name: &str, args: Vec<Expr>, ret: JvmType) -> Expr {
        Expr::MethodCall {
            kind: InvokeKind::Interface,
            object: Some(Box::new(object)),
            class_name: "java/util/Iterator".into(),
            method_name: name.into(),
            descriptor: "()Ljava/lang/Object;".into(),
            args,
            return_type: ret,
        }
    }

    #[test]
    fn iterator_loop_becomes_foreach() {
        let list = local(1, JvmType::Reference("java/util/List".into()));
        let it = local(2, JvmType::Reference("java/util/Iterator".into()));
        let item = local(3, JvmType::Reference("java/lang/String".into()));
        let mut body = StructuredBody::new(vec![
            simple(Stmt::LocalStore {
                var: it.clone(),
                value: call(Expr::LocalLoad(list.clone()), "iterator", vec![], it.ty.clone()),
            }),
            StructuredStmt::While {
                condition: Expr::Compare {
                    op: CompareOp::Ne,
                    left: Box::new(call(Expr::LocalLoad(it.clone()), "hasNext", vec![], JvmType::Boolean)),
                    right: Box::new(Expr::int(0)),
                },
                loc: Location::at(5),
                body: vec![
                    simple(Stmt::LocalStore {
                        var: item.clone(),
                        value: Expr::Cast {
                            target_type: item.ty.clone(),
                            operand: Box::new(call(Expr::LocalLoad(it.clone()), "next", vec![], JvmType::object())),
                        },
                    }),
                    simple(Stmt::ExprStmt(call(Expr::LocalLoad(item.clone()), "trim", vec![], item.ty.clone()))),
                ],
            },
        ]);
        desugar(&mut body, &SwitchMaps::new(), &DesugarOptions::default());
        match &body.statements[..] {
            [StructuredStmt::ForEach { var, iterable, body, .. }] => {
                assert_eq!(var.index, 3);
                assert_eq!(*iterable, Expr::LocalLoad(list));
                assert_eq!(body.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    fn string_call(object: &LocalVar, name: &str, descriptor: &str, args: Vec<Expr>, ret: JvmType) -> Expr {
        Expr::MethodCall {
            kind: InvokeKind::Virtual,
            object: Some(Box::new(Expr::LocalLoad(object.clone()))),
            class_name: "java/lang/String".into(),
            method_name: name.into(),
            descriptor: descriptor.into(),
            args,
            return_type: ret,
        }
    }

    fn store(var: &LocalVar, value: Expr) -> StructuredStmt {
        simple(Stmt::LocalStore { var: var.clone(), value })
    }

    #[test]
    fn string_switch_over_untyped_copy_folds() {
        // The copy javac makes of the scrutinee has no debug entry, so it is still `Object` here.
        let param = local(0, JvmType::Reference("java/lang/String".into()));
        let copy = local(2, JvmType::object());
        let index = local(3, JvmType::Int);
        let label = |lit: &str, k: i32| SwitchCase {
            values: vec![SwitchValue::Int(lit.chars().next().map_or(0, |c| c as i32))],
            is_default: false,
            body: vec![
                StructuredStmt::If {
                    condition: Expr::Compare {
                        op: CompareOp::Ne,
                        left: Box::new(string_call(
                            &copy,
                            "equals",
                            "(Ljava/lang/Object;)Z",
                            vec![Expr::StringLiteral(lit.into())],
                            JvmType::Boolean,
                        )),
                        right: Box::new(Expr::int(0)),
                    },
                    loc: Location::at(0),
                    then_body: vec![store(&index, Expr::int(k))],
                    else_body: None,
                },
                StructuredStmt::Break { label: None },
            ],
        };
        let arm = |k: i32, n: i32| SwitchCase {
            values: vec![SwitchValue::Int(k)],
            is_default: false,
            body: vec![simple(Stmt::Return(Some(Expr::int(n))))],
        };
        let mut body = StructuredBody::new(vec![
            store(&copy, Expr::LocalLoad(param.clone())),
            store(&index, Expr::int(-1)),
            StructuredStmt::Switch {
                expr: string_call(&copy, "hashCode", "()I", vec![], JvmType::Int),
                loc: Location::at(4),
                cases: vec![label("a", 0), label("b", 1)],
            },
            StructuredStmt::Switch {
                expr: Expr::LocalLoad(index.clone()),
                loc: Location::at(40),
                cases: vec![arm(0, 10), arm(1, 20)],
            },
            simple(Stmt::Return(Some(Expr::int(0)))),
        ]);
        desugar(&mut body, &SwitchMaps::new(), &DesugarOptions::default());
        match &body.statements[..] {
            [StructuredStmt::Switch { expr, cases, .. }, _] => {
                assert_eq!(*expr, Expr::LocalLoad(param));
                assert_eq!(cases[0].values, vec![SwitchValue::String("a".into())]);
                assert_eq!(cases[1].values, vec![SwitchValue::String("b".into())]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn indexed_for_over_array_copy_becomes_foreach() {
        let array = local(0, JvmType::Array(Box::new(JvmType::Int)));
        let total = local(1, JvmType::Int);
        let copy = local(2, JvmType::object());
        let len = local(3, JvmType::Int);
        let idx = local(4, JvmType::Int);
        let item = local(5, JvmType::Int);
        let mut body = StructuredBody::new(vec![
            store(&copy, Expr::LocalLoad(array.clone())),
            store(&len, Expr::ArrayLength { array: Box::new(Expr::LocalLoad(copy.clone())) }),
            StructuredStmt::For {
                init: vec![store(&idx, Expr::int(0))],
                condition: Some(Expr::Compare {
                    op: CompareOp::Lt,
                    left: Box::new(Expr::LocalLoad(idx.clone())),
                    right: Box::new(Expr::LocalLoad(len.clone())),
                }),
                loc: Location::at(9),
                update: vec![LocatedStmt::new(Location::at(20), Stmt::Iinc { var: idx.clone(), amount: 1 })],
                body: vec![
                    store(
                        &item,
                        Expr::ArrayLoad {
                            array: Box::new(Expr::LocalLoad(copy.clone())),
                            index: Box::new(Expr::LocalLoad(idx.clone())),
                            element_type: JvmType::Int,
                        },
                    ),
                    store(
                        &total,
                        Expr::BinaryOp {
                            op: BinOp::Add,
                            left: Box::new(Expr::LocalLoad(total.clone())),
                            right: Box::new(Expr::LocalLoad(item.clone())),
                        },
                    ),
                ],
            },
            simple(Stmt::Return(Some(Expr::LocalLoad(total.clone())))),
        ]);
        desugar(&mut body, &SwitchMaps::new(), &DesugarOptions::default());
        match &body.statements[..] {
            [StructuredStmt::ForEach { var, iterable, body, .. }, _] => {
                assert_eq!(var.index, 5);
                assert_eq!(*iterable, Expr::LocalLoad(array));
                assert_eq!(body.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn assertion_guard_becomes_assert() {
        let flag = Expr::FieldGet {
            object: None,
            class_name: "Demo".into(),
            field_name: ASSERTIONS_DISABLED.into(),
            field_type: JvmType::Boolean,
        };
        let x = Expr::LocalLoad(local(0, JvmType::Int));
        let failing = Expr::Compare { op: CompareOp::Le, left: Box::new(x.clone()), right: Box::new(Expr::int(0)) };
        let mut body = StructuredBody::new(vec![StructuredStmt::If {
            condition: Expr::Logical {
                and: true,
                left: Box::new(Expr::Compare { op: CompareOp::Eq, left: Box::new(flag), right: Box::new(Expr::int(0)) }),
                right: Box::new(failing),
            },
            loc: Location::at(0),
            then_body: vec![simple(Stmt::Throw(Expr::New {
                class_name: "java/lang/AssertionError".into(),
                constructor_descriptor: "(Ljava/lang/Object;)V".into(),
                args: vec![Expr::StringLiteral("positive".into())],
            }))],
            else_body: None,
        }]);
        desugar(&mut body, &SwitchMaps::new(), &DesugarOptions::default());
        match &body.statements[..] {
            [StructuredStmt::Assert { condition: Expr::Compare { op: CompareOp::Gt, .. }, message: Some(Expr::StringLiteral(m)), .. }] => {
                assert_eq!(m, "positive")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn enum_switch_uses_switch_map_labels() {
        let mut maps = SwitchMaps::new();
        maps.entry(("Demo$1".into(), "$SwitchMap$Color".into()))
            .or_default()
            .extend([(1, ("Color".to_string(), "RED".to_string())), (2, ("Color".to_string(), "GREEN".to_string()))]);
        let color = Expr::LocalLoad(local(1, JvmType::Reference("Color".into())));
        let mut body = StructuredBody::new(vec![StructuredStmt::Switch {
            expr: Expr::ArrayLoad {
                array: Box::new(Expr::FieldGet {
                    object: None,
                    class_name: "Demo$1".into(),
                    field_name: "$SwitchMap$Color".into(),
                    field_type: JvmType::Array(Box::new(JvmType::Int)),
                }),
                index: Box::new(Expr::MethodCall {
                    kind: InvokeKind::Virtual,
                    object: Some(Box::new(color.clone())),
                    class_name: "Color".into(),
                    method_name: "ordinal".into(),
                    descriptor: "()I".into(),
                    args: vec![],
                    return_type: JvmType::Int,
                }),
                element_type: JvmType::Int,
            },
            loc: Location::at(0),
            cases: vec![
                SwitchCase { values: vec![SwitchValue::Int(2)], is_default: false, body: vec![] },
                SwitchCase { values: vec![SwitchValue::Int(1)], is_default: false, body: vec![] },
            ],
        }]);
        desugar(&mut body, &maps, &DesugarOptions::default());
        let StructuredStmt::Switch { expr, cases, .. } = &body.statements[0] else { panic!("switch expected") };
        assert_eq!(*expr, color);
        assert_eq!(
            cases[0].values,
            vec![SwitchValue::Enum { type_name: "Color".into(), const_name: "GREEN".into() }]
        );
    }

    #[test]
    fn boxing_calls_are_removed() {
        let mut e = Expr::MethodCall {
            kind: InvokeKind::Static,
            object: None,
            class_name: "java/lang/Integer".into(),
            method_name: "valueOf".into(),
            descriptor: "(I)Ljava/lang/Integer;".into(),
            args: vec![Expr::int(7)],
            return_type: JvmType::Reference("java/lang/Integer".into()),
        };
        desugar_autobox(&mut e);
        assert_eq!(e.int_value(), Some(7));

        let mut parse = Expr::MethodCall {
            kind: InvokeKind::Static,
            object: None,
            class_name: "java/lang/Integer".into(),
            method_name: "valueOf".into(),
            descriptor: "(Ljava/lang/String;)Ljava/lang/Integer;".into(),
            args: vec![Expr::StringLiteral("7".into())],
            return_type: JvmType::Reference("java/lang/Integer".into()),
        };
        let before = parse.clone();
        desugar_autobox(&mut parse);
        assert_eq!(parse, before);
    }
}
