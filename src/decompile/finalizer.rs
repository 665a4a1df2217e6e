//! Final tree rewrites, run once types are settled.
//!
//! 1. Local declarations: every local is declared at the innermost statement list enclosing all
//!    of its accesses, folding into the first direct store when there is one.
//! 2. Field initializers: leading static stores of `<clinit>`, and leading instance stores shared
//!    by every `super(...)` constructor, move onto the field declarations.
//! 3. Member cleanup: compiler-provided members and calls are dropped and adjacent bare
//!    declarations of one type are merged.
//!
//! Each pass relies on the output of the previous one.

use std::collections::BTreeSet;

use super::accessors::AccessorTable;
use super::descriptor::parse_method_descriptor;
use super::expr::*;
use super::java_ast::*;
use super::structured_types::*;

const ASSERTIONS_DISABLED: &str = "$assertionsDisabled";

/// Runs the three finalizer passes over `class` and its nested classes.
pub fn finalize_class(class: &mut JavaClass, accessors: &AccessorTable, include_synthetic: bool) {
    for method in &mut class.methods {
        declare_locals(method);
    }
    merge_field_initializers(class);
    remove_compiler_members(class, accessors, include_synthetic);
    tracing::debug!(
        class = %class.internal_name,
        methods = class.methods.len(),
        fields = class.fields.len(),
        "finalized class"
    );
    for inner in class.nested_classes_mut() {
        finalize_class(inner, accessors, include_synthetic);
    }
}

// ============================================================================
// Pass 1: local declarations
// ============================================================================

fn first_local_slot(method: &JavaMethod) -> u16 {
    let params = parse_method_descriptor(&method.descriptor).map_or(Vec::new(), |(p, _)| p);
    let receiver = if method.is_static { 0 } else { 1 };
    params.iter().fold(receiver, |slot, ty| slot + if ty.is_wide() { 2 } else { 1 })
}

fn declare_locals(method: &mut JavaMethod) {
    let first_local = first_local_slot(method);
    let Some(body) = method.body.as_mut() else { return };
    let statements = &mut body.statements;

    transform_exprs(statements, &mut simplify_boolean_ternary);
    walk_bodies_mut(statements, &mut form_for_loops);

    let mut order: Vec<LocalVar> = Vec::new();
    let mut seen: BTreeSet<VarKey> = BTreeSet::new();
    walk_vars_mut(statements, &mut |var| {
        let key = var.key();
        let is_parameter =
            key.index < first_local && key.web.is_none() && key.origin.map_or(true, |start| start == 0);
        if is_parameter || var.index == u16::MAX {
            return;
        }
        if seen.insert(key) {
            order.push(var.clone());
        }
    });
    for template in &order {
        place_declaration(statements, template.key(), template);
    }
}

/// `c ? true : false` is `c`.
fn simplify_boolean_ternary(expr: &mut Expr) {
    let Expr::Ternary { condition, then_expr, else_expr } = expr else { return };
    let (
        Expr::IntLiteral { value: when_true, flags: true_flags },
        Expr::IntLiteral { value: when_false, flags: false_flags },
    ) = (&**then_expr, &**else_expr)
    else {
        return;
    };
    if !true_flags.is_boolean() || !false_flags.is_boolean() {
        return;
    }
    let replacement = match (*when_true, *when_false) {
        (1, 0) => std::mem::replace(&mut **condition, Expr::NullLiteral),
        (0, 1) => std::mem::replace(&mut **condition, Expr::NullLiteral).negate(),
        _ => return,
    };
    *expr = replacement;
}

fn expr_mentions(expr: &Expr, key: VarKey) -> bool {
    let mut found = false;
    expr.visit(&mut |e| {
        if let Expr::LocalLoad(v) = e {
            found |= v.key() == key;
        }
    });
    found
}

fn stmt_binds(stmt: &Stmt, key: VarKey) -> bool {
    match stmt {
        Stmt::LocalStore { var, .. } | Stmt::Iinc { var, .. } => var.key() == key,
        Stmt::Declare { vars } => vars.iter().any(|(v, _)| v.key() == key),
        _ => false,
    }
}

/// Accesses owned by the statement itself rather than by a nested list.
fn own_mentions(stmt: &StructuredStmt, key: VarKey) -> bool {
    let mut found = false;
    stmt.for_each_own_expr(&mut |e| found |= expr_mentions(e, key));
    found
        || match stmt {
            StructuredStmt::Simple(s) => stmt_binds(&s.stmt, key),
            StructuredStmt::For { update, .. } => update.iter().any(|u| stmt_binds(&u.stmt, key)),
            StructuredStmt::Labeled { body, .. } => own_mentions(body, key),
            _ => false,
        }
}

fn declares_in_init(init: &[StructuredStmt], key: VarKey) -> bool {
    init.iter()
        .any(|s| matches!(s.as_stmt(), Some(Stmt::Declare { vars }) if vars.iter().any(|(v, _)| v.key() == key)))
}

/// Accesses of `key` that belong to the enclosing scope. Variables bound by a
/// for-each, a catch clause or a for-init declaration are scoped to that construct.
fn mentions(stmt: &StructuredStmt, key: VarKey) -> bool {
    match stmt {
        StructuredStmt::ForEach { var, iterable, .. } if var.key() == key => expr_mentions(iterable, key),
        StructuredStmt::For { init, .. } if declares_in_init(init, key) => false,
        StructuredStmt::TryCatch { try_body, catches, finally_body } => {
            list_mentions(try_body, key)
                || catches.iter().any(|c| c.var.key() != key && list_mentions(&c.body, key))
                || finally_body.as_ref().map_or(false, |b| list_mentions(b, key))
        }
        StructuredStmt::Labeled { body, .. } => mentions(body, key),
        _ => {
            if own_mentions(stmt, key) {
                return true;
            }
            let mut found = false;
            stmt.for_each_body(&mut |b| found |= list_mentions(b, key));
            found
        }
    }
}

fn list_mentions(list: &[StructuredStmt], key: VarKey) -> bool {
    list.iter().any(|s| mentions(s, key))
}

fn for_init_store(stmt: &StructuredStmt, key: VarKey) -> bool {
    match stmt {
        StructuredStmt::For { init, .. } => {
            matches!(init.first().and_then(StructuredStmt::as_stmt), Some(Stmt::LocalStore { var, .. }) if var.key() == key)
        }
        _ => false,
    }
}

/// Turns the first statement of `list` into a declaration when it is a direct store of `key`.
fn declare_at_store(list: &mut [StructuredStmt], index: usize, key: VarKey) -> bool {
    let Some(StructuredStmt::Simple(located)) = list.get_mut(index) else { return false };
    let Stmt::LocalStore { var, value } = &mut located.stmt else { return false };
    if var.key() != key {
        return false;
    }
    let var = var.clone();
    let value = std::mem::replace(value, Expr::NullLiteral);
    located.stmt = Stmt::Declare { vars: vec![(var, Some(value))] };
    true
}

fn place_declaration(list: &mut Vec<StructuredStmt>, key: VarKey, template: &LocalVar) {
    let hits: Vec<usize> = (0..list.len()).filter(|&i| mentions(&list[i], key)).collect();
    let Some(&first) = hits.first() else { return };

    if hits.iter().all(|&i| for_init_store(&list[i], key)) {
        for &i in &hits {
            if let StructuredStmt::For { init, .. } = &mut list[i] {
                declare_at_store(init, 0, key);
            }
        }
        return;
    }

    if hits.len() == 1 && !own_mentions(&list[first], key) {
        let mut nested = 0;
        list[first].for_each_body(&mut |b| {
            if list_mentions(b, key) {
                nested += 1;
            }
        });
        if nested == 1 {
            list[first].for_each_body_mut(&mut |b| {
                if list_mentions(b, key) {
                    place_declaration(b, key, template);
                }
            });
            return;
        }
    }

    if !declare_at_store(list, first, key) {
        let declaration = Stmt::Declare { vars: vec![(template.clone(), None)] };
        list.insert(first, StructuredStmt::simple(Location::default(), declaration));
    }
}

fn is_update_of(stmt: &Stmt, var: &LocalVar) -> bool {
    match stmt {
        Stmt::Iinc { var: v, .. } => v.key() == var.key(),
        Stmt::LocalStore { var: v, value } => v.key() == var.key() && value.reads_local(var),
        _ => false,
    }
}

/// An unlabeled `continue` that would target the enclosing loop.
fn continues_loop(stmt: &StructuredStmt) -> bool {
    match stmt {
        StructuredStmt::Continue { label: None } => true,
        StructuredStmt::While { .. }
        | StructuredStmt::DoWhile { .. }
        | StructuredStmt::For { .. }
        | StructuredStmt::ForEach { .. } => false,
        StructuredStmt::Labeled { body, .. } => continues_loop(body),
        _ => {
            let mut found = false;
            stmt.for_each_body(&mut |b| found |= b.iter().any(continues_loop));
            found
        }
    }
}

/// `i = a; while (c(i)) { ...; i++; }` becomes `for (i = a; c(i); i++) { ... }` when `i` is
/// not used after the loop.
fn form_for_loops(list: &mut Vec<StructuredStmt>) {
    let mut i = 1;
    while i < list.len() {
        if fold_for_loop(list, i) {
            continue;
        }
        i += 1;
    }
}

fn fold_for_loop(list: &mut Vec<StructuredStmt>, at: usize) -> bool {
    let Some(Stmt::LocalStore { var, .. }) = list[at - 1].as_stmt() else { return false };
    let var = var.clone();
    if list[at + 1..].iter().any(|s| mentions(s, var.key())) {
        return false;
    }
    let fits = match &list[at] {
        StructuredStmt::While { condition, body, .. } => {
            condition.reads_local(&var)
                && body.last().and_then(StructuredStmt::as_stmt).map_or(false, |u| is_update_of(u, &var))
                && !body[..body.len() - 1].iter().any(continues_loop)
        }
        StructuredStmt::For { init, condition: Some(condition), update, .. } => {
            init.is_empty() && condition.reads_local(&var) && update.iter().any(|u| is_update_of(&u.stmt, &var))
        }
        _ => false,
    };
    if !fits {
        return false;
    }
    let init = list.remove(at - 1);
    let target = &mut list[at - 1];
    match target {
        StructuredStmt::While { condition, loc, body } => {
            let loc = *loc;
            let condition = std::mem::replace(condition, Expr::NullLiteral);
            let mut body = std::mem::take(body);
            let update = match body.pop() {
                Some(StructuredStmt::Simple(u)) => vec![u],
                Some(other) => {
                    body.push(other);
                    Vec::new()
                }
                None => Vec::new(),
            };
            *target = StructuredStmt::For { init: vec![init], condition: Some(condition), loc, update, body };
        }
        StructuredStmt::For { init: for_init, .. } => for_init.push(init),
        _ => {}
    }
    true
}

// ============================================================================
// Pass 2: field initializers
// ============================================================================

fn reads_locals(expr: &Expr) -> bool {
    let mut found = false;
    expr.visit(&mut |e| found |= matches!(e, Expr::LocalLoad(_) | Expr::Unresolved(_)));
    found
}

/// Position of the first `super(...)`/`this(...)` call, and whether it delegates to `this`.
fn constructor_call(body: &[StructuredStmt], internal_name: &str) -> Option<(usize, bool)> {
    body.iter().enumerate().find_map(|(i, s)| match s.as_stmt() {
        Some(Stmt::ExprStmt(Expr::MethodCall { kind: InvokeKind::Special, object: Some(object), method_name, class_name, .. }))
            if **object == Expr::This && method_name == "<init>" =>
        {
            Some((i, class_name == internal_name))
        }
        _ => None,
    })
}

fn merge_field_initializers(class: &mut JavaClass) {
    let JavaClass { internal_name, fields, methods, .. } = class;

    if let Some(body) = methods
        .iter_mut()
        .find(|m| m.is_static_init() && m.failure.is_none())
        .and_then(|m| m.body.as_mut())
    {
        let mut taken = 0;
        for stmt in &body.statements {
            let Some(Stmt::FieldStore { object: None, class_name, field_name, value, .. }) = stmt.as_stmt() else {
                break;
            };
            if class_name != internal_name.as_str() || reads_locals(value) {
                break;
            }
            let Some(field) = fields
                .iter_mut()
                .find(|f| f.is_static && !f.is_enum_constant && f.initializer.is_none() && &f.name == field_name)
            else {
                break;
            };
            field.initializer = Some(value.clone());
            taken += 1;
        }
        body.statements.drain(..taken);
    }

    let constructors: Vec<&JavaMethod> = methods.iter().filter(|m| m.is_constructor()).collect();
    if constructors.is_empty() || constructors.iter().any(|m| m.failure.is_some() || m.body.is_none()) {
        return;
    }
    let mut prefixes: Vec<(usize, usize)> = Vec::new();
    for (index, method) in methods.iter().enumerate() {
        if !method.is_constructor() {
            continue;
        }
        let Some(body) = &method.body else { continue };
        let Some((call, delegates)) = constructor_call(&body.statements, internal_name) else { return };
        if delegates {
            continue;
        }
        prefixes.push((index, call + 1));
    }
    let Some(&(first_index, first_start)) = prefixes.first() else { return };
    let Some(reference) = methods[first_index].body.as_ref().map(|b| &b.statements[first_start..]) else {
        return;
    };

    let mut common = 0;
    for stmt in reference {
        let Some(Stmt::FieldStore { object: Some(Expr::This), class_name, field_name, value, .. }) = stmt.as_stmt() else {
            break;
        };
        let eligible = class_name == internal_name.as_str()
            && !reads_locals(value)
            && fields
                .iter()
                .any(|f| !f.is_static && !f.is_synthetic && f.initializer.is_none() && &f.name == field_name);
        let shared = prefixes.iter().all(|&(index, start)| {
            methods[index].body.as_ref().and_then(|b| b.statements.get(start + common)) == Some(stmt)
        });
        if !eligible || !shared {
            break;
        }
        common += 1;
    }
    if common == 0 {
        return;
    }

    let moved: Vec<Stmt> = reference[..common].iter().filter_map(|s| s.as_stmt().cloned()).collect();
    for stmt in moved {
        if let Stmt::FieldStore { field_name, value, .. } = stmt {
            if let Some(field) = fields.iter_mut().find(|f| !f.is_static && f.name == field_name && f.initializer.is_none()) {
                field.initializer = Some(value);
            }
        }
    }
    for &(index, start) in &prefixes {
        if let Some(body) = methods[index].body.as_mut() {
            body.statements.drain(start..start + common);
        }
    }
}

// ============================================================================
// Pass 3: member cleanup
// ============================================================================

fn stores_field(stmt: &StructuredStmt, names: &BTreeSet<&str>) -> bool {
    matches!(
        stmt.as_stmt(),
        Some(Stmt::FieldStore { field_name, .. }) if names.contains(field_name.as_str())
    )
}

fn reads_field(class: &JavaClass, name: &str) -> bool {
    let mut found = false;
    for method in &class.methods {
        if let Some(body) = &method.body {
            visit_exprs(&body.statements, &mut |e| {
                found |= matches!(e, Expr::FieldGet { field_name, .. } if field_name == name);
            });
        }
    }
    found
}

fn drop_implicit_super(body: &mut Vec<StructuredStmt>, internal_name: &str) {
    let Some((call, false)) = constructor_call(body, internal_name) else { return };
    if matches!(body[call].as_stmt(), Some(Stmt::ExprStmt(Expr::MethodCall { args, .. })) if args.is_empty()) {
        body.remove(call);
    }
}

fn merge_declarations(list: &mut Vec<StructuredStmt>) {
    fn bare(vars: &[(LocalVar, Option<Expr>)]) -> Option<&LocalVar> {
        if vars.iter().all(|(_, init)| init.is_none()) {
            vars.first().map(|(v, _)| v)
        } else {
            None
        }
    }

    let mut i = 1;
    while i < list.len() {
        let mergeable = match (list[i - 1].as_stmt(), list[i].as_stmt()) {
            (Some(Stmt::Declare { vars: a }), Some(Stmt::Declare { vars: b })) => match (bare(a), bare(b)) {
                (Some(x), Some(y)) => x.ty == y.ty && x.signature == y.signature,
                _ => false,
            },
            _ => false,
        };
        if !mergeable {
            i += 1;
            continue;
        }
        if let StructuredStmt::Simple(LocatedStmt { stmt: Stmt::Declare { vars: extra }, .. }) = list.remove(i) {
            if let StructuredStmt::Simple(LocatedStmt { stmt: Stmt::Declare { vars }, .. }) = &mut list[i - 1] {
                vars.extend(extra);
            }
        }
    }
}

fn is_enum_support(method: &JavaMethod, internal_name: &str, include_synthetic: bool) -> bool {
    let own = format!("L{};", internal_name);
    match method.name.as_str() {
        "values" => method.descriptor == format!("()[{}", own),
        "valueOf" => method.descriptor == format!("(Ljava/lang/String;){}", own),
        "$values" => !include_synthetic,
        _ => false,
    }
}

fn is_default_constructor(method: &JavaMethod, class: &JavaClass) -> bool {
    let visible_params = method.parameters.len().saturating_sub(method.hidden_parameters);
    method.is_constructor()
        && method.failure.is_none()
        && visible_params == 0
        && method.throws.is_empty()
        && method.annotations.is_empty()
        && method.body.as_ref().map_or(false, |b| b.statements.is_empty())
        && (class.kind == ClassKind::Enum || method.visibility == class.visibility)
}

fn remove_compiler_members(class: &mut JavaClass, accessors: &AccessorTable, include_synthetic: bool) {
    let internal_name = class.internal_name.clone();
    let drop_assertion_flag = !reads_field(class, ASSERTIONS_DISABLED);
    let synthetic_fields: Vec<String> = class.fields.iter().filter(|f| f.is_synthetic).map(|f| f.name.clone()).collect();
    let synthetic_fields: BTreeSet<&str> = synthetic_fields.iter().map(String::as_str).collect();
    let assertion_flag: BTreeSet<&str> = [ASSERTIONS_DISABLED].into_iter().collect();

    for method in &mut class.methods {
        let is_constructor = method.is_constructor();
        let is_static_init = method.is_static_init();
        let Some(body) = method.body.as_mut() else { continue };
        if is_constructor {
            if !include_synthetic {
                body.statements.retain(|s| !stores_field(s, &synthetic_fields));
            }
            drop_implicit_super(&mut body.statements, &internal_name);
        }
        if is_static_init && drop_assertion_flag {
            body.statements.retain(|s| !stores_field(s, &assertion_flag));
        }
        walk_bodies_mut(&mut body.statements, &mut merge_declarations);
    }

    if drop_assertion_flag {
        class.fields.retain(|f| f.name != ASSERTIONS_DISABLED);
    }
    if class.kind == ClassKind::Enum && !include_synthetic {
        class.fields.retain(|f| !(f.is_synthetic && f.name == "$VALUES"));
    }

    let constructors = class.methods.iter().filter(|m| m.is_constructor()).count();
    let lone_default = class
        .methods
        .iter()
        .position(|m| constructors == 1 && is_default_constructor(m, class));
    let before = class.methods.len();
    let mut index = 0;
    let is_enum = class.kind == ClassKind::Enum;
    class.methods.retain(|m| {
        let keep = Some(index) != lone_default
            && !(m.is_static_init() && m.failure.is_none() && m.body.as_ref().map_or(false, |b| b.statements.is_empty()))
            && !accessors.is_consumed(&internal_name, &m.name, &m.descriptor)
            && !(is_enum && is_enum_support(m, &internal_name, include_synthetic));
        index += 1;
        keep
    });
    if class.methods.len() != before {
        tracing::debug!(class = %internal_name, removed = before - class.methods.len(), "dropped compiler-provided methods");
    }

    // A call the eliminator could not rewrite needs the declaration it refers to.
    for method in class.methods.iter_mut().filter(|m| m.is_synthetic) {
        if accessors.is_still_called(&internal_name, &method.name, &method.descriptor) {
            method.is_synthetic = false;
        }
    }
}
