use super::expr::{Expr, LocalVar, LocatedStmt, Location, Stmt};

/// A structured statement produced by control flow structuring.
/// Represents Java-level control flow constructs.
#[derive(Clone, Debug, PartialEq)]
pub enum StructuredStmt {
    /// A simple statement (from stack simulation).
    Simple(LocatedStmt),
    /// A nested `{ ... }` block.
    Block(Vec<StructuredStmt>),
    /// if / if-else
    If {
        condition: Expr,
        loc: Location,
        then_body: Vec<StructuredStmt>,
        else_body: Option<Vec<StructuredStmt>>,
    },
    /// while loop
    While {
        condition: Expr,
        loc: Location,
        body: Vec<StructuredStmt>,
    },
    /// do-while loop
    DoWhile {
        body: Vec<StructuredStmt>,
        condition: Expr,
        loc: Location,
    },
    /// for loop
    For {
        init: Vec<StructuredStmt>,
        condition: Option<Expr>,
        loc: Location,
        update: Vec<LocatedStmt>,
        body: Vec<StructuredStmt>,
    },
    /// for-each loop (desugared from iterator or array index pattern)
    ForEach {
        var: LocalVar,
        iterable: Expr,
        loc: Location,
        body: Vec<StructuredStmt>,
    },
    /// switch statement; cases appear in bytecode order
    Switch {
        expr: Expr,
        loc: Location,
        cases: Vec<SwitchCase>,
    },
    /// try-catch-finally
    TryCatch {
        try_body: Vec<StructuredStmt>,
        catches: Vec<CatchClause>,
        finally_body: Option<Vec<StructuredStmt>>,
    },
    /// synchronized block
    Synchronized {
        object: Expr,
        loc: Location,
        body: Vec<StructuredStmt>,
    },
    /// Labeled statement (for break/continue targets)
    Labeled {
        label: String,
        body: Box<StructuredStmt>,
    },
    /// break statement
    Break { label: Option<String> },
    /// continue statement
    Continue { label: Option<String> },
    /// assert statement (desugared)
    Assert {
        condition: Expr,
        message: Option<Expr>,
        loc: Location,
    },
    /// Comment (used for error recovery, bytecode fallback, etc.)
    Comment(String),
}

impl StructuredStmt {
    pub fn simple(loc: Location, stmt: Stmt) -> Self {
        StructuredStmt::Simple(LocatedStmt::new(loc, stmt))
    }

    /// The inner statement when this is a plain statement.
    pub fn as_stmt(&self) -> Option<&Stmt> {
        match self {
            StructuredStmt::Simple(s) => Some(&s.stmt),
            _ => None,
        }
    }

    /// Control cannot fall out of the end of this statement.
    pub fn is_jump(&self) -> bool {
        match self {
            StructuredStmt::Simple(s) => s.stmt.is_exit(),
            StructuredStmt::Break { .. } | StructuredStmt::Continue { .. } => true,
            StructuredStmt::Block(body) => body.last().map_or(false, |s| s.is_jump()),
            StructuredStmt::If { then_body, else_body: Some(else_body), .. } => {
                ends_with_jump(then_body) && ends_with_jump(else_body)
            }
            _ => false,
        }
    }

    /// Mutable access to every statement list nested directly inside this one.
    pub fn for_each_body_mut(&mut self, f: &mut dyn FnMut(&mut Vec<StructuredStmt>)) {
        match self {
            StructuredStmt::Block(body)
            | StructuredStmt::While { body, .. }
            | StructuredStmt::DoWhile { body, .. }
            | StructuredStmt::ForEach { body, .. }
            | StructuredStmt::Synchronized { body, .. } => f(body),
            StructuredStmt::For { init, body, .. } => {
                f(init);
                f(body);
            }
            StructuredStmt::If { then_body, else_body, .. } => {
                f(then_body);
                if let Some(e) = else_body {
                    f(e);
                }
            }
            StructuredStmt::Switch { cases, .. } => {
                for case in cases {
                    f(&mut case.body);
                }
            }
            StructuredStmt::TryCatch { try_body, catches, finally_body } => {
                f(try_body);
                for c in catches {
                    f(&mut c.body);
                }
                if let Some(fb) = finally_body {
                    f(fb);
                }
            }
            StructuredStmt::Labeled { body, .. } => body.for_each_body_mut(f),
            StructuredStmt::Simple(_)
            | StructuredStmt::Break { .. }
            | StructuredStmt::Continue { .. }
            | StructuredStmt::Assert { .. }
            | StructuredStmt::Comment(_) => {}
        }
    }

    pub fn for_each_body(&self, f: &mut dyn FnMut(&Vec<StructuredStmt>)) {
        match self {
            StructuredStmt::Block(body)
            | StructuredStmt::While { body, .. }
            | StructuredStmt::DoWhile { body, .. }
            | StructuredStmt::ForEach { body, .. }
            | StructuredStmt::Synchronized { body, .. } => f(body),
            StructuredStmt::For { init, body, .. } => {
                f(init);
                f(body);
            }
            StructuredStmt::If { then_body, else_body, .. } => {
                f(then_body);
                if let Some(e) = else_body {
                    f(e);
                }
            }
            StructuredStmt::Switch { cases, .. } => {
                for case in cases {
                    f(&case.body);
                }
            }
            StructuredStmt::TryCatch { try_body, catches, finally_body } => {
                f(try_body);
                for c in catches {
                    f(&c.body);
                }
                if let Some(fb) = finally_body {
                    f(fb);
                }
            }
            StructuredStmt::Labeled { body, .. } => body.for_each_body(f),
            StructuredStmt::Simple(_)
            | StructuredStmt::Break { .. }
            | StructuredStmt::Continue { .. }
            | StructuredStmt::Assert { .. }
            | StructuredStmt::Comment(_) => {}
        }
    }

    /// Expressions owned by this node itself (not by nested statement lists).
    pub fn for_each_own_expr_mut(&mut self, f: &mut dyn FnMut(&mut Expr)) {
        match self {
            StructuredStmt::Simple(s) => s.stmt.for_each_expr_mut(f),
            StructuredStmt::If { condition, .. }
            | StructuredStmt::While { condition, .. }
            | StructuredStmt::DoWhile { condition, .. } => f(condition),
            StructuredStmt::For { condition, update, .. } => {
                if let Some(c) = condition {
                    f(c);
                }
                for u in update {
                    u.stmt.for_each_expr_mut(f);
                }
            }
            StructuredStmt::ForEach { iterable, .. } => f(iterable),
            StructuredStmt::Switch { expr, .. } => f(expr),
            StructuredStmt::Synchronized { object, .. } => f(object),
            StructuredStmt::Assert { condition, message, .. } => {
                f(condition);
                if let Some(m) = message {
                    f(m);
                }
            }
            StructuredStmt::Labeled { body, .. } => body.for_each_own_expr_mut(f),
            _ => {}
        }
    }

    pub fn for_each_own_expr(&self, f: &mut dyn FnMut(&Expr)) {
        match self {
            StructuredStmt::Simple(s) => s.stmt.for_each_expr(f),
            StructuredStmt::If { condition, .. }
            | StructuredStmt::While { condition, .. }
            | StructuredStmt::DoWhile { condition, .. } => f(condition),
            StructuredStmt::For { condition, update, .. } => {
                if let Some(c) = condition {
                    f(c);
                }
                for u in update {
                    u.stmt.for_each_expr(f);
                }
            }
            StructuredStmt::ForEach { iterable, .. } => f(iterable),
            StructuredStmt::Switch { expr, .. } => f(expr),
            StructuredStmt::Synchronized { object, .. } => f(object),
            StructuredStmt::Assert { condition, message, .. } => {
                f(condition);
                if let Some(m) = message {
                    f(m);
                }
            }
            StructuredStmt::Labeled { body, .. } => body.for_each_own_expr(f),
            _ => {}
        }
    }

    /// Variables bound by this node itself: store targets and construct variables.
    fn for_each_own_var_mut(&mut self, f: &mut dyn FnMut(&mut LocalVar)) {
        match self {
            StructuredStmt::Simple(s) => s.stmt.for_each_var_mut(f),
            StructuredStmt::For { update, .. } => {
                for u in update {
                    u.stmt.for_each_var_mut(f);
                }
            }
            StructuredStmt::ForEach { var, .. } => f(var),
            StructuredStmt::TryCatch { catches, .. } => {
                for c in catches {
                    f(&mut c.var);
                }
            }
            StructuredStmt::Labeled { body, .. } => body.for_each_own_var_mut(f),
            _ => {}
        }
    }

    fn for_each_own_var(&self, f: &mut dyn FnMut(&LocalVar)) {
        match self {
            StructuredStmt::Simple(s) => s.stmt.for_each_var(f),
            StructuredStmt::For { update, .. } => {
                for u in update {
                    u.stmt.for_each_var(f);
                }
            }
            StructuredStmt::ForEach { var, .. } => f(var),
            StructuredStmt::TryCatch { catches, .. } => {
                for c in catches {
                    f(&c.var);
                }
            }
            StructuredStmt::Labeled { body, .. } => body.for_each_own_var(f),
            _ => {}
        }
    }
}

pub fn ends_with_jump(body: &[StructuredStmt]) -> bool {
    body.last().map_or(false, |s| s.is_jump())
}

/// Applies `f` to every statement list in the tree, innermost lists first.
pub fn walk_bodies_mut(body: &mut Vec<StructuredStmt>, f: &mut dyn FnMut(&mut Vec<StructuredStmt>)) {
    for stmt in body.iter_mut() {
        stmt.for_each_body_mut(&mut |inner| walk_bodies_mut(inner, f));
    }
    f(body);
}

/// Applies `f` to every expression in the tree (each expression tree rewritten bottom-up).
pub fn transform_exprs(body: &mut [StructuredStmt], f: &mut dyn FnMut(&mut Expr)) {
    for stmt in body.iter_mut() {
        stmt.for_each_own_expr_mut(&mut |e| e.transform(f));
        stmt.for_each_body_mut(&mut |inner| transform_exprs(inner, f));
    }
}

/// Applies `f` to every local variable occurrence: loads, store targets, and the variables of
/// `for-each` and `catch`.
pub fn walk_vars_mut(body: &mut [StructuredStmt], f: &mut dyn FnMut(&mut LocalVar)) {
    for stmt in body.iter_mut() {
        stmt.for_each_own_var_mut(f);
        stmt.for_each_own_expr_mut(&mut |e| {
            e.transform(&mut |e| {
                if let Expr::LocalLoad(v) = e {
                    f(v);
                }
            })
        });
        stmt.for_each_body_mut(&mut |inner| walk_vars_mut(inner, f));
    }
}

/// Read-only counterpart of [`walk_vars_mut`].
pub fn visit_vars(body: &[StructuredStmt], f: &mut dyn FnMut(&LocalVar)) {
    for stmt in body {
        stmt.for_each_own_var(f);
        stmt.for_each_own_expr(&mut |e| {
            e.visit(&mut |e| {
                if let Expr::LocalLoad(v) = e {
                    f(v);
                }
            })
        });
        stmt.for_each_body(&mut |inner| visit_vars(inner, f));
    }
}

/// Visits every expression node in the tree.
pub fn visit_exprs(body: &[StructuredStmt], f: &mut dyn FnMut(&Expr)) {
    for stmt in body {
        stmt.for_each_own_expr(&mut |e| e.visit(f));
        stmt.for_each_body(&mut |inner| visit_exprs(inner, f));
    }
}

/// A switch case arm.
#[derive(Clone, Debug, PartialEq)]
pub struct SwitchCase {
    pub values: Vec<SwitchValue>,
    pub is_default: bool,
    pub body: Vec<StructuredStmt>,
}

/// Value for a switch case label.
#[derive(Clone, Debug, PartialEq)]
pub enum SwitchValue {
    Int(i32),
    Char(u16),
    String(String),
    Enum { type_name: String, const_name: String },
}

/// A catch clause in a try-catch.
#[derive(Clone, Debug, PartialEq)]
pub struct CatchClause {
    /// More than one entry renders as a multi-catch.
    pub exception_types: Vec<String>,
    pub var: LocalVar,
    pub body: Vec<StructuredStmt>,
}

/// A structured method body: the sequence of structured statements.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StructuredBody {
    pub statements: Vec<StructuredStmt>,
}

impl StructuredBody {
    pub fn new(statements: Vec<StructuredStmt>) -> Self {
        Self { statements }
    }
}
