use super::cfg_types::{BlockId, Terminator};
use super::descriptor::{parse_method_descriptor, JvmType};
use super::primitive::PrimitiveFlags;

/// Index of a duplicated value in a method's binding arena.
pub type DupId = u32;

/// Binary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Ushr,
    And,
    Or,
    Xor,
}

impl BinOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Ushr => ">>>",
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Xor => "^",
        }
    }
}

/// Unary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
}

/// Comparison operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl CompareOp {
    /// Returns the negated comparison.
    pub fn negate(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Ne,
            CompareOp::Ne => CompareOp::Eq,
            CompareOp::Lt => CompareOp::Ge,
            CompareOp::Ge => CompareOp::Lt,
            CompareOp::Gt => CompareOp::Le,
            CompareOp::Le => CompareOp::Gt,
        }
    }

    /// Java source token for this operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Ge => ">=",
            CompareOp::Gt => ">",
            CompareOp::Le => "<=",
        }
    }
}

/// Method invocation kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
}

/// Compare instruction kinds (for lcmp, fcmpl, etc.)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpKind {
    LCmp,
    FCmpL,
    FCmpG,
    DCmpL,
    DCmpG,
}

/// Identity of a local variable: slot, debug-info scope, def-use web and storage category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarKey {
    pub index: u16,
    pub origin: Option<u32>,
    pub web: Option<u32>,
    pub category: u8,
}

/// Local variable reference.
#[derive(Clone, Debug)]
pub struct LocalVar {
    pub index: u16,
    pub name: Option<String>,
    pub ty: JvmType,
    /// Generic signature from `LocalVariableTypeTable`.
    pub signature: Option<String>,
    /// Start pc of the `LocalVariableTable` entry this access resolved to.
    pub origin: Option<u32>,
    /// Def-use web of a slot without debug information; `None` for webs that reach
    /// method entry (parameters) and for debug-table variables.
    pub web: Option<u32>,
}

impl LocalVar {
    pub fn new(index: u16, ty: JvmType) -> Self {
        LocalVar { index, name: None, ty, signature: None, origin: None, web: None }
    }

    pub fn key(&self) -> VarKey {
        VarKey { index: self.index, origin: self.origin, web: self.web, category: category(&self.ty) }
    }
}

/// Slots compare by index and storage category; names, scopes and webs are presentation.
impl PartialEq for LocalVar {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && category(&self.ty) == category(&other.ty)
    }
}

pub fn category(ty: &JvmType) -> u8 {
    match ty {
        JvmType::Long => 1,
        JvmType::Float => 2,
        JvmType::Double => 3,
        t if t.is_int_like() => 0,
        _ => 4,
    }
}

/// Target of a method handle passed to a lambda bootstrap.
#[derive(Clone, Debug, PartialEq)]
pub struct HandleTarget {
    pub class_name: String,
    pub method_name: String,
    pub descriptor: String,
    pub is_static: bool,
}

/// Expression tree node -- represents a value-producing computation.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    // --- Literals ---
    IntLiteral { value: i32, flags: PrimitiveFlags },
    LongLiteral(i64),
    FloatLiteral(f32),
    DoubleLiteral(f64),
    StringLiteral(String),
    ClassLiteral(JvmType),
    NullLiteral,

    // --- Variables ---
    LocalLoad(LocalVar),
    This,

    // --- Operations ---
    BinaryOp { op: BinOp, left: Box<Expr>, right: Box<Expr> },
    UnaryOp { op: UnaryOp, operand: Box<Expr> },
    Not(Box<Expr>),
    Logical { and: bool, left: Box<Expr>, right: Box<Expr> },
    Cast { target_type: JvmType, operand: Box<Expr> },
    Instanceof { operand: Box<Expr>, check_type: JvmType },

    // --- Field access ---
    FieldGet {
        object: Option<Box<Expr>>,
        class_name: String,
        field_name: String,
        field_type: JvmType,
    },

    // --- Method invocation ---
    MethodCall {
        kind: InvokeKind,
        object: Option<Box<Expr>>,
        class_name: String,
        method_name: String,
        descriptor: String,
        args: Vec<Expr>,
        return_type: JvmType,
    },

    // --- Object creation ---
    New {
        class_name: String,
        constructor_descriptor: String,
        args: Vec<Expr>,
    },
    NewArray { element_type: JvmType, length: Box<Expr> },
    NewMultiArray { array_type: JvmType, dimensions: Vec<Expr> },
    ArrayInit { element_type: JvmType, values: Vec<Expr> },
    ArrayLength { array: Box<Expr> },
    ArrayLoad { array: Box<Expr>, index: Box<Expr>, element_type: JvmType },

    // --- Comparison ---
    Compare { op: CompareOp, left: Box<Expr>, right: Box<Expr> },
    /// Result of lcmp/fcmpl/fcmpg/dcmpl/dcmpg: -1, 0, or 1
    CmpResult { kind: CmpKind, left: Box<Expr>, right: Box<Expr> },

    // --- invokedynamic (lambdas, method references) ---
    InvokeDynamic {
        bootstrap_index: u16,
        method_name: String,
        descriptor: String,
        captures: Vec<Expr>,
        target: Option<HandleTarget>,
    },
    /// `a + b + ...` string concatenation.
    StringConcat(Vec<Expr>),

    // --- Synthesized during structuring ---
    Ternary { condition: Box<Expr>, then_expr: Box<Expr>, else_expr: Box<Expr> },
    /// Assignment used as a value: `(x = v)`.
    Assign { target: Box<Expr>, value: Box<Expr> },
    /// `x++`, `--x`, ...
    IncDec { target: Box<Expr>, increment: bool, prefix: bool },

    // --- Fallback ---
    Unresolved(String),

    // --- Stack bookkeeping (resolved before structuring) ---
    /// Read of a duplicated value bound by `Stmt::DupStore`.
    DupLoad { id: DupId, ty: JvmType },
    /// Operand-stack value flowing into a join from differing predecessors.
    StackSlot { block: BlockId, index: usize, ty: JvmType },
    /// The exception object on entry to a handler.
    CaughtException(JvmType),
    /// Value pushed by `jsr`.
    ReturnAddress,
    /// Marker for an uninitialized `new` before <init> is called
    UninitNew { class_name: String, id: u32 },
}

impl Expr {
    pub fn int(value: i32) -> Expr {
        Expr::IntLiteral { value, flags: PrimitiveFlags::for_value(value) }
    }

    pub fn boolean(value: bool) -> Expr {
        Expr::IntLiteral { value: value as i32, flags: PrimitiveFlags::BOOLEAN }
    }

    pub fn int_value(&self) -> Option<i32> {
        match self {
            Expr::IntLiteral { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Static type of the expression as far as it is known without context.
    pub fn type_of(&self) -> JvmType {
        match self {
            Expr::IntLiteral { flags, .. } => flags.canonical(),
            Expr::LongLiteral(_) => JvmType::Long,
            Expr::FloatLiteral(_) => JvmType::Float,
            Expr::DoubleLiteral(_) => JvmType::Double,
            Expr::StringLiteral(_) | Expr::StringConcat(_) => {
                JvmType::Reference("java/lang/String".into())
            }
            Expr::ClassLiteral(_) => JvmType::Reference("java/lang/Class".into()),
            Expr::NullLiteral => JvmType::Null,
            Expr::LocalLoad(v) => v.ty.clone(),
            Expr::This => JvmType::Unknown,
            Expr::BinaryOp { op, left, right } => {
                let lt = left.type_of();
                match op {
                    BinOp::And | BinOp::Or | BinOp::Xor
                        if lt == JvmType::Boolean && right.type_of() == JvmType::Boolean =>
                    {
                        JvmType::Boolean
                    }
                    _ if lt.is_int_like() => JvmType::Int,
                    _ => lt,
                }
            }
            Expr::UnaryOp { operand, .. } => {
                let t = operand.type_of();
                if t.is_int_like() {
                    JvmType::Int
                } else {
                    t
                }
            }
            Expr::Not(_) | Expr::Logical { .. } | Expr::Compare { .. } | Expr::Instanceof { .. } => {
                JvmType::Boolean
            }
            Expr::Cast { target_type, .. } => target_type.clone(),
            Expr::FieldGet { field_type, .. } => field_type.clone(),
            Expr::MethodCall { return_type, .. } => return_type.clone(),
            Expr::New { class_name, .. } | Expr::UninitNew { class_name, .. } => {
                JvmType::Reference(class_name.clone())
            }
            Expr::NewArray { element_type, .. } | Expr::ArrayInit { element_type, .. } => {
                JvmType::Array(Box::new(element_type.clone()))
            }
            Expr::NewMultiArray { array_type, .. } => array_type.clone(),
            Expr::ArrayLength { .. } | Expr::CmpResult { .. } => JvmType::Int,
            Expr::ArrayLoad { element_type, .. } => element_type.clone(),
            Expr::InvokeDynamic { descriptor, .. } => parse_method_descriptor(descriptor)
                .map(|(_, ret)| ret)
                .unwrap_or(JvmType::Unknown),
            Expr::Ternary { then_expr, else_expr, .. } => match then_expr.type_of() {
                JvmType::Null => else_expr.type_of(),
                t => t,
            },
            Expr::Assign { target, .. } | Expr::IncDec { target, .. } => target.type_of(),
            Expr::DupLoad { ty, .. } | Expr::StackSlot { ty, .. } => ty.clone(),
            Expr::CaughtException(ty) => ty.clone(),
            Expr::ReturnAddress | Expr::Unresolved(_) => JvmType::Unknown,
        }
    }

    /// Occupies two words on the operand stack.
    pub fn is_wide(&self) -> bool {
        self.type_of().is_wide()
    }

    /// Evaluating the expression twice is indistinguishable from evaluating it once.
    pub fn is_pure(&self) -> bool {
        matches!(
            self,
            Expr::IntLiteral { .. }
                | Expr::LongLiteral(_)
                | Expr::FloatLiteral(_)
                | Expr::DoubleLiteral(_)
                | Expr::StringLiteral(_)
                | Expr::ClassLiteral(_)
                | Expr::NullLiteral
                | Expr::This
                | Expr::LocalLoad(_)
        )
    }

    /// Heuristic: does this expression likely have side effects?
    /// Used to decide whether to emit a popped value as a statement.
    pub fn has_side_effects(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| {
            if matches!(
                e,
                Expr::MethodCall { .. }
                    | Expr::New { .. }
                    | Expr::InvokeDynamic { .. }
                    | Expr::Assign { .. }
                    | Expr::IncDec { .. }
                    | Expr::Unresolved(_)
            ) {
                found = true;
            }
        });
        found
    }

    /// True when the expression reads local slot `index`.
    pub fn reads_local(&self, var: &LocalVar) -> bool {
        let mut found = false;
        self.visit(&mut |e| {
            if let Expr::LocalLoad(v) = e {
                if v == var {
                    found = true;
                }
            }
        });
        found
    }

    /// Logical negation, pushing the `!` into comparisons and through De Morgan.
    pub fn negate(self) -> Expr {
        match self {
            Expr::Compare { op, left, right } => Expr::Compare { op: op.negate(), left, right },
            Expr::Not(inner) => *inner,
            Expr::Logical { and, left, right } => Expr::Logical {
                and: !and,
                left: Box::new(left.negate()),
                right: Box::new(right.negate()),
            },
            Expr::IntLiteral { value, flags } if flags.is_boolean() => Expr::boolean(value == 0),
            other => Expr::Not(Box::new(other)),
        }
    }

    pub fn for_each_child(&self, f: &mut dyn FnMut(&Expr)) {
        match self {
            Expr::BinaryOp { left, right, .. }
            | Expr::Logical { left, right, .. }
            | Expr::Compare { left, right, .. }
            | Expr::CmpResult { left, right, .. } => {
                f(left);
                f(right);
            }
            Expr::UnaryOp { operand, .. }
            | Expr::Cast { operand, .. }
            | Expr::Instanceof { operand, .. } => f(operand),
            Expr::Not(inner) => f(inner),
            Expr::FieldGet { object, .. } => {
                if let Some(o) = object {
                    f(o);
                }
            }
            Expr::MethodCall { object, args, .. } => {
                if let Some(o) = object {
                    f(o);
                }
                args.iter().for_each(|a| f(a));
            }
            Expr::New { args, .. } => args.iter().for_each(|a| f(a)),
            Expr::NewArray { length, .. } => f(length),
            Expr::NewMultiArray { dimensions, .. } => dimensions.iter().for_each(|a| f(a)),
            Expr::ArrayInit { values, .. } => values.iter().for_each(|a| f(a)),
            Expr::ArrayLength { array } => f(array),
            Expr::ArrayLoad { array, index, .. } => {
                f(array);
                f(index);
            }
            Expr::InvokeDynamic { captures, .. } => captures.iter().for_each(|a| f(a)),
            Expr::StringConcat(parts) => parts.iter().for_each(|a| f(a)),
            Expr::Ternary { condition, then_expr, else_expr } => {
                f(condition);
                f(then_expr);
                f(else_expr);
            }
            Expr::Assign { target, value } => {
                f(target);
                f(value);
            }
            Expr::IncDec { target, .. } => f(target),
            _ => {}
        }
    }

    pub fn for_each_child_mut(&mut self, f: &mut dyn FnMut(&mut Expr)) {
        match self {
            Expr::BinaryOp { left, right, .. }
            | Expr::Logical { left, right, .. }
            | Expr::Compare { left, right, .. }
            | Expr::CmpResult { left, right, .. } => {
                f(left);
                f(right);
            }
            Expr::UnaryOp { operand, .. }
            | Expr::Cast { operand, .. }
            | Expr::Instanceof { operand, .. } => f(operand),
            Expr::Not(inner) => f(inner),
            Expr::FieldGet { object, .. } => {
                if let Some(o) = object {
                    f(o);
                }
            }
            Expr::MethodCall { object, args, .. } => {
                if let Some(o) = object {
                    f(o);
                }
                args.iter_mut().for_each(|a| f(a));
            }
            Expr::New { args, .. } => args.iter_mut().for_each(|a| f(a)),
            Expr::NewArray { length, .. } => f(length),
            Expr::NewMultiArray { dimensions, .. } => dimensions.iter_mut().for_each(|a| f(a)),
            Expr::ArrayInit { values, .. } => values.iter_mut().for_each(|a| f(a)),
            Expr::ArrayLength { array } => f(array),
            Expr::ArrayLoad { array, index, .. } => {
                f(array);
                f(index);
            }
            Expr::InvokeDynamic { captures, .. } => captures.iter_mut().for_each(|a| f(a)),
            Expr::StringConcat(parts) => parts.iter_mut().for_each(|a| f(a)),
            Expr::Ternary { condition, then_expr, else_expr } => {
                f(condition);
                f(then_expr);
                f(else_expr);
            }
            Expr::Assign { target, value } => {
                f(target);
                f(value);
            }
            Expr::IncDec { target, .. } => f(target),
            _ => {}
        }
    }

    /// Pre-order walk over this expression and all sub-expressions.
    pub fn visit(&self, f: &mut dyn FnMut(&Expr)) {
        f(self);
        self.for_each_child(&mut |c| c.visit(f));
    }

    /// Bottom-up rewrite: children first, then the node itself.
    pub fn transform(&mut self, f: &mut dyn FnMut(&mut Expr)) {
        self.for_each_child_mut(&mut |c| c.transform(f));
        f(self);
    }
}

/// Source position of a statement: the bytecode range that produced it and its line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Location {
    /// First instruction contributing to the statement.
    pub start: u32,
    /// Instruction producing the statement.
    pub end: u32,
    pub line: Option<u16>,
}

impl Location {
    pub fn at(offset: u32) -> Self {
        Location { start: offset, end: offset, line: None }
    }
}

/// Statement -- represents a side-effecting operation.
#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    LocalStore { var: LocalVar, value: Expr },
    FieldStore {
        object: Option<Expr>,
        class_name: String,
        field_name: String,
        field_type: JvmType,
        value: Expr,
    },
    ArrayStore { array: Expr, index: Expr, value: Expr },
    ExprStmt(Expr),
    Iinc { var: LocalVar, amount: i32 },
    Return(Option<Expr>),
    Throw(Expr),
    Monitor { enter: bool, object: Expr },
    /// Evaluates `value` once; later `Expr::DupLoad { id }` read it.
    DupStore { id: DupId, value: Expr },
    /// Local declaration with optional initializers, all of one type.
    Declare { vars: Vec<(LocalVar, Option<Expr>)> },
    /// Subroutine call kept until the structurer inlines it.
    Jsr { target: BlockId },
    /// Subroutine return through the address held in `index`.
    Ret { index: u16 },
}

impl Stmt {
    pub fn for_each_expr(&self, f: &mut dyn FnMut(&Expr)) {
        match self {
            Stmt::LocalStore { value, .. } => f(value),
            Stmt::FieldStore { object, value, .. } => {
                if let Some(o) = object {
                    f(o);
                }
                f(value);
            }
            Stmt::ArrayStore { array, index, value } => {
                f(array);
                f(index);
                f(value);
            }
            Stmt::ExprStmt(e) | Stmt::Throw(e) | Stmt::DupStore { value: e, .. } => f(e),
            Stmt::Monitor { object, .. } => f(object),
            Stmt::Return(Some(e)) => f(e),
            Stmt::Declare { vars } => {
                for (_, init) in vars {
                    if let Some(e) = init {
                        f(e);
                    }
                }
            }
            Stmt::Return(None) | Stmt::Iinc { .. } | Stmt::Jsr { .. } | Stmt::Ret { .. } => {}
        }
    }

    pub fn for_each_expr_mut(&mut self, f: &mut dyn FnMut(&mut Expr)) {
        match self {
            Stmt::LocalStore { value, .. } => f(value),
            Stmt::FieldStore { object, value, .. } => {
                if let Some(o) = object {
                    f(o);
                }
                f(value);
            }
            Stmt::ArrayStore { array, index, value } => {
                f(array);
                f(index);
                f(value);
            }
            Stmt::ExprStmt(e) | Stmt::Throw(e) | Stmt::DupStore { value: e, .. } => f(e),
            Stmt::Monitor { object, .. } => f(object),
            Stmt::Return(Some(e)) => f(e),
            Stmt::Declare { vars } => {
                for (_, init) in vars {
                    if let Some(e) = init {
                        f(e);
                    }
                }
            }
            Stmt::Return(None) | Stmt::Iinc { .. } | Stmt::Jsr { .. } | Stmt::Ret { .. } => {}
        }
    }

    /// Local variable written by this statement, if any.
    pub fn stored_local(&self) -> Option<&LocalVar> {
        match self {
            Stmt::LocalStore { var, .. } | Stmt::Iinc { var, .. } => Some(var),
            _ => None,
        }
    }

    /// Variables this statement writes or declares.
    pub fn for_each_var_mut(&mut self, f: &mut dyn FnMut(&mut LocalVar)) {
        match self {
            Stmt::LocalStore { var, .. } | Stmt::Iinc { var, .. } => f(var),
            Stmt::Declare { vars } => {
                for (var, _) in vars {
                    f(var);
                }
            }
            _ => {}
        }
    }

    pub fn for_each_var(&self, f: &mut dyn FnMut(&LocalVar)) {
        match self {
            Stmt::LocalStore { var, .. } | Stmt::Iinc { var, .. } => f(var),
            Stmt::Declare { vars } => {
                for (var, _) in vars {
                    f(var);
                }
            }
            _ => {}
        }
    }

    /// Control never continues past this statement.
    pub fn is_exit(&self) -> bool {
        matches!(self, Stmt::Return(_) | Stmt::Throw(_))
    }
}

/// A statement together with where it came from.
#[derive(Clone, Debug)]
pub struct LocatedStmt {
    pub loc: Location,
    pub stmt: Stmt,
}

impl LocatedStmt {
    pub fn new(loc: Location, stmt: Stmt) -> Self {
        LocatedStmt { loc, stmt }
    }
}

/// Location is ignored so cloned code (finally bodies) compares equal.
impl PartialEq for LocatedStmt {
    fn eq(&self, other: &Self) -> bool {
        self.stmt == other.stmt
    }
}

/// A simulated basic block: the result of stack-simulating one BasicBlock.
#[derive(Clone, Debug)]
pub struct SimulatedBlock {
    pub id: BlockId,
    pub statements: Vec<LocatedStmt>,
    pub entry_stack: Vec<Expr>,
    pub exit_stack: Vec<Expr>,
    pub terminator: Terminator,
    /// Branch condition expression (populated for ConditionalBranch terminators):
    /// true when control goes to `if_true`.
    pub branch_condition: Option<Expr>,
    /// Scrutinee of a `tableswitch`/`lookupswitch`.
    pub switch_value: Option<Expr>,
    pub branch_loc: Location,
}

impl SimulatedBlock {
    /// Statements other than pure stack bookkeeping.
    pub fn analyzable_statements(&self) -> impl Iterator<Item = &LocatedStmt> {
        self.statements
            .iter()
            .filter(|s| !matches!(s.stmt, Stmt::DupStore { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(i: u16) -> Expr {
        Expr::LocalLoad(LocalVar::new(i, JvmType::Int))
    }

    #[test]
    fn negation_uses_de_morgan() {
        let cond = Expr::Logical {
            and: true,
            left: Box::new(Expr::Compare {
                op: CompareOp::Lt,
                left: Box::new(local(1)),
                right: Box::new(Expr::int(10)),
            }),
            right: Box::new(Expr::Not(Box::new(local(2)))),
        };
        match cond.negate() {
            Expr::Logical { and: false, left, right } => {
                assert!(matches!(*left, Expr::Compare { op: CompareOp::Ge, .. }));
                assert_eq!(*right, local(2));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn binary_type_of_widens_int_like() {
        let sum = Expr::BinaryOp {
            op: BinOp::Add,
            left: Box::new(Expr::int(1)),
            right: Box::new(Expr::int(2)),
        };
        assert_eq!(sum.type_of(), JvmType::Int);
        let wide = Expr::BinaryOp {
            op: BinOp::Mul,
            left: Box::new(Expr::LongLiteral(3)),
            right: Box::new(Expr::LongLiteral(4)),
        };
        assert!(wide.is_wide());
    }

    #[test]
    fn located_statements_compare_without_location() {
        let a = LocatedStmt::new(Location::at(4), Stmt::Return(None));
        let b = LocatedStmt::new(Location::at(19), Stmt::Return(None));
        assert_eq!(a, b);
    }

    #[test]
    fn side_effects_are_found_in_subexpressions() {
        let call = Expr::MethodCall {
            kind: InvokeKind::Static,
            object: None,
            class_name: "A".into(),
            method_name: "f".into(),
            descriptor: "()I".into(),
            args: vec![],
            return_type: JvmType::Int,
        };
        let e = Expr::BinaryOp { op: BinOp::Add, left: Box::new(local(0)), right: Box::new(call) };
        assert!(e.has_side_effects());
        assert!(!local(0).has_side_effects());
        assert!(e.reads_local(&LocalVar::new(0, JvmType::Boolean)));
    }
}
