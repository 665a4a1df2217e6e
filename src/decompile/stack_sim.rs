use std::collections::BTreeMap;

use crate::attribute_info::{BootstrapMethod, CodeAttribute};
use crate::code_attribute::Instruction;
use crate::constant_info::{ConstantInfo, ConstantPool, MemberRef};
use crate::error::MethodError;

use super::cfg_types::*;
use super::descriptor::*;
use super::expr::*;
use super::type_inference::narrow_to;
use super::util::{self, Budget};

const LAMBDA_FACTORY: &str = "java/lang/invoke/LambdaMetafactory";
const CONCAT_FACTORY: &str = "java/lang/invoke/StringConcatFactory";
const THROWABLE: &str = "java/lang/Throwable";
const STRING_BUILDERS: [&str; 2] = ["java/lang/StringBuilder", "java/lang/StringBuffer"];

/// Everything about the enclosing method the simulator needs to decode one block.
pub struct MethodContext<'a> {
    pub pool: &'a ConstantPool,
    pub code: &'a CodeAttribute,
    pub class_name: &'a str,
    pub is_static: bool,
    pub bootstrap_methods: &'a [BootstrapMethod],
}

impl<'a> MethodContext<'a> {
    /// Local variable for slot `index`, named from the debug tables live at `pc`.
    ///
    /// The declared type replaces the instruction's type when both share a storage
    /// category, so `iload` of a `boolean` slot yields a `boolean` variable.
    /// Slots past `max_locals` (two slots for `long`/`double`) are rejected.
    pub fn local(&self, index: u16, pc: u32, ty: JvmType) -> Result<LocalVar, MethodError> {
        let width = if ty.is_wide() { 2 } else { 1 };
        if u32::from(index) + width > u32::from(self.code.max_locals) {
            return Err(MethodError::InvalidBytecode {
                offset: pc,
                message: format!("local slot {} outside max_locals {}", index, self.code.max_locals),
            });
        }
        let mut var = LocalVar::new(index, ty);
        if let Some(item) = self
            .code
            .local_variable_table()
            .and_then(|lvt| lvt.items.iter().find(|i| i.index == index && i.covers(pc)))
        {
            var.name = self.pool.utf8(item.name_index).map(str::to_string);
            var.origin = Some(item.start_pc as u32);
            if let Some(declared) = self.pool.utf8(item.descriptor_index).and_then(parse_type_descriptor) {
                if same_category(&declared, &var.ty) {
                    var.ty = declared;
                }
            }
        }
        if let Some(item) = self.code.local_variable_type_table().and_then(|lvtt| {
            lvtt.local_variable_type_table
                .iter()
                .find(|i| i.index == index && i.covers(pc))
        }) {
            var.signature = self.pool.utf8(item.signature_index).map(str::to_string);
        }
        Ok(var)
    }

    fn line(&self, pc: u32) -> Option<u16> {
        self.code.line_for_offset(pc)
    }

    fn member(&self, index: u16, offset: u32) -> Result<MemberRef<'a>, MethodError> {
        self.pool.member_ref(index).ok_or_else(|| MethodError::InvalidBytecode {
            offset,
            message: format!("constant #{} is not a member reference", index),
        })
    }

    fn class(&self, index: u16, offset: u32) -> Result<&'a str, MethodError> {
        self.pool.class_name(index).ok_or_else(|| MethodError::InvalidBytecode {
            offset,
            message: format!("constant #{} is not a class", index),
        })
    }

    /// Reference kind and target of a MethodHandle constant.
    fn method_handle(&self, index: u16) -> Option<(u8, MemberRef<'a>)> {
        match self.pool.get(index)? {
            ConstantInfo::MethodHandle(h) => Some((h.reference_kind, self.pool.member_ref(h.reference_index)?)),
            _ => None,
        }
    }

    /// Load a constant from the constant pool by index (for ldc/ldc_w/ldc2_w).
    fn load_constant(&self, index: u16, offset: u32) -> Result<Expr, MethodError> {
        Ok(match self.pool.get(index) {
            Some(ConstantInfo::Integer(c)) => Expr::int(c.value),
            Some(ConstantInfo::Float(c)) => Expr::FloatLiteral(c.value),
            Some(ConstantInfo::Long(c)) => Expr::LongLiteral(c.value),
            Some(ConstantInfo::Double(c)) => Expr::DoubleLiteral(c.value),
            Some(ConstantInfo::String(c)) => match self.pool.utf8(c.string_index) {
                Some(s) => Expr::StringLiteral(s.to_string()),
                None => Expr::Unresolved(format!("string_cp#{}", c.string_index)),
            },
            Some(ConstantInfo::Class(c)) => match self.pool.utf8(c.name_index) {
                Some(name) => Expr::ClassLiteral(class_constant_type(name)),
                None => Expr::Unresolved(format!("class_cp#{}", c.name_index)),
            },
            Some(ConstantInfo::MethodType(_))
            | Some(ConstantInfo::MethodHandle(_))
            | Some(ConstantInfo::Dynamic(_)) => Expr::Unresolved(util::format_constant(self.pool, index)),
            _ => {
                return Err(MethodError::InvalidBytecode {
                    offset,
                    message: format!("ldc of non-loadable constant #{}", index),
                })
            }
        })
    }
}

fn same_category(a: &JvmType, b: &JvmType) -> bool {
    (a.is_int_like() && b.is_int_like())
        || (a.is_reference() && b.is_reference())
        || a == b
}

/// One value bound by a `dup` family instruction.
#[derive(Clone, Debug, PartialEq)]
pub struct DupBinding {
    pub ty: JvmType,
    pub offset: u32,
    /// Spilled because a later store would change what the value reads; never inlined.
    pub pinned: bool,
}

/// Method-wide table of duplicated values; `DupId` indexes into it.
#[derive(Clone, Debug, Default)]
pub struct DupArena {
    bindings: Vec<DupBinding>,
}

impl DupArena {
    pub fn bind(&mut self, ty: JvmType, offset: u32, pinned: bool) -> DupId {
        self.bindings.push(DupBinding { ty, offset, pinned });
        (self.bindings.len() - 1) as DupId
    }

    pub fn get(&self, id: DupId) -> Option<&DupBinding> {
        self.bindings.get(id as usize)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Every reachable block of a method after simulation.
#[derive(Clone, Debug)]
pub struct SimulatedMethod {
    pub blocks: BTreeMap<BlockId, SimulatedBlock>,
    pub arena: DupArena,
}

/// Pop from the stack or fail with an underflow at the given offset.
macro_rules! pop {
    ($sim:expr, $offset:expr) => {
        $sim.stack
            .pop()
            .ok_or(MethodError::StackUnderflow { offset: $offset })?
    };
}

struct BlockSimulator<'s, 'a> {
    ctx: &'s MethodContext<'a>,
    arena: &'s mut DupArena,
    next_new: &'s mut u32,
    stack: Vec<Expr>,
    statements: Vec<LocatedStmt>,
    stmt_start: Option<u32>,
    branch_condition: Option<Expr>,
    switch_value: Option<Expr>,
    branch_loc: Location,
    /// Set when an `iinc` already consumed the following load.
    skip_next_load: bool,
}

impl<'s, 'a> BlockSimulator<'s, 'a> {
    fn location(&self, offset: u32) -> Location {
        let start = self.stmt_start.unwrap_or(offset).min(offset);
        Location { start, end: offset, line: self.ctx.line(start) }
    }

    fn emit(&mut self, offset: u32, stmt: Stmt) {
        let loc = self.location(offset);
        self.statements.push(LocatedStmt::new(loc, stmt));
        self.stmt_start = None;
    }

    /// Binds values still on the stack that the next statement could change:
    /// anything with side effects, and reads of `written`.
    fn spill(&mut self, offset: u32, written: Option<&LocalVar>) {
        for i in 0..self.stack.len() {
            let value = &self.stack[i];
            let reads = written.map_or(false, |v| value.reads_local(v));
            if !(reads || value.has_side_effects()) || matches!(value, Expr::DupLoad { .. }) {
                continue;
            }
            let value = std::mem::replace(&mut self.stack[i], Expr::NullLiteral);
            let ty = value.type_of();
            let id = self.arena.bind(ty.clone(), offset, true);
            let loc = self.location(offset);
            self.statements.push(LocatedStmt::new(loc, Stmt::DupStore { id, value }));
            self.stack[i] = Expr::DupLoad { id, ty };
        }
    }

    /// Emits a statement that must stay ordered after everything still on the stack.
    fn emit_ordered(&mut self, offset: u32, stmt: Stmt) {
        let written = stmt.stored_local().cloned();
        self.spill(offset, written.as_ref());
        self.emit(offset, stmt);
    }

    /// Value standing for both copies made by a `dup`: cheap values are copied,
    /// anything else is evaluated once into a binding.
    fn dup_value(&mut self, value: Expr, offset: u32) -> Expr {
        match value {
            Expr::UninitNew { .. }
            | Expr::DupLoad { .. }
            | Expr::This
            | Expr::IntLiteral { .. }
            | Expr::LongLiteral(_)
            | Expr::FloatLiteral(_)
            | Expr::DoubleLiteral(_)
            | Expr::StringLiteral(_)
            | Expr::ClassLiteral(_)
            | Expr::NullLiteral
            | Expr::CaughtException(_) => value,
            value => {
                let ty = value.type_of();
                let id = self.arena.bind(ty.clone(), offset, false);
                let loc = self.location(offset);
                self.statements.push(LocatedStmt::new(loc, Stmt::DupStore { id, value }));
                Expr::DupLoad { id, ty }
            }
        }
    }

    fn load(&mut self, index: u16, ty: JvmType, offset: u32) -> Result<(), MethodError> {
        if index == 0 && !self.ctx.is_static && ty.is_reference() {
            self.stack.push(Expr::This);
        } else {
            let var = self.ctx.local(index, offset, ty)?;
            self.stack.push(Expr::LocalLoad(var));
        }
        Ok(())
    }

    fn store(&mut self, index: u16, ty: JvmType, offset: u32, next: u32) -> Result<(), MethodError> {
        let value = pop!(self, offset);
        let var = self.ctx.local(index, next, ty).map_err(|_| MethodError::InvalidBytecode {
            offset,
            message: format!("local slot {} outside max_locals {}", index, self.ctx.code.max_locals),
        })?;
        self.emit_ordered(offset, Stmt::LocalStore { var, value });
        Ok(())
    }

    fn iinc(
        &mut self,
        index: u16,
        amount: i32,
        offset: u32,
        next_instr: Option<&Instruction>,
    ) -> Result<(), MethodError> {
        let var = self.ctx.local(index, offset, JvmType::Int)?;
        let unit = amount == 1 || amount == -1;
        // `iload x; iinc x 1` leaves the old value on the stack: `x++`.
        if unit && matches!(self.stack.last(), Some(Expr::LocalLoad(v)) if *v == var) {
            self.stack.pop();
            self.spill(offset, Some(&var));
            self.stack.push(Expr::IncDec {
                target: Box::new(Expr::LocalLoad(var)),
                increment: amount > 0,
                prefix: false,
            });
            return Ok(());
        }
        // `iinc x 1; iload x` inside an expression: `++x`.
        let reloads = next_instr
            .and_then(util::local_load)
            .map_or(false, |(ty, i)| i == index && ty.is_int_like());
        if unit && reloads && !self.stack.is_empty() {
            self.spill(offset, Some(&var));
            self.stack.push(Expr::IncDec {
                target: Box::new(Expr::LocalLoad(var)),
                increment: amount > 0,
                prefix: true,
            });
            self.skip_next_load = true;
            return Ok(());
        }
        self.emit_ordered(offset, Stmt::Iinc { var, amount });
        Ok(())
    }

    /// Pop `n` arguments from the stack (right-to-left in JVM order).
    /// Returns them in left-to-right order for display.
    fn pop_args(&mut self, n: usize, offset: u32) -> Result<Vec<Expr>, MethodError> {
        if self.stack.len() < n {
            return Err(MethodError::StackUnderflow { offset });
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    /// If a method returns void, emit the call as a statement; otherwise push the result.
    fn push_or_emit_call(&mut self, call: Expr, return_type: &JvmType, offset: u32) {
        if *return_type == JvmType::Void {
            self.emit_ordered(offset, Stmt::ExprStmt(call));
        } else {
            self.stack.push(call);
        }
    }

    /// Replace every copy of the uninitialized `new` with the constructed object.
    /// Returns false when no copy was left on the stack (`new Foo();` as a statement).
    fn replace_uninit_new(&mut self, id: u32, replacement: &Expr) -> bool {
        let mut replaced = false;
        for item in self.stack.iter_mut() {
            if matches!(item, Expr::UninitNew { id: i, .. } if *i == id) {
                *item = replacement.clone();
                replaced = true;
            }
        }
        replaced
    }

    fn invoke(&mut self, kind: InvokeKind, index: u16, offset: u32) -> Result<(), MethodError> {
        let member = self.ctx.member(index, offset)?;
        let (params, return_type) =
            parse_method_descriptor(member.descriptor).ok_or_else(|| MethodError::InvalidBytecode {
                offset,
                message: format!("bad method descriptor {}", member.descriptor),
            })?;
        let args = self.pop_args(params.len(), offset)?;
        let object = if kind == InvokeKind::Static { None } else { Some(pop!(self, offset)) };

        if kind == InvokeKind::Special && member.name == "<init>" {
            if let Some(Expr::UninitNew { class_name, id }) = &object {
                let created = Expr::New {
                    class_name: class_name.clone(),
                    constructor_descriptor: member.descriptor.to_string(),
                    args,
                };
                if !self.replace_uninit_new(*id, &created) {
                    self.emit_ordered(offset, Stmt::ExprStmt(created));
                }
                return Ok(());
            }
        }

        if kind == InvokeKind::Virtual
            && member.name == "toString"
            && member.descriptor == "()Ljava/lang/String;"
            && STRING_BUILDERS.contains(&member.class_name)
        {
            if let Some(concat) = object.as_ref().and_then(builder_concat) {
                self.stack.push(concat);
                return Ok(());
            }
        }

        let call = Expr::MethodCall {
            kind,
            object: object.map(Box::new),
            class_name: member.class_name.to_string(),
            method_name: member.name.to_string(),
            descriptor: member.descriptor.to_string(),
            args,
            return_type: return_type.clone(),
        };
        self.push_or_emit_call(call, &return_type, offset);
        Ok(())
    }

    /// Resolve an `invokedynamic` call site into a lambda, a string concatenation
    /// or an opaque dynamic call.
    fn invoke_dynamic(&mut self, index: u16, offset: u32) -> Result<(), MethodError> {
        let ctx = self.ctx;
        let invalid = |message: &str| MethodError::InvalidBytecode { offset, message: message.to_string() };
        let bootstrap_index = match ctx.pool.get(index) {
            Some(ConstantInfo::InvokeDynamic(indy)) => indy.bootstrap_method_attr_index,
            _ => return Err(invalid("invokedynamic without an InvokeDynamic constant")),
        };
        let (name, descriptor) = ctx
            .pool
            .dynamic_name_and_type(index)
            .ok_or_else(|| invalid("unresolvable call site"))?;
        let (params, return_type) =
            parse_method_descriptor(descriptor).ok_or_else(|| invalid("bad call site descriptor"))?;
        let captures = self.pop_args(params.len(), offset)?;

        let bootstrap = ctx.bootstrap_methods.get(bootstrap_index as usize);
        let factory = bootstrap.and_then(|b| ctx.method_handle(b.bootstrap_method_ref));
        let expr = match (bootstrap, factory) {
            (Some(b), Some((_, f))) if f.class_name == CONCAT_FACTORY => {
                string_concat(ctx, b, f.name, captures, offset)?
            }
            (Some(b), Some((_, f))) if f.class_name == LAMBDA_FACTORY => Expr::InvokeDynamic {
                bootstrap_index,
                method_name: name.to_string(),
                descriptor: descriptor.to_string(),
                captures,
                target: b
                    .bootstrap_arguments
                    .get(1)
                    .and_then(|&arg| ctx.method_handle(arg))
                    .map(|(kind, m)| HandleTarget {
                        class_name: m.class_name.to_string(),
                        method_name: m.name.to_string(),
                        descriptor: m.descriptor.to_string(),
                        is_static: kind == 6,
                    }),
            },
            _ => Expr::InvokeDynamic {
                bootstrap_index,
                method_name: name.to_string(),
                descriptor: descriptor.to_string(),
                captures,
                target: None,
            },
        };
        self.push_or_emit_call(expr, &return_type, offset);
        Ok(())
    }

    fn branch(&mut self, condition: Expr, offset: u32) {
        self.branch_loc = self.location(offset);
        self.branch_condition = Some(condition);
        self.stmt_start = None;
    }

    fn step(
        &mut self,
        instr: &Instruction,
        offset: u32,
        next: u32,
        next_instr: Option<&Instruction>,
    ) -> Result<(), MethodError> {
        if self.stmt_start.is_none() {
            self.stmt_start = Some(offset);
        }
        if let Some((ty, index)) = util::local_load(instr) {
            if std::mem::take(&mut self.skip_next_load) {
                return Ok(());
            }
            return self.load(index, ty, offset);
        }
        if let Some((ty, index)) = util::local_store(instr) {
            return self.store(index, ty, offset, next);
        }
        if let Some(default) = util::array_element_type(instr) {
            let is_store = matches!(
                instr,
                Instruction::Iastore
                    | Instruction::Lastore
                    | Instruction::Fastore
                    | Instruction::Dastore
                    | Instruction::Aastore
                    | Instruction::Bastore
                    | Instruction::Castore
                    | Instruction::Sastore
            );
            if is_store {
                let value = pop!(self, offset);
                let index = pop!(self, offset);
                let array = pop!(self, offset);
                self.emit_ordered(offset, Stmt::ArrayStore { array, index, value });
            } else {
                let index = pop!(self, offset);
                let array = pop!(self, offset);
                let element_type = match array.type_of() {
                    JvmType::Array(inner) if same_category(&inner, &default) => *inner,
                    _ => default,
                };
                self.stack.push(Expr::ArrayLoad {
                    array: Box::new(array),
                    index: Box::new(index),
                    element_type,
                });
            }
            return Ok(());
        }
        if let Some(op) = binary_op(instr) {
            let right = pop!(self, offset);
            let left = pop!(self, offset);
            self.stack.push(Expr::BinaryOp { op, left: Box::new(left), right: Box::new(right) });
            return Ok(());
        }
        if let Some(target_type) = conversion(instr) {
            let operand = pop!(self, offset);
            self.stack.push(Expr::Cast { target_type, operand: Box::new(operand) });
            return Ok(());
        }

        match instr {
            // ============================================================
            // Constants
            // ============================================================
            Instruction::Nop => {}
            Instruction::Iconstm1 => self.stack.push(Expr::int(-1)),
            Instruction::Iconst0 => self.stack.push(Expr::int(0)),
            Instruction::Iconst1 => self.stack.push(Expr::int(1)),
            Instruction::Iconst2 => self.stack.push(Expr::int(2)),
            Instruction::Iconst3 => self.stack.push(Expr::int(3)),
            Instruction::Iconst4 => self.stack.push(Expr::int(4)),
            Instruction::Iconst5 => self.stack.push(Expr::int(5)),

            Instruction::Lconst0 => self.stack.push(Expr::LongLiteral(0)),
            Instruction::Lconst1 => self.stack.push(Expr::LongLiteral(1)),

            Instruction::Fconst0 => self.stack.push(Expr::FloatLiteral(0.0)),
            Instruction::Fconst1 => self.stack.push(Expr::FloatLiteral(1.0)),
            Instruction::Fconst2 => self.stack.push(Expr::FloatLiteral(2.0)),

            Instruction::Dconst0 => self.stack.push(Expr::DoubleLiteral(0.0)),
            Instruction::Dconst1 => self.stack.push(Expr::DoubleLiteral(1.0)),

            Instruction::Aconstnull => self.stack.push(Expr::NullLiteral),

            Instruction::Bipush(val) => self.stack.push(Expr::int(*val as i32)),
            Instruction::Sipush(val) => self.stack.push(Expr::int(*val as i32)),

            Instruction::Ldc(idx) => {
                let c = self.ctx.load_constant(*idx as u16, offset)?;
                self.stack.push(c);
            }
            Instruction::LdcW(idx) | Instruction::Ldc2W(idx) => {
                let c = self.ctx.load_constant(*idx, offset)?;
                self.stack.push(c);
            }

            // ============================================================
            // Arithmetic
            // ============================================================
            Instruction::Ineg | Instruction::Lneg | Instruction::Fneg | Instruction::Dneg => {
                let operand = pop!(self, offset);
                self.stack.push(Expr::UnaryOp { op: UnaryOp::Neg, operand: Box::new(operand) });
            }
            Instruction::Iinc { index, value } => {
                self.iinc(*index as u16, *value as i32, offset, next_instr)?;
            }
            Instruction::IincWide { index, value } => {
                self.iinc(*index, *value as i32, offset, next_instr)?;
            }

            // ============================================================
            // Comparisons
            // ============================================================
            Instruction::Lcmp
            | Instruction::Fcmpl
            | Instruction::Fcmpg
            | Instruction::Dcmpl
            | Instruction::Dcmpg => {
                let kind = match instr {
                    Instruction::Lcmp => CmpKind::LCmp,
                    Instruction::Fcmpl => CmpKind::FCmpL,
                    Instruction::Fcmpg => CmpKind::FCmpG,
                    Instruction::Dcmpl => CmpKind::DCmpL,
                    _ => CmpKind::DCmpG,
                };
                let right = pop!(self, offset);
                let left = pop!(self, offset);
                self.stack.push(Expr::CmpResult { kind, left: Box::new(left), right: Box::new(right) });
            }

            // ============================================================
            // Conditional branches
            // ============================================================
            Instruction::Ifeq(_)
            | Instruction::Ifne(_)
            | Instruction::Iflt(_)
            | Instruction::Ifge(_)
            | Instruction::Ifgt(_)
            | Instruction::Ifle(_) => {
                let op = match instr {
                    Instruction::Ifeq(_) => CompareOp::Eq,
                    Instruction::Ifne(_) => CompareOp::Ne,
                    Instruction::Iflt(_) => CompareOp::Lt,
                    Instruction::Ifge(_) => CompareOp::Ge,
                    Instruction::Ifgt(_) => CompareOp::Gt,
                    _ => CompareOp::Le,
                };
                let val = pop!(self, offset);
                self.branch(make_if_zero_cond(val, op), offset);
            }
            Instruction::IfIcmpeq(_)
            | Instruction::IfIcmpne(_)
            | Instruction::IfIcmplt(_)
            | Instruction::IfIcmpge(_)
            | Instruction::IfIcmpgt(_)
            | Instruction::IfIcmple(_)
            | Instruction::IfAcmpeq(_)
            | Instruction::IfAcmpne(_) => {
                let op = match instr {
                    Instruction::IfIcmpeq(_) | Instruction::IfAcmpeq(_) => CompareOp::Eq,
                    Instruction::IfIcmpne(_) | Instruction::IfAcmpne(_) => CompareOp::Ne,
                    Instruction::IfIcmplt(_) => CompareOp::Lt,
                    Instruction::IfIcmpge(_) => CompareOp::Ge,
                    Instruction::IfIcmpgt(_) => CompareOp::Gt,
                    _ => CompareOp::Le,
                };
                let right = pop!(self, offset);
                let left = pop!(self, offset);
                self.branch(Expr::Compare { op, left: Box::new(left), right: Box::new(right) }, offset);
            }
            Instruction::Ifnull(_) | Instruction::Ifnonnull(_) => {
                let op = if matches!(instr, Instruction::Ifnull(_)) { CompareOp::Eq } else { CompareOp::Ne };
                let val = pop!(self, offset);
                self.branch(
                    Expr::Compare { op, left: Box::new(val), right: Box::new(Expr::NullLiteral) },
                    offset,
                );
            }

            // ============================================================
            // Unconditional control flow
            // ============================================================
            Instruction::Goto(_) | Instruction::GotoW(_) => {}
            Instruction::Tableswitch { .. } | Instruction::Lookupswitch { .. } => {
                let val = pop!(self, offset);
                self.branch_loc = self.location(offset);
                self.switch_value = Some(val);
                self.stmt_start = None;
            }
            Instruction::Jsr(rel) => {
                self.emit(offset, Stmt::Jsr { target: util::jump_target(offset, *rel as i32) });
            }
            Instruction::JsrW(rel) => {
                self.emit(offset, Stmt::Jsr { target: util::jump_target(offset, *rel) });
            }
            Instruction::Ret(index) => self.emit(offset, Stmt::Ret { index: *index as u16 }),
            Instruction::RetWide(index) => self.emit(offset, Stmt::Ret { index: *index }),

            // ============================================================
            // Returns
            // ============================================================
            Instruction::Return => self.emit(offset, Stmt::Return(None)),
            Instruction::Ireturn
            | Instruction::Lreturn
            | Instruction::Freturn
            | Instruction::Dreturn
            | Instruction::Areturn => {
                let val = pop!(self, offset);
                self.emit(offset, Stmt::Return(Some(val)));
            }
            Instruction::Athrow => {
                let val = pop!(self, offset);
                self.emit(offset, Stmt::Throw(val));
            }

            // ============================================================
            // Field access
            // ============================================================
            Instruction::Getstatic(idx) | Instruction::Getfield(idx) => {
                let member = self.ctx.member(*idx, offset)?;
                let object = if matches!(instr, Instruction::Getfield(_)) {
                    Some(Box::new(pop!(self, offset)))
                } else {
                    None
                };
                self.stack.push(Expr::FieldGet {
                    object,
                    class_name: member.class_name.to_string(),
                    field_name: member.name.to_string(),
                    field_type: parse_type_descriptor(member.descriptor).unwrap_or(JvmType::Unknown),
                });
            }
            Instruction::Putstatic(idx) | Instruction::Putfield(idx) => {
                let member = self.ctx.member(*idx, offset)?;
                let value = pop!(self, offset);
                let object = if matches!(instr, Instruction::Putfield(_)) {
                    Some(pop!(self, offset))
                } else {
                    None
                };
                self.emit_ordered(
                    offset,
                    Stmt::FieldStore {
                        object,
                        class_name: member.class_name.to_string(),
                        field_name: member.name.to_string(),
                        field_type: parse_type_descriptor(member.descriptor).unwrap_or(JvmType::Unknown),
                        value,
                    },
                );
            }

            // ============================================================
            // Method invocation
            // ============================================================
            Instruction::Invokevirtual(idx) => self.invoke(InvokeKind::Virtual, *idx, offset)?,
            Instruction::Invokespecial(idx) => self.invoke(InvokeKind::Special, *idx, offset)?,
            Instruction::Invokestatic(idx) => self.invoke(InvokeKind::Static, *idx, offset)?,
            Instruction::Invokeinterface { index, .. } => {
                self.invoke(InvokeKind::Interface, *index, offset)?
            }
            Instruction::Invokedynamic { index, .. } => self.invoke_dynamic(*index, offset)?,

            // ============================================================
            // Object and array creation
            // ============================================================
            Instruction::New(idx) => {
                let class_name = self.ctx.class(*idx, offset)?.to_string();
                let id = *self.next_new;
                *self.next_new += 1;
                self.stack.push(Expr::UninitNew { class_name, id });
            }
            Instruction::Newarray(atype) => {
                let length = pop!(self, offset);
                self.stack.push(Expr::NewArray { element_type: newarray_type(*atype), length: Box::new(length) });
            }
            Instruction::Anewarray(idx) => {
                let element_type = class_constant_type(self.ctx.class(*idx, offset)?);
                let length = pop!(self, offset);
                self.stack.push(Expr::NewArray { element_type, length: Box::new(length) });
            }
            Instruction::Multianewarray { index, dimensions } => {
                let array_type = class_constant_type(self.ctx.class(*index, offset)?);
                let dimensions = self.pop_args(*dimensions as usize, offset)?;
                self.stack.push(Expr::NewMultiArray { array_type, dimensions });
            }
            Instruction::Arraylength => {
                let array = pop!(self, offset);
                self.stack.push(Expr::ArrayLength { array: Box::new(array) });
            }

            // ============================================================
            // Type checks
            // ============================================================
            Instruction::Checkcast(idx) => {
                let target_type = class_constant_type(self.ctx.class(*idx, offset)?);
                let operand = pop!(self, offset);
                self.stack.push(Expr::Cast { target_type, operand: Box::new(operand) });
            }
            Instruction::Instanceof(idx) => {
                let check_type = class_constant_type(self.ctx.class(*idx, offset)?);
                let operand = pop!(self, offset);
                self.stack.push(Expr::Instanceof { operand: Box::new(operand), check_type });
            }

            // ============================================================
            // Monitors
            // ============================================================
            Instruction::Monitorenter | Instruction::Monitorexit => {
                let object = pop!(self, offset);
                let enter = matches!(instr, Instruction::Monitorenter);
                self.emit_ordered(offset, Stmt::Monitor { enter, object });
            }

            // ============================================================
            // Stack manipulation
            // ============================================================
            Instruction::Pop => {
                let val = pop!(self, offset);
                if val.is_wide() {
                    return Err(MethodError::InvalidBytecode {
                        offset,
                        message: "pop of a category 2 value".into(),
                    });
                }
                self.discard(val, offset);
            }
            Instruction::Pop2 => {
                let top = pop!(self, offset);
                if top.is_wide() {
                    self.discard(top, offset);
                } else {
                    let below = pop!(self, offset);
                    self.discard(below, offset);
                    self.discard(top, offset);
                }
            }
            Instruction::Swap => {
                let v1 = pop!(self, offset);
                let v2 = pop!(self, offset);
                self.stack.push(v1);
                self.stack.push(v2);
            }
            Instruction::Dup => {
                let v1 = pop!(self, offset);
                let d1 = self.dup_value(v1, offset);
                self.stack.extend([d1.clone(), d1]);
            }
            Instruction::Dupx1 => {
                let v1 = pop!(self, offset);
                let v2 = pop!(self, offset);
                let d1 = self.dup_value(v1, offset);
                self.stack.extend([d1.clone(), v2, d1]);
            }
            Instruction::Dupx2 => {
                let v1 = pop!(self, offset);
                let v2 = pop!(self, offset);
                let d1 = self.dup_value(v1, offset);
                if v2.is_wide() {
                    self.stack.extend([d1.clone(), v2, d1]);
                } else {
                    let v3 = pop!(self, offset);
                    self.stack.extend([d1.clone(), v3, v2, d1]);
                }
            }
            Instruction::Dup2 => {
                let v1 = pop!(self, offset);
                if v1.is_wide() {
                    let d1 = self.dup_value(v1, offset);
                    self.stack.extend([d1.clone(), d1]);
                } else {
                    let v2 = pop!(self, offset);
                    let d2 = self.dup_value(v2, offset);
                    let d1 = self.dup_value(v1, offset);
                    self.stack.extend([d2.clone(), d1.clone(), d2, d1]);
                }
            }
            Instruction::Dup2x1 => {
                let v1 = pop!(self, offset);
                if v1.is_wide() {
                    let v2 = pop!(self, offset);
                    let d1 = self.dup_value(v1, offset);
                    self.stack.extend([d1.clone(), v2, d1]);
                } else {
                    let v2 = pop!(self, offset);
                    let v3 = pop!(self, offset);
                    let d2 = self.dup_value(v2, offset);
                    let d1 = self.dup_value(v1, offset);
                    self.stack.extend([d2.clone(), d1.clone(), v3, d2, d1]);
                }
            }
            Instruction::Dup2x2 => {
                let v1 = pop!(self, offset);
                if v1.is_wide() {
                    let v2 = pop!(self, offset);
                    let d1 = self.dup_value(v1, offset);
                    if v2.is_wide() {
                        self.stack.extend([d1.clone(), v2, d1]);
                    } else {
                        let v3 = pop!(self, offset);
                        self.stack.extend([d1.clone(), v3, v2, d1]);
                    }
                } else {
                    let v2 = pop!(self, offset);
                    let v3 = pop!(self, offset);
                    let d2 = self.dup_value(v2, offset);
                    let d1 = self.dup_value(v1, offset);
                    if v3.is_wide() {
                        self.stack.extend([d2.clone(), d1.clone(), v3, d2, d1]);
                    } else {
                        let v4 = pop!(self, offset);
                        self.stack.extend([d2.clone(), d1.clone(), v4, v3, d2, d1]);
                    }
                }
            }

            // Handled by the table lookups above.
            _ => {
                return Err(MethodError::InvalidBytecode {
                    offset,
                    message: format!("unexpected instruction {:?}", instr),
                })
            }
        }
        Ok(())
    }

    /// A popped value survives only if evaluating it does something.
    fn discard(&mut self, val: Expr, offset: u32) {
        if val.has_side_effects() {
            self.emit_ordered(offset, Stmt::ExprStmt(val));
        }
    }
}

/// Simulate a single basic block starting from `entry_stack`, converting bytecode
/// instructions into expression trees and statement lists.
pub fn simulate_block(
    ctx: &MethodContext<'_>,
    block: &BasicBlock,
    entry_stack: Vec<Expr>,
    arena: &mut DupArena,
    next_new: &mut u32,
) -> Result<SimulatedBlock, MethodError> {
    let mut sim = BlockSimulator {
        ctx,
        arena,
        next_new,
        stack: entry_stack.clone(),
        statements: Vec::new(),
        stmt_start: None,
        branch_condition: None,
        switch_value: None,
        branch_loc: Location::at(block.last_address()),
        skip_next_load: false,
    };
    for (i, addressed) in block.instructions.iter().enumerate() {
        let next_instr = block.instructions.get(i + 1);
        let next = next_instr.map(|n| n.address).unwrap_or(block.end);
        sim.step(
            &addressed.instruction,
            addressed.address,
            next,
            next_instr.map(|n| &n.instruction),
        )?;
    }

    Ok(SimulatedBlock {
        id: block.id,
        statements: sim.statements,
        entry_stack,
        exit_stack: sim.stack,
        terminator: block.terminator.clone(),
        branch_condition: sim.branch_condition,
        switch_value: sim.switch_value,
        branch_loc: sim.branch_loc,
    })
}

/// Simulate every reachable block in reverse postorder so each join sees its
/// predecessors' exit stacks.
pub fn simulate_method(
    ctx: &MethodContext<'_>,
    cfg: &ControlFlowGraph,
    budget: &mut Budget,
) -> Result<SimulatedMethod, MethodError> {
    let preds = cfg.predecessor_map();
    let handlers = handler_types(ctx.pool, cfg);
    let mut arena = DupArena::default();
    let mut next_new = 0u32;
    let mut blocks: BTreeMap<BlockId, SimulatedBlock> = BTreeMap::new();

    for id in cfg.reverse_postorder() {
        budget.step(id)?;
        let Some(block) = cfg.blocks.get(&id) else { continue };
        let entry = match handlers.get(&id) {
            Some(ty) => vec![Expr::CaughtException(ty.clone())],
            None => entry_stack(id, preds.get(&id).map(Vec::as_slice).unwrap_or(&[]), &blocks)?,
        };
        let simulated = simulate_block(ctx, block, entry, &mut arena, &mut next_new)?;
        blocks.insert(id, simulated);
    }
    tracing::trace!(blocks = blocks.len(), bindings = arena.len(), "simulated method");
    Ok(SimulatedMethod { blocks, arena })
}

/// Exception type on entry to each handler block.
fn handler_types(pool: &ConstantPool, cfg: &ControlFlowGraph) -> BTreeMap<BlockId, JvmType> {
    let mut out: BTreeMap<BlockId, JvmType> = BTreeMap::new();
    for edge in &cfg.exception_edges {
        let name = match edge.catch_type {
            0 => THROWABLE,
            idx => pool.class_name(idx).unwrap_or(THROWABLE),
        };
        let ty = JvmType::Reference(name.to_string());
        out.entry(edge.handler_block)
            .and_modify(|existing| {
                if *existing != ty {
                    *existing = JvmType::Reference(THROWABLE.into());
                }
            })
            .or_insert(ty);
    }
    out
}

/// Operand stack on entry to `block`: values every predecessor agrees on are
/// carried through, the rest become `StackSlot` placeholders.
fn entry_stack(
    block: BlockId,
    preds: &[BlockId],
    done: &BTreeMap<BlockId, SimulatedBlock>,
) -> Result<Vec<Expr>, MethodError> {
    let mut incoming: Vec<Vec<Expr>> = Vec::new();
    let mut complete = true;
    for p in preds {
        match done.get(p) {
            Some(sim) => {
                let mut stack = sim.exit_stack.clone();
                if matches!(sim.terminator, Terminator::Jsr { target, .. } if target == block) {
                    stack.push(Expr::ReturnAddress);
                }
                incoming.push(stack);
            }
            None => complete = false,
        }
    }
    let Some(first) = incoming.first() else { return Ok(Vec::new()) };
    if incoming.iter().any(|s| s.len() != first.len()) {
        return Err(MethodError::UnsupportedStackMerge { offset: block });
    }
    Ok(first
        .iter()
        .enumerate()
        .map(|(index, v)| {
            if complete && incoming.iter().all(|s| s[index] == *v) {
                v.clone()
            } else {
                Expr::StackSlot { block, index, ty: v.type_of() }
            }
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

fn binary_op(instr: &Instruction) -> Option<BinOp> {
    use Instruction::*;
    Some(match instr {
        Iadd | Ladd | Fadd | Dadd => BinOp::Add,
        Isub | Lsub | Fsub | Dsub => BinOp::Sub,
        Imul | Lmul | Fmul | Dmul => BinOp::Mul,
        Idiv | Ldiv | Fdiv | Ddiv => BinOp::Div,
        Irem | Lrem | Frem | Drem => BinOp::Rem,
        Ishl | Lshl => BinOp::Shl,
        Ishr | Lshr => BinOp::Shr,
        Iushr | Lushr => BinOp::Ushr,
        Iand | Land => BinOp::And,
        Ior | Lor => BinOp::Or,
        Ixor | Lxor => BinOp::Xor,
        _ => return None,
    })
}

fn conversion(instr: &Instruction) -> Option<JvmType> {
    use Instruction::*;
    Some(match instr {
        I2l | F2l | D2l => JvmType::Long,
        I2f | L2f | D2f => JvmType::Float,
        I2d | L2d | F2d => JvmType::Double,
        L2i | F2i | D2i => JvmType::Int,
        I2b => JvmType::Byte,
        I2c => JvmType::Char,
        I2s => JvmType::Short,
        _ => return None,
    })
}

/// Build a branch condition for `if<cond>` opcodes that compare against zero.
/// A `CmpResult` operand (from lcmp/fcmp/dcmp) folds into a direct comparison,
/// and booleans test themselves.
fn make_if_zero_cond(val: Expr, op: CompareOp) -> Expr {
    match val {
        Expr::CmpResult { left, right, .. } => Expr::Compare { op, left, right },
        val if val.type_of() == JvmType::Boolean && matches!(op, CompareOp::Eq | CompareOp::Ne) => {
            if op == CompareOp::Ne {
                val
            } else {
                val.negate()
            }
        }
        val => Expr::Compare { op, left: Box::new(val), right: Box::new(Expr::int(0)) },
    }
}

/// `new StringBuilder(s).append(a)...append(z).toString()` as the `+` chain javac compiled
/// it from. Char and boolean literals are narrowed by the `append` overload they went to.
fn builder_concat(receiver: &Expr) -> Option<Expr> {
    let mut parts = Vec::new();
    let mut cur = receiver;
    loop {
        match cur {
            Expr::MethodCall { kind: InvokeKind::Virtual, object: Some(inner), class_name, method_name, descriptor, args, .. }
                if method_name == "append" && STRING_BUILDERS.contains(&class_name.as_str()) =>
            {
                let (params, _) = parse_method_descriptor(descriptor)?;
                let ([ty], [arg]) = (params.as_slice(), args.as_slice()) else { return None };
                // append(char[]) copies characters; a concatenation would print the array.
                if matches!(ty, JvmType::Array(_)) {
                    return None;
                }
                let mut part = arg.clone();
                narrow_to(&mut part, ty);
                parts.push(part);
                cur = inner;
            }
            Expr::New { class_name, constructor_descriptor, args } if STRING_BUILDERS.contains(&class_name.as_str()) => {
                match (constructor_descriptor.as_str(), args.as_slice()) {
                    ("()V", []) => {}
                    ("(Ljava/lang/String;)V", [first]) => parts.push(unwrap_value_of(first)),
                    _ => return None,
                }
                break;
            }
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    parts.reverse();
    Some(Expr::StringConcat(parts))
}

/// Older compilers seed the builder with `String.valueOf(x)`.
fn unwrap_value_of(first: &Expr) -> Expr {
    match first {
        Expr::MethodCall { kind: InvokeKind::Static, object: None, class_name, method_name, descriptor, args, .. }
            if class_name == "java/lang/String" && method_name == "valueOf" && !descriptor.starts_with("([C") =>
        {
            match args.as_slice() {
                [x] => x.clone(),
                _ => first.clone(),
            }
        }
        _ => first.clone(),
    }
}

/// Expands a `makeConcatWithConstants` recipe into its literal and argument parts.
fn string_concat(
    ctx: &MethodContext<'_>,
    bootstrap: &BootstrapMethod,
    factory_method: &str,
    args: Vec<Expr>,
    offset: u32,
) -> Result<Expr, MethodError> {
    if factory_method != "makeConcatWithConstants" {
        return Ok(Expr::StringConcat(args));
    }
    let recipe = bootstrap
        .bootstrap_arguments
        .first()
        .and_then(|&i| match ctx.pool.get(i) {
            Some(ConstantInfo::String(s)) => ctx.pool.utf8(s.string_index),
            _ => None,
        })
        .ok_or_else(|| MethodError::InvalidBytecode {
            offset,
            message: "string concatenation without a recipe".into(),
        })?;
    let mut constants = bootstrap.bootstrap_arguments.iter().skip(1);
    let mut args = args.into_iter();
    let mut parts = Vec::new();
    let mut literal = String::new();
    for c in recipe.chars() {
        match c {
            '\u{1}' | '\u{2}' => {
                if !literal.is_empty() {
                    parts.push(Expr::StringLiteral(std::mem::take(&mut literal)));
                }
                let part = if c == '\u{1}' {
                    args.next()
                } else {
                    match constants.next() {
                        Some(&i) => Some(ctx.load_constant(i, offset)?),
                        None => None,
                    }
                };
                parts.push(part.ok_or_else(|| MethodError::InvalidBytecode {
                    offset,
                    message: "string concatenation recipe does not match its arguments".into(),
                })?);
            }
            c => literal.push(c),
        }
    }
    if !literal.is_empty() {
        parts.push(Expr::StringLiteral(literal));
    }
    Ok(Expr::StringConcat(parts))
}

// ---------------------------------------------------------------------------
// Duplicate resolution
// ---------------------------------------------------------------------------

/// Rewrites every `DupStore`/`DupLoad` pair into ordinary expressions.
///
/// Bindings are visited newest first so nested bindings (inner array initializers,
/// `a[i]++` operands) are folded before the values that contain them. Each binding
/// becomes, in order of preference: an array initializer, a postfix increment, an
/// assignment used as a value, a read of the variable it was stored to, an inlined
/// copy, or a synthetic `dupN` local.
pub fn resolve_duplicates(
    blocks: &mut BTreeMap<BlockId, SimulatedBlock>,
    arena: &DupArena,
    max_locals: u16,
) -> Result<(), MethodError> {
    for id in (0..arena.len() as DupId).rev() {
        let Some(binding) = arena.get(id) else { continue };
        let Some((block_id, at)) = find_binding(blocks, id) else {
            if count_loads(blocks, id) > 0 {
                return Err(MethodError::InvalidBytecode {
                    offset: binding.offset,
                    message: format!("duplicated value {} read but never bound", id),
                });
            }
            continue;
        };
        let total = count_loads(blocks, id);
        let Some(block) = blocks.get_mut(&block_id) else { continue };
        let removed = block.statements.remove(at);
        let loc = removed.loc;
        let Stmt::DupStore { value, .. } = removed.stmt else { continue };

        if total == 0 {
            if value.has_side_effects() {
                block.statements.insert(at, LocatedStmt::new(loc, Stmt::ExprStmt(value)));
            }
            continue;
        }

        let replacement = if binding.pinned {
            None
        } else {
            fold_array_init(&mut block.statements, at, id, &value, total)
                .or_else(|| fold_postfix(&mut block.statements, at, id, &value, total))
                .or_else(|| fold_assignment(block, at, id, &value, total))
                .or_else(|| read_stored_local(block, at, id, &value, total))
                .or_else(|| inline_pure(block, at, id, &value, total))
                .or_else(|| (total == 1).then(|| value.clone()))
        };

        let replacement = match replacement {
            Some(r) => r,
            None => {
                let index = u16::try_from(id)
                    .ok()
                    .and_then(|id| max_locals.checked_add(id))
                    .ok_or_else(|| MethodError::InvalidBytecode {
                        offset: binding.offset,
                        message: "too many duplicated values".into(),
                    })?;
                let mut var = LocalVar::new(index, binding.ty.clone());
                var.name = Some(format!("dup{}", id));
                block
                    .statements
                    .insert(at, LocatedStmt::new(loc, Stmt::LocalStore { var: var.clone(), value }));
                Expr::LocalLoad(var)
            }
        };
        substitute(blocks, id, &replacement);
    }
    Ok(())
}

fn is_load_of(e: &Expr, id: DupId) -> bool {
    matches!(e, Expr::DupLoad { id: d, .. } if *d == id)
}

fn expr_reads_dup(e: &Expr, id: DupId) -> usize {
    let mut n = 0;
    e.visit(&mut |x| {
        if is_load_of(x, id) {
            n += 1;
        }
    });
    n
}

fn stmt_reads_dup(s: &Stmt, id: DupId) -> usize {
    let mut n = 0;
    s.for_each_expr(&mut |e| n += expr_reads_dup(e, id));
    n
}

fn block_tail_reads(block: &SimulatedBlock, id: DupId) -> usize {
    block.branch_condition.as_ref().map_or(0, |c| expr_reads_dup(c, id))
        + block.switch_value.as_ref().map_or(0, |c| expr_reads_dup(c, id))
}

fn count_loads(blocks: &BTreeMap<BlockId, SimulatedBlock>, id: DupId) -> usize {
    blocks
        .values()
        .map(|b| b.statements.iter().map(|s| stmt_reads_dup(&s.stmt, id)).sum::<usize>() + block_tail_reads(b, id))
        .sum()
}

fn find_binding(blocks: &BTreeMap<BlockId, SimulatedBlock>, id: DupId) -> Option<(BlockId, usize)> {
    blocks.iter().find_map(|(b, block)| {
        block
            .statements
            .iter()
            .position(|s| matches!(s.stmt, Stmt::DupStore { id: d, .. } if d == id))
            .map(|i| (*b, i))
    })
}

fn substitute(blocks: &mut BTreeMap<BlockId, SimulatedBlock>, id: DupId, replacement: &Expr) {
    let mut replace = |e: &mut Expr| {
        if is_load_of(e, id) {
            *e = replacement.clone();
        }
    };
    for block in blocks.values_mut() {
        for s in &mut block.statements {
            s.stmt.for_each_expr_mut(&mut |e| e.transform(&mut replace));
        }
        if let Some(c) = &mut block.branch_condition {
            c.transform(&mut replace);
        }
        if let Some(c) = &mut block.switch_value {
            c.transform(&mut replace);
        }
    }
}

/// The lvalue a store writes, as an expression, and the stored value.
fn store_target(stmt: &Stmt) -> Option<(Expr, &Expr)> {
    match stmt {
        Stmt::LocalStore { var, value } => Some((Expr::LocalLoad(var.clone()), value)),
        Stmt::FieldStore { object, class_name, field_name, field_type, value } => Some((
            Expr::FieldGet {
                object: object.clone().map(Box::new),
                class_name: class_name.clone(),
                field_name: field_name.clone(),
                field_type: field_type.clone(),
            },
            value,
        )),
        Stmt::ArrayStore { array, index, value } => Some((
            Expr::ArrayLoad {
                array: Box::new(array.clone()),
                index: Box::new(index.clone()),
                element_type: value.type_of(),
            },
            value,
        )),
        _ => None,
    }
}

/// Both expressions name the same variable, field or array element.
fn same_lvalue(a: &Expr, b: &Expr) -> bool {
    match (a, b) {
        (Expr::LocalLoad(x), Expr::LocalLoad(y)) => x == y,
        (
            Expr::FieldGet { object: o1, class_name: c1, field_name: f1, .. },
            Expr::FieldGet { object: o2, class_name: c2, field_name: f2, .. },
        ) => o1 == o2 && c1 == c2 && f1 == f2,
        (Expr::ArrayLoad { array: a1, index: i1, .. }, Expr::ArrayLoad { array: a2, index: i2, .. }) => {
            a1 == a2 && i1 == i2
        }
        _ => false,
    }
}

fn is_one(e: &Expr) -> bool {
    match e {
        Expr::IntLiteral { value, .. } => *value == 1,
        Expr::LongLiteral(v) => *v == 1,
        Expr::FloatLiteral(v) => *v == 1.0,
        Expr::DoubleLiteral(v) => *v == 1.0,
        _ => false,
    }
}

/// `new T[n]` followed by stores to indices `0..n` and one remaining read.
fn fold_array_init(stmts: &mut Vec<LocatedStmt>, at: usize, id: DupId, value: &Expr, total: usize) -> Option<Expr> {
    let Expr::NewArray { element_type, length } = value else { return None };
    let len = usize::try_from(length.int_value()?).ok()?;
    if len == 0 || total != len + 1 || stmts.len() < at + len {
        return None;
    }
    let mut values = Vec::with_capacity(len);
    for (k, s) in stmts[at..at + len].iter().enumerate() {
        match &s.stmt {
            Stmt::ArrayStore { array, index, value }
                if is_load_of(array, id)
                    && index.int_value() == Some(k as i32)
                    && expr_reads_dup(value, id) == 0 =>
            {
                values.push(value.clone())
            }
            _ => return None,
        }
    }
    stmts.drain(at..at + len);
    Some(Expr::ArrayInit { element_type: element_type.clone(), values })
}

/// `v = x; x = v + 1; ...v...` becomes `x++`.
fn fold_postfix(stmts: &mut Vec<LocatedStmt>, at: usize, id: DupId, value: &Expr, total: usize) -> Option<Expr> {
    if total != 2 {
        return None;
    }
    let (target, stored) = store_target(&stmts.get(at)?.stmt)?;
    if !same_lvalue(&target, value) {
        return None;
    }
    let stored = match stored {
        Expr::Cast { target_type, operand } if target_type.is_int_like() => operand,
        other => other,
    };
    let increment = match stored {
        Expr::BinaryOp { op, left, right } if is_load_of(left, id) && is_one(right) => match op {
            BinOp::Add => true,
            BinOp::Sub => false,
            _ => return None,
        },
        _ => return None,
    };
    stmts.remove(at);
    Some(Expr::IncDec { target: Box::new(value.clone()), increment, prefix: false })
}

/// `v = e; x = v;` with `v` read once more right afterwards becomes `(x = e)`.
fn fold_assignment(block: &mut SimulatedBlock, at: usize, id: DupId, value: &Expr, total: usize) -> Option<Expr> {
    if total != 2 {
        return None;
    }
    let (target, stored) = store_target(&block.statements.get(at)?.stmt)?;
    if !is_load_of(stored, id) {
        return None;
    }
    let adjacent = match block.statements.get(at + 1) {
        Some(next) => stmt_reads_dup(&next.stmt, id) == 1,
        None => block_tail_reads(block, id) == 1,
    };
    if !adjacent {
        return None;
    }
    block.statements.remove(at);
    Some(Expr::Assign { target: Box::new(target), value: Box::new(value.clone()) })
}

/// `v = e; x = v; ...v...` where `x` is a local that stays unchanged: read `x`.
fn read_stored_local(block: &mut SimulatedBlock, at: usize, id: DupId, value: &Expr, total: usize) -> Option<Expr> {
    let Stmt::LocalStore { var, value: stored } = &block.statements.get(at)?.stmt else { return None };
    if !is_load_of(stored, id) {
        return None;
    }
    let var = var.clone();
    let rest = &block.statements[at + 1..];
    let in_block: usize = rest.iter().map(|s| stmt_reads_dup(&s.stmt, id)).sum::<usize>() + block_tail_reads(block, id);
    if in_block + 1 != total || rest.iter().any(|s| s.stmt.stored_local() == Some(&var)) {
        return None;
    }
    if let Stmt::LocalStore { value: stored, .. } = &mut block.statements[at].stmt {
        *stored = value.clone();
    }
    Some(Expr::LocalLoad(var))
}

/// Copies of a local read are inlined while the local is not written in between.
fn inline_pure(block: &SimulatedBlock, at: usize, id: DupId, value: &Expr, total: usize) -> Option<Expr> {
    if !value.is_pure() {
        return None;
    }
    let Expr::LocalLoad(var) = value else { return Some(value.clone()) };
    let rest = &block.statements[at..];
    let mut seen = 0;
    for s in rest {
        seen += stmt_reads_dup(&s.stmt, id);
        if s.stmt.stored_local() == Some(var) {
            return (seen == total).then(|| value.clone());
        }
    }
    seen += block_tail_reads(block, id);
    (seen == total).then(|| value.clone())
}
