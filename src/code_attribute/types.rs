/// One decoded bytecode instruction. Branch operands are kept as the raw signed offsets
/// relative to the instruction's own address.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Instruction {
    Nop,
    Aaload,
    Aastore,
    Aconstnull,
    Aload(u8),
    Aload0,
    Aload1,
    Aload2,
    Aload3,
    Anewarray(u16),
    Areturn,
    Arraylength,
    Astore(u8),
    Astore0,
    Astore1,
    Astore2,
    Astore3,
    Athrow,
    Baload,
    Bastore,
    Bipush(i8),
    Caload,
    Castore,
    Checkcast(u16),
    D2f,
    D2i,
    D2l,
    Dadd,
    Daload,
    Dastore,
    Dcmpg,
    Dcmpl,
    Dconst0,
    Dconst1,
    Ddiv,
    Dload(u8),
    Dload0,
    Dload1,
    Dload2,
    Dload3,
    Dmul,
    Dneg,
    Drem,
    Dreturn,
    Dstore(u8),
    Dstore0,
    Dstore1,
    Dstore2,
    Dstore3,
    Dsub,
    Dup,
    Dupx1,
    Dupx2,
    Dup2,
    Dup2x1,
    Dup2x2,
    F2d,
    F2i,
    F2l,
    Fadd,
    Faload,
    Fastore,
    Fcmpg,
    Fcmpl,
    Fconst0,
    Fconst1,
    Fconst2,
    Fdiv,
    Fload(u8),
    Fload0,
    Fload1,
    Fload2,
    Fload3,
    Fmul,
    Fneg,
    Frem,
    Freturn,
    Fstore(u8),
    Fstore0,
    Fstore1,
    Fstore2,
    Fstore3,
    Fsub,
    Getfield(u16),
    Getstatic(u16),
    Goto(i16),
    GotoW(i32),
    I2b,
    I2c,
    I2d,
    I2f,
    I2l,
    I2s,
    Iadd,
    Iaload,
    Iand,
    Iastore,
    Iconstm1,
    Iconst0,
    Iconst1,
    Iconst2,
    Iconst3,
    Iconst4,
    Iconst5,
    Idiv,
    IfAcmpeq(i16),
    IfAcmpne(i16),
    IfIcmpeq(i16),
    IfIcmpne(i16),
    IfIcmplt(i16),
    IfIcmpge(i16),
    IfIcmpgt(i16),
    IfIcmple(i16),
    Ifeq(i16),
    Ifne(i16),
    Iflt(i16),
    Ifge(i16),
    Ifgt(i16),
    Ifle(i16),
    Ifnonnull(i16),
    Ifnull(i16),
    Iinc { index: u8, value: i8 },
    Iload(u8),
    Iload0,
    Iload1,
    Iload2,
    Iload3,
    Imul,
    Ineg,
    Instanceof(u16),
    Invokedynamic { index: u16, filler: u16 },
    Invokeinterface { index: u16, count: u8, filler: u8 },
    Invokespecial(u16),
    Invokestatic(u16),
    Invokevirtual(u16),
    Ior,
    Irem,
    Ireturn,
    Ishl,
    Ishr,
    Istore(u8),
    Istore0,
    Istore1,
    Istore2,
    Istore3,
    Isub,
    Iushr,
    Ixor,
    Jsr(i16),
    JsrW(i32),
    L2d,
    L2f,
    L2i,
    Ladd,
    Laload,
    Land,
    Lastore,
    Lcmp,
    Lconst0,
    Lconst1,
    Ldc(u8),
    LdcW(u16),
    Ldc2W(u16),
    Ldiv,
    Lload(u8),
    Lload0,
    Lload1,
    Lload2,
    Lload3,
    Lmul,
    Lneg,
    Lookupswitch {
        default: i32,
        npairs: u32,
        pairs: Vec<(i32, i32)>,
    },
    Lor,
    Lrem,
    Lreturn,
    Lshl,
    Lshr,
    Lstore(u8),
    Lstore0,
    Lstore1,
    Lstore2,
    Lstore3,
    Lsub,
    Lushr,
    Lxor,
    Monitorenter,
    Monitorexit,
    Multianewarray { index: u16, dimensions: u8 },
    New(u16),
    Newarray(u8),
    Pop,
    Pop2,
    Putfield(u16),
    Putstatic(u16),
    Ret(u8),
    Return,
    Saload,
    Sastore,
    Sipush(i16),
    Swap,
    Tableswitch {
        default: i32,
        low: i32,
        high: i32,
        offsets: Vec<i32>,
    },
    AloadWide(u16),
    AstoreWide(u16),
    DloadWide(u16),
    DstoreWide(u16),
    FloadWide(u16),
    FstoreWide(u16),
    IloadWide(u16),
    IstoreWide(u16),
    LloadWide(u16),
    LstoreWide(u16),
    RetWide(u16),
    IincWide { index: u16, value: i16 },
}

fn relative(address: u32, offset: i32) -> u32 {
    (address as i64 + offset as i64) as u32
}

impl Instruction {
    /// Relative offset of a conditional branch, `goto` or `jsr`.
    pub fn branch_offset(&self) -> Option<i32> {
        use Instruction::*;
        match self {
            Ifeq(o) | Ifne(o) | Iflt(o) | Ifge(o) | Ifgt(o) | Ifle(o) | IfIcmpeq(o) | IfIcmpne(o)
            | IfIcmplt(o) | IfIcmpge(o) | IfIcmpgt(o) | IfIcmple(o) | IfAcmpeq(o) | IfAcmpne(o)
            | Ifnull(o) | Ifnonnull(o) | Goto(o) | Jsr(o) => Some(*o as i32),
            GotoW(o) | JsrW(o) => Some(*o),
            _ => None,
        }
    }

    pub fn is_conditional_branch(&self) -> bool {
        self.branch_offset().is_some() && !self.is_goto() && !self.is_jsr()
    }

    pub fn is_goto(&self) -> bool {
        matches!(self, Instruction::Goto(_) | Instruction::GotoW(_))
    }

    pub fn is_jsr(&self) -> bool {
        matches!(self, Instruction::Jsr(_) | Instruction::JsrW(_))
    }

    pub fn is_return(&self) -> bool {
        use Instruction::*;
        matches!(self, Return | Ireturn | Lreturn | Freturn | Dreturn | Areturn)
    }

    pub fn is_switch(&self) -> bool {
        matches!(self, Instruction::Tableswitch { .. } | Instruction::Lookupswitch { .. })
    }

    /// Control never falls through to the next instruction.
    pub fn ends_flow(&self) -> bool {
        self.is_goto()
            || self.is_return()
            || self.is_switch()
            || matches!(self, Instruction::Athrow | Instruction::Ret(_) | Instruction::RetWide(_))
    }

    /// Last instruction of a basic block: any jump, switch or exit.
    pub fn ends_block(&self) -> bool {
        self.branch_offset().is_some() || self.ends_flow()
    }

    /// Absolute addresses this instruction can jump to when it sits at `address`.
    /// Switches list their default target first.
    pub fn jump_targets(&self, address: u32) -> Vec<u32> {
        match self {
            Instruction::Tableswitch { default, offsets, .. } => std::iter::once(*default)
                .chain(offsets.iter().copied())
                .map(|o| relative(address, o))
                .collect(),
            Instruction::Lookupswitch { default, pairs, .. } => std::iter::once(*default)
                .chain(pairs.iter().map(|(_, o)| *o))
                .map(|o| relative(address, o))
                .collect(),
            other => other.branch_offset().map(|o| vec![relative(address, o)]).unwrap_or_default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalVariableTableAttribute {
    pub local_variable_table_length: u16,
    pub items: Vec<LocalVariableTableItem>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalVariableTableItem {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub index: u16,
}

impl LocalVariableTableItem {
    /// Whether the variable is live at `pc`. Stores happen one instruction before the
    /// range starts, so callers probing a store pass the following instruction's address.
    pub fn covers(&self, pc: u32) -> bool {
        let start = self.start_pc as u32;
        pc >= start && pc < start + self.length as u32
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalVariableTypeTableAttribute {
    pub local_variable_type_table_length: u16,
    pub local_variable_type_table: Vec<LocalVariableTypeTableItem>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalVariableTypeTableItem {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: u16,
    pub signature_index: u16,
    pub index: u16,
}

impl LocalVariableTypeTableItem {
    pub fn covers(&self, pc: u32) -> bool {
        let start = self.start_pc as u32;
        pc >= start && pc < start + self.length as u32
    }
}
