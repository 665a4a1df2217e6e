//! Arithmetic replay of the operand stack: depth in words before every instruction,
//! without building any expression trees.

use std::collections::BTreeMap;

use crate::attribute_info::CodeAttribute;
use crate::code_attribute::Instruction;
use crate::constant_info::ConstantPool;
use crate::error::MethodError;

use super::descriptor::{parse_method_descriptor, parse_type_descriptor, JvmType};
use super::util;

/// Stack depth (in words) on entry to each reachable instruction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StackDepths {
    pub before: BTreeMap<u32, u16>,
    pub max_depth: u16,
}

impl StackDepths {
    pub fn at(&self, offset: u32) -> Option<u16> {
        self.before.get(&offset).copied()
    }
}

fn words(ty: &JvmType) -> u16 {
    match ty {
        JvmType::Void => 0,
        t if t.is_wide() => 2,
        _ => 1,
    }
}

fn bad(offset: u32, message: &str) -> MethodError {
    MethodError::InvalidBytecode { offset, message: message.to_string() }
}

fn field_words(pool: &ConstantPool, index: u16, offset: u32) -> Result<u16, MethodError> {
    let member = pool.member_ref(index).ok_or_else(|| bad(offset, "field reference expected"))?;
    let ty = parse_type_descriptor(member.descriptor).ok_or_else(|| bad(offset, "bad field descriptor"))?;
    Ok(words(&ty))
}

/// Words popped for the arguments and pushed for the result of a method descriptor.
fn call_words(descriptor: &str, offset: u32) -> Result<(u16, u16), MethodError> {
    let (params, ret) = parse_method_descriptor(descriptor).ok_or_else(|| bad(offset, "bad method descriptor"))?;
    Ok((params.iter().map(words).sum(), words(&ret)))
}

fn invoke_words(pool: &ConstantPool, index: u16, receiver: u16, offset: u32) -> Result<(u16, u16), MethodError> {
    let member = pool.member_ref(index).ok_or_else(|| bad(offset, "method reference expected"))?;
    let (args, ret) = call_words(member.descriptor, offset)?;
    Ok((args + receiver, ret))
}

/// `(popped, pushed)` words for one instruction.
fn effect(instr: &Instruction, pool: &ConstantPool, offset: u32) -> Result<(u16, u16), MethodError> {
    use Instruction::*;
    Ok(match instr {
        Nop | Goto(_) | GotoW(_) | Return | Iinc { .. } | IincWide { .. } | Ret(_) | RetWide(_) => (0, 0),
        Aconstnull | Iconstm1 | Iconst0 | Iconst1 | Iconst2 | Iconst3 | Iconst4 | Iconst5 | Fconst0
        | Fconst1 | Fconst2 | Bipush(_) | Sipush(_) | Ldc(_) | LdcW(_) | New(_) | Jsr(_) | JsrW(_) => (0, 1),
        Lconst0 | Lconst1 | Dconst0 | Dconst1 | Ldc2W(_) => (0, 2),
        Iload(_) | Iload0 | Iload1 | Iload2 | Iload3 | IloadWide(_) | Fload(_) | Fload0 | Fload1
        | Fload2 | Fload3 | FloadWide(_) | Aload(_) | Aload0 | Aload1 | Aload2 | Aload3 | AloadWide(_) => (0, 1),
        Lload(_) | Lload0 | Lload1 | Lload2 | Lload3 | LloadWide(_) | Dload(_) | Dload0 | Dload1
        | Dload2 | Dload3 | DloadWide(_) => (0, 2),
        Istore(_) | Istore0 | Istore1 | Istore2 | Istore3 | IstoreWide(_) | Fstore(_) | Fstore0
        | Fstore1 | Fstore2 | Fstore3 | FstoreWide(_) | Astore(_) | Astore0 | Astore1 | Astore2
        | Astore3 | AstoreWide(_) => (1, 0),
        Lstore(_) | Lstore0 | Lstore1 | Lstore2 | Lstore3 | LstoreWide(_) | Dstore(_) | Dstore0
        | Dstore1 | Dstore2 | Dstore3 | DstoreWide(_) => (2, 0),
        Iaload | Faload | Aaload | Baload | Caload | Saload => (2, 1),
        Laload | Daload => (2, 2),
        Iastore | Fastore | Aastore | Bastore | Castore | Sastore => (3, 0),
        Lastore | Dastore => (4, 0),
        Pop => (1, 0),
        Pop2 => (2, 0),
        Dup => (1, 2),
        Dupx1 => (2, 3),
        Dupx2 => (3, 4),
        Dup2 => (2, 4),
        Dup2x1 => (3, 5),
        Dup2x2 => (4, 6),
        Swap => (2, 2),
        Iadd | Isub | Imul | Idiv | Irem | Ishl | Ishr | Iushr | Iand | Ior | Ixor | Fadd | Fsub
        | Fmul | Fdiv | Frem => (2, 1),
        Ladd | Lsub | Lmul | Ldiv | Lrem | Land | Lor | Lxor | Dadd | Dsub | Dmul | Ddiv | Drem => (4, 2),
        Lshl | Lshr | Lushr => (3, 2),
        Ineg | Fneg | I2f | F2i | I2b | I2c | I2s => (1, 1),
        Lneg | Dneg | L2d | D2l => (2, 2),
        I2l | I2d | F2l | F2d => (1, 2),
        L2i | L2f | D2i | D2f => (2, 1),
        Lcmp | Dcmpl | Dcmpg => (4, 1),
        Fcmpl | Fcmpg => (2, 1),
        Ifeq(_) | Ifne(_) | Iflt(_) | Ifge(_) | Ifgt(_) | Ifle(_) | Ifnull(_) | Ifnonnull(_) => (1, 0),
        IfIcmpeq(_) | IfIcmpne(_) | IfIcmplt(_) | IfIcmpge(_) | IfIcmpgt(_) | IfIcmple(_)
        | IfAcmpeq(_) | IfAcmpne(_) => (2, 0),
        Tableswitch { .. } | Lookupswitch { .. } => (1, 0),
        Ireturn | Freturn | Areturn | Athrow => (1, 0),
        Lreturn | Dreturn => (2, 0),
        Getstatic(i) => (0, field_words(pool, *i, offset)?),
        Putstatic(i) => (field_words(pool, *i, offset)?, 0),
        Getfield(i) => (1, field_words(pool, *i, offset)?),
        Putfield(i) => (1 + field_words(pool, *i, offset)?, 0),
        Invokevirtual(i) | Invokespecial(i) => invoke_words(pool, *i, 1, offset)?,
        Invokeinterface { index, .. } => invoke_words(pool, *index, 1, offset)?,
        Invokestatic(i) => invoke_words(pool, *i, 0, offset)?,
        Invokedynamic { index, .. } => {
            let (_, descriptor) = pool
                .dynamic_name_and_type(*index)
                .ok_or_else(|| bad(offset, "invokedynamic reference expected"))?;
            call_words(descriptor, offset)?
        }
        Newarray(_) | Anewarray(_) | Arraylength | Checkcast(_) | Instanceof(_) => (1, 1),
        Monitorenter | Monitorexit => (1, 0),
        Multianewarray { dimensions, .. } => (*dimensions as u16, 1),
    })
}

/// Replays `code` and records the stack depth before each reachable instruction.
///
/// Fails with `StackUnderflow` when an instruction pops more than is present and with
/// `InvalidBytecode` when two paths reach an instruction with different depths.
pub fn replay(code: &CodeAttribute, pool: &ConstantPool) -> Result<StackDepths, MethodError> {
    let instrs = util::decode(&code.code)?;
    let index: BTreeMap<u32, usize> = instrs.iter().enumerate().map(|(i, (a, _))| (*a, i)).collect();
    let mut depths = StackDepths::default();
    let mut work: Vec<(u32, u16)> = vec![(0, 0)];
    for entry in &code.exception_table {
        work.push((entry.handler_pc as u32, 1));
    }

    while let Some((address, depth)) = work.pop() {
        match depths.before.get(&address) {
            Some(&seen) if seen == depth => continue,
            Some(_) => return Err(bad(address, "inconsistent stack depth at join")),
            None => {}
        }
        let &i = index.get(&address).ok_or_else(|| bad(address, "jump into the middle of an instruction"))?;
        depths.before.insert(address, depth);
        depths.max_depth = depths.max_depth.max(depth);

        let instr = &instrs[i].1;
        let (popped, pushed) = effect(instr, pool, address)?;
        let after = depth
            .checked_sub(popped)
            .ok_or(MethodError::StackUnderflow { offset: address })?
            + pushed;
        depths.max_depth = depths.max_depth.max(after);

        for target in instr.jump_targets(address) {
            work.push((target, after));
        }
        if !instr.ends_flow() {
            let next = util::next_address(&instrs, i, code.code.len() as u32);
            if next < code.code.len() as u32 {
                // The subroutine consumes its return address before `ret`.
                work.push((next, if instr.is_jsr() { depth } else { after }));
            }
        }
    }
    tracing::trace!(max_depth = depths.max_depth, instructions = depths.before.len(), "replayed stack depth");
    Ok(depths)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(bytes: &[u8]) -> CodeAttribute {
        CodeAttribute {
            max_stack: 4,
            max_locals: 4,
            code_length: bytes.len() as u32,
            code: bytes.to_vec(),
            exception_table_length: 0,
            exception_table: vec![],
            attributes_count: 0,
            attributes: vec![],
        }
    }

    #[test]
    fn wide_values_count_two_words() {
        // lload_0; lconst_1; ladd; lreturn
        let depths = replay(&code(&[0x1e, 0x0a, 0x61, 0xad]), &ConstantPool::default()).unwrap();
        assert_eq!(depths.at(0), Some(0));
        assert_eq!(depths.at(2), Some(4));
        assert_eq!(depths.at(3), Some(2));
        assert_eq!(depths.max_depth, 4);
    }

    #[test]
    fn branches_agree_on_join_depth() {
        // iload_0; ifeq 8; iconst_1; goto 9; iconst_0; ireturn
        let depths = replay(&code(&[0x1a, 0x99, 0x00, 0x07, 0x04, 0xa7, 0x00, 0x04, 0x03, 0xac]), &ConstantPool::default())
            .unwrap();
        assert_eq!(depths.at(9), Some(1));
        assert_eq!(depths.max_depth, 1);
    }

    #[test]
    fn popping_an_empty_stack_underflows() {
        // pop; return
        let err = replay(&code(&[0x57, 0xb1]), &ConstantPool::default()).unwrap_err();
        assert_eq!(err, MethodError::StackUnderflow { offset: 0 });
    }

    #[test]
    fn dup2_x1_moves_three_words() {
        // iconst_1; iconst_2; iconst_3; dup2_x1; pop2; pop2; pop; return
        let depths = replay(&code(&[0x04, 0x05, 0x06, 0x5d, 0x58, 0x58, 0x57, 0xb1]), &ConstantPool::default()).unwrap();
        assert_eq!(depths.at(4), Some(5));
        assert_eq!(depths.at(7), Some(0));
    }
}
