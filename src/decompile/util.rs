use std::time::{Duration, Instant};

use crate::code_attribute::{code_parser, Instruction};
use crate::constant_info::{ConstantInfo, ConstantPool};
use crate::error::{MethodError, ParseError};

use super::descriptor::JvmType;

/// Decodes a method's code array into `(offset, instruction)` pairs.
pub fn decode(code: &[u8]) -> Result<Vec<(u32, Instruction)>, MethodError> {
    match code_parser(code) {
        Ok((_, instrs)) => Ok(instrs
            .into_iter()
            .map(|(addr, instr)| (addr as u32, instr))
            .collect()),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let offset = match e {
                ParseError::Nom { remaining, .. } => code.len().saturating_sub(remaining),
                ParseError::Format(_) => 0,
            };
            Err(MethodError::InvalidBytecode {
                offset: offset as u32,
                message: "undecodable instruction".into(),
            })
        }
        Err(nom::Err::Incomplete(_)) => Err(MethodError::InvalidBytecode {
            offset: code.len() as u32,
            message: "truncated instruction".into(),
        }),
    }
}

/// Address of the instruction following `instrs[i]`.
pub fn next_address(instrs: &[(u32, Instruction)], i: usize, code_len: u32) -> u32 {
    instrs.get(i + 1).map(|(a, _)| *a).unwrap_or(code_len)
}

pub fn jump_target(address: u32, offset: i32) -> u32 {
    (address as i64 + offset as i64) as u32
}

/// Slot type and index read by a load instruction.
pub fn local_load(instr: &Instruction) -> Option<(JvmType, u16)> {
    use Instruction::*;
    let object = || JvmType::Reference("java/lang/Object".into());
    Some(match instr {
        Iload(i) => (JvmType::Int, *i as u16),
        IloadWide(i) => (JvmType::Int, *i),
        Iload0 => (JvmType::Int, 0),
        Iload1 => (JvmType::Int, 1),
        Iload2 => (JvmType::Int, 2),
        Iload3 => (JvmType::Int, 3),
        Lload(i) => (JvmType::Long, *i as u16),
        LloadWide(i) => (JvmType::Long, *i),
        Lload0 => (JvmType::Long, 0),
        Lload1 => (JvmType::Long, 1),
        Lload2 => (JvmType::Long, 2),
        Lload3 => (JvmType::Long, 3),
        Fload(i) => (JvmType::Float, *i as u16),
        FloadWide(i) => (JvmType::Float, *i),
        Fload0 => (JvmType::Float, 0),
        Fload1 => (JvmType::Float, 1),
        Fload2 => (JvmType::Float, 2),
        Fload3 => (JvmType::Float, 3),
        Dload(i) => (JvmType::Double, *i as u16),
        DloadWide(i) => (JvmType::Double, *i),
        Dload0 => (JvmType::Double, 0),
        Dload1 => (JvmType::Double, 1),
        Dload2 => (JvmType::Double, 2),
        Dload3 => (JvmType::Double, 3),
        Aload(i) => (object(), *i as u16),
        AloadWide(i) => (object(), *i),
        Aload0 => (object(), 0),
        Aload1 => (object(), 1),
        Aload2 => (object(), 2),
        Aload3 => (object(), 3),
        _ => return None,
    })
}

/// Slot type and index written by a store instruction.
pub fn local_store(instr: &Instruction) -> Option<(JvmType, u16)> {
    use Instruction::*;
    let object = || JvmType::Reference("java/lang/Object".into());
    Some(match instr {
        Istore(i) => (JvmType::Int, *i as u16),
        IstoreWide(i) => (JvmType::Int, *i),
        Istore0 => (JvmType::Int, 0),
        Istore1 => (JvmType::Int, 1),
        Istore2 => (JvmType::Int, 2),
        Istore3 => (JvmType::Int, 3),
        Lstore(i) => (JvmType::Long, *i as u16),
        LstoreWide(i) => (JvmType::Long, *i),
        Lstore0 => (JvmType::Long, 0),
        Lstore1 => (JvmType::Long, 1),
        Lstore2 => (JvmType::Long, 2),
        Lstore3 => (JvmType::Long, 3),
        Fstore(i) => (JvmType::Float, *i as u16),
        FstoreWide(i) => (JvmType::Float, *i),
        Fstore0 => (JvmType::Float, 0),
        Fstore1 => (JvmType::Float, 1),
        Fstore2 => (JvmType::Float, 2),
        Fstore3 => (JvmType::Float, 3),
        Dstore(i) => (JvmType::Double, *i as u16),
        DstoreWide(i) => (JvmType::Double, *i),
        Dstore0 => (JvmType::Double, 0),
        Dstore1 => (JvmType::Double, 1),
        Dstore2 => (JvmType::Double, 2),
        Dstore3 => (JvmType::Double, 3),
        Astore(i) => (object(), *i as u16),
        AstoreWide(i) => (object(), *i),
        Astore0 => (object(), 0),
        Astore1 => (object(), 1),
        Astore2 => (object(), 2),
        Astore3 => (object(), 3),
        _ => return None,
    })
}

/// Element type accessed by an array load or store instruction.
pub fn array_element_type(instr: &Instruction) -> Option<JvmType> {
    use Instruction::*;
    Some(match instr {
        Iaload | Iastore => JvmType::Int,
        Laload | Lastore => JvmType::Long,
        Faload | Fastore => JvmType::Float,
        Daload | Dastore => JvmType::Double,
        Aaload | Aastore => JvmType::Reference("java/lang/Object".into()),
        Baload | Bastore => JvmType::Byte,
        Caload | Castore => JvmType::Char,
        Saload | Sastore => JvmType::Short,
        _ => return None,
    })
}

/// Get a constant pool entry's value as a string for display.
pub fn format_constant(const_pool: &ConstantPool, index: u16) -> String {
    match const_pool.get(index) {
        Some(ConstantInfo::Integer(c)) => format!("{}", c.value),
        Some(ConstantInfo::Float(c)) => format!("{}f", c.value),
        Some(ConstantInfo::Long(c)) => format!("{}L", c.value),
        Some(ConstantInfo::Double(c)) => format!("{}d", c.value),
        Some(ConstantInfo::String(c)) => match const_pool.utf8(c.string_index) {
            Some(s) => format!("'{}'", s),
            None => format!("<string #{}>", c.string_index),
        },
        Some(ConstantInfo::Class(c)) => match const_pool.utf8(c.name_index) {
            Some(name) => name.to_string(),
            None => format!("<class #{}>", c.name_index),
        },
        Some(ConstantInfo::MethodType(t)) => const_pool
            .utf8(t.descriptor_index)
            .unwrap_or("<method type>")
            .to_string(),
        Some(ConstantInfo::Utf8(c)) => c.utf8_string.clone(),
        _ => format!("<cp #{}>", index),
    }
}

/// Per-method work allowance: a step counter plus an optional wall-clock deadline.
#[derive(Clone, Debug)]
pub struct Budget {
    steps_left: u64,
    deadline: Option<Instant>,
}

impl Budget {
    pub fn new(max_steps: u64, timeout: Option<Duration>) -> Self {
        Budget {
            steps_left: max_steps,
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    pub fn unlimited() -> Self {
        Budget { steps_left: u64::MAX, deadline: None }
    }

    /// Charges one unit of work done at `offset`.
    pub fn step(&mut self, offset: u32) -> Result<(), MethodError> {
        if self.steps_left == 0 {
            return Err(MethodError::BudgetExhausted { offset });
        }
        self.steps_left -= 1;
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(MethodError::Timeout { offset }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_tracks_switch_padding() {
        // iload_0; tableswitch (2 bytes pad) default +20, low 0, high 0, offset +20; return
        let code = [
            0x1a, 0xaa, 0x00, 0x00, 0x00, 0x00, 0x00, 0x14, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x14, 0xb1,
        ];
        let instrs = decode(&code).unwrap();
        assert_eq!(instrs.len(), 3);
        assert_eq!(instrs[2].0, 20);
        assert_eq!(next_address(&instrs, 2, code.len() as u32), 21);
    }

    #[test]
    fn decode_reports_truncation_offset() {
        // sipush missing its second operand byte
        let err = decode(&[0x03, 0x11, 0x00]).unwrap_err();
        assert!(matches!(err, MethodError::InvalidBytecode { .. }));
    }

    #[test]
    fn load_store_families() {
        assert_eq!(local_load(&Instruction::Lload2), Some((JvmType::Long, 2)));
        assert_eq!(local_store(&Instruction::IstoreWide(300)), Some((JvmType::Int, 300)));
        assert_eq!(local_load(&Instruction::Iadd), None);
        assert_eq!(jump_target(10, -7), 3);
        assert!(Instruction::Ifnull(4).is_conditional_branch());
        assert!(!Instruction::Goto(4).is_conditional_branch());
    }

    #[test]
    fn budget_runs_out() {
        let mut budget = Budget::new(2, None);
        assert!(budget.step(0).is_ok());
        assert!(budget.step(3).is_ok());
        assert_eq!(budget.step(7), Err(MethodError::BudgetExhausted { offset: 7 }));
        let mut expired = Budget::new(10, Some(Duration::ZERO));
        assert_eq!(expired.step(1), Err(MethodError::Timeout { offset: 1 }));
    }
}
