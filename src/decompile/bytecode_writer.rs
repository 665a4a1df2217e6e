//! Disassembly listings rendered as `//` comment lines, used both for the optional
//! per-method appendix and for methods whose bodies could not be reconstructed.

use std::fmt::Write;

use crate::attribute_info::CodeAttribute;
use crate::code_attribute::Instruction;
use crate::constant_info::ConstantPool;

use super::descriptor::newarray_type;
use super::util::{self, format_constant, jump_target};

/// Mnemonics indexed by opcode byte.
pub static OPCODE_NAMES: [&str; 256] = [
    "nop", "aconst_null", "iconst_m1", "iconst_0", "iconst_1", "iconst_2", "iconst_3", "iconst_4",
    "iconst_5", "lconst_0", "lconst_1", "fconst_0", "fconst_1", "fconst_2", "dconst_0", "dconst_1",
    "bipush", "sipush", "ldc", "ldc_w", "ldc2_w", "iload", "lload", "fload",
    "dload", "aload", "iload_0", "iload_1", "iload_2", "iload_3", "lload_0", "lload_1",
    "lload_2", "lload_3", "fload_0", "fload_1", "fload_2", "fload_3", "dload_0", "dload_1",
    "dload_2", "dload_3", "aload_0", "aload_1", "aload_2", "aload_3", "iaload", "laload",
    "faload", "daload", "aaload", "baload", "caload", "saload", "istore", "lstore",
    "fstore", "dstore", "astore", "istore_0", "istore_1", "istore_2", "istore_3", "lstore_0",
    "lstore_1", "lstore_2", "lstore_3", "fstore_0", "fstore_1", "fstore_2", "fstore_3", "dstore_0",
    "dstore_1", "dstore_2", "dstore_3", "astore_0", "astore_1", "astore_2", "astore_3", "iastore",
    "lastore", "fastore", "dastore", "aastore", "bastore", "castore", "sastore", "pop",
    "pop2", "dup", "dup_x1", "dup_x2", "dup2", "dup2_x1", "dup2_x2", "swap",
    "iadd", "ladd", "fadd", "dadd", "isub", "lsub", "fsub", "dsub",
    "imul", "lmul", "fmul", "dmul", "idiv", "ldiv", "fdiv", "ddiv",
    "irem", "lrem", "frem", "drem", "ineg", "lneg", "fneg", "dneg",
    "ishl", "lshl", "ishr", "lshr", "iushr", "lushr", "iand", "land",
    "ior", "lor", "ixor", "lxor", "iinc", "i2l", "i2f", "i2d",
    "l2i", "l2f", "l2d", "f2i", "f2l", "f2d", "d2i", "d2l",
    "d2f", "i2b", "i2c", "i2s", "lcmp", "fcmpl", "fcmpg", "dcmpl",
    "dcmpg", "ifeq", "ifne", "iflt", "ifge", "ifgt", "ifle", "if_icmpeq",
    "if_icmpne", "if_icmplt", "if_icmpge", "if_icmpgt", "if_icmple", "if_acmpeq", "if_acmpne", "goto",
    "jsr", "ret", "tableswitch", "lookupswitch", "ireturn", "lreturn", "freturn", "dreturn",
    "areturn", "return", "getstatic", "putstatic", "getfield", "putfield", "invokevirtual", "invokespecial",
    "invokestatic", "invokeinterface", "invokedynamic", "new", "newarray", "anewarray", "arraylength", "athrow",
    "checkcast", "instanceof", "monitorenter", "monitorexit", "wide", "multianewarray", "ifnull", "ifnonnull",
    "goto_w", "jsr_w", "breakpoint", "<illegal>", "<illegal>", "<illegal>", "<illegal>", "<illegal>",
    "<illegal>", "<illegal>", "<illegal>", "<illegal>", "<illegal>", "<illegal>", "<illegal>", "<illegal>",
    "<illegal>", "<illegal>", "<illegal>", "<illegal>", "<illegal>", "<illegal>", "<illegal>", "<illegal>",
    "<illegal>", "<illegal>", "<illegal>", "<illegal>", "<illegal>", "<illegal>", "<illegal>", "<illegal>",
    "<illegal>", "<illegal>", "<illegal>", "<illegal>", "<illegal>", "<illegal>", "<illegal>", "<illegal>",
    "<illegal>", "<illegal>", "<illegal>", "<illegal>", "<illegal>", "<illegal>", "<illegal>", "<illegal>",
    "<illegal>", "<illegal>", "<illegal>", "<illegal>", "<illegal>", "<illegal>", "impdep1", "impdep2",
];

/// Opcode byte of a decoded instruction; `wide` forms report the widened opcode.
pub fn opcode(instr: &Instruction) -> u8 {
    use Instruction::*;
    match instr {
        Nop => 0x00, Aconstnull => 0x01, Iconstm1 => 0x02, Iconst0 => 0x03, Iconst1 => 0x04,
        Iconst2 => 0x05, Iconst3 => 0x06, Iconst4 => 0x07, Iconst5 => 0x08, Lconst0 => 0x09,
        Lconst1 => 0x0a, Fconst0 => 0x0b, Fconst1 => 0x0c, Fconst2 => 0x0d, Dconst0 => 0x0e,
        Dconst1 => 0x0f, Bipush(_) => 0x10, Sipush(_) => 0x11, Ldc(_) => 0x12, LdcW(_) => 0x13,
        Ldc2W(_) => 0x14,
        Iload(_) | IloadWide(_) => 0x15, Lload(_) | LloadWide(_) => 0x16,
        Fload(_) | FloadWide(_) => 0x17, Dload(_) | DloadWide(_) => 0x18,
        Aload(_) | AloadWide(_) => 0x19,
        Iload0 => 0x1a, Iload1 => 0x1b, Iload2 => 0x1c, Iload3 => 0x1d, Lload0 => 0x1e,
        Lload1 => 0x1f, Lload2 => 0x20, Lload3 => 0x21, Fload0 => 0x22, Fload1 => 0x23,
        Fload2 => 0x24, Fload3 => 0x25, Dload0 => 0x26, Dload1 => 0x27, Dload2 => 0x28,
        Dload3 => 0x29, Aload0 => 0x2a, Aload1 => 0x2b, Aload2 => 0x2c, Aload3 => 0x2d,
        Iaload => 0x2e, Laload => 0x2f, Faload => 0x30, Daload => 0x31, Aaload => 0x32,
        Baload => 0x33, Caload => 0x34, Saload => 0x35,
        Istore(_) | IstoreWide(_) => 0x36, Lstore(_) | LstoreWide(_) => 0x37,
        Fstore(_) | FstoreWide(_) => 0x38, Dstore(_) | DstoreWide(_) => 0x39,
        Astore(_) | AstoreWide(_) => 0x3a,
        Istore0 => 0x3b, Istore1 => 0x3c, Istore2 => 0x3d, Istore3 => 0x3e, Lstore0 => 0x3f,
        Lstore1 => 0x40, Lstore2 => 0x41, Lstore3 => 0x42, Fstore0 => 0x43, Fstore1 => 0x44,
        Fstore2 => 0x45, Fstore3 => 0x46, Dstore0 => 0x47, Dstore1 => 0x48, Dstore2 => 0x49,
        Dstore3 => 0x4a, Astore0 => 0x4b, Astore1 => 0x4c, Astore2 => 0x4d, Astore3 => 0x4e,
        Iastore => 0x4f, Lastore => 0x50, Fastore => 0x51, Dastore => 0x52, Aastore => 0x53,
        Bastore => 0x54, Castore => 0x55, Sastore => 0x56, Pop => 0x57, Pop2 => 0x58,
        Dup => 0x59, Dupx1 => 0x5a, Dupx2 => 0x5b, Dup2 => 0x5c, Dup2x1 => 0x5d, Dup2x2 => 0x5e,
        Swap => 0x5f, Iadd => 0x60, Ladd => 0x61, Fadd => 0x62, Dadd => 0x63, Isub => 0x64,
        Lsub => 0x65, Fsub => 0x66, Dsub => 0x67, Imul => 0x68, Lmul => 0x69, Fmul => 0x6a,
        Dmul => 0x6b, Idiv => 0x6c, Ldiv => 0x6d, Fdiv => 0x6e, Ddiv => 0x6f, Irem => 0x70,
        Lrem => 0x71, Frem => 0x72, Drem => 0x73, Ineg => 0x74, Lneg => 0x75, Fneg => 0x76,
        Dneg => 0x77, Ishl => 0x78, Lshl => 0x79, Ishr => 0x7a, Lshr => 0x7b, Iushr => 0x7c,
        Lushr => 0x7d, Iand => 0x7e, Land => 0x7f, Ior => 0x80, Lor => 0x81, Ixor => 0x82,
        Lxor => 0x83, Iinc { .. } | IincWide { .. } => 0x84, I2l => 0x85, I2f => 0x86,
        I2d => 0x87, L2i => 0x88, L2f => 0x89, L2d => 0x8a, F2i => 0x8b, F2l => 0x8c,
        F2d => 0x8d, D2i => 0x8e, D2l => 0x8f, D2f => 0x90, I2b => 0x91, I2c => 0x92,
        I2s => 0x93, Lcmp => 0x94, Fcmpl => 0x95, Fcmpg => 0x96, Dcmpl => 0x97, Dcmpg => 0x98,
        Ifeq(_) => 0x99, Ifne(_) => 0x9a, Iflt(_) => 0x9b, Ifge(_) => 0x9c, Ifgt(_) => 0x9d,
        Ifle(_) => 0x9e, IfIcmpeq(_) => 0x9f, IfIcmpne(_) => 0xa0, IfIcmplt(_) => 0xa1,
        IfIcmpge(_) => 0xa2, IfIcmpgt(_) => 0xa3, IfIcmple(_) => 0xa4, IfAcmpeq(_) => 0xa5,
        IfAcmpne(_) => 0xa6, Goto(_) => 0xa7, Jsr(_) => 0xa8, Ret(_) | RetWide(_) => 0xa9,
        Tableswitch { .. } => 0xaa, Lookupswitch { .. } => 0xab, Ireturn => 0xac,
        Lreturn => 0xad, Freturn => 0xae, Dreturn => 0xaf, Areturn => 0xb0, Return => 0xb1,
        Getstatic(_) => 0xb2, Putstatic(_) => 0xb3, Getfield(_) => 0xb4, Putfield(_) => 0xb5,
        Invokevirtual(_) => 0xb6, Invokespecial(_) => 0xb7, Invokestatic(_) => 0xb8,
        Invokeinterface { .. } => 0xb9, Invokedynamic { .. } => 0xba, New(_) => 0xbb,
        Newarray(_) => 0xbc, Anewarray(_) => 0xbd, Arraylength => 0xbe, Athrow => 0xbf,
        Checkcast(_) => 0xc0, Instanceof(_) => 0xc1, Monitorenter => 0xc2, Monitorexit => 0xc3,
        Multianewarray { .. } => 0xc5, Ifnull(_) => 0xc6, Ifnonnull(_) => 0xc7,
        GotoW(_) => 0xc8, JsrW(_) => 0xc9,
    }
}

pub fn mnemonic(instr: &Instruction) -> &'static str {
    OPCODE_NAMES[opcode(instr) as usize]
}

/// `name : descriptor`, qualified with the owner unless it is the class being listed.
fn member(pool: &ConstantPool, index: u16, class_name: &str, is_method: bool) -> String {
    match pool.member_ref(index) {
        Some(m) => {
            let owner = if m.class_name == class_name { String::new() } else { format!("{}.", m.class_name) };
            if is_method {
                format!("{}{}{}", owner, m.name, m.descriptor)
            } else {
                format!("{}{} : {}", owner, m.name, m.descriptor)
            }
        }
        None => format!("#{}", index),
    }
}

fn class_operand(pool: &ConstantPool, index: u16) -> String {
    pool.class_name(index).map(str::to_string).unwrap_or_else(|| format!("#{}", index))
}

/// One instruction as it appears in a listing, without the offset.
pub fn format_instruction(pool: &ConstantPool, class_name: &str, address: u32, instr: &Instruction) -> String {
    use Instruction::*;
    let name = mnemonic(instr);
    if let Some(o) = instr.branch_offset() {
        return format!("{} -> {}", name, jump_target(address, o));
    }
    match instr {
        Bipush(v) => format!("{} {}", name, v),
        Sipush(v) => format!("{} {}", name, v),
        Ldc(i) => format!("{} {}", name, format_constant(pool, *i as u16)),
        LdcW(i) | Ldc2W(i) => format!("{} {}", name, format_constant(pool, *i)),
        Iload(i) | Lload(i) | Fload(i) | Dload(i) | Aload(i) | Istore(i) | Lstore(i) | Fstore(i)
        | Dstore(i) | Astore(i) | Ret(i) => format!("{} {}", name, i),
        IloadWide(i) | LloadWide(i) | FloadWide(i) | DloadWide(i) | AloadWide(i) | IstoreWide(i)
        | LstoreWide(i) | FstoreWide(i) | DstoreWide(i) | AstoreWide(i) | RetWide(i) => {
            format!("wide {} {}", name, i)
        }
        Iinc { index, value } => format!("{} {} {}", name, index, value),
        IincWide { index, value } => format!("wide {} {} {}", name, index, value),
        Getstatic(i) | Putstatic(i) | Getfield(i) | Putfield(i) => {
            format!("{} {}", name, member(pool, *i, class_name, false))
        }
        Invokevirtual(i) | Invokespecial(i) | Invokestatic(i) => {
            format!("{} {}", name, member(pool, *i, class_name, true))
        }
        Invokeinterface { index, count, .. } => {
            format!("{} {} {}", name, member(pool, *index, class_name, true), count)
        }
        Invokedynamic { index, .. } => match pool.dynamic_name_and_type(*index) {
            Some((n, d)) => format!("{} {}{}", name, n, d),
            None => format!("{} #{}", name, index),
        },
        New(i) | Anewarray(i) | Checkcast(i) | Instanceof(i) => format!("{} {}", name, class_operand(pool, *i)),
        Newarray(t) => format!("{} {}", name, newarray_type(*t).simple_name()),
        Multianewarray { index, dimensions } => format!("{} {} {}", name, class_operand(pool, *index), dimensions),
        Tableswitch { default, low, offsets, .. } => {
            let mut parts: Vec<String> = offsets
                .iter()
                .enumerate()
                .map(|(k, o)| format!("{} -> {}", low.wrapping_add(k as i32), jump_target(address, *o)))
                .collect();
            parts.push(format!("default -> {}", jump_target(address, *default)));
            format!("{} {{ {} }}", name, parts.join(", "))
        }
        Lookupswitch { default, pairs, .. } => {
            let mut parts: Vec<String> =
                pairs.iter().map(|(k, o)| format!("{} -> {}", k, jump_target(address, *o))).collect();
            parts.push(format!("default -> {}", jump_target(address, *default)));
            format!("{} {{ {} }}", name, parts.join(", "))
        }
        _ => name.to_string(),
    }
}

/// Full listing of one method: instructions, then the line number, local variable and
/// exception tables when present. Every line starts with `//`.
pub fn write_method_bytecode(pool: &ConstantPool, class_name: &str, code: &CodeAttribute) -> String {
    let mut out = String::new();
    out.push_str("// Byte code:\n");
    match util::decode(&code.code) {
        Ok(instrs) => {
            for (address, instr) in &instrs {
                let _ = writeln!(out, "//   {}: {}", address, format_instruction(pool, class_name, *address, instr));
            }
        }
        Err(e) => {
            let _ = writeln!(out, "//   <{}>", e);
        }
    }

    if let Some(lnt) = code.line_number_table() {
        out.push_str("// Line number table:\n");
        out.push_str("//   Java source line number -> byte code offset\n");
        for entry in &lnt.line_number_table {
            let _ = writeln!(out, "//   #{}\t-> {}", entry.line_number, entry.start_pc);
        }
    }

    if let Some(lvt) = code.local_variable_table() {
        out.push_str("// Local variable table:\n");
        out.push_str("//   start\tlength\tslot\tname\tdescriptor\n");
        for item in &lvt.items {
            let _ = writeln!(
                out,
                "//   {}\t{}\t{}\t{}\t{}",
                item.start_pc,
                item.length,
                item.index,
                pool.utf8(item.name_index).unwrap_or("?"),
                pool.utf8(item.descriptor_index).unwrap_or("?")
            );
        }
    }

    if !code.exception_table.is_empty() {
        out.push_str("// Exception table:\n");
        out.push_str("//   from\tto\ttarget\ttype\n");
        for entry in &code.exception_table {
            let ty = if entry.catch_type == 0 {
                "finally".to_string()
            } else {
                class_operand(pool, entry.catch_type)
            };
            let _ = writeln!(out, "//   {}\t{}\t{}\t{}", entry.start_pc, entry.end_pc, entry.handler_pc, ty);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute_info::ExceptionEntry;

    #[test]
    fn opcode_table_matches_decoded_instructions() {
        assert_eq!(mnemonic(&Instruction::Dup2x1), "dup2_x1");
        assert_eq!(mnemonic(&Instruction::Aconstnull), "aconst_null");
        assert_eq!(mnemonic(&Instruction::IloadWide(300)), "iload");
        assert_eq!(mnemonic(&Instruction::GotoW(0)), "goto_w");
        assert_eq!(OPCODE_NAMES[0xba], "invokedynamic");
        assert_eq!(OPCODE_NAMES[0xc4], "wide");
    }

    #[test]
    fn listing_prints_branches_and_finally_handlers() {
        let mut pool = ConstantPool::default();
        let class = pool.add_class("java/lang/Exception").unwrap();
        // iload_0; ifeq 8; iinc 0 1; goto 9 (unused); return
        let bytes = vec![0x1a, 0x99, 0x00, 0x07, 0x84, 0x00, 0x01, 0x00, 0xb1];
        let code = CodeAttribute {
            max_stack: 1,
            max_locals: 1,
            code_length: bytes.len() as u32,
            code: bytes,
            exception_table_length: 2,
            exception_table: vec![
                ExceptionEntry { start_pc: 0, end_pc: 4, handler_pc: 8, catch_type: class },
                ExceptionEntry { start_pc: 0, end_pc: 4, handler_pc: 8, catch_type: 0 },
            ],
            attributes_count: 0,
            attributes: vec![],
        };
        let listing = write_method_bytecode(&pool, "Demo", &code);
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines[0], "// Byte code:");
        assert_eq!(lines[1], "//   0: iload_0");
        assert_eq!(lines[2], "//   1: ifeq -> 8");
        assert_eq!(lines[3], "//   4: iinc 0 1");
        assert!(lines.contains(&"//   0\t4\t8\tjava/lang/Exception"));
        assert!(lines.contains(&"//   0\t4\t8\tfinally"));
        assert!(lines.iter().all(|l| l.starts_with("//")));
    }
}
