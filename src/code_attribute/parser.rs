use nom::{
    bytes::complete::take,
    combinator::map,
    error::{ErrorKind, ParseError as _},
    multi::count,
    number::complete::{be_i16, be_i32, be_i8, be_u16, be_u32, be_u8},
};

use crate::code_attribute::types::Instruction;
use crate::error::{Err, ParseError};

fn invalid(input: &[u8], kind: ErrorKind) -> Err {
    nom::Err::Error(ParseError::from_error_kind(input, kind))
}

/// Padding after a switch opcode so its operands start on a 4-byte boundary
/// relative to the start of the code array.
fn switch_padding(address: usize) -> usize {
    (4 - (address + 1) % 4) % 4
}

fn tableswitch_parser(input: &[u8], address: usize) -> Result<(&[u8], Instruction), Err> {
    let (input, _) = take(switch_padding(address))(input)?;
    let (input, default) = be_i32(input)?;
    let (input, low) = be_i32(input)?;
    let (input, high) = be_i32(input)?;
    if high < low {
        return Err(invalid(input, ErrorKind::Verify));
    }
    let n = (high as i64 - low as i64 + 1) as usize;
    let (input, offsets) = count(be_i32, n)(input)?;
    Ok((
        input,
        Instruction::Tableswitch {
            default,
            low,
            high,
            offsets,
        },
    ))
}

fn lookup_pair_parser(input: &[u8]) -> Result<(&[u8], (i32, i32)), Err> {
    let (input, key) = be_i32(input)?;
    let (input, offset) = be_i32(input)?;
    Ok((input, (key, offset)))
}

fn lookupswitch_parser(input: &[u8], address: usize) -> Result<(&[u8], Instruction), Err> {
    let (input, _) = take(switch_padding(address))(input)?;
    let (input, default) = be_i32(input)?;
    let (input, npairs) = be_u32(input)?;
    let (input, pairs) = count(lookup_pair_parser, npairs as usize)(input)?;
    Ok((
        input,
        Instruction::Lookupswitch {
            default,
            npairs,
            pairs,
        },
    ))
}

fn iinc_parser(input: &[u8]) -> Result<(&[u8], Instruction), Err> {
    let (input, index) = be_u8(input)?;
    let (input, value) = be_i8(input)?;
    Ok((input, Instruction::Iinc { index, value }))
}

fn invokeinterface_parser(input: &[u8]) -> Result<(&[u8], Instruction), Err> {
    let (input, index) = be_u16(input)?;
    let (input, count) = be_u8(input)?;
    let (input, filler) = be_u8(input)?;
    Ok((
        input,
        Instruction::Invokeinterface {
            index,
            count,
            filler,
        },
    ))
}

fn invokedynamic_parser(input: &[u8]) -> Result<(&[u8], Instruction), Err> {
    let (input, index) = be_u16(input)?;
    let (input, filler) = be_u16(input)?;
    Ok((input, Instruction::Invokedynamic { index, filler }))
}

fn multianewarray_parser(input: &[u8]) -> Result<(&[u8], Instruction), Err> {
    let (input, index) = be_u16(input)?;
    let (input, dimensions) = be_u8(input)?;
    Ok((input, Instruction::Multianewarray { index, dimensions }))
}

fn wide_parser(input: &[u8]) -> Result<(&[u8], Instruction), Err> {
    let (input, opcode) = be_u8(input)?;
    match opcode {
        0x15 => map(be_u16, Instruction::IloadWide)(input),
        0x16 => map(be_u16, Instruction::LloadWide)(input),
        0x17 => map(be_u16, Instruction::FloadWide)(input),
        0x18 => map(be_u16, Instruction::DloadWide)(input),
        0x19 => map(be_u16, Instruction::AloadWide)(input),
        0x36 => map(be_u16, Instruction::IstoreWide)(input),
        0x37 => map(be_u16, Instruction::LstoreWide)(input),
        0x38 => map(be_u16, Instruction::FstoreWide)(input),
        0x39 => map(be_u16, Instruction::DstoreWide)(input),
        0x3a => map(be_u16, Instruction::AstoreWide)(input),
        0xa9 => map(be_u16, Instruction::RetWide)(input),
        0x84 => {
            let (input, index) = be_u16(input)?;
            let (input, value) = be_i16(input)?;
            Ok((input, Instruction::IincWide { index, value }))
        }
        _ => Err(invalid(input, ErrorKind::Switch)),
    }
}

/// Decodes the instruction at the start of `input`. `address` is the instruction's
/// offset in the code array, needed for switch padding.
pub fn instruction_parser(input: &[u8], address: usize) -> Result<(&[u8], Instruction), Err> {
    let (input, opcode) = be_u8(input)?;
    match opcode {
        0x00 => Ok((input, Instruction::Nop)),
        0x01 => Ok((input, Instruction::Aconstnull)),
        0x02 => Ok((input, Instruction::Iconstm1)),
        0x03 => Ok((input, Instruction::Iconst0)),
        0x04 => Ok((input, Instruction::Iconst1)),
        0x05 => Ok((input, Instruction::Iconst2)),
        0x06 => Ok((input, Instruction::Iconst3)),
        0x07 => Ok((input, Instruction::Iconst4)),
        0x08 => Ok((input, Instruction::Iconst5)),
        0x09 => Ok((input, Instruction::Lconst0)),
        0x0a => Ok((input, Instruction::Lconst1)),
        0x0b => Ok((input, Instruction::Fconst0)),
        0x0c => Ok((input, Instruction::Fconst1)),
        0x0d => Ok((input, Instruction::Fconst2)),
        0x0e => Ok((input, Instruction::Dconst0)),
        0x0f => Ok((input, Instruction::Dconst1)),
        0x10 => map(be_i8, Instruction::Bipush)(input),
        0x11 => map(be_i16, Instruction::Sipush)(input),
        0x12 => map(be_u8, Instruction::Ldc)(input),
        0x13 => map(be_u16, Instruction::LdcW)(input),
        0x14 => map(be_u16, Instruction::Ldc2W)(input),
        0x15 => map(be_u8, Instruction::Iload)(input),
        0x16 => map(be_u8, Instruction::Lload)(input),
        0x17 => map(be_u8, Instruction::Fload)(input),
        0x18 => map(be_u8, Instruction::Dload)(input),
        0x19 => map(be_u8, Instruction::Aload)(input),
        0x1a => Ok((input, Instruction::Iload0)),
        0x1b => Ok((input, Instruction::Iload1)),
        0x1c => Ok((input, Instruction::Iload2)),
        0x1d => Ok((input, Instruction::Iload3)),
        0x1e => Ok((input, Instruction::Lload0)),
        0x1f => Ok((input, Instruction::Lload1)),
        0x20 => Ok((input, Instruction::Lload2)),
        0x21 => Ok((input, Instruction::Lload3)),
        0x22 => Ok((input, Instruction::Fload0)),
        0x23 => Ok((input, Instruction::Fload1)),
        0x24 => Ok((input, Instruction::Fload2)),
        0x25 => Ok((input, Instruction::Fload3)),
        0x26 => Ok((input, Instruction::Dload0)),
        0x27 => Ok((input, Instruction::Dload1)),
        0x28 => Ok((input, Instruction::Dload2)),
        0x29 => Ok((input, Instruction::Dload3)),
        0x2a => Ok((input, Instruction::Aload0)),
        0x2b => Ok((input, Instruction::Aload1)),
        0x2c => Ok((input, Instruction::Aload2)),
        0x2d => Ok((input, Instruction::Aload3)),
        0x2e => Ok((input, Instruction::Iaload)),
        0x2f => Ok((input, Instruction::Laload)),
        0x30 => Ok((input, Instruction::Faload)),
        0x31 => Ok((input, Instruction::Daload)),
        0x32 => Ok((input, Instruction::Aaload)),
        0x33 => Ok((input, Instruction::Baload)),
        0x34 => Ok((input, Instruction::Caload)),
        0x35 => Ok((input, Instruction::Saload)),
        0x36 => map(be_u8, Instruction::Istore)(input),
        0x37 => map(be_u8, Instruction::Lstore)(input),
        0x38 => map(be_u8, Instruction::Fstore)(input),
        0x39 => map(be_u8, Instruction::Dstore)(input),
        0x3a => map(be_u8, Instruction::Astore)(input),
        0x3b => Ok((input, Instruction::Istore0)),
        0x3c => Ok((input, Instruction::Istore1)),
        0x3d => Ok((input, Instruction::Istore2)),
        0x3e => Ok((input, Instruction::Istore3)),
        0x3f => Ok((input, Instruction::Lstore0)),
        0x40 => Ok((input, Instruction::Lstore1)),
        0x41 => Ok((input, Instruction::Lstore2)),
        0x42 => Ok((input, Instruction::Lstore3)),
        0x43 => Ok((input, Instruction::Fstore0)),
        0x44 => Ok((input, Instruction::Fstore1)),
        0x45 => Ok((input, Instruction::Fstore2)),
        0x46 => Ok((input, Instruction::Fstore3)),
        0x47 => Ok((input, Instruction::Dstore0)),
        0x48 => Ok((input, Instruction::Dstore1)),
        0x49 => Ok((input, Instruction::Dstore2)),
        0x4a => Ok((input, Instruction::Dstore3)),
        0x4b => Ok((input, Instruction::Astore0)),
        0x4c => Ok((input, Instruction::Astore1)),
        0x4d => Ok((input, Instruction::Astore2)),
        0x4e => Ok((input, Instruction::Astore3)),
        0x4f => Ok((input, Instruction::Iastore)),
        0x50 => Ok((input, Instruction::Lastore)),
        0x51 => Ok((input, Instruction::Fastore)),
        0x52 => Ok((input, Instruction::Dastore)),
        0x53 => Ok((input, Instruction::Aastore)),
        0x54 => Ok((input, Instruction::Bastore)),
        0x55 => Ok((input, Instruction::Castore)),
        0x56 => Ok((input, Instruction::Sastore)),
        0x57 => Ok((input, Instruction::Pop)),
        0x58 => Ok((input, Instruction::Pop2)),
        0x59 => Ok((input, Instruction::Dup)),
        0x5a => Ok((input, Instruction::Dupx1)),
        0x5b => Ok((input, Instruction::Dupx2)),
        0x5c => Ok((input, Instruction::Dup2)),
        0x5d => Ok((input, Instruction::Dup2x1)),
        0x5e => Ok((input, Instruction::Dup2x2)),
        0x5f => Ok((input, Instruction::Swap)),
        0x60 => Ok((input, Instruction::Iadd)),
        0x61 => Ok((input, Instruction::Ladd)),
        0x62 => Ok((input, Instruction::Fadd)),
        0x63 => Ok((input, Instruction::Dadd)),
        0x64 => Ok((input, Instruction::Isub)),
        0x65 => Ok((input, Instruction::Lsub)),
        0x66 => Ok((input, Instruction::Fsub)),
        0x67 => Ok((input, Instruction::Dsub)),
        0x68 => Ok((input, Instruction::Imul)),
        0x69 => Ok((input, Instruction::Lmul)),
        0x6a => Ok((input, Instruction::Fmul)),
        0x6b => Ok((input, Instruction::Dmul)),
        0x6c => Ok((input, Instruction::Idiv)),
        0x6d => Ok((input, Instruction::Ldiv)),
        0x6e => Ok((input, Instruction::Fdiv)),
        0x6f => Ok((input, Instruction::Ddiv)),
        0x70 => Ok((input, Instruction::Irem)),
        0x71 => Ok((input, Instruction::Lrem)),
        0x72 => Ok((input, Instruction::Frem)),
        0x73 => Ok((input, Instruction::Drem)),
        0x74 => Ok((input, Instruction::Ineg)),
        0x75 => Ok((input, Instruction::Lneg)),
        0x76 => Ok((input, Instruction::Fneg)),
        0x77 => Ok((input, Instruction::Dneg)),
        0x78 => Ok((input, Instruction::Ishl)),
        0x79 => Ok((input, Instruction::Lshl)),
        0x7a => Ok((input, Instruction::Ishr)),
        0x7b => Ok((input, Instruction::Lshr)),
        0x7c => Ok((input, Instruction::Iushr)),
        0x7d => Ok((input, Instruction::Lushr)),
        0x7e => Ok((input, Instruction::Iand)),
        0x7f => Ok((input, Instruction::Land)),
        0x80 => Ok((input, Instruction::Ior)),
        0x81 => Ok((input, Instruction::Lor)),
        0x82 => Ok((input, Instruction::Ixor)),
        0x83 => Ok((input, Instruction::Lxor)),
        0x84 => iinc_parser(input),
        0x85 => Ok((input, Instruction::I2l)),
        0x86 => Ok((input, Instruction::I2f)),
        0x87 => Ok((input, Instruction::I2d)),
        0x88 => Ok((input, Instruction::L2i)),
        0x89 => Ok((input, Instruction::L2f)),
        0x8a => Ok((input, Instruction::L2d)),
        0x8b => Ok((input, Instruction::F2i)),
        0x8c => Ok((input, Instruction::F2l)),
        0x8d => Ok((input, Instruction::F2d)),
        0x8e => Ok((input, Instruction::D2i)),
        0x8f => Ok((input, Instruction::D2l)),
        0x90 => Ok((input, Instruction::D2f)),
        0x91 => Ok((input, Instruction::I2b)),
        0x92 => Ok((input, Instruction::I2c)),
        0x93 => Ok((input, Instruction::I2s)),
        0x94 => Ok((input, Instruction::Lcmp)),
        0x95 => Ok((input, Instruction::Fcmpl)),
        0x96 => Ok((input, Instruction::Fcmpg)),
        0x97 => Ok((input, Instruction::Dcmpl)),
        0x98 => Ok((input, Instruction::Dcmpg)),
        0x99 => map(be_i16, Instruction::Ifeq)(input),
        0x9a => map(be_i16, Instruction::Ifne)(input),
        0x9b => map(be_i16, Instruction::Iflt)(input),
        0x9c => map(be_i16, Instruction::Ifge)(input),
        0x9d => map(be_i16, Instruction::Ifgt)(input),
        0x9e => map(be_i16, Instruction::Ifle)(input),
        0x9f => map(be_i16, Instruction::IfIcmpeq)(input),
        0xa0 => map(be_i16, Instruction::IfIcmpne)(input),
        0xa1 => map(be_i16, Instruction::IfIcmplt)(input),
        0xa2 => map(be_i16, Instruction::IfIcmpge)(input),
        0xa3 => map(be_i16, Instruction::IfIcmpgt)(input),
        0xa4 => map(be_i16, Instruction::IfIcmple)(input),
        0xa5 => map(be_i16, Instruction::IfAcmpeq)(input),
        0xa6 => map(be_i16, Instruction::IfAcmpne)(input),
        0xa7 => map(be_i16, Instruction::Goto)(input),
        0xa8 => map(be_i16, Instruction::Jsr)(input),
        0xa9 => map(be_u8, Instruction::Ret)(input),
        0xaa => tableswitch_parser(input, address),
        0xab => lookupswitch_parser(input, address),
        0xac => Ok((input, Instruction::Ireturn)),
        0xad => Ok((input, Instruction::Lreturn)),
        0xae => Ok((input, Instruction::Freturn)),
        0xaf => Ok((input, Instruction::Dreturn)),
        0xb0 => Ok((input, Instruction::Areturn)),
        0xb1 => Ok((input, Instruction::Return)),
        0xb2 => map(be_u16, Instruction::Getstatic)(input),
        0xb3 => map(be_u16, Instruction::Putstatic)(input),
        0xb4 => map(be_u16, Instruction::Getfield)(input),
        0xb5 => map(be_u16, Instruction::Putfield)(input),
        0xb6 => map(be_u16, Instruction::Invokevirtual)(input),
        0xb7 => map(be_u16, Instruction::Invokespecial)(input),
        0xb8 => map(be_u16, Instruction::Invokestatic)(input),
        0xb9 => invokeinterface_parser(input),
        0xba => invokedynamic_parser(input),
        0xbb => map(be_u16, Instruction::New)(input),
        0xbc => map(be_u8, Instruction::Newarray)(input),
        0xbd => map(be_u16, Instruction::Anewarray)(input),
        0xbe => Ok((input, Instruction::Arraylength)),
        0xbf => Ok((input, Instruction::Athrow)),
        0xc0 => map(be_u16, Instruction::Checkcast)(input),
        0xc1 => map(be_u16, Instruction::Instanceof)(input),
        0xc2 => Ok((input, Instruction::Monitorenter)),
        0xc3 => Ok((input, Instruction::Monitorexit)),
        0xc4 => wide_parser(input),
        0xc5 => multianewarray_parser(input),
        0xc6 => map(be_i16, Instruction::Ifnull)(input),
        0xc7 => map(be_i16, Instruction::Ifnonnull)(input),
        0xc8 => map(be_i32, Instruction::GotoW)(input),
        0xc9 => map(be_i32, Instruction::JsrW)(input),
        _ => Err(invalid(input, ErrorKind::Switch)),
    }
}

/// Decodes a whole code array into `(address, instruction)` pairs.
pub fn code_parser(input: &[u8]) -> Result<(&[u8], Vec<(usize, Instruction)>), Err> {
    let total = input.len();
    let mut rest = input;
    let mut instructions = Vec::new();
    while !rest.is_empty() {
        let address = total - rest.len();
        let (remaining, instruction) = instruction_parser(rest, address)?;
        instructions.push((address, instruction));
        rest = remaining;
    }
    Ok((rest, instructions))
}
