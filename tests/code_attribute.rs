mod common;

use classfile_decompiler::attribute_info::{
    code_attribute_parser, AttributeInfoVariant, InnerClassAccessFlags,
};
use classfile_decompiler::code_attribute::{code_parser, instruction_parser, Instruction};
use classfile_decompiler::parse_class;

use common::{idx, ClassBuilder, Code, ACC_PRIVATE, ACC_PUBLIC, ACC_STATIC};

#[test]
fn test_simple() {
    let instruction = &[0x11, 0xff, 0xfe];
    assert_eq!(
        Ok((&[][..], Instruction::Sipush(-2i16))),
        instruction_parser(instruction, 0)
    );
}

#[test]
fn test_wide() {
    let instruction = &[0xc4, 0x15, 0xaa, 0xbb];
    assert_eq!(
        Ok((&[][..], Instruction::IloadWide(0xaabb))),
        instruction_parser(instruction, 0)
    );
}

#[test]
fn test_alignment() {
    let instructions = vec![
        (
            3,
            vec![
                0xaa, 0, 0, 0, 10, 0, 0, 0, 20, 0, 0, 0, 21, 0, 0, 0, 30, 0, 0, 0, 31,
            ],
        ),
        (
            0,
            vec![
                0xaa, 0, 0, 0, 0, 0, 0, 10, 0, 0, 0, 20, 0, 0, 0, 21, 0, 0, 0, 30, 0, 0, 0, 31,
            ],
        ),
    ];
    let expected = Ok((
        &[][..],
        Instruction::Tableswitch {
            default: 10,
            low: 20,
            high: 21,
            offsets: vec![30, 31],
        },
    ));
    for (address, instruction) in instructions {
        assert_eq!(expected, instruction_parser(&instruction, address));
    }
}

#[test]
fn test_incomplete() {
    // dup, dup, <incomplete iload/wide>
    let code = &[0x59, 0x59, 0xc4, 0x15];
    assert!(code_parser(code).is_err());
}

#[test]
fn test_addresses() {
    // iload_0, bipush 7, iadd, ireturn
    let code = &[0x1a, 0x10, 0x07, 0x60, 0xac];
    let (rest, instructions) = code_parser(code).unwrap();
    assert!(rest.is_empty());
    assert_eq!(
        instructions,
        vec![
            (0, Instruction::Iload0),
            (1, Instruction::Bipush(7)),
            (3, Instruction::Iadd),
            (4, Instruction::Ireturn),
        ]
    );
}

#[test]
fn test_control_transfer() {
    let switch = Instruction::Lookupswitch { default: 20, npairs: 2, pairs: vec![(1, 8), (5, 12)] };
    assert_eq!(switch.jump_targets(4), vec![24, 12, 16]);
    assert!(switch.ends_flow());

    let back_edge = Instruction::Goto(-12);
    assert_eq!(back_edge.jump_targets(16), vec![4]);
    assert!(back_edge.ends_flow() && !back_edge.is_conditional_branch());

    let test = Instruction::IfIcmpge(13);
    assert_eq!(test.jump_targets(6), vec![19]);
    assert!(test.is_conditional_branch() && test.ends_block() && !test.ends_flow());

    assert!(Instruction::Jsr(5).ends_block());
    assert!(!Instruction::Jsr(5).ends_flow());
    assert!(Instruction::Athrow.ends_flow());
    assert!(!Instruction::Iadd.ends_block());
}

#[test]
fn test_unknown_opcode() {
    assert!(instruction_parser(&[0xff], 0).is_err());
}

#[test]
fn code_attribute_with_handler() {
    let mut class = ClassBuilder::new("demo/Guard", "java/lang/Object");
    // aload_0, invokevirtual hashCode, ireturn, astore_1, iconst_0, ireturn
    let hash = class.pool.method_ref("java/lang/Object", "hashCode", "()I");
    let [hi, lo] = idx(hash);
    let code = Code::new(1, 2, vec![0x2a, 0xb6, hi, lo, 0xac, 0x4c, 0x03, 0xac])
        .handler(0, 5, 5, Some("java/lang/RuntimeException"))
        .lines(&[(0, 10), (5, 11)]);
    class.method(ACC_PUBLIC | ACC_STATIC, "safeHash", "(Ljava/lang/Object;)I", Some(code));
    let class = parse_class(&class.build()).unwrap();

    let raw = &class.methods[0].attributes[0].info;
    let (_, code) = code_attribute_parser(raw).unwrap();
    assert_eq!(code.max_locals, 2);
    assert_eq!(code.exception_table.len(), 1);
    let entry = &code.exception_table[0];
    assert_eq!((entry.start_pc, entry.end_pc, entry.handler_pc), (0, 5, 5));
    assert!(entry.covers(4));
    assert!(!entry.covers(5));
    assert_eq!(
        class.const_pool.class_name(entry.catch_type),
        Some("java/lang/RuntimeException")
    );

    let interpreted = class.methods[0].code().unwrap();
    assert_eq!(interpreted.line_for_offset(4), Some(10));
    assert_eq!(interpreted.line_for_offset(7), Some(11));
}

#[test]
fn inner_classes() {
    let mut class = ClassBuilder::new("demo/Outer", "java/lang/Object");
    class.inner_class("demo/Outer$Inner", Some("demo/Outer"), Some("Inner"), ACC_PRIVATE | ACC_STATIC);
    class.inner_class("demo/Outer$1", None, None, 0);
    let class = parse_class(&class.build()).unwrap();

    let inner_classes = class
        .attributes
        .iter()
        .find_map(|a| match &a.info_parsed {
            Some(AttributeInfoVariant::InnerClasses(t)) => Some(t),
            _ => None,
        })
        .expect("InnerClasses attribute is interpreted");
    assert_eq!(inner_classes.number_of_classes, 2);

    let member = &inner_classes.classes[0];
    assert_eq!(class.const_pool.class_name(member.inner_class_info_index), Some("demo/Outer$Inner"));
    assert_eq!(class.const_pool.class_name(member.outer_class_info_index), Some("demo/Outer"));
    assert_eq!(class.const_pool.utf8(member.inner_name_index), Some("Inner"));
    assert!(member
        .inner_class_access_flags
        .contains(InnerClassAccessFlags::PRIVATE | InnerClassAccessFlags::STATIC));

    // anonymous classes have neither an outer class nor a simple name
    let anonymous = &inner_classes.classes[1];
    assert_eq!(anonymous.outer_class_info_index, 0);
    assert_eq!(anonymous.inner_name_index, 0);
}

#[test]
fn local_variable_table() {
    let mut class = ClassBuilder::new("demo/Locals", "java/lang/Object");
    // iconst_1, istore_1, iload_1, ireturn
    let code = Code::new(1, 2, vec![0x04, 0x3c, 0x1b, 0xac])
        .local(0, "this", "Ldemo/Locals;")
        .local_range(1, "one", "I", 2, 2);
    class.method(ACC_PUBLIC, "one", "()I", Some(code));
    let class = parse_class(&class.build()).unwrap();

    let lvt = class.methods[0].code().unwrap().local_variable_table().unwrap();
    let types: Vec<&str> = lvt
        .items
        .iter()
        .filter_map(|i| class.const_pool.utf8(i.descriptor_index))
        .collect();
    assert_eq!(types, vec!["Ldemo/Locals;", "I"]);
    assert!(!lvt.items[1].covers(1));
    assert!(lvt.items[1].covers(2));
}
