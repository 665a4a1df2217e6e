mod common;

use classfile_decompiler::attribute_info::AttributeInfoVariant;
use classfile_decompiler::method_info::MethodAccessFlags;
use classfile_decompiler::{parse_class, ClassAccessFlags, ClassFormatError};

use common::{ClassBuilder, Code, ACC_PUBLIC, ACC_STATIC};

fn calc_class() -> Vec<u8> {
    let mut class = ClassBuilder::new("demo/Calc", "java/lang/Object");
    class.field(ACC_PUBLIC, "total", "J");
    class.method(
        ACC_PUBLIC | ACC_STATIC,
        "add",
        "(II)I",
        Some(
            Code::new(2, 2, vec![0x1a, 0x1b, 0x60, 0xac])
                .lines(&[(0, 3)])
                .local(0, "a", "I")
                .local(1, "b", "I"),
        ),
    );
    class.build()
}

#[test]
fn test_valid_class() {
    let class = parse_class(&calc_class()).expect("assembled class should load");
    assert_eq!(class.major_version, 52);
    assert_eq!(class.this_class_name(), "demo/Calc");
    assert_eq!(class.super_class_name(), Some("java/lang/Object"));
    assert!(class.access_flags.contains(ClassAccessFlags::PUBLIC));
    assert_eq!(class.fields.len(), 1);
    assert_eq!(class.const_pool.utf8(class.fields[0].name_index), Some("total"));

    let add = class.find_method("add", "(II)I").expect("add should be found by name and descriptor");
    assert!(add.access_flags.contains(MethodAccessFlags::STATIC));
    let code = add.code().expect("add has a Code attribute");
    assert_eq!(code.code, vec![0x1a, 0x1b, 0x60, 0xac]);
    assert_eq!(code.line_for_offset(2), Some(3));
    let lvt = code.local_variable_table().expect("local variable table is interpreted");
    assert_eq!(lvt.items.len(), 2);
    assert_eq!(class.const_pool.utf8(lvt.items[1].name_index), Some("b"));
}

#[test]
fn test_code_attribute_is_interpreted() {
    let class = parse_class(&calc_class()).unwrap();
    let method = &class.methods[0];
    assert!(matches!(
        method.attributes[0].info_parsed,
        Some(AttributeInfoVariant::Code(_))
    ));
}

#[test]
fn test_bad_magic() {
    let mut bytes = calc_class();
    bytes[..4].copy_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
    assert_eq!(parse_class(&bytes), Err(ClassFormatError::BadMagic(0xdead_beef)));
}

#[test]
fn test_unsupported_version() {
    let mut class = ClassBuilder::new("demo/Future", "java/lang/Object");
    class.major = 99;
    assert_eq!(
        parse_class(&class.build()),
        Err(ClassFormatError::UnsupportedVersion { major: 99, minor: 0 })
    );
}

#[test]
fn test_truncated_class() {
    let bytes = calc_class();
    for cut in [6, 12, bytes.len() / 2, bytes.len() - 1] {
        let result = parse_class(&bytes[..cut]);
        assert!(
            matches!(result, Err(ClassFormatError::Truncated { .. })),
            "cut at {} gave {:?}",
            cut,
            result
        );
    }
}

#[test]
fn test_this_class_out_of_range() {
    let mut class = ClassBuilder::new("demo/Broken", "java/lang/Object");
    class.this_class = 200;
    assert!(matches!(
        parse_class(&class.build()),
        Err(ClassFormatError::BadConstantIndex { index: 200, .. })
    ));
}
