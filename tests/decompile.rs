mod common;

use classfile_decompiler::constant_info::{ConstantInfo, ConstantPool};
use classfile_decompiler::decompile::stack_depth;
use classfile_decompiler::decompile::{ClassFamily, DecompileOptions, Decompiler, RenderConfig};
use classfile_decompiler::{parse_class, ClassFile, DecompileError};

use common::{
    idx, ClassBuilder, Code, ACC_ABSTRACT, ACC_ENUM, ACC_FINAL, ACC_PRIVATE, ACC_PUBLIC, ACC_STATIC, ACC_SUPER,
    ACC_SYNTHETIC,
};

// iload_0, iload_1, iadd, ireturn
const ADD: [u8; 4] = [0x1a, 0x1b, 0x60, 0xac];

// iload_0; ifeq 11; iinc 0 1; goto 10; iinc 0 -1; goto 6
// Both arms jump into the middle of the other's path.
const IRREDUCIBLE: [u8; 16] = [
    0x1a, 0x99, 0x00, 0x09, 0x84, 0x00, 0x01, 0xa7, 0x00, 0x03, 0x84, 0x00, 0xff, 0xa7, 0xff, 0xf7,
];

// int total = 0; for (int i = 0; i < n; i++) total += i; return total;
const SUM: [u8; 21] = [
    0x03, 0x3c, 0x03, 0x3d, 0x1c, 0x1a, 0xa2, 0x00, 0x0d, 0x1b, 0x1c, 0x60, 0x3c, 0x84, 0x02, 0x01,
    0xa7, 0xff, 0xf4, 0x1b, 0xac,
];

fn add_code() -> Code {
    Code::new(2, 2, ADD.to_vec())
        .lines(&[(0, 3)])
        .local(0, "a", "I")
        .local(1, "b", "I")
}

fn calc() -> ClassBuilder {
    let mut class = ClassBuilder::new("demo/Calc", "java/lang/Object");
    class.default_constructor("java/lang/Object");
    class.method(ACC_PUBLIC | ACC_STATIC, "add", "(II)I", Some(add_code()));
    class
}

fn calc_with_spin() -> ClassFile {
    let mut class = calc();
    let spin = Code::new(1, 1, IRREDUCIBLE.to_vec()).lines(&[(0, 5), (4, 6), (10, 7)]);
    class.method(ACC_STATIC, "spin", "(I)V", Some(spin));
    parse_class(&class.build()).unwrap()
}

fn decompile(bytes: &[u8]) -> String {
    Decompiler::default().decompile_bytes(bytes).unwrap()
}

#[test]
fn simple_static_method() {
    let source = decompile(&calc().build());
    assert!(source.starts_with("package demo;\n"), "{}", source);
    assert!(source.contains("public class Calc {"), "{}", source);
    assert!(source.contains("public static int add(int a, int b) {"), "{}", source);
    assert!(source.contains("return a + b;"), "{}", source);
    // the implicit no-argument constructor is not printed
    assert!(!source.contains("Calc()"), "{}", source);
}

#[test]
fn failed_method_degrades_to_listing() {
    let class = calc_with_spin();
    let source = Decompiler::default().decompile(&class);

    assert!(
        source.contains("assert false : \"Decompilation failed at line #6 -> offsets [4]\";"),
        "{}",
        source
    );
    assert!(source.contains("// Byte code:"), "{}", source);
    assert!(source.contains("static void spin(int"), "{}", source);
    // the rest of the class is unaffected
    assert!(source.contains("return a + b;"), "{}", source);
}

#[test]
fn output_is_deterministic() {
    let bytes = calc().build();
    let decompiler = Decompiler::default();
    let first = decompiler.decompile_bytes(&bytes).unwrap();
    let second = decompiler.decompile_bytes(&bytes).unwrap();
    assert_eq!(first, second);

    let all = decompiler.decompile_all(&[
        ("Calc.class".to_string(), bytes.clone()),
        ("Broken.class".to_string(), b"not a class".to_vec()),
    ]);
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].as_ref().unwrap(), &first);
    assert!(matches!(all[1], Err(DecompileError::Format(_))));
}

#[test]
fn disassemble_method() {
    let class = parse_class(&calc().build()).unwrap();
    let listing = Decompiler::default().disassemble(&class, "add").unwrap();
    assert!(listing.contains("0: iload_0"), "{}", listing);
    assert!(listing.contains("2: iadd"), "{}", listing);
    assert!(listing.contains("3: ireturn"), "{}", listing);
    assert!(listing.contains("// Line number table:"), "{}", listing);
    assert!(listing.contains("// Local variable table:"), "{}", listing);

    assert_eq!(
        Decompiler::default().disassemble(&class, "nope"),
        Err(DecompileError::MethodNotFound("nope".to_string()))
    );
}

#[test]
fn decompile_single_method() {
    let class = calc_with_spin();
    let decompiler = Decompiler::default();
    let source = decompiler.decompile_method(&class, "add").unwrap();
    assert!(source.contains("public class Calc {"), "{}", source);
    assert!(source.contains("return a + b;"), "{}", source);
    assert!(!source.contains("spin"), "{}", source);

    assert!(matches!(
        decompiler.decompile_method(&class, "missing"),
        Err(DecompileError::MethodNotFound(_))
    ));
}

#[test]
fn offsets_and_line_markers() {
    let class = parse_class(&calc().build()).unwrap();
    let decompiler = Decompiler::new(DecompileOptions {
        render_config: RenderConfig {
            annotate_offsets: true,
            line_number_markers: true,
            ..RenderConfig::default()
        },
        ..DecompileOptions::default()
    });
    let unit = decompiler.build_unit(&class, &ClassFamily::new());
    let rendered = decompiler.render_unit(&unit);

    assert!(rendered.text.contains("/* line 3 */"), "{}", rendered.text);
    assert!(rendered.text.contains("// bytecode "), "{}", rendered.text);

    let mappings: Vec<_> = rendered.method_lines("add").collect();
    assert!(!mappings.is_empty());
    assert!(mappings
        .iter()
        .any(|m| m.source_line == Some(3) && m.end_offset == 3 && m.descriptor == "(II)I"));
    for m in &mappings {
        let line = rendered.text.lines().nth(m.output_line - 1).unwrap();
        assert!(line.contains("// bytecode"), "{}", line);
    }
}

fn accessor_classes() -> (Vec<u8>, Vec<u8>) {
    let mut outer = ClassBuilder::new("demo/Outer", "java/lang/Object");
    outer.field(ACC_PRIVATE, "x", "I");
    let field = outer.pool.field_ref("demo/Outer", "x", "I");
    let [hi, lo] = idx(field);
    // aload_0, getfield x, ireturn
    outer.method(
        ACC_STATIC | ACC_SYNTHETIC,
        "access$000",
        "(Ldemo/Outer;)I",
        Some(Code::new(1, 1, vec![0x2a, 0xb4, hi, lo, 0xac])),
    );
    outer.inner_class("demo/Outer$Inner", Some("demo/Outer"), Some("Inner"), ACC_STATIC);

    let mut inner = ClassBuilder::new("demo/Outer$Inner", "java/lang/Object").access(common::ACC_SUPER);
    let accessor = inner.pool.method_ref("demo/Outer", "access$000", "(Ldemo/Outer;)I");
    let [hi, lo] = idx(accessor);
    // aload_1, invokestatic access$000, ireturn
    let peek = Code::new(1, 2, vec![0x2b, 0xb8, hi, lo, 0xac])
        .local(0, "this", "Ldemo/Outer$Inner;")
        .local(1, "o", "Ldemo/Outer;");
    inner.method(0, "peek", "(Ldemo/Outer;)I", Some(peek));
    inner.inner_class("demo/Outer$Inner", Some("demo/Outer"), Some("Inner"), ACC_STATIC);
    (outer.build(), inner.build())
}

fn family_of(classes: &[Vec<u8>]) -> ClassFamily {
    let mut family = ClassFamily::new();
    for bytes in classes {
        family.add_bytes(bytes).unwrap();
    }
    family
}

fn accessor_family() -> (ClassFile, ClassFamily) {
    let (outer, inner) = accessor_classes();
    let family = family_of(&[outer, inner]);
    let outer = family.get("demo/Outer").unwrap().clone();
    (outer, family)
}

#[test]
fn accessor_calls_are_inlined() {
    let (outer, family) = accessor_family();
    assert_eq!(family.top_level().count(), 1);

    let source = Decompiler::default().decompile_family(&outer, &family);
    assert!(source.contains("static class Inner {"), "{}", source);
    assert!(source.contains("return o.x;"), "{}", source);
    assert!(!source.contains("access$000"), "{}", source);
}

#[test]
fn accessors_kept_when_elimination_is_off() {
    let (outer, family) = accessor_family();
    let decompiler = Decompiler::new(DecompileOptions {
        eliminate_accessors: false,
        include_synthetic: true,
        ..DecompileOptions::default()
    });
    let source = decompiler.decompile_family(&outer, &family);
    assert!(source.contains("access$000"), "{}", source);
}

#[test]
fn if_else_returns() {
    let mut class = ClassBuilder::new("demo/Max", "java/lang/Object");
    // iload_0, iload_1, if_icmple 7, iload_0, ireturn, iload_1, ireturn
    let code = Code::new(2, 2, vec![0x1a, 0x1b, 0xa4, 0x00, 0x05, 0x1a, 0xac, 0x1b, 0xac])
        .local(0, "a", "I")
        .local(1, "b", "I");
    class.method(ACC_PUBLIC | ACC_STATIC, "max", "(II)I", Some(code));
    let source = decompile(&class.build());

    assert!(source.contains("a > b") || source.contains("a <= b"), "{}", source);
    assert!(source.contains("return a;"), "{}", source);
    assert!(source.contains("return b;"), "{}", source);
    assert!(!source.contains("goto"), "{}", source);
}

fn sum_class() -> ClassFile {
    let mut class = ClassBuilder::new("demo/Sum", "java/lang/Object");
    let code = Code::new(2, 3, SUM.to_vec())
        .local(0, "n", "I")
        .local_range(1, "total", "I", 2, 19)
        .local_range(2, "i", "I", 4, 15);
    class.method(ACC_PUBLIC | ACC_STATIC, "sum", "(I)I", Some(code));
    parse_class(&class.build()).unwrap()
}

#[test]
fn counting_loop_becomes_for() {
    let source = Decompiler::default().decompile(&sum_class());
    assert!(source.contains("int total = 0;"), "{}", source);
    assert!(source.contains("for (int i = 0; i < n; i++) {"), "{}", source);
    assert!(source.contains("total += i;"), "{}", source);
    assert!(source.contains("return total;"), "{}", source);
}

#[test]
fn stack_depth_is_balanced() {
    let class = sum_class();
    let code = class.find_method("sum", "(I)I").unwrap().code().unwrap();
    let depths = stack_depth::replay(code, &class.const_pool).unwrap();
    assert_eq!(depths.at(0), Some(0));
    assert_eq!(depths.at(6), Some(2));
    assert_eq!(depths.at(11), Some(2));
    // the loop header is reached from the entry and the back edge at the same depth
    assert_eq!(depths.at(4), Some(0));
    assert_eq!(depths.at(20), Some(1));
    assert_eq!(depths.max_depth, 2);
}

#[test]
fn dup_x1_post_increment() {
    let mut class = ClassBuilder::new("demo/Counter", "java/lang/Object");
    class.field(ACC_PRIVATE, "count", "I");
    let field = class.pool.field_ref("demo/Counter", "count", "I");
    let [hi, lo] = idx(field);
    // aload_0, dup, getfield, dup_x1, iconst_1, iadd, putfield, ireturn
    let code = Code::new(4, 1, vec![0x2a, 0x59, 0xb4, hi, lo, 0x5b, 0x04, 0x60, 0xb5, hi, lo, 0xac])
        .local(0, "this", "Ldemo/Counter;");
    class.method(ACC_PUBLIC, "next", "()I", Some(code));
    let class = parse_class(&class.build()).unwrap();

    let code = class.find_method("next", "()I").unwrap().code().unwrap();
    let depths = stack_depth::replay(code, &class.const_pool).unwrap();
    assert_eq!(depths.at(5), Some(2));
    assert_eq!(depths.at(8), Some(3));
    assert_eq!(depths.at(11), Some(1));
    assert_eq!(depths.max_depth, 4);

    let source = Decompiler::default().decompile(&class);
    assert!(!source.contains("Decompilation failed"), "{}", source);
    assert!(!source.contains("dup"), "{}", source);
    assert!(source.contains("this.count"), "{}", source);
}

#[test]
fn parallel_methods_match_sequential() {
    let class = calc_with_spin();
    let parallel = Decompiler::new(DecompileOptions { parallel_methods: true, ..DecompileOptions::default() });
    assert_eq!(parallel.decompile(&class), Decompiler::default().decompile(&class));
}

#[test]
fn rejected_class_reports_format_error() {
    let result = Decompiler::default().decompile_bytes(&[0xca, 0xfe]);
    assert!(matches!(result, Err(DecompileError::Format(_))));
}

// ---------------------------------------------------------------------------
// javac instruction shapes, end to end
// ---------------------------------------------------------------------------

fn has_field_ref(pool: &ConstantPool, class_name: &str, field_name: &str) -> bool {
    (1..pool.count()).any(|i| {
        matches!(pool.get(i), Some(ConstantInfo::FieldRef(_)))
            && pool.member_ref(i).map_or(false, |r| r.class_name == class_name && r.name == field_name)
    })
}

#[test]
fn string_switch_folds_back() {
    let mut class = ClassBuilder::new("demo/Codes", "java/lang/Object");
    let [h1, h2] = idx(class.pool.method_ref("java/lang/String", "hashCode", "()I"));
    let [e1, e2] = idx(class.pool.method_ref("java/lang/String", "equals", "(Ljava/lang/Object;)Z"));
    let a = class.pool.string("a") as u8;
    let b = class.pool.string("b") as u8;
    // switch (s) { case "a": return 1; case "b": return 2; default: return 0; }
    let bytes = vec![
        // aload_0, astore_1, iconst_m1, istore_2, aload_1, invokevirtual hashCode
        0x2a, 0x4c, 0x02, 0x3d, 0x2b, 0xb6, h1, h2,
        // 8: lookupswitch { 97: 36, 98: 50, default: 61 }
        0xab, 0, 0, 0, 0, 0, 0, 53, 0, 0, 0, 2, 0, 0, 0, 97, 0, 0, 0, 28, 0, 0, 0, 98, 0, 0, 0, 42,
        // 36: aload_1, ldc "a", invokevirtual equals, ifeq 61, iconst_0, istore_2, goto 61
        0x2b, 0x12, a, 0xb6, e1, e2, 0x99, 0x00, 0x13, 0x03, 0x3d, 0xa7, 0x00, 0x0e,
        // 50: aload_1, ldc "b", invokevirtual equals, ifeq 61, iconst_1, istore_2
        0x2b, 0x12, b, 0xb6, e1, e2, 0x99, 0x00, 0x05, 0x04, 0x3d,
        // 61: iload_2, tableswitch 0..1 { 84, 86 } default 88
        0x1c, 0xaa, 0, 0, 0, 0, 26, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 22, 0, 0, 0, 24,
        // 84: iconst_1, ireturn, iconst_2, ireturn, iconst_0, ireturn
        0x04, 0xac, 0x05, 0xac, 0x03, 0xac,
    ];
    let code = Code::new(2, 3, bytes).local(0, "s", "Ljava/lang/String;");
    class.method(ACC_PUBLIC | ACC_STATIC, "code", "(Ljava/lang/String;)I", Some(code));
    let source = decompile(&class.build());

    assert!(!source.contains("Decompilation failed"), "{}", source);
    assert!(source.contains("switch (s) {"), "{}", source);
    assert!(source.contains("case \"a\":"), "{}", source);
    assert!(source.contains("case \"b\":"), "{}", source);
    assert!(source.contains("return 2;"), "{}", source);
    assert!(!source.contains("hashCode"), "{}", source);
}

#[test]
fn array_loop_becomes_foreach() {
    let mut class = ClassBuilder::new("demo/Total", "java/lang/Object");
    // int t = 0; for (int v : a) t += v; return t;
    let bytes = vec![
        // iconst_0, istore_1, aload_0, astore_2, aload_2, arraylength, istore_3, iconst_0, istore 4
        0x03, 0x3c, 0x2a, 0x4d, 0x2c, 0xbe, 0x3e, 0x03, 0x36, 0x04,
        // 10: iload 4, iload_3, if_icmpge 33
        0x15, 0x04, 0x1d, 0xa2, 0x00, 0x14,
        // 16: aload_2, iload 4, iaload, istore 5, iload_1, iload 5, iadd, istore_1, iinc 4 1, goto 10
        0x2c, 0x15, 0x04, 0x2e, 0x36, 0x05, 0x1b, 0x15, 0x05, 0x60, 0x3c, 0x84, 0x04, 0x01, 0xa7, 0xff, 0xec,
        // 33: iload_1, ireturn
        0x1b, 0xac,
    ];
    let code = Code::new(2, 6, bytes)
        .local(0, "a", "[I")
        .local_range(1, "t", "I", 2, 33)
        .local_range(5, "v", "I", 22, 5);
    class.method(ACC_PUBLIC | ACC_STATIC, "total", "([I)I", Some(code));
    let source = decompile(&class.build());

    assert!(source.contains("int t = 0;"), "{}", source);
    assert!(source.contains("for (int v : a) {"), "{}", source);
    assert!(source.contains("t += v;"), "{}", source);
    assert!(!source.contains(".length"), "{}", source);
}

#[test]
fn monitor_pair_becomes_synchronized_block() {
    let mut class = ClassBuilder::new("demo/Locked", "java/lang/Object");
    let [t1, t2] = idx(class.pool.method_ref("demo/Util", "tick", "()V"));
    // synchronized (lock) { Util.tick(); }
    let bytes = vec![
        // aload_0, dup, astore_1, monitorenter, invokestatic tick, aload_1, monitorexit, goto 17
        0x2a, 0x59, 0x4c, 0xc2, 0xb8, t1, t2, 0x2b, 0xc3, 0xa7, 0x00, 0x08,
        // 12: astore_2, aload_1, monitorexit, aload_2, athrow
        0x4d, 0x2b, 0xc3, 0x2c, 0xbf,
        // 17: return
        0xb1,
    ];
    let code = Code::new(2, 3, bytes)
        .handler(4, 9, 12, None)
        .handler(12, 15, 12, None)
        .local(0, "lock", "Ljava/lang/Object;");
    class.method(ACC_PUBLIC | ACC_STATIC, "run", "(Ljava/lang/Object;)V", Some(code));
    let source = decompile(&class.build());

    assert!(source.contains("synchronized (lock) {"), "{}", source);
    assert!(source.contains("Util.tick();"), "{}", source);
    assert!(!source.contains("monitor"), "{}", source);
    assert!(!source.contains("finally"), "{}", source);
}

#[test]
fn while_with_break_and_continue() {
    let mut class = ClassBuilder::new("demo/Scan", "java/lang/Object");
    let [t1, t2] = idx(class.pool.method_ref("demo/Util", "tick", "()V"));
    // int i = 0; while (i < n) { i++; if (i == 3) continue; if (i == 7) break; Util.tick(); } return i;
    let bytes = vec![
        // iconst_0, istore_1
        0x03, 0x3c,
        // 2: iload_1, iload_0, if_icmpge 33
        0x1b, 0x1a, 0xa2, 0x00, 0x1d,
        // 7: iinc 1 1, iload_1, iconst_3, if_icmpne 18, goto 2
        0x84, 0x01, 0x01, 0x1b, 0x06, 0xa0, 0x00, 0x06, 0xa7, 0xff, 0xf3,
        // 18: iload_1, bipush 7, if_icmpne 27, goto 33
        0x1b, 0x10, 0x07, 0xa0, 0x00, 0x06, 0xa7, 0x00, 0x09,
        // 27: invokestatic tick, goto 2
        0xb8, t1, t2, 0xa7, 0xff, 0xe4,
        // 33: iload_1, ireturn
        0x1b, 0xac,
    ];
    let code = Code::new(2, 2, bytes).local(0, "n", "I").local_range(1, "i", "I", 2, 33);
    class.method(ACC_PUBLIC | ACC_STATIC, "scan", "(I)I", Some(code));
    let source = decompile(&class.build());

    assert!(!source.contains("Decompilation failed"), "{}", source);
    assert!(source.contains("while (i < n) {"), "{}", source);
    assert!(source.contains("continue;"), "{}", source);
    assert!(source.contains("break;"), "{}", source);
    assert!(source.contains("Util.tick();"), "{}", source);
    assert!(source.contains("return i;"), "{}", source);
    assert!(!source.contains("label"), "{}", source);
}

#[test]
fn nested_counting_loops() {
    let mut class = ClassBuilder::new("demo/Grid", "java/lang/Object");
    // int c = 0; for (int i = 0; i < n; i++) for (int j = 0; j < i; j++) c++; return c;
    let bytes = vec![
        // iconst_0, istore_1, iconst_0, istore_2
        0x03, 0x3c, 0x03, 0x3d,
        // 4: iload_2, iload_0, if_icmpge 31
        0x1c, 0x1a, 0xa2, 0x00, 0x19,
        // 9: iconst_0, istore_3
        0x03, 0x3e,
        // 11: iload_3, iload_2, if_icmpge 25
        0x1d, 0x1c, 0xa2, 0x00, 0x0c,
        // 16: iinc 1 1, iinc 3 1, goto 11
        0x84, 0x01, 0x01, 0x84, 0x03, 0x01, 0xa7, 0xff, 0xf5,
        // 25: iinc 2 1, goto 4
        0x84, 0x02, 0x01, 0xa7, 0xff, 0xe8,
        // 31: iload_1, ireturn
        0x1b, 0xac,
    ];
    let code = Code::new(2, 4, bytes)
        .local(0, "n", "I")
        .local_range(1, "c", "I", 2, 31)
        .local_range(2, "i", "I", 4, 27)
        .local_range(3, "j", "I", 11, 14);
    class.method(ACC_PUBLIC | ACC_STATIC, "grid", "(I)I", Some(code));
    let source = decompile(&class.build());

    assert!(source.contains("for (int i = 0; i < n; i++) {"), "{}", source);
    assert!(source.contains("for (int j = 0; j < i; j++) {"), "{}", source);
    assert!(source.contains("c++;"), "{}", source);
    assert!(source.contains("return c;"), "{}", source);
}

#[test]
fn jsr_subroutine_becomes_finally() {
    let mut class = ClassBuilder::new("demo/Legacy", "java/lang/Object");
    class.major = 49;
    let [t1, t2] = idx(class.pool.method_ref("demo/Util", "tick", "()V"));
    let [k1, k2] = idx(class.pool.method_ref("demo/Util", "tock", "()V"));
    // try { Util.tick(); } finally { Util.tock(); } as pre-1.6 javac wrote it
    let bytes = vec![
        // invokestatic tick, jsr 15, goto 21
        0xb8, t1, t2, 0xa8, 0x00, 0x0c, 0xa7, 0x00, 0x0f,
        // 9: astore_0, jsr 15, aload_0, athrow
        0x4b, 0xa8, 0x00, 0x05, 0x2a, 0xbf,
        // 15: astore_1, invokestatic tock, ret 1
        0x4c, 0xb8, k1, k2, 0xa9, 0x01,
        // 21: return
        0xb1,
    ];
    let code = Code::new(1, 2, bytes).handler(0, 6, 9, None);
    class.method(ACC_PUBLIC | ACC_STATIC, "run", "()V", Some(code));
    let source = decompile(&class.build());

    assert!(!source.contains("Decompilation failed"), "{}", source);
    assert!(source.contains("try {"), "{}", source);
    assert!(source.contains("} finally {"), "{}", source);
    assert!(source.contains("Util.tick();"), "{}", source);
    assert_eq!(source.matches("Util.tock();").count(), 1, "{}", source);
    assert!(!source.contains("catch"), "{}", source);
    assert!(!source.contains("jsr"), "{}", source);
}

#[test]
fn decompile_all_resolves_across_inputs() {
    let (outer, inner) = accessor_classes();
    let inputs = vec![
        ("demo/Outer".to_string(), outer),
        ("demo/Outer$Inner".to_string(), inner),
        ("broken".to_string(), vec![0xca, 0xfe]),
    ];
    let results = Decompiler::default().decompile_all(&inputs);
    assert_eq!(results.len(), 3);

    let outer = results[0].as_ref().unwrap();
    assert!(outer.contains("static class Inner {"), "{}", outer);
    assert!(outer.contains("return o.x;"), "{}", outer);
    assert!(results[1].is_ok());
    assert!(matches!(results[2], Err(DecompileError::Format(_))));
}

#[test]
fn string_concatenation_is_recovered() {
    let mut class = ClassBuilder::new("demo/Greeter", "java/lang/Object");
    let sb = "java/lang/StringBuilder";
    let [c1, c2] = idx(class.pool.class(sb));
    let [i1, i2] = idx(class.pool.method_ref(sb, "<init>", "()V"));
    let [s1, s2] = idx(class.pool.method_ref(sb, "append", "(Ljava/lang/String;)Ljava/lang/StringBuilder;"));
    let [n1, n2] = idx(class.pool.method_ref(sb, "append", "(I)Ljava/lang/StringBuilder;"));
    let [r1, r2] = idx(class.pool.method_ref(sb, "toString", "()Ljava/lang/String;"));
    let hi = class.pool.string("hi ") as u8;
    // return "hi " + name + n;
    let bytes = vec![
        // new StringBuilder, dup, invokespecial <init>, ldc "hi ", invokevirtual append(String)
        0xbb, c1, c2, 0x59, 0xb7, i1, i2, 0x12, hi, 0xb6, s1, s2,
        // 12: aload_0, invokevirtual append(String), iload_1, invokevirtual append(int)
        0x2a, 0xb6, s1, s2, 0x1b, 0xb6, n1, n2,
        // 20: invokevirtual toString, areturn
        0xb6, r1, r2, 0xb0,
    ];
    let code = Code::new(2, 2, bytes).local(0, "name", "Ljava/lang/String;").local(1, "n", "I");
    class.method(ACC_PUBLIC | ACC_STATIC, "greet", "(Ljava/lang/String;I)Ljava/lang/String;", Some(code));
    let source = decompile(&class.build());

    assert!(source.contains("return \"hi \" + name + n;"), "{}", source);
    assert!(!source.contains("StringBuilder"), "{}", source);
}

#[test]
fn enum_constant_with_class_body() {
    let mut op = ClassBuilder::new("demo/Op", "java/lang/Enum").access(ACC_PUBLIC | ACC_SUPER | ACC_ENUM | ACC_ABSTRACT);
    op.major = 55;
    op.field(ACC_PUBLIC | ACC_STATIC | ACC_FINAL | ACC_ENUM, "PLUS", "Ldemo/Op;");
    op.field(ACC_PRIVATE | ACC_STATIC | ACC_FINAL | ACC_SYNTHETIC, "$VALUES", "[Ldemo/Op;");
    let [e1, e2] = idx(op.pool.method_ref("java/lang/Enum", "<init>", "(Ljava/lang/String;I)V"));
    // aload_0, aload_1, iload_2, invokespecial Enum.<init>, return
    let init = Code::new(3, 3, vec![0x2a, 0x2b, 0x1c, 0xb7, e1, e2, 0xb1]);
    op.method(ACC_PRIVATE, "<init>", "(Ljava/lang/String;I)V", Some(init));
    op.method(ACC_ABSTRACT, "apply", "(II)I", None);
    let [b1, b2] = idx(op.pool.class("demo/Op$1"));
    let [k1, k2] = idx(op.pool.method_ref("demo/Op$1", "<init>", "(Ljava/lang/String;I)V"));
    let name = op.pool.string("PLUS") as u8;
    let [p1, p2] = idx(op.pool.field_ref("demo/Op", "PLUS", "Ldemo/Op;"));
    let [o1, o2] = idx(op.pool.class("demo/Op"));
    let [v1, v2] = idx(op.pool.field_ref("demo/Op", "$VALUES", "[Ldemo/Op;"));
    let clinit = vec![
        // new Op$1, dup, ldc "PLUS", iconst_0, invokespecial Op$1.<init>, putstatic PLUS
        0xbb, b1, b2, 0x59, 0x12, name, 0x03, 0xb7, k1, k2, 0xb3, p1, p2,
        // 13: iconst_1, anewarray Op, dup, iconst_0, getstatic PLUS, aastore, putstatic $VALUES, return
        0x04, 0xbd, o1, o2, 0x59, 0x03, 0xb2, p1, p2, 0x53, 0xb3, v1, v2, 0xb1,
    ];
    op.method(ACC_STATIC, "<clinit>", "()V", Some(Code::new(4, 0, clinit)));
    op.inner_class("demo/Op$1", None, None, ACC_FINAL | ACC_ENUM);

    let mut body = ClassBuilder::new("demo/Op$1", "demo/Op").access(ACC_FINAL | ACC_SUPER | ACC_ENUM);
    body.major = 55;
    let [s1, s2] = idx(body.pool.method_ref("demo/Op", "<init>", "(Ljava/lang/String;I)V"));
    let init = Code::new(3, 3, vec![0x2a, 0x2b, 0x1c, 0xb7, s1, s2, 0xb1]);
    body.method(0, "<init>", "(Ljava/lang/String;I)V", Some(init));
    // iload_1, iload_2, iadd, ireturn
    let apply = Code::new(2, 3, vec![0x1b, 0x1c, 0x60, 0xac])
        .local(0, "this", "Ldemo/Op$1;")
        .local(1, "a", "I")
        .local(2, "b", "I");
    body.method(0, "apply", "(II)I", Some(apply));
    body.inner_class("demo/Op$1", None, None, ACC_FINAL | ACC_ENUM);

    let family = family_of(&[op.build(), body.build()]);
    let op = family.get("demo/Op").unwrap();
    let source = Decompiler::default().decompile_family(op, &family);

    assert!(source.contains("enum Op {"), "{}", source);
    assert!(source.contains("PLUS {"), "{}", source);
    assert!(source.contains("int apply(int a, int b) {"), "{}", source);
    assert!(source.contains("return a + b;"), "{}", source);
    assert!(source.contains("};"), "{}", source);
    assert!(!source.contains("Op$1"), "{}", source);
    assert!(!source.contains("$VALUES"), "{}", source);
}

#[test]
fn inner_class_reads_through_outer_this() {
    let mut outer = ClassBuilder::new("demo/Outer", "java/lang/Object");
    outer.field(0, "n", "I");
    outer.default_constructor("java/lang/Object");
    outer.inner_class("demo/Outer$Inner", Some("demo/Outer"), Some("Inner"), 0);

    let mut inner = ClassBuilder::new("demo/Outer$Inner", "java/lang/Object").access(ACC_SUPER);
    inner.field(ACC_FINAL | ACC_SYNTHETIC, "this$0", "Ldemo/Outer;");
    let [t1, t2] = idx(inner.pool.field_ref("demo/Outer$Inner", "this$0", "Ldemo/Outer;"));
    let [n1, n2] = idx(inner.pool.field_ref("demo/Outer", "n", "I"));
    let [o1, o2] = idx(inner.pool.method_ref("java/lang/Object", "<init>", "()V"));
    // aload_0, aload_1, putfield this$0, aload_0, invokespecial Object.<init>, return
    let init = Code::new(2, 2, vec![0x2a, 0x2b, 0xb5, t1, t2, 0x2a, 0xb7, o1, o2, 0xb1])
        .local(0, "this", "Ldemo/Outer$Inner;")
        .local(1, "this$0", "Ldemo/Outer;");
    inner.method(0, "<init>", "(Ldemo/Outer;)V", Some(init));
    // aload_0, getfield this$0, areturn
    let owner = Code::new(1, 1, vec![0x2a, 0xb4, t1, t2, 0xb0]).local(0, "this", "Ldemo/Outer$Inner;");
    inner.method(0, "owner", "()Ldemo/Outer;", Some(owner));
    // aload_0, getfield this$0, getfield n, ireturn
    let get = Code::new(1, 1, vec![0x2a, 0xb4, t1, t2, 0xb4, n1, n2, 0xac]).local(0, "this", "Ldemo/Outer$Inner;");
    inner.method(0, "get", "()I", Some(get));
    inner.inner_class("demo/Outer$Inner", Some("demo/Outer"), Some("Inner"), 0);

    let family = family_of(&[outer.build(), inner.build()]);
    let outer = family.get("demo/Outer").unwrap();
    let source = Decompiler::default().decompile_family(outer, &family);

    assert!(source.contains("class Inner {"), "{}", source);
    assert!(source.contains("return Outer.this;"), "{}", source);
    assert!(source.contains("return n;"), "{}", source);
    assert!(!source.contains("this.this$0"), "{}", source);
}

fn increment_family() -> ClassFamily {
    let mut outer = ClassBuilder::new("demo/Outer", "java/lang/Object");
    outer.field(ACC_PRIVATE, "x", "I");
    let [f1, f2] = idx(outer.pool.field_ref("demo/Outer", "x", "I"));
    // aload_0, dup, getfield x, dup_x1, iconst_1, iadd, putfield x, ireturn
    let bump = Code::new(4, 1, vec![0x2a, 0x59, 0xb4, f1, f2, 0x5b, 0x04, 0x60, 0xb5, f1, f2, 0xac]);
    outer.method(ACC_STATIC | ACC_SYNTHETIC, "access$008", "(Ldemo/Outer;)I", Some(bump));
    outer.inner_class("demo/Outer$Inner", Some("demo/Outer"), Some("Inner"), ACC_STATIC);

    let mut inner = ClassBuilder::new("demo/Outer$Inner", "java/lang/Object").access(ACC_SUPER);
    let [m1, m2] = idx(inner.pool.method_ref("demo/Outer", "access$008", "(Ldemo/Outer;)I"));
    // aload_1, invokestatic access$008, pop, return
    let code = Code::new(1, 2, vec![0x2b, 0xb8, m1, m2, 0x57, 0xb1])
        .local(0, "this", "Ldemo/Outer$Inner;")
        .local(1, "o", "Ldemo/Outer;");
    inner.method(0, "bump", "(Ldemo/Outer;)V", Some(code));
    inner.inner_class("demo/Outer$Inner", Some("demo/Outer"), Some("Inner"), ACC_STATIC);
    family_of(&[outer.build(), inner.build()])
}

#[test]
fn increment_accessor_is_inlined() {
    let family = increment_family();
    let outer = family.get("demo/Outer").unwrap();
    let source = Decompiler::default().decompile_family(outer, &family);

    assert!(source.contains("o.x++;"), "{}", source);
    assert!(!source.contains("access$008"), "{}", source);
}

#[test]
fn inlined_access_adds_field_ref_to_caller_pool() {
    let family = increment_family();
    let outer = family.get("demo/Outer").unwrap();
    let loaded = &family.get("demo/Outer$Inner").unwrap().const_pool;
    assert!(!has_field_ref(loaded, "demo/Outer", "x"));

    let unit = Decompiler::default().build_unit(outer, &family);
    let pool = &unit.constant_pools["demo/Outer$Inner"];
    assert!(has_field_ref(pool, "demo/Outer", "x"));
    // loaded entries keep their slots
    assert_eq!(&pool.entries()[..loaded.entries().len()], loaded.entries());
}

#[test]
fn reused_slot_without_debug_table_gets_two_variables() {
    let mut class = ClassBuilder::new("demo/Reuse", "java/lang/Object");
    let [t1, t2] = idx(class.pool.method_ref("java/lang/String", "trim", "()Ljava/lang/String;"));
    let [u1, u2] = idx(class.pool.method_ref("demo/Util", "use", "(Ljava/lang/String;)V"));
    // { String str = text.trim(); Util.use(str); } int[] arr = new int[3]; return arr.length;
    let bytes = vec![
        // aload_0, invokevirtual trim, astore_1, aload_1, invokestatic use
        0x2a, 0xb6, t1, t2, 0x4c, 0x2b, 0xb8, u1, u2,
        // 9: iconst_3, newarray int, astore_1, aload_1, arraylength, ireturn
        0x06, 0xbc, 0x0a, 0x4c, 0x2b, 0xbe, 0xac,
    ];
    let code = Code::new(2, 2, bytes).local(0, "text", "Ljava/lang/String;");
    class.method(ACC_PUBLIC | ACC_STATIC, "size", "(Ljava/lang/String;)I", Some(code));
    let source = decompile(&class.build());

    assert!(!source.contains("Decompilation failed"), "{}", source);
    assert!(source.contains("String str = text.trim();"), "{}", source);
    assert!(source.contains("int[] arr = new int[3];"), "{}", source);
    assert!(source.contains("return arr.length;"), "{}", source);
    assert!(!source.contains("Object"), "{}", source);
}

#[test]
fn slot_beyond_max_locals_degrades_to_listing() {
    let mut class = calc();
    // iload 200, ireturn
    let code = Code::new(1, 1, vec![0x15, 0xc8, 0xac]).lines(&[(0, 9)]);
    class.method(ACC_STATIC, "wild", "(I)I", Some(code));
    let source = decompile(&class.build());

    assert!(source.contains("Decompilation failed at line #9"), "{}", source);
    assert!(source.contains("// Byte code:"), "{}", source);
    assert!(source.contains("return a + b;"), "{}", source);
}
