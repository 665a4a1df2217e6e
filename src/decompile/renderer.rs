use std::collections::{BTreeMap, BTreeSet};

use super::descriptor::{
    class_constant_type, package_name, parse_field_signature, parse_method_descriptor,
    parse_type_descriptor, simple_class_name, source_simple_name, JvmType,
};
use super::expr::*;
use super::java_ast::*;
use super::primitive::PrimitiveFlags;
use super::structured_types::*;

/// Configuration for rendering Java source code.
#[derive(Clone, Debug)]
pub struct RenderConfig {
    pub indent: String,
    pub include_synthetic: bool,
    /// Trailing `// bytecode a-b` comment on every statement.
    pub annotate_offsets: bool,
    /// Disassembly and debug tables after every method.
    pub append_bytecode: bool,
    /// Trailing `/* line N */` comment on statements with a source line.
    pub line_number_markers: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            indent: "    ".into(),
            include_synthetic: false,
            annotate_offsets: false,
            append_bytecode: false,
            line_number_markers: false,
        }
    }
}

/// Where one rendered statement came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineMapping {
    /// Internal name of the class declaring the method.
    pub class_name: String,
    pub method_name: String,
    pub descriptor: String,
    /// 1-based line of the rendered text.
    pub output_line: usize,
    pub start_offset: u32,
    pub end_offset: u32,
    pub source_line: Option<u16>,
}

/// Source text of one compilation unit with its statement-to-bytecode map.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderedSource {
    pub text: String,
    pub line_map: Vec<LineMapping>,
}

impl RenderedSource {
    /// Mappings of the methods called `method_name`, in output order.
    pub fn method_lines<'a>(&'a self, method_name: &'a str) -> impl Iterator<Item = &'a LineMapping> + 'a {
        self.line_map.iter().filter(move |m| m.method_name == method_name)
    }
}

// Java operator precedence, loosest first.
const PREC_ASSIGN: u8 = 1;
const PREC_TERNARY: u8 = 2;
const PREC_OR: u8 = 3;
const PREC_AND: u8 = 4;
const PREC_BIT_OR: u8 = 5;
const PREC_XOR: u8 = 6;
const PREC_BIT_AND: u8 = 7;
const PREC_EQUALITY: u8 = 8;
const PREC_RELATIONAL: u8 = 9;
const PREC_SHIFT: u8 = 10;
const PREC_ADDITIVE: u8 = 11;
const PREC_MULTIPLICATIVE: u8 = 12;
const PREC_UNARY: u8 = 13;
const PREC_POSTFIX: u8 = 14;
const PREC_PRIMARY: u8 = 15;

fn binary_precedence(op: BinOp) -> u8 {
    match op {
        BinOp::Add | BinOp::Sub => PREC_ADDITIVE,
        BinOp::Mul | BinOp::Div | BinOp::Rem => PREC_MULTIPLICATIVE,
        BinOp::Shl | BinOp::Shr | BinOp::Ushr => PREC_SHIFT,
        BinOp::And => PREC_BIT_AND,
        BinOp::Xor => PREC_XOR,
        BinOp::Or => PREC_BIT_OR,
    }
}

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Assign { .. } => PREC_ASSIGN,
        Expr::Ternary { .. } => PREC_TERNARY,
        Expr::Logical { and: false, .. } => PREC_OR,
        Expr::Logical { and: true, .. } => PREC_AND,
        e if is_complement(e) => PREC_UNARY,
        Expr::BinaryOp { op, .. } => binary_precedence(*op),
        Expr::StringConcat(_) => PREC_ADDITIVE,
        Expr::Compare { op: CompareOp::Eq | CompareOp::Ne, .. } => PREC_EQUALITY,
        Expr::Compare { .. } | Expr::Instanceof { .. } => PREC_RELATIONAL,
        Expr::UnaryOp { .. } | Expr::Not(_) | Expr::Cast { .. } | Expr::IncDec { prefix: true, .. } => PREC_UNARY,
        Expr::IntLiteral { value, flags } if *value < 0 && !flags.is_boolean() && *flags != PrimitiveFlags::CHAR => PREC_UNARY,
        Expr::LongLiteral(v) if *v < 0 => PREC_UNARY,
        Expr::FloatLiteral(v) if v.is_sign_negative() && v.is_finite() => PREC_UNARY,
        Expr::DoubleLiteral(v) if v.is_sign_negative() && v.is_finite() => PREC_UNARY,
        // `new int[n][0]` would read as a two-dimensional creation.
        Expr::IncDec { .. } | Expr::NewArray { .. } | Expr::NewMultiArray { .. } | Expr::ArrayInit { .. } => PREC_POSTFIX,
        _ => PREC_PRIMARY,
    }
}

/// `x ^ -1`, which javac emits for `~x`.
fn is_complement(expr: &Expr) -> bool {
    matches!(expr, Expr::BinaryOp { op: BinOp::Xor, right, .. }
        if matches!(**right, Expr::IntLiteral { value: -1, .. } | Expr::LongLiteral(-1)))
}

fn is_string(expr: &Expr) -> bool {
    matches!(expr.type_of(), JvmType::Reference(name) if name == "java/lang/String")
}

/// First segment of a source simple name: `Map` for `Map.Entry` and `Outer$1`.
fn top_level(name: &str) -> &str {
    name.split(|c| c == '.' || c == '<' || c == '$').next().unwrap_or(name)
}

fn escape_java_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

fn char_literal(value: i32) -> String {
    match u32::try_from(value).ok().and_then(char::from_u32) {
        Some('\'') => "'\\''".into(),
        Some('\\') => "'\\\\'".into(),
        Some('\n') => "'\\n'".into(),
        Some('\r') => "'\\r'".into(),
        Some('\t') => "'\\t'".into(),
        Some('\u{8}') => "'\\b'".into(),
        Some('\u{c}') => "'\\f'".into(),
        Some(c) if (' '..='~').contains(&c) => format!("'{}'", c),
        _ => format!("'\\u{:04x}'", value & 0xffff),
    }
}

/// `target = target op rhs`, also under the narrowing cast of a `byte`/`short`/`char`
/// target: the operator and right operand.
fn self_update<'a>(target: &Expr, value: &'a Expr) -> Option<(BinOp, &'a Expr)> {
    let value = match value {
        Expr::Cast { target_type, operand } if *target_type == target.type_of() => operand.as_ref(),
        v => v,
    };
    match value {
        Expr::BinaryOp { op, left, right } if **left == *target => Some((*op, right.as_ref())),
        _ => None,
    }
}

fn split_array(ty: &JvmType) -> (&JvmType, usize) {
    let mut base = ty;
    let mut dims = 0;
    while let JvmType::Array(inner) = base {
        base = inner;
        dims += 1;
    }
    (base, dims)
}

// ============================================================================
// Imports
// ============================================================================

/// Top-level types referenced by a compilation unit, as (dotted package, simple name).
#[derive(Default)]
struct TypeRefs(BTreeSet<(Option<String>, String)>);

impl TypeRefs {
    fn internal(&mut self, name: &str) {
        if name.starts_with('[') {
            self.jvm(&class_constant_type(name));
            return;
        }
        let package = package_name(name).map(|p| p.replace('/', "."));
        let top = top_level(simple_class_name(name)).to_string();
        self.0.insert((package, top));
    }

    fn jvm(&mut self, ty: &JvmType) {
        match ty {
            JvmType::Reference(name) => self.internal(name),
            JvmType::Array(inner) => self.jvm(inner),
            _ => {}
        }
    }

    fn java(&mut self, ty: &JavaType) {
        match ty {
            JavaType::ClassType { package, name, type_args } => {
                self.0.insert((package.clone(), top_level(name).to_string()));
                for arg in type_args {
                    self.java(arg);
                }
            }
            JavaType::ArrayType(inner) => self.java(inner),
            JavaType::WildcardType { bound: Some(bound), .. } => self.java(bound),
            _ => {}
        }
    }

    fn local(&mut self, var: &LocalVar) {
        match var.signature.as_deref().and_then(parse_field_signature) {
            Some(ty) => self.java(&ty),
            None => self.jvm(&var.ty),
        }
    }

    fn annotation(&mut self, annotation: &JavaAnnotation) {
        self.internal(&annotation.type_name);
        for arg in &annotation.arguments {
            match arg {
                AnnotationArgument::Named { value, .. } | AnnotationArgument::Unnamed(value) => self.annotation_value(value),
            }
        }
    }

    fn annotation_value(&mut self, value: &AnnotationValue) {
        match value {
            AnnotationValue::ClassLiteral(desc) => {
                if let Some(ty) = parse_type_descriptor(desc) {
                    self.jvm(&ty);
                }
            }
            AnnotationValue::EnumConstant { type_name, .. } => self.internal(type_name),
            AnnotationValue::AnnotationLiteral(a) => self.annotation(a),
            AnnotationValue::ArrayLiteral(values) => values.iter().for_each(|v| self.annotation_value(v)),
            _ => {}
        }
    }

    fn expr(&mut self, expr: &Expr) {
        expr.visit(&mut |e| match e {
            Expr::New { class_name, .. } => self.internal(class_name),
            Expr::FieldGet { object: None, class_name, .. } => self.internal(class_name),
            Expr::MethodCall { kind: InvokeKind::Static, class_name, .. } => self.internal(class_name),
            Expr::Cast { target_type: ty, .. }
            | Expr::Instanceof { check_type: ty, .. }
            | Expr::ClassLiteral(ty)
            | Expr::NewArray { element_type: ty, .. }
            | Expr::NewMultiArray { array_type: ty, .. }
            | Expr::ArrayInit { element_type: ty, .. } => self.jvm(ty),
            Expr::InvokeDynamic { target: Some(target), .. } => self.internal(&target.class_name),
            _ => {}
        });
    }

    fn body(&mut self, body: &[StructuredStmt]) {
        visit_exprs(body, &mut |e| self.expr(e));
        self.declared(body);
    }

    fn declared(&mut self, body: &[StructuredStmt]) {
        for stmt in body {
            match stmt {
                StructuredStmt::Simple(s) => {
                    if let Stmt::Declare { vars } = &s.stmt {
                        vars.iter().for_each(|(v, _)| self.local(v));
                    }
                }
                StructuredStmt::ForEach { var, .. } => self.local(var),
                StructuredStmt::TryCatch { catches, .. } => {
                    for c in catches {
                        c.exception_types.iter().for_each(|t| self.internal(t));
                    }
                }
                _ => {}
            }
            stmt.for_each_body(&mut |b| self.declared(b));
        }
    }

    fn class(&mut self, class: &JavaClass) {
        class.annotations.iter().for_each(|a| self.annotation(a));
        class.super_class.iter().for_each(|t| self.java(t));
        class.interfaces.iter().for_each(|t| self.java(t));
        for param in &class.type_parameters {
            param.bounds.iter().for_each(|b| self.java(b));
        }
        for constant in &class.enum_constants {
            constant.arguments.iter().for_each(|a| self.expr(a));
        }
        for field in &class.fields {
            field.annotations.iter().for_each(|a| self.annotation(a));
            self.java(&field.field_type);
            if let Some(init) = &field.initializer {
                self.expr(init);
            }
        }
        for method in &class.methods {
            method.annotations.iter().for_each(|a| self.annotation(a));
            self.java(&method.return_type);
            for param in &method.parameters {
                param.annotations.iter().for_each(|a| self.annotation(a));
                self.java(&param.param_type);
            }
            method.throws.iter().for_each(|t| self.java(t));
            for param in &method.type_parameters {
                param.bounds.iter().for_each(|b| self.java(b));
            }
            if let Some(body) = &method.body {
                self.body(&body.statements);
            }
        }
        for inner in class.nested_classes() {
            self.class(inner);
        }
    }
}

/// Which type each simple name refers to, and the import declarations that make it so.
/// The unit's own class claims its name first, then its package, then `java.lang`; any
/// other type whose simple name is taken is written fully qualified.
#[derive(Default)]
struct ImportTable {
    owners: BTreeMap<String, Option<String>>,
    imports: BTreeSet<String>,
}

impl ImportTable {
    fn build(unit: &CompilationUnit) -> Self {
        let mut refs = TypeRefs::default();
        refs.class(&unit.class);

        let own_package = unit.package.clone();
        let mut owners = BTreeMap::new();
        owners.insert(top_level(simple_class_name(&unit.class.internal_name)).to_string(), own_package.clone());

        let rank = |package: &Option<String>| {
            if *package == own_package {
                0
            } else if package.as_deref() == Some("java.lang") {
                1
            } else {
                2
            }
        };
        let mut candidates: Vec<(u8, Option<String>, String)> =
            refs.0.into_iter().map(|(package, top)| (rank(&package), package, top)).collect();
        candidates.sort();
        for (_, package, top) in candidates {
            owners.entry(top).or_insert(package);
        }

        let imports = owners
            .iter()
            .filter_map(|(top, package)| match package {
                Some(p) if p != "java.lang" && Some(p) != own_package.as_ref() => Some(format!("{}.{}", p, top)),
                _ => None,
            })
            .collect();
        ImportTable { owners, imports }
    }

    fn is_simple(&self, package: Option<&str>, top: &str) -> bool {
        self.owners.get(top).map_or(false, |owner| owner.as_deref() == package)
    }
}

// ============================================================================
// Renderer
// ============================================================================

/// Java source code renderer.
pub struct JavaRenderer {
    config: RenderConfig,
    imports: ImportTable,
    output: String,
    indent_level: usize,
    /// 1-based line the next character lands on.
    line: usize,
    line_map: Vec<LineMapping>,
    /// Internal names of the classes being rendered, innermost last.
    classes: Vec<String>,
    /// Field names declared by each entry of `classes`.
    fields: Vec<BTreeSet<String>>,
    /// Parameter and local names of the method being rendered.
    locals: BTreeSet<String>,
    method: Option<(String, String)>,
    /// Nested-class constructors whose first argument is the enclosing instance.
    outer_constructors: BTreeSet<(String, String)>,
}

impl JavaRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,
            imports: ImportTable::default(),
            output: String::new(),
            indent_level: 0,
            line: 1,
            line_map: Vec::new(),
            classes: Vec::new(),
            fields: Vec::new(),
            locals: BTreeSet::new(),
            method: None,
            outer_constructors: BTreeSet::new(),
        }
    }

    pub fn render_unit(mut self, unit: &CompilationUnit) -> RenderedSource {
        self.imports = ImportTable::build(unit);
        self.collect_outer_constructors(&unit.class);

        if let Some(ref pkg) = unit.package {
            self.writeln(&format!("package {};", pkg));
            self.newline();
        }

        if !self.imports.imports.is_empty() {
            let imports: Vec<String> = self.imports.imports.iter().cloned().collect();
            for import in &imports {
                self.writeln(&format!("import {};", import));
            }
            self.newline();
        }

        self.render_class_decl(&unit.class);
        RenderedSource { text: self.output, line_map: self.line_map }
    }

    fn collect_outer_constructors(&mut self, class: &JavaClass) {
        for method in &class.methods {
            if method.is_constructor() && method.hidden_parameters == 1 && class.kind != ClassKind::Enum {
                self.outer_constructors.insert((class.internal_name.clone(), method.descriptor.clone()));
            }
        }
        for inner in class.nested_classes() {
            self.collect_outer_constructors(inner);
        }
    }

    fn render_class_decl(&mut self, class: &JavaClass) {
        for ann in &class.annotations {
            let text = self.annotation(ann);
            self.writeln(&text);
        }

        let nested = !self.classes.is_empty();
        let mut decl = String::new();
        append_visibility(&mut decl, class.visibility);
        if class.kind == ClassKind::Class {
            if class.is_abstract {
                decl.push_str("abstract ");
            }
            if class.is_static && nested {
                decl.push_str("static ");
            }
            if class.is_final {
                decl.push_str("final ");
            }
        }
        decl.push_str(match class.kind {
            ClassKind::Class => "class ",
            ClassKind::Interface => "interface ",
            ClassKind::Enum => "enum ",
            ClassKind::Annotation => "@interface ",
        });
        decl.push_str(&class.name);
        decl.push_str(&self.type_parameters(&class.type_parameters));

        if let (Some(super_class), ClassKind::Class) = (&class.super_class, class.kind) {
            decl.push_str(" extends ");
            decl.push_str(&self.java_type(super_class));
        }
        if !class.interfaces.is_empty() && class.kind != ClassKind::Annotation {
            decl.push_str(if class.kind == ClassKind::Interface { " extends " } else { " implements " });
            let names: Vec<String> = class.interfaces.iter().map(|i| self.java_type(i)).collect();
            decl.push_str(&names.join(", "));
        }
        decl.push_str(" {");
        self.writeln(&decl);

        self.enter_class(class);
        self.indent_level += 1;
        if class.kind == ClassKind::Enum {
            self.render_enum_constants(class);
        }
        self.render_members(class);
        self.indent_level -= 1;
        self.leave_class();
        self.writeln("}");
    }

    fn enter_class(&mut self, class: &JavaClass) {
        self.classes.push(class.internal_name.clone());
        self.fields.push(class.fields.iter().map(|f| f.name.clone()).collect());
    }

    fn leave_class(&mut self) {
        self.classes.pop();
        self.fields.pop();
    }

    /// Fields, methods and nested classes, one blank line between members.
    fn render_members(&mut self, class: &JavaClass) {
        let visible_fields: Vec<&JavaField> = class.fields.iter().filter(|f| self.should_show_field(f)).collect();
        for field in &visible_fields {
            self.render_field(field);
        }

        let visible_methods: Vec<&JavaMethod> = class.methods.iter().filter(|m| self.should_show_method(m)).collect();
        for (i, method) in visible_methods.iter().enumerate() {
            if i > 0 || !visible_fields.is_empty() {
                self.newline();
            }
            self.render_method(method, class);
        }

        let include_synthetic = self.config.include_synthetic;
        for inner in class.inner_classes.iter().filter(|c| include_synthetic || !c.is_synthetic) {
            self.newline();
            self.render_class_decl(inner);
        }
    }

    fn render_enum_constants(&mut self, class: &JavaClass) {
        if class.enum_constants.is_empty() {
            self.writeln(";");
            return;
        }
        let count = class.enum_constants.len();
        for (i, constant) in class.enum_constants.iter().enumerate() {
            let mut text = constant.name.clone();
            if !constant.arguments.is_empty() {
                let args: Vec<String> = constant.arguments.iter().map(|a| self.expr(a)).collect();
                text.push_str(&format!("({})", args.join(", ")));
            }
            let separator = if i + 1 < count { ',' } else { ';' };
            match &constant.body {
                Some(body) => {
                    text.push_str(" {");
                    self.writeln(&text);
                    self.enter_class(body);
                    self.indent_level += 1;
                    self.render_members(body);
                    self.indent_level -= 1;
                    self.leave_class();
                    self.writeln(&format!("}}{}", separator));
                }
                None => {
                    text.push(separator);
                    self.writeln(&text);
                }
            }
        }
        let has_members = class.fields.iter().any(|f| self.should_show_field(f))
            || class.methods.iter().any(|m| self.should_show_method(m));
        if has_members {
            self.newline();
        }
    }

    fn render_field(&mut self, field: &JavaField) {
        for ann in &field.annotations {
            let text = self.annotation(ann);
            self.writeln(&text);
        }

        let mut decl = String::new();
        append_visibility(&mut decl, field.visibility);
        if field.is_static {
            decl.push_str("static ");
        }
        if field.is_final {
            decl.push_str("final ");
        }
        if field.is_volatile {
            decl.push_str("volatile ");
        }
        if field.is_transient {
            decl.push_str("transient ");
        }
        decl.push_str(&self.java_type(&field.field_type));
        decl.push(' ');
        decl.push_str(&field.name);
        if let Some(ref init) = field.initializer {
            decl.push_str(" = ");
            decl.push_str(&self.expr(init));
        }
        decl.push(';');
        self.writeln(&decl);
    }

    fn type_parameters(&self, params: &[TypeParameter]) -> String {
        if params.is_empty() {
            return String::new();
        }
        let rendered: Vec<String> = params
            .iter()
            .map(|tp| {
                if tp.bounds.is_empty() {
                    tp.name.clone()
                } else {
                    let bounds: Vec<String> = tp.bounds.iter().map(|b| self.java_type(b)).collect();
                    format!("{} extends {}", tp.name, bounds.join(" & "))
                }
            })
            .collect();
        format!("<{}>", rendered.join(", "))
    }

    fn render_method(&mut self, method: &JavaMethod, class: &JavaClass) {
        for ann in &method.annotations {
            let text = self.annotation(ann);
            self.writeln(&text);
        }

        let in_interface = matches!(class.kind, ClassKind::Interface | ClassKind::Annotation);
        let mut decl = String::new();
        if method.is_static_init() {
            decl.push_str("static");
        } else {
            if !(in_interface && method.visibility == Visibility::Public) {
                append_visibility(&mut decl, method.visibility);
            }
            if method.is_default {
                decl.push_str("default ");
            }
            if method.is_static {
                decl.push_str("static ");
            }
            if method.is_abstract && !in_interface {
                decl.push_str("abstract ");
            }
            if method.is_final {
                decl.push_str("final ");
            }
            if method.is_synchronized {
                decl.push_str("synchronized ");
            }
            if method.is_native {
                decl.push_str("native ");
            }
            if method.is_strict {
                decl.push_str("strictfp ");
            }
            if !method.type_parameters.is_empty() {
                decl.push_str(&self.type_parameters(&method.type_parameters));
                decl.push(' ');
            }
            if method.is_constructor() {
                decl.push_str(&class.name);
            } else {
                decl.push_str(&self.java_type(&method.return_type));
                decl.push(' ');
                decl.push_str(&method.name);
            }
            decl.push('(');
            let visible = &method.parameters[method.hidden_parameters.min(method.parameters.len())..];
            let params: Vec<String> = visible.iter().map(|p| self.parameter(p)).collect();
            decl.push_str(&params.join(", "));
            decl.push(')');
            if !method.throws.is_empty() {
                let throws: Vec<String> = method.throws.iter().map(|t| self.java_type(t)).collect();
                decl.push_str(" throws ");
                decl.push_str(&throws.join(", "));
            }
        }

        self.method = Some((method.name.clone(), method.descriptor.clone()));
        let mut locals: BTreeSet<String> = method.parameters.iter().map(|p| p.name.clone()).collect();
        if let Some(body) = &method.body {
            visit_vars(&body.statements, &mut |v| {
                locals.insert(self.local_name(v));
            });
        }
        self.locals = locals;
        if let Some(ref failure) = method.failure {
            decl.push_str(" {");
            self.writeln(&decl);
            self.indent_level += 1;
            for line in failure.message.lines() {
                self.writeln(&format!("// {}", line));
            }
            for line in failure.listing.lines() {
                self.writeln(line);
            }
            self.writeln(&format!("assert false : \"{}\";", escape_java_string(&failure.marker())));
            self.indent_level -= 1;
            self.writeln("}");
        } else if let Some(ref body) = method.body {
            decl.push_str(" {");
            self.writeln(&decl);
            self.block(&body.statements);
            self.writeln("}");
        } else if method.is_abstract || method.is_native {
            decl.push(';');
            self.writeln(&decl);
        } else {
            decl.push_str(" {");
            self.writeln(&decl);
            self.writeln("}");
        }
        self.method = None;
        self.locals.clear();

        if self.config.append_bytecode {
            if let Some(ref listing) = method.listing {
                for line in listing.lines() {
                    self.writeln(line);
                }
            }
        }
    }

    fn parameter(&self, param: &JavaParameter) -> String {
        let mut out = String::new();
        for ann in &param.annotations {
            out.push_str(&self.annotation(ann));
            out.push(' ');
        }
        if param.is_final {
            out.push_str("final ");
        }
        let ty = self.java_type(&param.param_type);
        match ty.strip_suffix("[]") {
            Some(element) if param.is_varargs => {
                out.push_str(element);
                out.push_str("...");
            }
            _ => out.push_str(&ty),
        }
        out.push(' ');
        out.push_str(&param.name);
        out
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn block(&mut self, body: &[StructuredStmt]) {
        self.indent_level += 1;
        for stmt in body {
            self.render_structured_stmt(stmt);
        }
        self.indent_level -= 1;
    }

    fn record(&mut self, loc: Location) {
        let (Some((method_name, descriptor)), Some(class_name)) = (&self.method, self.classes.last()) else {
            return;
        };
        self.line_map.push(LineMapping {
            class_name: class_name.clone(),
            method_name: method_name.clone(),
            descriptor: descriptor.clone(),
            output_line: self.line,
            start_offset: loc.start,
            end_offset: loc.end,
            source_line: loc.line,
        });
    }

    /// Writes one line produced by the bytecode at `loc`.
    fn located_line(&mut self, loc: Location, text: &str) {
        self.record(loc);
        let mut line = text.to_string();
        if self.config.line_number_markers {
            if let Some(n) = loc.line {
                line.push_str(&format!(" /* line {} */", n));
            }
        }
        if self.config.annotate_offsets {
            line.push_str(&format!(" // bytecode {}-{}", loc.start, loc.end));
        }
        self.writeln(&line);
    }

    fn render_structured_stmt(&mut self, stmt: &StructuredStmt) {
        match stmt {
            StructuredStmt::Simple(s) => self.render_simple_stmt(s),
            StructuredStmt::Block(stmts) => {
                for s in stmts {
                    self.render_structured_stmt(s);
                }
            }
            StructuredStmt::If { condition, loc, then_body, else_body } => {
                let header = format!("if ({}) {{", self.expr(condition));
                self.located_line(*loc, &header);
                self.block(then_body);
                self.render_else(else_body.as_deref());
            }
            StructuredStmt::While { condition, loc, body } => {
                let header = format!("while ({}) {{", self.expr(condition));
                self.located_line(*loc, &header);
                self.block(body);
                self.writeln("}");
            }
            StructuredStmt::DoWhile { body, condition, loc } => {
                self.writeln("do {");
                self.block(body);
                let footer = format!("}} while ({});", self.expr(condition));
                self.located_line(*loc, &footer);
            }
            StructuredStmt::For { init, condition, loc, update, body } => {
                let init: Vec<String> = init.iter().filter_map(|s| s.as_stmt()).map(|s| self.stmt_text(s)).collect();
                let condition = condition.as_ref().map(|c| self.expr(c)).unwrap_or_default();
                let update: Vec<String> = update.iter().map(|u| self.stmt_text(&u.stmt)).collect();
                let header = format!("for ({}; {}; {}) {{", init.join(", "), condition, update.join(", "));
                self.located_line(*loc, &header);
                self.block(body);
                self.writeln("}");
            }
            StructuredStmt::ForEach { var, iterable, loc, body } => {
                let header = format!("for ({} {} : {}) {{", self.local_type(var), self.local_name(var), self.expr(iterable));
                self.located_line(*loc, &header);
                self.block(body);
                self.writeln("}");
            }
            StructuredStmt::Switch { expr, loc, cases } => {
                let header = format!("switch ({}) {{", self.expr(expr));
                self.located_line(*loc, &header);
                self.indent_level += 1;
                for case in cases {
                    for value in &case.values {
                        let label = match value {
                            SwitchValue::Int(i) => i.to_string(),
                            SwitchValue::Char(c) => char_literal(i32::from(*c)),
                            SwitchValue::String(s) => format!("\"{}\"", escape_java_string(s)),
                            SwitchValue::Enum { const_name, .. } => const_name.clone(),
                        };
                        self.writeln(&format!("case {}:", label));
                    }
                    if case.is_default {
                        self.writeln("default:");
                    }
                    self.block(&case.body);
                }
                self.indent_level -= 1;
                self.writeln("}");
            }
            StructuredStmt::TryCatch { try_body, catches, finally_body } => {
                self.writeln("try {");
                self.block(try_body);
                for catch in catches {
                    let types: Vec<String> = catch.exception_types.iter().map(|t| self.class_name(t)).collect();
                    let header = format!("}} catch ({} {}) {{", types.join(" | "), self.local_name(&catch.var));
                    self.writeln(&header);
                    self.block(&catch.body);
                }
                if let Some(fin) = finally_body {
                    self.writeln("} finally {");
                    self.block(fin);
                }
                self.writeln("}");
            }
            StructuredStmt::Synchronized { object, loc, body } => {
                let header = format!("synchronized ({}) {{", self.expr(object));
                self.located_line(*loc, &header);
                self.block(body);
                self.writeln("}");
            }
            StructuredStmt::Labeled { label, body } => {
                self.writeln(&format!("{}:", label));
                self.render_structured_stmt(body);
            }
            StructuredStmt::Break { label } => match label {
                Some(l) => self.writeln(&format!("break {};", l)),
                None => self.writeln("break;"),
            },
            StructuredStmt::Continue { label } => match label {
                Some(l) => self.writeln(&format!("continue {};", l)),
                None => self.writeln("continue;"),
            },
            StructuredStmt::Assert { condition, message, loc } => {
                let text = match message {
                    Some(msg) => format!("assert {} : {};", self.expr(condition), self.expr(msg)),
                    None => format!("assert {};", self.expr(condition)),
                };
                self.located_line(*loc, &text);
            }
            StructuredStmt::Comment(text) => {
                for line in text.lines() {
                    self.writeln(&format!("// {}", line));
                }
            }
        }
    }

    fn render_else(&mut self, else_body: Option<&[StructuredStmt]>) {
        match else_body {
            None => self.writeln("}"),
            Some([StructuredStmt::If { condition, loc, then_body, else_body }]) => {
                let header = format!("}} else if ({}) {{", self.expr(condition));
                self.located_line(*loc, &header);
                self.block(then_body);
                self.render_else(else_body.as_deref());
            }
            Some(body) => {
                self.writeln("} else {");
                self.block(body);
                self.writeln("}");
            }
        }
    }

    fn render_simple_stmt(&mut self, s: &LocatedStmt) {
        match &s.stmt {
            Stmt::Monitor { enter, object } => {
                let verb = if *enter { "monitorenter" } else { "monitorexit" };
                let text = format!("// {} {}", verb, self.expr(object));
                self.writeln(&text);
            }
            Stmt::Jsr { target } => self.writeln(&format!("// jsr {}", target)),
            Stmt::Ret { index } => self.writeln(&format!("// ret {}", index)),
            Stmt::Declare { vars } if vars.iter().all(|(_, init)| init.is_none()) => {
                let text = format!("{};", self.stmt_text(&s.stmt));
                self.writeln(&text);
            }
            stmt => {
                let text = format!("{};", self.stmt_text(stmt));
                self.located_line(s.loc, &text);
            }
        }
    }

    /// A statement without its terminating `;`.
    fn stmt_text(&self, stmt: &Stmt) -> String {
        match stmt {
            Stmt::LocalStore { var, value } => {
                let name = self.local_name(var);
                if let Some(text) = self.compound_local(var, &name, value) {
                    return text;
                }
                format!("{} = {}", name, self.expr(value))
            }
            Stmt::FieldStore { object, class_name, field_name, value, .. } => {
                let target = match object {
                    Some(obj) => format!("{}.{}", self.operand(obj, PREC_PRIMARY), field_name),
                    None => format!("{}.{}", self.class_name(class_name), field_name),
                };
                if let Expr::BinaryOp { op, left, right } = value {
                    if let Expr::FieldGet { object: o, class_name: c, field_name: f, .. } = &**left {
                        let same_object = object.as_ref() == o.as_deref() && object.as_ref().map_or(true, Expr::is_pure);
                        if same_object && c == class_name && f == field_name {
                            return self.compound(&target, *op, right);
                        }
                    }
                }
                format!("{} = {}", target, self.expr(value))
            }
            Stmt::ArrayStore { array, index, value } => {
                let target = format!("{}[{}]", self.operand(array, PREC_PRIMARY), self.expr(index));
                if let Expr::BinaryOp { op, left, right } = value {
                    if let Expr::ArrayLoad { array: a, index: i, .. } = &**left {
                        if **a == *array && **i == *index && array.is_pure() && index.is_pure() {
                            return self.compound(&target, *op, right);
                        }
                    }
                }
                format!("{} = {}", target, self.expr(value))
            }
            Stmt::ExprStmt(expr) => self.expr(expr),
            Stmt::Iinc { var, amount } => {
                let name = self.local_name(var);
                match *amount {
                    1 => format!("{}++", name),
                    -1 => format!("{}--", name),
                    n if n < 0 => format!("{} -= {}", name, i64::from(n).abs()),
                    n => format!("{} += {}", name, n),
                }
            }
            Stmt::Return(None) => "return".into(),
            Stmt::Return(Some(expr)) => format!("return {}", self.expr(expr)),
            Stmt::Throw(expr) => format!("throw {}", self.expr(expr)),
            Stmt::DupStore { id, value } => format!("Object dup{} = {}", id, self.expr(value)),
            Stmt::Declare { vars } => {
                let Some((first, _)) = vars.first() else { return String::new() };
                let declarators: Vec<String> = vars
                    .iter()
                    .map(|(var, init)| match init {
                        Some(value) => format!("{} = {}", self.local_name(var), self.expr(value)),
                        None => self.local_name(var),
                    })
                    .collect();
                format!("{} {}", self.local_type(first), declarators.join(", "))
            }
            Stmt::Monitor { enter, object } => {
                format!("/* {} */ {}", if *enter { "monitorenter" } else { "monitorexit" }, self.expr(object))
            }
            Stmt::Jsr { target } => format!("/* jsr {} */", target),
            Stmt::Ret { index } => format!("/* ret {} */", index),
        }
    }

    /// `x = x op y` as `x op= y`, `x++` or `x--`.
    fn compound_local(&self, var: &LocalVar, name: &str, value: &Expr) -> Option<String> {
        let is_var = |e: &Expr| matches!(e, Expr::LocalLoad(v) if v.key() == var.key());
        match value {
            Expr::BinaryOp { op, left, right } if is_var(left) => Some(self.compound(name, *op, right)),
            Expr::Cast { target_type, operand } if *target_type == var.ty => match &**operand {
                Expr::BinaryOp { op, left, right } if is_var(left) => Some(self.compound(name, *op, right)),
                _ => None,
            },
            Expr::StringConcat(parts) if parts.len() == 2 && is_var(&parts[0]) && is_string(&parts[0]) => {
                Some(format!("{} += {}", name, self.expr(&parts[1])))
            }
            _ => None,
        }
    }

    fn compound(&self, target: &str, op: BinOp, rhs: &Expr) -> String {
        match (op, rhs) {
            (BinOp::Add, Expr::IntLiteral { value: 1, flags }) if !flags.is_boolean() => format!("{}++", target),
            (BinOp::Sub, Expr::IntLiteral { value: 1, flags }) if !flags.is_boolean() => format!("{}--", target),
            _ => format!("{} {}= {}", target, op.as_str(), self.expr(rhs)),
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn operand(&self, expr: &Expr, min: u8) -> String {
        let text = self.expr(expr);
        if precedence(expr) < min {
            format!("({})", text)
        } else {
            text
        }
    }

    fn args(&self, args: &[Expr]) -> String {
        let rendered: Vec<String> = args.iter().map(|a| self.expr(a)).collect();
        rendered.join(", ")
    }

    fn current_class(&self) -> &str {
        self.classes.last().map_or("", String::as_str)
    }

    fn expr(&self, expr: &Expr) -> String {
        match expr {
            Expr::IntLiteral { value, flags } => {
                if flags.is_boolean() {
                    (*value != 0).to_string()
                } else if *flags == PrimitiveFlags::CHAR {
                    char_literal(*value)
                } else {
                    value.to_string()
                }
            }
            Expr::LongLiteral(v) => format!("{}L", v),
            Expr::FloatLiteral(v) => {
                if v.is_nan() {
                    "Float.NaN".into()
                } else if v.is_infinite() {
                    if *v > 0.0 { "Float.POSITIVE_INFINITY".into() } else { "Float.NEGATIVE_INFINITY".into() }
                } else {
                    format!("{:?}f", v)
                }
            }
            Expr::DoubleLiteral(v) => {
                if v.is_nan() {
                    "Double.NaN".into()
                } else if v.is_infinite() {
                    if *v > 0.0 { "Double.POSITIVE_INFINITY".into() } else { "Double.NEGATIVE_INFINITY".into() }
                } else {
                    format!("{:?}", v)
                }
            }
            Expr::StringLiteral(s) => format!("\"{}\"", escape_java_string(s)),
            Expr::ClassLiteral(ty) => format!("{}.class", self.jvm_type(ty)),
            Expr::NullLiteral => "null".into(),
            Expr::LocalLoad(var) => self.local_name(var),
            Expr::This => "this".into(),
            Expr::BinaryOp { left, .. } if is_complement(expr) => format!("~{}", self.operand(left, PREC_UNARY)),
            Expr::BinaryOp { op, left, right } => {
                let p = binary_precedence(*op);
                format!("{} {} {}", self.operand(left, p), op.as_str(), self.operand(right, p + 1))
            }
            Expr::UnaryOp { op: UnaryOp::Neg, operand } => {
                let inner = self.operand(operand, PREC_UNARY);
                if inner.starts_with('-') {
                    format!("-({})", inner)
                } else {
                    format!("-{}", inner)
                }
            }
            Expr::Not(inner) => format!("!{}", self.operand(inner, PREC_UNARY)),
            Expr::Logical { and, left, right } => {
                let p = if *and { PREC_AND } else { PREC_OR };
                let token = if *and { "&&" } else { "||" };
                format!("{} {} {}", self.operand(left, p), token, self.operand(right, p))
            }
            Expr::Cast { target_type, operand } => {
                let inner = self.operand(operand, PREC_UNARY);
                if inner.starts_with('-') || inner.starts_with('+') {
                    format!("({}) ({})", self.jvm_type(target_type), inner)
                } else {
                    format!("({}) {}", self.jvm_type(target_type), inner)
                }
            }
            Expr::Instanceof { operand, check_type } => {
                format!("{} instanceof {}", self.operand(operand, PREC_SHIFT), self.jvm_type(check_type))
            }
            Expr::FieldGet { object, class_name, field_name, .. } => {
                if let Some(outer) = self.outer_instance(expr) {
                    return outer;
                }
                match object {
                    Some(obj) if self.outer_instance(obj).is_some() && self.reaches_unqualified(class_name, field_name) => {
                        field_name.clone()
                    }
                    Some(obj) => format!("{}.{}", self.operand(obj, PREC_PRIMARY), field_name),
                    None => format!("{}.{}", self.class_name(class_name), field_name),
                }
            }
            Expr::MethodCall { kind, object, class_name, method_name, args, .. } => {
                let args = self.args(args);
                match (kind, object) {
                    (InvokeKind::Static, _) | (_, None) => {
                        format!("{}.{}({})", self.class_name(class_name), method_name, args)
                    }
                    (InvokeKind::Special, Some(obj)) if **obj == Expr::This => {
                        let own = class_name == self.current_class();
                        match (method_name.as_str(), own) {
                            ("<init>", true) => format!("this({})", args),
                            ("<init>", false) => format!("super({})", args),
                            (_, true) => format!("this.{}({})", method_name, args),
                            (_, false) => format!("super.{}({})", method_name, args),
                        }
                    }
                    (_, Some(obj)) => format!("{}.{}({})", self.operand(obj, PREC_PRIMARY), method_name, args),
                }
            }
            Expr::New { class_name, constructor_descriptor, args } => {
                let key = (class_name.clone(), constructor_descriptor.clone());
                let args = match args.split_first() {
                    Some((Expr::This, rest)) if self.outer_constructors.contains(&key) => rest,
                    _ => args.as_slice(),
                };
                format!("new {}({})", self.class_name(class_name), self.args(args))
            }
            Expr::NewArray { element_type, length } => {
                let (base, dims) = split_array(element_type);
                format!("new {}[{}]{}", self.jvm_type(base), self.expr(length), "[]".repeat(dims))
            }
            Expr::NewMultiArray { array_type, dimensions } => {
                let (base, dims) = split_array(array_type);
                let given: String = dimensions.iter().map(|d| format!("[{}]", self.expr(d))).collect();
                format!("new {}{}{}", self.jvm_type(base), given, "[]".repeat(dims.saturating_sub(dimensions.len())))
            }
            Expr::ArrayInit { element_type, values } => {
                format!("new {}[]{{{}}}", self.jvm_type(element_type), self.args(values))
            }
            Expr::ArrayLength { array } => format!("{}.length", self.operand(array, PREC_PRIMARY)),
            Expr::ArrayLoad { array, index, .. } => {
                format!("{}[{}]", self.operand(array, PREC_PRIMARY), self.expr(index))
            }
            Expr::Compare { op, left, right } => {
                let p = precedence(expr);
                format!("{} {} {}", self.operand(left, p), op.as_str(), self.operand(right, p + 1))
            }
            Expr::CmpResult { kind, left, right } => {
                let owner = match kind {
                    CmpKind::LCmp => "Long",
                    CmpKind::FCmpL | CmpKind::FCmpG => "Float",
                    CmpKind::DCmpL | CmpKind::DCmpG => "Double",
                };
                format!("{}.compare({}, {})", owner, self.expr(left), self.expr(right))
            }
            Expr::InvokeDynamic { method_name, captures, target, .. } => match target {
                Some(target) => self.method_handle(target, captures),
                None => format!("/* invokedynamic */ {}({})", method_name, self.args(captures)),
            },
            Expr::StringConcat(parts) => {
                let needs_prefix = !(parts.first().map_or(false, is_string) || parts.get(1).map_or(false, is_string));
                let mut rendered: Vec<String> = Vec::with_capacity(parts.len() + 1);
                if needs_prefix {
                    rendered.push("\"\"".into());
                }
                for (i, part) in parts.iter().enumerate() {
                    let min = if i == 0 && !needs_prefix { PREC_ADDITIVE } else { PREC_ADDITIVE + 1 };
                    rendered.push(self.operand(part, min));
                }
                rendered.join(" + ")
            }
            Expr::Ternary { condition, then_expr, else_expr } => format!(
                "{} ? {} : {}",
                self.operand(condition, PREC_OR),
                self.operand(then_expr, PREC_TERNARY + 1),
                self.operand(else_expr, PREC_TERNARY)
            ),
            Expr::Assign { target, value } => {
                let lvalue = self.operand(target, PREC_PRIMARY);
                match self_update(target, value) {
                    Some((BinOp::Add, Expr::IntLiteral { value: 1, flags })) if !flags.is_boolean() => format!("++{}", lvalue),
                    Some((BinOp::Sub, Expr::IntLiteral { value: 1, flags })) if !flags.is_boolean() => format!("--{}", lvalue),
                    Some((op, rhs)) => format!("{} {}= {}", lvalue, op.as_str(), self.operand(rhs, PREC_ASSIGN)),
                    None => format!("{} = {}", lvalue, self.operand(value, PREC_ASSIGN)),
                }
            }
            Expr::IncDec { target, increment, prefix } => {
                let token = if *increment { "++" } else { "--" };
                let target = self.operand(target, PREC_PRIMARY);
                if *prefix {
                    format!("{}{}", token, target)
                } else {
                    format!("{}{}", target, token)
                }
            }
            Expr::Unresolved(text) => text.clone(),
            Expr::DupLoad { id, .. } => format!("dup{}", id),
            Expr::StackSlot { index, .. } => format!("stack{}", index),
            Expr::CaughtException(_) => "ex".into(),
            Expr::ReturnAddress => "/* return address */ null".into(),
            Expr::UninitNew { class_name, .. } => format!("new {}", self.class_name(class_name)),
        }
    }

    /// Method references, and lambdas over the synthetic method when values are captured.
    fn method_handle(&self, target: &HandleTarget, captures: &[Expr]) -> String {
        let owner = self.class_name(&target.class_name);
        if captures.is_empty() {
            let name = if target.method_name == "<init>" { "new" } else { target.method_name.as_str() };
            return format!("{}::{}", owner, name);
        }
        if !target.is_static && captures.len() == 1 {
            return format!("{}::{}", self.operand(&captures[0], PREC_PRIMARY), target.method_name);
        }
        let declared = parse_method_descriptor(&target.descriptor).map_or(0, |(params, _)| params.len());
        let receiver = usize::from(!target.is_static);
        let arity = (declared + receiver).saturating_sub(captures.len());
        let params: Vec<String> = (0..arity).map(|i| format!("p{}", i)).collect();
        let (callee, forwarded) = if target.is_static {
            (owner, captures)
        } else {
            (self.operand(&captures[0], PREC_PRIMARY), &captures[1..])
        };
        let mut call_args: Vec<String> = forwarded.iter().map(|c| self.expr(c)).collect();
        call_args.extend(params.iter().cloned());
        format!("({}) -> {}.{}({})", params.join(", "), callee, target.method_name, call_args.join(", "))
    }

    /// `Outer.this` for a read of the synthetic `this$N` field, also through a chain of them.
    fn outer_instance(&self, expr: &Expr) -> Option<String> {
        let Expr::FieldGet { object: Some(obj), field_name, field_type: JvmType::Reference(outer), .. } = expr else {
            return None;
        };
        let through_outer = **obj == Expr::This || self.outer_instance(obj).is_some();
        (field_name.starts_with("this$") && through_outer).then(|| format!("{}.this", self.class_name(outer)))
    }

    /// A bare `field_name` would resolve to the field `owner` declares: `owner` encloses the
    /// current class and no local or closer class declares the same name.
    fn reaches_unqualified(&self, owner: &str, field_name: &str) -> bool {
        if self.locals.contains(field_name) {
            return false;
        }
        let Some(pos) = self.classes.iter().rposition(|c| c == owner) else { return false };
        pos + 1 < self.classes.len()
            && self.fields[pos].contains(field_name)
            && self.fields[pos + 1..].iter().all(|names| !names.contains(field_name))
    }

    fn local_name(&self, var: &LocalVar) -> String {
        match &var.name {
            Some(name) => name.clone(),
            None => format!("local{}", var.index),
        }
    }

    fn local_type(&self, var: &LocalVar) -> String {
        match var.signature.as_deref().and_then(parse_field_signature) {
            Some(ty) => self.java_type(&ty),
            None => self.jvm_type(&var.ty),
        }
    }

    // ------------------------------------------------------------------
    // Types and annotations
    // ------------------------------------------------------------------

    fn class_name(&self, internal: &str) -> String {
        if internal.starts_with('[') {
            return self.jvm_type(&class_constant_type(internal));
        }
        let package = package_name(internal).map(|p| p.replace('/', "."));
        let simple = source_simple_name(internal);
        match package {
            Some(p) if !self.imports.is_simple(Some(&p), top_level(&simple)) => format!("{}.{}", p, simple),
            _ => simple,
        }
    }

    fn jvm_type(&self, ty: &JvmType) -> String {
        match ty {
            JvmType::Reference(name) => self.class_name(name),
            JvmType::Array(inner) => format!("{}[]", self.jvm_type(inner)),
            other => other.simple_name(),
        }
    }

    fn java_type(&self, ty: &JavaType) -> String {
        match ty {
            JavaType::ClassType { package, name, type_args } => {
                let base = match package {
                    Some(p) if !self.imports.is_simple(Some(p), top_level(name)) => format!("{}.{}", p, name),
                    _ => name.clone(),
                };
                if type_args.is_empty() {
                    base
                } else {
                    let args: Vec<String> = type_args.iter().map(|a| self.java_type(a)).collect();
                    format!("{}<{}>", base, args.join(", "))
                }
            }
            JavaType::ArrayType(inner) => format!("{}[]", self.java_type(inner)),
            JavaType::WildcardType { bound: None, .. } => "?".into(),
            JavaType::WildcardType { bound: Some(b), is_upper } => {
                format!("? {} {}", if *is_upper { "extends" } else { "super" }, self.java_type(b))
            }
            JavaType::TypeVariable(name) => name.clone(),
            JavaType::Primitive(_) | JavaType::Void => ty.display_name(),
        }
    }

    fn annotation(&self, ann: &JavaAnnotation) -> String {
        let mut out = format!("@{}", self.class_name(&ann.type_name));
        if ann.arguments.is_empty() {
            return out;
        }
        let args: Vec<String> = ann
            .arguments
            .iter()
            .map(|arg| match arg {
                AnnotationArgument::Named { name, value } if name == "value" && ann.arguments.len() == 1 => {
                    self.annotation_value(value)
                }
                AnnotationArgument::Named { name, value } => format!("{} = {}", name, self.annotation_value(value)),
                AnnotationArgument::Unnamed(value) => self.annotation_value(value),
            })
            .collect();
        out.push_str(&format!("({})", args.join(", ")));
        out
    }

    fn annotation_value(&self, value: &AnnotationValue) -> String {
        match value {
            AnnotationValue::IntLiteral(v) => v.to_string(),
            AnnotationValue::LongLiteral(v) => format!("{}L", v),
            AnnotationValue::FloatLiteral(v) => format!("{:?}f", v),
            AnnotationValue::DoubleLiteral(v) => format!("{:?}", v),
            AnnotationValue::StringLiteral(s) => format!("\"{}\"", escape_java_string(s)),
            AnnotationValue::BooleanLiteral(b) => b.to_string(),
            AnnotationValue::CharLiteral(c) => char_literal(*c as i32),
            AnnotationValue::ClassLiteral(desc) => match parse_type_descriptor(desc) {
                Some(ty) => format!("{}.class", self.jvm_type(&ty)),
                None => format!("{}.class", desc),
            },
            AnnotationValue::EnumConstant { type_name, const_name } => {
                format!("{}.{}", self.class_name(type_name), const_name)
            }
            AnnotationValue::AnnotationLiteral(ann) => self.annotation(ann),
            AnnotationValue::ArrayLiteral(values) => {
                let rendered: Vec<String> = values.iter().map(|v| self.annotation_value(v)).collect();
                format!("{{{}}}", rendered.join(", "))
            }
        }
    }

    fn should_show_field(&self, field: &JavaField) -> bool {
        !field.is_enum_constant && (self.config.include_synthetic || !field.is_synthetic)
    }

    fn should_show_method(&self, method: &JavaMethod) -> bool {
        self.config.include_synthetic || !(method.is_synthetic || method.is_bridge)
    }

    // ------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------

    fn write_indent(&mut self) {
        for _ in 0..self.indent_level {
            self.output.push_str(&self.config.indent);
        }
    }

    fn writeln(&mut self, text: &str) {
        self.write_indent();
        self.output.push_str(text);
        self.newline();
    }

    fn newline(&mut self) {
        self.output.push('\n');
        self.line += 1;
    }
}

fn append_visibility(out: &mut String, vis: Visibility) {
    match vis {
        Visibility::Public => out.push_str("public "),
        Visibility::Protected => out.push_str("protected "),
        Visibility::Private => out.push_str("private "),
        Visibility::PackagePrivate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer() -> JavaRenderer {
        JavaRenderer::new(RenderConfig::default())
    }

    fn local(index: u16, name: &str, ty: JvmType) -> Expr {
        Expr::LocalLoad(LocalVar { name: Some(name.into()), ..LocalVar::new(index, ty) })
    }

    #[test]
    fn parenthesizes_by_precedence() {
        let a = local(0, "a", JvmType::Int);
        let b = local(1, "b", JvmType::Int);
        let sum = Expr::BinaryOp { op: BinOp::Add, left: Box::new(a.clone()), right: Box::new(b.clone()) };
        let product = Expr::BinaryOp { op: BinOp::Mul, left: Box::new(sum.clone()), right: Box::new(Expr::int(2)) };
        assert_eq!(renderer().expr(&product), "(a + b) * 2");

        let nested_right = Expr::BinaryOp { op: BinOp::Sub, left: Box::new(a), right: Box::new(sum) };
        assert_eq!(renderer().expr(&nested_right), "a - (a + b)");
    }

    #[test]
    fn literals_follow_their_narrowed_type() {
        let r = renderer();
        assert_eq!(r.expr(&Expr::boolean(true)), "true");
        assert_eq!(r.expr(&Expr::IntLiteral { value: 'x' as i32, flags: PrimitiveFlags::CHAR }), "'x'");
        assert_eq!(r.expr(&Expr::IntLiteral { value: 10, flags: PrimitiveFlags::CHAR }), "'\\n'");
        assert_eq!(r.expr(&Expr::LongLiteral(-3)), "-3L");
        assert_eq!(r.expr(&Expr::StringLiteral("a\"b".into())), "\"a\\\"b\"");
    }

    #[test]
    fn numeric_concat_gets_empty_string_prefix() {
        let concat = Expr::StringConcat(vec![local(0, "a", JvmType::Int), local(1, "b", JvmType::Int)]);
        assert_eq!(renderer().expr(&concat), "\"\" + a + b");
        let leading = Expr::StringConcat(vec![Expr::StringLiteral("n=".into()), local(0, "a", JvmType::Int)]);
        assert_eq!(renderer().expr(&leading), "\"n=\" + a");
    }

    #[test]
    fn self_update_renders_as_compound_assignment() {
        let var = LocalVar { name: Some("total".into()), ..LocalVar::new(2, JvmType::Int) };
        let r = renderer();
        let plus_one = Stmt::LocalStore {
            var: var.clone(),
            value: Expr::BinaryOp { op: BinOp::Add, left: Box::new(Expr::LocalLoad(var.clone())), right: Box::new(Expr::int(1)) },
        };
        assert_eq!(r.stmt_text(&plus_one), "total++");
        let times = Stmt::LocalStore {
            var: var.clone(),
            value: Expr::BinaryOp { op: BinOp::Mul, left: Box::new(Expr::LocalLoad(var.clone())), right: Box::new(Expr::int(3)) },
        };
        assert_eq!(r.stmt_text(&times), "total *= 3");
        assert_eq!(r.stmt_text(&Stmt::Iinc { var, amount: -4 }), "total -= 4");
    }

    fn field(name: &str, internal_type: &str) -> JavaField {
        JavaField {
            visibility: Visibility::Private,
            is_static: false,
            is_final: false,
            is_volatile: false,
            is_transient: false,
            is_synthetic: false,
            is_enum_constant: false,
            annotations: vec![],
            field_type: JavaType::class(internal_type),
            descriptor: format!("L{};", internal_type),
            name: name.into(),
            initializer: None,
        }
    }

    fn class(internal_name: &str, name: &str, fields: Vec<JavaField>) -> JavaClass {
        JavaClass {
            kind: ClassKind::Class,
            visibility: Visibility::Public,
            is_final: false,
            is_abstract: false,
            is_static: false,
            is_synthetic: false,
            annotations: vec![],
            type_parameters: vec![],
            package: Some("com.acme".into()),
            internal_name: internal_name.into(),
            name: name.into(),
            super_class: None,
            interfaces: vec![],
            enum_constants: vec![],
            fields,
            methods: vec![],
            inner_classes: vec![],
            source_file: None,
        }
    }

    fn method(name: &str, statements: Vec<StructuredStmt>) -> JavaMethod {
        JavaMethod {
            visibility: Visibility::PackagePrivate,
            is_static: false,
            is_final: false,
            is_abstract: false,
            is_synchronized: false,
            is_native: false,
            is_strict: false,
            is_default: false,
            is_synthetic: false,
            is_bridge: false,
            annotations: vec![],
            type_parameters: vec![],
            return_type: JavaType::Primitive(PrimitiveType::Int),
            name: name.into(),
            descriptor: "()I".into(),
            parameters: vec![],
            hidden_parameters: 0,
            throws: vec![],
            body: Some(StructuredBody::new(statements)),
            failure: None,
            listing: None,
        }
    }

    fn unit_of(class: JavaClass) -> CompilationUnit {
        CompilationUnit { package: Some("com.acme".into()), class, constant_pools: Default::default() }
    }

    fn unit(fields: Vec<JavaField>) -> CompilationUnit {
        unit_of(class("com/acme/Demo", "Demo", fields))
    }

    fn returning(value: Expr) -> StructuredStmt {
        StructuredStmt::simple(Location::at(0), Stmt::Return(Some(value)))
    }

    #[test]
    fn clashing_simple_names_are_qualified() {
        let unit = unit(vec![field("items", "java/util/List"), field("widget", "java/awt/List")]);
        let rendered = renderer().render_unit(&unit);
        assert!(rendered.text.contains("import java.awt.List;"), "{}", rendered.text);
        assert!(!rendered.text.contains("import java.util.List;"), "{}", rendered.text);
        assert!(rendered.text.contains("private java.util.List items;"), "{}", rendered.text);
        assert!(rendered.text.contains("private List widget;"), "{}", rendered.text);
    }

    #[test]
    fn same_package_and_java_lang_need_no_import() {
        let unit = unit(vec![field("name", "java/lang/String"), field("peer", "com/acme/Peer")]);
        let rendered = renderer().render_unit(&unit);
        assert!(rendered.text.starts_with("package com.acme;\n\npublic class Demo {"), "{}", rendered.text);
        assert!(!rendered.text.contains("import"), "{}", rendered.text);
        assert!(rendered.text.contains("private String name;"));
        assert!(rendered.text.contains("private Peer peer;"));
    }

    #[test]
    fn synthetic_nested_classes_follow_the_flag() {
        let mut outer = class("com/acme/Demo", "Demo", vec![]);
        let mut hidden = class("com/acme/Demo$1", "1", vec![]);
        hidden.is_synthetic = true;
        outer.inner_classes.push(hidden);
        outer.inner_classes.push(class("com/acme/Demo$Node", "Node", vec![]));
        let unit = unit_of(outer);

        let text = renderer().render_unit(&unit).text;
        assert!(text.contains("class Node {"), "{}", text);
        assert!(!text.contains("class 1 {"), "{}", text);

        let all = JavaRenderer::new(RenderConfig { include_synthetic: true, ..RenderConfig::default() });
        assert!(all.render_unit(&unit).text.contains("class 1 {"));
    }

    #[test]
    fn complement_and_value_updates_use_operators() {
        let r = renderer();
        let a = local(0, "a", JvmType::Int);
        let not_a = Expr::BinaryOp { op: BinOp::Xor, left: Box::new(a.clone()), right: Box::new(Expr::int(-1)) };
        assert_eq!(r.expr(&not_a), "~a");
        let masked = Expr::BinaryOp { op: BinOp::And, left: Box::new(not_a), right: Box::new(Expr::int(7)) };
        assert_eq!(r.expr(&masked), "~a & 7");

        let count = Expr::FieldGet {
            object: Some(Box::new(Expr::This)),
            class_name: "com/acme/Demo".into(),
            field_name: "count".into(),
            field_type: JvmType::Int,
        };
        let update = |right: Expr| Expr::Assign {
            target: Box::new(count.clone()),
            value: Box::new(Expr::BinaryOp { op: BinOp::Add, left: Box::new(count.clone()), right: Box::new(right) }),
        };
        assert_eq!(r.expr(&update(Expr::int(1))), "++this.count");
        assert_eq!(r.expr(&update(Expr::int(3))), "this.count += 3");
        let plain = Expr::Assign { target: Box::new(count.clone()), value: Box::new(Expr::int(3)) };
        assert_eq!(r.expr(&plain), "this.count = 3");
    }

    #[test]
    fn enclosing_instance_renders_as_outer_this() {
        let mut outer = class("com/acme/Outer", "Outer", vec![field("label", "java/lang/String")]);
        let mut inner = class("com/acme/Outer$Inner", "Inner", vec![field("this$0", "com/acme/Outer")]);
        inner.fields[0].is_synthetic = true;
        let outer_this = Expr::FieldGet {
            object: Some(Box::new(Expr::This)),
            class_name: "com/acme/Outer$Inner".into(),
            field_name: "this$0".into(),
            field_type: JvmType::Reference("com/acme/Outer".into()),
        };
        let label = Expr::FieldGet {
            object: Some(Box::new(outer_this.clone())),
            class_name: "com/acme/Outer".into(),
            field_name: "label".into(),
            field_type: JvmType::Reference("java/lang/String".into()),
        };
        let size = Expr::FieldGet {
            object: Some(Box::new(outer_this.clone())),
            class_name: "com/acme/Outer".into(),
            field_name: "size".into(),
            field_type: JvmType::Int,
        };
        inner.methods.push(method("label", vec![returning(label)]));
        inner.methods.push(method("owner", vec![returning(outer_this)]));
        inner.methods.push(method("size", vec![returning(size)]));
        outer.inner_classes.push(inner);

        let text = renderer().render_unit(&unit_of(outer)).text;
        assert!(text.contains("return label;"), "{}", text);
        assert!(text.contains("return Outer.this;"), "{}", text);
        // Not declared by the outer class as far as the tree shows, so it stays qualified.
        assert!(text.contains("return Outer.this.size;"), "{}", text);
        assert!(!text.contains("this$0"), "{}", text);
    }

    #[test]
    fn enum_constant_body_renders_inline() {
        let mut e = class("com/acme/Level", "Level", vec![]);
        e.kind = ClassKind::Enum;
        let mut body = class("com/acme/Level$1", "1", vec![]);
        body.methods.push(method("weight", vec![returning(Expr::int(9))]));
        e.enum_constants = vec![
            EnumConstant { name: "LOW".into(), arguments: vec![Expr::int(1)], body: None },
            EnumConstant { name: "HIGH".into(), arguments: vec![Expr::int(2)], body: Some(Box::new(body)) },
        ];
        let text = renderer().render_unit(&unit_of(e)).text;
        assert!(text.contains("    LOW(1),\n    HIGH(2) {\n        int weight() {\n            return 9;\n        }\n    };"), "{}", text);
        assert!(!text.contains("Level$1"), "{}", text);
    }
}
