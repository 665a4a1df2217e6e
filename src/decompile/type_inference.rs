//! Declared types for classes and members, and type resolution over reconstructed bodies.
//!
//! [`build_java_class`] turns a [`ClassFile`] into a declaration skeleton, taking generic types
//! from `Signature` attributes where present. [`resolve_method_types`] then settles the types of
//! locals without debug information, narrows ambiguous integer literals against the context that
//! consumes them, and names whatever is still unnamed.

use std::collections::{BTreeMap, BTreeSet};

use crate::attribute_info::*;
use crate::constant_info::{ConstantInfo, ConstantPool};
use crate::field_info::{FieldAccessFlags, FieldInfo};
use crate::method_info::{MethodAccessFlags, MethodInfo};
use crate::types::{ClassAccessFlags, ClassFile};

use super::descriptor::{
    package_name, parse_class_signature, parse_field_signature, parse_method_descriptor,
    parse_method_signature, parse_type_descriptor, simple_class_name, JvmType,
};
use super::expr::*;
use super::java_ast::*;
use super::primitive::PrimitiveFlags;
use super::structured_types::*;

/// Rounds of local type inference before giving up on a fixpoint.
const MAX_INFERENCE_ROUNDS: usize = 4;

/// Build a JavaClass from a parsed ClassFile. Method bodies are filled in later.
pub fn build_java_class(class: &ClassFile) -> JavaClass {
    let pool = &class.const_pool;
    let internal_name = class.this_class_name().to_string();
    let flags = class.access_flags;
    let own_entry = inner_class_entry(class, &internal_name);

    let kind = if flags.contains(ClassAccessFlags::ANNOTATION) {
        ClassKind::Annotation
    } else if flags.contains(ClassAccessFlags::ENUM) {
        ClassKind::Enum
    } else if flags.contains(ClassAccessFlags::INTERFACE) {
        ClassKind::Interface
    } else {
        ClassKind::Class
    };

    let name = own_entry
        .filter(|e| e.inner_name_index != 0)
        .and_then(|e| pool.utf8(e.inner_name_index))
        .unwrap_or_else(|| simple_class_name(&internal_name))
        .to_string();
    let (visibility, is_static) = match own_entry {
        Some(e) => (inner_visibility(e.inner_class_access_flags), e.inner_class_access_flags.contains(InnerClassAccessFlags::STATIC)),
        None if flags.contains(ClassAccessFlags::PUBLIC) => (Visibility::Public, false),
        None => (Visibility::PackagePrivate, false),
    };
    let is_member = own_entry.map_or(false, |e| e.outer_class_info_index != 0);

    let signature = class.signature().and_then(parse_class_signature);
    let super_class = match (&signature, class.super_class_name()) {
        (_, None) | (_, Some("java/lang/Object")) => None,
        (_, Some("java/lang/Enum")) if kind == ClassKind::Enum => None,
        (Some(sig), Some(_)) => Some(sig.super_class.clone()),
        (None, Some(name)) => Some(JavaType::class(name)),
    };
    let mut interfaces: Vec<JavaType> = match &signature {
        Some(sig) => sig.interfaces.clone(),
        None => class.interfaces.iter().filter_map(|&i| pool.class_name(i)).map(JavaType::class).collect(),
    };
    if kind == ClassKind::Annotation {
        interfaces.retain(|i| i.qualified_name().as_deref() != Some("java.lang.annotation.Annotation"));
    }

    let outer_instance = (is_member && !is_static && kind == ClassKind::Class)
        .then(|| own_entry.and_then(|e| pool.class_name(e.outer_class_info_index)))
        .flatten();

    let fields = class.fields.iter().map(|f| build_java_field(f, pool)).collect();
    let methods = class
        .methods
        .iter()
        .map(|m| build_java_method(m, pool, kind, outer_instance))
        .collect();

    JavaClass {
        kind,
        visibility,
        is_final: flags.contains(ClassAccessFlags::FINAL) && kind == ClassKind::Class,
        is_abstract: flags.contains(ClassAccessFlags::ABSTRACT) && kind == ClassKind::Class,
        is_static: is_static && kind == ClassKind::Class,
        is_synthetic: flags.contains(ClassAccessFlags::SYNTHETIC) || has_marker(&class.attributes, pool, "Synthetic"),
        annotations: annotations(&class.attributes, pool),
        type_parameters: signature.map(|s| s.type_parameters).unwrap_or_default(),
        package: package_name(&internal_name).map(|p| p.replace('/', ".")),
        internal_name,
        name,
        super_class,
        interfaces,
        enum_constants: Vec::new(),
        fields,
        methods,
        inner_classes: Vec::new(),
        source_file: class.source_file().map(str::to_string),
    }
}

/// The `InnerClasses` entry describing `name`, if this class file has one.
pub fn inner_class_entry<'a>(class: &'a ClassFile, name: &str) -> Option<&'a InnerClassInfo> {
    inner_class_entries(class).find(|e| class.const_pool.class_name(e.inner_class_info_index) == Some(name))
}

pub fn inner_class_entries(class: &ClassFile) -> impl Iterator<Item = &InnerClassInfo> {
    class
        .attributes
        .iter()
        .filter_map(|a| match &a.info_parsed {
            Some(AttributeInfoVariant::InnerClasses(ic)) => Some(ic.classes.iter()),
            _ => None,
        })
        .flatten()
}

fn inner_visibility(flags: InnerClassAccessFlags) -> Visibility {
    if flags.contains(InnerClassAccessFlags::PUBLIC) {
        Visibility::Public
    } else if flags.contains(InnerClassAccessFlags::PROTECTED) {
        Visibility::Protected
    } else if flags.contains(InnerClassAccessFlags::PRIVATE) {
        Visibility::Private
    } else {
        Visibility::PackagePrivate
    }
}

fn method_visibility(flags: MethodAccessFlags) -> Visibility {
    if flags.contains(MethodAccessFlags::PUBLIC) {
        Visibility::Public
    } else if flags.contains(MethodAccessFlags::PROTECTED) {
        Visibility::Protected
    } else if flags.contains(MethodAccessFlags::PRIVATE) {
        Visibility::Private
    } else {
        Visibility::PackagePrivate
    }
}

fn field_visibility(flags: FieldAccessFlags) -> Visibility {
    if flags.contains(FieldAccessFlags::PUBLIC) {
        Visibility::Public
    } else if flags.contains(FieldAccessFlags::PROTECTED) {
        Visibility::Protected
    } else if flags.contains(FieldAccessFlags::PRIVATE) {
        Visibility::Private
    } else {
        Visibility::PackagePrivate
    }
}

fn build_java_field(field: &FieldInfo, pool: &ConstantPool) -> JavaField {
    let name = pool.utf8(field.name_index).unwrap_or("field").to_string();
    let descriptor = pool.utf8(field.descriptor_index).unwrap_or("Ljava/lang/Object;").to_string();
    let erased = parse_type_descriptor(&descriptor).unwrap_or(JvmType::Unknown);
    let field_type = find_signature(&field.attributes, pool)
        .and_then(parse_field_signature)
        .unwrap_or_else(|| erased.to_java_type());
    let flags = field.access_flags;

    JavaField {
        visibility: field_visibility(flags),
        is_static: flags.contains(FieldAccessFlags::STATIC),
        is_final: flags.contains(FieldAccessFlags::FINAL),
        is_volatile: flags.contains(FieldAccessFlags::VOLATILE),
        is_transient: flags.contains(FieldAccessFlags::TRANSIENT),
        is_synthetic: flags.contains(FieldAccessFlags::SYNTHETIC) || has_marker(&field.attributes, pool, "Synthetic"),
        is_enum_constant: flags.contains(FieldAccessFlags::ENUM),
        annotations: annotations(&field.attributes, pool),
        initializer: field.constant_value_index().and_then(|i| constant_value(pool, i, &erased)),
        field_type,
        descriptor,
        name,
    }
}

/// `ConstantValue` as a literal of the field's type.
fn constant_value(pool: &ConstantPool, index: u16, ty: &JvmType) -> Option<Expr> {
    match pool.get(index)? {
        ConstantInfo::Integer(c) => {
            let mut literal = Expr::int(c.value);
            narrow_to(&mut literal, ty);
            Some(literal)
        }
        ConstantInfo::Long(c) => Some(Expr::LongLiteral(c.value)),
        ConstantInfo::Float(c) => Some(Expr::FloatLiteral(c.value)),
        ConstantInfo::Double(c) => Some(Expr::DoubleLiteral(c.value)),
        ConstantInfo::String(s) => Some(Expr::StringLiteral(pool.utf8(s.string_index)?.to_string())),
        _ => None,
    }
}

fn build_java_method(method: &MethodInfo, pool: &ConstantPool, kind: ClassKind, outer_instance: Option<&str>) -> JavaMethod {
    let name = method.name(pool).unwrap_or("method").to_string();
    let descriptor = method.descriptor(pool).unwrap_or("()V").to_string();
    let flags = method.access_flags;
    let is_static = flags.contains(MethodAccessFlags::STATIC);
    let (erased_params, erased_ret) = parse_method_descriptor(&descriptor).unwrap_or((Vec::new(), JvmType::Void));

    let signature = find_signature(&method.attributes, pool).and_then(parse_method_signature);
    let mut param_types: Vec<JavaType> = erased_params.iter().map(JvmType::to_java_type).collect();
    let mut return_type = erased_ret.to_java_type();
    let mut throws = Vec::new();
    let mut type_parameters = Vec::new();
    if let Some(sig) = signature {
        // Signatures leave out compiler-added leading parameters.
        if sig.parameters.len() <= param_types.len() {
            let skip = param_types.len() - sig.parameters.len();
            for (slot, ty) in param_types[skip..].iter_mut().zip(sig.parameters) {
                *slot = ty;
            }
        }
        return_type = sig.return_type;
        throws = sig.throws;
        type_parameters = sig.type_parameters;
    }
    if throws.is_empty() {
        if let Some(exceptions) = method.exceptions() {
            throws = exceptions
                .exception_table
                .iter()
                .filter_map(|&i| pool.class_name(i))
                .map(JavaType::class)
                .collect();
        }
    }

    let names = parameter_names(method, pool, is_static, &erased_params);
    let is_varargs = flags.contains(MethodAccessFlags::VARARGS);
    let count = param_types.len();
    let parameters = param_types
        .into_iter()
        .zip(names)
        .enumerate()
        .map(|(i, (param_type, name))| JavaParameter {
            annotations: Vec::new(),
            param_type,
            name,
            is_final: false,
            is_varargs: is_varargs && i + 1 == count,
        })
        .collect();

    let hidden_parameters = match outer_instance {
        Some(outer) if name == "<init>" && erased_params.first() == Some(&JvmType::Reference(outer.to_string())) => 1,
        _ => 0,
    };

    JavaMethod {
        visibility: method_visibility(flags),
        is_static,
        is_final: flags.contains(MethodAccessFlags::FINAL),
        is_abstract: flags.contains(MethodAccessFlags::ABSTRACT),
        is_synchronized: flags.contains(MethodAccessFlags::SYNCHRONIZED),
        is_native: flags.contains(MethodAccessFlags::NATIVE),
        is_strict: flags.contains(MethodAccessFlags::STRICT),
        is_default: kind == ClassKind::Interface
            && !flags.contains(MethodAccessFlags::ABSTRACT)
            && !is_static
            && name != "<clinit>",
        is_synthetic: flags.contains(MethodAccessFlags::SYNTHETIC) || has_marker(&method.attributes, pool, "Synthetic"),
        is_bridge: flags.contains(MethodAccessFlags::BRIDGE),
        annotations: annotations(&method.attributes, pool),
        type_parameters,
        return_type,
        name,
        descriptor,
        parameters,
        hidden_parameters,
        throws,
        body: None,
        failure: None,
        listing: None,
    }
}

/// Names from `MethodParameters`, then the `LocalVariableTable` at entry, then from the types.
fn parameter_names(method: &MethodInfo, pool: &ConstantPool, is_static: bool, params: &[JvmType]) -> Vec<String> {
    let from_attribute: Option<Vec<Option<String>>> = method.attributes.iter().find_map(|a| match &a.info_parsed {
        Some(AttributeInfoVariant::MethodParameters(mp)) if mp.parameters.len() == params.len() => Some(
            mp.parameters
                .iter()
                .map(|p| (p.name_index != 0).then(|| pool.utf8(p.name_index)).flatten().map(str::to_string))
                .collect(),
        ),
        _ => None,
    });
    let lvt = method.code().and_then(|c| c.local_variable_table());

    let mut names = NameAllocator::default();
    if !is_static {
        names.reserve("this");
    }
    let mut slot: u16 = if is_static { 0 } else { 1 };
    let mut known = Vec::with_capacity(params.len());
    for (i, ty) in params.iter().enumerate() {
        let debug = from_attribute.as_ref().and_then(|n| n[i].clone()).or_else(|| {
            lvt.and_then(|t| t.items.iter().find(|item| item.index == slot && item.covers(0)))
                .and_then(|item| pool.utf8(item.name_index))
                .map(str::to_string)
        });
        if let Some(name) = &debug {
            names.reserve(name);
        }
        known.push(debug);
        slot += if ty.is_wide() { 2 } else { 1 };
    }
    known
        .into_iter()
        .zip(params)
        .map(|(name, ty)| name.unwrap_or_else(|| names.fresh(ty)))
        .collect()
}

fn annotations(attributes: &[AttributeInfo], pool: &ConstantPool) -> Vec<JavaAnnotation> {
    let mut out = Vec::new();
    for attr in attributes {
        let list = match &attr.info_parsed {
            Some(AttributeInfoVariant::RuntimeVisibleAnnotations(a)) => &a.annotations,
            Some(AttributeInfoVariant::RuntimeInvisibleAnnotations(a)) => &a.annotations,
            _ => continue,
        };
        out.extend(list.iter().filter_map(|a| convert_annotation(a, pool)));
    }
    if has_marker(attributes, pool, "Deprecated") && !out.iter().any(|a| a.type_name == "java/lang/Deprecated") {
        out.push(JavaAnnotation { type_name: "java/lang/Deprecated".into(), arguments: Vec::new() });
    }
    out
}

/// Internal class name from a field descriptor (`Lpkg/Name;`).
fn descriptor_class(desc: &str) -> String {
    match parse_type_descriptor(desc) {
        Some(JvmType::Reference(name)) => name,
        _ => desc.to_string(),
    }
}

fn convert_annotation(annotation: &RuntimeAnnotation, pool: &ConstantPool) -> Option<JavaAnnotation> {
    let type_name = descriptor_class(pool.utf8(annotation.type_index)?);
    let arguments = annotation
        .element_value_pairs
        .iter()
        .filter_map(|pair| {
            let name = pool.utf8(pair.element_name_index)?.to_string();
            let value = convert_element_value(&pair.value, pool)?;
            Some(AnnotationArgument::Named { name, value })
        })
        .collect();
    Some(JavaAnnotation { type_name, arguments })
}

fn convert_element_value(value: &ElementValue, pool: &ConstantPool) -> Option<AnnotationValue> {
    Some(match value {
        ElementValue::ConstValueIndex { tag, value } => match (tag, pool.get(*value)?) {
            ('Z', ConstantInfo::Integer(c)) => AnnotationValue::BooleanLiteral(c.value != 0),
            ('C', ConstantInfo::Integer(c)) => AnnotationValue::CharLiteral(char::from_u32(c.value as u32)?),
            ('B' | 'S' | 'I', ConstantInfo::Integer(c)) => AnnotationValue::IntLiteral(c.value),
            ('J', ConstantInfo::Long(c)) => AnnotationValue::LongLiteral(c.value),
            ('F', ConstantInfo::Float(c)) => AnnotationValue::FloatLiteral(c.value),
            ('D', ConstantInfo::Double(c)) => AnnotationValue::DoubleLiteral(c.value),
            ('s', ConstantInfo::Utf8(s)) => AnnotationValue::StringLiteral(s.utf8_string.clone()),
            _ => return None,
        },
        ElementValue::EnumConst(e) => AnnotationValue::EnumConstant {
            type_name: descriptor_class(pool.utf8(e.type_name_index)?),
            const_name: pool.utf8(e.const_name_index)?.to_string(),
        },
        ElementValue::ClassInfoIndex(i) => AnnotationValue::ClassLiteral(pool.utf8(*i)?.to_string()),
        ElementValue::AnnotationValue(a) => AnnotationValue::AnnotationLiteral(convert_annotation(a, pool)?),
        ElementValue::ElementArray(array) => AnnotationValue::ArrayLiteral(
            array.values.iter().filter_map(|v| convert_element_value(v, pool)).collect(),
        ),
    })
}

// ----------------------------------------------------------------------------
// Local naming
// ----------------------------------------------------------------------------

const JAVA_KEYWORDS: &[&str] = &[
    "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class", "const",
    "continue", "default", "do", "double", "else", "enum", "extends", "final", "finally", "float",
    "for", "goto", "if", "implements", "import", "instanceof", "int", "interface", "long", "native",
    "new", "package", "private", "protected", "public", "return", "short", "static", "strictfp",
    "super", "switch", "synchronized", "this", "throw", "throws", "transient", "try", "void",
    "volatile", "while", "true", "false", "null",
];

/// Hands out local names derived from types, unique within one method.
#[derive(Debug, Default)]
pub struct NameAllocator {
    taken: BTreeSet<String>,
}

impl NameAllocator {
    pub fn reserve(&mut self, name: &str) {
        self.taken.insert(name.to_string());
    }

    pub fn fresh(&mut self, ty: &JvmType) -> String {
        let base = base_name(ty);
        let mut candidate = base.clone();
        let mut n = 2;
        while self.taken.contains(&candidate) {
            candidate = format!("{}{}", base, n);
            n += 1;
        }
        self.taken.insert(candidate.clone());
        candidate
    }
}

fn base_name(ty: &JvmType) -> String {
    match ty {
        JvmType::Int => "i".into(),
        JvmType::Long => "l".into(),
        JvmType::Float => "f".into(),
        JvmType::Double => "d".into(),
        JvmType::Byte => "b".into(),
        JvmType::Char => "c".into(),
        JvmType::Short => "s".into(),
        JvmType::Boolean => "flag".into(),
        JvmType::Reference(name) if name == "java/lang/String" => "str".into(),
        JvmType::Reference(name) if name == "java/lang/Object" => "obj".into(),
        JvmType::Reference(name) => {
            let simple = simple_class_name(name);
            let last = simple.rsplit('$').next().unwrap_or(simple);
            let mut chars = last.chars();
            match chars.next() {
                Some(first) if first.is_alphabetic() => {
                    let name: String = first.to_lowercase().chain(chars).collect();
                    match name.as_str() {
                        "class" => "clazz".into(),
                        n if JAVA_KEYWORDS.contains(&n) => format!("{}Value", n),
                        _ => name,
                    }
                }
                _ => "obj".into(),
            }
        }
        JvmType::Array(inner) if !inner.is_reference() => "arr".into(),
        JvmType::Array(inner) => format!("{}Array", base_name(inner)),
        JvmType::Void | JvmType::Null | JvmType::Unknown => "obj".into(),
    }
}

// ----------------------------------------------------------------------------
// Body resolution
// ----------------------------------------------------------------------------

/// Resolves types in every method body of `class` and its nested classes.
pub fn resolve_class_types(class: &mut JavaClass) {
    for method in &mut class.methods {
        resolve_method_types(method);
    }
    for inner in class.nested_classes_mut() {
        resolve_class_types(inner);
    }
}

/// Declared slot, type and name of each descriptor parameter.
fn parameter_slots(method: &JavaMethod) -> Vec<(u16, JvmType, String)> {
    let (params, _) = parse_method_descriptor(&method.descriptor).unwrap_or((Vec::new(), JvmType::Void));
    let mut slot: u16 = if method.is_static { 0 } else { 1 };
    let mut out = Vec::with_capacity(params.len());
    for (i, ty) in params.into_iter().enumerate() {
        let width = if ty.is_wide() { 2 } else { 1 };
        let name = method.parameters.get(i).map(|p| p.name.clone()).unwrap_or_else(|| format!("arg{}", i));
        out.push((slot, ty, name));
        slot += width;
    }
    out
}

/// Settles local types, narrows literals against their consumers and names unnamed locals.
/// Running it again on its own output changes nothing.
pub fn resolve_method_types(method: &mut JavaMethod) {
    let params = parameter_slots(method);
    let return_type = parse_method_descriptor(&method.descriptor).map_or(JvmType::Void, |(_, r)| r);
    let Some(body) = method.body.as_mut() else { return };
    let statements = &mut body.statements;

    bind_parameters(statements, &params);
    let param_slots: BTreeSet<u16> = params.iter().map(|(slot, ..)| *slot).collect();
    infer_local_types(statements, &param_slots);
    narrow_literals(statements, &return_type);
    transform_exprs(statements, &mut simplify_boolean_compare);

    let mut names = NameAllocator::default();
    if !method.is_static {
        names.reserve("this");
    }
    for (_, _, name) in &params {
        names.reserve(name);
    }
    name_locals(statements, &mut names);
}

/// Undeclared accesses to parameter slots take the parameter's type and name.
fn bind_parameters(body: &mut [StructuredStmt], params: &[(u16, JvmType, String)]) {
    walk_vars_mut(body, &mut |var| {
        if var.origin.is_some() || var.web.is_some() {
            return;
        }
        if let Some((_, ty, name)) = params.iter().find(|(slot, ty, _)| *slot == var.index && same_storage(ty, &var.ty)) {
            var.ty = ty.clone();
            if var.name.is_none() {
                var.name = Some(name.clone());
            }
        }
    });
}

fn same_storage(a: &JvmType, b: &JvmType) -> bool {
    (a.is_int_like() && b.is_int_like())
        || (a.is_reference() && (b.is_reference() || *b == JvmType::Unknown))
        || a == b
}

/// Candidate kinds of a value stored into an int-like local.
fn value_flags(value: &Expr) -> PrimitiveFlags {
    match value {
        Expr::IntLiteral { flags, .. } => *flags,
        Expr::Ternary { then_expr, else_expr, .. } => {
            let both = value_flags(then_expr) & value_flags(else_expr);
            if both.is_empty() {
                PrimitiveFlags::INT
            } else {
                both
            }
        }
        other => match PrimitiveFlags::of_type(&other.type_of()) {
            f if f.is_empty() => PrimitiveFlags::INT,
            f => f,
        },
    }
}

/// Debug-table variables and parameters keep their declared types.
fn is_fixed(var: &LocalVar, params: &BTreeSet<u16>) -> bool {
    var.origin.is_some() || (var.web.is_none() && params.contains(&var.index))
}

#[derive(Default)]
struct LocalEvidence {
    flags: Option<PrimitiveFlags>,
    references: BTreeSet<JvmType>,
}

fn record_store(stmt: &Stmt, params: &BTreeSet<u16>, out: &mut BTreeMap<VarKey, LocalEvidence>) {
    let (var, value) = match stmt {
        Stmt::LocalStore { var, value } => (var, Some(value)),
        Stmt::Iinc { var, .. } => (var, None),
        _ => return,
    };
    if is_fixed(var, params) {
        return;
    }
    let evidence = out.entry(var.key()).or_default();
    if var.ty.is_int_like() {
        let incoming = value.map_or(PrimitiveFlags::INT.assignable_to(), value_flags);
        let both = evidence.flags.unwrap_or(PrimitiveFlags::MAYBE_BOOLEAN) & incoming;
        evidence.flags = Some(if both.is_empty() { PrimitiveFlags::INT } else { both });
    } else if let Some(t) = value.map(Expr::type_of).filter(JvmType::is_reference) {
        if t != JvmType::Null {
            evidence.references.insert(t);
        }
    }
}

/// A for-each variable receives the element type of an array iterable.
fn record_foreach(var: &LocalVar, iterable: &Expr, params: &BTreeSet<u16>, out: &mut BTreeMap<VarKey, LocalEvidence>) {
    let JvmType::Array(element) = iterable.type_of() else { return };
    if is_fixed(var, params) {
        return;
    }
    let evidence = out.entry(var.key()).or_default();
    if var.ty.is_int_like() {
        let incoming = match PrimitiveFlags::of_type(&element) {
            f if f.is_empty() => PrimitiveFlags::INT,
            f => f,
        };
        let both = evidence.flags.unwrap_or(PrimitiveFlags::MAYBE_BOOLEAN) & incoming;
        evidence.flags = Some(if both.is_empty() { PrimitiveFlags::INT } else { both });
    } else if element.is_reference() {
        evidence.references.insert(*element);
    }
}

fn collect_evidence(body: &[StructuredStmt], params: &BTreeSet<u16>, out: &mut BTreeMap<VarKey, LocalEvidence>) {
    for stmt in body {
        match stmt {
            StructuredStmt::Simple(s) => record_store(&s.stmt, params, out),
            StructuredStmt::For { update, .. } => {
                for u in update {
                    record_store(&u.stmt, params, out);
                }
            }
            StructuredStmt::ForEach { var, iterable, .. } => record_foreach(var, iterable, params, out),
            _ => {}
        }
        stmt.for_each_body(&mut |inner| collect_evidence(inner, params, out));
    }
}

/// Nearest type all `types` are assignable to, as far as it can be told without the
/// class hierarchy: equal types, reference arrays element-wise, boxed numbers to `Number`.
fn common_supertype(types: &BTreeSet<JvmType>) -> JvmType {
    let mut iter = types.iter();
    let Some(first) = iter.next() else { return JvmType::object() };
    iter.try_fold(first.clone(), |acc, t| join_types(&acc, t)).unwrap_or_else(JvmType::object)
}

fn join_types(a: &JvmType, b: &JvmType) -> Option<JvmType> {
    match (a, b) {
        _ if a == b => Some(a.clone()),
        (JvmType::Array(x), JvmType::Array(y)) if x.is_reference() && y.is_reference() => {
            Some(JvmType::Array(Box::new(join_types(x, y).unwrap_or_else(JvmType::object))))
        }
        (JvmType::Reference(x), JvmType::Reference(y)) if is_boxed_number(x) && is_boxed_number(y) => {
            Some(JvmType::Reference("java/lang/Number".into()))
        }
        _ => None,
    }
}

fn is_boxed_number(name: &str) -> bool {
    matches!(
        name,
        "java/lang/Integer" | "java/lang/Long" | "java/lang/Short" | "java/lang/Byte" | "java/lang/Float" | "java/lang/Double"
    )
}

/// Types locals that have no debug information from the values stored into them, repeating
/// until the types stop changing.
fn infer_local_types(body: &mut [StructuredStmt], params: &BTreeSet<u16>) {
    for round in 0..MAX_INFERENCE_ROUNDS {
        let mut evidence = BTreeMap::new();
        collect_evidence(body, params, &mut evidence);
        let resolved: BTreeMap<VarKey, JvmType> = evidence
            .into_iter()
            .filter_map(|(key, e)| {
                let ty = match (e.flags, e.references.len()) {
                    (Some(flags), _) => flags.canonical(),
                    (None, 1) => e.references.into_iter().next()?,
                    (None, 0) => return None,
                    (None, _) => common_supertype(&e.references),
                };
                Some((key, ty))
            })
            .collect();

        let mut changed = false;
        walk_vars_mut(body, &mut |var| {
            if is_fixed(var, params) {
                return;
            }
            if let Some(ty) = resolved.get(&var.key()) {
                if var.ty != *ty {
                    var.ty = ty.clone();
                    changed = true;
                }
            }
        });
        tracing::trace!(round, locals = resolved.len(), changed, "local type inference");
        if !changed {
            break;
        }
    }
}

/// Narrows an int literal (or literals inside a ternary/bitwise expression) to what a
/// consumer of type `ty` accepts.
pub fn narrow_to(expr: &mut Expr, ty: &JvmType) {
    if !ty.is_int_like() {
        return;
    }
    match expr {
        Expr::IntLiteral { flags, .. } => *flags = flags.narrow(PrimitiveFlags::of_type(ty).assignable_to()),
        Expr::Ternary { then_expr, else_expr, .. } => {
            narrow_to(then_expr, ty);
            narrow_to(else_expr, ty);
        }
        Expr::BinaryOp { op: BinOp::And | BinOp::Or | BinOp::Xor, left, right } if *ty == JvmType::Boolean => {
            narrow_to(left, ty);
            narrow_to(right, ty);
        }
        _ => {}
    }
}

fn narrow_args(args: &mut [Expr], descriptor: &str) {
    if let Some((params, _)) = parse_method_descriptor(descriptor) {
        for (arg, ty) in args.iter_mut().zip(&params) {
            narrow_to(arg, ty);
        }
    }
}

fn narrow_stmt(stmt: &mut Stmt, return_type: &JvmType) {
    match stmt {
        Stmt::LocalStore { var, value } => narrow_to(value, &var.ty),
        Stmt::FieldStore { field_type, value, .. } => narrow_to(value, field_type),
        Stmt::ArrayStore { array, value, .. } => {
            if let JvmType::Array(element) = array.type_of() {
                narrow_to(value, &element);
            }
        }
        Stmt::Return(Some(value)) => narrow_to(value, return_type),
        Stmt::Declare { vars } => {
            for (var, init) in vars {
                if let Some(init) = init {
                    narrow_to(init, &var.ty);
                }
            }
        }
        _ => {}
    }
}

fn narrow_literals(body: &mut Vec<StructuredStmt>, return_type: &JvmType) {
    walk_bodies_mut(body, &mut |list| {
        for stmt in list.iter_mut() {
            match stmt {
                StructuredStmt::Simple(s) => narrow_stmt(&mut s.stmt, return_type),
                StructuredStmt::For { update, .. } => {
                    for u in update {
                        narrow_stmt(&mut u.stmt, return_type);
                    }
                }
                _ => {}
            }
        }
    });
    transform_exprs(body, &mut |e| match e {
        Expr::MethodCall { descriptor, args, .. } | Expr::InvokeDynamic { descriptor, captures: args, .. } => {
            narrow_args(args, descriptor)
        }
        Expr::New { constructor_descriptor, args, .. } => narrow_args(args, constructor_descriptor),
        Expr::Compare { left, right, .. } => {
            let (lt, rt) = (left.type_of(), right.type_of());
            if matches!(**right, Expr::IntLiteral { .. }) {
                narrow_to(right, &lt);
            } else if matches!(**left, Expr::IntLiteral { .. }) {
                narrow_to(left, &rt);
            }
        }
        Expr::Assign { target, value } => narrow_to(value, &target.type_of()),
        Expr::BinaryOp { op: BinOp::And | BinOp::Or | BinOp::Xor, left, right } => {
            if left.type_of() == JvmType::Boolean {
                narrow_to(right, &JvmType::Boolean);
            } else if right.type_of() == JvmType::Boolean {
                narrow_to(left, &JvmType::Boolean);
            }
        }
        _ => {}
    });
}

/// `b == 0` becomes `!b` and `b != 0` becomes `b` when `b` is boolean.
fn simplify_boolean_compare(expr: &mut Expr) {
    let Expr::Compare { op: op @ (CompareOp::Eq | CompareOp::Ne), left, right } = expr else { return };
    if left.type_of() != JvmType::Boolean || matches!(**left, Expr::IntLiteral { .. }) {
        return;
    }
    let truthy = match right.int_value() {
        Some(0) => *op == CompareOp::Ne,
        Some(1) => *op == CompareOp::Eq,
        _ => return,
    };
    let operand = std::mem::replace(&mut **left, Expr::NullLiteral);
    *expr = if truthy { operand } else { operand.negate() };
}

fn name_locals(body: &mut [StructuredStmt], names: &mut NameAllocator) {
    walk_vars_mut(body, &mut |var| {
        if let Some(name) = &var.name {
            names.reserve(name);
        }
    });
    let mut assigned: BTreeMap<VarKey, String> = BTreeMap::new();
    walk_vars_mut(body, &mut |var| {
        if var.name.is_none() {
            let name = assigned.entry(var.key()).or_insert_with(|| names.fresh(&var.ty));
            var.name = Some(name.clone());
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple(stmt: Stmt) -> StructuredStmt {
        StructuredStmt::simple(Location::at(0), stmt)
    }

    fn method(descriptor: &str, statements: Vec<StructuredStmt>) -> JavaMethod {
        JavaMethod {
            visibility: Visibility::Public,
            is_static: true,
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
            return_type: JavaType::Void,
            name: "run".into(),
            descriptor: descriptor.into(),
            parameters: vec![],
            hidden_parameters: 0,
            throws: vec![],
            body: Some(StructuredBody::new(statements)),
            failure: None,
            listing: None,
        }
    }

    fn boolean_call() -> Expr {
        Expr::MethodCall {
            kind: InvokeKind::Static,
            object: None,
            class_name: "Demo".into(),
            method_name: "ready".into(),
            descriptor: "()Z".into(),
            args: vec![],
            return_type: JvmType::Boolean,
        }
    }

    #[test]
    fn local_fed_by_booleans_becomes_boolean() {
        let slot = LocalVar::new(0, JvmType::Int);
        let mut m = method(
            "()V",
            vec![
                simple(Stmt::LocalStore { var: slot.clone(), value: Expr::int(1) }),
                simple(Stmt::LocalStore { var: slot.clone(), value: boolean_call() }),
                StructuredStmt::If {
                    condition: Expr::Compare {
                        op: CompareOp::Eq,
                        left: Box::new(Expr::LocalLoad(slot)),
                        right: Box::new(Expr::int(0)),
                    },
                    loc: Location::at(4),
                    then_body: vec![simple(Stmt::Return(None))],
                    else_body: None,
                },
            ],
        );
        resolve_method_types(&mut m);
        let body = &m.body.as_ref().unwrap().statements;
        match body[0].as_stmt() {
            Some(Stmt::LocalStore { var, value }) => {
                assert_eq!(var.ty, JvmType::Boolean);
                assert_eq!(var.name.as_deref(), Some("flag"));
                assert_eq!(value.type_of(), JvmType::Boolean);
            }
            other => panic!("unexpected {:?}", other),
        }
        match &body[2] {
            StructuredStmt::If { condition: Expr::Not(inner), .. } => {
                assert!(matches!(**inner, Expr::LocalLoad(_)))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn char_parameter_narrows_literal_argument() {
        let mut body = vec![simple(Stmt::ExprStmt(Expr::MethodCall {
            kind: InvokeKind::Static,
            object: None,
            class_name: "Demo".into(),
            method_name: "put".into(),
            descriptor: "(CI)V".into(),
            args: vec![Expr::int(65), Expr::int(65)],
            return_type: JvmType::Void,
        }))];
        narrow_literals(&mut body, &JvmType::Void);
        let Some(Stmt::ExprStmt(Expr::MethodCall { args, .. })) = body[0].as_stmt() else { panic!("call expected") };
        assert_eq!(args[0].type_of(), JvmType::Char);
        assert_eq!(args[1].type_of(), JvmType::Int);
    }

    #[test]
    fn resolution_is_idempotent() {
        let a = LocalVar::new(1, JvmType::Int);
        let b = LocalVar::new(2, JvmType::Int);
        let mut m = method(
            "(I)Z",
            vec![
                simple(Stmt::LocalStore { var: a.clone(), value: Expr::int(0) }),
                simple(Stmt::LocalStore { var: b.clone(), value: Expr::LocalLoad(a.clone()) }),
                simple(Stmt::LocalStore { var: a.clone(), value: boolean_call() }),
                simple(Stmt::Return(Some(Expr::Ternary {
                    condition: Box::new(Expr::LocalLoad(b)),
                    then_expr: Box::new(Expr::int(1)),
                    else_expr: Box::new(Expr::int(0)),
                }))),
            ],
        );
        resolve_method_types(&mut m);
        let once = m.clone();
        resolve_method_types(&mut m);
        assert_eq!(m, once);
        let body = &m.body.as_ref().unwrap().statements;
        match body[1].as_stmt() {
            Some(Stmt::LocalStore { var, .. }) => assert_eq!(var.ty, JvmType::Boolean, "copy of a boolean local"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn generated_names_are_unique() {
        let mut names = NameAllocator::default();
        names.reserve("i");
        assert_eq!(names.fresh(&JvmType::Int), "i2");
        assert_eq!(names.fresh(&JvmType::Reference("java/lang/String".into())), "str");
        assert_eq!(names.fresh(&JvmType::Reference("java/util/List".into())), "list");
        assert_eq!(names.fresh(&JvmType::Reference("java/lang/Class".into())), "clazz");
        assert_eq!(names.fresh(&JvmType::Array(Box::new(JvmType::Int))), "arr");
    }

    #[test]
    fn differing_stores_meet_at_a_common_supertype() {
        let reference = |name: &str| JvmType::Reference(name.into());
        let boxed = BTreeSet::from([reference("java/lang/Integer"), reference("java/lang/Long")]);
        assert_eq!(common_supertype(&boxed), reference("java/lang/Number"));

        let arrays = BTreeSet::from([
            JvmType::Array(Box::new(reference("java/lang/String"))),
            JvmType::Array(Box::new(reference("java/util/List"))),
        ]);
        assert_eq!(common_supertype(&arrays), JvmType::Array(Box::new(JvmType::object())));

        let unrelated = BTreeSet::from([reference("java/lang/String"), JvmType::Array(Box::new(JvmType::Int))]);
        assert_eq!(common_supertype(&unrelated), JvmType::object());
        assert_eq!(common_supertype(&BTreeSet::from([reference("java/lang/String")])), reference("java/lang/String"));
    }
}
