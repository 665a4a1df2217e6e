use std::collections::BTreeMap;

use crate::constant_info::ConstantPool;

use super::descriptor::{package_name, source_simple_name};
use super::expr::Expr;
use super::structured_types::StructuredBody;

/// Primitive types in Java.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

/// A Java type as it appears in source code (with generics).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum JavaType {
    Primitive(PrimitiveType),
    ClassType {
        package: Option<String>,
        name: String,
        type_args: Vec<JavaType>,
    },
    ArrayType(Box<JavaType>),
    WildcardType {
        bound: Option<Box<JavaType>>,
        is_upper: bool,
    },
    TypeVariable(String),
    Void,
}

impl JavaType {
    /// Raw class type from an internal (`java/util/Map$Entry`) name.
    pub fn class(internal: &str) -> JavaType {
        JavaType::ClassType {
            package: package_name(internal).map(|p| p.replace('/', ".")),
            name: source_simple_name(internal),
            type_args: Vec::new(),
        }
    }

    /// Get the simple display name for this type.
    pub fn display_name(&self) -> String {
        match self {
            JavaType::Primitive(p) => match p {
                PrimitiveType::Boolean => "boolean".into(),
                PrimitiveType::Byte => "byte".into(),
                PrimitiveType::Char => "char".into(),
                PrimitiveType::Short => "short".into(),
                PrimitiveType::Int => "int".into(),
                PrimitiveType::Long => "long".into(),
                PrimitiveType::Float => "float".into(),
                PrimitiveType::Double => "double".into(),
            },
            JavaType::ClassType { name, type_args, .. } => {
                if type_args.is_empty() {
                    name.clone()
                } else {
                    let args: Vec<String> = type_args.iter().map(|a| a.display_name()).collect();
                    format!("{}<{}>", name, args.join(", "))
                }
            }
            JavaType::ArrayType(inner) => format!("{}[]", inner.display_name()),
            JavaType::WildcardType { bound, is_upper } => match bound {
                Some(b) => {
                    if *is_upper {
                        format!("? extends {}", b.display_name())
                    } else {
                        format!("? super {}", b.display_name())
                    }
                }
                None => "?".into(),
            },
            JavaType::TypeVariable(name) => name.clone(),
            JavaType::Void => "void".into(),
        }
    }

    /// Dotted name of a class type without type arguments (`java.util.Map.Entry`).
    pub fn qualified_name(&self) -> Option<String> {
        match self {
            JavaType::ClassType { package: Some(p), name, .. } => {
                let base = name.split('<').next().unwrap_or(name);
                Some(format!("{}.{}", p, base))
            }
            JavaType::ClassType { package: None, name, .. } => {
                Some(name.split('<').next().unwrap_or(name).to_string())
            }
            _ => None,
        }
    }

    /// Check if this is the java.lang.Object type.
    pub fn is_object(&self) -> bool {
        matches!(self, JavaType::ClassType { package: Some(p), name, .. } if p == "java.lang" && name == "Object")
    }
}

/// Visibility level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Protected,
    PackagePrivate,
    Private,
}

/// What kind of class-like entity this is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassKind {
    Class,
    Interface,
    Enum,
    Annotation,
}

/// A generic type parameter declaration.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeParameter {
    pub name: String,
    pub bounds: Vec<JavaType>,
}

/// A Java annotation usage.
#[derive(Clone, Debug, PartialEq)]
pub struct JavaAnnotation {
    pub type_name: String,
    pub arguments: Vec<AnnotationArgument>,
}

/// An annotation argument.
#[derive(Clone, Debug, PartialEq)]
pub enum AnnotationArgument {
    /// Named argument: `@Foo(name = value)`
    Named { name: String, value: AnnotationValue },
    /// Unnamed (single-element): `@Foo(value)`
    Unnamed(AnnotationValue),
}

/// An annotation element value.
#[derive(Clone, Debug, PartialEq)]
pub enum AnnotationValue {
    IntLiteral(i32),
    LongLiteral(i64),
    FloatLiteral(f32),
    DoubleLiteral(f64),
    StringLiteral(String),
    BooleanLiteral(bool),
    CharLiteral(char),
    ClassLiteral(String),
    EnumConstant { type_name: String, const_name: String },
    AnnotationLiteral(JavaAnnotation),
    ArrayLiteral(Vec<AnnotationValue>),
}

/// An enum constant recovered from the static initializer.
#[derive(Clone, Debug, PartialEq)]
pub struct EnumConstant {
    pub name: String,
    /// Constructor arguments after the synthetic name and ordinal.
    pub arguments: Vec<Expr>,
    /// Members of a constant with its own class body (`B { ... }`).
    pub body: Option<Box<JavaClass>>,
}

/// A Java class / interface / enum / annotation.
#[derive(Clone, Debug, PartialEq)]
pub struct JavaClass {
    pub kind: ClassKind,
    pub visibility: Visibility,
    pub is_final: bool,
    pub is_abstract: bool,
    pub is_static: bool,
    pub is_synthetic: bool,
    pub annotations: Vec<JavaAnnotation>,
    pub type_parameters: Vec<TypeParameter>,
    pub package: Option<String>,
    /// Internal name, e.g. `com/example/Outer$Inner`.
    pub internal_name: String,
    pub name: String,
    pub super_class: Option<JavaType>,
    pub interfaces: Vec<JavaType>,
    pub enum_constants: Vec<EnumConstant>,
    pub fields: Vec<JavaField>,
    pub methods: Vec<JavaMethod>,
    pub inner_classes: Vec<JavaClass>,
    pub source_file: Option<String>,
}

/// A method parameter declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct JavaParameter {
    pub annotations: Vec<JavaAnnotation>,
    pub param_type: JavaType,
    pub name: String,
    pub is_final: bool,
    pub is_varargs: bool,
}

/// Why a method body could not be reconstructed, and what to print instead.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodFailure {
    pub message: String,
    /// Source line covering the failing offset; 0 without a line table.
    pub line: u32,
    /// Bytecode offsets the line table attributes to `line`.
    pub offsets: Vec<u32>,
    /// Disassembly listing rendered as `//` comment lines.
    pub listing: String,
}

impl JavaClass {
    /// Nested classes followed by enum constant bodies.
    pub fn nested_classes(&self) -> impl Iterator<Item = &JavaClass> + '_ {
        let bodies = self.enum_constants.iter().filter_map(|c| c.body.as_deref());
        self.inner_classes.iter().chain(bodies)
    }

    pub fn nested_classes_mut(&mut self) -> impl Iterator<Item = &mut JavaClass> + '_ {
        let bodies = self.enum_constants.iter_mut().filter_map(|c| c.body.as_deref_mut());
        self.inner_classes.iter_mut().chain(bodies)
    }
}

impl MethodFailure {
    /// The diagnostic carried by the inline `assert false : "..."` marker.
    pub fn marker(&self) -> String {
        let offsets: Vec<String> = self.offsets.iter().map(|o| o.to_string()).collect();
        format!(
            "Decompilation failed at line #{} -> offsets [{}]",
            self.line,
            offsets.join(", ")
        )
    }
}

/// A Java method declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct JavaMethod {
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_final: bool,
    pub is_abstract: bool,
    pub is_synchronized: bool,
    pub is_native: bool,
    pub is_strict: bool,
    pub is_default: bool,
    pub is_synthetic: bool,
    pub is_bridge: bool,
    pub annotations: Vec<JavaAnnotation>,
    pub type_parameters: Vec<TypeParameter>,
    pub return_type: JavaType,
    pub name: String,
    pub descriptor: String,
    pub parameters: Vec<JavaParameter>,
    /// Leading descriptor parameters that are compiler-added (enum name/ordinal, outer instance).
    pub hidden_parameters: usize,
    pub throws: Vec<JavaType>,
    pub body: Option<StructuredBody>,
    /// If decompilation failed, this holds the error and bytecode fallback.
    pub failure: Option<MethodFailure>,
    /// Disassembly appended after the body when requested.
    pub listing: Option<String>,
}

impl JavaMethod {
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    pub fn is_static_init(&self) -> bool {
        self.name == "<clinit>"
    }
}

/// A Java field declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct JavaField {
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_final: bool,
    pub is_volatile: bool,
    pub is_transient: bool,
    pub is_synthetic: bool,
    pub is_enum_constant: bool,
    pub annotations: Vec<JavaAnnotation>,
    pub field_type: JavaType,
    pub descriptor: String,
    pub name: String,
    pub initializer: Option<Expr>,
}

/// A source file: package clause and its top-level type with nested types inside.
#[derive(Clone, Debug, PartialEq)]
pub struct CompilationUnit {
    pub package: Option<String>,
    pub class: JavaClass,
    /// Pool of every class in the unit by internal name, including the Fieldrefs
    /// appended for rewritten accessor calls.
    pub constant_pools: BTreeMap<String, ConstantPool>,
}
