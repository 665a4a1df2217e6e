/// JVM type descriptor, method descriptor and generic signature parsing.
use super::java_ast::{JavaType, PrimitiveType, TypeParameter};

/// Represents a JVM type from a descriptor string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JvmType {
    Int,
    Long,
    Float,
    Double,
    Byte,
    Char,
    Short,
    Boolean,
    Void,
    Reference(String),
    Array(Box<JvmType>),
    Null,
    Unknown,
}

impl JvmType {
    pub fn object() -> Self {
        JvmType::Reference("java/lang/Object".into())
    }

    /// Returns true if this type occupies two slots on the JVM stack.
    pub fn is_wide(&self) -> bool {
        matches!(self, JvmType::Long | JvmType::Double)
    }

    /// Types the JVM computes with as `int`.
    pub fn is_int_like(&self) -> bool {
        matches!(
            self,
            JvmType::Int | JvmType::Byte | JvmType::Char | JvmType::Short | JvmType::Boolean
        )
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, JvmType::Reference(_) | JvmType::Array(_) | JvmType::Null)
    }

    /// Returns the JVM descriptor string for this type.
    pub fn to_descriptor(&self) -> String {
        match self {
            JvmType::Int => "I".into(),
            JvmType::Long => "J".into(),
            JvmType::Float => "F".into(),
            JvmType::Double => "D".into(),
            JvmType::Byte => "B".into(),
            JvmType::Char => "C".into(),
            JvmType::Short => "S".into(),
            JvmType::Boolean => "Z".into(),
            JvmType::Void => "V".into(),
            JvmType::Reference(name) => format!("L{};", name),
            JvmType::Array(inner) => format!("[{}", inner.to_descriptor()),
            JvmType::Null | JvmType::Unknown => "Ljava/lang/Object;".into(),
        }
    }

    /// Returns the simple (unqualified) name for display.
    pub fn simple_name(&self) -> String {
        match self {
            JvmType::Int => "int".into(),
            JvmType::Long => "long".into(),
            JvmType::Float => "float".into(),
            JvmType::Double => "double".into(),
            JvmType::Byte => "byte".into(),
            JvmType::Char => "char".into(),
            JvmType::Short => "short".into(),
            JvmType::Boolean => "boolean".into(),
            JvmType::Void => "void".into(),
            JvmType::Reference(name) => source_simple_name(name),
            JvmType::Array(inner) => format!("{}[]", inner.simple_name()),
            JvmType::Null | JvmType::Unknown => "Object".into(),
        }
    }

    /// Erased source-level type.
    pub fn to_java_type(&self) -> JavaType {
        match self {
            JvmType::Int => JavaType::Primitive(PrimitiveType::Int),
            JvmType::Long => JavaType::Primitive(PrimitiveType::Long),
            JvmType::Float => JavaType::Primitive(PrimitiveType::Float),
            JvmType::Double => JavaType::Primitive(PrimitiveType::Double),
            JvmType::Byte => JavaType::Primitive(PrimitiveType::Byte),
            JvmType::Char => JavaType::Primitive(PrimitiveType::Char),
            JvmType::Short => JavaType::Primitive(PrimitiveType::Short),
            JvmType::Boolean => JavaType::Primitive(PrimitiveType::Boolean),
            JvmType::Void => JavaType::Void,
            JvmType::Reference(name) => JavaType::class(name),
            JvmType::Array(inner) => JavaType::ArrayType(Box::new(inner.to_java_type())),
            JvmType::Null | JvmType::Unknown => JavaType::class("java/lang/Object"),
        }
    }
}

/// Parse a single type descriptor starting at position `pos` in `desc`.
/// Returns (JvmType, next_position).
pub fn parse_type_at(desc: &str, pos: usize) -> Option<(JvmType, usize)> {
    let bytes = desc.as_bytes();
    if pos >= bytes.len() {
        return None;
    }
    match bytes[pos] {
        b'B' => Some((JvmType::Byte, pos + 1)),
        b'C' => Some((JvmType::Char, pos + 1)),
        b'D' => Some((JvmType::Double, pos + 1)),
        b'F' => Some((JvmType::Float, pos + 1)),
        b'I' => Some((JvmType::Int, pos + 1)),
        b'J' => Some((JvmType::Long, pos + 1)),
        b'S' => Some((JvmType::Short, pos + 1)),
        b'Z' => Some((JvmType::Boolean, pos + 1)),
        b'V' => Some((JvmType::Void, pos + 1)),
        b'L' => {
            let semi = desc[pos + 1..].find(';')?;
            let class_name = &desc[pos + 1..pos + 1 + semi];
            Some((JvmType::Reference(class_name.to_string()), pos + 1 + semi + 1))
        }
        b'[' => {
            let (inner, next) = parse_type_at(desc, pos + 1)?;
            Some((JvmType::Array(Box::new(inner)), next))
        }
        _ => None,
    }
}

/// Parse a full type descriptor string.
pub fn parse_type_descriptor(desc: &str) -> Option<JvmType> {
    let (ty, _) = parse_type_at(desc, 0)?;
    Some(ty)
}

/// Parse a method descriptor, e.g. "(II)V" -> ([Int, Int], Void)
pub fn parse_method_descriptor(desc: &str) -> Option<(Vec<JvmType>, JvmType)> {
    if !desc.starts_with('(') {
        return None;
    }
    let close = desc.find(')')?;
    let mut params = Vec::new();
    let mut pos = 1;
    while pos < close {
        let (ty, next) = parse_type_at(desc, pos)?;
        params.push(ty);
        pos = next;
    }
    let (ret, _) = parse_type_at(desc, close + 1)?;
    Some((params, ret))
}

/// Type named by a Class constant: array classes are given as descriptors.
pub fn class_constant_type(name: &str) -> JvmType {
    if name.starts_with('[') {
        parse_type_descriptor(name).unwrap_or(JvmType::Unknown)
    } else {
        JvmType::Reference(name.to_string())
    }
}

/// Convert internal class name to source name.
pub fn internal_to_source_name(name: &str) -> String {
    name.replace('/', ".")
}

/// Get just the simple class name from an internal name.
pub fn simple_class_name(name: &str) -> &str {
    match name.rfind('/') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

/// Simple name as written in source: `Outer$Inner` becomes `Outer.Inner`.
/// Anonymous (`Outer$1`) suffixes are left alone.
pub fn source_simple_name(name: &str) -> String {
    let simple = simple_class_name(name);
    let mut out = String::with_capacity(simple.len());
    for (i, part) in simple.split('$').enumerate() {
        if i > 0 {
            let anonymous = part.chars().next().map_or(true, |c| c.is_ascii_digit());
            out.push(if anonymous { '$' } else { '.' });
        }
        out.push_str(part);
    }
    out
}

/// Get the package from an internal name.
pub fn package_name(name: &str) -> Option<&str> {
    match name.rfind('/') {
        Some(pos) => Some(&name[..pos]),
        None => None,
    }
}

/// Convert a newarray type code to JvmType.
pub fn newarray_type(atype: u8) -> JvmType {
    match atype {
        4 => JvmType::Boolean,
        5 => JvmType::Char,
        6 => JvmType::Float,
        7 => JvmType::Double,
        8 => JvmType::Byte,
        9 => JvmType::Short,
        10 => JvmType::Int,
        11 => JvmType::Long,
        _ => JvmType::Unknown,
    }
}

// ====================================================================
// Generic signatures
// ====================================================================

/// Parsed `Signature` attribute of a class.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassSignature {
    pub type_parameters: Vec<TypeParameter>,
    pub super_class: JavaType,
    pub interfaces: Vec<JavaType>,
}

/// Parsed `Signature` attribute of a method.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodSignature {
    pub type_parameters: Vec<TypeParameter>,
    pub parameters: Vec<JavaType>,
    pub return_type: JavaType,
    pub throws: Vec<JavaType>,
}

struct SignatureReader<'a> {
    bytes: &'a [u8],
    src: &'a str,
    pos: usize,
}

impl<'a> SignatureReader<'a> {
    fn new(src: &'a str) -> Self {
        SignatureReader { bytes: src.as_bytes(), src, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn expect(&mut self, b: u8) -> Option<()> {
        if self.peek()? == b {
            self.pos += 1;
            Some(())
        } else {
            None
        }
    }

    fn identifier(&mut self, stops: &[u8]) -> Option<&'a str> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if stops.contains(&b) {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            None
        } else {
            Some(&self.src[start..self.pos])
        }
    }

    fn type_parameters(&mut self) -> Option<Vec<TypeParameter>> {
        let mut params = Vec::new();
        if self.peek() != Some(b'<') {
            return Some(params);
        }
        self.pos += 1;
        while self.peek()? != b'>' {
            let name = self.identifier(b":")?.to_string();
            let mut bounds = Vec::new();
            while self.peek() == Some(b':') {
                self.pos += 1;
                if matches!(self.peek()?, b'L' | b'T' | b'[') {
                    bounds.push(self.reference_type()?);
                }
            }
            bounds.retain(|b| !b.is_object());
            params.push(TypeParameter { name, bounds });
        }
        self.pos += 1;
        Some(params)
    }

    fn java_type(&mut self) -> Option<JavaType> {
        let prim = match self.peek()? {
            b'B' => PrimitiveType::Byte,
            b'C' => PrimitiveType::Char,
            b'D' => PrimitiveType::Double,
            b'F' => PrimitiveType::Float,
            b'I' => PrimitiveType::Int,
            b'J' => PrimitiveType::Long,
            b'S' => PrimitiveType::Short,
            b'Z' => PrimitiveType::Boolean,
            b'V' => {
                self.pos += 1;
                return Some(JavaType::Void);
            }
            _ => return self.reference_type(),
        };
        self.pos += 1;
        Some(JavaType::Primitive(prim))
    }

    fn reference_type(&mut self) -> Option<JavaType> {
        match self.peek()? {
            b'L' => self.class_type(),
            b'T' => {
                self.pos += 1;
                let name = self.identifier(b";")?.to_string();
                self.expect(b';')?;
                Some(JavaType::TypeVariable(name))
            }
            b'[' => {
                self.pos += 1;
                Some(JavaType::ArrayType(Box::new(self.java_type()?)))
            }
            _ => None,
        }
    }

    fn class_type(&mut self) -> Option<JavaType> {
        self.expect(b'L')?;
        let mut internal = self.identifier(b"<.;")?.to_string();
        let mut type_args = self.type_arguments()?;
        let mut outer_display: Option<String> = None;
        while self.peek() == Some(b'.') {
            self.pos += 1;
            let inner = self.identifier(b"<.;")?;
            let outer = JavaType::ClassType {
                package: None,
                name: source_simple_name(&internal),
                type_args: std::mem::take(&mut type_args),
            };
            outer_display = Some(outer.display_name());
            internal = format!("{}${}", internal, inner);
            type_args = self.type_arguments()?;
        }
        self.expect(b';')?;
        let mut ty = JavaType::class(&internal);
        if let JavaType::ClassType { name, type_args: args, .. } = &mut ty {
            if let Some(outer) = outer_display {
                let last = internal.rsplit('$').next().unwrap_or(&internal);
                *name = format!("{}.{}", outer, last);
            }
            *args = type_args;
        }
        Some(ty)
    }

    fn type_arguments(&mut self) -> Option<Vec<JavaType>> {
        let mut args = Vec::new();
        if self.peek() != Some(b'<') {
            return Some(args);
        }
        self.pos += 1;
        while self.peek()? != b'>' {
            let arg = match self.peek()? {
                b'*' => {
                    self.pos += 1;
                    JavaType::WildcardType { bound: None, is_upper: true }
                }
                b'+' => {
                    self.pos += 1;
                    JavaType::WildcardType {
                        bound: Some(Box::new(self.reference_type()?)),
                        is_upper: true,
                    }
                }
                b'-' => {
                    self.pos += 1;
                    JavaType::WildcardType {
                        bound: Some(Box::new(self.reference_type()?)),
                        is_upper: false,
                    }
                }
                _ => self.reference_type()?,
            };
            args.push(arg);
        }
        self.pos += 1;
        Some(args)
    }

    fn at_end(&self) -> bool {
        self.pos == self.bytes.len()
    }
}

/// Parses a field or local variable signature such as `Ljava/util/List<TT;>;`.
pub fn parse_field_signature(sig: &str) -> Option<JavaType> {
    let mut reader = SignatureReader::new(sig);
    let ty = reader.java_type()?;
    reader.at_end().then_some(ty)
}

pub fn parse_class_signature(sig: &str) -> Option<ClassSignature> {
    let mut reader = SignatureReader::new(sig);
    let type_parameters = reader.type_parameters()?;
    let super_class = reader.class_type()?;
    let mut interfaces = Vec::new();
    while !reader.at_end() {
        interfaces.push(reader.class_type()?);
    }
    Some(ClassSignature { type_parameters, super_class, interfaces })
}

pub fn parse_method_signature(sig: &str) -> Option<MethodSignature> {
    let mut reader = SignatureReader::new(sig);
    let type_parameters = reader.type_parameters()?;
    reader.expect(b'(')?;
    let mut parameters = Vec::new();
    while reader.peek()? != b')' {
        parameters.push(reader.java_type()?);
    }
    reader.pos += 1;
    let return_type = reader.java_type()?;
    let mut throws = Vec::new();
    while reader.peek() == Some(b'^') {
        reader.pos += 1;
        throws.push(reader.reference_type()?);
    }
    reader.at_end().then_some(MethodSignature {
        type_parameters,
        parameters,
        return_type,
        throws,
    })
}
