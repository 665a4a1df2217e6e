use crate::code_attribute::{LocalVariableTableAttribute, LocalVariableTypeTableAttribute};

#[derive(Clone, Debug, PartialEq)]
pub struct AttributeInfo {
    pub attribute_name_index: u16,
    pub attribute_length: u32,
    pub info: Vec<u8>,
    /// Filled in by the interpretation pass for attributes this crate understands.
    pub info_parsed: Option<AttributeInfoVariant>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AttributeInfoVariant {
    Code(CodeAttribute),
    LineNumberTable(LineNumberTableAttribute),
    LocalVariableTable(LocalVariableTableAttribute),
    LocalVariableTypeTable(LocalVariableTypeTableAttribute),
    Signature(SignatureAttribute),
    SourceFile(SourceFileAttribute),
    InnerClasses(InnerClassesAttribute),
    EnclosingMethod(EnclosingMethodAttribute),
    Exceptions(ExceptionsAttribute),
    ConstantValue(ConstantValueAttribute),
    RuntimeVisibleAnnotations(RuntimeVisibleAnnotationsAttribute),
    RuntimeInvisibleAnnotations(RuntimeInvisibleAnnotationsAttribute),
    MethodParameters(MethodParametersAttribute),
    BootstrapMethods(BootstrapMethodsAttribute),
    Synthetic(SyntheticAttribute),
    Deprecated(DeprecatedAttribute),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Zero for `finally` / catch-any handlers.
    pub catch_type: u16,
}

impl ExceptionEntry {
    pub fn covers(&self, pc: u32) -> bool {
        pc >= self.start_pc as u32 && pc < self.end_pc as u32
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code_length: u32,
    pub code: Vec<u8>,
    pub exception_table_length: u16,
    pub exception_table: Vec<ExceptionEntry>,
    pub attributes_count: u16,
    pub attributes: Vec<AttributeInfo>,
}

impl CodeAttribute {
    pub fn line_number_table(&self) -> Option<&LineNumberTableAttribute> {
        self.attributes.iter().find_map(|a| match &a.info_parsed {
            Some(AttributeInfoVariant::LineNumberTable(t)) => Some(t),
            _ => None,
        })
    }

    pub fn local_variable_table(&self) -> Option<&LocalVariableTableAttribute> {
        self.attributes.iter().find_map(|a| match &a.info_parsed {
            Some(AttributeInfoVariant::LocalVariableTable(t)) => Some(t),
            _ => None,
        })
    }

    pub fn local_variable_type_table(&self) -> Option<&LocalVariableTypeTableAttribute> {
        self.attributes.iter().find_map(|a| match &a.info_parsed {
            Some(AttributeInfoVariant::LocalVariableTypeTable(t)) => Some(t),
            _ => None,
        })
    }

    /// Source line of the instruction at `pc`: the entry with the greatest start_pc not past it.
    pub fn line_for_offset(&self, pc: u32) -> Option<u16> {
        self.line_number_table()?
            .line_number_table
            .iter()
            .filter(|e| e.start_pc as u32 <= pc)
            .max_by_key(|e| e.start_pc)
            .map(|e| e.line_number)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineNumberTableAttribute {
    pub line_number_table_length: u16,
    pub line_number_table: Vec<LineNumberTableEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineNumberTableEntry {
    pub start_pc: u16,
    pub line_number: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodParametersAttribute {
    pub parameters_count: u8,
    pub parameters: Vec<ParameterAttribute>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParameterAttribute {
    pub name_index: u16,
    pub access_flags: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InnerClassesAttribute {
    pub number_of_classes: u16,
    pub classes: Vec<InnerClassInfo>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InnerClassInfo {
    pub inner_class_info_index: u16,
    pub outer_class_info_index: u16,
    pub inner_name_index: u16,
    pub inner_class_access_flags: InnerClassAccessFlags,
}

bitflags! {
    #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
    pub struct InnerClassAccessFlags: u16 {
        const PUBLIC = 0x0001;     //	Declared public; may be accessed from outside its package.
        const PRIVATE = 0x0002;    //	Declared private; may not be accessed from outside its package.
        const PROTECTED = 0x0004;  //	Declared protected; may only be accessed within children.
        const STATIC = 0x0008;     //	Declared static.
        const FINAL = 0x0010;      //	Declared final; no subclasses allowed.
        const INTERFACE = 0x0200;  //	Is an interface, not a class.
        const ABSTRACT = 0x0400;   //	Declared abstract; must not be instantiated.
        const SYNTHETIC = 0x1000;  //	Declared synthetic; not present in the source code.
        const ANNOTATION = 0x2000; //	Declared as an annotation type.
        const ENUM = 0x4000;       //	Declared as an enum type.
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnclosingMethodAttribute {
    pub class_index: u16,
    pub method_index: u16,
}

// Marker attributes, zero sized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntheticAttribute {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeprecatedAttribute {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureAttribute {
    pub signature_index: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeVisibleAnnotationsAttribute {
    pub num_annotations: u16,
    pub annotations: Vec<RuntimeAnnotation>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeInvisibleAnnotationsAttribute {
    pub num_annotations: u16,
    pub annotations: Vec<RuntimeAnnotation>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeAnnotation {
    pub type_index: u16,
    pub num_element_value_pairs: u16,
    pub element_value_pairs: Vec<ElementValuePair>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementValuePair {
    pub element_name_index: u16,
    pub value: ElementValue,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ElementValue {
    ConstValueIndex { tag: char, value: u16 },
    EnumConst(EnumConstValue),
    ClassInfoIndex(u16),
    AnnotationValue(RuntimeAnnotation),
    ElementArray(ElementArrayValue),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementArrayValue {
    pub num_values: u16,
    pub values: Vec<ElementValue>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumConstValue {
    pub type_name_index: u16,
    pub const_name_index: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionsAttribute {
    pub exception_table_length: u16,
    pub exception_table: Vec<u16>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstantValueAttribute {
    pub constant_value_index: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootstrapMethod {
    pub bootstrap_method_ref: u16,
    pub num_bootstrap_arguments: u16,
    pub bootstrap_arguments: Vec<u16>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootstrapMethodsAttribute {
    pub num_bootstrap_methods: u16,
    pub bootstrap_methods: Vec<BootstrapMethod>,
}

/// The SourceFile attribute names the source file the class was compiled from.
///
/// There may be at most one SourceFile attribute in the attributes table of a ClassFile structure.
/// [see more](https://docs.oracle.com/javase/specs/jvms/se8/html/jvms-4.html#jvms-4.7.10)
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SourceFileAttribute {
    pub sourcefile_index: u16,
}
