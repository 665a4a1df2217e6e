#[derive(Clone, Debug, PartialEq)]
pub enum ConstantInfo {
    Utf8(Utf8Constant),
    Integer(IntegerConstant),
    Float(FloatConstant),
    Long(LongConstant),
    Double(DoubleConstant),
    Class(ClassConstant),
    String(StringConstant),
    FieldRef(FieldRefConstant),
    MethodRef(MethodRefConstant),
    InterfaceMethodRef(InterfaceMethodRefConstant),
    NameAndType(NameAndTypeConstant),
    MethodHandle(MethodHandleConstant),
    MethodType(MethodTypeConstant),
    Dynamic(DynamicConstant),
    InvokeDynamic(InvokeDynamicConstant),
    Module(ModuleConstant),
    Package(PackageConstant),
    /// Second slot of a Long or Double entry.
    Unusable,
}

impl ConstantInfo {
    /// Human-readable kind, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ConstantInfo::Utf8(_) => "Utf8",
            ConstantInfo::Integer(_) => "Integer",
            ConstantInfo::Float(_) => "Float",
            ConstantInfo::Long(_) => "Long",
            ConstantInfo::Double(_) => "Double",
            ConstantInfo::Class(_) => "Class",
            ConstantInfo::String(_) => "String",
            ConstantInfo::FieldRef(_) => "Fieldref",
            ConstantInfo::MethodRef(_) => "Methodref",
            ConstantInfo::InterfaceMethodRef(_) => "InterfaceMethodref",
            ConstantInfo::NameAndType(_) => "NameAndType",
            ConstantInfo::MethodHandle(_) => "MethodHandle",
            ConstantInfo::MethodType(_) => "MethodType",
            ConstantInfo::Dynamic(_) => "Dynamic",
            ConstantInfo::InvokeDynamic(_) => "InvokeDynamic",
            ConstantInfo::Module(_) => "Module",
            ConstantInfo::Package(_) => "Package",
            ConstantInfo::Unusable => "unusable slot",
        }
    }

    /// Long and Double entries take two pool slots.
    pub fn is_wide(&self) -> bool {
        matches!(self, ConstantInfo::Long(_) | ConstantInfo::Double(_))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Utf8Constant {
    pub utf8_string: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntegerConstant {
    pub value: i32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FloatConstant {
    pub value: f32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LongConstant {
    pub value: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DoubleConstant {
    pub value: f64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassConstant {
    pub name_index: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StringConstant {
    pub string_index: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldRefConstant {
    pub class_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodRefConstant {
    pub class_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterfaceMethodRefConstant {
    pub class_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NameAndTypeConstant {
    pub name_index: u16,
    pub descriptor_index: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodHandleConstant {
    pub reference_kind: u8,
    pub reference_index: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodTypeConstant {
    pub descriptor_index: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DynamicConstant {
    pub bootstrap_method_attr_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvokeDynamicConstant {
    pub bootstrap_method_attr_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleConstant {
    pub name_index: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageConstant {
    pub name_index: u16,
}

/// Resolved view of a Fieldref/Methodref/InterfaceMethodref entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemberRef<'a> {
    pub class_name: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
    pub is_interface: bool,
}
