//! Candidate sets for int-computed primitive values.
//!
//! The JVM computes `boolean`, `byte`, `char` and `short` values as `int`, so a literal such as
//! `1` could be any of them. Each value carries the set of kinds it may still be; consuming
//! contexts intersect the set until one kind remains.

use super::descriptor::JvmType;

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct PrimitiveFlags(u8);

bitflags! {
    impl PrimitiveFlags: u8 {
        const BOOLEAN = 0x01;
        const BYTE = 0x02;
        const CHAR = 0x04;
        const SHORT = 0x08;
        const INT = 0x10;

        const MAYBE_BOOLEAN = Self::BOOLEAN.bits() | Self::BYTE.bits() | Self::CHAR.bits()
            | Self::SHORT.bits() | Self::INT.bits();
        const MAYBE_BYTE = Self::BYTE.bits() | Self::CHAR.bits() | Self::SHORT.bits()
            | Self::INT.bits();
        const MAYBE_SHORT = Self::CHAR.bits() | Self::SHORT.bits() | Self::INT.bits();
        const MAYBE_CHAR = Self::CHAR.bits() | Self::INT.bits();
        const MAYBE_NEGATIVE_BYTE = Self::BYTE.bits() | Self::SHORT.bits() | Self::INT.bits();
        const MAYBE_NEGATIVE_SHORT = Self::SHORT.bits() | Self::INT.bits();
    }
}

impl PrimitiveFlags {
    /// Kinds an `int` constant with this value can be read as.
    pub fn for_value(value: i32) -> Self {
        match value {
            0..=1 => PrimitiveFlags::MAYBE_BOOLEAN,
            2..=127 => PrimitiveFlags::MAYBE_BYTE,
            128..=32767 => PrimitiveFlags::MAYBE_SHORT,
            32768..=65535 => PrimitiveFlags::MAYBE_CHAR,
            -128..=-1 => PrimitiveFlags::MAYBE_NEGATIVE_BYTE,
            -32768..=-129 => PrimitiveFlags::MAYBE_NEGATIVE_SHORT,
            _ => PrimitiveFlags::INT,
        }
    }

    /// The single kind of a declared type; empty for non int-computed types.
    pub fn of_type(ty: &JvmType) -> Self {
        match ty {
            JvmType::Boolean => PrimitiveFlags::BOOLEAN,
            JvmType::Byte => PrimitiveFlags::BYTE,
            JvmType::Char => PrimitiveFlags::CHAR,
            JvmType::Short => PrimitiveFlags::SHORT,
            JvmType::Int => PrimitiveFlags::INT,
            _ => PrimitiveFlags::empty(),
        }
    }

    /// Kinds whose values can be stored into a slot of this kind without a cast.
    pub fn assignable_to(self) -> Self {
        let mut out = PrimitiveFlags::empty();
        if self.contains(PrimitiveFlags::BOOLEAN) {
            out |= PrimitiveFlags::BOOLEAN;
        }
        if self.contains(PrimitiveFlags::BYTE) {
            out |= PrimitiveFlags::BYTE;
        }
        if self.contains(PrimitiveFlags::CHAR) {
            out |= PrimitiveFlags::CHAR;
        }
        if self.contains(PrimitiveFlags::SHORT) {
            out |= PrimitiveFlags::SHORT | PrimitiveFlags::BYTE;
        }
        if self.contains(PrimitiveFlags::INT) {
            out |= PrimitiveFlags::INT
                | PrimitiveFlags::SHORT
                | PrimitiveFlags::BYTE
                | PrimitiveFlags::CHAR;
        }
        out
    }

    /// Intersects with `other`; an empty result leaves `self` unchanged.
    pub fn narrow(self, other: PrimitiveFlags) -> Self {
        let both = self & other;
        if both.is_empty() {
            self
        } else {
            both
        }
    }

    /// `int` when still possible, otherwise the widest remaining kind.
    pub fn canonical(self) -> JvmType {
        if self.contains(PrimitiveFlags::INT) || self.is_empty() {
            JvmType::Int
        } else if self.contains(PrimitiveFlags::CHAR) {
            JvmType::Char
        } else if self.contains(PrimitiveFlags::SHORT) {
            JvmType::Short
        } else if self.contains(PrimitiveFlags::BYTE) {
            JvmType::Byte
        } else {
            JvmType::Boolean
        }
    }

    pub fn is_boolean(self) -> bool {
        self == PrimitiveFlags::BOOLEAN
    }
}
