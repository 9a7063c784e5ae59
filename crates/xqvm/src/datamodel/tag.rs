use crate::error::{Error, Result};

/// First byte of every encoded value.
///
/// The numbering is part of the wire format and never changes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueTag {
    String = 4,
    UntypedAtomic = 14,
    DateTime = 15,
    Date = 16,
    Time = 17,
    Duration = 18,
    YearMonthDuration = 19,
    DayTimeDuration = 20,
    Float = 22,
    Double = 23,
    Decimal = 24,
    Integer = 25,
    NonPositiveInteger = 26,
    NegativeInteger = 27,
    Long = 28,
    Int = 29,
    Short = 30,
    Byte = 31,
    NonNegativeInteger = 32,
    UnsignedLong = 33,
    UnsignedInt = 34,
    UnsignedShort = 35,
    UnsignedByte = 36,
    PositiveInteger = 37,
    Boolean = 43,
    AnyUri = 46,
    QName = 47,
    Null = 53,
    Sequence = 100,
    Document = 101,
    Element = 102,
    Attribute = 103,
    Text = 104,
    Comment = 105,
    ProcessingInstruction = 106,
    NodeTree = 107,
    Array = 108,
    Object = 109,
}

impl TryFrom<u8> for ValueTag {
    type Error = Error;

    fn try_from(b: u8) -> Result<Self> {
        use ValueTag as T;
        Ok(match b {
            4 => T::String,
            14 => T::UntypedAtomic,
            15 => T::DateTime,
            16 => T::Date,
            17 => T::Time,
            18 => T::Duration,
            19 => T::YearMonthDuration,
            20 => T::DayTimeDuration,
            22 => T::Float,
            23 => T::Double,
            24 => T::Decimal,
            25 => T::Integer,
            26 => T::NonPositiveInteger,
            27 => T::NegativeInteger,
            28 => T::Long,
            29 => T::Int,
            30 => T::Short,
            31 => T::Byte,
            32 => T::NonNegativeInteger,
            33 => T::UnsignedLong,
            34 => T::UnsignedInt,
            35 => T::UnsignedShort,
            36 => T::UnsignedByte,
            37 => T::PositiveInteger,
            43 => T::Boolean,
            46 => T::AnyUri,
            47 => T::QName,
            53 => T::Null,
            100 => T::Sequence,
            101 => T::Document,
            102 => T::Element,
            103 => T::Attribute,
            104 => T::Text,
            105 => T::Comment,
            106 => T::ProcessingInstruction,
            107 => T::NodeTree,
            108 => T::Array,
            109 => T::Object,
            other => return Err(Error::system(format!("unknown value tag {other}"))),
        })
    }
}

impl ValueTag {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn is_atomic(self) -> bool {
        (self as u8) < 100
    }

    /// Bare node kinds. `NodeTree` is a container, not a node kind.
    pub const fn is_node(self) -> bool {
        matches!(
            self,
            ValueTag::Document
                | ValueTag::Element
                | ValueTag::Attribute
                | ValueTag::Text
                | ValueTag::Comment
                | ValueTag::ProcessingInstruction
        )
    }

    pub const fn is_integer(self) -> bool {
        self.integer_width().is_some()
    }

    /// Encoded width in bytes of an integer-family tag.
    pub const fn integer_width(self) -> Option<usize> {
        use ValueTag as T;
        match self {
            T::Integer
            | T::NonPositiveInteger
            | T::NegativeInteger
            | T::Long
            | T::NonNegativeInteger
            | T::UnsignedLong
            | T::PositiveInteger
            | T::UnsignedInt => Some(8),
            T::Int | T::UnsignedShort => Some(4),
            T::Short | T::UnsignedByte => Some(2),
            T::Byte => Some(1),
            _ => None,
        }
    }

    pub const fn is_numeric(self) -> bool {
        self.is_integer() || matches!(self, ValueTag::Decimal | ValueTag::Float | ValueTag::Double)
    }

    /// Tags whose body is a single length-prefixed string.
    pub const fn is_string_like(self) -> bool {
        matches!(self, ValueTag::String | ValueTag::UntypedAtomic | ValueTag::AnyUri)
    }

    /// Body length for tags whose size does not depend on content.
    pub const fn fixed_body_len(self) -> Option<usize> {
        use ValueTag as T;
        match self {
            T::DateTime => Some(12),
            T::Date => Some(6),
            T::Time => Some(8),
            T::Duration => Some(12),
            T::YearMonthDuration => Some(4),
            T::DayTimeDuration => Some(8),
            T::Float => Some(4),
            T::Double => Some(8),
            T::Decimal => Some(9),
            T::Boolean => Some(1),
            T::Null => Some(0),
            _ => self.integer_width(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn every_code_roundtrips() {
        let mut known = 0;
        for b in 0..=u8::MAX {
            if let Ok(tag) = ValueTag::try_from(b) {
                assert_eq!(tag.code(), b);
                known += 1;
            }
        }
        assert_eq!(known, 38);
    }

    #[rstest]
    #[case(ValueTag::Integer, Some(8))]
    #[case(ValueTag::Int, Some(4))]
    #[case(ValueTag::UnsignedByte, Some(2))]
    #[case(ValueTag::Byte, Some(1))]
    #[case(ValueTag::Double, None)]
    fn integer_widths(#[case] tag: ValueTag, #[case] width: Option<usize>) {
        assert_eq!(tag.integer_width(), width);
    }
}
