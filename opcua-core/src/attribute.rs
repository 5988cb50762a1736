//! Attribute catalogue
//!
//! Numeric attribute identifiers plus the bit masks stored in the
//! AccessLevel and WriteMask attributes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Attribute identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum AttributeId {
    NodeId = 1,
    NodeClass = 2,
    BrowseName = 3,
    DisplayName = 4,
    Description = 5,
    WriteMask = 6,
    UserWriteMask = 7,
    IsAbstract = 8,
    Symmetric = 9,
    InverseName = 10,
    ContainsNoLoops = 11,
    EventNotifier = 12,
    Value = 13,
    DataType = 14,
    ValueRank = 15,
    ArrayDimensions = 16,
    AccessLevel = 17,
    UserAccessLevel = 18,
    MinimumSamplingInterval = 19,
    Historizing = 20,
    Executable = 21,
    UserExecutable = 22,
}

impl AttributeId {
    pub fn from_value(value: u32) -> Option<Self> {
        use AttributeId::*;
        let id = match value {
            1 => NodeId,
            2 => NodeClass,
            3 => BrowseName,
            4 => DisplayName,
            5 => Description,
            6 => WriteMask,
            7 => UserWriteMask,
            8 => IsAbstract,
            9 => Symmetric,
            10 => InverseName,
            11 => ContainsNoLoops,
            12 => EventNotifier,
            13 => Value,
            14 => DataType,
            15 => ValueRank,
            16 => ArrayDimensions,
            17 => AccessLevel,
            18 => UserAccessLevel,
            19 => MinimumSamplingInterval,
            20 => Historizing,
            21 => Executable,
            22 => UserExecutable,
            _ => return None,
        };
        Some(id)
    }

    pub fn value(&self) -> u32 {
        *self as u32
    }

    /// WriteMask bit guarding writes of this attribute, if any
    ///
    /// The Value attribute of variables is guarded by AccessLevel instead.
    pub fn write_mask_bit(&self) -> Option<u32> {
        use AttributeId::*;
        let bit = match self {
            AccessLevel => write_mask::ACCESS_LEVEL,
            ArrayDimensions => write_mask::ARRAY_DIMENSIONS,
            BrowseName => write_mask::BROWSE_NAME,
            ContainsNoLoops => write_mask::CONTAINS_NO_LOOPS,
            DataType => write_mask::DATA_TYPE,
            Description => write_mask::DESCRIPTION,
            DisplayName => write_mask::DISPLAY_NAME,
            EventNotifier => write_mask::EVENT_NOTIFIER,
            Executable => write_mask::EXECUTABLE,
            Historizing => write_mask::HISTORIZING,
            InverseName => write_mask::INVERSE_NAME,
            IsAbstract => write_mask::IS_ABSTRACT,
            MinimumSamplingInterval => write_mask::MINIMUM_SAMPLING_INTERVAL,
            Symmetric => write_mask::SYMMETRIC,
            ValueRank => write_mask::VALUE_RANK,
            WriteMask => write_mask::WRITE_MASK,
            _ => return None,
        };
        Some(bit)
    }
}

impl fmt::Display for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Bits of the AccessLevel / UserAccessLevel attributes
pub mod access_level {
    pub const CURRENT_READ: u8 = 0x01;
    pub const CURRENT_WRITE: u8 = 0x02;
    pub const HISTORY_READ: u8 = 0x04;
    pub const HISTORY_WRITE: u8 = 0x08;
    pub const SEMANTIC_CHANGE: u8 = 0x10;
    pub const STATUS_WRITE: u8 = 0x20;
    pub const TIMESTAMP_WRITE: u8 = 0x40;
}

/// Bits of the WriteMask / UserWriteMask attributes
pub mod write_mask {
    pub const ACCESS_LEVEL: u32 = 1 << 0;
    pub const ARRAY_DIMENSIONS: u32 = 1 << 1;
    pub const BROWSE_NAME: u32 = 1 << 2;
    pub const CONTAINS_NO_LOOPS: u32 = 1 << 3;
    pub const DATA_TYPE: u32 = 1 << 4;
    pub const DESCRIPTION: u32 = 1 << 5;
    pub const DISPLAY_NAME: u32 = 1 << 6;
    pub const EVENT_NOTIFIER: u32 = 1 << 7;
    pub const EXECUTABLE: u32 = 1 << 8;
    pub const HISTORIZING: u32 = 1 << 9;
    pub const INVERSE_NAME: u32 = 1 << 10;
    pub const IS_ABSTRACT: u32 = 1 << 11;
    pub const MINIMUM_SAMPLING_INTERVAL: u32 = 1 << 12;
    pub const NODE_CLASS: u32 = 1 << 13;
    pub const NODE_ID: u32 = 1 << 14;
    pub const SYMMETRIC: u32 = 1 << 15;
    pub const USER_ACCESS_LEVEL: u32 = 1 << 16;
    pub const USER_EXECUTABLE: u32 = 1 << 17;
    pub const USER_WRITE_MASK: u32 = 1 << 18;
    pub const VALUE_RANK: u32 = 1 << 19;
    pub const WRITE_MASK: u32 = 1 << 20;
    pub const VALUE_FOR_VARIABLE_TYPE: u32 = 1 << 21;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_value() {
        assert_eq!(AttributeId::from_value(13), Some(AttributeId::Value));
        assert_eq!(AttributeId::from_value(0), None);
        assert_eq!(AttributeId::from_value(23), None);
        assert_eq!(AttributeId::AccessLevel.value(), 17);
    }

    #[test]
    fn test_write_mask_bit() {
        assert_eq!(
            AttributeId::DisplayName.write_mask_bit(),
            Some(write_mask::DISPLAY_NAME)
        );
        assert_eq!(AttributeId::Value.write_mask_bit(), None);
        assert_eq!(AttributeId::NodeId.write_mask_bit(), None);
    }
}
