use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a node, fixing its legal attribute set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum NodeClass {
    Object = 1,
    Variable = 2,
    Method = 4,
    ObjectType = 8,
    VariableType = 16,
    ReferenceType = 32,
    DataType = 64,
    View = 128,
}

impl NodeClass {
    pub fn from_value(value: u32) -> Option<Self> {
        match value {
            1 => Some(NodeClass::Object),
            2 => Some(NodeClass::Variable),
            4 => Some(NodeClass::Method),
            8 => Some(NodeClass::ObjectType),
            16 => Some(NodeClass::VariableType),
            32 => Some(NodeClass::ReferenceType),
            64 => Some(NodeClass::DataType),
            128 => Some(NodeClass::View),
            _ => None,
        }
    }

    pub fn value(&self) -> u32 {
        *self as u32
    }

    /// Check if the class is one of the type classes
    #[must_use]
    pub const fn is_type(&self) -> bool {
        matches!(
            self,
            NodeClass::ObjectType
                | NodeClass::VariableType
                | NodeClass::ReferenceType
                | NodeClass::DataType
        )
    }
}

impl fmt::Display for NodeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeClass::Object => "Object",
            NodeClass::Variable => "Variable",
            NodeClass::Method => "Method",
            NodeClass::ObjectType => "ObjectType",
            NodeClass::VariableType => "VariableType",
            NodeClass::ReferenceType => "ReferenceType",
            NodeClass::DataType => "DataType",
            NodeClass::View => "View",
        };
        write!(f, "{}", name)
    }
}
