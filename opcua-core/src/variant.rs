//! Variant value container
//!
//! A [`Variant`] is either empty or holds one fully typed value: a scalar
//! of one of the built-in types or a homogeneous array of them. Variants are
//! used for attribute values, method arguments and event fields alike.

use crate::error::{UaError, UaResult};
use crate::ids::data_types;
use crate::node_id::NodeId;
use crate::qualified_name::{LocalizedText, QualifiedName};
use crate::status_code::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Built-in scalar type of a variant value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariantType {
    Boolean,
    SByte,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
    String,
    DateTime,
    Guid,
    ByteString,
    NodeId,
    StatusCode,
    QualifiedName,
    LocalizedText,
}

impl VariantType {
    /// Numeric id of the namespace 0 DataType node for this type
    pub fn data_type_id(&self) -> u32 {
        match self {
            VariantType::Boolean => data_types::BOOLEAN,
            VariantType::SByte => data_types::SBYTE,
            VariantType::Byte => data_types::BYTE,
            VariantType::Int16 => data_types::INT16,
            VariantType::UInt16 => data_types::UINT16,
            VariantType::Int32 => data_types::INT32,
            VariantType::UInt32 => data_types::UINT32,
            VariantType::Int64 => data_types::INT64,
            VariantType::UInt64 => data_types::UINT64,
            VariantType::Float => data_types::FLOAT,
            VariantType::Double => data_types::DOUBLE,
            VariantType::String => data_types::STRING,
            VariantType::DateTime => data_types::DATE_TIME,
            VariantType::Guid => data_types::GUID,
            VariantType::ByteString => data_types::BYTE_STRING,
            VariantType::NodeId => data_types::NODE_ID,
            VariantType::StatusCode => data_types::STATUS_CODE,
            VariantType::QualifiedName => data_types::QUALIFIED_NAME,
            VariantType::LocalizedText => data_types::LOCALIZED_TEXT,
        }
    }

    /// Namespace 0 DataType node id for this type
    pub fn data_type(&self) -> NodeId {
        NodeId::ns0(self.data_type_id())
    }

    /// Look up the built-in type for a DataType node id
    pub fn from_data_type(data_type: &NodeId) -> Option<Self> {
        if data_type.namespace_index != 0 {
            return None;
        }
        let ty = match data_type.as_numeric()? {
            data_types::BOOLEAN => VariantType::Boolean,
            data_types::SBYTE => VariantType::SByte,
            data_types::BYTE => VariantType::Byte,
            data_types::INT16 => VariantType::Int16,
            data_types::UINT16 => VariantType::UInt16,
            data_types::INT32 => VariantType::Int32,
            data_types::UINT32 => VariantType::UInt32,
            data_types::INT64 => VariantType::Int64,
            data_types::UINT64 => VariantType::UInt64,
            data_types::FLOAT => VariantType::Float,
            data_types::DOUBLE => VariantType::Double,
            data_types::STRING => VariantType::String,
            data_types::DATE_TIME => VariantType::DateTime,
            data_types::GUID => VariantType::Guid,
            data_types::BYTE_STRING => VariantType::ByteString,
            data_types::NODE_ID => VariantType::NodeId,
            data_types::STATUS_CODE => VariantType::StatusCode,
            data_types::QUALIFIED_NAME => VariantType::QualifiedName,
            data_types::LOCALIZED_TEXT => VariantType::LocalizedText,
            _ => return None,
        };
        Some(ty)
    }

    /// Zero value of this type
    pub fn default_value(&self) -> Variant {
        match self {
            VariantType::Boolean => Variant::Boolean(false),
            VariantType::SByte => Variant::SByte(0),
            VariantType::Byte => Variant::Byte(0),
            VariantType::Int16 => Variant::Int16(0),
            VariantType::UInt16 => Variant::UInt16(0),
            VariantType::Int32 => Variant::Int32(0),
            VariantType::UInt32 => Variant::UInt32(0),
            VariantType::Int64 => Variant::Int64(0),
            VariantType::UInt64 => Variant::UInt64(0),
            VariantType::Float => Variant::Float(0.0),
            VariantType::Double => Variant::Double(0.0),
            VariantType::String => Variant::String(String::new()),
            VariantType::DateTime => Variant::DateTime(DateTime::<Utc>::UNIX_EPOCH),
            VariantType::Guid => Variant::Guid(Uuid::nil()),
            VariantType::ByteString => Variant::ByteString(Vec::new()),
            VariantType::NodeId => Variant::NodeId(Box::new(NodeId::null())),
            VariantType::StatusCode => Variant::StatusCode(StatusCode::GOOD),
            VariantType::QualifiedName => {
                Variant::QualifiedName(Box::new(QualifiedName::default()))
            }
            VariantType::LocalizedText => {
                Variant::LocalizedText(Box::new(LocalizedText::default()))
            }
        }
    }
}

/// Homogeneous array payload of a [`Variant`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantArray {
    pub element_type: VariantType,
    pub values: Vec<Variant>,
    pub dimensions: Option<Vec<u32>>,
}

/// Typed value container
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Variant {
    #[default]
    Empty,
    Boolean(bool),
    SByte(i8),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    String(String),
    DateTime(DateTime<Utc>),
    Guid(Uuid),
    ByteString(#[serde(with = "serde_bytes")] Vec<u8>),
    NodeId(Box<NodeId>),
    StatusCode(StatusCode),
    QualifiedName(Box<QualifiedName>),
    LocalizedText(Box<LocalizedText>),
    Array(Box<VariantArray>),
}

impl Variant {
    /// Create an array variant
    ///
    /// # Errors
    /// Returns `InvalidData` if any element is empty, an array itself, or of
    /// a different type than `element_type`
    pub fn new_array(element_type: VariantType, values: Vec<Variant>) -> UaResult<Self> {
        for (index, value) in values.iter().enumerate() {
            if value.scalar_type() != Some(element_type) {
                return Err(UaError::InvalidData(format!(
                    "Array element {} has type {:?}, expected {:?}",
                    index,
                    value.scalar_type(),
                    element_type
                )));
            }
        }
        Ok(Variant::Array(Box::new(VariantArray {
            element_type,
            values,
            dimensions: None,
        })))
    }

    /// Create a multi-dimensional array variant
    ///
    /// The product of `dimensions` must equal the number of values.
    pub fn new_matrix(
        element_type: VariantType,
        values: Vec<Variant>,
        dimensions: Vec<u32>,
    ) -> UaResult<Self> {
        let expected: u64 = dimensions.iter().map(|d| u64::from(*d)).product();
        if expected != values.len() as u64 {
            return Err(UaError::InvalidData(format!(
                "Dimensions {:?} do not match {} values",
                dimensions,
                values.len()
            )));
        }
        match Self::new_array(element_type, values)? {
            Variant::Array(mut array) => {
                array.dimensions = Some(dimensions);
                Ok(Variant::Array(array))
            }
            other => Ok(other),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Variant::Empty)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Variant::Array(_))
    }

    /// Type of a scalar value, `None` for empty values and arrays
    pub fn scalar_type(&self) -> Option<VariantType> {
        let ty = match self {
            Variant::Empty | Variant::Array(_) => return None,
            Variant::Boolean(_) => VariantType::Boolean,
            Variant::SByte(_) => VariantType::SByte,
            Variant::Byte(_) => VariantType::Byte,
            Variant::Int16(_) => VariantType::Int16,
            Variant::UInt16(_) => VariantType::UInt16,
            Variant::Int32(_) => VariantType::Int32,
            Variant::UInt32(_) => VariantType::UInt32,
            Variant::Int64(_) => VariantType::Int64,
            Variant::UInt64(_) => VariantType::UInt64,
            Variant::Float(_) => VariantType::Float,
            Variant::Double(_) => VariantType::Double,
            Variant::String(_) => VariantType::String,
            Variant::DateTime(_) => VariantType::DateTime,
            Variant::Guid(_) => VariantType::Guid,
            Variant::ByteString(_) => VariantType::ByteString,
            Variant::NodeId(_) => VariantType::NodeId,
            Variant::StatusCode(_) => VariantType::StatusCode,
            Variant::QualifiedName(_) => VariantType::QualifiedName,
            Variant::LocalizedText(_) => VariantType::LocalizedText,
        };
        Some(ty)
    }

    /// Type of the value, or of the elements for an array
    pub fn variant_type(&self) -> Option<VariantType> {
        match self {
            Variant::Array(array) => Some(array.element_type),
            other => other.scalar_type(),
        }
    }

    /// Namespace 0 DataType node id of the value (element type for arrays)
    pub fn data_type(&self) -> Option<NodeId> {
        self.variant_type().map(|ty| ty.data_type())
    }

    /// Value rank: -1 for scalars, number of dimensions for arrays
    pub fn value_rank(&self) -> i32 {
        match self {
            Variant::Array(array) => array
                .dimensions
                .as_ref()
                .map(|d| d.len() as i32)
                .unwrap_or(1),
            _ => -1,
        }
    }

    fn mismatch(&self, expected: &str) -> UaError {
        UaError::InvalidData(format!(
            "Expected {}, got {:?}",
            expected,
            self.variant_type()
        ))
    }

    pub fn as_bool(&self) -> UaResult<bool> {
        match self {
            Variant::Boolean(v) => Ok(*v),
            _ => Err(self.mismatch("Boolean")),
        }
    }

    pub fn as_u8(&self) -> UaResult<u8> {
        match self {
            Variant::Byte(v) => Ok(*v),
            _ => Err(self.mismatch("Byte")),
        }
    }

    pub fn as_i32(&self) -> UaResult<i32> {
        match self {
            Variant::Int32(v) => Ok(*v),
            _ => Err(self.mismatch("Int32")),
        }
    }

    pub fn as_u32(&self) -> UaResult<u32> {
        match self {
            Variant::UInt32(v) => Ok(*v),
            _ => Err(self.mismatch("UInt32")),
        }
    }

    pub fn as_i64(&self) -> UaResult<i64> {
        match self {
            Variant::Int64(v) => Ok(*v),
            _ => Err(self.mismatch("Int64")),
        }
    }

    pub fn as_u16(&self) -> UaResult<u16> {
        match self {
            Variant::UInt16(v) => Ok(*v),
            _ => Err(self.mismatch("UInt16")),
        }
    }

    pub fn as_f64(&self) -> UaResult<f64> {
        match self {
            Variant::Double(v) => Ok(*v),
            _ => Err(self.mismatch("Double")),
        }
    }

    pub fn as_str(&self) -> UaResult<&str> {
        match self {
            Variant::String(v) => Ok(v.as_str()),
            _ => Err(self.mismatch("String")),
        }
    }

    pub fn as_date_time(&self) -> UaResult<DateTime<Utc>> {
        match self {
            Variant::DateTime(v) => Ok(*v),
            _ => Err(self.mismatch("DateTime")),
        }
    }

    pub fn as_node_id(&self) -> UaResult<&NodeId> {
        match self {
            Variant::NodeId(v) => Ok(v),
            _ => Err(self.mismatch("NodeId")),
        }
    }

    pub fn as_qualified_name(&self) -> UaResult<&QualifiedName> {
        match self {
            Variant::QualifiedName(v) => Ok(v),
            _ => Err(self.mismatch("QualifiedName")),
        }
    }

    pub fn as_localized_text(&self) -> UaResult<&LocalizedText> {
        match self {
            Variant::LocalizedText(v) => Ok(v),
            _ => Err(self.mismatch("LocalizedText")),
        }
    }

    pub fn as_array(&self) -> UaResult<&VariantArray> {
        match self {
            Variant::Array(v) => Ok(v),
            _ => Err(self.mismatch("Array")),
        }
    }

    /// Widen any numeric scalar to `f64`
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Variant::SByte(v) => Some(f64::from(*v)),
            Variant::Byte(v) => Some(f64::from(*v)),
            Variant::Int16(v) => Some(f64::from(*v)),
            Variant::UInt16(v) => Some(f64::from(*v)),
            Variant::Int32(v) => Some(f64::from(*v)),
            Variant::UInt32(v) => Some(f64::from(*v)),
            Variant::Int64(v) => Some(*v as f64),
            Variant::UInt64(v) => Some(*v as f64),
            Variant::Float(v) => Some(f64::from(*v)),
            Variant::Double(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Empty => write!(f, "null"),
            Variant::Boolean(v) => write!(f, "{}", v),
            Variant::SByte(v) => write!(f, "{}", v),
            Variant::Byte(v) => write!(f, "{}", v),
            Variant::Int16(v) => write!(f, "{}", v),
            Variant::UInt16(v) => write!(f, "{}", v),
            Variant::Int32(v) => write!(f, "{}", v),
            Variant::UInt32(v) => write!(f, "{}", v),
            Variant::Int64(v) => write!(f, "{}", v),
            Variant::UInt64(v) => write!(f, "{}", v),
            Variant::Float(v) => write!(f, "{}", v),
            Variant::Double(v) => write!(f, "{}", v),
            Variant::String(v) => write!(f, "{}", v),
            Variant::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Variant::Guid(v) => write!(f, "{}", v),
            Variant::ByteString(v) => write!(f, "ByteString[{}]", v.len()),
            Variant::NodeId(v) => write!(f, "{}", v),
            Variant::StatusCode(v) => write!(f, "{}", v),
            Variant::QualifiedName(v) => write!(f, "{}", v),
            Variant::LocalizedText(v) => write!(f, "{}", v),
            Variant::Array(array) => {
                write!(f, "[")?;
                for (i, value) in array.values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Rust types that map to exactly one built-in variant type
///
/// Used by the typed variable helpers to pick the DataType and the initial
/// value of a new variable.
pub trait VariantValue: Into<Variant> + Default {
    const VARIANT_TYPE: VariantType;
}

macro_rules! impl_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Variant {
                fn from(value: $ty) -> Self {
                    Variant::$variant(value)
                }
            }

            impl VariantValue for $ty {
                const VARIANT_TYPE: VariantType = VariantType::$variant;
            }
        )*
    };
}

impl_scalar! {
    bool => Boolean,
    i8 => SByte,
    u8 => Byte,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float,
    f64 => Double,
    String => String,
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::String(value.to_string())
    }
}

impl From<DateTime<Utc>> for Variant {
    fn from(value: DateTime<Utc>) -> Self {
        Variant::DateTime(value)
    }
}

impl From<Uuid> for Variant {
    fn from(value: Uuid) -> Self {
        Variant::Guid(value)
    }
}

impl From<Vec<u8>> for Variant {
    fn from(value: Vec<u8>) -> Self {
        Variant::ByteString(value)
    }
}

impl From<NodeId> for Variant {
    fn from(value: NodeId) -> Self {
        Variant::NodeId(Box::new(value))
    }
}

impl From<StatusCode> for Variant {
    fn from(value: StatusCode) -> Self {
        Variant::StatusCode(value)
    }
}

impl From<QualifiedName> for Variant {
    fn from(value: QualifiedName) -> Self {
        Variant::QualifiedName(Box::new(value))
    }
}

impl From<LocalizedText> for Variant {
    fn from(value: LocalizedText) -> Self {
        Variant::LocalizedText(Box::new(value))
    }
}

impl<T: Into<Variant>> From<Option<T>> for Variant {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Variant::Empty)
    }
}

macro_rules! impl_try_from_variant {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl TryFrom<Variant> for $ty {
                type Error = UaError;

                fn try_from(value: Variant) -> Result<Self, Self::Error> {
                    match value {
                        Variant::$variant(v) => Ok(v),
                        other => Err(other.mismatch(stringify!($variant))),
                    }
                }
            }
        )*
    };
}

impl_try_from_variant! {
    bool => Boolean,
    u8 => Byte,
    i32 => Int32,
    u32 => UInt32,
    f64 => Double,
    String => String,
    DateTime<Utc> => DateTime,
    StatusCode => StatusCode,
}

macro_rules! impl_try_from_boxed {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl TryFrom<Variant> for $ty {
                type Error = UaError;

                fn try_from(value: Variant) -> Result<Self, Self::Error> {
                    match value {
                        Variant::$variant(v) => Ok(*v),
                        other => Err(other.mismatch(stringify!($variant))),
                    }
                }
            }
        )*
    };
}

impl_try_from_boxed! {
    NodeId => NodeId,
    QualifiedName => QualifiedName,
    LocalizedText => LocalizedText,
    VariantArray => Array,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_types() {
        assert_eq!(Variant::from(42i32).scalar_type(), Some(VariantType::Int32));
        assert_eq!(Variant::from(1.5f64).data_type(), Some(NodeId::ns0(11)));
        assert_eq!(Variant::from("text").variant_type(), Some(VariantType::String));
        assert_eq!(Variant::Empty.variant_type(), None);
        assert_eq!(Variant::from(3u8).value_rank(), -1);
    }

    #[test]
    fn test_new_array() {
        let array = Variant::new_array(
            VariantType::Int32,
            vec![Variant::from(1i32), Variant::from(2i32)],
        )
        .unwrap();
        assert!(array.is_array());
        assert_eq!(array.variant_type(), Some(VariantType::Int32));
        assert_eq!(array.value_rank(), 1);
        assert_eq!(array.to_string(), "[1, 2]");

        let mixed = Variant::new_array(
            VariantType::Int32,
            vec![Variant::from(1i32), Variant::from("x")],
        );
        assert!(mixed.is_err());
    }

    #[test]
    fn test_new_matrix() {
        let values = (0..6i32).map(Variant::from).collect::<Vec<Variant>>();
        let matrix = Variant::new_matrix(VariantType::Int32, values.clone(), vec![2, 3]).unwrap();
        assert_eq!(matrix.value_rank(), 2);
        assert!(Variant::new_matrix(VariantType::Int32, values, vec![4, 2]).is_err());
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Variant::from(7i32).as_i32().unwrap(), 7);
        assert!(Variant::from(7i32).as_f64().is_err());
        assert_eq!(Variant::from("abc").as_str().unwrap(), "abc");
        assert_eq!(Variant::from(7u16).to_f64(), Some(7.0));

        let name: QualifiedName = Variant::from(QualifiedName::new(1, "Pump")).try_into().unwrap();
        assert_eq!(name.name, "Pump");
        let wrong: Result<NodeId, _> = Variant::from(1i32).try_into();
        assert!(wrong.is_err());
    }

    #[test]
    fn test_default_values() {
        for ty in [VariantType::Boolean, VariantType::Double, VariantType::String] {
            let value = ty.default_value();
            assert_eq!(value.scalar_type(), Some(ty));
            assert_eq!(VariantType::from_data_type(&ty.data_type()), Some(ty));
        }
        assert_eq!(i32::VARIANT_TYPE, VariantType::Int32);
    }
}
