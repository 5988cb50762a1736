//! Node records and per-class attribute bundles

use crate::context::NodeContext;
use opcua_core::{
    access_level, AttributeId, DataValue, LocalizedText, NodeClass, NodeId, QualifiedName,
    StatusCode, UaError, UaResult, Variant, VariantType,
};
use std::fmt;
use std::sync::Arc;

/// Attributes of a new Object node
#[derive(Debug, Clone, Default)]
pub struct ObjectAttributes {
    pub display_name: Option<LocalizedText>,
    pub description: LocalizedText,
    pub write_mask: u32,
    pub event_notifier: u8,
}

/// Attributes of a new Variable node
#[derive(Debug, Clone)]
pub struct VariableAttributes {
    pub display_name: Option<LocalizedText>,
    pub description: LocalizedText,
    pub write_mask: u32,
    pub value: Variant,
    pub data_type: NodeId,
    pub value_rank: i32,
    pub array_dimensions: Vec<u32>,
    pub access_level: u8,
    pub minimum_sampling_interval: f64,
    pub historizing: bool,
}

impl Default for VariableAttributes {
    fn default() -> Self {
        Self {
            display_name: None,
            description: LocalizedText::default(),
            write_mask: 0,
            value: Variant::Empty,
            data_type: opcua_core::ids::base_data_type(),
            value_rank: -2,
            array_dimensions: Vec::new(),
            access_level: access_level::CURRENT_READ,
            minimum_sampling_interval: 0.0,
            historizing: false,
        }
    }
}

impl VariableAttributes {
    /// Attributes for a variable holding `value`, typed after the value
    pub fn for_value(value: impl Into<Variant>) -> Self {
        let value = value.into();
        let mut attr = Self::default();
        if let Some(data_type) = value.data_type() {
            attr.data_type = data_type;
            attr.value_rank = value.value_rank();
        }
        if let Ok(array) = value.as_array() {
            attr.array_dimensions = array
                .dimensions
                .clone()
                .unwrap_or_else(|| vec![array.values.len() as u32]);
        }
        attr.value = value;
        attr
    }

    pub fn with_access_level(mut self, access_level: u8) -> Self {
        self.access_level = access_level;
        self
    }

    pub fn with_display_name(mut self, text: impl Into<LocalizedText>) -> Self {
        self.display_name = Some(text.into());
        self
    }

    pub fn with_historizing(mut self, historizing: bool) -> Self {
        self.historizing = historizing;
        self
    }
}

/// Attributes of a new Method node
#[derive(Debug, Clone, Default)]
pub struct MethodAttributes {
    pub display_name: Option<LocalizedText>,
    pub description: LocalizedText,
    pub write_mask: u32,
    pub executable: bool,
}

/// Attributes of a new ObjectType node
#[derive(Debug, Clone, Default)]
pub struct ObjectTypeAttributes {
    pub display_name: Option<LocalizedText>,
    pub description: LocalizedText,
    pub write_mask: u32,
    pub is_abstract: bool,
}

/// Attributes of a new VariableType node
#[derive(Debug, Clone)]
pub struct VariableTypeAttributes {
    pub display_name: Option<LocalizedText>,
    pub description: LocalizedText,
    pub write_mask: u32,
    pub value: Variant,
    pub data_type: NodeId,
    pub value_rank: i32,
    pub array_dimensions: Vec<u32>,
    pub is_abstract: bool,
}

impl Default for VariableTypeAttributes {
    fn default() -> Self {
        Self {
            display_name: None,
            description: LocalizedText::default(),
            write_mask: 0,
            value: Variant::Empty,
            data_type: opcua_core::ids::base_data_type(),
            value_rank: -2,
            array_dimensions: Vec::new(),
            is_abstract: false,
        }
    }
}

/// Attributes of a new ReferenceType node
#[derive(Debug, Clone, Default)]
pub struct ReferenceTypeAttributes {
    pub display_name: Option<LocalizedText>,
    pub description: LocalizedText,
    pub write_mask: u32,
    pub is_abstract: bool,
    pub symmetric: bool,
    pub inverse_name: Option<LocalizedText>,
}

/// Attributes of a new DataType node
#[derive(Debug, Clone, Default)]
pub struct DataTypeAttributes {
    pub display_name: Option<LocalizedText>,
    pub description: LocalizedText,
    pub write_mask: u32,
    pub is_abstract: bool,
}

/// Attributes of a new View node
#[derive(Debug, Clone, Default)]
pub struct ViewAttributes {
    pub display_name: Option<LocalizedText>,
    pub description: LocalizedText,
    pub write_mask: u32,
    pub contains_no_loops: bool,
    pub event_notifier: u8,
}

/// Creation attributes, one variant per node class
#[derive(Debug, Clone)]
pub enum NodeAttributes {
    Object(ObjectAttributes),
    Variable(VariableAttributes),
    Method(MethodAttributes),
    ObjectType(ObjectTypeAttributes),
    VariableType(VariableTypeAttributes),
    ReferenceType(ReferenceTypeAttributes),
    DataType(DataTypeAttributes),
    View(ViewAttributes),
}

impl NodeAttributes {
    pub fn node_class(&self) -> NodeClass {
        match self {
            NodeAttributes::Object(_) => NodeClass::Object,
            NodeAttributes::Variable(_) => NodeClass::Variable,
            NodeAttributes::Method(_) => NodeClass::Method,
            NodeAttributes::ObjectType(_) => NodeClass::ObjectType,
            NodeAttributes::VariableType(_) => NodeClass::VariableType,
            NodeAttributes::ReferenceType(_) => NodeClass::ReferenceType,
            NodeAttributes::DataType(_) => NodeClass::DataType,
            NodeAttributes::View(_) => NodeClass::View,
        }
    }
}

/// One request to create a node
#[derive(Debug, Clone)]
pub struct AddNodesItem {
    pub parent_node_id: NodeId,
    pub reference_type_id: NodeId,
    /// Null or numeric 0 for automatic assignment
    pub requested_new_node_id: NodeId,
    pub browse_name: QualifiedName,
    pub node_attributes: NodeAttributes,
    /// Null picks the default type for Object and Variable nodes
    pub type_definition: NodeId,
}

/// Class specific part of a stored node
#[derive(Debug, Clone)]
pub enum NodeBody {
    Object {
        event_notifier: u8,
    },
    Variable {
        value: DataValue,
        data_type: NodeId,
        value_rank: i32,
        array_dimensions: Vec<u32>,
        access_level: u8,
        minimum_sampling_interval: f64,
        historizing: bool,
    },
    Method {
        executable: bool,
    },
    ObjectType {
        is_abstract: bool,
    },
    VariableType {
        value: Variant,
        data_type: NodeId,
        value_rank: i32,
        array_dimensions: Vec<u32>,
        is_abstract: bool,
    },
    ReferenceType {
        is_abstract: bool,
        symmetric: bool,
        inverse_name: Option<LocalizedText>,
    },
    DataType {
        is_abstract: bool,
    },
    View {
        contains_no_loops: bool,
        event_notifier: u8,
    },
}

/// A node owned by the address space
#[derive(Clone)]
pub struct Node {
    pub(crate) node_id: NodeId,
    pub(crate) browse_name: QualifiedName,
    pub(crate) display_name: LocalizedText,
    pub(crate) description: LocalizedText,
    pub(crate) write_mask: u32,
    pub(crate) body: NodeBody,
    pub(crate) context: Option<Arc<dyn NodeContext>>,
}

impl Node {
    /// Build a node from its creation attributes
    ///
    /// The display name defaults to the browse name text.
    pub fn new(node_id: NodeId, browse_name: QualifiedName, attributes: NodeAttributes) -> Self {
        let default_name = LocalizedText::from(browse_name.name.as_str());
        let (display_name, description, write_mask, body) = match attributes {
            NodeAttributes::Object(a) => (
                a.display_name,
                a.description,
                a.write_mask,
                NodeBody::Object {
                    event_notifier: a.event_notifier,
                },
            ),
            NodeAttributes::Variable(a) => (
                a.display_name,
                a.description,
                a.write_mask,
                NodeBody::Variable {
                    value: DataValue::new_now(a.value),
                    data_type: a.data_type,
                    value_rank: a.value_rank,
                    array_dimensions: a.array_dimensions,
                    access_level: a.access_level,
                    minimum_sampling_interval: a.minimum_sampling_interval,
                    historizing: a.historizing,
                },
            ),
            NodeAttributes::Method(a) => (
                a.display_name,
                a.description,
                a.write_mask,
                NodeBody::Method {
                    executable: a.executable,
                },
            ),
            NodeAttributes::ObjectType(a) => (
                a.display_name,
                a.description,
                a.write_mask,
                NodeBody::ObjectType {
                    is_abstract: a.is_abstract,
                },
            ),
            NodeAttributes::VariableType(a) => (
                a.display_name,
                a.description,
                a.write_mask,
                NodeBody::VariableType {
                    value: a.value,
                    data_type: a.data_type,
                    value_rank: a.value_rank,
                    array_dimensions: a.array_dimensions,
                    is_abstract: a.is_abstract,
                },
            ),
            NodeAttributes::ReferenceType(a) => (
                a.display_name,
                a.description,
                a.write_mask,
                NodeBody::ReferenceType {
                    is_abstract: a.is_abstract,
                    symmetric: a.symmetric,
                    inverse_name: a.inverse_name,
                },
            ),
            NodeAttributes::DataType(a) => (
                a.display_name,
                a.description,
                a.write_mask,
                NodeBody::DataType {
                    is_abstract: a.is_abstract,
                },
            ),
            NodeAttributes::View(a) => (
                a.display_name,
                a.description,
                a.write_mask,
                NodeBody::View {
                    contains_no_loops: a.contains_no_loops,
                    event_notifier: a.event_notifier,
                },
            ),
        };
        Self {
            node_id,
            browse_name,
            display_name: display_name.unwrap_or(default_name),
            description,
            write_mask,
            body,
            context: None,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn browse_name(&self) -> &QualifiedName {
        &self.browse_name
    }

    pub fn display_name(&self) -> &LocalizedText {
        &self.display_name
    }

    pub fn body(&self) -> &NodeBody {
        &self.body
    }

    pub fn context(&self) -> Option<&Arc<dyn NodeContext>> {
        self.context.as_ref()
    }

    pub fn node_class(&self) -> NodeClass {
        match self.body {
            NodeBody::Object { .. } => NodeClass::Object,
            NodeBody::Variable { .. } => NodeClass::Variable,
            NodeBody::Method { .. } => NodeClass::Method,
            NodeBody::ObjectType { .. } => NodeClass::ObjectType,
            NodeBody::VariableType { .. } => NodeClass::VariableType,
            NodeBody::ReferenceType { .. } => NodeClass::ReferenceType,
            NodeBody::DataType { .. } => NodeClass::DataType,
            NodeBody::View { .. } => NodeClass::View,
        }
    }

    /// Check if `attribute` belongs to this node's class
    pub fn has_attribute(&self, attribute: AttributeId) -> bool {
        match attribute {
            AttributeId::NodeId
            | AttributeId::NodeClass
            | AttributeId::BrowseName
            | AttributeId::DisplayName
            | AttributeId::Description
            | AttributeId::WriteMask
            | AttributeId::UserWriteMask => true,
            AttributeId::IsAbstract => matches!(
                self.body,
                NodeBody::ObjectType { .. }
                    | NodeBody::VariableType { .. }
                    | NodeBody::ReferenceType { .. }
                    | NodeBody::DataType { .. }
            ),
            AttributeId::Symmetric | AttributeId::InverseName => {
                matches!(self.body, NodeBody::ReferenceType { .. })
            }
            AttributeId::ContainsNoLoops => matches!(self.body, NodeBody::View { .. }),
            AttributeId::EventNotifier => {
                matches!(self.body, NodeBody::Object { .. } | NodeBody::View { .. })
            }
            AttributeId::Value
            | AttributeId::DataType
            | AttributeId::ValueRank
            | AttributeId::ArrayDimensions => matches!(
                self.body,
                NodeBody::Variable { .. } | NodeBody::VariableType { .. }
            ),
            AttributeId::AccessLevel
            | AttributeId::UserAccessLevel
            | AttributeId::MinimumSamplingInterval
            | AttributeId::Historizing => matches!(self.body, NodeBody::Variable { .. }),
            AttributeId::Executable | AttributeId::UserExecutable => {
                matches!(self.body, NodeBody::Method { .. })
            }
        }
    }

    /// Current value with status and timestamps
    ///
    /// Only Variable and VariableType nodes carry a value.
    pub fn data_value(&self) -> UaResult<DataValue> {
        match &self.body {
            NodeBody::Variable { value, .. } => Ok(value.clone()),
            NodeBody::VariableType { value, .. } => Ok(DataValue::new_now(value.clone())),
            _ => Err(StatusCode::BAD_ATTRIBUTE_ID_INVALID.into()),
        }
    }

    /// Read one attribute as a variant
    ///
    /// User specific attributes return the node's own masks; the service
    /// layer narrows them with the access control policy.
    pub fn attribute(&self, attribute: AttributeId) -> UaResult<Variant> {
        if !self.has_attribute(attribute) {
            return Err(StatusCode::BAD_ATTRIBUTE_ID_INVALID.into());
        }
        let value = match (attribute, &self.body) {
            (AttributeId::NodeId, _) => Variant::from(self.node_id.clone()),
            (AttributeId::NodeClass, _) => Variant::Int32(self.node_class().value() as i32),
            (AttributeId::BrowseName, _) => Variant::from(self.browse_name.clone()),
            (AttributeId::DisplayName, _) => Variant::from(self.display_name.clone()),
            (AttributeId::Description, _) => Variant::from(self.description.clone()),
            (AttributeId::WriteMask | AttributeId::UserWriteMask, _) => {
                Variant::UInt32(self.write_mask)
            }
            (AttributeId::IsAbstract, body) => Variant::Boolean(match body {
                NodeBody::ObjectType { is_abstract }
                | NodeBody::VariableType { is_abstract, .. }
                | NodeBody::ReferenceType { is_abstract, .. }
                | NodeBody::DataType { is_abstract } => *is_abstract,
                _ => false,
            }),
            (AttributeId::Symmetric, NodeBody::ReferenceType { symmetric, .. }) => {
                Variant::Boolean(*symmetric)
            }
            (AttributeId::InverseName, NodeBody::ReferenceType { inverse_name, .. }) => {
                Variant::from(inverse_name.clone().unwrap_or_default())
            }
            (AttributeId::ContainsNoLoops, NodeBody::View { contains_no_loops, .. }) => {
                Variant::Boolean(*contains_no_loops)
            }
            (AttributeId::EventNotifier, NodeBody::Object { event_notifier })
            | (AttributeId::EventNotifier, NodeBody::View { event_notifier, .. }) => {
                Variant::Byte(*event_notifier)
            }
            (AttributeId::Value, _) => self.data_value()?.value,
            (AttributeId::DataType, NodeBody::Variable { data_type, .. })
            | (AttributeId::DataType, NodeBody::VariableType { data_type, .. }) => {
                Variant::from(data_type.clone())
            }
            (AttributeId::ValueRank, NodeBody::Variable { value_rank, .. })
            | (AttributeId::ValueRank, NodeBody::VariableType { value_rank, .. }) => {
                Variant::Int32(*value_rank)
            }
            (AttributeId::ArrayDimensions, NodeBody::Variable { array_dimensions, .. })
            | (AttributeId::ArrayDimensions, NodeBody::VariableType { array_dimensions, .. }) => {
                dimensions_to_variant(array_dimensions)?
            }
            (
                AttributeId::AccessLevel | AttributeId::UserAccessLevel,
                NodeBody::Variable { access_level, .. },
            ) => Variant::Byte(*access_level),
            (
                AttributeId::MinimumSamplingInterval,
                NodeBody::Variable {
                    minimum_sampling_interval,
                    ..
                },
            ) => Variant::Double(*minimum_sampling_interval),
            (AttributeId::Historizing, NodeBody::Variable { historizing, .. }) => {
                Variant::Boolean(*historizing)
            }
            (
                AttributeId::Executable | AttributeId::UserExecutable,
                NodeBody::Method { executable },
            ) => Variant::Boolean(*executable),
            _ => return Err(StatusCode::BAD_ATTRIBUTE_ID_INVALID.into()),
        };
        Ok(value)
    }

    /// Write one attribute
    ///
    /// Checks that the attribute is legal for the class and that the variant
    /// has the attribute's type. Data type compatibility of the Value
    /// attribute needs the type hierarchy and is checked by the caller.
    pub fn set_attribute(&mut self, attribute: AttributeId, value: Variant) -> UaResult<()> {
        if !self.has_attribute(attribute) {
            return Err(StatusCode::BAD_ATTRIBUTE_ID_INVALID.into());
        }
        match (attribute, &mut self.body) {
            (
                AttributeId::NodeId
                | AttributeId::NodeClass
                | AttributeId::UserWriteMask
                | AttributeId::UserAccessLevel
                | AttributeId::UserExecutable,
                _,
            ) => return Err(StatusCode::BAD_NOT_WRITABLE.into()),
            (AttributeId::BrowseName, _) => {
                let name: QualifiedName = expect_type(value)?;
                if name.is_empty() {
                    return Err(StatusCode::BAD_BROWSE_NAME_INVALID.into());
                }
                self.browse_name = name;
            }
            (AttributeId::DisplayName, _) => self.display_name = expect_type(value)?,
            (AttributeId::Description, _) => self.description = expect_type(value)?,
            (AttributeId::WriteMask, _) => self.write_mask = expect_type(value)?,
            (AttributeId::IsAbstract, body) => {
                let flag: bool = expect_type(value)?;
                match body {
                    NodeBody::ObjectType { is_abstract }
                    | NodeBody::VariableType { is_abstract, .. }
                    | NodeBody::ReferenceType { is_abstract, .. }
                    | NodeBody::DataType { is_abstract } => *is_abstract = flag,
                    _ => return Err(StatusCode::BAD_ATTRIBUTE_ID_INVALID.into()),
                }
            }
            (AttributeId::Symmetric, NodeBody::ReferenceType { symmetric, .. }) => {
                *symmetric = expect_type(value)?
            }
            (AttributeId::InverseName, NodeBody::ReferenceType { inverse_name, .. }) => {
                *inverse_name = Some(expect_type(value)?)
            }
            (AttributeId::ContainsNoLoops, NodeBody::View { contains_no_loops, .. }) => {
                *contains_no_loops = expect_type(value)?
            }
            (AttributeId::EventNotifier, NodeBody::Object { event_notifier })
            | (AttributeId::EventNotifier, NodeBody::View { event_notifier, .. }) => {
                *event_notifier = expect_type(value)?
            }
            (AttributeId::Value, NodeBody::Variable { value: current, .. }) => {
                *current = DataValue::new_now(value)
            }
            (AttributeId::Value, NodeBody::VariableType { value: current, .. }) => *current = value,
            (AttributeId::DataType, NodeBody::Variable { data_type, .. })
            | (AttributeId::DataType, NodeBody::VariableType { data_type, .. }) => {
                *data_type = expect_type(value)?
            }
            (AttributeId::ValueRank, NodeBody::Variable { value_rank, .. })
            | (AttributeId::ValueRank, NodeBody::VariableType { value_rank, .. }) => {
                *value_rank = expect_type(value)?
            }
            (AttributeId::ArrayDimensions, NodeBody::Variable { array_dimensions, .. })
            | (AttributeId::ArrayDimensions, NodeBody::VariableType { array_dimensions, .. }) => {
                *array_dimensions = variant_to_dimensions(value)?
            }
            (AttributeId::AccessLevel, NodeBody::Variable { access_level, .. }) => {
                *access_level = expect_type(value)?
            }
            (
                AttributeId::MinimumSamplingInterval,
                NodeBody::Variable {
                    minimum_sampling_interval,
                    ..
                },
            ) => *minimum_sampling_interval = expect_type(value)?,
            (AttributeId::Historizing, NodeBody::Variable { historizing, .. }) => {
                *historizing = expect_type(value)?
            }
            (AttributeId::Executable, NodeBody::Method { executable }) => {
                *executable = expect_type(value)?
            }
            _ => return Err(StatusCode::BAD_ATTRIBUTE_ID_INVALID.into()),
        }
        Ok(())
    }

    /// Replace the value of a variable keeping an explicit timestamp
    pub(crate) fn set_data_value(&mut self, data_value: DataValue) -> UaResult<()> {
        match &mut self.body {
            NodeBody::Variable { value, .. } => {
                *value = data_value;
                Ok(())
            }
            _ => Err(StatusCode::BAD_ATTRIBUTE_ID_INVALID.into()),
        }
    }

    pub(crate) fn is_historizing(&self) -> bool {
        matches!(self.body, NodeBody::Variable { historizing: true, .. })
    }

    pub(crate) fn access_level(&self) -> Option<u8> {
        match self.body {
            NodeBody::Variable { access_level, .. } => Some(access_level),
            _ => None,
        }
    }

    pub(crate) fn is_executable(&self) -> bool {
        matches!(self.body, NodeBody::Method { executable: true })
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("node_id", &self.node_id)
            .field("browse_name", &self.browse_name)
            .field("node_class", &self.node_class())
            .field("context", &self.context.as_ref().map(|c| c.name().to_string()))
            .finish()
    }
}

fn expect_type<T>(value: Variant) -> UaResult<T>
where
    T: TryFrom<Variant, Error = UaError>,
{
    T::try_from(value).map_err(|_| UaError::Status(StatusCode::BAD_TYPE_MISMATCH))
}

pub(crate) fn dimensions_to_variant(dimensions: &[u32]) -> UaResult<Variant> {
    Variant::new_array(
        VariantType::UInt32,
        dimensions.iter().map(|d| Variant::UInt32(*d)).collect(),
    )
}

pub(crate) fn variant_to_dimensions(value: Variant) -> UaResult<Vec<u32>> {
    match value {
        Variant::Empty => Ok(Vec::new()),
        Variant::Array(array) if array.element_type == VariantType::UInt32 => array
            .values
            .into_iter()
            .map(|v| v.as_u32())
            .collect::<UaResult<Vec<u32>>>(),
        _ => Err(StatusCode::BAD_TYPE_MISMATCH.into()),
    }
}
