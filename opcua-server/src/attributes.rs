//! Attribute access on a server
//!
//! [`Server::read_attribute`] and [`Server::write_attribute`] are the two
//! primitives; the named accessors are fixed-attribute sugar over them.
//! Each call takes the address space lock once and records its status.

use crate::address_space::node::{dimensions_to_variant, variant_to_dimensions};
use crate::address_space::AddressSpace;
use crate::server::Server;
use opcua_core::{
    access_level, AttributeId, DataValue, LocalizedText, NodeClass, NodeId, QualifiedName,
    StatusCode, UaError, UaResult, Variant,
};

/// Generates a typed read/write pair for one attribute
macro_rules! attribute_accessors {
    ($($attr:ident: $ty:ty => $read:ident, $write:ident;)*) => {
        $(
            pub async fn $read(&self, node_id: &NodeId) -> UaResult<$ty> {
                self.read_typed(node_id, AttributeId::$attr).await
            }

            pub async fn $write(&self, node_id: &NodeId, value: $ty) -> UaResult<()> {
                self.write_attribute(node_id, AttributeId::$attr, value).await
            }
        )*
    };
}

impl Server {
    /// Read an attribute under an already held lock
    ///
    /// Value reads come from the node's data source, if any, and then
    /// pass through the node context's `on_read`.
    pub(crate) fn read_locked(
        &self,
        space: &AddressSpace,
        node_id: &NodeId,
        attribute: AttributeId,
    ) -> UaResult<Variant> {
        if attribute != AttributeId::Value {
            return space.read_attribute(node_id, attribute);
        }
        Ok(self.read_data_value_locked(space, node_id)?.value)
    }

    pub(crate) fn read_data_value_locked(
        &self,
        space: &AddressSpace,
        node_id: &NodeId,
    ) -> UaResult<DataValue> {
        let node = space.find(node_id)?;
        let stored = node.data_value()?;
        let mut data_value = match self.data_source(node_id) {
            Some(source) => DataValue::new_now(source.read(node_id)?),
            None => stored,
        };
        if let Some(context) = node.context() {
            context.on_read(node_id, &mut data_value.value);
        }
        Ok(data_value)
    }

    /// Write an attribute under an already held lock
    ///
    /// A Value write goes to the node's data source when it has one,
    /// which may refuse it, and is stored otherwise. Historizing
    /// variables append the accepted value to the history store; the node
    /// context is told about it afterwards.
    pub(crate) fn write_locked(
        &self,
        space: &mut AddressSpace,
        node_id: &NodeId,
        attribute: AttributeId,
        value: Variant,
    ) -> UaResult<()> {
        if attribute != AttributeId::Value {
            return space.write_attribute(node_id, attribute, value);
        }
        let data_value = match self.data_source(node_id) {
            Some(source) => {
                space.check_value(node_id, &value)?;
                source.write(node_id, &value)?;
                DataValue::new_now(value.clone())
            }
            None => {
                space.write_attribute(node_id, attribute, value.clone())?;
                space.find(node_id)?.data_value()?
            }
        };
        let node = space.find(node_id)?;
        if node.is_historizing() {
            self.history.lock().record(node_id, data_value);
        }
        if let Some(context) = node.context() {
            context.on_write(node_id, &value);
        }
        Ok(())
    }

    /// Read one attribute of a node
    ///
    /// # Errors
    /// - `BadNodeIdUnknown` if the node does not exist
    /// - `BadAttributeIdInvalid` if the attribute is not part of the node class
    pub async fn read_attribute(&self, node_id: &NodeId, attribute: AttributeId) -> UaResult<Variant> {
        let result = {
            let space = self.space.write().await;
            self.read_locked(&space, node_id, attribute)
        };
        self.record(&result);
        result
    }

    /// Write one attribute of a node
    ///
    /// # Errors
    /// - `BadNodeIdUnknown` if the node does not exist
    /// - `BadAttributeIdInvalid` if the attribute is not part of the node class
    /// - `BadTypeMismatch` if the value has the wrong type
    /// - `BadNotWritable` for NodeId, NodeClass and user specific attributes
    pub async fn write_attribute(
        &self,
        node_id: &NodeId,
        attribute: AttributeId,
        value: impl Into<Variant>,
    ) -> UaResult<()> {
        let value = value.into();
        let result = {
            let mut space = self.space.write().await;
            self.write_locked(&mut space, node_id, attribute, value)
        };
        self.record(&result);
        result
    }

    /// Value of a variable with its status and timestamps
    pub async fn read_data_value(&self, node_id: &NodeId) -> UaResult<DataValue> {
        let result = {
            let space = self.space.write().await;
            self.read_data_value_locked(&space, node_id)
        };
        self.record(&result);
        result
    }

    async fn read_typed<T>(&self, node_id: &NodeId, attribute: AttributeId) -> UaResult<T>
    where
        T: TryFrom<Variant, Error = UaError>,
    {
        let result = self.read_attribute(node_id, attribute).await.and_then(|v| {
            T::try_from(v).map_err(|_| UaError::Status(StatusCode::BAD_TYPE_MISMATCH))
        });
        self.record(&result);
        result
    }

    attribute_accessors! {
        BrowseName: QualifiedName => read_browse_name, write_browse_name;
        DisplayName: LocalizedText => read_display_name, write_display_name;
        Description: LocalizedText => read_description, write_description;
        WriteMask: u32 => read_write_mask, write_write_mask;
        IsAbstract: bool => read_is_abstract, write_is_abstract;
        InverseName: LocalizedText => read_inverse_name, write_inverse_name;
        EventNotifier: u8 => read_event_notifier, write_event_notifier;
        DataType: NodeId => read_data_type, write_data_type;
        ValueRank: i32 => read_value_rank, write_value_rank;
        AccessLevel: u8 => read_access_level, write_access_level;
        MinimumSamplingInterval: f64 => read_minimum_sampling_interval, write_minimum_sampling_interval;
        Historizing: bool => read_historizing, write_historizing;
        Executable: bool => read_executable, write_executable;
    }

    pub async fn read_node_id(&self, node_id: &NodeId) -> UaResult<NodeId> {
        self.read_typed(node_id, AttributeId::NodeId).await
    }

    pub async fn read_node_class(&self, node_id: &NodeId) -> UaResult<NodeClass> {
        let result = self
            .read_typed::<i32>(node_id, AttributeId::NodeClass)
            .await
            .and_then(|raw| {
                u32::try_from(raw)
                    .ok()
                    .and_then(NodeClass::from_value)
                    .ok_or(UaError::Status(StatusCode::BAD_INTERNAL_ERROR))
            });
        self.record(&result);
        result
    }

    pub async fn read_symmetric(&self, node_id: &NodeId) -> UaResult<bool> {
        self.read_typed(node_id, AttributeId::Symmetric).await
    }

    pub async fn read_contains_no_loops(&self, node_id: &NodeId) -> UaResult<bool> {
        self.read_typed(node_id, AttributeId::ContainsNoLoops).await
    }

    pub async fn read_value(&self, node_id: &NodeId) -> UaResult<Variant> {
        self.read_attribute(node_id, AttributeId::Value).await
    }

    /// Same as [`Server::read_value`]
    pub async fn variable(&self, node_id: &NodeId) -> UaResult<Variant> {
        self.read_value(node_id).await
    }

    pub async fn write_value(&self, node_id: &NodeId, value: impl Into<Variant>) -> UaResult<()> {
        self.write_attribute(node_id, AttributeId::Value, value).await
    }

    pub async fn read_array_dimensions(&self, node_id: &NodeId) -> UaResult<Vec<u32>> {
        let result = self
            .read_attribute(node_id, AttributeId::ArrayDimensions)
            .await
            .and_then(variant_to_dimensions);
        self.record(&result);
        result
    }

    pub async fn write_array_dimensions(&self, node_id: &NodeId, dimensions: &[u32]) -> UaResult<()> {
        match dimensions_to_variant(dimensions) {
            Ok(value) => {
                self.write_attribute(node_id, AttributeId::ArrayDimensions, value)
                    .await
            }
            Err(e) => {
                self.last_error.set(e.status_code());
                Err(e)
            }
        }
    }

    /// Allow writing the current value of a variable
    ///
    /// The AccessLevel read and write happen under one lock.
    pub async fn write_enable(&self, node_id: &NodeId) -> UaResult<()> {
        self.update_access_level(node_id, |level| level | access_level::CURRENT_WRITE)
            .await
    }

    /// Make a variable read only
    ///
    /// Clears the write bits and sets CurrentRead, plus HistoryRead when
    /// `history_enable` is set.
    pub async fn set_read_only(&self, node_id: &NodeId, history_enable: bool) -> UaResult<()> {
        self.update_access_level(node_id, |level| {
            let mut level = level & !(access_level::CURRENT_WRITE | access_level::HISTORY_WRITE);
            level |= access_level::CURRENT_READ;
            if history_enable {
                level |= access_level::HISTORY_READ;
            }
            level
        })
        .await
    }

    async fn update_access_level(
        &self,
        node_id: &NodeId,
        update: impl FnOnce(u8) -> u8,
    ) -> UaResult<()> {
        let result = {
            let mut space = self.space.write().await;
            self.update_access_level_locked(&mut space, node_id, update)
        };
        self.record(&result);
        result
    }

    fn update_access_level_locked(
        &self,
        space: &mut AddressSpace,
        node_id: &NodeId,
        update: impl FnOnce(u8) -> u8,
    ) -> UaResult<()> {
        let current = space
            .find(node_id)?
            .access_level()
            .ok_or(StatusCode::BAD_ATTRIBUTE_ID_INVALID)?;
        self.write_locked(
            space,
            node_id,
            AttributeId::AccessLevel,
            Variant::Byte(update(current)),
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::address_space::node::VariableAttributes;
    use crate::config::ServerConfig;
    use crate::context::{DataSource, NodeContext};
    use crate::runtime::Runtime;
    use crate::server::Server;
    use opcua_core::{
        access_level, ids, AttributeId, LocalizedText, NodeClass, NodeId, QualifiedName,
        StatusCode, UaResult, Variant,
    };
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn server() -> Arc<Server> {
        Runtime::new().create_server(ServerConfig::default())
    }

    async fn variable(server: &Server, name: &str, value: impl Into<Variant>) -> NodeId {
        server
            .add_variable(&ids::objects_folder(), name, value, &NodeId::null(), None, 0)
            .await
            .unwrap()
    }

    /// Doubles integers on the way out and remembers writes
    struct Scaling {
        written: Mutex<Vec<Variant>>,
    }

    impl NodeContext for Scaling {
        fn name(&self) -> &str {
            "scaling"
        }

        fn on_read(&self, _node_id: &NodeId, value: &mut Variant) {
            if let Variant::Int32(v) = value {
                *v *= 2;
            }
        }

        fn on_write(&self, _node_id: &NodeId, value: &Variant) {
            self.written.lock().push(value.clone());
        }
    }

    #[tokio::test]
    async fn test_value_round_trip() {
        let server = server();
        let int = variable(&server, "Int", 0i32).await;
        let double = variable(&server, "Double", 0.0f64).await;
        let text = variable(&server, "Text", "").await;

        for v in [i32::MIN, -1, 0, 42, i32::MAX] {
            server.write_value(&int, v).await.unwrap();
            assert_eq!(server.read_value(&int).await.unwrap(), Variant::Int32(v));
        }
        for v in [-1.5f64, 0.0, 3.25, f64::MAX] {
            server.write_value(&double, v).await.unwrap();
            assert_eq!(server.read_value(&double).await.unwrap(), Variant::Double(v));
        }
        for v in ["", "hello", "Grüße"] {
            server.write_value(&text, v).await.unwrap();
            assert_eq!(server.variable(&text).await.unwrap(), Variant::from(v));
        }
        assert!(server.last_ok());
    }

    #[tokio::test]
    async fn test_value_type_mismatch() {
        let server = server();
        let int = variable(&server, "Int", 1i32).await;
        let err = server.write_value(&int, "text").await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_TYPE_MISMATCH);
        assert_eq!(server.last_error(), StatusCode::BAD_TYPE_MISMATCH);
        assert_eq!(server.read_value(&int).await.unwrap(), Variant::Int32(1));

        server.write_value(&int, Variant::Empty).await.unwrap();
        assert!(server.read_value(&int).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_illegal_attributes() {
        let server = server();
        let folder = server
            .add_folder(&ids::objects_folder(), "F", &NodeId::null(), 0)
            .await
            .unwrap();
        let err = server.read_value(&folder).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_ATTRIBUTE_ID_INVALID);
        let err = server
            .write_attribute(&folder, AttributeId::NodeId, NodeId::numeric(1, 9))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_NOT_WRITABLE);
        let err = server
            .read_value(&NodeId::numeric(1, 999_999))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_NODE_ID_UNKNOWN);
        assert_eq!(server.read_node_class(&folder).await.unwrap(), NodeClass::Object);
        assert_eq!(server.read_node_id(&folder).await.unwrap(), folder);
    }

    #[tokio::test]
    async fn test_named_accessors() {
        let server = server();
        let id = variable(&server, "Speed", 10.0f64).await;
        server
            .write_display_name(&id, LocalizedText::new("en", "Line speed"))
            .await
            .unwrap();
        server
            .write_description(&id, LocalizedText::from("metres per second"))
            .await
            .unwrap();
        server.write_minimum_sampling_interval(&id, 250.0).await.unwrap();
        server.write_value_rank(&id, -1).await.unwrap();

        assert_eq!(server.read_display_name(&id).await.unwrap().text, "Line speed");
        assert_eq!(server.read_description(&id).await.unwrap().text, "metres per second");
        assert_eq!(server.read_minimum_sampling_interval(&id).await.unwrap(), 250.0);
        assert_eq!(server.read_data_type(&id).await.unwrap(), Variant::Double(0.0).data_type().unwrap());
        assert_eq!(
            server.read_browse_name(&id).await.unwrap(),
            QualifiedName::new(1, "Speed")
        );
        assert!(server.read_array_dimensions(&id).await.unwrap().is_empty());
        assert!(!server.read_historizing(&id).await.unwrap());

        let err = server
            .write_data_type(&id, ids::objects_folder())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_TYPE_MISMATCH);
    }

    #[tokio::test]
    async fn test_write_enable_and_read_only() {
        let server = server();
        let id = variable(&server, "Level", 1i32).await;

        server.set_read_only(&id, true).await.unwrap();
        let level = server.read_access_level(&id).await.unwrap();
        assert_eq!(level, access_level::CURRENT_READ | access_level::HISTORY_READ);

        server.write_enable(&id).await.unwrap();
        let level = server.read_access_level(&id).await.unwrap();
        assert_ne!(level & access_level::CURRENT_WRITE, 0);
        assert_ne!(level & access_level::HISTORY_READ, 0);

        server.set_read_only(&id, false).await.unwrap();
        assert_eq!(
            server.read_access_level(&id).await.unwrap(),
            access_level::CURRENT_READ | access_level::HISTORY_READ
        );

        let folder = server
            .add_folder(&ids::objects_folder(), "NoLevel", &NodeId::null(), 0)
            .await
            .unwrap();
        assert!(server.write_enable(&folder).await.is_err());
    }

    #[tokio::test]
    async fn test_context_value_callbacks() {
        let server = server();
        let context = Arc::new(Scaling {
            written: Mutex::new(Vec::new()),
        });
        let id = server
            .add_variable(
                &ids::objects_folder(),
                "Scaled",
                5i32,
                &NodeId::null(),
                Some(context.clone()),
                0,
            )
            .await
            .unwrap();
        assert_eq!(server.read_value(&id).await.unwrap(), Variant::Int32(10));
        assert_eq!(server.read_data_value(&id).await.unwrap().value, Variant::Int32(10));

        server.write_value(&id, 7i32).await.unwrap();
        assert_eq!(*context.written.lock(), vec![Variant::Int32(7)]);
        assert_eq!(server.read_value(&id).await.unwrap(), Variant::Int32(14));
    }

    #[tokio::test]
    async fn test_historizing_writes_are_recorded() {
        let server = server();
        let id = server
            .add_historical_variable(&ids::objects_folder(), "Temp", 20.0f64, &NodeId::null(), None, 0)
            .await
            .unwrap();
        assert!(server.read_historizing(&id).await.unwrap());
        server.write_value(&id, 21.0f64).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        server.write_value(&id, 22.0f64).await.unwrap();
        assert_eq!(server.history.lock().len(&id), 2);

        let plain = variable(&server, "Plain", 1.0f64).await;
        server.write_value(&plain, 2.0f64).await.unwrap();
        assert_eq!(server.history.lock().len(&plain), 0);
    }

    /// Setpoint held outside the address space, limited to 0..=100
    struct Setpoint {
        value: Mutex<f64>,
    }

    impl DataSource for Setpoint {
        fn read(&self, _node_id: &NodeId) -> UaResult<Variant> {
            Ok(Variant::Double(*self.value.lock()))
        }

        fn write(&self, _node_id: &NodeId, value: &Variant) -> UaResult<()> {
            let v = value.as_f64()?;
            if !(0.0..=100.0).contains(&v) {
                return Err(StatusCode::BAD_OUT_OF_RANGE.into());
            }
            *self.value.lock() = v;
            Ok(())
        }
    }

    async fn setpoint(server: &Server, source: Arc<Setpoint>) -> NodeId {
        let attributes = VariableAttributes::for_value(0.0f64)
            .with_access_level(access_level::CURRENT_READ | access_level::CURRENT_WRITE);
        server
            .add_data_source_variable(
                &ids::objects_folder(),
                "Setpoint",
                attributes,
                &NodeId::null(),
                source,
                None,
                0,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_data_source_serves_reads() {
        let server = server();
        let source = Arc::new(Setpoint {
            value: Mutex::new(42.5),
        });
        let id = setpoint(&server, source.clone()).await;
        assert_eq!(server.read_value(&id).await.unwrap(), Variant::Double(42.5));

        *source.value.lock() = 17.0;
        assert_eq!(server.read_value(&id).await.unwrap(), Variant::Double(17.0));
        assert_eq!(server.read_data_value(&id).await.unwrap().value, Variant::Double(17.0));
    }

    #[tokio::test]
    async fn test_data_source_can_reject_writes() {
        let server = server();
        let source = Arc::new(Setpoint {
            value: Mutex::new(10.0),
        });
        let id = setpoint(&server, source.clone()).await;

        let err = server.write_value(&id, 150.0f64).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_OUT_OF_RANGE);
        assert_eq!(server.last_error(), StatusCode::BAD_OUT_OF_RANGE);
        assert_eq!(*source.value.lock(), 10.0);

        let err = server.write_value(&id, "high").await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_TYPE_MISMATCH);

        server.write_value(&id, 55.0f64).await.unwrap();
        assert_eq!(*source.value.lock(), 55.0);
        assert_eq!(server.read_value(&id).await.unwrap(), Variant::Double(55.0));

        server.delete_node(&id, true).await.unwrap();
        assert!(server.data_source(&id).is_none());
    }
}
