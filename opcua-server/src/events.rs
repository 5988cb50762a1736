//! Event types, event nodes and event notifications
//!
//! An event is staged as a transient object node carrying the standard
//! BaseEventType properties. Triggering it snapshots those properties into
//! an [`EventNotification`] and publishes it to every subscriber.

use crate::access_control::SessionContext;
use crate::address_space::node::{
    AddNodesItem, NodeAttributes, ObjectAttributes, ObjectTypeAttributes, VariableAttributes,
};
use crate::address_space::AddressSpace;
use crate::server::Server;
use chrono::{DateTime, Utc};
use opcua_core::{
    ids, AttributeId, LocalizedText, NodeId, QualifiedName, StatusCode, UaResult, Variant,
};
use tokio::sync::broadcast;

const TIME: &str = "Time";
const SEVERITY: &str = "Severity";
const MESSAGE: &str = "Message";
const SOURCE_NAME: &str = "SourceName";
const EVENT_TYPE: &str = "EventType";

/// A triggered event as seen by subscribers
#[derive(Debug, Clone, PartialEq)]
pub struct EventNotification {
    pub event_id: [u8; 16],
    pub event_type: NodeId,
    /// Node the event was triggered on
    pub source_node: NodeId,
    pub time: DateTime<Utc>,
    pub severity: u16,
    pub message: LocalizedText,
    pub source_name: String,
}

impl Server {
    /// Declare a new event type below BaseEventType
    pub async fn add_new_event_type(&self, name: &str, description: &str) -> UaResult<NodeId> {
        let attributes = ObjectTypeAttributes {
            display_name: Some(LocalizedText::from(name)),
            description: LocalizedText::from(description),
            ..Default::default()
        };
        self.add_object_type(&ids::base_event_type(), name, &NodeId::null(), attributes, None, 1)
            .await
    }

    /// Create an unlinked event node of `event_type` with empty properties
    ///
    /// # Errors
    /// `BadTypeDefinitionInvalid` if `event_type` is not an event type
    pub async fn create_event(&self, event_type: &NodeId) -> UaResult<NodeId> {
        let result = {
            let mut space = self.space.write().await;
            self.create_event_locked(&mut space, event_type)
        };
        self.record(&result);
        result
    }

    fn create_event_locked(&self, space: &mut AddressSpace, event_type: &NodeId) -> UaResult<NodeId> {
        if !space.is_subtype_of(event_type, &ids::base_event_type()) {
            return Err(StatusCode::BAD_TYPE_DEFINITION_INVALID.into());
        }
        let event = space.add_detached_node(
            &NodeId::null(),
            QualifiedName::new(1, "Event"),
            NodeAttributes::Object(ObjectAttributes::default()),
            event_type,
        )?;
        let properties = [
            (TIME, Variant::from(Utc::now())),
            (SEVERITY, Variant::UInt16(0)),
            (MESSAGE, Variant::from(LocalizedText::default())),
            (SOURCE_NAME, Variant::from("")),
            (EVENT_TYPE, Variant::from(event_type.clone())),
        ];
        for (name, value) in properties {
            let item = AddNodesItem {
                parent_node_id: event.clone(),
                reference_type_id: ids::has_property(),
                requested_new_node_id: NodeId::null(),
                browse_name: QualifiedName::new(0, name),
                node_attributes: NodeAttributes::Variable(VariableAttributes::for_value(value)),
                type_definition: ids::property_type(),
            };
            if let Err(e) = space.add_node(item) {
                self.delete_event_locked(space, &event);
                return Err(e);
            }
        }
        Ok(event)
    }

    /// Create an event node and fill in its properties
    ///
    /// `time` defaults to now.
    pub async fn set_up_event(
        &self,
        event_type: &NodeId,
        message: &str,
        source_name: &str,
        severity: u16,
        time: Option<DateTime<Utc>>,
    ) -> UaResult<NodeId> {
        let result = {
            let mut space = self.space.write().await;
            self.create_event_locked(&mut space, event_type).and_then(|event| {
                let values = [
                    (TIME, Variant::from(time.unwrap_or_else(Utc::now))),
                    (SEVERITY, Variant::UInt16(severity)),
                    (MESSAGE, Variant::from(LocalizedText::from(message))),
                    (SOURCE_NAME, Variant::from(source_name)),
                ];
                for (name, value) in values {
                    let property = space.get_child(&event, name)?;
                    space.write_attribute(&property, AttributeId::Value, value)?;
                }
                Ok(event)
            })
        };
        self.record(&result);
        result
    }

    /// Publish an event on behalf of `origin`
    ///
    /// # Arguments
    /// * `event_node` - Node made by [`Server::create_event`] or [`Server::set_up_event`]
    /// * `origin` - Node emitting the event
    /// * `delete_event_node` - Remove the event node afterwards
    ///
    /// # Returns
    /// The random id given to the event
    pub async fn trigger_event(
        &self,
        event_node: &NodeId,
        origin: &NodeId,
        delete_event_node: bool,
    ) -> UaResult<[u8; 16]> {
        let result = {
            let mut space = self.space.write().await;
            self.snapshot_event(&space, event_node, origin).map(|notification| {
                if delete_event_node {
                    self.delete_event_locked(&mut space, event_node);
                }
                notification
            })
        };
        self.record(&result);
        let notification = result?;
        let event_id = notification.event_id;
        if self.events.send(notification).is_err() {
            log::debug!("Event {} triggered without subscribers", event_node);
        }
        Ok(event_id)
    }

    fn snapshot_event(
        &self,
        space: &AddressSpace,
        event_node: &NodeId,
        origin: &NodeId,
    ) -> UaResult<EventNotification> {
        space.find(origin)?;
        let event_type = space
            .type_definition(event_node)
            .ok_or(StatusCode::BAD_NODE_ID_UNKNOWN)?;
        let property = |name: &str| -> UaResult<Variant> {
            let id = space.get_child(event_node, name)?;
            space.read_attribute(&id, AttributeId::Value)
        };
        Ok(EventNotification {
            event_id: rand::random(),
            event_type,
            source_node: origin.clone(),
            time: property(TIME)?.as_date_time()?,
            severity: property(SEVERITY)?.as_u16()?,
            message: property(MESSAGE)?.as_localized_text()?.clone(),
            source_name: property(SOURCE_NAME)?.as_str()?.to_string(),
        })
    }

    fn delete_event_locked(&self, space: &mut AddressSpace, event_node: &NodeId) {
        let mut doomed = space.hierarchical_children(event_node);
        doomed.push(event_node.clone());
        for id in doomed {
            if let Err(e) = self.remove_node(space, &SessionContext::admin(), &id, true) {
                log::warn!("Failed to remove event node {}: {}", id, e);
            }
        }
    }

    /// Receive every event triggered from now on
    pub fn subscribe_events(&self) -> broadcast::Receiver<EventNotification> {
        self.events.subscribe()
    }
}
