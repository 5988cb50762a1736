//! Service dispatch for remote sessions
//!
//! Requests arriving through a [`ServerConnector`](crate::session::ServerConnector)
//! are checked against the server's access control policy before they
//! touch the address space. The local API never comes through here.

use crate::access_control::SessionContext;
use crate::address_space::browse::{BrowseDescription, BrowsePath, BrowsePathResult, BrowseResult};
use crate::address_space::node::AddNodesItem;
use crate::address_space::reference::{AddReferencesItem, DeleteNodesItem, DeleteReferencesItem};
use crate::address_space::AddressSpace;
use crate::history::{HistoryUpdateDetails, HistoryUpdateResult};
use crate::method::{CallMethodRequest, CallMethodResult};
use crate::server::Server;
use opcua_core::{
    access_level, AttributeId, DataValue, NodeId, StatusCode, UaResult, Variant,
};

/// One attribute to read
#[derive(Debug, Clone)]
pub struct ReadValueId {
    pub node_id: NodeId,
    pub attribute_id: AttributeId,
}

impl ReadValueId {
    pub fn value(node_id: NodeId) -> Self {
        Self {
            node_id,
            attribute_id: AttributeId::Value,
        }
    }
}

/// One attribute to write
#[derive(Debug, Clone)]
pub struct WriteValue {
    pub node_id: NodeId,
    pub attribute_id: AttributeId,
    pub value: Variant,
}

impl WriteValue {
    pub fn value(node_id: NodeId, value: impl Into<Variant>) -> Self {
        Self {
            node_id,
            attribute_id: AttributeId::Value,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddNodesResult {
    pub status_code: StatusCode,
    /// Null unless the node was added
    pub added_node_id: NodeId,
}

/// A decoded service request
#[derive(Debug, Clone)]
pub enum ServiceRequest {
    Read(Vec<ReadValueId>),
    Write(Vec<WriteValue>),
    Call(Vec<CallMethodRequest>),
    AddNodes(Vec<AddNodesItem>),
    AddReferences(Vec<AddReferencesItem>),
    DeleteNodes(Vec<DeleteNodesItem>),
    DeleteReferences(Vec<DeleteReferencesItem>),
    Browse(Vec<BrowseDescription>),
    TranslateBrowsePaths(Vec<BrowsePath>),
    HistoryUpdate(Vec<HistoryUpdateDetails>),
}

impl ServiceRequest {
    fn is_empty(&self) -> bool {
        match self {
            ServiceRequest::Read(v) => v.is_empty(),
            ServiceRequest::Write(v) => v.is_empty(),
            ServiceRequest::Call(v) => v.is_empty(),
            ServiceRequest::AddNodes(v) => v.is_empty(),
            ServiceRequest::AddReferences(v) => v.is_empty(),
            ServiceRequest::DeleteNodes(v) => v.is_empty(),
            ServiceRequest::DeleteReferences(v) => v.is_empty(),
            ServiceRequest::Browse(v) => v.is_empty(),
            ServiceRequest::TranslateBrowsePaths(v) => v.is_empty(),
            ServiceRequest::HistoryUpdate(v) => v.is_empty(),
        }
    }
}

/// Per-operation results of a service request
#[derive(Debug, Clone)]
pub enum ServiceResponse {
    Read(Vec<DataValue>),
    Write(Vec<StatusCode>),
    Call(Vec<CallMethodResult>),
    AddNodes(Vec<AddNodesResult>),
    AddReferences(Vec<StatusCode>),
    DeleteNodes(Vec<StatusCode>),
    DeleteReferences(Vec<StatusCode>),
    Browse(Vec<BrowseResult>),
    TranslateBrowsePaths(Vec<BrowsePathResult>),
    HistoryUpdate(Vec<HistoryUpdateResult>),
    /// The whole request failed
    Fault(StatusCode),
}

fn status_of(result: UaResult<()>) -> StatusCode {
    match result {
        Ok(()) => StatusCode::GOOD,
        Err(e) => e.status_code(),
    }
}

impl Server {
    /// Run one request for a session
    pub(crate) async fn dispatch(
        &self,
        session: &SessionContext,
        request: ServiceRequest,
    ) -> ServiceResponse {
        if request.is_empty() {
            return ServiceResponse::Fault(StatusCode::BAD_NOTHING_TO_DO);
        }
        match request {
            ServiceRequest::Call(requests) => {
                let mut results = Vec::with_capacity(requests.len());
                for request in requests {
                    results.push(self.call_checked(session, request).await);
                }
                ServiceResponse::Call(results)
            }
            request => {
                let mut space = self.space.write().await;
                self.dispatch_locked(&mut space, session, request)
            }
        }
    }

    fn dispatch_locked(
        &self,
        space: &mut AddressSpace,
        session: &SessionContext,
        request: ServiceRequest,
    ) -> ServiceResponse {
        let policy = self.access_control();
        match request {
            ServiceRequest::Read(items) => {
                let space = &*space;
                ServiceResponse::Read(
                    items
                        .iter()
                        .map(|item| match self.read_checked(space, session, item) {
                            Ok(value) => value,
                            Err(e) => DataValue::from_status(e.status_code()),
                        })
                        .collect(),
                )
            }
            ServiceRequest::Write(items) => ServiceResponse::Write(
                items
                    .into_iter()
                    .map(|item| status_of(self.write_checked(space, session, item)))
                    .collect(),
            ),
            ServiceRequest::AddNodes(items) => ServiceResponse::AddNodes(
                items
                    .into_iter()
                    .map(|item| {
                        let result = if policy.allow_add_node(session, &item) {
                            self.insert_node(space, session, item, None)
                        } else {
                            Err(StatusCode::BAD_USER_ACCESS_DENIED.into())
                        };
                        match result {
                            Ok(added_node_id) => AddNodesResult {
                                status_code: StatusCode::GOOD,
                                added_node_id,
                            },
                            Err(e) => AddNodesResult {
                                status_code: e.status_code(),
                                added_node_id: NodeId::null(),
                            },
                        }
                    })
                    .collect(),
            ),
            ServiceRequest::AddReferences(items) => ServiceResponse::AddReferences(
                items
                    .iter()
                    .map(|item| {
                        if !policy.allow_add_reference(session, item) {
                            return StatusCode::BAD_USER_ACCESS_DENIED;
                        }
                        status_of(space.add_reference(
                            &item.source_node_id,
                            &item.reference_type_id,
                            &item.target_node_id,
                            item.is_forward,
                        ))
                    })
                    .collect(),
            ),
            ServiceRequest::DeleteNodes(items) => ServiceResponse::DeleteNodes(
                items
                    .iter()
                    .map(|item| {
                        if !policy.allow_delete_node(session, item) {
                            return StatusCode::BAD_USER_ACCESS_DENIED;
                        }
                        status_of(self.remove_node(
                            space,
                            session,
                            &item.node_id,
                            item.delete_target_references,
                        ))
                    })
                    .collect(),
            ),
            ServiceRequest::DeleteReferences(items) => ServiceResponse::DeleteReferences(
                items
                    .iter()
                    .map(|item| {
                        if !policy.allow_delete_reference(session, item) {
                            return StatusCode::BAD_USER_ACCESS_DENIED;
                        }
                        status_of(space.delete_reference(
                            &item.source_node_id,
                            &item.reference_type_id,
                            item.is_forward,
                            &item.target_node_id,
                            item.delete_bidirectional,
                        ))
                    })
                    .collect(),
            ),
            ServiceRequest::Browse(items) => {
                let space = &*space;
                ServiceResponse::Browse(items.iter().map(|d| space.browse(d)).collect())
            }
            ServiceRequest::TranslateBrowsePaths(items) => {
                let space = &*space;
                ServiceResponse::TranslateBrowsePaths(
                    items
                        .iter()
                        .map(|p| space.translate_browse_path_to_node_ids(p))
                        .collect(),
                )
            }
            ServiceRequest::HistoryUpdate(items) => {
                let space = &*space;
                ServiceResponse::HistoryUpdate(
                    items
                        .iter()
                        .map(|details| {
                            if !self.history_allowed(session, details) {
                                return HistoryUpdateResult::failed(
                                    StatusCode::BAD_USER_ACCESS_DENIED,
                                );
                            }
                            self.history_update_locked(space, details)
                        })
                        .collect(),
                )
            }
            ServiceRequest::Call(_) => ServiceResponse::Fault(StatusCode::BAD_INTERNAL_ERROR),
        }
    }

    /// Read with the access level and the user specific attributes applied
    fn read_checked(
        &self,
        space: &AddressSpace,
        session: &SessionContext,
        item: &ReadValueId,
    ) -> UaResult<DataValue> {
        let node = space.find(&item.node_id)?;
        let policy = self.access_control();
        let value = match item.attribute_id {
            AttributeId::Value => {
                if let Some(level) = node.access_level() {
                    if level & access_level::CURRENT_READ == 0 {
                        return Err(StatusCode::BAD_NOT_READABLE.into());
                    }
                    let user_level = policy.get_user_access_level(session, &item.node_id);
                    if user_level & access_level::CURRENT_READ == 0 {
                        return Err(StatusCode::BAD_USER_ACCESS_DENIED.into());
                    }
                }
                return self.read_data_value_locked(space, &item.node_id);
            }
            AttributeId::UserAccessLevel => {
                let level = node.access_level().ok_or(StatusCode::BAD_ATTRIBUTE_ID_INVALID)?;
                Variant::Byte(level & policy.get_user_access_level(session, &item.node_id))
            }
            AttributeId::UserWriteMask => {
                Variant::UInt32(node.write_mask & policy.get_user_rights_mask(session, &item.node_id))
            }
            AttributeId::UserExecutable => {
                node.attribute(AttributeId::Executable)?;
                Variant::Boolean(
                    node.is_executable() && policy.get_user_executable(session, &item.node_id),
                )
            }
            attribute => self.read_locked(space, &item.node_id, attribute)?,
        };
        Ok(DataValue {
            value,
            status: StatusCode::GOOD,
            source_timestamp: None,
            server_timestamp: Some(chrono::Utc::now()),
        })
    }

    /// Write after the AccessLevel or WriteMask check
    fn write_checked(
        &self,
        space: &mut AddressSpace,
        session: &SessionContext,
        item: WriteValue,
    ) -> UaResult<()> {
        let node = space.find(&item.node_id)?;
        let policy = self.access_control();
        if item.attribute_id == AttributeId::Value {
            if let Some(level) = node.access_level() {
                if level & access_level::CURRENT_WRITE == 0 {
                    return Err(StatusCode::BAD_NOT_WRITABLE.into());
                }
                let user_level = policy.get_user_access_level(session, &item.node_id);
                if user_level & access_level::CURRENT_WRITE == 0 {
                    return Err(StatusCode::BAD_USER_ACCESS_DENIED.into());
                }
            }
        } else if let Some(bit) = item.attribute_id.write_mask_bit() {
            let rights = node.write_mask & policy.get_user_rights_mask(session, &item.node_id);
            if rights & bit == 0 {
                return Err(StatusCode::BAD_NOT_WRITABLE.into());
            }
        }
        self.write_locked(space, &item.node_id, item.attribute_id, item.value)
    }

    fn history_allowed(&self, session: &SessionContext, details: &HistoryUpdateDetails) -> bool {
        let policy = self.access_control();
        match details {
            HistoryUpdateDetails::UpdateData {
                node_id,
                perform_insert_replace,
                update_values,
            } => update_values.iter().all(|value| {
                policy.allow_history_update_update_data(
                    session,
                    node_id,
                    *perform_insert_replace,
                    value,
                )
            }),
            HistoryUpdateDetails::DeleteRawModified {
                node_id,
                is_delete_modified,
                start_time,
                end_time,
            } => policy.allow_history_update_delete_raw_modified(
                session,
                node_id,
                *start_time,
                *end_time,
                *is_delete_modified,
            ),
        }
    }

    async fn call_checked(
        &self,
        session: &SessionContext,
        request: CallMethodRequest,
    ) -> CallMethodResult {
        let policy = self.access_control();
        let allowed = policy.get_user_executable(session, &request.method_id)
            && policy.get_user_executable_on_object(
                session,
                &request.method_id,
                &request.object_id,
            );
        if !allowed {
            return CallMethodResult::failed(StatusCode::BAD_USER_ACCESS_DENIED);
        }
        self.call_method(request).await
    }
}
