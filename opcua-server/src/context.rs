//! Node contexts and the global lifecycle hook
//!
//! A [`NodeContext`] is the per-node extension object: value callbacks and
//! construction/destruction hooks. It lives in an owned slot of the node
//! record, so it is dropped together with the node.
//!
//! A [`DataSource`] replaces the stored value of a variable altogether:
//! reads come from it and writes go to it, which may refuse them.
//!
//! The [`NodeLifecycle`] hook pair fires for every node created or deleted
//! on any server of a [`Runtime`](crate::runtime::Runtime). It runs while
//! the address space lock is held and must not call back into the server.

use crate::runtime::ServerHandle;
use opcua_core::{NodeId, StatusCode, UaResult, Variant};
use std::sync::Arc;

/// What a lifecycle hook is told about the node it fires for
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleEvent {
    /// Owning server, resolvable through `Runtime::find_server`
    pub server: ServerHandle,
    /// Session that caused the change (null for the local API)
    pub session_id: NodeId,
    pub node_id: NodeId,
}

/// Per-node extension object
///
/// Contexts are registered by name in the runtime so that helpers such as
/// `add_variable_as` can bind them late.
pub trait NodeContext: Send + Sync {
    fn name(&self) -> &str;

    /// Called when the context is attached to a new node
    ///
    /// An error aborts the node creation.
    fn construct(&self, _event: &LifecycleEvent) -> UaResult<()> {
        Ok(())
    }

    /// Called before the node is removed
    fn destruct(&self, _event: &LifecycleEvent) {}

    /// Value callback before a read; may replace the value returned
    fn on_read(&self, _node_id: &NodeId, _value: &mut Variant) {}

    /// Value callback after a successful write
    fn on_write(&self, _node_id: &NodeId, _value: &Variant) {}
}

/// External owner of a variable's value
///
/// Called with the address space lock held, like the context hooks.
pub trait DataSource: Send + Sync {
    /// Current value of `node_id`
    ///
    /// # Errors
    /// The status is returned to the reader instead of a value
    fn read(&self, node_id: &NodeId) -> UaResult<Variant>;

    /// Accept a value already checked against the variable's DataType
    ///
    /// # Errors
    /// A rejected write leaves the source unchanged. Read-only sources
    /// keep the default, `BadNotWritable`.
    fn write(&self, _node_id: &NodeId, _value: &Variant) -> UaResult<()> {
        Err(StatusCode::BAD_NOT_WRITABLE.into())
    }
}

/// Global construction/destruction hook pair
pub trait NodeLifecycle: Send + Sync {
    /// Decide the context of a new node
    ///
    /// # Arguments
    /// * `event` - The node being created
    /// * `proposed` - Context passed by the creator, if any
    ///
    /// # Returns
    /// The context to store, which may differ from `proposed`
    ///
    /// # Errors
    /// An error removes the node again and fails the add call
    fn construct(
        &self,
        event: &LifecycleEvent,
        proposed: Option<Arc<dyn NodeContext>>,
    ) -> UaResult<Option<Arc<dyn NodeContext>>>;

    /// Release what the node's context holds; the node is gone afterwards
    fn destruct(&self, event: &LifecycleEvent, context: Option<&Arc<dyn NodeContext>>);
}

/// Forwards to the context's own hooks
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultNodeLifecycle;

impl NodeLifecycle for DefaultNodeLifecycle {
    fn construct(
        &self,
        event: &LifecycleEvent,
        proposed: Option<Arc<dyn NodeContext>>,
    ) -> UaResult<Option<Arc<dyn NodeContext>>> {
        if let Some(context) = &proposed {
            context.construct(event)?;
        }
        Ok(proposed)
    }

    fn destruct(&self, event: &LifecycleEvent, context: Option<&Arc<dyn NodeContext>>) {
        if let Some(context) = context {
            context.destruct(event);
        }
    }
}
