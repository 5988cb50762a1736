//! OPC UA server core
//!
//! Hosts the address space and the node lifecycle around it:
//!
//! - [`address_space`]: node store, references, browsing and namespace zero
//! - [`nodes`] / [`attributes`]: node creation, deletion and attribute access
//! - [`method`]: method registration and dispatch
//! - [`scheduler`]: repeated callbacks run by the processing loop
//! - [`access_control`]: per-session authorization policy
//! - [`discovery`]: registration with a discovery server
//! - [`server`] / [`runtime`]: server state machine and instance registry
//!
//! Every [`Server`] keeps its address space behind an async lock; lifecycle
//! hooks run with that lock held, method handlers without it.

pub mod access_control;
pub mod address_space;
pub mod attributes;
pub mod config;
pub mod context;
pub mod discovery;
pub mod discovery_server;
pub mod events;
pub mod history;
pub mod method;
pub mod nodes;
pub mod runtime;
pub mod scheduler;
pub mod server;
pub mod service;
pub mod session;

pub use access_control::{
    AccessControl, DefaultAccessControl, SessionContext, UserIdentity, UsernamePasswordLogin,
};
pub use address_space::browse::{
    BrowseDescription, BrowseDirection, BrowsePath, BrowsePathResult, BrowsePathTarget,
    BrowseResult, NodeIdMap, NodeTree, ReferenceDescription, TreeNode,
};
pub use address_space::node::{
    AddNodesItem, DataTypeAttributes, MethodAttributes, Node, NodeAttributes, ObjectAttributes,
    ObjectTypeAttributes, ReferenceTypeAttributes, VariableAttributes, VariableTypeAttributes,
    ViewAttributes,
};
pub use address_space::reference::{
    AddReferencesItem, DeleteNodesItem, DeleteReferencesItem, Reference,
};
pub use address_space::AddressSpace;
pub use config::ServerConfig;
pub use context::{DataSource, DefaultNodeLifecycle, LifecycleEvent, NodeContext, NodeLifecycle};
pub use discovery::{DiscoveryRegistration, ServerOnNetwork};
pub use discovery_server::{LocalDiscoveryServer, LoopbackChannel};
pub use events::EventNotification;
pub use history::{HistoryUpdateDetails, HistoryUpdateResult, PerformUpdateType};
pub use method::{Argument, CallMethodRequest, CallMethodResult, ServerMethod, SimpleMethod};
pub use runtime::{Runtime, ServerHandle};
pub use scheduler::{RepeatedCallback, RepeatedCallbackHandler, SchedulerHandle};
pub use server::{
    RegisterServerCallback, Server, ServerExtension, ServerOnNetworkCallback, ServerState,
};
pub use service::{AddNodesResult, ReadValueId, ServiceRequest, ServiceResponse, WriteValue};
pub use session::ServerConnector;
