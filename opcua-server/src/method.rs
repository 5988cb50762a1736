//! Server methods
//!
//! Method handlers live in an arena keyed by the method's NodeId and are
//! looked up on every call. The address space lock is released before
//! the handler runs, so a handler may use the server's own API.

use crate::access_control::SessionContext;
use crate::address_space::node::{AddNodesItem, MethodAttributes, NodeAttributes};
use crate::server::Server;
use async_trait::async_trait;
use opcua_core::{
    ids, LocalizedText, NodeClass, NodeId, QualifiedName, StatusCode, UaResult, Variant,
    VariantValue,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Declared method argument
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: String,
    pub data_type: NodeId,
    pub value_rank: i32,
    pub array_dimensions: Vec<u32>,
    pub description: LocalizedText,
}

impl Argument {
    /// Scalar argument of the given DataType
    pub fn new(name: impl Into<String>, data_type: NodeId) -> Self {
        Self {
            name: name.into(),
            data_type,
            value_rank: -1,
            array_dimensions: Vec::new(),
            description: LocalizedText::default(),
        }
    }

    /// Scalar argument typed after a Rust value type
    pub fn of<T: VariantValue>(name: impl Into<String>) -> Self {
        Self::new(name, T::VARIANT_TYPE.data_type())
    }

    pub fn with_description(mut self, description: impl Into<LocalizedText>) -> Self {
        self.description = description.into();
        self
    }
}

/// A remotely callable method
///
/// The argument lists are fixed for the lifetime of the handler.
#[async_trait]
pub trait ServerMethod: Send + Sync {
    fn name(&self) -> &str;

    fn input_arguments(&self) -> &[Argument];

    fn output_arguments(&self) -> &[Argument];

    /// Run the method
    ///
    /// # Arguments
    /// * `server` - The hosting server
    /// * `object_id` - Object the method was called on
    /// * `inputs` - Inputs, already checked against [`ServerMethod::input_arguments`]
    /// * `outputs` - Buffer sized to the declared output arity
    ///
    /// # Errors
    /// Any error is reported as the call's status; what was written to
    /// `outputs` before the error is not discarded
    async fn call(
        &self,
        server: &Server,
        object_id: &NodeId,
        inputs: &[Variant],
        outputs: &mut [Variant],
    ) -> UaResult<()>;
}

/// Method over a synchronous closure
pub struct SimpleMethod<F> {
    name: String,
    inputs: Vec<Argument>,
    outputs: Vec<Argument>,
    f: F,
}

impl<F> SimpleMethod<F>
where
    F: Fn(&[Variant], &mut [Variant]) -> UaResult<()> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, inputs: Vec<Argument>, outputs: Vec<Argument>, f: F) -> Self {
        Self {
            name: name.into(),
            inputs,
            outputs,
            f,
        }
    }
}

#[async_trait]
impl<F> ServerMethod for SimpleMethod<F>
where
    F: Fn(&[Variant], &mut [Variant]) -> UaResult<()> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn input_arguments(&self) -> &[Argument] {
        &self.inputs
    }

    fn output_arguments(&self) -> &[Argument] {
        &self.outputs
    }

    async fn call(
        &self,
        _server: &Server,
        _object_id: &NodeId,
        inputs: &[Variant],
        outputs: &mut [Variant],
    ) -> UaResult<()> {
        (self.f)(inputs, outputs)
    }
}

/// Arena of method handlers keyed by method node id
#[derive(Default)]
pub(crate) struct MethodRegistry {
    handlers: HashMap<NodeId, Arc<dyn ServerMethod>>,
}

impl MethodRegistry {
    pub fn insert(&mut self, method_id: NodeId, method: Arc<dyn ServerMethod>) {
        self.handlers.insert(method_id, method);
    }

    pub fn get(&self, method_id: &NodeId) -> Option<Arc<dyn ServerMethod>> {
        self.handlers.get(method_id).cloned()
    }

    pub fn remove(&mut self, method_id: &NodeId) -> bool {
        self.handlers.remove(method_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.handlers.iter().map(|(id, m)| (id.to_string(), m.name().to_string())))
            .finish()
    }
}

/// One Call service operation
#[derive(Debug, Clone)]
pub struct CallMethodRequest {
    pub object_id: NodeId,
    pub method_id: NodeId,
    pub input_arguments: Vec<Variant>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallMethodResult {
    pub status_code: StatusCode,
    /// Per-input status, filled when an input was rejected
    pub input_argument_results: Vec<StatusCode>,
    pub output_arguments: Vec<Variant>,
}

impl CallMethodResult {
    pub(crate) fn failed(status_code: StatusCode) -> Self {
        Self {
            status_code,
            input_argument_results: Vec::new(),
            output_arguments: Vec::new(),
        }
    }
}

impl Server {
    /// Create a Method node bound to `method`
    ///
    /// The node is linked from `parent` with HasOrderedComponent, its
    /// DisplayName and Description are the browse name, and it is
    /// executable.
    ///
    /// # Arguments
    /// * `method` - Handler declaring the argument lists
    /// * `browse_name` - Browse name text
    /// * `parent` - Owning object
    /// * `requested` - Requested id, null for automatic assignment
    /// * `ns` - Namespace index, 0 inherits the parent's
    pub async fn add_server_method(
        &self,
        method: Arc<dyn ServerMethod>,
        browse_name: &str,
        parent: &NodeId,
        requested: &NodeId,
        ns: u16,
    ) -> UaResult<NodeId> {
        let result = self.add_method_node(method, browse_name, parent, requested, ns).await;
        self.record(&result);
        result
    }

    async fn add_method_node(
        &self,
        method: Arc<dyn ServerMethod>,
        browse_name: &str,
        parent: &NodeId,
        requested: &NodeId,
        ns: u16,
    ) -> UaResult<NodeId> {
        let mut space = self.space.write().await;
        let ns = Self::resolve_namespace(parent, ns);
        let attributes = MethodAttributes {
            display_name: Some(LocalizedText::from(browse_name)),
            description: LocalizedText::from(browse_name),
            write_mask: 0,
            executable: true,
        };
        let item = AddNodesItem {
            parent_node_id: parent.clone(),
            reference_type_id: ids::has_ordered_component(),
            requested_new_node_id: requested.clone(),
            browse_name: QualifiedName::new(ns, browse_name),
            node_attributes: NodeAttributes::Method(attributes),
            type_definition: NodeId::null(),
        };
        let method_id = self.insert_node(&mut space, &SessionContext::admin(), item, None)?;
        self.methods.lock().insert(method_id.clone(), method);
        Ok(method_id)
    }

    /// Call a method on an object
    pub async fn call(&self, request: CallMethodRequest) -> CallMethodResult {
        let result = self.call_method(request).await;
        self.last_error.set(result.status_code);
        result
    }

    pub(crate) async fn call_method(&self, request: CallMethodRequest) -> CallMethodResult {
        let method = match self.resolve_call(&request).await {
            Ok(method) => method,
            Err(result) => return result,
        };

        let mut outputs = vec![Variant::Empty; method.output_arguments().len()];
        let status_code = match method
            .call(self, &request.object_id, &request.input_arguments, &mut outputs)
            .await
        {
            Ok(()) => StatusCode::GOOD,
            Err(e) => {
                log::debug!("Method {} failed: {}", method.name(), e);
                e.status_code()
            }
        };
        CallMethodResult {
            status_code,
            input_argument_results: Vec::new(),
            output_arguments: outputs,
        }
    }

    /// Validate a call under the address space lock
    async fn resolve_call(
        &self,
        request: &CallMethodRequest,
    ) -> Result<Arc<dyn ServerMethod>, CallMethodResult> {
        let space = self.space.write().await;
        if !space.contains(&request.object_id) {
            return Err(CallMethodResult::failed(StatusCode::BAD_NODE_ID_UNKNOWN));
        }
        let Some(method_node) = space.node(&request.method_id) else {
            return Err(CallMethodResult::failed(StatusCode::BAD_METHOD_INVALID));
        };
        if method_node.node_class() != NodeClass::Method
            || !space.has_component(&request.object_id, &request.method_id)
        {
            return Err(CallMethodResult::failed(StatusCode::BAD_METHOD_INVALID));
        }
        if !method_node.is_executable() {
            return Err(CallMethodResult::failed(StatusCode::BAD_NOT_EXECUTABLE));
        }
        let Some(method) = self.methods.lock().get(&request.method_id) else {
            return Err(CallMethodResult::failed(StatusCode::BAD_METHOD_INVALID));
        };

        let declared = method.input_arguments();
        let supplied = &request.input_arguments;
        if supplied.len() < declared.len() {
            return Err(CallMethodResult::failed(StatusCode::BAD_ARGUMENTS_MISSING));
        }
        if supplied.len() > declared.len() {
            return Err(CallMethodResult::failed(StatusCode::BAD_TOO_MANY_ARGUMENTS));
        }
        let results: Vec<StatusCode> = declared
            .iter()
            .zip(supplied)
            .map(|(arg, value)| {
                let untyped_ok = !value.is_empty() || arg.data_type == ids::base_data_type();
                if untyped_ok && space.value_matches(value, &arg.data_type, arg.value_rank) {
                    StatusCode::GOOD
                } else {
                    StatusCode::BAD_TYPE_MISMATCH
                }
            })
            .collect();
        if results.iter().any(StatusCode::is_bad) {
            return Err(CallMethodResult {
                status_code: StatusCode::BAD_INVALID_ARGUMENT,
                input_argument_results: results,
                output_arguments: Vec::new(),
            });
        }
        Ok(method)
    }

    /// Check if a handler is bound to a method node
    pub fn has_method_handler(&self, method_id: &NodeId) -> bool {
        self.methods.lock().get(method_id).is_some()
    }

    /// Number of bound method handlers
    pub fn method_count(&self) -> usize {
        self.methods.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::runtime::Runtime;
    use opcua_core::UaError;

    fn adder() -> Arc<dyn ServerMethod> {
        Arc::new(SimpleMethod::new(
            "Add",
            vec![Argument::of::<i32>("a"), Argument::of::<i32>("b")],
            vec![Argument::of::<i32>("sum")],
            |inputs, outputs| {
                let a = inputs[0].as_i32()?;
                let b = inputs[1].as_i32()?;
                outputs[0] = Variant::from(a + b);
                Ok(())
            },
        ))
    }

    async fn setup() -> (Arc<Server>, NodeId, NodeId) {
        let runtime = Runtime::new();
        let server = runtime.create_server(ServerConfig::default());
        let object = server
            .add_object(&ids::objects_folder(), "Calculator", &NodeId::null(), None, 1)
            .await
            .unwrap();
        let method = server
            .add_server_method(adder(), "Add", &object, &NodeId::null(), 0)
            .await
            .unwrap();
        (server, object, method)
    }

    fn request(object: &NodeId, method: &NodeId, inputs: Vec<Variant>) -> CallMethodRequest {
        CallMethodRequest {
            object_id: object.clone(),
            method_id: method.clone(),
            input_arguments: inputs,
        }
    }

    #[tokio::test]
    async fn test_add_method() {
        let (server, object, method) = setup().await;
        let result = server
            .call(request(&object, &method, vec![3i32.into(), 4i32.into()]))
            .await;
        assert_eq!(result.status_code, StatusCode::GOOD);
        assert_eq!(result.output_arguments, vec![Variant::from(7i32)]);
        assert!(server.last_ok());
    }

    #[tokio::test]
    async fn test_arity_is_enforced() {
        let (server, object, method) = setup().await;
        let one = server.call(request(&object, &method, vec![3i32.into()])).await;
        assert_eq!(one.status_code, StatusCode::BAD_ARGUMENTS_MISSING);

        let three = server
            .call(request(&object, &method, vec![1i32.into(), 2i32.into(), 3i32.into()]))
            .await;
        assert_eq!(three.status_code, StatusCode::BAD_TOO_MANY_ARGUMENTS);
        assert_eq!(server.last_error(), StatusCode::BAD_TOO_MANY_ARGUMENTS);
    }

    #[tokio::test]
    async fn test_input_types_are_checked() {
        let (server, object, method) = setup().await;
        let result = server
            .call(request(&object, &method, vec![3i32.into(), "four".into()]))
            .await;
        assert_eq!(result.status_code, StatusCode::BAD_INVALID_ARGUMENT);
        assert_eq!(
            result.input_argument_results,
            vec![StatusCode::GOOD, StatusCode::BAD_TYPE_MISMATCH]
        );
    }

    #[tokio::test]
    async fn test_method_attributes() {
        let (server, object, method) = setup().await;
        assert_eq!(server.read_display_name(&method).await.unwrap().text, "Add");
        assert_eq!(server.read_description(&method).await.unwrap().text, "Add");
        assert!(server.read_executable(&method).await.unwrap());
        assert_eq!(method.namespace_index, object.namespace_index);
        assert!(server.has_method_handler(&method));
    }

    #[tokio::test]
    async fn test_call_resolution_errors() {
        let (server, object, method) = setup().await;
        let unknown = server
            .call(request(&NodeId::numeric(1, 999), &method, vec![]))
            .await;
        assert_eq!(unknown.status_code, StatusCode::BAD_NODE_ID_UNKNOWN);

        let wrong_object = server.call(request(&ids::server(), &method, vec![])).await;
        assert_eq!(wrong_object.status_code, StatusCode::BAD_METHOD_INVALID);

        server.write_executable(&method, false).await.unwrap();
        let disabled = server
            .call(request(&object, &method, vec![1i32.into(), 2i32.into()]))
            .await;
        assert_eq!(disabled.status_code, StatusCode::BAD_NOT_EXECUTABLE);
    }

    #[tokio::test]
    async fn test_handler_error_and_reentrancy() {
        struct Echo {
            outputs: Vec<Argument>,
        }

        #[async_trait]
        impl ServerMethod for Echo {
            fn name(&self) -> &str {
                "ReadServerName"
            }
            fn input_arguments(&self) -> &[Argument] {
                &[]
            }
            fn output_arguments(&self) -> &[Argument] {
                &self.outputs
            }
            async fn call(
                &self,
                server: &Server,
                object_id: &NodeId,
                _inputs: &[Variant],
                outputs: &mut [Variant],
            ) -> UaResult<()> {
                let name = server.read_browse_name(object_id).await?;
                if name.name == "Broken" {
                    return Err(UaError::InvalidData("broken object".into()));
                }
                outputs[0] = Variant::from(name.name);
                Ok(())
            }
        }

        let (server, object, _) = setup().await;
        let echo: Arc<dyn ServerMethod> = Arc::new(Echo {
            outputs: vec![Argument::of::<String>("name")],
        });
        let method = server
            .add_server_method(echo, "Echo", &object, &NodeId::null(), 0)
            .await
            .unwrap();
        let result = server.call(request(&object, &method, vec![])).await;
        assert_eq!(result.output_arguments, vec![Variant::from("Calculator")]);

        server
            .write_browse_name(&object, QualifiedName::new(1, "Broken"))
            .await
            .unwrap();
        let failed = server.call(request(&object, &method, vec![])).await;
        assert_eq!(failed.status_code, StatusCode::BAD_INVALID_ARGUMENT);
    }
}
