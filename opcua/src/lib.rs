//! # opcua
//!
//! Server-side OPC UA address space and node lifecycle.
//!
//! ## Architecture
//!
//! - **opcua-core**: identity model, status codes, variants, attributes
//! - **opcua-client**: client used to register with a discovery server
//! - **opcua-server**: address space, attribute access, method dispatch,
//!   repeated callbacks, access control, discovery and server lifecycle
//!
//! ## Usage
//!
//! ```no_run
//! use opcua::prelude::*;
//!
//! # async fn demo() -> UaResult<()> {
//! let runtime = Runtime::new();
//! let server = runtime.create_server(ServerConfig::default());
//! let folder = server
//!     .create_folder_path(&ids::objects_folder(), &["Plant", "Boiler"], 1)
//!     .await?;
//! let temperature = server
//!     .add_variable(&folder, "Temperature", 21.5f64, &NodeId::null(), None, 0)
//!     .await?;
//! server.write_value(&temperature, 22.0f64).await?;
//! server.start().await
//! # }
//! ```

pub use opcua_core::{NodeId, StatusCode, UaError, UaResult, Variant};

pub mod core {
    pub use opcua_core::*;
}

pub mod client {
    pub use opcua_client::*;
}

pub mod server {
    pub use opcua_server::*;
}

/// Commonly used types
pub mod prelude {
    pub use opcua_client::{Client, DiscoveryChannel};
    pub use opcua_core::{
        ids, AttributeId, DataValue, LocalizedText, NodeClass, NodeId, QualifiedName, StatusCode,
        UaError, UaResult, Variant,
    };
    pub use opcua_server::{
        AccessControl, Argument, CallMethodRequest, NodeContext, NodeLifecycle, RepeatedCallback,
        Runtime, Server, ServerConfig, ServerMethod, ServerState, SessionContext, SimpleMethod,
    };
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_end_to_end() {
        let runtime = Runtime::new();
        let server = runtime.create_server(ServerConfig::default());
        let plant = server
            .create_folder_path(&ids::objects_folder(), &["Plant"], 1)
            .await
            .unwrap();
        let level = server
            .add_variable(&plant, "Level", 3i32, &NodeId::null(), None, 0)
            .await
            .unwrap();
        server.write_value(&level, 4i32).await.unwrap();
        assert_eq!(server.read_value(&level).await.unwrap(), Variant::from(4i32));

        let double = SimpleMethod::new(
            "Double",
            vec![Argument::of::<i32>("x")],
            vec![Argument::of::<i32>("y")],
            |inputs: &[Variant], outputs: &mut [Variant]| {
                outputs[0] = Variant::from(inputs[0].as_i32()? * 2);
                Ok(())
            },
        );
        let method = server
            .add_server_method(Arc::new(double), "Double", &plant, &NodeId::null(), 0)
            .await
            .unwrap();
        let result = server
            .call(CallMethodRequest {
                object_id: plant.clone(),
                method_id: method,
                input_arguments: vec![Variant::from(21i32)],
            })
            .await;
        assert_eq!(result.status_code, StatusCode::GOOD);
        assert_eq!(result.output_arguments, vec![Variant::from(42i32)]);

        server.delete_tree(&plant).await.unwrap();
        assert!(!server.contains_node(&level).await);
    }
}
