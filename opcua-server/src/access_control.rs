//! Access control policy
//!
//! The policy is a set of decision points consulted by the service
//! dispatch before a remote request touches the address space. Decisions
//! are pure: implementations must not mutate server state from them.

use crate::address_space::node::AddNodesItem;
use crate::address_space::reference::{AddReferencesItem, DeleteNodesItem, DeleteReferencesItem};
use crate::history::PerformUpdateType;
use chrono::{DateTime, Utc};
use opcua_core::{DataValue, NodeId, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity presented at session activation
#[derive(Clone, PartialEq, Eq, Default)]
pub enum UserIdentity {
    #[default]
    Anonymous,
    UserName { user: String, password: String },
    X509(Vec<u8>),
    IssuedToken(Vec<u8>),
}

impl UserIdentity {
    pub fn user_name(user: impl Into<String>, password: impl Into<String>) -> Self {
        UserIdentity::UserName {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserIdentity::Anonymous => write!(f, "Anonymous"),
            UserIdentity::UserName { user, .. } => write!(f, "UserName({})", user),
            UserIdentity::X509(cert) => write!(f, "X509({} bytes)", cert.len()),
            UserIdentity::IssuedToken(token) => write!(f, "IssuedToken({} bytes)", token.len()),
        }
    }
}

/// The session on whose behalf a decision is made
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    pub session_id: NodeId,
    pub authentication_token: NodeId,
    pub identity: UserIdentity,
}

impl SessionContext {
    /// Session used by the local API
    pub fn admin() -> Self {
        Self {
            session_id: NodeId::null(),
            authentication_token: NodeId::null(),
            identity: UserIdentity::Anonymous,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.session_id.is_null()
    }
}

/// One entry of the simple login table
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsernamePasswordLogin {
    pub username: String,
    pub password: String,
}

impl UsernamePasswordLogin {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for UsernamePasswordLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsernamePasswordLogin")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Authorization decision points
///
/// Every method has the default policy as its body: adding nodes and
/// references and deleting references is permitted, deleting nodes,
/// executing methods and updating history is denied, and session
/// activation is rejected. User rights and user access level grant all
/// bits, so the node's own WriteMask and AccessLevel decide.
pub trait AccessControl: Send + Sync {
    /// Decide a session activation
    ///
    /// # Returns
    /// `Good` to accept, otherwise the status reported to the client
    fn activate_session(&self, _session: &SessionContext) -> StatusCode {
        StatusCode::BAD_SESSION_ID_INVALID
    }

    fn close_session(&self, _session: &SessionContext) {}

    fn get_user_rights_mask(&self, _session: &SessionContext, _node_id: &NodeId) -> u32 {
        u32::MAX
    }

    fn get_user_access_level(&self, _session: &SessionContext, _node_id: &NodeId) -> u8 {
        u8::MAX
    }

    fn get_user_executable(&self, _session: &SessionContext, _method_id: &NodeId) -> bool {
        false
    }

    fn get_user_executable_on_object(
        &self,
        _session: &SessionContext,
        _method_id: &NodeId,
        _object_id: &NodeId,
    ) -> bool {
        false
    }

    fn allow_add_node(&self, _session: &SessionContext, _item: &AddNodesItem) -> bool {
        true
    }

    fn allow_add_reference(&self, _session: &SessionContext, _item: &AddReferencesItem) -> bool {
        true
    }

    fn allow_delete_node(&self, _session: &SessionContext, _item: &DeleteNodesItem) -> bool {
        false
    }

    fn allow_delete_reference(
        &self,
        _session: &SessionContext,
        _item: &DeleteReferencesItem,
    ) -> bool {
        true
    }

    fn allow_history_update_update_data(
        &self,
        _session: &SessionContext,
        _node_id: &NodeId,
        _perform_insert_replace: PerformUpdateType,
        _value: &DataValue,
    ) -> bool {
        false
    }

    fn allow_history_update_delete_raw_modified(
        &self,
        _session: &SessionContext,
        _node_id: &NodeId,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        _is_delete_modified: bool,
    ) -> bool {
        false
    }
}

/// The default policy, optionally with simple username/password login
///
/// With simple login enabled, anonymous activation is refused and only
/// the listed user/password pairs are accepted.
#[derive(Debug, Clone, Default)]
pub struct DefaultAccessControl {
    logins: Vec<UsernamePasswordLogin>,
    simple_login: bool,
}

impl DefaultAccessControl {
    /// Default policy without login; every activation is rejected
    pub fn new() -> Self {
        Self::default()
    }

    /// Default policy with simple login over `logins`
    pub fn with_logins(logins: Vec<UsernamePasswordLogin>) -> Self {
        Self {
            logins,
            simple_login: true,
        }
    }

    pub fn simple_login_enabled(&self) -> bool {
        self.simple_login
    }
}

impl AccessControl for DefaultAccessControl {
    fn activate_session(&self, session: &SessionContext) -> StatusCode {
        if !self.simple_login {
            return StatusCode::BAD_SESSION_ID_INVALID;
        }
        match &session.identity {
            UserIdentity::UserName { user, password } => {
                let known = self
                    .logins
                    .iter()
                    .any(|l| &l.username == user && &l.password == password);
                if known {
                    StatusCode::GOOD
                } else {
                    StatusCode::BAD_USER_ACCESS_DENIED
                }
            }
            _ => StatusCode::BAD_IDENTITY_TOKEN_INVALID,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_space::node::{NodeAttributes, ObjectAttributes};
    use opcua_core::{ids, QualifiedName};

    fn session(identity: UserIdentity) -> SessionContext {
        SessionContext {
            session_id: NodeId::numeric(1, 1),
            authentication_token: NodeId::numeric(1, 2),
            identity,
        }
    }

    #[test]
    fn test_default_decisions() {
        let acl = DefaultAccessControl::new();
        let s = session(UserIdentity::Anonymous);
        let item = AddNodesItem {
            parent_node_id: ids::objects_folder(),
            reference_type_id: ids::organizes(),
            requested_new_node_id: NodeId::null(),
            browse_name: QualifiedName::new(1, "F"),
            node_attributes: NodeAttributes::Object(ObjectAttributes::default()),
            type_definition: ids::folder_type(),
        };
        assert!(acl.allow_add_node(&s, &item));
        assert!(!acl.allow_delete_node(
            &s,
            &DeleteNodesItem {
                node_id: ids::server(),
                delete_target_references: true,
            }
        ));
        assert!(!acl.get_user_executable(&s, &ids::server()));
        assert_eq!(acl.get_user_access_level(&s, &ids::server()), 0xFF);
        assert_eq!(acl.activate_session(&s), StatusCode::BAD_SESSION_ID_INVALID);
    }

    #[test]
    fn test_simple_login() {
        let acl = DefaultAccessControl::with_logins(vec![UsernamePasswordLogin::new("op", "pw")]);
        assert_eq!(
            acl.activate_session(&session(UserIdentity::user_name("op", "pw"))),
            StatusCode::GOOD
        );
        assert_eq!(
            acl.activate_session(&session(UserIdentity::user_name("op", "nope"))),
            StatusCode::BAD_USER_ACCESS_DENIED
        );
        assert_eq!(
            acl.activate_session(&session(UserIdentity::Anonymous)),
            StatusCode::BAD_IDENTITY_TOKEN_INVALID
        );
    }

    #[test]
    fn test_identity_debug_hides_password() {
        let text = format!("{:?}", UserIdentity::user_name("op", "secret"));
        assert!(!text.contains("secret"));
    }
}
