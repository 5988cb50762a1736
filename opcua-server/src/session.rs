//! Sessions and the request queue
//!
//! The protocol engine hands decoded requests to the server through a
//! [`ServerConnector`]. Requests wait in a bounded queue until the
//! processing loop picks them up, and each carries a oneshot channel for
//! its reply.

use crate::access_control::{SessionContext, UserIdentity};
use crate::server::Server;
use crate::service::{ServiceRequest, ServiceResponse};
use opcua_core::{NodeId, StatusCode, UaResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Active sessions keyed by session id
#[derive(Debug)]
pub struct SessionTable {
    sessions: HashMap<NodeId, SessionContext>,
    max_sessions: usize,
}

impl SessionTable {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            max_sessions,
        }
    }

    /// Add an activated session
    ///
    /// # Errors
    /// `BadTooManySessions` when the table is full
    pub fn insert(&mut self, session: SessionContext) -> UaResult<()> {
        if self.sessions.len() >= self.max_sessions {
            return Err(StatusCode::BAD_TOO_MANY_SESSIONS.into());
        }
        self.sessions.insert(session.session_id.clone(), session);
        Ok(())
    }

    pub fn get(&self, session_id: &NodeId) -> Option<SessionContext> {
        self.sessions.get(session_id).cloned()
    }

    pub fn remove(&mut self, session_id: &NodeId) -> Option<SessionContext> {
        self.sessions.remove(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove and return every session
    pub fn drain(&mut self) -> Vec<SessionContext> {
        self.sessions.drain().map(|(_, s)| s).collect()
    }
}

fn random_guid_id() -> NodeId {
    NodeId::guid(1, Uuid::from_bytes(rand::random::<[u8; 16]>()))
}

pub(crate) enum PendingRequest {
    ActivateSession {
        identity: UserIdentity,
        reply: oneshot::Sender<UaResult<NodeId>>,
    },
    CloseSession {
        session_id: NodeId,
        reply: oneshot::Sender<UaResult<()>>,
    },
    Service {
        session_id: NodeId,
        request: ServiceRequest,
        reply: oneshot::Sender<ServiceResponse>,
    },
}

/// Cloneable entry point for decoded protocol requests
#[derive(Clone, Debug)]
pub struct ServerConnector {
    tx: mpsc::Sender<PendingRequest>,
}

impl std::fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PendingRequest::ActivateSession { identity, .. } => {
                write!(f, "ActivateSession({:?})", identity)
            }
            PendingRequest::CloseSession { session_id, .. } => {
                write!(f, "CloseSession({})", session_id)
            }
            PendingRequest::Service { session_id, .. } => write!(f, "Service({})", session_id),
        }
    }
}

impl ServerConnector {
    pub(crate) fn new(tx: mpsc::Sender<PendingRequest>) -> Self {
        Self { tx }
    }

    async fn submit<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> PendingRequest,
    ) -> UaResult<T> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| StatusCode::BAD_SERVER_HALTED)?;
        response
            .await
            .map_err(|_| StatusCode::BAD_SERVER_HALTED.into())
    }

    /// Activate a new session for `identity`
    ///
    /// # Returns
    /// The new session id
    ///
    /// # Errors
    /// The access control verdict, `BadTooManySessions`, or
    /// `BadServerHalted` if the server is gone
    pub async fn activate_session(&self, identity: UserIdentity) -> UaResult<NodeId> {
        self.submit(|reply| PendingRequest::ActivateSession { identity, reply })
            .await?
    }

    pub async fn close_session(&self, session_id: &NodeId) -> UaResult<()> {
        let session_id = session_id.clone();
        self.submit(|reply| PendingRequest::CloseSession { session_id, reply })
            .await?
    }

    /// Run one service request on behalf of a session
    pub async fn request(
        &self,
        session_id: &NodeId,
        request: ServiceRequest,
    ) -> UaResult<ServiceResponse> {
        let session_id = session_id.clone();
        self.submit(|reply| PendingRequest::Service {
            session_id,
            request,
            reply,
        })
        .await
    }
}

impl Server {
    /// Service one queued request on the processing loop
    pub(crate) async fn process_pending(self: &Arc<Self>, pending: PendingRequest) {
        match pending {
            PendingRequest::ActivateSession { identity, reply } => {
                let _ = reply.send(self.activate_session(identity));
            }
            PendingRequest::CloseSession { session_id, reply } => {
                let _ = reply.send(self.close_session(&session_id));
            }
            PendingRequest::Service {
                session_id,
                request,
                reply,
            } => {
                let session = self.sessions.lock().get(&session_id);
                let response = match session {
                    Some(session) => self.dispatch(&session, request).await,
                    None => ServiceResponse::Fault(StatusCode::BAD_SESSION_ID_INVALID),
                };
                let _ = reply.send(response);
            }
        }
    }

    fn activate_session(&self, identity: UserIdentity) -> UaResult<NodeId> {
        let session = SessionContext {
            session_id: random_guid_id(),
            authentication_token: random_guid_id(),
            identity,
        };
        let verdict = self.access_control().activate_session(&session);
        if !verdict.is_good() {
            log::warn!("Session activation for {:?} rejected: {}", session.identity, verdict);
            return Err(verdict.into());
        }
        let session_id = session.session_id.clone();
        self.sessions.lock().insert(session)?;
        log::debug!("Session {} activated", session_id);
        Ok(session_id)
    }

    fn close_session(&self, session_id: &NodeId) -> UaResult<()> {
        let session = self
            .sessions
            .lock()
            .remove(session_id)
            .ok_or(StatusCode::BAD_SESSION_ID_INVALID)?;
        self.access_control().close_session(&session);
        log::debug!("Session {} closed", session_id);
        Ok(())
    }

    /// Number of active sessions
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::runtime::Runtime;
    use tokio_test::{assert_err, assert_ok};

    fn session(n: u32) -> SessionContext {
        SessionContext {
            session_id: NodeId::numeric(1, n),
            authentication_token: NodeId::numeric(1, 100 + n),
            identity: UserIdentity::Anonymous,
        }
    }

    #[test]
    fn test_session_table_limit() {
        let mut table = SessionTable::new(1);
        assert_ok!(table.insert(session(1)));
        let err = table.insert(session(2)).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_TOO_MANY_SESSIONS);
        assert!(table.remove(&NodeId::numeric(1, 1)).is_some());
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_activation_through_loop() {
        let server = Runtime::new()
            .create_server(ServerConfig::default().with_max_iteration_wait_ms(10).with_max_sessions(1));
        server.add_login("op", "pw");
        server.enable_simple_login();
        let connector = server.connector();
        let task = tokio::spawn({
            let server = server.clone();
            async move { server.start().await }
        });

        let denied = connector
            .activate_session(UserIdentity::user_name("op", "wrong"))
            .await
            .unwrap_err();
        assert_eq!(denied.status_code(), StatusCode::BAD_USER_ACCESS_DENIED);
        assert_err!(connector.activate_session(UserIdentity::Anonymous).await);

        let id = connector
            .activate_session(UserIdentity::user_name("op", "pw"))
            .await
            .unwrap();
        assert_eq!(server.session_count(), 1);
        let full = connector
            .activate_session(UserIdentity::user_name("op", "pw"))
            .await
            .unwrap_err();
        assert_eq!(full.status_code(), StatusCode::BAD_TOO_MANY_SESSIONS);

        assert_ok!(connector.close_session(&id).await);
        assert_err!(connector.close_session(&id).await);

        server.stop();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_requests_fail_after_drop() {
        let runtime = Runtime::new();
        let server = runtime.create_server(ServerConfig::default());
        let connector = server.connector();
        drop(server);
        let err = connector
            .activate_session(UserIdentity::Anonymous)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_SERVER_HALTED);
    }
}
