//! Exposes an in-process fake of the AuthZed HTTP API for use in integration tests.
//!
//! ```
//! use authzed_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = TestServer::new().await;
//!    let endpoint = server.url("/");
//!    // point a client at the endpoint...
//! }
//! ```
//!
//! The fake keeps relationships in memory and evaluates permissions with a fixed schema:
//!
//! ```text
//! definition user {}
//!
//! definition document {
//!     relation admin: user
//!     relation editor: user
//!     relation viewer: user
//!
//!     permission remove = admin
//!     permission edit = editor + admin
//!     permission view = viewer + editor + admin
//! }
//! ```
//!
//! Permissions outside of this schema are granted by a relation of the same name.

use std::collections::HashSet;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use authzed_client::{
    CheckPermissionRequest, CheckPermissionResponse, ObjectReference, Operation, Permissionship,
    SubjectReference, WriteRelationshipsRequest, WriteRelationshipsResponse, WriteSchemaRequest,
    WriteSchemaResponse, ZedToken,
};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::{get, post};
use axum::{Json, Router};

type Stored = (ObjectReference, String, SubjectReference);
type Rejection = (StatusCode, &'static str);

#[derive(Debug, Default)]
struct FakeAuthzed {
    token: Option<String>,
    relationships: Mutex<HashSet<Stored>>,
    schema: Mutex<Option<String>>,
    revision: AtomicU64,

    fail_next: AtomicU32,
    fail_all: AtomicBool,

    write_requests: AtomicU64,
    check_requests: AtomicU64,
    health_requests: AtomicU64,
}

impl FakeAuthzed {
    /// Counts a request and applies authentication and failure injection.
    fn admit(&self, counter: &AtomicU64, headers: &HeaderMap) -> Result<(), Rejection> {
        counter.fetch_add(1, Ordering::Relaxed);

        if let Some(token) = &self.token {
            let expected = format!("Bearer {token}");
            let given = headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok());
            if given != Some(expected.as_str()) {
                return Err((StatusCode::UNAUTHORIZED, "invalid bearer token"));
            }
        }

        if self.fail_all.load(Ordering::Relaxed) {
            return Err((StatusCode::SERVICE_UNAVAILABLE, "injected failure"));
        }

        let injected = self
            .fail_next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err((StatusCode::SERVICE_UNAVAILABLE, "injected failure"));
        }

        Ok(())
    }

    fn next_token(&self) -> ZedToken {
        let revision = self.revision.fetch_add(1, Ordering::Relaxed) + 1;
        ZedToken {
            token: format!("rev-{revision}"),
        }
    }
}

fn grants(permission: &str, relation: &str) -> bool {
    match permission {
        "view" => matches!(relation, "viewer" | "editor" | "admin"),
        "edit" => matches!(relation, "editor" | "admin"),
        "remove" => relation == "admin",
        other => other == relation,
    }
}

async fn healthz(State(state): State<Arc<FakeAuthzed>>) -> Result<&'static str, Rejection> {
    state.health_requests.fetch_add(1, Ordering::Relaxed);
    if state.fail_all.load(Ordering::Relaxed) {
        return Err((StatusCode::SERVICE_UNAVAILABLE, "injected failure"));
    }
    Ok("OK")
}

async fn write_relationships(
    State(state): State<Arc<FakeAuthzed>>,
    headers: HeaderMap,
    Json(request): Json<WriteRelationshipsRequest>,
) -> Result<Json<WriteRelationshipsResponse>, Rejection> {
    state.admit(&state.write_requests, &headers)?;

    let mut relationships = state.relationships.lock().unwrap();
    for update in request.updates {
        let relationship = update.relationship;
        let stored = (
            relationship.resource,
            relationship.relation,
            relationship.subject,
        );
        match update.operation {
            Operation::Create => {
                if !relationships.insert(stored) {
                    return Err((StatusCode::CONFLICT, "relationship already exists"));
                }
            }
            Operation::Touch => {
                relationships.insert(stored);
            }
            Operation::Delete => {
                relationships.remove(&stored);
            }
        }
    }
    drop(relationships);

    Ok(Json(WriteRelationshipsResponse {
        written_at: Some(state.next_token()),
    }))
}

async fn check_permission(
    State(state): State<Arc<FakeAuthzed>>,
    headers: HeaderMap,
    Json(request): Json<CheckPermissionRequest>,
) -> Result<Json<CheckPermissionResponse>, Rejection> {
    state.admit(&state.check_requests, &headers)?;

    let allowed = state
        .relationships
        .lock()
        .unwrap()
        .iter()
        .any(|(resource, relation, subject)| {
            *resource == request.resource
                && *subject == request.subject
                && grants(&request.permission, relation)
        });

    let permissionship = if allowed {
        Permissionship::HasPermission
    } else {
        Permissionship::NoPermission
    };

    Ok(Json(CheckPermissionResponse {
        checked_at: Some(state.next_token()),
        permissionship,
    }))
}

async fn write_schema(
    State(state): State<Arc<FakeAuthzed>>,
    headers: HeaderMap,
    Json(request): Json<WriteSchemaRequest>,
) -> Result<Json<WriteSchemaResponse>, Rejection> {
    state.admit(&state.write_requests, &headers)?;
    *state.schema.lock().unwrap() = Some(request.schema);

    Ok(Json(WriteSchemaResponse {
        written_at: Some(state.next_token()),
    }))
}

/// An in-process fake AuthZed API for use in integration tests.
///
/// The server listens on a random available port on localhost and is shut down when dropped.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    state: Arc<FakeAuthzed>,
}

impl TestServer {
    /// Starts a server that accepts requests without authentication.
    pub async fn new() -> Self {
        Self::start(None).await
    }

    /// Starts a server that rejects requests not carrying `Bearer {token}`.
    pub async fn with_token(token: &str) -> Self {
        Self::start(Some(token.to_owned())).await
    }

    async fn start(token: Option<String>) -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let state = Arc::new(FakeAuthzed {
            token,
            ..Default::default()
        });

        let app = Router::new()
            .route("/healthz", get(healthz))
            .route("/v1/relationships/write", post(write_relationships))
            .route("/v1/permissions/check", post(check_permission))
            .route("/v1/schema/write", post(write_schema))
            .with_state(state.clone());

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            handle,
            socket,
            state,
        }
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.socket.port(), path)
    }

    /// Makes the next `count` API requests fail with `503 Service Unavailable`.
    pub fn fail_next(&self, count: u32) {
        self.state.fail_next.store(count, Ordering::Relaxed);
    }

    /// Makes all requests, including health probes, fail with `503 Service Unavailable`.
    pub fn fail_all(&self, fail: bool) {
        self.state.fail_all.store(fail, Ordering::Relaxed);
    }

    /// Number of requests received on the write endpoints, including rejected ones.
    pub fn write_requests(&self) -> u64 {
        self.state.write_requests.load(Ordering::Relaxed)
    }

    /// Number of requests received on the check endpoint, including rejected ones.
    pub fn check_requests(&self) -> u64 {
        self.state.check_requests.load(Ordering::Relaxed)
    }

    /// Number of health probes received.
    pub fn health_requests(&self) -> u64 {
        self.state.health_requests.load(Ordering::Relaxed)
    }

    /// Number of distinct relationships currently stored.
    pub fn relationship_count(&self) -> usize {
        self.state.relationships.lock().unwrap().len()
    }

    /// The schema written last, if any.
    pub fn schema(&self) -> Option<String> {
        self.state.schema.lock().unwrap().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
