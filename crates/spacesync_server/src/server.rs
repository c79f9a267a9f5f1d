//! Main sync server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::RequestHandler;
use crate::poke::PokeStream;
use spacesync_core::SyncEngine;
use spacesync_protocol::{
    CreateSpaceResponse, ErrorBody, PullRequest, PullResponse, PushRequest, PushResponse,
    SpaceExistsResponse, SpaceId, WireMessage,
};
use tracing::{debug, error};

/// A decoded route with its raw JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncRequest {
    /// `POST /push?spaceID=...`
    Push {
        /// Target space.
        space_id: SpaceId,
        /// JSON `PushRequest`.
        body: Vec<u8>,
    },
    /// `POST /pull?spaceID=...`
    Pull {
        /// Target space.
        space_id: SpaceId,
        /// JSON `PullRequest`.
        body: Vec<u8>,
    },
    /// `POST /create-space`, with an optional requested id.
    CreateSpace {
        /// Requested id; generated when absent.
        space_id: Option<SpaceId>,
    },
    /// `GET /space-exists?spaceID=...`
    SpaceExists {
        /// Space to check.
        space_id: SpaceId,
    },
}

impl SyncRequest {
    /// Route name, for logs.
    pub fn route(&self) -> &'static str {
        match self {
            SyncRequest::Push { .. } => "push",
            SyncRequest::Pull { .. } => "pull",
            SyncRequest::CreateSpace { .. } => "create-space",
            SyncRequest::SpaceExists { .. } => "space-exists",
        }
    }

    /// The space the request targets, if it names one.
    pub fn space_id(&self) -> Option<&SpaceId> {
        match self {
            SyncRequest::Push { space_id, .. }
            | SyncRequest::Pull { space_id, .. }
            | SyncRequest::SpaceExists { space_id } => Some(space_id),
            SyncRequest::CreateSpace { space_id } => space_id.as_ref(),
        }
    }
}

/// Status code plus JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReply {
    /// HTTP-style status code.
    pub status: u16,
    /// JSON body.
    pub body: Vec<u8>,
}

impl SyncReply {
    fn ok(body: Vec<u8>) -> Self {
        Self { status: 200, body }
    }

    fn error(err: &ServerError) -> Self {
        let body = ErrorBody {
            error: err.to_string(),
        }
        .to_json()
        .unwrap_or_else(|_| b"{\"error\":\"internal error\"}".to_vec());
        Self {
            status: err.status_code(),
            body,
        }
    }

    /// Returns true for a 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The sync server.
///
/// Decodes JSON bodies, runs them through the [`RequestHandler`] and maps
/// errors to status codes. Routing and the actual network transport belong
/// to the embedding application.
#[derive(Debug, Clone)]
pub struct SyncServer {
    handler: RequestHandler,
}

impl SyncServer {
    /// Creates a sync server over `engine`.
    pub fn new(engine: SyncEngine, config: ServerConfig) -> Self {
        Self {
            handler: RequestHandler::new(engine, config),
        }
    }

    /// Handles one request and always produces a reply.
    pub fn handle(&self, request: SyncRequest) -> SyncReply {
        let result = match &request {
            SyncRequest::Push { space_id, body } => PushRequest::from_json(body)
                .map_err(ServerError::from)
                .and_then(|push| self.handle_push(space_id, &push))
                .and_then(|response| encode(&response)),
            SyncRequest::Pull { space_id, body } => PullRequest::from_json(body)
                .map_err(ServerError::from)
                .and_then(|pull| self.handle_pull(space_id, &pull))
                .and_then(|response| encode(&response)),
            SyncRequest::CreateSpace { space_id } => self
                .handler
                .handle_create_space(space_id.as_ref())
                .and_then(|space_id| encode(&CreateSpaceResponse { space_id })),
            SyncRequest::SpaceExists { space_id } => encode(&SpaceExistsResponse {
                exists: self.handler.handle_space_exists(space_id),
            }),
        };

        match result {
            Ok(body) => SyncReply::ok(body),
            Err(err) => {
                if err.is_server_error() {
                    error!(
                        error = %err,
                        route = request.route(),
                        space_id = ?request.space_id(),
                        "request failed"
                    );
                } else {
                    debug!(error = %err, route = request.route(), "request rejected");
                }
                SyncReply::error(&err)
            }
        }
    }

    /// Handles a decoded push request.
    pub fn handle_push(&self, space_id: &SpaceId, request: &PushRequest) -> ServerResult<PushResponse> {
        self.handler.handle_push(space_id, request)
    }

    /// Handles a decoded pull request.
    pub fn handle_pull(&self, space_id: &SpaceId, request: &PullRequest) -> ServerResult<PullResponse> {
        self.handler.handle_pull(space_id, request)
    }

    /// Opens a poke stream for `space_id`.
    ///
    /// Subscribing to a space that does not exist yet is allowed; the stream
    /// starts receiving pokes once pushes commit to it.
    pub fn subscribe(&self, space_id: &SpaceId) -> PokeStream {
        PokeStream::open(self.handler.engine().notifier(), space_id)
    }

    /// Returns the engine behind the server.
    pub fn engine(&self) -> &SyncEngine {
        self.handler.engine()
    }
}

fn encode<M: WireMessage>(message: &M) -> ServerResult<Vec<u8>> {
    message
        .to_json()
        .map_err(|e| ServerError::Internal(format!("failed to encode response: {e}")))
}
