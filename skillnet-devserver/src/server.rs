//! Dev server core: shared state, REST routes, and the chat WebSocket.
//!
//! The HTTP surface mirrors the production API paths so the client can be
//! pointed at either without changes. The chat socket authenticates via a
//! `token` query parameter, enforces room membership, stores each valid
//! frame, and broadcasts the stored record to every socket in the room,
//! the sender's included.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Json;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{FromRequest, Multipart, Path, Query, Request, State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;

use skillnet_proto::auth::{
    Credentials, LoginResponse, RefreshRequest, RefreshResponse, RegisterRequest,
};
use skillnet_proto::gig::GigDraft;
use skillnet_proto::message::OutboundFrame;
use skillnet_proto::room::RoomId;

use crate::auth::TokenIssuer;
use crate::config::DevConfig;
use crate::rooms::RoomRegistry;
use crate::store::{DevStore, StoreError, UserRecord};

/// Shared dev server state.
pub struct DevState {
    /// The in-memory dataset.
    pub store: DevStore,
    /// Live chat sockets per room.
    pub rooms: RoomRegistry,
    tokens: TokenIssuer,
    refresh_calls: AtomicU64,
}

impl DevState {
    /// Build state from a resolved configuration.
    #[must_use]
    pub fn new(config: &DevConfig) -> Self {
        Self {
            store: DevStore::new(),
            rooms: RoomRegistry::new(),
            tokens: TokenIssuer::new(
                config.token_secret.clone(),
                config.access_ttl,
                config.refresh_ttl,
            ),
            refresh_calls: AtomicU64::new(0),
        }
    }

    /// How many refresh exchanges the server has performed. Lets tests
    /// assert the client's single-flight refresh behavior.
    #[must_use]
    pub fn refresh_calls(&self) -> u64 {
        self.refresh_calls.load(Ordering::Relaxed)
    }

    /// Resolve the bearer token in `headers` to a user.
    fn require_user(&self, headers: &HeaderMap) -> Result<UserRecord, ApiFailure> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| failure(StatusCode::UNAUTHORIZED, "missing bearer token"))?;
        let claims = self
            .tokens
            .verify(token, "access")
            .map_err(|e| failure(StatusCode::UNAUTHORIZED, &e.to_string()))?;
        self.store
            .user_by_username(&claims.sub)
            .ok_or_else(|| failure(StatusCode::UNAUTHORIZED, "unknown user"))
    }
}

/// An error response carrying a `detail` body, like the production API.
struct ApiFailure {
    status: StatusCode,
    detail: String,
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

fn failure(status: StatusCode, detail: &str) -> ApiFailure {
    ApiFailure {
        status,
        detail: detail.to_string(),
    }
}

impl From<StoreError> for ApiFailure {
    fn from(e: StoreError) -> Self {
        let status = match e {
            StoreError::NotFound => StatusCode::NOT_FOUND,
            StoreError::NotOwner | StoreError::NotParticipant => StatusCode::FORBIDDEN,
            StoreError::Duplicate
            | StoreError::OwnGig
            | StoreError::WrongState
            | StoreError::InvalidUsername => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            detail: e.to_string(),
        }
    }
}

/// Build the router over shared state.
fn router(state: Arc<DevState>) -> axum::Router {
    axum::Router::new()
        // auth
        .route("/api/auth/login/", post(login))
        .route("/api/auth/registration/", post(register))
        .route("/api/auth/token/refresh/", post(refresh))
        .route("/api/auth/logout/", post(logout))
        .route("/api/auth/user/profile/", get(profile).patch(update_profile))
        // chat
        .route("/api/chats/conversations/", get(conversations))
        .route("/api/chats/chat-history/{username}/", get(chat_history))
        .route("/ws/chat/{room}/", get(chat_upgrade))
        // gigs
        .route("/api/gigs/all-gigs/", get(list_gigs))
        .route("/api/gigs/create-gig/", post(create_gig))
        .route("/api/gigs/my-gigs/", get(my_gigs))
        .route("/api/gigs/swap-requests/", get(incoming_swaps))
        .route("/api/gigs/gig-detail/{id}/", get(gig_detail))
        .route("/api/gigs/update-gig/{id}/", put(update_gig))
        .route("/api/gigs/delete-gig/{id}/", delete(delete_gig))
        .route("/api/gigs/track-impression/{id}/", post(track_impression))
        .route("/api/gigs/track-click/{id}/", post(track_click))
        .route("/api/gigs/{id}/request-swap/", post(request_swap))
        .route("/api/gigs/{id}/check-request/", get(check_swap))
        .route("/api/gigs/swaps/{id}/respond/", post(respond_swap))
        .route("/api/gigs/swaps/{id}/withdraw/", post(withdraw_swap))
        .route(
            "/api/gigs/swaps/{id}/deliverables/",
            get(deliverables).post(submit_deliverable),
        )
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Auth handlers
// ---------------------------------------------------------------------------

async fn login(
    State(state): State<Arc<DevState>>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<LoginResponse>, ApiFailure> {
    let user = state
        .store
        .authenticate(&credentials.email, &credentials.password)
        .ok_or_else(|| failure(StatusCode::UNAUTHORIZED, "invalid credentials"))?;
    let response = LoginResponse {
        access: sign(&state, |t| t.access(&user))?,
        refresh: sign(&state, |t| t.refresh(&user))?,
        user: user.profile(),
    };
    tracing::info!(username = %response.user.username, "login");
    Ok(Json(response))
}

async fn register(
    State(state): State<Arc<DevState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<Response, ApiFailure> {
    let profile = state
        .store
        .add_user(&request.username, &request.email, &request.password)?;
    tracing::info!(username = %profile.username, "registered");
    Ok((StatusCode::CREATED, Json(profile)).into_response())
}

async fn refresh(
    State(state): State<Arc<DevState>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, ApiFailure> {
    let claims = state
        .tokens
        .verify(&request.refresh, "refresh")
        .map_err(|e| failure(StatusCode::UNAUTHORIZED, &e.to_string()))?;
    let user = state
        .store
        .user_by_username(&claims.sub)
        .ok_or_else(|| failure(StatusCode::UNAUTHORIZED, "unknown user"))?;
    state.refresh_calls.fetch_add(1, Ordering::Relaxed);
    tracing::debug!(username = %user.username, "token refresh");
    Ok(Json(RefreshResponse {
        access: sign(&state, |t| t.access(&user))?,
        refresh: None,
    }))
}

async fn logout(
    State(state): State<Arc<DevState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiFailure> {
    let user = state.require_user(&headers)?;
    tracing::info!(username = %user.username, "logout");
    Ok(Json(json!({})))
}

async fn profile(
    State(state): State<Arc<DevState>>,
    headers: HeaderMap,
) -> Result<Response, ApiFailure> {
    let user = state.require_user(&headers)?;
    Ok(Json(user.profile()).into_response())
}

async fn update_profile(
    State(state): State<Arc<DevState>>,
    headers: HeaderMap,
    Json(fields): Json<serde_json::Value>,
) -> Result<Response, ApiFailure> {
    let user = state.require_user(&headers)?;
    let profile = state.store.update_profile(&user.username, &fields)?;
    Ok(Json(profile).into_response())
}

fn sign(
    state: &DevState,
    f: impl FnOnce(&TokenIssuer) -> Result<String, crate::auth::TokenError>,
) -> Result<String, ApiFailure> {
    f(&state.tokens).map_err(|e| failure(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))
}

// ---------------------------------------------------------------------------
// Chat handlers
// ---------------------------------------------------------------------------

async fn conversations(
    State(state): State<Arc<DevState>>,
    headers: HeaderMap,
) -> Result<Response, ApiFailure> {
    let user = state.require_user(&headers)?;
    Ok(Json(state.store.conversations(&user.username)).into_response())
}

async fn chat_history(
    State(state): State<Arc<DevState>>,
    headers: HeaderMap,
    Path(partner): Path<String>,
) -> Result<Response, ApiFailure> {
    let user = state.require_user(&headers)?;
    let room = RoomId::for_pair(&user.username, &partner);
    Ok(Json(state.store.history(&room)).into_response())
}

#[derive(serde::Deserialize)]
struct WsQuery {
    token: String,
}

async fn chat_upgrade(
    State(state): State<Arc<DevState>>,
    Path(room): Path<String>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiFailure> {
    let claims = state
        .tokens
        .verify(&query.token, "access")
        .map_err(|e| failure(StatusCode::UNAUTHORIZED, &e.to_string()))?;
    let room = RoomId::from_raw(&room);
    if !room.involves(&claims.sub) {
        return Err(failure(StatusCode::FORBIDDEN, "not a member of this room"));
    }
    let username = claims.sub;
    Ok(ws.on_upgrade(move |socket| chat_socket(socket, state, room, username)))
}

/// Per-socket lifecycle: register in the room, pump frames both ways,
/// unregister on disconnect.
async fn chat_socket(socket: WebSocket, state: Arc<DevState>, room: RoomId, username: String) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let conn_id = state.rooms.join(&room, tx.clone()).await;
    tracing::info!(room = %room, username = %username, "chat socket open");

    // Writer task: forward broadcasts (and close frames) to the socket.
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if ws_sender.send(msg).await.is_err() || closing {
                break;
            }
        }
    });

    // Reader task: store and broadcast each valid frame.
    let reader_state = Arc::clone(&state);
    let reader_room = room.clone();
    let reader_user = username.clone();
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => {
                    handle_chat_frame(&reader_state, &reader_room, &reader_user, &tx, text.as_str())
                        .await;
                }
                Message::Close(_) => break,
                _ => {} // ping/pong/binary
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => write_task.abort(),
        _ = &mut write_task => read_task.abort(),
    }

    state.rooms.leave(&room, conn_id).await;
    tracing::info!(room = %room, username = %username, "chat socket closed");
}

/// Store one inbound frame and broadcast the stored record, or answer the
/// sender with an `{error}` frame. The sender identity always comes from
/// the authenticated socket, never from the frame.
async fn handle_chat_frame(
    state: &Arc<DevState>,
    room: &RoomId,
    username: &str,
    reply: &mpsc::UnboundedSender<Message>,
    text: &str,
) {
    let send_error = |reason: String| {
        let frame = json!({ "error": reason }).to_string();
        let _ = reply.send(Message::Text(frame.into()));
    };

    let frame: OutboundFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(room = %room, error = %e, "undecodable chat frame");
            send_error(format!("failed to process message: {e}"));
            return;
        }
    };
    if frame.message.trim().is_empty() {
        send_error("failed to process message: empty body".to_string());
        return;
    }
    if !room.involves(&frame.receiver_id) {
        send_error("failed to process message: receiver not in room".to_string());
        return;
    }

    let stored = state
        .store
        .append_message(username, &frame.receiver_id, &frame.message);
    match serde_json::to_string(&stored) {
        Ok(encoded) => state.rooms.broadcast(room, &encoded).await,
        Err(e) => tracing::error!(error = %e, "failed to encode stored message"),
    }
}

// ---------------------------------------------------------------------------
// Gig handlers
// ---------------------------------------------------------------------------

async fn list_gigs(
    State(state): State<Arc<DevState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiFailure> {
    state.require_user(&headers)?;
    let search = params.get("search").map(String::as_str);
    Ok(Json(state.store.list_gigs(search)).into_response())
}

async fn gig_detail(
    State(state): State<Arc<DevState>>,
    headers: HeaderMap,
    Path(gig_id): Path<u64>,
) -> Result<Response, ApiFailure> {
    state.require_user(&headers)?;
    let gig = state.store.gig(gig_id).ok_or(StoreError::NotFound)?;
    Ok(Json(gig).into_response())
}

async fn my_gigs(
    State(state): State<Arc<DevState>>,
    headers: HeaderMap,
) -> Result<Response, ApiFailure> {
    let user = state.require_user(&headers)?;
    Ok(Json(state.store.gigs_of(&user.username)).into_response())
}

/// Create accepts both JSON drafts and multipart forms (the latter when a
/// listing image is attached).
async fn create_gig(
    State(state): State<Arc<DevState>>,
    headers: HeaderMap,
    request: Request,
) -> Result<Response, ApiFailure> {
    let user = state.require_user(&headers)?;

    let is_multipart = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    let (draft, image) = if is_multipart {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| failure(StatusCode::BAD_REQUEST, &e.to_string()))?;
        parse_draft_form(multipart).await?
    } else {
        let Json(draft) = Json::<GigDraft>::from_request(request, &())
            .await
            .map_err(|e| failure(StatusCode::BAD_REQUEST, &e.to_string()))?;
        (draft, None)
    };

    if draft.title.trim().is_empty() {
        return Err(failure(StatusCode::BAD_REQUEST, "title is required"));
    }
    let gig = state.store.create_gig(&user.username, &draft, image);
    tracing::info!(owner = %user.username, gig_id = gig.id, "gig created");
    Ok((StatusCode::CREATED, Json(gig)).into_response())
}

/// Pull a [`GigDraft`] and optional image name out of a multipart form.
async fn parse_draft_form(
    mut multipart: Multipart,
) -> Result<(GigDraft, Option<String>), ApiFailure> {
    let mut draft = GigDraft::default();
    let mut image = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| failure(StatusCode::BAD_REQUEST, &e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "gigImage" => {
                let file_name = field.file_name().map(str::to_string);
                // Body is read and discarded; only the name is stored.
                let _ = field
                    .bytes()
                    .await
                    .map_err(|e| failure(StatusCode::BAD_REQUEST, &e.to_string()))?;
                image = file_name.map(|n| format!("/media/gigs/{n}"));
            }
            _ => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| failure(StatusCode::BAD_REQUEST, &e.to_string()))?;
                match name.as_str() {
                    "title" => draft.title = value,
                    "description" => draft.description = value,
                    "offering" => draft.offering = value,
                    "lookingFor" => draft.looking_for = value,
                    "tags" => {
                        draft.tags = serde_json::from_str(&value).map_err(|e| {
                            failure(StatusCode::BAD_REQUEST, &format!("bad tags field: {e}"))
                        })?;
                    }
                    _ => {}
                }
            }
        }
    }
    Ok((draft, image))
}

async fn update_gig(
    State(state): State<Arc<DevState>>,
    headers: HeaderMap,
    Path(gig_id): Path<u64>,
    Json(draft): Json<GigDraft>,
) -> Result<Response, ApiFailure> {
    let user = state.require_user(&headers)?;
    let gig = state.store.update_gig(gig_id, &user.username, &draft)?;
    Ok(Json(gig).into_response())
}

async fn delete_gig(
    State(state): State<Arc<DevState>>,
    headers: HeaderMap,
    Path(gig_id): Path<u64>,
) -> Result<Response, ApiFailure> {
    let user = state.require_user(&headers)?;
    state.store.delete_gig(gig_id, &user.username)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn track_impression(
    State(state): State<Arc<DevState>>,
    headers: HeaderMap,
    Path(gig_id): Path<u64>,
) -> Result<Response, ApiFailure> {
    state.require_user(&headers)?;
    let impressions = state.store.bump_impressions(gig_id)?;
    Ok(Json(json!({ "impressions": impressions })).into_response())
}

async fn track_click(
    State(state): State<Arc<DevState>>,
    headers: HeaderMap,
    Path(gig_id): Path<u64>,
) -> Result<Response, ApiFailure> {
    state.require_user(&headers)?;
    let clicks = state.store.bump_clicks(gig_id)?;
    Ok(Json(json!({ "clicks": clicks })).into_response())
}

// ---------------------------------------------------------------------------
// Swap handlers
// ---------------------------------------------------------------------------

async fn request_swap(
    State(state): State<Arc<DevState>>,
    headers: HeaderMap,
    Path(gig_id): Path<u64>,
    Json(body): Json<serde_json::Value>,
) -> Result<Response, ApiFailure> {
    let user = state.require_user(&headers)?;
    let message = body.get("message").and_then(|m| m.as_str()).unwrap_or("");
    let swap = state.store.create_swap(gig_id, &user.username, message)?;
    Ok((StatusCode::CREATED, Json(swap)).into_response())
}

async fn check_swap(
    State(state): State<Arc<DevState>>,
    headers: HeaderMap,
    Path(gig_id): Path<u64>,
) -> Result<Response, ApiFailure> {
    let user = state.require_user(&headers)?;
    Ok(Json(state.store.check_swap(gig_id, &user.username)).into_response())
}

async fn incoming_swaps(
    State(state): State<Arc<DevState>>,
    headers: HeaderMap,
) -> Result<Response, ApiFailure> {
    let user = state.require_user(&headers)?;
    Ok(Json(state.store.swaps_for_owner(&user.username)).into_response())
}

async fn respond_swap(
    State(state): State<Arc<DevState>>,
    headers: HeaderMap,
    Path(swap_id): Path<u64>,
    Json(body): Json<serde_json::Value>,
) -> Result<Response, ApiFailure> {
    let user = state.require_user(&headers)?;
    let accept = body
        .get("accept")
        .and_then(serde_json::Value::as_bool)
        .ok_or_else(|| failure(StatusCode::BAD_REQUEST, "accept field is required"))?;
    let swap = state.store.respond_swap(swap_id, &user.username, accept)?;
    Ok(Json(swap).into_response())
}

async fn withdraw_swap(
    State(state): State<Arc<DevState>>,
    headers: HeaderMap,
    Path(swap_id): Path<u64>,
) -> Result<Response, ApiFailure> {
    let user = state.require_user(&headers)?;
    let swap = state.store.withdraw_swap(swap_id, &user.username)?;
    Ok(Json(swap).into_response())
}

async fn deliverables(
    State(state): State<Arc<DevState>>,
    headers: HeaderMap,
    Path(swap_id): Path<u64>,
) -> Result<Response, ApiFailure> {
    let user = state.require_user(&headers)?;
    let list = state.store.deliverables(swap_id, &user.username)?;
    Ok(Json(list).into_response())
}

async fn submit_deliverable(
    State(state): State<Arc<DevState>>,
    headers: HeaderMap,
    Path(swap_id): Path<u64>,
    mut multipart: Multipart,
) -> Result<Response, ApiFailure> {
    let user = state.require_user(&headers)?;
    let mut comment = String::new();
    let mut file_name = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| failure(StatusCode::BAD_REQUEST, &e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "comment" => {
                comment = field
                    .text()
                    .await
                    .map_err(|e| failure(StatusCode::BAD_REQUEST, &e.to_string()))?;
            }
            "file" => {
                file_name = field.file_name().map(str::to_string);
                let _ = field
                    .bytes()
                    .await
                    .map_err(|e| failure(StatusCode::BAD_REQUEST, &e.to_string()))?;
            }
            _ => {}
        }
    }

    let deliverable = state
        .store
        .submit_deliverable(swap_id, &user.username, &comment, file_name)?;
    Ok((StatusCode::CREATED, Json(deliverable)).into_response())
}

// ---------------------------------------------------------------------------
// Server startup
// ---------------------------------------------------------------------------

/// Start a dev server with default configuration on the given address.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(DevState::new(&DevConfig::default()))).await
}

/// Start a dev server with pre-built state.
///
/// Returns the bound address and the serve task's handle; tests keep the
/// state `Arc` to seed data and read counters.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<DevState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "dev server error");
        }
    });

    Ok((bound_addr, handle))
}
