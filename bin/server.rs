// SnapSplit - Web Server
// REST API with Axum: OCR/STT/smart-split pass-through, split sessions,
// auth, archived receipts, profile

use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post, put},
    Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

use snapsplit::engine::{Assignment, Participant, ReceiptItem, ReceiptMeta, SplitSession};
use snapsplit::{
    candidate_names, delete_receipt, get_profile, get_receipts_for_owner, insert_receipt,
    setup_database, share_all_message, share_message, upsert_profile, AppConfig, AuthError,
    AuthService, OcrClient, OcrError, Receipt, SessionError, SessionStore, SmartSplitClient,
    SmartSplitError, SplitError, SttError, TranscriptionClient, UserProfile,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    sessions: Arc<SessionStore>,
    auth: Arc<AuthService>,
    ocr: Option<Arc<OcrClient>>,
    stt: Option<Arc<TranscriptionClient>>,
    smart_split: Option<Arc<SmartSplitClient>>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn err(message: &str) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.to_string()),
        }
    }
}

fn fail(status: StatusCode, message: &str) -> Response {
    (status, Json(ApiResponse::err(message))).into_response()
}

/// Map engine invalid-input failures onto user-presentable responses.
fn split_error_response(err: SplitError) -> Response {
    fail(StatusCode::UNPROCESSABLE_ENTITY, &err.to_string())
}

fn session_error_response(_: SessionError) -> Response {
    fail(StatusCode::NOT_FOUND, "split session not found")
}

fn auth_error_response(err: AuthError) -> Response {
    let status = match err {
        AuthError::NotSignedIn => StatusCode::UNAUTHORIZED,
        AuthError::EmailTaken => StatusCode::CONFLICT,
        AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
    };
    fail(status, &err.to_string())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

// ============================================================================
// Collaborator pass-through handlers
// ============================================================================

#[derive(Serialize)]
struct OcrResponse {
    vendor: String,
    total: f64,
    items: Vec<ReceiptItem>,
    confidence: f64,
    needs_retake: bool,
}

/// POST /api/ocr - Extract vendor/items/total from a receipt photo
async fn ocr_extract(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let Some(client) = state.ocr.clone() else {
        return fail(StatusCode::INTERNAL_SERVER_ERROR, "OCR service not configured");
    };

    let mut file: Option<(String, Vec<u8>)> = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("file") {
            let name = field.file_name().unwrap_or("receipt.jpg").to_string();
            match field.bytes().await {
                Ok(bytes) => file = Some((name, bytes.to_vec())),
                Err(e) => {
                    eprintln!("Error reading upload: {}", e);
                    return fail(StatusCode::BAD_REQUEST, "Failed to read upload");
                }
            }
        }
    }

    let Some((file_name, bytes)) = file else {
        return fail(StatusCode::BAD_REQUEST, "No file provided");
    };

    match client.extract(&file_name, bytes).await {
        Ok(extraction) => {
            let needs_retake = extraction.needs_retake();
            (
                StatusCode::OK,
                Json(ApiResponse::ok(OcrResponse {
                    vendor: extraction.vendor,
                    total: extraction.total,
                    items: extraction.items,
                    confidence: extraction.confidence,
                    needs_retake,
                })),
            )
                .into_response()
        }
        Err(e) => {
            eprintln!("Error extracting receipt: {}", e);
            match e {
                OcrError::Service(detail) => {
                    eprintln!("OCR service detail: {}", detail);
                    fail(StatusCode::INTERNAL_SERVER_ERROR, "OCR service error")
                }
                OcrError::Http(_) => fail(StatusCode::INTERNAL_SERVER_ERROR, "OCR service error"),
            }
        }
    }
}

#[derive(Serialize)]
struct SttResponse {
    text: String,
    names: Vec<String>,
}

/// POST /api/stt - Transcribe a voice clip into participant name candidates
async fn stt_transcribe(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let Some(client) = state.stt.clone() else {
        return fail(StatusCode::INTERNAL_SERVER_ERROR, "STT service not configured");
    };

    let mut audio: Option<Vec<u8>> = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("audio") {
            match field.bytes().await {
                Ok(bytes) => audio = Some(bytes.to_vec()),
                Err(e) => {
                    eprintln!("Error reading upload: {}", e);
                    return fail(StatusCode::BAD_REQUEST, "Failed to read upload");
                }
            }
        }
    }

    let Some(audio) = audio else {
        return fail(StatusCode::BAD_REQUEST, "No audio file provided");
    };

    match client.transcribe(audio).await {
        Ok(text) => {
            let names = candidate_names(&text);
            (StatusCode::OK, Json(ApiResponse::ok(SttResponse { text, names }))).into_response()
        }
        Err(SttError::Timeout) => fail(StatusCode::REQUEST_TIMEOUT, "Request timeout"),
        Err(e) => {
            eprintln!("Error transcribing audio: {}", e);
            fail(StatusCode::INTERNAL_SERVER_ERROR, "Speech recognition failed")
        }
    }
}

#[derive(Deserialize)]
struct SmartSplitRequest {
    items: Vec<ReceiptItem>,
    participants: Vec<Participant>,
    rule: String,
}

#[derive(Serialize)]
struct SmartSplitResponse {
    assignments: Vec<Assignment>,
}

/// POST /api/smart-split - Turn a free-text rule into item assignments
async fn smart_split(
    State(state): State<AppState>,
    Json(request): Json<SmartSplitRequest>,
) -> Response {
    let Some(client) = state.smart_split.clone() else {
        return fail(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Smart split service not configured",
        );
    };

    if request.items.is_empty() || request.participants.is_empty() || request.rule.trim().is_empty()
    {
        return fail(StatusCode::BAD_REQUEST, "Missing required parameters");
    }

    match client
        .apply_rule(&request.items, &request.participants, &request.rule)
        .await
    {
        Ok(assignments) => (
            StatusCode::OK,
            Json(ApiResponse::ok(SmartSplitResponse { assignments })),
        )
            .into_response(),
        Err(SmartSplitError::NoAssignments) => {
            fail(StatusCode::INTERNAL_SERVER_ERROR, "No valid assignments generated")
        }
        Err(e) => {
            eprintln!("Error applying smart split rule: {}", e);
            fail(StatusCode::INTERNAL_SERVER_ERROR, "Smart split processing failed")
        }
    }
}

// ============================================================================
// Split session handlers
// ============================================================================

#[derive(Deserialize)]
struct CreateSessionRequest {
    vendor: String,
    total: f64,
    #[serde(default)]
    image_url: Option<String>,
    items: Vec<ReceiptItem>,
}

#[derive(Serialize)]
struct SessionResponse {
    session_id: String,
    session: SplitSession,
}

/// POST /api/sessions - Enter the split flow with extracted receipt data
async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Response {
    let receipt = ReceiptMeta {
        vendor: request.vendor,
        total: request.total,
        image_url: request.image_url,
    };
    let session_id = state.sessions.create(receipt, request.items);
    match state.sessions.get(&session_id) {
        Ok(session) => (
            StatusCode::CREATED,
            Json(ApiResponse::ok(SessionResponse { session_id, session })),
        )
            .into_response(),
        Err(e) => session_error_response(e),
    }
}

/// GET /api/sessions/:id - Current items, participants, and totals
async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.sessions.get(&id) {
        Ok(session) => (StatusCode::OK, Json(ApiResponse::ok(session))).into_response(),
        Err(e) => session_error_response(e),
    }
}

/// DELETE /api/sessions/:id - Leave the split flow without saving
async fn discard_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.sessions.discard(&id) {
        Ok(_) => (StatusCode::OK, Json(ApiResponse::ok("discarded"))).into_response(),
        Err(e) => session_error_response(e),
    }
}

#[derive(Deserialize)]
struct AddParticipantRequest {
    name: String,
}

/// POST /api/sessions/:id/participants - Add one participant by name
async fn add_participant(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<AddParticipantRequest>,
) -> Response {
    let result = state
        .sessions
        .with_session(&id, |session| session.add_participant(&request.name).map(|p| p.clone()));

    match result {
        Ok(Ok(participant)) => (StatusCode::CREATED, Json(ApiResponse::ok(participant))).into_response(),
        Ok(Err(e)) => split_error_response(e),
        Err(e) => session_error_response(e),
    }
}

/// POST /api/sessions/:id/items/:index/toggle - Flip shared/individual
async fn toggle_item(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, usize)>,
) -> Response {
    let result = state.sessions.with_session(&id, |session| {
        session.toggle_shared(index).map(|_| session.clone())
    });

    match result {
        Ok(Ok(session)) => (StatusCode::OK, Json(ApiResponse::ok(session))).into_response(),
        Ok(Err(e)) => split_error_response(e),
        Err(e) => session_error_response(e),
    }
}

/// POST /api/sessions/:id/equal-split - Share everything evenly
async fn equal_split(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let result = state.sessions.with_session(&id, |session| {
        session.apply_equal_split().map(|_| session.clone())
    });

    match result {
        Ok(Ok(session)) => (StatusCode::OK, Json(ApiResponse::ok(session))).into_response(),
        Ok(Err(e)) => split_error_response(e),
        Err(e) => session_error_response(e),
    }
}

#[derive(Deserialize)]
struct ApplyAssignmentsRequest {
    assignments: Vec<Assignment>,
}

/// POST /api/sessions/:id/assignments - Apply smart-split assignments
async fn apply_assignments(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ApplyAssignmentsRequest>,
) -> Response {
    let result = state.sessions.with_session(&id, |session| {
        session
            .apply_assignments(&request.assignments)
            .map(|_| session.clone())
    });

    match result {
        Ok(Ok(session)) => (StatusCode::OK, Json(ApiResponse::ok(session))).into_response(),
        Ok(Err(e)) => split_error_response(e),
        Err(e) => session_error_response(e),
    }
}

#[derive(Serialize)]
struct ShareMessageEntry {
    participant_id: String,
    name: String,
    message: String,
}

#[derive(Serialize)]
struct ShareResponse {
    messages: Vec<ShareMessageEntry>,
    all: String,
}

/// GET /api/sessions/:id/share - Payment request texts for every participant
async fn session_share_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let user = match state.auth.require_user(bearer_token(&headers)) {
        Ok(user) => user,
        Err(e) => return auth_error_response(e),
    };

    let profile = {
        let conn = state.db.lock().unwrap();
        match get_profile(&conn, &user.id) {
            Ok(profile) => profile.unwrap_or_default(),
            Err(e) => {
                eprintln!("Error loading profile: {}", e);
                return fail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load profile");
            }
        }
    };

    match state.sessions.get(&id) {
        Ok(session) => {
            let messages: Vec<ShareMessageEntry> = session
                .participants
                .iter()
                .map(|p| ShareMessageEntry {
                    participant_id: p.id.clone(),
                    name: p.name.clone(),
                    message: share_message(p, &session.receipt.vendor, &profile.payment_info),
                })
                .collect();
            let all = share_all_message(
                &session.participants,
                &session.receipt.vendor,
                &profile.payment_info,
            );

            (
                StatusCode::OK,
                Json(ApiResponse::ok(ShareResponse { messages, all })),
            )
                .into_response()
        }
        Err(e) => session_error_response(e),
    }
}

// ============================================================================
// Auth handlers
// ============================================================================

#[derive(Deserialize)]
struct CredentialsRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct TokenResponse {
    token: String,
}

/// POST /api/auth/signup
async fn auth_signup(
    State(state): State<AppState>,
    Json(request): Json<CredentialsRequest>,
) -> Response {
    let conn = state.db.lock().unwrap();
    match state.auth.sign_up(&conn, &request.email, &request.password) {
        Ok(token) => (StatusCode::CREATED, Json(ApiResponse::ok(TokenResponse { token })))
            .into_response(),
        Err(e) => auth_error_response(e),
    }
}

/// POST /api/auth/signin
async fn auth_signin(
    State(state): State<AppState>,
    Json(request): Json<CredentialsRequest>,
) -> Response {
    let conn = state.db.lock().unwrap();
    match state.auth.sign_in(&conn, &request.email, &request.password) {
        Ok(token) => (StatusCode::OK, Json(ApiResponse::ok(TokenResponse { token })))
            .into_response(),
        Err(e) => auth_error_response(e),
    }
}

/// POST /api/auth/signout
async fn auth_signout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = bearer_token(&headers) {
        state.auth.sign_out(token);
    }
    (StatusCode::OK, Json(ApiResponse::ok("signed out"))).into_response()
}

/// GET /api/auth/me - Current identity behind the bearer token
async fn auth_me(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match state.auth.require_user(bearer_token(&headers)) {
        Ok(user) => (StatusCode::OK, Json(ApiResponse::ok(user))).into_response(),
        Err(e) => auth_error_response(e),
    }
}

// ============================================================================
// Receipt archive handlers
// ============================================================================

#[derive(Deserialize)]
struct SaveReceiptRequest {
    session_id: String,
}

/// POST /api/receipts - Archive a finished split and end its session
async fn save_receipt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SaveReceiptRequest>,
) -> Response {
    let user = match state.auth.require_user(bearer_token(&headers)) {
        Ok(user) => user,
        Err(e) => return auth_error_response(e),
    };

    // Snapshot first; the session is only discarded once the insert has
    // succeeded, so a failed save can be retried with the same session id.
    let session = match state.sessions.get(&request.session_id) {
        Ok(session) => session,
        Err(e) => return session_error_response(e),
    };

    let receipt = Receipt::new(
        &user.id,
        &session.receipt.vendor,
        session.receipt.total,
        session.receipt.image_url.clone(),
        session.items,
        session.participants,
    );

    let insert_result = {
        let conn = state.db.lock().unwrap();
        insert_receipt(&conn, &receipt)
    };

    match insert_result {
        Ok(()) => {
            let _ = state.sessions.discard(&request.session_id);
            (StatusCode::CREATED, Json(ApiResponse::ok(receipt))).into_response()
        }
        Err(e) => {
            eprintln!("Error saving receipt: {}", e);
            fail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save receipt")
        }
    }
}

/// GET /api/receipts - The caller's archived splits, newest first
async fn list_receipts(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user = match state.auth.require_user(bearer_token(&headers)) {
        Ok(user) => user,
        Err(e) => return auth_error_response(e),
    };

    let conn = state.db.lock().unwrap();
    match get_receipts_for_owner(&conn, &user.id) {
        Ok(receipts) => (StatusCode::OK, Json(ApiResponse::ok(receipts))).into_response(),
        Err(e) => {
            eprintln!("Error listing receipts: {}", e);
            fail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load history")
        }
    }
}

/// DELETE /api/receipts/:id
async fn remove_receipt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let user = match state.auth.require_user(bearer_token(&headers)) {
        Ok(user) => user,
        Err(e) => return auth_error_response(e),
    };

    let conn = state.db.lock().unwrap();
    match delete_receipt(&conn, &user.id, &id) {
        Ok(true) => (StatusCode::OK, Json(ApiResponse::ok("deleted"))).into_response(),
        Ok(false) => fail(StatusCode::NOT_FOUND, "Receipt not found"),
        Err(e) => {
            eprintln!("Error deleting receipt {}: {}", id, e);
            fail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete receipt")
        }
    }
}

// ============================================================================
// Profile handlers
// ============================================================================

/// GET /api/profile
async fn read_profile(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user = match state.auth.require_user(bearer_token(&headers)) {
        Ok(user) => user,
        Err(e) => return auth_error_response(e),
    };

    let conn = state.db.lock().unwrap();
    match get_profile(&conn, &user.id) {
        Ok(profile) => {
            (StatusCode::OK, Json(ApiResponse::ok(profile.unwrap_or_default()))).into_response()
        }
        Err(e) => {
            eprintln!("Error loading profile: {}", e);
            fail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load profile")
        }
    }
}

/// PUT /api/profile
async fn write_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(profile): Json<UserProfile>,
) -> Response {
    let user = match state.auth.require_user(bearer_token(&headers)) {
        Ok(user) => user,
        Err(e) => return auth_error_response(e),
    };

    let profile = UserProfile {
        account_name: profile.account_name.trim().to_string(),
        payment_info: profile.payment_info.trim().to_string(),
    };

    let conn = state.db.lock().unwrap();
    match upsert_profile(&conn, &user.id, &profile) {
        Ok(()) => (StatusCode::OK, Json(ApiResponse::ok(profile))).into_response(),
        Err(e) => {
            eprintln!("Error saving profile: {}", e);
            fail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save profile")
        }
    }
}

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    println!("🌐 SnapSplit - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = AppConfig::from_env();

    let conn = Connection::open(&config.db_path).expect("Failed to open database");
    setup_database(&conn).expect("Failed to initialize schema");
    println!("✓ Database opened: {:?}", config.db_path);

    if config.mindee_api_key.is_none() {
        println!("⚠ MINDEE_API_KEY not set - /api/ocr disabled");
    }
    if config.openai_api_key.is_none() {
        println!("⚠ OPENAI_API_KEY not set - /api/stt and /api/smart-split disabled");
    }

    // Create shared state
    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        sessions: Arc::new(SessionStore::new()),
        auth: Arc::new(AuthService::new()),
        ocr: config
            .mindee_api_key
            .as_deref()
            .map(|key| Arc::new(OcrClient::new(key))),
        stt: config
            .openai_api_key
            .as_deref()
            .map(|key| Arc::new(TranscriptionClient::new(key))),
        smart_split: config
            .openai_api_key
            .as_deref()
            .map(|key| Arc::new(SmartSplitClient::new(key))),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/ocr", post(ocr_extract))
        .route("/stt", post(stt_transcribe))
        .route("/smart-split", post(smart_split))
        .route("/sessions", post(create_session))
        .route("/sessions/:id", get(get_session))
        .route("/sessions/:id", delete(discard_session))
        .route("/sessions/:id/participants", post(add_participant))
        .route("/sessions/:id/items/:index/toggle", post(toggle_item))
        .route("/sessions/:id/equal-split", post(equal_split))
        .route("/sessions/:id/assignments", post(apply_assignments))
        .route("/sessions/:id/share", get(session_share_messages))
        .route("/auth/signup", post(auth_signup))
        .route("/auth/signin", post(auth_signin))
        .route("/auth/signout", post(auth_signout))
        .route("/auth/me", get(auth_me))
        .route("/receipts", post(save_receipt))
        .route("/receipts", get(list_receipts))
        .route("/receipts/:id", delete(remove_receipt))
        .route("/profile", get(read_profile))
        .route("/profile", put(write_profile))
        .with_state(state);

    // Build main router
    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.addr)
        .await
        .expect("Failed to bind to address");

    println!("\n🚀 Server running on http://{}", config.addr);
    println!("   Health: http://{}/api/health", config.addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
