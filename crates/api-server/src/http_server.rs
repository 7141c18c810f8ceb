//! HTTP API Server
//!
//! Routes the game and withdrawal endpoints. Every route sits behind a
//! permissive CORS layer so browser clients on any origin can call it.

use crate::methods::{
    handle_cash_out, handle_get_session, handle_list_cases, handle_open_case, handle_place_bet,
    handle_round_state, handle_withdraw, ApiContext, ApiError, BetRequest, WalletRequest,
    WithdrawRequest,
};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use case_runtime::{ErrorKind, WithdrawError};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Preflight cache lifetime
const CORS_MAX_AGE: Duration = Duration::from_secs(86_400);

/// HTTP API Server
pub struct HttpApiServer {
    context: Arc<ApiContext>,
}

impl HttpApiServer {
    /// Create a new HTTP API server
    pub fn new(context: Arc<ApiContext>) -> Self {
        Self { context }
    }

    /// Create the Axum router
    pub fn router(self) -> Router {
        // CORS layer to allow browser clients
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
            .max_age(CORS_MAX_AGE);

        Router::new()
            .route("/health", get(health))
            .route("/withdraw", post(withdraw).fallback(method_not_allowed))
            .route("/cases", get(list_cases))
            .route("/cases/:id/open", post(open_case))
            .route("/crash", get(round_state))
            .route("/crash/bet", post(place_bet))
            .route("/crash/cashout", post(cash_out))
            .route("/session/:wallet", get(session))
            .layer(cors)
            .with_state(self.context)
    }

    /// Run the server
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        tracing::info!("HTTP API server listening on {}", listener.local_addr()?);

        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_code(self.kind());
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }
        (status, Json(self.body())).into_response()
    }
}

/// Map taxonomy entries to HTTP status codes
fn status_code(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidRequest
        | ErrorKind::AmountTooSmall
        | ErrorKind::InsufficientBalance => StatusCode::BAD_REQUEST,
        ErrorKind::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::WalletDeclined | ErrorKind::NetworkError => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn malformed(rejection: impl std::fmt::Display) -> ApiError {
    ApiError::Malformed(rejection.to_string())
}

async fn health() -> &'static str {
    "ok"
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

/// Handle withdrawal request
async fn withdraw(
    State(context): State<Arc<ApiContext>>,
    payload: Result<Json<WithdrawRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    // Unparseable bodies get the same answer as missing fields
    let Json(request) = payload.map_err(|_| WithdrawError::InvalidRequest)?;
    tracing::debug!("Withdraw request for {:?}", request.wallet_address);

    let receipt = handle_withdraw(&context, request)?;
    Ok((StatusCode::OK, Json(receipt)))
}

async fn list_cases(State(context): State<Arc<ApiContext>>) -> impl IntoResponse {
    Json(handle_list_cases(&context))
}

async fn open_case(
    State(context): State<Arc<ApiContext>>,
    case_id: Result<Path<u32>, PathRejection>,
    payload: Result<Json<WalletRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(case_id) = case_id.map_err(malformed)?;
    let Json(request) = payload.map_err(malformed)?;

    let response = handle_open_case(&context, case_id, request).await?;
    Ok(Json(response))
}

async fn round_state(State(context): State<Arc<ApiContext>>) -> impl IntoResponse {
    Json(handle_round_state(&context))
}

async fn place_bet(
    State(context): State<Arc<ApiContext>>,
    payload: Result<Json<BetRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload.map_err(malformed)?;
    let receipt = handle_place_bet(&context, request).await?;
    Ok(Json(receipt))
}

async fn cash_out(
    State(context): State<Arc<ApiContext>>,
    payload: Result<Json<WalletRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload.map_err(malformed)?;
    let receipt = handle_cash_out(&context, request).await?;
    Ok(Json(receipt))
}

async fn session(
    State(context): State<Arc<ApiContext>>,
    Path(wallet): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(handle_get_session(&context, &wallet)?))
}
