use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::rest::tracked;
use crate::error::AppError;
use crate::models::account::{Role, SignupFields};
use crate::models::session::SessionSnapshot;
use crate::state::AppState;
use crate::store::accounts::AccountRepository;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/:id", get(get_session).delete(close_session))
        .route("/sessions/:id/login", post(login))
        .route("/sessions/:id/signup", post(signup))
        .route("/sessions/:id/logout", post(logout))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSession {
    pub session_id: Uuid,
    pub session: SessionSnapshot,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub role: Role,
}

#[derive(Deserialize)]
pub struct SignupRequest {
    pub role: Role,
    #[serde(flatten)]
    pub fields: SignupFields,
}

async fn create_session(State(state): State<Arc<AppState>>) -> Json<CreatedSession> {
    let session = state.create_session();
    tracing::info!(session_id = %session.session_id(), "session opened");

    Json(CreatedSession {
        session_id: session.session_id(),
        session: session.snapshot(),
    })
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(state.session(id)?.snapshot()))
}

async fn close_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.close_session(id)?;
    tracing::info!(session_id = %id, "session closed");
    Ok(StatusCode::NO_CONTENT)
}

async fn login(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = state.session(id)?;
    let snapshot = tracked(&state, "login", async {
        session.login(&payload.email, &payload.password, payload.role)
    })
    .await?;
    Ok(Json(snapshot))
}

async fn signup(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SignupRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = state.session(id)?;
    let snapshot = tracked(&state, "signup", async {
        session.signup(&payload.fields, payload.role)
    })
    .await?;

    state.metrics.accounts_total.set(state.accounts.len() as i64);
    Ok(Json(snapshot))
}

async fn logout(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = state.session(id)?;
    let snapshot = tracked(&state, "logout", async { session.logout() }).await?;
    Ok(Json(snapshot))
}
