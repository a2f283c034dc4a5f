use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::tracked;
use crate::error::AppError;
use crate::models::payment::{PaymentForm, PaymentMethod};
use crate::models::session::SessionSnapshot;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sessions/:id/location", post(submit_location))
        .route("/sessions/:id/drivers/search", post(search_drivers))
        .route("/sessions/:id/drivers/select", post(select_driver))
        .route("/sessions/:id/payment/method", post(select_payment_method))
        .route("/sessions/:id/payment/details", post(submit_payment_details))
        .route("/sessions/:id/payment/verify", post(submit_verification_code))
        .route("/sessions/:id/reset", post(reset))
}

#[derive(Deserialize)]
pub struct LocationRequest {
    #[serde(default)]
    pub pickup: String,
    #[serde(default)]
    pub destination: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectDriverRequest {
    pub driver_id: String,
}

#[derive(Deserialize)]
pub struct PaymentMethodRequest {
    pub method: PaymentMethod,
}

#[derive(Deserialize)]
pub struct VerificationRequest {
    pub code: String,
}

async fn submit_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<LocationRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = state.session(id)?;
    let snapshot = tracked(
        &state,
        "submit_location",
        session.submit_location(&payload.pickup, &payload.destination),
    )
    .await?;
    Ok(Json(snapshot))
}

async fn search_drivers(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = state.session(id)?;
    let snapshot = tracked(&state, "search_drivers", session.search_drivers()).await?;
    Ok(Json(snapshot))
}

async fn select_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SelectDriverRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = state.session(id)?;
    let snapshot = tracked(&state, "select_driver", session.select_driver(&payload.driver_id)).await?;
    Ok(Json(snapshot))
}

async fn select_payment_method(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PaymentMethodRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = state.session(id)?;
    let snapshot = tracked(&state, "select_payment_method", async {
        session.select_payment_method(payload.method)
    })
    .await?;
    Ok(Json(snapshot))
}

async fn submit_payment_details(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PaymentForm>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = state.session(id)?;
    let snapshot = tracked(
        &state,
        "submit_payment_details",
        session.submit_payment_details(&payload),
    )
    .await?;
    Ok(Json(snapshot))
}

async fn submit_verification_code(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<VerificationRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = state.session(id)?;
    let snapshot = tracked(
        &state,
        "submit_verification_code",
        session.submit_verification_code(&payload.code),
    )
    .await?;
    Ok(Json(snapshot))
}

async fn reset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = state.session(id)?;
    let snapshot = tracked(&state, "reset", async { session.reset() }).await?;
    Ok(Json(snapshot))
}
