use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::dto::{
    AddProductRequest, ComparisonQuery, ComparisonResponse, MembershipResponse,
    OpenSessionRequest, SelectionResponse, SessionResponse,
};
use super::session::ComparisonSession;
use crate::error::AppError;
use crate::identifiers::ProductId;
use crate::products::deep_link::{resolve_deep_link, DeepLink};
use crate::state::AppState;

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(open_session))
        .route("/sessions/:sid", delete(close_session))
}

pub fn selection_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/sessions/:sid/selection",
            get(get_selection).post(add_product).delete(clear_products),
        )
        .route(
            "/sessions/:sid/selection/:product_id",
            get(is_in_comparison).delete(remove_product),
        )
        .route("/sessions/:sid/comparison", get(get_comparison))
}

async fn live_session(state: &AppState, sid: Uuid) -> Result<ComparisonSession, AppError> {
    state
        .sessions
        .get(sid)
        .await
        .ok_or(AppError::NotFound("session"))
}

/// POST /sessions { session_id?, initial_ids?, deep_link? }
#[instrument(skip(state, body))]
pub async fn open_session(
    State(state): State<AppState>,
    Json(body): Json<OpenSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    let (seed, linked_products) = match body.deep_link.as_deref() {
        Some(path) => {
            let link = DeepLink::parse(path).map_err(|e| AppError::BadRequest(e.to_string()))?;
            let resolved = resolve_deep_link(state.products.as_ref(), link).await?;
            (resolved.product_ids, resolved.products)
        }
        None => (
            body.initial_ids
                .iter()
                .filter_map(|s| ProductId::parse(s.trim()))
                .collect::<Vec<_>>(),
            Vec::new(),
        ),
    };

    let resumed = body.session_id.is_some();
    let session_id = body.session_id.unwrap_or_else(Uuid::new_v4);
    let session = state.sessions.open(session_id, &seed).await;
    let status = if resumed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((
        status,
        Json(SessionResponse {
            session_id,
            selection: session.selection().into(),
            linked_products,
        }),
    ))
}

/// DELETE /sessions/:sid
#[instrument(skip(state))]
pub async fn close_session(
    State(state): State<AppState>,
    Path(sid): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.sessions.close(sid).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("session"))
    }
}

#[instrument(skip(state))]
pub async fn get_selection(
    State(state): State<AppState>,
    Path(sid): Path<Uuid>,
) -> Result<Json<SelectionResponse>, AppError> {
    let session = live_session(&state, sid).await?;
    Ok(Json(session.selection().into()))
}

/// POST /sessions/:sid/selection { input }; invalid or surplus ids are
/// dropped without error.
#[instrument(skip(state, body))]
pub async fn add_product(
    State(state): State<AppState>,
    Path(sid): Path<Uuid>,
    Json(body): Json<AddProductRequest>,
) -> Result<Json<SelectionResponse>, AppError> {
    let session = live_session(&state, sid).await?;
    Ok(Json(session.add_product(&body.input).into()))
}

#[instrument(skip(state))]
pub async fn clear_products(
    State(state): State<AppState>,
    Path(sid): Path<Uuid>,
) -> Result<Json<SelectionResponse>, AppError> {
    let session = live_session(&state, sid).await?;
    Ok(Json(session.clear_products().into()))
}

#[instrument(skip(state))]
pub async fn remove_product(
    State(state): State<AppState>,
    Path((sid, product_id)): Path<(Uuid, String)>,
) -> Result<Json<SelectionResponse>, AppError> {
    let session = live_session(&state, sid).await?;
    Ok(Json(session.remove_product(&product_id).into()))
}

#[instrument(skip(state))]
pub async fn is_in_comparison(
    State(state): State<AppState>,
    Path((sid, product_id)): Path<(Uuid, String)>,
) -> Result<Json<MembershipResponse>, AppError> {
    let session = live_session(&state, sid).await?;
    let in_comparison = session.is_in_comparison(&product_id);
    Ok(Json(MembershipResponse {
        product_id,
        in_comparison,
    }))
}

/// GET /sessions/:sid/comparison[?wait=true]
#[instrument(skip(state))]
pub async fn get_comparison(
    State(state): State<AppState>,
    Path(sid): Path<Uuid>,
    Query(q): Query<ComparisonQuery>,
) -> Result<Json<ComparisonResponse>, AppError> {
    let session = live_session(&state, sid).await?;
    let snapshot = if q.wait {
        session.settled().await
    } else {
        session.comparison_state()
    };
    let selected = session.selection().len();
    Ok(Json(ComparisonResponse::new(snapshot, selected)))
}
