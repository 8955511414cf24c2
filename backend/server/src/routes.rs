use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::State as Shared,
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;

use crate::{
    catalog::{Catalog, list_catalog},
    error::AppError,
    state::State,
    utils::{Voter, get_vote_request},
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub success: bool,
    pub vote_id: u64,
}

pub async fn catalog_handler(
    Shared(state): Shared<Arc<State>>,
    Voter(voter): Voter,
) -> Result<Json<Catalog>, AppError> {
    let catalog = list_catalog(state.store.as_ref(), state.config.scheme, &voter).await?;

    Ok(Json(catalog))
}

pub async fn vote_handler(
    Shared(state): Shared<Arc<State>>,
    Voter(voter): Voter,
    body: Bytes,
) -> Result<Json<Receipt>, AppError> {
    let request = get_vote_request(&body)?;
    let record = state.ledger.cast_vote(&voter, &request).await?;

    Ok(Json(Receipt {
        success: true,
        vote_id: record.id,
    }))
}

pub async fn preflight_handler() -> impl IntoResponse {
    StatusCode::OK
}

pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotSupported
}
