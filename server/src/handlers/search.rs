use axum::{extract::State, response::IntoResponse, response::Response};

use super::ApiQuery;
use crate::services::search::{self, SearchParams};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

pub async fn search_events(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<SearchParams>,
) -> Result<Response, AppError> {
    let (filter, page) = params.into_filter()?;
    let results = search::search(state.store.as_ref(), &filter, page).await?;

    Ok(success(results, "Search completed").into_response())
}
