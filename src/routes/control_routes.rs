use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    routing::{get, post},
    Json, Router,
};

use crate::controllers::control_controller::ControlController;
use crate::dto::control_dto::{
    ApiResponse, DispatchBatchRequest, DispatchListQuery, DispatchRequest, FlightLogListQuery,
};
use crate::models::{DispatchRecord, FlightLog, Page};
use crate::services::{BatchEntry, DispatchOutcome};
use crate::state::AppState;
use crate::utils::errors::AppError;

pub fn create_control_router() -> Router<AppState> {
    Router::new()
        .route("/dispatch", post(dispatch))
        .route("/dispatchBatch", post(dispatch_batch))
        .route("/getDispatch", get(list_dispatch))
        .route("/getFlightLogs", get(list_flight_logs))
}

async fn dispatch(
    State(state): State<AppState>,
    payload: Result<Json<DispatchRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<DispatchOutcome>>, AppError> {
    let Json(request) = payload?;
    let controller = ControlController::new(&state);
    let response = controller.dispatch(request).await?;
    Ok(Json(response))
}

async fn dispatch_batch(
    State(state): State<AppState>,
    payload: Result<Json<DispatchBatchRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Vec<BatchEntry>>>, AppError> {
    let Json(request) = payload?;
    let controller = ControlController::new(&state);
    let response = controller.dispatch_batch(request).await?;
    Ok(Json(response))
}

async fn list_dispatch(
    State(state): State<AppState>,
    query: Result<Query<DispatchListQuery>, QueryRejection>,
) -> Result<Json<Page<DispatchRecord>>, AppError> {
    let Query(query) = query?;
    let controller = ControlController::new(&state);
    let response = controller.list_dispatch(query).await?;
    Ok(Json(response))
}

async fn list_flight_logs(
    State(state): State<AppState>,
    query: Result<Query<FlightLogListQuery>, QueryRejection>,
) -> Result<Json<Page<FlightLog>>, AppError> {
    let Query(query) = query?;
    let controller = ControlController::new(&state);
    let response = controller.list_flight_logs(query).await?;
    Ok(Json(response))
}
