use std::sync::Arc;
use validator::Validate;

use crate::dto::control_dto::{
    ApiResponse, DispatchBatchRequest, DispatchListQuery, DispatchRequest, FlightLogListQuery,
};
use crate::models::{DispatchRecord, FlightLog, FlightLogFilter, Page, TaskStatus};
use crate::repositories::DispatchRepository;
use crate::services::{BatchEntry, DispatchOutcome, DispatchService};
use crate::state::AppState;
use crate::utils::errors::AppResult;

pub struct ControlController {
    repository: Arc<dyn DispatchRepository>,
    dispatcher: Arc<DispatchService>,
}

impl ControlController {
    pub fn new(state: &AppState) -> Self {
        Self {
            repository: state.repository.clone(),
            dispatcher: state.dispatcher.clone(),
        }
    }

    pub async fn dispatch(&self, request: DispatchRequest) -> AppResult<ApiResponse<DispatchOutcome>> {
        request.validate()?;

        let outcome = self.dispatcher.dispatch(request.id).await?;
        let message = if outcome.task_status == TaskStatus::Running.code() {
            "Vehículo despachado".to_string()
        } else {
            "Vehículo en cola".to_string()
        };

        Ok(ApiResponse::success_with_message(outcome, message))
    }

    pub async fn dispatch_batch(
        &self,
        request: DispatchBatchRequest,
    ) -> AppResult<ApiResponse<Vec<BatchEntry>>> {
        request.validate()?;

        let entries = self.dispatcher.dispatch_batch(&request.ids).await?;
        let ok = entries.iter().filter(|e| e.success).count();
        let message = format!("{} de {} vehículos despachados", ok, entries.len());

        Ok(ApiResponse::success_with_message(entries, message))
    }

    pub async fn list_dispatch(&self, query: DispatchListQuery) -> AppResult<Page<DispatchRecord>> {
        let filter = query.into_filter()?;
        Ok(self.repository.list_dispatch_records(&filter).await?)
    }

    pub async fn list_flight_logs(&self, query: FlightLogListQuery) -> AppResult<Page<FlightLog>> {
        let filter = FlightLogFilter::from(query);
        Ok(self.repository.list_flight_logs(&filter).await?)
    }
}
