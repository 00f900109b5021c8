use crate::api::error::{ApiError, ApiResult};
use crate::api::types::*;
use crate::coordinator::TransferCoordinator;
use crate::job::{JobId, JobState, TransferKind};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

const DEFAULT_LAST_LIMIT: u32 = 20;

pub struct RestApi {
    coordinator: Arc<TransferCoordinator>,
}

impl RestApi {
    pub fn new(coordinator: TransferCoordinator) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_check))
            .route("/api/v1/status", get(queue_status))
            .route("/api/v1/queue/pause", post(pause_queue))
            .route("/api/v1/queue/resume", post(resume_queue))
            .route("/api/v1/queue/purge", post(purge_queue))
            .route("/api/v1/transfers", post(enqueue_transfer))
            .route("/api/v1/transfers", get(list_transfers))
            .route("/api/v1/transfers/:id", get(get_transfer))
            .route("/api/v1/transfers/:id/items", get(get_transfer_items))
            .route("/api/v1/transfers/:id/restart", post(restart_transfer))
            .route("/api/v1/transfers/:id/resubmit", post(resubmit_transfer))
            .route("/api/v1/transfers/:id/cancel", post(cancel_transfer))
            .with_state(self.coordinator.clone())
    }
}

async fn health_check() -> &'static str {
    "OK"
}

async fn queue_status(
    State(coordinator): State<Arc<TransferCoordinator>>,
) -> ApiResult<Json<QueueStatusResponse>> {
    let status = coordinator.status();
    let enqueued = coordinator
        .store()
        .count_in_state(JobState::Enqueued)
        .await?;

    Ok(Json(QueueStatusResponse {
        running: status.running,
        error: status.error,
        paused: status.paused,
        active_job: coordinator.active_job_id().await,
        enqueued,
    }))
}

async fn pause_queue(
    State(coordinator): State<Arc<TransferCoordinator>>,
) -> ApiResult<Json<SuccessResponse>> {
    coordinator.pause().await;
    Ok(Json(SuccessResponse {
        message: "Queue paused".to_string(),
    }))
}

async fn resume_queue(
    State(coordinator): State<Arc<TransferCoordinator>>,
) -> ApiResult<Json<SuccessResponse>> {
    let started = coordinator.resume().await?;
    let message = match started {
        Some(job) => format!("Queue resumed, started transfer {}", job.id),
        None => "Queue resumed".to_string(),
    };
    Ok(Json(SuccessResponse { message }))
}

async fn purge_queue(
    State(coordinator): State<Arc<TransferCoordinator>>,
) -> ApiResult<Json<PurgeResponse>> {
    let purged = coordinator.purge().await?;
    Ok(Json(PurgeResponse { purged }))
}

async fn enqueue_transfer(
    State(coordinator): State<Arc<TransferCoordinator>>,
    Json(req): Json<EnqueueTransferRequest>,
) -> ApiResult<(StatusCode, Json<TransferJobResponse>)> {
    let account = req.account.into();
    let job = match req.kind {
        TransferKind::Put => {
            coordinator
                .enqueue_put(&req.source_path, &req.target_path, &req.resource, account)
                .await?
        }
        TransferKind::Get => {
            coordinator
                .enqueue_get(&req.source_path, &req.target_path, &req.resource, account)
                .await?
        }
        TransferKind::Replicate => {
            coordinator
                .enqueue_replicate(&req.source_path, &req.resource, account)
                .await?
        }
    };

    Ok((StatusCode::CREATED, Json(job.into())))
}

async fn list_transfers(
    State(coordinator): State<Arc<TransferCoordinator>>,
    Query(query): Query<ListTransfersQuery>,
) -> ApiResult<Json<ListTransfersResponse>> {
    let store = coordinator.store();
    let jobs = match query.view {
        QueueView::Current => store.current_queue().await?,
        QueueView::Recent => store.recent_queue().await?,
        QueueView::Errors => store.error_queue().await?,
        QueueView::Warnings => store.warning_queue().await?,
        QueueView::Last => {
            store
                .last_n(query.limit.unwrap_or(DEFAULT_LAST_LIMIT))
                .await?
        }
    };

    let transfers: Vec<TransferJobResponse> = jobs.into_iter().map(Into::into).collect();
    Ok(Json(ListTransfersResponse {
        view: query.view,
        count: transfers.len(),
        transfers,
    }))
}

async fn get_transfer(
    State(coordinator): State<Arc<TransferCoordinator>>,
    Path(id): Path<JobId>,
) -> ApiResult<Json<TransferJobResponse>> {
    let job = coordinator
        .store()
        .find(id)
        .await?
        .ok_or(crate::coordinator::CoordinatorError::TransferNotFound(id))?;
    Ok(Json(job.into()))
}

async fn get_transfer_items(
    State(coordinator): State<Arc<TransferCoordinator>>,
    Path(id): Path<JobId>,
    Query(query): Query<ItemsQuery>,
) -> ApiResult<Json<TransferItemsResponse>> {
    let store = coordinator.store();
    if store.find(id).await?.is_none() {
        return Err(crate::coordinator::CoordinatorError::TransferNotFound(id).into());
    }

    let items = if query.errors_only {
        store.error_items_for(id).await?
    } else {
        store.items_for(id).await?
    };

    Ok(Json(TransferItemsResponse {
        job_id: id,
        count: items.len(),
        items,
    }))
}

async fn restart_transfer(
    State(coordinator): State<Arc<TransferCoordinator>>,
    Path(id): Path<JobId>,
) -> ApiResult<Json<TransferJobResponse>> {
    let job = coordinator.restart_transfer(id).await?;
    Ok(Json(job.into()))
}

async fn resubmit_transfer(
    State(coordinator): State<Arc<TransferCoordinator>>,
    Path(id): Path<JobId>,
) -> ApiResult<Json<TransferJobResponse>> {
    let job = coordinator.resubmit_transfer(id).await?;
    Ok(Json(job.into()))
}

async fn cancel_transfer(
    State(coordinator): State<Arc<TransferCoordinator>>,
    Path(id): Path<JobId>,
) -> ApiResult<Json<TransferJobResponse>> {
    let job = coordinator.set_transfer_as_cancelled(id).await?;
    if job.state != JobState::Cancelled {
        return Err(ApiError::Conflict(format!(
            "Transfer {id} is already {}",
            job.state
        )));
    }
    Ok(Json(job.into()))
}
