use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use tracing::{error, info};

use crate::app_state::AppState;
use crate::models::request::{ErrorResponse, IngressBody, IngressRequest, QueuedResponse};
use crate::services::trace_log::TraceEntry;
use crate::services::validation::validate_request;

/// Header carrying the request's region tag.
pub const LOCATION_HEADER: &str = "location";

type IngressResult = Result<(StatusCode, Json<QueuedResponse>), (StatusCode, Json<ErrorResponse>)>;

/// POST / — validate a request and put it on the intake queue.
///
/// The body is read raw so that a malformed or non-JSON body is reported as
/// an invalid request rather than an extractor rejection.
pub async fn submit_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> IngressResult {
    // Held until the job is committed, so a concurrent shutdown drains it.
    let Some(_admission) = state.lifecycle.admit().await else {
        metrics::counter!("ingress_rejected_total", "reason" => "unavailable").increment(1);
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new("Service unavailable")),
        ));
    };

    let parsed: IngressBody = serde_json::from_slice(&body).unwrap_or_default();
    let request = IngressRequest {
        method: parsed.method,
        url: parsed.url,
        location: headers
            .get(LOCATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };

    let job = match validate_request(&request) {
        Ok(validated) => validated.into_job(),
        Err(e) => {
            metrics::counter!("ingress_rejected_total", "reason" => "invalid").increment(1);
            info!(error = %e, "Rejected invalid request");
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Invalid request")),
            ));
        }
    };

    // The intake entry is traced before the dispatcher can see the job.
    let committed = || {
        state
            .trace
            .record(TraceEntry::new(state.main_queue.name(), &job))
    };
    if let Err(e) = state.main_queue.add_then(&job, committed).await {
        error!(job_id = %job.id, error = %e, "Failed to queue request");
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new("Failed to queue request")),
        ));
    }

    info!(
        job_id = %job.id,
        method = %job.method,
        url = %job.url,
        location = %job.location,
        "Request queued"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(QueuedResponse {
            message: "Request queued for processing".to_string(),
        }),
    ))
}
