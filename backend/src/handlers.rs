use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{middleware, Extension, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth;
use crate::config::AppConfig;
use crate::error::{ProposalError, ValidationError};
use crate::models::ProposalView;
use crate::proposal::{Actor, CreateProposalRequest, ProposalService};
use crate::status::Role;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub proposals: ProposalService,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

/// Diesel calls block, so service work runs on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T, ProposalError>
where
    F: FnOnce() -> Result<T, ProposalError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ProposalError::Task(e.to_string()))?
}

async fn create_proposal(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    payload: Result<Json<CreateProposalRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ProposalError> {
    let Json(mut request) = payload.map_err(|e| ValidationError::Body(e.body_text()))?;
    match actor.role {
        Role::Admin => {}
        Role::Guest if request.guest_id.map_or(true, |id| id == actor.user_id) => {
            if request.status.is_some() || request.suggestion_metadata.is_some() {
                return Err(ProposalError::Forbidden(
                    "only operators may set the initial status or suggestion metadata".to_string(),
                ));
            }
            request.guest_id = Some(actor.user_id);
        }
        _ => {
            return Err(ProposalError::Forbidden(
                "proposals can only be submitted by the guest or an operator".to_string(),
            ))
        }
    }

    let service = state.proposals.clone();
    let created = blocking(move || service.create(request)).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "proposal_id": created.proposal_id,
            "status": created.status.display(),
            "order_ranking": created.order_ranking,
        })),
    ))
}

async fn get_proposal(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(proposal_id): Path<Uuid>,
) -> Result<Json<ProposalView>, ProposalError> {
    let service = state.proposals.clone();
    let proposal = blocking(move || service.get(&actor, proposal_id)).await?;
    Ok(Json(ProposalView::from(&proposal)))
}

async fn cancel_proposal(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(proposal_id): Path<Uuid>,
    body: Option<Json<CancelRequest>>,
) -> Result<Json<Value>, ProposalError> {
    let reason = body.and_then(|Json(body)| body.reason);
    let service = state.proposals.clone();
    let proposal =
        blocking(move || service.cancel(&actor, proposal_id, reason.as_deref())).await?;
    Ok(Json(json!({
        "success": true,
        "proposal_id": proposal.id,
        "status": proposal.status.display(),
    })))
}

pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/proposals", post(create_proposal))
        .route("/proposals/:id", get(get_proposal))
        .route("/proposals/:id/cancel", post(cancel_proposal))
        .layer(middleware::from_fn_with_state(state.clone(), auth::authenticate));

    Router::new()
        .route("/health", get(|| async { Json(json!({ "status": "ok" })) }))
        .merge(protected_routes)
        .with_state(state)
}
