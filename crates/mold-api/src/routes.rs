// Archivo: routes.rs
// Propósito: rutas HTTP de los workflows de moldes.
//
// - `POST   /workflows/:kind`                              crear
// - `GET    /workflows/:kind`                              listar (?status=&company_id=&mold_id=)
// - `GET    /workflows/:kind/:id`                          detalle con etapas, historial y checklists
// - `PATCH  /workflows/:kind/:id/status`                   transición de estado
// - `POST   /workflows/:kind/:id/stages/:stage/approve`    aprobar etapa
// - `POST   /workflows/:kind/:id/stages/:stage/reject`     rechazar etapa
// - `POST   /workflows/:kind/:id/reject`                   rechazo de escape
// - `PUT    /workflows/:kind/:id/checklists/:stage_key`    capturar checklist
// - `GET    /health`
//
// El actor llega en `x-actor-id` (autenticado aguas arriba); `idempotency-key`
// opcional se usa como `command_id`. El servicio es síncrono y se ejecuta en
// `spawn_blocking`.
use crate::error::ApiError;
use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use flow::{ChecklistCapture, ChecklistCategories, NewWorkflow, StageDecision, WorkflowDetails, WorkflowFilter,
           WorkflowKind, WorkflowOutcome, WorkflowRequest, WorkflowService, WorkflowStatus, WorkflowStore,
           WorkflowView};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub const ACTOR_HEADER: &str = "x-actor-id";
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

pub struct AppState<S>
    where S: WorkflowStore
{
    pub service: WorkflowService<S>,
}

impl<S> Clone for AppState<S> where S: WorkflowStore
{
    fn clone(&self) -> Self {
        Self { service: self.service.clone() }
    }
}

/// Router completo con trazas HTTP.
pub fn build_router<S>(service: WorkflowService<S>) -> Router
    where S: WorkflowStore + 'static
{
    Router::new().route("/health", get(health))
                 .route("/workflows/:kind", post(create::<S>).get(list::<S>))
                 .route("/workflows/:kind/:id", get(detail::<S>))
                 .route("/workflows/:kind/:id/status", patch(transition::<S>))
                 .route("/workflows/:kind/:id/stages/:stage/approve", post(approve_stage::<S>))
                 .route("/workflows/:kind/:id/stages/:stage/reject", post(reject_stage::<S>))
                 .route("/workflows/:kind/:id/reject", post(reject::<S>))
                 .route("/workflows/:kind/:id/checklists/:stage_key", put(capture_checklist::<S>))
                 .layer(TraceLayer::new_for_http())
                 .with_state(AppState { service })
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: String,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApproveBody {
    #[serde(default)]
    comments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReasonBody {
    reason: String,
}

#[derive(Debug, Deserialize)]
struct ChecklistBody {
    categories: ChecklistCategories,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub company_id: Option<String>,
    pub mold_id: Option<String>,
}

async fn health() -> Json<JsonValue> {
    Json(json!({ "status": "ok" }))
}

async fn create<S>(State(state): State<AppState<S>>,
                   Path(kind): Path<String>,
                   headers: HeaderMap,
                   body: Bytes)
                   -> Result<(StatusCode, Json<WorkflowRequest>), ApiError>
    where S: WorkflowStore + 'static
{
    let kind = parse_kind(&kind)?;
    let actor = actor_id(&headers)?;
    let mut body: JsonValue = parse_body(&body)?;
    let mold_id = match body.as_object_mut().and_then(|o| o.remove("mold_id")) {
        Some(JsonValue::String(s)) => parse_id("mold_id", &s)?,
        Some(other) => return Err(ApiError::BadRequest(format!("mold_id inválido: {}", other))),
        None => return Err(ApiError::BadRequest("mold_id es obligatorio".into())),
    };
    let details = WorkflowDetails::from_json(kind, body)?;
    let service = state.service.clone();
    let created = blocking(move || service.create_workflow(NewWorkflow { mold_id, details }, actor)).await?;
    tracing::debug!(kind = %kind, id = %created.id, "workflow creado");
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list<S>(State(state): State<AppState<S>>,
                 Path(kind): Path<String>,
                 params: Result<Query<ListParams>, QueryRejection>)
                 -> Result<Json<Vec<WorkflowRequest>>, ApiError>
    where S: WorkflowStore + 'static
{
    let kind = parse_kind(&kind)?;
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let filter = WorkflowFilter { status: params.status
                                               .as_deref()
                                               .map(|s| WorkflowStatus::parse(kind, s))
                                               .transpose()?,
                                  company_id: params.company_id
                                                    .as_deref()
                                                    .map(|s| parse_id("company_id", s))
                                                    .transpose()?,
                                  mold_id: params.mold_id.as_deref().map(|s| parse_id("mold_id", s)).transpose()? };
    let service = state.service.clone();
    Ok(Json(blocking(move || service.list_workflows(kind, &filter)).await?))
}

async fn detail<S>(State(state): State<AppState<S>>,
                   Path((kind, id)): Path<(String, String)>)
                   -> Result<Json<WorkflowView>, ApiError>
    where S: WorkflowStore + 'static
{
    let kind = parse_kind(&kind)?;
    let id = parse_id("id", &id)?;
    let service = state.service.clone();
    Ok(Json(blocking(move || service.get_workflow(kind, id)).await?))
}

async fn transition<S>(State(state): State<AppState<S>>,
                       Path((kind, id)): Path<(String, String)>,
                       headers: HeaderMap,
                       body: Bytes)
                       -> Result<Json<WorkflowOutcome>, ApiError>
    where S: WorkflowStore + 'static
{
    let kind = parse_kind(&kind)?;
    let id = parse_id("id", &id)?;
    let (actor, command_id) = (actor_id(&headers)?, idempotency_key(&headers)?);
    let StatusBody { status, reason } = parse_body(&body)?;
    let service = state.service.clone();
    let out = blocking(move || {
                  service.transition_status_with_reason(kind, id, &status, reason.as_deref(), actor, command_id)
              }).await?;
    Ok(Json(out))
}

async fn approve_stage<S>(State(state): State<AppState<S>>,
                          Path((kind, id, stage)): Path<(String, String, String)>,
                          headers: HeaderMap,
                          body: Bytes)
                          -> Result<Json<WorkflowOutcome>, ApiError>
    where S: WorkflowStore + 'static
{
    let kind = parse_kind(&kind)?;
    let id = parse_id("id", &id)?;
    let (actor, command_id) = (actor_id(&headers)?, idempotency_key(&headers)?);
    let ApproveBody { comments } = if body.iter().all(u8::is_ascii_whitespace) {
        ApproveBody::default()
    } else {
        parse_body(&body)?
    };
    let service = state.service.clone();
    let out = blocking(move || {
                  service.decide_stage(kind, id, &stage, StageDecision::Approve, comments, actor, command_id)
              }).await?;
    Ok(Json(out))
}

async fn reject_stage<S>(State(state): State<AppState<S>>,
                         Path((kind, id, stage)): Path<(String, String, String)>,
                         headers: HeaderMap,
                         body: Bytes)
                         -> Result<Json<WorkflowOutcome>, ApiError>
    where S: WorkflowStore + 'static
{
    let kind = parse_kind(&kind)?;
    let id = parse_id("id", &id)?;
    let (actor, command_id) = (actor_id(&headers)?, idempotency_key(&headers)?);
    let ReasonBody { reason } = parse_body(&body)?;
    let service = state.service.clone();
    let out = blocking(move || {
                  service.decide_stage(kind, id, &stage, StageDecision::Reject, Some(reason), actor, command_id)
              }).await?;
    Ok(Json(out))
}

async fn reject<S>(State(state): State<AppState<S>>,
                   Path((kind, id)): Path<(String, String)>,
                   headers: HeaderMap,
                   body: Bytes)
                   -> Result<Json<WorkflowOutcome>, ApiError>
    where S: WorkflowStore + 'static
{
    let kind = parse_kind(&kind)?;
    let id = parse_id("id", &id)?;
    let (actor, command_id) = (actor_id(&headers)?, idempotency_key(&headers)?);
    let ReasonBody { reason } = parse_body(&body)?;
    let service = state.service.clone();
    let out = blocking(move || service.reject(kind, id, &reason, actor, command_id)).await?;
    Ok(Json(out))
}

async fn capture_checklist<S>(State(state): State<AppState<S>>,
                              Path((kind, id, stage_key)): Path<(String, String, String)>,
                              headers: HeaderMap,
                              body: Bytes)
                              -> Result<Json<ChecklistCapture>, ApiError>
    where S: WorkflowStore + 'static
{
    let kind = parse_kind(&kind)?;
    let id = parse_id("id", &id)?;
    let actor = actor_id(&headers)?;
    let ChecklistBody { categories } = parse_body(&body)?;
    let service = state.service.clone();
    let capture = blocking(move || service.capture_checklist(kind, id, &stage_key, categories, actor)).await?;
    Ok(Json(capture))
}

async fn blocking<T, F>(f: F) -> Result<T, ApiError>
    where F: FnOnce() -> flow::Result<T> + Send + 'static,
          T: Send + 'static
{
    match tokio::task::spawn_blocking(f).await {
        Ok(res) => res.map_err(ApiError::from),
        Err(e) => Err(ApiError::Internal(format!("tarea interrumpida: {}", e))),
    }
}

fn parse_kind(raw: &str) -> Result<WorkflowKind, ApiError> {
    Ok(raw.parse::<WorkflowKind>()?)
}

fn parse_id(field: &str, raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|e| ApiError::BadRequest(format!("{} no es un UUID válido: {}", field, e)))
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("cuerpo JSON inválido: {}", e)))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, ApiError> {
    match headers.get(name) {
        None => Ok(None),
        Some(v) => v.to_str()
                    .map(|s| Some(s.trim()))
                    .map_err(|_| ApiError::BadRequest(format!("cabecera {} no es texto", name))),
    }
}

fn actor_id(headers: &HeaderMap) -> Result<Uuid, ApiError> {
    match header_str(headers, ACTOR_HEADER)? {
        Some(raw) if !raw.is_empty() => parse_id(ACTOR_HEADER, raw),
        _ => Err(ApiError::Unauthenticated(ACTOR_HEADER)),
    }
}

fn idempotency_key(headers: &HeaderMap) -> Result<Option<Uuid>, ApiError> {
    header_str(headers, IDEMPOTENCY_HEADER)?.filter(|s| !s.is_empty())
                                            .map(|raw| parse_id(IDEMPOTENCY_HEADER, raw))
                                            .transpose()
}
