use crate::auth::{Authenticated, require};
use crate::error::ApiError;
use axum::extract::{FromRequest, FromRequestParts, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use hireai_core::approval::ApprovalService;
use hireai_core::avatar::AvatarRenderer;
use hireai_core::identity::IdentityProvider;
use hireai_core::interviewer::Interviewer;
use hireai_core::policy::Area;
use hireai_core::registration::{ApprovalStatus, EmployerForm, OrganizationForm};
use hireai_core::session_state::{Conversation, Role, Turn};
use hireai_core::store::DocumentStore;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub interviewer: Arc<dyn Interviewer>,
    pub identity: Arc<dyn IdentityProvider>,
    pub approvals: Arc<ApprovalService>,
    pub store: Arc<dyn DocumentStore>,
    pub avatar: Option<Arc<dyn AvatarRenderer>>,
}

/// `Json` whose rejections use the API error envelope.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct AppJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct AppQuery<T>(pub T);

type ApiResult = Result<Json<Value>, ApiError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/interview/start", post(start_interview))
        .route("/interview/process-answer", post(process_answer))
        .route("/interview/end", post(end_interview))
        .route("/interview/evaluate", post(evaluate_interview))
        .route("/history", get(list_history).post(save_history))
        .route("/avatar/video", post(avatar_video))
        .route("/avatar/resources", get(avatar_resources))
        .route("/employer-registration", post(register_employer))
        .route("/employer/profile", get(employer_profile))
        .route(
            "/admin/employer-registrations",
            get(list_registrations).put(review_registration),
        )
        .route("/admin/organizations", get(list_organizations))
        .route("/admin/organizations/action", post(organization_action))
        .route("/admin/make-admin", post(make_admin))
        .route("/organizations/create", post(create_organization))
        .route("/organizations/status", get(organization_status))
        .route("/organizations/members", get(list_members))
        .route("/organizations/members/{user_id}", delete(remove_member))
        .route(
            "/organizations/invitations",
            get(list_invitations).post(invite_member),
        )
        .route("/organizations/invitations/{id}", delete(revoke_invitation))
        .route("/access", get(access))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// ---- interview ----

#[derive(Deserialize)]
struct AnswerRequest {
    #[serde(default)]
    answer: String,
    #[serde(default)]
    history: Vec<Turn>,
}

#[derive(Deserialize)]
struct HistoryRequest {
    #[serde(default)]
    history: Vec<Turn>,
}

async fn start_interview(State(state): State<AppState>) -> ApiResult {
    let question = state
        .interviewer
        .opening_question()
        .await
        .map_err(|e| e.context("Failed to start interview"))?;
    tracing::info!("Interview started");
    Ok(Json(json!({ "success": true, "question": question })))
}

async fn process_answer(
    State(state): State<AppState>,
    AppJson(req): AppJson<AnswerRequest>,
) -> ApiResult {
    let answer = req.answer.trim();
    if answer.is_empty() {
        return Err(ApiError::bad_request("Answer is required"));
    }
    let next_question = state
        .interviewer
        .follow_up(&req.history, answer)
        .await
        .map_err(|e| e.context("Failed to process answer"))?;
    Ok(Json(json!({
        "success": true,
        "nextQuestion": next_question,
        "feedback": { "transcription": answer },
    })))
}

async fn end_interview(
    State(state): State<AppState>,
    AppJson(req): AppJson<HistoryRequest>,
) -> ApiResult {
    let review = state
        .interviewer
        .final_review(&req.history)
        .await
        .map_err(|e| e.context("Failed to end interview"))?;
    tracing::info!("Interview ended with score {}", review.score);
    Ok(Json(json!({
        "success": true,
        "score": review.score,
        "feedback": review.feedback,
    })))
}

async fn evaluate_interview(
    State(state): State<AppState>,
    AppJson(req): AppJson<HistoryRequest>,
) -> ApiResult {
    if !req.history.iter().any(|t| t.role == Role::Candidate) {
        return Err(ApiError::bad_request("No candidate answers to evaluate"));
    }
    let evaluation = state
        .interviewer
        .evaluate(&req.history)
        .await
        .map_err(|e| e.context("Failed to evaluate interview"))?;
    let mut body = serde_json::to_value(evaluation).map_err(anyhow::Error::from)?;
    body["success"] = json!(true);
    Ok(Json(body))
}

// ---- history ----

#[derive(Deserialize)]
struct SaveHistoryRequest {
    #[serde(default)]
    conversation: Vec<Turn>,
}

async fn list_history(
    State(state): State<AppState>,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    let conversations = state
        .store
        .conversations()
        .await
        .map_err(|e| anyhow::Error::from(e).context("Failed to fetch conversations"))?;
    Ok(Json(conversations))
}

async fn save_history(
    State(state): State<AppState>,
    AppJson(req): AppJson<SaveHistoryRequest>,
) -> Result<Json<Conversation>, ApiError> {
    let conversation = Conversation::new(req.conversation, Utc::now())
        .ok_or_else(|| ApiError::bad_request("Conversation must contain at least one message"))?;
    state
        .store
        .insert_conversation(conversation.clone())
        .await
        .map_err(|e| anyhow::Error::from(e).context("Failed to save conversation"))?;
    tracing::info!(
        "Saved conversation {} with {} messages",
        conversation.id,
        conversation.messages.len()
    );
    Ok(Json(conversation))
}

// ---- avatar ----

#[derive(Deserialize)]
struct VideoRequest {
    #[serde(default)]
    text: String,
}

fn avatar(state: &AppState) -> Result<&Arc<dyn AvatarRenderer>, ApiError> {
    state
        .avatar
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("Avatar video is not configured".to_string()))
}

async fn avatar_video(
    State(state): State<AppState>,
    AppJson(req): AppJson<VideoRequest>,
) -> ApiResult {
    if req.text.trim().is_empty() {
        return Err(ApiError::bad_request("Text is required"));
    }
    let video_url = avatar(&state)?.render(req.text.trim()).await?;
    Ok(Json(json!({
        "success": true,
        "status": "completed",
        "video_url": video_url,
    })))
}

async fn avatar_resources(State(state): State<AppState>) -> ApiResult {
    let resources = avatar(&state)?.list_resources().await?;
    Ok(Json(json!({
        "success": true,
        "talkingPhotos": resources.talking_photos,
        "voices": resources.voices,
    })))
}

// ---- employers ----

async fn register_employer(
    State(state): State<AppState>,
    AppJson(form): AppJson<EmployerForm>,
) -> Result<impl IntoResponse, ApiError> {
    let registration = state.approvals.register_employer(form).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Registration submitted successfully",
            "registration": registration,
        })),
    ))
}

async fn employer_profile(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> ApiResult {
    let email = principal
        .email
        .as_deref()
        .ok_or_else(|| ApiError::NotFound("No email address on account".to_string()))?;
    let employer = state.approvals.employer_profile(email).await?;
    Ok(Json(json!({ "success": true, "employer": employer })))
}

// ---- admin ----

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewRequest {
    registration_id: String,
    status: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrganizationAction {
    organization_id: String,
    action: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MakeAdminRequest {
    user_id: String,
}

fn parse_id(value: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(value.trim()).map_err(|_| ApiError::bad_request(format!("Invalid {what}")))
}

async fn list_registrations(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> ApiResult {
    require(&state, &principal, Area::AdminConsole).await?;
    let registrations = state.approvals.list_employer_registrations().await?;
    Ok(Json(json!({ "success": true, "registrations": registrations })))
}

async fn review_registration(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    AppJson(req): AppJson<ReviewRequest>,
) -> ApiResult {
    require(&state, &principal, Area::AdminConsole).await?;
    let id = parse_id(&req.registration_id, "registration id")?;
    let status = req.status.parse::<ApprovalStatus>()?;
    let registration = state
        .approvals
        .review_employer_registration(id, status, &principal.user_id)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Registration {status}"),
        "registration": registration,
    })))
}

async fn list_organizations(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> ApiResult {
    require(&state, &principal, Area::AdminConsole).await?;
    let organizations = state.approvals.list_organizations().await?;
    Ok(Json(json!({ "success": true, "organizations": organizations })))
}

async fn organization_action(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    AppJson(req): AppJson<OrganizationAction>,
) -> ApiResult {
    require(&state, &principal, Area::AdminConsole).await?;
    let id = parse_id(&req.organization_id, "organization id")?;
    let organization = match req.action.as_str() {
        "approve" => state.approvals.approve_organization(id).await?,
        "reject" => state.approvals.reject_organization(id).await?,
        other => return Err(ApiError::bad_request(format!("Invalid action: {other}"))),
    };
    Ok(Json(json!({ "success": true, "organization": organization })))
}

async fn make_admin(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    AppJson(req): AppJson<MakeAdminRequest>,
) -> ApiResult {
    require(&state, &principal, Area::AdminConsole).await?;
    state.approvals.make_admin(req.user_id.trim()).await?;
    Ok(Json(json!({ "success": true, "message": "User is now an admin" })))
}

// ---- organizations ----

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusQuery {
    clerk_org_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InviteRequest {
    email_address: String,
    #[serde(default = "default_member_role")]
    role: String,
}

fn default_member_role() -> String {
    "org:member".to_string()
}

#[derive(Deserialize)]
struct AccessQuery {
    area: Area,
}

async fn create_organization(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    AppJson(form): AppJson<OrganizationForm>,
) -> Result<impl IntoResponse, ApiError> {
    require(&state, &principal, Area::Onboarding).await?;
    let organization = state
        .approvals
        .request_organization(&principal, form)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "organization": organization })),
    ))
}

async fn organization_status(
    State(state): State<AppState>,
    Authenticated(_): Authenticated,
    AppQuery(query): AppQuery<StatusQuery>,
) -> ApiResult {
    let clerk_org_id = query
        .clerk_org_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("clerkOrgId is required"))?;
    let status = state.approvals.organization_status(&clerk_org_id).await?;
    Ok(Json(json!({ "success": true, "status": status })))
}

async fn list_members(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> ApiResult {
    require(&state, &principal, Area::EmployerDashboard).await?;
    let members = state.approvals.members(&principal).await?;
    Ok(Json(json!({ "success": true, "members": members })))
}

async fn invite_member(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    AppJson(req): AppJson<InviteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require(&state, &principal, Area::EmployerDashboard).await?;
    let invitation = state
        .approvals
        .invite_member(&principal, &req.email_address, &req.role)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "invitation": invitation })),
    ))
}

async fn list_invitations(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> ApiResult {
    require(&state, &principal, Area::EmployerDashboard).await?;
    let invitations = state.approvals.pending_invitations(&principal).await?;
    Ok(Json(json!({ "success": true, "invitations": invitations })))
}

async fn revoke_invitation(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
) -> ApiResult {
    require(&state, &principal, Area::EmployerDashboard).await?;
    state.approvals.revoke_invitation(&principal, &id).await?;
    Ok(Json(json!({ "success": true })))
}

async fn remove_member(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(user_id): Path<String>,
) -> ApiResult {
    require(&state, &principal, Area::EmployerDashboard).await?;
    state.approvals.remove_member(&principal, &user_id).await?;
    Ok(Json(json!({ "success": true })))
}

/// Navigation check: where may this user go, and where should they land instead.
async fn access(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    AppQuery(query): AppQuery<AccessQuery>,
) -> ApiResult {
    let policy = state.approvals.resolve_policy(&principal).await?;
    let body = match policy.authorize(query.area) {
        Ok(()) => json!({
            "success": true,
            "allowed": true,
            "policy": policy,
            "home": policy.home(),
        }),
        Err(denial) => json!({
            "success": true,
            "allowed": false,
            "policy": policy,
            "home": policy.home(),
            "reason": denial.reason,
            "redirect": denial.redirect,
        }),
    };
    Ok(Json(body))
}
