use actix_web::{
    error::{JsonPayloadError, PathError},
    get,
    http::StatusCode,
    post, web, HttpRequest, HttpResponse, ResponseError,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

use crate::auth::{authenticate, AuthError, TokenSigner};
use crate::balance::group_balances;
use crate::error::LedgerError;
use crate::ledger::LedgerStore;
use crate::schemas::{Group, GroupId, Member, MemberId, NewExpense};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("not a member of group {0}")]
    Forbidden(GroupId),
    #[error("{0}")]
    InvalidId(String),
    #[error("{0}")]
    InvalidBody(String),
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            ApiError::Ledger(LedgerError::NotFound { .. }) => "not_found",
            ApiError::Ledger(LedgerError::DuplicateExpense(_)) => "duplicate_expense",
            ApiError::Ledger(LedgerError::InvalidExpense(_)) => "invalid_expense",
            ApiError::Ledger(LedgerError::InvalidGroup(_)) => "invalid_group",
            ApiError::Ledger(LedgerError::InvalidMember(_)) => "invalid_member",
            ApiError::Ledger(LedgerError::Storage(_)) => "storage_error",
            ApiError::Auth(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::InvalidId(_) => "invalid_id",
            ApiError::InvalidBody(_) => "invalid_body",
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Ledger(LedgerError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Ledger(LedgerError::DuplicateExpense(_)) => StatusCode::CONFLICT,
            ApiError::Ledger(
                LedgerError::InvalidExpense(_)
                | LedgerError::InvalidGroup(_)
                | LedgerError::InvalidMember(_),
            ) => StatusCode::BAD_REQUEST,
            ApiError::Ledger(LedgerError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::InvalidId(_) | ApiError::InvalidBody(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let ApiError::Ledger(LedgerError::Storage(message)) = self {
            error!(%message, "ledger storage failed");
        }
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.code(),
            "message": self.to_string(),
        }))
    }
}

type Store = web::Data<dyn LedgerStore>;
type Signer = web::Data<TokenSigner>;

#[derive(Deserialize)]
struct SignUpJson {
    name: String,
}

#[derive(Serialize)]
struct SignUpResponse {
    member: Member,
    token: String,
}

#[derive(Deserialize)]
struct NewGroupJson {
    name: String,
    #[serde(default)]
    members: Vec<MemberId>,
}

async fn group_for(store: &dyn LedgerStore, group_id: GroupId, caller: MemberId) -> Result<Group, ApiError> {
    let group = store.get_group(group_id).await?;
    if !group.has_member(caller) {
        return Err(ApiError::Forbidden(group_id));
    }
    Ok(group)
}

#[post("/members")]
async fn sign_up(store: Store, signer: Signer, json: web::Json<SignUpJson>) -> Result<HttpResponse, ApiError> {
    let member = store.create_member(json.into_inner().name).await?;
    let token = signer.issue(member.id, Utc::now());
    Ok(HttpResponse::Created().json(SignUpResponse { member, token }))
}

/// Swaps a still valid token for a fresh one.
#[post("/tokens")]
async fn renew_token(request: HttpRequest, store: Store, signer: Signer) -> Result<HttpResponse, ApiError> {
    let caller = authenticate(&request, &signer)?;
    let member = store.get_member(caller).await?;
    let token = signer.issue(member.id, Utc::now());
    Ok(HttpResponse::Ok().json(SignUpResponse { member, token }))
}

#[get("/members/me")]
async fn current_member(request: HttpRequest, store: Store, signer: Signer) -> Result<HttpResponse, ApiError> {
    let caller = authenticate(&request, &signer)?;
    Ok(HttpResponse::Ok().json(store.get_member(caller).await?))
}

#[post("/groups")]
async fn add_group(
    request: HttpRequest,
    store: Store,
    signer: Signer,
    json: web::Json<NewGroupJson>,
) -> Result<HttpResponse, ApiError> {
    let caller = authenticate(&request, &signer)?;
    let NewGroupJson { name, members } = json.into_inner();
    let members = std::iter::once(caller).chain(members).collect();
    let group = store.create_group(name, members).await?;
    Ok(HttpResponse::Created().json(group))
}

#[get("/groups/{id}")]
async fn get_group(
    request: HttpRequest,
    store: Store,
    signer: Signer,
    id: web::Path<GroupId>,
) -> Result<HttpResponse, ApiError> {
    let caller = authenticate(&request, &signer)?;
    let group = group_for(store.get_ref(), id.into_inner(), caller).await?;
    Ok(HttpResponse::Ok().json(group))
}

#[post("/groups/{id}/expenses")]
async fn add_expense(
    request: HttpRequest,
    store: Store,
    signer: Signer,
    id: web::Path<GroupId>,
    expense: web::Json<NewExpense>,
) -> Result<HttpResponse, ApiError> {
    let caller = authenticate(&request, &signer)?;
    let group_id = id.into_inner();
    group_for(store.get_ref(), group_id, caller).await?;
    let group = store
        .append_expense(group_id, expense.into_inner(), Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(group))
}

#[get("/groups/{id}/balances")]
async fn get_balances(
    request: HttpRequest,
    store: Store,
    signer: Signer,
    id: web::Path<GroupId>,
) -> Result<HttpResponse, ApiError> {
    let caller = authenticate(&request, &signer)?;
    let group_id = id.into_inner();
    let group = group_for(store.get_ref(), group_id, caller).await?;
    let members = store.get_members(&group.members).await?;
    let report = group_balances(&group, members)?;
    debug!(%group_id, debtors = report.balances.len(), "balances computed");
    Ok(HttpResponse::Ok().json(report))
}

// An id that fails to parse inside an expense body is an unknown member.
fn json_rejection(err: JsonPayloadError, request: &HttpRequest) -> actix_web::Error {
    let message = err.to_string();
    if request.path().ends_with("/expenses") && matches!(err, JsonPayloadError::Deserialize(_)) {
        ApiError::Ledger(LedgerError::InvalidExpense(message)).into()
    } else {
        ApiError::InvalidBody(message).into()
    }
}

fn path_rejection(err: PathError, _: &HttpRequest) -> actix_web::Error {
    ApiError::InvalidId(err.to_string()).into()
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_rejection))
        .app_data(web::PathConfig::default().error_handler(path_rejection))
        .service(sign_up)
        .service(renew_token)
        .service(current_member)
        .service(add_group)
        .service(get_group)
        .service(add_expense)
        .service(get_balances);
}
