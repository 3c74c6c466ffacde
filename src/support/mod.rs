//! Support ticket lifecycle: creation (including the contact-form
//! shortcut), listing with filters, status updates, per-requester
//! lookups and aggregate statistics, all scoped per tenant.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use diesel::dsl::count_star;
use diesel::prelude::*;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthClaims;
use crate::notifier;
use crate::shared::models::{ApiError, ApiReply, Page};
use crate::shared::schema::support_tickets;
use crate::shared::state::AppState;
use crate::tenant::Tenant;
use crate::validation::Validator;

const DEFAULT_PER_PAGE: i64 = 15;
const MAX_PER_PAGE: i64 = 100;
const EMAIL_LOOKUP_PER_PAGE: i64 = 10;
const MAX_ATTACHMENTS: usize = 5;

const TICKET_CODE_PREFIX: &str = "TKT-";
const TICKET_CODE_SUFFIX_LEN: usize = 8;
const TICKET_CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketType {
    BugReport,
    FeatureRequest,
    Contact,
    GeneralSupport,
}

impl TicketType {
    pub const VALUES: &'static [&'static str] =
        &["bug_report", "feature_request", "contact", "general_support"];

    pub fn as_str(self) -> &'static str {
        match self {
            TicketType::BugReport => "bug_report",
            TicketType::FeatureRequest => "feature_request",
            TicketType::Contact => "contact",
            TicketType::GeneralSupport => "general_support",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl TicketPriority {
    pub const VALUES: &'static [&'static str] = &["low", "medium", "high", "urgent"];

    pub fn as_str(self) -> &'static str {
        match self {
            TicketPriority::Low => "low",
            TicketPriority::Medium => "medium",
            TicketPriority::High => "high",
            TicketPriority::Urgent => "urgent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub const VALUES: &'static [&'static str] = &["open", "in_progress", "resolved", "closed"];

    pub fn as_str(self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = support_tickets)]
pub struct SupportTicket {
    pub id: Uuid,
    pub ticket_id: String,
    pub subdomain: Option<String>,
    #[serde(rename = "type")]
    pub type_: String,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub priority: String,
    pub status: String,
    pub category: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub url: Option<String>,
    pub attachments: Option<Value>,
    pub metadata: Option<Value>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub company: Option<String>,
    pub receive_newsletter: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = support_tickets)]
struct TicketChanges {
    status: Option<String>,
    priority: Option<String>,
    category: Option<String>,
    metadata: Option<Value>,
    resolved_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub subject: Option<String>,
    pub message: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub url: Option<String>,
    pub attachments: Option<Value>,
    pub metadata: Option<Value>,
    pub company: Option<String>,
    pub receive_newsletter: Option<bool>,
    pub subdomain: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub subject: Option<String>,
    pub message: Option<String>,
    pub attachments: Option<Value>,
    pub metadata: Option<Value>,
    pub subdomain: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTicketRequest {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ListTicketsQuery {
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub email: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Json(req): Json<CreateTicketRequest>,
) -> Result<ApiReply, ApiError> {
    let subdomain = tenant.resolved_with(req.subdomain.as_deref());

    let mut v = Validator::new();
    v.required("type", req.type_.as_deref());
    v.one_of("type", req.type_.as_deref(), TicketType::VALUES);
    v.required("name", req.name.as_deref());
    v.max_len("name", req.name.as_deref(), 255);
    v.required("email", req.email.as_deref());
    v.email("email", req.email.as_deref());
    v.max_len("email", req.email.as_deref(), 255);
    v.required("subject", req.subject.as_deref());
    v.max_len("subject", req.subject.as_deref(), 500);
    v.required("message", req.message.as_deref());
    v.max_len("message", req.message.as_deref(), 5000);
    v.one_of("priority", req.priority.as_deref(), TicketPriority::VALUES);
    v.max_len("category", req.category.as_deref(), 100);
    v.max_len("browser", req.browser.as_deref(), 200);
    v.max_len("os", req.os.as_deref(), 200);
    v.url("url", req.url.as_deref());
    v.max_len("url", req.url.as_deref(), 500);
    v.string_list("attachments", req.attachments.as_ref(), MAX_ATTACHMENTS, 500);
    v.map("metadata", req.metadata.as_ref());
    if let Err(reply) = v.finish() {
        return Ok(reply);
    }

    let mut conn = state.conn.get()?;
    let now = Utc::now();
    let mut ticket = SupportTicket {
        id: Uuid::new_v4(),
        ticket_id: generate_ticket_code(&mut conn)?,
        subdomain,
        type_: req.type_.unwrap_or_default(),
        name: req.name.unwrap_or_default(),
        email: req.email.unwrap_or_default(),
        subject: req.subject.unwrap_or_default(),
        message: req.message.unwrap_or_default(),
        priority: req
            .priority
            .unwrap_or_else(|| TicketPriority::Medium.as_str().to_string()),
        status: TicketStatus::Open.as_str().to_string(),
        category: req.category,
        browser: req.browser,
        os: req.os,
        url: req.url,
        attachments: req.attachments,
        metadata: req.metadata,
        resolved_at: None,
        company: req.company,
        receive_newsletter: req.receive_newsletter.unwrap_or(false),
        created_at: now,
        updated_at: now,
    };
    insert_ticket(&mut conn, &mut ticket)?;

    notifier::send_ticket_received_email(state.notifier.as_ref(), &ticket.email, &ticket.ticket_id);

    Ok(ApiReply::created(
        "Support ticket created successfully.",
        json!({
            "ticket_id": ticket.ticket_id,
            "id": ticket.id,
            "type": ticket.type_,
            "status": ticket.status,
            "created_at": ticket.created_at,
        }),
    ))
}

pub async fn contact(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Json(req): Json<ContactRequest>,
) -> Result<ApiReply, ApiError> {
    let subdomain = tenant.resolved_with(req.subdomain.as_deref());

    let mut v = Validator::new();
    v.required("name", req.name.as_deref());
    v.max_len("name", req.name.as_deref(), 255);
    v.required("email", req.email.as_deref());
    v.email("email", req.email.as_deref());
    v.max_len("email", req.email.as_deref(), 255);
    v.required("subject", req.subject.as_deref());
    v.max_len("subject", req.subject.as_deref(), 500);
    v.required("message", req.message.as_deref());
    v.max_len("message", req.message.as_deref(), 5000);
    v.string_list("attachments", req.attachments.as_ref(), MAX_ATTACHMENTS, 500);
    v.map("metadata", req.metadata.as_ref());
    if let Err(reply) = v.finish() {
        return Ok(reply);
    }

    let mut conn = state.conn.get()?;
    let now = Utc::now();
    let mut ticket = SupportTicket {
        id: Uuid::new_v4(),
        ticket_id: generate_ticket_code(&mut conn)?,
        subdomain,
        type_: TicketType::Contact.as_str().to_string(),
        name: req.name.unwrap_or_default(),
        email: req.email.unwrap_or_default(),
        subject: req.subject.unwrap_or_default(),
        message: req.message.unwrap_or_default(),
        priority: TicketPriority::Medium.as_str().to_string(),
        status: TicketStatus::Open.as_str().to_string(),
        category: None,
        browser: None,
        os: None,
        url: None,
        attachments: req.attachments,
        metadata: req.metadata,
        resolved_at: None,
        company: None,
        receive_newsletter: false,
        created_at: now,
        updated_at: now,
    };
    insert_ticket(&mut conn, &mut ticket)?;

    notifier::send_ticket_received_email(state.notifier.as_ref(), &ticket.email, &ticket.ticket_id);

    Ok(ApiReply::created(
        "Contact request submitted successfully.",
        json!({
            "ticket_id": ticket.ticket_id,
            "id": ticket.id,
            "created_at": ticket.created_at,
        }),
    ))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    _claims: AuthClaims,
    Query(query): Query<ListTicketsQuery>,
) -> Result<ApiReply, ApiError> {
    let subdomain = tenant.resolved();
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query
        .per_page
        .unwrap_or(DEFAULT_PER_PAGE)
        .clamp(1, MAX_PER_PAGE);
    let mut conn = state.conn.get()?;

    let mut rows_query = support_tickets::table.into_boxed();
    let mut count_query = support_tickets::table.select(count_star()).into_boxed();
    if let Some(sub) = subdomain.as_deref() {
        rows_query = rows_query.filter(support_tickets::subdomain.eq(sub.to_string()));
        count_query = count_query.filter(support_tickets::subdomain.eq(sub.to_string()));
    }
    if let Some(type_) = query.type_.as_deref() {
        rows_query = rows_query.filter(support_tickets::type_.eq(type_.to_string()));
        count_query = count_query.filter(support_tickets::type_.eq(type_.to_string()));
    }
    if let Some(status) = query.status.as_deref() {
        rows_query = rows_query.filter(support_tickets::status.eq(status.to_string()));
        count_query = count_query.filter(support_tickets::status.eq(status.to_string()));
    }
    if let Some(priority) = query.priority.as_deref() {
        rows_query = rows_query.filter(support_tickets::priority.eq(priority.to_string()));
        count_query = count_query.filter(support_tickets::priority.eq(priority.to_string()));
    }
    if let Some(email) = query.email.as_deref() {
        rows_query = rows_query.filter(support_tickets::email.eq(email.to_string()));
        count_query = count_query.filter(support_tickets::email.eq(email.to_string()));
    }

    let descending = sort_descending(query.sort_order.as_deref());
    rows_query = match (sort_key(query.sort_by.as_deref()), descending) {
        ("updated_at", true) => rows_query.order(support_tickets::updated_at.desc()),
        ("updated_at", false) => rows_query.order(support_tickets::updated_at.asc()),
        ("priority", true) => rows_query.order(support_tickets::priority.desc()),
        ("priority", false) => rows_query.order(support_tickets::priority.asc()),
        ("status", true) => rows_query.order(support_tickets::status.desc()),
        ("status", false) => rows_query.order(support_tickets::status.asc()),
        ("type", true) => rows_query.order(support_tickets::type_.desc()),
        ("type", false) => rows_query.order(support_tickets::type_.asc()),
        (_, true) => rows_query.order(support_tickets::created_at.desc()),
        (_, false) => rows_query.order(support_tickets::created_at.asc()),
    };

    let total: i64 = count_query.get_result(&mut conn)?;
    let rows: Vec<SupportTicket> = rows_query
        .limit(per_page)
        .offset((page - 1) * per_page)
        .load(&mut conn)?;

    let page = Page::new(rows, page, per_page, total);
    Ok(ApiReply::ok(serde_json::to_value(page)?))
}

pub async fn show(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    _claims: AuthClaims,
    Path(ticket_code): Path<String>,
) -> Result<ApiReply, ApiError> {
    let mut conn = state.conn.get()?;
    let Some(ticket) = find_ticket(&mut conn, &ticket_code, tenant.resolved().as_deref())? else {
        return Ok(ApiReply::not_found("Support ticket not found."));
    };
    Ok(ApiReply::ok(serde_json::to_value(ticket)?))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    _claims: AuthClaims,
    Path(ticket_code): Path<String>,
    Json(req): Json<UpdateTicketRequest>,
) -> Result<ApiReply, ApiError> {
    let mut conn = state.conn.get()?;
    let Some(ticket) = find_ticket(&mut conn, &ticket_code, tenant.resolved().as_deref())? else {
        return Ok(ApiReply::not_found("Support ticket not found."));
    };

    let mut v = Validator::new();
    v.one_of("status", req.status.as_deref(), TicketStatus::VALUES);
    v.one_of("priority", req.priority.as_deref(), TicketPriority::VALUES);
    v.max_len("category", req.category.as_deref(), 100);
    v.map("metadata", req.metadata.as_ref());
    if let Err(reply) = v.finish() {
        return Ok(reply);
    }

    let now = Utc::now();
    let changes = TicketChanges {
        status: req.status.clone(),
        priority: req.priority,
        category: req.category,
        metadata: req.metadata,
        resolved_at: resolved_stamp(req.status.as_deref(), ticket.resolved_at, now),
        updated_at: Some(now),
    };
    diesel::update(support_tickets::table.filter(support_tickets::id.eq(ticket.id)))
        .set(&changes)
        .execute(&mut conn)?;

    let fresh: SupportTicket = support_tickets::table
        .filter(support_tickets::id.eq(ticket.id))
        .first(&mut conn)?;
    Ok(ApiReply::ok_message(
        "Support ticket updated successfully.",
        Some(serde_json::to_value(fresh)?),
    ))
}

pub async fn get_by_email(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    _claims: AuthClaims,
    Path(email): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<ApiReply, ApiError> {
    let mut v = Validator::new();
    v.required("email", Some(&email));
    v.email("email", Some(&email));
    if !v.is_empty() {
        return Ok(ApiReply::unprocessable("Invalid email address."));
    }

    let subdomain = tenant.resolved();
    let page = query.page.unwrap_or(1).max(1);
    let mut conn = state.conn.get()?;

    let mut rows_query = support_tickets::table
        .into_boxed()
        .filter(support_tickets::email.eq(email.clone()));
    let mut count_query = support_tickets::table
        .select(count_star())
        .into_boxed()
        .filter(support_tickets::email.eq(email));
    if let Some(sub) = subdomain.as_deref() {
        rows_query = rows_query.filter(support_tickets::subdomain.eq(sub.to_string()));
        count_query = count_query.filter(support_tickets::subdomain.eq(sub.to_string()));
    }

    let total: i64 = count_query.get_result(&mut conn)?;
    let rows: Vec<SupportTicket> = rows_query
        .order(support_tickets::created_at.desc())
        .limit(EMAIL_LOOKUP_PER_PAGE)
        .offset((page - 1) * EMAIL_LOOKUP_PER_PAGE)
        .load(&mut conn)?;

    let page = Page::new(rows, page, EMAIL_LOOKUP_PER_PAGE, total);
    Ok(ApiReply::ok(serde_json::to_value(page)?))
}

pub async fn statistics(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    _claims: AuthClaims,
) -> Result<ApiReply, ApiError> {
    let subdomain = tenant.resolved();
    let mut conn = state.conn.get()?;

    let total_tickets: i64 = match subdomain.as_deref() {
        Some(sub) => support_tickets::table
            .filter(support_tickets::subdomain.eq(sub))
            .select(count_star())
            .get_result(&mut conn)?,
        None => support_tickets::table
            .select(count_star())
            .get_result(&mut conn)?,
    };

    let open_statuses = [
        TicketStatus::Open.as_str(),
        TicketStatus::InProgress.as_str(),
    ];
    let open_tickets: i64 = match subdomain.as_deref() {
        Some(sub) => support_tickets::table
            .filter(support_tickets::subdomain.eq(sub))
            .filter(support_tickets::status.eq_any(open_statuses))
            .select(count_star())
            .get_result(&mut conn)?,
        None => support_tickets::table
            .filter(support_tickets::status.eq_any(open_statuses))
            .select(count_star())
            .get_result(&mut conn)?,
    };

    let resolved_tickets: i64 = match subdomain.as_deref() {
        Some(sub) => support_tickets::table
            .filter(support_tickets::subdomain.eq(sub))
            .filter(support_tickets::status.eq(TicketStatus::Resolved.as_str()))
            .select(count_star())
            .get_result(&mut conn)?,
        None => support_tickets::table
            .filter(support_tickets::status.eq(TicketStatus::Resolved.as_str()))
            .select(count_star())
            .get_result(&mut conn)?,
    };

    let by_type: Vec<(String, i64)> = match subdomain.as_deref() {
        Some(sub) => support_tickets::table
            .filter(support_tickets::subdomain.eq(sub))
            .group_by(support_tickets::type_)
            .select((support_tickets::type_, count_star()))
            .load(&mut conn)?,
        None => support_tickets::table
            .group_by(support_tickets::type_)
            .select((support_tickets::type_, count_star()))
            .load(&mut conn)?,
    };

    let by_priority: Vec<(String, i64)> = match subdomain.as_deref() {
        Some(sub) => support_tickets::table
            .filter(support_tickets::subdomain.eq(sub))
            .group_by(support_tickets::priority)
            .select((support_tickets::priority, count_star()))
            .load(&mut conn)?,
        None => support_tickets::table
            .group_by(support_tickets::priority)
            .select((support_tickets::priority, count_star()))
            .load(&mut conn)?,
    };

    let by_status: Vec<(String, i64)> = match subdomain.as_deref() {
        Some(sub) => support_tickets::table
            .filter(support_tickets::subdomain.eq(sub))
            .group_by(support_tickets::status)
            .select((support_tickets::status, count_star()))
            .load(&mut conn)?,
        None => support_tickets::table
            .group_by(support_tickets::status)
            .select((support_tickets::status, count_star()))
            .load(&mut conn)?,
    };

    Ok(ApiReply::ok(json!({
        "total_tickets": total_tickets,
        "open_tickets": open_tickets,
        "resolved_tickets": resolved_tickets,
        "by_type": count_map(by_type),
        "by_priority": count_map(by_priority),
        "by_status": count_map(by_status),
    })))
}

pub async fn destroy(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    _claims: AuthClaims,
    Path(ticket_code): Path<String>,
) -> Result<ApiReply, ApiError> {
    let mut conn = state.conn.get()?;
    let Some(ticket) = find_ticket(&mut conn, &ticket_code, tenant.resolved().as_deref())? else {
        return Ok(ApiReply::not_found("Support ticket not found."));
    };

    diesel::delete(support_tickets::table.filter(support_tickets::id.eq(ticket.id)))
        .execute(&mut conn)?;

    Ok(ApiReply::ok_message("Support ticket deleted successfully.", None))
}

/// Lookup by ticket code; the tenant filter is applied only when a
/// tenant was resolved.
fn find_ticket(
    conn: &mut PgConnection,
    ticket_code: &str,
    subdomain: Option<&str>,
) -> Result<Option<SupportTicket>, diesel::result::Error> {
    let mut query = support_tickets::table
        .into_boxed()
        .filter(support_tickets::ticket_id.eq(ticket_code.to_string()));
    if let Some(sub) = subdomain {
        query = query.filter(support_tickets::subdomain.eq(sub.to_string()));
    }
    query.first(conn).optional()
}

/// `resolved_at` is stamped once: only when the update moves the ticket
/// to resolved and no earlier resolution was recorded.
fn resolved_stamp(
    new_status: Option<&str>,
    existing: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if new_status == Some(TicketStatus::Resolved.as_str()) && existing.is_none() {
        Some(now)
    } else {
        None
    }
}

/// Caller-supplied sort fields are constrained to an allow-list;
/// anything else falls back to created_at.
fn sort_key(requested: Option<&str>) -> &'static str {
    match requested {
        Some("created_at") => "created_at",
        Some("updated_at") => "updated_at",
        Some("priority") => "priority",
        Some("status") => "status",
        Some("type") => "type",
        _ => "created_at",
    }
}

fn sort_descending(requested: Option<&str>) -> bool {
    !matches!(requested, Some("asc"))
}

fn random_ticket_code() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..TICKET_CODE_SUFFIX_LEN)
        .map(|_| TICKET_CODE_CHARSET[rng.gen_range(0..TICKET_CODE_CHARSET.len())] as char)
        .collect();
    format!("{}{}", TICKET_CODE_PREFIX, suffix)
}

/// Draws candidate codes until one is globally unused. The unique index
/// on ticket_id remains the backstop for concurrent creators; see
/// [`insert_ticket`].
fn generate_ticket_code(conn: &mut PgConnection) -> Result<String, diesel::result::Error> {
    loop {
        let code = random_ticket_code();
        let taken: i64 = support_tickets::table
            .filter(support_tickets::ticket_id.eq(&code))
            .select(count_star())
            .get_result(conn)?;
        if taken == 0 {
            return Ok(code);
        }
    }
}

fn insert_ticket(
    conn: &mut PgConnection,
    ticket: &mut SupportTicket,
) -> Result<(), diesel::result::Error> {
    loop {
        match diesel::insert_into(support_tickets::table)
            .values(&*ticket)
            .execute(conn)
        {
            Ok(_) => return Ok(()),
            // Lost the code race against a concurrent insert; roll a
            // new code and try again.
            Err(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            )) => {
                ticket.ticket_id = generate_ticket_code(conn)?;
            }
            Err(err) => return Err(err),
        }
    }
}

fn count_map(rows: Vec<(String, i64)>) -> BTreeMap<String, i64> {
    rows.into_iter().collect()
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/support", post(create).get(list))
        .route("/support/contact", post(contact))
        .route("/support/statistics", get(statistics))
        .route("/support/email/{email}", get(get_by_email))
        .route(
            "/support/{ticket_code}",
            get(show).put(update).delete(destroy),
        )
}
