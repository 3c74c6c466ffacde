//! Newsletter subscription lifecycle, scoped per tenant.

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use diesel::dsl::count_star;
use diesel::prelude::*;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthClaims;
use crate::notifier;
use crate::shared::models::{ApiError, ApiReply, Page};
use crate::shared::schema::newsletters;
use crate::shared::state::AppState;
use crate::tenant::Tenant;
use crate::validation::Validator;

const PER_PAGE: i64 = 50;
const VERIFICATION_TOKEN_LEN: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = newsletters)]
pub struct Newsletter {
    pub id: Uuid,
    pub email: String,
    pub subdomain: Option<String>,
    pub name: Option<String>,
    pub source: Option<String>,
    pub is_active: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub verification_token: Option<String>,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = newsletters)]
struct NewsletterChanges {
    name: Option<String>,
    is_active: Option<bool>,
    metadata: Option<Value>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub email: Option<String>,
    pub name: Option<String>,
    pub source: Option<String>,
    pub metadata: Option<Value>,
    pub subdomain: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSubscriptionRequest {
    pub name: Option<String>,
    pub is_active: Option<bool>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
}

pub async fn subscribe(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Json(req): Json<SubscribeRequest>,
) -> Result<ApiReply, ApiError> {
    let subdomain = tenant.resolved_with(req.subdomain.as_deref());

    let mut v = Validator::new();
    v.required("email", req.email.as_deref());
    v.email("email", req.email.as_deref());
    v.max_len("email", req.email.as_deref(), 255);
    v.max_len("name", req.name.as_deref(), 255);
    v.max_len("source", req.source.as_deref(), 100);
    v.map("metadata", req.metadata.as_ref());

    if let Some(email) = req.email.as_deref().filter(|e| !e.is_empty()) {
        let mut conn = state.conn.get()?;
        let taken: i64 = match subdomain.as_deref() {
            Some(sub) => newsletters::table
                .filter(newsletters::email.eq(email))
                .filter(newsletters::subdomain.eq(sub))
                .select(count_star())
                .get_result(&mut conn)?,
            None => newsletters::table
                .filter(newsletters::email.eq(email))
                .filter(newsletters::subdomain.is_null())
                .select(count_star())
                .get_result(&mut conn)?,
        };
        if taken > 0 {
            v.add("email", "The email has already been taken.".to_string());
        }
    }

    if let Err(reply) = v.finish() {
        return Ok(reply);
    }

    let mut conn = state.conn.get()?;
    let verification_token = random_token(VERIFICATION_TOKEN_LEN);
    let now = Utc::now();
    let subscription = Newsletter {
        id: Uuid::new_v4(),
        email: req.email.unwrap_or_default(),
        subdomain,
        name: req.name,
        source: req.source.or_else(|| Some("api".to_string())),
        is_active: true,
        verified_at: None,
        verification_token: Some(verification_token.clone()),
        metadata: req.metadata,
        created_at: now,
        updated_at: now,
    };

    match diesel::insert_into(newsletters::table)
        .values(&subscription)
        .execute(&mut conn)
    {
        Ok(_) => {}
        // A concurrent subscribe for the same (email, subdomain) got
        // there first; report it the same way as the pre-check.
        Err(diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        )) => {
            return Ok(ApiReply::validation_failed(
                json!({"email": ["The email has already been taken."]}),
            ));
        }
        Err(err) => return Err(err.into()),
    }

    notifier::send_verification_email(
        state.notifier.as_ref(),
        &subscription.email,
        &verification_token,
    );

    Ok(ApiReply::created(
        "Successfully subscribed to newsletter. Please check your email for verification.",
        json!({
            "id": subscription.id,
            "email": subscription.email,
            "verification_required": true,
        }),
    ))
}

pub async fn verify(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<ApiReply, ApiError> {
    let mut conn = state.conn.get()?;

    let found: Option<Newsletter> = newsletters::table
        .filter(newsletters::verification_token.eq(&token))
        .first(&mut conn)
        .optional()?;
    let Some(subscription) = found else {
        return Ok(ApiReply::not_found("Invalid verification token."));
    };

    if let Some(verified_at) = subscription.verified_at {
        return Ok(ApiReply::ok_message(
            "Email already verified.",
            Some(json!({"verified_at": verified_at})),
        ));
    }

    let now = Utc::now();
    diesel::update(newsletters::table.filter(newsletters::id.eq(subscription.id)))
        .set((
            newsletters::verified_at.eq(Some(now)),
            newsletters::verification_token.eq(None::<String>),
            newsletters::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

    Ok(ApiReply::ok_message(
        "Email successfully verified.",
        Some(json!({"verified_at": now})),
    ))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    _claims: AuthClaims,
    Query(query): Query<ListQuery>,
) -> Result<ApiReply, ApiError> {
    let subdomain = tenant.resolved();
    let page = query.page.unwrap_or(1).max(1);
    let mut conn = state.conn.get()?;

    let mut rows_query = newsletters::table.into_boxed();
    let mut count_query = newsletters::table.select(count_star()).into_boxed();
    if let Some(sub) = subdomain.as_deref() {
        rows_query = rows_query.filter(newsletters::subdomain.eq(sub.to_string()));
        count_query = count_query.filter(newsletters::subdomain.eq(sub.to_string()));
    }
    rows_query = rows_query.filter(newsletters::is_active.eq(true));
    count_query = count_query.filter(newsletters::is_active.eq(true));

    let total: i64 = count_query.get_result(&mut conn)?;
    let rows: Vec<Newsletter> = rows_query
        .order(newsletters::created_at.desc())
        .limit(PER_PAGE)
        .offset((page - 1) * PER_PAGE)
        .load(&mut conn)?;

    let page = Page::new(rows, page, PER_PAGE, total);
    Ok(ApiReply::ok(serde_json::to_value(page)?))
}

pub async fn show(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    _claims: AuthClaims,
    Path(id): Path<Uuid>,
) -> Result<ApiReply, ApiError> {
    let mut conn = state.conn.get()?;
    let Some(subscription) = find_for_tenant(&mut conn, id, tenant.resolved().as_deref())? else {
        return Ok(ApiReply::not_found("Newsletter subscription not found."));
    };
    Ok(ApiReply::ok(serde_json::to_value(subscription)?))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    _claims: AuthClaims,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateSubscriptionRequest>,
) -> Result<ApiReply, ApiError> {
    let mut conn = state.conn.get()?;
    let Some(subscription) = find_for_tenant(&mut conn, id, tenant.resolved().as_deref())? else {
        return Ok(ApiReply::not_found("Newsletter subscription not found."));
    };

    let mut v = Validator::new();
    v.max_len("name", req.name.as_deref(), 255);
    v.map("metadata", req.metadata.as_ref());
    if let Err(reply) = v.finish() {
        return Ok(reply);
    }

    let changes = NewsletterChanges {
        name: req.name,
        is_active: req.is_active,
        metadata: req.metadata,
        updated_at: Some(Utc::now()),
    };
    diesel::update(newsletters::table.filter(newsletters::id.eq(subscription.id)))
        .set(&changes)
        .execute(&mut conn)?;

    let fresh: Newsletter = newsletters::table
        .filter(newsletters::id.eq(subscription.id))
        .first(&mut conn)?;
    Ok(ApiReply::ok_message(
        "Newsletter subscription updated successfully.",
        Some(serde_json::to_value(fresh)?),
    ))
}

pub async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Path(email): Path<String>,
) -> Result<ApiReply, ApiError> {
    let subdomain = tenant.resolved();
    let mut conn = state.conn.get()?;

    let found: Option<Newsletter> = match subdomain.as_deref() {
        Some(sub) => newsletters::table
            .filter(newsletters::email.eq(&email))
            .filter(newsletters::subdomain.eq(sub))
            .first(&mut conn)
            .optional()?,
        None => newsletters::table
            .filter(newsletters::email.eq(&email))
            .filter(newsletters::subdomain.is_null())
            .first(&mut conn)
            .optional()?,
    };
    let Some(subscription) = found else {
        return Ok(ApiReply::not_found("Subscription not found."));
    };

    diesel::update(newsletters::table.filter(newsletters::id.eq(subscription.id)))
        .set((
            newsletters::is_active.eq(false),
            newsletters::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

    Ok(ApiReply::ok_message(
        "Successfully unsubscribed from newsletter.",
        None,
    ))
}

pub async fn destroy(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    _claims: AuthClaims,
    Path(id): Path<Uuid>,
) -> Result<ApiReply, ApiError> {
    let mut conn = state.conn.get()?;
    let Some(subscription) = find_for_tenant(&mut conn, id, tenant.resolved().as_deref())? else {
        return Ok(ApiReply::not_found("Newsletter subscription not found."));
    };

    diesel::delete(newsletters::table.filter(newsletters::id.eq(subscription.id)))
        .execute(&mut conn)?;

    Ok(ApiReply::ok_message(
        "Newsletter subscription deleted successfully.",
        None,
    ))
}

/// Loads by id and enforces the tenant gate: the record's subdomain
/// must match the caller's resolved tenant exactly, a missing tenant
/// matching only records without one.
fn find_for_tenant(
    conn: &mut PgConnection,
    id: Uuid,
    subdomain: Option<&str>,
) -> Result<Option<Newsletter>, diesel::result::Error> {
    let found: Option<Newsletter> = newsletters::table
        .filter(newsletters::id.eq(id))
        .first(conn)
        .optional()?;
    Ok(found.filter(|subscription| subscription.subdomain.as_deref() == subdomain))
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/newsletter", post(subscribe).get(list))
        .route("/newsletter/verify/{token}", get(verify))
        .route("/newsletter/unsubscribe/{email}", delete(unsubscribe))
        .route(
            "/newsletter/{id}",
            get(show).put(update).delete(destroy),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_tokens_are_alphanumeric_and_sized() {
        let token = random_token(VERIFICATION_TOKEN_LEN);
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(token, random_token(VERIFICATION_TOKEN_LEN));
    }

    #[test]
    fn subscribe_request_parses_with_optional_fields() {
        let req: SubscribeRequest = serde_json::from_str(
            r#"{"email": "a@b.com", "metadata": {"plan": "pro"}, "subdomain": "acme"}"#,
        )
        .unwrap();
        assert_eq!(req.email.as_deref(), Some("a@b.com"));
        assert!(req.name.is_none());
        assert_eq!(req.subdomain.as_deref(), Some("acme"));
    }

    #[test]
    fn newsletter_serializes_timestamps_and_metadata() {
        let now = Utc::now();
        let subscription = Newsletter {
            id: Uuid::new_v4(),
            email: "a@b.com".to_string(),
            subdomain: Some("acme".to_string()),
            name: None,
            source: Some("api".to_string()),
            is_active: true,
            verified_at: None,
            verification_token: Some("tok".to_string()),
            metadata: Some(serde_json::json!({"plan": "pro"})),
            created_at: now,
            updated_at: now,
        };
        let value = serde_json::to_value(&subscription).unwrap();
        assert_eq!(value["email"], "a@b.com");
        assert_eq!(value["subdomain"], "acme");
        assert_eq!(value["metadata"]["plan"], "pro");
        assert_eq!(value["name"], serde_json::Value::Null);
    }
}
