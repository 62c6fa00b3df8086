//! Users API Example - Paginated, searchable, exportable list endpoint
//!
//! This example serves an in-memory user table through `paginated_response`.
//! It demonstrates:
//!
//! - Column search, exact-match column filters and named filters
//! - Range filtering and sorting from the query string
//! - Tag-based cache invalidation
//! - Spreadsheet export with custom headings
//!
//! Run with: cargo run --example users-api
//!
//! Test with:
//!   curl 'http://localhost:8080/users?page=2&limit=5'
//!   curl 'http://localhost:8080/users?search=smith&status=active'
//!   curl 'http://localhost:8080/users?filter=admins&order_by=name&order=desc'
//!   curl 'http://localhost:8080/users?range=created_at&range_start=2024-03-01&range_end=2024-06-30'
//!   curl -OJ 'http://localhost:8080/users?export=filtered&status=active'
//!   curl -X POST http://localhost:8080/users/cache/flush

use acton_paginate::prelude::*;
use axum::{
    extract::State,
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct User {
    id: u64,
    name: String,
    email: String,
    status: String,
    role: String,
    created_at: String,
}

#[derive(Clone)]
struct AppState {
    paginator: Paginator<MemoryCache>,
    users: Arc<Vec<User>>,
    options: Arc<PaginationOptions<MemoryQuery<User>, User>>,
}

fn seed_users() -> Vec<User> {
    let surnames = ["Smith", "Jones", "Taylor", "Brown", "Wilson"];
    (1..=60)
        .map(|id| {
            let surname = surnames[(id as usize) % surnames.len()];
            User {
                id,
                name: format!("User{} {}", id, surname),
                email: format!("user{}@example.com", id),
                status: if id % 3 == 0 { "inactive" } else { "active" }.to_string(),
                role: if id % 10 == 0 { "admin" } else { "member" }.to_string(),
                created_at: format!("2024-{:02}-{:02}", (id % 12) + 1, (id % 28) + 1),
            }
        })
        .collect()
}

fn user_options() -> PaginationOptions<MemoryQuery<User>, User> {
    PaginationOptions::new()
        .with_search_columns(["name", "email"])
        .with_filter_columns(["status", "role"])
        .with_filter("admins", |q: &mut MemoryQuery<User>| {
            q.and_where(Predicate::eq("role", "admin"));
        })
        .with_filter("recent", |q: &mut MemoryQuery<User>| {
            q.where_cmp("created_at", FilterOperator::GreaterThanOrEqual, "2024-07-01");
        })
        .with_cache_tags(["users"])
        .with_export_headings(["ID", "Name", "Email", "Status"])
        .with_export_mapper(|user: &User| {
            vec![
                json!(user.id),
                json!(user.name),
                json!(user.email),
                json!(user.status),
            ]
        })
}

async fn list_users(State(state): State<AppState>, context: RequestContext) -> Result<Response> {
    let query = MemoryQuery::new("users", state.users.as_ref().clone());
    paginated_response(&state.paginator, query, &context, &state.options).await
}

async fn flush_users_cache(State(state): State<AppState>) -> Result<StatusCode> {
    state
        .paginator
        .cache()
        .flush_tags(&["users".to_string()])
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config)?;

    let state = AppState {
        paginator: Paginator::from_config(MemoryCache::new(), &config),
        users: Arc::new(seed_users()),
        options: Arc::new(user_options()),
    };

    let app = Router::new()
        .route("/users", get(list_users))
        .route("/users/cache/flush", post(flush_users_cache))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
