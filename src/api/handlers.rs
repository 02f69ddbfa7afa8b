//! HTTP request handlers composing `QueryService` reads into responses
//! (spec §6).

use super::ApiState;
use crate::core::types::Address;
use crate::query::{AgentPageResponse, QueryService};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;

#[derive(Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: usize,
}

#[derive(Deserialize)]
pub struct CreatorQuery {
    pub user: String,
    #[serde(default)]
    pub page: usize,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub name: String,
    #[serde(default)]
    pub page: usize,
}

fn query_service(state: &ApiState) -> QueryService<'_> {
    QueryService::new(&state.agents, &state.usage, &state.balances, &state.tokens, state.page_size)
}

pub async fn get_leaderboard(
    State(state): State<ApiState>,
    Query(q): Query<PageQuery>,
) -> Json<AgentPageResponse> {
    Json(query_service(&state).get_leaderboard(q.page))
}

pub async fn get_agent(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> Result<Json<crate::query::AgentData>, StatusCode> {
    let address = Address::from_str(&address).map_err(|_| StatusCode::BAD_REQUEST)?;
    query_service(&state)
        .get_agent(address)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn get_agents_by_creator(
    State(state): State<ApiState>,
    Query(q): Query<CreatorQuery>,
) -> Result<Json<AgentPageResponse>, StatusCode> {
    let creator = Address::from_str(&q.user).map_err(|_| StatusCode::BAD_REQUEST)?;
    query_service(&state)
        .get_agents_by_creator(creator, q.page)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn search_by_name(
    State(state): State<ApiState>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<AgentPageResponse>, StatusCode> {
    query_service(&state)
        .search_by_name(&q.name, q.page)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
