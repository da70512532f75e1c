use axum::{
    extract::{Form, Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::db::Database;
use crate::error::Error;
use crate::models::{Lga, NewPollingUnit, PartyRoster, PollingUnit, Ward};
use crate::tally;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub roster: PartyRoster,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    parties: usize,
}

#[derive(Serialize)]
struct PartyScore {
    party: String,
    score: i64,
}

#[derive(Serialize)]
struct PuResultsResponse {
    polling_unit: PollingUnit,
    results: Vec<PartyScore>,
}

#[derive(Deserialize)]
struct LgaQuery {
    lga_id: Option<i64>,
}

#[derive(Serialize)]
struct LgaResultsResponse {
    lgas: Vec<Lga>,
    selected_lga_id: Option<i64>,
    parties: PartyRoster,
    estimated: HashMap<String, i64>,
    official: HashMap<String, i64>,
    comparison: HashMap<String, i64>,
}

#[derive(Serialize)]
struct NewPuFormResponse {
    lgas: Vec<Lga>,
    parties: PartyRoster,
}

#[derive(Serialize)]
struct WardsResponse {
    wards: Vec<Ward>,
}

#[derive(Serialize)]
struct CreatePuResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    new_id: Option<i64>,
    message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn query_failed(err: Error) -> ApiError {
    error!("query error: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "DB Query Failed".to_string(),
        }),
    )
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/pu/:id", get(pu_results))
        .route("/lga", get(lga_results))
        .route("/new-pu", get(new_pu_form).post(create_pu))
        .layer(cors)
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        parties: state.roster.len(),
    })
}

// Per-party scores for one polling unit, every roster party present
async fn pu_results(
    State(state): State<AppState>,
    Path(pu_id): Path<i64>,
) -> Result<Json<PuResultsResponse>, ApiError> {
    let polling_unit = state
        .db
        .get_polling_unit(pu_id)
        .await
        .map_err(query_failed)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("polling unit {} not found", pu_id),
                }),
            )
        })?;

    let rows = state.db.pu_results(pu_id).await.map_err(query_failed)?;
    let scores = tally::scores_by_party(&state.roster, &rows);

    // Roster order, not storage order
    let results = state
        .roster
        .iter()
        .map(|party| PartyScore {
            party: party.to_string(),
            score: scores.get(party).copied().unwrap_or(0),
        })
        .collect();

    Ok(Json(PuResultsResponse {
        polling_unit,
        results,
    }))
}

// LGA list plus estimated/official/comparison maps for the selected LGA
async fn lga_results(
    State(state): State<AppState>,
    Query(query): Query<LgaQuery>,
) -> Result<Json<LgaResultsResponse>, ApiError> {
    let lgas = state.db.list_lgas().await.map_err(query_failed)?;

    let result = tally::reconcile(&state.db, &state.roster, query.lga_id)
        .await
        .map_err(query_failed)?;

    Ok(Json(LgaResultsResponse {
        lgas,
        selected_lga_id: query.lga_id,
        parties: state.roster.clone(),
        estimated: result.estimated,
        official: result.official,
        comparison: result.comparison,
    }))
}

// Form data: LGAs and parties without an LGA selected, wards with one
async fn new_pu_form(
    State(state): State<AppState>,
    Query(query): Query<LgaQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if let Some(lga_id) = query.lga_id {
        let wards = state.db.list_wards(lga_id).await.map_err(query_failed)?;
        let body = serde_json::to_value(WardsResponse { wards }).unwrap_or_default();
        return Ok(Json(body));
    }

    let lgas = state.db.list_lgas().await.map_err(query_failed)?;
    let body = serde_json::to_value(NewPuFormResponse {
        lgas,
        parties: state.roster.clone(),
    })
    .unwrap_or_default();
    Ok(Json(body))
}

async fn create_pu(
    State(state): State<AppState>,
    Form(fields): Form<HashMap<String, String>>,
) -> Json<CreatePuResponse> {
    info!("new PU submission: {:?}", fields.get("pu_name"));

    let new_pu = submission_from_form(&state.roster, &fields);

    match state.db.create_polling_unit(&state.roster, &new_pu).await {
        Ok(new_id) => Json(CreatePuResponse {
            success: true,
            new_id: Some(new_id),
            message: format!("New PU {} saved with all results!", new_id),
        }),
        Err(err @ Error::Validation(_)) => Json(CreatePuResponse {
            success: false,
            new_id: None,
            message: err.to_string(),
        }),
        Err(err) => {
            error!("new PU save failed: {}", err);
            Json(CreatePuResponse {
                success: false,
                new_id: None,
                message: format!("Save failed: {}", err),
            })
        }
    }
}

fn submission_from_form(
    roster: &PartyRoster,
    fields: &HashMap<String, String>,
) -> NewPollingUnit {
    let parse_id = |key: &str| fields.get(key).and_then(|v| v.parse::<i64>().ok());

    let scores = roster
        .iter()
        .filter_map(|party| {
            fields
                .get(&format!("score_{}", party))
                .and_then(|v| v.parse::<i64>().ok())
                .map(|score| (party.to_string(), score))
        })
        .collect();

    NewPollingUnit {
        lga_id: parse_id("lga_id"),
        ward_id: parse_id("ward_id"),
        name: fields.get("pu_name").cloned().unwrap_or_default(),
        scores,
    }
}
