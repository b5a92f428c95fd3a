use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use chrono::NaiveDateTime;
use rail_dispatch::conflict::Conflict;
use rail_dispatch::ledger::{HistoryFilter, LedgerError};
use rail_dispatch::models::{Action, Recommendation, RecommendationId, Train, TrainId};
use rail_dispatch::simulation::SimulationError;
use rail_dispatch::{DispatchError, SectionController};
use serde::{Deserialize, Serialize};
use std::fmt;

type Section = web::Data<SectionController>;

/// Wall clock time in the section's local timezone
pub fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

#[derive(Debug)]
pub struct ApiError(DispatchError);

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        Self(e)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            DispatchError::UnknownRecommendation(_) => StatusCode::NOT_FOUND,
            DispatchError::Ledger(LedgerError::AlreadyResolved { .. })
            | DispatchError::Simulation(SimulationError::NotIdle(_)) => StatusCode::CONFLICT,
            DispatchError::Telemetry(_)
            | DispatchError::Ledger(LedgerError::InvalidAction(_))
            | DispatchError::Simulation(SimulationError::InvalidHorizon { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({ "error": self.to_string() }))
    }
}

#[derive(Serialize)]
struct Rejection {
    train_id: TrainId,
    error: String,
}

#[derive(Serialize)]
struct TelemetryResponse {
    accepted: usize,
    rejected: Vec<Rejection>,
}

async fn telemetry(section: Section, trains: web::Json<Vec<Train>>) -> HttpResponse {
    let mut response = TelemetryResponse {
        accepted: 0,
        rejected: Vec::new(),
    };
    for train in trains.into_inner() {
        let train_id = train.id.clone();
        match section.upsert(train) {
            Ok(()) => response.accepted += 1,
            Err(e) => response.rejected.push(Rejection {
                train_id,
                error: e.to_string(),
            }),
        }
    }
    let status = if response.rejected.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    HttpResponse::build(status).json(response)
}

async fn remove_train(section: Section, id: web::Path<String>) -> HttpResponse {
    match section.remove(&id) {
        Some(_) => HttpResponse::NoContent().finish(),
        None => HttpResponse::NotFound().finish(),
    }
}

#[derive(Deserialize)]
struct ClockRequest {
    #[serde(default)]
    at: Option<NaiveDateTime>,
}

async fn arrival(section: Section, id: web::Path<String>, body: Option<web::Json<ClockRequest>>) -> HttpResponse {
    let at = body.and_then(|b| b.at).unwrap_or_else(now);
    match section.complete(&id, at) {
        Some(completion) => HttpResponse::Ok().json(completion),
        None => HttpResponse::NotFound().finish(),
    }
}

#[derive(Serialize)]
struct TickResponse {
    as_of: NaiveDateTime,
    conflicts: Vec<Conflict>,
    issued: Vec<Recommendation>,
    expired: Vec<RecommendationId>,
    failures: Vec<String>,
    residual: Vec<Conflict>,
    rounds: usize,
}

async fn tick(section: Section, body: Option<web::Json<ClockRequest>>) -> HttpResponse {
    let at = body.and_then(|b| b.at).unwrap_or_else(now);
    let section = section.into_inner();
    let report = web::block(move || section.tick(at)).await;
    match report {
        Ok(report) => HttpResponse::Ok().json(TickResponse {
            as_of: report.as_of,
            conflicts: report.conflicts,
            issued: report.issued,
            expired: report.expired,
            failures: report.failures.iter().map(ToString::to_string).collect(),
            residual: report.residual,
            rounds: report.rounds,
        }),
        Err(e) => {
            log::error!("Tick failed: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

async fn recommendations(section: Section) -> HttpResponse {
    HttpResponse::Ok().json(section.pending())
}

#[derive(Deserialize)]
struct Decision {
    controller_id: String,
    #[serde(default)]
    reason: String,
}

async fn accept(
    section: Section,
    id: web::Path<RecommendationId>,
    decision: web::Json<Decision>,
) -> Result<web::Json<Action>, ApiError> {
    Ok(web::Json(section.accept(*id, &decision.controller_id)?))
}

async fn override_recommendation(
    section: Section,
    id: web::Path<RecommendationId>,
    decision: web::Json<Decision>,
) -> Result<web::Json<Action>, ApiError> {
    Ok(web::Json(section.override_recommendation(
        *id,
        &decision.controller_id,
        &decision.reason,
    )?))
}

async fn actions(section: Section, filter: web::Query<HistoryFilter>) -> HttpResponse {
    let history = section.history(filter.into_inner());
    HttpResponse::Ok().json(history.iter().collect::<Vec<_>>())
}

async fn kpis(section: Section) -> HttpResponse {
    HttpResponse::Ok().json(section.kpis())
}

#[derive(Deserialize)]
struct SimulationRequest {
    horizon_minutes: u32,
}

async fn start_simulation(
    section: Section,
    request: web::Json<SimulationRequest>,
) -> Result<HttpResponse, ApiError> {
    section.start_simulation(request.horizon_minutes)?;
    Ok(HttpResponse::Accepted().json(section.simulation_status()))
}

async fn reset_simulation(section: Section) -> HttpResponse {
    let section = section.into_inner();
    let status = web::block(move || {
        section.reset_simulation();
        section.simulation_status()
    })
    .await;
    match status {
        Ok(status) => HttpResponse::Ok().json(status),
        Err(e) => {
            log::error!("Simulation reset failed: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

async fn simulation_status(section: Section) -> HttpResponse {
    HttpResponse::Ok().json(section.simulation_status())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/telemetry", web::post().to(telemetry))
        .route("/trains/{id}", web::delete().to(remove_train))
        .route("/trains/{id}/arrival", web::post().to(arrival))
        .route("/tick", web::post().to(tick))
        .route("/recommendations", web::get().to(recommendations))
        .route("/recommendations/{id}/accept", web::post().to(accept))
        .route("/recommendations/{id}/override", web::post().to(override_recommendation))
        .route("/actions", web::get().to(actions))
        .route("/kpis", web::get().to(kpis))
        .route("/simulation", web::post().to(start_simulation))
        .route("/simulation", web::delete().to(reset_simulation))
        .route("/simulation", web::get().to(simulation_status));
}
