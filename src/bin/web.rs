//! REST front for the tournament engine, backed by the in-memory store.
//! Run with: cargo run --bin web
//! Env: HOST, PORT, SWEEP_INTERVAL_SECS, CONFIRMATION_WINDOW_HOURS, RUST_LOG.
//!
//! Callers identify themselves with an `X-User-Id` header (a UUID); `X-User-Role:
//! super_admin` grants global management rights.

use actix_web::{
    delete, get, post, put,
    web::{Data, Json, Path, Query},
    App, HttpRequest, HttpResponse, HttpServer, Responder,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tourney_engine::{
    Actor, BracketKind, ChannelRegistry, Config, ContestInput, FinalizationReason, MatchId,
    MatchInput, MemoryStore, ParticipantId, ScoreInput, SeededEntrant, StandingsView, TeamMode,
    Tournament, TournamentError, TournamentId, TournamentService,
};
use uuid::Uuid;

type AppState = Data<TournamentService<MemoryStore>>;

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    service: &'static str,
}

#[derive(Deserialize)]
struct CreateTournamentBody {
    name: String,
    #[serde(default)]
    team_mode: TeamMode,
    #[serde(default)]
    allow_draw: bool,
    #[serde(default)]
    scoring: Option<tourney_engine::models::Scoring>,
    #[serde(default)]
    min_team_size: Option<usize>,
    #[serde(default)]
    max_team_size: Option<usize>,
    #[serde(default)]
    max_matches_per_player: Option<u32>,
    #[serde(default)]
    max_times_with_same_partner: Option<u32>,
    #[serde(default)]
    max_times_with_same_opponent: Option<u32>,
    #[serde(default)]
    co_admins: Vec<Uuid>,
}

#[derive(Deserialize)]
struct JoinBody {
    name: String,
}

#[derive(Deserialize)]
struct CreateTeamBody {
    name: String,
    members: Vec<ParticipantId>,
}

#[derive(Deserialize)]
struct GenerateBracketBody {
    #[serde(default)]
    kind: BracketKind,
    #[serde(default)]
    entrants: Vec<SeededEntrant>,
}

#[derive(Deserialize)]
struct FinalizeBody {
    #[serde(default = "default_reason")]
    reason: FinalizationReason,
}

fn default_reason() -> FinalizationReason {
    FinalizationReason::AdminOverride
}

#[derive(Deserialize)]
struct StandingsQuery {
    #[serde(default)]
    view: StandingsView,
}

#[derive(Deserialize)]
struct TournamentPath {
    id: TournamentId,
}

#[derive(Deserialize)]
struct MatchPath {
    match_id: MatchId,
}

fn error_response(e: &TournamentError) -> HttpResponse {
    let category = e.category();
    if category == tourney_engine::ErrorCategory::Unknown {
        log::error!("request failed: {e}");
    }
    let status = actix_web::http::StatusCode::from_u16(category.http_status())
        .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);
    HttpResponse::build(status).json(serde_json::json!({
        "code": e.code(),
        "category": category,
        "message": e.to_string(),
        "details": e.details(),
    }))
}

fn respond<T: Serialize>(result: Result<T, TournamentError>) -> HttpResponse {
    match result {
        Ok(body) => HttpResponse::Ok().json(body),
        Err(e) => error_response(&e),
    }
}

/// Acting user from the request headers.
fn actor(req: &HttpRequest) -> Result<Actor, HttpResponse> {
    let user_id = req
        .headers()
        .get("X-User-Id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .ok_or_else(|| {
            HttpResponse::Unauthorized().json(serde_json::json!({
                "code": "UNAUTHENTICATED",
                "message": "missing or malformed X-User-Id header",
            }))
        })?;
    let super_admin = req
        .headers()
        .get("X-User-Role")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("super_admin"));
    Ok(Actor {
        user_id,
        super_admin,
    })
}

macro_rules! actor_or_reject {
    ($req:expr) => {
        match actor(&$req) {
            Ok(actor) => actor,
            Err(response) => return response,
        }
    };
}

#[get("/api/health")]
async fn api_health() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        ok: true,
        service: "tourney-engine",
    })
}

#[post("/api/tournaments")]
async fn api_create_tournament(
    state: AppState,
    req: HttpRequest,
    body: Json<CreateTournamentBody>,
) -> HttpResponse {
    let actor = actor_or_reject!(req);
    let body = body.into_inner();
    let mut t = Tournament::new(body.name.trim(), actor.user_id, body.team_mode);
    t.allow_draw = body.allow_draw;
    t.scoring = body.scoring.unwrap_or_default();
    t.min_team_size = body.min_team_size.unwrap_or(t.min_team_size);
    t.max_team_size = body.max_team_size.unwrap_or(t.min_team_size.max(t.max_team_size));
    t.max_matches_per_player = body.max_matches_per_player;
    t.max_times_with_same_partner = body.max_times_with_same_partner;
    t.max_times_with_same_opponent = body.max_times_with_same_opponent;
    t.co_admins = body.co_admins;
    respond(state.create_tournament(t, &actor))
}

#[get("/api/tournaments/{id}")]
async fn api_get_tournament(state: AppState, path: Path<TournamentPath>) -> HttpResponse {
    respond(state.tournament(path.id))
}

#[get("/api/tournaments/{id}/participants")]
async fn api_list_participants(state: AppState, path: Path<TournamentPath>) -> HttpResponse {
    respond(state.participants(path.id))
}

/// Register the acting user.
#[post("/api/tournaments/{id}/participants")]
async fn api_join(
    state: AppState,
    req: HttpRequest,
    path: Path<TournamentPath>,
    body: Json<JoinBody>,
) -> HttpResponse {
    let actor = actor_or_reject!(req);
    respond(state.join_tournament(path.id, body.name.trim(), &actor))
}

#[delete("/api/tournaments/{id}/participants/me")]
async fn api_leave(state: AppState, req: HttpRequest, path: Path<TournamentPath>) -> HttpResponse {
    let actor = actor_or_reject!(req);
    match state.leave_tournament(path.id, &actor) {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(e) => error_response(&e),
    }
}

#[post("/api/tournaments/{id}/teams")]
async fn api_create_team(
    state: AppState,
    req: HttpRequest,
    path: Path<TournamentPath>,
    body: Json<CreateTeamBody>,
) -> HttpResponse {
    let actor = actor_or_reject!(req);
    let body = body.into_inner();
    respond(state.create_team(path.id, &body.name, body.members, &actor))
}

#[post("/api/tournaments/{id}/bracket")]
async fn api_generate_bracket(
    state: AppState,
    req: HttpRequest,
    path: Path<TournamentPath>,
    body: Json<GenerateBracketBody>,
) -> HttpResponse {
    let actor = actor_or_reject!(req);
    respond(state.generate_bracket(path.id, body.kind, &body.entrants, &actor))
}

#[get("/api/tournaments/{id}/matches")]
async fn api_list_matches(state: AppState, path: Path<TournamentPath>) -> HttpResponse {
    respond(state.matches(path.id))
}

#[post("/api/tournaments/{id}/matches")]
async fn api_create_match(
    state: AppState,
    req: HttpRequest,
    path: Path<TournamentPath>,
    body: Json<MatchInput>,
) -> HttpResponse {
    let actor = actor_or_reject!(req);
    respond(state.create_match(path.id, &body, &actor))
}

/// Pre-flight check; never mutates.
#[post("/api/tournaments/{id}/matches/validate")]
async fn api_validate_match(
    state: AppState,
    path: Path<TournamentPath>,
    body: Json<MatchInput>,
) -> HttpResponse {
    respond(state.validate_match(path.id, &body))
}

#[get("/api/tournaments/{id}/standings")]
async fn api_standings(
    state: AppState,
    path: Path<TournamentPath>,
    query: Query<StandingsQuery>,
) -> HttpResponse {
    respond(state.standings(path.id, query.view))
}

#[get("/api/matches/{match_id}")]
async fn api_get_match(state: AppState, path: Path<MatchPath>) -> HttpResponse {
    respond(state.get_match(path.match_id))
}

#[put("/api/matches/{match_id}")]
async fn api_update_match(
    state: AppState,
    req: HttpRequest,
    path: Path<MatchPath>,
    body: Json<MatchInput>,
) -> HttpResponse {
    let actor = actor_or_reject!(req);
    respond(state.update_match(path.match_id, &body, &actor))
}

#[delete("/api/matches/{match_id}")]
async fn api_delete_match(state: AppState, req: HttpRequest, path: Path<MatchPath>) -> HttpResponse {
    let actor = actor_or_reject!(req);
    match state.delete_match(path.match_id, &actor) {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(e) => error_response(&e),
    }
}

#[post("/api/matches/{match_id}/report")]
async fn api_report(
    state: AppState,
    req: HttpRequest,
    path: Path<MatchPath>,
    body: Json<ScoreInput>,
) -> HttpResponse {
    let actor = actor_or_reject!(req);
    respond(state.report_result(path.match_id, &body, &actor))
}

#[post("/api/matches/{match_id}/confirm")]
async fn api_confirm(state: AppState, req: HttpRequest, path: Path<MatchPath>) -> HttpResponse {
    let actor = actor_or_reject!(req);
    respond(state.confirm_match(path.match_id, &actor))
}

#[post("/api/matches/{match_id}/contest")]
async fn api_contest(
    state: AppState,
    req: HttpRequest,
    path: Path<MatchPath>,
    body: Json<ContestInput>,
) -> HttpResponse {
    let actor = actor_or_reject!(req);
    respond(state.contest_match(path.match_id, &body, &actor))
}

#[post("/api/matches/{match_id}/finalize")]
async fn api_finalize(
    state: AppState,
    req: HttpRequest,
    path: Path<MatchPath>,
    body: Option<Json<FinalizeBody>>,
) -> HttpResponse {
    let actor = actor_or_reject!(req);
    let reason = body.map_or_else(default_reason, |b| b.reason);
    respond(state.finalize_match(path.match_id, reason, Some(&actor)))
}

#[post("/api/matches/{match_id}/cancel")]
async fn api_cancel(state: AppState, req: HttpRequest, path: Path<MatchPath>) -> HttpResponse {
    let actor = actor_or_reject!(req);
    respond(state.cancel_match(path.match_id, &actor))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::from_env();
    log::info!("Starting server at http://{}:{}", config.host, config.port);

    let registry = Arc::new(ChannelRegistry::new());
    let state = Data::new(TournamentService::new(
        MemoryStore::new(),
        registry,
        config.settings(),
    ));

    // Background task: settle matches whose confirmation window has closed
    let sweeper = state.clone();
    let every = Duration::from_secs(config.sweep_interval_secs);
    actix_web::rt::spawn(async move {
        let mut interval = actix_web::rt::time::interval(every);
        loop {
            interval.tick().await;
            match sweeper.auto_finalize_expired_matches() {
                Ok(report) if report.total > 0 => log::info!(
                    "Swept {} expired match(es): {} finalized, {} disputed",
                    report.total,
                    report.finalized.len(),
                    report.disputed.len()
                ),
                Ok(_) => {}
                Err(e) => log::warn!("Sweep failed: {e}"),
            }
        }
    });

    let bind = (config.host.clone(), config.port);
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .service(api_health)
            .service(api_create_tournament)
            .service(api_get_tournament)
            .service(api_list_participants)
            .service(api_join)
            .service(api_leave)
            .service(api_create_team)
            .service(api_generate_bracket)
            .service(api_list_matches)
            .service(api_validate_match)
            .service(api_create_match)
            .service(api_standings)
            .service(api_get_match)
            .service(api_update_match)
            .service(api_delete_match)
            .service(api_report)
            .service(api_confirm)
            .service(api_contest)
            .service(api_finalize)
            .service(api_cancel)
    })
    .bind(bind)?
    .run()
    .await
}
