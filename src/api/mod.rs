use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{
        Json, Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::catalog::{Etf, EtfInfo, UnknownTicker, catalog};
use crate::config::{AppConfig, ProjectionConfig, ServerConfig};
use crate::core::{
    BudgetSummary, Expense, Goal, PriceSeries, ProjectionResult, build_projection,
    compute_return_volatility,
};
use crate::market::{MarketDataError, MarketSnapshotProvider};
use crate::session::{
    IncomeSettings, PersonalInfo, Session, SessionError, SessionId, SessionStore, ValidationError,
};

const INDEX_HTML: &str = include_str!("../../web/index.html");
const STYLES_CSS: &str = include_str!("../../web/styles.css");
const APP_JS: &str = include_str!("../../web/app.js");

pub struct AppState {
    sessions: SessionStore,
    market: Arc<dyn MarketSnapshotProvider>,
    projection: ProjectionConfig,
    today: fn() -> NaiveDate,
}

impl AppState {
    pub fn new(
        market: Arc<dyn MarketSnapshotProvider>,
        projection: ProjectionConfig,
        session_ttl: Duration,
    ) -> Self {
        Self {
            sessions: SessionStore::new(session_ttl),
            market,
            projection,
            today: local_today,
        }
    }

    /// Overrides the date goals are planned against.
    pub fn with_today(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }
}

fn local_today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    UnknownTicker(#[from] UnknownTicker),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::UnknownTicker(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) | ApiError::Session(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error_response(self.status(), &self.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProfilePayload {
    name: Option<String>,
    email: Option<String>,
    age: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct IncomePayload {
    monthly_income: Option<f64>,
    savings_rate_pct: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ExpensePayload {
    name: Option<String>,
    amount: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct GoalPayload {
    name: Option<String>,
    #[serde(alias = "targetCost")]
    cost: Option<f64>,
    target_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PlanQuery {
    ticker: Option<String>,
    months: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatedSessionResponse {
    session_id: SessionId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    session_id: SessionId,
    total_expenses: f64,
    #[serde(flatten)]
    session: Session,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExpenseResponse {
    expense: Expense,
    expenses: Vec<Expense>,
    total_expenses: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InvestmentResponse {
    current_price: f64,
    annualized_return_pct: f64,
    annualized_volatility_pct: f64,
    projection: ProjectionResult,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanResponse {
    monthly_income: f64,
    savings_rate_pct: u32,
    budget: BudgetSummary,
    etf: EtfInfo,
    months: u32,
    investment: Option<InvestmentResponse>,
    investment_error: Option<String>,
    goal: Option<Goal>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/index.html", get(index_handler))
        .route("/styles.css", get(styles_handler))
        .route("/app.js", get(app_js_handler))
        .route("/health", get(health_handler))
        .route("/api/etfs", get(etfs_handler))
        .route("/api/sessions", post(create_session_handler))
        .route("/api/sessions/:id", get(session_handler))
        .route("/api/sessions/:id/profile", post(profile_handler))
        .route("/api/sessions/:id/income", post(income_handler))
        .route("/api/sessions/:id/expenses", post(expense_handler))
        .route("/api/sessions/:id/goal", post(goal_handler))
        .route("/api/sessions/:id/plan", get(plan_handler))
        .fallback(not_found_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_http_server(
    config: &AppConfig,
    market: Arc<dyn MarketSnapshotProvider>,
) -> std::io::Result<()> {
    let listener = bind_listener(&config.server).await?;
    let addr = listener.local_addr()?;
    let state = Arc::new(AppState::new(
        market,
        config.projection.clone(),
        config.server.session_ttl(),
    ));

    info!("budgetpilot listening on http://{addr}");
    info!("Local access: http://127.0.0.1:{}/", addr.port());

    axum::serve(listener, router(state)).await
}

/// Binds the configured host, which may be an IP literal or a resolvable name.
async fn bind_listener(server: &ServerConfig) -> std::io::Result<TcpListener> {
    TcpListener::bind((server.host.as_str(), server.port)).await
}

async fn index_handler() -> impl IntoResponse {
    with_cache_control(Html(INDEX_HTML))
}

async fn styles_handler() -> impl IntoResponse {
    with_cache_control((
        [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
        STYLES_CSS,
    ))
}

async fn app_js_handler() -> impl IntoResponse {
    with_cache_control((
        [(
            header::CONTENT_TYPE,
            "application/javascript; charset=utf-8",
        )],
        APP_JS,
    ))
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn health_handler() -> Response {
    json_response(
        StatusCode::OK,
        HealthResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        },
    )
}

async fn etfs_handler() -> Response {
    json_response(StatusCode::OK, catalog())
}

async fn create_session_handler(State(state): State<Arc<AppState>>) -> Response {
    let session_id = state.sessions.create();
    info!(%session_id, active = state.sessions.active_sessions(), "session created");
    json_response(StatusCode::CREATED, CreatedSessionResponse { session_id })
}

async fn session_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let session_id = parse_session_id(&id)?;
    let session = state
        .sessions
        .snapshot(session_id)
        .ok_or(ApiError::SessionNotFound(id))?;
    let total_expenses = session.expenses().iter().map(|e| e.amount).sum();
    Ok(json_response(
        StatusCode::OK,
        SessionResponse {
            session_id,
            total_expenses,
            session,
        },
    ))
}

async fn profile_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<ProfilePayload>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload?;
    let session_id = parse_session_id(&id)?;
    let name = payload.name.unwrap_or_default();
    let email = payload.email.unwrap_or_default();
    let age = payload.age.ok_or(ValidationError::MissingField("age"))?;

    let saved: PersonalInfo = mutate(&state, session_id, |s| {
        s.save_personal_info(&name, &email, age).cloned()
    })?;
    debug!(%session_id, "profile saved");
    Ok(json_response(StatusCode::OK, saved))
}

async fn income_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<IncomePayload>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload?;
    let session_id = parse_session_id(&id)?;
    let income = payload
        .monthly_income
        .ok_or(ValidationError::MissingField("monthly income"))?;
    let rate = payload
        .savings_rate_pct
        .ok_or(ValidationError::MissingField("savings rate"))?;

    let saved: IncomeSettings = mutate(&state, session_id, |s| s.save_income(income, rate))?;
    debug!(%session_id, rate, "income saved");
    Ok(json_response(StatusCode::OK, saved))
}

async fn expense_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<ExpensePayload>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload?;
    let session_id = parse_session_id(&id)?;
    let name = payload.name.unwrap_or_default();
    let amount = payload
        .amount
        .ok_or(ValidationError::MissingField("expense amount"))?;

    let response = mutate(&state, session_id, |s| {
        let expense = s.add_expense(&name, amount)?.clone();
        let expenses = s.expenses().to_vec();
        let total_expenses = expenses.iter().map(|e| e.amount).sum();
        Ok::<_, ValidationError>(ExpenseResponse {
            expense,
            expenses,
            total_expenses,
        })
    })?;
    debug!(%session_id, count = response.expenses.len(), "expense added");
    Ok(json_response(StatusCode::CREATED, response))
}

async fn goal_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<GoalPayload>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload?;
    let session_id = parse_session_id(&id)?;
    let name = payload.name.unwrap_or_default();
    let cost = payload.cost.ok_or(ValidationError::MissingField("goal cost"))?;
    let target_date = payload
        .target_date
        .ok_or(ValidationError::MissingField("target date"))?;
    let today = (state.today)();

    let goal: Goal = mutate(&state, session_id, |s| {
        s.plan_goal(&name, cost, target_date, today).cloned()
    })?;
    debug!(%session_id, months = goal.months_remaining, "goal planned");
    Ok(json_response(StatusCode::OK, goal))
}

async fn plan_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    query: Result<Query<PlanQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let session_id = parse_session_id(&id)?;
    let session = state
        .sessions
        .snapshot(session_id)
        .ok_or(ApiError::SessionNotFound(id))?;
    // Checked before the fetch so an incomplete session never hits the network.
    session.budget_summary()?;

    let etf = match query.ticker.as_deref() {
        Some(ticker) => ticker.parse::<Etf>()?,
        None => Etf::default(),
    };
    let months = resolve_months(query.months, &state.projection)?;

    let fetched = state.market.fetch_one_year_daily_closes(etf).await;
    if let Err(err) = &fetched {
        warn!(%session_id, %etf, error = %err, "market data unavailable");
    }

    let response = assemble_plan(&session, etf, months, fetched)?;
    Ok(json_response(StatusCode::OK, response))
}

fn mutate<T, E>(
    state: &AppState,
    session_id: SessionId,
    f: impl FnOnce(&mut Session) -> Result<T, E>,
) -> Result<T, ApiError>
where
    ApiError: From<E>,
{
    state
        .sessions
        .with_session(session_id, f)
        .ok_or_else(|| ApiError::SessionNotFound(session_id.to_string()))?
        .map_err(ApiError::from)
}

fn parse_session_id(raw: &str) -> Result<SessionId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::SessionNotFound(raw.to_string()))
}

fn resolve_months(requested: Option<u32>, config: &ProjectionConfig) -> Result<u32, ApiError> {
    let months = requested.unwrap_or(config.default_months);
    if !(1..=config.max_months).contains(&months) {
        return Err(ApiError::BadRequest(format!(
            "months must be between 1 and {}",
            config.max_months
        )));
    }
    Ok(months)
}

fn assemble_plan(
    session: &Session,
    etf: Etf,
    months: u32,
    fetched: Result<PriceSeries, MarketDataError>,
) -> Result<PlanResponse, ApiError> {
    let budget = session.budget_summary()?;
    let income = session.income().ok_or(ValidationError::IncomeNotSaved)?;

    let (investment, investment_error) = match fetched {
        Err(err) => (None, Some(err.to_string())),
        Ok(series) => match compute_return_volatility(&series) {
            Err(err) => (None, Some(err.to_string())),
            Ok(market) => (
                Some(InvestmentResponse {
                    current_price: market.current_price,
                    annualized_return_pct: market.annualized_return_pct,
                    annualized_volatility_pct: market.annualized_volatility_pct,
                    projection: build_projection(&budget, &market, months),
                }),
                None,
            ),
        },
    };

    Ok(PlanResponse {
        monthly_income: income.monthly_income,
        savings_rate_pct: income.savings_rate_pct,
        budget,
        etf: etf.into(),
        months,
        investment,
        investment_error,
        goal: session.goal().cloned(),
    })
}

fn with_cache_control<R: IntoResponse>(response: R) -> Response {
    let mut response = response.into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    with_cache_control((status, Json(body)))
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EngineError, PricePoint};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_session() -> Session {
        let mut session = Session::new();
        session.save_income(20_000.0, 10).expect("valid income");
        session.add_expense("rent", 7_000.0).expect("valid expense");
        session.add_expense("food", 3_000.0).expect("valid expense");
        session
    }

    fn rising_series() -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2024, 6, 3).expect("valid date");
        let closes = [100.0, 101.0, 103.0, 102.0, 112.0];
        PriceSeries::new(
            closes
                .iter()
                .enumerate()
                .map(|(i, &close)| PricePoint {
                    date: start + chrono::Days::new(i as u64),
                    close,
                })
                .collect(),
        )
        .expect("valid series")
    }

    #[test]
    fn plan_projects_surplus_at_trailing_return() {
        let plan = assemble_plan(&sample_session(), Etf::Spy, 3, Ok(rising_series()))
            .expect("complete session");

        assert_approx(plan.budget.obligatory_savings, 2_000.0);
        assert_approx(plan.budget.total_expenses, 10_000.0);
        assert_approx(plan.budget.surplus, 8_000.0);

        let investment = plan.investment.expect("market data available");
        assert!(plan.investment_error.is_none());
        assert_approx(investment.current_price, 112.0);
        assert_approx(investment.annualized_return_pct, 12.0);
        assert_approx(investment.projection.monthly_rate, 0.01);
        assert_eq!(investment.projection.monthly_schedule.len(), 3);
        assert_approx(
            investment.projection.monthly_schedule[2].future_value,
            8_000.0 * 3.0301,
        );
    }

    #[test]
    fn plan_keeps_budget_when_market_data_is_unavailable() {
        let fetched = Err(MarketDataError::unavailable(Etf::Xle, "connection refused"));
        let plan = assemble_plan(&sample_session(), Etf::Xle, 12, fetched).expect("budget only");

        assert!(plan.investment.is_none());
        let message = plan.investment_error.expect("error surfaced");
        assert!(message.contains("market data unavailable"));
        assert_approx(plan.budget.surplus, 8_000.0);
    }

    #[test]
    fn plan_withholds_projection_for_short_series() {
        let short = PriceSeries::new(vec![PricePoint {
            date: NaiveDate::from_ymd_opt(2024, 6, 3).expect("valid date"),
            close: 100.0,
        }])
        .expect("valid series");
        let plan = assemble_plan(&sample_session(), Etf::Spy, 12, Ok(short)).expect("budget");

        assert!(plan.investment.is_none());
        let expected = EngineError::InsufficientData {
            required: 3,
            actual: 1,
        }
        .to_string();
        assert_eq!(plan.investment_error.as_deref(), Some(expected.as_str()));
    }

    #[test]
    fn plan_requires_saved_income() {
        let err = assemble_plan(&Session::new(), Etf::Spy, 12, Ok(rising_series()))
            .expect_err("no income yet");
        assert!(matches!(
            err,
            ApiError::Validation(ValidationError::IncomeNotSaved)
        ));
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn binds_hostname_as_well_as_ip_literal() {
        for host in ["localhost", "127.0.0.1"] {
            let server = ServerConfig {
                host: host.to_string(),
                port: 0,
                ..ServerConfig::default()
            };
            let listener = bind_listener(&server).await.expect("host resolves");
            assert!(listener.local_addr().expect("bound").ip().is_loopback());
        }
    }

    #[test]
    fn resolve_months_defaults_and_bounds() {
        let config = ProjectionConfig::default();
        assert_eq!(resolve_months(None, &config).expect("default"), 12);
        assert_eq!(resolve_months(Some(36), &config).expect("max"), 36);
        assert!(resolve_months(Some(0), &config).is_err());
        assert!(resolve_months(Some(37), &config).is_err());
    }

    #[test]
    fn goal_payload_parses_web_keys() {
        let json = r#"{"name":"Wedding","targetCost":15000,"targetDate":"2027-04-01"}"#;
        let payload: GoalPayload = serde_json::from_str(json).expect("json should parse");
        assert_eq!(payload.name.as_deref(), Some("Wedding"));
        assert_eq!(payload.cost, Some(15_000.0));
        assert_eq!(payload.target_date, NaiveDate::from_ymd_opt(2027, 4, 1));
    }

    #[test]
    fn income_payload_tolerates_missing_fields() {
        let payload: IncomePayload =
            serde_json::from_str(r#"{"monthlyIncome": 4500}"#).expect("json should parse");
        assert_eq!(payload.monthly_income, Some(4_500.0));
        assert_eq!(payload.savings_rate_pct, None);
    }

    #[test]
    fn plan_response_serialization_contains_expected_fields() {
        let plan = assemble_plan(&sample_session(), Etf::Voo, 2, Ok(rising_series()))
            .expect("complete session");
        let json = serde_json::to_string(&plan).expect("response should serialize");
        assert!(json.contains("\"budget\""));
        assert!(json.contains("\"obligatorySavings\""));
        assert!(json.contains("\"monthlySchedule\""));
        assert!(json.contains("\"futureValue\""));
        assert!(json.contains("\"annualizedVolatilityPct\""));
        assert!(json.contains("\"ticker\":\"VOO\""));
    }

    #[test]
    fn api_errors_map_to_statuses() {
        assert_eq!(
            ApiError::SessionNotFound("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(UnknownTicker("TSLA".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(ValidationError::InvalidAge).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::from(SessionError::Goal(EngineError::PastOrCurrentMonth {
                months_remaining: 0
            }))
            .status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
