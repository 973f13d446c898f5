mod engine;
mod error;
mod types;

pub use engine::{
    MIN_CLOSES_FOR_VOLATILITY, TRADING_DAYS_PER_YEAR, build_projection, compute_budget,
    compute_return_volatility, monthly_rate_from_annual_pct, months_between, plan_goal,
    project_annuity,
};
pub use error::EngineError;
pub use types::{
    BudgetSnapshot, BudgetSummary, Expense, Goal, GoalPoint, PricePoint, PriceSeries,
    ProjectionPoint, ProjectionResult, ReturnVolatility,
};
