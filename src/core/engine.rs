use chrono::{Datelike, NaiveDate};

use super::error::EngineError;
use super::types::{
    BudgetSummary, Expense, Goal, GoalPoint, PriceSeries, ProjectionPoint, ProjectionResult,
    ReturnVolatility,
};

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

// Two daily returns are the minimum for a sample standard deviation.
pub const MIN_CLOSES_FOR_VOLATILITY: usize = 3;

const ZERO_RATE_EPS: f64 = 1e-12;

pub fn compute_budget(
    monthly_income: f64,
    savings_rate_pct: f64,
    expenses: &[Expense],
) -> BudgetSummary {
    let obligatory_savings = monthly_income * (savings_rate_pct / 100.0);
    let total_expenses: f64 = expenses.iter().map(|e| e.amount).sum();
    BudgetSummary {
        obligatory_savings,
        total_expenses,
        surplus: monthly_income - obligatory_savings - total_expenses,
    }
}

pub fn compute_return_volatility(series: &PriceSeries) -> Result<ReturnVolatility, EngineError> {
    let points = series.points();
    if points.len() < MIN_CLOSES_FOR_VOLATILITY {
        return Err(EngineError::InsufficientData {
            required: MIN_CLOSES_FOR_VOLATILITY,
            actual: points.len(),
        });
    }

    let first_price = points[0].close;
    let current_price = points[points.len() - 1].close;
    let annualized_return_pct = ((current_price / first_price) - 1.0) * 100.0;

    let returns = daily_returns(series);
    let annualized_volatility_pct =
        sample_std_dev(&returns) * TRADING_DAYS_PER_YEAR.sqrt() * 100.0;

    Ok(ReturnVolatility {
        current_price,
        annualized_return_pct,
        annualized_volatility_pct,
    })
}

pub fn monthly_rate_from_annual_pct(annualized_return_pct: f64) -> f64 {
    annualized_return_pct / 100.0 / 12.0
}

/// Future value of an ordinary annuity of `surplus` paid at the end of each
/// month, for every month from 1 through `num_months`.
pub fn project_annuity(surplus: f64, monthly_rate: f64, num_months: u32) -> Vec<ProjectionPoint> {
    (1..=num_months)
        .map(|month| ProjectionPoint {
            month,
            future_value: annuity_future_value(surplus, monthly_rate, month),
        })
        .collect()
}

pub fn build_projection(
    budget: &BudgetSummary,
    market: &ReturnVolatility,
    num_months: u32,
) -> ProjectionResult {
    let monthly_rate = monthly_rate_from_annual_pct(market.annualized_return_pct);
    ProjectionResult {
        obligatory_savings: budget.obligatory_savings,
        total_expenses: budget.total_expenses,
        surplus: budget.surplus,
        annualized_return_pct: market.annualized_return_pct,
        annualized_volatility_pct: market.annualized_volatility_pct,
        monthly_rate,
        monthly_schedule: project_annuity(budget.surplus, monthly_rate, num_months),
    }
}

/// Whole calendar months from `today` to `target_date`; day-of-month is ignored.
pub fn months_between(today: NaiveDate, target_date: NaiveDate) -> i64 {
    (i64::from(target_date.year()) - i64::from(today.year())) * 12
        + (i64::from(target_date.month()) - i64::from(today.month()))
}

pub fn plan_goal(
    name: &str,
    target_cost: f64,
    target_date: NaiveDate,
    today: NaiveDate,
) -> Result<Goal, EngineError> {
    let months_remaining = months_between(today, target_date);
    if months_remaining <= 0 {
        return Err(EngineError::PastOrCurrentMonth { months_remaining });
    }
    let months = u32::try_from(months_remaining)
        .map_err(|_| EngineError::PastOrCurrentMonth { months_remaining })?;

    let monthly_required = target_cost / f64::from(months);
    let cumulative_schedule = (1..=months)
        .map(|month| GoalPoint {
            month,
            cumulative_saved: monthly_required * f64::from(month),
        })
        .collect();

    Ok(Goal {
        name: name.to_string(),
        target_cost,
        target_date,
        months_remaining: months,
        monthly_required,
        cumulative_schedule,
    })
}

fn annuity_future_value(surplus: f64, monthly_rate: f64, payments: u32) -> f64 {
    if monthly_rate.abs() < ZERO_RATE_EPS {
        return surplus * f64::from(payments);
    }
    let growth = match i32::try_from(payments) {
        Ok(n) => (1.0 + monthly_rate).powi(n),
        Err(_) => (1.0 + monthly_rate).powf(f64::from(payments)),
    };
    surplus * (growth - 1.0) / monthly_rate
}

fn daily_returns(series: &PriceSeries) -> Vec<f64> {
    series
        .points()
        .windows(2)
        .map(|pair| pair[1].close / pair[0].close - 1.0)
        .collect()
}

fn sample_std_dev(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (sum_sq / (n as f64 - 1.0)).sqrt()
}
