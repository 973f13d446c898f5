use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::error::EngineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub name: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetSnapshot {
    pub monthly_income: f64,
    pub savings_rate_pct: u32,
    pub expenses: Vec<Expense>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetSummary {
    pub obligatory_savings: f64,
    pub total_expenses: f64,
    pub surplus: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Daily closes for one ticker, ordered by date. Every close is finite and
/// strictly positive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(mut points: Vec<PricePoint>) -> Result<Self, EngineError> {
        if let Some(bad) = points
            .iter()
            .find(|p| !p.close.is_finite() || p.close <= 0.0)
        {
            return Err(EngineError::InvalidPrice {
                date: bad.date,
                close: bad.close,
            });
        }
        points.sort_by_key(|p| p.date);
        Ok(Self { points })
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&PricePoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnVolatility {
    pub current_price: f64,
    pub annualized_return_pct: f64,
    pub annualized_volatility_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionPoint {
    pub month: u32,
    pub future_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionResult {
    pub obligatory_savings: f64,
    pub total_expenses: f64,
    pub surplus: f64,
    pub annualized_return_pct: f64,
    pub annualized_volatility_pct: f64,
    pub monthly_rate: f64,
    pub monthly_schedule: Vec<ProjectionPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalPoint {
    pub month: u32,
    pub cumulative_saved: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub name: String,
    pub target_cost: f64,
    pub target_date: NaiveDate,
    pub months_remaining: u32,
    pub monthly_required: f64,
    pub cumulative_schedule: Vec<GoalPoint>,
}
