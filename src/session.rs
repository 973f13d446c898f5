//! Per-user session state and the validated form mutations that change it.
//!
//! Every mutation validates its whole input before touching the session, so a
//! rejected submission leaves prior state exactly as it was.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::core::{BudgetSnapshot, BudgetSummary, EngineError, Expense, Goal, compute_budget};

pub const MIN_SAVINGS_RATE_PCT: u32 = 5;
pub const MAX_SAVINGS_RATE_PCT: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("age must be greater than 0")]
    InvalidAge,

    #[error("{0} must be greater than 0")]
    NotPositive(&'static str),

    #[error("savings rate must be between 5 and 50 percent, got {0}")]
    SavingsRateOutOfRange(u32),

    #[error("complete your income and savings rate first")]
    IncomeNotSaved,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Goal(#[from] EngineError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalInfo {
    pub name: String,
    pub email: String,
    pub age: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeSettings {
    pub monthly_income: f64,
    pub savings_rate_pct: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    personal: Option<PersonalInfo>,
    income: Option<IncomeSettings>,
    expenses: Vec<Expense>,
    goal: Option<Goal>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn personal(&self) -> Option<&PersonalInfo> {
        self.personal.as_ref()
    }

    pub fn income(&self) -> Option<IncomeSettings> {
        self.income
    }

    pub fn expenses(&self) -> &[Expense] {
        &self.expenses
    }

    pub fn goal(&self) -> Option<&Goal> {
        self.goal.as_ref()
    }

    pub fn save_personal_info(
        &mut self,
        name: &str,
        email: &str,
        age: u32,
    ) -> Result<&PersonalInfo, ValidationError> {
        let name = required("name", name)?;
        let email = required("email", email)?;
        if age == 0 {
            return Err(ValidationError::InvalidAge);
        }
        Ok(self.personal.insert(PersonalInfo { name, email, age }))
    }

    pub fn save_income(
        &mut self,
        monthly_income: f64,
        savings_rate_pct: u32,
    ) -> Result<IncomeSettings, ValidationError> {
        positive("monthly income", monthly_income)?;
        if !(MIN_SAVINGS_RATE_PCT..=MAX_SAVINGS_RATE_PCT).contains(&savings_rate_pct) {
            return Err(ValidationError::SavingsRateOutOfRange(savings_rate_pct));
        }
        let settings = IncomeSettings {
            monthly_income,
            savings_rate_pct,
        };
        self.income = Some(settings);
        Ok(settings)
    }

    pub fn add_expense(&mut self, name: &str, amount: f64) -> Result<&Expense, ValidationError> {
        let name = required("expense name", name)?;
        positive("expense amount", amount)?;
        self.expenses.push(Expense { name, amount });
        Ok(&self.expenses[self.expenses.len() - 1])
    }

    pub fn plan_goal(
        &mut self,
        name: &str,
        target_cost: f64,
        target_date: NaiveDate,
        today: NaiveDate,
    ) -> Result<&Goal, SessionError> {
        let name = required("goal name", name)?;
        positive("goal cost", target_cost)?;
        let goal = crate::core::plan_goal(&name, target_cost, target_date, today)?;
        Ok(self.goal.insert(goal))
    }

    pub fn budget_snapshot(&self) -> Result<BudgetSnapshot, ValidationError> {
        let income = self.income.ok_or(ValidationError::IncomeNotSaved)?;
        Ok(BudgetSnapshot {
            monthly_income: income.monthly_income,
            savings_rate_pct: income.savings_rate_pct,
            expenses: self.expenses.clone(),
        })
    }

    pub fn budget_summary(&self) -> Result<BudgetSummary, ValidationError> {
        let snapshot = self.budget_snapshot()?;
        Ok(compute_budget(
            snapshot.monthly_income,
            f64::from(snapshot.savings_rate_pct),
            &snapshot.expenses,
        ))
    }
}

fn required(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(trimmed.to_string())
}

fn positive(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ValidationError::NotPositive(field));
    }
    Ok(())
}

#[derive(Debug)]
struct StoredSession {
    session: Session,
    last_seen: Instant,
}

/// Independent sessions keyed by id. Nothing is shared between entries.
///
/// A session untouched for longer than the idle TTL is gone: lookups treat it
/// as unknown, and every `create` sweeps such entries out of the map.
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<SessionId, StoredSession>,
    idle_ttl: Duration,
}

impl SessionStore {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            idle_ttl,
        }
    }

    pub fn create(&self) -> SessionId {
        let evicted = self.evict_idle();
        if evicted > 0 {
            debug!(evicted, "dropped idle sessions");
        }
        let id = SessionId::new();
        self.sessions.insert(
            id,
            StoredSession {
                session: Session::new(),
                last_seen: Instant::now(),
            },
        );
        id
    }

    pub fn snapshot(&self, id: SessionId) -> Option<Session> {
        self.with_session(id, |s| s.clone())
    }

    /// Runs `f` against the session, or returns `None` for an unknown or idle id.
    pub fn with_session<T>(&self, id: SessionId, f: impl FnOnce(&mut Session) -> T) -> Option<T> {
        {
            let mut entry = self.sessions.get_mut(&id)?;
            if entry.last_seen.elapsed() <= self.idle_ttl {
                entry.last_seen = Instant::now();
                return Some(f(&mut entry.session));
            }
        }
        self.sessions
            .remove_if(&id, |_, stored| stored.last_seen.elapsed() > self.idle_ttl);
        None
    }

    /// Removes every idle session and returns how many were dropped.
    pub fn evict_idle(&self) -> usize {
        let mut evicted = 0;
        self.sessions.retain(|_, stored| {
            let keep = stored.last_seen.elapsed() <= self.idle_ttl;
            if !keep {
                evicted += 1;
            }
            keep
        });
        evicted
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}
