//! Aggregates over the ledger for display.
//!
//! Every function takes `now` explicitly so results are deterministic; day
//! boundaries follow the timezone of `now`.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use pufftrack_sync_types::PuffEvent;

/// Puffs whose local date (in `tz`) is `day`.
pub fn puffs_on<Tz: TimeZone>(events: &[PuffEvent], day: NaiveDate, tz: &Tz) -> usize {
    events
        .iter()
        .filter(|e| e.timestamp.with_timezone(tz).date_naive() == day)
        .count()
}

/// Puffs logged on the same local day as `now`.
pub fn puffs_today<Tz: TimeZone>(events: &[PuffEvent], now: &DateTime<Tz>) -> usize {
    puffs_on(events, now.date_naive(), &now.timezone())
}

/// Per-day counts, keyed by local date.
pub fn daily_counts<Tz: TimeZone>(events: &[PuffEvent], tz: &Tz) -> BTreeMap<NaiveDate, usize> {
    let mut counts = BTreeMap::new();
    for event in events {
        *counts
            .entry(event.timestamp.with_timezone(tz).date_naive())
            .or_insert(0) += 1;
    }
    counts
}

/// Most recent puff timestamp.
pub fn last_puff(events: &[PuffEvent]) -> Option<DateTime<Utc>> {
    events.iter().map(|e| e.timestamp).max()
}

/// Whole hours since the most recent puff, if any.
pub fn hours_since_last_puff<Tz: TimeZone>(
    events: &[PuffEvent],
    now: &DateTime<Tz>,
) -> Option<i64> {
    let now = now.with_timezone(&Utc);
    last_puff(events).map(|last| (now - last).num_hours().max(0))
}

/// Whole days since the most recent puff; 0 when nothing is logged.
pub fn streak_days<Tz: TimeZone>(events: &[PuffEvent], now: &DateTime<Tz>) -> i64 {
    let now = now.with_timezone(&Utc);
    last_puff(events)
        .map(|last| (now - last).num_days().max(0))
        .unwrap_or(0)
}

/// Average puffs per active day over the last `window_days` days.
///
/// Days without puffs do not count toward the divisor.
pub fn average_per_active_day<Tz: TimeZone>(
    events: &[PuffEvent],
    now: &DateTime<Tz>,
    window_days: i64,
) -> f64 {
    let tz = now.timezone();
    let cutoff = now.with_timezone(&Utc) - chrono::Duration::days(window_days);
    let recent: Vec<PuffEvent> = events
        .iter()
        .filter(|e| e.timestamp >= cutoff)
        .cloned()
        .collect();
    let active_days = daily_counts(&recent, &tz).len().max(1);
    recent.len() as f64 / active_days as f64
}

/// Withdrawal stage by time since the last puff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WithdrawalStage {
    /// Nothing logged yet.
    NoData,
    /// Less than 4 hours since the last puff.
    StillPuffing,
    /// 4 to 12 hours.
    Early,
    /// 13 to 24 hours.
    Moderate,
    /// 25 to 72 hours.
    Peak,
    /// More than 72 hours.
    Recovery,
}

impl WithdrawalStage {
    /// Stage for the given hours since the last puff.
    pub fn from_hours(hours: Option<i64>) -> Self {
        match hours {
            None => Self::NoData,
            Some(h) if h < 4 => Self::StillPuffing,
            Some(4..=12) => Self::Early,
            Some(13..=24) => Self::Moderate,
            Some(25..=72) => Self::Peak,
            Some(_) => Self::Recovery,
        }
    }

    /// Short title.
    pub fn title(&self) -> &'static str {
        match self {
            Self::NoData => "No data",
            Self::StillPuffing => "You are still puffing",
            Self::Early => "Early Withdrawal",
            Self::Moderate => "Moderate Withdrawal",
            Self::Peak => "Peak Withdrawal",
            Self::Recovery => "Recovery in Progress",
        }
    }

    /// One-line advice for the stage.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::NoData => "Start tracking your puffs to see your withdrawal status.",
            Self::StillPuffing => "Try to extend the time between puffs.",
            Self::Early => {
                "You might experience mild cravings. Stay hydrated and try deep breathing."
            }
            Self::Moderate => {
                "Cravings may intensify. Stay busy and remember why you're quitting."
            }
            Self::Peak => "This is the toughest part. Your body is healing. Stay strong!",
            Self::Recovery => "Great job! The worst is over. Keep going!",
        }
    }
}

/// Compact summary shared with home-screen widgets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetSnapshot {
    /// Hours since the last puff (0 when nothing is logged).
    pub hours_since_last_puff: i64,
    /// Puffs logged today.
    pub puffs_today: usize,
    /// Configured daily limit.
    pub daily_limit: u32,
    /// Days since the last puff.
    pub streak: i64,
}

impl WidgetSnapshot {
    /// Compute the snapshot at `now`.
    pub fn compute<Tz: TimeZone>(events: &[PuffEvent], now: &DateTime<Tz>, daily_limit: u32) -> Self {
        Self {
            hours_since_last_puff: hours_since_last_puff(events, now).unwrap_or(0),
            puffs_today: puffs_today(events, now),
            daily_limit,
            streak: streak_days(events, now),
        }
    }
}

/// Spending settings behind the savings estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendingSettings {
    /// Price of one vape (or pack).
    pub vape_cost: f64,
    /// Puffs one vape lasts.
    pub puffs_per_vape: u32,
    /// What the user spent per month before tracking.
    pub monthly_spending: f64,
}

impl Default for SpendingSettings {
    fn default() -> Self {
        Self {
            vape_cost: 10.0,
            puffs_per_vape: 600,
            monthly_spending: 50.0,
        }
    }
}

/// Money saved per month and how long one vape lasts at the current pace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Financials {
    /// Estimated monthly saving versus `monthly_spending`; never negative.
    pub money_saved: f64,
    /// Days one vape lasts at the average daily pace.
    pub vape_duration_days: f64,
}

impl Financials {
    /// Estimate from the average puffs per active day over `window_days`.
    pub fn compute<Tz: TimeZone>(
        events: &[PuffEvent],
        now: &DateTime<Tz>,
        window_days: i64,
        settings: &SpendingSettings,
    ) -> Self {
        let avg = average_per_active_day(events, now, window_days);
        let puffs_per_vape = f64::from(settings.puffs_per_vape.max(1));
        let daily_spend = settings.monthly_spending / 30.0;
        let new_daily_spend = avg / puffs_per_vape * settings.vape_cost;
        Self {
            money_saved: (daily_spend - new_daily_spend).max(0.0) * 30.0,
            vape_duration_days: puffs_per_vape / avg.max(1.0),
        }
    }
}

/// A puff-free streak worth celebrating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Milestone {
    /// Streak length needed, in days.
    pub days: i64,
    /// Short title.
    pub title: &'static str,
    /// One-line description.
    pub description: &'static str,
}

impl Milestone {
    /// Whether a streak of `streak_days` reaches this milestone.
    pub fn is_achieved(&self, streak_days: i64) -> bool {
        streak_days >= self.days
    }
}

/// Milestones in ascending order.
pub static MILESTONES: [Milestone; 6] = [
    Milestone {
        days: 1,
        title: "24 Hours Free",
        description: "You've made it through the first day!",
    },
    Milestone {
        days: 3,
        title: "3-Day Challenge",
        description: "You've overcome the toughest part!",
    },
    Milestone {
        days: 7,
        title: "One Week Wonder",
        description: "A full week vape-free!",
    },
    Milestone {
        days: 14,
        title: "Fortnight Freedom",
        description: "Two weeks without vaping!",
    },
    Milestone {
        days: 30,
        title: "Monthly Marvel",
        description: "30 days of freedom!",
    },
    Milestone {
        days: 60,
        title: "60-Day Milestone",
        description: "Two months vape-free! You're making incredible progress!",
    },
];

/// Milestones reached by a streak of `streak_days`.
pub fn achieved_milestones(streak_days: i64) -> impl Iterator<Item = &'static Milestone> {
    MILESTONES.iter().filter(move |m| m.is_achieved(streak_days))
}

/// The first milestone not yet reached.
pub fn next_milestone(streak_days: i64) -> Option<&'static Milestone> {
    MILESTONES.iter().find(|m| !m.is_achieved(streak_days))
}

/// This week's pace against the week before.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyComparison {
    /// Puffs in the last 7 days.
    pub this_week: usize,
    /// Puffs in the 7 days before that.
    pub last_week: usize,
    /// Change in average puffs per day; negative means fewer puffs.
    pub trend: f64,
    /// `trend` relative to last week's average, in whole percent. 0 when
    /// last week was empty.
    pub percentage: i64,
}

impl WeeklyComparison {
    /// Compare `[now - 7d, now]` with `[now - 14d, now - 7d)`.
    pub fn compute<Tz: TimeZone>(events: &[PuffEvent], now: &DateTime<Tz>) -> Self {
        let now = now.with_timezone(&Utc);
        let this_start = now - chrono::Duration::days(7);
        let last_start = this_start - chrono::Duration::days(7);

        let this_week = events.iter().filter(|e| e.timestamp >= this_start).count();
        let last_week = events
            .iter()
            .filter(|e| e.timestamp >= last_start && e.timestamp < this_start)
            .count();

        let this_avg = this_week as f64 / 7.0;
        let last_avg = last_week as f64 / 7.0;
        let trend = this_avg - last_avg;
        let percentage = if last_avg > 0.0 {
            (trend / last_avg * 100.0) as i64
        } else {
            0
        };

        Self {
            this_week,
            last_week,
            trend,
            percentage,
        }
    }
}

/// How today's count sits against the daily limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoalStatus {
    /// Below half the limit.
    OnTrack,
    /// At least half.
    Halfway,
    /// At least 80%.
    NearLimit,
    /// At or over the limit.
    OverLimit,
}

impl GoalStatus {
    /// Short title.
    pub fn title(&self) -> &'static str {
        match self {
            Self::OnTrack => "On Track",
            Self::Halfway => "Halfway",
            Self::NearLimit => "Near Limit",
            Self::OverLimit => "Over Limit",
        }
    }
}

/// Today's progress against the daily limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalProgress {
    /// Today's count as a whole percentage of the limit.
    pub percent: u32,
    /// Band the percentage falls in.
    pub status: GoalStatus,
}

impl GoalProgress {
    /// Progress of `today` against `daily_limit`; `None` when no limit is set.
    pub fn compute(today: usize, daily_limit: u32) -> Option<Self> {
        if daily_limit == 0 {
            return None;
        }
        let percent = (today as u64 * 100 / u64::from(daily_limit)).min(u64::from(u32::MAX)) as u32;
        let status = match percent {
            100.. => GoalStatus::OverLimit,
            80..=99 => GoalStatus::NearLimit,
            50..=79 => GoalStatus::Halfway,
            _ => GoalStatus::OnTrack,
        };
        Some(Self { percent, status })
    }
}
