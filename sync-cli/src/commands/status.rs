//! Show puff and sync status.

use anyhow::{Context, Result};
use chrono::Local;
use pufftrack_sync_client::{CredentialStore, PuffStats};
use pufftrack_sync_core::WithdrawalStage;
use std::path::Path;

use super::open_ledger;
use crate::config::{self, CliConfig};

/// Run the status command.
pub async fn run(data_dir: &Path, config: &CliConfig) -> Result<()> {
    let ledger = open_ledger(data_dir, config).await?;
    let events = ledger.events().await;
    let now = Local::now();
    let stats = PuffStats::compute(&events, &now, &config.to_sync_config());

    println!("=== pufftrack status ===");
    println!();

    println!("Puffs:");
    println!("  Stored:     {}", events.len());
    match stats.goal {
        Some(goal) => println!(
            "  Today:      {} / {} ({}%, {})",
            stats.today,
            config.daily_limit,
            goal.percent,
            goal.status.title()
        ),
        None => println!("  Today:      {}", stats.today),
    }
    println!("  Avg/day:    {:.1}", stats.average_per_day);
    println!(
        "  This week:  {} (last week {}, {:+}%)",
        stats.weekly.this_week, stats.weekly.last_week, stats.weekly.percentage
    );
    match stats.hours_since_last_puff {
        Some(hours) => println!("  Last puff:  {hours} hours ago"),
        None => println!("  Last puff:  never"),
    }
    println!("  Streak:     {} days", stats.streak_days);
    println!("  Stage:      {}", stage_label(stats.stage));

    println!();

    println!("Progress:");
    println!("  Saved:      {:.2}/month", stats.financials.money_saved);
    println!("  Vape lasts: {:.1} days", stats.financials.vape_duration_days);
    println!("  Milestones: {} reached", stats.milestones_achieved);
    if let Some(next) = stats.next_milestone {
        println!("  Next:       {} ({} days)", next.title, next.days);
    }

    println!();

    let signed_in = config::credential_store(data_dir)
        .load()
        .await
        .context("Failed to read credential")?
        .is_some();

    println!("Sync:");
    println!("  Server:     {}", config.server_url);
    println!("  Pending:    {}", stats.unsynced);
    if signed_in {
        println!("  Session:    signed in");
    } else {
        println!("  Session:    NOT SIGNED IN");
        println!();
        println!("Run 'pufftrack login --token <token>' to sign in.");
    }

    Ok(())
}

fn stage_label(stage: WithdrawalStage) -> &'static str {
    match stage {
        WithdrawalStage::NoData => "no data",
        WithdrawalStage::StillPuffing => "still puffing",
        WithdrawalStage::Early => "early",
        WithdrawalStage::Moderate => "moderate",
        WithdrawalStage::Peak => "peak",
        WithdrawalStage::Recovery => "recovery",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{login, puff};
    use tempfile::tempdir;

    #[tokio::test]
    async fn status_on_empty_data_dir() {
        let dir = tempdir().unwrap();

        let result = run(dir.path(), &CliConfig::default()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn status_with_puffs_and_session() {
        let dir = tempdir().unwrap();
        let config = CliConfig {
            daily_limit: 20,
            ..CliConfig::default()
        };

        puff::run(dir.path(), &config, None, None).await.unwrap();
        login::run(dir.path(), "tok").await.unwrap();

        let result = run(dir.path(), &config).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn status_without_limit_or_spending() {
        let dir = tempdir().unwrap();
        let config = CliConfig {
            daily_limit: 0,
            puffs_per_vape: 0,
            ..CliConfig::default()
        };
        puff::run(dir.path(), &config, None, None).await.unwrap();

        let result = run(dir.path(), &config).await;
        assert!(result.is_ok());
    }

    #[test]
    fn every_stage_has_a_label() {
        assert_eq!(stage_label(WithdrawalStage::Peak), "peak");
        assert_eq!(stage_label(WithdrawalStage::NoData), "no data");
    }
}
