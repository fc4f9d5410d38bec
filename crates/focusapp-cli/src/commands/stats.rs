use chrono::{DateTime, NaiveDate, Utc};
use clap::Subcommand;
use focusapp_core::StatsAggregator;
use serde_json::json;

use super::{print_json, CmdResult, Context};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Seconds per day for the week containing the date
    Weekly {
        /// Reference day (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Include days without sessions as zero
        #[arg(long)]
        filled: bool,
    },
    /// Seconds per hour of the day
    Hourly {
        /// Reference day (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Include all 24 hours
        #[arg(long)]
        filled: bool,
    },
}

fn reference(ctx: &Context, date: Option<NaiveDate>) -> DateTime<Utc> {
    match date {
        // Noon avoids landing on the neighbouring day around DST shifts.
        Some(date) => ctx.config.calendar().midnight(date) + chrono::Duration::hours(12),
        None => Utc::now(),
    }
}

pub async fn run(action: StatsAction) -> CmdResult {
    let ctx = Context::open()?;
    let stats = StatsAggregator::new(ctx.store.clone(), ctx.clock.clone());

    match action {
        StatsAction::Weekly { date, filled } => {
            let reference = reference(&ctx, date);
            let totals = stats.weekly_stats(reference).await?;
            if filled {
                let days: Vec<_> = totals
                    .fill_week(stats.week_start_date(reference))
                    .into_iter()
                    .map(|(day, seconds)| json!({ "day": day, "seconds": seconds }))
                    .collect();
                print_json(&days)?;
            } else {
                print_json(&totals)?;
            }
        }
        StatsAction::Hourly { date, filled } => {
            let totals = stats.hourly_stats(reference(&ctx, date)).await?;
            if filled {
                let hours: Vec<_> = totals
                    .fill_hours()
                    .into_iter()
                    .map(|(hour, seconds)| json!({ "hour": hour, "seconds": seconds }))
                    .collect();
                print_json(&hours)?;
            } else {
                print_json(&totals)?;
            }
        }
    }
    Ok(())
}
