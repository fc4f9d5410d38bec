use std::sync::Arc;

use clap::Subcommand;
use focusapp_core::{ElapsedSampler, LedgerCheckpoint, SessionController};

use super::{print_json, CmdResult, Context};

pub const LEDGER_KEY: &str = "break_ledger";

/// `watch` re-reads the store this often, in ticks, to notice a session
/// ended by another invocation.
const STORE_CHECK_TICKS: u32 = 5;

#[derive(Subcommand)]
pub enum SessionAction {
    /// Start a work session (or a break session with --break)
    Start {
        /// Record a break session instead of a work session
        #[arg(long = "break")]
        is_break: bool,
    },
    /// Toggle a break inside the running work session
    Break,
    /// End the active session
    End,
    /// Print the current timer state as JSON
    Status,
    /// Print elapsed time once per tick until the session ends
    Watch {
        /// Stop after this many ticks
        #[arg(long)]
        ticks: Option<u32>,
    },
    /// List recent sessions, newest first
    History {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

/// Break accounting carried over from the previous invocation.
async fn load_ledger(ctx: &Context) -> Option<LedgerCheckpoint> {
    match ctx.local.kv_get(LEDGER_KEY).await {
        Ok(Some(json)) => serde_json::from_str(&json)
            .map_err(|e| tracing::warn!(error = %e, "discarding unreadable break ledger"))
            .ok(),
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(error = %e, "failed to read break ledger");
            None
        }
    }
}

async fn save_ledger(ctx: &Context, controller: &SessionController) -> CmdResult {
    match controller.checkpoint() {
        Some(checkpoint) => {
            ctx.local
                .kv_set(LEDGER_KEY, &serde_json::to_string(&checkpoint)?)
                .await?;
        }
        None => ctx.local.kv_delete(LEDGER_KEY).await?,
    }
    Ok(())
}

/// Controller that has adopted the store's open session, if any.
async fn controller(ctx: &Context) -> focusapp_core::Result<SessionController> {
    let controller = SessionController::new(Arc::clone(&ctx.store), ctx.clock.clone())
        .with_policy(ctx.config.session.break_policy);
    controller.recover(load_ledger(ctx).await).await?;
    Ok(controller)
}

pub async fn run(action: SessionAction) -> CmdResult {
    let ctx = Context::open()?;

    match action {
        SessionAction::Start { is_break } => {
            let controller = controller(&ctx).await?;
            let session = controller.start(is_break).await?;
            save_ledger(&ctx, &controller).await?;
            print_json(&session)?;
        }
        SessionAction::Break => {
            let controller = controller(&ctx).await?;
            controller.toggle_break().await?;
            save_ledger(&ctx, &controller).await?;
            print_json(&controller.snapshot())?;
        }
        SessionAction::End => {
            let controller = controller(&ctx).await?;
            let session = controller.end().await?;
            save_ledger(&ctx, &controller).await?;
            print_json(&session)?;
        }
        SessionAction::Status => {
            let controller = controller(&ctx).await?;
            print_json(&controller.snapshot())?;
        }
        SessionAction::Watch { ticks } => {
            let controller = Arc::new(controller(&ctx).await?);
            if !controller.state().is_active() {
                return print_json(&controller.snapshot());
            }
            let sampler = ElapsedSampler::spawn(controller.clone(), ctx.config.tick_interval());
            let mut rx = sampler.subscribe();
            let mut seen = 0u32;
            while ticks.map_or(true, |limit| seen < limit) {
                if rx.changed().await.is_err() {
                    break;
                }
                let snapshot = rx.borrow_and_update().clone();
                println!("{}", serde_json::to_string(&snapshot)?);
                seen += 1;
                if !snapshot.state.is_active() {
                    break;
                }
                if seen % STORE_CHECK_TICKS == 0 && !controller.refresh().await?.is_active() {
                    tracing::info!("session ended elsewhere, stopping watch");
                    println!("{}", serde_json::to_string(&controller.snapshot())?);
                    break;
                }
            }
            sampler.stop();
        }
        SessionAction::History { limit } => {
            let sessions = ctx.store.list_recent(limit).await?;
            print_json(&sessions)?;
        }
    }
    Ok(())
}
