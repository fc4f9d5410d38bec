use clap::Subcommand;
use serde_json::json;

use super::session::LEDGER_KEY;
use super::{print_json, CmdResult, Context};

#[derive(Subcommand)]
pub enum DataAction {
    /// Delete every recorded session
    Clear,
}

pub async fn run(action: DataAction) -> CmdResult {
    let ctx = Context::open()?;
    match action {
        DataAction::Clear => {
            let deleted = ctx.store.clear().await?;
            ctx.local.kv_delete(LEDGER_KEY).await?;
            tracing::info!(deleted, "session data cleared");
            print_json(&json!({ "deleted": deleted }))?;
        }
    }
    Ok(())
}
