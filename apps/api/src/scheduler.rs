//! Background scheduler.
//!
//! One tokio task ticks on a fixed interval and runs the periodic work:
//! capturing due deferred payments and sweeping expired vouchers. Every
//! step is idempotent, so a tick that races a crash or a concurrent
//! deployment just re-runs harmlessly.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::services::deferred;
use crate::state::AppState;

pub fn spawn(state: AppState) -> tokio::task::JoinHandle<()> {
    let interval = Duration::from_secs(state.config.scheduler_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(interval_secs = interval.as_secs(), "Scheduler started");
        loop {
            ticker.tick().await;
            tick(&state).await;
        }
    })
}

async fn tick(state: &AppState) {
    let now = Utc::now();

    match deferred::run_due_captures(state, now).await {
        Ok((0, 0)) => {}
        Ok((charged, failed)) => {
            info!(charged, failed, "Deferred capture pass finished");
        }
        Err(err) => warn!(%err, "Deferred capture pass failed"),
    }

    sweep(state, now).await;
}

async fn sweep(state: &AppState, now: chrono::DateTime<Utc>) {
    match state.db.vouchers().expire_due(now).await {
        Ok(0) => {}
        Ok(swept) => debug!(swept, "Expired meal-package vouchers"),
        Err(err) => warn!(%err, "Voucher expiry sweep failed"),
    }
    match state.db.general_vouchers().expire_due(now).await {
        Ok(0) => {}
        Ok(swept) => debug!(swept, "Expired general vouchers"),
        Err(err) => warn!(%err, "General voucher expiry sweep failed"),
    }
    match state.db.platform().expire_due(now).await {
        Ok(0) => {}
        Ok(swept) => debug!(swept, "Expired platform vouchers"),
        Err(err) => warn!(%err, "Platform voucher expiry sweep failed"),
    }
    match state.db.stats().replay_unapplied().await {
        Ok(0) => {}
        Ok(replayed) => debug!(replayed, "Redelivered missed rollup updates"),
        Err(err) => warn!(%err, "Rollup redelivery sweep failed"),
    }
}
