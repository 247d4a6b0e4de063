//! Shared pieces of the role subcommands: session id handling, the
//! simulated key distribution, and statistics output.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::ValueEnum;
use mppj_crypto::pke::{keys_from_seed, PublicKeyTuple, SecretKeyTuple};
use mppj_net::StatsSnapshot;
use serde::Serialize;

/// Default helper port.
pub const DEFAULT_PORT: u16 = 40000;

/// Development session id used when none is passed on the command line.
/// Real runs derive one with `new_session_id` and distribute it
/// out-of-band together with the receiver keys.
const DEV_SESSION_ID: &[u8] = b"session-id-12345";

/// Resolves the session id: hex from the command line, or the fixed
/// development id.
pub fn session_id(arg: Option<&str>) -> Result<Vec<u8>> {
    match arg {
        Some(hex_sid) => hex::decode(hex_sid).context("session id is not valid hex"),
        None => Ok(DEV_SESSION_ID.to_vec()),
    }
}

/// Simulates the trusted key distribution channel: every party derives
/// the receiver's tuples from the session id.
pub fn receiver_keys(sid: &[u8]) -> (SecretKeyTuple, PublicKeyTuple) {
    keys_from_seed(sid)
}

/// Network statistics output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatsFormat {
    None,
    Text,
    Json,
}

#[derive(Serialize)]
struct StatsRecord {
    data_sent: u64,
    data_recv: u64,
    time_total_secs: f64,
    time_active_secs: f64,
}

/// Prints transfer counters and durations in the selected format.
pub fn print_stats(
    snapshot: StatsSnapshot,
    total: Duration,
    active: Duration,
    format: StatsFormat,
) -> Result<()> {
    match format {
        StatsFormat::None => {}
        StatsFormat::Text => {
            tracing::info!(
                "stats: {snapshot}, total time: {total:?}, active time: {active:?}"
            );
        }
        StatsFormat::Json => {
            let record = StatsRecord {
                data_sent: snapshot.data_sent,
                data_recv: snapshot.data_recv,
                time_total_secs: total.as_secs_f64(),
                time_active_secs: active.as_secs_f64(),
            };
            tracing::info!("stats: {}", serde_json::to_string(&record)?);
        }
    }
    Ok(())
}
