//! mppj command-line binary
//!
//! One subcommand per role, plus an in-process demo runner:
//!
//! ```bash
//! mppj helper --id h --sources ds1,ds2 --n-rows 1000
//! mppj source --id ds1 --input table1.csv
//! mppj source --id ds2 --input table2.csv
//! mppj receiver --sources ds1,ds2
//! mppj local --n-sources 3 --n-rows 100 --join-size 10
//! ```

mod common;
mod table_io;

use std::collections::HashMap;
use std::net::TcpListener;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::bounded;
use mppj_core::table::{gen_test_tables, plain_intersect};
use mppj_core::{DataSource, Helper, Receiver, SourceId};
use mppj_crypto::new_session_id;
use mppj_net::{pull_rows, push_rows, run_helper, NetStats};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use common::{print_stats, receiver_keys, session_id, StatsFormat, DEFAULT_PORT};

#[derive(Parser)]
#[command(name = "mppj")]
#[command(version)]
#[command(about = "Multi-party private join between data sources, a helper, and a receiver")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prepare a table and push it to the helper
    Source {
        /// Source id, must match the helper's configured list
        #[arg(short, long)]
        id: String,

        /// Helper address
        #[arg(long, default_value_t = format!("127.0.0.1:{DEFAULT_PORT}"))]
        helper_addr: String,

        /// Input CSV file, or `-` for stdin
        #[arg(long, default_value = "-")]
        input: String,

        /// Worker threads (0 = all cores)
        #[arg(long, default_value_t = 0)]
        workers: usize,

        /// Session id as hex (development default when omitted)
        #[arg(long)]
        session: Option<String>,

        /// Network statistics format
        #[arg(long, value_enum, default_value = "json")]
        stats: StatsFormat,
    },

    /// Run the helper rendezvous for one session
    Helper {
        /// Helper id, informational
        #[arg(short, long)]
        id: String,

        /// Bind address
        #[arg(long, default_value_t = format!("0.0.0.0:{DEFAULT_PORT}"))]
        bind: String,

        /// Comma-separated source ids; positions assign table indices
        #[arg(long, value_delimiter = ',', required = true)]
        sources: Vec<String>,

        /// Rows each source will push
        #[arg(long)]
        n_rows: usize,

        /// Session id as hex (development default when omitted)
        #[arg(long)]
        session: Option<String>,

        /// Network statistics format
        #[arg(long, value_enum, default_value = "json")]
        stats: StatsFormat,
    },

    /// Pull the converted table, join it, and write the result
    Receiver {
        /// Helper address
        #[arg(long, default_value_t = format!("127.0.0.1:{DEFAULT_PORT}"))]
        helper_addr: String,

        /// Comma-separated source ids, same order as the helper's
        #[arg(long, value_delimiter = ',', required = true)]
        sources: Vec<String>,

        /// Output CSV file, or `-` for stdout
        #[arg(long, default_value = "-")]
        output: String,

        /// Session id as hex (development default when omitted)
        #[arg(long)]
        session: Option<String>,

        /// Network statistics format
        #[arg(long, value_enum, default_value = "json")]
        stats: StatsFormat,
    },

    /// In-process end-to-end run over generated test tables
    Local {
        /// Number of data sources
        #[arg(long, default_value_t = 3)]
        n_sources: usize,

        /// Rows per source
        #[arg(long, default_value_t = 100)]
        n_rows: usize,

        /// Size of the shared intersection
        #[arg(long, default_value_t = 10)]
        join_size: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match Cli::parse().command {
        Commands::Source {
            id,
            helper_addr,
            input,
            workers,
            session,
            stats,
        } => run_source(&id, &helper_addr, &input, workers, session.as_deref(), stats),
        Commands::Helper {
            id,
            bind,
            sources,
            n_rows,
            session,
            stats,
        } => run_helper_role(&id, &bind, sources, n_rows, session.as_deref(), stats),
        Commands::Receiver {
            helper_addr,
            sources,
            output,
            session,
            stats,
        } => run_receiver(&helper_addr, sources, &output, session.as_deref(), stats),
        Commands::Local {
            n_sources,
            n_rows,
            join_size,
        } => run_local(n_sources, n_rows, join_size),
    }
}

fn run_source(
    id: &str,
    helper_addr: &str,
    input: &str,
    workers: usize,
    session: Option<&str>,
    stats_format: StatsFormat,
) -> Result<()> {
    if id.is_empty() {
        bail!("a source id is required");
    }
    let sid = session_id(session)?;
    let table = table_io::read_table(input)?;
    tracing::info!(source = id, rows = table.len(), "prepared input table");

    let (_, rpk) = receiver_keys(&sid);
    let ds = DataSource::new(sid, rpk);
    let stats = NetStats::new();

    let start = Instant::now();
    let rows = ds.prepare_stream(&table, workers)?;
    let start_active = Instant::now();
    let pushed = push_rows(helper_addr, id, rows, &stats)?;
    if pushed != table.len() {
        bail!("pushed {pushed} rows, expected {}", table.len());
    }

    print_stats(
        stats.snapshot(),
        start.elapsed(),
        start_active.elapsed(),
        stats_format,
    )
}

fn run_helper_role(
    id: &str,
    bind: &str,
    sources: Vec<SourceId>,
    n_rows: usize,
    session: Option<&str>,
    stats_format: StatsFormat,
) -> Result<()> {
    if id.is_empty() {
        bail!("a helper id is required");
    }
    if sources.len() < 2 {
        bail!("at least two source ids must be provided");
    }
    if sources.len() > u8::MAX as usize + 1 {
        bail!("at most {} sources are supported", u8::MAX as usize + 1);
    }
    if n_rows == 0 {
        bail!("the number of rows per source must be positive");
    }

    let sid = session_id(session)?;
    let (_, rpk) = receiver_keys(&sid);
    let helper = Helper::new(sid, &sources, n_rows);

    let listener =
        TcpListener::bind(bind).with_context(|| format!("binding helper to {bind}"))?;
    tracing::info!(helper = id, addr = %listener.local_addr()?, "helper listening");

    let stats = NetStats::new();
    let start = Instant::now();
    run_helper(helper, rpk, listener, stats.clone())?;

    print_stats(stats.snapshot(), start.elapsed(), start.elapsed(), stats_format)
}

fn run_receiver(
    helper_addr: &str,
    sources: Vec<SourceId>,
    output: &str,
    session: Option<&str>,
    stats_format: StatsFormat,
) -> Result<()> {
    if sources.len() < 2 {
        bail!("at least two source ids must be provided");
    }
    let sid = session_id(session)?;
    let (rsk, rpk) = receiver_keys(&sid);
    let receiver = Receiver::with_keys(sid, sources, rsk, rpk);

    let stats = NetStats::new();
    let start = Instant::now();

    let (row_tx, row_rx) = bounded(1024);
    let puller = {
        let addr = helper_addr.to_string();
        let stats = stats.clone();
        std::thread::spawn(move || pull_rows(&addr, row_tx, &stats))
    };
    let start_active = Instant::now();

    let joined = receiver.join_stream(row_rx)?;
    puller
        .join()
        .map_err(|_| anyhow::anyhow!("row puller panicked"))??;

    tracing::info!(rows = joined.len(), "join complete");
    print_stats(
        stats.snapshot(),
        start.elapsed(),
        start_active.elapsed(),
        stats_format,
    )?;
    table_io::write_join(&joined, output)
}

fn run_local(n_sources: usize, n_rows: usize, join_size: usize) -> Result<()> {
    if n_sources < 2 {
        bail!("at least two sources are required");
    }
    if join_size > n_rows {
        bail!("the intersection cannot exceed the table size");
    }

    let source_ids: Vec<SourceId> = (1..=n_sources).map(|i| format!("ds{i}")).collect();
    let sid = new_session_id(n_sources, "helper", "receiver", &source_ids)?;
    tracing::info!(sid = %hex::encode(sid), "derived session id");

    let receiver = Receiver::new(sid.as_slice(), source_ids.clone());
    let rpk = *receiver.public_keys();
    let ds = DataSource::new(sid.as_slice(), rpk);
    let helper = Helper::new(sid.as_slice(), &source_ids, n_rows);

    let tables = gen_test_tables(&source_ids, n_rows, join_size);

    let start = Instant::now();
    let mut enc_tables = HashMap::new();
    for (source_id, table) in &tables {
        enc_tables.insert(source_id.clone(), ds.prepare(table)?);
    }
    let converted = helper.convert(&rpk, &enc_tables)?;
    let joined = receiver.join(converted)?;
    tracing::info!(elapsed = ?start.elapsed(), rows = joined.len(), "protocol run complete");

    let oracle = plain_intersect(&tables, &source_ids)?;
    if !joined.same_contents(&oracle) {
        bail!("join result does not match the plaintext intersection");
    }
    tracing::info!(rows = oracle.len(), "result matches the plaintext join");

    table_io::write_join(&joined, "-")
}
