//! Query the flights sample table from three independent sessions.
//!
//! Each task subscribes its own session; all three share one transport, which
//! is opened by the first subscriber and closed after the last disconnect.
//!
//! Run with: RUST_LOG=mapd_connector=debug cargo run --example flights
//!
//! Optional first argument: a `mapd://` URL, e.g.
//! `mapd://mapd:@localhost:9091/mapd?timeout_ms=5000`

use mapd_connector::{format_table, Result, SessionFactory, SessionSource};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const QUERIES: [&str; 3] = [
    "SELECT count(*) as row_count FROM flights_2008_10k",
    "SELECT origin_city FROM flights_2008_10k WHERE dest_city ILIKE 'dallas' LIMIT 5",
    "SELECT origin_lat, origin_lon FROM flights_2008_10k WHERE dest_city ILIKE 'dallas' LIMIT 5",
];

async fn run_query(sessions: SessionSource, sql: &'static str) -> Result<String> {
    sessions
        .with_session(|session| async move {
            let result = session.query(sql).await?;
            format_table(result).await
        })
        .await
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let sessions = match std::env::args().nth(1) {
        Some(url) => SessionFactory::connect_url(&url)?,
        None => SessionFactory::open_tcp("localhost", 9091, false)?.connect(
            "mapd",
            "mapd",
            "",
            Duration::from_secs(5),
        ),
    };

    let tasks: Vec<_> = QUERIES
        .into_iter()
        .map(|sql| tokio::spawn(run_query(sessions.clone(), sql)))
        .collect();

    for task in tasks {
        match task.await {
            Ok(Ok(table)) => println!("{}\n", table),
            Ok(Err(e)) => eprintln!("{}", e),
            Err(e) => eprintln!("query task failed: {}", e),
        }
    }

    let live = sessions.client().registry().live_transports().await;
    tracing::info!(live_transports = live, "done");
    Ok(())
}
