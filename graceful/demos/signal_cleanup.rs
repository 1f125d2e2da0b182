//! Waits for SIGINT or SIGTERM, lets a cleanup task finish, then exits.
//!
//! Run with `cargo run --example signal_cleanup` and press Ctrl-C.

use graceful::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let manager = Manager::with_config(ShutdownConfig::new().with_timeout_seconds(3.0));
    manager.watch_signal([Signal::Interrupt, Signal::Terminate])?;
    let listener = manager.notifier("foo")?;
    manager.register_exit_action(|| {
        println!("exit action invoked");
    })?;
    manager.start()?;

    tokio::spawn(listener.cleanup_on_shutdown(|trigger| async move {
        // Resource cleanup goes here.
        tracing::info!(%trigger, "cleaning process is finished");
    }));

    println!("running; send SIGINT or SIGTERM to shut down");
    manager.wait().await;

    let report = manager.shutdown().await;
    println!("{}", serde_json::to_string_pretty(&report.to_json())?);
    Ok(())
}
