use clap::Parser;
use log::{info, warn};
use std::{path::PathBuf, sync::atomic::Ordering, sync::Arc};

use grader_core::{
    config::GraderConfig,
    error::Result,
    sandbox::IsolateExecutor,
    store::FsStore,
    worker::Worker,
};

#[derive(Parser)]
#[command(
    version = "0.1.0",
    name = "Iron Grader",
    author = "Kanari",
    about = "Grades queued submissions inside isolate boxes."
)]
struct Opts {
    /// grader config (yaml)
    #[arg(short, long)]
    config: Option<String>,
    /// overrides `storeDir` from the config
    #[arg(long)]
    store: Option<PathBuf>,
    /// overrides `isolate` from the config
    #[arg(long)]
    isolate: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let opts = Opts::parse();

    let mut config = match &opts.config {
        Some(path) => GraderConfig::from_file(path)?,
        None => {
            warn!("no config given, using defaults");
            GraderConfig::default()
        }
    };
    if let Some(store) = opts.store {
        config.store_dir = store;
    }
    if let Some(isolate) = opts.isolate {
        config.isolate = Some(isolate);
    }

    let executor = IsolateExecutor::locate(config.isolate.as_deref())?;
    let store = FsStore::open(&config.store_dir)?;
    info!("store at {}", config.store_dir.display());

    let worker = Worker::new(Arc::new(store), Arc::new(executor), Arc::new(config));
    let stop = worker.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, stopping after the current submission");
            stop.store(true, Ordering::SeqCst);
        }
    });

    worker.run().await
}
