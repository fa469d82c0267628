//! clip_sweep - one-shot remote listing and retention sweep
//!
//! Lists remote recordings older than a cutoff and, unless `--list-only`,
//! deletes them. Useful for operators who want to run retention out of band
//! of the daemon (for example from cron) or inspect what a sweep would do.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use sentry_cam::store::{HttpRemoteStore, HttpStoreConfig, RemoteStore};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Remote object-store endpoint.
    #[arg(long, env = "SENTRYCAM_STORE_URL")]
    store_url: String,
    /// Path to the persisted store credential.
    #[arg(long, default_value = "./token.json", env = "SENTRYCAM_TOKEN_PATH")]
    token_path: PathBuf,
    /// Remote folder recordings live under.
    #[arg(long, default_value = "motion")]
    drive_folder: String,
    /// Age cutoff in seconds; files older than this are swept.
    #[arg(long)]
    older_than_seconds: u64,
    /// Only print what would be deleted.
    #[arg(long)]
    list_only: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut store = HttpRemoteStore::new(HttpStoreConfig {
        base_url: args.store_url,
        token_path: args.token_path,
        folder: args.drive_folder,
    })?;
    store.authenticate()?;

    let cutoff = Duration::from_secs(args.older_than_seconds);
    let files = store.list_older_than(cutoff)?;
    if files.is_empty() {
        log::info!("no remote recordings older than {}s", cutoff.as_secs());
        return Ok(());
    }

    for file in &files {
        println!("{}\t{}s\t{}", file.id, file.age.as_secs(), file.name);
    }
    if args.list_only {
        log::info!("{} file(s) would be deleted (--list-only)", files.len());
        return Ok(());
    }

    let mut deleted = 0usize;
    for file in &files {
        match store.delete(&file.id) {
            Ok(()) => deleted += 1,
            Err(e) => log::warn!("failed to delete {}: {}", file.name, e),
        }
    }
    log::info!("deleted {}/{} remote recording(s)", deleted, files.len());
    Ok(())
}
