//! CLI smoke entry point.
//!
//! # Responsibility
//! - Open a note database, run one sync pass through the no-op bridge and
//!   print note counts.
//! - Keep output deterministic for quick local sanity checks.
//!
//! Usage: `notekeep_cli <db_path> [log_dir]`

use log::{error, info};
use notekeep_core::{
    core_version, init_logging, CoreConfig, NoopSyncBridge, NoteService,
    SqliteNoteRepository, SyncCoordinator,
};
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    println!("notekeep_core version={}", core_version());

    let mut args = std::env::args().skip(1);
    let Some(db_path) = args.next() else {
        eprintln!("usage: notekeep_cli <db_path> [log_dir]");
        return ExitCode::from(2);
    };
    let config = CoreConfig::default();
    if let Some(log_dir) = args.next() {
        if let Err(err) = init_logging(&config.log_level, &log_dir) {
            eprintln!("logging disabled: {err}");
        }
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(&db_path, &config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("event=cli_run module=cli status=error error={message}");
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

async fn run(db_path: &str, config: &CoreConfig) -> Result<(), String> {
    config.validate().map_err(|err| err.to_string())?;

    let repo = SqliteNoteRepository::open(db_path).map_err(|err| err.to_string())?;
    let service = Arc::new(NoteService::new(repo));
    let coordinator = SyncCoordinator::new(Arc::clone(&service), Arc::new(NoopSyncBridge));

    let report = coordinator
        .run(config.sync.deadline())
        .await
        .map_err(|err| err.to_string())?;
    info!(
        "event=cli_run module=cli status=ok bridge={} pushed={}",
        coordinator.bridge_id(),
        report.pushed
    );

    let notes = service.list_notes().map_err(|err| err.to_string())?;
    let items: usize = notes.iter().map(|note| note.items.len()).sum();
    let completed: usize = notes
        .iter()
        .flat_map(|note| note.items.iter())
        .filter(|item| item.is_completed)
        .count();
    println!("notes={} items={} completed={}", notes.len(), items, completed);
    println!(
        "sync bridge={} pulled={} adopted={} pushed={}",
        coordinator.bridge_id(),
        report.pulled,
        report.adopted,
        report.pushed
    );
    Ok(())
}
