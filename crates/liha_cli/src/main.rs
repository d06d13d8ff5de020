//! CLI smoke entry point.
//!
//! # Responsibility
//! - Exercise the full object path once: storage, sync engine, layout
//!   reconciliation and chat reference.
//! - Keep output deterministic for quick local sanity checks.
//!
//! Usage: `liha [DB_PATH]`. Without a path the database lives in memory.

use liha_core::db::{open_db, open_db_in_memory};
use liha_core::{
    init_logging, CanvasSession, ContentItem, DropEvent, LayoutEntry, LogConfig, MessageChannel,
    ObjectInstance, ObjectRepository, ObjectStoreBackend, QueryKey, Role, SqliteObjectRepository,
    SyncConfig, SyncEngine,
};
use log::warn;
use std::error::Error;

const SAMPLE_OBJECT_ID: &str = "welcome";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let log_config = LogConfig::from_env(std::env::temp_dir().join("liha-logs"))?;
    if let Err(err) = init_logging(&log_config) {
        eprintln!("logging disabled: {err}");
    }

    let conn = match std::env::args().nth(1) {
        Some(path) => open_db(path)?,
        None => open_db_in_memory()?,
    };
    let backend = ObjectStoreBackend::new(conn);
    backend.with_connection(|conn| seed_sample(&SqliteObjectRepository::new(conn)))?;

    let key = QueryKey::from(SAMPLE_OBJECT_ID);
    let engine = SyncEngine::new(backend.clone(), SyncConfig::default());
    let mut changes = engine.subscribe(&key);
    let session = CanvasSession::open(engine, SAMPLE_OBJECT_ID);
    changes.changed().await?;

    let dropped = session.drop_block(&DropEvent::new(0, 12, "text"))?;
    let new_id = dropped
        .object()
        .and_then(|object| object.ordered_items().last().map(|item| item.id.clone()))
        .unwrap_or_default();
    if let Some(ticket) = dropped.into_ticket() {
        println!("drop outcome={:?}", ticket.settled().await);
    }

    // A frame that only moves the new block, then the same frame again.
    let frame = [LayoutEntry::new(new_id.as_str(), 6, 12, 6, 6)];
    for round in 1..=2 {
        let outcome = session.layout_changed(&frame)?;
        println!("layout round={} mutated={}", round, outcome.is_mutated());
        if let Some(ticket) = outcome.into_ticket() {
            ticket.settled().await;
        }
    }

    for error in session.engine().drain_errors() {
        warn!("event=cli_sync module=cli status=error error={}", error);
        eprintln!("sync error: {error}");
    }

    let mut channel = MessageChannel::new();
    let message = channel
        .compose(Role::Reference, "Opened from the canvas")
        .with_reference(session.reference()?);
    channel.send(message)?;
    for message in channel.messages() {
        let title = message
            .reference
            .as_ref()
            .map_or("-", |reference| reference.title.as_str());
        println!(
            "message id={} role={} ref={}",
            message.id,
            message.role.label(),
            title
        );
    }

    for block in session.blocks() {
        let p = block.placement;
        println!("block x={} y={} w={} h={}", p.x, p.y, p.w, p.h);
    }
    session.close();
    println!("liha_core version={}", liha_core::core_version());
    Ok(())
}

fn seed_sample(repo: &impl ObjectRepository) -> Result<(), Box<dyn Error>> {
    if repo.get_object(SAMPLE_OBJECT_ID)?.is_some() {
        return Ok(());
    }
    let mut heading = ContentItem::new("intro", "text", 0, 0);
    heading.content = "# Welcome to Liha".to_string();
    repo.save_object(&ObjectInstance::with_items(SAMPLE_OBJECT_ID, [heading])?)?;
    Ok(())
}
