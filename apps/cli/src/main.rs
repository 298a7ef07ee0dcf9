#![deny(warnings)]

//! Headless client: drives a game session against the local save slots.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use lifequest_core::{BattleOutcome, OverlayRequest, QuestCatalog, QuestEffect, Stage};
use lifequest_runtime::{AutoSave, GameConfig, GameSession, SaveStatus, SharedSaves, CONFIG_FILE};
use persistence::{FileStore, SaveKey, SaveManager, SlotStatus};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", built ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Debug, Parser)]
#[command(name = "lifequest", version = VERSION, about = "LifeQuest progression and save tool")]
struct Cli {
    /// Config file; missing means defaults.
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,
    /// Save slot to operate on (1-3).
    #[arg(long, global = true, default_value_t = 1)]
    slot: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start a new game in the slot, replacing what is there.
    New {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, value_parser = parse_stage, default_value = "Elementary")]
        stage: Stage,
    },
    /// Show the player, level progress, locked zones and open quests.
    Status,
    /// Apply a raw effect.
    Effect {
        #[arg(long, default_value_t = 0)]
        xp: u64,
        #[arg(long)]
        quest: Option<String>,
    },
    /// Pick a dialogue choice.
    Choose { quest: String, node: usize, choice: usize },
    /// Complete a quest and collect its reward.
    Complete { quest: String },
    /// Record a battle result.
    Battle {
        #[arg(long)]
        defeat: bool,
        #[arg(long, default_value_t = 0)]
        xp: u64,
        #[arg(long)]
        flag: Option<String>,
    },
    /// List all save slots.
    Slots,
    /// Delete the save in the slot.
    Delete,
    /// List quests in the catalog.
    Catalog {
        #[arg(long, value_parser = parse_stage)]
        stage: Option<Stage>,
    },
}

fn parse_stage(s: &str) -> Result<Stage, String> {
    serde_json::from_value(serde_json::Value::String(s.to_string())).map_err(|_| format!("unknown stage: {s}"))
}

fn load_catalog(cfg: &GameConfig) -> Result<QuestCatalog> {
    match &cfg.catalog_path {
        Some(p) => QuestCatalog::load(p).with_context(|| format!("loading catalog {}", p.display())),
        None => Ok(QuestCatalog::builtin()?),
    }
}

fn lock(saves: &SharedSaves<FileStore>) -> Result<MutexGuard<'_, SaveManager<FileStore>>> {
    saves.lock().map_err(|_| anyhow::anyhow!("save manager lock poisoned"))
}

fn print_overlays(overlays: &[OverlayRequest]) {
    for o in overlays {
        match o {
            OverlayRequest::Dialogue { npc, text, choices, node, .. } => {
                println!("[{npc}] {text} (node {node})");
                for (i, c) in choices.iter().enumerate() {
                    println!("  {i}: {c}");
                }
            }
            OverlayRequest::QuestCompleted { quest, xp, item } => match item {
                Some(item) => println!("Quest complete: {quest} (+{xp} XP, {item})"),
                None => println!("Quest complete: {quest} (+{xp} XP)"),
            },
            OverlayRequest::LevelUp { from, to } => println!("Level up! {from} -> {to}"),
            OverlayRequest::ZoneUnlocked { zone } => println!("Zone unlocked: {zone}"),
            OverlayRequest::ItemAcquired { item } => println!("Got item: {item}"),
            OverlayRequest::SaveFailed { attempt, reason } => eprintln!("Save attempt {attempt} failed: {reason}"),
            OverlayRequest::PersistentSaveUnavailable { reason } => {
                eprintln!("Progress is not being saved: {reason}")
            }
        }
    }
}

fn print_status(session: &GameSession) {
    let p = session.player();
    let progress = session.progress();
    println!("{} <{}> | stage {} | level {}", p.name, p.email, p.stage, p.level);
    println!("XP {} / {} ({} to go)", progress.xp, progress.next_threshold, progress.remaining);
    let locked: Vec<&str> = session.locked_zones().iter().collect();
    println!("Locked zones: {}", if locked.is_empty() { "none".to_string() } else { locked.join(", ") });
    if !p.inventory.is_empty() {
        println!("Inventory: {}", p.inventory.join(", "));
    }
    let open: Vec<&str> = session.available_quests().iter().map(|q| q.id.as_str()).collect();
    println!("Open quests: {}", if open.is_empty() { "none".to_string() } else { open.join(", ") });
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();
    let cfg = GameConfig::load_from(&cli.config);
    let key = SaveKey::slot(cli.slot)?;
    let saves: SharedSaves<FileStore> = Arc::new(Mutex::new(SaveManager::new(FileStore::new(&cfg.save_dir)?)));

    match &cli.command {
        Command::Slots => {
            for status in lock(&saves)?.list_slots() {
                match status {
                    SlotStatus::Empty { slot } => println!("slot {slot}: empty"),
                    SlotStatus::Corrupt { slot, reason } => println!("slot {slot}: corrupt ({reason})"),
                    SlotStatus::Saved(s) => println!(
                        "slot {}: {} level {} (version {}, saved at {})",
                        s.slot, s.name, s.level, s.version, s.timestamp
                    ),
                }
            }
            return Ok(());
        }
        Command::Delete => {
            if lock(&saves)?.delete(&key)? {
                println!("Deleted {key}");
            } else {
                println!("{key} was already empty");
            }
            return Ok(());
        }
        Command::Catalog { stage } => {
            let catalog = load_catalog(&cfg)?;
            for q in catalog.iter().filter(|q| stage.map_or(true, |s| q.stage == s)) {
                println!("{:<16} {:<10} {:<11} {}", q.id, q.stage, q.zone, q.npc);
            }
            return Ok(());
        }
        _ => {}
    }

    let catalog = Arc::new(load_catalog(&cfg)?);
    let curve = cfg.progression.level_curve;
    let mut session = match &cli.command {
        Command::New { name, email, stage } => {
            GameSession::new_game(name.clone(), email.clone(), *stage, catalog, curve)
        }
        _ => GameSession::resume(&*lock(&saves)?, &key, catalog, curve),
    };
    let read_only = matches!(cli.command, Command::Status);
    if cfg.autosave.enabled && !read_only {
        let auto = AutoSave::spawn(Arc::clone(&saves), key.clone(), &cfg.autosave, &cfg.retry);
        session = session.with_autosave(auto);
    }
    info!(%key, "session started");

    match cli.command {
        Command::New { .. } => println!("New game in {key}"),
        Command::Status => print_status(&session),
        Command::Effect { xp, quest } => session.apply_effect(&QuestEffect { xp, quest }),
        Command::Choose { quest, node, choice } => {
            if let Some(next) = session.choose_dialogue(&quest, node, choice)? {
                println!("Continue with: lifequest choose {quest} {next} <choice>");
            }
        }
        Command::Complete { quest } => session.complete_quest(&quest)?,
        Command::Battle { defeat, xp, flag } => {
            let outcome = if defeat {
                BattleOutcome::Defeat
            } else {
                BattleOutcome::Victory { xp, flag }
            };
            session.record_battle(&outcome);
        }
        Command::Slots | Command::Delete | Command::Catalog { .. } => {}
    }
    print_overlays(&session.drain_overlays());

    let (player, status) = session.shutdown().await;
    match status {
        Some(SaveStatus::Unavailable { reason }) => bail!("could not save {key}: {reason}"),
        Some(_) => {}
        None if read_only => {}
        None => {
            lock(&saves)?.save(&key, &player)?;
        }
    }
    Ok(())
}
