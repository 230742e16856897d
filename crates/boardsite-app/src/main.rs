//! Headless Boardsite client.
//!
//! Joins (or creates) a session, keeps the board in sync and mirrors it into
//! local storage until the connection closes.

use boardsite_core::storage::OFFLINE_BOARD_KEY;
use boardsite_core::{
    AutoSaveManager, ClientConfig, FileStorage, NotificationLevel, User, Whiteboard,
};
use clap::{ArgAction, Parser};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(name = "boardsite")]
#[command(version, about = "Headless client for Boardsite whiteboard sessions")]
struct Cli {
    /// Session to join
    #[arg(long, short = 's', value_name = "ID", conflicts_with = "create")]
    session: Option<String>,

    /// Create a new session from the locally saved board
    #[arg(long, short = 'c', action = ArgAction::SetTrue)]
    create: bool,

    /// Server base URL, overrides the config file
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// Display name in the session
    #[arg(long, default_value = "anonymous")]
    alias: String,

    /// User color as a hex string
    #[arg(long, default_value = "#1e88e5")]
    color: String,

    /// Config file (defaults to the platform config directory)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory for saved boards
    #[arg(long, value_name = "DIR")]
    storage_dir: Option<PathBuf>,

    /// Seconds between auto-saves
    #[arg(long, value_name = "SECS")]
    save_interval: Option<u64>,
}

fn load_config(cli: &Cli) -> Result<ClientConfig, Box<dyn Error>> {
    let mut config = match cli.config.clone().or_else(ClientConfig::default_path) {
        Some(path) => {
            log::debug!("Loading config from {}", path.display());
            ClientConfig::load_or_default(&path)?
        }
        None => ClientConfig::default(),
    };
    if let Some(url) = &cli.api_url {
        config.api_url = url.clone();
    }
    Ok(config)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let storage = match &cli.storage_dir {
        Some(dir) => FileStorage::new(dir.clone())?,
        None => FileStorage::default_location()?,
    };
    log::info!("Saving boards to {}", storage.base_path().display());

    let mut autosave = AutoSaveManager::new(Arc::new(storage), config.stroke_hitbox);
    if let Some(secs) = cli.save_interval {
        autosave.set_interval(Duration::from_secs(secs));
    }

    let user = User {
        id: None,
        alias: cli.alias.clone(),
        color: cli.color.clone(),
    };
    let mut whiteboard = match pollster::block_on(autosave.load_last()) {
        Some(board) => {
            log::info!("Restored offline board with {} pages", board.page_count());
            Whiteboard::with_board(config, user, board)
        }
        None => Whiteboard::new(config, user),
    };

    if cli.create {
        let sid = whiteboard.create_session(true)?;
        println!("Created session {}", sid);
    } else if let Some(sid) = &cli.session {
        whiteboard.connect(sid, true)?;
    } else {
        println!("boardsite: nothing to do");
        println!();
        println!("Usage:");
        println!("  boardsite --session <ID>   Join a session and mirror it locally");
        println!("  boardsite --create         Share the offline board as a new session");
        println!("  boardsite --help           Show help");
        return Ok(());
    }

    if let Some(sid) = whiteboard.session().and_then(|s| s.id()) {
        autosave.set_key(sid);
    }

    while whiteboard.is_online() {
        whiteboard.poll();
        for note in whiteboard.take_notifications() {
            match note.level {
                NotificationLevel::Info => println!("{}", note.message),
                NotificationLevel::Warning | NotificationLevel::Error => eprintln!("{}", note.message),
            }
        }

        autosave.note_revision(whiteboard.revision());
        if let Err(e) = pollster::block_on(autosave.maybe_save(whiteboard.board())) {
            log::error!("Auto-save failed: {}", e);
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    for note in whiteboard.take_notifications() {
        eprintln!("{}", note.message);
    }

    // Keep the last session state as the offline board.
    pollster::block_on(autosave.save(whiteboard.board()))?;
    if autosave.key() != OFFLINE_BOARD_KEY {
        autosave.set_key(OFFLINE_BOARD_KEY);
        pollster::block_on(autosave.save(whiteboard.board()))?;
    }
    log::info!("Session closed");
    Ok(())
}
