mod terminal;
mod watch;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::CommandFactory;
use tracing::warn;

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::credentials::{CredentialStore, Prompter};
use crate::db::Database;
use crate::dom::{Document, load_snapshot};
use crate::engine::{Engine, FetchMode, Services};
use crate::launcher::{Launcher, SystemLauncher, player_uri};
use crate::notice::Notifier;
use crate::paths::{config_file_path, database_file_path};
use crate::playback_info::{HttpPlaybackInfoClient, PlaybackInfoClient, REQUEST_TIMEOUT};
use crate::resolver;

use self::terminal::{TerminalNotifier, TerminalPrompter};

pub fn run(cli: Cli) -> Result<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => config_file_path()?,
    };
    let config = Config::load(&config_path)?;

    match cli.command {
        Some(Command::Setup { origin }) => run_setup(origin),
        Some(Command::Map { path }) => run_map(&config, &path),
        Some(Command::Resolve { item_id, play }) => run_resolve(&config, &item_id, play),
        Some(Command::Play { path, remote }) => run_play(&config, &path, remote),
        Some(Command::Scan { snapshot }) => run_scan(&config, &snapshot),
        Some(Command::Watch {
            snapshot,
            events,
            origin,
        }) => run_watch(&config, &snapshot, &events, origin),
        None => {
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

fn run_setup(origin: Option<String>) -> Result<()> {
    let db_path = database_file_path()?;
    let mut credentials = open_credentials(origin)?;
    if !credentials.ensure(true, &mut TerminalPrompter::stdin(), &mut TerminalNotifier) {
        bail!("setup cancelled; stored credentials left as they were");
    }
    println!("Credentials saved to {}", db_path.display());
    Ok(())
}

fn run_map(config: &Config, server_path: &str) -> Result<()> {
    let Some(local) = config.local_path_for(server_path) else {
        bail!("no path mapping matches {server_path}");
    };
    println!("{local}");
    println!("{}", player_uri(&config.uri_scheme, &local));
    Ok(())
}

fn run_resolve(config: &Config, item_id: &str, play: bool) -> Result<()> {
    let mut credentials = open_credentials(None)?;
    let mut notifier = TerminalNotifier;
    let Some(request) = resolver::remote_request(
        item_id,
        &mut credentials,
        &mut TerminalPrompter::stdin(),
        &mut notifier,
    ) else {
        bail!("API credentials are required to look up {item_id}");
    };

    let client = HttpPlaybackInfoClient::new(config.client.clone());
    let server_path = match client.media_path(&request) {
        Ok(Some(path)) => path,
        Ok(None) => bail!("item {item_id} has no media source with a path"),
        Err(err) => {
            if let Some(notice) = err.notice() {
                notifier.notify(notice);
            }
            return Err(err).with_context(|| format!("failed to resolve item {item_id}"));
        }
    };
    println!("{server_path}");

    if play {
        run_play(config, &server_path, true)?;
    }
    Ok(())
}

fn run_play(config: &Config, path: &str, remote: bool) -> Result<()> {
    let local = if remote {
        config
            .local_path_for(path)
            .with_context(|| format!("no path mapping matches {path}"))?
    } else {
        path.to_string()
    };
    SystemLauncher::from_env().open(&player_uri(&config.uri_scheme, &local))?;
    println!("Sent to player: {local}");
    Ok(())
}

fn run_scan(config: &Config, snapshot: &Path) -> Result<()> {
    let doc = load_snapshot(snapshot)?;
    let mut engine = build_engine(config, doc, Box::new(TerminalPrompter::stdin()), None)?;
    let root = engine.document().root();
    engine.watch(root);
    engine.run_frame();

    let patience = REQUEST_TIMEOUT + Duration::from_secs(1);
    while engine.has_pending() {
        let next = engine.completions().recv_timeout(patience);
        match next {
            Ok(completion) => engine.complete(completion, Instant::now()),
            Err(err) => {
                warn!("gave up waiting for PlaybackInfo lookups: {err}");
                break;
            }
        }
        engine.flush_mutations();
    }

    print_report(&engine);
    Ok(())
}

fn run_watch(config: &Config, snapshot: &Path, events: &str, origin: Option<String>) -> Result<()> {
    let doc = load_snapshot(snapshot)?;
    // Events on stdin leave the terminal itself for credential prompts.
    let prompter: Box<dyn Prompter> = if events == "-" {
        Box::new(TerminalPrompter::controlling_terminal())
    } else {
        Box::new(TerminalPrompter::stdin())
    };
    let mut engine = build_engine(config, doc, prompter, origin)?;
    if !engine.acquire_credentials() {
        warn!("continuing without API credentials; items lacking data-path cannot be resolved");
    }
    let host = watch::spawn_reader(watch::open_events(events)?)?;

    let root = engine.document().root();
    engine.watch(root);
    watch::run_loop(&mut engine, host);

    print_report(&engine);
    Ok(())
}

fn print_report(engine: &Engine) {
    let report = engine.report();
    println!(
        "Hijacked {} play button(s), added {} detail button(s).",
        report.hijacked, report.injected
    );
}

fn build_engine(
    config: &Config,
    doc: Document,
    prompter: Box<dyn Prompter>,
    origin: Option<String>,
) -> Result<Engine> {
    let credentials = open_credentials(origin)?;
    let client: Arc<dyn PlaybackInfoClient> =
        Arc::new(HttpPlaybackInfoClient::new(config.client.clone()));
    let services = Services {
        prompter,
        notifier: Box::new(TerminalNotifier),
        launcher: Box::new(SystemLauncher::from_env()),
    };
    Ok(Engine::new(
        doc,
        config.clone(),
        credentials,
        client,
        services,
        FetchMode::Worker,
    ))
}

fn open_credentials(origin: Option<String>) -> Result<CredentialStore> {
    let db = open_db()?;
    Ok(CredentialStore::load(Box::new(db), origin))
}

fn open_db() -> Result<Database> {
    let db_path = database_file_path()?;
    let db = Database::open(&db_path)?;
    db.migrate()?;
    Ok(db)
}
