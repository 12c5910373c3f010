use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::warn;

use herald_broadcast::{DestinationRegistry, Store};
use herald_core::config::HeraldConfig;
use herald_core::types::Destination;
use herald_telegram::TelegramTransport;
use herald_transport::{TaskHandle, TransportFacade, Worker};

mod broadcast;
mod login;
mod update;

pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const REFRESH_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(
    name = "herald",
    version,
    about = "Broadcast one message to many chat groups, honouring per-group slow mode"
)]
struct Cli {
    /// Path to herald.toml (defaults to ~/.herald/herald.toml).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Verify the transport identity and store it for later runs.
    Login(login::LoginArgs),
    /// Fetch the destination list from the transport and persist it.
    Refresh,
    /// List known destinations with throttle and denylist state.
    List,
    /// Manage the operator denylist.
    Deny {
        #[command(subcommand)]
        action: DenyAction,
    },
    /// Manage stored message templates.
    Template {
        #[command(subcommand)]
        action: TemplateAction,
    },
    /// Run a broadcast until its duration elapses or Ctrl-C stops it.
    Broadcast(broadcast::BroadcastArgs),
    /// Check GitHub for a newer release.
    CheckUpdate,
}

#[derive(Subcommand)]
enum DenyAction {
    Add { id: i64 },
    Remove { id: i64 },
    List,
}

#[derive(Subcommand)]
enum TemplateAction {
    Add { body: String },
    List,
    Remove { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herald=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = HeraldConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        HeraldConfig::default()
    });
    let store = Store::open(&config.storage.db_path)?;

    match cli.command {
        Command::Login(args) => login::run(&config, &store, args).await,
        Command::Refresh => refresh(&config, &store).await,
        Command::List => list(&store),
        Command::Deny { action } => deny(&store, action),
        Command::Template { action } => template(&store, action),
        Command::Broadcast(args) => broadcast::run(&config, &store, args).await,
        Command::CheckUpdate => update::run().await,
    }
}

/// Start the transport worker and hand back its facade.
pub(crate) fn spawn_transport(
    config: &HeraldConfig,
) -> anyhow::Result<TransportFacade<TelegramTransport>> {
    let telegram = config
        .telegram
        .clone()
        .ok_or_else(|| anyhow::anyhow!("no [telegram] section configured"))?;
    let worker = Worker::spawn("telegram-transport", move || {
        TelegramTransport::new(&telegram)
    })?;
    Ok(TransportFacade::new(worker))
}

/// Await a handle with a deadline, turning both timeout and transport
/// failure into a CLI error.
pub(crate) async fn await_handle<T>(
    mut handle: TaskHandle<T>,
    timeout: Duration,
    what: &str,
) -> anyhow::Result<T> {
    if !handle.wait(timeout).await {
        anyhow::bail!("{what} timed out");
    }
    handle.result().map_err(anyhow::Error::from)
}

async fn refresh(config: &HeraldConfig, store: &Store) -> anyhow::Result<()> {
    let facade = spawn_transport(config)?;
    let identity = store.get_setting("identity")?;
    await_handle(facade.connect(identity), CONNECT_TIMEOUT, "connect").await?;

    let registry = DestinationRegistry::new();
    let fetched = await_handle(
        registry.begin_refresh(&facade),
        REFRESH_TIMEOUT,
        "destination refresh",
    )
    .await?;
    let denylist = store.load_denylist()?;
    let count = registry.apply_refresh(fetched, &denylist);

    // Snapshot persistence is best-effort; a failure must not fail refresh.
    if let Err(e) = store.persist_destinations(&registry.all()) {
        warn!(error = %e, "failed to persist destination snapshot");
    }

    println!("fetched {count} destinations");
    for dest in registry.all() {
        print_destination(&dest);
    }
    Ok(())
}

fn list(store: &Store) -> anyhow::Result<()> {
    let denylist = store.load_denylist()?;
    let mut destinations = store.load_destinations()?;
    if destinations.is_empty() {
        println!("no destinations known — run `herald refresh` first");
        return Ok(());
    }
    for dest in &mut destinations {
        dest.excluded = denylist.contains(&dest.id);
        print_destination(dest);
    }
    Ok(())
}

fn print_destination(dest: &Destination) {
    let mut badges = Vec::new();
    if dest.declared_cooldown_secs > 0 {
        badges.push(format!("slow {}s", dest.declared_cooldown_secs));
    }
    if dest.cooldown_remaining_secs > 0 {
        badges.push(format!("wait {}s", dest.cooldown_remaining_secs));
    }
    if !dest.eligible {
        badges.push("restricted".to_string());
    }
    if dest.excluded {
        badges.push("denied".to_string());
    }
    let badges = if badges.is_empty() {
        String::new()
    } else {
        format!("  [{}]", badges.join(", "))
    };
    println!("{:>14}  {} ({}){}", dest.id, dest.title, dest.kind, badges);
}

fn deny(store: &Store, action: DenyAction) -> anyhow::Result<()> {
    match action {
        DenyAction::Add { id } => {
            let mut ids = store.load_denylist()?;
            if ids.insert(id) {
                store.save_denylist(&ids)?;
                println!("{id} added to denylist");
            } else {
                println!("{id} is already denied");
            }
        }
        DenyAction::Remove { id } => {
            let mut ids = store.load_denylist()?;
            if ids.remove(&id) {
                store.save_denylist(&ids)?;
                println!("{id} removed from denylist");
            } else {
                println!("{id} was not denied");
            }
        }
        DenyAction::List => {
            let ids = store.load_denylist()?;
            if ids.is_empty() {
                println!("denylist is empty");
            }
            for id in ids {
                println!("{id}");
            }
        }
    }
    Ok(())
}

fn template(store: &Store, action: TemplateAction) -> anyhow::Result<()> {
    match action {
        TemplateAction::Add { body } => {
            let template = store.add_template(&body)?;
            println!("stored template {}", template.id);
        }
        TemplateAction::List => {
            let templates = store.list_templates()?;
            if templates.is_empty() {
                println!("no templates stored");
            }
            for t in templates {
                let preview: String = t.body.chars().take(60).collect();
                println!("{}  {}", t.id, preview);
            }
        }
        TemplateAction::Remove { id } => {
            store.remove_template(&id)?;
            println!("template {id} removed");
        }
    }
    Ok(())
}
