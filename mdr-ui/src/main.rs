//! mdr-ui - DIY recipes application shell
//!
//! Builds the module registry and the preference layer, then runs one
//! command against them: list modules and navigation, open a route, or read
//! and change user preferences (optionally as a signed-in user).

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use mdr_common::config::{default_config_file, resolve_root_folder, AppPaths, TomlConfig};
use mdr_common::modules::ModuleSummary;
use mdr_common::preferences::PendingWrite;
use mdr_common::{SessionUser, Theme};
use std::path::PathBuf;
use tracing::{info, warn};

mod app;
mod modules;
mod routes;

use app::App;
use modules::Screen;

#[derive(Parser, Debug)]
#[command(name = "mdr-ui")]
#[command(about = "DIY formulations application shell")]
#[command(version)]
struct Args {
    /// Root folder holding the database and local store
    #[arg(short, long, env = "MDR_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML config file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Sign in as this user id before running the command
    #[arg(short, long)]
    user: Option<String>,

    /// Display name carried into a newly migrated preference record
    #[arg(long, requires = "user")]
    display_name: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered modules
    Modules {
        /// Include disabled modules
        #[arg(long)]
        all: bool,
    },
    /// Print the navigation tree of enabled modules
    Nav,
    /// Print the route table of enabled modules
    Routes,
    /// Render the screen registered for a path
    Open { path: String },
    /// Enable a module
    Enable { id: String },
    /// Disable a module
    Disable { id: String },
    /// Show the current preferences
    Prefs,
    /// Set the theme (hackers, dystopia, neotopia)
    SetTheme { theme: Theme },
    /// Advance to the next theme
    ToggleTheme,
    /// Turn sound effects on or off
    SetAudio {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Set the output volume (0.0 - 1.0)
    SetVolume { volume: f32 },
    /// Copy local preferences into the remote store for --user
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match args.config.clone().or_else(default_config_file) {
        Some(path) => TomlConfig::load_or_default(&path),
        None => TomlConfig::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting mdr-ui v{}", env!("CARGO_PKG_VERSION"));

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &config);
    let paths = AppPaths::resolve(root_folder, &config);
    info!("Root folder: {}", paths.root_folder.display());

    let mut app = App::open(&paths, &config).await?;

    let user = args.user.map(|id| {
        let user = SessionUser::new(id);
        match args.display_name {
            Some(name) => user.with_display_name(name),
            None => user,
        }
    });
    if let Some(user) = &user {
        app.sign_in(user.clone()).await?;
    }

    let result = run(&mut app, args.command, user.as_ref()).await;
    app.shutdown().await;
    result
}

async fn run(app: &mut App, command: Command, user: Option<&SessionUser>) -> Result<()> {
    match command {
        Command::Modules { all } => {
            let modules = if all {
                app.registry.modules()
            } else {
                app.registry.enabled_modules()
            };
            let summaries: Vec<ModuleSummary> = modules.iter().map(|m| ModuleSummary::from(m.as_ref())).collect();
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        }
        Command::Nav => {
            for root in app.registry.navigation_items() {
                for (depth, item) in root.walk() {
                    let path = item.path.as_deref().unwrap_or("");
                    println!("{}{} {}  {}", "  ".repeat(depth), item.icon, item.name, path);
                }
            }
        }
        Command::Routes => {
            for route in app.registry.routes() {
                let kind = if route.exact { "exact " } else { "prefix" };
                println!("{} {:<32} {}", kind, route.path, route.component.name());
            }
        }
        Command::Open { path } => {
            let Some(found) = routes::resolve(&app.registry, &path) else {
                bail!("no enabled module handles {}", path);
            };
            match found.route.component.downcast_ref::<Screen>() {
                Some(render) => println!("{}", render(&found.module, &found.params)),
                None => println!("{} (no view)", found.route.component.name()),
            }
        }
        Command::Enable { id } => app.registry.set_module_enabled(&id, true)?,
        Command::Disable { id } => app.registry.set_module_enabled(&id, false)?,
        Command::Prefs => {
            println!("{}", serde_json::to_string_pretty(&app.prefs.state())?);
        }
        Command::SetTheme { theme } => {
            let pending = app.prefs.set_theme(theme)?;
            await_write(app, pending).await;
        }
        Command::ToggleTheme => {
            let pending = app.prefs.toggle_theme()?;
            await_write(app, pending).await;
        }
        Command::SetAudio { enabled } => {
            let pending = app.prefs.set_audio_enabled(enabled)?;
            await_write(app, pending).await;
        }
        Command::SetVolume { volume } => {
            let pending = app.prefs.set_volume(volume)?;
            await_write(app, pending).await;
        }
        Command::Migrate => {
            let Some(user) = user else {
                bail!("migrate requires --user");
            };
            let outcome = app.prefs.migrate_from_local(user).await?;
            println!("{:?}", outcome);
        }
    }
    Ok(())
}

/// Wait for remote persistence of an update, then re-project the theme
///
/// A failed remote write is reported but not fatal; the value is kept locally.
async fn await_write(app: &mut App, pending: PendingWrite) {
    if let Err(e) = pending.wait().await {
        warn!("Preference saved locally only: {}", e);
    }
    app.theme_sync.sync();
    let theme = app.prefs.theme();
    println!("theme={} ({})", theme, theme.display_name());
    if let Some(doc_theme) = app.theme_sync.document().theme() {
        info!(theme = %doc_theme, legacy = %app.legacy.theme(), "Document theme");
    }
}
