mod cli;
mod renderer;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use setting_manager_core::api::{self, UpdateRequest};
use setting_manager_core::config::{self, ManagerConfig};
use setting_manager_core::logging::init_tracing;
use setting_manager_core::schema::{SchemaDocument, SettingsSchema};
use setting_manager_core::storage::create_settings_store;
use setting_manager_core::sweeper::sweep;
use setting_manager_core::{
    spawn_reload_loop, Error, Result, SettingsEvent, SettingsManagerBuilder,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::{Cli, Command, OutputFormat};
use crate::renderer::Renderer;

const DEFAULT_WATCH_INTERVAL_SECS: u64 = 5;

fn main() {
    if let Err(error) = run() {
        eprintln!("setting-manager failed: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Cli::parse_args();
    let config = config::load(args.config.as_deref())?;
    init_tracing(&config.logging.level);

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|err| Error::Config(format!("failed to create tokio runtime: {err}")))?;
    let renderer = Renderer::new(args.format);

    match runtime.block_on(execute(&args, &config, renderer)) {
        Err(error) if args.format == OutputFormat::Json => {
            renderer.render_error(command_name(&args.command), &error);
            std::process::exit(1);
        }
        result => result,
    }
}

async fn execute(args: &Cli, config: &ManagerConfig, renderer: Renderer) -> Result<()> {
    let schema = SchemaDocument::load(&args.schema)?;

    if let Command::Sweep = args.command {
        let valid: HashSet<String> = schema
            .describe_fields()?
            .into_iter()
            .map(|field| field.name)
            .collect();
        let store = create_settings_store(&config.storage)?;
        let removed = sweep(store.as_ref(), &valid).await?;
        return renderer.render_removed(&removed);
    }

    if let Command::Watch { interval_secs } = args.command {
        return watch(schema, config, &args.role, renderer, interval_secs).await;
    }

    let manager = SettingsManagerBuilder::from_config(schema, config)?.build()?;
    manager.initialize().await?;

    match &args.command {
        Command::List { reveal } => {
            let sections = api::list_sections(&manager, &args.role, *reveal)?;
            renderer.render_sections(&sections)
        }
        Command::Get { name, reveal } => {
            let view = api::setting_view(&manager, name, &args.role, *reveal)?;
            renderer.render_setting("get", &view)
        }
        Command::Set { name, value } => {
            let value = manager
                .descriptor(name)?
                .declared_type
                .parse_raw(value)
                .map_err(|reason| Error::Validation(format!("setting '{name}': {reason}")))?;
            let request = UpdateRequest { value };
            let view = api::apply_update(&manager, name, request, &args.role).await?;
            renderer.render_setting("set", &view)
        }
        Command::Reset { name } => {
            manager.reset_setting(name).await?;
            let view = api::setting_view(&manager, name, &args.role, false)?;
            renderer.render_setting("reset", &view)
        }
        Command::ResetAll => {
            let changed = manager.reset_all_settings().await?;
            renderer.render_changed("reset-all", &changed)
        }
        // handled before the manager is built
        Command::Sweep | Command::Watch { .. } => Ok(()),
    }
}

async fn watch(
    schema: SchemaDocument,
    config: &ManagerConfig,
    role: &str,
    renderer: Renderer,
    interval_secs: Option<u64>,
) -> Result<()> {
    let interval = interval_secs
        .or(config.reload.interval_secs)
        .unwrap_or(DEFAULT_WATCH_INTERVAL_SECS)
        .max(1);

    let manager = Arc::new(SettingsManagerBuilder::from_config(schema, config)?.build()?);
    manager.initialize().await?;
    let mut events = manager.events().subscribe();
    info!(interval_secs = interval, "watching settings");

    let cancel = CancellationToken::new();
    let handle = spawn_reload_loop(
        Arc::clone(&manager),
        Duration::from_secs(interval),
        cancel.clone(),
    );

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.map_err(|err| {
                    Error::Config(format!("failed to listen for ctrl-c: {err}"))
                })?;
                break;
            }
            event = events.next() => match event {
                Some(SettingsEvent::Reloaded { changed }) => {
                    for name in changed {
                        let view = api::setting_view(&manager, &name, role, false)?;
                        renderer.render_setting("watch", &view)?;
                    }
                }
                Some(_) => {}
                None => break,
            },
        }
    }

    cancel.cancel();
    handle
        .await
        .map_err(|err| Error::Lifecycle(format!("reload loop panicked: {err}")))?;
    Ok(())
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::List { .. } => "list",
        Command::Get { .. } => "get",
        Command::Set { .. } => "set",
        Command::Reset { .. } => "reset",
        Command::ResetAll => "reset-all",
        Command::Sweep => "sweep",
        Command::Watch { .. } => "watch",
    }
}

