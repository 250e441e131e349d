//! sockswitch: SOCKS5 proxy switch
//!
//! Entry point. Loads configuration, sets up logging, opens the state
//! store and routes every subcommand through the controller's message
//! protocol.

mod cli;
mod serve;
mod surface;

use anyhow::{Result, anyhow, bail};
use clap::Parser;
use cli::{Args, Commands};
use sockswitch_core::{
    ConnectionIntent, HostPlatform, JsonFileBackend, ProxyController, ProxyState, Request,
    Response, StateStore, StatusReply, SwitchConfig, dispatch,
};
use std::sync::Arc;
use surface::StatusView;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

// Use mimalloc as the global allocator
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

type Controller = ProxyController<HostPlatform>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = SwitchConfig::load_or_default(&args.config)?;
    if let Some(state) = args.state {
        config.state_path = state;
    }
    if let Some(platform) = args.platform {
        config.platform = platform;
    }

    init_logging(&config.log_level);
    info!(
        "sockswitch starting (platform: {:?}, state: {})",
        config.platform,
        config.state_path.display()
    );

    let store = StateStore::open_or_reset(Box::new(JsonFileBackend::new(&config.state_path)));
    let controller = Arc::new(
        ProxyController::new(HostPlatform::from_kind(config.platform), store)
            .with_extra_bypass(config.extra_bypass.clone()),
    );

    match args.command {
        Commands::Connect(connect) => {
            let saved = fetch_state(&controller).await?;
            let intent = surface::connect_intent(&connect, &saved, config.default_port);
            let reply = request_status(&controller, Request::UpdateProxy { data: intent }).await?;
            finish(&controller, reply).await
        }
        Commands::Disconnect => {
            let reply = request_status(
                &controller,
                Request::UpdateProxy {
                    data: ConnectionIntent::disconnect(),
                },
            )
            .await?;
            finish(&controller, reply).await
        }
        Commands::Status { json } => {
            let state = fetch_state(&controller).await?;
            if json {
                println!("{}", Response::State(state).to_json());
            } else {
                println!("{}", StatusView::from_state(&state));
            }
            Ok(())
        }
        Commands::ClearError => {
            let reply = request_status(&controller, Request::ClearError).await?;
            finish(&controller, reply).await
        }
        Commands::Forget => {
            let reply = request_status(&controller, Request::ClearSaved).await?;
            finish(&controller, reply).await
        }
        Commands::Serve => serve::run(controller).await,
    }
}

/// Install the fmt subscriber on stderr; `RUST_LOG` wins over the config
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

async fn request_status(controller: &Controller, request: Request) -> Result<StatusReply> {
    let kind = request.kind();
    dispatch(controller, request)
        .await
        .into_status()
        .ok_or_else(|| anyhow!("{} did not return a status reply", kind))
}

async fn fetch_state(controller: &Controller) -> Result<ProxyState> {
    dispatch(controller, Request::GetStatus)
        .await
        .into_state()
        .ok_or_else(|| anyhow!("GET_STATUS did not return a state record"))
}

/// Print the resulting status; fail the process if the request failed
async fn finish(controller: &Controller, reply: StatusReply) -> Result<()> {
    let state = fetch_state(controller).await?;
    println!("{}", StatusView::from_state(&state));

    if let Some(message) = surface::failure_message(&reply) {
        bail!("{}", message);
    }
    Ok(())
}
