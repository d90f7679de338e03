//! `threadbot run` — Slack bot over Socket Mode.

use super::{CmdResult, build_orchestrator, load_config, open_stores};
use std::path::Path;
use std::sync::Arc;
use threadbot_agent::{CommandHandler, DeliverySettings, TurnHandler};
use threadbot_channels::{SlackSocket, SlackTransport, SocketEvent};
use threadbot_core::transport::ChatTransport;
use tracing::{error, info};

pub async fn run(config_path: Option<&Path>) -> CmdResult {
    let config = load_config(config_path)?;

    let transport: Arc<dyn ChatTransport> = Arc::new(SlackTransport::from_config(&config.slack)?);
    let socket = SlackSocket::from_config(&config.slack)?;

    let stores = open_stores(&config).await?;
    let provider = threadbot_providers::provider_from_config(&config);
    let orchestrator = build_orchestrator(&config, provider.clone(), stores.cache);
    let tool_count = orchestrator.tool_count();

    let mut turns = TurnHandler::new(
        transport.clone(),
        stores.context,
        Arc::new(orchestrator),
        &config.agent.system_prompt,
    )
    .with_delivery(DeliverySettings::from(&config.delivery));
    if let Some(transcriber) = threadbot_providers::transcriber_from_config(&config) {
        turns = turns.with_transcriber(transcriber);
    }
    let turns = Arc::new(turns);
    let commands = Arc::new(CommandHandler::new(
        transport,
        provider,
        config.provider.allow_set_key,
    ));

    info!(
        model = %config.provider.model,
        tools = tool_count,
        db = %config.storage.db_path,
        "threadbot starting"
    );
    let mut events = socket.start();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                dispatch(event, &turns, &commands);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// Handle each event on its own task so slow replies never block others.
fn dispatch(event: SocketEvent, turns: &Arc<TurnHandler>, commands: &Arc<CommandHandler>) {
    match event {
        SocketEvent::Message(event) => {
            let turns = turns.clone();
            tokio::spawn(async move {
                if let Err(e) = turns.handle(&event).await {
                    error!(channel = %event.channel, ts = %event.ts, error = %e, "Turn failed");
                }
            });
        }
        SocketEvent::Command(command) => {
            let commands = commands.clone();
            tokio::spawn(async move {
                if let Err(e) = commands.handle(&command).await {
                    error!(command = %command.command, error = %e, "Slash command failed");
                }
            });
        }
    }
}
