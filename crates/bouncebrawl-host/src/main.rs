use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use bouncebrawl_core::session::MatchSession;
use bouncebrawl_host::command::{HELP, parse_command};
use bouncebrawl_host::config::{HostConfig, LogFormat};
use bouncebrawl_host::protocol::{MatchFrame, decode_frame};
use bouncebrawl_host::session_loop::{MatchBroadcast, MatchCommand, spawn_match_session};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

fn report(frame: MatchFrame) {
    match frame {
        MatchFrame::Event(event) => tracing::info!(?event, "match event"),
        MatchFrame::Snapshot(snapshot) => match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => println!("{json}"),
            Err(e) => tracing::error!(error = %e, "Failed to render snapshot"),
        },
        MatchFrame::Rejected(r) => {
            tracing::warn!(command = %r.command, reason = %r.reason, "Command rejected");
        },
    }
}

#[tokio::main]
async fn main() {
    let config = HostConfig::load();
    init_tracing(config.log_format);

    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "Invalid host configuration");
        std::process::exit(1);
    }
    tracing::info!(
        tick_rate = config.tick_rate_hz,
        match_config = ?config.match_config,
        "bouncebrawl host starting"
    );

    let session = MatchSession::new(config.load_match_config());
    let (cmd_tx, mut broadcast_rx, handle) =
        spawn_match_session(session, config.session_config());

    let stdin_tx = cmd_tx.clone();
    tokio::spawn(async move {
        println!("{HELP}");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match parse_command(&line) {
                Ok(cmd) => {
                    let stop = cmd == MatchCommand::Stop;
                    if stdin_tx.send(cmd).is_err() || stop {
                        return;
                    }
                },
                Err(e) => tracing::warn!(error = %e, "Could not parse command"),
            }
        }
        let _ = stdin_tx.send(MatchCommand::Stop);
    });

    loop {
        tokio::select! {
            msg = broadcast_rx.recv() => match msg {
                Some(MatchBroadcast::EncodedFrame(data)) => match decode_frame(&data) {
                    Ok(frame) => report(frame),
                    Err(e) => tracing::error!(error = %e, "Failed to decode frame"),
                },
                Some(MatchBroadcast::SessionEnded) | None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping session");
                let _ = cmd_tx.send(MatchCommand::Stop);
            }
        }
    }

    let _ = handle.await;
    tracing::info!("bouncebrawl host stopped");
}
