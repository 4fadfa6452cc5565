use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use client_core::{
    ActionOutcome, MemoryTransport, RoomTarget, SessionController, Transport, WsTransport,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod render;

use config::load_settings;
use render::{roster_lines, Renderer};

#[derive(Parser, Debug)]
#[command(about = "Terminal chat client")]
struct Args {
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    username: Option<String>,
    /// Config file; defaults to ./chat.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Talk to an in-process echo server instead of the network.
    #[arg(long)]
    offline: bool,
}

enum Command {
    Join(String),
    Room(RoomTarget),
    Who,
    Disconnect,
    Connect,
    Help,
    Quit,
    Say(String),
}

fn parse_command(line: &str) -> Command {
    let Some(rest) = line.trim_start().strip_prefix('/') else {
        return Command::Say(line.to_string());
    };
    let (name, arg) = rest
        .split_once(char::is_whitespace)
        .map(|(name, arg)| (name, arg.trim()))
        .unwrap_or((rest.trim(), ""));
    match name {
        "join" => Command::Join(arg.to_string()),
        "all" => Command::Room(RoomTarget::Global),
        "room" if arg.is_empty() || arg.eq_ignore_ascii_case("all") => {
            Command::Room(RoomTarget::Global)
        }
        "room" => Command::Room(RoomTarget::User(arg.to_string())),
        "who" => Command::Who,
        "disconnect" => Command::Disconnect,
        "connect" => Command::Connect,
        "quit" | "exit" => Command::Quit,
        _ => Command::Help,
    }
}

const HELP: &str = "commands: /join <name>, /room <user>|all, /who, /disconnect, /connect, /quit";

enum Input {
    Line(Option<String>),
    Event(bool),
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }
    if let Some(username) = args.username {
        settings.username = Some(username);
    }

    let filter = EnvFilter::try_new(&settings.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let transport: Arc<dyn Transport> = if args.offline {
        info!("using in-process echo server");
        Arc::new(MemoryTransport::relay())
    } else {
        let transport = WsTransport::new(&settings.server_url)?;
        info!(url = %transport.url(), "using websocket transport");
        Arc::new(transport)
    };

    let mut session = SessionController::new(transport);
    let mut renderer = Renderer::default();
    session.attach().await?;
    session.process_pending();

    if let Some(name) = settings.username.as_deref() {
        session.join(name).await?;
    }
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print_lines(renderer.render(&session.current_view()));

        let input = tokio::select! {
            line = lines.next_line() => Input::Line(line?),
            alive = session.process_next() => Input::Event(alive),
        };

        let line = match input {
            Input::Event(true) => continue,
            Input::Event(false) => {
                warn!("event stream closed");
                break;
            }
            Input::Line(None) => break,
            Input::Line(Some(line)) => line,
        };

        let outcome = match parse_command(&line) {
            Command::Join(name) => session.join(&name).await,
            Command::Room(target) => Ok(session.select_room(target)),
            Command::Say(text) => session.send_message(&text).await,
            Command::Who => {
                print_lines(roster_lines(&session.current_view()));
                continue;
            }
            Command::Disconnect => session.disconnect().await.map(|_| ActionOutcome::Applied),
            Command::Connect => session.reconnect().await.map(|_| ActionOutcome::Applied),
            Command::Help => {
                println!("{HELP}");
                continue;
            }
            Command::Quit => break,
        };

        match outcome {
            Ok(ActionOutcome::Applied) => {}
            Ok(ActionOutcome::Ignored(reason)) => info!(?reason, "input ignored"),
            Err(err) => println!("!! {err}"),
        }
    }

    session.shutdown().await?;
    Ok(())
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{line}");
    }
}
