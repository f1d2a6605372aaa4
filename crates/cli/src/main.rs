use anyhow::Context;
use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use lib::gateway::protocol::{ClientEvent, MessageContent, SendMessage, Sender, ServerEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser)]
#[command(name = "floatrelay")]
#[command(about = "FloatRelay — query classification and routing relay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the relay gateway (HTTP + WebSocket on one port).
    Gateway {
        /// Config file path (default: FLOATRELAY_CONFIG_PATH or ~/.floatrelay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// WebSocket and HTTP port (default from config or 4000)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Join a chat on a running gateway and relay queries interactively.
    Chat {
        /// Config file path (default: FLOATRELAY_CONFIG_PATH or ~/.floatrelay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Chat channel id to join (default "local").
        #[arg(long, value_name = "ID")]
        chat: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("floatrelay {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Gateway { config, port }) => {
            if let Err(e) = run_gateway(config, port).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Chat { config, chat }) => {
            if let Err(e) = run_chat(config, chat).await {
                log::error!("chat failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

async fn run_gateway(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, _path) = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting relay on {}:{}",
        config.gateway.bind,
        config.gateway.port
    );
    lib::gateway::run_gateway(config).await
}

async fn run_chat(
    config_path: Option<std::path::PathBuf>,
    chat: Option<String>,
) -> anyhow::Result<()> {
    let (config, _path) = lib::config::load_config(config_path)?;
    let chat_id = chat.unwrap_or_else(|| "local".to_string());

    let mut url = format!("ws://127.0.0.1:{}/ws", config.gateway.port);
    if let Some(token) = lib::config::resolve_gateway_token(&config) {
        url = format!("{}?token={}", url, token);
    }
    let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .with_context(|| format!("connecting to {}", url))?;
    let (mut write, mut read) = ws.split();

    let join = ClientEvent::JoinChat(chat_id.clone());
    write
        .send(Message::Text(serde_json::to_string(&join)?))
        .await
        .context("joining chat")?;
    println!("joined chat {} — type a query, Ctrl+D to quit", chat_id);

    tokio::spawn(async move {
        while let Some(Ok(msg)) = read.next().await {
            let Message::Text(text) = msg else { continue };
            match serde_json::from_str::<ServerEvent>(&text) {
                Ok(ServerEvent::NewMessage(message)) => print_message(&message),
                Err(_) => {
                    // Control frames (e.g. shutdown) are not newMessage events.
                    log::debug!("non-message frame: {}", text);
                }
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let message = line.trim().to_string();
        if message.is_empty() {
            continue;
        }
        let frame = ClientEvent::SendMessage(SendMessage {
            chat_id: chat_id.clone(),
            message,
        });
        write
            .send(Message::Text(serde_json::to_string(&frame)?))
            .await
            .context("sending message")?;
    }
    Ok(())
}

fn print_message(message: &lib::gateway::protocol::OutboundMessage) {
    let who = match message.sender {
        Sender::User => "you",
        Sender::Assistant => "assistant",
    };
    match &message.content {
        MessageContent::Text(text) => println!("[{}] {}", who, text),
        MessageContent::Records(records) => {
            println!("[{}] {} record(s):", who, records.len());
            for record in records {
                let row: Vec<String> = record
                    .iter()
                    .map(|(k, v)| match v {
                        serde_json::Value::String(s) => format!("{}: {}", k, s),
                        other => format!("{}: {}", k, other),
                    })
                    .collect();
                println!("  - {}", row.join(", "));
            }
        }
    }
}
