use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use vocare::audio::{AudioCapture, AudioPlayback, CaptureSource};
use vocare::exchange::Backend;
use vocare::{Command as TalkCommand, Config, ExchangeClient, Orchestrator, Session, ViewEvent};

/// Vocare - voice console client for the clinic assistant backend
#[derive(Parser)]
#[command(name = "vocare", version, about)]
struct Cli {
    /// Backend base URL (overrides config file and environment)
    #[arg(long, env = "VOCARE_BACKEND_URL")]
    backend_url: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// One-shot text exchange (bypasses the audio path)
    Text {
        /// Text to send
        text: String,
        /// Session id to reuse; a fresh one is generated when omitted
        #[arg(short, long)]
        session: Option<String>,
    },
    /// Show backend-held history for a session
    History {
        /// Session id
        session: String,
    },
    /// Check backend reachability
    Health,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,vocare=info",
        1 => "info,vocare=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(url) = cli.backend_url {
        config.backend_url = url.trim_end_matches('/').to_string();
    }

    let client = ExchangeClient::new(&config)?;

    match cli.command {
        Some(Command::TestMic { duration }) => test_mic(&config, duration),
        Some(Command::Text { text, session }) => {
            let session = session.map_or_else(Session::new, Session::from_id);
            let reply = client.exchange_text(&text, session.id()).await?;
            println!("session: {}", reply.session_id);
            println!("you:     {}", reply.user_text);
            println!("reply:   {}", reply.response_text);
            println!("goal:    {}", reply.goal_achieved);
            Ok(())
        }
        Some(Command::History { session }) => {
            let history = client.session_history(&session).await?;
            println!("session {} ({} turns)", history.session_id, history.turns);
            for entry in history.history {
                println!("  {:>9}: {}", entry.role, entry.text);
            }
            Ok(())
        }
        Some(Command::Health) => {
            if client.health().await {
                println!("backend reachable at {}", config.backend_url);
                Ok(())
            } else {
                anyhow::bail!("backend unreachable at {}", config.backend_url);
            }
        }
        None => talk(config, client).await,
    }
}

/// Record from the default microphone and report what was captured
fn test_mic(config: &Config, duration: u64) -> anyhow::Result<()> {
    let mut capture = AudioCapture::new(config.chunk_cadence)?;

    println!("recording for {duration}s...");
    capture.begin()?;
    std::thread::sleep(Duration::from_secs(duration));
    let blob = capture.end()?;

    if blob.is_empty() {
        println!("no audio captured");
    } else {
        println!(
            "captured {} bytes ({})",
            blob.data.len(),
            blob.container.mime()
        );
    }
    Ok(())
}

/// Interactive push-to-talk console loop
#[allow(clippy::future_not_send)]
async fn talk(config: Config, client: ExchangeClient) -> anyhow::Result<()> {
    let capture = AudioCapture::new(config.chunk_cadence)?;
    let playback = AudioPlayback::new()?;

    let (orchestrator, view, mut events) =
        Orchestrator::new(capture, playback, client, config.error_recovery);

    println!("session {}", orchestrator.session_id());
    println!("enter = start/stop recording, 'clear' resets, 'quit' exits, anything else is sent as text");

    let (tx, rx) = mpsc::channel(16);

    // Presentation: print view events as they arrive
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ViewEvent::StatusChanged(status) => println!("[{status}]"),
                ViewEvent::TurnAppended(turn) => println!("{:>9}: {}", turn.role, turn.text),
                ViewEvent::LogCleared => println!("(conversation cleared)"),
                ViewEvent::OfflineChanged(offline) => {
                    println!("(backend {})", if offline { "offline" } else { "online" });
                }
                ViewEvent::Notice(notice) => println!("!! {notice}"),
            }
        }
    });

    // Input: translate stdin lines into commands
    let input_view = view;
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let command = match line.trim() {
                "" => {
                    if input_view.status() == vocare::Status::Recording {
                        TalkCommand::CaptureStop
                    } else {
                        TalkCommand::CaptureStart
                    }
                }
                "clear" => TalkCommand::Clear,
                "quit" | "exit" => TalkCommand::Shutdown,
                text => TalkCommand::SubmitText(text.to_string()),
            };
            let shutdown = command == TalkCommand::Shutdown;
            if tx.send(command).await.is_err() || shutdown {
                break;
            }
        }
    });

    orchestrator.run(rx).await;
    Ok(())
}
