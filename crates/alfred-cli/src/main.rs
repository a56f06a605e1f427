//! Alfred command-line entry point.
//!
//! ```text
//! alfred                 # single voice interaction
//! alfred --continuous    # keep listening until "goodbye"
//! alfred --text          # type instead of talk
//! alfred --fast          # streamed low-latency replies
//! alfred --test          # one diagnostic turn; exit code reports health
//! ```

use alfred_core::{
    AiGateway, Config, ConsolePlayback, GeminiClient, Mode, Orchestrator, ScriptedCapture,
    Session, TextLineCapture, Turn, TurnStatus, DIAGNOSTIC_QUESTION, GREETING,
};
use alfred_voice::{AudioConfig, GeminiTranscriber, MicCapture, SpeakerPlayback};
use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const BANNER: &str = r#"
    ╔═══════════════════════════════════════════╗
    ║                                           ║
    ║     █████╗ ██╗     ███████╗██████╗        ║
    ║    ██╔══██╗██║     ██╔════╝██╔══██╗       ║
    ║    ███████║██║     █████╗  ██████╔╝       ║
    ║    ██╔══██║██║     ██╔══╝  ██╔══██╗       ║
    ║    ██║  ██║███████╗██║     ██║  ██║       ║
    ║    ╚═╝  ╚═╝╚══════╝╚═╝     ╚═╝  ╚═╝       ║
    ║                                           ║
    ║    Powered by Google Gemini               ║
    ║    No bullshit. Just results.             ║
    ║                                           ║
    ╚═══════════════════════════════════════════╝
"#;

#[derive(Parser, Debug)]
#[command(name = "alfred", about = "Alfred - voice assistant powered by Google Gemini")]
struct Cli {
    /// Text-only mode (no voice)
    #[arg(long, short = 't')]
    text: bool,

    /// Continuous listening mode
    #[arg(long, short = 'c')]
    continuous: bool,

    /// Low-latency mode: streamed partial replies, small token budget
    #[arg(long, conflicts_with_all = ["text", "continuous", "test"])]
    fast: bool,

    /// Run one diagnostic turn and report health via the exit code
    #[arg(long)]
    test: bool,

    /// Use the full model and persona instead of the fast ones
    #[arg(long)]
    full: bool,
}

impl Cli {
    fn mode(&self) -> Mode {
        if self.test {
            Mode::Test
        } else if self.text {
            Mode::Text
        } else if self.continuous {
            Mode::Continuous
        } else if self.fast {
            Mode::Fast
        } else {
            Mode::Voice
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[alfred] .env not loaded: {e} (using system environment)");
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("loading configuration")?;
    let fast = !cli.full;
    let mode = cli.mode();
    info!(
        mode = mode.as_str(),
        model = config.model_for(fast),
        history_window = config.history_window,
        "alfred starting"
    );

    let gateway: Arc<dyn AiGateway> = Arc::new(GeminiClient::new(
        config.api_key.clone(),
        config.model_for(fast).to_string(),
        config.request_timeout,
    )?);
    let session = Session::new(mode, config.history_window);

    let mut orchestrator = match mode {
        Mode::Text | Mode::Test => Orchestrator::new(
            session,
            gateway,
            if mode == Mode::Test {
                Box::new(ScriptedCapture::new([DIAGNOSTIC_QUESTION]))
            } else {
                Box::new(TextLineCapture::new())
            },
            Box::new(ConsolePlayback),
            fast,
        ),
        Mode::Voice | Mode::Continuous | Mode::Fast => {
            let transcriber =
                GeminiTranscriber::new(config.api_key.clone(), config.fast_model.clone())?;
            Orchestrator::new(
                session,
                gateway,
                Box::new(MicCapture::new(AudioConfig::default(), transcriber)),
                Box::new(SpeakerPlayback::new()),
                fast,
            )
        }
    };

    if cli.test {
        println!("🧪 Testing Alfred...");
        let turn = orchestrator.run_diagnostic().await?;
        return finish_diagnostic(&turn);
    }

    println!("{BANNER}");
    let greeting = match mode {
        Mode::Text => {
            println!("📝 Text mode - type 'quit' to exit\n");
            None
        }
        Mode::Continuous => {
            println!("🔄 Continuous mode - say 'goodbye' to exit");
            Some(GREETING)
        }
        Mode::Fast => {
            println!("⚡ Fast mode - streamed replies");
            Some(GREETING)
        }
        _ => {
            println!("🎤 Single interaction mode");
            Some(GREETING)
        }
    };

    tokio::select! {
        result = orchestrator.run_loop(greeting) => {
            result.context("conversation loop failed")?;
            info!("session ended");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received; shutting down");
            println!("\n👋 Interrupted");
        }
    }
    Ok(())
}

fn finish_diagnostic(turn: &Turn) -> anyhow::Result<()> {
    match turn.status {
        TurnStatus::Completed => {
            println!("✅ Test complete ({} ms)", turn.latency_ms);
            Ok(())
        }
        _ => {
            println!("❌ Test failed: {}", turn.assistant_text);
            std::process::exit(1);
        }
    }
}
