use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use meena::chat::{sampling, PresentationSection};
use meena::{ChatConfig, Engine, Reply, SamplingStrategy, TurnStatus};
use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(err) = run() {
        eprintln!("meena-chat failed: {err:#}");
        std::process::exit(1);
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Chat with an encoder-decoder conversational model", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "PATH", help = "Path to chat config file (TOML or JSON)")]
    config: PathBuf,

    #[arg(
        long = "override",
        value_name = "KEY=VALUE",
        help = "Override configuration value using dot-separated paths"
    )]
    overrides: Vec<OverrideArg>,

    #[arg(long, help = "Seed for the sampling random source")]
    seed: Option<u64>,

    #[arg(long, value_enum, help = "Sampling strategy with its default parameters")]
    strategy: Option<StrategyArg>,
}

#[derive(Debug, Clone)]
struct OverrideArg(String);

impl FromStr for OverrideArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (path, _) = s
            .split_once('=')
            .ok_or_else(|| "override must be in the form key=value".to_string())?;
        if path.trim().is_empty() {
            return Err("override key must not be empty".into());
        }
        Ok(Self(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    TopK,
    TopP,
    SampleAndRank,
}

impl StrategyArg {
    fn into_strategy(self) -> SamplingStrategy {
        match self {
            StrategyArg::TopK => SamplingStrategy::TopK {
                k: sampling::DEFAULT_TOP_K,
                temperature: 1.0,
            },
            StrategyArg::TopP => SamplingStrategy::TopP {
                p: sampling::DEFAULT_TOP_P,
                temperature: 1.0,
            },
            StrategyArg::SampleAndRank => SamplingStrategy::SampleAndRank {
                n: sampling::DEFAULT_RANK_CANDIDATES,
                temperature: sampling::DEFAULT_RANK_TEMPERATURE,
            },
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run() -> Result<()> {
    let args = Args::parse();
    init_logging();

    let overrides: Vec<&str> = args.overrides.iter().map(|o| o.0.as_str()).collect();
    let mut config = ChatConfig::load(&args.config, &overrides[..])
        .with_context(|| format!("failed to load config {}", args.config.display()))?;
    if let Some(seed) = args.seed {
        config.decoding.seed = Some(seed);
    }
    if let Some(strategy) = args.strategy {
        config.decoding.strategy = strategy.into_strategy();
    }
    config.validate()?;

    let device = meena::setup_device()?;
    let engine = Engine::load(config, device)?;
    let presentation = engine.config().presentation.clone();
    let user_marker = engine.config().decoding.user_marker.clone();
    let mut session = engine.session()?;

    // Ctrl-C cancels a reply in progress and exits at the prompt.
    let cancel_flag = Arc::new(AtomicBool::new(false));
    let replying = Arc::new(AtomicBool::new(false));
    let handler_flag = cancel_flag.clone();
    let handler_replying = replying.clone();
    ctrlc::set_handler(move || {
        if !interrupt(&handler_replying, &handler_flag) {
            println!();
            std::process::exit(130);
        }
    })
    .context("failed to install signal handler")?;

    println!("{}", presentation.greeting);
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("{user_marker} ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        let text = line.trim();
        match text {
            "" => continue,
            "/quit" => break,
            "/reset" => {
                session.reset();
                println!("(conversation reset)");
                continue;
            }
            _ => {}
        }

        cancel_flag.store(false, Ordering::SeqCst);
        replying.store(true, Ordering::SeqCst);
        let reply = session.respond(text, &|| cancel_flag.load(Ordering::SeqCst));
        replying.store(false, Ordering::SeqCst);
        let reply = reply?;
        present(&reply, &presentation);
    }
    Ok(())
}

/// Raises the cancel flag while a reply is being generated. Returns `false`
/// when there is nothing to cancel and the process should exit.
fn interrupt(replying: &AtomicBool, cancel: &AtomicBool) -> bool {
    if replying.load(Ordering::SeqCst) {
        cancel.store(true, Ordering::SeqCst);
        true
    } else {
        false
    }
}

fn present(reply: &Reply, presentation: &PresentationSection) {
    let label = &presentation.speaker_label;
    match reply.segments.as_slice() {
        [] => println!("{label}:"),
        [only] => println!("{label}: {only}"),
        segments => {
            let delay = Duration::from_millis(presentation.segment_delay_ms);
            for (index, segment) in segments.iter().enumerate() {
                if index > 0 {
                    thread::sleep(delay);
                }
                println!("{label}: {segment}");
            }
        }
    }
    match reply.status {
        TurnStatus::Cancelled => eprintln!("(reply interrupted)"),
        TurnStatus::Incomplete => log::info!("reply hit the length limit after {} steps", reply.steps),
        TurnStatus::Complete => {}
    }
}
