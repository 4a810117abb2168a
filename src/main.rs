use anyhow::{Context, Result};
use feed_engage::config::{Config, PacingConfig};
use feed_engage::engine::{Cancellation, Collaborators, EngagementSession, SessionReport, SkipReason, StepResult};
use feed_engage::ui::content::{self, StaticComment};
use feed_engage::ui::replay::ReplayFeed;
use feed_engage::ui::ContentSource;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "config.toml";

struct Args {
    config: PathBuf,
    replay: Option<PathBuf>,
    fast: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args { config: PathBuf::from(DEFAULT_CONFIG), replay: None, fast: false };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => {
                args.config = it.next().map(PathBuf::from).context("--config needs a path")?;
            }
            "--replay" => {
                args.replay = Some(it.next().map(PathBuf::from).context("--replay needs a fixture path")?);
            }
            "--fast" => args.fast = true,
            other => anyhow::bail!("unknown argument: {}", other),
        }
    }
    Ok(args)
}

fn init_logging(config: &Config) -> Result<()> {
    let path = &config.logging.file;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
    }
    let log_file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create log file: {}", path.display()))?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(log_file)
        .with_ansi(false)
        .init();
    Ok(())
}

fn step_label(step: &StepResult) -> String {
    match step {
        StepResult::NotRequested => "-".to_string(),
        StepResult::Done => "done".to_string(),
        StepResult::Courtesy => "courtesy".to_string(),
        StepResult::Skipped(reason) => format!("skip:{}", reason),
        StepResult::Failed(reason) => format!("failed:{}", reason),
    }
}

fn print_summary(report: &SessionReport) {
    println!();
    for item in &report.items {
        match item.skipped {
            Some(reason) => println!("  {:<48} skipped ({})", item.key.to_string(), reason),
            None => println!(
                "  {:<48} comment={:<28} like={}",
                item.key.to_string(),
                step_label(&item.comment),
                step_label(&item.like)
            ),
        }
    }
    println!();
    println!("  Session finished: {}", report.termination);
    println!("  Actions taken:    {}", report.actions_taken);
    println!(
        "  Comments: {}  Likes: {}  Courtesy likes: {}  Failures: {}",
        report.comments(),
        report.likes(),
        report.courtesy_likes(),
        report.failures()
    );
    println!(
        "  Skipped: promoted {}  already commented {}  scroll stalls {}",
        report.skipped(SkipReason::Promoted),
        report.skipped(SkipReason::AlreadyCommentedPersisted) + report.skipped(SkipReason::AlreadyCommentedSession),
        report.scroll_stalls
    );
    println!();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = parse_args()?;
    let mut config = Config::load(&args.config)?;
    if args.fast {
        config.pacing = PacingConfig::immediate();
    }
    init_logging(&config)?;

    println!();
    println!("  Feed Engage v0.1.0");
    println!("  ==================");
    println!();
    println!("  Mode: {:?}  Budget: {}", config.engage.mode,
        if config.engage.infinite { "infinite".to_string() } else { config.engage.max_actions.to_string() });
    println!("  Cache: {}", config.cache.path.display());

    let Some(replay_path) = args.replay else {
        anyhow::bail!("--replay <fixture.json> is required (no live browser surface is bundled)");
    };
    let mut ui = ReplayFeed::load(&replay_path)?;
    let mut mentions = ui.directory();
    let mut content: Box<dyn ContentSource> = if config.engage.mode.comments() {
        content::from_config(&config.engage)?
    } else {
        Box::new(StaticComment::new(String::new()))
    };
    println!("  Replaying: {}", replay_path.display());
    println!();

    let (cancel_tx, cancel) = Cancellation::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping at the next step boundary");
            let _ = cancel_tx.send(true);
        }
    });

    let mut session = EngagementSession::from_config(&config, cancel);
    let mut collab = Collaborators { ui: &mut ui, content: content.as_mut(), mentions: &mut mentions };
    let report = session.run(&mut collab).await?;
    print_summary(&report);
    Ok(())
}
