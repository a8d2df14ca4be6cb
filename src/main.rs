//! Local console front end: one session, commands read from stdin, audio
//! through the default output device.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use guild_dj::rodio_sink::RodioSink;
use guild_dj::{
    EnqueueOutcome, SessionId, SessionRegistry, Settings, SkipOutcome, TracingObserver, UserId,
    YtdlResolver,
};

const SESSION: SessionId = SessionId(0);

#[derive(Debug, Parser)]
#[command(name = "guild-dj", about = "Queue and play YouTube audio from the console")]
struct Args {
    /// Settings JSON file; defaults are used when it does not exist.
    #[arg(long, env = "GUILD_DJ_SETTINGS", default_value = "guild-dj.json")]
    settings: PathBuf,

    /// Log filter, overrides the settings file.
    #[arg(long)]
    log: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::load_or_default(&args.settings)?;
    guild_dj::init_logging(args.log.as_deref().unwrap_or(&settings.log_filter));

    let registry = SessionRegistry::new(
        &settings,
        Arc::new(YtdlResolver::new(settings.max_track_secs)),
        Arc::new(TracingObserver),
    );
    let sink = RodioSink::open().map_err(anyhow::Error::msg).context("Failed to open output")?;
    registry.get_or_create(SESSION).attach_sink(Arc::new(sink)).await?;

    println!(
        "commands: play <user> <url> | skip <user> | pause | resume | volume <0-100> | \
         repeat | shuffle | queue | np | stop | quit"
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.first() == Some(&"quit") {
            break;
        }
        match handle_command(&registry, &words).await {
            Ok(reply) => println!("{reply}"),
            Err(err) => println!(":x: | {err}"),
        }
    }

    registry.destroy_all().await;
    Ok(())
}

async fn handle_command(registry: &SessionRegistry, words: &[&str]) -> Result<String> {
    let session = registry.get_or_create(SESSION);
    let reply = match words {
        ["play", user, url] => {
            let user = parse_user(user)?;
            let outcomes = session.play_url(url, user).await?;
            outcomes
                .iter()
                .map(|o| match o {
                    EnqueueOutcome::Started { title } => format!("Now playing: {title}"),
                    EnqueueOutcome::Queued { title, position } => {
                        format!("Enqueued {title} (#{position})")
                    }
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
        ["skip", user] => match session.skip(parse_user(user)?).await? {
            SkipOutcome::Skipped(outcome) => format!("⏭ | {outcome:?}"),
            SkipOutcome::Voted { votes, needed } => {
                format!("⏭ | Current skip votes {votes}/{needed}")
            }
            SkipOutcome::AlreadyVoted { votes, needed } => {
                format!("Already voted ({votes}/{needed})")
            }
        },
        ["pause"] => {
            session.pause().await?;
            "Paused".to_string()
        }
        ["resume"] => {
            session.resume().await?;
            "Resumed".to_string()
        }
        ["volume", percent] => {
            let percent: u8 = percent.parse().context("volume must be 0-100")?;
            let volume = session.set_volume(f32::from(percent) / 100.0).await?;
            format!("Changed volume to {}%", (volume * 100.0).round())
        }
        ["repeat"] => format!("Repeat: {}", session.toggle_repeat().await?),
        ["shuffle"] => {
            session.shuffle().await?;
            serde_json::to_string_pretty(&session.snapshot().await?.queue)?
        }
        ["queue"] | ["np"] => serde_json::to_string_pretty(&session.snapshot().await?)?,
        ["stop"] => {
            registry.destroy(SESSION).await;
            let sink = RodioSink::open().map_err(anyhow::Error::msg)?;
            registry.get_or_create(SESSION).attach_sink(Arc::new(sink)).await?;
            "Stopped and cleared the queue".to_string()
        }
        _ => "Unknown command".to_string(),
    };
    Ok(reply)
}

fn parse_user(raw: &str) -> Result<UserId> {
    raw.parse::<u64>()
        .map(UserId)
        .with_context(|| format!("Invalid user id: {raw}"))
}
