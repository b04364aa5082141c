//! Echo bot demo.
//!
//! Joins the configured channel and repeats chat messages addressed to the
//! bot back at the sender; private messages are echoed verbatim. A minimal
//! end-to-end exercise of the session layer.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use serde_json::Value;

use cytube_client::{markup, Bot, Config};

/// Echo bot for CyTube-style channels.
#[derive(Debug, Parser)]
#[command(name = "cytube-echo", version)]
struct Args {
    /// Path to the JSON config file.
    config: PathBuf,
    /// Override the config's log level filter.
    #[arg(long)]
    log_level: Option<String>,
}

/// Reply to chat mentions and private messages.
fn register_echo(bot: &Bot) {
    let handle = bot.clone();
    bot.on("chatMsg", "echo", move |event, data| {
        let bot = handle.clone();
        Box::pin(async move { echo(&bot, &event, &data).await })
    });
    let handle = bot.clone();
    bot.on("pm", "echo", move |event, data| {
        let bot = handle.clone();
        Box::pin(async move { echo(&bot, &event, &data).await })
    });
}

async fn echo(bot: &Bot, event: &str, data: &Value) -> cytube_client::HandlerResult {
    let username = data
        .get("username")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let (own_name, rank) = {
        let user = bot.user();
        let user = user.lock().await;
        (user.name.clone(), user.rank)
    };
    // Ignore own messages and anything seen before login completed
    if username == own_name || rank < 0.0 {
        return Ok(false);
    }

    let msg = markup::strip_markup(data.get("msg").and_then(Value::as_str).unwrap_or_default());
    if event == "pm" {
        bot.pm(username, &msg, None).await?;
    } else if msg.starts_with(&own_name) {
        bot.chat(&msg.replacen(&own_name, username, 1), None).await?;
    }
    Ok(false)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.config)?;

    let log_level = args.log_level.as_deref().unwrap_or(&config.log_level);
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let bot = Bot::new(&config)?;
    register_echo(&bot);

    // Ctrl-C requests a sticky cancellation; run() disconnects before returning.
    {
        let bot = bot.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Interrupt received, shutting down");
                bot.shutdown();
            }
        });
    }

    bot.run().await?;
    Ok(())
}
