//! Console bot
//!
//! Reads user messages from stdin, runs each as one turn of the demo dialog
//! tree and prints replies. Sessions are stored in sqlite, so quitting and
//! restarting resumes the conversation where it was suspended.

use async_trait::async_trait;
use dialog_fiber::db::Database;
use dialog_fiber::runtime::DatabaseStorage;
use dialog_fiber::{demo, Bot, BotConfig, Connector, Message};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Prints outbound messages to stdout
struct StdoutConnector;

#[async_trait]
impl Connector for StdoutConnector {
    async fn send_message(&self, message: &Message) -> Result<(), String> {
        println!("bot> {}", message.text_or_empty());
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dialog_fiber=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Configuration
    let config = BotConfig::from_env();
    let conversation_id =
        std::env::var("DIALOG_FIBER_CONVERSATION").unwrap_or_else(|_| "console".to_string());
    let user = std::env::var("USER").unwrap_or_else(|_| "user".to_string());

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&config.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path, "Opening database");
    let db = Database::open(&config.db_path)?;

    let connector = Arc::new(StdoutConnector);
    let bot = Bot::new(
        DatabaseStorage::new(db),
        Arc::new(demo::registry()),
        connector.clone(),
        demo::ROOT,
        config.fiber(),
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let inbound = Message::from_user(&conversation_id, &user, line);
        match bot.handle(inbound).await {
            Ok(Some(reply)) => connector.send_message(&reply).await?,
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, "Turn failed");
                eprintln!("error: {e}");
            }
        }
    }

    Ok(())
}
