use std::sync::Arc;

use mentii::app::ChatShell;
use mentii::settings::SettingsStore;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Logs go to stderr; stdout carries the conversation.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = Arc::new(SettingsStore::load());
    tracing::info!(config_path = ?settings.config_path(), "loaded settings");

    let mut shell = match ChatShell::open(settings) {
        Ok(shell) => shell,
        Err(error) => {
            tracing::error!(error = %error, "failed to start mentii");
            std::process::exit(1);
        }
    };

    let stdin = BufReader::new(tokio::io::stdin());
    if let Err(error) = shell.run(stdin, tokio::io::stdout()).await {
        tracing::error!(error = %error, "terminal session failed");
        std::process::exit(1);
    }
}
