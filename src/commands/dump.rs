use anyhow::{Context, Result};
use futures_util::StreamExt;
use sbs_relay::batch::gzip;
use sbs_relay::compact::CompactMessage;
use sbs_relay::config::DumpConfig;
use sbs_relay::nats_publisher;
use std::io::Write;
use tracing::{debug, info, warn};

pub async fn handle_dump(config: DumpConfig) -> Result<()> {
    info!(
        "Starting dump subscriber - NATS: {}, subject: {}, json: {}",
        config.nats_url, config.subject, config.json
    );

    let client = nats_publisher::connect(&config.nats_url, "sbs-relay-dump").await?;
    let mut subscriber = client
        .subscribe(config.subject.clone())
        .await
        .with_context(|| format!("Failed to subscribe to {}", config.subject))?;

    while let Some(message) = subscriber.next().await {
        let text = match gzip::decompress(&message.payload) {
            Ok(text) => text,
            Err(e) => {
                warn!("Dropping batch that failed to decompress: {}", e);
                continue;
            }
        };

        let rendered = render_batch(&text, config.json);
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(rendered.as_bytes())
            .and_then(|()| stdout.flush())
            .context("Failed to write to stdout")?;
    }

    warn!("NATS subscription to {} closed", config.subject);
    Ok(())
}

/// Format one decompressed batch for output. Raw mode passes the text
/// through; JSON mode prints one object per parseable line.
fn render_batch(text: &str, json: bool) -> String {
    if !json {
        return text.to_string();
    }

    let mut out = String::new();
    for line in text.lines().filter(|l| !l.is_empty()) {
        match line.parse::<CompactMessage>() {
            Ok(message) => match serde_json::to_string(&message) {
                Ok(encoded) => {
                    out.push_str(&encoded);
                    out.push('\n');
                }
                Err(e) => warn!("Failed to serialize '{}': {}", line, e),
            },
            Err(e) => debug!("Skipping malformed line '{}': {}", line, e),
        }
    }
    out
}
