//! ingest-worker — drains S3 object notifications into DynamoDB.
//!
//! Modes:
//! - `run`: long-poll the notification queue until interrupted
//! - `once`: process one notification body read from a file or stdin
//! - `sweep`: ingest every payload still present in a bucket

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::Notify;
use tracing::{error, info, warn};

use ticksink_core::Config;
use ticksink_ingest::{Ingestor, InvocationReport};
use ticksink_queue::{parse_batch, parse_notifications, QueueConsumer, QueueMessage, SqsConsumer};
use ticksink_storage::{BucketStores, DynamoKvStore, StorageBackend};

// ── CLI ─────────────────────────────────────────────────────────────

/// Idempotent tick and fundamentals ingestion worker.
#[derive(Parser, Debug)]
#[command(name = "ingest-worker", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Consume notifications from the configured queue.
    Run {
        /// Pause after a failed poll, in seconds.
        #[arg(long, env = "QUEUE_RETRY_DELAY_SECS", default_value_t = 5)]
        retry_delay: u64,
    },
    /// Process a single notification body and print the report.
    Once {
        /// File holding the notification JSON ("-" for stdin).
        #[arg(default_value = "-")]
        event: PathBuf,
    },
    /// Ingest every pending payload in a bucket.
    Sweep {
        #[arg(long, env = "SOURCE_BUCKET")]
        bucket: String,
    },
}

// ── Queue loop ──────────────────────────────────────────────────────

struct QueueWorker {
    ingestor: Ingestor,
    consumer: SqsConsumer,
    max_messages: u32,
    retry_delay: Duration,
    shutdown: Arc<Notify>,
}

impl QueueWorker {
    async fn run_loop(&self) {
        loop {
            tokio::select! {
                result = self.consumer.poll_batch(self.max_messages) => {
                    match result {
                        Ok(messages) if messages.is_empty() => {}
                        Ok(messages) => self.process(&messages).await,
                        Err(e) => {
                            warn!(error = %e, "queue poll failed");
                            tokio::time::sleep(self.retry_delay).await;
                        }
                    }
                }
                _ = self.shutdown.notified() => {
                    info!("ingest worker queue loop shutting down");
                    break;
                }
            }
        }
    }

    /// Each message is acked only when every object it names was skipped or
    /// ingested. Anything else is released for redelivery.
    async fn process(&self, messages: &[QueueMessage]) {
        let (parsed, unparsed) = parse_batch(messages);

        for (msg, _) in unparsed {
            self.release(msg).await;
        }

        for (msg, objects) in parsed {
            let report = self.ingestor.handle(&objects).await;
            if report.is_success() {
                if let Err(e) = self.consumer.ack(&msg.receipt_handle).await {
                    warn!(message_id = %msg.id, error = %e, "ack failed");
                }
            } else {
                warn!(
                    message_id = %msg.id,
                    attempt = msg.attempt_count,
                    failed = report.failed(),
                    "notification not fully ingested, releasing"
                );
                self.release(msg).await;
            }
        }
    }

    async fn release(&self, msg: &QueueMessage) {
        if let Err(e) = self.consumer.nack(&msg.receipt_handle).await {
            warn!(message_id = %msg.id, error = %e, "nack failed");
        }
    }
}

// ── main ────────────────────────────────────────────────────────────

async fn build_ingestor(config: &Config) -> anyhow::Result<Ingestor> {
    let backend = StorageBackend::from_config(&config.objects, &config.aws)
        .context("invalid object store configuration")?;
    let objects = Arc::new(BucketStores::new(backend));
    let kv = Arc::new(DynamoKvStore::new(&config.aws).await);
    Ok(Ingestor::new(
        objects,
        kv,
        config.tables.clone(),
        config.ingest.clone(),
    ))
}

fn read_event(path: &PathBuf) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut body = String::new();
        std::io::stdin()
            .read_to_string(&mut body)
            .context("failed to read notification from stdin")?;
        return Ok(body);
    }
    std::fs::read_to_string(path)
        .with_context(|| format!("failed to read notification from {}", path.display()))
}

fn finish(report: &InvocationReport) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    if !report.is_success() {
        anyhow::bail!("{} object(s) failed to ingest", report.failed());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ticksink_core::config::load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    config.log_summary();

    let ingestor = build_ingestor(&config).await?;

    match cli.command {
        Command::Run { retry_delay } => {
            let consumer = SqsConsumer::new(&config.aws, &config.queue).await?;
            let shutdown = Arc::new(Notify::new());
            let worker = Arc::new(QueueWorker {
                ingestor,
                consumer,
                max_messages: config.queue.max_messages,
                retry_delay: Duration::from_secs(retry_delay),
                shutdown: shutdown.clone(),
            });

            let loop_worker = worker.clone();
            let handle = tokio::spawn(async move { loop_worker.run_loop().await });

            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for shutdown signal")?;
            info!("shutdown requested");
            shutdown.notify_one();

            if let Err(e) = handle.await {
                error!(error = %e, "queue loop terminated abnormally");
            }
            info!("ingest-worker exited cleanly");
            Ok(())
        }
        Command::Once { event } => {
            let body = read_event(&event)?;
            let objects = parse_notifications(&body)?;
            info!(count = objects.len(), "notification parsed");
            finish(&ingestor.handle(&objects).await)
        }
        Command::Sweep { bucket } => {
            let report = ingestor.sweep(&bucket).await?;
            finish(&report)
        }
    }
}
