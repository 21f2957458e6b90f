//! intake CLI — feed events through the intake service from the terminal.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use intake_rs::config::Config;
use intake_rs::error::Error;
use intake_rs::model::EventRequest;
use intake_rs::service::{IntakeService, SubmitResult};
use intake_rs::telemetry::{TelemetryConfig, init_telemetry};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

#[derive(Parser)]
#[command(name = "intake", about = "Idempotent event intake")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit newline-delimited JSON events, then drain and report
    Run {
        /// Read events from this file instead of stdin
        #[arg(long)]
        input: Option<PathBuf>,
        /// Override PROCESSING_DELAY_MS
        #[arg(long)]
        delay_ms: Option<u64>,
        /// Override QUEUE_CAPACITY
        #[arg(long)]
        capacity: Option<usize>,
    },
    /// Print the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    match cli.command {
        Command::Run {
            input,
            delay_ms,
            capacity,
        } => {
            if let Some(ms) = delay_ms {
                config.worker.processing_delay = Duration::from_millis(ms);
            }
            if let Some(n) = capacity {
                anyhow::ensure!(n > 0, "--capacity must be positive");
                config.worker.queue_capacity = n;
            }
            cmd_run(config, input).await
        }
        Command::Config => {
            cmd_config(&config);
            Ok(())
        }
    }
}

type Input = Box<dyn AsyncRead + Unpin + Send>;

async fn cmd_run(config: Config, input: Option<PathBuf>) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "intake".to_string(),
        log_level: config.log_level.clone(),
    })?;

    tracing::info!(env = %config.environment, "intake starting");

    let reader: Input = match input {
        Some(path) => Box::new(tokio::fs::File::open(&path).await?),
        None => Box::new(tokio::io::stdin()),
    };

    let service = IntakeService::new(config.worker);
    let (submitted, result) = drive(&service, reader).await;
    print_report(&service, submitted);
    result
}

/// Open intake, feed `reader` through it, then always close and drain.
///
/// Returns the number of lines read alongside the first error hit by either
/// the feed or the shutdown.
async fn drive(service: &IntakeService, reader: Input) -> (usize, anyhow::Result<()>) {
    service.start_all().await;

    let mut count = 0usize;
    let fed = feed(service, reader, &mut count).await;
    if let Err(e) = &fed {
        tracing::error!("input stopped early: {e:#}");
    }

    let drained = service.shutdown_all().await.map_err(anyhow::Error::from);
    (count, fed.and(drained))
}

/// Submit one event per input line until EOF or Ctrl-C, counting lines read.
async fn feed<R>(service: &IntakeService, reader: R, count: &mut usize) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let line = tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("received Ctrl+C, closing intake");
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        *count += 1;
        let n = *count;

        let request: EventRequest = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(e) => {
                println!("line {n}: invalid: {e}");
                continue;
            }
        };

        match service.submit(request.event_id.clone(), request.payload).await {
            Ok(SubmitResult::Accepted(record)) => println!("{}: accepted", record.event_id),
            Ok(SubmitResult::Conflict { event_id, status }) => {
                println!("{event_id}: conflict (already {status})")
            }
            Err(Error::InvalidInput(reason)) => println!("line {n}: invalid: {reason}"),
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

fn print_report(service: &IntakeService, submitted: usize) {
    let mut events = service.list_all();
    events.sort_by_key(|e| e.accepted_at);

    println!();
    println!("{:<32}  {:<10}  PAYLOAD", "EVENT_ID", "STATUS");
    println!("{}", "-".repeat(80));
    for event in &events {
        println!(
            "{:<32}  {:<10}  {}",
            event.event_id,
            event.status.to_string(),
            event.payload
        );
    }

    let processed = events.iter().filter(|e| e.status.is_terminal()).count();
    let health = service.health();
    println!(
        "\n{} line(s) read, {} event(s) accepted, {} processed, uptime {:.3}s",
        submitted,
        events.len(),
        processed,
        health.uptime.as_secs_f64()
    );
}

fn cmd_config(config: &Config) {
    println!("Env:              {}", config.environment);
    println!("Log Level:        {}", config.log_level);
    println!(
        "OTel Endpoint:    {}",
        config.otel_endpoint.as_deref().unwrap_or("-")
    );
    println!(
        "Processing Delay: {}ms",
        config.worker.processing_delay.as_millis()
    );
    println!("Queue Capacity:   {}", config.worker.queue_capacity);
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_rs::config::WorkerConfig;
    use intake_rs::model::EventStatus;

    fn quick_service() -> IntakeService {
        IntakeService::new(WorkerConfig {
            processing_delay: Duration::from_millis(10),
            queue_capacity: 8,
        })
    }

    #[tokio::test]
    async fn drive_drains_accepted_events_when_input_breaks() {
        let service = quick_service();
        let mut bytes = br#"{"event_id":"evt_ok","payload":{"n":1}}"#.to_vec();
        bytes.push(b'\n');
        bytes.extend_from_slice(&[0xff, 0xfe, b'\n']);
        let reader: Input = Box::new(std::io::Cursor::new(bytes));

        let (lines, result) = drive(&service, reader).await;

        assert!(result.is_err(), "invalid UTF-8 should surface as an error");
        assert_eq!(lines, 1);
        assert_eq!(service.get_status("evt_ok"), Some(EventStatus::Processed));
        assert!(!service.is_ready());
    }

    #[tokio::test]
    async fn drive_reads_to_eof_and_drains() {
        let service = quick_service();
        let input = concat!(
            "{\"event_id\":\"evt_a\",\"payload\":{}}\n",
            "\n",
            "not json\n",
            "{\"event_id\":\"evt_a\",\"payload\":{}}\n",
            "{\"event_id\":\"evt_b\",\"payload\":[1,2]}\n",
        );
        let reader: Input = Box::new(std::io::Cursor::new(input.as_bytes().to_vec()));

        let (lines, result) = drive(&service, reader).await;

        assert!(result.is_ok());
        assert_eq!(lines, 4);
        assert_eq!(service.list_all().len(), 2);
        assert!(service.list_all().iter().all(|e| e.status.is_terminal()));
    }
}
