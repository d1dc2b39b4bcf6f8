use std::io::{BufRead, BufReader, Write};

use anyhow::Context;
use clap::Parser;
use volley::config::{Args, Config};
use volley::{telemetry, Dispatcher, Notification, Response, Transport};

/// Wait for Ctrl+C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received Ctrl+C, abandoning batch...");
}

/// Read one notification per non-empty line.
fn read_notifications(args: &Args) -> anyhow::Result<Vec<Notification>> {
    let reader: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(
            std::fs::File::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(std::io::stdin())),
    };

    let mut notifications = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("failed to read input")?;
        if line.trim().is_empty() {
            continue;
        }
        let notification: Notification = serde_json::from_str(&line)
            .with_context(|| format!("invalid notification on line {}", index + 1))?;
        notifications.push(notification);
    }
    Ok(notifications)
}

async fn deliver<T: Transport>(
    dispatcher: &mut Dispatcher<T>,
    notifications: Vec<Notification>,
    single: bool,
) -> anyhow::Result<Vec<Response>> {
    if !single {
        return Ok(dispatcher.push(notifications).await?);
    }

    let mut responses = Vec::with_capacity(notifications.len());
    for notification in notifications {
        responses.push(dispatcher.push_one(notification).await);
    }
    Ok(responses)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args)?;
    config.validate()?;

    if args.validate {
        println!("Configuration is valid.");
        return Ok(());
    }

    telemetry::init_telemetry(config.log_format)?;
    tracing::debug!("{:?}", args);

    let notifications = read_notifications(&args)?;
    let submitted = notifications.len();
    let mut dispatcher = config.dispatcher()?;

    let responses = tokio::select! {
        result = deliver(&mut dispatcher, notifications, args.single) => result?,
        _ = shutdown_signal() => Vec::new(),
    };
    dispatcher.close();

    let mut stdout = std::io::stdout().lock();
    for response in &responses {
        serde_json::to_writer(&mut stdout, response)?;
        writeln!(stdout)?;
    }
    stdout.flush()?;

    let delivered = responses.iter().filter(|r| r.is_success()).count();
    let undetermined = responses.iter().filter(|r| r.is_undetermined()).count();
    tracing::info!(
        submitted,
        answered = responses.len(),
        delivered,
        undetermined,
        "Batch complete"
    );

    Ok(())
}
