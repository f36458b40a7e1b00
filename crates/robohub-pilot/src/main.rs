mod client;
mod drive;
mod feed;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client::ControlPlane;
use drive::Stick;
use feed::TaskFeed;
use robohub_core::{TaskId, TaskType, drive::DEFAULT_SPEED};
use robohub_protocol::CreateTaskRequest;
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "robohub-pilot", about = "Drive robots and follow the task queue")]
struct Cli {
    #[arg(long, default_value = "http://127.0.0.1:8800")]
    control_plane: String,
    /// Joystick resend and task polling period.
    #[arg(long, default_value_t = 400)]
    poll_interval_ms: u64,
    #[arg(long, default_value_t = 5_000)]
    timeout_ms: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Hold a stick deflection, then release with a stop.
    Drive {
        #[arg(long)]
        serial: String,
        #[arg(long, allow_negative_numbers = true)]
        x: f64,
        #[arg(long, allow_negative_numbers = true)]
        y: f64,
        /// m/s, clamped to 0.1..=1.0
        #[arg(long, default_value_t = DEFAULT_SPEED)]
        speed: f64,
        #[arg(long, default_value_t = 1_200)]
        hold_ms: u64,
    },
    Stop {
        #[arg(long)]
        serial: String,
    },
    /// Follow task changes.
    Watch,
    Tasks {
        #[command(subcommand)]
        command: TaskCommand,
    },
}

#[derive(Debug, Subcommand)]
enum TaskCommand {
    List {
        #[arg(long)]
        serial: Option<String>,
    },
    Create {
        #[arg(long)]
        serial: String,
        #[arg(long, value_parser = parse_task_type)]
        task_type: TaskType,
        #[arg(long)]
        priority: Option<i64>,
    },
    Complete {
        #[arg(long)]
        id: i64,
    },
    Cancel {
        #[arg(long)]
        id: i64,
    },
    /// First id gets the highest priority.
    Reorder {
        #[arg(long, value_delimiter = ',', required = true)]
        ids: Vec<i64>,
    },
}

fn parse_task_type(raw: &str) -> Result<TaskType, String> {
    TaskType::parse(&raw.to_ascii_uppercase().replace('-', "_"))
        .ok_or_else(|| format!("unknown task type {raw}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let interval = Duration::from_millis(cli.poll_interval_ms.max(1));
    let plane = Arc::new(ControlPlane::new(&cli.control_plane, Duration::from_millis(cli.timeout_ms))?);

    match cli.command {
        Command::Drive { serial, x, y, speed, hold_ms } => {
            let release = async move {
                tokio::select! {
                    () = tokio::time::sleep(Duration::from_millis(hold_ms)) => {}
                    _ = tokio::signal::ctrl_c() => info!("interrupted, releasing stick"),
                }
            };
            let report = drive::hold(plane, &serial, Stick { x, y }, speed, interval, release).await;
            if !report.stopped {
                warn!(%serial, "stop command could not be delivered");
            }
        }
        Command::Stop { serial } => {
            if !drive::stop(&plane, &serial).await {
                warn!(%serial, "stop command could not be delivered");
            }
        }
        Command::Watch => {
            let (tx, mut rx) = mpsc::channel(16);
            let feed = TaskFeed::new(Arc::clone(&plane), interval);
            let runner = tokio::spawn(async move { feed.run(tx).await });
            loop {
                tokio::select! {
                    event = rx.recv() => {
                        let Some(event) = event else { break };
                        let pending = event
                            .tasks
                            .iter()
                            .filter(|t| t.status == robohub_core::TaskStatus::Pending)
                            .count();
                        info!(source = ?event.source, total = event.tasks.len(), pending, "task list refreshed");
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            runner.abort();
        }
        Command::Tasks { command } => run_task_command(&plane, command).await?,
    }

    Ok(())
}

async fn run_task_command(plane: &ControlPlane, command: TaskCommand) -> Result<()> {
    match command {
        TaskCommand::List { serial } => {
            for task in plane.tasks(serial.as_deref()).await? {
                info!(
                    task_id = %task.id,
                    serial_number = %task.serial_number,
                    task_type = task.task_type.as_str(),
                    status = task.status.as_str(),
                    priority = task.priority,
                    "task"
                );
            }
        }
        TaskCommand::Create { serial, task_type, priority } => {
            let task = plane
                .create_task(&CreateTaskRequest {
                    serial_number: serial,
                    task_type,
                    priority,
                    template_id: None,
                    parameters: None,
                })
                .await?;
            info!(task_id = %task.id, "task created");
        }
        TaskCommand::Complete { id } => {
            let response = plane.complete_task(TaskId(id)).await?;
            info!(task_id = %response.completed.id, "task completed");
            if let Some(promoted) = response.promoted {
                info!(task_id = %promoted.id, "pickup promoted");
            }
        }
        TaskCommand::Cancel { id } => {
            let task = plane.cancel_task(TaskId(id)).await?;
            info!(task_id = %task.id, status = task.status.as_str(), "task cancelled");
        }
        TaskCommand::Reorder { ids } => {
            let tasks = plane.reorder(ids.into_iter().map(TaskId).collect()).await?;
            for task in tasks {
                info!(task_id = %task.id, priority = task.priority, "reprioritized");
            }
        }
    }
    Ok(())
}
