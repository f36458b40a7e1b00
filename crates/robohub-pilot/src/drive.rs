//! Holding a joystick deflection against a live robot.
//!
//! Every poll tick translates the held stick into one move command. A tick
//! that lands while the previous command is still in flight is skipped, so
//! a slow robot never receives a backlog. Releasing the stick always ends
//! with an explicit cancel, whatever happened before.

use crate::client::ControlPlane;
use robohub_core::drive::Translator;
use robohub_protocol::MoveCommand;
use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

pub const STOP_ATTEMPTS: usize = 2;

/// Single-slot guard: at most one move command in flight.
#[derive(Clone, Default)]
pub struct CommandGate {
    busy: Arc<AtomicBool>,
}

impl CommandGate {
    pub fn try_acquire(&self) -> Option<GatePass> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GatePass { busy: Arc::clone(&self.busy) })
    }
}

pub struct GatePass {
    busy: Arc<AtomicBool>,
}

impl Drop for GatePass {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Stick {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DriveReport {
    pub sent: usize,
    pub failed: usize,
    pub skipped_busy: usize,
    pub idle_ticks: usize,
    pub stopped: bool,
}

/// Drives until `release` resolves, then sends the stop command.
pub async fn hold(
    plane: Arc<ControlPlane>,
    serial_number: &str,
    stick: Stick,
    speed: f64,
    interval: Duration,
    release: impl Future<Output = ()>,
) -> DriveReport {
    let mut translator = Translator::new(speed);
    let gate = CommandGate::default();
    let mut in_flight: JoinSet<bool> = JoinSet::new();
    let mut report = DriveReport::default();
    let mut ticker = tokio::time::interval(interval);
    tokio::pin!(release);

    info!(serial_number, x = stick.x, y = stick.y, speed = translator.speed(), "stick engaged");

    loop {
        tokio::select! {
            () = &mut release => break,
            _ = ticker.tick() => {
                while let Some(joined) = in_flight.try_join_next() {
                    tally(&mut report, joined.unwrap_or(false));
                }

                let Some(kind) = translator.classify(stick.x, stick.y) else {
                    report.idle_ticks += 1;
                    continue;
                };
                let Some(pass) = gate.try_acquire() else {
                    debug!(serial_number, "previous command still in flight, skipping tick");
                    report.skipped_busy += 1;
                    continue;
                };

                let plane = Arc::clone(&plane);
                let serial_number = serial_number.to_string();
                let snapshot = translator.clone();
                in_flight.spawn(async move {
                    let _pass = pass;
                    let pose = match plane.position(&serial_number).await {
                        Ok(pose) => pose,
                        Err(err) => {
                            warn!(%serial_number, error = %err, "pose unavailable, move skipped");
                            return false;
                        }
                    };
                    let target = snapshot.target_for(kind, pose);
                    match plane.send_move(&serial_number, &MoveCommand::from(&target)).await {
                        Ok(_) => {
                            debug!(%serial_number, kind = kind.as_str(), "move sent");
                            true
                        }
                        Err(err) => {
                            warn!(%serial_number, kind = kind.as_str(), error = %err, "move failed");
                            false
                        }
                    }
                });
            }
        }
    }

    translator.release();
    while let Some(joined) = in_flight.join_next().await {
        tally(&mut report, joined.unwrap_or(false));
    }
    report.stopped = stop(&plane, serial_number).await;
    info!(
        serial_number,
        sent = report.sent,
        failed = report.failed,
        skipped = report.skipped_busy,
        stopped = report.stopped,
        "stick released"
    );
    report
}

fn tally(report: &mut DriveReport, sent: bool) {
    if sent {
        report.sent += 1;
    } else {
        report.failed += 1;
    }
}

/// Best effort: one retry, never an error.
pub async fn stop(plane: &ControlPlane, serial_number: &str) -> bool {
    for attempt in 1..=STOP_ATTEMPTS {
        match plane.cancel_move(serial_number).await {
            Ok(_) => {
                info!(serial_number, attempt, "stop sent");
                return true;
            }
            Err(err) => warn!(serial_number, attempt, error = %err, "stop failed"),
        }
    }
    false
}
