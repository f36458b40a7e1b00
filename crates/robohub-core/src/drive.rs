//! Joystick deflection to discrete robot move targets.
//!
//! A [`Translator`] turns a 2-D stick vector into one of four motions:
//! rotate in place left/right, or drive forward/backward by one step along
//! the robot's current heading. It remembers the last motion so a stick
//! held mostly vertical keeps translating instead of flickering into a
//! rotation when the thumb drifts sideways.

use crate::Pose;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Stick magnitude below which no command is produced.
pub const DEADZONE: f64 = 0.2;
/// While translating, vertical input above this pins `x` to zero.
pub const STICKY_Y_THRESHOLD: f64 = 0.1;
/// Heading change of a single rotate command.
pub const ROTATION_STEP_RAD: f64 = PI / 6.0;
/// Distance of a single translate command at 1.0 m/s.
pub const STEP_DISTANCE_M: f64 = 1.0;

/// Slowest speed a translator accepts, in m/s.
pub const MIN_SPEED: f64 = 0.1;
/// Fastest speed a translator accepts, in m/s.
pub const MAX_SPEED: f64 = 1.0;
/// Speed used when the operator picks none.
pub const DEFAULT_SPEED: f64 = 0.5;

/// Target tolerance of a forward or backward step.
pub const TRANSLATE_ACCURACY_M: f64 = 0.1;
/// Target tolerance of an in-place rotation.
pub const ROTATE_ACCURACY_M: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    RotateLeft,
    RotateRight,
    Forward,
    Backward,
}

impl CommandKind {
    #[must_use]
    pub fn is_translation(self) -> bool {
        matches!(self, Self::Forward | Self::Backward)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RotateLeft => "rotate_left",
            Self::RotateRight => "rotate_right",
            Self::Forward => "forward",
            Self::Backward => "backward",
        }
    }
}

/// Where the robot should go next, in map coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoveTarget {
    pub kind: CommandKind,
    pub x: f64,
    pub y: f64,
    pub ori: f64,
    pub accuracy: f64,
    pub inplace_rotate: bool,
}

#[derive(Debug, Clone)]
pub struct Translator {
    speed: f64,
    deadzone: f64,
    last: Option<CommandKind>,
}

impl Default for Translator {
    fn default() -> Self {
        Self::new(DEFAULT_SPEED)
    }
}

impl Translator {
    #[must_use]
    pub fn new(speed: f64) -> Self {
        Self { speed: clamp_speed(speed), deadzone: DEADZONE, last: None }
    }

    #[must_use]
    pub fn with_deadzone(mut self, deadzone: f64) -> Self {
        self.deadzone = deadzone.clamp(0.0, 1.0);
        self
    }

    pub fn set_speed(&mut self, speed: f64) {
        self.speed = clamp_speed(speed);
    }

    #[must_use]
    pub fn speed(&self) -> f64 {
        self.speed
    }

    #[must_use]
    pub fn last_kind(&self) -> Option<CommandKind> {
        self.last
    }

    /// Decides the motion for a stick vector and updates the memory cell.
    pub fn classify(&mut self, x: f64, y: f64) -> Option<CommandKind> {
        let mut x = x.clamp(-1.0, 1.0);
        let y = y.clamp(-1.0, 1.0);

        if x.hypot(y) < self.deadzone {
            self.last = None;
            return None;
        }

        if self.last.is_some_and(CommandKind::is_translation) && y.abs() > STICKY_Y_THRESHOLD {
            x = 0.0;
        }

        let kind = if x.abs() > y.abs() {
            if x > 0.0 { CommandKind::RotateRight } else { CommandKind::RotateLeft }
        } else if y > 0.0 {
            CommandKind::Forward
        } else {
            CommandKind::Backward
        };

        self.last = Some(kind);
        Some(kind)
    }

    /// Classifies the stick vector and computes the target relative to `pose`.
    pub fn translate(&mut self, x: f64, y: f64, pose: Pose) -> Option<MoveTarget> {
        let kind = self.classify(x, y)?;
        Some(self.target_for(kind, pose))
    }

    #[must_use]
    pub fn target_for(&self, kind: CommandKind, pose: Pose) -> MoveTarget {
        let step = self.speed * STEP_DISTANCE_M;
        match kind {
            CommandKind::RotateRight => MoveTarget {
                kind,
                x: pose.x,
                y: pose.y,
                ori: wrap_angle(pose.ori - ROTATION_STEP_RAD),
                accuracy: ROTATE_ACCURACY_M,
                inplace_rotate: true,
            },
            CommandKind::RotateLeft => MoveTarget {
                kind,
                x: pose.x,
                y: pose.y,
                ori: wrap_angle(pose.ori + ROTATION_STEP_RAD),
                accuracy: ROTATE_ACCURACY_M,
                inplace_rotate: true,
            },
            CommandKind::Forward | CommandKind::Backward => {
                let sign = if kind == CommandKind::Forward { 1.0 } else { -1.0 };
                MoveTarget {
                    kind,
                    x: pose.x + sign * step * pose.ori.cos(),
                    y: pose.y + sign * step * pose.ori.sin(),
                    ori: wrap_angle(pose.ori),
                    accuracy: TRANSLATE_ACCURACY_M,
                    inplace_rotate: false,
                }
            }
        }
    }

    /// Stick released: forget the last motion.
    pub fn release(&mut self) {
        self.last = None;
    }
}

fn clamp_speed(speed: f64) -> f64 {
    if speed.is_nan() { DEFAULT_SPEED } else { speed.clamp(MIN_SPEED, MAX_SPEED) }
}

/// Wraps an angle into `(-PI, PI]`.
#[must_use]
pub fn wrap_angle(angle: f64) -> f64 {
    let mut wrapped = angle % (2.0 * PI);
    if wrapped <= -PI {
        wrapped += 2.0 * PI;
    } else if wrapped > PI {
        wrapped -= 2.0 * PI;
    }
    wrapped
}
