//! Joystick change throttle for the binary (extreme) mode

/// Minimum per-axis change that is worth a datagram
pub const JOYSTICK_THRESHOLD: f32 = 0.02;

/// Slack for f32 subtraction, so a change of exactly the threshold counts
const THRESHOLD_SLACK: f32 = 1e-6;

/// Suppresses joystick updates that barely moved
///
/// A vector is sent when either axis moved by at least
/// [`JOYSTICK_THRESHOLD`] since the last *sent* value, or when it enters or
/// leaves the exact zero vector (so a released stick always stops the peer).
#[derive(Debug, Clone, Default)]
pub struct JoystickThrottle {
    last_sent: Option<(f32, f32)>,
}

impl JoystickThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether `(x, y)` should be sent, recording it if so
    pub fn should_send(&mut self, x: f32, y: f32) -> bool {
        let send = match self.last_sent {
            None => true,
            Some((lx, ly)) => {
                let is_zero = x == 0.0 && y == 0.0;
                let was_zero = lx == 0.0 && ly == 0.0;
                is_zero != was_zero || moved(x, lx) || moved(y, ly)
            }
        };

        if send {
            self.last_sent = Some((x, y));
        }
        send
    }

    /// Last value that passed the throttle
    pub fn last_sent(&self) -> Option<(f32, f32)> {
        self.last_sent
    }

    /// Forget the last value; the next vector is always sent
    pub fn reset(&mut self) {
        self.last_sent = None;
    }
}

fn moved(value: f32, last: f32) -> bool {
    (value - last).abs() + THRESHOLD_SLACK >= JOYSTICK_THRESHOLD
}
