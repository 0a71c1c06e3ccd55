//! Restriction passcode recovery.
//!
//! Enters every admissible 4-digit code on the device keypad over an open
//! session. The device never says whether a code was right, so this is a
//! blind generator: the operator watches the screen and stops the process.
//!
//! Codes are generated in scan-code table order, most significant digit
//! first. Codes below [`PASSCODE_FLOOR`] are skipped without being sent.
//! Each digit is followed by [`KEY_SPACING`] except the last, and every
//! attempt is followed by [`ATTEMPT_SETTLE`].

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{info, instrument};

use crate::error::RemoteError;
use crate::events::{SessionEvent, SessionObserver};
use crate::protocol::constants::{DIGIT_SCAN_CODES, USAGE_PAGE_KEYBOARD};
use crate::transport::DeviceSession;

/// Lowest code the device accepts.
pub const PASSCODE_FLOOR: u16 = 300;
/// Gap between digits of one attempt.
pub const KEY_SPACING: Duration = Duration::from_millis(200);
/// Gap after an attempt before the next one starts.
pub const ATTEMPT_SETTLE: Duration = Duration::from_millis(1000);

const SCAN_CODE_OFFSET: u16 = 29;

/// Decimal digit a keypad scan code stands for.
///
/// `code - 29`, with anything above 9 read as 0: the '0' key sits after '9'
/// in the scan-code numbering.
pub fn digit(scan_code: u16) -> u8 {
    let value = scan_code.saturating_sub(SCAN_CODE_OFFSET);
    if value > 9 { 0 } else { value as u8 }
}

/// Four keypad scan codes, most significant first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasscodeAttempt {
    pub scan_codes: [u16; 4],
}

impl PasscodeAttempt {
    pub fn digits(&self) -> [u8; 4] {
        self.scan_codes.map(digit)
    }

    /// Numeric value of the code, e.g. 0300 -> 300.
    pub fn value(&self) -> u16 {
        self.digits()
            .iter()
            .fold(0u16, |acc, &d| acc * 10 + u16::from(d))
    }
}

impl fmt::Display for PasscodeAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for d in self.digits() {
            write!(f, "{d}")?;
        }
        Ok(())
    }
}

/// Every 4-code combination of the table, in nested table order.
pub fn candidates() -> impl Iterator<Item = PasscodeAttempt> {
    let n = DIGIT_SCAN_CODES.len();
    (0..n.pow(4)).map(move |i| PasscodeAttempt {
        scan_codes: [
            DIGIT_SCAN_CODES[i / (n * n * n)],
            DIGIT_SCAN_CODES[(i / (n * n)) % n],
            DIGIT_SCAN_CODES[(i / n) % n],
            DIGIT_SCAN_CODES[i % n],
        ],
    })
}

/// The candidates that are actually sent.
pub fn admissible() -> impl Iterator<Item = PasscodeAttempt> {
    candidates().filter(|attempt| attempt.value() >= PASSCODE_FLOOR)
}

/// Source of the deliberate waits between key presses.
pub trait Pacer {
    fn pause(&mut self, duration: Duration);
}

/// Sleeps the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Blind brute-force over the passcode keypad.
pub struct PasscodeRecovery<P: Pacer> {
    pacer: P,
    observer: Arc<dyn SessionObserver>,
}

impl PasscodeRecovery<ThreadPacer> {
    pub fn new(observer: Arc<dyn SessionObserver>) -> Self {
        Self::with_pacer(ThreadPacer, observer)
    }
}

impl<P: Pacer> PasscodeRecovery<P> {
    pub fn with_pacer(pacer: P, observer: Arc<dyn SessionObserver>) -> Self {
        Self { pacer, observer }
    }

    /// Enter every admissible code; returns how many were sent.
    ///
    /// A transport error aborts the search: carrying on would leave the
    /// keypad out of step with the generated codes.
    #[instrument(skip_all, fields(device = %session.device_id()))]
    pub fn run<S: DeviceSession>(&mut self, session: &mut S) -> Result<usize, RemoteError> {
        let mut sent = 0;
        for attempt in admissible() {
            self.enter(session, &attempt)?;
            sent += 1;
        }
        info!(attempts = sent, "Passcode search exhausted");
        Ok(sent)
    }

    fn enter<S: DeviceSession>(
        &mut self,
        session: &mut S,
        attempt: &PasscodeAttempt,
    ) -> Result<(), RemoteError> {
        let last = attempt.scan_codes.len() - 1;
        for (i, &code) in attempt.scan_codes.iter().enumerate() {
            session.send_key_press_and_release(USAGE_PAGE_KEYBOARD, code)?;
            if i < last {
                self.pacer.pause(KEY_SPACING);
            }
        }
        self.observer.on_event(&SessionEvent::PasscodeAttempt {
            code: attempt.to_string(),
        });
        self.pacer.pause(ATTEMPT_SETTLE);
        Ok(())
    }
}
