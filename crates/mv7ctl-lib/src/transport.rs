//! Text-over-HID transport: fixed 64-byte reports carrying NUL-terminated
//! ASCII commands and replies. No protocol knowledge lives here.

use std::sync::Mutex;
use std::time::Duration;

use crate::device::{DeviceError, Result};
use crate::protocol::{MAX_COMMAND_LEN, REPORT_SIZE};

// ── Trait ──

/// One duplex text channel to the device.
///
/// The underlying HID stream is not request/response correlated: replies
/// and unsolicited updates arrive interleaved. The engine therefore reads
/// only from its listener thread and serializes writes.
pub trait Transport: Send + Sync {
    /// Frame and write one command as a single output report.
    /// An I/O failure is fatal to the connection.
    fn send(&self, command: &str) -> Result<()>;

    /// Read one input report, blocking up to `timeout` (or indefinitely
    /// when unset). Returns `Ok(None)` on timeout or empty read. Callers
    /// loop explicitly; there is no retry logic.
    fn receive(&self, timeout: Option<Duration>) -> Result<Option<String>>;
}

// ── Frame codec ──

/// Frame an outbound command: truncate to 63 bytes, NUL-terminate, zero-pad.
pub fn frame_command(command: &str) -> [u8; REPORT_SIZE] {
    let mut frame = [0u8; REPORT_SIZE];
    let bytes = command.as_bytes();
    let len = bytes.len().min(MAX_COMMAND_LEN);
    frame[..len].copy_from_slice(&bytes[..len]);
    frame
}

/// Decode an inbound report: text up to the first NUL byte.
pub fn decode_report(report: &[u8]) -> String {
    let end = report.iter().position(|&b| b == 0).unwrap_or(report.len());
    String::from_utf8_lossy(&report[..end]).into_owned()
}

// ── hidapi implementation ──

/// Transport over a hidapi device handle.
pub struct TextHid {
    device: hidapi::HidDevice,
    /// Serializes concurrent writers; reads come only from the listener.
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for TextHid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextHid").finish_non_exhaustive()
    }
}

// The hidapi C library is thread-safe: one thread may block in hid_read
// while another writes the same handle. The engine keeps reads on its
// listener thread and serializes writers through `write_lock`.
unsafe impl Send for TextHid {}
unsafe impl Sync for TextHid {}

impl TextHid {
    pub fn new(device: hidapi::HidDevice) -> Self {
        TextHid {
            device,
            write_lock: Mutex::new(()),
        }
    }
}

impl Transport for TextHid {
    fn send(&self, command: &str) -> Result<()> {
        let frame = frame_command(command);
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        // hidapi expects the report id as the first byte on macOS and
        // Windows; the MV7 uses unnumbered reports (id 0). Linux hidraw
        // takes the bare frame.
        #[cfg(any(target_os = "macos", target_os = "windows"))]
        let written = {
            let mut data = Vec::with_capacity(REPORT_SIZE + 1);
            data.push(0x00);
            data.extend_from_slice(&frame);
            self.device.write(&data)
        };
        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        let written = self.device.write(&frame);

        written.map_err(|e| DeviceError::WriteFailed(format!("{e}")))?;
        Ok(())
    }

    fn receive(&self, timeout: Option<Duration>) -> Result<Option<String>> {
        let timeout_ms = match timeout {
            Some(t) => t.as_millis().min(i32::MAX as u128) as i32,
            None => -1,
        };
        let mut report = [0u8; REPORT_SIZE];
        let read = self
            .device
            .read_timeout(&mut report, timeout_ms)
            .map_err(|e| DeviceError::ReadFailed(format!("{e}")))?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(decode_report(&report[..read])))
    }
}

// ── Mock transport for testing ──

/// In-memory transport for unit and integration tests.
///
/// Always compiled (zero runtime cost), hidden from public docs.
#[doc(hidden)]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Condvar, Weak};
    use std::time::Instant;

    type Responder = Arc<dyn Fn(&str) -> Vec<String> + Send + Sync>;

    #[derive(Default)]
    struct Inner {
        sent: Vec<String>,
        inbound: VecDeque<String>,
        responder: Option<Responder>,
        send_error: Option<String>,
    }

    #[derive(Default)]
    struct Shared {
        inner: Mutex<Inner>,
        available: Condvar,
    }

    /// The transport half, moved into the engine under test.
    pub struct MockTransport {
        shared: Arc<Shared>,
    }

    /// The test's control half: scripts inbound traffic and inspects
    /// outbound commands. Holds only a weak reference so transport drop
    /// (engine close) is observable.
    pub struct MockHandle {
        shared: Weak<Shared>,
    }

    /// Create a connected transport/handle pair.
    pub fn pair() -> (MockTransport, MockHandle) {
        let shared = Arc::new(Shared::default());
        let handle = MockHandle {
            shared: Arc::downgrade(&shared),
        };
        (MockTransport { shared }, handle)
    }

    impl MockHandle {
        fn shared(&self) -> Option<Arc<Shared>> {
            self.shared.upgrade()
        }

        /// Queue an inbound message, waking any blocked receive.
        pub fn push_message(&self, message: &str) {
            if let Some(shared) = self.shared() {
                let mut inner = shared.inner.lock().unwrap();
                inner.inbound.push_back(message.to_string());
                shared.available.notify_all();
            }
        }

        /// Install a responder invoked on every send; its return values are
        /// queued as inbound messages.
        pub fn set_responder(
            &self,
            responder: impl Fn(&str) -> Vec<String> + Send + Sync + 'static,
        ) {
            if let Some(shared) = self.shared() {
                shared.inner.lock().unwrap().responder = Some(Arc::new(responder));
            }
        }

        /// Make the next send fail with the given reason.
        pub fn fail_next_send(&self, reason: &str) {
            if let Some(shared) = self.shared() {
                shared.inner.lock().unwrap().send_error = Some(reason.to_string());
            }
        }

        /// Every command sent so far, in order.
        pub fn sent(&self) -> Vec<String> {
            self.shared()
                .map(|s| s.inner.lock().unwrap().sent.clone())
                .unwrap_or_default()
        }

        /// How many times a command was sent.
        pub fn sent_count(&self, command: &str) -> usize {
            self.sent().iter().filter(|c| *c == command).count()
        }

        pub fn clear_sent(&self) {
            if let Some(shared) = self.shared() {
                shared.inner.lock().unwrap().sent.clear();
            }
        }

        /// Whether the transport half is still alive (engine not closed).
        pub fn transport_alive(&self) -> bool {
            self.shared.strong_count() > 0
        }
    }

    impl Transport for MockTransport {
        fn send(&self, command: &str) -> Result<()> {
            let responder = {
                let mut inner = self.shared.inner.lock().unwrap();
                if let Some(reason) = inner.send_error.take() {
                    return Err(DeviceError::WriteFailed(reason));
                }
                inner.sent.push(command.to_string());
                inner.responder.clone()
            };
            if let Some(respond) = responder {
                let replies = respond(command);
                if !replies.is_empty() {
                    let mut inner = self.shared.inner.lock().unwrap();
                    inner.inbound.extend(replies);
                    self.shared.available.notify_all();
                }
            }
            Ok(())
        }

        fn receive(&self, timeout: Option<Duration>) -> Result<Option<String>> {
            let mut inner = self.shared.inner.lock().unwrap();
            match timeout {
                None => loop {
                    if let Some(message) = inner.inbound.pop_front() {
                        return Ok(Some(message));
                    }
                    inner = self.shared.available.wait(inner).unwrap();
                },
                Some(limit) => {
                    let deadline = Instant::now() + limit;
                    loop {
                        if let Some(message) = inner.inbound.pop_front() {
                            return Ok(Some(message));
                        }
                        let now = Instant::now();
                        if now >= deadline {
                            return Ok(None);
                        }
                        let (guard, _) = self
                            .shared
                            .available
                            .wait_timeout(inner, deadline - now)
                            .unwrap();
                        inner = guard;
                    }
                }
            }
        }
    }
}
