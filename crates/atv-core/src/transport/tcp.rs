//! TCP transport: pairing exchange and authenticated sessions.

use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::handshake::{PairingKeys, connect_proof, new_client_id, pair_proof};
use super::traits::{Ack, DeviceHandle, DeviceSession, TransportError};
use crate::credentials::Credential;
use crate::error::RemoteError;
use crate::events::{SessionEvent, SessionObserver};
use crate::protocol::{CodecError, Frame, KeyCode, QueueRequest, read_frame, write_frame};
use crate::subscription::{DeviceEvent, EventHub, EventKind, Subscription};

fn connect(addr: SocketAddr, timeout: Duration) -> Result<TcpStream, TransportError> {
    let stream = TcpStream::connect_timeout(&addr, timeout).map_err(|e| {
        TransportError::ConnectFailed {
            addr,
            message: e.to_string(),
        }
    })?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Read one frame during a handshake, mapping socket timeouts.
fn read_handshake_frame(
    stream: &mut TcpStream,
    waiting_for: &'static str,
    timeout: Duration,
) -> Result<Frame, TransportError> {
    match read_frame(stream) {
        Ok(frame) => Ok(frame),
        Err(CodecError::Io(e)) if is_timeout(&e) => Err(TransportError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
            waiting_for,
        }),
        Err(CodecError::Closed) => Err(TransportError::Disconnected),
        Err(e) => Err(e.into()),
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Run the pairing exchange against `device`.
///
/// `pin` is asked for once the device has answered, since that is when the
/// device shows it.
#[instrument(skip(pin, observer), fields(device = %device.device_id))]
pub fn pair(
    device: &DeviceHandle,
    connect_timeout: Duration,
    response_timeout: Duration,
    pin: &dyn Fn() -> io::Result<String>,
    observer: &dyn SessionObserver,
) -> Result<Credential, RemoteError> {
    let failed = |e: TransportError| RemoteError::HandshakeFailed(e.to_string());

    let mut stream = connect(device.address, connect_timeout).map_err(failed)?;
    stream
        .set_read_timeout(Some(response_timeout))
        .map_err(|e| failed(e.into()))?;

    let keys = PairingKeys::generate();
    let client_id = new_client_id();
    write_frame(
        &mut stream,
        &Frame::PairStart {
            client_id: client_id.clone(),
            public_key: hex::encode(keys.public.as_bytes()),
        },
    )
    .map_err(|e| failed(e.into()))?;
    observer.on_event(&SessionEvent::Debug {
        message: format!("Sent pair start as client {client_id}"),
    });

    let (device_id, device_public, salt) =
        match read_handshake_frame(&mut stream, "pair challenge", response_timeout)
            .map_err(failed)?
        {
            Frame::PairChallenge {
                device_id,
                public_key,
                salt,
            } => (device_id, public_key, salt),
            Frame::PairResult { reason, .. } => {
                return Err(RemoteError::HandshakeFailed(
                    reason.unwrap_or_else(|| "device refused pairing".into()),
                ));
            }
            other => {
                return Err(failed(TransportError::UnexpectedFrame {
                    expected: "pair_challenge",
                    actual: other.name().to_string(),
                }));
            }
        };
    if device_id != device.device_id {
        return Err(RemoteError::HandshakeFailed(format!(
            "device answered as {device_id}, expected {}",
            device.device_id
        )));
    }

    let device_public = hex::decode(&device_public)
        .map_err(|e| RemoteError::HandshakeFailed(format!("device public key: {e}")))?;
    let salt = hex::decode(&salt)
        .map_err(|e| RemoteError::HandshakeFailed(format!("device salt: {e}")))?;

    let pin = pin().map_err(|e| RemoteError::HandshakeFailed(format!("reading PIN: {e}")))?;
    let secret = keys
        .derive_secret(&device_public, &salt, pin.trim())
        .map_err(RemoteError::HandshakeFailed)?;

    write_frame(
        &mut stream,
        &Frame::PairVerify {
            proof: pair_proof(&secret),
        },
    )
    .map_err(|e| failed(e.into()))?;

    match read_handshake_frame(&mut stream, "pair result", response_timeout).map_err(failed)? {
        Frame::PairResult { ok: true, .. } => {}
        Frame::PairResult { ok: false, reason } => {
            return Err(RemoteError::HandshakeFailed(
                reason.unwrap_or_else(|| "PIN rejected".into()),
            ));
        }
        other => {
            return Err(failed(TransportError::UnexpectedFrame {
                expected: "pair_result",
                actual: other.name().to_string(),
            }));
        }
    }

    let _ = stream.shutdown(Shutdown::Both);
    info!(device_id = %device_id, "Pairing complete");

    Ok(Credential {
        device_id,
        client_id,
        public_key: keys.public.as_bytes().to_vec(),
        secret: secret.to_vec(),
    })
}

/// Authenticated session over TCP.
///
/// A reader thread owns the inbound half: responses go to a channel the
/// request methods wait on, pushed events go to the [`EventHub`], device
/// diagnostics go to the observer.
pub struct TcpSession {
    device_id: String,
    stream: TcpStream,
    responses: Receiver<Frame>,
    hub: EventHub,
    next_id: u32,
    response_timeout: Duration,
    reader: Option<thread::JoinHandle<()>>,
    closing: Arc<AtomicBool>,
    /// Cleared by the reader once the device side of the link is gone.
    link_up: Arc<AtomicBool>,
    closed: bool,
}

impl TcpSession {
    /// Connect and authenticate with `credential`.
    #[instrument(skip(credential, observer), fields(device = %device.device_id))]
    pub fn open(
        device: &DeviceHandle,
        credential: &Credential,
        connect_timeout: Duration,
        response_timeout: Duration,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<Self, RemoteError> {
        let mut stream = connect(device.address, connect_timeout)?;
        stream.set_read_timeout(Some(response_timeout)).map_err(TransportError::from)?;

        write_frame(
            &mut stream,
            &Frame::Hello {
                client_id: credential.client_id.clone(),
                device_id: credential.device_id.clone(),
            },
        )
        .map_err(TransportError::from)?;

        let nonce = match read_handshake_frame(&mut stream, "challenge", response_timeout)? {
            Frame::Challenge { device_id, nonce } => {
                if device_id != credential.device_id {
                    return Err(RemoteError::AuthenticationRejected(format!(
                        "device identifies as {device_id}, credentials are for {}",
                        credential.device_id
                    )));
                }
                hex::decode(&nonce).map_err(|e| {
                    TransportError::ReadFailed(format!("challenge nonce is not hex: {e}"))
                })?
            }
            Frame::AuthResult { reason, .. } => {
                return Err(RemoteError::AuthenticationRejected(
                    reason.unwrap_or_else(|| "unknown client".into()),
                ));
            }
            other => {
                return Err(TransportError::UnexpectedFrame {
                    expected: "challenge",
                    actual: other.name().to_string(),
                }
                .into());
            }
        };

        write_frame(
            &mut stream,
            &Frame::Auth {
                proof: connect_proof(&credential.secret, &nonce),
            },
        )
        .map_err(TransportError::from)?;

        match read_handshake_frame(&mut stream, "auth result", response_timeout)? {
            Frame::AuthResult { ok: true, .. } => {}
            Frame::AuthResult { ok: false, reason } => {
                return Err(RemoteError::AuthenticationRejected(
                    reason.unwrap_or_else(|| "proof rejected".into()),
                ));
            }
            other => {
                return Err(TransportError::UnexpectedFrame {
                    expected: "auth_result",
                    actual: other.name().to_string(),
                }
                .into());
            }
        }

        // The reader blocks indefinitely; request methods enforce timeouts.
        stream.set_read_timeout(None).map_err(TransportError::from)?;
        let reader_stream = stream.try_clone().map_err(TransportError::from)?;

        let (sender, responses) = mpsc::channel();
        let hub = EventHub::new();
        let reader_hub = hub.clone();
        let closing = Arc::new(AtomicBool::new(false));
        let reader_closing = closing.clone();
        let link_up = Arc::new(AtomicBool::new(true));
        let reader_link = link_up.clone();
        let reader = thread::Builder::new()
            .name("atv-session-reader".to_string())
            .spawn(move || {
                read_loop(
                    reader_stream,
                    sender,
                    reader_hub,
                    observer,
                    reader_closing,
                    reader_link,
                )
            })
            .map_err(TransportError::from)?;

        debug!("Session authenticated");
        Ok(Self {
            device_id: credential.device_id.clone(),
            stream,
            responses,
            hub,
            next_id: 0,
            response_timeout,
            reader: Some(reader),
            closing,
            link_up,
            closed: false,
        })
    }

    fn next_id(&mut self) -> u32 {
        self.next_id = self.next_id.wrapping_add(1);
        self.next_id
    }

    fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        if self.closed || !self.link_up.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }
        write_frame(&mut self.stream, frame).map_err(|e| match e {
            CodecError::Io(io) => TransportError::WriteFailed(io.to_string()),
            other => other.into(),
        })
    }

    fn send_key(&mut self, usage_page: u16, usage: u16, pressed: bool) -> Result<u32, TransportError> {
        let id = self.next_id();
        self.send(&Frame::Key {
            id,
            usage_page,
            usage,
            pressed,
        })?;
        Ok(id)
    }

    /// Wait for the response carrying `id`, skipping stale ones.
    fn await_response(&mut self, id: u32, waiting_for: &'static str) -> Result<Frame, TransportError> {
        loop {
            let frame = match self.responses.recv_timeout(self.response_timeout) {
                Ok(frame) => frame,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(TransportError::Timeout {
                        timeout_ms: self.response_timeout.as_millis() as u64,
                        waiting_for,
                    });
                }
                Err(RecvTimeoutError::Disconnected) => return Err(TransportError::Disconnected),
            };

            match &frame {
                Frame::Ack { id: got, .. } | Frame::QueueResponse { id: got, .. } if *got == id => {
                    return Ok(frame);
                }
                other => debug!(frame = other.name(), "Skipping stale response"),
            }
        }
    }

    fn await_ack(&mut self, id: u32) -> Result<Ack, TransportError> {
        match self.await_response(id, "key acknowledgement")? {
            Frame::Ack { error: None, .. } => Ok(Ack { id }),
            Frame::Ack {
                error: Some(message),
                ..
            } => Err(TransportError::Device(message)),
            other => Err(TransportError::UnexpectedFrame {
                expected: "ack",
                actual: other.name().to_string(),
            }),
        }
    }

    /// Discard acknowledgements nobody waits for.
    fn drain_responses(&mut self) {
        while self.responses.try_recv().is_ok() {}
    }
}

impl DeviceSession for TcpSession {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn send_key_command(&mut self, key: KeyCode) -> Result<Ack, TransportError> {
        self.drain_responses();
        let press = self.send_key(key.usage_page, key.usage, true)?;
        self.await_ack(press)?;
        if let Some(hold) = key.hold {
            thread::sleep(hold);
        }
        let release = self.send_key(key.usage_page, key.usage, false)?;
        self.await_ack(release)
    }

    fn send_key_press_and_release(
        &mut self,
        usage_page: u16,
        usage: u16,
    ) -> Result<(), TransportError> {
        self.drain_responses();
        self.send_key(usage_page, usage, true)?;
        self.send_key(usage_page, usage, false)?;
        Ok(())
    }

    fn request_playback_queue(&mut self, request: &QueueRequest) -> Result<Value, TransportError> {
        self.drain_responses();
        let id = self.next_id();
        self.send(&Frame::Queue {
            id,
            request: *request,
        })?;
        match self.await_response(id, "playback queue")? {
            Frame::QueueResponse { body, .. } => Ok(body),
            Frame::Ack {
                error: Some(message),
                ..
            } => Err(TransportError::Device(message)),
            other => Err(TransportError::UnexpectedFrame {
                expected: "queue_response",
                actual: other.name().to_string(),
            }),
        }
    }

    fn subscribe(&mut self, kind: EventKind) -> Result<Subscription, TransportError> {
        if self.closed {
            return Err(TransportError::Disconnected);
        }
        Ok(self.hub.subscribe(kind))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.closing.store(true, Ordering::SeqCst);
        let _ = self.stream.shutdown(Shutdown::Both);
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        self.hub.close();
        debug!(device_id = %self.device_id, "Session closed");
    }
}

impl Drop for TcpSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn read_loop(
    mut stream: TcpStream,
    responses: Sender<Frame>,
    hub: EventHub,
    observer: Arc<dyn SessionObserver>,
    closing: Arc<AtomicBool>,
    link_up: Arc<AtomicBool>,
) {
    loop {
        match read_frame(&mut stream) {
            Ok(Frame::NowPlaying { info }) => {
                hub.publish(DeviceEvent::NowPlaying(info));
            }
            Ok(Frame::Message { message }) => {
                hub.publish(DeviceEvent::Message(message));
            }
            Ok(Frame::Debug { message }) => {
                observer.on_event(&SessionEvent::Debug { message });
            }
            Ok(Frame::Error { message }) => {
                observer.on_event(&SessionEvent::Error {
                    detail: format!("device error frame: {message}"),
                    message,
                });
            }
            Ok(frame) => {
                // Responses are only dropped once the session itself is gone.
                let _ = responses.send(frame);
            }
            Err(CodecError::Closed) => {
                debug!("Device closed the connection");
                break;
            }
            Err(_) if closing.load(Ordering::SeqCst) => break,
            Err(e) => {
                warn!(error = %e, "Session read failed");
                observer.on_event(&SessionEvent::Error {
                    message: e.to_string(),
                    detail: format!("{e:?}"),
                });
                break;
            }
        }
    }
    // Writers see the link down before subscribers see their streams end.
    link_up.store(false, Ordering::SeqCst);
    hub.close();
}
