//! Operation bodies run inside an open session.
//!
//! Each function here is what one CLI subcommand does once the
//! orchestrator has handed it a connected session.

use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::RemoteError;
use crate::events::{SessionEvent, SessionObserver};
use crate::protocol::{KeyCommand, QueueRequest};
use crate::recovery::PasscodeRecovery;
use crate::subscription::{DeviceEvent, EventKind};
use crate::transport::{Ack, DeviceSession, TransportError};

/// Send one remote key and wait for the device to acknowledge it.
#[instrument(skip(session, observer))]
pub fn send_command<S: DeviceSession>(
    session: &mut S,
    key: KeyCommand,
    observer: &dyn SessionObserver,
) -> Result<Ack> {
    let ack = session
        .send_key_command(key.code())
        .map_err(RemoteError::from)?;
    observer.on_event(&SessionEvent::KeySent {
        key: key.to_string(),
    });
    Ok(ack)
}

/// Fetch the playback queue as raw JSON.
#[instrument(skip(session))]
pub fn query_queue<S: DeviceSession>(session: &mut S, request: &QueueRequest) -> Result<Value> {
    let response = session
        .request_playback_queue(request)
        .map_err(RemoteError::from)?;
    Ok(response)
}

/// Feed every event of `kind` to `on_event` until the connection ends.
///
/// The stream only ends when the connection does, so a return is always
/// an error: either the callback's or [`TransportError::Disconnected`].
pub fn stream_events<S, F>(session: &mut S, kind: EventKind, mut on_event: F) -> Result<()>
where
    S: DeviceSession,
    F: FnMut(&DeviceEvent) -> Result<()>,
{
    let subscription = session.subscribe(kind).map_err(RemoteError::from)?;
    let mut delivered = 0usize;
    for event in subscription {
        on_event(&event)?;
        delivered += 1;
    }
    debug!(delivered, ?kind, "Event stream ended");
    Err(RemoteError::from(TransportError::Disconnected).into())
}

/// Run passcode recovery over the session; returns the number of codes sent.
pub fn guess<S: DeviceSession>(session: &mut S, observer: Arc<dyn SessionObserver>) -> Result<usize> {
    let sent = PasscodeRecovery::new(observer).run(session)?;
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullObserver;
    use crate::events::testing::RecordingObserver;
    use crate::protocol::{NowPlayingInfo, ProtocolMessage};
    use crate::transport::{
        Connector, Discovery, DiscoveryQuery, MockBackend, MockCall, MockSession,
    };
    use serde_json::json;
    use std::time::Duration;

    fn open(backend: &MockBackend) -> MockSession {
        let device = backend
            .browse(&DiscoveryQuery {
                target: None,
                timeout: Duration::from_secs(1),
                limit: Some(1),
            })
            .unwrap()
            .remove(0);
        let credential = backend.credential_for(&device.device_id);
        backend
            .open_connection(&device, &credential, Arc::new(NullObserver))
            .unwrap()
    }

    fn now_playing(title: &str) -> DeviceEvent {
        DeviceEvent::NowPlaying(NowPlayingInfo {
            title: Some(title.into()),
            ..Default::default()
        })
    }

    #[test]
    fn test_send_command_uses_key_code() {
        let backend = MockBackend::new().with_device("A");
        let mut session = open(&backend);
        let observer = RecordingObserver::default();

        send_command(&mut session, KeyCommand::LongTv, &observer).unwrap();

        let code = KeyCommand::LongTv.code();
        assert!(backend.calls().contains(&MockCall::KeyCommand {
            usage_page: code.usage_page,
            usage: code.usage,
            hold: code.hold,
        }));
        assert!(observer
            .events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, SessionEvent::KeySent { key } if key == "longtv")));
    }

    #[test]
    fn test_send_command_failure_is_protocol_error() {
        let backend = MockBackend::new().with_device("A").failing_after(0);
        let mut session = open(&backend);

        let err = send_command(&mut session, KeyCommand::Menu, &NullObserver).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RemoteError>(),
            Some(RemoteError::Protocol(_))
        ));
    }

    #[test]
    fn test_query_queue_passes_request_through() {
        let backend = MockBackend::new()
            .with_device("A")
            .with_queue_response(json!({ "items": [{ "title": "Song" }] }));
        let mut session = open(&backend);
        let request = QueueRequest {
            location: 2,
            length: 5,
            include_metadata: true,
            include_lyrics: false,
            include_language_options: false,
        };

        let response = query_queue(&mut session, &request).unwrap();
        assert_eq!(response["items"][0]["title"], "Song");
        assert!(backend.calls().contains(&MockCall::Queue(request)));
    }

    #[test]
    fn test_stream_delivers_in_order_then_reports_disconnect() {
        let backend = MockBackend::new().with_device("A").with_events(vec![
            now_playing("one"),
            DeviceEvent::Message(ProtocolMessage {
                kind: "other".into(),
                body: json!({}),
            }),
            now_playing("two"),
        ]);
        let mut session = open(&backend);

        let mut titles = Vec::new();
        let err = stream_events(&mut session, EventKind::NowPlaying, |event| {
            if let DeviceEvent::NowPlaying(info) = event {
                titles.push(info.title.clone().unwrap_or_default());
            }
            Ok(())
        })
        .unwrap_err();

        assert_eq!(titles, vec!["one", "two"]);
        assert!(matches!(
            err.downcast_ref::<RemoteError>(),
            Some(RemoteError::Protocol(TransportError::Disconnected))
        ));
    }

    #[test]
    fn test_stream_stops_on_callback_error() {
        let backend = MockBackend::new()
            .with_device("A")
            .with_events(vec![now_playing("one"), now_playing("two")]);
        let mut session = open(&backend);

        let mut seen = 0;
        let err = stream_events(&mut session, EventKind::NowPlaying, |_| {
            seen += 1;
            anyhow::bail!("stdout closed")
        })
        .unwrap_err();
        assert_eq!(seen, 1);
        assert_eq!(err.to_string(), "stdout closed");
    }

    #[test]
    fn test_guess_aborts_on_send_failure() {
        let backend = MockBackend::new().with_device("A").failing_after(1);
        let mut session = open(&backend);

        let err = guess(&mut session, Arc::new(NullObserver)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RemoteError>(),
            Some(RemoteError::Protocol(TransportError::WriteFailed(_)))
        ));
        let presses = backend
            .calls()
            .into_iter()
            .filter(|c| matches!(c, MockCall::KeyPress { .. }))
            .count();
        assert_eq!(presses, 1);
    }
}
