//! Session orchestrator - one lifecycle for every operation.
//!
//! Each operation goes through the same linear pipeline:
//!
//! ```text
//! Mode ──locate──▶ DeviceHandle ──pair──▶ Credential
//!                               └─connect─▶ Session ──body──▶ T
//! ```
//!
//! Every stage returns a typed result; nothing is retried here.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, instrument};

use crate::config::{ClientConfig, DiscoveryPolicy};
use crate::credentials::Credential;
use crate::error::RemoteError;
use crate::events::{SessionEvent, SessionObserver, SessionPhase, TracingObserver};
use crate::transport::{Connector, DeviceHandle, DeviceSession, Discovery, DiscoveryQuery, Pairing};

/// How an operation reaches its device.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Mode<'a> {
    /// Any device may answer; bounded by `timeout` or the configured default.
    Pair { timeout: Option<Duration> },
    /// Only the device the credential was issued by.
    Authenticated(&'a Credential),
}

/// Drives discovery, pairing or authenticated connect, and the operation body.
pub struct SessionOrchestrator<B> {
    backend: B,
    config: ClientConfig,
    observer: Arc<dyn SessionObserver>,
}

impl<B> SessionOrchestrator<B>
where
    B: Discovery + Pairing + Connector,
{
    /// Create an orchestrator with the default tracing observer.
    pub fn new(backend: B, config: ClientConfig) -> Self {
        Self::with_observer(backend, config, Arc::new(TracingObserver))
    }

    /// Create an orchestrator with a custom observer.
    pub fn with_observer(backend: B, config: ClientConfig, observer: Arc<dyn SessionObserver>) -> Self {
        Self {
            backend,
            config,
            observer,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn observer(&self) -> Arc<dyn SessionObserver> {
        self.observer.clone()
    }

    fn emit(&self, event: SessionEvent) {
        self.observer.on_event(&event);
    }

    /// Surface a fatal error to the observer, then hand it back unchanged.
    fn report(&self, err: RemoteError) -> RemoteError {
        self.emit(SessionEvent::Error {
            message: err.to_string(),
            detail: format!("{err:?}"),
        });
        err
    }

    /// Build the discovery query for `mode`.
    pub(crate) fn query_for(&self, mode: &Mode<'_>) -> DiscoveryQuery {
        let default_timeout = Duration::from_secs(self.config.discovery_timeout_secs);
        let (target, timeout) = match mode {
            Mode::Pair { timeout } => (None, timeout.unwrap_or(default_timeout)),
            Mode::Authenticated(credential) => {
                (Some(credential.device_id.clone()), default_timeout)
            }
        };
        // Two answers are enough to prove ambiguity.
        let limit = match self.config.discovery_policy {
            DiscoveryPolicy::First => 1,
            DiscoveryPolicy::Unique => 2,
        };
        DiscoveryQuery {
            target,
            timeout,
            limit: Some(limit),
        }
    }

    /// Run discovery once and apply the configured policy.
    #[instrument(skip_all)]
    pub(crate) fn locate(&self, mode: Mode<'_>) -> Result<DeviceHandle, RemoteError> {
        self.emit(SessionEvent::PhaseChanged {
            to: SessionPhase::Discovery,
        });
        let query = self.query_for(&mode);
        let found = self.backend.browse(&query)?;
        let device = select_device(found, &query, self.config.discovery_policy)?;

        self.emit(SessionEvent::DeviceFound {
            device_id: device.device_id.clone(),
            name: device.name.clone(),
            address: device.address,
        });
        Ok(device)
    }

    /// Discover any device and pair with it.
    ///
    /// Persisting the returned credential is the caller's job.
    pub fn pair(&self, timeout: Option<Duration>) -> Result<Credential, RemoteError> {
        let device = self.locate(Mode::Pair { timeout })?;

        self.emit(SessionEvent::PhaseChanged {
            to: SessionPhase::Pairing,
        });
        let credential = self
            .backend
            .pair(&device, self.observer.as_ref())
            .map_err(|e| self.report(e))?;

        self.emit(SessionEvent::Paired {
            device_id: credential.device_id.clone(),
        });
        Ok(credential)
    }

    /// Discover the credential's device and open an authenticated session.
    pub fn connect(&self, credential: &Credential) -> Result<B::Session, RemoteError> {
        let device = self.locate(Mode::Authenticated(credential))?;

        self.emit(SessionEvent::PhaseChanged {
            to: SessionPhase::Connecting,
        });
        let session = self
            .backend
            .open_connection(&device, credential, self.observer.clone())
            .map_err(|e| self.report(e))?;

        self.emit(SessionEvent::Connected {
            device_id: device.device_id.clone(),
        });
        self.emit(SessionEvent::PhaseChanged {
            to: SessionPhase::Ready,
        });
        Ok(session)
    }

    /// Open a session and run `body` on it exactly once.
    ///
    /// The body's result is passed through untouched; the session is closed
    /// afterwards either way.
    pub fn run<T, F>(&self, credential: &Credential, body: F) -> Result<T>
    where
        F: FnOnce(&mut B::Session) -> Result<T>,
    {
        let mut session = self.connect(credential)?;
        let result = body(&mut session);
        session.close();
        debug!(ok = result.is_ok(), "Operation finished");
        result
    }
}

/// Apply the discovery policy to whatever answered.
fn select_device(
    mut found: Vec<DeviceHandle>,
    query: &DiscoveryQuery,
    policy: DiscoveryPolicy,
) -> Result<DeviceHandle, RemoteError> {
    if let Some(target) = &query.target {
        found.retain(|d| d.device_id == *target);
    }

    match (found.len(), policy) {
        (0, _) => Err(RemoteError::DeviceNotFound {
            target: query.target.clone(),
            timeout_secs: query.timeout.as_secs(),
        }),
        (1, _) | (_, DiscoveryPolicy::First) => Ok(found.swap_remove(0)),
        (_, DiscoveryPolicy::Unique) => Err(RemoteError::AmbiguousDevice {
            ids: found.into_iter().map(|d| d.device_id).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::testing::RecordingObserver;
    use crate::protocol::KeyCommand;
    use crate::transport::{MockBackend, MockCall};

    fn orchestrator(
        backend: MockBackend,
        policy: DiscoveryPolicy,
    ) -> (SessionOrchestrator<MockBackend>, Arc<RecordingObserver>) {
        let observer = Arc::new(RecordingObserver::default());
        let config = ClientConfig {
            discovery_policy: policy,
            ..Default::default()
        };
        (
            SessionOrchestrator::with_observer(backend, config, observer.clone()),
            observer,
        )
    }

    fn remote_error(err: &anyhow::Error) -> &RemoteError {
        err.downcast_ref::<RemoteError>().expect("RemoteError")
    }

    #[test]
    fn test_pair_searches_unconstrained() {
        let (orch, _) = orchestrator(MockBackend::new().with_device("A"), DiscoveryPolicy::First);
        let credential = orch.pair(None).unwrap();
        assert_eq!(credential.device_id, "A");
        assert_eq!(
            orch.backend().calls(),
            vec![
                MockCall::Browse {
                    target: None,
                    limit: Some(1)
                },
                MockCall::Pair {
                    device_id: "A".into()
                },
            ]
        );
    }

    #[test]
    fn test_pair_timeout_default_and_explicit() {
        let (orch, _) = orchestrator(MockBackend::new(), DiscoveryPolicy::First);
        let default_query = orch.query_for(&Mode::Pair { timeout: None });
        assert_eq!(default_query.timeout, Duration::from_secs(5));

        let explicit = orch.query_for(&Mode::Pair {
            timeout: Some(Duration::from_secs(30)),
        });
        assert_eq!(explicit.timeout, Duration::from_secs(30));
        assert_eq!(explicit.target, None);
    }

    #[test]
    fn test_pair_not_found() {
        let (orch, _) = orchestrator(MockBackend::new(), DiscoveryPolicy::First);
        let err = orch.pair(Some(Duration::from_secs(2))).unwrap_err();
        assert!(matches!(
            err,
            RemoteError::DeviceNotFound {
                target: None,
                timeout_secs: 2
            }
        ));
        assert!(!orch
            .backend()
            .calls()
            .iter()
            .any(|c| matches!(c, MockCall::Pair { .. })));
    }

    #[test]
    fn test_first_policy_picks_first_responder() {
        let backend = MockBackend::new().with_device("A").with_device("B");
        let (orch, _) = orchestrator(backend, DiscoveryPolicy::First);
        assert_eq!(orch.pair(None).unwrap().device_id, "A");
    }

    #[test]
    fn test_unique_policy_rejects_ambiguity() {
        let backend = MockBackend::new().with_device("A").with_device("B");
        let (orch, _) = orchestrator(backend, DiscoveryPolicy::Unique);
        match orch.pair(None).unwrap_err() {
            RemoteError::AmbiguousDevice { ids } => assert_eq!(ids, vec!["A", "B"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unique_policy_single_match() {
        let (orch, _) = orchestrator(MockBackend::new().with_device("A"), DiscoveryPolicy::Unique);
        assert_eq!(orch.pair(None).unwrap().device_id, "A");
    }

    #[test]
    fn test_select_device_drops_non_matching_ids() {
        let device = |id: &str| DeviceHandle {
            device_id: id.into(),
            name: id.into(),
            address: "127.0.0.1:1".parse().unwrap(),
        };
        let query = DiscoveryQuery {
            target: Some("B".into()),
            timeout: Duration::from_secs(1),
            limit: None,
        };
        let picked =
            select_device(vec![device("A"), device("B")], &query, DiscoveryPolicy::Unique).unwrap();
        assert_eq!(picked.device_id, "B");
        assert!(select_device(vec![device("A")], &query, DiscoveryPolicy::First).is_err());
    }

    #[test]
    fn test_handshake_failure_is_reported_and_propagated() {
        let backend = MockBackend::new()
            .with_device("A")
            .failing_pairing("PIN rejected");
        let (orch, observer) = orchestrator(backend, DiscoveryPolicy::First);

        let err = orch.pair(None).unwrap_err();
        assert!(matches!(&err, RemoteError::HandshakeFailed(m) if m == "PIN rejected"));
        assert_eq!(observer.errors(), vec![err.to_string()]);
    }

    #[test]
    fn test_run_targets_credential_device() {
        let backend = MockBackend::new().with_device("A").with_device("B");
        let credential = backend.credential_for("B");
        let (orch, _) = orchestrator(backend, DiscoveryPolicy::Unique);

        let device_id = orch
            .run(&credential, |session| Ok(session.device_id().to_string()))
            .unwrap();
        assert_eq!(device_id, "B");
        assert_eq!(
            orch.backend().calls(),
            vec![
                MockCall::Browse {
                    target: Some("B".into()),
                    limit: Some(2)
                },
                MockCall::Connect {
                    device_id: "B".into()
                },
                MockCall::Close,
            ]
        );
    }

    #[test]
    fn test_run_invokes_body_once_and_closes() {
        let backend = MockBackend::new().with_device("A");
        let credential = backend.credential_for("A");
        let (orch, _) = orchestrator(backend, DiscoveryPolicy::First);

        let mut invocations = 0;
        let result: Result<()> = orch.run(&credential, |session| {
            invocations += 1;
            session.send_key_command(KeyCommand::Select.code())?;
            anyhow::bail!("body failed")
        });
        assert_eq!(invocations, 1);
        assert_eq!(result.unwrap_err().to_string(), "body failed");
        assert_eq!(orch.backend().calls().last(), Some(&MockCall::Close));
    }

    #[test]
    fn test_rejected_credentials_skip_body() {
        let backend = MockBackend::new().with_device("A").rejecting_auth();
        let credential = backend.credential_for("A");
        let (orch, observer) = orchestrator(backend, DiscoveryPolicy::First);

        let mut invoked = false;
        let err = orch
            .run(&credential, |_| {
                invoked = true;
                Ok(())
            })
            .unwrap_err();
        assert!(!invoked);
        assert!(matches!(
            remote_error(&err),
            RemoteError::AuthenticationRejected(_)
        ));
        assert_eq!(observer.errors().len(), 1);
    }

    #[test]
    fn test_unreachable_credential_device() {
        let backend = MockBackend::new().with_device("A");
        let credential = backend.credential_for("Z");
        let (orch, _) = orchestrator(backend, DiscoveryPolicy::First);

        let err = orch.run(&credential, |_| Ok(())).unwrap_err();
        assert!(matches!(
            remote_error(&err),
            RemoteError::DeviceNotFound { target: Some(t), .. } if t == "Z"
        ));
        assert_eq!(orch.backend().network_calls(), 1);
    }

    #[test]
    fn test_device_diagnostics_reach_observer() {
        let backend = MockBackend::new()
            .with_device("A")
            .with_diagnostic("link up");
        let credential = backend.credential_for("A");
        let (orch, observer) = orchestrator(backend, DiscoveryPolicy::First);

        orch.run(&credential, |_| Ok(())).unwrap();
        assert_eq!(observer.debug_messages(), vec!["link up"]);
    }
}
