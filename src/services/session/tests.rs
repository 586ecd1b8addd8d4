//! Tests for the Session module

use super::*;
use crate::domain::session::{
    SessionPhase, NOTIF_ACCESS_GRANTED, NOTIF_VEHICLE_DETECTED, NOTIF_WAITING_VEHICLE,
};
use crate::domain::types::{
    GateRecord, GateStatus, NotificationRecord, PresenceRecord, RequestStatus, SensorRecord,
    SourceId, StatusRecord, GATE_REASON_SLOT_OCCUPIED, GATE_REASON_VALID_CODE,
};
use crate::io::memory::MemoryBackend;
use crate::io::writes::{write_channel, WriteCommand};
use serde_json::json;
use tokio::time::{timeout, Duration};

/// Test harness that keeps channel receivers alive so `try_send` succeeds
struct TestSession {
    session: Session,
    write_rx: mpsc::Receiver<WriteCommand>,
    state_rx: watch::Receiver<SessionSnapshot>,
    backend: Arc<MemoryBackend>,
}

impl std::ops::Deref for TestSession {
    type Target = Session;
    fn deref(&self) -> &Self::Target {
        &self.session
    }
}

impl std::ops::DerefMut for TestSession {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.session
    }
}

fn create_test_session() -> TestSession {
    let backend = Arc::new(MemoryBackend::new());
    let versions = Arc::new(SourceVersions::new());
    let metrics = Arc::new(Metrics::new());
    let (writes, write_rx) = write_channel(64);
    let (session, state_rx) = Session::new(
        &Config::default(),
        "user-1",
        backend.clone(),
        writes,
        versions,
        metrics,
    );
    TestSession { session, write_rx, state_rx, backend }
}

impl TestSession {
    fn status_event(&self, detected: bool, may_generate_qr: Option<bool>) -> SessionEvent {
        SessionEvent::Status {
            source: SourceId::StatusDoc,
            version: self.session.versions.next(SourceId::StatusDoc),
            record: StatusRecord {
                vehicle_detected: detected,
                may_generate_qr,
                message: None,
            },
        }
    }

    fn mirror_event(&self, detected: bool, may_generate_qr: Option<bool>) -> SessionEvent {
        SessionEvent::Status {
            source: SourceId::StatusMirror,
            version: self.session.versions.next(SourceId::StatusMirror),
            record: StatusRecord {
                vehicle_detected: detected,
                may_generate_qr,
                message: None,
            },
        }
    }

    fn presence_event(&self, detected: bool) -> SessionEvent {
        SessionEvent::Presence {
            version: self.session.versions.next(SourceId::Presence),
            record: PresenceRecord { detected },
        }
    }

    fn sensor_event(&self, detected: bool) -> SessionEvent {
        SessionEvent::Sensor {
            version: self.session.versions.next(SourceId::Sensor),
            record: SensorRecord { detected },
        }
    }

    fn gate_event(&self, status: GateStatus, reason: &str) -> SessionEvent {
        SessionEvent::Gate {
            version: self.session.versions.next(SourceId::Gate),
            record: GateRecord { status, reason: Some(reason.to_string()) },
        }
    }

    fn drain_writes(&mut self) -> Vec<WriteCommand> {
        let mut commands = Vec::new();
        while let Ok(command) = self.write_rx.try_recv() {
            commands.push(command);
        }
        commands
    }
}

#[tokio::test]
async fn test_all_sources_false_keeps_button_disabled() {
    let mut s = create_test_session();
    let events =
        [s.presence_event(false), s.sensor_event(false), s.status_event(false, None)];
    for event in events {
        s.process_event(event);
    }

    let snapshot = s.snapshot();
    assert!(!snapshot.button_enabled);
    assert_eq!(snapshot.notification, NOTIF_WAITING_VEHICLE);
    assert_eq!(snapshot.phase, SessionPhase::VehicleAbsent);
}

#[tokio::test]
async fn test_status_with_qr_flag_enables_button() {
    let mut s = create_test_session();
    let event = s.status_event(true, Some(true));
    s.process_event(event);

    let snapshot = s.snapshot();
    assert!(snapshot.button_enabled);
    assert!(snapshot.vehicle_detected);
    assert_eq!(snapshot.notification, NOTIF_VEHICLE_DETECTED);
}

#[tokio::test]
async fn test_all_sources_agree_enables_button() {
    let mut s = create_test_session();
    let events = [
        s.presence_event(true),
        s.sensor_event(true),
        s.status_event(true, None),
        s.mirror_event(true, None),
    ];
    for event in events {
        s.process_event(event);
    }
    assert!(s.snapshot().button_enabled);
}

#[tokio::test]
async fn test_open_qr_writes_request_and_notification() {
    let mut s = create_test_session();
    let event = s.status_event(true, Some(true));
    s.process_event(event);
    s.process_event(SessionEvent::OpenQr);

    let snapshot = s.snapshot();
    assert_eq!(snapshot.phase, SessionPhase::RequestPending);
    assert!(snapshot.qr_visible);
    assert!(!snapshot.button_enabled);

    let writes = s.drain_writes();
    assert_eq!(writes.len(), 2);
    assert!(matches!(
        &writes[0],
        WriteCommand::UpsertRequest(request)
            if request.user_id == "user-1" && request.status == RequestStatus::Pending
    ));
    assert!(matches!(&writes[1], WriteCommand::SetNotification(Some(_))));
}

#[tokio::test]
async fn test_open_qr_rejected_without_detection() {
    let mut s = create_test_session();
    s.process_event(SessionEvent::OpenQr);
    assert_eq!(s.snapshot().phase, SessionPhase::Idle);
    assert!(s.drain_writes().is_empty());
}

#[tokio::test]
async fn test_close_qr_cancels_and_restores_enablement() {
    let mut s = create_test_session();
    let event = s.status_event(true, Some(true));
    s.process_event(event);
    s.process_event(SessionEvent::OpenQr);
    s.drain_writes();

    s.process_event(SessionEvent::CloseQr);

    let snapshot = s.snapshot();
    assert_eq!(snapshot.phase, SessionPhase::VehicleDetected);
    assert!(snapshot.button_enabled);
    assert!(!snapshot.qr_visible);

    let writes = s.drain_writes();
    assert!(matches!(&writes[0], WriteCommand::SetNotification(None)));
    assert!(matches!(
        &writes[1],
        WriteCommand::SetRequestStatus { status: RequestStatus::Cancelled, .. }
    ));
}

#[tokio::test]
async fn test_gate_valid_code_completes_request_and_closes_dialog() {
    let mut s = create_test_session();
    let event = s.status_event(true, Some(true));
    s.process_event(event);
    s.process_event(SessionEvent::OpenQr);
    s.drain_writes();

    let gate = s.gate_event(GateStatus::Open, GATE_REASON_VALID_CODE);
    s.process_event(gate);

    let snapshot = s.snapshot();
    assert_eq!(snapshot.phase, SessionPhase::AccessGranted);
    assert!(!snapshot.qr_visible);
    assert_eq!(snapshot.notification, NOTIF_ACCESS_GRANTED);

    let writes = s.drain_writes();
    assert!(matches!(
        &writes[0],
        WriteCommand::SetRequestStatus { status: RequestStatus::Completed, .. }
    ));
}

#[tokio::test]
async fn test_gate_slot_occupied_clears_flow_once_keeps_dialog() {
    let mut s = create_test_session();
    let event = s.status_event(true, Some(true));
    s.process_event(event);
    s.process_event(SessionEvent::OpenQr);
    s.drain_writes();

    let gate = s.gate_event(GateStatus::Closed, GATE_REASON_SLOT_OCCUPIED);
    s.process_event(gate);

    let snapshot = s.snapshot();
    // Dialog is not auto-dismissed by this transition; only the flow clears
    assert!(snapshot.qr_visible);
    assert_eq!(snapshot.phase, SessionPhase::VehicleDetected);
    assert!(snapshot.button_enabled);

    let writes = s.drain_writes();
    assert_eq!(writes.len(), 1);
    assert!(matches!(
        &writes[0],
        WriteCommand::SetRequestStatus { status: RequestStatus::Cancelled, .. }
    ));

    // A duplicate transition has no further effect
    let gate = s.gate_event(GateStatus::Closed, GATE_REASON_SLOT_OCCUPIED);
    s.process_event(gate);
    assert!(s.drain_writes().is_empty());
}

#[tokio::test]
async fn test_stale_status_version_is_dropped() {
    let mut s = create_test_session();
    let newer = s.status_event(true, Some(true));
    let version = match &newer {
        SessionEvent::Status { version, .. } => *version,
        _ => unreachable!(),
    };
    s.process_event(newer);

    // Late delivery of an older write from the same source
    s.process_event(SessionEvent::Status {
        source: SourceId::StatusDoc,
        version: version - 1,
        record: StatusRecord {
            vehicle_detected: false,
            may_generate_qr: Some(false),
            message: None,
        },
    });

    assert!(s.snapshot().button_enabled);
    assert_eq!(s.session.metrics.snapshot().stale_dropped, 1);
}

#[tokio::test]
async fn test_notification_message_overrides_and_clears() {
    let mut s = create_test_session();
    let version = s.session.versions.next(SourceId::Notification);
    s.process_event(SessionEvent::Notification {
        version,
        record: NotificationRecord {
            message: Some("wait for the previous car".to_string()),
            requester_id: None,
        },
    });
    assert_eq!(s.snapshot().notification, "wait for the previous car");

    let version = s.session.versions.next(SourceId::Notification);
    s.process_event(SessionEvent::Notification {
        version,
        record: NotificationRecord { message: None, requester_id: None },
    });
    assert_eq!(s.snapshot().notification, NOTIF_WAITING_VEHICLE);
}

#[tokio::test]
async fn test_stray_close_qr_leaves_notification_alone() {
    let mut s = create_test_session();
    // Admin message sits on the shared node; no dialog was ever opened
    let version = s.session.versions.next(SourceId::Notification);
    s.process_event(SessionEvent::Notification {
        version,
        record: NotificationRecord {
            message: Some("maintenance at noon".to_string()),
            requester_id: None,
        },
    });

    s.process_event(SessionEvent::CloseQr);

    assert_eq!(s.snapshot().notification, "maintenance at noon");
    assert!(s.drain_writes().is_empty());
}

#[tokio::test]
async fn test_prime_reads_initial_state() {
    let mut s = create_test_session();
    s.backend
        .set_doc(
            "detection/status",
            json!({"vehiculo_detectado": true, "puede_generar_qr": true}),
        )
        .await
        .unwrap();
    s.backend
        .set_doc("gate/state", json!({"status": "closed", "reason": "slot_occupied"}))
        .await
        .unwrap();

    s.session.prime().await.unwrap();
    assert!(s.snapshot().button_enabled);
    assert_eq!(s.snapshot().phase, SessionPhase::VehicleDetected);
}

#[tokio::test]
async fn test_prime_fails_terminally_when_unauthenticated() {
    let mut s = create_test_session();
    s.backend.set_unauthenticated(true);
    assert!(matches!(
        s.session.prime().await,
        Err(crate::io::backend::BackendError::Unauthenticated)
    ));
}

#[tokio::test]
async fn test_poll_corrects_drifted_state() {
    let mut s = create_test_session();
    // Session believes no vehicle is present; the backend says otherwise
    s.backend
        .set_doc(
            "detection/status",
            json!({"vehiculo_detectado": true, "puede_generar_qr": true}),
        )
        .await
        .unwrap();

    s.session.reconcile().await;

    assert!(s.snapshot().button_enabled);
    assert_eq!(s.session.metrics.snapshot().poll_corrections, 1);
}

#[tokio::test]
async fn test_poll_read_failure_logged_not_fatal() {
    let mut s = create_test_session();
    s.backend.set_unauthenticated(true);
    s.session.reconcile().await;
    assert_eq!(s.session.metrics.snapshot().poll_failures, 2);
    assert_eq!(s.snapshot().phase, SessionPhase::Idle);
}

#[tokio::test]
async fn test_poll_outranks_earlier_pushes() {
    let mut s = create_test_session();
    let event = s.status_event(true, Some(true));
    s.process_event(event);

    // Backend moved on; the poll's fresh read must win
    s.backend
        .set_doc(
            "detection/status",
            json!({"vehiculo_detectado": false, "puede_generar_qr": false}),
        )
        .await
        .unwrap();
    s.session.reconcile().await;
    assert!(!s.snapshot().button_enabled);
}

#[tokio::test]
async fn test_shutdown_stops_state_updates() {
    let s = create_test_session();
    let TestSession { session, write_rx, mut state_rx, .. } = s;
    let (event_tx, event_rx) = mpsc::channel(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let versions = session.versions.clone();

    let task = tokio::spawn(session.run(event_rx, shutdown_rx));

    event_tx
        .send(SessionEvent::Status {
            source: SourceId::StatusDoc,
            version: versions.next(SourceId::StatusDoc),
            record: StatusRecord {
                vehicle_detected: true,
                may_generate_qr: Some(true),
                message: None,
            },
        })
        .await
        .unwrap();
    timeout(Duration::from_secs(1), state_rx.changed()).await.unwrap().unwrap();
    assert!(state_rx.borrow_and_update().button_enabled);

    shutdown_tx.send(true).unwrap();
    timeout(Duration::from_secs(1), task).await.unwrap().unwrap();

    // The session task is gone; nothing processes further events
    event_tx
        .send(SessionEvent::Status {
            source: SourceId::StatusDoc,
            version: versions.next(SourceId::StatusDoc),
            record: StatusRecord {
                vehicle_detected: false,
                may_generate_qr: Some(false),
                message: None,
            },
        })
        .await
        .unwrap();
    assert!(timeout(Duration::from_millis(200), state_rx.changed()).await.is_err());
    drop(write_rx);
}

#[tokio::test]
async fn test_dropped_shutdown_sender_stops_session() {
    let s = create_test_session();
    let TestSession { session, write_rx, .. } = s;
    let (_event_tx, event_rx) = mpsc::channel::<SessionEvent>(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(session.run(event_rx, shutdown_rx));

    // Sender dropped without ever signalling; the task must still exit
    drop(shutdown_tx);
    timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    drop(write_rx);
}
