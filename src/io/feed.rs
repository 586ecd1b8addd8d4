//! MQTT push feed for the backend's realtime channels
//!
//! The hosted backend mirrors each watched record onto an MQTT topic under
//! a configurable prefix. This feed subscribes once, parses payloads into
//! `SessionEvent`s, stamps them with per-source versions at ingestion, and
//! forwards them into the bounded session channel.
//!
//! Events are sent via try_send to avoid blocking the MQTT eventloop;
//! dropped events are counted in metrics and logged (rate-limited).

use crate::domain::types::{
    GateRecord, NotificationRecord, PresenceRecord, SensorRecord, SessionEvent, SourceId,
    SourceVersions, StatusRecord,
};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Topic suffixes under the configured prefix, one per watched record
const TOPIC_PRESENCE: &str = "presence";
const TOPIC_STATUS: &str = "status";
const TOPIC_STATUS_MIRROR: &str = "status_mirror";
const TOPIC_SENSOR: &str = "sensor";
const TOPIC_NOTIFICATION: &str = "notifications";
const TOPIC_GATE: &str = "gate";
/// UI surface: "open_qr" / "close_qr" action payloads
const TOPIC_ACTIONS: &str = "actions";

/// Parse one published payload into a session event, assigning its version
fn parse_publish(
    suffix: &str,
    payload: &str,
    versions: &SourceVersions,
) -> Result<Option<SessionEvent>, serde_json::Error> {
    let event = match suffix {
        TOPIC_PRESENCE => {
            let record: PresenceRecord = serde_json::from_str(payload)?;
            Some(SessionEvent::Presence { version: versions.next(SourceId::Presence), record })
        }
        TOPIC_STATUS => {
            let record: StatusRecord = serde_json::from_str(payload)?;
            Some(SessionEvent::Status {
                source: SourceId::StatusDoc,
                version: versions.next(SourceId::StatusDoc),
                record,
            })
        }
        TOPIC_STATUS_MIRROR => {
            let record: StatusRecord = serde_json::from_str(payload)?;
            Some(SessionEvent::Status {
                source: SourceId::StatusMirror,
                version: versions.next(SourceId::StatusMirror),
                record,
            })
        }
        TOPIC_SENSOR => {
            let record: SensorRecord = serde_json::from_str(payload)?;
            Some(SessionEvent::Sensor { version: versions.next(SourceId::Sensor), record })
        }
        TOPIC_NOTIFICATION => {
            // A deleted notification node arrives as JSON null
            let record: NotificationRecord = if payload.trim() == "null" {
                NotificationRecord { message: None, requester_id: None }
            } else {
                serde_json::from_str(payload)?
            };
            Some(SessionEvent::Notification {
                version: versions.next(SourceId::Notification),
                record,
            })
        }
        TOPIC_GATE => {
            let record: GateRecord = serde_json::from_str(payload)?;
            Some(SessionEvent::Gate { version: versions.next(SourceId::Gate), record })
        }
        TOPIC_ACTIONS => match payload.trim().trim_matches('"') {
            "open_qr" => Some(SessionEvent::OpenQr),
            "close_qr" => Some(SessionEvent::CloseQr),
            other => {
                debug!(action = %other, "unknown_action_ignored");
                None
            }
        },
        _ => None,
    };
    Ok(event)
}

/// Start the push feed and forward parsed events to the session channel
pub async fn start_push_feed(
    config: &Config,
    event_tx: mpsc::Sender<SessionEvent>,
    versions: Arc<SourceVersions>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut mqttoptions = MqttOptions::new("parkwatch", config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }

    let prefix = config.mqtt_topic_prefix().trim_end_matches('/').to_string();
    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
    client.subscribe(format!("{prefix}/#"), QoS::AtMostOnce).await?;

    info!(prefix = %prefix, host = %config.mqtt_host(), port = %config.mqtt_port(), "push_feed_subscribed");

    // Rate-limit drop warnings to 1 per second
    let mut last_drop_warn = Instant::now() - Duration::from_secs(2);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                // A dropped sender counts as shutdown
                if changed.is_err() || *shutdown.borrow() {
                    info!("push_feed_shutdown");
                    return Ok(());
                }
            }
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let topic = &publish.topic;
                        let Some(suffix) = topic.strip_prefix(&prefix).map(|s| s.trim_start_matches('/')) else {
                            continue;
                        };
                        let payload = match std::str::from_utf8(&publish.payload) {
                            Ok(s) => s,
                            Err(e) => {
                                warn!(topic = %topic, error = %e, "invalid_utf8_payload");
                                continue;
                            }
                        };
                        let event = match parse_publish(suffix, payload, &versions) {
                            Ok(Some(event)) => event,
                            Ok(None) => continue,
                            Err(e) => {
                                // Listener failure: log only, per error policy
                                warn!(topic = %topic, error = %e, "payload_decode_failed");
                                continue;
                            }
                        };

                        debug!(kind = %event.kind(), "push_event_received");
                        metrics.record_event_received();
                        if let Err(e) = event_tx.try_send(event) {
                            match e {
                                TrySendError::Full(_) => {
                                    metrics.record_event_dropped();
                                    if last_drop_warn.elapsed() > Duration::from_secs(1) {
                                        warn!("push_event_dropped: channel full");
                                        last_drop_warn = Instant::now();
                                    }
                                }
                                TrySendError::Closed(_) => {
                                    warn!("session channel closed");
                                    return Ok(());
                                }
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("push_feed_connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "push_feed_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}
