//! Exception fan-out.
//!
//! Every [`ExceptionEvent`] raised anywhere in the process ends up in
//! [`ExceptionDispatcher::report`], which:
//!
//! 1. logs it at a level derived from its severity,
//! 2. queues it for the Studio through the remote handle,
//! 3. hands an [`AlertPayload`] to the external alert sink when the severity
//!    reaches the configured threshold.
//!
//! Reporting never fails and never blocks: a broken alert channel is logged
//! and otherwise ignored.

use std::sync::Arc;

use tracing::{error, info, warn};

use table_core::protocol::studio::{AlertPayload, Outbound};
use table_core::{ExceptionEvent, Severity};

use crate::infrastructure::remote::RemoteHandle;

/// The external alert channel (a chat webhook in production).
#[cfg_attr(test, mockall::automock)]
pub trait AlertSink: Send + Sync {
    fn send(&self, alert: AlertPayload) -> Result<(), String>;
}

/// Writes alerts to the log as JSON.  Used when no external channel is
/// wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn send(&self, alert: AlertPayload) -> Result<(), String> {
        let body = serde_json::to_string(&alert).map_err(|e| e.to_string())?;
        error!(target: "alert", %body, "external alert");
        Ok(())
    }
}

#[derive(Clone)]
pub struct ExceptionDispatcher {
    remote: RemoteHandle,
    sink: Arc<dyn AlertSink>,
    environment: String,
    alert_min_severity: Severity,
}

impl ExceptionDispatcher {
    pub fn new(
        remote: RemoteHandle,
        sink: Arc<dyn AlertSink>,
        environment: impl Into<String>,
        alert_min_severity: Severity,
    ) -> Self {
        Self {
            remote,
            sink,
            environment: environment.into(),
            alert_min_severity,
        }
    }

    pub fn report(&self, event: &ExceptionEvent) {
        let code = event.code.as_str();
        match event.severity {
            Severity::Info => info!(table_id = %event.table_id, code, "{}", event.message),
            Severity::Warning => warn!(table_id = %event.table_id, code, "{}", event.message),
            Severity::Error | Severity::Fatal => error!(
                table_id = %event.table_id,
                code,
                severity = event.severity.as_str(),
                "{}",
                event.message
            ),
        }

        self.remote.push(Outbound::exception(event));

        if event.severity >= self.alert_min_severity {
            let alert = AlertPayload::from_exception(event, &self.environment);
            if let Err(e) = self.sink.send(alert) {
                warn!(code, error = %e, "external alert not delivered");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use table_core::protocol::studio::MessageKind;
    use table_core::ExceptionCode;

    fn event(severity: Severity) -> ExceptionEvent {
        ExceptionEvent::new(
            ExceptionCode::TransportLost,
            severity,
            "RL-01",
            "serial port vanished",
            1_000,
        )
    }

    #[test]
    fn test_every_exception_is_queued_for_the_studio() {
        // Arrange
        let remote = RemoteHandle::detached("RL-01", 16);
        let mut sink = MockAlertSink::new();
        sink.expect_send().never();
        let dispatcher =
            ExceptionDispatcher::new(remote.clone(), Arc::new(sink), "staging", Severity::Error);

        // Act
        dispatcher.report(&event(Severity::Warning));

        // Assert
        let queued = remote.queued();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].kind, MessageKind::Exception);
        assert_eq!(queued[0].payload["code"], "TRANSPORT_LOST");
    }

    #[test]
    fn test_alert_is_sent_at_or_above_threshold() {
        // Arrange
        let remote = RemoteHandle::detached("RL-01", 16);
        let mut sink = MockAlertSink::new();
        sink.expect_send()
            .with(eq(AlertPayload {
                error_message: "serial port vanished".to_string(),
                error_code: "TRANSPORT_LOST".to_string(),
                table_name: "RL-01".to_string(),
                environment: "staging".to_string(),
            }))
            .times(2)
            .returning(|_| Ok(()));
        let dispatcher =
            ExceptionDispatcher::new(remote, Arc::new(sink), "staging", Severity::Error);

        // Act
        dispatcher.report(&event(Severity::Error));
        dispatcher.report(&event(Severity::Fatal));
        dispatcher.report(&event(Severity::Info));
    }

    #[test]
    fn test_failing_sink_does_not_stop_reporting() {
        // Arrange
        let remote = RemoteHandle::detached("RL-01", 16);
        let mut sink = MockAlertSink::new();
        sink.expect_send()
            .times(1)
            .returning(|_| Err("webhook returned 500".to_string()));
        let dispatcher =
            ExceptionDispatcher::new(remote.clone(), Arc::new(sink), "prod", Severity::Warning);

        // Act
        dispatcher.report(&event(Severity::Warning));

        // Assert
        assert_eq!(remote.pending(), 1);
    }

    #[test]
    fn test_tracing_sink_accepts_alerts() {
        let alert = AlertPayload::from_exception(&event(Severity::Fatal), "prod");
        assert_eq!(TracingAlertSink.send(alert), Ok(()));
    }
}
