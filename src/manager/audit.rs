//! Audit trail of privileged operations.
//!
//! Every authorized operation leaves one record on the `audit` tracing
//! target, so a subscriber can route them apart from the daemon log.

use tracing::info;

use crate::{
    core::{NetworkError, Result},
    services::auth::AuthSubject,
};

/// Tracing target of audit records.
pub const AUDIT_TARGET: &str = "audit";

/// Audited operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditOp {
    /// Activation of a connection profile.
    Activate,
    /// Deactivation of an active connection.
    Deactivate,
    /// Deletion of a software device.
    DeleteDevice,
}

impl AuditOp {
    /// Name used in records.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Activate => "activate",
            Self::Deactivate => "deactivate",
            Self::DeleteDevice => "delete_device",
        }
    }
}

/// Outcome recorded for `result`.
pub fn outcome<T>(result: &Result<T>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(NetworkError::AuthorizationDenied { .. }) => "denied",
        Err(_) => "failure",
    }
}

/// Record `op` on `object` requested by `subject`.
pub(super) fn audit<T>(op: AuditOp, object: &str, subject: &AuthSubject, result: &Result<T>) {
    let reason = result.as_ref().err().map(ToString::to_string);
    info!(
        target: AUDIT_TARGET,
        op = op.as_str(),
        object,
        subject = %subject,
        uid = subject.uid(),
        pid = subject.pid(),
        result = outcome(result),
        reason = reason.as_deref(),
        "Audit"
    );
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::{
        io,
        sync::{Arc, Mutex},
    };

    use super::*;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture(record: impl FnOnce()) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, record);
        String::from_utf8(captured.0.lock().unwrap().clone()).unwrap()
    }

    #[test]
    fn outcomes() {
        assert_eq!(outcome(&Ok(())), "success");
        assert_eq!(
            outcome::<()>(&Err(NetworkError::AuthorizationDenied {
                reason: "no".to_string()
            })),
            "denied"
        );
        assert_eq!(
            outcome::<()>(&Err(NetworkError::NotSoftware("eth0".to_string()))),
            "failure"
        );
    }

    #[test]
    fn records_carry_subject_fields() {
        let subject = AuthSubject::new_unix_process(1000, 4242);
        let line = capture(|| {
            audit(
                AuditOp::Deactivate,
                "/org/freedesktop/NetworkManager/ActiveConnection/1",
                &subject,
                &Err::<(), _>(NetworkError::AuthorizationDenied {
                    reason: "Not authorized to control networking.".to_string(),
                }),
            );
        });

        assert!(line.contains(r#""target":"audit""#));
        assert!(line.contains(r#""op":"deactivate""#));
        assert!(line.contains(r#""uid":1000"#));
        assert!(line.contains(r#""pid":4242"#));
        assert!(line.contains(r#""result":"denied""#));
    }
}
