//! Outbound notifications to guests.
//!
//! Delivery is best effort: a failed notification is logged and never undoes
//! the state change that triggered it.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use thiserror::Error;

use crate::models::{Appointment, NotificationKind, Profile};

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification channel unavailable")]
    Unavailable,

    #[error("Notification rejected: {0}")]
    Rejected(String),
}

pub trait Notifier: Send + Sync {
    fn notify(&self, appointment: &Appointment, kind: NotificationKind) -> Result<(), NotifyError>;

    /// Profile-scoped notice to the guest linked to `profile`.
    fn notify_profile(&self, profile: &Profile, kind: NotificationKind) -> Result<(), NotifyError>;
}

/// Writes each notification to the log. Default for the CLI.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, appointment: &Appointment, kind: NotificationKind) -> Result<(), NotifyError> {
        tracing::info!(
            appointment_id = appointment.id,
            guest_id = appointment.guest_id,
            kind = %kind,
            "Guest notification"
        );
        Ok(())
    }

    fn notify_profile(&self, profile: &Profile, kind: NotificationKind) -> Result<(), NotifyError> {
        tracing::info!(
            profile_id = profile.id,
            guest_id = ?profile.guest_id,
            kind = %kind,
            "Guest notification"
        );
        Ok(())
    }
}

/// Send a notification, logging instead of propagating any failure.
pub fn notify_silently(notifier: &dyn Notifier, appointment: &Appointment, kind: NotificationKind) {
    if let Err(e) = notifier.notify(appointment, kind) {
        tracing::warn!(
            appointment_id = appointment.id,
            kind = %kind,
            error = %e,
            "Notification failed"
        );
    }
}

pub fn notify_profile_silently(notifier: &dyn Notifier, profile: &Profile, kind: NotificationKind) {
    if let Err(e) = notifier.notify_profile(profile, kind) {
        tracing::warn!(profile_id = profile.id, kind = %kind, error = %e, "Notification failed");
    }
}

enum Job {
    Appointment(Appointment, NotificationKind),
    Profile(Profile, NotificationKind),
}

/// Hands notifications to a worker thread so callers never wait on delivery.
///
/// Dropping the notifier closes the channel and joins the worker after it
/// drains what was already queued.
pub struct BackgroundNotifier {
    sender: Option<mpsc::Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundNotifier {
    pub fn start(inner: Arc<dyn Notifier>) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>();
        let handle = std::thread::spawn(move || {
            tracing::debug!("Notification worker started");
            for job in receiver {
                match job {
                    Job::Appointment(appointment, kind) => {
                        notify_silently(inner.as_ref(), &appointment, kind)
                    }
                    Job::Profile(profile, kind) => notify_profile_silently(inner.as_ref(), &profile, kind),
                }
            }
            tracing::debug!("Notification worker shutting down");
        });
        Self {
            sender: Some(sender),
            handle: Some(handle),
        }
    }
}

impl BackgroundNotifier {
    fn enqueue(&self, job: Job) -> Result<(), NotifyError> {
        let sender = self.sender.as_ref().ok_or(NotifyError::Unavailable)?;
        sender.send(job).map_err(|_| NotifyError::Unavailable)
    }
}

impl Notifier for BackgroundNotifier {
    fn notify(&self, appointment: &Appointment, kind: NotificationKind) -> Result<(), NotifyError> {
        self.enqueue(Job::Appointment(appointment.clone(), kind))
    }

    fn notify_profile(&self, profile: &Profile, kind: NotificationKind) -> Result<(), NotifyError> {
        self.enqueue(Job::Profile(profile.clone(), kind))
    }
}

impl Drop for BackgroundNotifier {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

/// Test double that records every notification it receives.
///
/// `sent` holds the appointment or profile id with the kind.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingNotifier {
    pub sent: std::sync::Mutex<Vec<(i64, NotificationKind)>>,
    pub fail: bool,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn kinds(&self) -> Vec<NotificationKind> {
        self.sent.lock().unwrap().iter().map(|(_, k)| *k).collect()
    }
}

#[cfg(test)]
impl Notifier for RecordingNotifier {
    fn notify(&self, appointment: &Appointment, kind: NotificationKind) -> Result<(), NotifyError> {
        self.record(appointment.id, kind)
    }

    fn notify_profile(&self, profile: &Profile, kind: NotificationKind) -> Result<(), NotifyError> {
        self.record(profile.id, kind)
    }
}

#[cfg(test)]
impl RecordingNotifier {
    fn record(&self, id: i64, kind: NotificationKind) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push((id, kind));
        if self.fail {
            return Err(NotifyError::Rejected("mail server down".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppointmentState, Priority};
    use chrono::NaiveDateTime;

    fn appointment(id: i64) -> Appointment {
        let at = NaiveDateTime::parse_from_str("2026-03-02 09:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        Appointment {
            id,
            guest_id: 1,
            patient_name: "Chen".into(),
            demand: "Rash".into(),
            wechat_id: "chen_5".into(),
            priority: Priority::Medium,
            state: AppointmentState::Responded,
            annotation: String::new(),
            note: String::new(),
            today_modified_count: 0,
            created_at: at,
            responded_at: Some(at),
            urged_at: None,
            processed_at: None,
            deleted_at: None,
            last_modified_at: None,
        }
    }

    #[test]
    fn log_notifier_never_fails() {
        assert!(LogNotifier
            .notify(&appointment(1), NotificationKind::Responded)
            .is_ok());
    }

    #[test]
    fn silent_notify_swallows_errors() {
        let notifier = RecordingNotifier::failing();
        notify_silently(&notifier, &appointment(3), NotificationKind::Processed);
        assert_eq!(notifier.kinds(), vec![NotificationKind::Processed]);
    }

    #[test]
    fn background_notifier_delivers_in_order_before_drop_returns() {
        let recorder = Arc::new(RecordingNotifier::default());
        let background = BackgroundNotifier::start(recorder.clone());

        background.notify(&appointment(1), NotificationKind::Responded).unwrap();
        background.notify(&appointment(1), NotificationKind::UrgeProcessed).unwrap();
        background.notify(&appointment(2), NotificationKind::Processed).unwrap();
        drop(background);

        let sent = recorder.sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![
                (1, NotificationKind::Responded),
                (1, NotificationKind::UrgeProcessed),
                (2, NotificationKind::Processed),
            ]
        );
    }

    #[test]
    fn background_notifier_forwards_profile_notices() {
        let recorder = Arc::new(RecordingNotifier::default());
        let background = BackgroundNotifier::start(recorder.clone());
        let at = appointment(1).created_at;
        let profile = Profile {
            id: 7,
            name: "Chen".into(),
            guest_id: Some(1),
            wechat_id: String::new(),
            notes: String::new(),
            overview: String::new(),
            is_urged: false,
            created_at: at,
            updated_at: at,
        };

        background.notify(&appointment(1), NotificationKind::Responded).unwrap();
        background
            .notify_profile(&profile, NotificationKind::ProfileReplied)
            .unwrap();
        drop(background);

        assert_eq!(
            recorder.kinds(),
            vec![NotificationKind::Responded, NotificationKind::ProfileReplied]
        );
    }

    #[test]
    fn background_worker_survives_inner_failures() {
        let recorder = Arc::new(RecordingNotifier::failing());
        let background = BackgroundNotifier::start(recorder.clone());
        background.notify(&appointment(1), NotificationKind::Responded).unwrap();
        background.notify(&appointment(2), NotificationKind::Responded).unwrap();
        drop(background);
        assert_eq!(recorder.sent.lock().unwrap().len(), 2);
    }
}
