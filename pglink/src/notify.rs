//! Asynchronous messages from the server.
//!
//! `NOTIFY` payloads are queued until read with
//! [`Connection::notifications`][crate::Connection::notifications]. Notices
//! are handed to every handler registered with
//! [`Connection::on_notice`][crate::Connection::on_notice].
use parking_lot::Mutex;
use std::{collections::VecDeque, sync::Arc};

use crate::{
    common::log_warn,
    postgres::{DatabaseError, backend::NotificationResponse},
};

/// A `NOTIFY` received on a channel this session listens to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Process id of the notifying backend.
    pub process_id: u32,
    pub channel: String,
    pub payload: String,
}

impl From<NotificationResponse> for Notification {
    fn from(value: NotificationResponse) -> Self {
        Self {
            process_id: value.process_id,
            channel: value.channel,
            payload: value.payload,
        }
    }
}

/// Callback for `NoticeResponse`.
pub type NoticeHandler = Arc<dyn Fn(&DatabaseError) + Send + Sync>;

/// Notification queue and notice handlers.
///
/// Locked separately from the session, so notifications can be read while
/// another thread runs a command.
#[derive(Default)]
pub(crate) struct Sink {
    notifications: Mutex<VecDeque<Notification>>,
    handlers: Mutex<Vec<NoticeHandler>>,
}

impl Sink {
    pub(crate) fn notify(&self, notification: Notification) {
        self.notifications.lock().push_back(notification);
    }

    pub(crate) fn notice(&self, notice: &DatabaseError) {
        log_warn!("{notice}");
        // handlers may register more handlers
        let handlers = self.handlers.lock().clone();
        for handler in handlers {
            handler(notice);
        }
    }

    pub(crate) fn on_notice(&self, handler: NoticeHandler) {
        self.handlers.lock().push(handler);
    }

    /// Take every queued notification.
    pub(crate) fn drain(&self) -> Vec<Notification> {
        self.notifications.lock().drain(..).collect()
    }
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sink")
            .field("notifications", &self.notifications.lock().len())
            .field("handlers", &self.handlers.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn notice() -> DatabaseError {
        DatabaseError::parse(bytes::Bytes::from_static(b"SNOTICE\0VNOTICE\0C00000\0Mhi\0\0")).unwrap()
    }

    #[test]
    fn queue_order() {
        let sink = Sink::default();
        for payload in ["a", "b"] {
            sink.notify(Notification { process_id: 1, channel: "c".into(), payload: payload.into() });
        }
        let drained = sink.drain();
        assert_eq!(drained.iter().map(|e| e.payload.as_str()).collect::<Vec<_>>(), ["a", "b"]);
        assert!(sink.drain().is_empty());
    }

    #[test]
    fn every_handler_called() {
        let sink = Sink::default();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let count = count.clone();
            sink.on_notice(Arc::new(move |_| {
                count.fetch_add(1, Ordering::Relaxed);
            }));
        }
        sink.notice(&notice());
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn handler_registers_handler() {
        let sink = Arc::new(Sink::default());
        let count = Arc::new(AtomicUsize::new(0));

        let inner = sink.clone();
        let outer_count = count.clone();
        sink.on_notice(Arc::new(move |_| {
            let count = outer_count.clone();
            inner.on_notice(Arc::new(move |_| {
                count.fetch_add(1, Ordering::Relaxed);
            }));
        }));

        // registered during the first notice, called from the second on
        sink.notice(&notice());
        assert_eq!(count.load(Ordering::Relaxed), 0);
        sink.notice(&notice());
        assert_eq!(count.load(Ordering::Relaxed), 1);
        assert_eq!(sink.handlers.lock().len(), 3);
    }
}
