//! A notifier that records everything it is asked to show.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use mailseal_pipeline::{Notice, NotificationId, Notifier, PopupId};

/// Recording notifier for assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    next_id: AtomicU32,
    warnings: Mutex<Vec<(NotificationId, Notice)>>,
    errors: Mutex<Vec<Notice>>,
    cleared: Mutex<Vec<NotificationId>>,
    refocused: Mutex<Vec<PopupId>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings(&self) -> Vec<(NotificationId, Notice)> {
        self.warnings.lock().expect("lock").clone()
    }

    pub fn errors(&self) -> Vec<Notice> {
        self.errors.lock().expect("lock").clone()
    }

    pub fn cleared(&self) -> Vec<NotificationId> {
        self.cleared.lock().expect("lock").clone()
    }

    pub fn refocused(&self) -> Vec<PopupId> {
        self.refocused.lock().expect("lock").clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn warn(&self, notice: Notice) -> NotificationId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.warnings.lock().expect("lock").push((id, notice));
        id
    }

    async fn error(&self, notice: Notice) {
        self.errors.lock().expect("lock").push(notice);
    }

    async fn clear(&self, id: NotificationId) {
        self.cleared.lock().expect("lock").push(id);
    }

    async fn refocus_popup(&self, popup: PopupId) {
        self.refocused.lock().expect("lock").push(popup);
    }
}
