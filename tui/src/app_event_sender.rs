use tokio::sync::mpsc::UnboundedSender;

use crate::app_event::AppEvent;

#[derive(Clone, Debug)]
pub(crate) struct AppEventSender {
    tx: UnboundedSender<AppEvent>,
}

impl AppEventSender {
    pub(crate) fn new(tx: UnboundedSender<AppEvent>) -> Self {
        Self { tx }
    }

    /// Send an event to the app loop. If it fails the app is shutting down;
    /// swallow the error and log it.
    pub(crate) fn send(&self, event: AppEvent) {
        if let Err(err) = self.tx.send(event) {
            tracing::debug!("failed to send app event: {err}");
        }
    }
}
