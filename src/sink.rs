use crate::level::{Level, SignalKind};
use std::rc::Rc;

/// Downstream of both watchers. Called synchronously on the dispatcher thread; an
/// implementation must return quickly (schedule a redraw, write a log line) and never block.
pub trait NotificationSink {
    fn report(&self, kind: SignalKind, value: Level);
}

impl<T: NotificationSink + ?Sized> NotificationSink for Rc<T> {
    fn report(&self, kind: SignalKind, value: Level) {
        (**self).report(kind, value)
    }
}

/// Sink shared by both watchers of one dispatcher
pub type SharedSink = Rc<dyn NotificationSink>;

/// Headless sink: one log line per report
#[derive(Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn report(&self, kind: SignalKind, value: Level) {
        tracing::info!(kind = %kind, level = value.value(), "{} {}", kind, value);
    }
}
