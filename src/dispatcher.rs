//! Serialized execution context for both watchers
//!
//! Platform callbacks (CoreAudio HAL threads, the event tap on the main run loop) never
//! touch watcher state. They post a [`LoopEvent`] through a [`LoopNotifier`] and the run
//! loop calls [`Dispatcher::pump`], which routes queued events in arrival order and fires
//! the brightness poll when it is due.
use std::sync::mpsc::{channel, Receiver, Sender};
use std::time::{Duration, Instant};

use crate::audio_watcher::{AudioBackend, AudioSignalWatcher};
use crate::brightness::{BrightnessEstimator, BrightnessSource};
use crate::config::Config;
use crate::constants;
use crate::intercept::{HardwareKey, KeyIntercept};
use crate::level::Level;
use crate::sink::SharedSink;

/// Something a platform callback observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEvent {
    VolumeChanged,
    OutputDeviceChanged,
    HardwareKey(HardwareKey),
}

/// Cloneable, thread-safe handle for posting events to the dispatcher
#[derive(Debug, Clone)]
pub struct LoopNotifier {
    tx: Sender<LoopEvent>,
}

impl LoopNotifier {
    pub fn notify(&self, event: LoopEvent) {
        // The receiver only goes away at shutdown; late callbacks are dropped
        let _ = self.tx.send(event);
    }
}

pub fn event_channel() -> (LoopNotifier, Receiver<LoopEvent>) {
    let (tx, rx) = channel();
    (LoopNotifier { tx }, rx)
}

/// Fixed-interval repeating timer driven by the run loop's clock
#[derive(Debug, Clone)]
pub struct PollTimer {
    interval: Duration,
    next_due: Option<Instant>,
}

impl PollTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    pub fn arm(&mut self, now: Instant) {
        self.next_due = Some(now + self.interval);
    }

    pub fn cancel(&mut self) {
        self.next_due = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.next_due
    }

    /// Fires at most once per call. After a stall the next deadline is counted from `now`
    /// rather than replaying every missed tick.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        let Some(due) = self.next_due else {
            return false;
        };
        if now < due {
            return false;
        }

        let mut next = due + self.interval;
        if next <= now {
            next = now + self.interval;
        }
        self.next_due = Some(next);
        true
    }
}

pub struct Dispatcher<A, S, K>
where
    A: AudioBackend,
    S: BrightnessSource,
    K: KeyIntercept,
{
    audio: Option<AudioSignalWatcher<A>>,
    brightness: Option<BrightnessEstimator<S, K>>,
    timer: PollTimer,
    notifier: LoopNotifier,
    events: Receiver<LoopEvent>,
    started: bool,
}

impl<A, S, K> Dispatcher<A, S, K>
where
    A: AudioBackend,
    S: BrightnessSource,
    K: KeyIntercept,
{
    /// Register the sink and build the watchers the config enables. Nothing is acquired
    /// until [`Dispatcher::start`].
    pub fn attach(
        config: &Config,
        audio_backend: A,
        brightness_source: S,
        key_intercept: K,
        sink: SharedSink,
    ) -> Self {
        let threshold = config.debounce_threshold;

        let audio = config
            .volume
            .enabled
            .then(|| AudioSignalWatcher::new(audio_backend, sink.clone(), threshold));

        let brightness = config.brightness.enabled.then(|| {
            BrightnessEstimator::new(
                brightness_source,
                key_intercept,
                sink.clone(),
                threshold,
                config.brightness.key_step,
                Level::clamp(config.brightness.initial_estimate)
                    .or_else(|| Level::clamp(constants::brightness::INITIAL_ESTIMATE))
                    .unwrap_or(Level::MIN),
            )
        });

        let (notifier, events) = event_channel();

        Self {
            audio,
            brightness,
            timer: PollTimer::new(Duration::from_millis(config.brightness.poll_interval_ms)),
            notifier,
            events,
            started: false,
        }
    }

    pub fn notifier(&self) -> LoopNotifier {
        self.notifier.clone()
    }

    pub fn audio(&self) -> Option<&AudioSignalWatcher<A>> {
        self.audio.as_ref()
    }

    pub fn brightness(&self) -> Option<&BrightnessEstimator<S, K>> {
        self.brightness.as_ref()
    }

    pub fn start(&mut self, now: Instant) {
        if self.started {
            return;
        }
        self.started = true;

        if let Some(audio) = self.audio.as_mut() {
            audio.start(self.notifier.clone());
        }
        if let Some(brightness) = self.brightness.as_mut() {
            brightness.start(self.notifier.clone());
            self.timer.arm(now);
        }
        tracing::info!(
            volume = self.audio.is_some(),
            brightness = self.brightness.is_some(),
            "Watchers started"
        );
    }

    /// Route queued events, then run the poll if due. Returns the next timer deadline.
    pub fn pump(&mut self, now: Instant) -> Option<Instant> {
        if !self.started {
            return None;
        }

        while let Ok(event) = self.events.try_recv() {
            self.route(event);
        }

        if self.timer.fire_if_due(now) {
            if let Some(brightness) = self.brightness.as_mut() {
                brightness.on_poll();
            }
        }

        self.timer.deadline()
    }

    pub fn shutdown(&mut self) {
        if !self.started {
            return;
        }
        self.started = false;

        self.timer.cancel();
        if let Some(audio) = self.audio.as_mut() {
            audio.stop();
        }
        if let Some(brightness) = self.brightness.as_mut() {
            brightness.stop();
        }
        // Anything still queued belongs to released listeners
        while self.events.try_recv().is_ok() {}
        tracing::info!("Watchers stopped");
    }

    fn route(&mut self, event: LoopEvent) {
        match event {
            LoopEvent::VolumeChanged => {
                if let Some(audio) = self.audio.as_mut() {
                    audio.on_volume_changed();
                }
            }
            LoopEvent::OutputDeviceChanged => {
                if let Some(audio) = self.audio.as_mut() {
                    audio.on_device_changed();
                }
            }
            LoopEvent::HardwareKey(key) => {
                if let Some(brightness) = self.brightness.as_mut() {
                    brightness.on_key(key);
                }
            }
        }
    }
}

impl<A, S, K> Drop for Dispatcher<A, S, K>
where
    A: AudioBackend,
    S: BrightnessSource,
    K: KeyIntercept,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_unarmed_never_fires() {
        let mut timer = PollTimer::new(Duration::from_millis(200));
        assert!(!timer.fire_if_due(Instant::now()));
        assert_eq!(timer.deadline(), None);
    }

    #[test]
    fn test_timer_fires_on_interval() {
        let start = Instant::now();
        let mut timer = PollTimer::new(Duration::from_millis(200));
        timer.arm(start);

        assert!(!timer.fire_if_due(start + Duration::from_millis(199)));
        assert!(timer.fire_if_due(start + Duration::from_millis(200)));
        assert_eq!(timer.deadline(), Some(start + Duration::from_millis(400)));
    }

    #[test]
    fn test_timer_does_not_replay_missed_ticks() {
        let start = Instant::now();
        let mut timer = PollTimer::new(Duration::from_millis(200));
        timer.arm(start);

        let late = start + Duration::from_millis(1000);
        assert!(timer.fire_if_due(late));
        assert!(!timer.fire_if_due(late));
        assert_eq!(timer.deadline(), Some(late + Duration::from_millis(200)));
    }

    #[test]
    fn test_timer_cancel() {
        let start = Instant::now();
        let mut timer = PollTimer::new(Duration::from_millis(200));
        timer.arm(start);
        timer.cancel();
        assert!(!timer.fire_if_due(start + Duration::from_secs(1)));
    }

    #[test]
    fn test_notifier_preserves_order() {
        let (notifier, events) = event_channel();
        notifier.notify(LoopEvent::OutputDeviceChanged);
        notifier.notify(LoopEvent::VolumeChanged);

        assert_eq!(events.try_recv(), Ok(LoopEvent::OutputDeviceChanged));
        assert_eq!(events.try_recv(), Ok(LoopEvent::VolumeChanged));
        assert!(events.try_recv().is_err());
    }
}
