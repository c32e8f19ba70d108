//! Events from the engine to whatever draws the UI

use std::collections::VecDeque;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use drummimasin_core::{SequencerObserver, TrackId};
use tracing::trace;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// Playhead moved; `time` is on the audio clock
    StepChanged { step: usize, time: f64, generation: u64 },
    PatternChanged { track: TrackId },
    /// Carries the generation started by the stop
    TransportStopped { generation: u64 },
    RecordingStopped { auto: bool },
    /// The take could not be finalized and was dropped
    RecordingFailed { error: String },
    SampleLoaded { track: Option<TrackId>, location: String },
    SampleLoadFailed { track: Option<TrackId>, location: String, error: String },
    LiveLoopAssigned { frames: usize },
}

/// Non-blocking sender half, safe to call from the render thread
#[derive(Debug, Clone)]
pub struct UiNotifier {
    tx: Sender<UiEvent>,
}

impl UiNotifier {
    pub fn channel() -> (Self, Receiver<UiEvent>) {
        let (tx, rx) = bounded(CHANNEL_CAPACITY);
        (Self { tx }, rx)
    }

    pub fn send(&self, event: UiEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => trace!(?event, "UI queue full, event dropped"),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

impl SequencerObserver for UiNotifier {
    fn step_changed(&mut self, step: usize, time: f64, generation: u64) {
        self.send(UiEvent::StepChanged { step, time, generation });
    }

    fn pattern_changed(&mut self, track: TrackId) {
        self.send(UiEvent::PatternChanged { track });
    }
}

/// Holds step highlights until the audio clock reaches them
#[derive(Debug)]
pub struct DrawQueue {
    rx: Receiver<UiEvent>,
    pending: VecDeque<UiEvent>,
    generation: u64,
}

impl DrawQueue {
    pub fn new(rx: Receiver<UiEvent>) -> Self {
        Self { rx, pending: VecDeque::new(), generation: 0 }
    }

    fn absorb(&mut self, ready: &mut Vec<UiEvent>) {
        while let Ok(event) = self.rx.try_recv() {
            match event {
                UiEvent::StepChanged { generation, .. } if generation < self.generation => {}
                UiEvent::StepChanged { .. } => self.pending.push_back(event),
                UiEvent::TransportStopped { generation } => {
                    self.generation = self.generation.max(generation);
                    let current = self.generation;
                    self.pending.retain(|e| match e {
                        UiEvent::StepChanged { generation, .. } => *generation >= current,
                        _ => true,
                    });
                    ready.push(event);
                }
                other => ready.push(other),
            }
        }
    }

    /// Everything that should be drawn at `now`, in order
    pub fn drain_due(&mut self, now: f64) -> Vec<UiEvent> {
        let mut ready = Vec::new();
        self.absorb(&mut ready);
        while let Some(UiEvent::StepChanged { time, .. }) = self.pending.front() {
            if *time > now {
                break;
            }
            if let Some(event) = self.pending.pop_front() {
                ready.push(event);
            }
        }
        ready
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_events_wait_for_their_time() {
        let (mut notifier, rx) = UiNotifier::channel();
        let mut queue = DrawQueue::new(rx);
        notifier.step_changed(0, 0.0, 0);
        notifier.step_changed(1, 0.125, 0);
        notifier.pattern_changed(TrackId::Kick);

        let first = queue.drain_due(0.05);
        assert_eq!(
            first,
            vec![
                UiEvent::PatternChanged { track: TrackId::Kick },
                UiEvent::StepChanged { step: 0, time: 0.0, generation: 0 },
            ]
        );
        assert_eq!(queue.pending_len(), 1);
        assert_eq!(queue.drain_due(0.2).len(), 1);
    }

    #[test]
    fn test_stop_purges_old_highlights() {
        let (mut notifier, rx) = UiNotifier::channel();
        let mut queue = DrawQueue::new(rx);
        notifier.step_changed(3, 1.0, 0);
        notifier.send(UiEvent::TransportStopped { generation: 1 });
        // a late event from the old timeline
        notifier.step_changed(4, 1.125, 0);

        let events = queue.drain_due(10.0);
        assert_eq!(events, vec![UiEvent::TransportStopped { generation: 1 }]);
        assert_eq!(queue.pending_len(), 0);
    }
}
