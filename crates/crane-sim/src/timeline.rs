//! Append-only log of time-stamped domain events.
//!
//! The audio mixer consumes the whole [`EventTimeline`] after a run, so the
//! only guarantees are insertion order and timestamps that line up with the
//! video clock (intro offset plus challenge time).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kinds of event the mixer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Impact,
    Timer,
    Victory,
    Fail,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Impact => "impact",
            Self::Timer => "timer",
            Self::Victory => "victory",
            Self::Fail => "fail",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// Seconds since the start of the video.
    pub timestamp: f64,
    pub kind: EventKind,
}

/// Insertion-ordered event log. Entries are never removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventTimeline {
    events: Vec<TimelineEvent>,
}

impl EventTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event. Timestamps must not go backwards.
    pub fn record(&mut self, timestamp: f64, kind: EventKind) {
        debug_assert!(
            self.events.last().map_or(true, |e| e.timestamp <= timestamp),
            "timeline went backwards: {kind} at {timestamp}"
        );
        tracing::trace!(%kind, timestamp, "event recorded");
        self.events.push(TimelineEvent { timestamp, kind });
    }

    pub fn events(&self) -> &[TimelineEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events of one kind.
    pub fn count(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimelineEvent> {
        self.events.iter()
    }

    pub fn into_events(self) -> Vec<TimelineEvent> {
        self.events
    }
}

// ---------------------------------------------------------------------------
// Countdown
// ---------------------------------------------------------------------------

/// Emits one cue per whole second during the last seconds of the countdown.
///
/// Edge-triggered: second `k` fires on the first update whose remaining time
/// is at or below `k`, after having been above it. Seconds the countdown never
/// starts above (a time limit shorter than the window) never fire.
#[derive(Debug, Clone, PartialEq)]
pub struct Countdown {
    next: u32,
}

impl Countdown {
    pub fn new(window: u32, time_limit: f64) -> Self {
        let mut next = window;
        while next > 0 && f64::from(next) >= time_limit {
            next -= 1;
        }
        Self { next }
    }

    /// Seconds crossed since the last update, highest first.
    pub fn update(&mut self, remaining: f64) -> Vec<u32> {
        let mut crossed = Vec::new();
        while self.next > 0 && remaining <= f64::from(self.next) {
            crossed.push(self.next);
            self.next -= 1;
        }
        crossed
    }

    /// Whether every cue has fired.
    pub fn is_finished(&self) -> bool {
        self.next == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_preserves_insertion_order() {
        let mut tl = EventTimeline::new();
        tl.record(3.5, EventKind::Impact);
        tl.record(3.5, EventKind::Impact);
        tl.record(58.0, EventKind::Timer);
        tl.record(63.0, EventKind::Fail);
        let kinds: Vec<_> = tl.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::Impact,
                EventKind::Impact,
                EventKind::Timer,
                EventKind::Fail
            ]
        );
        assert_eq!(tl.count(EventKind::Impact), 2);
        assert_eq!(tl.len(), 4);
    }

    #[test]
    fn kinds_serialize_lowercase() {
        let json = serde_json::to_string(&TimelineEvent {
            timestamp: 1.0,
            kind: EventKind::Victory,
        })
        .unwrap();
        assert_eq!(json, r#"{"timestamp":1.0,"kind":"victory"}"#);
    }

    #[test]
    fn countdown_fires_each_second_once() {
        let mut cd = Countdown::new(5, 60.0);
        let fps = 30.0;
        let mut fired = Vec::new();
        for frame in 1..=1800 {
            let remaining = 60.0 - frame as f64 / fps;
            fired.extend(cd.update(remaining));
        }
        assert_eq!(fired, vec![5, 4, 3, 2, 1]);
        assert!(cd.is_finished());
    }

    #[test]
    fn countdown_catches_up_after_large_jump() {
        let mut cd = Countdown::new(5, 60.0);
        assert!(cd.update(10.0).is_empty());
        assert_eq!(cd.update(3.2), vec![5, 4]);
        assert!(cd.update(3.1).is_empty());
        assert_eq!(cd.update(0.0), vec![3, 2, 1]);
    }

    #[test]
    fn short_time_limit_skips_seconds_never_crossed() {
        let mut cd = Countdown::new(5, 3.0);
        assert_eq!(cd.update(3.0), Vec::<u32>::new());
        assert_eq!(cd.update(2.0), vec![2]);
    }
}
