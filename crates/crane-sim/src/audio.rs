//! Mapping from timeline events to the sound cues the mixer overlays.
//!
//! The mixer itself lives outside the core. This module only decides which
//! named sound plays when, so a run's soundtrack is as reproducible as its
//! trajectory.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::SimConfig;
use crate::timeline::{EventKind, EventTimeline};

pub const BACKGROUND_LOOP: &str = "bpm_loop";
pub const TIMER_SOUND: &str = "timer";
pub const FAIL_SOUND: &str = "fail";
/// Cues played together on victory.
pub const VICTORY_SOUNDS: [&str; 3] = ["victory", "win_music", "applause"];

/// A named sound placed on the video clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundCue {
    pub timestamp: f64,
    pub name: String,
    /// Set for looped tracks: how long the loop runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub looped_for: Option<f64>,
}

impl SoundCue {
    fn once(timestamp: f64, name: &str) -> Self {
        Self {
            timestamp,
            name: name.to_owned(),
            looped_for: None,
        }
    }
}

/// Build the cue list for a finished run of `duration` seconds.
///
/// The background loop comes first. Each impact picks a variant from
/// `config.impact_sounds`, never the one the previous impact used (unless
/// only one exists).
pub fn plan_cues(
    timeline: &EventTimeline,
    duration: f64,
    config: &SimConfig,
    rng: &mut impl Rng,
) -> Vec<SoundCue> {
    let mut cues = vec![SoundCue {
        timestamp: 0.0,
        name: BACKGROUND_LOOP.to_owned(),
        looped_for: Some(duration),
    }];
    let mut last_impact: Option<&str> = None;

    for event in timeline.iter() {
        match event.kind {
            EventKind::Impact => {
                let Some(name) = pick_impact(&config.impact_sounds, last_impact, rng) else {
                    continue;
                };
                cues.push(SoundCue::once(event.timestamp, name));
                last_impact = Some(name);
            }
            EventKind::Timer => cues.push(SoundCue::once(event.timestamp, TIMER_SOUND)),
            EventKind::Victory => cues.extend(
                VICTORY_SOUNDS
                    .iter()
                    .map(|name| SoundCue::once(event.timestamp, name)),
            ),
            EventKind::Fail => cues.push(SoundCue::once(event.timestamp, FAIL_SOUND)),
        }
    }
    cues
}

fn pick_impact<'a>(
    sounds: &'a [String],
    previous: Option<&str>,
    rng: &mut impl Rng,
) -> Option<&'a str> {
    let fresh: Vec<&String> = sounds
        .iter()
        .filter(|s| Some(s.as_str()) != previous)
        .collect();
    if fresh.is_empty() {
        sounds.first().map(String::as_str)
    } else {
        fresh.choose(rng).map(|s| s.as_str())
    }
}
