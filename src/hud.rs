//! Throttled, one-way publication of debug state to an overlay.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::api::HudSink;

/// What the overlay sees. Plain data; the overlay cannot reach back into the
/// simulation through it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct HudSnapshot {
    pub camera_x: f32,
    pub camera_y: f32,
    pub player_x: f32,
    pub player_y: f32,
    pub fps: f32,
    pub step_ms: f32,
    pub entity_count: usize,
    pub grounded: bool,
    pub hitboxes_visible: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HudConfig {
    /// Seconds of tick time between publications.
    pub interval: f32,
    /// Seconds of wall time the fps estimate is averaged over.
    pub fps_window: f32,
}

impl Default for HudConfig {
    fn default() -> Self {
        Self {
            interval: 0.2,
            fps_window: 0.5,
        }
    }
}

/// Frame-rate and step-cost figures the bridge maintains for the snapshot.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct HudMetrics {
    pub fps: f32,
    pub step_ms: f32,
}

#[derive(Debug)]
pub struct HudBridge {
    interval: f32,
    fps_window: Duration,
    since_publish: f32,
    window_frames: u32,
    window_time: Duration,
    metrics: HudMetrics,
    published: u64,
}

impl HudBridge {
    pub fn new(cfg: &HudConfig) -> Self {
        let fps_window = Duration::try_from_secs_f32(cfg.fps_window)
            .ok()
            .filter(|d| !d.is_zero())
            .unwrap_or(Duration::from_millis(500));
        Self {
            interval: cfg.interval.max(0.0),
            fps_window,
            since_publish: 0.0,
            window_frames: 0,
            window_time: Duration::ZERO,
            metrics: HudMetrics::default(),
            published: 0,
        }
    }

    /// Count one rendered frame lasting `frame_time` and remember the cost of
    /// the latest simulation step.
    pub fn record_frame(&mut self, frame_time: Duration, step_ms: f32) {
        self.metrics.step_ms = step_ms;
        self.window_frames += 1;
        self.window_time += frame_time;
        if self.window_time >= self.fps_window {
            self.metrics.fps = self.window_frames as f32 / self.window_time.as_secs_f32();
            self.window_frames = 0;
            self.window_time = Duration::ZERO;
        }
    }

    /// Add `dt` of tick time. Once an interval has built up, `build` is asked
    /// for a snapshot and the sink receives it. Returns whether it published.
    pub fn advance<F>(&mut self, dt: f32, sink: &mut dyn HudSink, build: F) -> bool
    where
        F: FnOnce(&HudMetrics) -> HudSnapshot,
    {
        self.since_publish += dt.max(0.0);
        if self.since_publish < self.interval {
            return false;
        }
        // At most one publication per call, and no backlog afterwards.
        self.since_publish -= self.interval;
        if self.since_publish >= self.interval {
            self.since_publish = 0.0;
        }
        let snapshot = build(&self.metrics);
        sink.publish(&snapshot);
        self.published += 1;
        trace!(published = self.published, fps = snapshot.fps, "hud snapshot");
        true
    }

    pub fn metrics(&self) -> HudMetrics {
        self.metrics
    }

    pub fn published(&self) -> u64 {
        self.published
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink_into(out: &mut Vec<HudSnapshot>) -> impl FnMut(&HudSnapshot) + '_ {
        move |s: &HudSnapshot| out.push(*s)
    }

    #[test]
    fn test_publishes_every_interval_of_tick_time() {
        let mut hud = HudBridge::new(&HudConfig::default());
        let mut got = Vec::new();
        let mut sink = sink_into(&mut got);
        let mut publications = 0;
        // 60 ticks of 1/60s = 1s → five 200ms intervals
        for i in 0..60 {
            if hud.advance(1.0 / 60.0, &mut sink, |_| HudSnapshot {
                entity_count: i,
                ..HudSnapshot::default()
            }) {
                publications += 1;
            }
        }
        drop(sink);
        assert!((4..=5).contains(&publications));
        assert_eq!(got.len(), publications);
        assert_eq!(hud.published() as usize, publications);
    }

    #[test]
    fn test_long_tick_publishes_once() {
        let mut hud = HudBridge::new(&HudConfig::default());
        let mut count = 0;
        let mut sink = |_: &HudSnapshot| count += 1;
        assert!(hud.advance(2.0, &mut sink, |_| HudSnapshot::default()));
        assert!(!hud.advance(0.01, &mut sink, |_| HudSnapshot::default()));
        drop(sink);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_fps_from_frames_over_wall_time() {
        let mut hud = HudBridge::new(&HudConfig::default());
        for _ in 0..30 {
            hud.record_frame(Duration::from_millis(20), 1.5);
        }
        let m = hud.metrics();
        assert!((m.fps - 50.0).abs() < 0.5, "fps {}", m.fps);
        assert!((m.step_ms - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_value(HudSnapshot {
            grounded: true,
            entity_count: 3,
            ..HudSnapshot::default()
        })
        .unwrap();
        assert_eq!(json["grounded"], true);
        assert_eq!(json["entity_count"], 3);
    }
}
