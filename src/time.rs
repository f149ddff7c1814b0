//! Frame timing for the simulation.
//!
//! One clock per frame loop. Every delta handed to the simulation goes
//! through [`FrameClock::tick`], which clamps it to [`MAX_DELTA`] so a stall
//! (debugger, tab suspend) never produces an explosive integration step.

use std::time::Instant;

/// Maximum delta time in seconds fed to any simulation step.
pub const MAX_DELTA: f32 = 0.25;

/// Frame clock with clamped deltas and a seed source for the spawn kernel.
#[derive(Debug)]
pub struct FrameClock {
    start: Instant,
    last_frame: Instant,
    elapsed_secs: f32,
    delta_secs: f32,
    frame_count: u64,
    paused: bool,
    /// Fixed delta override for deterministic updates (tests, replays).
    fixed_delta: Option<f32>,
}

impl FrameClock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_frame: now,
            elapsed_secs: 0.0,
            delta_secs: 0.0,
            frame_count: 0,
            paused: false,
            fixed_delta: None,
        }
    }

    /// Advance the clock. Call once per frame.
    ///
    /// Returns the delta time in seconds, already clamped to [`MAX_DELTA`].
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();

        if self.paused {
            self.last_frame = now;
            self.delta_secs = 0.0;
            return 0.0;
        }

        let raw = now.duration_since(self.last_frame).as_secs_f32();
        self.delta_secs = self.fixed_delta.unwrap_or(raw).min(MAX_DELTA);
        self.last_frame = now;
        self.elapsed_secs += self.delta_secs;
        self.frame_count += 1;

        self.delta_secs
    }

    /// Simulated elapsed seconds (sum of clamped deltas).
    #[inline]
    pub fn elapsed(&self) -> f32 {
        self.elapsed_secs
    }

    /// Delta of the most recent tick, in seconds.
    #[inline]
    pub fn delta(&self) -> f32 {
        self.delta_secs
    }

    /// Frames ticked since creation.
    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame_count
    }

    /// Elapsed simulation time in whole milliseconds, used to seed the
    /// per-slot spawn hash. Wraps after ~49 days, which is fine for a seed.
    #[inline]
    pub fn seed_millis(&self) -> u32 {
        (self.elapsed_secs * 1000.0) as u32
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// While paused, `tick` returns 0 and elapsed time stops advancing.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        if self.paused {
            self.last_frame = Instant::now();
            self.paused = false;
        }
    }

    /// Use a fixed delta regardless of wall time. Pass `None` for real timing.
    /// The fixed value is still clamped to [`MAX_DELTA`].
    pub fn set_fixed_delta(&mut self, delta: Option<f32>) {
        self.fixed_delta = delta;
    }

    pub fn reset(&mut self) {
        let now = Instant::now();
        self.start = now;
        self.last_frame = now;
        self.elapsed_secs = 0.0;
        self.delta_secs = 0.0;
        self.frame_count = 0;
        self.paused = false;
    }

    /// The instant the clock was created or last reset.
    #[inline]
    pub fn start_instant(&self) -> Instant {
        self.start
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
