use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use stride_source::FrameSource;

use crate::trajectory::Trajectory;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    /// Stop at the boundary.
    Once,
    /// Wrap to the opposite bound.
    Loop,
    /// Flip direction at the boundary.
    Bounce,
}

impl Default for LoopMode {
    fn default() -> Self {
        LoopMode::Loop
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Backward,
}

impl Default for Direction {
    fn default() -> Self {
        Direction::Forward
    }
}

/// How frames blend between real cache entries during playback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    None,
    Linear,
    Spline,
}

impl Default for Interpolation {
    fn default() -> Self {
        Interpolation::None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayState {
    Stopped,
    Playing,
    Paused,
}

fn default_step() -> usize {
    1
}

fn default_interval_ms() -> u64 {
    50
}

fn default_interpolate_step() -> usize {
    5
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerOptions {
    /// Frames advanced per tick, at least 1.
    #[serde(default = "default_step")]
    pub step: usize,
    /// Wall-clock spacing between advancements, in ms. With interpolation
    /// the effective spacing is `interval_ms / (interpolate_step + 1)`.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// First frame of the playback range; `stop` resets here.
    #[serde(default)]
    pub start: usize,
    /// Last frame of the playback range; `None` plays to the end.
    #[serde(default)]
    pub end: Option<usize>,
    #[serde(default)]
    pub mode: LoopMode,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub interpolation: Interpolation,
    /// Blended sub-steps inserted between consecutive real frames.
    #[serde(default = "default_interpolate_step")]
    pub interpolate_step: usize,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            step: 1,
            interval_ms: 50,
            start: 0,
            end: None,
            mode: LoopMode::Loop,
            direction: Direction::Forward,
            interpolation: Interpolation::None,
            interpolate_step: 5,
        }
    }
}

/// Timed playback driver over one trajectory. The player owns no timer; the
/// host loop calls `tick` with the current instant and the player decides
/// whether enough time has passed to advance. Advancement is gated on the
/// trajectory being idle, so at most one frame load is ever in flight.
pub struct Player {
    options: PlayerOptions,
    state: PlayState,
    direction: Direction,
    lead: Option<usize>,
    sub_step: usize,
    last_tick: Option<Instant>,
}

impl Player {
    pub fn new(options: PlayerOptions) -> Self {
        let direction = options.direction;
        Self {
            options,
            state: PlayState::Stopped,
            direction,
            lead: None,
            sub_step: 0,
            last_tick: None,
        }
    }

    pub fn options(&self) -> &PlayerOptions {
        &self.options
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn play(&mut self) {
        if self.state != PlayState::Playing {
            self.state = PlayState::Playing;
            self.last_tick = None;
        }
    }

    pub fn pause(&mut self) {
        if self.state == PlayState::Playing {
            self.state = PlayState::Paused;
        }
    }

    pub fn toggle(&mut self) {
        match self.state {
            PlayState::Playing => self.pause(),
            _ => self.play(),
        }
    }

    /// Stops playback and rewinds the trajectory to the configured start.
    pub fn stop<S: FrameSource>(&mut self, traj: &mut Trajectory<S>) {
        self.state = PlayState::Stopped;
        self.direction = self.options.direction;
        self.lead = None;
        self.sub_step = 0;
        self.last_tick = None;
        traj.set_frame(self.options.start);
    }

    /// Applies on the next tick; bounce reversals since the last
    /// `set_direction` are overridden.
    pub fn set_direction(&mut self, direction: Direction) {
        self.options.direction = direction;
        self.direction = direction;
    }

    pub fn set_mode(&mut self, mode: LoopMode) {
        self.options.mode = mode;
    }

    pub fn set_step(&mut self, step: usize) {
        self.options.step = step.max(1);
    }

    pub fn set_interpolation(&mut self, interpolation: Interpolation) {
        self.options.interpolation = interpolation;
        self.sub_step = 0;
    }

    /// One scheduling opportunity. Returns true when the player acted:
    /// requested a frame, emitted a blend, or hit a stopping boundary.
    /// Returns false while stopped or paused, while the interval has not
    /// elapsed, before the frame count resolves, and while a load is in
    /// flight (backpressure).
    pub fn tick<S: FrameSource>(&mut self, traj: &mut Trajectory<S>, now: Instant) -> bool {
        if self.state != PlayState::Playing {
            return false;
        }
        let count = match traj.frame_count() {
            Some(count) if count > 0 => count,
            _ => return false,
        };
        if traj.is_loading() {
            return false;
        }
        if !self.interval_elapsed(now) {
            return false;
        }
        let (lo, hi) = self.bounds(count);
        let acted = if self.options.interpolation == Interpolation::None {
            self.advance(traj, lo, hi)
        } else {
            self.advance_interpolated(traj, lo, hi)
        };
        if acted {
            self.last_tick = Some(now);
        }
        acted
    }

    fn interval_elapsed(&self, now: Instant) -> bool {
        match self.last_tick {
            Some(last) => now.duration_since(last) >= self.effective_interval(),
            None => true,
        }
    }

    fn effective_interval(&self) -> Duration {
        let base = Duration::from_millis(self.options.interval_ms);
        if self.options.interpolation == Interpolation::None {
            base
        } else {
            base / (self.options.interpolate_step as u32 + 1)
        }
    }

    fn bounds(&self, count: usize) -> (usize, usize) {
        let hi = self
            .options
            .end
            .map(|end| end.min(count - 1))
            .unwrap_or(count - 1);
        let lo = self.options.start.min(hi);
        (lo, hi)
    }

    fn advance<S: FrameSource>(&mut self, traj: &mut Trajectory<S>, lo: usize, hi: usize) -> bool {
        let current = match traj.current_index() {
            Some(current) => current.clamp(lo, hi),
            None => {
                traj.set_frame(if self.direction == Direction::Forward { lo } else { hi });
                return true;
            }
        };
        match self.next_index(current, lo, hi) {
            Some(next) => {
                traj.set_frame(next);
            }
            None => {
                log::debug!("playback reached frame {current}, stopping");
                self.state = PlayState::Stopped;
            }
        }
        true
    }

    fn advance_interpolated<S: FrameSource>(
        &mut self,
        traj: &mut Trajectory<S>,
        lo: usize,
        hi: usize,
    ) -> bool {
        let lead = match self.lead {
            Some(lead) => lead.clamp(lo, hi),
            None => traj
                .current_index()
                .map(|current| current.clamp(lo, hi))
                .unwrap_or(if self.direction == Direction::Forward { lo } else { hi }),
        };
        self.lead = Some(lead);
        if !traj.has_frame(lead) {
            // only the leading frame is ever loaded; trailing window
            // members fall back to cached neighbors inside interpolate
            traj.prefetch(lead);
            return true;
        }
        let t = self.sub_step as f32 / (self.options.interpolate_step + 1) as f32;
        traj.interpolate(self.window(lead, lo, hi), t, self.options.interpolation);
        self.sub_step += 1;
        if self.sub_step > self.options.interpolate_step {
            self.sub_step = 0;
            match self.next_index(lead, lo, hi) {
                Some(next) => self.lead = Some(next),
                None => {
                    self.state = PlayState::Stopped;
                    traj.set_frame(lead);
                }
            }
        }
        true
    }

    /// The frame after `current`, honoring direction, range and loop mode.
    /// `None` means a stopping boundary under `Once`. Bounce flips the live
    /// direction as a side effect.
    fn next_index(&mut self, current: usize, lo: usize, hi: usize) -> Option<usize> {
        let step = self.options.step.max(1);
        match self.direction {
            Direction::Forward => {
                if current >= hi {
                    match self.options.mode {
                        LoopMode::Once => None,
                        LoopMode::Loop => Some(lo),
                        LoopMode::Bounce => {
                            self.direction = Direction::Backward;
                            Some(current.saturating_sub(step).max(lo))
                        }
                    }
                } else {
                    Some((current + step).min(hi))
                }
            }
            Direction::Backward => {
                if current <= lo {
                    match self.options.mode {
                        LoopMode::Once => None,
                        LoopMode::Loop => Some(hi),
                        LoopMode::Bounce => {
                            self.direction = Direction::Forward;
                            Some((current + step).min(hi))
                        }
                    }
                } else {
                    Some(current.saturating_sub(step).max(lo))
                }
            }
        }
    }

    /// Interpolation window: the leading frame plus the two frames behind
    /// it in playback order, clamped into the range.
    fn window(&self, lead: usize, lo: usize, hi: usize) -> [usize; 3] {
        let step = self.options.step.max(1);
        let mut window = [lead; 3];
        for (k, slot) in window.iter_mut().enumerate().skip(1) {
            *slot = match self.direction {
                Direction::Forward => lead.saturating_sub(k * step).max(lo),
                Direction::Backward => (lead + k * step).min(hi),
            };
        }
        window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(mode: LoopMode, direction: Direction, step: usize) -> Player {
        Player::new(PlayerOptions {
            step,
            mode,
            direction,
            ..PlayerOptions::default()
        })
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: PlayerOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, PlayerOptions::default());
        let partial: PlayerOptions =
            serde_json::from_str(r#"{"mode": "bounce", "direction": "backward", "step": 3}"#)
                .unwrap();
        assert_eq!(partial.mode, LoopMode::Bounce);
        assert_eq!(partial.direction, Direction::Backward);
        assert_eq!(partial.step, 3);
        assert_eq!(partial.interval_ms, 50);
    }

    #[test]
    fn loop_mode_wraps_at_both_bounds() {
        let mut p = player(LoopMode::Loop, Direction::Forward, 1);
        assert_eq!(p.next_index(8, 0, 9), Some(9));
        assert_eq!(p.next_index(9, 0, 9), Some(0));
        let mut p = player(LoopMode::Loop, Direction::Backward, 1);
        assert_eq!(p.next_index(0, 0, 9), Some(9));
    }

    #[test]
    fn once_mode_stops_at_the_boundary() {
        let mut p = player(LoopMode::Once, Direction::Forward, 4);
        assert_eq!(p.next_index(6, 0, 9), Some(9), "overshoot clamps first");
        assert_eq!(p.next_index(9, 0, 9), None);
        let mut p = player(LoopMode::Once, Direction::Backward, 1);
        assert_eq!(p.next_index(0, 0, 9), None);
    }

    #[test]
    fn bounce_mode_flips_direction() {
        let mut p = player(LoopMode::Bounce, Direction::Forward, 2);
        assert_eq!(p.next_index(9, 0, 9), Some(7));
        assert_eq!(p.direction(), Direction::Backward);
        assert_eq!(p.next_index(1, 0, 9), Some(0), "clamps before reversing");
        assert_eq!(p.direction(), Direction::Backward);
        assert_eq!(p.next_index(0, 0, 9), Some(2));
        assert_eq!(p.direction(), Direction::Forward);
    }

    #[test]
    fn interpolation_window_trails_the_lead() {
        let mut p = player(LoopMode::Loop, Direction::Forward, 2);
        p.set_interpolation(Interpolation::Linear);
        assert_eq!(p.window(6, 0, 9), [6, 4, 2]);
        assert_eq!(p.window(1, 0, 9), [1, 0, 0]);
        p.set_direction(Direction::Backward);
        assert_eq!(p.window(6, 0, 9), [6, 8, 9]);
    }

    #[test]
    fn interpolation_shrinks_the_effective_interval() {
        let p = player(LoopMode::Loop, Direction::Forward, 1);
        assert_eq!(p.effective_interval(), Duration::from_millis(50));
        let mut p = player(LoopMode::Loop, Direction::Forward, 1);
        p.set_interpolation(Interpolation::Spline);
        assert_eq!(
            p.effective_interval(),
            Duration::from_millis(50) / 6
        );
    }
}
