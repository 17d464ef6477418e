#![forbid(unsafe_code)]

//! Synthetic-trajectory playback demo: generates a jittering helix, serves
//! it through either source adapter and drives the full engine stack.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use stride_core::{AtomRange, StrideError, StrideResult, Structure};
use stride_engine::{
    LoopMode, PlayState, Player, PlayerOptions, Trajectory, TrajectoryEvent, TrajectoryOptions,
};
use stride_source::{
    FramePayload, FrameSource, FunctionSource, Reply, RequestSource, SourceCall, SourceOp,
};

fn default_frames() -> usize {
    25
}

fn default_atoms() -> usize {
    30
}

fn default_seed() -> u64 {
    7
}

fn default_box_length() -> f32 {
    24.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyntheticOptions {
    #[serde(default = "default_frames")]
    pub frames: usize,
    #[serde(default = "default_atoms")]
    pub atoms: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Cubic periodic box edge, in Angstrom.
    #[serde(default = "default_box_length")]
    pub box_length: f32,
}

impl Default for SyntheticOptions {
    fn default() -> Self {
        Self {
            frames: 25,
            atoms: 30,
            seed: 7,
            box_length: 24.0,
        }
    }
}

/// A helix of atoms rotating frame by frame, with seeded thermal jitter.
/// Identical options always generate identical coordinates.
pub struct SyntheticTrajectory {
    atoms: usize,
    cell: [f32; 9],
    frames: Vec<Vec<[f32; 3]>>,
}

impl SyntheticTrajectory {
    pub fn generate(options: &SyntheticOptions) -> Self {
        let mut rng = StdRng::seed_from_u64(options.seed);
        let l = options.box_length;
        let half = l * 0.5;
        let mut frames = Vec::with_capacity(options.frames);
        for f in 0..options.frames {
            let drift = f as f32 * 0.15;
            let mut positions = Vec::with_capacity(options.atoms);
            for a in 0..options.atoms {
                let angle = a as f32 * 0.6 + drift;
                positions.push([
                    half + 4.0 * angle.cos() + rng.gen_range(-0.05..0.05),
                    half + 4.0 * angle.sin() + rng.gen_range(-0.05..0.05),
                    half + (a as f32 - options.atoms as f32 * 0.5) * 0.3
                        + rng.gen_range(-0.05..0.05),
                ]);
            }
            frames.push(positions);
        }
        Self {
            atoms: options.atoms,
            cell: [l, 0.0, 0.0, 0.0, l, 0.0, 0.0, 0.0, l],
            frames,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn atom_count(&self) -> usize {
        self.atoms
    }

    pub fn cell(&self) -> [f32; 9] {
        self.cell
    }

    pub fn positions(&self, index: usize) -> Option<&[[f32; 3]]> {
        self.frames.get(index).map(|f| f.as_slice())
    }

    /// Flat coordinate buffer for one frame, restricted to the requested
    /// ranges. `None` for an out-of-range frame index.
    pub fn gather(&self, index: usize, ranges: &[AtomRange]) -> Option<Vec<f32>> {
        let frame = self.frames.get(index)?;
        let mut flat = Vec::new();
        for r in ranges {
            for p in &frame[r.start..r.end.min(frame.len())] {
                flat.extend_from_slice(p);
            }
        }
        Some(flat)
    }
}

/// The in-process adapter over a shared synthetic trajectory.
pub fn function_source(traj: Arc<SyntheticTrajectory>) -> FunctionSource {
    FunctionSource::new(move |call| match call {
        SourceCall::Frame {
            index,
            ranges,
            deliver,
        } => match traj.gather(index, &ranges) {
            Some(coords) => {
                deliver.deliver(Some(traj.cell()), coords, Some(traj.frame_count()))
            }
            None => deliver.fail(format!("frame {index} out of range")),
        },
        SourceCall::Count { deliver } => deliver.deliver(traj.frame_count()),
    })
}

/// The transport-shaped adapter: decodes the JSON wire payload the way a
/// remote provider would, then answers from the same synthetic data.
pub fn request_source(traj: Arc<SyntheticTrajectory>) -> RequestSource {
    RequestSource::new(move |op, payload, reply| match (op, reply) {
        (SourceOp::Frame, Reply::Frame(deliver)) => {
            match serde_json::from_value::<FramePayload>(payload) {
                Ok(decoded) => match traj.gather(decoded.frame, &decoded.atom_indices) {
                    Some(coords) => {
                        deliver.deliver(Some(traj.cell()), coords, Some(traj.frame_count()))
                    }
                    None => deliver.fail(format!("frame {} out of range", decoded.frame)),
                },
                Err(err) => deliver.fail(format!("bad frame payload: {err}")),
            }
        }
        (SourceOp::Count, Reply::Count(deliver)) => deliver.deliver(traj.frame_count()),
        (op, Reply::Frame(deliver)) => deliver.fail(format!("unexpected {op:?} reply shape")),
        (op, Reply::Count(deliver)) => deliver.fail(format!("unexpected {op:?} reply shape")),
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Function,
    Request,
}

impl Default for SourceKind {
    fn default() -> Self {
        SourceKind::Function
    }
}

impl SourceKind {
    pub fn parse(name: &str) -> StrideResult<Self> {
        match name {
            "function" => Ok(SourceKind::Function),
            "request" => Ok(SourceKind::Request),
            other => Err(StrideError::Invalid(format!(
                "unknown source kind '{other}' (expected function or request)"
            ))),
        }
    }
}

pub fn parse_loop_mode(name: &str) -> StrideResult<LoopMode> {
    match name {
        "once" => Ok(LoopMode::Once),
        "loop" => Ok(LoopMode::Loop),
        "bounce" => Ok(LoopMode::Bounce),
        other => Err(StrideError::Invalid(format!(
            "unknown loop mode '{other}' (expected once, loop or bounce)"
        ))),
    }
}

fn default_ticks() -> usize {
    100
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default)]
    pub synthetic: SyntheticOptions,
    #[serde(default)]
    pub trajectory: TrajectoryOptions,
    #[serde(default)]
    pub player: PlayerOptions,
    #[serde(default)]
    pub source: SourceKind,
    /// Player ticks that act before the run ends.
    #[serde(default = "default_ticks")]
    pub ticks: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            synthetic: SyntheticOptions::default(),
            trajectory: TrajectoryOptions::default(),
            player: PlayerOptions::default(),
            source: SourceKind::default(),
            ticks: default_ticks(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub frame_count: usize,
    pub ticks: usize,
    pub frames_presented: usize,
    pub failures: usize,
    pub cached_frames: usize,
    pub final_frame: Option<usize>,
    /// Simulation time of the final frame, in ps.
    pub final_time: Option<f32>,
}

/// Builds the configured stack and plays until `ticks` advancements have
/// happened or the player stops at a boundary.
pub fn run_playback(config: &PlaybackConfig) -> StrideResult<RunSummary> {
    let synthetic = Arc::new(SyntheticTrajectory::generate(&config.synthetic));
    let source: Box<dyn FrameSource> = match config.source {
        SourceKind::Function => Box::new(function_source(synthetic.clone())),
        SourceKind::Request => Box::new(request_source(synthetic.clone())),
    };
    let structure = Structure::new(synthetic.atom_count());
    let mut traj = Trajectory::new(source, structure, config.trajectory.clone());

    let stats = Arc::new(Mutex::new((0usize, 0usize)));
    let sink = stats.clone();
    traj.add_listener(move |event| {
        let mut stats = sink.lock().unwrap();
        match event {
            TrajectoryEvent::FrameChanged { frame } => {
                log::debug!("presented frame {}", frame.index);
                stats.0 += 1;
            }
            TrajectoryEvent::LoadFailed { index, reason } => {
                log::warn!("load failed for {index:?}: {reason}");
                stats.1 += 1;
            }
            TrajectoryEvent::CountChanged { count } => {
                log::info!("trajectory has {count} frames");
            }
        }
    });

    traj.pump();
    let frame_count = traj
        .frame_count()
        .ok_or_else(|| StrideError::Source("frame count never resolved".into()))?;

    let mut player = Player::new(config.player.clone());
    player.play();
    let mut acted = 0usize;
    let mut stalled = 0usize;
    while acted < config.ticks && player.state() != PlayState::Stopped {
        if player.tick(&mut traj, Instant::now()) {
            acted += 1;
            stalled = 0;
            traj.pump();
        } else {
            stalled += 1;
            if stalled > 20_000 {
                return Err(StrideError::Source("playback stalled".into()));
            }
            traj.pump_timeout(Duration::from_millis(1));
        }
    }

    let (frames_presented, failures) = *stats.lock().unwrap();
    Ok(RunSummary {
        frame_count,
        ticks: acted,
        frames_presented,
        failures,
        cached_frames: traj.cached_count(),
        final_frame: traj.current_index(),
        final_time: traj.current_index().map(|i| traj.frame_time(i)),
    })
}
