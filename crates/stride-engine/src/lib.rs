#![forbid(unsafe_code)]

pub mod cache;
pub mod player;
pub mod process;
pub mod trajectory;

pub use cache::FrameCache;
pub use player::{Direction, Interpolation, LoopMode, PlayState, Player, PlayerOptions};
pub use process::{CoordinateProcessor, ProcessingOptions};
pub use trajectory::{
    FrameStatus, ListenerId, ReferenceMode, Trajectory, TrajectoryEvent, TrajectoryOptions,
    TrajectoryState,
};

#[cfg(test)]
mod tests;
