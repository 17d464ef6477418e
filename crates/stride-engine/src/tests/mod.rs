use super::*;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use stride_core::frame::Cell;
use stride_core::structure::Structure;
use stride_source::{
    FrameDeliver, FrameSource, FunctionSource, Reply, RequestSource, SourceCall, SourceOp,
};

const EPS: f32 = 1e-4;

/// Deterministic per-frame coordinates: atom `a` of frame `i` sits at
/// `(100i + 3a, 100i + 3a + 1, 100i + 3a + 2)`.
fn coords_for(index: usize, atoms: usize) -> Vec<f32> {
    (0..atoms * 3)
        .map(|k| index as f32 * 100.0 + k as f32)
        .collect()
}

fn raw_options() -> TrajectoryOptions {
    TrajectoryOptions {
        processing: ProcessingOptions::raw(),
        ..TrajectoryOptions::default()
    }
}

/// Synchronous in-process source: serves `coords_for` restricted to the
/// requested ranges, records every frame load in `log`.
fn sync_source(count: usize, log: Arc<Mutex<Vec<usize>>>) -> FunctionSource {
    FunctionSource::new(move |call| match call {
        SourceCall::Frame {
            index,
            ranges,
            deliver,
        } => {
            log.lock().unwrap().push(index);
            let atoms: usize = ranges.iter().map(|r| r.len()).sum();
            deliver.deliver(None, coords_for(index, atoms), Some(count));
        }
        SourceCall::Count { deliver } => deliver.deliver(count),
    })
}

/// Source that answers count queries synchronously but stashes frame
/// handles for the test to complete later, in any order.
fn deferred_source(
    count: usize,
    stash: Arc<Mutex<Vec<FrameDeliver>>>,
    log: Arc<Mutex<Vec<usize>>>,
) -> FunctionSource {
    FunctionSource::new(move |call| match call {
        SourceCall::Frame { index, deliver, .. } => {
            log.lock().unwrap().push(index);
            stash.lock().unwrap().push(deliver);
        }
        SourceCall::Count { deliver } => deliver.deliver(count),
    })
}

/// Transport-shaped source: count replies immediately, frame requests are
/// stashed with their wire payload for delayed completion.
fn stashed_request_source(
    count: usize,
    stash: Arc<Mutex<Vec<(SourceOp, Value, Reply)>>>,
) -> RequestSource {
    RequestSource::new(move |op, payload, reply| match reply {
        Reply::Count(deliver) => deliver.deliver(count),
        reply => stash.lock().unwrap().push((op, payload, reply)),
    })
}

/// Source serving the same fixed positions for every frame index.
fn fixed_source(count: usize, positions: Vec<[f32; 3]>) -> FunctionSource {
    FunctionSource::new(move |call| match call {
        SourceCall::Frame { deliver, .. } => {
            let flat: Vec<f32> = positions.iter().flatten().copied().collect();
            deliver.deliver(None, flat, Some(count));
        }
        SourceCall::Count { deliver } => deliver.deliver(count),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Seen {
    Count(usize),
    Frame(usize),
    Failed(Option<usize>),
}

fn record_events<S: FrameSource>(traj: &mut Trajectory<S>) -> Arc<Mutex<Vec<Seen>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    traj.add_listener(move |event| {
        let entry = match event {
            TrajectoryEvent::CountChanged { count } => Seen::Count(*count),
            TrajectoryEvent::FrameChanged { frame } => Seen::Frame(frame.index),
            TrajectoryEvent::LoadFailed { index, .. } => Seen::Failed(*index),
        };
        sink.lock().unwrap().push(entry);
    });
    seen
}

fn seen_frames(seen: &Arc<Mutex<Vec<Seen>>>) -> Vec<usize> {
    seen.lock()
        .unwrap()
        .iter()
        .filter_map(|s| match s {
            Seen::Frame(i) => Some(*i),
            _ => None,
        })
        .collect()
}

/// Four non-collinear atoms, enough for a well-determined rigid fit.
fn tetrahedron() -> Vec<[f32; 3]> {
    vec![
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, 0.0, 1.0],
    ]
}

include!("part1.rs");
include!("part2.rs");
include!("part3.rs");
