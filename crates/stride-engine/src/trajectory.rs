use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use stride_core::error::StrideError;
use stride_core::frame::{Cell, Frame};
use stride_core::ranges::AtomRange;
use stride_core::structure::Structure;
use stride_source::{CountDeliver, FrameDeliver, FrameSource, SourceEvent, Ticket};

use crate::cache::FrameCache;
use crate::player::Interpolation;
use crate::process::{CoordinateProcessor, ProcessingOptions};

/// Which frame anchors the superposition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceMode {
    FirstFrame,
    Frame(usize),
}

impl Default for ReferenceMode {
    fn default() -> Self {
        ReferenceMode::FirstFrame
    }
}

fn default_delta_time() -> f32 {
    1.0
}

fn default_initial_frame() -> Option<usize> {
    Some(0)
}

fn default_cache_capacity() -> Option<usize> {
    Some(128)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryOptions {
    /// Simulation time per frame, in ps.
    #[serde(default = "default_delta_time")]
    pub delta_time: f32,
    /// Simulation time of frame 0, in ps.
    #[serde(default)]
    pub time_offset: f32,
    /// Frame requested automatically once the count resolves, when nothing
    /// else was asked for in the meantime.
    #[serde(default = "default_initial_frame")]
    pub initial_frame: Option<usize>,
    /// Frame cache bound; `None` keeps every frame.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: Option<usize>,
    #[serde(default)]
    pub reference: ReferenceMode,
    #[serde(default)]
    pub processing: ProcessingOptions,
}

impl Default for TrajectoryOptions {
    fn default() -> Self {
        Self {
            delta_time: 1.0,
            time_offset: 0.0,
            initial_frame: Some(0),
            cache_capacity: Some(128),
            reference: ReferenceMode::FirstFrame,
            processing: ProcessingOptions::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrajectoryState {
    /// Frame count not resolved yet; frame targets queue.
    CountPending,
    /// A frame load is in flight.
    FramePending,
    Ready,
}

/// Outcome of a frame request: served from cache now, or underway.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Ready,
    Pending,
}

#[derive(Clone, Debug)]
pub enum TrajectoryEvent {
    CountChanged {
        count: usize,
    },
    FrameChanged {
        frame: Arc<Frame>,
    },
    LoadFailed {
        index: Option<usize>,
        reason: String,
    },
}

pub type ListenerId = u64;

struct PendingLoad {
    ticket: Ticket,
    index: usize,
    epoch: u64,
}

/// Orchestrates one trajectory: issues loads against the source one at a
/// time, folds deliveries back in on the control thread, processes and
/// caches frames, and notifies listeners. Sources may complete from any
/// thread; all state changes happen in `pump` or in direct calls.
pub struct Trajectory<S: FrameSource> {
    source: S,
    structure: Structure,
    options: TrajectoryOptions,
    processor: CoordinateProcessor,
    ranges: Arc<Vec<AtomRange>>,
    cache: FrameCache,
    current: Option<Arc<Frame>>,
    target: Option<usize>,
    prefetch: Option<usize>,
    pending: Option<PendingLoad>,
    count_pending: bool,
    frame_count: Option<usize>,
    reference: Option<Vec<[f32; 3]>>,
    reference_failed: bool,
    epoch: u64,
    next_ticket: u64,
    listeners: Vec<(ListenerId, Box<dyn FnMut(&TrajectoryEvent)>)>,
    next_listener: ListenerId,
    queued_events: Vec<TrajectoryEvent>,
    tx: Sender<SourceEvent>,
    rx: Receiver<SourceEvent>,
}

impl<S: FrameSource> Trajectory<S> {
    /// Builds the orchestrator and immediately issues the frame-count
    /// query. Frame requests made before it resolves are queued.
    pub fn new(source: S, structure: Structure, options: TrajectoryOptions) -> Self {
        let (tx, rx) = mpsc::channel();
        let ranges = structure.request_ranges();
        let mut processor = CoordinateProcessor::new(options.processing.clone());
        processor.set_fit_positions(fit_positions(
            &structure,
            options.processing.fit_indices.as_deref(),
        ));
        let cache = FrameCache::new(options.cache_capacity);
        let mut traj = Self {
            source,
            structure,
            options,
            processor,
            ranges,
            cache,
            current: None,
            target: None,
            prefetch: None,
            pending: None,
            count_pending: false,
            frame_count: None,
            reference: None,
            reference_failed: false,
            epoch: 0,
            next_ticket: 0,
            listeners: Vec::new(),
            next_listener: 0,
            queued_events: Vec::new(),
            tx,
            rx,
        };
        traj.request_count();
        traj
    }

    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    pub fn options(&self) -> &TrajectoryOptions {
        &self.options
    }

    pub fn frame_count(&self) -> Option<usize> {
        self.frame_count
    }

    pub fn current(&self) -> Option<&Arc<Frame>> {
        self.current.as_ref()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current.as_ref().map(|f| f.index)
    }

    pub fn has_frame(&self, index: usize) -> bool {
        self.cache.contains(index)
    }

    pub fn cached(&self, index: usize) -> Option<&Arc<Frame>> {
        self.cache.peek(index)
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn state(&self) -> TrajectoryState {
        if self.frame_count.is_none() {
            TrajectoryState::CountPending
        } else if self.pending.is_some() {
            TrajectoryState::FramePending
        } else {
            TrajectoryState::Ready
        }
    }

    /// Simulation time of a frame, from the configured offset and spacing.
    pub fn frame_time(&self, index: usize) -> f32 {
        self.options.time_offset + index as f32 * self.options.delta_time
    }

    /// Subscribes to trajectory events. Listeners run synchronously on the
    /// control thread, in registration order.
    pub fn add_listener(
        &mut self,
        listener: impl FnMut(&TrajectoryEvent) + 'static,
    ) -> ListenerId {
        self.next_listener += 1;
        let id = self.next_listener;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) {
        self.listeners.retain(|(lid, _)| *lid != id);
    }

    /// Makes `index` the display target. A cached frame becomes current and
    /// notifies immediately; otherwise a load starts, or queues behind the
    /// one in flight (newest target wins).
    pub fn set_frame(&mut self, index: usize) -> FrameStatus {
        if self.frame_count == Some(0) {
            return FrameStatus::Pending;
        }
        self.reference_failed = false;
        let index = match self.frame_count {
            Some(count) => index.min(count - 1),
            None => index,
        };
        self.target = Some(index);
        if self.frame_count.is_none() {
            self.request_count();
            return FrameStatus::Pending;
        }
        if let Some(frame) = self.cache.fetch(index) {
            self.current = Some(frame.clone());
            self.queued_events.push(TrajectoryEvent::FrameChanged { frame });
            self.flush_events();
            return FrameStatus::Ready;
        }
        self.advance_loads();
        FrameStatus::Pending
    }

    /// Loads a frame into the cache without making it the display target.
    pub fn prefetch(&mut self, index: usize) -> FrameStatus {
        if self.frame_count == Some(0) {
            return FrameStatus::Pending;
        }
        let index = match self.frame_count {
            Some(count) => index.min(count - 1),
            None => index,
        };
        if self.cache.contains(index) {
            return FrameStatus::Ready;
        }
        self.prefetch = Some(index);
        if self.frame_count.is_none() {
            self.request_count();
            return FrameStatus::Pending;
        }
        self.advance_loads();
        FrameStatus::Pending
    }

    /// Replaces the structure. The request ranges are recomputed, cached
    /// frames and the captured reference are dropped, and the current
    /// target reloads under the new selection.
    pub fn set_structure(&mut self, structure: Structure) {
        self.structure = structure;
        self.ranges = self.structure.request_ranges();
        self.processor.set_fit_positions(fit_positions(
            &self.structure,
            self.options.processing.fit_indices.as_deref(),
        ));
        log::debug!(
            "structure updated: {} active atoms in {} ranges",
            self.structure.active_atom_count(),
            self.ranges.len()
        );
        self.invalidate_frames();
    }

    /// Replaces the processing configuration and reprocesses from scratch.
    pub fn set_processing(&mut self, processing: ProcessingOptions) {
        self.processor.set_options(processing.clone());
        self.processor.set_fit_positions(fit_positions(
            &self.structure,
            processing.fit_indices.as_deref(),
        ));
        self.options.processing = processing;
        self.invalidate_frames();
    }

    /// Moves the superposition anchor and reprocesses from scratch.
    pub fn set_reference(&mut self, reference: ReferenceMode) {
        self.options.reference = reference;
        self.invalidate_frames();
    }

    /// Drains every delivery waiting on the channel. Returns how many were
    /// handled. All cache and listener activity happens here or inside
    /// direct calls, never concurrently.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        self.flush_events();
        handled
    }

    /// Waits up to `timeout` for one delivery, then drains the rest.
    pub fn pump_timeout(&mut self, timeout: Duration) -> usize {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => {
                self.handle_event(event);
                1 + self.pump()
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    /// Presents a blend between cached frames without touching the cache:
    /// the emitted frame is synthetic and carries the leading index.
    /// `window` is the leading frame followed by the two behind it in
    /// playback order; members missing from the cache fall back to their
    /// predecessor in the window. Returns false when the leading frame is
    /// not cached.
    pub fn interpolate(&mut self, window: [usize; 3], t: f32, kind: Interpolation) -> bool {
        let lead = match self.cache.peek(window[0]) {
            Some(frame) => frame.clone(),
            None => return false,
        };
        let n = lead.atom_count();
        let mut frames: [Arc<Frame>; 3] = [lead.clone(), lead.clone(), lead.clone()];
        for k in 1..3 {
            frames[k] = match self.cache.peek(window[k]) {
                Some(f) if f.atom_count() == n => f.clone(),
                _ => frames[k - 1].clone(),
            };
        }
        let mut positions = Vec::with_capacity(n);
        for a in 0..n {
            let mut out = [0.0f32; 3];
            for d in 0..3 {
                let c = frames[0].positions[a][d];
                let cp = frames[1].positions[a][d];
                let cpp = frames[2].positions[a][d];
                out[d] = match kind {
                    Interpolation::None => c,
                    Interpolation::Linear => cp + (c - cp) * t,
                    // no frame beyond the lead is cached yet, so the lead
                    // doubles as the outgoing control point
                    Interpolation::Spline => spline_point(cpp, cp, c, c, t),
                };
            }
            positions.push(out);
        }
        let frame = Arc::new(Frame {
            index: lead.index,
            cell: lead.cell,
            positions,
        });
        self.current = Some(frame.clone());
        self.queued_events.push(TrajectoryEvent::FrameChanged { frame });
        self.flush_events();
        true
    }

    fn request_count(&mut self) {
        if self.count_pending {
            return;
        }
        self.count_pending = true;
        log::debug!("requesting frame count");
        let deliver = CountDeliver::new(self.tx.clone());
        self.source.load_frame_count(deliver);
    }

    fn reference_index(&self) -> usize {
        let raw = match self.options.reference {
            ReferenceMode::FirstFrame => 0,
            ReferenceMode::Frame(index) => index,
        };
        match self.frame_count {
            Some(count) if count > 0 => raw.min(count - 1),
            _ => raw,
        }
    }

    fn expected_atoms(&self) -> usize {
        self.structure.active_atom_count()
    }

    /// Starts the next needed load, if none is in flight: the reference
    /// frame first, then a pending prefetch, then the display target. A
    /// reference load that failed is not reissued until the next explicit
    /// frame request.
    fn advance_loads(&mut self) {
        if self.pending.is_some() {
            return;
        }
        match self.frame_count {
            Some(count) if count > 0 => {}
            _ => return,
        }
        if self.processor.wants_reference() && self.reference.is_none() && !self.reference_failed {
            let index = self.reference_index();
            if !self.cache.contains(index) {
                self.issue_load(index);
                return;
            }
        }
        if let Some(index) = self.prefetch {
            if self.cache.contains(index) {
                self.prefetch = None;
            } else {
                self.issue_load(index);
                return;
            }
        }
        if let Some(index) = self.target {
            if !self.cache.contains(index) {
                self.issue_load(index);
            }
        }
    }

    fn issue_load(&mut self, index: usize) {
        self.next_ticket += 1;
        let ticket = Ticket(self.next_ticket);
        self.pending = Some(PendingLoad {
            ticket,
            index,
            epoch: self.epoch,
        });
        log::debug!("loading frame {index} (ticket {})", ticket.0);
        let deliver = FrameDeliver::new(self.tx.clone(), ticket, index);
        self.source.load_frame(index, self.ranges.clone(), deliver);
    }

    fn invalidate_frames(&mut self) {
        self.epoch += 1;
        self.cache.clear();
        self.reference = None;
        self.reference_failed = false;
        self.prefetch = None;
        self.advance_loads();
    }

    /// Latches a failed reference load so `advance_loads` stops chasing
    /// it; frames still present unfitted until a later request retries.
    fn note_reference_failure(&mut self, index: usize) {
        if self.processor.wants_reference()
            && self.reference.is_none()
            && index == self.reference_index()
        {
            self.reference_failed = true;
        }
    }

    fn handle_event(&mut self, event: SourceEvent) {
        match event {
            SourceEvent::Count { count } => {
                self.count_pending = false;
                self.apply_count(count);
                self.after_count_resolved();
            }
            SourceEvent::Frame {
                ticket,
                index,
                cell,
                coords,
                frame_count,
            } => self.handle_frame(ticket, index, cell, coords, frame_count),
            SourceEvent::Failed {
                ticket,
                index,
                reason,
            } => self.handle_failure(ticket, index, reason),
        }
    }

    /// Monotonic count update: a lower report is an inconsistency and the
    /// established count is kept.
    fn apply_count(&mut self, count: usize) {
        match self.frame_count {
            Some(current) if count < current => {
                log::warn!("frame count regressed from {current} to {count}, keeping {current}");
            }
            Some(current) if count == current => {}
            _ => {
                self.frame_count = Some(count);
                self.queued_events
                    .push(TrajectoryEvent::CountChanged { count });
            }
        }
    }

    fn after_count_resolved(&mut self) {
        let count = match self.frame_count {
            Some(count) if count > 0 => count,
            _ => return,
        };
        if let Some(target) = self.target {
            if target >= count {
                self.target = Some(count - 1);
            }
        } else if let Some(initial) = self.options.initial_frame {
            self.target = Some(initial.min(count - 1));
        }
        if let Some(prefetch) = self.prefetch {
            if prefetch >= count {
                self.prefetch = Some(count - 1);
            }
        }
        self.advance_loads();
    }

    fn handle_frame(
        &mut self,
        ticket: Ticket,
        index: usize,
        cell: Option<[f32; 9]>,
        coords: Vec<f32>,
        frame_count: Option<usize>,
    ) {
        if let Some(count) = frame_count {
            self.count_pending = false;
            self.apply_count(count);
        }
        let owned = self
            .pending
            .as_ref()
            .map(|p| p.ticket == ticket)
            .unwrap_or(false);
        let outdated = self
            .pending
            .as_ref()
            .map(|p| p.epoch != self.epoch)
            .unwrap_or(false);
        if owned {
            self.pending = None;
            if outdated {
                // the selection changed while this load was in flight;
                // reload the target under the fresh ranges
                log::debug!("discarding frame {index}: loaded under an outdated selection");
                self.advance_loads();
                return;
            }
        }
        let expected = self.expected_atoms();
        if coords.len() % 3 != 0 || coords.len() / 3 != expected {
            if owned {
                let reason = StrideError::Mismatch(format!(
                    "frame {index} delivered {} coordinate values for {expected} atoms",
                    coords.len()
                ))
                .to_string();
                log::warn!("{reason}");
                if self.target == Some(index) {
                    self.target = None;
                }
                if self.prefetch == Some(index) {
                    self.prefetch = None;
                }
                self.note_reference_failure(index);
                self.queued_events.push(TrajectoryEvent::LoadFailed {
                    index: Some(index),
                    reason,
                });
            } else {
                log::warn!(
                    "discarding stale frame {index}: {} coordinate values for {expected} atoms",
                    coords.len()
                );
            }
            self.advance_loads();
            return;
        }
        let frame = Arc::new(self.process_frame(index, cell, coords));
        self.cache
            .insert(frame.clone(), self.current.as_ref().map(|f| f.index));
        if self.prefetch == Some(index) {
            self.prefetch = None;
        }
        if self.target == Some(index) {
            self.current = Some(frame.clone());
            self.queued_events
                .push(TrajectoryEvent::FrameChanged { frame });
        } else {
            // still useful cache content, but it must not drive playback
            log::debug!("cached frame {index} without presenting it");
        }
        self.advance_loads();
    }

    fn process_frame(&mut self, index: usize, cell: Option<[f32; 9]>, coords: Vec<f32>) -> Frame {
        let cell = Cell::from_raw(cell);
        let mut positions = Vec::with_capacity(coords.len() / 3);
        for xyz in coords.chunks_exact(3) {
            positions.push([xyz[0], xyz[1], xyz[2]]);
        }
        self.processor.pbc_stage(&mut positions, cell);
        if self.processor.wants_reference() {
            if self.reference.is_none() && index == self.reference_index() {
                self.reference = Some(self.processor.capture_reference(&positions));
            }
            if let Some(reference) = &self.reference {
                self.processor.superpose_stage(&mut positions, reference);
            } else {
                log::debug!("frame {index} processed before the reference frame, fit skipped");
            }
        }
        Frame {
            index,
            cell,
            positions,
        }
    }

    fn handle_failure(&mut self, ticket: Option<Ticket>, index: Option<usize>, reason: String) {
        match ticket {
            Some(ticket) => {
                let owned = self
                    .pending
                    .as_ref()
                    .map(|p| p.ticket == ticket)
                    .unwrap_or(false);
                if owned {
                    self.pending = None;
                    log::warn!("frame load failed for {index:?}: {reason}");
                    if self.target == index {
                        self.target = None;
                    }
                    if self.prefetch == index {
                        self.prefetch = None;
                    }
                    if let Some(index) = index {
                        self.note_reference_failure(index);
                    }
                    self.queued_events
                        .push(TrajectoryEvent::LoadFailed { index, reason });
                    self.advance_loads();
                } else {
                    log::warn!("stale load failure for {index:?}: {reason}");
                }
            }
            None => {
                self.count_pending = false;
                log::warn!("frame count query failed: {reason}");
                self.queued_events.push(TrajectoryEvent::LoadFailed {
                    index: None,
                    reason,
                });
            }
        }
    }

    fn flush_events(&mut self) {
        if self.queued_events.is_empty() {
            return;
        }
        let events = std::mem::take(&mut self.queued_events);
        for event in &events {
            for (_, listener) in self.listeners.iter_mut() {
                listener(event);
            }
        }
    }
}

fn fit_positions(structure: &Structure, fit_indices: Option<&[usize]>) -> Option<Vec<usize>> {
    let indices = fit_indices?;
    let mut positions = Vec::with_capacity(indices.len());
    for &index in indices {
        match structure.position_of(index) {
            Some(position) => positions.push(position),
            None => log::warn!("fit atom {index} outside the active selection, ignored"),
        }
    }
    Some(positions)
}

fn spline_point(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
    let tension = 0.5;
    let v0 = (p2 - p0) * tension;
    let v1 = (p3 - p1) * tension;
    let t2 = t * t;
    let t3 = t * t2;
    (2.0 * p1 - 2.0 * p2 + v0 + v1) * t3 + (-3.0 * p1 + 3.0 * p2 - 2.0 * v0 - v1) * t2
        + v0 * t
        + p1
}
