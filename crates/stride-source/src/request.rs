use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use stride_core::ranges::AtomRange;

use crate::{CountDeliver, FrameDeliver, FrameSource};

/// Request operations, with the names used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOp {
    Frame,
    Count,
}

impl SourceOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceOp::Frame => "frame",
            SourceOp::Count => "count",
        }
    }
}

/// Payload of a `"frame"` request: `{"frame": i, "atomIndices": [[s,e],..]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramePayload {
    pub frame: usize,
    #[serde(rename = "atomIndices")]
    pub atom_indices: Vec<AtomRange>,
}

/// Completion handle routed with a request, typed per operation.
pub enum Reply {
    Frame(FrameDeliver),
    Count(CountDeliver),
}

/// Transport-shaped adapter: each load becomes one request with an
/// operation name, a JSON payload and a reply handle. The transport may
/// answer out of order or not at all; the orchestrator sorts that out by
/// ticket.
pub struct RequestSource {
    request: Box<dyn FnMut(SourceOp, Value, Reply) + Send>,
}

impl RequestSource {
    pub fn new(request: impl FnMut(SourceOp, Value, Reply) + Send + 'static) -> Self {
        Self {
            request: Box::new(request),
        }
    }
}

impl FrameSource for RequestSource {
    fn load_frame(&mut self, index: usize, ranges: Arc<Vec<AtomRange>>, deliver: FrameDeliver) {
        log::debug!("requesting frame {index} over {} ranges", ranges.len());
        let payload = json!({ "frame": index, "atomIndices": ranges.as_ref() });
        (self.request)(SourceOp::Frame, payload, Reply::Frame(deliver));
    }

    fn load_frame_count(&mut self, deliver: CountDeliver) {
        (self.request)(SourceOp::Count, json!({}), Reply::Count(deliver));
    }
}
