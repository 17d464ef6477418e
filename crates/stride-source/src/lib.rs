#![forbid(unsafe_code)]

pub mod function;
pub mod request;

use std::sync::mpsc::Sender;
use std::sync::Arc;

use stride_core::ranges::AtomRange;

pub use function::{FunctionSource, SourceCall};
pub use request::{FramePayload, Reply, RequestSource, SourceOp};

/// Identifier minted per frame request. The orchestrator uses it to tell a
/// delivery for the load currently in flight from a late one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(pub u64);

/// Completion messages a source pushes back over the delivery channel.
#[derive(Debug)]
pub enum SourceEvent {
    Frame {
        ticket: Ticket,
        index: usize,
        cell: Option<[f32; 9]>,
        coords: Vec<f32>,
        frame_count: Option<usize>,
    },
    Count {
        count: usize,
    },
    Failed {
        ticket: Option<Ticket>,
        index: Option<usize>,
        reason: String,
    },
}

/// Single-use completion handle for one frame request. The requested index
/// and ticket are bound at request time, so a delivery is always keyed by
/// what was asked for. Delivering after the receiving trajectory is gone is
/// a silent no-op.
#[derive(Debug)]
pub struct FrameDeliver {
    tx: Sender<SourceEvent>,
    ticket: Ticket,
    index: usize,
}

impl FrameDeliver {
    pub fn new(tx: Sender<SourceEvent>, ticket: Ticket, index: usize) -> Self {
        Self { tx, ticket, index }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    pub fn deliver(self, cell: Option<[f32; 9]>, coords: Vec<f32>, frame_count: Option<usize>) {
        let _ = self.tx.send(SourceEvent::Frame {
            ticket: self.ticket,
            index: self.index,
            cell,
            coords,
            frame_count,
        });
    }

    pub fn fail(self, reason: impl Into<String>) {
        let _ = self.tx.send(SourceEvent::Failed {
            ticket: Some(self.ticket),
            index: Some(self.index),
            reason: reason.into(),
        });
    }
}

/// Single-use completion handle for a frame-count query.
#[derive(Debug)]
pub struct CountDeliver {
    tx: Sender<SourceEvent>,
}

impl CountDeliver {
    pub fn new(tx: Sender<SourceEvent>) -> Self {
        Self { tx }
    }

    pub fn deliver(self, count: usize) {
        let _ = self.tx.send(SourceEvent::Count { count });
    }

    pub fn fail(self, reason: impl Into<String>) {
        let _ = self.tx.send(SourceEvent::Failed {
            ticket: None,
            index: None,
            reason: reason.into(),
        });
    }
}

/// Capability shared by every frame source: deliver one frame restricted to
/// the requested atom ranges, and report the total frame count. Both calls
/// return immediately; results come back through the handles, synchronously
/// or from another thread.
pub trait FrameSource: Send {
    fn load_frame(&mut self, index: usize, ranges: Arc<Vec<AtomRange>>, deliver: FrameDeliver);

    fn load_frame_count(&mut self, deliver: CountDeliver);
}

impl FrameSource for Box<dyn FrameSource> {
    fn load_frame(&mut self, index: usize, ranges: Arc<Vec<AtomRange>>, deliver: FrameDeliver) {
        (**self).load_frame(index, ranges, deliver)
    }

    fn load_frame_count(&mut self, deliver: CountDeliver) {
        (**self).load_frame_count(deliver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn frame_handle_echoes_request_keys() {
        let (tx, rx) = mpsc::channel();
        let deliver = FrameDeliver::new(tx, Ticket(7), 3);
        deliver.deliver(None, vec![1.0, 2.0, 3.0], Some(10));
        match rx.recv().unwrap() {
            SourceEvent::Frame {
                ticket,
                index,
                cell,
                coords,
                frame_count,
            } => {
                assert_eq!(ticket, Ticket(7));
                assert_eq!(index, 3);
                assert_eq!(cell, None);
                assert_eq!(coords, vec![1.0, 2.0, 3.0]);
                assert_eq!(frame_count, Some(10));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn failure_carries_request_keys() {
        let (tx, rx) = mpsc::channel();
        FrameDeliver::new(tx.clone(), Ticket(1), 9).fail("transport down");
        CountDeliver::new(tx).fail("no count");
        match rx.recv().unwrap() {
            SourceEvent::Failed {
                ticket,
                index,
                reason,
            } => {
                assert_eq!(ticket, Some(Ticket(1)));
                assert_eq!(index, Some(9));
                assert_eq!(reason, "transport down");
            }
            other => panic!("unexpected event {other:?}"),
        }
        match rx.recv().unwrap() {
            SourceEvent::Failed { ticket, index, .. } => {
                assert_eq!(ticket, None);
                assert_eq!(index, None);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn delivery_after_receiver_drop_is_a_no_op() {
        let (tx, rx) = mpsc::channel();
        let deliver = FrameDeliver::new(tx, Ticket(2), 0);
        drop(rx);
        deliver.deliver(None, vec![0.0; 3], None);
    }

    #[test]
    fn delivery_from_another_thread() {
        let (tx, rx) = mpsc::channel();
        let deliver = FrameDeliver::new(tx, Ticket(4), 1);
        let worker = std::thread::spawn(move || {
            deliver.deliver(None, vec![0.5, 0.5, 0.5], None);
        });
        worker.join().unwrap();
        assert!(matches!(
            rx.recv().unwrap(),
            SourceEvent::Frame { index: 1, .. }
        ));
    }
}
