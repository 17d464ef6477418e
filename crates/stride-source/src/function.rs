use std::sync::Arc;

use stride_core::ranges::AtomRange;

use crate::{CountDeliver, FrameDeliver, FrameSource};

/// One invocation of the wrapped callable. The variant carries the matching
/// completion handle, so a frame call and a count call are told apart by the
/// shape of what must be delivered, not by a side channel.
pub enum SourceCall {
    Frame {
        index: usize,
        ranges: Arc<Vec<AtomRange>>,
        deliver: FrameDeliver,
    },
    Count {
        deliver: CountDeliver,
    },
}

/// In-process adapter over a caller-supplied callable. The callable may
/// complete the handle before returning or stash it and deliver later from
/// any thread.
pub struct FunctionSource {
    call: Box<dyn FnMut(SourceCall) + Send>,
}

impl FunctionSource {
    pub fn new(call: impl FnMut(SourceCall) + Send + 'static) -> Self {
        Self {
            call: Box::new(call),
        }
    }
}

impl FrameSource for FunctionSource {
    fn load_frame(&mut self, index: usize, ranges: Arc<Vec<AtomRange>>, deliver: FrameDeliver) {
        (self.call)(SourceCall::Frame {
            index,
            ranges,
            deliver,
        });
    }

    fn load_frame_count(&mut self, deliver: CountDeliver) {
        (self.call)(SourceCall::Count { deliver });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SourceEvent, Ticket};
    use std::sync::mpsc;

    #[test]
    fn dispatches_by_call_shape() {
        let mut source = FunctionSource::new(|call| match call {
            SourceCall::Frame {
                index,
                ranges,
                deliver,
            } => {
                assert_eq!(ranges.len(), 1);
                deliver.deliver(None, vec![index as f32; 3], Some(5));
            }
            SourceCall::Count { deliver } => deliver.deliver(5),
        });

        let (tx, rx) = mpsc::channel();
        source.load_frame_count(CountDeliver::new(tx.clone()));
        assert!(matches!(rx.recv().unwrap(), SourceEvent::Count { count: 5 }));

        let ranges = Arc::new(vec![AtomRange { start: 0, end: 1 }]);
        source.load_frame(2, ranges, FrameDeliver::new(tx, Ticket(1), 2));
        match rx.recv().unwrap() {
            SourceEvent::Frame { index, coords, .. } => {
                assert_eq!(index, 2);
                assert_eq!(coords, vec![2.0, 2.0, 2.0]);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn deferred_delivery_through_a_stashed_handle() {
        let stash: Arc<std::sync::Mutex<Vec<FrameDeliver>>> = Arc::default();
        let stash_in_call = stash.clone();
        let mut source = FunctionSource::new(move |call| {
            if let SourceCall::Frame { deliver, .. } = call {
                stash_in_call.lock().unwrap().push(deliver);
            }
        });

        let (tx, rx) = mpsc::channel();
        let ranges = Arc::new(vec![AtomRange { start: 0, end: 2 }]);
        source.load_frame(0, ranges, FrameDeliver::new(tx, Ticket(9), 0));
        assert!(rx.try_recv().is_err(), "nothing delivered yet");

        let deliver = stash.lock().unwrap().pop().unwrap();
        deliver.deliver(None, vec![0.0; 6], None);
        assert!(matches!(
            rx.recv().unwrap(),
            SourceEvent::Frame { ticket: Ticket(9), .. }
        ));
    }
}
