use crate::{flow::*, frame::PriorityUpdate, stream::*, types::*};
use bytes::Bytes;
use log::trace;
use std::collections::{HashMap, VecDeque};
use tokio::sync::{mpsc, oneshot, watch};

/// A write the arbiter has accepted but not yet pushed to the wire, parked
/// behind flow-control credit. Replies resolve when the item fully drains.
#[derive(Debug)]
pub(crate) enum PendingWrite {
    Data {
        data: Bytes,
        end_stream: bool,
        reply: Option<oneshot::Sender<Result<(), WriteError>>>,
    },
    Trailers {
        fields: Headers,
        reply: Option<oneshot::Sender<Result<(), WriteError>>>,
    },
}

/// Registry-side view of one stream. The machine holds the authoritative
/// state; the application side only sees it through the watch channel.
#[derive(Debug)]
pub(crate) struct StreamEntry {
    pub machine: StreamMachine,
    pub send_window: FlowWindow,
    pub recv_window: RecvWindow,
    pub events: mpsc::UnboundedSender<StreamEvent>,
    pub state_tx: watch::Sender<StreamState>,
    pub pending: VecDeque<PendingWrite>,
    pub priority: Option<PriorityUpdate>,
    released: bool,
    counted: bool,
}

impl StreamEntry {
    pub fn new(
        id: NonZeroStreamId,
        send_window: u32,
        recv_target: u32,
        events: mpsc::UnboundedSender<StreamEvent>,
        state_tx: watch::Sender<StreamState>,
    ) -> Self {
        Self {
            machine: StreamMachine::new(id),
            send_window: FlowWindow::new(send_window),
            recv_window: RecvWindow::new(recv_target),
            events,
            state_tx,
            pending: VecDeque::new(),
            priority: None,
            released: false,
            counted: false,
        }
    }
}

/// Outcome of the admission check for an incoming HEADERS block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// The id names a stream we are tracking; route to it.
    Existing,
    /// A fresh, admissible id; create the stream.
    Admit,
    /// Answer with RST_STREAM carrying this code; no stream is created.
    Refuse(ErrorType),
}

/// The connection's stream table. Owned and mutated by the arbiter only.
#[derive(Debug)]
pub(crate) struct StreamCoordinator {
    streams: HashMap<NonZeroStreamId, StreamEntry>,
    highest_remote_id: StreamId,
    active_remote: u32,
    max_concurrent_remote: u32,
}

impl StreamCoordinator {
    pub fn new(max_concurrent_remote: u32) -> Self {
        Self {
            streams: HashMap::new(),
            highest_remote_id: 0,
            active_remote: 0,
            max_concurrent_remote,
        }
    }

    pub fn highest_remote_id(&self) -> StreamId {
        self.highest_remote_id
    }

    #[cfg(test)]
    pub fn active_remote(&self) -> u32 {
        self.active_remote
    }

    /// The id-discipline and capacity ladder for an incoming HEADERS block.
    /// Pure check: admitting is a separate `insert`.
    pub fn admit(&self, id: StreamId) -> Result<Admission, ConnectionError> {
        let Some(id) = NonZeroStreamId::new(id) else {
            return Err(ConnectionError::protocol("HEADERS on stream 0"));
        };
        // even ids belong to the server side; we cannot prove the id was
        // never used, so degrade to a stream-level reset
        if id.get() % 2 == 0 {
            return Ok(Admission::Refuse(ErrorType::StreamClosed));
        }
        if self.streams.contains_key(&id) {
            return Ok(Admission::Existing);
        }
        if id.get() <= self.highest_remote_id {
            return Ok(Admission::Refuse(ErrorType::StreamClosed));
        }
        if self.active_remote >= self.max_concurrent_remote {
            return Ok(Admission::Refuse(ErrorType::RefusedStream));
        }
        Ok(Admission::Admit)
    }

    /// Tracks a freshly admitted remote stream: raises the high-water mark
    /// and takes one concurrency slot.
    pub fn insert(&mut self, id: NonZeroStreamId, mut entry: StreamEntry) {
        debug_assert!(id.get() > self.highest_remote_id);
        self.highest_remote_id = id.get();
        self.active_remote += 1;
        entry.counted = true;
        self.streams.insert(id, entry);
    }

    pub fn contains(&self, id: NonZeroStreamId) -> bool {
        self.streams.contains_key(&id)
    }

    pub fn get_mut(&mut self, id: NonZeroStreamId) -> Option<&mut StreamEntry> {
        self.streams.get_mut(&id)
    }

    pub fn ids(&self) -> Vec<NonZeroStreamId> {
        self.streams.keys().copied().collect()
    }

    /// Publishes the machine's state to observers and settles the registry
    /// after any transition: terminal streams give their slot back, and a
    /// terminal stream whose handle is gone is evicted.
    pub fn sync(&mut self, id: NonZeroStreamId) {
        let Some(entry) = self.streams.get_mut(&id) else {
            return;
        };
        let state = entry.machine.state();
        entry.state_tx.send(state).ok();
        if !state.occupies_slot() && entry.counted {
            entry.counted = false;
            self.active_remote -= 1;
        }
        if state.is_terminal() && entry.released {
            trace!("stream {} evicted", id);
            self.streams.remove(&id);
        }
    }

    /// The application dropped its handle. The entry lingers while the
    /// stream is still live on the wire; terminal entries go away now.
    pub fn release(&mut self, id: NonZeroStreamId) {
        if let Some(entry) = self.streams.get_mut(&id) {
            entry.released = true;
            if entry.machine.state().is_terminal() {
                trace!("stream {} evicted", id);
                self.streams.remove(&id);
            }
        }
    }

    /// Removes a stream that was refused before the listener kept it.
    pub fn evict(&mut self, id: NonZeroStreamId) {
        if let Some(entry) = self.streams.remove(&id) {
            if entry.counted {
                self.active_remote -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: NonZeroStreamId) -> (StreamEntry, mpsc::UnboundedReceiver<StreamEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, _state_rx) = watch::channel(StreamState::Idle);
        (
            StreamEntry::new(id, 65_535, 65_535, events_tx, state_tx),
            events_rx,
        )
    }

    fn admit_and_open(coordinator: &mut StreamCoordinator, raw: u32) {
        assert_eq!(coordinator.admit(raw).unwrap(), Admission::Admit);
        let id = NonZeroStreamId::new(raw).unwrap();
        let (mut e, _rx) = entry(id);
        e.machine.recv_headers(false).unwrap();
        coordinator.insert(id, e);
        // receivers dropped; sync still settles the registry
        coordinator.sync(id);
    }

    #[test]
    fn stream_zero_is_a_connection_error() {
        let coordinator = StreamCoordinator::new(10);
        let err = coordinator.admit(0).unwrap_err();
        assert_eq!(err.goaway_code(), Some(ErrorType::ProtocolError));
    }

    #[test]
    fn even_ids_are_refused_as_closed() {
        let coordinator = StreamCoordinator::new(10);
        assert_eq!(
            coordinator.admit(2).unwrap(),
            Admission::Refuse(ErrorType::StreamClosed)
        );
    }

    #[test]
    fn ids_below_the_high_water_mark_are_closed() {
        let mut coordinator = StreamCoordinator::new(10);
        admit_and_open(&mut coordinator, 33);
        assert_eq!(
            coordinator.admit(31).unwrap(),
            Admission::Refuse(ErrorType::StreamClosed)
        );
        assert_eq!(coordinator.admit(35).unwrap(), Admission::Admit);
    }

    #[test]
    fn known_ids_route_to_the_stream() {
        let mut coordinator = StreamCoordinator::new(10);
        admit_and_open(&mut coordinator, 1);
        assert_eq!(coordinator.admit(1).unwrap(), Admission::Existing);
    }

    #[test]
    fn capacity_refuses_new_streams() {
        let mut coordinator = StreamCoordinator::new(2);
        admit_and_open(&mut coordinator, 1);
        admit_and_open(&mut coordinator, 3);
        assert_eq!(
            coordinator.admit(5).unwrap(),
            Admission::Refuse(ErrorType::RefusedStream)
        );

        // resetting one frees its slot
        let id = NonZeroStreamId::new(3).unwrap();
        coordinator.get_mut(id).unwrap().machine.reset(ErrorType::Cancel);
        coordinator.sync(id);
        assert_eq!(coordinator.active_remote(), 1);
        assert_eq!(coordinator.admit(5).unwrap(), Admission::Admit);
    }

    #[test]
    fn terminal_streams_linger_until_released() {
        let mut coordinator = StreamCoordinator::new(10);
        admit_and_open(&mut coordinator, 1);
        let id = NonZeroStreamId::new(1).unwrap();
        coordinator.get_mut(id).unwrap().machine.reset(ErrorType::Cancel);
        coordinator.sync(id);
        // still registered: the application may hold the handle
        assert!(coordinator.get_mut(id).is_some());
        coordinator.release(id);
        assert!(coordinator.get_mut(id).is_none());
    }

    #[test]
    fn released_live_streams_evict_on_terminal_transition() {
        let mut coordinator = StreamCoordinator::new(10);
        admit_and_open(&mut coordinator, 1);
        let id = NonZeroStreamId::new(1).unwrap();
        coordinator.release(id);
        assert!(coordinator.get_mut(id).is_some());
        coordinator.get_mut(id).unwrap().machine.reset(ErrorType::Cancel);
        coordinator.sync(id);
        assert!(coordinator.get_mut(id).is_none());
    }
}
