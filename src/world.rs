//! The per-process runtime: one reader worker per peer, point-to-point
//! matching, and the cooperative deadlock-detection protocol.
//!
//! ## How the pieces move
//!
//! Every remote peer gets a dedicated reader thread that blocks in `read`
//! on that peer's inbound channel, decodes frames, and files them into
//! shared state under the runtime's single mutex. The caller's thread only
//! ever blocks in two places: the condvar inside [`World::recv`], and the
//! kernel's pipe flow control inside [`World::send`]. A reader that sees
//! end-of-stream marks its peer closed and wakes the caller if it was
//! waiting on that peer; closure is permanent.
//!
//! ## Deadlock detection
//!
//! With detection enabled, a receive that is about to block first tells the
//! peer so with a WAITING frame carrying the `(count, tag)` it needs, and a
//! completed receive acknowledges with RECEIVED. A reader that gets a
//! WAITING it cannot match against an in-flight send records it; if the
//! caller is itself parked on that same peer, the pair is provably stuck
//! and one side is woken with a deadlock verdict while the other is told
//! via a DEADLOCK frame. The WAITING/RECEIVED/DEADLOCK writes happen
//! *inside* the critical section: the peer must never observe our WAITING
//! before our wait descriptor is in place, or the protocol would race its
//! own bookkeeping. Those frames are 8-16 bytes, far below the pipe
//! capacity, so the writes cannot park the critical section on flow
//! control.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, error, trace};

use crate::channel::{self, Endpoint};
use crate::error::{Error, Result};
use crate::queue::{Filter, Message, MessageQueue, SendRecord, WaitNote};
use crate::tag::{self, ReduceOp, Tag};
use crate::wire::{self, Header, HEADER_LEN};
use crate::wiring::Wiring;

/// The wait descriptor: what the caller's receive is parked on, if
/// anything. At most one exists because at most one caller thread exists.
struct Wait {
    source: i32,
    tag: Tag,
    count: i32,
    received: bool,
    deadlocked: bool,
}

impl Wait {
    fn filter(&self) -> Filter {
        Filter { source: self.source, tag: self.tag, count: self.count }
    }
}

/// Everything the readers and the caller share, guarded by one mutex.
struct State {
    received: Vec<MessageQueue>,
    others_waiting: Vec<VecDeque<WaitNote>>,
    send_unacked: Vec<SendRecord>,
    waiting: Option<Wait>,
    peer_closed: Vec<bool>,
}

struct Shared {
    state: Mutex<State>,
    cond: Condvar,
}

/// A fixed group of sibling processes and this process's place in it.
///
/// All communication goes through methods on this handle. The methods take
/// `&mut self` because the runtime supports exactly one communicating
/// thread per process; the borrow checker enforces what the protocol
/// assumes.
///
/// Dropping a `World` finalizes it: our outbound channel ends are closed
/// (so every peer's reader sees end-of-stream) and the local readers are
/// joined, which means teardown blocks until the peers finalize too.
pub struct World {
    rank: i32,
    size: i32,
    deadlock_detection: bool,
    shared: Arc<Shared>,
    outbound: Vec<Option<Endpoint>>,
    readers: Vec<JoinHandle<()>>,
}

impl World {
    /// Brings up the runtime for this process from the launcher's wiring
    /// (environment variables plus pre-opened descriptors, see
    /// [`wiring`](crate::wiring)).
    pub fn init(deadlock_detection: bool) -> Result<World> {
        Ok(World::with_wiring(Wiring::from_env()?, deadlock_detection))
    }

    /// Brings up the runtime over explicit wiring.
    /// [`Wiring::pipes`](crate::Wiring::pipes) plus this constructor stand
    /// up a whole world inside one process, one `World` per thread.
    pub fn with_wiring(wiring: Wiring, deadlock_detection: bool) -> World {
        let Wiring { size, rank, inbound, outbound } = wiring;
        let state = State {
            received: (0..size).map(|_| MessageQueue::new()).collect(),
            others_waiting: (0..size).map(|_| VecDeque::new()).collect(),
            send_unacked: Vec::new(),
            waiting: None,
            peer_closed: vec![false; size as usize],
        };
        let shared = Arc::new(Shared { state: Mutex::new(state), cond: Condvar::new() });

        let mut readers = Vec::with_capacity(size as usize - 1);
        for (peer, endpoint) in inbound.into_iter().enumerate() {
            let Some(endpoint) = endpoint else { continue };
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("mpipe-read-{}", peer))
                .spawn(move || reader_loop(peer as i32, endpoint, shared))
                .expect("failed to spawn reader thread");
            readers.push(handle);
        }
        debug!("rank {} of {} up, deadlock detection {}", rank, size,
               if deadlock_detection { "on" } else { "off" });
        World { rank, size, deadlock_detection, shared, outbound, readers }
    }

    /// This process's rank within the world.
    pub fn rank(&self) -> i32 {
        self.rank
    }

    /// Number of processes in the world.
    pub fn size(&self) -> i32 {
        self.size
    }

    /// Point-to-point send of `data` to `destination` under `tag` (user
    /// tags are non-negative).
    ///
    /// Sends are eager: they do not wait for a matching receive. The call
    /// can block only on the kernel's channel flow control.
    pub fn send(&mut self, data: &[u8], destination: i32, tag: Tag) -> Result<()> {
        self.check_peer(destination)?;
        self.send_frame(data, data.len() as i32, destination, tag)
    }

    /// Point-to-point receive into `data` from `source`. The message must
    /// carry exactly `data.len()` bytes; `tag` may be [`ANY_TAG`]
    /// (matching any user tag, in channel order).
    ///
    /// Blocks until a matching message arrives, the peer exits
    /// ([`Error::RemoteFinished`]), or, with detection enabled, a mutual
    /// wait is proven ([`Error::DeadlockDetected`]).
    ///
    /// [`ANY_TAG`]: crate::ANY_TAG
    pub fn recv(&mut self, data: &mut [u8], source: i32, tag: Tag) -> Result<()> {
        self.check_peer(source)?;
        self.recv_frame(data, data.len() as i32, source, tag)
    }

    /// Tears the runtime down: closes our outbound ends so every peer's
    /// reader sees end-of-stream, then joins the local readers. The readers
    /// exit when the peers close their ends in turn, so this returns only
    /// once the whole world is finalizing. Must be called (or the `World`
    /// dropped) even after an error.
    pub fn finalize(self) {
        // Teardown lives in Drop so that early exits get it too.
    }

    pub(crate) fn check_rank(&self, rank: i32) -> Result<()> {
        if (0..self.size).contains(&rank) {
            Ok(())
        } else {
            Err(Error::NoSuchRank(rank))
        }
    }

    fn check_peer(&self, rank: i32) -> Result<()> {
        self.check_rank(rank)?;
        if rank == self.rank {
            return Err(Error::SelfOp(rank));
        }
        Ok(())
    }

    /// Sends one frame, with the deadlock bookkeeping for user tags. The
    /// lock is taken for the bookkeeping only and released before the
    /// write.
    pub(crate) fn send_frame(
        &self,
        data: &[u8],
        count: i32,
        destination: i32,
        tag: Tag,
    ) -> Result<()> {
        if self.deadlock_detection && tag::is_user(tag) {
            let mut st = self.shared.state.lock().unwrap();
            // If the peer's oldest advertised wait is for exactly this
            // message, this send answers it.
            let dst = destination as usize;
            if st.others_waiting[dst]
                .front()
                .map_or(false, |note| note.count == count && note.tag == tag)
            {
                st.others_waiting[dst].pop_front();
            }
            st.send_unacked.push(SendRecord { destination, tag, count });
        }
        if self.post(destination, Header { count, tag }, data) {
            Ok(())
        } else {
            Err(Error::RemoteFinished)
        }
    }

    /// Writes a frame to `destination`, nothing else: no locking, no
    /// bookkeeping. This is what the in-critical-section protocol writes
    /// go through.
    fn post(&self, destination: i32, header: Header, payload: &[u8]) -> bool {
        let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
        frame.extend_from_slice(&header.encode());
        if tag::carries_payload(header.tag) {
            frame.extend_from_slice(payload);
        }
        let endpoint = self.outbound[destination as usize]
            .as_ref()
            .expect("no outbound channel for peer");
        channel::write_exact(endpoint.raw(), &frame)
    }

    /// The receive engine. `count` is explicit because the collectives pass
    /// the metadata sentinel through here too.
    pub(crate) fn recv_frame(
        &self,
        data: &mut [u8],
        count: i32,
        source: i32,
        tag: Tag,
    ) -> Result<()> {
        let filter = Filter { source, tag, count };
        let src = source as usize;
        let mut st = self.shared.state.lock().unwrap();

        let message = match st.received[src].take_first(&filter) {
            Some(message) => message,
            None => {
                // 1. Nothing queued yet: park a wait descriptor for the
                //    reader to complete.
                st.waiting = Some(Wait { source, tag, count, received: false, deadlocked: false });

                if self.deadlock_detection && tag::is_user(tag) {
                    // 2. The peer already advertised a wait on us. Only
                    //    user receives advertise, so any note here means
                    //    both sides are now blocked on each other: hand the
                    //    peer the verdict and give up.
                    if st.others_waiting[src].front().is_some() {
                        st.waiting = None;
                        st.others_waiting[src].pop_front();
                        self.post(source, Header { count: tag::NO_COUNT, tag: tag::DEADLOCK }, &[]);
                        return Err(Error::DeadlockDetected);
                    }
                    // 3. Advertise what we are about to block on. Inside
                    //    the critical section on purpose: the peer must not
                    //    observe the WAITING before the descriptor above is
                    //    in place.
                    let note = wire::encode_note(count, tag);
                    if !self.post(source, Header { count: note.len() as i32, tag: tag::WAITING }, &note) {
                        st.waiting = None;
                        return Err(Error::RemoteFinished);
                    }
                }

                // 4. Sleep until the reader for `source` resolves the wait
                //    one way or another. Spurious wakeups just re-test.
                loop {
                    let resolved = {
                        let w = st.waiting.as_ref().expect("recv: wait descriptor vanished");
                        w.received || st.peer_closed[src]
                    };
                    if resolved {
                        break;
                    }
                    st = self.shared.cond.wait(st).unwrap();
                }

                let wait = st.waiting.take().expect("recv: wait descriptor vanished");
                if wait.deadlocked {
                    // The mutual note (if the verdict came from our own
                    // reader) is spent along with the wait.
                    st.others_waiting[src].pop_front();
                    return Err(Error::DeadlockDetected);
                }
                if !wait.received {
                    return Err(Error::RemoteFinished);
                }
                st.received[src]
                    .take_first(&filter)
                    .expect("recv: wait completed but no matching message queued")
            }
        };

        // 5. Acknowledge so the peer can retire its send record. If the
        //    peer is gone the message still counts; ignore the failure.
        if self.deadlock_detection && tag::is_user(tag) {
            let note = wire::encode_note(count, tag);
            self.post(source, Header { count: note.len() as i32, tag: tag::RECEIVED }, &note);
        }
        drop(st);

        // 6. Payload handling happens outside the critical section. Reduce
        //    carriers fold into the caller's accumulator; everything else
        //    payload-bearing copies out.
        if let Some(op) = ReduceOp::from_tag(tag) {
            op.combine(data, &message.data);
        } else if tag != tag::NO_MESSAGE {
            data.copy_from_slice(&message.data);
        }
        Ok(())
    }
}

impl Drop for World {
    fn drop(&mut self) {
        debug!("rank {} finalizing", self.rank);
        for slot in self.outbound.iter_mut() {
            slot.take(); // close; the peer's reader sees EOF
        }
        for handle in self.readers.drain(..) {
            if let Err(panic) = handle.join() {
                error!("reader thread panicked: {:?}", panic);
            }
        }
        trace!("rank {} down", self.rank);
    }
}

/// Body of the reader worker for one peer: drain the inbound channel,
/// decode frames, file them, and wake the caller when something it waits
/// on happens. Exits (closing the endpoint) when the peer closes its end.
fn reader_loop(peer: i32, endpoint: Endpoint, shared: Arc<Shared>) {
    let src = peer as usize;
    let mut header_buf = [0u8; HEADER_LEN];
    loop {
        // Header first, then the payload iff the tag carries one.
        if !channel::read_exact(endpoint.raw(), &mut header_buf) {
            break;
        }
        let Header { count, tag } = Header::decode(&header_buf);
        let mut data = Vec::new();
        if tag::carries_payload(tag) {
            if count < 0 {
                error!("peer {} sent tag {} with negative count {}", peer, tag, count);
                break;
            }
            data = vec![0u8; count as usize];
            if !channel::read_exact(endpoint.raw(), &mut data) {
                // Torn frame: the peer died mid-write.
                break;
            }
        }

        // WAITING and RECEIVED describe another message; unwrap the note.
        let note = if tag == tag::WAITING || tag == tag::RECEIVED {
            if data.len() < HEADER_LEN {
                error!("peer {} sent a truncated protocol note", peer);
                break;
            }
            let (ncount, ntag) = wire::decode_note(&data);
            Some(WaitNote { tag: ntag, count: ncount })
        } else {
            None
        };

        let mut st = shared.state.lock().unwrap();
        match tag {
            tag::DEADLOCK => {
                // Verdict from the peer. It only applies to a wait still
                // parked on that peer; a stale verdict (both sides can
                // detect the same cycle independently) is dropped.
                if let Some(w) = st.waiting.as_mut() {
                    if w.source == peer && !w.received {
                        w.received = true;
                        w.deadlocked = true;
                        shared.cond.notify_one();
                    }
                }
            }
            tag::WAITING => {
                // A matching send already in flight means the peer is about
                // to be satisfied, not stuck; its note is simply dropped.
                let note = note.unwrap();
                if !st.send_unacked.iter().any(|r| r.answers(peer, note)) {
                    st.others_waiting[src].push_back(note);
                    if let Some(w) = st.waiting.as_mut() {
                        if w.source == peer && !w.received {
                            // The peer waits on us while we wait on it.
                            w.received = true;
                            w.deadlocked = true;
                            shared.cond.notify_one();
                        }
                    }
                }
            }
            tag::RECEIVED => {
                let note = note.unwrap();
                if let Some(at) = st.send_unacked.iter().position(|r| r.answers(peer, note)) {
                    st.send_unacked.remove(at);
                }
            }
            _ => {
                // A deliverable message: user payload or collective
                // carrier. Queue it, and complete the caller's wait if it
                // matches.
                let message = Message { source: peer, tag, count, data };
                let wanted = match st.waiting.as_ref() {
                    Some(w) => !w.received && w.filter().matches(&message),
                    None => false,
                };
                st.received[src].push_back(message);
                if wanted {
                    st.waiting.as_mut().unwrap().received = true;
                    shared.cond.notify_one();
                }
            }
        }
    }

    trace!("reader for peer {} saw end of stream", peer);
    let mut st = shared.state.lock().unwrap();
    st.peer_closed[src] = true;
    if st.waiting.as_ref().map_or(false, |w| w.source == peer) {
        shared.cond.notify_one();
    }
}
