/*!
MPI-flavoured message passing between a fixed group of sibling processes on
one host, wired together with pipes.

A world of `N` processes is stood up by the `mpiperun` launcher: one pipe
per ordered pair of ranks, parked at well-known descriptor slots before the
program starts (see [`wiring`]). Inside each process, [`World`] multiplexes
the inbound channels with one reader thread per peer and offers blocking
tagged send/receive plus barrier, broadcast, and reduce over a binomial
tree. An optional cooperative protocol turns mutual point-to-point waits
into a [`DeadlockDetected`](Error::DeadlockDetected) error instead of a
hang.

## Usage

Under the launcher (`mpiperun 4 ./worker`), each copy of `worker` does:

```no_run
use mpipe::World;

let mut world = World::init(false).unwrap();
if world.rank() == 0 {
    world.send(b"hi", 1, 0).unwrap();
} else if world.rank() == 1 {
    let mut buf = [0u8; 2];
    world.recv(&mut buf, 0, 0).unwrap();
}
world.finalize();
```

A whole world also fits inside one process, which is how the integration
tests drive it:

```
use mpipe::{Wiring, World};
use std::thread;

let mut wirings = Wiring::pipes(2);
let peer = wirings.pop().unwrap();
let mine = wirings.pop().unwrap();

let th = thread::spawn(move || {
    let mut world = World::with_wiring(peer, false);
    let mut buf = [0u8; 4];
    world.recv(&mut buf, 0, 7).unwrap();
    assert_eq!(&buf, b"ping");
    world.finalize();
});

let mut world = World::with_wiring(mine, false);
world.send(b"ping", 1, 7).unwrap();
world.finalize();
th.join().unwrap();
```

## Design

Each channel carries length-delimited frames: an 8-byte header (`count`,
`tag`, host order) and, for payload-bearing tags, `count` bytes of body.
The reader worker for peer `p` files decoded messages into a per-peer FIFO
under one process-wide mutex and signals a condvar when the caller's parked
receive matches; receives scan the FIFO first and park only on a miss. A
reader that sees end-of-stream marks the peer closed, which turns every
present and future operation naming that peer into
[`RemoteFinished`](Error::RemoteFinished) once its queued messages run out.
Collectives are point-to-point calls over a binomial tree rooted at rank 0,
with the semantic root swapped into position 0 when needed.

Finalizing closes this process's outbound ends and joins its readers, so
teardown completes exactly when the whole world finalizes.

## Portability

Linux-only, like the descriptor-wiring trick the launcher depends on.
*/

mod channel;
mod collective;
mod error;
mod queue;
mod tag;
mod tree;
mod wire;
pub mod wiring;
mod world;

pub use error::{Error, Result};
pub use tag::{ReduceOp, Tag, ANY_TAG};
pub use wiring::Wiring;
pub use world::World;
