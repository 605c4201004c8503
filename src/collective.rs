//! The collectives, expressed as two traversals of the binomial tree in
//! [`tree`](crate::tree).
//!
//! Every collective is just point-to-point calls in a fixed order, so the
//! failure semantics fall out of [`recv`](crate::World::recv) and
//! [`send`](crate::World::send): the first sub-operation to observe a
//! finished peer (or a deadlock verdict) aborts the traversal and the
//! error surfaces to the caller.

use crate::error::Result;
use crate::tag::{self, ReduceOp, Tag};
use crate::tree;
use crate::world::World;

impl World {
    /// Blocks until every rank in the world has entered the barrier.
    pub fn barrier(&mut self) -> Result<()> {
        self.up_phase(&mut [], tag::NO_COUNT, tag::NO_MESSAGE, 0)?;
        self.down_phase(&mut [], tag::NO_COUNT, tag::NO_MESSAGE, 0)
    }

    /// Replicates `data` from `root` onto every rank; non-root buffers are
    /// overwritten. All ranks must pass buffers of the same length.
    pub fn bcast(&mut self, data: &mut [u8], root: i32) -> Result<()> {
        self.check_rank(root)?;
        // Rendezvous before the payload moves, so a rank cannot observe
        // the data phase of a broadcast it has not entered yet.
        self.up_phase(&mut [], tag::NO_COUNT, tag::NO_MESSAGE, root)?;
        let count = data.len() as i32;
        self.down_phase(data, count, tag::BROADCAST, root)
    }

    /// Componentwise reduction of every rank's `send_data`, as unsigned
    /// 8-bit lanes. The result lands in `recv_data` on `root` only; other
    /// ranks' `recv_data` is untouched. All slices must share one length.
    pub fn reduce(
        &mut self,
        send_data: &[u8],
        recv_data: &mut [u8],
        op: ReduceOp,
        root: i32,
    ) -> Result<()> {
        self.check_rank(root)?;
        let mut scratch = send_data.to_vec();
        let scratch_len = scratch.len() as i32;
        self.up_phase(&mut scratch, scratch_len, op.tag(), root)?;
        if self.rank() == root {
            recv_data.copy_from_slice(&scratch);
        }
        // A closing sync pass: everyone learns the reduction is complete,
        // and a peer that died late still surfaces as an error everywhere.
        self.down_phase(&mut [], tag::NO_COUNT, tag::NO_MESSAGE, root)
    }

    /// Leaves-to-root traversal: take from every child in ascending order
    /// (reduce carriers fold into `data` as they arrive), then pass the
    /// aggregate to the parent.
    fn up_phase(&mut self, data: &mut [u8], count: i32, tag: Tag, root: i32) -> Result<()> {
        let me = tree::swap_root(self.rank(), root);
        for child in tree::children(me, self.size()) {
            self.recv_frame(data, count, tree::swap_root(child, root), tag)?;
        }
        if let Some(parent) = tree::parent(me) {
            self.send_frame(data, count, tree::swap_root(parent, root), tag)?;
        }
        Ok(())
    }

    /// Root-to-leaves traversal: take from the parent, then feed every
    /// child in ascending order.
    fn down_phase(&mut self, data: &mut [u8], count: i32, tag: Tag, root: i32) -> Result<()> {
        let me = tree::swap_root(self.rank(), root);
        if let Some(parent) = tree::parent(me) {
            self.recv_frame(data, count, tree::swap_root(parent, root), tag)?;
        }
        for child in tree::children(me, self.size()) {
            self.send_frame(data, count, tree::swap_root(child, root), tag)?;
        }
        Ok(())
    }
}
