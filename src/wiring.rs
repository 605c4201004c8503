//! The contract between the launcher and the runtime: which descriptor
//! slots carry which ordered pair of ranks, and where world size and rank
//! are published in the environment.
//!
//! `mpiperun` parks the read and write ends of one pipe per ordered pair at
//! two consecutive well-known descriptors, starting at [`BASE_SLOT`]. Every
//! process computes the same layout from the world size alone, so nothing
//! about the wiring ever travels over the channels themselves.

use std::env;
use std::os::unix::io::RawFd;

use nix::unistd;

use crate::channel::Endpoint;
use crate::error::{Error, Result};

/// Largest supported world size.
pub const MAX_WORLD_SIZE: i32 = 16;

/// Lowest descriptor slot used for channel endpoints. Slots grow upward
/// from here; everything below is left to stdio and whatever the exec'd
/// program had open.
pub const BASE_SLOT: RawFd = 20;

/// Environment variable naming the world size.
pub const WORLD_SIZE_ENV: &str = "MPIPE_WORLD_SIZE";

/// Environment variable naming the calling process's rank.
pub const RANK_ENV: &str = "MPIPE_RANK";

/// Bijection from ordered `(receiver, sender)` pairs to `0..w*(w-1)`,
/// identical in every process.
pub fn pair_index(w: i32, receiver: i32, sender: i32) -> i32 {
    debug_assert_ne!(receiver, sender);
    receiver * (w - 1) + if sender < receiver { sender } else { sender - 1 }
}

/// Slot of the read end of the `sender -> receiver` channel.
pub fn read_slot(w: i32, receiver: i32, sender: i32) -> RawFd {
    BASE_SLOT + 2 * pair_index(w, receiver, sender)
}

/// Slot of the write end of the `sender -> receiver` channel.
pub fn write_slot(w: i32, receiver: i32, sender: i32) -> RawFd {
    read_slot(w, receiver, sender) + 1
}

/// One process's view of the world's channels: an inbound endpoint and an
/// outbound endpoint per peer, indexed by peer rank (own slots stay empty).
pub struct Wiring {
    pub(crate) size: i32,
    pub(crate) rank: i32,
    pub(crate) inbound: Vec<Option<Endpoint>>,
    pub(crate) outbound: Vec<Option<Endpoint>>,
}

impl Wiring {
    /// Adopts the descriptors pre-wired by the launcher, locating them from
    /// [`WORLD_SIZE_ENV`] and [`RANK_ENV`].
    pub fn from_env() -> Result<Wiring> {
        let size = env_i32(WORLD_SIZE_ENV)?;
        let rank = env_i32(RANK_ENV)?;
        if !(1..=MAX_WORLD_SIZE).contains(&size) {
            return Err(Error::Wiring(format!(
                "world size {} outside 1..={}",
                size, MAX_WORLD_SIZE
            )));
        }
        if !(0..size).contains(&rank) {
            return Err(Error::Wiring(format!(
                "rank {} outside world of {}",
                rank, size
            )));
        }
        let mut wiring = Wiring::empty(size, rank);
        for peer in 0..size {
            if peer == rank {
                continue;
            }
            wiring.inbound[peer as usize] =
                Some(Endpoint::from_raw(read_slot(size, rank, peer)));
            wiring.outbound[peer as usize] =
                Some(Endpoint::from_raw(write_slot(size, peer, rank)));
        }
        Ok(wiring)
    }

    /// Builds a whole world's wiring inside one process, on fresh pipes:
    /// one entry per rank, each to be handed to a
    /// [`World`](crate::World) on its own thread. This is the harness the
    /// integration tests run the end-to-end scenarios on; it involves no
    /// environment and no well-known slots.
    pub fn pipes(size: i32) -> Vec<Wiring> {
        assert!(
            (1..=MAX_WORLD_SIZE).contains(&size),
            "world size {} outside 1..={}",
            size,
            MAX_WORLD_SIZE
        );
        let mut worlds: Vec<Wiring> = (0..size).map(|rank| Wiring::empty(size, rank)).collect();
        for receiver in 0..size {
            for sender in 0..size {
                if receiver == sender {
                    continue;
                }
                let (read_end, write_end) = unistd::pipe().expect("pipe");
                worlds[receiver as usize].inbound[sender as usize] =
                    Some(Endpoint::from_raw(read_end));
                worlds[sender as usize].outbound[receiver as usize] =
                    Some(Endpoint::from_raw(write_end));
            }
        }
        worlds
    }

    fn empty(size: i32, rank: i32) -> Wiring {
        Wiring {
            size,
            rank,
            inbound: (0..size).map(|_| None).collect(),
            outbound: (0..size).map(|_| None).collect(),
        }
    }
}

fn env_i32(key: &str) -> Result<i32> {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| Error::Wiring(format!("{} is not set to an integer", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn pair_index_is_a_bijection() {
        for w in 2..=16 {
            let mut seen = HashSet::new();
            for receiver in 0..w {
                for sender in 0..w {
                    if receiver == sender {
                        continue;
                    }
                    let idx = pair_index(w, receiver, sender);
                    assert!((0..w * (w - 1)).contains(&idx));
                    assert!(seen.insert(idx), "w={} pair ({},{}) collides", w, receiver, sender);
                }
            }
            assert_eq!(seen.len() as i32, w * (w - 1));
        }
    }

    #[test]
    fn slots_never_collide() {
        let w = 16;
        let mut seen = HashSet::new();
        for receiver in 0..w {
            for sender in 0..w {
                if receiver == sender {
                    continue;
                }
                assert!(seen.insert(read_slot(w, receiver, sender)));
                assert!(seen.insert(write_slot(w, receiver, sender)));
            }
        }
        assert!(seen.iter().all(|&slot| slot >= BASE_SLOT));
    }

    #[test]
    fn pipes_wire_every_ordered_pair() {
        let worlds = Wiring::pipes(4);
        for (rank, wiring) in worlds.iter().enumerate() {
            assert_eq!(wiring.rank as usize, rank);
            for peer in 0..4usize {
                assert_eq!(wiring.inbound[peer].is_some(), peer != rank);
                assert_eq!(wiring.outbound[peer].is_some(), peer != rank);
            }
        }
    }
}
