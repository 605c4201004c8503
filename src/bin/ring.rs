//! Self-checking demonstration worker. Run a world of it under the
//! launcher:
//!
//! ```text
//! mpiperun 4 target/debug/mpipe-ring
//! ```
//!
//! Passes a counter once around the ring, then exercises each collective,
//! asserting every result. Exits non-zero on any mismatch, which is what
//! the end-to-end launcher test keys off.

use std::process::exit;

use mpipe::{ReduceOp, World};

const TOKEN_TAG: i32 = 1;

fn main() {
    env_logger::init();

    let mut world = match World::init(false) {
        Ok(world) => world,
        Err(err) => {
            eprintln!("mpipe-ring: init: {}", err);
            exit(2);
        }
    };
    let rank = world.rank();

    let outcome = run(&mut world);
    world.finalize();
    if let Err(err) = outcome {
        eprintln!("mpipe-ring: rank {}: {}", rank, err);
        exit(1);
    }
}

fn run(world: &mut World) -> mpipe::Result<()> {
    let rank = world.rank();
    let size = world.size();

    // One lap around the ring, each rank incrementing the token.
    if size > 1 {
        let next = (rank + 1) % size;
        let prev = (rank + size - 1) % size;
        let mut token = [0u8; 1];
        if rank == 0 {
            world.send(&token, next, TOKEN_TAG)?;
            world.recv(&mut token, prev, TOKEN_TAG)?;
            assert_eq!(token[0], (size - 1) as u8, "token lost count on its lap");
        } else {
            world.recv(&mut token, prev, TOKEN_TAG)?;
            token[0] += 1;
            world.send(&token, next, TOKEN_TAG)?;
        }
    }

    world.barrier()?;

    let mut news = [0u8; 4];
    if rank == 0 {
        news = *b"ring";
    }
    world.bcast(&mut news, 0)?;
    assert_eq!(&news, b"ring", "broadcast did not reach rank {}", rank);

    let contribution = [1u8; 8];
    let mut total = [0u8; 8];
    world.reduce(&contribution, &mut total, ReduceOp::Sum, 0)?;
    if rank == 0 {
        assert!(
            total.iter().all(|&lane| lane == size as u8),
            "reduce produced {:?} for a world of {}",
            total,
            size
        );
    }

    Ok(())
}
