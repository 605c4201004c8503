//! World launcher: `mpiperun N PROG [ARGS...]`.
//!
//! Creates one pipe per ordered pair of distinct ranks, parks the ends at
//! the well-known descriptor slots, and execs `N` copies of `PROG` with
//! each copy's rank in its environment. Waits for the whole world and
//! exits non-zero if any rank does.

use std::env;
use std::ffi::CString;
use std::os::unix::io::RawFd;
use std::process::exit;

use nix::sys::wait::{wait, WaitStatus};
use nix::unistd::{self, ForkResult};

use mpipe::wiring::{self, MAX_WORLD_SIZE, RANK_ENV, WORLD_SIZE_ENV};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("usage: mpiperun N PROG [ARGS...]");
        exit(2);
    }
    let size: i32 = match args[1].parse() {
        Ok(n) if (1..=MAX_WORLD_SIZE).contains(&n) => n,
        _ => {
            eprintln!("mpiperun: world size must be an integer in 1..={}", MAX_WORLD_SIZE);
            exit(2);
        }
    };
    let program: Vec<CString> = args[2..]
        .iter()
        .map(|arg| CString::new(arg.as_str()).expect("argument contains a NUL byte"))
        .collect();

    env::set_var(WORLD_SIZE_ENV, &args[1]);
    wire_slots(size);

    for rank in 0..size {
        // Inherited across the upcoming fork+exec; the parent's own copy is
        // clobbered each round, which nothing cares about.
        env::set_var(RANK_ENV, rank.to_string());
        match unsafe { unistd::fork() } {
            Ok(ForkResult::Child) => {
                prune_slots(size, rank);
                let err = unistd::execvp(&program[0], &program).unwrap_err();
                eprintln!("mpiperun: exec {}: {}", args[2], err);
                exit(127);
            }
            Ok(ForkResult::Parent { child }) => {
                log::debug!("rank {} is pid {}", rank, child);
            }
            Err(err) => {
                eprintln!("mpiperun: fork: {}", err);
                exit(1);
            }
        }
    }

    // The children own the channels now; keeping our copies open would
    // keep every reader in the world alive forever.
    for_each_slot(size, |slot| {
        let _ = unistd::close(slot);
    });

    let mut failed = false;
    for _ in 0..size {
        match wait() {
            Ok(WaitStatus::Exited(_, 0)) => {}
            Ok(status) => {
                eprintln!("mpiperun: child did not exit cleanly: {:?}", status);
                failed = true;
            }
            Err(err) => {
                eprintln!("mpiperun: wait: {}", err);
                failed = true;
            }
        }
    }
    exit(if failed { 1 } else { 0 });
}

/// One pipe per ordered pair, each end moved to its slot. Fresh pipe
/// descriptors are always the lowest free numbers, well below the slot
/// range, so a dup2 target can only equal its source on a bizarre stdio
/// setup; `move_fd` tolerates even that.
fn wire_slots(size: i32) {
    for receiver in 0..size {
        for sender in 0..size {
            if receiver == sender {
                continue;
            }
            let (read_end, write_end) = unistd::pipe().unwrap_or_else(|err| {
                eprintln!("mpiperun: pipe: {}", err);
                exit(1);
            });
            move_fd(read_end, wiring::read_slot(size, receiver, sender));
            move_fd(write_end, wiring::write_slot(size, receiver, sender));
        }
    }
}

fn move_fd(fd: RawFd, slot: RawFd) {
    if fd == slot {
        return;
    }
    if let Err(err) = unistd::dup2(fd, slot) {
        eprintln!("mpiperun: dup2 to slot {}: {}", slot, err);
        exit(1);
    }
    let _ = unistd::close(fd);
}

/// Each rank keeps only the ends it owns: the read sides where it is the
/// receiver and the write sides where it is the sender.
fn prune_slots(size: i32, rank: i32) {
    for receiver in 0..size {
        for sender in 0..size {
            if receiver == sender {
                continue;
            }
            if receiver != rank {
                let _ = unistd::close(wiring::read_slot(size, receiver, sender));
            }
            if sender != rank {
                let _ = unistd::close(wiring::write_slot(size, receiver, sender));
            }
        }
    }
}

fn for_each_slot(size: i32, mut f: impl FnMut(RawFd)) {
    for receiver in 0..size {
        for sender in 0..size {
            if receiver != sender {
                f(wiring::read_slot(size, receiver, sender));
                f(wiring::write_slot(size, receiver, sender));
            }
        }
    }
}
