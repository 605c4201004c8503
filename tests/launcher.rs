//! The real thing: worlds of separate processes stood up by `mpiperun`.

use std::process::Command;

#[test]
fn launcher_runs_self_checking_worlds() {
    for size in [1, 2, 3, 4, 8] {
        let status = Command::new(env!("CARGO_BIN_EXE_mpiperun"))
            .arg(size.to_string())
            .arg(env!("CARGO_BIN_EXE_mpipe-ring"))
            .status()
            .expect("failed to spawn mpiperun");
        assert!(status.success(), "world of {} failed: {}", size, status);
    }
}

#[test]
fn launcher_rejects_bad_arguments() {
    let status = Command::new(env!("CARGO_BIN_EXE_mpiperun"))
        .status()
        .expect("failed to spawn mpiperun");
    assert_eq!(status.code(), Some(2));

    let status = Command::new(env!("CARGO_BIN_EXE_mpiperun"))
        .args(["40", "/bin/true"])
        .status()
        .expect("failed to spawn mpiperun");
    assert_eq!(status.code(), Some(2));
}
