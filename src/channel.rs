//! Exact-length blocking I/O over the pre-opened byte streams.
//!
//! Pipes deliver and accept data in whatever chunks the kernel feels like,
//! so both primitives loop until the full length has moved. Zero or an
//! error means the other side of the channel is gone; the distinction does
//! not matter to callers, only "closed" does.

use std::os::unix::io::RawFd;

use log::debug;
use nix::errno::Errno;
use nix::unistd;

/// A channel endpoint owned by exactly one thread, closed on drop.
#[derive(Debug)]
pub(crate) struct Endpoint(RawFd);

impl Endpoint {
    pub fn from_raw(fd: RawFd) -> Endpoint {
        Endpoint(fd)
    }

    pub fn raw(&self) -> RawFd {
        self.0
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        // Nothing useful to do with a close error; EOF reaches the peer
        // either way.
        let _ = unistd::close(self.0);
    }
}

/// Reads until `buf` is full. Returns false if the stream ends first.
pub(crate) fn read_exact(fd: RawFd, buf: &mut [u8]) -> bool {
    let mut filled = 0;
    while filled < buf.len() {
        match unistd::read(fd, &mut buf[filled..]) {
            Ok(0) => return false,
            Ok(n) => filled += n,
            Err(Errno::EINTR) => continue,
            Err(err) => {
                debug!("read on fd {} failed: {}", fd, err);
                return false;
            }
        }
    }
    true
}

/// Writes all of `buf`. Returns false if the reading side has gone away.
pub(crate) fn write_exact(fd: RawFd, buf: &[u8]) -> bool {
    let mut written = 0;
    while written < buf.len() {
        match unistd::write(fd, &buf[written..]) {
            Ok(0) => return false,
            Ok(n) => written += n,
            Err(Errno::EINTR) => continue,
            Err(err) => {
                debug!("write on fd {} failed: {}", fd, err);
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn round_trips_through_a_pipe() {
        let (r, w) = unistd::pipe().unwrap();
        let (r, w) = (Endpoint::from_raw(r), Endpoint::from_raw(w));
        assert!(write_exact(w.raw(), b"four bytes and more"));
        let mut buf = [0u8; 19];
        assert!(read_exact(r.raw(), &mut buf));
        assert_eq!(&buf, b"four bytes and more");
    }

    #[test]
    fn read_reports_closure() {
        let (r, w) = unistd::pipe().unwrap();
        let r = Endpoint::from_raw(r);
        drop(Endpoint::from_raw(w));
        let mut buf = [0u8; 1];
        assert!(!read_exact(r.raw(), &mut buf));
    }

    #[test]
    fn write_reports_closure() {
        let (r, w) = unistd::pipe().unwrap();
        let w = Endpoint::from_raw(w);
        drop(Endpoint::from_raw(r));
        assert!(!write_exact(w.raw(), b"nobody is listening"));
    }

    #[test]
    fn survives_short_reads_and_writes() {
        // Larger than any pipe buffer, so both loops must take several laps.
        let payload: Vec<u8> = (0..1 << 20).map(|i| (i % 251) as u8).collect();
        let (r, w) = unistd::pipe().unwrap();
        let (r, w) = (Endpoint::from_raw(r), Endpoint::from_raw(w));
        let expected = payload.clone();
        let reader = thread::spawn(move || {
            let mut buf = vec![0u8; expected.len()];
            assert!(read_exact(r.raw(), &mut buf));
            assert_eq!(buf, expected);
        });
        assert!(write_exact(w.raw(), &payload));
        drop(w);
        reader.join().unwrap();
    }
}
