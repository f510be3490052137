//! Non-blocking sysfs file reader.
//!
//! Sysfs power interfaces occasionally block on read; a stuck kernel
//! interface must not stall the measurement coordinator. `NonBlockingFileReader`
//! opens with `O_NONBLOCK`, waits for readiness with `poll(2)` up to a
//! caller-supplied timeout, and invalidates itself on timeout or parse
//! failure so the caller can re-open from scratch on the next tick.

use std::io::Read;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Wraps a single sysfs file opened non-blocking.
pub struct NonBlockingFileReader {
    path: PathBuf,
    file: Option<std::fs::File>,
}

impl NonBlockingFileReader {
    /// Construct a reader for `path` without opening it yet.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: None,
        }
    }

    /// Read a decimal `u64` from the file, waiting up to `timeout` for the
    /// descriptor to become readable. On timeout, short read, or parse
    /// failure the handle is dropped so the next call re-opens the file.
    pub fn read_u64_with_timeout(&mut self, timeout: Duration) -> Option<u64> {
        if self.file.is_none() {
            self.file = open_nonblocking(&self.path).ok();
        }
        let file = self.file.as_mut()?;

        if !wait_readable(file.as_raw_fd(), timeout) {
            self.file = None;
            return None;
        }

        use std::io::{Seek, SeekFrom};
        if file.seek(SeekFrom::Start(0)).is_err() {
            self.file = None;
            return None;
        }

        let mut buf = [0u8; 64];
        let n = match file.read(&mut buf) {
            Ok(n) => n,
            Err(_) => {
                self.file = None;
                return None;
            }
        };

        match std::str::from_utf8(&buf[..n])
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
        {
            Some(value) => Some(value),
            None => {
                self.file = None;
                None
            }
        }
    }

    /// Force the handle closed; the next read re-opens from scratch.
    pub fn invalidate(&mut self) {
        self.file = None;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
fn open_nonblocking(path: &Path) -> std::io::Result<std::fs::File> {
    use std::fs::OpenOptions;
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
}

#[cfg(not(unix))]
fn open_nonblocking(path: &Path) -> std::io::Result<std::fs::File> {
    std::fs::File::open(path)
}

#[cfg(unix)]
fn wait_readable(fd: std::os::unix::io::RawFd, timeout: Duration) -> bool {
    use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
    use std::os::fd::BorrowedFd;

    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    let mut poll_fd = PollFd::new(borrowed, PollFlags::POLLIN);
    let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;
    let poll_timeout = PollTimeout::try_from(timeout_ms).unwrap_or(PollTimeout::MAX);
    // A plain regular file is always "ready" under poll(2); this still
    // bounds the syscall itself and gives every sysfs provider a single
    // consistent timeout path.
    poll(std::slice::from_mut(&mut poll_fd), poll_timeout).is_ok()
}

#[cfg(not(unix))]
fn wait_readable(_fd: i32, _timeout: Duration) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_decimal_value() {
        let mut tmp = tempfile_with_contents("123456\n");
        let value = tmp.read_u64_with_timeout(Duration::from_millis(50));
        assert_eq!(value, Some(123456));
    }

    #[test]
    fn reopens_after_invalidate() {
        let mut tmp = tempfile_with_contents("42\n");
        assert_eq!(tmp.read_u64_with_timeout(Duration::from_millis(50)), Some(42));
        tmp.invalidate();
        assert_eq!(tmp.read_u64_with_timeout(Duration::from_millis(50)), Some(42));
    }

    #[test]
    fn malformed_contents_invalidate_handle() {
        let mut tmp = tempfile_with_contents("not-a-number\n");
        assert_eq!(tmp.read_u64_with_timeout(Duration::from_millis(50)), None);
    }

    fn tempfile_with_contents(contents: &str) -> NonBlockingFileReader {
        let mut path = std::env::temp_dir();
        path.push(format!("nemb_reader_test_{}.txt", std::process::id()));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        drop(f);
        NonBlockingFileReader::new(path)
    }
}
