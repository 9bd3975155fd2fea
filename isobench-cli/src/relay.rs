//! Output Relay
//!
//! Copies one output stream of an isolated worker into the matching stream of
//! the orchestrator. Each relay is a task on the orchestrator's [`RelayPool`]
//! and runs until end of stream or until it is stopped. Read failures end the
//! relay quietly; they never fail the suite being relayed.
//!
//! Worker pipes are read through [`PipeSource`], which polls a non-blocking
//! descriptor so a stop request is seen even when a grandchild keeps the
//! write end open. A relay that still ignores its stop request marks the pool
//! stale and the pool is replaced before the next suite.

use indicatif::ProgressBar;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use std::io::{self, ErrorKind, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;
use tracing::{debug, warn};

/// Size of the copy buffer
pub const RELAY_BUFFER_SIZE: usize = 2048;

/// Longest wait on an idle pipe before the stop flag is checked again
pub const POLL_INTERVAL_MS: i32 = 50;

/// How long a stopped relay gets to acknowledge the stop
const STOP_ACK_TIMEOUT: Duration = Duration::from_millis(4 * POLL_INTERVAL_MS as u64);

/// How a relay ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    /// The source reached end of stream
    Eof,
    /// The stop flag was raised
    Stopped,
    /// Reading the source or writing the sink failed
    Failed,
}

/// Copy `source` into `sink` until end of stream, failure or `stop`
///
/// Every chunk is flushed immediately. A source reporting `WouldBlock` is
/// retried after the stop flag was checked. The thread yields between reads
/// so two relays sharing a core take turns.
pub fn pump<R: Read, W: Write>(mut source: R, mut sink: W, stop: &AtomicBool) -> (u64, RelayEnd) {
    let mut buffer = [0u8; RELAY_BUFFER_SIZE];
    let mut copied = 0u64;

    loop {
        if stop.load(Ordering::Acquire) {
            return (copied, RelayEnd::Stopped);
        }

        let n = match source.read(&mut buffer) {
            Ok(0) => return (copied, RelayEnd::Eof),
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) => continue,
            Err(_) => return (copied, RelayEnd::Failed),
        };

        if sink.write_all(&buffer[..n]).and_then(|_| sink.flush()).is_err() {
            return (copied, RelayEnd::Failed);
        }
        copied += n as u64;

        std::thread::yield_now();
    }
}

#[cfg(unix)]
enum PollResult {
    DataAvailable,
    Timeout,
    PipeClosed,
    Error(io::Error),
}

#[cfg(unix)]
fn wait_for_data(fd: std::os::fd::RawFd, timeout_ms: i32) -> PollResult {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };

    let result = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };

    if result < 0 {
        PollResult::Error(io::Error::last_os_error())
    } else if result == 0 {
        PollResult::Timeout
    } else if pollfd.revents & libc::POLLIN != 0 {
        PollResult::DataAvailable
    } else if pollfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
        PollResult::PipeClosed
    } else {
        PollResult::Timeout
    }
}

/// Non-blocking pipe reader that waits at most [`POLL_INTERVAL_MS`] per read
///
/// An idle pipe reads as `WouldBlock`, which hands control back to [`pump`].
#[cfg(unix)]
pub struct PipeSource<R> {
    inner: R,
    fd: std::os::fd::RawFd,
}

#[cfg(unix)]
impl<R: Read + std::os::fd::AsRawFd> PipeSource<R> {
    /// Switch the descriptor of `inner` to non-blocking mode
    pub fn new(inner: R) -> io::Result<Self> {
        let fd = inner.as_raw_fd();
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFL);
            if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(Self { inner, fd })
    }
}

#[cfg(unix)]
impl<R: Read> Read for PipeSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match wait_for_data(self.fd, POLL_INTERVAL_MS) {
            PollResult::Timeout => Err(ErrorKind::WouldBlock.into()),
            PollResult::Error(e) => Err(e),
            // A closed pipe reads as end of stream
            PollResult::DataAvailable | PollResult::PipeClosed => self.inner.read(buf),
        }
    }
}

/// A running relay
pub struct OutputRelay {
    name: &'static str,
    stop: Arc<AtomicBool>,
    done: Receiver<(u64, RelayEnd)>,
}

impl OutputRelay {
    /// Start relaying `source` into `sink` on `pool`
    pub fn start<R, W>(pool: &ThreadPool, name: &'static str, source: R, sink: W) -> Self
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, done) = mpsc::channel();
        let flag = Arc::clone(&stop);

        pool.spawn(move || {
            let outcome = pump(source, sink, &flag);
            let _ = tx.send(outcome);
        });

        Self { name, stop, done }
    }

    /// Stop the relay
    ///
    /// Output still buffered in the pipe is drained for up to `grace`; after
    /// that the stop flag is raised and the task gets a short while to notice
    /// it. Returns the number of bytes copied, or `None` when the task is
    /// still stuck in a read and keeps its pool thread.
    pub fn stop(self, grace: Duration) -> Option<u64> {
        let finished = match self.done.recv_timeout(grace) {
            Err(RecvTimeoutError::Timeout) => {
                self.stop.store(true, Ordering::Release);
                debug!(relay = self.name, "relay still busy after grace period, stop requested");
                self.done.recv_timeout(STOP_ACK_TIMEOUT)
            }
            other => other,
        };

        match finished {
            Ok((copied, end)) => {
                debug!(relay = self.name, copied, ?end, "relay finished");
                Some(copied)
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(relay = self.name, "relay ignored the stop request");
                None
            }
            Err(RecvTimeoutError::Disconnected) => {
                debug!(relay = self.name, "relay task vanished");
                None
            }
        }
    }
}

/// The thread pool relays run on
///
/// Built once and reused for every suite. Stopping relays that never end
/// replaces the pool, so the stuck threads are left behind instead of
/// starving the relays of the next suite.
pub struct RelayPool {
    threads: usize,
    pool: ThreadPool,
    replaced: usize,
}

impl RelayPool {
    /// Build a pool of `threads` relay threads
    pub fn new(threads: usize) -> Result<Self, ThreadPoolBuildError> {
        Ok(Self {
            threads,
            pool: Self::build(threads)?,
            replaced: 0,
        })
    }

    fn build(threads: usize) -> Result<ThreadPool, ThreadPoolBuildError> {
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("isobench-relay-{i}"))
            .build()
    }

    /// Start relaying `source` into `sink`
    pub fn start<R, W>(&self, name: &'static str, source: R, sink: W) -> OutputRelay
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        OutputRelay::start(&self.pool, name, source, sink)
    }

    /// Stop every relay, replacing the pool when one of them is stuck
    pub fn stop_all(&mut self, relays: Vec<OutputRelay>, grace: Duration) -> Vec<Option<u64>> {
        let copied: Vec<Option<u64>> = relays.into_iter().map(|r| r.stop(grace)).collect();

        if copied.iter().any(Option::is_none) {
            match Self::build(self.threads) {
                Ok(pool) => {
                    warn!(threads = self.threads, "replacing relay pool with stuck relays");
                    self.pool = pool;
                    self.replaced += 1;
                }
                Err(e) => warn!("failed to replace relay pool: {e}"),
            }
        }
        copied
    }

    /// How often the pool was replaced
    pub fn replaced(&self) -> usize {
        self.replaced
    }
}

/// Sink that hides a progress bar while relayed bytes are written
pub struct SuspendingWriter<W> {
    bar: ProgressBar,
    inner: W,
}

impl<W: Write> SuspendingWriter<W> {
    /// Write to `inner` while `bar` is hidden
    pub fn new(bar: ProgressBar, inner: W) -> Self {
        Self { bar, inner }
    }
}

impl<W: Write> Write for SuspendingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let inner = &mut self.inner;
        self.bar.suspend(|| inner.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        let inner = &mut self.inner;
        self.bar.suspend(|| inner.flush())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Mutex;

    /// Sink shared with the test after the relay took ownership
    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::BrokenPipe, "pipe closed"))
        }
    }

    /// Blocks until its sender is dropped, like a pipe a grandchild holds open
    struct HeldOpen(mpsc::Receiver<Vec<u8>>);

    impl Read for HeldOpen {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.recv() {
                Ok(bytes) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Err(_) => Ok(0),
            }
        }
    }

    /// Idle source that never blocks
    struct Idle;

    impl Read for Idle {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            std::thread::sleep(Duration::from_millis(5));
            Err(ErrorKind::WouldBlock.into())
        }
    }

    fn pool() -> ThreadPool {
        rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap()
    }

    #[test]
    fn test_pump_copies_until_eof() {
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let mut sink = Vec::new();
        let stop = AtomicBool::new(false);

        let (copied, end) = pump(Cursor::new(data.clone()), &mut sink, &stop);
        assert_eq!(copied, 5000);
        assert_eq!(end, RelayEnd::Eof);
        assert_eq!(sink, data);
    }

    #[test]
    fn test_pump_honours_stop_flag() {
        let mut sink = Vec::new();
        let stop = AtomicBool::new(true);

        let (copied, end) = pump(Cursor::new(vec![1u8; 10]), &mut sink, &stop);
        assert_eq!(copied, 0);
        assert_eq!(end, RelayEnd::Stopped);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_read_error_ends_quietly() {
        let stop = AtomicBool::new(false);
        let (copied, end) = pump(FailingReader, Vec::new(), &stop);
        assert_eq!(copied, 0);
        assert_eq!(end, RelayEnd::Failed);
    }

    #[test]
    fn test_two_relays_share_the_pool() {
        let pool = pool();
        let out = SharedSink::default();
        let err = SharedSink::default();

        let a = OutputRelay::start(&pool, "stdout", Cursor::new(b"hello out".to_vec()), out.clone());
        let b = OutputRelay::start(&pool, "stderr", Cursor::new(b"hello err".to_vec()), err.clone());

        assert_eq!(a.stop(Duration::from_secs(5)), Some(9));
        assert_eq!(b.stop(Duration::from_secs(5)), Some(9));
        assert_eq!(&*out.0.lock().unwrap(), b"hello out");
        assert_eq!(&*err.0.lock().unwrap(), b"hello err");
    }

    #[test]
    fn test_stop_ends_an_idle_relay() {
        let pool = pool();
        let relay = OutputRelay::start(&pool, "stdout", Idle, SharedSink::default());
        assert_eq!(relay.stop(Duration::from_millis(20)), Some(0));
    }

    #[test]
    fn test_stuck_relays_do_not_starve_the_next_suite() {
        let mut relays = RelayPool::new(2).unwrap();
        let (_out_tx, out_rx) = mpsc::channel();
        let (_err_tx, err_rx) = mpsc::channel();

        let stuck = vec![
            relays.start("stdout", HeldOpen(out_rx), SharedSink::default()),
            relays.start("stderr", HeldOpen(err_rx), SharedSink::default()),
        ];
        assert_eq!(relays.stop_all(stuck, Duration::from_millis(50)), vec![None, None]);
        assert_eq!(relays.replaced(), 1);

        let sink = SharedSink::default();
        let next = relays.start("stdout", Cursor::new(b"next suite".to_vec()), sink.clone());
        assert_eq!(relays.stop_all(vec![next], Duration::from_secs(2)), vec![Some(10)]);
        assert_eq!(&*sink.0.lock().unwrap(), b"next suite");
        assert_eq!(relays.replaced(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_pipe_held_open_stops_on_request() {
        use std::fs::File;
        use std::os::fd::FromRawFd;

        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let reader = unsafe { File::from_raw_fd(fds[0]) };
        let mut writer = unsafe { File::from_raw_fd(fds[1]) };

        let pool = pool();
        let sink = SharedSink::default();
        let relay = OutputRelay::start(&pool, "stdout", PipeSource::new(reader).unwrap(), sink.clone());

        writer.write_all(b"partial").unwrap();
        // The write end stays open, so the relay never sees end of stream
        assert_eq!(relay.stop(Duration::from_millis(200)), Some(7));
        assert_eq!(&*sink.0.lock().unwrap(), b"partial");
        drop(writer);
    }

    #[cfg(unix)]
    #[test]
    fn test_pipe_closed_reads_as_eof() {
        use std::fs::File;
        use std::os::fd::FromRawFd;

        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let reader = unsafe { File::from_raw_fd(fds[0]) };
        let mut writer = unsafe { File::from_raw_fd(fds[1]) };
        writer.write_all(b"done").unwrap();
        drop(writer);

        let stop = AtomicBool::new(false);
        let mut sink = Vec::new();
        let (copied, end) = pump(PipeSource::new(reader).unwrap(), &mut sink, &stop);
        assert_eq!((copied, end), (4, RelayEnd::Eof));
        assert_eq!(sink, b"done");
    }

    #[test]
    fn test_suspending_writer_passes_bytes_through() {
        let mut writer = SuspendingWriter::new(ProgressBar::hidden(), Vec::new());
        writer.write_all(b"line\n").unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.inner, b"line\n");
    }
}
