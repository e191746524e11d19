//! Cancelable blocking input readers.
//!
//! The runtime's input pump calls [`InputReader::read_input`] in a loop on a
//! dedicated thread. On shutdown another thread calls
//! [`InputReader::cancel`], which interrupts the blocked read where the
//! platform allows it:
//!
//! | Strategy | Used for | Cancelable |
//! |----------|----------|------------|
//! | [`EpollInputReader`] | OS streams on Linux/Android | yes |
//! | [`SelectInputReader`] | OS streams on other Unix systems | yes |
//! | [`FallbackInputReader`] | arbitrary streams, descriptors `select` cannot represent, non-Unix | no |
//!
//! [`new_input_reader`] picks the strategy at runtime from the stream's kind
//! and descriptor.

use crate::decode::DecodeError;
use crossterm::event::KeyEvent;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};

#[cfg(any(target_os = "linux", target_os = "android"))]
mod epoll;
mod fallback;
#[cfg(unix)]
mod select;
#[cfg(unix)]
mod signal;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub use epoll::EpollInputReader;
pub use fallback::FallbackInputReader;
#[cfg(unix)]
pub use select::SelectInputReader;

/// Errors produced by input readers.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    /// The read was woken by [`InputReader::cancel`] rather than by data.
    #[error("read canceled")]
    Canceled,
    /// Creating an OS resource failed while constructing a reader.
    #[error("{op}: {source}")]
    Setup {
        /// The step that failed.
        op: &'static str,
        /// The OS error.
        source: io::Error,
    },
    /// Waiting for readiness failed.
    #[error("waiting for input: {0}")]
    Wait(io::Error),
    /// The pending wake byte could not be consumed.
    #[error("reading cancel signal: {0}")]
    SignalDrain(io::Error),
    /// The wait primitive returned without reporting a known descriptor.
    #[error("{0}")]
    Unexpected(&'static str),
    /// Decoding the input bytes failed.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// One or more resources could not be released.
    #[error("{}", .0.join(", "))]
    Close(Vec<String>),
}

impl InputError {
    /// Returns `true` for the cancellation outcome.
    pub fn is_canceled(&self) -> bool {
        matches!(self, InputError::Canceled)
    }
}

/// Blocking-with-cancel reader of terminal input.
///
/// All methods take `&self`: one thread reads while another cancels.
pub trait InputReader: Send + Sync {
    /// Block until input is available, then decode it.
    ///
    /// Returns [`InputError::Canceled`] without blocking if the reader was
    /// already cancelled, or once a blocked wait is woken by
    /// [`cancel`](InputReader::cancel).
    fn read_input(&self) -> Result<Vec<KeyEvent>, InputError>;

    /// Request cancellation and wake a blocked [`read_input`](InputReader::read_input).
    ///
    /// Returns whether the wake signal was delivered. Safe to call more than
    /// once and with no read in flight.
    fn cancel(&self) -> bool;

    /// Release the reader's OS resources, reporting every failure.
    ///
    /// Call once the reading thread has stopped. Later calls are no-ops.
    fn close(&self) -> Result<(), InputError>;
}

/// The stream a program reads its input from.
pub enum InputSource {
    /// An OS file stream (terminal, pipe, socket). Reads can be cancelled.
    File(File),
    /// Any other byte stream. Reads cannot be cancelled.
    Reader(Box<dyn Read + Send>),
}

impl InputSource {
    /// The process's standard input.
    ///
    /// On Unix the descriptor is duplicated so the reader owns its own handle.
    pub fn stdin() -> io::Result<Self> {
        #[cfg(unix)]
        {
            use std::os::fd::AsFd;
            let fd = io::stdin().as_fd().try_clone_to_owned()?;
            Ok(InputSource::File(File::from(fd)))
        }
        #[cfg(not(unix))]
        {
            Ok(InputSource::Reader(Box::new(io::stdin())))
        }
    }
}

impl fmt::Debug for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::File(file) => f.debug_tuple("File").field(file).finish(),
            InputSource::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

/// Result of trying to build a cancelable reader around a file.
#[cfg(unix)]
#[derive(Debug)]
pub enum Selected<R> {
    /// The strategy accepted the file.
    Cancelable(R),
    /// The strategy cannot wait on this file; it is handed back untouched.
    Unsupported(File),
}

/// Build the best reader available for `source` on this platform.
pub fn new_input_reader(source: InputSource) -> Result<Box<dyn InputReader>, InputError> {
    let file = match source {
        InputSource::File(file) => file,
        InputSource::Reader(reader) => {
            tracing::debug!("input is not a file stream, using fallback reader");
            return Ok(Box::new(FallbackInputReader::new(reader)));
        }
    };
    cancelable_reader(file)
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn cancelable_reader(file: File) -> Result<Box<dyn InputReader>, InputError> {
    match EpollInputReader::new(file)? {
        Selected::Cancelable(reader) => {
            tracing::debug!("using epoll input reader");
            Ok(Box::new(reader))
        }
        Selected::Unsupported(file) => {
            tracing::debug!("epoll refused the input descriptor, using fallback reader");
            Ok(Box::new(FallbackInputReader::new(Box::new(file))))
        }
    }
}

#[cfg(all(unix, not(any(target_os = "linux", target_os = "android"))))]
fn cancelable_reader(file: File) -> Result<Box<dyn InputReader>, InputError> {
    match SelectInputReader::new(file)? {
        Selected::Cancelable(reader) => {
            tracing::debug!("using select input reader");
            Ok(Box::new(reader))
        }
        Selected::Unsupported(file) => {
            tracing::debug!("descriptor exceeds FD_SETSIZE, using fallback reader");
            Ok(Box::new(FallbackInputReader::new(Box::new(file))))
        }
    }
}

#[cfg(not(unix))]
fn cancelable_reader(file: File) -> Result<Box<dyn InputReader>, InputError> {
    Ok(Box::new(FallbackInputReader::new(Box::new(file))))
}

#[cfg(all(test, unix))]
pub(crate) mod test_util {
    use std::fs::File;
    use std::os::fd::{AsRawFd, FromRawFd, RawFd};
    use std::os::unix::net::UnixStream;

    /// A connected (reader, writer) pair backed by real descriptors.
    pub(crate) fn stream_pair() -> (File, UnixStream) {
        let (a, b) = UnixStream::pair().unwrap();
        let reader: File = std::os::fd::OwnedFd::from(a).into();
        (reader, b)
    }

    /// Like [`stream_pair`], with the reader moved to descriptor `fd`.
    ///
    /// Raises the soft open-file limit as needed. Returns `None` when the
    /// hard limit does not allow it.
    pub(crate) fn stream_pair_at(fd: RawFd) -> Option<(File, UnixStream)> {
        let mut limit = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        assert_eq!(unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) }, 0);
        let needed = fd as libc::rlim_t + 1;
        if limit.rlim_cur < needed {
            if limit.rlim_max < needed {
                return None;
            }
            limit.rlim_cur = needed;
            assert_eq!(unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &limit) }, 0);
        }

        let (file, writer) = stream_pair();
        assert_eq!(unsafe { libc::dup2(file.as_raw_fd(), fd) }, fd);
        drop(file);
        // SAFETY: dup2 just made `fd` a fresh descriptor that nothing else owns.
        Some((unsafe { File::from_raw_fd(fd) }, writer))
    }
}
