use super::signal::CancelSignal;
use super::{InputError, InputReader, Selected};
use crate::decode::Decoder;
use crossterm::event::KeyEvent;
use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

/// Highest descriptor number (exclusive) an `fd_set` can hold.
const FD_SETSIZE: usize = libc::FD_SETSIZE as usize;

/// Cancelable reader built on POSIX `select`.
///
/// No kernel object persists between calls: every wait builds a fresh
/// descriptor set holding the input and the cancel pipe.
pub struct SelectInputReader {
    file: File,
    decoder: Mutex<Decoder>,
    pub(crate) signal: CancelSignal,
    closed: AtomicBool,
}

enum Ready {
    Target,
    Signal,
}

impl SelectInputReader {
    /// Wrap `file` in a select reader.
    ///
    /// If the input or the cancel pipe lands on a descriptor `select` cannot
    /// represent, the file comes back as [`Selected::Unsupported`].
    pub fn new(file: File) -> Result<Selected<Self>, InputError> {
        if !representable(file.as_raw_fd()) {
            return Ok(Selected::Unsupported(file));
        }
        let signal = CancelSignal::new().map_err(|source| InputError::Setup {
            op: "create cancel signal",
            source,
        })?;
        if !representable(signal.read_fd) {
            signal.close(&mut Vec::new());
            return Ok(Selected::Unsupported(file));
        }
        Ok(Selected::Cancelable(Self {
            file,
            decoder: Mutex::new(Decoder::new()),
            signal,
            closed: AtomicBool::new(false),
        }))
    }

    fn wait(&self) -> Result<Ready, InputError> {
        let target = self.file.as_raw_fd();
        let signal = self.signal.read_fd;
        let nfds = target.max(signal) + 1;

        loop {
            // SAFETY: fd_set is plain data and both descriptors are below
            // FD_SETSIZE (checked at construction).
            let mut read_set: libc::fd_set = unsafe { std::mem::zeroed() };
            unsafe {
                libc::FD_ZERO(&mut read_set);
                libc::FD_SET(target, &mut read_set);
                libc::FD_SET(signal, &mut read_set);
            }
            let n = unsafe {
                libc::select(
                    nfds,
                    &mut read_set,
                    ptr::null_mut(),
                    ptr::null_mut(),
                    ptr::null_mut(),
                )
            };
            if n == -1 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(InputError::Wait(err));
            }

            let (signal_ready, target_ready) = unsafe {
                (
                    libc::FD_ISSET(signal, &read_set),
                    libc::FD_ISSET(target, &read_set),
                )
            };
            return match (target_ready, signal_ready) {
                (_, true) => Ok(Ready::Signal),
                (true, false) => Ok(Ready::Target),
                (false, false) => Err(InputError::Unexpected(
                    "select returned without setting a file descriptor",
                )),
            };
        }
    }

    fn release(&self) -> Result<(), InputError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut errors = Vec::new();
        self.signal.close(&mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(InputError::Close(errors))
        }
    }
}

fn representable(fd: RawFd) -> bool {
    usize::try_from(fd).is_ok_and(|fd| fd < FD_SETSIZE)
}

impl InputReader for SelectInputReader {
    fn read_input(&self) -> Result<Vec<KeyEvent>, InputError> {
        if self.signal.is_cancelled() {
            return Err(self.signal.acknowledge());
        }
        match self.wait()? {
            Ready::Signal => Err(self.signal.acknowledge()),
            Ready::Target if self.signal.is_cancelled() => Err(self.signal.acknowledge()),
            Ready::Target => {
                let mut file = &self.file;
                let mut decoder = self.decoder.lock().unwrap_or_else(PoisonError::into_inner);
                Ok(decoder.decode(&mut file)?)
            }
        }
    }

    fn cancel(&self) -> bool {
        tracing::debug!("cancelling select input reader");
        self.signal.cancel()
    }

    fn close(&self) -> Result<(), InputError> {
        self.release()
    }
}

impl Drop for SelectInputReader {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(error = %e, "releasing select input reader");
        }
    }
}
