//! Self-pipe used to wake a reader blocked in `epoll_wait`/`select`.

use super::InputError;
use crate::cancel::CancelFlag;
use std::io;
use std::os::fd::RawFd;
use std::sync::{Mutex, PoisonError};

/// A cancellation flag paired with the pipe that announces it.
///
/// [`cancel`](CancelSignal::cancel) writes a single byte to the pipe the first
/// time it is called; later calls report the outcome of that first write. The
/// read end is registered with the reader's wait primitive, so a blocked wait
/// returns as soon as the byte lands.
pub(crate) struct CancelSignal {
    flag: CancelFlag,
    pub(crate) read_fd: RawFd,
    writer: Mutex<Writer>,
}

struct Writer {
    fd: Option<RawFd>,
    delivered: Option<bool>,
}

impl CancelSignal {
    pub(crate) fn new() -> io::Result<Self> {
        let mut fds: [libc::c_int; 2] = [-1; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } == -1 {
            return Err(io::Error::last_os_error());
        }
        for fd in fds {
            if let Err(e) = configure(fd) {
                let _ = close_fd(fds[0]);
                let _ = close_fd(fds[1]);
                return Err(e);
            }
        }
        Ok(Self {
            flag: CancelFlag::new(),
            read_fd: fds[0],
            writer: Mutex::new(Writer {
                fd: Some(fds[1]),
                delivered: None,
            }),
        })
    }

    pub(crate) fn flag(&self) -> &CancelFlag {
        &self.flag
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.flag.is_cancelled()
    }

    /// Set the flag and send the wake byte. Returns whether the byte was
    /// delivered.
    pub(crate) fn cancel(&self) -> bool {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.flag.set_cancelled();
        if let Some(delivered) = writer.delivered {
            return delivered;
        }
        let delivered = match writer.fd {
            Some(fd) => {
                let byte = [b'c'];
                let n = unsafe { libc::write(fd, byte.as_ptr().cast(), 1) };
                n == 1
            }
            None => false,
        };
        writer.delivered = Some(delivered);
        delivered
    }

    /// Consume the pending wake byte and acknowledge the cancellation.
    ///
    /// Always yields an error: [`InputError::Canceled`] once drained, or
    /// [`InputError::SignalDrain`] if the pipe could not be read.
    pub(crate) fn acknowledge(&self) -> InputError {
        if let Err(e) = self.drain() {
            return InputError::SignalDrain(e);
        }
        self.flag.acknowledge();
        InputError::Canceled
    }

    fn drain(&self) -> io::Result<()> {
        let mut buf = [0u8; 16];
        loop {
            let n = unsafe { libc::read(self.read_fd, buf.as_mut_ptr().cast(), buf.len()) };
            if n > 0 {
                continue;
            }
            if n == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::Interrupted => continue,
                io::ErrorKind::WouldBlock => return Ok(()),
                _ => return Err(err),
            }
        }
    }

    /// Close both pipe ends, recording each failure.
    pub(crate) fn close(&self, errors: &mut Vec<String>) {
        let writer_fd = self
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fd
            .take();
        if let Some(fd) = writer_fd {
            if let Err(e) = close_fd(fd) {
                errors.push(format!("closing cancel signal writer: {e}"));
            }
        }
        if let Err(e) = close_fd(self.read_fd) {
            errors.push(format!("closing cancel signal reader: {e}"));
        }
    }
}

fn configure(fd: RawFd) -> io::Result<()> {
    unsafe {
        if libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) == -1 {
            return Err(io::Error::last_os_error());
        }
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags == -1 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) == -1 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

pub(crate) fn close_fd(fd: RawFd) -> io::Result<()> {
    if unsafe { libc::close(fd) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
