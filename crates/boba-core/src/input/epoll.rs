use super::signal::{close_fd, CancelSignal};
use super::{InputError, InputReader, Selected};
use crate::decode::Decoder;
use crossterm::event::KeyEvent;
use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

const TARGET: u64 = 0;
const SIGNAL: u64 = 1;

/// Cancelable reader built on `epoll`.
///
/// Both the input descriptor and the cancel pipe are registered with one
/// epoll instance at construction; each read performs a single unbounded
/// `epoll_wait` on it.
pub struct EpollInputReader {
    file: File,
    decoder: Mutex<Decoder>,
    epoll: RawFd,
    pub(crate) signal: CancelSignal,
    closed: AtomicBool,
}

enum Ready {
    Target,
    Signal,
}

impl EpollInputReader {
    /// Wrap `file` in an epoll reader.
    ///
    /// Files epoll cannot watch (regular files, `/dev/null`) come back as
    /// [`Selected::Unsupported`].
    pub fn new(file: File) -> Result<Selected<Self>, InputError> {
        let epoll = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epoll == -1 {
            return Err(InputError::Setup {
                op: "create epoll",
                source: io::Error::last_os_error(),
            });
        }
        if let Err(source) = register(epoll, file.as_raw_fd(), TARGET) {
            let _ = close_fd(epoll);
            if source.raw_os_error() == Some(libc::EPERM) {
                return Ok(Selected::Unsupported(file));
            }
            return Err(InputError::Setup {
                op: "add reader to epoll interest list",
                source,
            });
        }
        let signal = match CancelSignal::new() {
            Ok(signal) => signal,
            Err(source) => {
                let _ = close_fd(epoll);
                return Err(InputError::Setup {
                    op: "create cancel signal",
                    source,
                });
            }
        };
        let reader = Self {
            file,
            decoder: Mutex::new(Decoder::new()),
            epoll,
            signal,
            closed: AtomicBool::new(false),
        };
        // On failure `reader` is dropped, which releases the epoll and the pipe.
        if let Err(source) = register(reader.epoll, reader.signal.read_fd, SIGNAL) {
            return Err(InputError::Setup {
                op: "add cancel signal to epoll interest list",
                source,
            });
        }
        Ok(Selected::Cancelable(reader))
    }

    fn wait(&self) -> Result<Ready, InputError> {
        let mut events: [libc::epoll_event; 2] = [libc::epoll_event { events: 0, u64: 0 }; 2];
        let n = loop {
            let n = unsafe { libc::epoll_wait(self.epoll, events.as_mut_ptr(), 2, -1) };
            if n >= 0 {
                break n as usize;
            }
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(InputError::Wait(err));
        };

        let (mut target, mut signal) = (false, false);
        for event in &events[..n] {
            let token = event.u64;
            match token {
                TARGET => target = true,
                SIGNAL => signal = true,
                _ => {}
            }
        }
        match (target, signal) {
            (_, true) => Ok(Ready::Signal),
            (true, false) => Ok(Ready::Target),
            (false, false) => Err(InputError::Unexpected(
                "epoll returned without a ready descriptor",
            )),
        }
    }

    fn release(&self) -> Result<(), InputError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut errors = Vec::new();
        if let Err(e) = close_fd(self.epoll) {
            errors.push(format!("closing epoll: {e}"));
        }
        self.signal.close(&mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(InputError::Close(errors))
        }
    }
}

fn register(epoll: RawFd, fd: RawFd, token: u64) -> io::Result<()> {
    let mut event = libc::epoll_event {
        events: libc::EPOLLIN as u32,
        u64: token,
    };
    if unsafe { libc::epoll_ctl(epoll, libc::EPOLL_CTL_ADD, fd, &mut event) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

impl InputReader for EpollInputReader {
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
        tracing::debug!("cancelling epoll input reader");
        self.signal.cancel()
    }

    fn close(&self) -> Result<(), InputError> {
        self.release()
    }
}

impl Drop for EpollInputReader {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(error = %e, "releasing epoll input reader");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::test_util::stream_pair;
    use crossterm::event::KeyCode;
    use std::io::Write;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn pollable_reader() -> (EpollInputReader, std::os::unix::net::UnixStream) {
        let (file, writer) = stream_pair();
        match EpollInputReader::new(file).unwrap() {
            Selected::Cancelable(reader) => (reader, writer),
            Selected::Unsupported(_) => panic!("socket should be pollable"),
        }
    }

    #[test]
    fn reads_available_input() {
        let (reader, mut writer) = pollable_reader();
        writer.write_all(b"a").unwrap();
        let keys = reader.read_input().unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].code, KeyCode::Char('a'));
        reader.close().unwrap();
    }

    #[test]
    fn character_split_across_reads_is_reassembled() {
        let (reader, mut writer) = pollable_reader();
        writer.write_all(&[0xc3]).unwrap();
        assert!(reader.read_input().unwrap().is_empty());
        writer.write_all(&[0xa9]).unwrap();
        assert_eq!(reader.read_input().unwrap()[0].code, KeyCode::Char('é'));
        reader.close().unwrap();
    }

    #[test]
    fn cancel_before_read_returns_immediately() {
        let (reader, mut writer) = pollable_reader();
        writer.write_all(b"a").unwrap();
        assert!(reader.cancel());
        assert!(reader.read_input().unwrap_err().is_canceled());
        assert!(reader.signal.flag().is_acknowledged());
        reader.close().unwrap();
    }

    #[test]
    fn cancel_wakes_blocked_read() {
        let (reader, _writer) = pollable_reader();
        let reader = Arc::new(reader);
        let blocked = {
            let reader = reader.clone();
            thread::spawn(move || reader.read_input())
        };
        thread::sleep(Duration::from_millis(50));
        assert!(reader.cancel());
        let result = blocked.join().unwrap();
        assert!(result.unwrap_err().is_canceled());
        assert!(reader.signal.flag().is_acknowledged());
        reader.close().unwrap();
    }

    #[test]
    fn cancel_wins_over_pending_data() {
        let (reader, mut writer) = pollable_reader();
        let reader = Arc::new(reader);
        assert!(reader.cancel());
        writer.write_all(b"late").unwrap();
        assert!(reader.read_input().unwrap_err().is_canceled());
        // Still cancelled on later calls, data is never decoded.
        assert!(reader.read_input().unwrap_err().is_canceled());
        reader.close().unwrap();
    }

    #[test]
    fn concurrent_cancel_is_consistent() {
        let (reader, _writer) = pollable_reader();
        let reader = Arc::new(reader);
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let reader = reader.clone();
                thread::spawn(move || reader.cancel())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert!(reader.read_input().unwrap_err().is_canceled());
        reader.close().unwrap();
    }

    #[test]
    fn closed_stream_reports_eof() {
        let (reader, writer) = pollable_reader();
        drop(writer);
        let err = reader.read_input().unwrap_err();
        assert!(matches!(err, InputError::Decode(crate::decode::DecodeError::Eof)));
        reader.close().unwrap();
    }

    #[test]
    fn close_after_cancel_is_clean_and_idempotent() {
        let (reader, _writer) = pollable_reader();
        assert!(reader.cancel());
        reader.close().unwrap();
        reader.close().unwrap();
        // Later calls report the first delivery.
        assert!(reader.cancel());
    }

    #[test]
    fn close_aggregates_failures() {
        let (mut reader, _writer) = pollable_reader();
        // Swap in a descriptor that is already invalid so one release step fails.
        let real = reader.signal.read_fd;
        reader.signal.read_fd = -1;
        let err = reader.close().unwrap_err();
        let InputError::Close(failures) = &err else {
            panic!("expected close error, got {err:?}");
        };
        assert_eq!(failures.len(), 1);
        assert!(failures[0].starts_with("closing cancel signal reader"));
        close_fd(real).unwrap();
    }

    #[test]
    fn regular_file_is_unsupported() {
        let path = std::env::temp_dir().join(format!("boba-epoll-{}", std::process::id()));
        std::fs::write(&path, b"x").unwrap();
        let file = File::open(&path).unwrap();
        assert!(matches!(EpollInputReader::new(file).unwrap(), Selected::Unsupported(_)));
        std::fs::remove_file(&path).ok();
    }
}
