use super::{InputError, InputReader};
use crate::decode::Decoder;
use crossterm::event::KeyEvent;
use std::io::Read;
use std::sync::{Mutex, PoisonError};

/// Plain blocking reader with no cancellation support.
///
/// Used for streams that are not OS files, or whose descriptor the platform's
/// wait primitive cannot handle. [`cancel`](InputReader::cancel) always
/// returns `false` and a pending read only returns once the next byte
/// arrives or the stream is closed.
pub struct FallbackInputReader {
    stream: Mutex<Stream>,
}

struct Stream {
    reader: Box<dyn Read + Send>,
    decoder: Decoder,
}

impl FallbackInputReader {
    /// Wrap any byte stream.
    pub fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            stream: Mutex::new(Stream {
                reader,
                decoder: Decoder::new(),
            }),
        }
    }
}

impl InputReader for FallbackInputReader {
    fn read_input(&self) -> Result<Vec<KeyEvent>, InputError> {
        let mut stream = self.stream.lock().unwrap_or_else(PoisonError::into_inner);
        let Stream { reader, decoder } = &mut *stream;
        Ok(decoder.decode(&mut **reader)?)
    }

    fn cancel(&self) -> bool {
        false
    }

    fn close(&self) -> Result<(), InputError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::DecodeError;
    use crossterm::event::KeyCode;
    use std::io::Cursor;

    #[test]
    fn reads_from_any_stream() {
        let reader = FallbackInputReader::new(Box::new(Cursor::new(b"\x1b[Bj".to_vec())));
        let codes: Vec<_> = reader
            .read_input()
            .unwrap()
            .into_iter()
            .map(|k| k.code)
            .collect();
        assert_eq!(codes, vec![KeyCode::Down, KeyCode::Char('j')]);
    }

    #[test]
    fn cancel_never_succeeds() {
        let reader = FallbackInputReader::new(Box::new(Cursor::new(b"a".to_vec())));
        assert!(!reader.cancel());
        assert!(!reader.cancel());
        // The read is unaffected by the cancel request.
        assert_eq!(reader.read_input().unwrap()[0].code, KeyCode::Char('a'));
        reader.close().unwrap();
    }

    #[test]
    fn exhausted_stream_is_an_error() {
        let reader = FallbackInputReader::new(Box::new(Cursor::new(Vec::new())));
        assert!(matches!(
            reader.read_input(),
            Err(InputError::Decode(DecodeError::Eof))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn closing_the_stream_unblocks_read() {
        use crate::input::test_util::stream_pair;
        use std::sync::Arc;
        use std::thread;
        use std::time::Duration;

        let (file, writer) = stream_pair();
        let reader = Arc::new(FallbackInputReader::new(Box::new(file)));
        let blocked = {
            let reader = reader.clone();
            thread::spawn(move || reader.read_input())
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!reader.cancel());
        drop(writer);
        assert!(matches!(
            blocked.join().unwrap(),
            Err(InputError::Decode(DecodeError::Eof))
        ));
    }
}
