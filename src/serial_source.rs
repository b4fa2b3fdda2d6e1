//! NMEA sentences read line by line from the receiver's serial port.

use std::io::{self, BufRead, BufReader};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serialport::{ClearBuffer, SerialPort};

use crate::config::SerialConfig;
use crate::error::Result;
use crate::navigation::SentenceSource;

/// Line fragments skipped while resynchronising on a `$`.
const MAX_FRAGMENTS: usize = 4;

/// Serial port opened lazily and reopened after I/O failures.
///
/// While the port cannot be opened, reads fail immediately and a new attempt is
/// made at most once per `open_retry_secs`.
pub struct SerialNmeaSource {
    config: SerialConfig,
    reader: Option<BufReader<Box<dyn SerialPort>>>,
    last_attempt: Option<Instant>,
}

impl SerialNmeaSource {
    pub fn new(config: SerialConfig) -> Self {
        Self {
            config,
            reader: None,
            last_attempt: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    fn open(&mut self) -> Result<&mut BufReader<Box<dyn SerialPort>>> {
        if self.reader.is_none() {
            let retry = Duration::from_secs(self.config.open_retry_secs);
            if let Some(last) = self.last_attempt {
                if last.elapsed() < retry {
                    return Err(io::Error::new(io::ErrorKind::NotConnected, "GPS serial port not open").into());
                }
            }
            self.last_attempt = Some(Instant::now());
            let port = serialport::new(&self.config.port, self.config.baud_rate)
                .timeout(Duration::from_millis(self.config.timeout_ms))
                .data_bits(serialport::DataBits::Eight)
                .open()
                .inspect_err(|e| {
                    warn!(
                        "Failed to open GPS serial port {}: {}, next attempt in {} seconds",
                        self.config.port, e, self.config.open_retry_secs
                    )
                })?;
            info!("GPS serial link established on {} at {} baud", self.config.port, self.config.baud_rate);
            self.reader = Some(BufReader::new(port));
        }
        match self.reader.as_mut() {
            Some(reader) => Ok(reader),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "GPS serial port not open").into()),
        }
    }
}

/// Reads one `$`-framed line, skipping up to [`MAX_FRAGMENTS`] lines that do not start with `$`.
///
/// `Ok(None)` on a read timeout, at end of input or when no sentence start was found.
pub fn read_framed<R: BufRead>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut line = Vec::with_capacity(96);
    for _ in 0..MAX_FRAGMENTS {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => return Ok(None),
            Ok(_) if line.first() == Some(&b'$') => return Ok(Some(line)),
            Ok(_) => debug!("Skipping {} bytes outside a sentence", line.len()),
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => return Ok(None),
            Err(e) => return Err(e),
        }
    }
    Ok(None)
}

impl SentenceSource for SerialNmeaSource {
    fn read_sentence(&mut self) -> Result<Option<Vec<u8>>> {
        let reader = self.open()?;
        match read_framed(reader) {
            Ok(sentence) => Ok(sentence),
            Err(e) => {
                warn!("GPS serial read failed, closing port: {}", e);
                self.reader = None;
                Err(e.into())
            }
        }
    }

    fn discard_pending(&mut self) {
        let Some(reader) = self.reader.as_mut() else {
            return;
        };
        let buffered = reader.buffer().len();
        reader.consume(buffered);
        if let Err(e) = reader.get_ref().clear(ClearBuffer::Input) {
            debug!("Cannot clear GPS input buffer: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NavError;
    use std::io::{Cursor, Read};

    const GGA: &[u8] = b"$GPGGA,123519,3807.1640,N,00046.7100,W,1,08,0.9,545.4,M,46.9,M,,*5C\r\n";

    /// Fails every read with the given error kind.
    struct Failing(io::ErrorKind);

    impl Read for Failing {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(self.0, "serial line down"))
        }
    }

    #[test]
    fn test_crlf_sentence_returned_intact() {
        let mut reader = Cursor::new(GGA.to_vec());
        assert_eq!(read_framed(&mut reader).unwrap(), Some(GGA.to_vec()));
        assert_eq!(read_framed(&mut reader).unwrap(), None);
    }

    #[test]
    fn test_resyncs_after_partial_line() {
        let mut input = b"3,M,46.9,M,,*47\r\n".to_vec();
        input.extend_from_slice(GGA);
        let mut reader = Cursor::new(input);
        assert_eq!(read_framed(&mut reader).unwrap(), Some(GGA.to_vec()));
    }

    #[test]
    fn test_gives_up_after_too_many_fragments() {
        let mut input = b"noise\n".repeat(MAX_FRAGMENTS);
        input.extend_from_slice(GGA);
        let mut reader = Cursor::new(input);
        assert_eq!(read_framed(&mut reader).unwrap(), None);
        // the sentence is still there for the next read
        assert_eq!(read_framed(&mut reader).unwrap(), Some(GGA.to_vec()));
    }

    #[test]
    fn test_end_of_input_and_timeout_are_not_errors() {
        let mut empty = Cursor::new(Vec::new());
        assert_eq!(read_framed(&mut empty).unwrap(), None);

        let mut timed_out = BufReader::new(Failing(io::ErrorKind::TimedOut));
        assert_eq!(read_framed(&mut timed_out).unwrap(), None);

        let mut broken = BufReader::new(Failing(io::ErrorKind::BrokenPipe));
        assert!(read_framed(&mut broken).is_err());
    }

    #[test]
    fn test_failed_open_waits_for_retry_window() {
        let mut source = SerialNmeaSource::new(SerialConfig {
            port: "/nonexistent/ttyGPS".into(),
            open_retry_secs: 3600,
            ..SerialConfig::default()
        });
        assert!(matches!(source.read_sentence(), Err(NavError::Serial(_))));
        assert!(!source.is_open());

        // inside the window no new attempt is made
        match source.read_sentence() {
            Err(NavError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::NotConnected),
            other => panic!("expected a not connected error, got {:?}", other),
        }
        source.discard_pending();
        assert!(!source.is_open());
    }
}
