use crate::{CommandPublisher, LowLevelCommand, RawSample, Result, SampleBatch, SampleSource, TransportError};
use std::io::{BufRead, Write};

/// Publishes each command as one JSON object per line.
pub struct JsonLinesPublisher<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesPublisher<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> CommandPublisher for JsonLinesPublisher<W> {
    fn publish(&mut self, command: &LowLevelCommand) -> Result<()> {
        serde_json::to_writer(&mut self.out, command)
            .map_err(|e| TransportError::Io(e.to_string()))?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Reads telemetry batches from a line-oriented JSON stream.
///
/// Each non-blank line is either a batch object (`{"sensors": [...], "relays": [...]}`)
/// or a bare array of samples.
pub struct JsonLinesSource<R: BufRead> {
    input: R,
    line: String,
    line_no: usize,
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            line: String::new(),
            line_no: 0,
        }
    }

    fn parse_line(&self, text: &str) -> Result<SampleBatch> {
        let invalid = |e: serde_json::Error| {
            TransportError::InvalidRecord(format!("line {}: {e}", self.line_no))
        };
        if text.starts_with('[') {
            let sensors: Vec<RawSample> = serde_json::from_str(text).map_err(invalid)?;
            Ok(SampleBatch::from_samples(sensors))
        } else {
            serde_json::from_str(text).map_err(invalid)
        }
    }
}

impl<R: BufRead> SampleSource for JsonLinesSource<R> {
    fn recv(&mut self, _timeout_ms: Option<u64>) -> Result<SampleBatch> {
        loop {
            self.line.clear();
            let n = self.input.read_line(&mut self.line)?;
            if n == 0 {
                return Err(TransportError::Closed);
            }
            self.line_no += 1;
            let text = self.line.trim();
            if text.is_empty() {
                continue;
            }
            return self.parse_line(text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BinaryState;
    use std::io::Cursor;

    #[test]
    fn publisher_writes_one_line_per_command() -> anyhow::Result<()> {
        let mut p = JsonLinesPublisher::new(Vec::new());
        p.publish(&LowLevelCommand::relay(2, BinaryState::Low))?;
        p.publish(&LowLevelCommand::servo(4, 90.0))?;
        let text = String::from_utf8(p.into_inner())?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("\"servo\""));
        Ok(())
    }

    #[test]
    fn source_reads_arrays_objects_and_skips_blanks() -> anyhow::Result<()> {
        let input = concat!(
            "[{\"hat\":0,\"channel\":1,\"value\":1.5,\"timestamp\":1.0}]\n",
            "\n",
            "{\"sensors\":[],\"relays\":[{\"channel\":3,\"state\":1}]}\n",
        );
        let mut src = JsonLinesSource::new(Cursor::new(input));
        assert_eq!(src.recv(None)?.sensors.len(), 1);
        assert_eq!(src.recv(None)?.relays.len(), 1);
        assert!(matches!(src.recv(None), Err(TransportError::Closed)));
        Ok(())
    }

    #[test]
    fn malformed_line_reports_line_number() {
        let mut src = JsonLinesSource::new(Cursor::new("{not json}\n"));
        match src.recv(None) {
            Err(TransportError::InvalidRecord(msg)) => assert!(msg.starts_with("line 1")),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
