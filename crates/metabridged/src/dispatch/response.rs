//! Response model and JSONL serialisation.

use std::io::{self, Write};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::framing::DELIMITER;

/// Outcome of one request, correlated by `id`.
///
/// Exactly one of `data` and `error` is populated, selected by `success`.
/// Construct responses through [`Response::success`] and
/// [`Response::failure`] to keep that invariant.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    id: Option<String>,
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    processing_time_ms: f64,
}

impl Response {
    /// Creates a successful response carrying `data`.
    #[must_use]
    pub fn success(id: Option<String>, data: Value) -> Self {
        Self {
            id,
            success: true,
            data: Some(data),
            error: None,
            processing_time_ms: 0.0,
        }
    }

    /// Creates a failure response carrying `error`.
    #[must_use]
    pub fn failure(id: Option<String>, error: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            data: None,
            error: Some(error.into()),
            processing_time_ms: 0.0,
        }
    }

    /// Stamps the wall-clock processing time.
    #[must_use]
    pub fn with_processing_time(mut self, elapsed: Duration) -> Self {
        self.processing_time_ms = elapsed.as_secs_f64() * 1000.0;
        self
    }

    /// Correlation id echoed from the request.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Whether the handler completed successfully.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Handler result for successful responses.
    #[must_use]
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Failure description for unsuccessful responses.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Processing time in milliseconds.
    #[must_use]
    pub fn processing_time_ms(&self) -> f64 {
        self.processing_time_ms
    }
}

/// Writes responses as newline-terminated JSON.
pub struct ResponseWriter<W> {
    writer: W,
    line: Vec<u8>,
}

impl<W: Write> ResponseWriter<W> {
    /// Wraps an output stream.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            line: Vec::new(),
        }
    }

    /// Serialises `response`, appends the delimiter, and writes the whole line
    /// before flushing.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or any write fails. A failed write
    /// may have delivered part of the line.
    pub fn write_response(&mut self, response: &Response) -> io::Result<()> {
        self.encode(response)?;
        self.writer.write_all(&self.line)?;
        self.writer.flush()
    }

    /// Writes `response` like [`Self::write_response`], but keeps retrying
    /// stalled writes (`WouldBlock` or `TimedOut`) while `keep_waiting`
    /// returns `true`.
    ///
    /// # Errors
    ///
    /// Returns the stalling error once `keep_waiting` returns `false`, and any
    /// other serialisation or write error immediately.
    pub fn write_response_while<F>(
        &mut self,
        response: &Response,
        mut keep_waiting: F,
    ) -> io::Result<()>
    where
        F: FnMut() -> bool,
    {
        self.encode(response)?;
        let mut written = 0;
        while written < self.line.len() {
            match self.writer.write(&self.line[written..]) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
                Ok(count) => written += count,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) if is_stalled(&error) && keep_waiting() => {}
                Err(error) => return Err(error),
            }
        }
        loop {
            match self.writer.flush() {
                Ok(()) => return Ok(()),
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) if is_stalled(&error) && keep_waiting() => {}
                Err(error) => return Err(error),
            }
        }
    }

    fn encode(&mut self, response: &Response) -> io::Result<()> {
        self.line.clear();
        serde_json::to_writer(&mut self.line, response)
            .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))?;
        self.line.push(DELIMITER);
        Ok(())
    }
}

/// Whether a write failed only because the peer is not draining its end.
pub(crate) fn is_stalled(error: &io::Error) -> bool {
    matches!(error.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn render(response: &Response) -> Value {
        let mut output = Vec::new();
        ResponseWriter::new(&mut output)
            .write_response(response)
            .expect("write response");
        assert_eq!(output.last(), Some(&DELIMITER));
        serde_json::from_slice(&output).expect("response is JSON")
    }

    #[test]
    fn success_omits_error_field() {
        let response = Response::success(Some("1".to_owned()), json!({"pong": true}))
            .with_processing_time(Duration::from_micros(1500));
        let rendered = render(&response);

        assert_eq!(rendered["id"], "1");
        assert_eq!(rendered["success"], true);
        assert_eq!(rendered["data"], json!({"pong": true}));
        assert!(rendered.get("error").is_none());
        let elapsed = rendered["processingTimeMs"].as_f64().expect("numeric time");
        assert!((elapsed - 1.5).abs() < 1e-9, "processingTimeMs was {elapsed}");
    }

    #[test]
    fn failure_omits_data_and_serialises_null_id() {
        let rendered = render(&Response::failure(None, "boom"));

        assert!(rendered["id"].is_null());
        assert_eq!(rendered["success"], false);
        assert_eq!(rendered["error"], "boom");
        assert!(rendered.get("data").is_none());
        assert!(rendered.get("processingTimeMs").is_some());
    }

    #[test]
    fn consecutive_writes_produce_separate_lines() {
        let mut output = Vec::new();
        let mut writer = ResponseWriter::new(&mut output);
        writer
            .write_response(&Response::success(Some("a".to_owned()), json!(1)))
            .expect("first");
        writer
            .write_response(&Response::failure(Some("b".to_owned()), "no"))
            .expect("second");

        let text = String::from_utf8(output).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(r#""id":"a""#));
        assert!(lines[1].contains(r#""id":"b""#));
    }

    /// Sink that refuses the first `stalls` writes with a timeout, then
    /// accepts at most `burst` bytes per call.
    struct StallingSink {
        stalls: usize,
        burst: usize,
        written: Vec<u8>,
    }

    impl Write for StallingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.stalls > 0 {
                self.stalls -= 1;
                return Err(io::Error::from(io::ErrorKind::TimedOut));
            }
            let count = buf.len().min(self.burst);
            self.written.extend_from_slice(&buf[..count]);
            Ok(count)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn stalled_writes_are_retried_while_waiting_is_allowed() {
        let mut sink = StallingSink {
            stalls: 3,
            burst: 7,
            written: Vec::new(),
        };
        let mut checks = 0;

        ResponseWriter::new(&mut sink)
            .write_response_while(&Response::success(Some("s".to_owned()), json!("ok")), || {
                checks += 1;
                true
            })
            .expect("write after stalls");

        assert_eq!(checks, 3);
        assert_eq!(sink.written.last(), Some(&DELIMITER));
        let rendered: Value = serde_json::from_slice(&sink.written).expect("response is JSON");
        assert_eq!(rendered["id"], "s");
    }

    #[test]
    fn stalled_write_is_abandoned_once_waiting_stops() {
        let mut sink = StallingSink {
            stalls: usize::MAX,
            burst: 0,
            written: Vec::new(),
        };
        let mut remaining = 2;

        let error = ResponseWriter::new(&mut sink)
            .write_response_while(&Response::failure(None, "late"), || {
                remaining -= 1;
                remaining > 0
            })
            .expect_err("stalled write gives up");

        assert_eq!(error.kind(), io::ErrorKind::TimedOut);
        assert!(sink.written.is_empty());
    }
}
