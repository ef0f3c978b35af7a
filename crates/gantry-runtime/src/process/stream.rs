//! Async line readers for the backend's output streams (non-UTF8-safe).
//!
//! The backend is asked to emit UTF-8, but a crashing interpreter can still
//! write arbitrary bytes. Using `BufReader::lines()` would terminate the
//! reader task on invalid UTF-8, so lines are read as bytes and decoded
//! lossily to keep the stream alive no matter what arrives.

use std::sync::Arc;

use gantry_core::{EventSink, LogEvent, LogLevel};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::debug;

/// Stream one output pipe of the backend into events, one line each.
pub(crate) fn spawn_line_reader(
    stream: impl AsyncRead + Unpin + Send + 'static,
    source: &'static str,
    level: LogLevel,
    sink: Arc<dyn EventSink>,
) {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf: Vec<u8> = Vec::with_capacity(1024);

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break, // EOF
                Ok(_) => {
                    // Trim trailing newline(s)
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                        if buf.last() == Some(&b'\r') {
                            buf.pop();
                        }
                    }

                    let line = String::from_utf8_lossy(&buf).to_string();
                    sink.emit(LogEvent::new(level, source, line));
                }
                Err(e) => {
                    debug!(%source, error = %e, "line reader exiting due to read error");
                    break;
                }
            }
        }

        debug!(%source, "line reader task exiting");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<LogEvent>>,
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: LogEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[tokio::test]
    async fn reads_lines_and_survives_invalid_utf8() {
        let (mut writer, reader) = tokio::io::duplex(256);
        let sink = Arc::new(RecordingSink::default());
        spawn_line_reader(reader, "backend", LogLevel::Info, sink.clone());

        writer.write_all(b"first line\n").await.unwrap();
        writer.write_all(b"bad \xff bytes\r\n").await.unwrap();
        writer.write_all(b"last line\n").await.unwrap();
        drop(writer);

        tokio::time::sleep(Duration::from_millis(100)).await;

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].message, "first line");
        assert_eq!(events[0].source, "backend");
        assert!(events[1].message.contains("bytes"));
        assert_eq!(events[2].message, "last line");
    }
}
