// src/core/stream_parser.rs

//! The server-sent-event line parser (spec §4.3), transliterated from
//! `streamcallback` in `ldthreads.c`: a pure, incremental parser fed one
//! line at a time, with the line terminator already stripped by the
//! transport.

use tracing::warn;

const MAX_EVENT_NAME_LEN: usize = 256;

/// A discrete dispatch produced once a blank line closes out a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamDispatch {
    Put(String),
    Patch(String),
    Delete(String),
    /// Prompt the polling path for a full snapshot fetch.
    Ping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    Continue,
    Stop,
}

/// Incremental parser state: a growing data buffer and a current event-name
/// buffer, both cleared after every dispatch and after every cancellation
/// (spec §3's stream-parser-state invariants).
#[derive(Default)]
pub struct StreamParser {
    data_buffer: String,
    data_buffer_set: bool,
    event_name: String,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn reset(&mut self) {
        self.data_buffer.clear();
        self.data_buffer_set = false;
        self.event_name.clear();
    }

    /// Feeds one line (without its terminator) to the parser. `should_stop`
    /// is read once per line, mirroring the original checking
    /// `client->shouldstopstreaming` under the write lock at the top of
    /// `streamcallback` before processing anything else.
    pub fn feed_line(&mut self, line: &str, should_stop: bool) -> (Continuation, Option<StreamDispatch>) {
        if should_stop {
            self.reset();
            return (Continuation::Stop, None);
        }

        if line.starts_with(':') {
            return (Continuation::Continue, None);
        }

        if line.is_empty() {
            let dispatch = self.build_dispatch();
            self.reset();
            return (Continuation::Continue, dispatch);
        }

        if let Some(rest) = line.strip_prefix("data:") {
            let rest = rest.strip_prefix(' ').unwrap_or(rest);
            if self.data_buffer_set {
                self.data_buffer.push('\n');
            }
            self.data_buffer.push_str(rest);
            self.data_buffer_set = true;
            return (Continuation::Continue, None);
        }

        if let Some(rest) = line.strip_prefix("event:") {
            let rest = rest.strip_prefix(' ').unwrap_or(rest);
            self.event_name = rest.chars().take(MAX_EVENT_NAME_LEN).collect();
            return (Continuation::Continue, None);
        }

        (Continuation::Continue, None)
    }

    fn build_dispatch(&self) -> Option<StreamDispatch> {
        if self.event_name.is_empty() {
            warn!("stream dispatch reached but event name was never set");
            return None;
        }
        if self.event_name == "ping" {
            return Some(StreamDispatch::Ping);
        }
        if !self.data_buffer_set {
            warn!(event_name = %self.event_name, "stream dispatch reached but data was never set");
            return None;
        }
        match self.event_name.as_str() {
            "put" => Some(StreamDispatch::Put(self.data_buffer.clone())),
            "patch" => Some(StreamDispatch::Patch(self.data_buffer.clone())),
            "delete" => Some(StreamDispatch::Delete(self.data_buffer.clone())),
            other => {
                warn!(event_name = other, "dropping unrecognized stream event");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(parser: &mut StreamParser, lines: &[&str]) -> Vec<StreamDispatch> {
        let mut out = Vec::new();
        for line in lines {
            let (cont, dispatch) = parser.feed_line(line, false);
            assert_eq!(cont, Continuation::Continue);
            if let Some(d) = dispatch {
                out.push(d);
            }
        }
        out
    }

    #[test]
    fn put_dispatch_after_blank_line() {
        let mut parser = StreamParser::new();
        let dispatches = feed_all(
            &mut parser,
            &["event: put", r#"data: {"alpha":{"value":true,"version":1}}"#, ""],
        );
        assert_eq!(
            dispatches,
            vec![StreamDispatch::Put(
                r#"{"alpha":{"value":true,"version":1}}"#.to_string()
            )]
        );
    }

    #[test]
    fn multiline_data_is_newline_joined() {
        let mut parser = StreamParser::new();
        let dispatches = feed_all(&mut parser, &["event: put", "data: line one", "data:line two", ""]);
        assert_eq!(
            dispatches,
            vec![StreamDispatch::Put("line one\nline two".to_string())]
        );
    }

    #[test]
    fn comment_lines_are_ignored() {
        let mut parser = StreamParser::new();
        let dispatches = feed_all(&mut parser, &[": heartbeat", "event: put", "data: {}", ""]);
        assert_eq!(dispatches, vec![StreamDispatch::Put("{}".to_string())]);
    }

    #[test]
    fn ping_dispatches_without_data() {
        let mut parser = StreamParser::new();
        let dispatches = feed_all(&mut parser, &["event: ping", ""]);
        assert_eq!(dispatches, vec![StreamDispatch::Ping]);
    }

    #[test]
    fn dispatch_with_no_event_name_is_dropped() {
        let mut parser = StreamParser::new();
        let dispatches = feed_all(&mut parser, &["data: {}", ""]);
        assert!(dispatches.is_empty());
    }

    #[test]
    fn unknown_event_name_is_dropped() {
        let mut parser = StreamParser::new();
        let dispatches = feed_all(&mut parser, &["event: mystery", "data: {}", ""]);
        assert!(dispatches.is_empty());
    }

    #[test]
    fn buffers_clear_between_dispatches() {
        let mut parser = StreamParser::new();
        let dispatches = feed_all(&mut parser, &["event: put", "data: {\"a\":1}", "", "event: patch", "data: {\"b\":2}", ""]);
        assert_eq!(
            dispatches,
            vec![
                StreamDispatch::Put("{\"a\":1}".to_string()),
                StreamDispatch::Patch("{\"b\":2}".to_string()),
            ]
        );
    }

    #[test]
    fn should_stop_clears_buffers_and_signals_stop() {
        let mut parser = StreamParser::new();
        parser.feed_line("event: put", false);
        parser.feed_line("data: partial", false);
        let (cont, dispatch) = parser.feed_line("data: more", true);
        assert_eq!(cont, Continuation::Stop);
        assert!(dispatch.is_none());
        assert!(parser.event_name.is_empty());
        assert!(!parser.data_buffer_set);
    }
}
