//! Reply channel consumed by the introspection commands

/// Canned wrong-type error, shared by every type-checked command.
pub const WRONG_TYPE_ERR: &str =
    "WRONGTYPE Operation against a key holding the wrong kind of value";

/// Canned syntax error.
pub const SYNTAX_ERR: &str = "ERR syntax error";

/// Sink for command replies. The transport (RESP framing, buffers) lives
/// outside this subsystem.
pub trait Reply {
    /// Bulk string reply.
    fn bulk(&mut self, data: &[u8]);

    /// Integer reply.
    fn integer(&mut self, value: i64);

    /// Double reply.
    fn double(&mut self, value: f64);

    /// Array header announcing `len` following replies.
    fn array_len(&mut self, len: usize);

    /// Error reply.
    fn error(&mut self, message: &str);

    /// Null bulk reply, for missing keys.
    fn null_bulk(&mut self);

    /// Simple status reply.
    fn status(&mut self, message: &str);

    /// UTF-8 bulk string reply.
    fn bulk_str(&mut self, data: &str) {
        self.bulk(data.as_bytes());
    }

    /// Canned `OK` status.
    fn ok(&mut self) {
        self.status("OK");
    }
}

/// One captured reply frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyFrame {
    /// Bulk string.
    Bulk(Vec<u8>),
    /// Integer.
    Integer(i64),
    /// Double.
    Double(f64),
    /// Array header.
    ArrayLen(usize),
    /// Error message.
    Error(String),
    /// Null bulk.
    NullBulk,
    /// Simple status.
    Status(String),
}

/// Reply sink recording every frame, used by tests and offline tooling.
#[derive(Debug, Default)]
pub struct RecordingReply {
    /// Frames in arrival order.
    pub frames: Vec<ReplyFrame>,
}

impl RecordingReply {
    /// Convenience view of frame `index` as UTF-8 bulk text.
    pub fn bulk_text(&self, index: usize) -> Option<String> {
        match self.frames.get(index)? {
            ReplyFrame::Bulk(data) => Some(String::from_utf8_lossy(data).into_owned()),
            _ => None,
        }
    }
}

impl Reply for RecordingReply {
    fn bulk(&mut self, data: &[u8]) {
        self.frames.push(ReplyFrame::Bulk(data.to_vec()));
    }

    fn integer(&mut self, value: i64) {
        self.frames.push(ReplyFrame::Integer(value));
    }

    fn double(&mut self, value: f64) {
        self.frames.push(ReplyFrame::Double(value));
    }

    fn array_len(&mut self, len: usize) {
        self.frames.push(ReplyFrame::ArrayLen(len));
    }

    fn error(&mut self, message: &str) {
        self.frames.push(ReplyFrame::Error(message.to_string()));
    }

    fn null_bulk(&mut self) {
        self.frames.push(ReplyFrame::NullBulk);
    }

    fn status(&mut self, message: &str) {
        self.frames.push(ReplyFrame::Status(message.to_string()));
    }
}
