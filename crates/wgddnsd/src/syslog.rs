// Syslog sink for detached mode
//
// Each tracing event is formatted by the fmt layer into one buffer and handed
// to syslog(3) as a single message under the LOG_DAEMON facility. syslog adds
// its own timestamp, so the subscriber should be built without one.

use std::ffi::{CStr, CString};
use std::io;
use tracing::{Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;

const IDENT: &CStr = c"wgddnsd";

/// `MakeWriter` that routes formatted events to syslog
#[derive(Debug, Clone, Copy)]
pub struct SyslogMakeWriter;

impl SyslogMakeWriter {
    /// Open the syslog connection for this process
    ///
    /// The socket is connected lazily on the first message, so this is safe
    /// to call before detaching.
    pub fn open() -> Self {
        // SAFETY: IDENT is a static NUL-terminated string that outlives the process.
        unsafe { libc::openlog(IDENT.as_ptr(), libc::LOG_PID, libc::LOG_DAEMON) };
        Self
    }
}

impl<'a> MakeWriter<'a> for SyslogMakeWriter {
    type Writer = SyslogLine;

    fn make_writer(&'a self) -> Self::Writer {
        SyslogLine::new(libc::LOG_INFO)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        SyslogLine::new(priority_for(meta.level()))
    }
}

/// One buffered syslog message, sent on drop
pub struct SyslogLine {
    priority: libc::c_int,
    buf: Vec<u8>,
}

impl SyslogLine {
    fn new(priority: libc::c_int) -> Self {
        Self {
            priority,
            buf: Vec::with_capacity(256),
        }
    }
}

impl io::Write for SyslogLine {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for SyslogLine {
    fn drop(&mut self) {
        let Some(message) = to_message(&self.buf) else {
            return;
        };
        // SAFETY: "%s" consumes exactly one NUL-terminated string argument.
        unsafe { libc::syslog(self.priority, c"%s".as_ptr(), message.as_ptr()) };
    }
}

fn priority_for(level: &Level) -> libc::c_int {
    match *level {
        Level::ERROR => libc::LOG_ERR,
        Level::WARN => libc::LOG_WARNING,
        Level::INFO => libc::LOG_INFO,
        Level::DEBUG | Level::TRACE => libc::LOG_DEBUG,
    }
}

/// Strip the trailing newline and any interior NULs; `None` for an empty line
fn to_message(buf: &[u8]) -> Option<CString> {
    let trimmed = buf.strip_suffix(b"\n").unwrap_or(buf);
    if trimmed.is_empty() {
        return None;
    }
    let bytes: Vec<u8> = trimmed.iter().copied().filter(|b| *b != 0).collect();
    CString::new(bytes).ok()
}
