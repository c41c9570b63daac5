//! Output streams of an interpreter.

use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::Arc;

/// Shared writer. Goroutines print through the same handle, so a single
/// `write_all` is never interleaved with another.
pub type OutputWriter = Arc<Mutex<Box<dyn Write + Send>>>;

pub fn writer(w: impl Write + Send + 'static) -> OutputWriter {
    Arc::new(Mutex::new(Box::new(w)))
}

pub fn stdout() -> OutputWriter {
    writer(io::stdout())
}

pub fn stderr() -> OutputWriter {
    writer(io::stderr())
}

/// Writes `text` and flushes. Output errors are not reported to
/// interpreted code.
pub fn emit(out: &OutputWriter, text: &str) {
    let mut w = out.lock();
    let _ = w.write_all(text.as_bytes());
    let _ = w.flush();
}

/// In-memory sink whose contents can be read back.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer(Arc<Mutex<Vec<u8>>>);

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writer(&self) -> OutputWriter {
        writer(self.clone())
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
