use std::io::{BufWriter, Cursor, Write};

/// Either an in-memory log or a buffered writer.
enum Sink {
    Log(Cursor<Vec<u8>>),
    Write(BufWriter<Box<dyn Write>>),
}

impl Sink {
    fn contents(&self) -> Option<String> {
        match self {
            Sink::Log(inner) => Some(String::from_utf8_lossy(inner.get_ref()).into_owned()),
            Sink::Write(_) => None,
        }
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Sink::Log(inner) => inner.write(buf),
            Sink::Write(inner) => inner.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Sink::Log(_) => Ok(()),
            Sink::Write(inner) => inner.flush(),
        }
    }
}

/// Output and error sinks shared by the lexer, the parser and the driver.
/// [`DiagnosticEmitter::log_to_buffer`] keeps everything in memory so tests
/// can compare it.
pub struct DiagnosticEmitter {
    out: Sink,
    err: Sink,
}

impl DiagnosticEmitter {
    pub fn new(out: Box<dyn Write>, err: Box<dyn Write>) -> Self {
        Self {
            out: Sink::Write(BufWriter::new(out)),
            err: Sink::Write(BufWriter::new(err)),
        }
    }

    pub fn log_to_buffer() -> Self {
        Self {
            out: Sink::Log(Cursor::new(Vec::new())),
            err: Sink::Log(Cursor::new(Vec::new())),
        }
    }

    pub fn out(&mut self, msg: &str) {
        let _ = self.out.write_all(msg.as_bytes());
    }

    pub fn out_ln(&mut self, msg: &str) {
        self.out(msg);
        self.out("\n");
    }

    pub fn err(&mut self, msg: &str) {
        let _ = self.err.write_all(msg.as_bytes());
    }

    pub fn err_ln(&mut self, msg: &str) {
        self.err(msg);
        self.err("\n");
    }

    /// Everything written to the output so far, if it is logged.
    pub fn out_buffer(&self) -> Option<String> {
        self.out.contents()
    }

    /// Everything written to the error sink so far, if it is logged.
    pub fn err_buffer(&self) -> Option<String> {
        self.err.contents()
    }

    pub fn error(&mut self, line: u32, message: &str) {
        self.report(line, "", message);
    }

    /// `[line N] Error <item>: message`
    pub fn report(&mut self, line: u32, item: &str, message: &str) {
        self.err(&format!("[line {line}] Error {item}: {message}\n"));
    }

    pub fn flush(&mut self) {
        let _ = self.out.flush();
        let _ = self.err.flush();
    }
}

impl Drop for DiagnosticEmitter {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod diagnostics_tests;
