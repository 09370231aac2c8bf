//! Output stream plugins (§4.7): the sinks views forward observations to.
//! Grounded on the original `vle::value::Matrix` output stream and the
//! generic `Stream` plugin interface the views bind to.

use crate::error::Result;
use crate::time::Time;
use crate::value::Value;
use std::fmt::Write as _;
use std::io::Write as _;

/// A sink for one view's observations. `open`/`close` bracket a run; `write`
/// is called once per (time, model, port) sample. Implementations must make
/// `close` idempotent: the Coordinator calls it once on normal termination
/// and, on abort, calls it again during unwinding to make sure buffered
/// output is not lost.
pub trait Stream: std::fmt::Debug {
    fn open(&mut self, view_name: &str, start_time: Time) -> Result<()>;
    fn write(&mut self, time: Time, model: &str, port: &str, value: &Value) -> Result<()>;
    fn close(&mut self, end_time: Time) -> Result<()>;
}

/// Writes one CSV row per sample: `time,model,port,value`. Values are
/// rendered with `Value`'s `Display` impl (the same textual form the XML
/// writer produces for scalars), so a table or matrix cell shows up as its
/// own nested-paren rendering rather than a serialization error.
#[derive(Debug)]
pub struct CsvStream<W: std::io::Write + std::fmt::Debug> {
    writer: W,
    closed: bool,
}

impl<W: std::io::Write + std::fmt::Debug> CsvStream<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            closed: false,
        }
    }
}

impl<W: std::io::Write + std::fmt::Debug> Stream for CsvStream<W> {
    fn open(&mut self, view_name: &str, start_time: Time) -> Result<()> {
        writeln!(self.writer, "# view={view_name} start={start_time}")
            .map_err(|e| crate::error::KernelError::config(format!("stream open failed: {e}")))?;
        writeln!(self.writer, "time,model,port,value")
            .map_err(|e| crate::error::KernelError::config(format!("stream open failed: {e}")))?;
        Ok(())
    }

    fn write(&mut self, time: Time, model: &str, port: &str, value: &Value) -> Result<()> {
        let line = render_value_line(time, model, port, value);
        writeln!(self.writer, "{line}")
            .map_err(|e| crate::error::KernelError::config(format!("stream write failed: {e}")))?;
        Ok(())
    }

    fn close(&mut self, end_time: Time) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        writeln!(self.writer, "# end={end_time}")
            .map_err(|e| crate::error::KernelError::config(format!("stream close failed: {e}")))?;
        self.closed = true;
        Ok(())
    }
}

/// One recorded sample, as accumulated by [`MatrixStream`].
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub time: Time,
    pub model: String,
    pub port: String,
    pub value: Value,
}

/// An in-memory stream that accumulates samples into a single column-major
/// matrix of (time, model, port, value) rows, mirroring the original's
/// in-memory `vle::value::Matrix` output plugin. Useful for tests and for
/// embedders who want to inspect a run's output without touching a file.
#[derive(Debug, Default)]
pub struct MatrixStream {
    pub samples: Vec<Sample>,
    closed: bool,
}

impl MatrixStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders the accumulated samples as a `Value::Matrix` with four
    /// columns (time, model, port, value), one row per sample.
    pub fn to_matrix(&self) -> Value {
        let mut matrix = crate::value::Matrix::new(self.samples.len(), 4);
        for (row, sample) in self.samples.iter().enumerate() {
            matrix.set(0, row, Value::Double(sample.time.into()));
            matrix.set(1, row, Value::String(sample.model.clone()));
            matrix.set(2, row, Value::String(sample.port.clone()));
            matrix.set(3, row, sample.value.clone());
        }
        Value::Matrix(matrix)
    }
}

impl Stream for MatrixStream {
    fn open(&mut self, _view_name: &str, _start_time: Time) -> Result<()> {
        self.samples.clear();
        self.closed = false;
        Ok(())
    }

    fn write(&mut self, time: Time, model: &str, port: &str, value: &Value) -> Result<()> {
        self.samples.push(Sample {
            time,
            model: model.to_string(),
            port: port.to_string(),
            value: value.clone(),
        });
        Ok(())
    }

    fn close(&mut self, _end_time: Time) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// Renders one CSV row, shared by [`CsvStream::write`] and any caller that
/// wants the same `time,model,port,value` line without an attached writer.
pub fn render_value_line(time: Time, model: &str, port: &str, value: &Value) -> String {
    let mut out = String::new();
    let _ = write!(out, "{time},{model},{port},{value}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_stream_writes_header_and_rows() {
        let mut buf = Vec::new();
        {
            let mut stream = CsvStream::new(&mut buf);
            stream.open("v", Time::ZERO).unwrap();
            stream
                .write(Time(1.0), "top.a", "p", &Value::Integer(42))
                .unwrap();
            stream.close(Time(10.0)).unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("time,model,port,value"));
        assert!(text.contains("1,top.a,p,42"));
    }

    #[test]
    fn csv_stream_close_is_idempotent() {
        let mut buf = Vec::new();
        let mut stream = CsvStream::new(&mut buf);
        stream.open("v", Time::ZERO).unwrap();
        stream.close(Time(1.0)).unwrap();
        let len_after_first_close = buf.len();
        stream.close(Time(1.0)).unwrap();
        assert_eq!(buf.len(), len_after_first_close);
    }

    #[test]
    fn matrix_stream_accumulates_samples() {
        let mut stream = MatrixStream::new();
        stream.open("v", Time::ZERO).unwrap();
        stream
            .write(Time(1.0), "top.a", "p", &Value::Integer(42))
            .unwrap();
        stream
            .write(Time(2.0), "top.a", "p", &Value::Integer(43))
            .unwrap();
        stream.close(Time(2.0)).unwrap();
        assert_eq!(stream.samples.len(), 2);
        let matrix = stream.to_matrix();
        match matrix {
            Value::Matrix(m) => {
                assert_eq!(m.columns, 4);
                assert_eq!(m.rows, 2);
            }
            _ => panic!("expected a matrix"),
        }
    }
}
