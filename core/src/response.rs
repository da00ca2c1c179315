//! Responses and the sinks that receive their bodies.
//!
//! # Design
//! The status line, headers and cookies are common to every response; where
//! the body goes is decided by the `ResponseSink` the caller picks before
//! executing. All sinks follow the same contract, driven by the executor:
//! `init` once, `append` for each chunk read from the transport, then
//! `finish`. On a failed read the executor calls `abort` instead of
//! `finish`, which discards partially written file output.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use http::HeaderMap;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::cookies::{self, Cookies};
use crate::error::{RequestError, Result};
use crate::http::is_redirect;

/// Character sets a buffered body can be decoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Utf8,
    Latin1,
}

/// Destination of a response body.
pub enum ResponseSink {
    /// Keep the body in memory.
    Buffered(Vec<u8>),
    /// Forward bytes to a caller-supplied writer as they arrive.
    Streaming {
        writer: Option<Box<dyn Write + Send>>,
        close_on_finish: bool,
        written: u64,
    },
    /// Write bytes to a file, opened on the first byte.
    File {
        path: PathBuf,
        buffer_size: Option<usize>,
        writer: Option<BufWriter<File>>,
        written: u64,
    },
}

impl ResponseSink {
    pub fn buffered() -> Self {
        ResponseSink::Buffered(Vec::new())
    }

    /// Stream into `writer`. With `close_on_finish` the writer is dropped
    /// once the body is complete; otherwise it can be taken back from the
    /// response with `Response::into_writer`.
    pub fn streaming(writer: impl Write + Send + 'static, close_on_finish: bool) -> Self {
        ResponseSink::Streaming {
            writer: Some(Box::new(writer)),
            close_on_finish,
            written: 0,
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        ResponseSink::File {
            path: path.into(),
            buffer_size: None,
            writer: None,
            written: 0,
        }
    }

    /// A file sink with an explicit write buffer size; zero means default.
    pub fn file_with_buffer(path: impl Into<PathBuf>, buffer_size: usize) -> Self {
        ResponseSink::File {
            path: path.into(),
            buffer_size: (buffer_size > 0).then_some(buffer_size),
            writer: None,
            written: 0,
        }
    }

    /// Prepare for a body answering `status`. Only the final response of an
    /// exchange is ever fed to a sink, so a streaming sink refuses to start
    /// on a redirect status.
    pub fn init(&mut self, status: u16) -> Result<()> {
        trace!(sink = self.kind(), status, "sink init");
        match self {
            ResponseSink::Buffered(buf) => buf.clear(),
            ResponseSink::Streaming { written, .. } => {
                if is_redirect(status) {
                    return Err(RequestError::illegal_state(format!(
                        "streaming sink cannot consume the body of a {status} redirect"
                    )));
                }
                *written = 0;
            }
            ResponseSink::File { writer, written, .. } => {
                *writer = None;
                *written = 0;
            }
        }
        Ok(())
    }

    pub fn append(&mut self, chunk: &[u8]) -> Result<()> {
        match self {
            ResponseSink::Buffered(buf) => {
                buf.extend_from_slice(chunk);
                Ok(())
            }
            ResponseSink::Streaming { writer, written, .. } => {
                let writer = writer
                    .as_mut()
                    .ok_or_else(|| RequestError::illegal_state("streaming sink was already closed"))?;
                writer.write_all(chunk).map_err(RequestError::Sink)?;
                *written += chunk.len() as u64;
                Ok(())
            }
            ResponseSink::File {
                path,
                buffer_size,
                writer,
                written,
            } => {
                if writer.is_none() {
                    *writer = Some(open_file(path, *buffer_size)?);
                }
                if let Some(out) = writer.as_mut() {
                    if let Err(e) = out.write_all(chunk) {
                        *writer = None;
                        let _ = fs::remove_file(path.as_path());
                        return Err(RequestError::Sink(e));
                    }
                }
                *written += chunk.len() as u64;
                Ok(())
            }
        }
    }

    pub fn finish(&mut self) -> Result<()> {
        trace!(sink = self.kind(), "sink finish");
        match self {
            ResponseSink::Buffered(_) => Ok(()),
            ResponseSink::Streaming {
                writer,
                close_on_finish,
                ..
            } => {
                if let Some(out) = writer.as_mut() {
                    out.flush().map_err(RequestError::Sink)?;
                }
                if *close_on_finish {
                    *writer = None;
                }
                Ok(())
            }
            ResponseSink::File {
                path,
                buffer_size,
                writer,
                ..
            } => {
                // An empty body still leaves an (empty) file behind.
                let mut out = match writer.take() {
                    Some(out) => out,
                    None => open_file(path, *buffer_size)?,
                };
                out.flush().map_err(RequestError::Sink)?;
                out.get_ref().sync_all().map_err(RequestError::Sink)?;
                Ok(())
            }
        }
    }

    /// Discard partial output after a failed read.
    pub fn abort(&mut self) {
        if let ResponseSink::File { path, writer, .. } = self {
            if writer.take().is_some() {
                let _ = fs::remove_file(path.as_path());
            }
        }
    }

    /// Bytes delivered to this sink since `init`.
    pub fn len(&self) -> u64 {
        match self {
            ResponseSink::Buffered(buf) => buf.len() as u64,
            ResponseSink::Streaming { written, .. } | ResponseSink::File { written, .. } => *written,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn kind(&self) -> &'static str {
        match self {
            ResponseSink::Buffered(_) => "buffered",
            ResponseSink::Streaming { .. } => "streaming",
            ResponseSink::File { .. } => "file",
        }
    }
}

fn open_file(path: &Path, buffer_size: Option<usize>) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(RequestError::Sink)?;
    Ok(match buffer_size {
        Some(size) => BufWriter::with_capacity(size, file),
        None => BufWriter::new(file),
    })
}

impl Default for ResponseSink {
    fn default() -> Self {
        ResponseSink::buffered()
    }
}

impl fmt::Debug for ResponseSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseSink::Buffered(buf) => f.debug_struct("Buffered").field("len", &buf.len()).finish(),
            ResponseSink::Streaming {
                close_on_finish,
                written,
                writer,
            } => f
                .debug_struct("Streaming")
                .field("close_on_finish", close_on_finish)
                .field("written", written)
                .field("open", &writer.is_some())
                .finish(),
            ResponseSink::File {
                path,
                buffer_size,
                written,
                ..
            } => f
                .debug_struct("File")
                .field("path", path)
                .field("buffer_size", buffer_size)
                .field("written", written)
                .finish(),
        }
    }
}

/// The outcome of an executed request.
#[derive(Debug)]
pub struct Response {
    status: u16,
    status_message: String,
    headers: HeaderMap,
    cookies: Cookies,
    url: String,
    sink: ResponseSink,
}

impl Response {
    pub(crate) fn new(
        status: u16,
        status_message: String,
        headers: HeaderMap,
        url: String,
        sink: ResponseSink,
    ) -> Self {
        let cookies = cookies::from_headers(&headers);
        Self {
            status,
            status_message,
            headers,
            cookies,
            url,
            sink,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Reason phrase; may be empty.
    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    /// True for any status below 400.
    pub fn ok(&self) -> bool {
        self.status < 400
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header, if present and valid text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Every value of a repeated header, in order.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    pub fn cookies(&self) -> &Cookies {
        &self.cookies
    }

    /// URL of the last hop.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn sink(&self) -> &ResponseSink {
        &self.sink
    }

    pub fn into_sink(self) -> ResponseSink {
        self.sink
    }

    /// The caller's writer from a streaming sink that was not closed on finish.
    pub fn into_writer(self) -> Option<Box<dyn Write + Send>> {
        match self.sink {
            ResponseSink::Streaming { writer, .. } => writer,
            _ => None,
        }
    }

    /// The buffered body.
    pub fn bytes(&self) -> Result<&[u8]> {
        match &self.sink {
            ResponseSink::Buffered(buf) => Ok(buf),
            _ => Err(RequestError::illegal_state("response body was not buffered")),
        }
    }

    /// Buffered body decoded as strict UTF-8.
    pub fn text(&self) -> Result<String> {
        self.text_with(Charset::Utf8)
    }

    pub fn text_lossy(&self) -> Result<String> {
        Ok(String::from_utf8_lossy(self.bytes()?).into_owned())
    }

    pub fn text_with(&self, charset: Charset) -> Result<String> {
        let bytes = self.bytes()?;
        match charset {
            Charset::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|e| RequestError::Io(io::Error::new(io::ErrorKind::InvalidData, e))),
            Charset::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }

    /// Deserialize the buffered body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(self.bytes()?)?)
    }

    /// Write the buffered body to `path`, truncating any existing file.
    pub fn save_body(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.bytes()?).map_err(RequestError::Sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn response(status: u16, sink: ResponseSink) -> Response {
        Response::new(status, String::new(), HeaderMap::new(), "http://h/".into(), sink)
    }

    #[test]
    fn ok_means_below_400() {
        assert!(response(200, ResponseSink::buffered()).ok());
        assert!(response(302, ResponseSink::buffered()).ok());
        assert!(response(399, ResponseSink::buffered()).ok());
        assert!(!response(400, ResponseSink::buffered()).ok());
        assert!(!response(503, ResponseSink::buffered()).ok());
    }

    #[test]
    fn buffered_sink_accumulates_and_decodes() {
        let mut sink = ResponseSink::buffered();
        sink.init(200).unwrap();
        sink.append("caf".as_bytes()).unwrap();
        sink.append(&[0xC3, 0xA9]).unwrap();
        sink.finish().unwrap();
        let resp = response(200, sink);
        assert_eq!(resp.text().unwrap(), "café");
        assert_eq!(resp.text_with(Charset::Latin1).unwrap(), "cafÃ©");
    }

    #[test]
    fn invalid_utf8_is_an_error_unless_lossy() {
        let resp = response(200, ResponseSink::Buffered(vec![0xFF, b'a']));
        assert!(resp.text().is_err());
        assert_eq!(resp.text_lossy().unwrap(), "\u{FFFD}a");
    }

    #[test]
    fn json_helper_deserializes_body() {
        let resp = response(200, ResponseSink::Buffered(br#"{"a":[1,2]}"#.to_vec()));
        let value: serde_json::Value = resp.json().unwrap();
        assert_eq!(value["a"][1], 2);
    }

    #[test]
    fn streaming_sink_forwards_and_optionally_keeps_writer() {
        let shared = SharedBuf::default();
        let mut sink = ResponseSink::streaming(shared.clone(), false);
        sink.init(200).unwrap();
        sink.append(b"abc").unwrap();
        sink.finish().unwrap();
        assert_eq!(&*shared.0.lock().unwrap(), b"abc");
        assert_eq!(sink.len(), 3);
        assert!(response(200, sink).into_writer().is_some());

        let mut sink = ResponseSink::streaming(shared, true);
        sink.init(200).unwrap();
        sink.finish().unwrap();
        assert!(response(200, sink).into_writer().is_none());
    }

    #[test]
    fn streaming_sink_refuses_redirect_bodies() {
        let mut sink = ResponseSink::streaming(io::sink(), false);
        let err = sink.init(302).unwrap_err();
        assert!(matches!(err, RequestError::IllegalState(_)));
        sink.init(200).unwrap();
        ResponseSink::buffered().init(302).unwrap();
    }

    #[test]
    fn file_sink_opens_lazily_and_flushes_on_finish() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let mut sink = ResponseSink::file_with_buffer(&path, 4);
        sink.init(200).unwrap();
        assert!(!path.exists());
        sink.append(b"hello ").unwrap();
        assert!(path.exists());
        sink.append(b"world").unwrap();
        sink.finish().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"hello world");
    }

    #[test]
    fn file_sink_reports_unwritable_path_at_first_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("out.bin");
        let mut sink = ResponseSink::file(&path);
        sink.init(200).unwrap();
        let err = sink.append(b"x").unwrap_err();
        assert!(matches!(err, RequestError::Sink(_)));
    }

    #[test]
    fn file_sink_abort_removes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.bin");
        let mut sink = ResponseSink::file(&path);
        sink.init(200).unwrap();
        sink.append(b"part").unwrap();
        sink.abort();
        assert!(!path.exists());
    }

    #[test]
    fn save_body_writes_buffered_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.txt");
        response(200, ResponseSink::Buffered(b"saved".to_vec()))
            .save_body(&path)
            .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"saved");
        assert!(response(200, ResponseSink::file(&path)).bytes().is_err());
    }

    #[test]
    fn repeated_headers_and_cookies_are_exposed() {
        let mut headers = HeaderMap::new();
        headers.append("set-cookie", HeaderValue::from_static("a=1; Path=/"));
        headers.append("x-multi", HeaderValue::from_static("one"));
        headers.append("x-multi", HeaderValue::from_static("two"));
        let resp = Response::new(200, "OK".into(), headers, "http://h/".into(), ResponseSink::buffered());
        assert_eq!(resp.header_values("X-Multi"), ["one", "two"]);
        assert_eq!(resp.header("x-multi"), Some("one"));
        assert_eq!(resp.cookies()["a"], "1");
        assert_eq!(resp.status_message(), "OK");
    }
}
