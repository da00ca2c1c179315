//! Form data: an ordered set of named fields sent as `multipart/form-data`
//! on POST, or as query pairs on other methods.
//!
//! # Design
//! Each field is one of four shapes. Text and JSON fields can travel either
//! way; byte and stream fields only make sense as multipart parts. Files are
//! opened when the multipart body is assembled for a send and are owned by
//! that send's body reader, so they close when the send ends whatever the
//! outcome. A caller-supplied reader can be sent once; after that the form
//! is no longer resendable.

use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::body::Resendable;
use crate::error::{RequestError, Result};
use crate::http::RequestBody;

pub const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";
pub const APPLICATION_JSON_UTF8: &str = "application/json; charset=utf-8";
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Guess a media type from a file name's extension.
pub fn guess_media_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Where the bytes of a stream field come from.
#[derive(Clone)]
pub enum StreamSource {
    /// Reopened on every send.
    File(PathBuf),
    /// A live reader that can be consumed exactly once.
    Reader(Arc<Mutex<Option<Box<dyn Read + Send>>>>),
}

impl StreamSource {
    pub fn reader(reader: impl Read + Send + 'static) -> Self {
        StreamSource::Reader(Arc::new(Mutex::new(Some(Box::new(reader)))))
    }

    fn open(&self, field: &str) -> Result<(Box<dyn Read + Send>, Option<u64>)> {
        match self {
            StreamSource::File(path) => {
                let file = File::open(path)?;
                let len = file.metadata().ok().map(|m| m.len());
                Ok((Box::new(file), len))
            }
            StreamSource::Reader(slot) => match slot.lock().take() {
                Some(reader) => Ok((reader, None)),
                None => Err(RequestError::illegal_state(format!(
                    "stream for form field '{field}' was already consumed"
                ))),
            },
        }
    }
}

impl fmt::Debug for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamSource::File(path) => f.debug_tuple("File").field(path).finish(),
            StreamSource::Reader(slot) => f
                .debug_struct("Reader")
                .field("consumed", &slot.lock().is_none())
                .finish(),
        }
    }
}

/// One named value in a form.
#[derive(Debug, Clone)]
pub enum FormField {
    Text(String),
    Json(serde_json::Value),
    Bytes {
        data: Vec<u8>,
        media_type: String,
    },
    Stream {
        filename: String,
        media_type: String,
        source: StreamSource,
    },
}

impl FormField {
    fn query_value(&self, name: &str) -> Result<String> {
        match self {
            FormField::Text(value) => Ok(value.clone()),
            FormField::Json(value) => Ok(value.to_string()),
            FormField::Bytes { .. } | FormField::Stream { .. } => Err(RequestError::illegal_state(
                format!("form field '{name}' only supports POST"),
            )),
        }
    }

    fn post_only(&self) -> bool {
        matches!(self, FormField::Bytes { .. } | FormField::Stream { .. })
    }
}

impl Resendable for FormField {
    fn can_resend(&self) -> bool {
        !matches!(
            self,
            FormField::Stream {
                source: StreamSource::Reader(_),
                ..
            }
        )
    }
}

/// Ordered mapping of field name to `FormField`. Adding a name twice
/// replaces the earlier field in place.
#[derive(Debug, Clone, Default)]
pub struct FormData {
    fields: Vec<(String, FormField)>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, field: FormField) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = field,
            None => self.fields.push((name, field)),
        }
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, FormField::Text(value.into()));
        self
    }

    pub fn json(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.insert(name, FormField::Json(value));
        self
    }

    pub fn bytes(
        mut self,
        name: impl Into<String>,
        data: impl Into<Vec<u8>>,
        media_type: impl Into<String>,
    ) -> Self {
        self.insert(
            name,
            FormField::Bytes {
                data: data.into(),
                media_type: media_type.into(),
            },
        );
        self
    }

    /// Add a file field; the media type is guessed from the extension.
    pub fn file(self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let media_type = guess_media_type(&path);
        self.file_with_type(name, path, media_type)
    }

    pub fn file_with_type(
        mut self,
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        media_type: impl Into<String>,
    ) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.insert(
            name,
            FormField::Stream {
                filename,
                media_type: media_type.into(),
                source: StreamSource::File(path),
            },
        );
        self
    }

    /// Add a field backed by a live reader. The form stops being resendable.
    pub fn reader(
        mut self,
        name: impl Into<String>,
        filename: impl Into<String>,
        media_type: impl Into<String>,
        reader: impl Read + Send + 'static,
    ) -> Self {
        self.insert(
            name,
            FormField::Stream {
                filename: filename.into(),
                media_type: media_type.into(),
                source: StreamSource::reader(reader),
            },
        );
        self
    }

    /// Merge `other` into `self`; fields of `other` win on name clashes.
    pub fn extend(&mut self, other: FormData) {
        for (name, field) in other.fields {
            self.insert(name, field);
        }
    }

    pub fn get(&self, name: &str) -> Option<&FormField> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FormField)> {
        self.fields.iter().map(|(n, f)| (n.as_str(), f))
    }

    /// True if any field can only be sent as a multipart part.
    pub fn has_post_only_fields(&self) -> bool {
        self.fields.iter().any(|(_, f)| f.post_only())
    }

    /// Text and JSON fields as query pairs, for non-POST requests.
    pub fn query_pairs(&self) -> Result<Vec<(String, String)>> {
        self.fields
            .iter()
            .map(|(name, field)| Ok((name.clone(), field.query_value(name)?)))
            .collect()
    }

    /// Assemble a `multipart/form-data` body using `boundary`. Files are
    /// opened here and owned by the returned reader.
    pub fn multipart(&self, boundary: &str) -> Result<RequestBody> {
        // Checked before any stream is opened.
        for (name, field) in &self.fields {
            if let FormField::Bytes { media_type, .. } | FormField::Stream { media_type, .. } = field {
                if http::HeaderValue::from_str(media_type).is_err() {
                    return Err(RequestError::usage(format!(
                        "media type of form field '{name}' is not a valid header value"
                    )));
                }
            }
        }
        let mut reader: Box<dyn Read + Send> = Box::new(io::empty());
        let mut length = Some(0u64);

        for (name, field) in &self.fields {
            let (filename, media_type, content, content_len): (
                Option<&str>,
                &str,
                Box<dyn Read + Send>,
                Option<u64>,
            ) = match field {
                FormField::Text(value) => {
                    let bytes = value.clone().into_bytes();
                    let len = bytes.len() as u64;
                    (None, TEXT_PLAIN_UTF8, Box::new(Cursor::new(bytes)) as Box<dyn Read + Send>, Some(len))
                }
                FormField::Json(value) => {
                    let bytes = serde_json::to_vec(value)?;
                    let len = bytes.len() as u64;
                    (None, APPLICATION_JSON_UTF8, Box::new(Cursor::new(bytes)) as Box<dyn Read + Send>, Some(len))
                }
                FormField::Bytes { data, media_type } => {
                    let len = data.len() as u64;
                    (
                        None,
                        media_type.as_str(),
                        Box::new(Cursor::new(data.clone())) as Box<dyn Read + Send>,
                        Some(len),
                    )
                }
                FormField::Stream {
                    filename,
                    media_type,
                    source,
                } => {
                    let (content, len) = source.open(name)?;
                    (Some(filename.as_str()), media_type.as_str(), content, len)
                }
            };

            let head = part_head(boundary, name, filename, media_type);
            length = match (length, content_len) {
                (Some(total), Some(len)) => Some(total + head.len() as u64 + len + 2),
                _ => None,
            };
            reader = Box::new(reader.chain(Cursor::new(head)).chain(content).chain(&b"\r\n"[..]));
        }

        let tail = format!("--{boundary}--\r\n").into_bytes();
        length = length.map(|total| total + tail.len() as u64);
        reader = Box::new(reader.chain(Cursor::new(tail)));

        Ok(RequestBody {
            content_type: format!("multipart/form-data; boundary={boundary}"),
            content_length: length,
            reader,
        })
    }
}

impl Resendable for FormData {
    fn can_resend(&self) -> bool {
        self.fields.iter().all(|(_, f)| f.can_resend())
    }
}

fn part_head(boundary: &str, name: &str, filename: Option<&str>, media_type: &str) -> Vec<u8> {
    let mut head = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"",
        quote_param(name)
    );
    if let Some(filename) = filename {
        head.push_str(&format!("; filename=\"{}\"", quote_param(filename)));
    }
    head.push_str(&format!("\r\nContent-Type: {media_type}\r\n\r\n"));
    head.into_bytes()
}

pub(crate) fn quote_param(s: &str) -> String {
    s.replace('"', "%22").replace('\r', "%0D").replace('\n', "%0A")
}
