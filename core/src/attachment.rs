//! Single-payload attachments sent as the whole body of a POST.

use std::fs::File;
use std::path::PathBuf;

use crate::body::Resendable;
use crate::error::Result;
use crate::form::{guess_media_type, quote_param, OCTET_STREAM};
use crate::http::RequestBody;

/// A binary payload with a declared media type, from memory or from a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
    Bytes {
        content: Vec<u8>,
        media_type: String,
    },
    File {
        path: PathBuf,
        name: String,
        media_type: String,
    },
}

impl Attachment {
    pub fn bytes(content: impl Into<Vec<u8>>) -> Self {
        Attachment::Bytes {
            content: content.into(),
            media_type: OCTET_STREAM.to_string(),
        }
    }

    /// A file attachment named after the file, with a media type guessed
    /// from its extension.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let media_type = guess_media_type(&path);
        Attachment::File {
            path,
            name,
            media_type,
        }
    }

    pub fn with_media_type(mut self, value: impl Into<String>) -> Self {
        match &mut self {
            Attachment::Bytes { media_type, .. } | Attachment::File { media_type, .. } => {
                *media_type = value.into();
            }
        }
        self
    }

    /// Override the file name announced in `Content-Disposition`.
    pub fn with_name(mut self, value: impl Into<String>) -> Self {
        if let Attachment::File { name, .. } = &mut self {
            *name = value.into();
        }
        self
    }

    pub fn media_type(&self) -> &str {
        match self {
            Attachment::Bytes { media_type, .. } | Attachment::File { media_type, .. } => media_type,
        }
    }

    /// An attachment is only sent when valid: a media type is declared and,
    /// for files, the path names an existing regular file.
    pub fn is_valid(&self) -> bool {
        if self.media_type().trim().is_empty() {
            return false;
        }
        match self {
            Attachment::Bytes { .. } => true,
            Attachment::File { path, name, .. } => !name.is_empty() && path.is_file(),
        }
    }

    pub fn content_disposition(&self) -> String {
        match self {
            Attachment::Bytes { .. } => "attachment".to_string(),
            Attachment::File { name, .. } => format!("attachment; filename=\"{}\"", quote_param(name)),
        }
    }

    /// Produce the body for one send; files are opened here.
    pub fn body(&self) -> Result<RequestBody> {
        match self {
            Attachment::Bytes {
                content,
                media_type,
            } => Ok(RequestBody::from_bytes(media_type.clone(), content.clone())),
            Attachment::File {
                path, media_type, ..
            } => {
                let file = File::open(path)?;
                let len = file.metadata().ok().map(|m| m.len());
                Ok(RequestBody {
                    content_type: media_type.clone(),
                    content_length: len,
                    reader: Box::new(file),
                })
            }
        }
    }
}

impl Resendable for Attachment {
    fn can_resend(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn bytes_attachment_defaults_to_octet_stream() {
        let att = Attachment::bytes(vec![1, 2, 3]);
        assert!(att.is_valid());
        assert_eq!(att.media_type(), OCTET_STREAM);
        assert_eq!(att.content_disposition(), "attachment");
        assert_eq!(att.body().unwrap().read_to_vec().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn empty_media_type_is_invalid() {
        assert!(!Attachment::bytes(vec![1]).with_media_type("").is_valid());
    }

    #[test]
    fn file_attachment_requires_existing_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!Attachment::file(dir.path()).is_valid());
        assert!(!Attachment::file(dir.path().join("missing.png")).is_valid());

        let path = dir.path().join("image.png");
        std::fs::File::create(&path).unwrap().write_all(b"\x89PNG").unwrap();
        let att = Attachment::file(&path);
        assert!(att.is_valid());
        assert_eq!(att.media_type(), "image/png");
        assert_eq!(att.content_disposition(), "attachment; filename=\"image.png\"");

        let body = att.body().unwrap();
        assert_eq!(body.content_length, Some(4));
        assert_eq!(body.read_to_vec().unwrap(), b"\x89PNG");
    }

    #[test]
    fn name_override_changes_disposition() {
        let att = Attachment::file("/tmp/x.bin").with_name("report \"final\".bin");
        assert_eq!(
            att.content_disposition(),
            "attachment; filename=\"report %22final%22.bin\""
        );
    }
}
