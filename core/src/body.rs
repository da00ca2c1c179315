//! Selection of the one body representation a request sends.
//!
//! # Design
//! A request may hold form data, an attachment and a raw body at the same
//! time; exactly one of them is sent. For POST the order is form data, then
//! a valid attachment, then the raw body. Every other body-capable method
//! only ever sends the raw body. `BodySource` borrows from the request so
//! that selection is free and a resendable request can be rendered again on
//! every hop.

use uuid::Uuid;

use crate::attachment::Attachment;
use crate::error::Result;
use crate::form::FormData;
use crate::http::{Method, RequestBody};

/// Whether an object can produce its bytes more than once.
pub trait Resendable {
    fn can_resend(&self) -> bool;
}

/// A caller-supplied body with its declared media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBody {
    pub data: Vec<u8>,
    pub media_type: String,
}

/// The body chosen for a send.
#[derive(Debug, Clone, Copy)]
pub enum BodySource<'a> {
    Empty,
    Raw(&'a RawBody),
    Multipart(&'a FormData),
    Attachment(&'a Attachment),
}

impl<'a> BodySource<'a> {
    /// Apply the precedence rules. `body_allowed` says whether this request
    /// may carry a raw body at all.
    pub fn select(
        method: Method,
        body_allowed: bool,
        form: &'a FormData,
        attachment: Option<&'a Attachment>,
        raw: Option<&'a RawBody>,
    ) -> Self {
        if method == Method::Post {
            if !form.is_empty() {
                return BodySource::Multipart(form);
            }
            if let Some(att) = attachment.filter(|a| a.is_valid()) {
                return BodySource::Attachment(att);
            }
        }
        match raw {
            Some(raw) if body_allowed => BodySource::Raw(raw),
            _ => BodySource::Empty,
        }
    }

    /// Extra `Content-Disposition` header value, only for attachments.
    pub fn content_disposition(&self) -> Option<String> {
        match self {
            BodySource::Attachment(att) => Some(att.content_disposition()),
            _ => None,
        }
    }

    /// Produce the bytes for one send. Multipart bodies get a fresh
    /// boundary each time.
    pub fn render(&self) -> Result<Option<RequestBody>> {
        match self {
            BodySource::Empty => Ok(None),
            BodySource::Raw(raw) => Ok(Some(RequestBody::from_bytes(
                raw.media_type.clone(),
                raw.data.clone(),
            ))),
            BodySource::Multipart(form) => form.multipart(&new_boundary()).map(Some),
            BodySource::Attachment(att) => att.body().map(Some),
        }
    }
}

impl Resendable for BodySource<'_> {
    fn can_resend(&self) -> bool {
        match self {
            BodySource::Empty | BodySource::Raw(_) => true,
            BodySource::Multipart(form) => form.can_resend(),
            BodySource::Attachment(att) => att.can_resend(),
        }
    }
}

/// A random multipart boundary; 128 random bits make a collision with
/// payload content practically impossible.
pub fn new_boundary() -> String {
    format!("----requests-{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::OCTET_STREAM;

    fn raw() -> RawBody {
        RawBody {
            data: b"raw".to_vec(),
            media_type: "text/plain".to_string(),
        }
    }

    #[test]
    fn form_data_wins_over_raw_body_on_post() {
        let form = FormData::new().text("a", "1");
        let raw = raw();
        let att = Attachment::bytes(vec![1]);
        let source = BodySource::select(Method::Post, true, &form, Some(&att), Some(&raw));
        assert!(matches!(source, BodySource::Multipart(_)));
    }

    #[test]
    fn valid_attachment_wins_over_raw_body_on_post() {
        let form = FormData::new();
        let raw = raw();
        let att = Attachment::bytes(vec![1]);
        let source = BodySource::select(Method::Post, true, &form, Some(&att), Some(&raw));
        assert!(matches!(source, BodySource::Attachment(_)));
        assert_eq!(source.content_disposition().as_deref(), Some("attachment"));
    }

    #[test]
    fn invalid_attachment_falls_through_to_raw() {
        let form = FormData::new();
        let raw = raw();
        let att = Attachment::file("/no/such/file.bin");
        let source = BodySource::select(Method::Post, true, &form, Some(&att), Some(&raw));
        assert!(matches!(source, BodySource::Raw(_)));
    }

    #[test]
    fn put_ignores_form_and_attachment() {
        let form = FormData::new().text("a", "1");
        let raw = raw();
        let att = Attachment::bytes(vec![1]);
        let source = BodySource::select(Method::Put, true, &form, Some(&att), Some(&raw));
        assert!(matches!(source, BodySource::Raw(_)));
    }

    #[test]
    fn nothing_set_is_empty() {
        let form = FormData::new();
        let source = BodySource::select(Method::Post, true, &form, None, None);
        assert!(matches!(source, BodySource::Empty));
        assert!(source.render().unwrap().is_none());
    }

    #[test]
    fn raw_body_dropped_when_not_allowed() {
        let form = FormData::new();
        let raw = raw();
        let source = BodySource::select(Method::Delete, false, &form, None, Some(&raw));
        assert!(matches!(source, BodySource::Empty));
    }

    #[test]
    fn multipart_boundary_is_fresh_per_render() {
        let form = FormData::new().bytes("b", vec![0u8; 4], OCTET_STREAM);
        let source = BodySource::Multipart(&form);
        let first = source.render().unwrap().unwrap().content_type;
        let second = source.render().unwrap().unwrap().content_type;
        assert!(first.starts_with("multipart/form-data; boundary=----requests-"));
        assert_ne!(first, second);
    }
}
