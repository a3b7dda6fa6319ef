use axum::{
    body::Body,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use crate::domain::FileRecord;

/// Streams stored bytes back with the uploader's file name.
pub struct FileReply {
    data: File,
    file: FileRecord,
}

impl FileReply {
    #[must_use]
    pub fn new(data: File, file: FileRecord) -> Self {
        Self { data, file }
    }
}

fn attachment(file_name: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!(r#"attachment; filename="{file_name}""#)).ok()
}

impl IntoResponse for FileReply {
    fn into_response(self) -> Response {
        let stream = ReaderStream::new(self.data);
        let mut res = Body::from_stream(stream).into_response();
        let headers = res.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );
        if let Some(val) = attachment(&self.file.original_filename) {
            headers.insert(header::CONTENT_DISPOSITION, val);
        }
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(self.file.size_bytes));
        if let Ok(val) = HeaderValue::from_str(&format!("\"{}\"", self.file.blake3_hash)) {
            headers.insert(header::ETAG, val);
        }

        res
    }
}
