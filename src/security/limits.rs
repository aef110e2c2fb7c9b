//! Request size limits.
//!
//! # Responsibilities
//! - Read the declared body size of a request
//! - Decide whether it exceeds the configured maximum
//!
//! # Design Decisions
//! - Checked from headers alone, before any body byte is read
//! - A malformed `Content-Length` counts as oversized (fail closed)
//! - Bodies without a declared length are capped while streaming instead

use axum::http::{header, HeaderMap};

/// Declared body size of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredLength {
    /// No `Content-Length` header (chunked or empty).
    Absent,
    Bytes(u64),
    /// Header present but not a valid length.
    Invalid,
}

impl DeclaredLength {
    /// Read the `Content-Length` header.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        match headers.get(header::CONTENT_LENGTH) {
            None => DeclaredLength::Absent,
            Some(value) => value
                .to_str()
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map_or(DeclaredLength::Invalid, DeclaredLength::Bytes),
        }
    }

    /// True if the declared size is larger than `max_bytes` or unreadable.
    pub fn exceeds(&self, max_bytes: u64) -> bool {
        match self {
            DeclaredLength::Absent => false,
            DeclaredLength::Bytes(n) => *n > max_bytes,
            DeclaredLength::Invalid => true,
        }
    }
}
