//! Resolved content items.

use crate::error::ContentResult;
use bytes::Bytes;
use depot_core::StoreKey;
use depot_storage::{ByteStream, collect_stream};
use std::fmt;

/// The payload of a [`Transfer`].
pub enum TransferBody {
    /// Content already in memory (merged or synthesized documents).
    Bytes(Bytes),
    /// Content streamed from a backend. Can be consumed once.
    Stream(ByteStream),
    /// The path names a directory. Holds the sorted child names; directories
    /// end with `/`.
    Directory(Vec<String>),
}

impl fmt::Debug for TransferBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::Stream(_) => f.write_str("Stream"),
            Self::Directory(children) => f.debug_tuple("Directory").field(children).finish(),
        }
    }
}

/// A resolved content item.
#[derive(Debug)]
pub struct Transfer {
    /// The store that supplied the bytes, or the requested group for merged
    /// content.
    pub origin: StoreKey,
    pub path: String,
    pub body: TransferBody,
}

impl Transfer {
    pub fn bytes(origin: StoreKey, path: impl Into<String>, data: Bytes) -> Self {
        Self {
            origin,
            path: path.into(),
            body: TransferBody::Bytes(data),
        }
    }

    pub fn stream(origin: StoreKey, path: impl Into<String>, stream: ByteStream) -> Self {
        Self {
            origin,
            path: path.into(),
            body: TransferBody::Stream(stream),
        }
    }

    pub fn directory(origin: StoreKey, path: impl Into<String>, children: Vec<String>) -> Self {
        Self {
            origin,
            path: path.into(),
            body: TransferBody::Directory(children),
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.body, TransferBody::Directory(_))
    }

    /// Read the whole body. A directory yields its listing, one name per line.
    pub async fn into_bytes(self) -> ContentResult<Bytes> {
        match self.body {
            TransferBody::Bytes(b) => Ok(b),
            TransferBody::Stream(s) => Ok(collect_stream(s).await?),
            TransferBody::Directory(children) => Ok(Bytes::from(children.join("\n"))),
        }
    }
}
