//! Errors raised while turning client buffers into renderable ones.

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HandoffError {
    #[error("Client buffer was destroyed before it could be imported")]
    BufferDestroyed,

    #[error("Buffer type is not supported by this allocator")]
    UnsupportedBuffer,

    #[error("Buffer import failed: {0}")]
    Import(String),

    #[error("Timeline import failed: {0}")]
    TimelineImport(#[source] io::Error),

    #[error("Fence readiness for timeline point {point} could not be obtained: {source}")]
    FenceReadiness {
        point: u64,
        #[source]
        source: io::Error,
    },
}

pub type Result<T, E = HandoffError> = std::result::Result<T, E>;
