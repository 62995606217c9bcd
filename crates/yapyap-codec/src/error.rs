use thiserror::Error;

/// Faults raised by the structured value codec (§4.1, §7).
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode value: {0}")]
    Encode(String),

    #[error("failed to decode value: {0}")]
    Decode(String),
}

/// Faults raised by the length-prefixed framer (§4.1, §7).
#[derive(Debug, Error)]
pub enum FramerError {
    #[error("frame of {size} bytes exceeds cap of {cap} bytes")]
    FrameTooLarge { size: usize, cap: usize },

    #[error("receive buffer of {size} bytes exceeds overflow threshold of {threshold} bytes")]
    BufferOverflow { size: usize, threshold: usize },

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("stream io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("idle timeout: no progress for {0:?}")]
    IdleTimeout(std::time::Duration),
}
