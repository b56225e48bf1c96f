/// Errors that can occur while encoding or decoding wire formats.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// A read past the end of the cursor's declared bit range.
    ///
    /// Carries the cursor position at the failed read: bit offset, total bit
    /// length, and the number of bits requested.
    #[error("insufficient bits at offset {offset} of {length} (requested {requested})")]
    InsufficientBits {
        offset: usize,
        length: usize,
        requested: usize,
    },

    /// The IPv6 version field was not 6.
    #[error("invalid version for IPv6 packet: {version}")]
    InvalidVersion { version: u8 },

    /// TCP data offset below the 5-word minimum.
    #[error("invalid tcp header length: {words} words (minimum 5)")]
    InvalidHeaderLength { words: u8 },

    /// Next-header was unset at serialize time and could not be inferred
    /// from the payload type.
    #[error("next-header unset and not inferable from payload")]
    UnresolvedNextHeader,

    /// A serialized payload does not fit the 16-bit length field carrying it.
    #[error("payload of {len} bytes exceeds the length field maximum of {max}")]
    OversizedPayload { len: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, WireError>;
