use std::{error::Error, fmt::Display, str::Utf8Error};

/// Errors that may occur when decoding received datagrams.
///
/// Running out of bytes is an ordinary condition for network input,
/// so every variant is recoverable and leaves the decoder where it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    Truncated { needed: usize, remaining: usize },
    UnterminatedString,
    InvalidUtf8(Utf8Error),
    InvalidMagic(u32),
    InvalidDatagramSize(usize),
    InvalidTag { field: &'static str, tag: u8 },
    EntryCountMismatch { sequence_id: u8, expected: u8, got: u8 },
    TrailingData { sequence_id: u8 },
    IncompleteChain,
}

impl From<Utf8Error> for ReadError {
    fn from(value: Utf8Error) -> Self {
        ReadError::InvalidUtf8(value)
    }
}

impl Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadError::Truncated { needed, remaining } => write!(
                f,
                "Truncated input: needed {} bytes, but only {} remain",
                needed, remaining
            ),
            ReadError::UnterminatedString => write!(f, "String is not NUL-terminated"),
            ReadError::InvalidUtf8(error) => write!(f, "Invalid UTF8: {}", error),
            ReadError::InvalidMagic(magic) => {
                write!(f, "Invalid protocol magic/version 0x{:08x}", magic)
            }
            ReadError::InvalidDatagramSize(size) => {
                write!(f, "Datagram of {} bytes has an invalid size", size)
            }
            ReadError::InvalidTag { field, tag } => {
                write!(f, "Invalid tag {} for field '{}'", tag, field)
            }
            ReadError::EntryCountMismatch {
                sequence_id,
                expected,
                got,
            } => write!(
                f,
                "Datagram {} announces {} entries, but {} were decoded",
                sequence_id, expected, got
            ),
            ReadError::TrailingData { sequence_id } => {
                write!(f, "Unexpected trailing data in datagram {}", sequence_id)
            }
            ReadError::IncompleteChain => write!(f, "Datagram chain is incomplete"),
        }
    }
}

impl Error for ReadError {}

/// Errors raised while finishing a [`DatagramChain`](crate::chain::DatagramChain).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    TooManyDatagrams { count: usize, limit: usize },
}

impl Display for ChainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainError::TooManyDatagrams { count, limit } => write!(
                f,
                "Payload needs {} datagrams, but at most {} are allowed",
                count, limit
            ),
        }
    }
}

impl Error for ChainError {}
