use std::{error::Error, fmt::Display, io};

use daqctl_protocol::{Target, error::ChainError};

/// Reasons a request could not be answered.
///
/// The client only ever sees "no data"; the variant is logged on the server.
#[derive(Debug)]
pub enum HandlerError {
    NoSuchCrate(u16),
    NoSuchTag { crate_i: u16, tag_i: u16 },
    NoSuchModule(Target),
    NoSuchSubmodule(Target),
    MissingTarget(&'static str),
    NoGoc(u16),
    InvalidWidth(u8),
    Hardware(io::Error),
    Poisoned,
    Chain(ChainError),
}

impl From<io::Error> for HandlerError {
    fn from(value: io::Error) -> Self {
        HandlerError::Hardware(value)
    }
}

impl From<ChainError> for HandlerError {
    fn from(value: ChainError) -> Self {
        HandlerError::Chain(value)
    }
}

impl Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerError::NoSuchCrate(crate_i) => write!(f, "No crate with index {}", crate_i),
            HandlerError::NoSuchTag { crate_i, tag_i } => {
                write!(f, "Crate {} has no tag with index {}", crate_i, tag_i)
            }
            HandlerError::NoSuchModule(target) => write!(f, "No module at {}", target),
            HandlerError::NoSuchSubmodule(target) => write!(f, "No submodule at {}", target),
            HandlerError::MissingTarget(what) => write!(f, "Request does not name a {}", what),
            HandlerError::NoGoc(crate_i) => {
                write!(f, "Crate {} has no generic op controller", crate_i)
            }
            HandlerError::InvalidWidth(bits) => write!(f, "Unsupported access width {}", bits),
            HandlerError::Hardware(error) => write!(f, "Hardware access failed: {}", error),
            HandlerError::Poisoned => write!(f, "Shared crate state is poisoned"),
            HandlerError::Chain(error) => write!(f, "{}", error),
        }
    }
}

impl Error for HandlerError {}
