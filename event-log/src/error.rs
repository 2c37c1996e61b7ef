//! Error types for event-log parsing.

use thiserror::Error;

/// Result type alias for parsing operations.
pub type Result<T> = std::result::Result<T, ParseError>;

/// Errors that can occur while parsing an event-log export.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The document is not well-formed XML.
    #[error("malformed xml at byte {position}: {message}")]
    Malformed {
        /// Byte offset reported by the reader.
        position: u64,
        /// Reader diagnostic.
        message: String,
    },

    /// The document has no root element.
    #[error("document has no root element")]
    MissingRoot,

    /// The root element is not an event log.
    #[error("expected <EventLog> root element, found <{found}>")]
    UnexpectedRoot {
        /// Local name of the root that was found.
        found: String,
    },

    /// The document ended inside an element.
    #[error("unexpected end of document at byte {position}")]
    UnexpectedEof {
        /// Byte offset where input ran out.
        position: u64,
    },

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
