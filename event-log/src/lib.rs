//! # Event Log
//!
//! This crate turns 1C:Enterprise event-log XML exports into typed
//! [`EventRecord`]s ready to be shipped to a log-aggregation backend.
//!
//! ## Features
//!
//! - **Record Parsing**: Reads a whole export and yields its records in file order
//! - **Dynamic Decoding**: Folds the loosely-typed `Data` payload into a [`DecoderValue`]
//! - **Strict Structure**: One malformed record fails the whole file
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Event Log                               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  XML text ──► XmlCursor ──► parser ──► Vec<EventRecord>         │
//! │                   │                          ▲                  │
//! │                   ▼                          │                  │
//! │              TaggedTree ──► fold ──► DecoderValue (Data)        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod cursor;
pub mod decoder;
pub mod error;
pub mod parser;
pub mod record;
pub mod tree;
pub mod value;

pub use decoder::{decode_str, fold};
pub use error::{ParseError, Result};
pub use parser::{EVENT_LOG_NAMESPACE, parse_file, parse_str};
pub use record::EventRecord;
pub use tree::TaggedTree;
pub use value::{DecoderValue, Field};
