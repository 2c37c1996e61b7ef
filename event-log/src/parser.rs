//! Record parsing for whole event-log exports.

use std::path::Path;

use quick_xml::events::BytesStart;
use tracing::debug;

use crate::cursor::{Node, XmlCursor};
use crate::decoder::{decode_field, read_direct_text};
use crate::error::{ParseError, Result};
use crate::record::EventRecord;

/// Namespace of every element in an event-log export.
pub const EVENT_LOG_NAMESPACE: &str = "http://v8.1c.ru/eventLog";

const ROOT_ELEMENT: &str = "EventLog";
const EVENT_ELEMENT: &str = "Event";

/// Read `path` fully and parse it into records, in file order.
pub fn parse_file(path: impl AsRef<Path>) -> Result<Vec<EventRecord>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let records = parse_str(&content)?;
    debug!("Parsed {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Parse an in-memory export into records, in document order.
///
/// Elements outside the event-log namespace and unknown fields are skipped.
/// Any structural error fails the whole document.
pub fn parse_str(xml: &str) -> Result<Vec<EventRecord>> {
    let mut cursor = XmlCursor::new(xml);

    loop {
        match cursor.next()? {
            Node::Open { element, namespace } => {
                let name = cursor.local_name(&element)?;
                if name != ROOT_ELEMENT || !in_event_log(namespace.as_deref()) {
                    return Err(ParseError::UnexpectedRoot { found: name });
                }
                return parse_events(&mut cursor);
            }
            Node::Eof => return Err(ParseError::MissingRoot),
            Node::Close | Node::Text(_) | Node::Skip => {}
        }
    }
}

fn in_event_log(namespace: Option<&str>) -> bool {
    namespace == Some(EVENT_LOG_NAMESPACE)
}

fn parse_events(cursor: &mut XmlCursor<'_>) -> Result<Vec<EventRecord>> {
    let mut records = Vec::new();

    loop {
        match cursor.next()? {
            Node::Open { element, namespace } => {
                if in_event_log(namespace.as_deref())
                    && cursor.local_name(&element)? == EVENT_ELEMENT
                {
                    records.push(parse_event(cursor)?);
                } else {
                    skip(cursor)?;
                }
            }
            Node::Close => return Ok(records),
            Node::Eof => return Err(unexpected_eof(cursor)),
            Node::Text(_) | Node::Skip => {}
        }
    }
}

fn parse_event(cursor: &mut XmlCursor<'_>) -> Result<EventRecord> {
    let mut record = EventRecord::default();

    loop {
        match cursor.next()? {
            Node::Open { element, namespace } => {
                if in_event_log(namespace.as_deref()) {
                    parse_field(cursor, &element, &mut record)?;
                } else {
                    skip(cursor)?;
                }
            }
            Node::Close => return Ok(record),
            Node::Eof => return Err(unexpected_eof(cursor)),
            Node::Text(_) | Node::Skip => {}
        }
    }
}

fn parse_field(
    cursor: &mut XmlCursor<'_>,
    element: &BytesStart<'_>,
    record: &mut EventRecord,
) -> Result<()> {
    let name = cursor.local_name(element)?;

    if name == EventRecord::DATA_FIELD {
        record.data = decode_field(cursor, element)?;
        return Ok(());
    }

    let Some(text) = read_direct_text(cursor)? else {
        return Err(unexpected_eof(cursor));
    };
    if !record.set_field(&name, text) {
        debug!("Ignoring unknown event field <{name}>");
    }
    Ok(())
}

fn skip(cursor: &mut XmlCursor<'_>) -> Result<()> {
    if cursor.skip_element()? {
        Ok(())
    } else {
        Err(unexpected_eof(cursor))
    }
}

fn unexpected_eof(cursor: &XmlCursor<'_>) -> ParseError {
    ParseError::UnexpectedEof {
        position: cursor.position(),
    }
}
