//! Thin pull-cursor over `quick_xml` that hides reader bookkeeping.

use std::fmt::Display;

use quick_xml::NsReader;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};

use crate::error::{ParseError, Result};

/// One step of the document as seen by the parser and the decoder.
pub(crate) enum Node<'i> {
    /// An element was opened.
    Open {
        element: BytesStart<'i>,
        namespace: Option<String>,
    },
    /// The innermost open element was closed.
    Close,
    /// Character data or CDATA, already unescaped.
    Text(String),
    /// Input is exhausted.
    Eof,
    /// Comments, processing instructions, declarations.
    Skip,
}

pub(crate) struct XmlCursor<'i> {
    reader: NsReader<&'i [u8]>,
}

impl<'i> XmlCursor<'i> {
    pub(crate) fn new(xml: &'i str) -> Self {
        let xml = xml.strip_prefix('\u{feff}').unwrap_or(xml);
        let mut reader = NsReader::from_str(xml);
        // `<a/>` becomes Start + End so every element is handled the same way.
        reader.config_mut().expand_empty_elements = true;
        reader.config_mut().check_end_names = true;
        Self { reader }
    }

    pub(crate) fn position(&self) -> u64 {
        self.reader.buffer_position() as u64
    }

    pub(crate) fn malformed(&self, err: impl Display) -> ParseError {
        ParseError::Malformed {
            position: self.position(),
            message: err.to_string(),
        }
    }

    pub(crate) fn next(&mut self) -> Result<Node<'i>> {
        let position = self.position();
        let (resolved, event) =
            self.reader
                .read_resolved_event()
                .map_err(|err| ParseError::Malformed {
                    position,
                    message: err.to_string(),
                })?;
        let namespace = match resolved {
            ResolveResult::Bound(Namespace(ns)) => Some(String::from_utf8_lossy(ns).into_owned()),
            _ => None,
        };

        match event {
            Event::Start(element) => Ok(Node::Open { element, namespace }),
            Event::End(_) => Ok(Node::Close),
            Event::Text(text) => match text.unescape() {
                Ok(text) => Ok(Node::Text(text.into_owned())),
                Err(err) => Err(self.malformed(err)),
            },
            Event::CData(cdata) => match std::str::from_utf8(&cdata) {
                Ok(text) => Ok(Node::Text(text.to_string())),
                Err(err) => Err(self.malformed(err)),
            },
            Event::Eof => Ok(Node::Eof),
            _ => Ok(Node::Skip),
        }
    }

    /// Consume the rest of the element whose start tag was just read.
    ///
    /// Returns `false` when input ran out before the element closed.
    pub(crate) fn skip_element(&mut self) -> Result<bool> {
        let mut depth = 1usize;
        while depth > 0 {
            match self.next()? {
                Node::Open { .. } => depth += 1,
                Node::Close => depth -= 1,
                Node::Eof => return Ok(false),
                Node::Text(_) | Node::Skip => {}
            }
        }
        Ok(true)
    }

    pub(crate) fn local_name(&self, element: &BytesStart<'_>) -> Result<String> {
        match std::str::from_utf8(element.local_name().as_ref()) {
            Ok(name) => Ok(name.to_string()),
            Err(err) => Err(self.malformed(err)),
        }
    }

    /// Attributes of `element` keyed by local name. Namespace declarations
    /// (`xmlns`, `xmlns:*`) are not data and are left out.
    pub(crate) fn attributes(&self, element: &BytesStart<'_>) -> Result<Vec<(String, String)>> {
        let mut attributes = Vec::new();
        for attr in element.attributes() {
            let attr = attr.map_err(|err| self.malformed(err))?;
            if attr.key.as_namespace_binding().is_some() {
                continue;
            }
            let key = std::str::from_utf8(attr.key.local_name().as_ref())
                .map_err(|err| self.malformed(err))?
                .to_string();
            let value = attr
                .unescape_value()
                .map_err(|err| self.malformed(err))?
                .into_owned();
            attributes.push((key, value));
        }
        Ok(attributes)
    }
}
