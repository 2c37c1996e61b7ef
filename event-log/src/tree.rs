//! Generic tagged-tree representation of an XML element.

use crate::cursor::{Node, XmlCursor};
use crate::error::Result;

/// An element reduced to the parts the decoder cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaggedTree {
    /// Tag name; `None` for the anonymous field element being decoded.
    pub name: Option<String>,

    /// Attributes in source order, keyed by local name.
    pub attributes: Vec<(String, String)>,

    /// Child elements in document order.
    pub children: Vec<TaggedTree>,

    /// Trimmed text content of the element itself.
    pub text: String,
}

impl TaggedTree {
    /// Create an empty tree with the given tag name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Add a child element.
    pub fn with_child(mut self, child: TaggedTree) -> Self {
        self.children.push(child);
        self
    }

    /// Set the text content. Surrounding whitespace is trimmed.
    pub fn with_text(mut self, text: impl AsRef<str>) -> Self {
        self.text = text.as_ref().trim().to_string();
        self
    }

    /// Check if the tree carries nothing at all.
    pub fn is_blank(&self) -> bool {
        self.name.is_none()
            && self.children.is_empty()
            && self.attributes.is_empty()
            && self.text.is_empty()
    }

    /// Read the body of an element whose start tag (and attributes) the
    /// cursor has already consumed.
    ///
    /// Returns `None` if the input ends before the element is closed.
    pub(crate) fn read(
        cursor: &mut XmlCursor<'_>,
        name: Option<String>,
        attributes: Vec<(String, String)>,
    ) -> Result<Option<Self>> {
        let mut children = Vec::new();
        let mut text = String::new();

        loop {
            match cursor.next()? {
                Node::Open { element, .. } => {
                    let child_name = cursor.local_name(&element)?;
                    let child_attributes = cursor.attributes(&element)?;
                    match Self::read(cursor, Some(child_name), child_attributes)? {
                        Some(child) => children.push(child),
                        None => return Ok(None),
                    }
                }
                Node::Text(chunk) => text.push_str(&chunk),
                Node::Close => break,
                Node::Eof => return Ok(None),
                Node::Skip => {}
            }
        }

        Ok(Some(Self {
            name,
            attributes,
            children,
            text: text.trim().to_string(),
        }))
    }
}
