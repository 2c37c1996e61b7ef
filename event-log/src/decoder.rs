//! Dynamic decoding of the variable-schema `Data` field.
//!
//! The payload of an event is arbitrary XML whose shape depends on the
//! event type. It is decoded in two steps: the element is read into a
//! [`TaggedTree`], then [`fold`] collapses that tree into a [`DecoderValue`].
//!
//! Elements typed as plain strings (`xsi:type="xs:string"`) skip the tree
//! entirely and decode to their direct text.
//!
//! Attribute names and child tag names share one key space in the folded
//! map. Attributes are merged after children, so an attribute silently
//! replaces a child group of the same name. Downstream consumers already
//! depend on that shape.

use indexmap::IndexMap;
use quick_xml::events::BytesStart;

use crate::cursor::{Node, XmlCursor};
use crate::error::Result;
use crate::tree::TaggedTree;
use crate::value::{DecoderValue, Field};

/// Attribute that carries the schema type of an element.
const TYPE_ATTRIBUTE: &str = "type";

/// Suffix of the schema type that marks plain text.
const STRING_TYPE_MARKER: &str = "string";

/// Map key holding the text of an element that also has attributes.
pub const TEXT_KEY: &str = "#text";

/// Decode the first element of `xml`.
///
/// Input without any element, or that ends before the element closes,
/// decodes to [`DecoderValue::Null`].
pub fn decode_str(xml: &str) -> Result<DecoderValue> {
    let mut cursor = XmlCursor::new(xml);
    loop {
        match cursor.next()? {
            Node::Open { element, .. } => return decode_field(&mut cursor, &element),
            Node::Eof => return Ok(DecoderValue::Null),
            Node::Close | Node::Text(_) | Node::Skip => {}
        }
    }
}

/// Decode a field element whose start tag was just read.
pub(crate) fn decode_field(
    cursor: &mut XmlCursor<'_>,
    element: &BytesStart<'_>,
) -> Result<DecoderValue> {
    let attributes = cursor.attributes(element)?;

    if is_string_typed(&attributes) {
        return Ok(match read_direct_text(cursor)? {
            Some(text) => DecoderValue::String(text),
            None => DecoderValue::Null,
        });
    }

    // The field's own name is the record key, so the tree is anonymous.
    Ok(match TaggedTree::read(cursor, None, attributes)? {
        Some(tree) => fold(tree),
        None => DecoderValue::Null,
    })
}

/// Collect the character data directly inside the current element,
/// skipping nested elements and their text.
///
/// Returns `None` if the input ends before the element is closed.
pub(crate) fn read_direct_text(cursor: &mut XmlCursor<'_>) -> Result<Option<String>> {
    let mut text = String::new();
    loop {
        match cursor.next()? {
            Node::Text(chunk) => text.push_str(&chunk),
            Node::Open { .. } => {
                if !cursor.skip_element()? {
                    return Ok(None);
                }
            }
            Node::Close => return Ok(Some(text)),
            Node::Eof => return Ok(None),
            Node::Skip => {}
        }
    }
}

fn is_string_typed(attributes: &[(String, String)]) -> bool {
    attributes
        .iter()
        .any(|(key, value)| key == TYPE_ATTRIBUTE && value.ends_with(STRING_TYPE_MARKER))
}

/// Fold a tagged tree into a [`DecoderValue`], bottom-up.
pub fn fold(tree: TaggedTree) -> DecoderValue {
    if tree.is_blank() {
        return DecoderValue::Null;
    }

    let TaggedTree {
        attributes,
        children,
        text,
        ..
    } = tree;

    if children.is_empty() && attributes.is_empty() {
        return DecoderValue::String(text);
    }

    let has_children = !children.is_empty();
    let mut map = group_children(children);

    for (key, value) in attributes {
        map.insert(key, Field::One(DecoderValue::String(value)));
    }

    if !has_children && !text.is_empty() {
        map.insert(TEXT_KEY.to_string(), Field::One(DecoderValue::String(text)));
    }

    DecoderValue::Map(map)
}

/// Group children by tag name in first-seen order. A group of one is
/// stored as its value, larger groups as a list.
fn group_children(children: Vec<TaggedTree>) -> IndexMap<String, Field> {
    let mut groups: IndexMap<String, Vec<DecoderValue>> = IndexMap::new();
    for child in children {
        let name = child.name.clone().unwrap_or_default();
        groups.entry(name).or_default().push(fold(child));
    }

    groups
        .into_iter()
        .map(|(name, mut values)| {
            let field = match values.len() {
                1 => Field::One(values.remove(0)),
                _ => Field::Many(values),
            };
            (name, field)
        })
        .collect()
}
