use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while turning a fetched body into a [`FeedDocument`].
#[derive(Debug, Error)]
pub enum ParseError {
    /// The body is not well-formed XML
    #[error("Malformed XML at byte {position}: {source}")]
    Xml {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },
    /// The document ended inside an `<item>` element
    #[error("Document ended inside an unterminated <item>")]
    UnterminatedItem,
}

/// Value of one child element of an item.
///
/// Repeated elements (several `<category>` tags, for instance) collapse into
/// a `List` in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Scalar(String),
    List(Vec<String>),
}

impl FieldValue {
    fn push(&mut self, value: String) {
        match self {
            FieldValue::Scalar(first) => {
                let first = std::mem::take(first);
                *self = FieldValue::List(vec![first, value]);
            }
            FieldValue::List(values) => values.push(value),
        }
    }
}

/// Semi-structured field map of a single item, keyed by qualified element name
/// (`title`, `pubDate`, `dc:creator`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemFields {
    values: HashMap<String, FieldValue>,
}

impl ItemFields {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    /// Text of a single-valued field.
    ///
    /// Returns the first value when the element was repeated, and `None` when
    /// the element is absent.
    pub fn scalar(&self, name: &str) -> Option<&str> {
        match self.values.get(name)? {
            FieldValue::Scalar(value) => Some(value.as_str()),
            FieldValue::List(values) => values.first().map(String::as_str),
        }
    }

    /// Stringified field that may be repeated.
    ///
    /// A single value is returned as-is; a repeated element is rendered as a
    /// JSON array so the order and boundaries of the values survive storage.
    pub fn joined(&self, name: &str) -> Option<String> {
        match self.values.get(name)? {
            FieldValue::Scalar(value) => Some(value.clone()),
            FieldValue::List(values) => serde_json::to_string(values).ok(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn insert(&mut self, name: String, value: String) {
        match self.values.get_mut(&name) {
            Some(existing) => existing.push(value),
            None => {
                self.values.insert(name, FieldValue::Scalar(value));
            }
        }
    }
}

/// One `<item>` node of a fetched document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemNode {
    raw_text: String,
    fields: ItemFields,
}

impl ItemNode {
    /// Textual content of the item: every descendant text node, trimmed, with
    /// empty nodes dropped, joined by newlines.
    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn fields(&self) -> &ItemFields {
        &self.fields
    }
}

/// A parsed feed document: the ordered `<item>` nodes it contains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedDocument {
    items: Vec<ItemNode>,
}

impl FeedDocument {
    pub fn items(&self) -> &[ItemNode] {
        &self.items
    }

    pub fn into_items(self) -> Vec<ItemNode> {
        self.items
    }
}

/// Field being collected for the direct child element currently open.
struct OpenField {
    name: String,
    text: Vec<String>,
    url: Option<String>,
}

impl OpenField {
    fn from_start(start: &BytesStart<'_>) -> Self {
        Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            text: Vec::new(),
            url: url_attribute(start),
        }
    }

    /// Element text when present, otherwise the `url` attribute
    /// (`<enclosure url="..."/>`, `<source url="...">`).
    fn into_value(self) -> Option<(String, String)> {
        let text = self.text.join(" ");
        if !text.is_empty() {
            Some((self.name, text))
        } else {
            self.url.map(|url| (self.name, url))
        }
    }
}

#[derive(Default)]
struct ItemBuilder {
    depth: usize,
    pieces: Vec<String>,
    fields: ItemFields,
    open: Option<OpenField>,
}

impl ItemBuilder {
    fn push_text(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        if let Some(open) = self.open.as_mut() {
            open.text.push(text.clone());
        }
        self.pieces.push(text);
    }

    fn close_field(&mut self) {
        if let Some((name, value)) = self.open.take().and_then(OpenField::into_value) {
            self.fields.insert(name, value);
        }
    }

    fn finish(self) -> ItemNode {
        ItemNode {
            raw_text: self.pieces.join("\n"),
            fields: self.fields,
        }
    }
}

fn url_attribute(start: &BytesStart<'_>) -> Option<String> {
    let attr = start.try_get_attribute("url").ok().flatten()?;
    let value = match attr.unescape_value() {
        Ok(v) => v.into_owned(),
        Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
    };
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn is_item(start_name: &[u8]) -> bool {
    start_name == b"item"
}

/// Parse an RSS body into its `<item>` nodes.
///
/// Only well-formedness matters: items are collected wherever they appear,
/// so RSS 0.9x/1.0/2.0 layouts all work. A text node whose entities cannot be
/// resolved is kept in its escaped form rather than failing the document.
pub fn parse_document(bytes: &[u8]) -> Result<FeedDocument, ParseError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut current: Option<ItemBuilder> = None;
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|source| ParseError::Xml {
                position: reader.error_position() as u64,
                source,
            })?;

        match event {
            Event::Start(start) => match current.as_mut() {
                Some(item) => {
                    item.depth += 1;
                    if item.depth == 1 {
                        item.open = Some(OpenField::from_start(&start));
                    }
                }
                None if is_item(start.local_name().as_ref()) => {
                    current = Some(ItemBuilder::default());
                }
                None => {}
            },
            Event::Empty(start) => {
                if let Some(item) = current.as_mut() {
                    if item.depth == 0 {
                        item.open = Some(OpenField::from_start(&start));
                        item.close_field();
                    }
                }
            }
            Event::End(_) => {
                if let Some(item) = current.as_mut() {
                    if item.depth == 0 {
                        if let Some(done) = current.take() {
                            items.push(done.finish());
                        }
                    } else {
                        if item.depth == 1 {
                            item.close_field();
                        }
                        item.depth -= 1;
                    }
                }
            }
            Event::Text(text) => {
                if let Some(item) = current.as_mut() {
                    let value = match text.unescape() {
                        Ok(v) => v.trim().to_string(),
                        Err(_) => String::from_utf8_lossy(&text).trim().to_string(),
                    };
                    item.push_text(value);
                }
            }
            Event::CData(data) => {
                if let Some(item) = current.as_mut() {
                    item.push_text(String::from_utf8_lossy(&data).trim().to_string());
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if current.is_some() {
        return Err(ParseError::UnterminatedItem);
    }

    Ok(FeedDocument { items })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/"><channel>
    <title>Channel title is not an item</title>
    <item>
        <title>First &amp; foremost</title>
        <link>https://example.com/1</link>
        <category>ops</category>
        <category>alerts</category>
        <enclosure url="https://example.com/a.mp3" length="10" type="audio/mpeg"/>
        <description><![CDATA[<p>alert: disk full</p>]]></description>
        <dc:creator>Ops Bot</dc:creator>
    </item>
    <item>
        <title>Second</title>
    </item>
</channel></rss>"#;

    #[test]
    fn test_items_in_document_order() {
        let doc = parse_document(RSS.as_bytes()).unwrap();
        assert_eq!(doc.items().len(), 2);
        assert_eq!(doc.items()[0].fields().scalar("title"), Some("First & foremost"));
        assert_eq!(doc.items()[1].fields().scalar("title"), Some("Second"));
    }

    #[test]
    fn test_raw_text_joins_descendant_text() {
        let doc = parse_document(RSS.as_bytes()).unwrap();
        assert_eq!(
            doc.items()[0].raw_text(),
            "First & foremost\nhttps://example.com/1\nops\nalerts\n<p>alert: disk full</p>\nOps Bot"
        );
        assert_eq!(doc.items()[1].raw_text(), "Second");
    }

    #[test]
    fn test_repeated_elements_become_list() {
        let doc = parse_document(RSS.as_bytes()).unwrap();
        let fields = doc.items()[0].fields();
        assert_eq!(
            fields.get("category"),
            Some(&FieldValue::List(vec!["ops".into(), "alerts".into()]))
        );
        assert_eq!(fields.joined("category").as_deref(), Some(r#"["ops","alerts"]"#));
        assert_eq!(fields.scalar("category"), Some("ops"));
    }

    #[test]
    fn test_empty_element_uses_url_attribute() {
        let doc = parse_document(RSS.as_bytes()).unwrap();
        assert_eq!(
            doc.items()[0].fields().scalar("enclosure"),
            Some("https://example.com/a.mp3")
        );
    }

    #[test]
    fn test_prefixed_names_are_kept() {
        let doc = parse_document(RSS.as_bytes()).unwrap();
        assert_eq!(doc.items()[0].fields().scalar("dc:creator"), Some("Ops Bot"));
    }

    #[test]
    fn test_missing_field_is_none() {
        let doc = parse_document(RSS.as_bytes()).unwrap();
        assert_eq!(doc.items()[1].fields().scalar("link"), None);
        assert_eq!(doc.items()[1].fields().joined("category"), None);
    }

    #[test]
    fn test_no_items() {
        let doc = parse_document(b"<rss><channel><title>t</title></channel></rss>").unwrap();
        assert!(doc.items().is_empty());
    }

    #[test]
    fn test_malformed_xml_is_error() {
        let result = parse_document(b"<rss><channel><item><title>x</channel></rss>");
        assert!(matches!(result, Err(ParseError::Xml { .. })));
    }

    #[test]
    fn test_unterminated_item_is_error() {
        let result = parse_document(b"<rss><channel><item><title>x</title>");
        assert!(result.is_err());
    }
}
