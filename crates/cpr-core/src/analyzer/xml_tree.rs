//! XML documents as JSON trees.
//!
//! Elements become objects keyed by child element name, attributes become
//! `@name` keys and mixed text lands under `#text`. Repeated children turn
//! into arrays, and an element holding only text collapses to that string.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use serde_json::{Map, Value};

use crate::errors::AnalyzerError;

struct Element {
    name: String,
    fields: Map<String, Value>,
    text: String,
}

fn invalid(err: impl std::fmt::Display) -> AnalyzerError {
    AnalyzerError::InvalidOutput(format!("malformed XML: {err}"))
}

fn open_element(start: &BytesStart<'_>) -> Result<Element, AnalyzerError> {
    let mut fields = Map::new();
    for attr in start.attributes() {
        let attr = attr.map_err(invalid)?;
        let key = format!("@{}", String::from_utf8_lossy(attr.key.as_ref()));
        let value = attr.unescape_value().map_err(invalid)?;
        fields.insert(key, Value::String(value.into_owned()));
    }
    Ok(Element {
        name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        fields,
        text: String::new(),
    })
}

fn close_element(element: Element) -> (String, Value) {
    let Element {
        name,
        mut fields,
        text,
    } = element;
    let text = text.trim();
    let value = if fields.is_empty() {
        if text.is_empty() {
            Value::Null
        } else {
            Value::String(text.to_string())
        }
    } else {
        if !text.is_empty() {
            fields.insert("#text".to_string(), Value::String(text.to_string()));
        }
        Value::Object(fields)
    };
    (name, value)
}

fn attach(parent: &mut Map<String, Value>, name: String, value: Value) {
    match parent.get_mut(&name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            parent.insert(name, value);
        }
    }
}

/// Parse `xml` into `{root_name: tree}`.
pub fn xml_to_value(xml: &str) -> Result<Value, AnalyzerError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<(String, Value)> = None;

    let mut finish = |stack: &mut Vec<Element>, element: Element| {
        let (name, value) = close_element(element);
        match stack.last_mut() {
            Some(parent) => attach(&mut parent.fields, name, value),
            None => root = Some((name, value)),
        }
    };

    loop {
        match reader.read_event().map_err(invalid)? {
            Event::Start(start) => stack.push(open_element(&start)?),
            Event::Empty(start) => {
                let element = open_element(&start)?;
                finish(&mut stack, element);
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text.unescape().map_err(invalid)?);
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| invalid("unbalanced closing tag"))?;
                finish(&mut stack, element);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(invalid("unclosed element"));
    }
    let (name, value) = root.ok_or_else(|| invalid("no root element"))?;
    let mut doc = Map::new();
    doc.insert(name, value);
    Ok(Value::Object(doc))
}
