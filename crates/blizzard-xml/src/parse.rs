use std::path::Path;

use blizzard_core::document::{Document, Element};
use quick_xml::events::{BytesStart, Event};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Hex SHA-256 of the raw source bytes.
pub fn source_digest(bytes: &[u8]) -> String {
  hex::encode(Sha256::digest(bytes))
}

/// Read and parse a file. The object identifier is the file stem.
pub fn parse_file(path: &Path) -> Result<Document> {
  let bytes = std::fs::read(path)?;
  let mut doc = parse_document(&bytes)?;
  doc.object_id = path
    .file_stem()
    .map(|stem| stem.to_string_lossy().into_owned());
  Ok(doc)
}

/// Parse a complete document from bytes.
pub fn parse_document(xml: &[u8]) -> Result<Document> {
  let mut reader = quick_xml::Reader::from_reader(xml);
  reader.config_mut().trim_text(true);

  let mut stack: Vec<Element> = Vec::new();
  let mut root: Option<Element> = None;
  let mut buf = Vec::new();

  loop {
    match reader.read_event_into(&mut buf)? {
      Event::Start(ref e) => stack.push(open_element(e)?),
      Event::Empty(ref e) => {
        let element = open_element(e)?;
        close_element(element, &mut stack, &mut root)?;
      }
      Event::End(_) => {
        // quick-xml rejects mismatched end tags, so the top is the match.
        let element = stack
          .pop()
          .ok_or_else(|| Error::Xml("unexpected closing tag".into()))?;
        close_element(element, &mut stack, &mut root)?;
      }
      Event::Text(ref t) => {
        let text = t.unescape().map_err(|e| Error::Xml(e.to_string()))?;
        append_text(&mut stack, &text)?;
      }
      Event::CData(ref c) => {
        append_text(&mut stack, String::from_utf8_lossy(c).trim())?;
      }
      Event::Eof => break,
      // Declarations, comments, processing instructions, doctype.
      _ => {}
    }
    buf.clear();
  }

  if let Some(open) = stack.pop() {
    return Err(Error::Unbalanced(open.name));
  }
  let root = root.ok_or(Error::Empty)?;

  let mut doc = Document::new(root);
  doc.source_digest = Some(source_digest(xml));
  Ok(doc)
}

fn open_element(start: &BytesStart<'_>) -> Result<Element> {
  let name = start.name();
  let mut element = Element::new(decode(local_name(name.as_ref())));

  for attr in start.attributes() {
    let attr = attr.map_err(|e| Error::Xml(e.to_string()))?;
    let key = attr.key.as_ref();
    if key == b"xmlns" || key.starts_with(b"xmlns:") {
      continue;
    }
    let value = attr
      .unescape_value()
      .map_err(|e| Error::Xml(e.to_string()))?;
    element
      .attributes
      .push((decode(local_name(key)), value.into_owned()));
  }

  Ok(element)
}

fn close_element(
  element: Element,
  stack: &mut [Element],
  root: &mut Option<Element>,
) -> Result<()> {
  match stack.last_mut() {
    Some(parent) => parent.children.push(element),
    None if root.is_some() => return Err(Error::MultipleRoots),
    None => *root = Some(element),
  }
  Ok(())
}

fn append_text(stack: &mut [Element], text: &str) -> Result<()> {
  if text.is_empty() {
    return Ok(());
  }
  let Some(current) = stack.last_mut() else {
    return Err(Error::Xml("text outside the root element".into()));
  };
  match &mut current.text {
    Some(existing) => existing.push_str(text),
    None => current.text = Some(text.to_owned()),
  }
  Ok(())
}

fn local_name(name: &[u8]) -> &[u8] {
  // strip "prefix:" if present
  if let Some(pos) = name.iter().rposition(|&b| b == b':') {
    &name[pos + 1..]
  } else {
    name
  }
}

fn decode(bytes: &[u8]) -> String { String::from_utf8_lossy(bytes).into_owned() }
