//! The parsed document tree the pipeline starts from.
//!
//! Element names are local names: namespace prefixes are stripped by the
//! reader. A [`Locator`] addresses elements by the slash-joined path of names
//! from the root and carries no positional indices, so every occurrence of a
//! repeated element shares one locator.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Locator ─────────────────────────────────────────────────────────────────

/// A path-like position in a document, e.g. `/Return/ReturnHeader/Filer/EIN`.
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Locator(String);

impl Locator {
  /// The locator of a document's root element.
  pub fn root(name: &str) -> Self { Self(format!("/{name}")) }

  /// The locator of a child element named `name`.
  pub fn child(&self, name: &str) -> Self { Self(format!("{}/{name}", self.0)) }

  /// Parse a locator string. It must start with `/` and contain no empty
  /// segments.
  pub fn parse(s: &str) -> Result<Self> {
    let valid = s.len() > 1
      && s.starts_with('/')
      && s[1..].split('/').all(|seg| !seg.is_empty());
    if valid {
      Ok(Self(s.to_owned()))
    } else {
      Err(Error::InvalidLocator(s.to_owned()))
    }
  }

  pub fn as_str(&self) -> &str { &self.0 }

  pub fn segments(&self) -> impl Iterator<Item = &str> {
    self.0[1..].split('/')
  }

  /// The final segment: the element's own name.
  pub fn leaf(&self) -> &str {
    self.0.rsplit('/').next().unwrap_or(&self.0)
  }

  pub fn depth(&self) -> usize { self.segments().count() }
}

impl fmt::Display for Locator {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl TryFrom<String> for Locator {
  type Error = Error;

  fn try_from(value: String) -> Result<Self> { Self::parse(&value) }
}

impl From<Locator> for String {
  fn from(value: Locator) -> Self { value.0 }
}

// ─── Element ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
  pub name:       String,
  pub attributes: Vec<(String, String)>,
  /// Character data directly inside this element, already trimmed.
  pub text:       Option<String>,
  pub children:   Vec<Element>,
}

impl Element {
  pub fn new(name: impl Into<String>) -> Self {
    Self { name: name.into(), ..Self::default() }
  }

  pub fn leaf(name: impl Into<String>, text: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      text: Some(text.into()),
      ..Self::default()
    }
  }

  pub fn with_child(mut self, child: Element) -> Self {
    self.children.push(child);
    self
  }

  pub fn with_attribute(
    mut self,
    name: impl Into<String>,
    value: impl Into<String>,
  ) -> Self {
    self.attributes.push((name.into(), value.into()));
    self
  }

  pub fn is_leaf(&self) -> bool { self.children.is_empty() }

  /// Non-empty text content, if any.
  pub fn text(&self) -> Option<&str> {
    self
      .text
      .as_deref()
      .map(str::trim)
      .filter(|t| !t.is_empty())
  }

  pub fn attribute(&self, name: &str) -> Option<&str> {
    self
      .attributes
      .iter()
      .find(|(k, _)| k == name)
      .map(|(_, v)| v.as_str())
  }

  /// The first child named `name`.
  pub fn child(&self, name: &str) -> Option<&Element> {
    self.children.iter().find(|c| c.name == name)
  }

  /// Preorder search for the first descendant (or self) named `name`.
  pub fn find_by_name(&self, name: &str) -> Option<&Element> {
    if self.name == name {
      return Some(self);
    }
    self.children.iter().find_map(|c| c.find_by_name(name))
  }
}

// ─── Document ────────────────────────────────────────────────────────────────

/// A parsed filing document plus provenance collected by the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
  pub root:          Element,
  /// Identifier of the source object (typically the file stem).
  pub object_id:     Option<String>,
  /// Hex SHA-256 of the source bytes.
  pub source_digest: Option<String>,
}

impl Document {
  pub fn new(root: Element) -> Self {
    Self { root, object_id: None, source_digest: None }
  }

  pub fn with_object_id(mut self, object_id: impl Into<String>) -> Self {
    self.object_id = Some(object_id.into());
    self
  }

  pub fn root_locator(&self) -> Locator { Locator::root(&self.root.name) }

  /// Follow `path` (slash-separated names below the root, e.g.
  /// `ReturnHeader/Filer/EIN`) taking the first matching child at each step.
  pub fn at(&self, path: &str) -> Option<&Element> {
    path
      .split('/')
      .filter(|s| !s.is_empty())
      .try_fold(&self.root, |el, name| el.child(name))
  }

  /// Resolve an absolute locator against this document.
  pub fn find(&self, locator: &Locator) -> Option<&Element> {
    let mut segments = locator.segments();
    if segments.next()? != self.root.name {
      return None;
    }
    segments.try_fold(&self.root, |el, name| el.child(name))
  }

  pub fn find_by_name(&self, name: &str) -> Option<&Element> {
    self.root.find_by_name(name)
  }
}
