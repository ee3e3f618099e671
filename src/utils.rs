use std::{borrow::Cow, collections::HashMap};

use log::warn;
use percent_encoding::percent_decode_str;
use quick_xml::{NsReader, escape::unescape, events::Event};

use crate::error::PublicationError;

/// Namespace prefix bindings used when reading an XML document
///
/// Each entry maps a namespace URI to the prefix the parsers of this library expect,
/// whatever prefix the document itself declares for it.
pub type NamespaceBindings<'a> = &'a [(&'a str, &'a str)];

/// Provides functionality to decode byte data into strings
///
/// This trait is primarily used to decode raw byte data (such as
/// text files read from a container) into a suitable string representation.
/// It supports automatic detection of multiple encoding formats,
/// including UTF-8 (with or without BOM), UTF-16 BE, and UTF-16 LE.
///
/// ## Notes
/// - When attempting to parse a byte stream lacking a BOM (Byte Order Mark), the parsing
///   results may be unreadable; caution should be exercised when using such streams.
pub trait DecodeBytes {
    fn decode(&self) -> Result<String, PublicationError>;
}

impl DecodeBytes for Vec<u8> {
    fn decode(&self) -> Result<String, PublicationError> {
        if self.is_empty() || self.len() < 4 {
            return Err(PublicationError::EmptyDataError);
        }

        match self[0..3] {
            // Check UTF-8 BOM (0xEF, 0xBB, 0xBF)
            [0xEF, 0xBB, 0xBF, ..] => {
                String::from_utf8(self[3..].to_vec()).map_err(PublicationError::from)
            }

            // Check UTF-16 BE BOM (0xFE, 0xFF)
            [0xFE, 0xFF, ..] => {
                let utf16_units: Vec<u16> = self[2..]
                    .chunks_exact(2)
                    .map(|b| u16::from_be_bytes([b[0], b[1]]))
                    .collect();

                String::from_utf16(&utf16_units).map_err(PublicationError::from)
            }

            // Check UTF-16 LE BOM (0xFF, 0xFE)
            [0xFF, 0xFE, ..] => {
                let utf16_units: Vec<u16> = self[2..]
                    .chunks_exact(2)
                    .map(|b| u16::from_le_bytes([b[0], b[1]]))
                    .collect();

                String::from_utf16(&utf16_units).map_err(PublicationError::from)
            }

            // Try without BOM
            _ => {
                if let Ok(utf8_str) = String::from_utf8(self.to_vec()) {
                    return Ok(utf8_str);
                }

                if self.len() % 2 == 0 {
                    let utf16_units: Vec<u16> = self
                        .chunks_exact(2)
                        .map(|b| u16::from_be_bytes([b[0], b[1]]))
                        .collect();

                    if let Ok(utf16_str) = String::from_utf16(&utf16_units) {
                        return Ok(utf16_str);
                    }
                }

                // Final fallback
                Ok(String::from_utf8_lossy(self).to_string())
            }
        }
    }
}

/// Provides functionality for normalizing whitespace characters
///
/// Collapses every run of whitespace into a single space and trims both ends.
pub trait NormalizeWhitespace {
    fn normalize_whitespace(&self) -> String;
}

impl NormalizeWhitespace for &str {
    fn normalize_whitespace(&self) -> String {
        self.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl NormalizeWhitespace for String {
    fn normalize_whitespace(&self) -> String {
        self.as_str().normalize_whitespace()
    }
}

/// Resolves `href` against the location of the document `base_file`
///
/// Both paths are relative to the root of the container. Absolute hrefs are taken
/// relative to the root, `.` segments are dropped and `..` segments climb one
/// directory; climbing above the root stops at the root. A fragment-only href
/// resolves to the base document itself. The path part is percent-decoded, so
/// the result names the archive entry; the fragment is kept as written.
pub fn resolve_href(base_file: &str, href: &str) -> String {
    let (path, fragment) = match href.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (href, None),
    };
    let path = percent_decode(path);

    let mut segments: Vec<&str> = Vec::new();
    if path.is_empty() {
        segments.extend(base_file.split('/').filter(|segment| !segment.is_empty()));
    } else {
        if !path.starts_with('/') {
            if let Some((directory, _)) = base_file.rsplit_once('/') {
                segments.extend(directory.split('/').filter(|segment| !segment.is_empty()));
            }
        }

        for segment in path.split('/') {
            match segment {
                "" | "." => continue,
                ".." => {
                    if segments.pop().is_none() {
                        warn!(
                            "Href \"{}\" escapes the container root of \"{}\".",
                            href, base_file
                        );
                    }
                }
                _ => segments.push(segment),
            }
        }
    }

    let mut resolved = segments.join("/");
    if let Some(fragment) = fragment {
        resolved.push('#');
        resolved.push_str(fragment);
    }
    resolved
}

/// Percent-decodes a path, keeping it as written when it does not decode to UTF-8
pub fn percent_decode(path: &str) -> Cow<'_, str> {
    percent_decode_str(path)
        .decode_utf8()
        .unwrap_or(Cow::Borrowed(path))
}

/// Returns the lowercase extension of the last path segment, without the dot
pub fn file_extension(path: &str) -> Option<String> {
    let name = file_name(path);
    name.rsplit_once('.')
        .filter(|(stem, extension)| !stem.is_empty() && !extension.is_empty())
        .map(|(_, extension)| extension.to_ascii_lowercase())
}

/// Returns the last segment of a `/` separated path
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Checks whether an archive entry is a hidden file or an OS thumbnail cache
///
/// Hidden files are the ones whose name starts with a dot, such as `.DS_Store`
/// or the `._` resource forks written by macOS archivers.
pub fn is_hidden_or_thumbs(path: &str) -> bool {
    let name = file_name(path);
    name.starts_with('.') || name.eq_ignore_ascii_case("thumbs.db")
}

/// Represents an element node in an XML document
#[derive(Debug)]
pub struct XmlElement {
    /// The local name of the element(excluding namespace prefix)
    pub name: String,

    /// The namespace prefix of the element
    ///
    /// When the document is read with namespace bindings, this is the bound prefix
    /// rather than the one written in the document.
    pub prefix: Option<String>,

    /// The namespace of the element
    pub namespace: Option<String>,

    /// The attributes of the element
    ///
    /// The key is the attribute name, the value is the unescaped attribute value
    pub attributes: HashMap<String, String>,

    /// The text content of the element
    pub text: Option<String>,

    /// The CDATA content of the element
    pub cdata: Option<String>,

    /// The children of the element
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    /// Create a new element
    pub fn new(name: String) -> Self {
        Self {
            name,
            prefix: None,
            namespace: None,
            attributes: HashMap::new(),
            text: None,
            cdata: None,
            children: Vec::new(),
        }
    }

    /// Get the full tag name of the element
    ///
    /// If the element has a namespace prefix, return "prefix:name" format;
    /// otherwise, return only the element name.
    pub fn tag_name(&self) -> String {
        if let Some(prefix) = &self.prefix {
            format!("{}:{}", prefix, self.name)
        } else {
            self.name.clone()
        }
    }

    /// Gets the text content of the element and all its child elements
    ///
    /// Collects the text content of the current element and the text content of
    /// all its child elements, removing leading and trailing whitespace.
    pub fn text(&self) -> String {
        let mut result = String::new();

        if let Some(text_value) = &self.text {
            result.push_str(text_value);
        }

        for child in &self.children {
            let child_text = child.text();
            if !child_text.is_empty() {
                if !result.is_empty() {
                    result.push(' ');
                }
                result.push_str(&child_text);
            }
        }

        result.trim().to_string()
    }

    /// Returns the value of the specified attribute
    pub fn get_attr(&self, name: &str) -> Option<String> {
        self.attributes.get(name).cloned()
    }

    /// Checks whether the element lives in `namespace`
    pub fn is_in_namespace(&self, namespace: &str) -> bool {
        self.namespace.as_deref() == Some(namespace)
    }

    /// Find all elements with the specified name, the element itself included
    pub fn find_elements_by_name(&self, name: &str) -> impl Iterator<Item = &XmlElement> {
        SearchElementsByNameIter::new(self, name)
    }

    /// Find all elements with the specified name among the child elements of the current element
    pub fn find_children_by_name(&self, name: &str) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Find all elements with the specified name list among the child elements of the current element
    pub fn find_children_by_names(&self, names: &[&str]) -> impl Iterator<Item = &XmlElement> {
        self.children
            .iter()
            .filter(move |child| names.contains(&child.name.as_str()))
    }

    /// Get children elements
    pub fn children(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter()
    }
}

struct SearchElementsByNameIter<'a> {
    elements: Vec<&'a XmlElement>,
    current_index: usize,
    target_name: String,
}

impl<'a> SearchElementsByNameIter<'a> {
    fn new(root: &'a XmlElement, name: &str) -> Self {
        let mut elements = Vec::new();
        Self::collect_elements(root, &mut elements);
        Self {
            elements,
            current_index: 0,
            target_name: name.to_string(),
        }
    }

    fn collect_elements(element: &'a XmlElement, collection: &mut Vec<&'a XmlElement>) {
        collection.push(element);
        for child in &element.children {
            Self::collect_elements(child, collection);
        }
    }
}

impl<'a> Iterator for SearchElementsByNameIter<'a> {
    type Item = &'a XmlElement;

    fn next(&mut self) -> Option<Self::Item> {
        while self.current_index < self.elements.len() {
            let element = self.elements[self.current_index];
            self.current_index += 1;
            if element.name == self.target_name {
                return Some(element);
            }
        }
        None
    }
}

/// XML parser used to parse XML content and build an XML element tree
pub struct XmlReader {}

impl XmlReader {
    /// Parses an XML from string and builds the root element
    ///
    /// Element and attribute prefixes are kept as written in the document.
    pub fn parse(content: &str) -> Result<XmlElement, PublicationError> {
        Self::parse_with_namespaces(content, &[])
    }

    /// Parses an XML from string, rebinding prefixes of known namespaces
    ///
    /// Every element or attribute whose namespace appears in `bindings` gets the
    /// bound prefix, so `<opf:package>` and `<package xmlns="…opf">` are both
    /// read as `opf:package`, and `ops:type` is read as `epub:type` when the
    /// OPS namespace is bound to `epub`.
    ///
    /// ## Parameters
    /// - `content`: The XML string to be parsed
    /// - `bindings`: Namespace URI to prefix bindings
    ///
    /// ## Return
    /// - `Ok(XmlElement)`: The root element of the XML element tree
    /// - `Err(PublicationError)`: An error occurred during parsing
    pub fn parse_with_namespaces(
        content: &str,
        bindings: NamespaceBindings,
    ) -> Result<XmlElement, PublicationError> {
        if content.is_empty() {
            return Err(PublicationError::EmptyDataError);
        }

        // Create a XML reader with namespace support
        let mut reader = NsReader::from_str(content);
        reader.config_mut().trim_text(false);

        let mut buf = Vec::new();
        let mut stack = Vec::<XmlElement>::new();
        let mut root = None;
        let mut namespace_map = HashMap::new();

        loop {
            buf.clear();
            match reader.read_event_into(&mut buf) {
                Ok(Event::Eof) => break,

                Ok(Event::Start(e)) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                    let prefix = e
                        .name()
                        .prefix()
                        .map(|prefix| String::from_utf8_lossy(prefix.as_ref()).to_string());
                    let attributes = e
                        .attributes()
                        .flatten()
                        .map(|attr| {
                            (
                                String::from_utf8_lossy(attr.key.as_ref()).to_string(),
                                String::from_utf8_lossy(&attr.value).to_string(),
                            )
                        })
                        .collect::<Vec<_>>();

                    stack.push(Self::build_element(
                        name,
                        prefix,
                        attributes,
                        &mut namespace_map,
                    ));
                }

                Ok(Event::End(_)) => {
                    if let Some(element) = stack.pop() {
                        // If the stack is empty,
                        // the current element is the root element
                        if stack.is_empty() {
                            root = Some(element);
                        } else if let Some(parent) = stack.last_mut() {
                            parent.children.push(element);
                        }
                    }
                }

                // Self-closing element
                Ok(Event::Empty(e)) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                    let prefix = e
                        .name()
                        .prefix()
                        .map(|prefix| String::from_utf8_lossy(prefix.as_ref()).to_string());
                    let attributes = e
                        .attributes()
                        .flatten()
                        .map(|attr| {
                            (
                                String::from_utf8_lossy(attr.key.as_ref()).to_string(),
                                String::from_utf8_lossy(&attr.value).to_string(),
                            )
                        })
                        .collect::<Vec<_>>();

                    let element =
                        Self::build_element(name, prefix, attributes, &mut namespace_map);
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => root = Some(element),
                    }
                }

                Ok(Event::Text(e)) => {
                    if let Some(element) = stack.last_mut() {
                        let text = String::from_utf8_lossy(e.as_ref()).to_string();
                        if !text.trim().is_empty() {
                            Self::append_text(element, &text);
                        }
                    }
                }

                // Entity and character references between text nodes
                Ok(Event::GeneralRef(e)) => {
                    if let Some(element) = stack.last_mut() {
                        let reference = format!("&{};", String::from_utf8_lossy(e.as_ref()));
                        let text = unescape(&reference)
                            .map(|text| text.into_owned())
                            .unwrap_or(reference);
                        Self::append_text(element, &text);
                    }
                }

                Ok(Event::CData(e)) => {
                    if let Some(element) = stack.last_mut() {
                        element.cdata = Some(String::from_utf8_lossy(e.as_ref()).to_string());
                    }
                }

                Err(err) => return Err(err.into()),

                // Ignore the following events (elements):
                // Comment, PI, Declaration, Doctype
                _ => continue,
            }
        }

        if let Some(element) = root.as_mut() {
            Self::assign_namespace(element, &namespace_map, bindings);
        }

        root.ok_or(PublicationError::FailedParsingXml)
    }

    /// Parse XML from bytes and builds the root element
    pub fn parse_bytes(
        bytes: Vec<u8>,
        bindings: NamespaceBindings,
    ) -> Result<XmlElement, PublicationError> {
        let content = bytes.decode()?;
        Self::parse_with_namespaces(&content, bindings)
    }

    fn build_element(
        name: String,
        prefix: Option<String>,
        attributes: Vec<(String, String)>,
        namespace_map: &mut HashMap<String, String>,
    ) -> XmlElement {
        let mut element = XmlElement::new(name);
        element.prefix = prefix;

        for (attr_key, attr_value) in attributes {
            let attr_value = match unescape(&attr_value) {
                Ok(value) => value.into_owned(),
                Err(_) => attr_value,
            };

            // Handle namespace attributes
            if attr_key == "xmlns" {
                namespace_map.insert(attr_key, attr_value);
                continue;
            }
            if let Some(declared_prefix) = attr_key.strip_prefix("xmlns:") {
                namespace_map.insert(declared_prefix.to_string(), attr_value);
                continue;
            }

            element.attributes.insert(attr_key, attr_value);
        }

        element
    }

    fn append_text(element: &mut XmlElement, text: &str) {
        match element.text.as_mut() {
            Some(existing) => existing.push_str(text),
            None => element.text = Some(text.to_string()),
        }
    }

    /// Assign namespace to element recursively, rebinding known prefixes
    ///
    /// ## Parameters
    /// - `element`: The element to assign namespace
    /// - `namespace_map`: The prefix-namespace map declared by the document
    /// - `bindings`: The namespace-prefix bindings requested by the caller
    fn assign_namespace(
        element: &mut XmlElement,
        namespace_map: &HashMap<String, String>,
        bindings: NamespaceBindings,
    ) {
        let namespace = match &element.prefix {
            Some(prefix) => namespace_map.get(prefix),
            None => namespace_map.get("xmlns"),
        };

        if let Some(namespace) = namespace {
            element.namespace = Some(namespace.clone());
            if let Some((_, bound)) = bindings.iter().find(|(uri, _)| uri == namespace) {
                element.prefix = Some(bound.to_string());
            }
        }

        if !bindings.is_empty() {
            let attributes = std::mem::take(&mut element.attributes);
            element.attributes = attributes
                .into_iter()
                .map(|(key, value)| {
                    let rebound = key.split_once(':').and_then(|(prefix, local)| {
                        let namespace = namespace_map.get(prefix)?;
                        bindings
                            .iter()
                            .find(|(uri, _)| uri == namespace)
                            .map(|(_, bound)| format!("{}:{}", bound, local))
                    });
                    (rebound.unwrap_or(key), value)
                })
                .collect();
        }

        for child in element.children.iter_mut() {
            Self::assign_namespace(child, namespace_map, bindings);
        }
    }
}
