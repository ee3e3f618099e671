use std::collections::HashMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

/// JSON-LD context of every manifest produced by this library
pub const WEBPUB_MANIFEST_CONTEXT: &str = "https://readium.org/webpub-manifest/context.jsonld";

/// Mapping from a navigation role (`toc`, `page-list`, `landmarks`, ...) to its ordered links
pub type NavigationMap = IndexMap<String, Vec<Link>>;

/// Mapping from a container-relative href to the encryption applied to that resource
pub type EncryptionMap = HashMap<String, Encryption>;

/// Flat vendor display options, in document order
pub type DisplayOptions = IndexMap<String, String>;

/// Conformance profile of a manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Reflowable or fixed-layout EPUB publication
    Epub,

    /// Image sequence publication (comics, manga, ...)
    Divina,
}

impl Profile {
    /// Returns the profile URI
    pub fn uri(&self) -> &'static str {
        match self {
            Profile::Epub => "https://readium.org/webpub-manifest/profiles/epub",
            Profile::Divina => "https://readium.org/webpub-manifest/profiles/divina",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadingProgression {
    #[default]
    Auto,
    Ltr,
    Rtl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Reflowable,
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Auto,
    Landscape,
    Portrait,
}

/// Rendering hints collected from the package document and vendor display options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Presentation {
    pub layout: Option<Layout>,
    pub orientation: Option<Orientation>,
    pub spread: Option<String>,
}

/// A string with optional translations
///
/// The key `None` holds the value whose language is not declared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalizedString {
    translations: IndexMap<Option<String>, String>,
}

impl LocalizedString {
    /// Creates a localized string with a single, language-less value
    pub fn from_string(value: impl Into<String>) -> Self {
        let mut translations = IndexMap::new();
        translations.insert(None, value.into());
        Self { translations }
    }

    pub fn insert(&mut self, language: Option<String>, value: impl Into<String>) {
        self.translations.insert(language, value.into());
    }

    /// Returns the language-less value, or the first translation if there is none
    pub fn value(&self) -> Option<&str> {
        self.translations
            .get(&None)
            .or_else(|| self.translations.values().next())
            .map(String::as_str)
    }

    pub fn get(&self, language: &str) -> Option<&str> {
        self.translations
            .get(&Some(language.to_string()))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.translations.is_empty()
    }
}

/// Represents encryption information for one resource
///
/// Built from an `EncryptedData` record of `META-INF/encryption.xml`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Encryption {
    /// The encryption algorithm URI
    ///
    /// Font obfuscation algorithms handled by this library:
    /// - IDPF font obfuscation: "http://www.idpf.org/2008/embedding"
    /// - Adobe font obfuscation: "http://ns.adobe.com/pdf/enc#RC"
    pub algorithm: String,

    /// Compression applied before encryption, e.g. "deflate"
    pub compression: Option<String>,

    /// Length of the resource before compression and encryption
    pub original_length: Option<u64>,

    /// Identifies the DRM scheme the resource is protected with, if any
    pub scheme: Option<String>,
}

/// One addressable resource of a publication
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Link {
    /// Reference relative to the root of the container
    pub href: String,

    pub media_type: Option<String>,

    pub title: Option<String>,

    /// Relations, e.g. "cover"
    pub rels: Vec<String>,

    /// Format specific markers, e.g. "nav" for the EPUB navigation document
    pub properties: Vec<String>,

    /// Present when the resource is declared in the encryption descriptor
    pub encrypted: Option<Encryption>,

    /// Nested links, used by navigation entries
    pub children: Vec<Link>,
}

impl Link {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            ..Default::default()
        }
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    pub fn has_rel(&self, rel: &str) -> bool {
        self.rels.iter().any(|item| item == rel)
    }

    pub fn has_property(&self, property: &str) -> bool {
        self.properties.iter().any(|item| item == property)
    }

    /// Returns the href without its fragment
    pub fn path(&self) -> &str {
        self.href.split('#').next().unwrap_or_default()
    }
}

/// Descriptive metadata of a publication
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub identifier: Option<String>,
    pub title: LocalizedString,
    pub languages: Vec<String>,
    pub authors: Vec<String>,
    pub publishers: Vec<String>,
    pub description: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub conforms_to: Vec<Profile>,
    pub reading_progression: ReadingProgression,
    pub presentation: Presentation,
}

/// The canonical, format-agnostic representation of a publication
///
/// A manifest is created by exactly one parser and is not modified once it has been
/// handed to a [`PublicationBuilder`](crate::publication::PublicationBuilder).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub context: Vec<String>,
    pub metadata: Metadata,

    /// Primary linear content, in reading order
    pub reading_order: Vec<Link>,

    /// Every other resource of the publication
    pub resources: Vec<Link>,

    pub navigation: NavigationMap,
}

impl Manifest {
    /// Iterates over the reading order followed by the resources
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.reading_order.iter().chain(self.resources.iter())
    }

    pub fn link_with_href(&self, href: &str) -> Option<&Link> {
        self.links().find(|link| link.path() == href)
    }

    /// Returns the first link tagged with the `cover` relation
    pub fn cover(&self) -> Option<&Link> {
        self.links().find(|link| link.has_rel("cover"))
    }

    pub fn table_of_contents(&self) -> &[Link] {
        self.navigation
            .get("toc")
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}
