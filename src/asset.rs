use std::{fs, path::Path};

use crate::{error::PublicationError, mediatype};

/// The file a publication is opened from, as seen by the parsers
///
/// Parsers use the declared media type to decide whether they handle the asset,
/// and the name as a last-resort title.
#[derive(Debug, Clone, PartialEq)]
pub struct PublicationAsset {
    /// File name of the asset, used as a fallback title
    pub name: String,

    /// Declared media type, if it could be determined
    pub media_type: Option<String>,
}

impl PublicationAsset {
    pub fn new(name: impl Into<String>, media_type: Option<&str>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.map(str::to_string),
        }
    }

    /// Creates an asset from a file or an exploded directory
    ///
    /// Files are identified by their extension. Directories are identified by the
    /// `mimetype` file an EPUB container carries at its root; other directories
    /// have no declared media type.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, PublicationError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());

        let metadata = fs::metadata(path)?;
        let media_type = if metadata.is_dir() {
            match fs::read_to_string(path.join("mimetype")) {
                Ok(content) if mediatype::matches(content.trim(), mediatype::EPUB) => {
                    Some(mediatype::EPUB.to_string())
                }
                _ => None,
            }
        } else {
            mediatype::from_path(&name).map(str::to_string)
        };

        Ok(Self { name, media_type })
    }

    /// Checks whether the declared media type designates `expected`
    pub fn is_media_type(&self, expected: &str) -> bool {
        self.media_type
            .as_deref()
            .is_some_and(|media_type| mediatype::matches(media_type, expected))
    }
}
