//! Media type constants and helpers
//!
//! Media types are handled as plain strings. Comparisons ignore parameters
//! (`; charset=...`) and ASCII case.

use crate::utils::file_extension;

pub const EPUB: &str = "application/epub+zip";
pub const CBZ: &str = "application/vnd.comicbook+zip";
pub const CBR: &str = "application/vnd.comicbook-rar";
pub const ZIP: &str = "application/zip";
pub const NCX: &str = "application/x-dtbncx+xml";
pub const OPF: &str = "application/oebps-package+xml";
pub const XHTML: &str = "application/xhtml+xml";
pub const HTML: &str = "text/html";
pub const ACBF: &str = "application/vnd.comicbook+xml";

/// Bitmap media types recognized as images of an image publication
pub const BITMAPS: [&str; 8] = [
    "image/avif",
    "image/bmp",
    "image/gif",
    "image/jpeg",
    "image/jxl",
    "image/png",
    "image/tiff",
    "image/webp",
];

const EXTENSIONS: [(&str, &str); 36] = [
    ("acbf", ACBF),
    ("avif", "image/avif"),
    ("bmp", "image/bmp"),
    ("cbr", CBR),
    ("cbz", CBZ),
    ("css", "text/css"),
    ("epub", EPUB),
    ("gif", "image/gif"),
    ("htm", HTML),
    ("html", HTML),
    ("jpe", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("jpg", "image/jpeg"),
    ("js", "text/javascript"),
    ("json", "application/json"),
    ("jxl", "image/jxl"),
    ("m4a", "audio/mp4"),
    ("mp3", "audio/mpeg"),
    ("ncx", NCX),
    ("opf", OPF),
    ("otf", "font/otf"),
    ("pls", "application/pls+xml"),
    ("png", "image/png"),
    ("smil", "application/smil+xml"),
    ("svg", "image/svg+xml"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("ttf", "font/ttf"),
    ("txt", "text/plain"),
    ("webp", "image/webp"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("xht", XHTML),
    ("xhtml", XHTML),
    ("xml", "application/xml"),
    ("zip", ZIP),
];

/// Returns the media type associated with the extension of `path`
pub fn from_path(path: &str) -> Option<&'static str> {
    let extension = file_extension(path)?;
    EXTENSIONS
        .iter()
        .find(|(candidate, _)| *candidate == extension)
        .map(|(_, media_type)| *media_type)
}

/// Guesses the media type of a resource from its leading bytes
pub fn sniff(data: &[u8]) -> Option<&'static str> {
    infer::get(data).map(|kind| kind.mime_type())
}

/// Returns the media type without its parameters, in lowercase
pub fn essence(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Checks whether two media types designate the same type, ignoring parameters
pub fn matches(media_type: &str, expected: &str) -> bool {
    essence(media_type) == essence(expected)
}

pub fn is_bitmap(media_type: &str) -> bool {
    let essence = essence(media_type);
    BITMAPS.contains(&essence.as_str())
}

#[cfg(test)]
mod tests {
    use crate::mediatype::{self, NCX};

    #[test]
    fn test_from_path() {
        assert_eq!(mediatype::from_path("a/b/Page01.JPG"), Some("image/jpeg"));
        assert_eq!(mediatype::from_path("OEBPS/toc.ncx"), Some(NCX));
        assert_eq!(mediatype::from_path("setup.exe"), None);
        assert_eq!(mediatype::from_path("mimetype"), None);
    }

    #[test]
    fn test_matches_ignores_parameters_and_case() {
        assert!(mediatype::matches(
            "Application/X-DTBNCX+XML; charset=utf-8",
            NCX
        ));
        assert!(!mediatype::matches("application/xhtml+xml", NCX));
    }

    #[test]
    fn test_is_bitmap() {
        assert!(mediatype::is_bitmap("image/png"));
        assert!(mediatype::is_bitmap("image/jpeg; q=0.9"));
        assert!(!mediatype::is_bitmap("image/svg+xml"));
        assert!(!mediatype::is_bitmap("application/xml"));
    }

    #[test]
    fn test_sniff_png_signature() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];
        assert_eq!(mediatype::sniff(&png), Some("image/png"));
        assert_eq!(mediatype::sniff(b"plain"), None);
    }
}
