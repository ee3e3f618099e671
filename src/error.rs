//! Error Type Definition Module
//!
//! This module defines the error types that may be encountered while opening a
//! publication, fetching its resources and assembling its manifest. All errors are
//! uniformly wrapped in the `PublicationError` enumeration for convenient error
//! handling by the caller.
//!
//! Note that several situations are deliberately *not* errors: an asset that is not
//! in the format a parser handles is reported as `Ok(None)`, and missing optional
//! documents (navigation, encryption, display options) degrade to empty results.

use thiserror::Error;

/// Types of errors that can occur while parsing a publication
#[derive(Debug, Error)]
pub enum PublicationError {
    /// ZIP archive related errors
    ///
    /// Errors occur when processing the ZIP structure of the publication container,
    /// such as file corruption, unreadability, etc.
    #[error("Archive error: {source}")]
    ArchiveError { source: zip::result::ZipError },

    /// Data Decoding Error - Null data
    ///
    /// This error occurs when trying to decode an empty stream.
    #[error("Decode error: The data is empty.")]
    EmptyDataError,

    /// XML parsing failure error
    ///
    /// This error occurs when the event stream of an XML document ends without
    /// producing a root element.
    #[error(
        "Failed parsing XML error: Unknown problems occurred during XML parsing, causing parsing failure."
    )]
    FailedParsingXml,

    /// Invalid package document error
    ///
    /// The publication claims to be an EPUB and its package document was located,
    /// but it could not be fetched or parsed.
    #[error("Invalid package document \"{path}\": {source}")]
    InvalidPackageDocument {
        path: String,
        source: Box<PublicationError>,
    },

    #[error("IO error: {source}")]
    IOError { source: std::io::Error },

    /// Missing required attribute error
    ///
    /// Triggered when an XML element lacks an attribute the format requires.
    #[error(
        "Missing required attribute: The \"{attribute}\" attribute is a must attribute for the \"{tag}\" element."
    )]
    MissingRequiredAttribute { tag: String, attribute: String },

    /// Mutex error
    ///
    /// This error occurs when a mutex is poisoned, which means
    /// that a thread has panicked while holding a lock on the mutex.
    #[error("Mutex error: Mutex was poisoned.")]
    MutexError,

    /// No bitmap error
    ///
    /// An image publication was accepted, but after filtering there is no bitmap
    /// left to build a reading order from.
    #[error("No bitmap found: The publication does not contain any bitmap resource.")]
    NoBitmapFound,

    /// Non-canonical EPUB structure error
    ///
    /// This error occurs when an EPUB file lacks some files or directory
    /// structure that is required in EPUB specification.
    #[error("Non-canonical epub: The \"{expected_file}\" file was not found.")]
    NonCanonicalEpub { expected_file: String },

    /// Non-canonical file structure error
    ///
    /// This error is triggered when the required XML elements in the
    /// specification are missing from a document.
    #[error("Non-canonical file: The \"{tag}\" elements was not found.")]
    NonCanonicalFile { tag: String },

    /// Relative link leak error
    ///
    /// This error occurs when a path points outside of the container,
    /// which is a security protection mechanism.
    #[error("Relative link leakage: Path \"{path}\" is out of container range.")]
    RelativeLinkLeakage { path: String },

    /// Unable to find the resource error
    ///
    /// This error occurs when an attempt is made to get a resource
    /// but it does not exist in the container.
    #[error("Resource not found: Unable to find resource from \"{resource}\".")]
    ResourceNotFound { resource: String },

    /// Unsupported format error
    ///
    /// None of the configured parsers recognized the asset.
    #[error("Unsupported format: No parser accepts the publication \"{name}\".")]
    UnsupportedFormat { name: String },

    /// Unusable compression method error
    ///
    /// This error occurs when an archive uses an unsupported compression method.
    #[error(
        "Unusable compression method: The \"{file}\" file uses the unsupported \"{method}\" compression method."
    )]
    UnusableCompressionMethod { file: String, method: String },

    /// UTF-8 decoding error
    #[error("Decode error: {source}")]
    Utf8DecodeError { source: std::string::FromUtf8Error },

    /// UTF-16 decoding error
    #[error("Decode error: {source}")]
    Utf16DecodeError { source: std::string::FromUtf16Error },

    /// WalkDir error
    ///
    /// This error occurs when using the WalkDir library to traverse a directory.
    #[cfg(feature = "directory")]
    #[error("WalkDir error: {source}")]
    WalkDirError { source: walkdir::Error },

    /// QuickXml error
    ///
    /// This error occurs when parsing XML data using the QuickXml library.
    #[error("QuickXml error: {source}")]
    QuickXmlError { source: quick_xml::Error },
}

impl PublicationError {
    /// Wraps a failure to read the package document at `path`
    pub(crate) fn invalid_package(path: &str, source: PublicationError) -> Self {
        PublicationError::InvalidPackageDocument {
            path: path.to_string(),
            source: Box::new(source),
        }
    }
}

impl From<zip::result::ZipError> for PublicationError {
    fn from(value: zip::result::ZipError) -> Self {
        PublicationError::ArchiveError { source: value }
    }
}

impl From<quick_xml::Error> for PublicationError {
    fn from(value: quick_xml::Error) -> Self {
        PublicationError::QuickXmlError { source: value }
    }
}

impl From<std::io::Error> for PublicationError {
    fn from(value: std::io::Error) -> Self {
        PublicationError::IOError { source: value }
    }
}

impl From<std::string::FromUtf8Error> for PublicationError {
    fn from(value: std::string::FromUtf8Error) -> Self {
        PublicationError::Utf8DecodeError { source: value }
    }
}

impl From<std::string::FromUtf16Error> for PublicationError {
    fn from(value: std::string::FromUtf16Error) -> Self {
        PublicationError::Utf16DecodeError { source: value }
    }
}

impl<T> From<std::sync::PoisonError<T>> for PublicationError {
    fn from(_value: std::sync::PoisonError<T>) -> Self {
        PublicationError::MutexError
    }
}

#[cfg(feature = "directory")]
impl From<walkdir::Error> for PublicationError {
    fn from(value: walkdir::Error) -> Self {
        PublicationError::WalkDirError { source: value }
    }
}

#[cfg(test)]
impl PartialEq for PublicationError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::InvalidPackageDocument {
                    path: l_path,
                    source: l_source,
                },
                Self::InvalidPackageDocument {
                    path: r_path,
                    source: r_source,
                },
            ) => l_path == r_path && l_source == r_source,
            (
                Self::MissingRequiredAttribute {
                    tag: l_tag,
                    attribute: l_attribute,
                },
                Self::MissingRequiredAttribute {
                    tag: r_tag,
                    attribute: r_attribute,
                },
            ) => l_tag == r_tag && l_attribute == r_attribute,
            (
                Self::NonCanonicalEpub {
                    expected_file: l_expected_file,
                },
                Self::NonCanonicalEpub {
                    expected_file: r_expected_file,
                },
            ) => l_expected_file == r_expected_file,
            (Self::NonCanonicalFile { tag: l_tag }, Self::NonCanonicalFile { tag: r_tag }) => {
                l_tag == r_tag
            }
            (
                Self::RelativeLinkLeakage { path: l_path },
                Self::RelativeLinkLeakage { path: r_path },
            ) => l_path == r_path,
            (
                Self::ResourceNotFound {
                    resource: l_resource,
                },
                Self::ResourceNotFound {
                    resource: r_resource,
                },
            ) => l_resource == r_resource,
            (Self::UnsupportedFormat { name: l_name }, Self::UnsupportedFormat { name: r_name }) => {
                l_name == r_name
            }
            (
                Self::UnusableCompressionMethod {
                    file: l_file,
                    method: l_method,
                },
                Self::UnusableCompressionMethod {
                    file: r_file,
                    method: r_method,
                },
            ) => l_file == r_file && l_method == r_method,
            (
                Self::Utf8DecodeError { source: l_source },
                Self::Utf8DecodeError { source: r_source },
            ) => l_source == r_source,

            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::PublicationError;

    #[test]
    fn test_invalid_package_wraps_source() {
        let error = PublicationError::invalid_package(
            "OEBPS/content.opf",
            PublicationError::NonCanonicalFile {
                tag: "manifest".to_string(),
            },
        );

        assert_eq!(
            error.to_string(),
            "Invalid package document \"OEBPS/content.opf\": Non-canonical file: The \"manifest\" elements was not found."
        );
    }

    #[test]
    fn test_poison_error_maps_to_mutex_error() {
        let mutex = std::sync::Mutex::new(0);
        let _ = std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    let _guard = mutex.lock().unwrap();
                    panic!("poison");
                })
                .join()
        });

        let error: PublicationError = mutex.lock().unwrap_err().into();
        assert_eq!(error, PublicationError::MutexError);
    }
}
