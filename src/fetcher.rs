//! Resource access
//!
//! A [`Fetcher`] gives parsers access to the resources of a publication container
//! without them knowing how the container is stored. Parsers only ever read
//! through this trait; they never touch the file system or the archive directly.
//!
//! ## Implementations
//!
//! - [`ZipFetcher`]: resources of a ZIP based container (EPUB, CBZ, plain ZIP)
//! - [`DirectoryFetcher`]: resources of an exploded container on disk
//!   (requires the `directory` feature)
//! - [`TransformingFetcher`]: wraps another fetcher and passes every read through
//!   a [`ResourceTransformer`]

use std::{
    borrow::Cow,
    fs::File,
    io::{BufReader, Read, Seek},
    path::Path,
    sync::{Arc, Mutex},
};

use zip::{CompressionMethod, ZipArchive};

use crate::{
    error::PublicationError,
    mediatype,
    types::Link,
    utils::{NamespaceBindings, XmlElement, XmlReader, percent_decode},
};

/// Number of leading bytes read to sniff the media type of an entry without extension
const SNIFF_LENGTH: u64 = 512;

/// Read access to the resources of a publication container
///
/// All hrefs are relative to the root of the container and use `/` as separator.
/// A fragment (`#...`) in an href is ignored.
pub trait Fetcher: Send + Sync {
    /// Lists every resource of the container, in container order
    fn links(&self) -> Result<Vec<Link>, PublicationError>;

    /// Reads the full content of a resource
    fn get(&self, href: &str) -> Result<Vec<u8>, PublicationError>;

    /// Returns the length of a resource in bytes
    fn length(&self, href: &str) -> Result<u64, PublicationError> {
        self.get(href).map(|data| data.len() as u64)
    }

    /// Reads a resource and parses it as an XML document
    ///
    /// ## Parameters
    /// - `href`: The resource to read
    /// - `bindings`: Namespace URI to prefix bindings applied while parsing
    fn read_as_xml(
        &self,
        href: &str,
        bindings: NamespaceBindings,
    ) -> Result<XmlElement, PublicationError> {
        XmlReader::parse_bytes(self.get(href)?, bindings)
    }
}

/// Removes the fragment and the leading slash of an href
fn entry_path(href: &str) -> &str {
    let path = href.split('#').next().unwrap_or_default();
    path.strip_prefix('/').unwrap_or(path)
}

/// Fetches resources from a ZIP archive
///
/// The archive is guarded by a mutex, since reading an entry needs mutable access
/// to the underlying reader.
pub struct ZipFetcher<R: Read + Seek> {
    archive: Mutex<ZipArchive<R>>,
}

impl<R: Read + Seek> ZipFetcher<R> {
    /// Creates a fetcher over a ZIP archive read from `reader`
    ///
    /// ## Return
    /// - `Ok(ZipFetcher)`: The archive was opened and all entries use a supported compression
    /// - `Err(PublicationError)`: The archive is unreadable or uses an unsupported compression method
    pub fn new(reader: R) -> Result<Self, PublicationError> {
        let mut archive = ZipArchive::new(reader)?;
        compression_method_check(&mut archive)?;

        Ok(Self {
            archive: Mutex::new(archive),
        })
    }
}

impl ZipFetcher<BufReader<File>> {
    /// Opens the ZIP archive at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PublicationError> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek + Send> Fetcher for ZipFetcher<R> {
    fn links(&self) -> Result<Vec<Link>, PublicationError> {
        let mut archive = self.archive.lock()?;

        let mut links = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let mut file = archive.by_index(index)?;
            if file.is_dir() {
                continue;
            }

            let href = entry_path(file.name()).to_string();
            let media_type = match mediatype::from_path(&href) {
                Some(media_type) => Some(media_type.to_string()),
                None => {
                    let mut head = Vec::new();
                    (&mut file).take(SNIFF_LENGTH).read_to_end(&mut head)?;
                    mediatype::sniff(&head).map(str::to_string)
                }
            };

            links.push(Link {
                href,
                media_type,
                ..Default::default()
            });
        }

        Ok(links)
    }

    fn get(&self, href: &str) -> Result<Vec<u8>, PublicationError> {
        let path = entry_path(href);
        let mut archive = self.archive.lock()?;

        let name = entry_name(&archive, path)?;
        let mut file = archive.by_name(&name)?;
        let mut buffer = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    fn length(&self, href: &str) -> Result<u64, PublicationError> {
        let path = entry_path(href);
        let mut archive = self.archive.lock()?;

        let name = entry_name(&archive, path)?;
        Ok(archive.by_name(&name)?.size())
    }
}

/// Returns the name of the archive entry `path` designates
///
/// The path is looked up as written first, then percent-decoded, so that hrefs
/// copied verbatim from a document still reach their entry.
fn entry_name<'a, R: Read + Seek>(
    archive: &ZipArchive<R>,
    path: &'a str,
) -> Result<Cow<'a, str>, PublicationError> {
    if archive.index_for_name(path).is_some() {
        return Ok(Cow::Borrowed(path));
    }

    let decoded = percent_decode(path);
    if archive.index_for_name(&decoded).is_some() {
        return Ok(decoded);
    }

    Err(PublicationError::ResourceNotFound {
        resource: path.to_string(),
    })
}

/// Checks if the compression method of all entries in the archive is supported
///
/// Only Stored (uncompressed) and Deflated entries can be read; this is also
/// the only methods OCF containers are allowed to use.
///
/// ## Return
/// - `Ok(())`: All files use the supported compression method
/// - `Err(PublicationError)`: Unsupported compression method found
pub fn compression_method_check<R: Read + Seek>(
    zip_archive: &mut ZipArchive<R>,
) -> Result<(), PublicationError> {
    for index in 0..zip_archive.len() {
        let file = zip_archive.by_index_raw(index)?;

        match file.compression() {
            CompressionMethod::Stored | CompressionMethod::Deflated => continue,
            _ => {
                return Err(PublicationError::UnusableCompressionMethod {
                    file: file.name().to_string(),
                    method: file.compression().to_string(),
                });
            }
        };
    }

    Ok(())
}

/// Fetches resources from an exploded container on disk
#[cfg(feature = "directory")]
pub struct DirectoryFetcher {
    root: std::path::PathBuf,
}

#[cfg(feature = "directory")]
impl DirectoryFetcher {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, PublicationError> {
        let root = std::fs::canonicalize(root)?;
        Ok(Self { root })
    }

    /// Maps an href to a file below the root, refusing paths that climb out of it
    ///
    /// As for archives, the path is tried as written first, then percent-decoded.
    fn resolve(&self, href: &str) -> Result<std::path::PathBuf, PublicationError> {
        let path = entry_path(href);
        let decoded = percent_decode(path);
        if [path, decoded.as_ref()]
            .iter()
            .any(|candidate| candidate.split('/').any(|segment| segment == ".."))
        {
            return Err(PublicationError::RelativeLinkLeakage {
                path: path.to_string(),
            });
        }

        let direct = self.root.join(path);
        if direct.exists() {
            return Ok(direct);
        }
        Ok(self.root.join(decoded.as_ref()))
    }
}

#[cfg(feature = "directory")]
impl Fetcher for DirectoryFetcher {
    fn links(&self) -> Result<Vec<Link>, PublicationError> {
        let mut links = Vec::new();
        for entry in walkdir::WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative_path = entry
                .path()
                .strip_prefix(&self.root)
                .map_err(|_| PublicationError::RelativeLinkLeakage {
                    path: entry.path().to_string_lossy().to_string(),
                })?;
            let href = relative_path.to_string_lossy().replace('\\', "/");

            let media_type = match mediatype::from_path(&href) {
                Some(media_type) => Some(media_type.to_string()),
                None => {
                    let mut head = Vec::new();
                    File::open(entry.path())?
                        .take(SNIFF_LENGTH)
                        .read_to_end(&mut head)?;
                    mediatype::sniff(&head).map(str::to_string)
                }
            };

            links.push(Link {
                href,
                media_type,
                ..Default::default()
            });
        }

        Ok(links)
    }

    fn get(&self, href: &str) -> Result<Vec<u8>, PublicationError> {
        let path = self.resolve(href)?;
        match std::fs::read(&path) {
            Ok(data) => Ok(data),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(PublicationError::ResourceNotFound {
                    resource: entry_path(href).to_string(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    fn length(&self, href: &str) -> Result<u64, PublicationError> {
        let path = self.resolve(href)?;
        match std::fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => Ok(metadata.len()),
            Ok(_) => Err(PublicationError::ResourceNotFound {
                resource: entry_path(href).to_string(),
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(PublicationError::ResourceNotFound {
                    resource: entry_path(href).to_string(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// A byte transform applied to resources read through a [`TransformingFetcher`]
pub trait ResourceTransformer: Send + Sync {
    /// Transforms the content of the resource at `href`
    ///
    /// Resources the transformer does not apply to must be returned unchanged.
    fn transform(&self, href: &str, data: Vec<u8>) -> Result<Vec<u8>, PublicationError>;
}

/// Wraps a fetcher so that every read goes through a transformer
///
/// Listing resources is delegated unchanged.
pub struct TransformingFetcher {
    inner: Arc<dyn Fetcher>,
    transformer: Box<dyn ResourceTransformer>,
}

impl TransformingFetcher {
    pub fn new(inner: Arc<dyn Fetcher>, transformer: Box<dyn ResourceTransformer>) -> Self {
        Self { inner, transformer }
    }
}

impl Fetcher for TransformingFetcher {
    fn links(&self) -> Result<Vec<Link>, PublicationError> {
        self.inner.links()
    }

    fn get(&self, href: &str) -> Result<Vec<u8>, PublicationError> {
        let data = self.inner.get(href)?;
        self.transformer
            .transform(&percent_decode(entry_path(href)), data)
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use std::{
        io::{Cursor, Write},
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use zip::{CompressionMethod, ZipWriter, write::FileOptions};

    use crate::{
        error::PublicationError,
        fetcher::{Fetcher, ZipFetcher},
        types::Link,
    };

    /// Builds an in-memory ZIP archive holding `entries`, in the given order
    pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::<()>::default().compression_method(CompressionMethod::Stored);

        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }

        zip.finish().unwrap().into_inner()
    }

    /// Builds a fetcher over an in-memory ZIP archive holding `entries`
    pub fn zip_fetcher(entries: &[(&str, &[u8])]) -> Arc<dyn Fetcher> {
        Arc::new(ZipFetcher::new(Cursor::new(zip_bytes(entries))).unwrap())
    }

    /// Counts the reads made through the wrapped fetcher
    pub struct CountingFetcher {
        pub inner: Arc<dyn Fetcher>,
        pub reads: AtomicUsize,
    }

    impl CountingFetcher {
        pub fn new(inner: Arc<dyn Fetcher>) -> Self {
            Self {
                inner,
                reads: AtomicUsize::new(0),
            }
        }

        pub fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    impl Fetcher for CountingFetcher {
        fn links(&self) -> Result<Vec<Link>, PublicationError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.links()
        }

        fn get(&self, href: &str) -> Result<Vec<u8>, PublicationError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get(href)
        }
    }
}

#[cfg(test)]
mod tests {
    mod zip_fetcher_tests {
        use crate::{error::PublicationError, fetcher::tests_support::zip_fetcher};

        #[test]
        fn test_links_in_container_order() {
            let fetcher = zip_fetcher(&[
                ("mimetype", b"application/epub+zip"),
                ("OEBPS/page.xhtml", b"<html/>"),
                ("OEBPS/images/cover.png", b"not really a png"),
            ]);

            let links = fetcher.links().unwrap();
            let hrefs = links.iter().map(|link| link.href.as_str()).collect::<Vec<_>>();
            assert_eq!(
                hrefs,
                vec!["mimetype", "OEBPS/page.xhtml", "OEBPS/images/cover.png"]
            );
            assert_eq!(links[0].media_type, None);
            assert_eq!(links[1].media_type.as_deref(), Some("application/xhtml+xml"));
            assert_eq!(links[2].media_type.as_deref(), Some("image/png"));
        }

        #[test]
        fn test_links_sniff_entries_without_extension() {
            let gif = b"GIF89a\x01\x00\x01\x00\x00\x00\x00;";
            let fetcher = zip_fetcher(&[("pages/001", gif)]);

            let links = fetcher.links().unwrap();
            assert_eq!(links[0].media_type.as_deref(), Some("image/gif"));
        }

        #[test]
        fn test_get_and_length() {
            let fetcher = zip_fetcher(&[("a/b.txt", b"hello")]);

            assert_eq!(fetcher.get("a/b.txt").unwrap(), b"hello");
            assert_eq!(fetcher.get("/a/b.txt#frag").unwrap(), b"hello");
            assert_eq!(fetcher.length("a/b.txt").unwrap(), 5);
            assert_eq!(
                fetcher.get("a/missing.txt").unwrap_err(),
                PublicationError::ResourceNotFound {
                    resource: "a/missing.txt".to_string()
                }
            );
        }

        /// Escaped hrefs reach entries whose names hold the decoded characters
        #[test]
        fn test_get_percent_encoded_href() {
            let fetcher = zip_fetcher(&[
                ("OEBPS/nav doc.xhtml", b"<html/>"),
                ("100%.txt", b"raw"),
            ]);

            assert_eq!(fetcher.get("OEBPS/nav%20doc.xhtml").unwrap(), b"<html/>");
            assert_eq!(fetcher.length("OEBPS/nav%20doc.xhtml").unwrap(), 7);
            assert_eq!(fetcher.get("100%.txt").unwrap(), b"raw");
            assert_eq!(
                fetcher.get("OEBPS/other%20doc.xhtml").unwrap_err(),
                PublicationError::ResourceNotFound {
                    resource: "OEBPS/other%20doc.xhtml".to_string()
                }
            );
        }

        #[test]
        fn test_read_as_xml() {
            let fetcher = zip_fetcher(&[("doc.xml", b"<root><child>text</child></root>")]);

            let root = fetcher.read_as_xml("doc.xml", &[]).unwrap();
            assert_eq!(root.name, "root");
            assert_eq!(root.text(), "text");
            assert!(fetcher.read_as_xml("missing.xml", &[]).is_err());
        }
    }

    mod transforming_fetcher_tests {
        use std::sync::Arc;

        use crate::{
            error::PublicationError,
            fetcher::{Fetcher, ResourceTransformer, TransformingFetcher, tests_support::zip_fetcher},
        };

        struct Uppercase;

        impl ResourceTransformer for Uppercase {
            fn transform(&self, href: &str, data: Vec<u8>) -> Result<Vec<u8>, PublicationError> {
                if href.ends_with(".txt") {
                    Ok(data.to_ascii_uppercase())
                } else {
                    Ok(data)
                }
            }
        }

        #[test]
        fn test_reads_are_transformed() {
            let inner = zip_fetcher(&[("a.txt", b"abc"), ("b.bin", b"abc")]);
            let fetcher = TransformingFetcher::new(Arc::clone(&inner), Box::new(Uppercase));

            assert_eq!(fetcher.get("a.txt").unwrap(), b"ABC");
            assert_eq!(fetcher.get("b.bin").unwrap(), b"abc");
            assert_eq!(fetcher.length("a.txt").unwrap(), 3);
            assert_eq!(fetcher.links().unwrap(), inner.links().unwrap());
        }
    }

    #[cfg(feature = "directory")]
    mod directory_fetcher_tests {
        use std::fs;

        use crate::{
            error::PublicationError,
            fetcher::{DirectoryFetcher, Fetcher},
        };

        #[test]
        fn test_links_and_get() {
            let dir = tempfile::tempdir().unwrap();
            fs::create_dir_all(dir.path().join("images")).unwrap();
            fs::write(dir.path().join("images/b.png"), b"b").unwrap();
            fs::write(dir.path().join("images/a.jpg"), b"a").unwrap();
            fs::write(dir.path().join("info.txt"), b"info").unwrap();

            let fetcher = DirectoryFetcher::new(dir.path()).unwrap();
            let links = fetcher.links().unwrap();
            let hrefs = links.iter().map(|link| link.href.as_str()).collect::<Vec<_>>();
            assert_eq!(hrefs, vec!["images/a.jpg", "images/b.png", "info.txt"]);
            assert_eq!(links[0].media_type.as_deref(), Some("image/jpeg"));

            assert_eq!(fetcher.get("info.txt").unwrap(), b"info");
            assert_eq!(fetcher.length("images/b.png").unwrap(), 1);
        }

        #[test]
        fn test_get_refuses_escaping_paths() {
            let dir = tempfile::tempdir().unwrap();
            let fetcher = DirectoryFetcher::new(dir.path()).unwrap();

            assert_eq!(
                fetcher.get("../secret").unwrap_err(),
                PublicationError::RelativeLinkLeakage {
                    path: "../secret".to_string()
                }
            );
            assert_eq!(
                fetcher.get("missing.txt").unwrap_err(),
                PublicationError::ResourceNotFound {
                    resource: "missing.txt".to_string()
                }
            );
        }
    }
}
