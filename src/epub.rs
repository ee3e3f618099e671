//! EPUB parsing
//!
//! [`EpubParser`] turns an EPUB container (EPUB 2 or EPUB 3, zipped or exploded)
//! into a [`Manifest`](crate::types::Manifest). The work is split by concern:
//!
//! - [`container`]: locates the package document through `META-INF/container.xml`
//! - [`package`]: reads the package document (metadata, manifest, spine)
//! - [`navigation`]: builds the navigation map from the NCX or the navigation document
//! - [`encryption`]: reads `META-INF/encryption.xml`
//! - [`display_options`]: reads the vendor display options files
//! - [`factory`]: folds all of the above into the manifest
//! - [`deobfuscation`]: wraps the fetcher so that obfuscated fonts are read in clear
//!
//! Only a missing or unreadable package document fails the parse. Navigation,
//! encryption and display options degrade to empty results.

pub mod container;
pub mod deobfuscation;
pub mod display_options;
pub mod encryption;
pub mod factory;
pub mod navigation;
pub mod package;

use std::sync::Arc;

use crate::{
    asset::PublicationAsset,
    epub::{
        display_options::parse_display_options, encryption::parse_encryption_data,
        factory::PublicationFactory, navigation::parse_navigation_data, package::PackageDocument,
    },
    error::PublicationError,
    fetcher::Fetcher,
    mediatype,
    publication::{PublicationBuilder, PublicationParser},
    services::{
        CONTENT_SERVICE, ContentIteratorKind, GUIDED_NAVIGATION_SERVICE, GuidedNavigationKind,
        POSITIONS_SERVICE, PositionsStrategy, ReflowableStrategy, ServiceFactory, Services,
    },
};

pub const NAMESPACE_OPF: &str = "http://www.idpf.org/2007/opf";
pub const NAMESPACE_DC: &str = "http://purl.org/dc/elements/1.1/";
pub const NAMESPACE_DCTERMS: &str = "http://purl.org/dc/terms/";
pub const NAMESPACE_RENDITION: &str = "http://www.idpf.org/2013/rendition";
pub const NAMESPACE_NCX: &str = "http://www.daisy.org/z3986/2005/ncx/";
pub const NAMESPACE_XHTML: &str = "http://www.w3.org/1999/xhtml";
pub const NAMESPACE_OPS: &str = "http://www.idpf.org/2007/ops";
pub const NAMESPACE_ENC: &str = "http://www.w3.org/2001/04/xmlenc#";
pub const NAMESPACE_SIG: &str = "http://www.w3.org/2000/09/xmldsig#";
pub const NAMESPACE_COMP: &str = "http://www.idpf.org/2016/encryption#compression";

/// Prefixes the package document is read with
pub const PACKAGE_BINDINGS: [(&str, &str); 4] = [
    (NAMESPACE_OPF, "opf"),
    (NAMESPACE_DC, "dc"),
    (NAMESPACE_DCTERMS, "dcterms"),
    (NAMESPACE_RENDITION, "rendition"),
];

/// Parser of EPUB publications
///
/// The reflowable strategy decides how reflowable resources are split into
/// positions; fixed-layout resources always count as one position.
#[derive(Debug, Clone, Default)]
pub struct EpubParser {
    reflowable_strategy: ReflowableStrategy,
}

impl EpubParser {
    pub fn new(reflowable_strategy: ReflowableStrategy) -> Self {
        Self {
            reflowable_strategy,
        }
    }

    fn services(&self) -> Services {
        Services::new()
            .with(
                POSITIONS_SERVICE,
                ServiceFactory::Positions(PositionsStrategy::Epub {
                    reflowable: self.reflowable_strategy,
                }),
            )
            .with(
                CONTENT_SERVICE,
                ServiceFactory::Content(vec![ContentIteratorKind::Html]),
            )
            .with(
                GUIDED_NAVIGATION_SERVICE,
                ServiceFactory::GuidedNavigation(GuidedNavigationKind::MediaOverlay),
            )
    }
}

impl PublicationParser for EpubParser {
    fn parse(
        &self,
        asset: &PublicationAsset,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Option<PublicationBuilder>, PublicationError> {
        if !asset.is_media_type(mediatype::EPUB) {
            return Ok(None);
        }

        let package_path = container::root_file_path(fetcher.as_ref())?;
        let package = fetcher
            .read_as_xml(&package_path, &PACKAGE_BINDINGS)
            .and_then(|root| PackageDocument::parse(&root, &package_path))
            .map_err(|err| PublicationError::invalid_package(&package_path, err))?;

        let manifest = PublicationFactory {
            fallback_title: &asset.name,
            package: &package,
            navigation: parse_navigation_data(&package, fetcher.as_ref()),
            encryption: parse_encryption_data(fetcher.as_ref()),
            display_options: parse_display_options(fetcher.as_ref()),
        }
        .create();

        let identifier = manifest.metadata.identifier.clone().unwrap_or_default();
        let fetcher = deobfuscation::wrap_fetcher(fetcher, &identifier, &manifest);

        Ok(Some(PublicationBuilder::new(
            manifest,
            fetcher,
            self.services(),
        )))
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    /// A minimal EPUB 3 package document
    pub const PACKAGE_3: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="uid">urn:uuid:3f2f3b9c-0c39-4e0d-9a55-6e7b37e3c1d0</dc:identifier>
    <dc:title>A Modern Book</dc:title>
    <dc:language>en</dc:language>
    <meta property="dcterms:modified">2024-05-01T10:00:00Z</meta>
  </metadata>
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="ch1" href="text/ch1.xhtml" media-type="application/xhtml+xml"/>
    <item id="font" href="fonts/serif.otf" media-type="font/otf"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="ch1"/>
  </spine>
</package>"#;

    /// A minimal EPUB 2 package document
    pub const PACKAGE_2: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<opf:package xmlns:opf="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="BookId">
  <opf:metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="BookId">legacy-book-1</dc:identifier>
    <dc:title>A Legacy Book</dc:title>
    <dc:creator opf:role="aut">Jane Doe</dc:creator>
    <dc:date>1999</dc:date>
    <opf:meta name="cover" content="cover-img"/>
  </opf:metadata>
  <opf:manifest>
    <opf:item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <opf:item id="cover-img" href="images/cover.jpg" media-type="image/jpeg"/>
    <opf:item id="ch1" href="ch1.html" media-type="application/xhtml+xml"/>
    <opf:item id="notes" href="notes.html" media-type="application/xhtml+xml"/>
  </opf:manifest>
  <opf:spine toc="ncx">
    <opf:itemref idref="ch1"/>
    <opf:itemref idref="notes" linear="no"/>
  </opf:spine>
</opf:package>"#;

    pub const NCX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <navMap>
    <navPoint id="p1" playOrder="1">
      <navLabel><text>Chapter One</text></navLabel>
      <content src="ch1.html"/>
      <navPoint id="p1-1" playOrder="2">
        <navLabel><text>Section</text></navLabel>
        <content src="ch1.html#s1"/>
      </navPoint>
    </navPoint>
  </navMap>
</ncx>"#;

    pub const NAV: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
  <body>
    <nav epub:type="toc">
      <h1>Contents</h1>
      <ol>
        <li><a href="text/ch1.xhtml">Chapter
          One</a></li>
      </ol>
    </nav>
  </body>
</html>"#;

    pub const CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;
}
