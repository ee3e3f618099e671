//! Publication assembly
//!
//! A [`PublicationParser`] turns an asset and a fetcher into a [`PublicationBuilder`],
//! or reports that the asset is not in its format. The [`PublicationOpener`] runs
//! a chain of parsers over a file or directory until one of them claims it.

use std::{path::Path, sync::Arc};

use log::debug;

use crate::{
    asset::PublicationAsset,
    epub::EpubParser,
    error::PublicationError,
    fetcher::{Fetcher, ZipFetcher},
    image::ImageParser,
    services::{Position, Services},
    types::{Manifest, Metadata},
};

/// Parses one publication format
pub trait PublicationParser {
    /// Builds a publication from `asset`, read through `fetcher`
    ///
    /// ## Return
    /// - `Ok(Some(PublicationBuilder))`: The asset is in this format and was assembled
    /// - `Ok(None)`: The asset is not in this format, another parser may claim it
    /// - `Err(PublicationError)`: The asset is in this format but cannot be assembled
    fn parse(
        &self,
        asset: &PublicationAsset,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Option<PublicationBuilder>, PublicationError>;
}

/// Everything a parser produced, before it is frozen into a [`Publication`]
pub struct PublicationBuilder {
    pub manifest: Manifest,

    /// The fetcher resources must be read through, possibly transforming
    pub fetcher: Arc<dyn Fetcher>,

    pub services: Services,
}

impl PublicationBuilder {
    pub fn new(manifest: Manifest, fetcher: Arc<dyn Fetcher>, services: Services) -> Self {
        Self {
            manifest,
            fetcher,
            services,
        }
    }

    pub fn build(self) -> Publication {
        Publication {
            manifest: self.manifest,
            fetcher: self.fetcher,
            services: self.services,
        }
    }
}

/// An opened publication
///
/// The manifest can no longer change once the publication is built.
pub struct Publication {
    manifest: Manifest,
    fetcher: Arc<dyn Fetcher>,
    services: Services,
}

impl Publication {
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn metadata(&self) -> &Metadata {
        &self.manifest.metadata
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn fetcher(&self) -> Arc<dyn Fetcher> {
        Arc::clone(&self.fetcher)
    }

    /// Reads a resource, deobfuscated if needed
    pub fn get(&self, href: &str) -> Result<Vec<u8>, PublicationError> {
        self.fetcher.get(href)
    }

    /// Computes the positions of the publication
    ///
    /// A publication without a registered positions service has no positions.
    pub fn positions(&self) -> Vec<Position> {
        self.services
            .positions_strategy()
            .map(|strategy| strategy.positions(&self.manifest, self.fetcher.as_ref()))
            .unwrap_or_default()
    }
}

/// Opens publications from the file system with a chain of parsers
pub struct PublicationOpener {
    parsers: Vec<Box<dyn PublicationParser>>,
}

impl Default for PublicationOpener {
    fn default() -> Self {
        Self::new(vec![
            Box::new(EpubParser::default()),
            Box::new(ImageParser),
        ])
    }
}

impl PublicationOpener {
    /// Creates an opener trying `parsers` in the given order
    pub fn new(parsers: Vec<Box<dyn PublicationParser>>) -> Self {
        Self { parsers }
    }

    /// Opens the publication at `path`
    ///
    /// Files are read as ZIP archives; directories are read as exploded containers
    /// when the `directory` feature is enabled.
    ///
    /// ## Return
    /// - `Ok(Publication)`: The first parser that claimed the asset built it
    /// - `Err(PublicationError)`: The path is unreadable, a parser failed, or no
    ///   parser claimed the asset (`UnsupportedFormat`)
    pub fn open<P: AsRef<Path>>(&self, path: P) -> Result<Publication, PublicationError> {
        let path = path.as_ref();
        let asset = PublicationAsset::from_path(path)?;
        let fetcher = Self::fetcher_for(path, &asset)?;

        self.open_asset(&asset, fetcher)
    }

    /// Runs the parser chain over an asset whose fetcher has already been built
    pub fn open_asset(
        &self,
        asset: &PublicationAsset,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Publication, PublicationError> {
        for parser in &self.parsers {
            if let Some(builder) = parser.parse(asset, Arc::clone(&fetcher))? {
                return Ok(builder.build());
            }
        }

        debug!("No parser accepts the publication \"{}\".", asset.name);
        Err(PublicationError::UnsupportedFormat {
            name: asset.name.clone(),
        })
    }

    #[cfg(feature = "directory")]
    fn fetcher_for(
        path: &Path,
        asset: &PublicationAsset,
    ) -> Result<Arc<dyn Fetcher>, PublicationError> {
        if path.is_dir() {
            return Ok(Arc::new(crate::fetcher::DirectoryFetcher::new(path)?));
        }

        Self::zip_fetcher_for(path, asset)
    }

    #[cfg(not(feature = "directory"))]
    fn fetcher_for(
        path: &Path,
        asset: &PublicationAsset,
    ) -> Result<Arc<dyn Fetcher>, PublicationError> {
        if path.is_dir() {
            return Err(PublicationError::UnsupportedFormat {
                name: asset.name.clone(),
            });
        }

        Self::zip_fetcher_for(path, asset)
    }

    fn zip_fetcher_for(
        path: &Path,
        asset: &PublicationAsset,
    ) -> Result<Arc<dyn Fetcher>, PublicationError> {
        match ZipFetcher::open(path) {
            Ok(fetcher) => Ok(Arc::new(fetcher)),
            Err(PublicationError::ArchiveError { source }) => {
                debug!("\"{}\" is not a readable archive: {}", asset.name, source);
                Err(PublicationError::UnsupportedFormat {
                    name: asset.name.clone(),
                })
            }
            Err(err) => Err(err),
        }
    }
}
