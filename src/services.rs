//! Publication services
//!
//! Parsers do not compute anything beyond the manifest. Instead they register
//! services by name, each described by a [`ServiceFactory`] value carrying the
//! configuration the service needs. Positions are the only service computed by
//! this library; content iteration and guided navigation are registered so that
//! downstream consumers know which implementation applies.

use indexmap::IndexMap;
use log::debug;

use crate::{
    fetcher::Fetcher,
    types::{Layout, Link, Manifest},
};

pub const POSITIONS_SERVICE: &str = "positions";
pub const CONTENT_SERVICE: &str = "content";
pub const GUIDED_NAVIGATION_SERVICE: &str = "guided-navigation";

/// How reflowable resources are split into positions
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReflowableStrategy {
    /// One position per started page of the stored (archive entry) length
    ArchiveEntryLength { page_length: u64 },

    /// One position per started page of the length declared in the encryption
    /// descriptor, falling back to the stored length
    OriginalLength { page_length: u64 },
}

impl Default for ReflowableStrategy {
    fn default() -> Self {
        ReflowableStrategy::ArchiveEntryLength { page_length: 1024 }
    }
}

impl ReflowableStrategy {
    /// Returns the number of positions of a reflowable resource
    fn position_count(&self, link: &Link, fetcher: &dyn Fetcher) -> usize {
        let (length, page_length) = match self {
            ReflowableStrategy::ArchiveEntryLength { page_length } => {
                (stored_length(link, fetcher), *page_length)
            }
            ReflowableStrategy::OriginalLength { page_length } => {
                let original = link
                    .encrypted
                    .as_ref()
                    .and_then(|encryption| encryption.original_length);
                (
                    original.unwrap_or_else(|| stored_length(link, fetcher)),
                    *page_length,
                )
            }
        };

        if page_length == 0 {
            return 1;
        }
        length.div_ceil(page_length).max(1) as usize
    }
}

fn stored_length(link: &Link, fetcher: &dyn Fetcher) -> u64 {
    match fetcher.length(link.path()) {
        Ok(length) => length,
        Err(err) => {
            debug!("Unable to get the length of \"{}\": {}", link.href, err);
            0
        }
    }
}

/// How positions of a publication are computed
#[derive(Debug, Clone, PartialEq)]
pub enum PositionsStrategy {
    /// One position per reading order item
    ///
    /// `media_type` is used for items that do not declare one. It may be a
    /// wildcard such as `image/*`.
    PerResource { media_type: String },

    /// EPUB positions: one per fixed-layout resource, and a length based split
    /// of reflowable resources
    Epub { reflowable: ReflowableStrategy },
}

/// Content iterators enabled by the content service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentIteratorKind {
    Html,
}

/// Sources the guided navigation service reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuidedNavigationKind {
    MediaOverlay,
}

/// Identity and configuration of a registered service
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceFactory {
    Positions(PositionsStrategy),
    Content(Vec<ContentIteratorKind>),
    GuidedNavigation(GuidedNavigationKind),
}

/// Services registered for a publication, keyed by service name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Services {
    factories: IndexMap<String, ServiceFactory>,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service, replacing any previous one with the same name
    pub fn with(mut self, name: &str, factory: ServiceFactory) -> Self {
        self.factories.insert(name.to_string(), factory);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ServiceFactory> {
        self.factories.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Returns the positions strategy, if a positions service is registered
    pub fn positions_strategy(&self) -> Option<&PositionsStrategy> {
        match self.factories.get(POSITIONS_SERVICE) {
            Some(ServiceFactory::Positions(strategy)) => Some(strategy),
            _ => None,
        }
    }
}

/// A location in the publication
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub href: String,
    pub media_type: Option<String>,

    /// 1-based position in the whole publication
    pub position: usize,

    /// Progression within the resource, in `[0, 1)`
    pub progression: f64,

    /// Progression within the publication, in `[0, 1)`
    pub total_progression: f64,
}

impl PositionsStrategy {
    /// Computes the positions of every reading order item, in reading order
    pub fn positions(&self, manifest: &Manifest, fetcher: &dyn Fetcher) -> Vec<Position> {
        let mut positions = Vec::new();

        for link in &manifest.reading_order {
            let (count, media_type) = match self {
                PositionsStrategy::PerResource { media_type } => (
                    1,
                    link.media_type.clone().or_else(|| Some(media_type.clone())),
                ),
                PositionsStrategy::Epub { reflowable } => {
                    let count = if is_fixed_layout(link, manifest) {
                        1
                    } else {
                        reflowable.position_count(link, fetcher)
                    };
                    (count, link.media_type.clone())
                }
            };

            for index in 0..count {
                positions.push(Position {
                    href: link.href.clone(),
                    media_type: media_type.clone(),
                    position: positions.len() + 1,
                    progression: index as f64 / count as f64,
                    total_progression: 0.0,
                });
            }
        }

        let total = positions.len() as f64;
        for position in positions.iter_mut() {
            position.total_progression = (position.position - 1) as f64 / total;
        }

        positions
    }
}

/// Spine overrides take precedence over the publication wide layout
fn is_fixed_layout(link: &Link, manifest: &Manifest) -> bool {
    if link.has_property("rendition:layout-pre-paginated") {
        return true;
    }
    if link.has_property("rendition:layout-reflowable") {
        return false;
    }
    manifest.metadata.presentation.layout == Some(Layout::Fixed)
}

#[cfg(test)]
mod tests {
    use crate::{
        fetcher::tests_support::zip_fetcher,
        services::{
            CONTENT_SERVICE, ContentIteratorKind, POSITIONS_SERVICE, PositionsStrategy,
            ReflowableStrategy, ServiceFactory, Services,
        },
        types::{Encryption, Layout, Link, Manifest},
    };

    fn manifest(reading_order: Vec<Link>) -> Manifest {
        Manifest {
            reading_order,
            ..Default::default()
        }
    }

    #[test]
    fn test_services_registry() {
        let services = Services::new()
            .with(
                POSITIONS_SERVICE,
                ServiceFactory::Positions(PositionsStrategy::PerResource {
                    media_type: "image/*".to_string(),
                }),
            )
            .with(
                CONTENT_SERVICE,
                ServiceFactory::Content(vec![ContentIteratorKind::Html]),
            );

        assert!(services.contains(POSITIONS_SERVICE));
        assert_eq!(services.names().collect::<Vec<_>>(), vec!["positions", "content"]);
        assert!(services.positions_strategy().is_some());
        assert!(Services::new().positions_strategy().is_none());
    }

    /// One position per image, whatever its size
    #[test]
    fn test_per_resource_positions() {
        let fetcher = zip_fetcher(&[("a.png", &[0u8; 4096]), ("b.png", b"b")]);
        let strategy = PositionsStrategy::PerResource {
            media_type: "image/*".to_string(),
        };

        let positions = strategy.positions(
            &manifest(vec![Link::new("a.png").with_media_type("image/png"), Link::new("b.png")]),
            fetcher.as_ref(),
        );
        assert_eq!(positions.len(), 2);
        assert_eq!(positions[1].position, 2);
        assert_eq!(positions[1].media_type.as_deref(), Some("image/*"));
        assert_eq!(positions[1].total_progression, 0.5);
    }

    /// Reflowable resources get one position per started page
    #[test]
    fn test_archive_entry_length_positions() {
        let fetcher = zip_fetcher(&[("one.xhtml", &[b'a'; 2500]), ("two.xhtml", b"")]);
        let strategy = PositionsStrategy::Epub {
            reflowable: ReflowableStrategy::ArchiveEntryLength { page_length: 1024 },
        };

        let positions = strategy.positions(
            &manifest(vec![Link::new("one.xhtml"), Link::new("two.xhtml")]),
            fetcher.as_ref(),
        );
        assert_eq!(positions.len(), 4);
        assert_eq!(positions[0].href, "one.xhtml");
        assert_eq!(positions[2].progression, 2.0 / 3.0);
        assert_eq!(positions[3].href, "two.xhtml");
        assert_eq!(positions[3].position, 4);
    }

    #[test]
    fn test_original_length_and_fixed_layout() {
        let fetcher = zip_fetcher(&[("font.xhtml", b"x"), ("page.xhtml", &[b'a'; 5000])]);
        let mut encrypted = Link::new("font.xhtml");
        encrypted.encrypted = Some(Encryption {
            original_length: Some(3000),
            ..Default::default()
        });

        let mut manifest = manifest(vec![encrypted, Link::new("page.xhtml")]);
        let strategy = PositionsStrategy::Epub {
            reflowable: ReflowableStrategy::OriginalLength { page_length: 1000 },
        };
        assert_eq!(strategy.positions(&manifest, fetcher.as_ref()).len(), 8);

        manifest.metadata.presentation.layout = Some(Layout::Fixed);
        assert_eq!(strategy.positions(&manifest, fetcher.as_ref()).len(), 2);
    }
}
