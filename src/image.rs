//! Image archive publications
//!
//! Comic book archives (CBZ, CBR) and plain archives of bitmaps have no package
//! document: the reading order is the sorted list of bitmaps, the first one is
//! the cover and the title comes from the archive layout.

use std::sync::Arc;

use log::debug;

use crate::{
    asset::PublicationAsset,
    error::PublicationError,
    fetcher::Fetcher,
    mediatype,
    publication::{PublicationBuilder, PublicationParser},
    services::{POSITIONS_SERVICE, PositionsStrategy, ServiceFactory, Services},
    types::{Link, LocalizedString, Manifest, Metadata, Profile, WEBPUB_MANIFEST_CONTEXT},
    utils::{file_extension, is_hidden_or_thumbs},
};

/// Extensions of the auxiliary files allowed next to the bitmaps of an archive
/// whose media type is not a comic book one
pub const AUXILIARY_EXTENSIONS: [&str; 4] = ["acbf", "xml", "txt", "json"];

/// Builds publications out of archives of bitmaps
pub struct ImageParser;

impl PublicationParser for ImageParser {
    fn parse(
        &self,
        asset: &PublicationAsset,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Option<PublicationBuilder>, PublicationError> {
        let links = fetcher.links()?;
        if !accepts(asset, &links) {
            return Ok(None);
        }

        let mut reading_order = links
            .into_iter()
            .filter(|link| !is_hidden_or_thumbs(link.path()) && is_bitmap(link))
            .collect::<Vec<_>>();
        if reading_order.is_empty() {
            return Err(PublicationError::NoBitmapFound);
        }

        // Plain byte order, "page10" comes before "page2"
        reading_order.sort_by(|a, b| a.href.cmp(&b.href));
        reading_order[0].rels.push("cover".to_string());

        let title = common_directory(&reading_order)
            .unwrap_or(asset.name.as_str())
            .to_string();
        debug!("Assembled \"{}\" from {} bitmaps.", title, reading_order.len());

        let manifest = Manifest {
            context: vec![WEBPUB_MANIFEST_CONTEXT.to_string()],
            metadata: Metadata {
                title: LocalizedString::from_string(title),
                conforms_to: vec![Profile::Divina],
                ..Default::default()
            },
            reading_order,
            ..Default::default()
        };

        let services = Services::new().with(
            POSITIONS_SERVICE,
            ServiceFactory::Positions(PositionsStrategy::PerResource {
                media_type: "image/*".to_string(),
            }),
        );

        Ok(Some(PublicationBuilder::new(manifest, fetcher, services)))
    }
}

/// Checks whether the asset is an archive of bitmaps
///
/// Comic book archives are accepted as they are. Other archives may only hold
/// bitmaps, hidden files and auxiliary metadata files.
fn accepts(asset: &PublicationAsset, links: &[Link]) -> bool {
    if asset.is_media_type(mediatype::CBZ) || asset.is_media_type(mediatype::CBR) {
        return true;
    }

    links
        .iter()
        .filter(|link| !is_hidden_or_thumbs(link.path()) && !is_bitmap(link))
        .all(|link| {
            let accepted = file_extension(link.path())
                .is_some_and(|extension| AUXILIARY_EXTENSIONS.contains(&extension.as_str()));
            if !accepted {
                debug!("\"{}\" is not an image archive entry.", link.href);
            }
            accepted
        })
}

fn is_bitmap(link: &Link) -> bool {
    link.media_type.as_deref().is_some_and(mediatype::is_bitmap)
}

/// Returns the top-level directory shared by every link, if any
fn common_directory(links: &[Link]) -> Option<&str> {
    let mut directories = links
        .iter()
        .map(|link| link.path().split_once('/').map(|(directory, _)| directory));

    let first = directories.next()??;
    directories
        .all(|directory| directory == Some(first))
        .then_some(first)
}
