//! Manifest assembly
//!
//! Folds the package document and the per-concern maps (navigation, encryption,
//! display options) into one [`Manifest`]. Nothing is read here; every input has
//! already been fetched and parsed.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use log::warn;

use crate::{
    epub::package::{ItemRef, ManifestItem, MetadataItem, PackageDocument},
    types::{
        DisplayOptions, EncryptionMap, Layout, Link, LocalizedString, Manifest, Metadata,
        NavigationMap, Orientation, Presentation, Profile, ReadingProgression,
        WEBPUB_MANIFEST_CONTEXT,
    },
    utils::resolve_href,
};

/// Inputs of the manifest of an EPUB publication
pub struct PublicationFactory<'a> {
    /// Title used when the package declares none
    pub fallback_title: &'a str,

    pub package: &'a PackageDocument,
    pub navigation: NavigationMap,
    pub encryption: EncryptionMap,
    pub display_options: DisplayOptions,
}

impl PublicationFactory<'_> {
    pub fn create(self) -> Manifest {
        let metadata = self.metadata();
        let (reading_order, resources) = self.links();

        Manifest {
            context: vec![WEBPUB_MANIFEST_CONTEXT.to_string()],
            metadata,
            reading_order,
            resources,
            navigation: self.navigation,
        }
    }

    fn metadata(&self) -> Metadata {
        let package = self.package;

        Metadata {
            identifier: self.identifier(),
            title: self.title(),
            languages: values(package, "dc:language"),
            authors: package
                .metadata_items("dc:creator")
                .filter(|item| is_author(item))
                .map(|item| item.value.clone())
                .filter(|value| !value.is_empty())
                .collect(),
            publishers: values(package, "dc:publisher"),
            description: values(package, "dc:description").into_iter().next(),
            published: package
                .metadata_items("dc:date")
                .find(|item| {
                    item.refinement("opf:event")
                        .is_none_or(|event| event == "publication")
                })
                .and_then(|item| parse_date(&item.value)),
            modified: package
                .metadata_items("dcterms:modified")
                .next()
                .and_then(|item| parse_date(&item.value)),
            conforms_to: vec![Profile::Epub],
            reading_progression: match package.spine.page_progression.as_deref() {
                Some("ltr") => ReadingProgression::Ltr,
                Some("rtl") => ReadingProgression::Rtl,
                _ => ReadingProgression::Auto,
            },
            presentation: self.presentation(),
        }
    }

    /// The `dc:identifier` named by `unique-identifier`, else the first one
    fn identifier(&self) -> Option<String> {
        let package = self.package;
        let unique = package.unique_identifier.as_deref().and_then(|id| {
            package
                .metadata_items("dc:identifier")
                .find(|item| item.id.as_deref() == Some(id))
        });

        unique
            .or_else(|| package.metadata_items("dc:identifier").next())
            .map(|item| item.value.clone())
            .filter(|value| !value.is_empty())
    }

    /// The main title, with its alternate scripts
    fn title(&self) -> LocalizedString {
        let titles = self.package.metadata_items("dc:title").collect::<Vec<_>>();
        let main = titles
            .iter()
            .find(|item| item.refinement("title-type") == Some("main"))
            .or_else(|| titles.first())
            .filter(|item| !item.value.is_empty());

        let Some(main) = main else {
            return LocalizedString::from_string(self.fallback_title);
        };

        let mut title = LocalizedString::from_string(main.value.clone());
        for refinement in main
            .refined
            .iter()
            .filter(|refinement| refinement.property == "alternate-script")
        {
            title.insert(refinement.lang.clone(), refinement.value.clone());
        }
        title
    }

    /// Rendition metadata first, vendor display options second
    fn presentation(&self) -> Presentation {
        let meta = |property: &str| {
            self.package
                .metadata_items(property)
                .next()
                .map(|item| item.value.as_str())
        };
        let option = |name: &str| self.display_options.get(name).map(String::as_str);

        let layout = match meta("rendition:layout") {
            Some("pre-paginated") => Some(Layout::Fixed),
            Some("reflowable") => Some(Layout::Reflowable),
            _ => match option("fixed-layout") {
                Some("true") => Some(Layout::Fixed),
                _ => None,
            },
        };

        let orientation = match meta("rendition:orientation") {
            Some("landscape") => Some(Orientation::Landscape),
            Some("portrait") => Some(Orientation::Portrait),
            Some("auto") => Some(Orientation::Auto),
            _ => match option("orientation-lock") {
                Some("landscape-only") => Some(Orientation::Landscape),
                Some("portrait-only") => Some(Orientation::Portrait),
                Some("none") => Some(Orientation::Auto),
                _ => None,
            },
        };

        Presentation {
            layout,
            orientation,
            spread: meta("rendition:spread").map(str::to_string),
        }
    }

    /// Splits the manifest items into the reading order and the other resources
    ///
    /// Linear spine items form the reading order; everything else, non-linear
    /// spine items included, is a resource.
    fn links(&self) -> (Vec<Link>, Vec<Link>) {
        let package = self.package;
        let cover_id = package
            .metadata_items("cover")
            .next()
            .map(|item| item.value.as_str());

        let mut reading_order = Vec::new();
        let mut in_reading_order = HashSet::new();
        for itemref in package.spine.itemrefs.iter().filter(|itemref| itemref.linear) {
            let Some(item) = package.manifest_item(&itemref.idref) else {
                warn!(
                    "The spine of \"{}\" references the unknown item \"{}\".",
                    package.path, itemref.idref
                );
                continue;
            };

            reading_order.push(self.link(item, Some(itemref), cover_id));
            in_reading_order.insert(item.id.as_str());
        }

        let resources = package
            .manifest
            .iter()
            .filter(|item| !in_reading_order.contains(item.id.as_str()))
            .map(|item| self.link(item, None, cover_id))
            .collect();

        (reading_order, resources)
    }

    fn link(&self, item: &ManifestItem, itemref: Option<&ItemRef>, cover_id: Option<&str>) -> Link {
        let href = resolve_href(&self.package.path, &item.href);

        let mut properties = item.properties.clone();
        if let Some(itemref) = itemref {
            for property in &itemref.properties {
                if !properties.contains(property) {
                    properties.push(property.clone());
                }
            }
        }

        let mut rels = Vec::new();
        if item.has_property("cover-image") || cover_id == Some(item.id.as_str()) {
            rels.push("cover".to_string());
        }

        let encrypted = self.encryption.get(&href).cloned();

        Link {
            href,
            media_type: item.media_type.clone(),
            title: None,
            rels,
            properties,
            encrypted,
            children: vec![],
        }
    }
}

fn values(package: &PackageDocument, property: &str) -> Vec<String> {
    package
        .metadata_items(property)
        .map(|item| item.value.clone())
        .filter(|value| !value.is_empty())
        .collect()
}

/// Creators without a role, or with the `aut` role
fn is_author(item: &MetadataItem) -> bool {
    item.refinement("role")
        .or_else(|| item.refinement("opf:role"))
        .is_none_or(|role| role == "aut")
}

/// Parses a W3C date, as used by `dc:date` and `dcterms:modified`
///
/// Partial dates (`YYYY`, `YYYY-MM`) are taken as the first day of the period.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(date) = DateTime::parse_from_rfc3339(value) {
        return Some(date.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(date.and_utc());
    }

    let padded = match value.len() {
        4 => format!("{}-01-01", value),
        7 => format!("{}-01", value),
        _ => value.chars().take(10).collect(),
    };
    match NaiveDate::parse_from_str(&padded, "%Y-%m-%d") {
        Ok(date) => date.and_hms_opt(0, 0, 0).map(|date| date.and_utc()),
        Err(_) => {
            warn!("Unable to parse the date \"{}\".", value);
            None
        }
    }
}
