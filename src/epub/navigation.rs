//! Navigation data
//!
//! EPUB 2 publications describe their navigation in an NCX document, EPUB 3
//! publications in an XHTML navigation document. The two are never mixed: the
//! package version alone decides which one is read, so a stray NCX left in an
//! EPUB 3 package is ignored.

use log::debug;

use crate::{
    epub::{
        NAMESPACE_NCX, NAMESPACE_OPS, NAMESPACE_XHTML,
        package::{ManifestItem, PackageDocument},
    },
    error::PublicationError,
    fetcher::Fetcher,
    mediatype,
    types::{Link, NavigationMap},
    utils::{NormalizeWhitespace, XmlElement, resolve_href},
};

const NCX_BINDINGS: [(&str, &str); 1] = [(NAMESPACE_NCX, "ncx")];
const NAV_DOCUMENT_BINDINGS: [(&str, &str); 2] =
    [(NAMESPACE_XHTML, "html"), (NAMESPACE_OPS, "epub")];

/// NCX lists and the navigation roles they map to
const NCX_LISTS: [(&str, &str, &str); 2] = [
    ("navMap", "navPoint", "toc"),
    ("pageList", "pageTarget", "page-list"),
];

/// `epub:type` values of the navigation document that are kept
const NAV_ROLES: [&str; 7] = ["toc", "page-list", "landmarks", "lot", "loi", "loa", "lov"];

/// The document the navigation of a publication is read from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NavigationSource<'a> {
    /// EPUB 2 legacy index
    Ncx(&'a ManifestItem),

    /// EPUB 3 navigation document
    NavDocument(&'a ManifestItem),
}

impl<'a> NavigationSource<'a> {
    /// Selects the navigation source of a package
    ///
    /// Packages older than 3.0 use the NCX named by `spine@toc`, or the first
    /// NCX of the manifest when the spine names none or an unknown id. Newer
    /// packages use the first manifest item with the `nav` property.
    pub fn select(package: &'a PackageDocument) -> Option<Self> {
        if package.version < 3.0 {
            package
                .spine
                .toc
                .as_deref()
                .and_then(|toc| package.manifest_item(toc))
                .or_else(|| {
                    package.manifest.iter().find(|item| {
                        item.media_type
                            .as_deref()
                            .is_some_and(|media_type| mediatype::matches(media_type, mediatype::NCX))
                    })
                })
                .map(NavigationSource::Ncx)
        } else {
            package
                .manifest
                .iter()
                .find(|item| item.has_property("nav"))
                .map(NavigationSource::NavDocument)
        }
    }

    fn read(
        &self,
        package: &PackageDocument,
        fetcher: &dyn Fetcher,
    ) -> Result<NavigationMap, PublicationError> {
        match self {
            NavigationSource::Ncx(item) => {
                let path = resolve_href(&package.path, &item.href);
                let root = fetcher.read_as_xml(&path, &NCX_BINDINGS)?;
                Ok(parse_ncx(&root, &path))
            }
            NavigationSource::NavDocument(item) => {
                let path = resolve_href(&package.path, &item.href);
                let root = fetcher.read_as_xml(&path, &NAV_DOCUMENT_BINDINGS)?;
                Ok(parse_nav_document(&root, &path))
            }
        }
    }
}

/// Builds the navigation map of a package
///
/// Never fails: a package without a navigation source, or whose source cannot
/// be read, has an empty navigation map.
pub fn parse_navigation_data(package: &PackageDocument, fetcher: &dyn Fetcher) -> NavigationMap {
    let Some(source) = NavigationSource::select(package) else {
        debug!("The package \"{}\" declares no navigation.", package.path);
        return NavigationMap::new();
    };

    match source.read(package, fetcher) {
        Ok(navigation) => navigation,
        Err(err) => {
            debug!("Unable to read the navigation of \"{}\": {}", package.path, err);
            NavigationMap::new()
        }
    }
}

/// Parses an NCX document
///
/// `navMap` becomes the `toc` role and `pageList` the `page-list` role. Hrefs are
/// resolved against `ncx_path`.
pub fn parse_ncx(root: &XmlElement, ncx_path: &str) -> NavigationMap {
    let mut navigation = NavigationMap::new();

    for (list_tag, point_tag, role) in NCX_LISTS {
        let Some(list) = root.find_children_by_name(list_tag).next() else {
            continue;
        };

        let links = parse_nav_points(list, point_tag, ncx_path);
        if !links.is_empty() {
            navigation.insert(role.to_string(), links);
        }
    }

    navigation
}

/// Recursively parse NCX navigation points
///
/// A point without href but with children keeps a placeholder `#` href; a point
/// with neither is dropped.
fn parse_nav_points(parent: &XmlElement, point_tag: &str, ncx_path: &str) -> Vec<Link> {
    let mut links = Vec::new();

    for point in parent.find_children_by_name(point_tag) {
        let title = point
            .find_children_by_name("navLabel")
            .next()
            .map(|label| label.text().normalize_whitespace())
            .filter(|title| !title.is_empty());
        let href = point
            .find_children_by_name("content")
            .next()
            .and_then(|content| content.get_attr("src"))
            .filter(|src| !src.trim().is_empty())
            .map(|src| resolve_href(ncx_path, src.trim()));
        let children = parse_nav_points(point, "navPoint", ncx_path);

        if href.is_none() && children.is_empty() {
            continue;
        }

        links.push(Link {
            href: href.unwrap_or_else(|| "#".to_string()),
            title,
            children,
            ..Default::default()
        });
    }

    links
}

/// Parses an XHTML navigation document
///
/// Every `nav` element whose `epub:type` names a known role contributes its
/// `ol` list; when a role appears twice the first `nav` wins.
pub fn parse_nav_document(root: &XmlElement, nav_path: &str) -> NavigationMap {
    let mut navigation = NavigationMap::new();

    for nav in root.find_elements_by_name("nav") {
        let Some(types) = nav.get_attr("epub:type") else {
            continue;
        };
        let Some(role) = types
            .split_whitespace()
            .find(|value| NAV_ROLES.contains(value))
        else {
            continue;
        };
        if navigation.contains_key(role) {
            continue;
        }

        let links = nav
            .find_children_by_name("ol")
            .next()
            .map(|list| parse_nav_list(list, nav_path))
            .unwrap_or_default();
        if !links.is_empty() {
            navigation.insert(role.to_string(), links);
        }
    }

    navigation
}

/// Recursively parses `ol > li > (a | span) [ol]` lists
fn parse_nav_list(list: &XmlElement, nav_path: &str) -> Vec<Link> {
    let mut links = Vec::new();

    for item in list.find_children_by_name("li") {
        let Some(label) = item.find_children_by_names(&["a", "span"]).next() else {
            continue;
        };

        let title = Some(label.text().normalize_whitespace()).filter(|title| !title.is_empty());
        let href = match label.name.as_str() {
            "a" => label
                .get_attr("href")
                .filter(|href| !href.trim().is_empty())
                .map(|href| resolve_href(nav_path, href.trim())),
            _ => None,
        };
        let children = item
            .find_children_by_name("ol")
            .next()
            .map(|sub_list| parse_nav_list(sub_list, nav_path))
            .unwrap_or_default();

        if href.is_none() && children.is_empty() {
            continue;
        }

        links.push(Link {
            href: href.unwrap_or_else(|| "#".to_string()),
            title,
            children,
            ..Default::default()
        });
    }

    links
}
