//! Package document parsing
//!
//! The package document (OPF) is read with the bindings of
//! [`PACKAGE_BINDINGS`](crate::epub::PACKAGE_BINDINGS), so element and attribute
//! prefixes below are the canonical ones (`opf`, `dc`, `dcterms`, `rendition`)
//! whatever the document itself declares.

use std::collections::HashMap;

use log::warn;

use crate::{
    epub::{NAMESPACE_DC, NAMESPACE_OPF},
    error::PublicationError,
    utils::{NormalizeWhitespace, XmlElement},
};

/// Version assumed when the package does not declare one
const DEFAULT_VERSION: f32 = 1.2;

/// The parsed package document
#[derive(Debug, Clone, PartialEq)]
pub struct PackageDocument {
    /// Container-relative path of the package document, used to resolve hrefs
    pub path: String,

    pub version: f32,

    /// Id of the `dc:identifier` holding the unique identifier
    pub unique_identifier: Option<String>,

    pub metadata: Vec<MetadataItem>,

    /// Manifest items, in document order
    pub manifest: Vec<ManifestItem>,

    pub spine: Spine,
}

/// One metadata entry, with the refinements that apply to it
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataItem {
    pub id: Option<String>,

    /// `dc:*` for Dublin Core elements, the `property` (EPUB 3) or `name`
    /// (EPUB 2) of a `meta` element otherwise
    pub property: String,

    pub value: String,
    pub lang: Option<String>,
    pub refined: Vec<MetadataRefinement>,
}

impl MetadataItem {
    /// Returns the value of the first refinement with the given property
    pub fn refinement(&self, property: &str) -> Option<&str> {
        self.refined
            .iter()
            .find(|refinement| refinement.property == property)
            .map(|refinement| refinement.value.as_str())
    }
}

/// Additional information on a metadata entry
///
/// EPUB 3 refines entries with `<meta refines="#id">`; EPUB 2 uses attributes
/// such as `opf:role` or `opf:file-as`, which are collected here as well.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRefinement {
    pub property: String,
    pub value: String,
    pub lang: Option<String>,
    pub scheme: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManifestItem {
    pub id: String,

    /// Href as written in the package, relative to the package document
    pub href: String,

    pub media_type: Option<String>,
    pub properties: Vec<String>,
    pub fallback: Option<String>,
}

impl ManifestItem {
    pub fn has_property(&self, property: &str) -> bool {
        self.properties.iter().any(|item| item == property)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Spine {
    /// Manifest id of the NCX, EPUB 2 only
    pub toc: Option<String>,

    pub page_progression: Option<String>,
    pub itemrefs: Vec<ItemRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemRef {
    pub idref: String,
    pub linear: bool,
    pub properties: Vec<String>,
}

impl PackageDocument {
    /// Parses a package document
    ///
    /// ## Parameters
    /// - `root`: The `package` element
    /// - `path`: The container-relative path of the package document
    ///
    /// ## Return
    /// - `Ok(PackageDocument)`: The parsed package
    /// - `Err(PublicationError)`: The manifest or the spine is missing, or one of
    ///   their entries lacks a required attribute
    pub fn parse(root: &XmlElement, path: &str) -> Result<Self, PublicationError> {
        if root.name != "package" {
            return Err(PublicationError::NonCanonicalFile {
                tag: "package".to_string(),
            });
        }

        let version = root
            .get_attr("version")
            .and_then(|version| version.trim().parse::<f32>().ok())
            .unwrap_or(DEFAULT_VERSION);

        let metadata = match root.find_children_by_name("metadata").next() {
            Some(element) => parse_metadata(element),
            None => {
                warn!("The package document \"{}\" has no metadata.", path);
                vec![]
            }
        };

        let manifest_element = root.find_children_by_name("manifest").next().ok_or_else(|| {
            PublicationError::NonCanonicalFile {
                tag: "manifest".to_string(),
            }
        })?;
        let spine_element = root.find_children_by_name("spine").next().ok_or_else(|| {
            PublicationError::NonCanonicalFile {
                tag: "spine".to_string(),
            }
        })?;

        Ok(Self {
            path: path.to_string(),
            version,
            unique_identifier: root.get_attr("unique-identifier"),
            metadata,
            manifest: parse_manifest(manifest_element)?,
            spine: parse_spine(spine_element)?,
        })
    }

    /// Returns the metadata entries with the given property, in document order
    pub fn metadata_items<'a>(
        &'a self,
        property: &str,
    ) -> impl Iterator<Item = &'a MetadataItem> + use<'a> {
        let property = property.to_string();
        self.metadata
            .iter()
            .filter(move |item| item.property == property)
    }

    pub fn manifest_item(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.id == id)
    }
}

/// Parse the `<metadata>` element
///
/// Dublin Core elements and OPF `meta` elements are kept; EPUB 3 refinements are
/// attached to the entry they refine once every element has been read, since a
/// refinement may come before its target.
fn parse_metadata(metadata_element: &XmlElement) -> Vec<MetadataItem> {
    let mut metadata = Vec::new();
    let mut refinements = HashMap::<String, Vec<MetadataRefinement>>::new();

    for element in metadata_element.children() {
        if element.is_in_namespace(NAMESPACE_DC) {
            metadata.push(parse_dc_element(element));
        } else if element.is_in_namespace(NAMESPACE_OPF) && element.name == "meta" {
            parse_meta_element(element, &mut metadata, &mut refinements);
        }
    }

    for item in metadata.iter_mut() {
        if let Some(id) = &item.id {
            if let Some(refined) = refinements.remove(id) {
                item.refined.extend(refined);
            }
        }
    }

    metadata
}

fn parse_dc_element(element: &XmlElement) -> MetadataItem {
    let refined = element
        .attributes
        .iter()
        .filter(|(name, _)| !matches!(name.as_str(), "id" | "xml:lang" | "lang"))
        .map(|(name, value)| MetadataRefinement {
            property: name.to_string(),
            value: value.normalize_whitespace(),
            lang: None,
            scheme: None,
        })
        .collect();

    MetadataItem {
        id: element.get_attr("id"),
        property: format!("dc:{}", element.name),
        value: element.text().normalize_whitespace(),
        lang: language_of(element),
        refined,
    }
}

fn parse_meta_element(
    element: &XmlElement,
    metadata: &mut Vec<MetadataItem>,
    refinements: &mut HashMap<String, Vec<MetadataRefinement>>,
) {
    // EPUB 3
    if let Some(property) = element.get_attr("property") {
        let value = element.text().normalize_whitespace();
        let lang = language_of(element);

        match element.get_attr("refines") {
            Some(refines) => {
                let id = refines.strip_prefix('#').unwrap_or(&refines).to_string();
                refinements.entry(id).or_default().push(MetadataRefinement {
                    property,
                    value,
                    lang,
                    scheme: element.get_attr("scheme"),
                });
            }
            None => metadata.push(MetadataItem {
                id: element.get_attr("id"),
                property,
                value,
                lang,
                refined: vec![],
            }),
        }
        return;
    }

    // EPUB 2
    match (element.get_attr("name"), element.get_attr("content")) {
        (Some(name), Some(content)) => metadata.push(MetadataItem {
            id: None,
            property: name,
            value: content.normalize_whitespace(),
            lang: None,
            refined: vec![],
        }),
        _ => warn!("Skipping a meta element without property nor name/content pair."),
    }
}

fn language_of(element: &XmlElement) -> Option<String> {
    element
        .get_attr("xml:lang")
        .or_else(|| element.get_attr("lang"))
}

/// Parse the `<manifest>` element
fn parse_manifest(manifest_element: &XmlElement) -> Result<Vec<ManifestItem>, PublicationError> {
    let mut manifest = Vec::new();

    for element in manifest_element.find_children_by_name("item") {
        let id = element
            .get_attr("id")
            .ok_or_else(|| PublicationError::MissingRequiredAttribute {
                tag: element.tag_name(),
                attribute: "id".to_string(),
            })?;
        let href =
            element
                .get_attr("href")
                .ok_or_else(|| PublicationError::MissingRequiredAttribute {
                    tag: element.tag_name(),
                    attribute: "href".to_string(),
                })?;

        manifest.push(ManifestItem {
            id,
            href,
            media_type: element.get_attr("media-type"),
            properties: split_properties(element.get_attr("properties")),
            fallback: element.get_attr("fallback"),
        });
    }

    Ok(manifest)
}

/// Parse the `<spine>` element
fn parse_spine(spine_element: &XmlElement) -> Result<Spine, PublicationError> {
    let mut itemrefs = Vec::new();

    for element in spine_element.find_children_by_name("itemref") {
        let idref =
            element
                .get_attr("idref")
                .ok_or_else(|| PublicationError::MissingRequiredAttribute {
                    tag: element.tag_name(),
                    attribute: "idref".to_string(),
                })?;
        let linear = element
            .get_attr("linear")
            .map(|linear| linear.trim() != "no")
            .unwrap_or(true);

        itemrefs.push(ItemRef {
            idref,
            linear,
            properties: split_properties(element.get_attr("properties")),
        });
    }

    Ok(Spine {
        toc: spine_element.get_attr("toc").filter(|toc| !toc.is_empty()),
        page_progression: spine_element.get_attr("page-progression-direction"),
        itemrefs,
    })
}

fn split_properties(properties: Option<String>) -> Vec<String> {
    properties
        .map(|properties| properties.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use crate::{
        epub::{
            PACKAGE_BINDINGS,
            package::PackageDocument,
            tests_support::{PACKAGE_2, PACKAGE_3},
        },
        error::PublicationError,
        utils::XmlReader,
    };

    fn parse(content: &str) -> Result<PackageDocument, PublicationError> {
        let root = XmlReader::parse_with_namespaces(content, &PACKAGE_BINDINGS)?;
        PackageDocument::parse(&root, "OEBPS/content.opf")
    }

    #[test]
    fn test_parse_epub3_package() {
        let package = parse(PACKAGE_3).unwrap();

        assert_eq!(package.version, 3.0);
        assert_eq!(package.unique_identifier.as_deref(), Some("uid"));
        assert_eq!(package.manifest.len(), 4);
        assert!(package.manifest[0].has_property("nav"));
        assert_eq!(package.manifest_item("ch1").unwrap().href, "text/ch1.xhtml");
        assert_eq!(package.spine.toc.as_deref(), Some("ncx"));

        let modified = package.metadata_items("dcterms:modified").next().unwrap();
        assert_eq!(modified.value, "2024-05-01T10:00:00Z");
    }

    /// ID: pkg-manifest-order
    ///
    /// Manifest items keep their document order.
    #[test]
    fn test_parse_epub2_package() {
        let package = parse(PACKAGE_2).unwrap();

        assert_eq!(package.version, 2.0);
        let ids = package.manifest.iter().map(|item| item.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["ncx", "cover-img", "ch1", "notes"]);
        assert!(!package.spine.itemrefs[1].linear);

        let creator = package.metadata_items("dc:creator").next().unwrap();
        assert_eq!(creator.refinement("opf:role"), Some("aut"));

        let cover = package.metadata_items("cover").next().unwrap();
        assert_eq!(cover.value, "cover-img");
    }

    /// Refinements may precede the entry they refine
    #[test]
    fn test_parse_refinements() {
        let package = parse(
            r##"<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
              <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
                <meta refines="#t1" property="title-type">main</meta>
                <dc:title id="t1">Main</dc:title>
              </metadata>
              <manifest/>
              <spine/>
            </package>"##,
        )
        .unwrap();

        let title = package.metadata_items("dc:title").next().unwrap();
        assert_eq!(title.refinement("title-type"), Some("main"));
    }

    #[test]
    fn test_parse_version_default_and_missing_parts() {
        let package = parse(
            r#"<package xmlns="http://www.idpf.org/2007/opf"><manifest/><spine/></package>"#,
        )
        .unwrap();
        assert_eq!(package.version, 1.2);
        assert!(package.metadata.is_empty());

        assert_eq!(
            parse(r#"<package xmlns="http://www.idpf.org/2007/opf"><spine/></package>"#)
                .unwrap_err(),
            PublicationError::NonCanonicalFile {
                tag: "manifest".to_string()
            }
        );
        assert!(matches!(
            parse(
                r#"<package xmlns="http://www.idpf.org/2007/opf">
                  <manifest><item href="a.xhtml"/></manifest><spine/>
                </package>"#
            ),
            Err(PublicationError::MissingRequiredAttribute { .. })
        ));
    }
}
