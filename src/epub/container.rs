use crate::{
    error::PublicationError,
    fetcher::Fetcher,
    mediatype,
    utils::{XmlElement, resolve_href},
};

pub const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Locates the package document of an EPUB container
///
/// ## Return
/// - `Ok(String)`: The container-relative path of the package document
/// - `Err(PublicationError)`: `container.xml` is missing, unreadable or names no package document
pub fn root_file_path(fetcher: &dyn Fetcher) -> Result<String, PublicationError> {
    let root = match fetcher.read_as_xml(CONTAINER_PATH, &[]) {
        Ok(root) => root,
        Err(PublicationError::ResourceNotFound { .. }) => {
            return Err(PublicationError::NonCanonicalEpub {
                expected_file: CONTAINER_PATH.to_string(),
            });
        }
        Err(err) => return Err(err),
    };

    parse_container(&root)
}

/// Parses the `container.xml` document
///
/// According to the OCF specification, `container.xml` lists one or more
/// `rootfile` elements. The first one pointing to an OPF package document is
/// used; a container that declares no media type falls back to its first
/// `rootfile`.
pub fn parse_container(root: &XmlElement) -> Result<String, PublicationError> {
    let rootfiles = root.find_elements_by_name("rootfile").collect::<Vec<_>>();
    let rootfile = rootfiles
        .iter()
        .find(|rootfile| {
            rootfile
                .get_attr("media-type")
                .is_some_and(|media_type| mediatype::matches(&media_type, mediatype::OPF))
        })
        .or_else(|| rootfiles.first())
        .ok_or_else(|| PublicationError::NonCanonicalFile {
            tag: "rootfile".to_string(),
        })?;

    let full_path =
        rootfile
            .get_attr("full-path")
            .ok_or_else(|| PublicationError::MissingRequiredAttribute {
                tag: "rootfile".to_string(),
                attribute: "full-path".to_string(),
            })?;

    Ok(resolve_href("", &full_path))
}

#[cfg(test)]
mod tests {
    use crate::{
        epub::container::{parse_container, root_file_path},
        error::PublicationError,
        fetcher::tests_support::zip_fetcher,
        utils::XmlReader,
    };

    /// ID: ocf-package-multiple
    ///
    /// The first rootfile pointing to a package document is the default rendition.
    #[test]
    fn test_container_multiple_rootfiles() {
        let container = XmlReader::parse(
            r#"<container xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
              <rootfiles>
                <rootfile full-path="pdf/book.pdf" media-type="application/pdf"/>
                <rootfile full-path="EPUB/package.opf" media-type="application/oebps-package+xml"/>
                <rootfile full-path="EPUB/other.opf" media-type="application/oebps-package+xml"/>
              </rootfiles>
            </container>"#,
        )
        .unwrap();

        assert_eq!(parse_container(&container).unwrap(), "EPUB/package.opf");
    }

    #[test]
    fn test_container_without_rootfile() {
        let container = XmlReader::parse("<container><rootfiles/></container>").unwrap();
        assert_eq!(
            parse_container(&container).unwrap_err(),
            PublicationError::NonCanonicalFile {
                tag: "rootfile".to_string()
            }
        );

        let container =
            XmlReader::parse(r#"<container><rootfiles><rootfile/></rootfiles></container>"#)
                .unwrap();
        assert_eq!(
            parse_container(&container).unwrap_err(),
            PublicationError::MissingRequiredAttribute {
                tag: "rootfile".to_string(),
                attribute: "full-path".to_string()
            }
        );
    }

    #[test]
    fn test_root_file_path_requires_container() {
        let fetcher = zip_fetcher(&[("content.opf", b"<package/>")]);
        assert_eq!(
            root_file_path(fetcher.as_ref()).unwrap_err(),
            PublicationError::NonCanonicalEpub {
                expected_file: "META-INF/container.xml".to_string()
            }
        );
    }
}
