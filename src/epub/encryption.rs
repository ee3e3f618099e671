use log::{debug, warn};

use crate::{
    epub::{NAMESPACE_COMP, NAMESPACE_ENC, NAMESPACE_SIG},
    error::PublicationError,
    fetcher::Fetcher,
    types::{Encryption, EncryptionMap},
    utils::{XmlElement, resolve_href},
};

pub const ENCRYPTION_PATH: &str = "META-INF/encryption.xml";

/// Scheme of resources protected with Readium LCP
pub const LCP_SCHEME: &str = "http://readium.org/2014/01/lcp";

const ENCRYPTION_BINDINGS: [(&str, &str); 3] = [
    (NAMESPACE_ENC, "enc"),
    (NAMESPACE_SIG, "ds"),
    (NAMESPACE_COMP, "comp"),
];

/// Reads the encryption descriptor of a container
///
/// Encryption is optional: a container without `META-INF/encryption.xml`, or
/// with one that cannot be parsed, has no encrypted resource.
pub fn parse_encryption_data(fetcher: &dyn Fetcher) -> EncryptionMap {
    match read_encryption(fetcher) {
        Ok(encryption) => encryption,
        Err(err) => {
            debug!("No usable encryption descriptor: {}", err);
            EncryptionMap::new()
        }
    }
}

fn read_encryption(fetcher: &dyn Fetcher) -> Result<EncryptionMap, PublicationError> {
    let root = fetcher.read_as_xml(ENCRYPTION_PATH, &ENCRYPTION_BINDINGS)?;
    Ok(parse_encryption(&root))
}

/// Parses the `encryption` element of an encryption descriptor
///
/// Each `EncryptedData` record is keyed by its `CipherReference@URI`, taken
/// relative to the container root. Records without algorithm or URI are skipped.
pub fn parse_encryption(root: &XmlElement) -> EncryptionMap {
    let mut encryption = EncryptionMap::new();

    for data in root.find_children_by_name("EncryptedData") {
        let algorithm = data
            .find_children_by_name("EncryptionMethod")
            .next()
            .and_then(|method| method.get_attr("Algorithm"));
        let uri = data
            .find_elements_by_name("CipherReference")
            .next()
            .and_then(|reference| reference.get_attr("URI"));

        let (Some(algorithm), Some(uri)) = (algorithm, uri) else {
            warn!("Skipping an EncryptedData record without algorithm or cipher reference.");
            continue;
        };

        let compression = data.find_elements_by_name("Compression").next();
        let scheme = data
            .find_elements_by_name("RetrievalMethod")
            .filter_map(|method| method.get_attr("URI"))
            .any(|uri| uri.contains("license.lcpl"))
            .then(|| LCP_SCHEME.to_string());

        encryption.insert(
            resolve_href("", &uri),
            Encryption {
                algorithm,
                compression: compression
                    .and_then(|element| element.get_attr("Method"))
                    .and_then(|method| match method.trim() {
                        "8" => Some("deflate".to_string()),
                        _ => None,
                    }),
                original_length: compression
                    .and_then(|element| element.get_attr("OriginalLength"))
                    .and_then(|length| length.trim().parse::<u64>().ok()),
                scheme,
            },
        );
    }

    encryption
}

#[cfg(test)]
mod tests {
    use crate::{
        epub::encryption::{LCP_SCHEME, parse_encryption_data},
        fetcher::tests_support::zip_fetcher,
        types::Encryption,
    };

    const ENCRYPTION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<encryption xmlns="urn:oasis:names:tc:opendocument:xmlns:container"
    xmlns:enc="http://www.w3.org/2001/04/xmlenc#"
    xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
  <enc:EncryptedData>
    <enc:EncryptionMethod Algorithm="http://www.idpf.org/2008/embedding"/>
    <enc:CipherData><enc:CipherReference URI="OEBPS/fonts/a.otf"/></enc:CipherData>
  </enc:EncryptedData>
  <enc:EncryptedData>
    <enc:EncryptionMethod Algorithm="http://www.w3.org/2001/04/xmlenc#aes256-cbc"/>
    <ds:KeyInfo><ds:RetrievalMethod URI="license.lcpl#/encryption/content_key"/></ds:KeyInfo>
    <enc:CipherData><enc:CipherReference URI="OEBPS/text/ch1.xhtml"/></enc:CipherData>
    <enc:EncryptionProperties>
      <enc:EncryptionProperty xmlns:ns="http://www.idpf.org/2016/encryption#compression">
        <ns:Compression Method="8" OriginalLength="13291"/>
      </enc:EncryptionProperty>
    </enc:EncryptionProperties>
  </enc:EncryptedData>
  <enc:EncryptedData>
    <enc:EncryptionMethod Algorithm="http://ns.adobe.com/pdf/enc#RC"/>
  </enc:EncryptedData>
</encryption>"#;

    #[test]
    fn test_parse_encryption_records() {
        let fetcher = zip_fetcher(&[("META-INF/encryption.xml", ENCRYPTION.as_bytes())]);
        let encryption = parse_encryption_data(fetcher.as_ref());

        assert_eq!(encryption.len(), 2);

        assert_eq!(
            encryption["OEBPS/fonts/a.otf"],
            Encryption {
                algorithm: "http://www.idpf.org/2008/embedding".to_string(),
                compression: None,
                original_length: None,
                scheme: None,
            }
        );

        let chapter = &encryption["OEBPS/text/ch1.xhtml"];
        assert_eq!(chapter.compression.as_deref(), Some("deflate"));
        assert_eq!(chapter.original_length, Some(13291));
        assert_eq!(chapter.scheme.as_deref(), Some(LCP_SCHEME));
    }

    /// Missing or malformed descriptors degrade to an empty map
    #[test]
    fn test_parse_encryption_degrades() {
        let fetcher = zip_fetcher(&[("mimetype", b"application/epub+zip")]);
        assert!(parse_encryption_data(fetcher.as_ref()).is_empty());

        let fetcher = zip_fetcher(&[(
            "META-INF/encryption.xml",
            b"<encryption><broken></encryption>",
        )]);
        assert!(parse_encryption_data(fetcher.as_ref()).is_empty());
    }
}
