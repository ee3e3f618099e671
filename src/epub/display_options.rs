use log::debug;

use crate::{fetcher::Fetcher, types::DisplayOptions, utils::XmlElement};

/// Vendor display options files, in the order they are tried
pub const DISPLAY_OPTIONS_PATHS: [&str; 2] = [
    "META-INF/com.apple.ibooks.display-options.xml",
    "META-INF/com.kobobooks.display-options.xml",
];

/// Reads the vendor display options of a container
///
/// The first candidate that can be fetched and parsed wins and later ones are
/// not read. A container with no readable candidate has no display options.
pub fn parse_display_options(fetcher: &dyn Fetcher) -> DisplayOptions {
    DISPLAY_OPTIONS_PATHS
        .iter()
        .find_map(|path| match fetcher.read_as_xml(path, &[]) {
            Ok(root) => Some(root),
            Err(err) => {
                debug!("No display options from \"{}\": {}", path, err);
                None
            }
        })
        .map(|root| parse_platform_options(&root))
        .unwrap_or_default()
}

/// Collects the `option` elements of the first `platform` element
fn parse_platform_options(root: &XmlElement) -> DisplayOptions {
    let mut options = DisplayOptions::new();

    let Some(platform) = root.find_elements_by_name("platform").next() else {
        return options;
    };

    for option in platform.find_children_by_name("option") {
        let name = option.get_attr("name").unwrap_or_default();
        let value = option.text();
        if name.is_empty() || value.is_empty() {
            continue;
        }

        options.insert(name, value);
    }

    options
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        epub::display_options::parse_display_options,
        fetcher::tests_support::{CountingFetcher, zip_fetcher},
    };

    const IBOOKS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<display_options>
  <platform name="*">
    <option name="specified-fonts">true</option>
    <option name="interactive">false</option>
  </platform>
  <platform name="iphone">
    <option name="orientation-lock">portrait-only</option>
  </platform>
</display_options>"#;

    const KOBO: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<display_options>
  <platform name="*">
    <option name="fixed-layout">true</option>
    <option name="">ignored</option>
    <option name="empty"></option>
  </platform>
</display_options>"#;

    /// Only the secondary vendor file is present
    #[test]
    fn test_secondary_vendor() {
        let fetcher = zip_fetcher(&[(
            "META-INF/com.kobobooks.display-options.xml",
            KOBO.as_bytes(),
        )]);
        let options = parse_display_options(fetcher.as_ref());

        assert_eq!(options.len(), 1);
        assert_eq!(options.get("fixed-layout").map(String::as_str), Some("true"));
    }

    /// The primary vendor file wins and the secondary one is never read
    #[test]
    fn test_primary_vendor_short_circuits() {
        let fetcher = Arc::new(CountingFetcher::new(zip_fetcher(&[
            ("META-INF/com.apple.ibooks.display-options.xml", IBOOKS.as_bytes()),
            ("META-INF/com.kobobooks.display-options.xml", KOBO.as_bytes()),
        ])));
        let options = parse_display_options(fetcher.as_ref());

        let names = options.keys().map(String::as_str).collect::<Vec<_>>();
        assert_eq!(names, vec!["specified-fonts", "interactive"]);
        assert_eq!(fetcher.reads(), 1);
    }

    #[test]
    fn test_no_vendor() {
        let fetcher = zip_fetcher(&[("mimetype", b"application/epub+zip")]);
        assert!(parse_display_options(fetcher.as_ref()).is_empty());
    }

    /// A malformed primary file falls through to the secondary one
    #[test]
    fn test_malformed_primary_vendor() {
        let fetcher = zip_fetcher(&[
            ("META-INF/com.apple.ibooks.display-options.xml", b"<display_options><platform>"),
            ("META-INF/com.kobobooks.display-options.xml", KOBO.as_bytes()),
        ]);
        let options = parse_display_options(fetcher.as_ref());
        assert_eq!(options.get("fixed-layout").map(String::as_str), Some("true"));
    }
}
