//! Font deobfuscation
//!
//! EPUB allows embedded fonts to be obfuscated with a key derived from the
//! publication identifier. Both supported algorithms XOR the head of the file
//! with the key, so obfuscation and deobfuscation are the same operation.

use std::{cmp::min, collections::HashMap, sync::Arc};

use log::warn;
use sha1::{Digest, Sha1};

use crate::{
    error::PublicationError,
    fetcher::{Fetcher, ResourceTransformer, TransformingFetcher},
    types::Manifest,
};

pub const IDPF_ALGORITHM: &str = "http://www.idpf.org/2008/embedding";
pub const ADOBE_ALGORITHM: &str = "http://ns.adobe.com/pdf/enc#RC";

const IDPF_OBFUSCATED_LENGTH: usize = 1040;
const ADOBE_OBFUSCATED_LENGTH: usize = 1024;

/// Wraps `fetcher` so that obfuscated resources of `manifest` are read in clear
///
/// Without an identifier there is no key, so the fetcher is returned as is.
pub fn wrap_fetcher(
    fetcher: Arc<dyn Fetcher>,
    identifier: &str,
    manifest: &Manifest,
) -> Arc<dyn Fetcher> {
    if identifier.is_empty() {
        return fetcher;
    }

    Arc::new(TransformingFetcher::new(
        fetcher,
        Box::new(Deobfuscator::new(identifier, manifest)),
    ))
}

/// Deobfuscates the resources the manifest declares as obfuscated
pub struct Deobfuscator {
    identifier: String,

    /// Resource path to obfuscation algorithm
    algorithms: HashMap<String, String>,
}

impl Deobfuscator {
    pub fn new(identifier: &str, manifest: &Manifest) -> Self {
        let algorithms = manifest
            .links()
            .filter_map(|link| {
                link.encrypted
                    .as_ref()
                    .map(|encryption| (link.path().to_string(), encryption.algorithm.clone()))
            })
            .collect();

        Self {
            identifier: identifier.to_string(),
            algorithms,
        }
    }
}

impl ResourceTransformer for Deobfuscator {
    fn transform(&self, href: &str, data: Vec<u8>) -> Result<Vec<u8>, PublicationError> {
        match self.algorithms.get(href).map(String::as_str) {
            Some(IDPF_ALGORITHM) => Ok(idpf_font_obfuscation(&data, &self.identifier)),
            Some(ADOBE_ALGORITHM) => Ok(adobe_font_obfuscation(&data, &self.identifier)),
            _ => Ok(data),
        }
    }
}

/// Applies the IDPF font obfuscation algorithm
///
/// The key is the SHA-1 digest of the identifier stripped of XML whitespace.
/// The first 1040 bytes of the font are XORed with the repeated digest.
///
/// ## Parameters
/// - `data`: Font data, obfuscated or not
/// - `identifier`: The unique identifier of the publication
pub fn idpf_font_obfuscation(data: &[u8], identifier: &str) -> Vec<u8> {
    let identifier = identifier
        .chars()
        .filter(|ch| !matches!(ch, ' ' | '\t' | '\n' | '\r'))
        .collect::<String>();

    let mut hasher = Sha1::new();
    hasher.update(identifier.as_bytes());
    let key = hasher.finalize();

    let mut result = data.to_vec();
    for index in 0..min(IDPF_OBFUSCATED_LENGTH, result.len()) {
        result[index] ^= key[index % key.len()];
    }

    result
}

/// Applies the Adobe font obfuscation algorithm
///
/// The key is the 16 byte UUID of the identifier (`urn:uuid:` prefix and
/// dashes removed). The first 1024 bytes of the font are XORed with it. An
/// identifier that is not a UUID leaves the data unchanged.
pub fn adobe_font_obfuscation(data: &[u8], identifier: &str) -> Vec<u8> {
    let Some(key) = adobe_key(identifier) else {
        warn!(
            "The identifier \"{}\" is not a UUID, Adobe obfuscated fonts are left as is.",
            identifier
        );
        return data.to_vec();
    };

    let mut result = data.to_vec();
    for index in 0..min(ADOBE_OBFUSCATED_LENGTH, result.len()) {
        result[index] ^= key[index % key.len()];
    }

    result
}

fn adobe_key(identifier: &str) -> Option<[u8; 16]> {
    let hex = identifier
        .trim()
        .trim_start_matches("urn:uuid:")
        .replace('-', "");
    if hex.len() != 32 || !hex.is_ascii() {
        return None;
    }

    let mut key = [0u8; 16];
    for (index, byte) in key.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[index * 2..index * 2 + 2], 16).ok()?;
    }

    Some(key)
}
