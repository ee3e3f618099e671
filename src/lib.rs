//! Publication library
//!
//! A Rust library that normalizes e-book containers into one canonical manifest.
//!
//! EPUB packages (EPUB 2 and EPUB 3) and archives of bitmaps (CBZ, CBR, plain ZIP
//! of images) are read through the same [`Fetcher`](fetcher::Fetcher) abstraction
//! and produce the same [`Manifest`](types::Manifest): metadata, reading order,
//! resources and role-keyed navigation. Obfuscated fonts are deobfuscated
//! transparently when read through the opened publication.
//!
//! ## Features
//!
//! - Resolve EPUB navigation from either the NCX (EPUB 2) or the navigation document (EPUB 3).
//! - Read the encryption descriptor and deobfuscate IDPF and Adobe obfuscated fonts.
//! - Read Apple and Kobo display options as a fallback for rendition metadata.
//! - Assemble image publications, with cover and title inference.
//! - Register the positions, content and guided navigation services of a publication.
//!
//! ## Quick Start
//!
//! ```rust, ignore
//! # use lib_publication::publication::PublicationOpener;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let publication = PublicationOpener::default().open("path/to/book.epub")?;
//!
//! println!("Title: {:?}", publication.metadata().title.value());
//! for link in publication.manifest().table_of_contents() {
//!     println!("{} -> {}", link.title.as_deref().unwrap_or_default(), link.href);
//! }
//!
//! let _positions = publication.positions();
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! - `directory` (default): Enable [`DirectoryFetcher`](fetcher::DirectoryFetcher),
//!   which reads exploded containers from the file system.

pub mod asset;
pub mod epub;
pub mod error;
pub mod fetcher;
pub mod image;
pub mod mediatype;
pub mod publication;
pub mod services;
pub mod types;
pub mod utils;

pub use error::PublicationError;
pub use publication::{Publication, PublicationOpener};
pub use utils::DecodeBytes;
