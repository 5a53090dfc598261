//! # Sims 2 Package Survey
//!
//! Reads The Sims 2 DBPF (`.package`) containers and surveys whole download
//! libraries for resources that several mods override, meshes that replace
//! shared Maxis assets, and string tables worth cleaning.
//!
//! ## Features
//!
//! - **Fetch depths**: read only the index, a 74-byte prefix, a bounded
//!   amount, or whole payloads, so library-wide scans stay cheap
//! - **Tolerant**: empty, truncated and malformed files are logged and
//!   skipped; a bad mod never aborts a scan
//! - **RefPack decompression**: with early cutoff and partial output for
//!   truncated streams
//! - **Field diffs**: changed 16-bit fields between two versions of a
//!   behaviour or constant resource
//!
//! ## Architecture
//!
//! 1. **Header**: locates the index (count, offset, length)
//! 2. **Index**: fixed-stride entries naming each resource by
//!    (type, group, class id, instance) and pointing at its payload
//! 3. **Resource**: payload read at a [`FetchDepth`], decompressed when the
//!    stored length matches the descriptor
//! 4. **Registry**: every tracked key with the files and versions that carry it
//! 5. **Report / Diff / Classifier**: views over the registry
//!
//! ## Binary Layout
//!
//! ```text
//! [Header - 96 bytes]
//!   - Signature: "DBPF"
//!   - Version 1.1, index version 7.x
//!   - Index entry count @ 36, offset @ 40, length @ 44
//!
//! [Payloads - variable size]
//!   - Raw, or RefPack stream whose first u32 equals the stored length
//!
//! [Index - count * stride bytes]
//!   - type, group, instance, [class id], offset, length
//! ```
//!
//! ## Examples
//!
//! ### Finding conflicts
//!
//! ```no_run
//! use simidge::survey::Survey;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (report, summary) = Survey::conflicts().run_directory(Path::new("Downloads"))?;
//! println!("{}", report);
//! println!("{} packages skipped", summary.files_skipped);
//! # Ok(())
//! # }
//! ```
//!
//! ### Custom search
//!
//! ```no_run
//! use simidge::{FetchDepth, ReportQuery, ResourceRegistry, ScanOptions, SearchFilter, Tag};
//! use simidge::filter::{parse_content, NameFilter};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let filter = SearchFilter::new([Tag::STR])
//!     .with_name(NameFilter::contains("catalog"))
//!     .with_content(parse_content(Some(Tag::STR), "sofa")?);
//! let mut registry = ResourceRegistry::new(filter);
//! registry.scan_file("objects.package", &ScanOptions::new().with_depth(FetchDepth::Full))?;
//! print!("{}", registry.report(&ReportQuery { list_files: false, ..ReportQuery::default() }));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compression;
pub mod diff;
pub mod error;
pub mod filter;
pub mod header;
pub mod index;
pub mod registry;
pub mod resource;
pub mod simpe;
pub mod strings;
pub mod survey;
pub mod utils;
pub mod writer;

// Settings file support (only compiled when the cli feature is enabled)
#[cfg(feature = "cli")]
pub mod config;

// Re-export main types for convenience
pub use compression::{compress, decompress, Decompressed, StreamStatus};
pub use diff::{FieldChange, RecordLayout, VersionDiff};
pub use error::{DbpfError, Result};
pub use filter::{ContentFilter, GroupFilter, NameFilter, SearchFilter};
pub use header::PackageHeader;
pub use index::{IndexIterator, ResourceDescriptor, ResourceKey, Tag};
pub use registry::{
    Gate, Insertion, Report, ReportQuery, ResourceRegistry, ScanOptions, ScanStats, ScanSummary,
    TrackedResource,
};
pub use resource::{FetchDepth, Resource, Summary};
pub use strings::{classify_strings, needs_review, Classification, FlagReason};
pub use survey::Survey;
pub use writer::PackageWriter;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
