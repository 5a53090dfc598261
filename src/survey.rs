//! Canned searches over a download library.
//!
//! Each survey bundles what to track, how deeply to read it and which
//! entries to report. Running one is a matter of scanning containers into
//! a registry built from [`Survey::registry`] and calling
//! [`ResourceRegistry::report`] with [`Survey::query`].

use crate::error::Result;
use crate::filter::{GroupFilter, NameFilter, SearchFilter};
use crate::index::Tag;
use crate::registry::{Gate, Report, ReportQuery, ResourceRegistry, ScanOptions, ScanSummary};
use crate::resource::FetchDepth;
use std::path::Path;
use tracing::{info, warn};

/// Group of the shared Maxis mesh set.
pub const MESH_GROUP: Tag = Tag([0x00, 0x00, 0x05, 0x1C]);

/// Types searched when the user picks no type.
pub const DEFAULT_SEARCH_TYPES: [Tag; 7] = [
    Tag::BCON,
    Tag::BHAV,
    Tag::CTSS,
    Tag::OBJD,
    Tag::TTAB,
    Tag::TTAS,
    Tag::STR,
];

/// Types whose global overrides make two mods conflict.
pub const CONFLICT_TYPES: [Tag; 8] = [
    Tag::BCON,
    Tag::BHAV,
    Tag::GZPS,
    Tag::TTAB,
    Tag::TTAS,
    Tag::STR,
    Tag::OBJD,
    Tag::OBJF,
];

/// Types compared between packages.
pub const COMPARE_TYPES: [Tag; 3] = [Tag::BCON, Tag::BHAV, Tag::JPG];

/// String tables that hold script source rather than text.
pub const SCRIPT_TABLE_NAMES: [&str; 3] = ["Lua Scripts", "Lua Script", "More Lua Scripts"];

/// A search definition: filter, scan options and report selection.
#[derive(Debug, Clone)]
pub struct Survey {
    /// What to track.
    pub filter: SearchFilter,
    /// How to read it.
    pub options: ScanOptions,
    /// What to report.
    pub query: ReportQuery,
}

impl Survey {
    /// Global overrides carried by two or more packages.
    pub fn conflicts() -> Self {
        Survey {
            filter: SearchFilter::new(CONFLICT_TYPES).with_group(GroupFilter::global()),
            options: ScanOptions::new().with_depth(FetchDepth::Prefix),
            query: ReportQuery {
                min_files: 2,
                ..ReportQuery::default()
            },
        }
    }

    /// Global overrides carried by two or more packages of a chosen folder.
    ///
    /// Same as [`conflicts`](Self::conflicts) without property sets (GZPS).
    pub fn conflicts_in_folder() -> Self {
        Survey {
            filter: SearchFilter::new(object_conflict_types()).with_group(GroupFilter::global()),
            ..Self::conflicts()
        }
    }

    /// Global overrides shared between one chosen package and the library.
    ///
    /// Seed the registry from the chosen package, then scan the library
    /// with [`library_options`](Self::library_options) so only keys the
    /// chosen package carries are tracked.
    pub fn conflicts_with_file() -> Self {
        Self::conflicts_in_folder()
    }

    /// Meshes overriding the shared Maxis mesh group.
    pub fn duplicate_meshes() -> Self {
        Survey {
            filter: SearchFilter::new([Tag::GMDC]).with_group(GroupFilter::Exact(MESH_GROUP)),
            options: ScanOptions::new().with_depth(FetchDepth::KeyOnly),
            query: ReportQuery {
                min_files: 2,
                ..ReportQuery::default()
            },
        }
    }

    /// String tables with translations, empty strings or irregular records.
    pub fn translations() -> Self {
        Survey {
            filter: SearchFilter::new([Tag::CTSS, Tag::TTAS, Tag::STR]).with_name(NameFilter::Exclude(
                SCRIPT_TABLE_NAMES.iter().map(|s| s.to_string()).collect(),
            )),
            options: ScanOptions::new().with_gate(Gate::FlaggedStrings),
            query: ReportQuery::default(),
        }
    }

    /// Resources whose contents differ between the compared packages.
    pub fn compare_changed() -> Self {
        Self::compare(FetchDepth::Full, ReportQuery {
            min_versions: 2,
            ..ReportQuery::default()
        })
    }

    /// Resources carried unchanged by several compared packages.
    pub fn compare_unchanged() -> Self {
        Self::compare(FetchDepth::Full, ReportQuery {
            min_files: 2,
            max_versions: Some(1),
            ..ReportQuery::default()
        })
    }

    /// Resources present in only one of the compared packages.
    pub fn compare_added_removed() -> Self {
        Self::compare(FetchDepth::Prefix, ReportQuery {
            max_files: Some(1),
            ..ReportQuery::default()
        })
    }

    fn compare(depth: FetchDepth, query: ReportQuery) -> Self {
        Survey {
            filter: SearchFilter::new(COMPARE_TYPES),
            options: ScanOptions::new().with_depth(depth),
            query,
        }
    }

    /// A user-defined search reported in full.
    pub fn custom(filter: SearchFilter) -> Self {
        Survey {
            filter,
            options: ScanOptions::new(),
            query: ReportQuery::default(),
        }
    }

    /// Creates an empty registry for this survey.
    pub fn registry(&self) -> ResourceRegistry {
        ResourceRegistry::new(self.filter.clone())
    }

    /// Options for scanning a library after seeding: same depth, no new keys.
    pub fn library_options(&self) -> ScanOptions {
        self.options.clone().allow_new_keys(false)
    }

    /// Scans `dir` and reports.
    ///
    /// # Errors
    ///
    /// Returns `UnreadableFile` if `dir` is not a directory.
    pub fn run_directory(&self, dir: &Path) -> Result<(Report, ScanSummary)> {
        let mut registry = self.registry();
        let summary = registry.scan_directory(dir, &self.options)?;
        Ok((registry.report(&self.query), summary))
    }

    /// Scans each of `files` and reports.
    ///
    /// Files that fail to scan are logged and skipped. File lists are only
    /// printed when more than one package was given.
    pub fn run_files<P: AsRef<Path>>(&self, files: &[P]) -> (Report, ScanSummary) {
        let mut registry = self.registry();
        let mut summary = ScanSummary::default();
        for file in files {
            scan_into(&mut registry, file.as_ref(), &self.options, &mut summary);
        }
        let query = ReportQuery {
            list_files: self.query.list_files && files.len() > 1,
            ..self.query.clone()
        };
        (registry.report(&query), summary)
    }

    /// Seeds from `package`, then scans `dir` for the seeded keys only.
    ///
    /// # Errors
    ///
    /// Returns the seed package's scan error, or `UnreadableFile` if `dir`
    /// is not a directory.
    pub fn run_seeded(&self, package: &Path, dir: &Path) -> Result<(Report, ScanSummary)> {
        let mut registry = self.registry();
        let seed = registry.scan_file(package, &self.options)?;
        info!(tracked = registry.len(), "Seeded registry from {}", package.display());

        let mut summary = registry.scan_directory(dir, &self.library_options())?;
        summary.files_scanned += 1;
        summary.stats += seed;
        Ok((registry.report(&self.query), summary))
    }
}

/// [`CONFLICT_TYPES`] without property sets.
fn object_conflict_types() -> impl Iterator<Item = Tag> {
    CONFLICT_TYPES.into_iter().filter(|&t| t != Tag::GZPS)
}

fn scan_into(registry: &mut ResourceRegistry, file: &Path, options: &ScanOptions, summary: &mut ScanSummary) {
    match registry.scan_file(file, options) {
        Ok(stats) => {
            summary.files_scanned += 1;
            summary.stats += stats;
        }
        Err(e) => {
            warn!(path = %file.display(), error = %e, "Skipping package");
            summary.files_skipped += 1;
        }
    }
}
