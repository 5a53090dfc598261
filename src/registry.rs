//! Multi-file resource registry.
//!
//! A [`ResourceRegistry`] is owned by one search. Scanning a container
//! inserts every resource that passes the search filter; a key seen in more
//! than one container accumulates one version per file. Reports then select
//! resources by how many files carry them and how many distinct versions
//! exist.
//!
//! Insertion is the only mutation. Parallel scans should each fill their
//! own registry and [`merge`](ResourceRegistry::merge) the shards afterwards.

use crate::diff::VersionDiff;
use crate::error::{DbpfError, Result};
use crate::filter::SearchFilter;
use crate::header::PackageHeader;
use crate::index::{IndexIterator, ResourceKey, Tag};
use crate::resource::{FetchDepth, Resource, Summary};
use crate::strings::needs_review;
use memmap2::Mmap;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs::File;
use std::io;
use std::ops::AddAssign;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// File suffix of scanned containers, matched case-insensitively.
pub const PACKAGE_EXTENSION: &str = ".package";

/// A resource key together with every file and version it was seen in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedResource {
    /// The resource as first seen.
    pub resource: Resource,

    /// Files carrying the key, in discovery order, without repeats.
    pub files: Vec<String>,

    /// Contents per file, parallel to `files`.
    pub versions: Vec<Vec<u8>>,
}

impl TrackedResource {
    /// Starts tracking `resource` as found in `filename`.
    pub fn new(resource: Resource, filename: &str) -> Self {
        let versions = vec![resource.contents.clone()];
        Self {
            resource,
            files: vec![filename.to_string()],
            versions,
        }
    }

    /// Returns the tracked key.
    pub fn key(&self) -> &ResourceKey {
        &self.resource.key
    }

    /// Records another sighting.
    ///
    /// Returns false, leaving everything unchanged, if `filename` is
    /// already recorded.
    pub fn add_version(&mut self, filename: &str, contents: Vec<u8>) -> bool {
        if self.files.iter().any(|f| f == filename) {
            return false;
        }
        self.files.push(filename.to_string());
        self.versions.push(contents);
        true
    }

    /// Returns the number of distinct byte sequences among the versions.
    pub fn distinct_versions(&self) -> usize {
        self.versions.iter().collect::<HashSet<_>>().len()
    }

    /// Compares the first two recorded versions.
    pub fn diff(&self) -> VersionDiff {
        VersionDiff::from_versions(&self.versions, self.resource.key.rtype)
    }
}

/// Outcome of a single insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    /// First sighting of the key.
    Created,
    /// Known key, new file.
    NewVersion,
    /// Known key and file; nothing changed.
    Duplicate,
    /// Type not tracked, or new key while discovery is off.
    Dropped,
}

/// Extra acceptance check run after the search filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gate {
    /// Accept everything the filter accepts.
    #[default]
    All,
    /// Accept only string tables worth reviewing.
    FlaggedStrings,
}

impl Gate {
    fn admits(self, resource: &Resource) -> bool {
        match self {
            Gate::All => true,
            Gate::FlaggedStrings => needs_review(resource),
        }
    }
}

/// How a scan reads and admits resources.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// How much of each payload to read.
    pub depth: FetchDepth,
    /// Whether keys not yet in the registry may be added.
    pub allow_new_keys: bool,
    /// Extra acceptance check.
    pub gate: Gate,
    /// Set to stop a directory scan before the next file.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl ScanOptions {
    /// Full-depth scan that discovers new keys.
    pub fn new() -> Self {
        Self {
            allow_new_keys: true,
            ..Self::default()
        }
    }

    /// Sets the fetch depth.
    pub fn with_depth(mut self, depth: FetchDepth) -> Self {
        self.depth = depth;
        self
    }

    /// Sets whether new keys may be added.
    pub fn allow_new_keys(mut self, allow: bool) -> Self {
        self.allow_new_keys = allow;
        self
    }

    /// Sets the acceptance gate.
    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.gate = gate;
        self
    }

    /// Attaches a cancellation flag.
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// Counters for one or more scanned containers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ScanStats {
    /// Index entries visited.
    pub entries: usize,
    /// Resources that passed every filter.
    pub matched: usize,
    /// New keys added.
    pub created: usize,
    /// New versions of known keys.
    pub new_versions: usize,
    /// Repeat sightings from the same file.
    pub duplicates: usize,
    /// Matched resources that were not stored.
    pub dropped: usize,
    /// Entries whose payload could not be read.
    pub unreadable: usize,
}

impl ScanStats {
    fn record(&mut self, insertion: Insertion) {
        match insertion {
            Insertion::Created => self.created += 1,
            Insertion::NewVersion => self.new_versions += 1,
            Insertion::Duplicate => self.duplicates += 1,
            Insertion::Dropped => self.dropped += 1,
        }
    }
}

impl AddAssign for ScanStats {
    fn add_assign(&mut self, other: Self) {
        self.entries += other.entries;
        self.matched += other.matched;
        self.created += other.created;
        self.new_versions += other.new_versions;
        self.duplicates += other.duplicates;
        self.dropped += other.dropped;
        self.unreadable += other.unreadable;
    }
}

/// Outcome of a directory scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ScanSummary {
    /// Containers scanned successfully.
    pub files_scanned: usize,
    /// Containers skipped after an error.
    pub files_skipped: usize,
    /// Whether the scan stopped early on request.
    pub cancelled: bool,
    /// Totals over the scanned containers.
    pub stats: ScanStats,
}

/// Selection of registry entries for a report.
///
/// Both ranges are inclusive; `None` leaves the upper end open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportQuery {
    /// Fewest files carrying the key.
    pub min_files: usize,
    /// Most files carrying the key.
    pub max_files: Option<usize>,
    /// Fewest distinct versions.
    pub min_versions: usize,
    /// Most distinct versions.
    pub max_versions: Option<usize>,
    /// Whether to list the carrying files under each entry.
    pub list_files: bool,
}

impl Default for ReportQuery {
    fn default() -> Self {
        Self {
            min_files: 1,
            max_files: None,
            min_versions: 1,
            max_versions: None,
            list_files: true,
        }
    }
}

impl ReportQuery {
    /// Returns true if `tracked` falls inside both ranges.
    pub fn selects(&self, tracked: &TrackedResource) -> bool {
        let files = tracked.files.len();
        let versions = tracked.distinct_versions();
        files >= self.min_files
            && self.max_files.map_or(true, |max| files <= max)
            && versions >= self.min_versions
            && self.max_versions.map_or(true, |max| versions <= max)
    }
}

/// One reported resource.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ReportEntry {
    /// Resource key.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub key: ResourceKey,
    /// Embedded resource name, if readable.
    pub name: Option<String>,
    /// Type mnemonic.
    pub rtype: String,
    /// Group as hex.
    pub group: String,
    /// Class id as hex.
    pub class_id: String,
    /// Instance as hex.
    pub instance: String,
    /// Files carrying the key.
    pub files: Vec<String>,
    /// Number of distinct versions.
    pub distinct_versions: usize,
}

impl ReportEntry {
    fn from_tracked(tracked: &TrackedResource) -> Self {
        let key = tracked.key();
        Self {
            key: *key,
            name: tracked.resource.name.clone(),
            rtype: key.rtype.mnemonic(),
            group: key.group.to_string(),
            class_id: key.class_id.to_string(),
            instance: key.instance.to_string(),
            files: tracked.files.clone(),
            distinct_versions: tracked.distinct_versions(),
        }
    }

    /// Returns the printable summary of this entry.
    pub fn summary(&self) -> Summary<'_> {
        Summary {
            name: self.name.as_deref(),
            key: &self.key,
        }
    }
}

/// Listing produced by [`ResourceRegistry::report`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Report {
    /// Selected entries in registry order.
    pub entries: Vec<ReportEntry>,
    /// Whether the text form lists files.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub list_files: bool,
}

impl Report {
    /// Returns the number of reported entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was selected.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            write!(f, "{}", entry.summary())?;
            if self.list_files {
                writeln!(f, "Packages Using This Procedure:")?;
                for file in &entry.files {
                    writeln!(f, "\t{}", file)?;
                }
            }
            writeln!(f)?;
        }
        write!(f, "{} results found.", self.entries.len())
    }
}

/// Resources collected by one search, partitioned by type.
#[derive(Debug, Clone)]
pub struct ResourceRegistry {
    filter: SearchFilter,
    partitions: Vec<(Tag, BTreeMap<ResourceKey, TrackedResource>)>,
}

impl ResourceRegistry {
    /// Creates an empty registry tracking the filter's types, in its order.
    pub fn new(filter: SearchFilter) -> Self {
        let mut partitions: Vec<(Tag, BTreeMap<ResourceKey, TrackedResource>)> = Vec::new();
        for &rtype in &filter.types {
            if !partitions.iter().any(|(tag, _)| *tag == rtype) {
                partitions.push((rtype, BTreeMap::new()));
            }
        }
        Self { filter, partitions }
    }

    /// Returns the search filter.
    pub fn filter(&self) -> &SearchFilter {
        &self.filter
    }

    fn partition(&self, rtype: Tag) -> Option<&BTreeMap<ResourceKey, TrackedResource>> {
        self.partitions
            .iter()
            .find(|(tag, _)| *tag == rtype)
            .map(|(_, map)| map)
    }

    fn partition_mut(&mut self, rtype: Tag) -> Option<&mut BTreeMap<ResourceKey, TrackedResource>> {
        self.partitions
            .iter_mut()
            .find(|(tag, _)| *tag == rtype)
            .map(|(_, map)| map)
    }

    /// Records `resource` as found in `filename`.
    ///
    /// Repeating a (key, filename) pair changes nothing.
    pub fn insert(&mut self, resource: Resource, filename: &str, allow_new: bool) -> Insertion {
        let Some(partition) = self.partition_mut(resource.key.rtype) else {
            return Insertion::Dropped;
        };

        match partition.get_mut(&resource.key) {
            Some(tracked) => {
                if tracked.add_version(filename, resource.contents) {
                    Insertion::NewVersion
                } else {
                    Insertion::Duplicate
                }
            }
            None if allow_new => {
                partition.insert(resource.key, TrackedResource::new(resource, filename));
                Insertion::Created
            }
            None => Insertion::Dropped,
        }
    }

    /// Scans one container already in memory.
    ///
    /// # Arguments
    ///
    /// * `filename` - Name recorded for every resource found
    /// * `data` - Whole container bytes
    /// * `options` - Fetch depth, discovery and gate
    ///
    /// # Errors
    ///
    /// Returns `EmptyContainer`, `TruncatedData` or `InvalidFormat` if the
    /// header or index geometry cannot be read. Unreadable payloads are
    /// counted in the stats and skipped.
    pub fn scan_container(&mut self, filename: &str, data: &[u8], options: &ScanOptions) -> Result<ScanStats> {
        let header = PackageHeader::parse(data)?;
        let mut stats = ScanStats::default();

        for descriptor in IndexIterator::new(data, &header)? {
            stats.entries += 1;
            let descriptor = match descriptor {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    warn!(file = filename, error = %e, "Index entry unreadable");
                    stats.unreadable += 1;
                    continue;
                }
            };

            if !self.filter.accepts_key(&descriptor.key) {
                continue;
            }

            let resource = match Resource::read(data, &descriptor, options.depth) {
                Ok(resource) => resource,
                Err(e) => {
                    warn!(file = filename, key = %descriptor.key, error = %e, "Skipping unreadable resource");
                    stats.unreadable += 1;
                    continue;
                }
            };

            if !self.filter.accepts_resource(&resource) || !options.gate.admits(&resource) {
                continue;
            }

            stats.matched += 1;
            let insertion = self.insert(resource, filename, options.allow_new_keys);
            stats.record(insertion);
        }

        Ok(stats)
    }

    /// Scans one container file.
    ///
    /// The file is recorded under its file name, without directories.
    ///
    /// # Errors
    ///
    /// Returns `UnreadableFile` if the file cannot be opened or mapped, and
    /// the [`scan_container`](Self::scan_container) errors otherwise.
    #[instrument(skip(self, path, options), fields(path = %path.as_ref().display()))]
    pub fn scan_file<P: AsRef<Path>>(&mut self, path: P, options: &ScanOptions) -> Result<ScanStats> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let file = File::open(path).map_err(|e| DbpfError::unreadable(path, e))?;
        let size = file.metadata().map_err(|e| DbpfError::unreadable(path, e))?.len();
        debug!(file = %filename, size, "Reading package");

        if size == 0 {
            return self.scan_container(&filename, &[], options);
        }

        // SAFETY: The file is opened read-only and the map is dropped before
        // this function returns. Every access goes through bounds-checked
        // slicing, so a file truncated underneath us cannot be read past its
        // mapped length.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| DbpfError::unreadable(path, e))?;
        self.scan_container(&filename, &mmap, options)
    }

    /// Scans every `.package` file under `dir`, children before parents.
    ///
    /// Within a directory, subdirectories come first, then files, each in
    /// name order.
    ///
    /// Files that cannot be read or parsed are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns `UnreadableFile` only if `dir` is not a directory.
    #[instrument(skip(self, dir, options), fields(dir = %dir.as_ref().display()))]
    pub fn scan_directory<P: AsRef<Path>>(&mut self, dir: P, options: &ScanOptions) -> Result<ScanSummary> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(DbpfError::unreadable(
                dir,
                io::Error::new(io::ErrorKind::NotFound, "not a directory"),
            ));
        }

        let mut summary = ScanSummary::default();
        // Subdirectories sort ahead of files so every child is scanned
        // before any file of its parent.
        let walker = walkdir::WalkDir::new(dir).contents_first(true).sort_by(|a, b| {
            a.file_type()
                .is_file()
                .cmp(&b.file_type().is_file())
                .then_with(|| a.file_name().cmp(b.file_name()))
        });

        for entry in walker {
            if options.cancelled() {
                info!("Scan cancelled");
                summary.cancelled = true;
                break;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable directory entry");
                    summary.files_skipped += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() || !is_package(entry.path()) {
                continue;
            }

            match self.scan_file(entry.path(), options) {
                Ok(stats) => {
                    summary.files_scanned += 1;
                    summary.stats += stats;
                }
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Skipping package");
                    summary.files_skipped += 1;
                }
            }
        }

        info!(
            scanned = summary.files_scanned,
            skipped = summary.files_skipped,
            tracked = self.len(),
            "Directory scan complete"
        );
        Ok(summary)
    }

    /// Lists the tracked resources selected by `query`.
    pub fn report(&self, query: &ReportQuery) -> Report {
        Report {
            entries: self
                .iter()
                .filter(|tracked| query.selects(tracked))
                .map(ReportEntry::from_tracked)
                .collect(),
            list_files: query.list_files,
        }
    }

    /// Compares the first two versions recorded for `key`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the key is not tracked.
    pub fn diff(&self, key: &ResourceKey) -> Result<VersionDiff> {
        self.get(key)
            .map(TrackedResource::diff)
            .ok_or_else(|| DbpfError::not_found("resource", &key.to_string()))
    }

    /// Folds a registry filled by another worker into this one.
    ///
    /// Files already recorded for a key are not added again; types this
    /// registry does not track are ignored.
    pub fn merge(&mut self, other: ResourceRegistry) {
        for (_, partition) in other.partitions {
            for (key, incoming) in partition {
                let Some(own) = self.partition_mut(key.rtype) else {
                    continue;
                };
                match own.get_mut(&key) {
                    Some(tracked) => {
                        for (file, contents) in incoming.files.iter().zip(incoming.versions) {
                            tracked.add_version(file, contents);
                        }
                    }
                    None => {
                        own.insert(key, incoming);
                    }
                }
            }
        }
    }

    /// Returns the tracked resource for `key`.
    pub fn get(&self, key: &ResourceKey) -> Option<&TrackedResource> {
        self.partition(key.rtype)?.get(key)
    }

    /// Returns the number of tracked keys.
    pub fn len(&self) -> usize {
        self.partitions.iter().map(|(_, map)| map.len()).sum()
    }

    /// Returns true if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates tracked resources by type (filter order), then key.
    pub fn iter(&self) -> impl Iterator<Item = &TrackedResource> {
        self.partitions.iter().flat_map(|(_, map)| map.values())
    }
}

/// Returns true if `path` ends in `.package`, ignoring case.
pub fn is_package(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().to_lowercase().ends_with(PACKAGE_EXTENSION))
        .unwrap_or(false)
}
