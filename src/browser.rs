/// # browser
///
/// Paged file picker over storage that can only be enumerated front to back
/// and may hold far more entries than we want in memory. Only a window of
/// `CACHE_CAPACITY` entries is kept; the total is counted once per directory.
///
/// Paths are virtual: `/` is the storage root and components are separated
/// by `/` whatever the host does.
use crate::menu::ItemHandle;
use heapless::String as HString;
use heapless::Vec as HVec;
use log::{debug, warn};
use std::fs;
use std::io;
use std::path::PathBuf;

pub const CACHE_CAPACITY: usize = 64;
pub const DEFAULT_FILES_PER_PAGE: usize = 12;

pub type EntryName = HString<256>;

/// name of the synthetic entry that leads to the parent directory
pub const PARENT_ENTRY: &str = "..";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: EntryName,
    pub is_dir: bool,
    pub size: u64,
}

impl DirEntry {
    /// None if the name is too long to keep
    pub fn new(name: &str, is_dir: bool, size: u64) -> Option<DirEntry> {
        let mut bounded = EntryName::new();
        bounded.push_str(name).ok()?;
        Some(DirEntry {
            name: bounded,
            is_dir,
            size,
        })
    }

    fn parent() -> DirEntry {
        let mut name = EntryName::new();
        let _ = name.push_str(PARENT_ENTRY);
        DirEntry {
            name,
            is_dir: true,
            size: 0,
        }
    }
}

pub type Entries<'a> = Box<dyn Iterator<Item = io::Result<DirEntry>> + 'a>;

/// storage that can list a directory one entry at a time
pub trait Filesystem {
    fn read_dir(&self, path: &str) -> io::Result<Entries<'_>>;
}

/// host directory mounted as the storage root
pub struct StdFs {
    mount: PathBuf,
}

impl StdFs {
    pub fn new(mount: impl Into<PathBuf>) -> Self {
        StdFs {
            mount: mount.into(),
        }
    }

    fn host_path(&self, path: &str) -> PathBuf {
        let mut host = self.mount.clone();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            host.push(part);
        }
        host
    }
}

impl Filesystem for StdFs {
    fn read_dir(&self, path: &str) -> io::Result<Entries<'_>> {
        let dir = fs::read_dir(self.host_path(path))?;
        Ok(Box::new(dir.filter_map(|entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e)),
            };
            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(e) => return Some(Err(e)),
            };
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let kept = DirEntry::new(&name, meta.is_dir(), meta.len());
            if kept.is_none() {
                debug!("skipping overlong name {}", name);
            }
            kept.map(Ok)
        })))
    }
}

/// dot files are hidden; real ".." entries are replaced by our own
fn is_listed(entry: &DirEntry) -> bool {
    !entry.name.starts_with('.')
}

/// The entries of `dir` the browser shows. Unreadable entries are logged and
/// left out, so counting and window loads agree on every logical index.
fn listed_entries<'a>(
    fs: &'a dyn Filesystem,
    dir: &'a str,
) -> io::Result<impl Iterator<Item = DirEntry> + 'a> {
    let entries = fs.read_dir(dir)?.filter_map(move |entry| match entry {
        Ok(entry) => Some(entry),
        Err(e) => {
            warn!("unreadable entry in {}: {}", dir, e);
            None
        }
    });
    Ok(entries.filter(is_listed))
}

pub fn join(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

pub fn parent_of(dir: &str) -> String {
    let trimmed = dir.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => trimmed[..i].to_string(),
    }
}

fn normalise(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// is `path` the same as, or below, `root`
fn is_within(path: &str, root: &str) -> bool {
    root == "/" || path == root || path.starts_with(&format!("{}/", root))
}

/// what came of selecting an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// moved into a directory
    Entered(String),
    /// a file was picked for `target`; the browser is now closed
    Chosen { target: ItemHandle, path: String },
    /// refused: above the root, or the directory could not be read
    Rejected,
    /// no such entry
    Invalid,
}

pub struct FileBrowser {
    active: bool,
    current_dir: String,
    root: String,
    target: Option<ItemHandle>,
    total_entries: usize,
    files_per_page: usize,
    page: usize,
    selected: usize,
    cache: HVec<DirEntry, CACHE_CAPACITY>,
    cache_start: usize,
}

impl Default for FileBrowser {
    fn default() -> Self {
        FileBrowser::new()
    }
}

impl FileBrowser {
    pub fn new() -> Self {
        FileBrowser {
            active: false,
            current_dir: "/".to_string(),
            root: "/".to_string(),
            target: None,
            total_entries: 0,
            files_per_page: DEFAULT_FILES_PER_PAGE,
            page: 0,
            selected: 0,
            cache: HVec::new(),
            cache_start: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn current_dir(&self) -> &str {
        &self.current_dir
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn target(&self) -> Option<ItemHandle> {
        self.target
    }

    pub fn total_entries(&self) -> usize {
        self.total_entries
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn files_per_page(&self) -> usize {
        self.files_per_page
    }

    pub fn cache_start(&self) -> usize {
        self.cache_start
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    /// a page never holds more than the cache can
    pub fn set_files_per_page(&mut self, n: usize) {
        self.files_per_page = n.clamp(1, CACHE_CAPACITY);
        self.page = self.selected / self.files_per_page;
    }

    pub fn page_count(&self) -> usize {
        page_count(self.total_entries, self.files_per_page)
    }

    fn has_parent(&self) -> bool {
        self.current_dir != "/" && self.current_dir != self.root
    }

    /// start browsing `root`; false if it cannot be listed
    pub fn open(&mut self, fs: &dyn Filesystem, root: &str, target: ItemHandle) -> bool {
        let root = normalise(root);
        let previous_root = std::mem::replace(&mut self.root, root.clone());
        if !self.change_dir(fs, &root) {
            self.root = previous_root;
            return false;
        }
        self.target = Some(target);
        self.active = true;
        debug!("browsing {} ({} entries)", root, self.total_entries);
        true
    }

    pub fn close(&mut self) {
        self.active = false;
        self.target = None;
        self.cache.clear();
        self.cache_start = 0;
    }

    fn count_entries(&self, fs: &dyn Filesystem, dir: &str) -> io::Result<usize> {
        Ok(listed_entries(fs, dir)?.count())
    }

    /// recount and reload for a new directory; state is kept on failure
    fn change_dir(&mut self, fs: &dyn Filesystem, dir: &str) -> bool {
        let listed = match self.count_entries(fs, dir) {
            Ok(n) => n,
            Err(e) => {
                warn!("cannot list {}: {}", dir, e);
                return false;
            }
        };
        self.current_dir = dir.to_string();
        self.total_entries = listed + self.has_parent() as usize;
        self.page = 0;
        self.selected = 0;
        self.load_window(fs, 0);
        true
    }

    /// fill the cache with logical entries `start..start + CACHE_CAPACITY`
    fn load_window(&mut self, fs: &dyn Filesystem, start: usize) {
        self.cache.clear();
        self.cache_start = start;
        let offset = self.has_parent() as usize;
        if self.has_parent() && start == 0 {
            let _ = self.cache.push(DirEntry::parent());
        }
        let dir = self.current_dir.clone();
        let entries = match listed_entries(fs, &dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("cannot reload {}: {}", dir, e);
                return;
            }
        };
        let listed = entries
            .enumerate()
            .map(|(i, e)| (i + offset, e))
            .skip_while(|(index, _)| *index < start);
        for (_, entry) in listed {
            if self.cache.push(entry).is_err() {
                break;
            }
        }
        // the directory may have grown since it was counted
        if self.cache_start + self.cache.len() > self.total_entries {
            self.total_entries = self.cache_start + self.cache.len();
        }
        debug!(
            "cache {}..{} of {} in {}",
            self.cache_start,
            self.cache_start + self.cache.len(),
            self.total_entries,
            self.current_dir
        );
    }

    fn is_cached(&self, index: usize) -> bool {
        index >= self.cache_start && index < self.cache_start + self.cache.len()
    }

    /// make sure `index` is in the cache, centring the window on its page
    pub fn ensure_cached(&mut self, fs: &dyn Filesystem, index: usize) {
        if index >= self.total_entries || self.is_cached(index) {
            return;
        }
        let start = window_start(index, self.files_per_page, self.total_entries);
        self.load_window(fs, start);
    }

    /// make sure the whole current page can be drawn from the cache
    pub fn prepare_page(&mut self, fs: &dyn Filesystem) {
        let first = self.page * self.files_per_page;
        let last = (first + self.files_per_page).min(self.total_entries);
        if first < last && !(self.is_cached(first) && self.is_cached(last - 1)) {
            let start = window_start(first, self.files_per_page, self.total_entries);
            self.load_window(fs, start);
        }
    }

    pub fn entry(&self, index: usize) -> Option<&DirEntry> {
        if self.is_cached(index) {
            self.cache.get(index - self.cache_start)
        } else {
            None
        }
    }

    /// cached entries of the current page with their logical indices
    pub fn page_entries(&self) -> impl Iterator<Item = (usize, &DirEntry)> + '_ {
        let first = self.page * self.files_per_page;
        let last = (first + self.files_per_page).min(self.total_entries);
        (first..last).filter_map(move |i| self.entry(i).map(|e| (i, e)))
    }

    fn select_index(&mut self, fs: &dyn Filesystem, index: usize) {
        self.selected = index;
        self.page = index / self.files_per_page;
        self.ensure_cached(fs, index);
    }

    pub fn move_up(&mut self, fs: &dyn Filesystem) {
        if self.selected > 0 {
            self.select_index(fs, self.selected - 1);
        }
    }

    pub fn move_down(&mut self, fs: &dyn Filesystem) {
        if self.selected + 1 < self.total_entries {
            self.select_index(fs, self.selected + 1);
        }
    }

    /// first entry of the previous page
    pub fn page_up(&mut self, fs: &dyn Filesystem) {
        if self.page > 0 {
            self.select_index(fs, (self.page - 1) * self.files_per_page);
        }
    }

    /// first entry of the next page
    pub fn page_down(&mut self, fs: &dyn Filesystem) {
        if self.page + 1 < self.page_count() {
            let index = (self.page + 1) * self.files_per_page;
            self.select_index(fs, index.min(self.total_entries.saturating_sub(1)));
        }
    }

    pub fn select(&mut self, fs: &dyn Filesystem, index: usize) -> Selection {
        if index >= self.total_entries {
            return Selection::Invalid;
        }
        self.ensure_cached(fs, index);
        let entry = match self.entry(index) {
            Some(entry) => entry.clone(),
            None => {
                warn!("entry {} of {} not available", index, self.current_dir);
                return Selection::Invalid;
            }
        };

        if entry.is_dir {
            let next = if entry.name.as_str() == PARENT_ENTRY && index == 0 && self.has_parent() {
                parent_of(&self.current_dir)
            } else {
                join(&self.current_dir, &entry.name)
            };
            if !is_within(&next, &self.root) {
                warn!("refusing to leave {} for {}", self.root, next);
                return Selection::Rejected;
            }
            if !self.change_dir(fs, &next) {
                return Selection::Rejected;
            }
            return Selection::Entered(next);
        }

        let target = match self.target {
            Some(target) => target,
            None => return Selection::Invalid,
        };
        let path = join(&self.current_dir, &entry.name);
        self.close();
        Selection::Chosen { target, path }
    }

    pub fn select_current(&mut self, fs: &dyn Filesystem) -> Selection {
        self.select(fs, self.selected)
    }
}

pub fn page_count(total_entries: usize, files_per_page: usize) -> usize {
    let per_page = files_per_page.max(1);
    ((total_entries + per_page - 1) / per_page).max(1)
}

/// first logical index of a cache window holding `index`'s page, with as many
/// neighbouring pages as fit either side, kept inside `0..total`
fn window_start(index: usize, files_per_page: usize, total: usize) -> usize {
    let per_page = files_per_page.clamp(1, CACHE_CAPACITY);
    let page_start = (index / per_page) * per_page;
    let pages_in_cache = CACHE_CAPACITY / per_page;
    let mut start = page_start.saturating_sub((pages_in_cache / 2) * per_page);
    if start + CACHE_CAPACITY > total {
        start = total.saturating_sub(CACHE_CAPACITY);
    }
    start
}

/// in-memory storage for tests
#[cfg(test)]
pub(crate) mod memfs {
    use super::*;
    use std::cell::Cell;
    use std::collections::{BTreeMap, BTreeSet};

    #[derive(Default)]
    pub struct MemFs {
        dirs: BTreeMap<String, Vec<(String, bool)>>,
        broken: BTreeSet<String>,
        pub reads: Cell<usize>,
    }

    impl MemFs {
        pub fn new() -> Self {
            let mut fs = MemFs::default();
            fs.dirs.insert("/".to_string(), Vec::new());
            fs
        }

        /// add a directory (and any missing parents)
        pub fn dir(mut self, path: &str) -> Self {
            self.add(path, true);
            self
        }

        pub fn file(mut self, path: &str) -> Self {
            self.add(path, false);
            self
        }

        /// a file that is listed but fails when its entry is read
        pub fn broken(mut self, path: &str) -> Self {
            self.add(path, false);
            self.broken.insert(path.to_string());
            self
        }

        /// `n` numbered files in `dir`
        pub fn files(mut self, dir: &str, n: usize) -> Self {
            for i in 0..n {
                self.add(&join(dir, &format!("file{:03}.d88", i)), false);
            }
            self
        }

        fn add(&mut self, path: &str, is_dir: bool) {
            let parent = parent_of(path);
            if !self.dirs.contains_key(&parent) {
                self.add(&parent, true);
            }
            let name = path.rsplit('/').next().unwrap_or(path).to_string();
            let listing = self.dirs.entry(parent).or_default();
            if !listing.iter().any(|(n, _)| *n == name) {
                listing.push((name, is_dir));
            }
            if is_dir {
                self.dirs.entry(path.to_string()).or_default();
            }
        }
    }

    impl Filesystem for MemFs {
        fn read_dir(&self, path: &str) -> io::Result<Entries<'_>> {
            self.reads.set(self.reads.get() + 1);
            let listing = self
                .dirs
                .get(path)
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))?;
            let dir = path.to_string();
            Ok(Box::new(listing.iter().filter_map(move |(name, is_dir)| {
                if self.broken.contains(&join(&dir, name)) {
                    let e = io::Error::new(io::ErrorKind::Other, format!("cannot stat {}", name));
                    return Some(Err(e));
                }
                DirEntry::new(name, *is_dir, 0).map(Ok)
            })))
        }
    }
}
