//! Favorite Server List
//!
//! Legacy flat-file storage for the server-browser favorites and history
//! lists: newline-delimited `ip:port` records, one file per list. This is
//! local bookkeeping only; nothing here touches the replication protocol.

use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use tracing::warn;

/// Favorites list selector (stored as flag bits on the legacy surface).
pub const FLAG_FAVORITE: u32 = 1;
/// History list selector.
pub const FLAG_HISTORY: u32 = 2;

const FAVORITES_FILE: &str = "serverbrowser_favorites.txt";
const HISTORY_FILE: &str = "serverbrowser_history.txt";

/// Flat-file favorites/history store rooted at one directory.
#[derive(Clone, Debug)]
pub struct FavoritesStore {
    dir: PathBuf,
}

impl FavoritesStore {
    /// Store rooted at `dir`. The directory is created lazily on first
    /// write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_for(&self, flags: u32) -> Option<PathBuf> {
        match flags {
            FLAG_FAVORITE => Some(self.dir.join(FAVORITES_FILE)),
            FLAG_HISTORY => Some(self.dir.join(HISTORY_FILE)),
            _ => None,
        }
    }

    fn read_lines(path: &Path) -> Vec<String> {
        match fs::read_to_string(path) {
            Ok(content) => content
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(str::to_owned)
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn write_lines(&self, path: &Path, lines: &[String]) -> bool {
        if let Err(err) = fs::create_dir_all(&self.dir) {
            warn!(dir = %self.dir.display(), %err, "favorites dir create failed");
            return false;
        }
        let mut content = lines.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        match fs::write(path, content) {
            Ok(()) => true,
            Err(err) => {
                warn!(path = %path.display(), %err, "favorites write failed");
                false
            }
        }
    }

    fn record(ip: Ipv4Addr, port: u16) -> String {
        format!("{ip}:{port}")
    }

    /// Number of records on the favorites list.
    pub fn count(&self) -> usize {
        match self.file_for(FLAG_FAVORITE) {
            Some(path) => Self::read_lines(&path).len(),
            None => 0,
        }
    }

    /// Record at `index` on the favorites list, oldest first.
    pub fn get(&self, index: usize) -> Option<(Ipv4Addr, u16)> {
        let path = self.file_for(FLAG_FAVORITE)?;
        let line = Self::read_lines(&path).into_iter().nth(index)?;
        let (ip, port) = line.rsplit_once(':')?;
        Some((ip.parse().ok()?, port.parse().ok()?))
    }

    /// Add a record to the list selected by `flags`, deduplicating.
    /// Returns the resulting record count of that list; 0 on an invalid
    /// flag value.
    pub fn add(&self, ip: Ipv4Addr, port: u16, flags: u32) -> usize {
        let Some(path) = self.file_for(flags) else {
            return 0;
        };
        let mut lines = Self::read_lines(&path);
        let record = Self::record(ip, port);
        if !lines.contains(&record) {
            lines.push(record);
            if !self.write_lines(&path, &lines) {
                return lines.len() - 1;
            }
        }
        lines.len()
    }

    /// Remove a record from the list selected by `flags`. Returns `true`
    /// if a record was removed.
    pub fn remove(&self, ip: Ipv4Addr, port: u16, flags: u32) -> bool {
        let Some(path) = self.file_for(flags) else {
            return false;
        };
        let mut lines = Self::read_lines(&path);
        let record = Self::record(ip, port);
        let before = lines.len();
        lines.retain(|l| l != &record);
        if lines.len() == before {
            return false;
        }
        self.write_lines(&path, &lines)
    }
}
