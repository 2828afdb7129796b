/*
 * group_cache.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Tagliacarte, a cross-platform email client.
 *
 * Tagliacarte is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Tagliacarte is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Tagliacarte.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Newsgroup list cache: one file per server at `<cache_dir>/<host>_<port>.xml`.
//! Despite the extension the content is plain text, one group name per line.
//!
//! The cache is an optimization only. Every I/O error is logged and swallowed: a failed load
//! is a miss, a failed save or delete leaves whatever was there.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, error};

use crate::protocol::nntp::ServerKey;

const CACHE_FILE_EXTENSION: &str = "xml";

#[derive(Debug, Clone)]
pub struct GroupCache {
    dir: PathBuf,
}

impl GroupCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache file for a server. Path separators in the host are replaced so the file
    /// always lands inside the cache directory.
    pub fn file_path(&self, key: &ServerKey) -> PathBuf {
        let host: String = key
            .host
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
            .collect();
        self.dir.join(format!("{}_{}.{}", host, key.port, CACHE_FILE_EXTENSION))
    }

    /// Cached groups in stored order; empty on miss or read failure.
    pub fn load(&self, key: &ServerKey) -> Vec<String> {
        let path = self.file_path(key);
        match read_lines(&path) {
            Ok(groups) => groups,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                error!("failed to load cached groups from {}: {}", path.display(), e);
                Vec::new()
            }
        }
    }

    /// Replace the entry for `key`. The old file is removed first; an empty list leaves no file.
    pub fn save(&self, key: &ServerKey, groups: &[String]) {
        self.invalidate(key);
        if groups.is_empty() {
            return;
        }
        let path = self.file_path(key);
        if let Err(e) = write_lines(&self.dir, &path, groups) {
            error!("failed to save cached groups to {}: {}", path.display(), e);
            // Never leave a partial list behind.
            let _ = fs::remove_file(&path);
        } else {
            debug!("cached {} groups for {}", groups.len(), key);
        }
    }

    /// Delete the entry for `key`, if any.
    pub fn invalidate(&self, key: &ServerKey) {
        let path = self.file_path(key);
        match fs::remove_file(&path) {
            Ok(()) => debug!("removed cached groups for {}", key),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => error!("failed to remove cached groups {}: {}", path.display(), e),
        }
    }
}

fn read_lines(path: &Path) -> io::Result<Vec<String>> {
    let reader = BufReader::new(File::open(path)?);
    let mut groups = Vec::new();
    for line in reader.lines() {
        let line = line?;
        groups.push(line.strip_suffix('\r').map(str::to_string).unwrap_or(line));
    }
    Ok(groups)
}

fn write_lines(dir: &Path, path: &Path, groups: &[String]) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let mut w = BufWriter::new(File::create(path)?);
    for group in groups {
        w.write_all(group.as_bytes())?;
        w.write_all(b"\n")?;
    }
    w.into_inner().map_err(|e| e.into_error())?.sync_all()
}
