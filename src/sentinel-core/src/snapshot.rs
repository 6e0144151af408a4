//! Snapshot naming and persistence

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use image::{ImageFormat, ImageResult, RgbImage};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotKind {
    /// Written on detected motion, then delivered
    Motion,
    /// Written on operator request, kept locally
    Manual,
}

impl SnapshotKind {
    pub fn prefix(self) -> &'static str {
        match self {
            SnapshotKind::Motion => "motion",
            SnapshotKind::Manual => "snapshot",
        }
    }
}

/// Writes JPEG snapshots under one directory with unique names
///
/// Names are `<prefix>_<unix_ts>.jpg`. A second name within the same second,
/// or a name that already exists on disk, gets a `_<n>` suffix.
#[derive(Debug)]
pub struct SnapshotStore {
    dir: PathBuf,
    last: HashMap<SnapshotKind, (i64, u32)>,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            last: HashMap::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserve the next unused path for `kind` at `timestamp`
    pub fn next_path(&mut self, kind: SnapshotKind, timestamp: DateTime<Utc>) -> PathBuf {
        let second = timestamp.timestamp();
        let mut n = match self.last.get(&kind) {
            Some(&(last_second, last_n)) if last_second == second => last_n + 1,
            _ => 0,
        };

        loop {
            let name = if n == 0 {
                format!("{}_{}.jpg", kind.prefix(), second)
            } else {
                format!("{}_{}_{}.jpg", kind.prefix(), second, n)
            };
            let path = self.dir.join(name);
            if !path.exists() {
                self.last.insert(kind, (second, n));
                return path;
            }
            n += 1;
        }
    }

    /// Encode `image` as JPEG under a fresh name
    pub fn persist(
        &mut self,
        kind: SnapshotKind,
        image: &RgbImage,
        timestamp: DateTime<Utc>,
    ) -> ImageResult<PathBuf> {
        let path = self.next_path(kind, timestamp);
        image.save_with_format(&path, ImageFormat::Jpeg)?;
        debug!("wrote {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sentinel-snapshot-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_names_follow_pattern() {
        let dir = temp_dir("pattern");
        let mut store = SnapshotStore::new(&dir).unwrap();
        assert_eq!(store.next_path(SnapshotKind::Motion, at(1700000000)), dir.join("motion_1700000000.jpg"));
        assert_eq!(store.next_path(SnapshotKind::Manual, at(1700000000)), dir.join("snapshot_1700000000.jpg"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_same_second_gets_suffix() {
        let dir = temp_dir("suffix");
        let mut store = SnapshotStore::new(&dir).unwrap();
        let a = store.next_path(SnapshotKind::Motion, at(100));
        let b = store.next_path(SnapshotKind::Motion, at(100));
        let c = store.next_path(SnapshotKind::Motion, at(100));
        let d = store.next_path(SnapshotKind::Motion, at(101));
        assert_eq!(a, dir.join("motion_100.jpg"));
        assert_eq!(b, dir.join("motion_100_1.jpg"));
        assert_eq!(c, dir.join("motion_100_2.jpg"));
        assert_eq!(d, dir.join("motion_101.jpg"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_existing_file_is_not_overwritten() {
        let dir = temp_dir("existing");
        let mut store = SnapshotStore::new(&dir).unwrap();
        std::fs::write(dir.join("motion_5.jpg"), b"old").unwrap();
        assert_eq!(store.next_path(SnapshotKind::Motion, at(5)), dir.join("motion_5_1.jpg"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_persist_writes_jpeg() {
        let dir = temp_dir("persist");
        let mut store = SnapshotStore::new(&dir).unwrap();
        let image = RgbImage::from_pixel(16, 16, image::Rgb([10, 200, 30]));

        let first = store.persist(SnapshotKind::Motion, &image, at(42)).unwrap();
        let second = store.persist(SnapshotKind::Motion, &image, at(42)).unwrap();
        assert_ne!(first, second);

        let decoded = image::open(&first).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 16));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
