//! Split an export directory into size-bounded zip shards.
//!
//! Documents go first, then assets sorted by file name. Each shard file stays
//! under the configured limit unless a single file is larger than the limit on
//! its own. Sizes are accounted as an upper bound on the bytes the zip file
//! takes on disk: entry data plus local and central directory headers plus the
//! end-of-central-directory record. Documents are deflated and charged a
//! worst-case deflate bound; assets are already-compressed media and are
//! stored as-is.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::assets::{ASSETS_DIR, PARTIAL_SUFFIX};

const LOCAL_HEADER_BYTES: u64 = 30;
const CENTRAL_HEADER_BYTES: u64 = 46;
const END_OF_CENTRAL_DIRECTORY_BYTES: u64 = 22;

/// Upper bound on the on-disk bytes of one entry.
fn entry_cost(name: &str, size: u64, method: CompressionMethod) -> u64 {
    let data = match method {
        CompressionMethod::Stored => size,
        // Incompressible input falls back to stored blocks with a few bytes
        // of framing each.
        _ => size + (size >> 8) + 64,
    };
    LOCAL_HEADER_BYTES + CENTRAL_HEADER_BYTES + 2 * name.len() as u64 + data
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("zip error in {path}: {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
}

impl ArchiveError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn zip(path: &Path, source: zip::result::ZipError) -> Self {
        Self::Zip {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveShard {
    pub index: usize,
    pub path: PathBuf,
    /// Bytes charged against the limit; never less than the file size.
    pub bytes: u64,
    pub entries: usize,
}

/// Shard file name for `prefix` (the channel ID) and position `index`.
pub fn shard_name(prefix: &str, index: usize) -> String {
    format!("{}_{}.zip", prefix, index)
}

pub struct ArchivePackager {
    max_shard_bytes: u64,
}

impl ArchivePackager {
    pub fn new(max_shard_bytes: u64) -> Self {
        Self { max_shard_bytes }
    }

    /// Package `documents` and everything under `<export_dir>/assets` into
    /// `<export_dir>/<prefix>_<n>.zip`. Shards from an earlier run with the
    /// same prefix are removed first.
    pub fn package(
        &self,
        export_dir: &Path,
        prefix: &str,
        documents: &[PathBuf],
    ) -> Result<Vec<ArchiveShard>, ArchiveError> {
        remove_stale_shards(export_dir, prefix)?;

        let mut builder = ShardBuilder::new(export_dir, prefix);

        for document in documents {
            let name = entry_name(document, None);
            let size = file_size(document)?;
            builder.add(&name, document, size, CompressionMethod::Deflated)?;
            if builder.current_bytes() > self.max_shard_bytes {
                builder.rotate()?;
            }
        }

        for asset in list_assets(&export_dir.join(ASSETS_DIR))? {
            let name = entry_name(&asset, Some(ASSETS_DIR));
            let size = file_size(&asset)?;
            let cost = entry_cost(&name, size, CompressionMethod::Stored);
            if cost + END_OF_CENTRAL_DIRECTORY_BYTES > self.max_shard_bytes {
                warn!(
                    "Asset {} ({} bytes) exceeds the shard limit on its own",
                    asset.display(),
                    size
                );
            }
            if builder.has_open_shard() && builder.current_bytes() + cost > self.max_shard_bytes {
                builder.rotate()?;
            }
            builder.add(&name, &asset, size, CompressionMethod::Stored)?;
        }

        let shards = builder.finish()?;
        info!("Packaged {} into {} shard(s)", prefix, shards.len());
        Ok(shards)
    }
}

struct OpenShard {
    writer: ZipWriter<File>,
    shard: ArchiveShard,
}

struct ShardBuilder<'a> {
    dir: &'a Path,
    prefix: &'a str,
    done: Vec<ArchiveShard>,
    open: Option<OpenShard>,
}

impl<'a> ShardBuilder<'a> {
    fn new(dir: &'a Path, prefix: &'a str) -> Self {
        Self {
            dir,
            prefix,
            done: Vec::new(),
            open: None,
        }
    }

    fn has_open_shard(&self) -> bool {
        self.open.is_some()
    }

    fn current_bytes(&self) -> u64 {
        self.open.as_ref().map(|o| o.shard.bytes).unwrap_or(0)
    }

    fn add(
        &mut self,
        name: &str,
        source: &Path,
        size: u64,
        method: CompressionMethod,
    ) -> Result<(), ArchiveError> {
        if self.open.is_none() {
            self.open = Some(self.create()?);
        }
        let Some(open) = self.open.as_mut() else {
            return Ok(());
        };

        let options = SimpleFileOptions::default().compression_method(method);
        open.writer
            .start_file(name, options)
            .map_err(|e| ArchiveError::zip(&open.shard.path, e))?;
        let mut file = File::open(source).map_err(|e| ArchiveError::io(source, e))?;
        io::copy(&mut file, &mut open.writer).map_err(|e| ArchiveError::io(&open.shard.path, e))?;

        open.shard.bytes += entry_cost(name, size, method);
        open.shard.entries += 1;
        debug!("{} += {} ({} bytes)", open.shard.path.display(), name, size);
        Ok(())
    }

    fn create(&self) -> Result<OpenShard, ArchiveError> {
        let index = self.done.len();
        let path = self.dir.join(shard_name(self.prefix, index));
        let file = File::create(&path).map_err(|e| ArchiveError::io(&path, e))?;
        Ok(OpenShard {
            writer: ZipWriter::new(file),
            shard: ArchiveShard {
                index,
                path,
                bytes: END_OF_CENTRAL_DIRECTORY_BYTES,
                entries: 0,
            },
        })
    }

    /// Close the open shard, if any. The next `add` starts a new one.
    fn rotate(&mut self) -> Result<(), ArchiveError> {
        if let Some(open) = self.open.take() {
            open.writer
                .finish()
                .map_err(|e| ArchiveError::zip(&open.shard.path, e))?;
            let on_disk = file_size(&open.shard.path)?;
            if on_disk > open.shard.bytes {
                warn!(
                    "{} is {} bytes, above the {} accounted",
                    open.shard.path.display(),
                    on_disk,
                    open.shard.bytes
                );
            }
            self.done.push(open.shard);
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<ArchiveShard>, ArchiveError> {
        self.rotate()?;
        Ok(self.done)
    }
}

fn file_size(path: &Path) -> Result<u64, ArchiveError> {
    fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| ArchiveError::io(path, e))
}

fn entry_name(path: &Path, dir: Option<&str>) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match dir {
        Some(dir) => format!("{}/{}", dir, file_name),
        None => file_name,
    }
}

/// Regular files directly under `assets_dir`, sorted by file name.
/// Unfinished downloads are left out.
fn list_assets(assets_dir: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    if !assets_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut assets = Vec::new();
    for entry in fs::read_dir(assets_dir).map_err(|e| ArchiveError::io(assets_dir, e))? {
        let entry = entry.map_err(|e| ArchiveError::io(assets_dir, e))?;
        let path = entry.path();
        let partial = path
            .file_name()
            .is_some_and(|n| n.to_string_lossy().ends_with(PARTIAL_SUFFIX));
        if path.is_file() && !partial {
            assets.push(path);
        }
    }
    assets.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(assets)
}

fn remove_stale_shards(dir: &Path, prefix: &str) -> Result<(), ArchiveError> {
    if !dir.is_dir() {
        return Ok(());
    }
    let stem = format!("{}_", prefix);
    for entry in fs::read_dir(dir).map_err(|e| ArchiveError::io(dir, e))? {
        let entry = entry.map_err(|e| ArchiveError::io(dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_shard = name
            .strip_prefix(&stem)
            .and_then(|rest| rest.strip_suffix(".zip"))
            .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()));
        if is_shard {
            debug!("Removing stale shard {}", name);
            fs::remove_file(entry.path()).map_err(|e| ArchiveError::io(&entry.path(), e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn write_file(path: &Path, len: usize) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, vec![b'x'; len]).unwrap();
    }

    /// Incompressible bytes, so deflate cannot hide header overhead.
    fn write_noise(path: &Path, len: usize, seed: u64) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut state = seed | 1;
        let bytes: Vec<u8> = (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                state as u8
            })
            .collect();
        fs::write(path, bytes).unwrap();
    }

    fn entry_names(shard: &ArchiveShard) -> Vec<String> {
        let mut archive = zip::ZipArchive::new(File::open(&shard.path).unwrap()).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    fn on_disk(shard: &ArchiveShard) -> u64 {
        fs::metadata(&shard.path).unwrap().len()
    }

    #[test]
    fn test_greedy_assets_three_by_forty() {
        let dir = TempDir::new().unwrap();
        let assets = dir.path().join(ASSETS_DIR);
        for name in ["a.bin", "b.bin", "c.bin"] {
            write_file(&assets.join(name), 40_000);
        }

        let shards = ArchivePackager::new(100_000)
            .package(dir.path(), "123", &[])
            .unwrap();

        assert_eq!(shards.len(), 2);
        assert_eq!(shards[0].path, dir.path().join("123_0.zip"));
        assert_eq!(entry_names(&shards[0]), vec!["assets/a.bin", "assets/b.bin"]);
        assert_eq!(entry_names(&shards[1]), vec!["assets/c.bin"]);
        for shard in &shards {
            assert!(shard.bytes <= 100_000);
            assert!(on_disk(shard) <= shard.bytes);
        }
    }

    #[test]
    fn test_shard_files_stay_under_limit_with_incompressible_data() {
        let dir = TempDir::new().unwrap();
        let assets = dir.path().join(ASSETS_DIR);
        write_noise(&assets.join("a.bin"), 50_000, 7);
        write_noise(&assets.join("b.bin"), 50_000, 11);
        write_noise(&assets.join("c.bin"), 20_000, 13);
        let index = dir.path().join("index.html");
        write_noise(&index, 30_000, 17);

        let shards = ArchivePackager::new(100_000)
            .package(dir.path(), "9", &[index])
            .unwrap();

        assert!(shards.len() >= 2);
        for shard in &shards {
            let len = on_disk(shard);
            assert!(len <= 100_000, "{} is {} bytes", shard.path.display(), len);
            assert!(len <= shard.bytes);
        }
        let total: usize = shards.iter().map(|s| entry_names(s).len()).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn test_documents_rotate_after_write() {
        let dir = TempDir::new().unwrap();
        let index = dir.path().join("index.html");
        let thread = dir.path().join("thread_9_index.html");
        write_file(&index, 1_200);
        write_file(&thread, 100);
        write_file(&dir.path().join(ASSETS_DIR).join("1.png"), 300);

        let shards = ArchivePackager::new(1_000)
            .package(dir.path(), "5", &[index, thread])
            .unwrap();

        assert_eq!(shards.len(), 2);
        assert_eq!(entry_names(&shards[0]), vec!["index.html"]);
        assert_eq!(
            entry_names(&shards[1]),
            vec!["thread_9_index.html", "assets/1.png"]
        );
    }

    #[test]
    fn test_oversized_asset_gets_own_shard() {
        let dir = TempDir::new().unwrap();
        let assets = dir.path().join(ASSETS_DIR);
        write_file(&assets.join("a.bin"), 10);
        write_file(&assets.join("b.bin"), 5_000);
        write_file(&assets.join("c.bin"), 10);

        let shards = ArchivePackager::new(1_000)
            .package(dir.path(), "7", &[])
            .unwrap();

        let entries: Vec<Vec<String>> = shards.iter().map(entry_names).collect();
        assert_eq!(
            entries,
            vec![
                vec!["assets/a.bin".to_string()],
                vec!["assets/b.bin".to_string()],
                vec!["assets/c.bin".to_string()],
            ]
        );
    }

    #[test]
    fn test_partial_downloads_are_not_packaged() {
        let dir = TempDir::new().unwrap();
        let assets = dir.path().join(ASSETS_DIR);
        write_file(&assets.join("1.png"), 10);
        write_file(&assets.join(format!("2.png{}", PARTIAL_SUFFIX)), 10);

        let shards = ArchivePackager::new(1_000)
            .package(dir.path(), "4", &[])
            .unwrap();

        assert_eq!(shards.len(), 1);
        assert_eq!(entry_names(&shards[0]), vec!["assets/1.png"]);
    }

    #[test]
    fn test_no_empty_shards_and_stale_removed() {
        let dir = TempDir::new().unwrap();
        write_file(&dir.path().join("8_3.zip"), 1);
        write_file(&dir.path().join("80_0.zip"), 1);

        let shards = ArchivePackager::new(100)
            .package(dir.path(), "8", &[])
            .unwrap();

        assert!(shards.is_empty());
        assert!(!dir.path().join("8_3.zip").exists());
        assert!(dir.path().join("80_0.zip").exists());
    }

    #[test]
    fn test_shard_contents_round_trip() {
        let dir = TempDir::new().unwrap();
        let index = dir.path().join("index.html");
        fs::write(&index, "<html>hello</html>").unwrap();
        write_file(&dir.path().join(ASSETS_DIR).join("1.png"), 16);

        let shards = ArchivePackager::new(1_000)
            .package(dir.path(), "1", &[index])
            .unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&shards[0].path).unwrap()).unwrap();
        {
            let mut entry = archive.by_name("index.html").unwrap();
            assert_eq!(entry.compression(), CompressionMethod::Deflated);
            let mut text = String::new();
            entry.read_to_string(&mut text).unwrap();
            assert_eq!(text, "<html>hello</html>");
        }
        let asset = archive.by_name("assets/1.png").unwrap();
        assert_eq!(asset.compression(), CompressionMethod::Stored);
    }
}
