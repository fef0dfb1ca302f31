// files.rs: byte streams and save directory layout

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;

// ============================================================
// Constants
// ============================================================

/// Maximum bytes per read/write chunk (64k)
const MAX_CHUNK: usize = 0x10000;

/// How often an interrupted or would-block transfer is retried before
/// the error is handed back to the caller.
pub const MAX_RETRIES: u32 = 8;

pub const DEFAULT_SAVEDIR: &str = "save";

// ============================================================
// Byte stream abstraction
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}

/// A positioned byte stream. Both the on-disk file and the in-memory
/// buffer used by tests and tools implement this.
///
/// `read` and `write` may transfer fewer bytes than asked for; callers that
/// need exact transfers must treat a short count as a failure.
pub trait ByteStream {
    fn open(&mut self, mode: OpenMode) -> io::Result<()>;
    fn close(&mut self);
    fn is_open(&self) -> bool;
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>;
    fn size(&self) -> io::Result<u64>;
}

fn not_open() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "stream is not open")
}

fn is_retryable(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock)
}

// ============================================================
// RawFile
// ============================================================

/// A file on disk, opened by path.
#[derive(Debug)]
pub struct RawFile {
    path: PathBuf,
    file: Option<File>,
}

impl RawFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }
}

impl ByteStream for RawFile {
    fn open(&mut self, mode: OpenMode) -> io::Result<()> {
        self.close();
        let file = match mode {
            OpenMode::Read => File::open(&self.path)?,
            OpenMode::Write => {
                FsContext::create_path(&self.path);
                OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&self.path)?
            }
        };
        debug!("opened {} for {:?}", self.path.display(), mode);
        self.file = Some(file);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut f) = self.file.take() {
            if let Err(e) = f.flush() {
                warn!("closing {}: {}", self.path.display(), e);
            }
        }
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Reads until `buf` is full or end of file, in chunks, retrying
    /// transient failures.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let f = self.file.as_mut().ok_or_else(not_open)?;
        let mut offset = 0usize;
        let mut tries = 0;

        while offset < buf.len() {
            let block = std::cmp::min(buf.len() - offset, MAX_CHUNK);
            match f.read(&mut buf[offset..offset + block]) {
                Ok(0) => break,
                Ok(n) => offset += n,
                Err(e) if is_retryable(&e) && tries < MAX_RETRIES => {
                    tries += 1;
                    warn!("read {}: {} (retry {}/{})", self.path.display(), e, tries, MAX_RETRIES);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(offset)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let f = self.file.as_mut().ok_or_else(not_open)?;
        let mut offset = 0usize;
        let mut tries = 0;

        while offset < buf.len() {
            let block = std::cmp::min(buf.len() - offset, MAX_CHUNK);
            match f.write(&buf[offset..offset + block]) {
                Ok(0) => break,
                Ok(n) => offset += n,
                Err(e) if is_retryable(&e) && tries < MAX_RETRIES => {
                    tries += 1;
                    warn!("write {}: {} (retry {}/{})", self.path.display(), e, tries, MAX_RETRIES);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(offset)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.as_mut().ok_or_else(not_open)?.seek(pos)
    }

    fn size(&self) -> io::Result<u64> {
        match self.file {
            Some(ref f) => Ok(f.metadata()?.len()),
            None => Ok(fs::metadata(&self.path)?.len()),
        }
    }
}

impl Drop for RawFile {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================
// MemFile
// ============================================================

/// An in-memory stream. Clones made with `share` see the same buffer, so a
/// tool or test can write through one handle and inspect or reload through
/// another.
#[derive(Debug, Default)]
pub struct MemFile {
    data: Arc<Mutex<Vec<u8>>>,
    pos: usize,
    mode: Option<OpenMode>,
    /// Bytes that may still be written before writes start coming up short.
    write_budget: Option<usize>,
    pub fail_open: bool,
}

impl MemFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            data: Arc::new(Mutex::new(bytes)),
            ..Self::default()
        }
    }

    /// A second handle onto the same buffer, closed and positioned at 0.
    pub fn share(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            ..Self::default()
        }
    }

    /// Simulates a full disk: after `bytes` more bytes every write is short.
    pub fn fail_after(mut self, bytes: usize) -> Self {
        self.write_budget = Some(bytes);
        self
    }

    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ByteStream for MemFile {
    fn open(&mut self, mode: OpenMode) -> io::Result<()> {
        if self.fail_open {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "open refused"));
        }
        if mode == OpenMode::Write {
            self.data.lock().clear();
        }
        self.pos = 0;
        self.mode = Some(mode);
        Ok(())
    }

    fn close(&mut self) {
        self.mode = None;
    }

    fn is_open(&self) -> bool {
        self.mode.is_some()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.mode.is_none() {
            return Err(not_open());
        }
        let data = self.data.lock();
        let start = self.pos.min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        self.pos = start + n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.mode != Some(OpenMode::Write) {
            return Err(not_open());
        }
        let n = match self.write_budget {
            Some(budget) => buf.len().min(budget),
            None => buf.len(),
        };
        if let Some(ref mut budget) = self.write_budget {
            *budget -= n;
        }

        let mut data = self.data.lock();
        let end = self.pos + n;
        if data.len() < end {
            data.resize(end, 0);
        }
        data[self.pos..end].copy_from_slice(&buf[..n]);
        self.pos = end;
        Ok(n)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if self.mode.is_none() {
            return Err(not_open());
        }
        let len = self.data.lock().len() as i64;
        let target = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::End(d) => len + d,
            SeekFrom::Current(d) => self.pos as i64 + d,
        };
        if target < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "seek before start"));
        }
        self.pos = target as usize;
        Ok(self.pos as u64)
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }
}

// ============================================================
// Filesystem context
// ============================================================

/// Where save games live on disk.
#[derive(Debug, Clone)]
pub struct FsContext {
    pub savedir: PathBuf,
}

impl Default for FsContext {
    fn default() -> Self {
        Self {
            savedir: PathBuf::from(DEFAULT_SAVEDIR),
        }
    }
}

impl FsContext {
    pub fn new(savedir: impl Into<PathBuf>) -> Self {
        Self {
            savedir: savedir.into(),
        }
    }

    /// Returns the length of an open file.
    pub fn filelength(f: &mut File) -> io::Result<u64> {
        let pos = f.stream_position()?;
        let end = f.seek(SeekFrom::End(0))?;
        f.seek(SeekFrom::Start(pos))?;
        Ok(end)
    }

    /// Creates any intermediate directories needed to store the given filename.
    pub fn create_path(path: &Path) {
        if let Some(parent) = path.parent() {
            if parent.as_os_str().is_empty() {
                return;
            }
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("create_path: failed to create {}: {}", parent.display(), e);
            }
        }
    }

    /// Path of numbered save slot `id`: `SAVEGAME.000`, `SAVEGAME.001`, ...
    pub fn savegame_path(&self, id: u32) -> PathBuf {
        self.savedir.join(format!("SAVEGAME.{:03}", id))
    }

    pub fn savegame_file(&self, id: u32) -> RawFile {
        RawFile::new(self.savegame_path(id))
    }

    /// Slot ids that currently have a save file, in ascending order.
    pub fn list_savegames(&self) -> Vec<u32> {
        let entries = match fs::read_dir(&self.savedir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };
        let mut ids: Vec<u32> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name();
                let name = name.to_str()?;
                let ext = name.strip_prefix("SAVEGAME.")?;
                if ext.len() != 3 {
                    return None;
                }
                ext.parse::<u32>().ok()
            })
            .collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("conquer_files_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_create_path() {
        let root = temp_dir("create_path");
        let file_path = root.join("sub1/sub2/test.bin");
        FsContext::create_path(&file_path);
        assert!(root.join("sub1/sub2").exists());
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_filelength() {
        let root = temp_dir("filelength");
        fs::create_dir_all(&root).unwrap();
        let path = root.join("len.bin");
        fs::write(&path, [0u8; 1234]).unwrap();
        let mut f = File::open(&path).unwrap();
        assert_eq!(FsContext::filelength(&mut f).unwrap(), 1234);
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_savegame_path_format() {
        let fs_ctx = FsContext::new("saves");
        assert_eq!(fs_ctx.savegame_path(7), PathBuf::from("saves/SAVEGAME.007"));
        assert_eq!(fs_ctx.savegame_path(123), PathBuf::from("saves/SAVEGAME.123"));
    }

    #[test]
    fn test_raw_file_write_seek_read() {
        let root = temp_dir("rawfile");
        let mut f = RawFile::new(root.join("nested/data.bin"));
        f.open(OpenMode::Write).unwrap();
        assert_eq!(f.write(b"hello world").unwrap(), 11);
        f.seek(SeekFrom::Start(0)).unwrap();
        assert_eq!(f.write(b"J").unwrap(), 1);
        f.close();
        assert!(!f.is_open());

        f.open(OpenMode::Read).unwrap();
        let mut buf = [0u8; 32];
        let n = f.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"Jello world");
        assert_eq!(f.size().unwrap(), 11);
        f.close();
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_raw_file_open_missing_fails() {
        let root = temp_dir("missing");
        let mut f = RawFile::new(root.join("nope.bin"));
        assert!(f.open(OpenMode::Read).is_err());
        assert!(!f.is_open());
    }

    #[test]
    fn test_list_savegames() {
        let root = temp_dir("list");
        let fs_ctx = FsContext::new(&root);
        for id in [3u32, 1, 12] {
            let mut f = fs_ctx.savegame_file(id);
            f.open(OpenMode::Write).unwrap();
            f.close();
        }
        fs::write(root.join("SAVEGAME.txt"), b"x").unwrap();
        assert_eq!(fs_ctx.list_savegames(), vec![1, 3, 12]);
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_mem_file_share_and_budget() {
        let mut w = MemFile::new().fail_after(5);
        let r = w.share();
        w.open(OpenMode::Write).unwrap();
        assert_eq!(w.write(b"abc").unwrap(), 3);
        assert_eq!(w.write(b"defg").unwrap(), 2);
        assert_eq!(w.write(b"h").unwrap(), 0);
        w.close();
        assert_eq!(r.contents(), b"abcde");
    }

    #[test]
    fn test_mem_file_seek_patch() {
        let mut m = MemFile::new();
        m.open(OpenMode::Write).unwrap();
        m.write(&[0, 0, 0, 0, 9]).unwrap();
        m.seek(SeekFrom::Start(1)).unwrap();
        m.write(&[7, 7]).unwrap();
        m.seek(SeekFrom::End(0)).unwrap();
        m.write(&[1]).unwrap();
        assert_eq!(m.contents(), vec![0, 7, 7, 0, 9, 1]);

        m.open(OpenMode::Read).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(m.read(&mut buf).unwrap(), 4);
        assert_eq!(m.read(&mut buf).unwrap(), 2);
        assert_eq!(m.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_mem_file_requires_open() {
        let mut m = MemFile::from_bytes(vec![1, 2, 3]);
        let mut buf = [0u8; 1];
        assert!(m.read(&mut buf).is_err());
        m.fail_open = true;
        assert!(m.open(OpenMode::Read).is_err());
    }
}
