//! 文件存储
//!
//! 把存储布局整体保存在一个小文件中：写入只改内存副本，`commit()` 时整体落盘。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use somfy_driver::persist::STORE_SIZE;
use somfy_driver::{Store, StoreError};
use tracing::debug;

/// 文件存储
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    bytes: Vec<u8>,
    dirty: bool,
}

impl FileStore {
    /// 打开存储文件（不存在时视为已擦除）
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        bytes.resize(STORE_SIZE, 0xFF);
        debug!("Opened store {}", path.display());
        Ok(Self {
            path,
            bytes,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 当前内容
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Store for FileStore {
    fn read(&mut self, offset: usize) -> Result<u8, StoreError> {
        self.bytes.get(offset).copied().ok_or(StoreError::OutOfRange {
            offset,
            size: self.bytes.len(),
        })
    }

    fn write(&mut self, offset: usize, value: u8) -> Result<(), StoreError> {
        let size = self.bytes.len();
        let slot = self
            .bytes
            .get_mut(offset)
            .ok_or(StoreError::OutOfRange { offset, size })?;
        if *slot != value {
            *slot = value;
            self.dirty = true;
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if !self.dirty {
            return Ok(());
        }
        fs::write(&self.path, &self.bytes)?;
        self.dirty = false;
        debug!("Committed store {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use somfy_driver::persist::{load_addresses, load_mode, save_mode, save_registry};
    use somfy_driver::{Mode, Registry, WireAddress};

    #[test]
    fn test_missing_file_is_erased() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path().join("store.bin")).unwrap();
        assert_eq!(store.bytes(), &[0xFF; STORE_SIZE][..]);
        assert_eq!(load_mode(&mut store).unwrap(), Mode::Discovery);
        assert!(!store.path().exists());
    }

    #[test]
    fn test_commit_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.bin");
        let address = WireAddress::new(0x5F, 0xC0, 0xEC);

        let mut store = FileStore::open(&path).unwrap();
        save_registry(&mut store, &Registry::from_addresses([address], 0)).unwrap();
        save_mode(&mut store, Mode::Joining).unwrap();

        let mut reopened = FileStore::open(&path).unwrap();
        assert_eq!(load_mode(&mut reopened).unwrap(), Mode::Joining);
        assert_eq!(load_addresses(&mut reopened).unwrap(), vec![address]);
    }

    #[test]
    fn test_uncommitted_writes_are_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.bin");

        let mut store = FileStore::open(&path).unwrap();
        store.write(1, Mode::Operation.as_u8()).unwrap();
        assert!(!path.exists());
        assert!(matches!(
            store.write(STORE_SIZE, 0),
            Err(StoreError::OutOfRange { .. })
        ));
    }
}
