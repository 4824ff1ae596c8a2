//! FAT storage on an SD card, or any other `embedded-sdmmc` block device.
//!
//! Paths are `/`-separated and relative to the root of volume 0. Every
//! component must be a valid 8.3 short name.

use embedded_sdmmc::{
    Block, BlockDevice, Directory, Mode, RawDirectory, RawVolume, TimeSource, Timestamp,
    VolumeIdx, VolumeManager,
};
use heapless::Vec;

/// Directory levels below the root a path may have.
pub const MAX_DEPTH: usize = 3;

const READ_CHUNK: usize = 64;

#[derive(Debug)]
pub enum StorageError<E: core::fmt::Debug> {
    Device(E),
    Fs(embedded_sdmmc::Error<E>),
    InvalidPath,
    NotADirectory,
    NotEmpty,
    /// The FAT driver has no way to remove directory entries.
    Unsupported,
}

#[cfg(feature = "defmt")]
impl<E: core::fmt::Debug> defmt::Format for StorageError<E> {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{}", defmt::Debug2Format(self))
    }
}

impl<E: core::fmt::Debug> From<embedded_sdmmc::Error<E>> for StorageError<E> {
    fn from(e: embedded_sdmmc::Error<E>) -> Self {
        StorageError::Fs(e)
    }
}

/// What the recorder and demos need from a filesystem.
pub trait FileStore {
    type Error;

    /// Appends `data`, creating the file if it does not exist.
    fn write_file(&mut self, path: &str, data: &[u8]) -> Result<(), Self::Error>;

    fn create_directory(&mut self, path: &str) -> Result<(), Self::Error>;

    fn directory_exists(&mut self, path: &str) -> Result<bool, Self::Error>;
}

#[derive(Debug, PartialEq, Eq)]
pub struct InvalidPath;

/// Splits `a/b/c.txt` into `([a, b], c.txt)`. Leading and trailing slashes
/// are ignored; empty components are rejected.
pub fn split_path(path: &str) -> Result<(Vec<&str, MAX_DEPTH>, &str), InvalidPath> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Err(InvalidPath);
    }
    let (parent, name) = match trimmed.rsplit_once('/') {
        Some((parent, name)) => (Some(parent), name),
        None => (None, trimmed),
    };

    let mut dirs = Vec::new();
    if let Some(parent) = parent {
        for component in parent.split('/') {
            if component.is_empty() {
                return Err(InvalidPath);
            }
            dirs.push(component).map_err(|_| InvalidPath)?;
        }
    }
    Ok((dirs, name))
}

impl<E: core::fmt::Debug> From<InvalidPath> for StorageError<E> {
    fn from(_: InvalidPath) -> Self {
        StorageError::InvalidPath
    }
}

/// Fixed timestamp for new directory entries; the demos have no RTC.
#[derive(Default)]
pub struct DummyTimesource();

impl TimeSource for DummyTimesource {
    fn get_timestamp(&self) -> Timestamp {
        Timestamp {
            year_since_1970: 55,
            zero_indexed_month: 0,
            zero_indexed_day: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }
}

/// The first FAT volume of a block device, usually an `SdCard`.
pub struct SdStorage<D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    volume_mgr: VolumeManager<D, T, 4, 4, 1>,
    volume: RawVolume,
    card_size: u64,
}

impl<D, T> SdStorage<D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    /// Initializes the card and mounts the first FAT volume.
    pub fn open(device: D, time_source: T) -> Result<Self, StorageError<D::Error>> {
        let blocks = device.num_blocks().map_err(StorageError::Device)?;
        let card_size = u64::from(blocks.0) * Block::LEN as u64;
        let volume_mgr = VolumeManager::new(device, time_source);
        let volume = volume_mgr.open_raw_volume(VolumeIdx(0))?;
        Ok(Self {
            volume_mgr,
            volume,
            card_size,
        })
    }

    pub fn card_size_bytes(&self) -> u64 {
        self.card_size
    }

    /// Unmounts the volume and hands the device back.
    pub fn close(self) -> Result<(D, T), StorageError<D::Error>> {
        self.volume_mgr.close_volume(self.volume)?;
        Ok(self.volume_mgr.free())
    }

    /// Opens each directory in turn from the root. At most a parent and its
    /// child are open at once; every parent is closed before descending.
    fn open_dirs(
        &self,
        dirs: &[&str],
    ) -> Result<Directory<'_, D, T, 4, 4, 1>, StorageError<D::Error>> {
        let mut raw: RawDirectory = self.volume_mgr.open_root_dir(self.volume)?;
        for name in dirs {
            match self.volume_mgr.open_dir(raw, *name) {
                Ok(child) => {
                    let closed = self.volume_mgr.close_dir(raw);
                    raw = child;
                    if let Err(e) = closed {
                        let _ = self.volume_mgr.close_dir(raw);
                        return Err(e.into());
                    }
                }
                Err(e) => {
                    let _ = self.volume_mgr.close_dir(raw);
                    return Err(e.into());
                }
            }
        }
        Ok(raw.to_directory(&self.volume_mgr))
    }

    /// Appends `data` to `path`, creating the file when missing.
    pub fn write_file(&self, path: &str, data: &[u8]) -> Result<(), StorageError<D::Error>> {
        let (dirs, name) = split_path(path)?;
        let dir = self.open_dirs(&dirs)?;
        let file = dir.open_file_in_dir(name, Mode::ReadWriteCreateOrAppend)?;
        file.write(data)?;
        file.close()?;
        dir.close()?;
        Ok(())
    }

    /// Streams the file to `on_chunk` in pieces of at most 64 bytes and
    /// returns the total length.
    pub fn read_file<F>(&self, path: &str, mut on_chunk: F) -> Result<usize, StorageError<D::Error>>
    where
        F: FnMut(&[u8]),
    {
        let (dirs, name) = split_path(path)?;
        let dir = self.open_dirs(&dirs)?;
        let file = dir.open_file_in_dir(name, Mode::ReadOnly)?;

        let mut total = 0;
        let mut buf = [0u8; READ_CHUNK];
        while !file.is_eof() {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            on_chunk(&buf[..n]);
            total += n;
        }
        file.close()?;
        dir.close()?;
        Ok(total)
    }

    pub fn create_directory(&self, path: &str) -> Result<(), StorageError<D::Error>> {
        let (dirs, name) = split_path(path)?;
        let dir = self.open_dirs(&dirs)?;
        dir.make_dir_in_dir(name)?;
        dir.close()?;
        Ok(())
    }

    pub fn directory_exists(&self, path: &str) -> Result<bool, StorageError<D::Error>> {
        if path.trim_matches('/').is_empty() {
            return Ok(true);
        }
        let (dirs, name) = split_path(path)?;
        let dir = match self.open_dirs(&dirs) {
            Ok(dir) => dir,
            Err(StorageError::Fs(embedded_sdmmc::Error::NotFound))
            | Err(StorageError::Fs(embedded_sdmmc::Error::OpenedFileAsDir)) => return Ok(false),
            Err(e) => return Err(e),
        };
        match dir.find_directory_entry(name) {
            Ok(entry) => Ok(entry.attributes.is_directory()),
            Err(embedded_sdmmc::Error::NotFound) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn delete_file(&self, path: &str) -> Result<(), StorageError<D::Error>> {
        let (dirs, name) = split_path(path)?;
        let dir = self.open_dirs(&dirs)?;
        dir.delete_file_in_dir(name)?;
        dir.close()?;
        Ok(())
    }

    /// Only empty directories qualify. The FAT layer cannot unlink a
    /// directory entry, so an empty directory yields `Unsupported`.
    pub fn delete_directory(&self, path: &str) -> Result<(), StorageError<D::Error>> {
        let (dirs, name) = split_path(path)?;
        let parent = self.open_dirs(&dirs)?;
        let entry = parent.find_directory_entry(name)?;
        if !entry.attributes.is_directory() {
            return Err(StorageError::NotADirectory);
        }

        let target = parent.open_dir(name)?;
        let mut entries = 0usize;
        target.iterate_dir(|entry| {
            let dot = entry.name.base_name() == b"." || entry.name.base_name() == b"..";
            if !dot {
                entries += 1;
            }
        })?;
        if entries > 0 {
            return Err(StorageError::NotEmpty);
        }
        Err(StorageError::Unsupported)
    }
}

impl<D, T> FileStore for SdStorage<D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    type Error = StorageError<D::Error>;

    fn write_file(&mut self, path: &str, data: &[u8]) -> Result<(), Self::Error> {
        SdStorage::write_file(self, path, data)
    }

    fn create_directory(&mut self, path: &str) -> Result<(), Self::Error> {
        SdStorage::create_directory(self, path)
    }

    fn directory_exists(&mut self, path: &str) -> Result<bool, Self::Error> {
        SdStorage::directory_exists(self, path)
    }
}
