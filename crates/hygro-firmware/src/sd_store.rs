//! SD-card backed [`BlobStore`]
//!
//! A namespace is a directory in the card's root and every key is one
//! `KEY.BIN` file inside it. FAT has no atomic multi-file update, so a
//! commit first writes all staged blobs to `JOURNAL.BIN`, then rewrites
//! the target files, then deletes the journal. Opening a namespace replays
//! a complete journal left behind by an interrupted commit and discards an
//! incomplete one, which leaves the previous contents in place.
//!
//! Like the rest of the SD card access on this board the operations are
//! blocking.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use embedded_sdmmc::{Directory, Mode, SdCard, SdCardError, TimeSource, VolumeIdx, VolumeManager};
use hygro_core::storage::BlobStore;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

const MAX_DIRS: usize = 4;
const MAX_FILES: usize = 4;
const MAX_VOLUMES: usize = 1;

/// Longest 8.3 base name
const MAX_BASE_NAME: usize = 8;

const JOURNAL_FILE: &str = "JOURNAL.BIN";

type CardError = embedded_sdmmc::Error<SdCardError>;

type CardDirectory<'a, S, D, T> =
    Directory<'a, SdCard<S, D>, T, MAX_DIRS, MAX_FILES, MAX_VOLUMES>;

#[derive(Error, Debug)]
pub enum SdStoreError {
    #[error("SD card error: {0:?}")]
    Card(CardError),
    #[error("not a valid 8.3 base name")]
    InvalidName,
    #[error("journal could not be encoded")]
    Journal,
}

impl From<CardError> for SdStoreError {
    fn from(value: CardError) -> Self {
        Self::Card(value)
    }
}

#[derive(Serialize, Deserialize)]
struct JournalEntry {
    file: String,
    bytes: Vec<u8>,
}

pub struct SdHandle {
    directory: heapless::String<MAX_BASE_NAME>,
    staged: Vec<JournalEntry>,
}

pub struct SdBlobStore<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    volume_mgr: VolumeManager<SdCard<S, D>, T, MAX_DIRS, MAX_FILES, MAX_VOLUMES>,
}

impl<S, D, T> SdBlobStore<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    pub fn new(sd_card: SdCard<S, D>, ts: T) -> Self {
        let volume_mgr = VolumeManager::new(sd_card, ts);

        Self { volume_mgr }
    }

    fn read_file(
        dir: &CardDirectory<'_, S, D, T>,
        name: &str,
    ) -> Result<Option<Vec<u8>>, CardError> {
        let file = match dir.open_file_in_dir(name, Mode::ReadOnly) {
            Ok(file) => file,
            Err(embedded_sdmmc::Error::NotFound) => return Ok(None),
            Err(e) => return Err(e),
        };

        let mut bytes = vec![0u8; file.length() as usize];
        let mut filled = 0;
        while filled < bytes.len() {
            let read = file.read(&mut bytes[filled..])?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        bytes.truncate(filled);

        file.close()?;
        Ok(Some(bytes))
    }

    fn write_file(
        dir: &CardDirectory<'_, S, D, T>,
        name: &str,
        bytes: &[u8],
    ) -> Result<(), CardError> {
        let file = dir.open_file_in_dir(name, Mode::ReadWriteCreateOrTruncate)?;
        file.write(bytes)?;
        file.close()
    }

    fn apply(dir: &CardDirectory<'_, S, D, T>, entries: &[JournalEntry]) -> Result<(), CardError> {
        for entry in entries {
            Self::write_file(dir, entry.file.as_str(), &entry.bytes)?;
        }
        Ok(())
    }

    fn replay_journal(dir: &CardDirectory<'_, S, D, T>) -> Result<(), CardError> {
        let Some(raw) = Self::read_file(dir, JOURNAL_FILE)? else {
            return Ok(());
        };

        match decode_journal(&raw) {
            Some(entries) => {
                info!("Replaying {} journaled blob(s)", entries.len());
                Self::apply(dir, &entries)?;
            }
            None => warn!("Discarding incomplete journal ({} bytes)", raw.len()),
        }

        dir.delete_file_in_dir(JOURNAL_FILE)
    }
}

impl<S, D, T> BlobStore for SdBlobStore<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    type Handle = SdHandle;
    type Error = SdStoreError;

    fn open(&mut self, namespace: &str) -> Result<SdHandle, SdStoreError> {
        let directory = base_name(namespace)?;

        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;
        match root_dir.make_dir_in_dir(directory.as_str()) {
            Ok(()) => info!("Created namespace directory {}", namespace),
            Err(embedded_sdmmc::Error::DirAlreadyExists) => {}
            Err(e) => return Err(e.into()),
        }

        let dir = root_dir.open_dir(directory.as_str())?;
        Self::replay_journal(&dir)?;

        dir.close()?;
        root_dir.close()?;
        volume0.close()?;

        Ok(SdHandle {
            directory,
            staged: Vec::new(),
        })
    }

    fn get_blob(
        &mut self,
        handle: &mut SdHandle,
        key: &str,
    ) -> Result<Option<Vec<u8>>, SdStoreError> {
        let file = file_name(key)?;
        if let Some(entry) = handle.staged.iter().rev().find(|entry| entry.file == file) {
            return Ok(Some(entry.bytes.clone()));
        }

        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;
        let dir = root_dir.open_dir(handle.directory.as_str())?;

        let bytes = Self::read_file(&dir, file.as_str())?;

        dir.close()?;
        root_dir.close()?;
        volume0.close()?;

        Ok(bytes)
    }

    fn set_blob(
        &mut self,
        handle: &mut SdHandle,
        key: &str,
        bytes: &[u8],
    ) -> Result<(), SdStoreError> {
        let file = file_name(key)?;
        handle.staged.retain(|entry| entry.file != file);
        handle.staged.push(JournalEntry {
            file,
            bytes: bytes.to_vec(),
        });
        Ok(())
    }

    fn commit(&mut self, handle: &mut SdHandle) -> Result<(), SdStoreError> {
        if handle.staged.is_empty() {
            return Ok(());
        }

        let entries = core::mem::take(&mut handle.staged);
        let journal = encode_journal(&entries)?;

        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;
        let dir = root_dir.open_dir(handle.directory.as_str())?;

        // Once the journal is on the card the commit is durable
        Self::write_file(&dir, JOURNAL_FILE, &journal)?;
        Self::apply(&dir, &entries)?;
        dir.delete_file_in_dir(JOURNAL_FILE)?;

        dir.close()?;
        root_dir.close()?;
        volume0.close()?;

        debug!(
            "Committed {} blob(s) to {}",
            entries.len(),
            handle.directory.as_str()
        );
        Ok(())
    }

    fn close(&mut self, handle: SdHandle) {
        if !handle.staged.is_empty() {
            debug!("Dropping {} uncommitted blob(s)", handle.staged.len());
        }
    }
}

/// Validate an 8.3 base name: 1 to 8 ASCII letters, digits or underscores.
fn base_name(name: &str) -> Result<heapless::String<MAX_BASE_NAME>, SdStoreError> {
    let valid = !name.is_empty()
        && name
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || byte == b'_');
    if !valid {
        return Err(SdStoreError::InvalidName);
    }

    let mut base = heapless::String::new();
    base.push_str(name).map_err(|_| SdStoreError::InvalidName)?;
    Ok(base)
}

fn file_name(key: &str) -> Result<String, SdStoreError> {
    let base = base_name(key)?;
    let mut file = base.as_str().to_ascii_uppercase();
    file.push_str(".BIN");
    Ok(file)
}

/// Journal layout: little-endian `u32` body length, then the postcard body.
fn encode_journal(entries: &[JournalEntry]) -> Result<Vec<u8>, SdStoreError> {
    let body = postcard::to_allocvec(entries).map_err(|_| SdStoreError::Journal)?;
    let mut journal = Vec::with_capacity(body.len() + 4);
    journal.extend_from_slice(&(body.len() as u32).to_le_bytes());
    journal.extend_from_slice(&body);
    Ok(journal)
}

/// `None` for a journal cut short by power loss
fn decode_journal(raw: &[u8]) -> Option<Vec<JournalEntry>> {
    let (length, body) = raw.split_first_chunk::<4>()?;
    if body.len() != u32::from_le_bytes(*length) as usize {
        return None;
    }
    postcard::from_bytes(body).ok()
}
