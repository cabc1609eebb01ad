//! Persisted station settings.
//!
//! The whole [`Persistent`] image (per-channel settings plus the tip
//! pool) is serialized with postcard (COBS framing) and guarded by a
//! CRC-32 checksum. A corrupt or missing image falls back to defaults.
//! The storage medium is abstracted; boards back it with EEPROM or a
//! flash page.

use crate::tip::TipPool;
use postcard::from_bytes_cobs;
use serde::{Deserialize, Serialize};

/// Size of the serialized image buffer.
const IMAGE_SIZE: usize = 2048;

/// Size of the checksum.
const CHECKSUM_SIZE: usize = 4;

/// Storage offset of the checksum.
const CHECKSUM_OFFSET: u32 = 0;

/// Storage offset of the image.
const IMAGE_OFFSET: u32 = CHECKSUM_SIZE as u32;

/// Byte-addressed persistent storage (EEPROM, flash page).
pub trait Storage {
    /// The medium's error type.
    type Error;

    /// Read `buffer.len()` bytes at `offset`.
    fn read(&mut self, offset: u32, buffer: &mut [u8]) -> Result<(), Self::Error>;

    /// Write `data` at `offset`.
    fn write(&mut self, offset: u32, data: &[u8]) -> Result<(), Self::Error>;
}

/// Errors while loading or storing settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// The storage medium failed.
    Storage(E),
    /// The image did not fit the buffer.
    Serialize,
}

/// Persisted settings of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelSettings {
    /// The three user temperature presets in °C.
    pub presets_deg_c: [i16; 3],
    /// Target temperature while in setback, in °C.
    pub setback_temperature_deg_c: i16,
    /// Idle time after which a channel drops into setback, in ms.
    pub setback_time_ms: u32,
    /// Idle time after which a channel switches off entirely, in ms.
    pub safety_off_time_ms: u32,
    /// Pool index of the last selected tip, or
    /// [`crate::tip::TipSettings::FREE_ENTRY`] if none was ever chosen.
    pub selected_tip: u8,
}

impl ChannelSettings {
    /// Default channel settings.
    pub const fn default() -> Self {
        Self {
            presets_deg_c: [300, 350, 400],
            setback_temperature_deg_c: 150,
            setback_time_ms: 300_000,
            safety_off_time_ms: 1_200_000,
            selected_tip: crate::tip::TipSettings::FREE_ENTRY,
        }
    }
}

/// The complete persisted station state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persistent {
    /// Per-channel settings.
    pub channels: [ChannelSettings; 2],
    /// The tip settings pool.
    pub tips: TipPool,
}

impl Persistent {
    /// Default persistent settings.
    pub const fn default() -> Self {
        Self {
            channels: [ChannelSettings::default(), ChannelSettings::default()],
            tips: TipPool::new(),
        }
    }
}

/// Calculate checksum bytes for provided data.
fn calculate_checksum_bytes(data: &[u8]) -> [u8; CHECKSUM_SIZE] {
    let crc = crc::Crc::<u32>::new(&crc::CRC_32_CKSUM);
    crc.checksum(data).to_le_bytes()
}

/// Load persistent data from storage.
///
/// Falls back to defaults if the image is missing or fails its checksum.
pub fn load<S: Storage>(storage: &mut S) -> Result<Persistent, Error<S::Error>> {
    let mut expected_checksum_bytes = [0u8; CHECKSUM_SIZE];
    storage
        .read(CHECKSUM_OFFSET, &mut expected_checksum_bytes)
        .map_err(Error::Storage)?;

    let mut buffer = [0u8; IMAGE_SIZE];
    storage
        .read(IMAGE_OFFSET, &mut buffer)
        .map_err(Error::Storage)?;

    let data = if let Some(end) = buffer.iter().position(|&byte| byte == 0) {
        let checksum_bytes = calculate_checksum_bytes(&buffer[..=end]);
        if checksum_bytes == expected_checksum_bytes {
            from_bytes_cobs(&mut buffer).ok()
        } else {
            None
        }
    } else {
        None
    };

    if data.is_none() {
        debug!("Settings image invalid, using defaults");
    }
    Ok(data.unwrap_or(Persistent::default()))
}

/// Store persistent data.
pub fn store<S: Storage>(storage: &mut S, data: &Persistent) -> Result<(), Error<S::Error>> {
    let mut buffer = [0u8; IMAGE_SIZE];
    let encoded = postcard::to_slice_cobs(data, &mut buffer).map_err(|_| Error::Serialize)?;

    let checksum_bytes = calculate_checksum_bytes(encoded);
    storage
        .write(CHECKSUM_OFFSET, &checksum_bytes)
        .map_err(Error::Storage)?;
    storage
        .write(IMAGE_OFFSET, encoded)
        .map_err(Error::Storage)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{IronType, properties_for};

    /// In-memory storage medium.
    struct MemStorage {
        bytes: [u8; IMAGE_SIZE + CHECKSUM_SIZE],
    }

    impl MemStorage {
        fn new() -> Self {
            Self {
                bytes: [0xff; IMAGE_SIZE + CHECKSUM_SIZE],
            }
        }
    }

    impl Storage for MemStorage {
        type Error = ();

        fn read(&mut self, offset: u32, buffer: &mut [u8]) -> Result<(), ()> {
            let offset = offset as usize;
            buffer.copy_from_slice(&self.bytes[offset..offset + buffer.len()]);
            Ok(())
        }

        fn write(&mut self, offset: u32, data: &[u8]) -> Result<(), ()> {
            let offset = offset as usize;
            self.bytes[offset..offset + data.len()].copy_from_slice(data);
            Ok(())
        }
    }

    #[test]
    fn round_trip() {
        let mut storage = MemStorage::new();

        let mut data = Persistent::default();
        data.channels[0].presets_deg_c = [280, 330, 380];
        data.channels[1].setback_time_ms = 120_000;
        data.tips
            .allocate(2, properties_for(IronType::T12).unwrap())
            .unwrap();

        store(&mut storage, &data).unwrap();
        let loaded = load(&mut storage).unwrap();
        assert_eq!(loaded, data);
    }

    #[test]
    fn corrupt_image_loads_defaults() {
        let mut storage = MemStorage::new();

        let mut data = Persistent::default();
        data.channels[0].presets_deg_c = [280, 330, 380];
        store(&mut storage, &data).unwrap();

        // Flip a data byte without updating the checksum.
        storage.bytes[CHECKSUM_SIZE + 2] ^= 0x55;
        let loaded = load(&mut storage).unwrap();
        assert_eq!(loaded, Persistent::default());
    }

    #[test]
    fn blank_storage_loads_defaults() {
        let mut storage = MemStorage::new();
        let loaded = load(&mut storage).unwrap();
        assert_eq!(loaded, Persistent::default());
    }

    #[test]
    fn defaults_match_idle_policy() {
        let defaults = ChannelSettings::default();
        assert_eq!(defaults.setback_time_ms, 300_000);
        assert_eq!(defaults.safety_off_time_ms, 1_200_000);
    }
}
