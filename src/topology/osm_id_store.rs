// Append-only mapping from internal (dense) ids to OSM ids.
//
// Every entry is one big-endian 64-bit word. The node variant keeps the OSM id
// in the lower 56 bits and the no-exit flag in bit 63; the way variant uses
// the full word for the id. All-ones marks a slot that was never written.
//
// FILE FORMAT:
//  - magic `TIDS` (4 bytes)
//  - layout (u8): 0 = node id + no-exit flag, 1 = full 64-bit id
//  - entry count (u32, big-endian)
//  - entries (u64, big-endian)

use crate::topology::error::StoreError;
use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const ENTRY_BYTES: usize = 8;
const NO_ENTRY: u64 = u64::MAX;
const OSM_ID_MASK: u64 = 0x00FF_FFFF_FFFF_FFFF;
const NO_EXIT_BIT: u64 = 1 << 63;
const MAGIC: &[u8; 4] = b"TIDS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdLayout {
    /// 56 bit OSM id plus the no-exit flag (nodes).
    IdWithFlag,
    /// Full 64 bit OSM id (ways).
    FullId,
}

impl IdLayout {
    fn to_byte(self) -> u8 {
        match self {
            IdLayout::IdWithFlag => 0,
            IdLayout::FullId => 1,
        }
    }

    fn from_byte(value: u8) -> Option<IdLayout> {
        match value {
            0 => Some(IdLayout::IdWithFlag),
            1 => Some(IdLayout::FullId),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OsmIdStore {
    layout: IdLayout,
    data: Vec<u8>,
    entries: u32,
}

impl OsmIdStore {
    /// Store for tower nodes: OSM node id + no-exit flag.
    pub fn for_nodes() -> Self {
        Self::with_layout(IdLayout::IdWithFlag)
    }

    /// Store for edges: OSM way id.
    pub fn for_ways() -> Self {
        Self::with_layout(IdLayout::FullId)
    }

    fn with_layout(layout: IdLayout) -> Self {
        OsmIdStore {
            layout,
            data: Vec::with_capacity(100_000 * ENTRY_BYTES),
            entries: 0,
        }
    }

    pub fn layout(&self) -> IdLayout {
        self.layout
    }

    /// Number of slots, including never written ones below the high-water mark.
    pub fn len(&self) -> u32 {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    fn ensure_capacity(&mut self, internal_id: u32) {
        let needed = (internal_id as usize + 1) * ENTRY_BYTES;
        if self.data.len() < needed {
            // fresh slots read as "no entry"
            self.data.resize(needed, 0xFF);
        }
    }

    fn check_id(&self, internal_id: u32, osm_id: u64) -> Result<(), StoreError> {
        let out_of_range = match self.layout {
            IdLayout::IdWithFlag => osm_id > OSM_ID_MASK,
            IdLayout::FullId => osm_id == NO_ENTRY,
        };
        if out_of_range {
            return Err(StoreError::IdOutOfRange {
                internal_id,
                osm_id,
            });
        }
        Ok(())
    }

    /// Append a record. The flag is ignored by the full-id layout.
    pub fn add_record(
        &mut self,
        internal_id: u32,
        osm_id: u64,
        no_exit: bool,
    ) -> Result<(), StoreError> {
        if self.entries > 0 && internal_id < self.entries - 1 {
            return Err(StoreError::OutOfOrder {
                internal_id,
                last: self.entries - 1,
            });
        }
        self.check_id(internal_id, osm_id)?;
        self.ensure_capacity(internal_id);

        let value = match self.layout {
            IdLayout::IdWithFlag if no_exit => (osm_id & OSM_ID_MASK) | NO_EXIT_BIT,
            IdLayout::IdWithFlag => osm_id & OSM_ID_MASK,
            IdLayout::FullId => osm_id,
        };
        let offset = internal_id as usize * ENTRY_BYTES;
        BigEndian::write_u64(&mut self.data[offset..offset + ENTRY_BYTES], value);
        self.entries = internal_id + 1;
        Ok(())
    }

    fn raw_into(&self, internal_id: u32, buffer: &mut [u8; ENTRY_BYTES]) -> u64 {
        if internal_id >= self.entries {
            return NO_ENTRY;
        }
        let offset = internal_id as usize * ENTRY_BYTES;
        buffer.copy_from_slice(&self.data[offset..offset + ENTRY_BYTES]);
        BigEndian::read_u64(buffer)
    }

    fn decode_id(&self, raw: u64) -> Option<u64> {
        if raw == NO_ENTRY {
            return None;
        }
        match self.layout {
            IdLayout::IdWithFlag => Some(raw & OSM_ID_MASK),
            IdLayout::FullId => Some(raw),
        }
    }

    fn decode_no_exit(&self, raw: u64) -> bool {
        raw != NO_ENTRY && self.layout == IdLayout::IdWithFlag && raw & NO_EXIT_BIT != 0
    }

    /// OSM id of `internal_id`, `None` if it was never written.
    pub fn osm_id(&self, internal_id: u32) -> Option<u64> {
        let mut buffer = [0u8; ENTRY_BYTES];
        self.decode_id(self.raw_into(internal_id, &mut buffer))
    }

    /// No-exit flag of `internal_id`; false if it was never written.
    pub fn no_exit(&self, internal_id: u32) -> bool {
        let mut buffer = [0u8; ENTRY_BYTES];
        self.decode_no_exit(self.raw_into(internal_id, &mut buffer))
    }

    /// Read handle for one thread.
    pub fn accessor(&self) -> OsmIdAccessor<'_> {
        OsmIdAccessor {
            store: self,
            buffer: [0u8; ENTRY_BYTES],
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let io_err = |source: std::io::Error| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(MAGIC).map_err(io_err)?;
        writer.write_u8(self.layout.to_byte()).map_err(io_err)?;
        writer.write_u32::<BigEndian>(self.entries).map_err(io_err)?;
        writer
            .write_all(&self.data[..self.entries as usize * ENTRY_BYTES])
            .map_err(io_err)?;
        writer.flush().map_err(io_err)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let io_err = |source: std::io::Error| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };
        let corrupt = |reason: &str| StoreError::Corrupt {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let file = File::open(path).map_err(io_err)?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).map_err(io_err)?;
        if &magic != MAGIC {
            return Err(corrupt("bad magic"));
        }
        let layout = IdLayout::from_byte(reader.read_u8().map_err(io_err)?)
            .ok_or_else(|| corrupt("unknown layout"))?;
        let entries = reader.read_u32::<BigEndian>().map_err(io_err)?;

        let mut data = Vec::new();
        reader.read_to_end(&mut data).map_err(io_err)?;
        if data.len() != entries as usize * ENTRY_BYTES {
            return Err(corrupt("entry count does not match file size"));
        }

        Ok(OsmIdStore {
            layout,
            data,
            entries,
        })
    }
}

/// Per-thread reader over a shared `OsmIdStore`.
///
/// Decodes through its own scratch buffer, so any number of accessors can
/// read the same store concurrently.
pub struct OsmIdAccessor<'a> {
    store: &'a OsmIdStore,
    buffer: [u8; ENTRY_BYTES],
}

impl OsmIdAccessor<'_> {
    pub fn osm_id(&mut self, internal_id: u32) -> Option<u64> {
        let raw = self.store.raw_into(internal_id, &mut self.buffer);
        self.store.decode_id(raw)
    }

    pub fn no_exit(&mut self, internal_id: u32) -> bool {
        let raw = self.store.raw_into(internal_id, &mut self.buffer);
        self.store.decode_no_exit(raw)
    }
}
