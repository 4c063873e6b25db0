//! Binary storage for word-mover's-distance indices.
//!
//! File format: `m1.index` / `m2.index`
//!
//! Header (20 bytes):
//! - magic: [u8; 4] ("WMDX")
//! - version: u8 (2)
//! - score kind: u8 (0 = similarity, 1 = distance)
//! - dimensions: u16 (little-endian)
//! - vocabulary_count: u32 (little-endian)
//! - document_count: u32 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Vocabulary entries (repeated `vocabulary_count` times):
//! - token_len: u16 (little-endian)
//! - token: [u8; token_len] (UTF-8)
//! - embedding: [f32; dimensions] (little-endian)
//!
//! Documents (repeated `document_count` times, in position order):
//! - token_count: u32 (little-endian)
//! - token_ids: [u32; token_count] (little-endian)

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::search::index::{IndexError, ScoreKind, SimilarityIndex, WmdIndex};

const MAGIC: [u8; 4] = *b"WMDX";

/// Current file format version
const FORMAT_VERSION: u8 = 2;

/// Header size in bytes: magic(4) + version(1) + kind(1) + dimensions(2) + vocabulary(4) + documents(4) + checksum(4)
const HEADER_SIZE: usize = 20;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,
}

/// Storage manager for a single index file.
pub struct IndexStorage {
    path: PathBuf,
}

impl IndexStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load an index from storage.
    pub fn load(&self) -> Result<WmdIndex, IndexStorageError> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);

        let header = Self::read_header(&mut reader)?;
        let dimensions = header.dimensions as usize;
        if dimensions == 0 {
            return Err(IndexStorageError::InvalidFormat(
                "zero embedding dimensions".to_string(),
            ));
        }

        let mut index = WmdIndex::with_kind(dimensions, header.kind);

        for _ in 0..header.vocabulary_count {
            let (token, embedding) = Self::read_token(&mut reader, dimensions)?;
            index
                .insert_token(&token, embedding)
                .map_err(|e| IndexStorageError::InvalidFormat(e.to_string()))?;
        }

        if index.vocabulary_len() != header.vocabulary_count as usize {
            return Err(IndexStorageError::InvalidFormat(
                "duplicate vocabulary tokens".to_string(),
            ));
        }

        for _ in 0..header.document_count {
            let ids = Self::read_document(&mut reader)?;
            index.push_document_ids(ids).map_err(|e| match e {
                IndexError::Storage(inner) => inner,
                other => IndexStorageError::InvalidFormat(other.to_string()),
            })?;
        }

        log::debug!(
            "index loaded path={} kind={:?} documents={} vocabulary={}",
            self.path.display(),
            header.kind,
            header.document_count,
            header.vocabulary_count
        );

        Ok(index)
    }

    /// Save an index to storage.
    ///
    /// Uses atomic write: temp file -> fsync -> rename
    pub fn save(&self, index: &WmdIndex) -> Result<(), IndexStorageError> {
        let temp_path = self.path.with_extension("tmp");

        let result = self.write_to_file(&temp_path, index);

        if result.is_err() {
            let _ = std::fs::remove_file(&temp_path);
            return result;
        }

        std::fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    fn write_to_file(&self, path: &Path, index: &WmdIndex) -> Result<(), IndexStorageError> {
        let dimensions = u16::try_from(index.dimensions()).map_err(|_| {
            IndexStorageError::InvalidFormat(format!(
                "{} dimensions do not fit the header",
                index.dimensions()
            ))
        })?;

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        Self::write_header(
            &mut writer,
            index.score_kind(),
            dimensions,
            index.vocabulary_len() as u32,
            index.len() as u32,
        )?;

        for (token, embedding) in index.tokens() {
            let bytes = token.as_bytes();
            let len = u16::try_from(bytes.len()).map_err(|_| {
                IndexStorageError::InvalidFormat(format!("token too long: {} bytes", bytes.len()))
            })?;
            writer.write_all(&len.to_le_bytes())?;
            writer.write_all(bytes)?;
            for &value in embedding {
                writer.write_all(&value.to_le_bytes())?;
            }
        }

        for document in index.documents() {
            writer.write_all(&(document.len() as u32).to_le_bytes())?;
            for &id in document {
                writer.write_all(&id.to_le_bytes())?;
            }
        }

        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;

        Ok(())
    }

    fn read_header(reader: &mut impl Read) -> Result<Header, IndexStorageError> {
        let mut header_bytes = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header_bytes)?;

        if header_bytes[0..4] != MAGIC {
            return Err(IndexStorageError::InvalidFormat("bad magic".to_string()));
        }

        let version = header_bytes[4];
        if version != FORMAT_VERSION {
            return Err(IndexStorageError::VersionMismatch(version, FORMAT_VERSION));
        }

        let dimensions = u16::from_le_bytes([header_bytes[6], header_bytes[7]]);
        let vocabulary_count = u32::from_le_bytes([
            header_bytes[8],
            header_bytes[9],
            header_bytes[10],
            header_bytes[11],
        ]);
        let document_count = u32::from_le_bytes([
            header_bytes[12],
            header_bytes[13],
            header_bytes[14],
            header_bytes[15],
        ]);
        let stored_checksum = u32::from_le_bytes([
            header_bytes[16],
            header_bytes[17],
            header_bytes[18],
            header_bytes[19],
        ]);

        if stored_checksum != crc32fast::hash(&header_bytes[0..16]) {
            return Err(IndexStorageError::ChecksumMismatch);
        }

        let kind = ScoreKind::from_byte(header_bytes[5]).ok_or_else(|| {
            IndexStorageError::InvalidFormat(format!("unknown score kind {}", header_bytes[5]))
        })?;

        Ok(Header {
            kind,
            dimensions,
            vocabulary_count,
            document_count,
        })
    }

    fn write_header(
        writer: &mut impl Write,
        kind: ScoreKind,
        dimensions: u16,
        vocabulary_count: u32,
        document_count: u32,
    ) -> Result<(), IndexStorageError> {
        let mut header_bytes = [0u8; HEADER_SIZE];

        header_bytes[0..4].copy_from_slice(&MAGIC);
        header_bytes[4] = FORMAT_VERSION;
        header_bytes[5] = kind.to_byte();
        header_bytes[6..8].copy_from_slice(&dimensions.to_le_bytes());
        header_bytes[8..12].copy_from_slice(&vocabulary_count.to_le_bytes());
        header_bytes[12..16].copy_from_slice(&document_count.to_le_bytes());

        let checksum = crc32fast::hash(&header_bytes[0..16]);
        header_bytes[16..20].copy_from_slice(&checksum.to_le_bytes());

        writer.write_all(&header_bytes)?;
        Ok(())
    }

    fn read_token(
        reader: &mut impl Read,
        dimensions: usize,
    ) -> Result<(String, Vec<f32>), IndexStorageError> {
        let mut len_bytes = [0u8; 2];
        reader.read_exact(&mut len_bytes)?;

        let mut token_bytes = vec![0u8; u16::from_le_bytes(len_bytes) as usize];
        reader.read_exact(&mut token_bytes)?;
        let token = String::from_utf8(token_bytes)
            .map_err(|e| IndexStorageError::InvalidFormat(format!("token is not UTF-8: {e}")))?;

        let mut embedding = Vec::with_capacity(dimensions);
        for _ in 0..dimensions {
            let mut float_bytes = [0u8; 4];
            reader.read_exact(&mut float_bytes)?;
            embedding.push(f32::from_le_bytes(float_bytes));
        }

        Ok((token, embedding))
    }

    fn read_document(reader: &mut impl Read) -> Result<Vec<u32>, IndexStorageError> {
        let mut count_bytes = [0u8; 4];
        reader.read_exact(&mut count_bytes)?;
        let count = u32::from_le_bytes(count_bytes);

        let mut ids = Vec::new();
        for _ in 0..count {
            let mut id_bytes = [0u8; 4];
            reader.read_exact(&mut id_bytes)?;
            ids.push(u32::from_le_bytes(id_bytes));
        }

        Ok(ids)
    }
}

#[derive(Debug)]
struct Header {
    kind: ScoreKind,
    dimensions: u16,
    vocabulary_count: u32,
    document_count: u32,
}
