//! Flat L2 nearest-neighbour index and its on-disk form.
//!
//! `{base}.index` layout, all integers little-endian:
//!
//! ```text
//! magic "RFPX" | dimension u32 | count u64 | count * dimension f32 | crc32 u32
//! ```
//!
//! The checksum covers every preceding byte. `{base}.meta.json` holds the
//! parallel chunk metadata; both files are required to reload.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::retrieval::INDEX_MAGIC;
use crate::types::{Result, ResultExt, RfpError};

/// Where a vector came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub file_path: String,
    pub file_name: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub chunk_text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlatL2Index {
    dimension: usize,
    vectors: Vec<f32>,
}

impl FlatL2Index {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.vectors.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add(&mut self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(RfpError::Embedding(format!(
                "Vector dimension {} does not match index dimension {}",
                vector.len(),
                self.dimension
            )));
        }
        self.vectors.extend_from_slice(vector);
        Ok(())
    }

    /// The `k` nearest rows as `(row, squared L2 distance)`, closest first.
    /// `k` is clamped to the population.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dimension {
            return Err(RfpError::Embedding(format!(
                "Query dimension {} does not match index dimension {}",
                query.len(),
                self.dimension
            )));
        }
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(row, v)| {
                let d = v
                    .iter()
                    .zip(query)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f32>();
                (row, d)
            })
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(k.min(self.len()));
        Ok(scored)
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(16 + self.vectors.len() * 4 + 4);
        bytes.extend_from_slice(INDEX_MAGIC);
        bytes.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u64).to_le_bytes());
        for value in &self.vectors {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        let crc = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let corrupt = |why: &str| RfpError::Storage(format!("Corrupt index file: {}", why));

        if bytes.len() < 20 || &bytes[..4] != INDEX_MAGIC {
            return Err(corrupt("bad header"));
        }
        let (body, tail) = bytes.split_at(bytes.len() - 4);
        let stored_crc = u32::from_le_bytes(read_array(tail)?);
        if crc32fast::hash(body) != stored_crc {
            return Err(corrupt("checksum mismatch"));
        }

        let dimension = u32::from_le_bytes(read_array(&body[4..8])?) as usize;
        let count = u64::from_le_bytes(read_array(&body[8..16])?) as usize;
        let payload = &body[16..];
        if payload.len() != count * dimension * 4 {
            return Err(corrupt("vector payload length"));
        }

        let vectors = payload
            .chunks_exact(4)
            .map(|c| read_array(c).map(f32::from_le_bytes))
            .collect::<Result<Vec<f32>>>()?;
        Ok(Self { dimension, vectors })
    }
}

fn read_array<const N: usize>(bytes: &[u8]) -> Result<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| RfpError::Storage("Corrupt index file: truncated field".to_string()))
}

pub fn index_file(base: &Path) -> PathBuf {
    suffixed(base, ".index")
}

pub fn meta_file(base: &Path) -> PathBuf {
    suffixed(base, ".meta.json")
}

fn suffixed(base: &Path, suffix: &str) -> PathBuf {
    let mut s = base.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

/// Write both companion files under `base`.
pub fn save(base: &Path, index: &FlatL2Index, metadata: &[ChunkMeta]) -> Result<()> {
    if let Some(parent) = base.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context_fn(|| format!("creating {}", parent.display()))?;
    }
    let index_path = index_file(base);
    fs::write(&index_path, index.to_bytes())
        .with_context_fn(|| format!("writing {}", index_path.display()))?;
    let meta_path = meta_file(base);
    fs::write(&meta_path, serde_json::to_vec(metadata)?)
        .with_context_fn(|| format!("writing {}", meta_path.display()))?;
    Ok(())
}

/// Load both companion files; a missing or mismatched pair is an error.
pub fn load(base: &Path) -> Result<(FlatL2Index, Vec<ChunkMeta>)> {
    let index_path = index_file(base);
    let meta_path = meta_file(base);
    for path in [&index_path, &meta_path] {
        if !path.exists() {
            return Err(RfpError::NotReady(format!(
                "Index file not found: {}",
                path.display()
            )));
        }
    }

    let index = FlatL2Index::from_bytes(&fs::read(&index_path)?)?;
    let metadata: Vec<ChunkMeta> = serde_json::from_slice(&fs::read(&meta_path)?)?;
    if metadata.len() != index.len() {
        return Err(RfpError::Storage(format!(
            "Index holds {} vectors but metadata has {} entries",
            index.len(),
            metadata.len()
        )));
    }
    Ok((index, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> FlatL2Index {
        let mut index = FlatL2Index::new(2);
        index.add(&[0.0, 0.0]).unwrap();
        index.add(&[1.0, 1.0]).unwrap();
        index.add(&[5.0, 5.0]).unwrap();
        index
    }

    fn meta(i: usize) -> ChunkMeta {
        ChunkMeta {
            file_path: format!("docs/{}.txt", i),
            file_name: format!("{}.txt", i),
            chunk_index: 0,
            total_chunks: 1,
            chunk_text: format!("chunk {}", i),
        }
    }

    #[test]
    fn test_search_orders_by_distance_and_clamps() {
        let index = sample();
        let hits = index.search(&[0.9, 0.9], 10).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].0, 1);
        assert_eq!(hits[1].0, 0);
        assert!(hits[0].1 < hits[1].1);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = FlatL2Index::new(3);
        assert!(index.add(&[1.0]).is_err());
        assert!(index.search(&[1.0], 1).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("index/reference");
        let metadata: Vec<ChunkMeta> = (0..3).map(meta).collect();

        save(&base, &sample(), &metadata).unwrap();
        assert!(dir.path().join("index/reference.index").exists());
        assert!(dir.path().join("index/reference.meta.json").exists());

        let (index, loaded) = load(&base).unwrap();
        assert_eq!(index, sample());
        assert_eq!(loaded, metadata);
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let mut bytes = sample().to_bytes();
        bytes[20] ^= 0xFF;
        assert!(matches!(
            FlatL2Index::from_bytes(&bytes),
            Err(RfpError::Storage(_))
        ));
    }

    #[test]
    fn test_load_requires_both_files() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("reference");
        fs::write(index_file(&base), sample().to_bytes()).unwrap();
        assert!(matches!(load(&base), Err(RfpError::NotReady(_))));
    }
}
