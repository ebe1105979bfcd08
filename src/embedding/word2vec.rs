//! In-memory embedding index loaded from word2vec files.
//!
//! Two on-disk layouts are understood:
//!
//! - **binary** (default): ASCII header `"<count> <dim>\n"`, then for each
//!   entry the key bytes up to a space followed by `dim` little-endian `f32`s
//!   and an optional newline.
//! - **text** (`.txt` / `.vec`): the same header, then one `key v1 .. vd`
//!   line per entry.
//!
//! Entries are expected in descending corpus frequency, which is what makes
//! "restrict to the top N" meaningful: it is simply the first N rows.
//!
//! Nearest-neighbour search is an exact cosine scan over unit-normalised rows,
//! parallelised with rayon. At the vocabulary sizes the solver uses (tens of
//! thousands of rows) this stays well under the oracle's one-second cadence.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::time::Instant;

use rand::{Rng, RngCore};
use rayon::prelude::*;
use tracing::{debug, info};

use super::{EmbeddingError, EmbeddingIndex, NeighborQuery, normalized};
use crate::model::types::WordKey;

/// Largest vector dimension accepted from a file header.
pub const MAX_DIMENSION: usize = 1 << 16;

/// Upper bound on floats reserved up front from a header's declared size;
/// larger files grow their buffers as rows are read.
const MAX_PREALLOCATED_FLOATS: usize = 1 << 24;

/// File layout of a word2vec artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Word2VecFormat {
    Binary,
    Text,
}

impl Word2VecFormat {
    /// Guess the layout from the file extension (`.txt`/`.vec` are text).
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("txt") | Some("vec") => Word2VecFormat::Text,
            _ => Word2VecFormat::Binary,
        }
    }
}

/// Exact cosine index over a word2vec vocabulary.
#[derive(Debug, Clone)]
pub struct Word2VecIndex {
    keys: Vec<WordKey>,
    positions: HashMap<WordKey, usize>,
    dimension: usize,
    /// Row-major raw vectors, as stored in the file.
    raw: Vec<f32>,
    /// Row-major unit-normalised copies used for cosine ranking.
    unit: Vec<f32>,
}

impl Word2VecIndex {
    /// Build an index from `(key, vector)` pairs in frequency order.
    ///
    /// Empty keys and repeated keys are skipped (first occurrence wins).
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError::DimensionMismatch`] if any vector is not
    /// `dimension` long.
    pub fn from_entries<I>(dimension: usize, entries: I) -> Result<Self, EmbeddingError>
    where
        I: IntoIterator<Item = (WordKey, Vec<f32>)>,
    {
        let mut index = Self {
            keys: Vec::new(),
            positions: HashMap::new(),
            dimension,
            raw: Vec::new(),
            unit: Vec::new(),
        };
        for (key, vector) in entries {
            index.push(key, vector)?;
        }
        Ok(index)
    }

    /// Load a word2vec file, picking the layout from its extension.
    pub fn load(path: &Path) -> Result<Self, EmbeddingError> {
        Self::load_with_format(path, Word2VecFormat::from_path(path))
    }

    pub fn load_with_format(path: &Path, format: Word2VecFormat) -> Result<Self, EmbeddingError> {
        let start = Instant::now();
        let reader = BufReader::new(File::open(path)?);
        let index = match format {
            Word2VecFormat::Binary => Self::read_binary(reader)?,
            Word2VecFormat::Text => Self::read_text(reader)?,
        };
        info!(
            path = %path.display(),
            vocab = index.keys.len(),
            dimension = index.dimension,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "loaded embeddings"
        );
        Ok(index)
    }

    /// Parse the binary layout from any reader.
    pub fn read_binary<R: BufRead>(mut reader: R) -> Result<Self, EmbeddingError> {
        let (count, dimension) = read_header(&mut reader)?;
        let mut index = Self::with_capacity(count, dimension);
        let mut key_buf = Vec::with_capacity(64);
        let mut vec_buf = vec![0u8; dimension * std::mem::size_of::<f32>()];

        for entry in 0..count {
            key_buf.clear();
            let read = reader.read_until(b' ', &mut key_buf)?;
            if read == 0 || key_buf.last() != Some(&b' ') {
                return Err(EmbeddingError::Format(format!(
                    "unexpected end of file at entry {entry} of {count}"
                )));
            }
            key_buf.pop();
            reader.read_exact(&mut vec_buf).map_err(|e| {
                EmbeddingError::Format(format!("truncated vector at entry {entry}: {e}"))
            })?;

            let vector = vec_buf
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            // The previous entry's trailing newline, if any, lands in front of this key.
            let key = decode_key(trim_newlines(&key_buf));
            if key.is_empty() {
                debug!(entry, "skipping undecodable key");
                continue;
            }
            index.push(WordKey::new(key), vector)?;
        }
        Ok(index)
    }

    /// Parse the text layout from any reader.
    pub fn read_text<R: BufRead>(mut reader: R) -> Result<Self, EmbeddingError> {
        let (count, dimension) = read_header(&mut reader)?;
        let mut index = Self::with_capacity(count, dimension);

        for (line_no, line) in reader.split(b'\n').enumerate() {
            let line = line?;
            let line = String::from_utf8_lossy(&line);
            let mut parts = line.split_whitespace();
            let Some(raw_key) = parts.next() else {
                continue;
            };
            let vector = parts
                .map(str::parse::<f32>)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| {
                    EmbeddingError::Format(format!("line {}: bad float: {e}", line_no + 2))
                })?;
            let key = decode_key(raw_key.as_bytes());
            if key.is_empty() {
                continue;
            }
            index.push(WordKey::new(key), vector)?;
        }

        if index.keys.len() > count {
            debug!(
                declared = count,
                found = index.keys.len(),
                "text embeddings hold more rows than the header declares"
            );
        }
        Ok(index)
    }

    /// Empty index with room for up to `count` rows. The header is
    /// untrusted, so the reservation is capped.
    fn with_capacity(count: usize, dimension: usize) -> Self {
        let rows = count.min(MAX_PREALLOCATED_FLOATS / dimension.max(1));
        Self {
            keys: Vec::with_capacity(rows),
            positions: HashMap::with_capacity(rows),
            dimension,
            raw: Vec::with_capacity(rows * dimension),
            unit: Vec::with_capacity(rows * dimension),
        }
    }

    fn push(&mut self, key: WordKey, vector: Vec<f32>) -> Result<(), EmbeddingError> {
        if vector.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                found: vector.len(),
            });
        }
        if key.as_str().is_empty() || self.positions.contains_key(&key) {
            return Ok(());
        }
        self.positions.insert(key.clone(), self.keys.len());
        self.keys.push(key);
        self.unit.extend(normalized(&vector));
        self.raw.extend(vector);
        Ok(())
    }

    /// Keys in frequency order.
    pub fn keys(&self) -> &[WordKey] {
        &self.keys
    }

    fn position(&self, key: &WordKey) -> Result<usize, EmbeddingError> {
        self.positions
            .get(key)
            .copied()
            .ok_or_else(|| EmbeddingError::UnknownKey(key.clone()))
    }

    fn raw_row(&self, idx: usize) -> &[f32] {
        &self.raw[idx * self.dimension..(idx + 1) * self.dimension]
    }

    fn unit_row(&self, idx: usize) -> &[f32] {
        &self.unit[idx * self.dimension..(idx + 1) * self.dimension]
    }
}

impl EmbeddingIndex for Word2VecIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn vocab_len(&self) -> usize {
        self.keys.len()
    }

    fn contains(&self, key: &WordKey) -> bool {
        self.positions.contains_key(key)
    }

    fn vector_of(&self, key: &WordKey) -> Result<Vec<f32>, EmbeddingError> {
        let idx = self.position(key)?;
        Ok(self.raw_row(idx).to_vec())
    }

    fn nearest(
        &self,
        query: NeighborQuery<'_>,
        restrict_to_top_n: usize,
        count: usize,
    ) -> Result<Vec<WordKey>, EmbeddingError> {
        let (target, exclude) = match query {
            NeighborQuery::Key(key) => {
                let idx = self.position(key)?;
                (self.unit_row(idx).to_vec(), Some(idx))
            }
            NeighborQuery::Vector(v) => {
                if v.len() != self.dimension {
                    return Err(EmbeddingError::DimensionMismatch {
                        expected: self.dimension,
                        found: v.len(),
                    });
                }
                (normalized(v), None)
            }
        };

        let limit = restrict_to_top_n.min(self.keys.len());
        let mut ranked: Vec<(usize, f32)> = (0..limit)
            .into_par_iter()
            .filter(|idx| Some(*idx) != exclude)
            .map(|idx| {
                let sim = self
                    .unit_row(idx)
                    .iter()
                    .zip(&target)
                    .map(|(a, b)| a * b)
                    .sum::<f32>();
                (idx, sim)
            })
            .collect();

        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(count);
        Ok(ranked
            .into_iter()
            .map(|(idx, _)| self.keys[idx].clone())
            .collect())
    }

    fn random_vocab_sample(
        &self,
        restrict_to_top_n: usize,
        rng: &mut dyn RngCore,
    ) -> Option<WordKey> {
        let limit = restrict_to_top_n.min(self.keys.len());
        if limit == 0 {
            return None;
        }
        Some(self.keys[rng.gen_range(0..limit)].clone())
    }
}

fn read_header<R: BufRead>(reader: &mut R) -> Result<(usize, usize), EmbeddingError> {
    let mut header = String::new();
    reader.read_line(&mut header)?;
    let mut parts = header.split_whitespace();
    let mut field = |name: &str| -> Result<usize, EmbeddingError> {
        parts
            .next()
            .ok_or_else(|| EmbeddingError::Format(format!("header is missing {name}")))?
            .parse()
            .map_err(|e| EmbeddingError::Format(format!("header {name}: {e}")))
    };
    let count = field("vocabulary size")?;
    let dimension = field("dimension")?;
    if dimension == 0 || dimension > MAX_DIMENSION {
        return Err(EmbeddingError::Format(format!(
            "dimension {dimension} is outside 1..={MAX_DIMENSION}"
        )));
    }
    if count
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(std::mem::size_of::<f32>()))
        .is_none()
    {
        return Err(EmbeddingError::Format(format!(
            "header declares {count} x {dimension} values, which overflows"
        )));
    }
    Ok((count, dimension))
}

fn trim_newlines(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| *b != b'\n' && *b != b'\r')
        .unwrap_or(bytes.len());
    &bytes[start..]
}

/// Lossy UTF-8 decode that drops invalid sequences instead of replacing them.
fn decode_key(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .filter(|c| *c != char::REPLACEMENT_CHARACTER)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::io::Cursor;

    fn key(s: &str) -> WordKey {
        WordKey::new(s)
    }

    fn format_error(result: Result<Word2VecIndex, EmbeddingError>) -> String {
        match result {
            Err(EmbeddingError::Format(msg)) => msg,
            other => panic!("expected a format error, got {other:?}"),
        }
    }

    #[test]
    fn huge_header_is_a_format_error_not_an_allocation() {
        let msg = format_error(Word2VecIndex::read_binary(Cursor::new(
            b"100000000000000 1000000\nchat ".as_slice(),
        )));
        assert!(msg.contains("dimension"), "{msg}");

        // Plausible dimension, absurd row count: nothing is reserved for the
        // declared rows and the truncated body is reported.
        let msg = format_error(Word2VecIndex::read_binary(Cursor::new(
            b"100000000000000 300\nchat ".as_slice(),
        )));
        assert!(msg.contains("truncated"), "{msg}");

        let index = Word2VecIndex::read_text(Cursor::new(b"100000000000000 300\n".as_slice()))
            .expect("header-only text file loads");
        assert_eq!(index.vocab_len(), 0);
    }

    #[test]
    fn overflowing_header_is_rejected() {
        let header = format!("{} 3\n", usize::MAX);
        let msg = format_error(Word2VecIndex::read_binary(Cursor::new(header.into_bytes())));
        assert!(msg.contains("overflows"), "{msg}");
    }

    fn small_index() -> Word2VecIndex {
        Word2VecIndex::from_entries(
            2,
            vec![
                (key("chat_n"), vec![1.0, 0.0]),
                (key("chaton_n"), vec![0.9, 0.1]),
                (key("chien_n"), vec![0.6, 0.4]),
                (key("voiture_n"), vec![0.0, 1.0]),
            ],
        )
        .unwrap()
    }

    fn binary_fixture(entries: &[(&[u8], [f32; 2])], trailing_newline: bool) -> Vec<u8> {
        let mut out = format!("{} 2\n", entries.len()).into_bytes();
        for (word, v) in entries {
            out.extend_from_slice(word);
            out.push(b' ');
            for x in v {
                out.extend_from_slice(&x.to_le_bytes());
            }
            if trailing_newline {
                out.push(b'\n');
            }
        }
        out
    }

    #[test]
    fn nearest_by_key_excludes_the_key_and_ranks_by_cosine() {
        let index = small_index();
        let got = index
            .nearest(NeighborQuery::Key(&key("chat_n")), 10, 10)
            .unwrap();
        assert_eq!(got, vec![key("chaton_n"), key("chien_n"), key("voiture_n")]);
    }

    #[test]
    fn nearest_respects_vocabulary_restriction() {
        let index = small_index();
        let got = index
            .nearest(NeighborQuery::Vector(&[0.0, 1.0]), 2, 10)
            .unwrap();
        assert_eq!(got.len(), 2);
        assert!(!got.contains(&key("voiture_n")));
    }

    #[test]
    fn nearest_truncates_to_count() {
        let index = small_index();
        let got = index
            .nearest(NeighborQuery::Vector(&[0.0, 1.0]), 10, 1)
            .unwrap();
        assert_eq!(got, vec![key("voiture_n")]);
    }

    #[test]
    fn nearest_rejects_wrong_dimension() {
        let index = small_index();
        let err = index
            .nearest(NeighborQuery::Vector(&[1.0, 0.0, 0.0]), 10, 1)
            .unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::DimensionMismatch {
                expected: 2,
                found: 3
            }
        ));
    }

    #[test]
    fn unknown_key_is_reported() {
        let index = small_index();
        assert!(matches!(
            index.vector_of(&key("absent")),
            Err(EmbeddingError::UnknownKey(_))
        ));
        assert!(matches!(
            index.nearest(NeighborQuery::Key(&key("absent")), 10, 1),
            Err(EmbeddingError::UnknownKey(_))
        ));
    }

    #[test]
    fn vector_of_returns_raw_not_normalised_vector() {
        let index =
            Word2VecIndex::from_entries(2, vec![(key("a"), vec![3.0, 4.0])]).unwrap();
        assert_eq!(index.vector_of(&key("a")).unwrap(), vec![3.0, 4.0]);
    }

    #[test]
    fn duplicate_keys_keep_first_entry() {
        let index = Word2VecIndex::from_entries(
            2,
            vec![(key("a"), vec![1.0, 0.0]), (key("a"), vec![0.0, 1.0])],
        )
        .unwrap();
        assert_eq!(index.vocab_len(), 1);
        assert_eq!(index.vector_of(&key("a")).unwrap(), vec![1.0, 0.0]);
    }

    #[test]
    fn random_sample_stays_within_restriction() {
        let index = small_index();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let k = index.random_vocab_sample(2, &mut rng).unwrap();
            assert!(k == key("chat_n") || k == key("chaton_n"));
        }
    }

    #[test]
    fn random_sample_on_empty_vocab_is_none() {
        let index = Word2VecIndex::from_entries(2, Vec::new()).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        assert!(index.random_vocab_sample(10, &mut rng).is_none());
    }

    #[test]
    fn reads_binary_with_and_without_trailing_newlines() {
        let entries: [(&[u8], [f32; 2]); 2] =
            [(b"chat_n", [1.0, 0.0]), (b"chien_n", [0.5, 0.5])];
        for trailing in [true, false] {
            let bytes = binary_fixture(&entries, trailing);
            let index = Word2VecIndex::read_binary(Cursor::new(bytes)).unwrap();
            assert_eq!(index.keys(), &[key("chat_n"), key("chien_n")]);
            assert_eq!(index.vector_of(&key("chien_n")).unwrap(), vec![0.5, 0.5]);
        }
    }

    #[test]
    fn binary_drops_invalid_utf8_bytes_in_keys() {
        let entries: [(&[u8], [f32; 2]); 1] = [(b"caf\xff\xfe", [1.0, 0.0])];
        let index = Word2VecIndex::read_binary(Cursor::new(binary_fixture(&entries, true))).unwrap();
        assert_eq!(index.keys(), &[key("caf")]);
    }

    #[test]
    fn truncated_binary_is_a_format_error() {
        let entries: [(&[u8], [f32; 2]); 1] = [(b"chat", [1.0, 0.0])];
        let mut bytes = binary_fixture(&entries, false);
        bytes.truncate(bytes.len() - 3);
        let err = Word2VecIndex::read_binary(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, EmbeddingError::Format(_)));
    }

    #[test]
    fn binary_header_declaring_more_rows_than_present_fails() {
        let entries: [(&[u8], [f32; 2]); 1] = [(b"chat", [1.0, 0.0])];
        let mut bytes = binary_fixture(&entries, true);
        bytes[0] = b'3';
        let err = Word2VecIndex::read_binary(Cursor::new(bytes)).unwrap_err();
        assert!(err.to_string().contains("unexpected end of file"));
    }

    #[test]
    fn reads_text_format() {
        let text = "2 3\nchat_n 1 0 0\nchien_n 0.5 0.5 0\n";
        let index = Word2VecIndex::read_text(Cursor::new(text)).unwrap();
        assert_eq!(index.dimension(), 3);
        assert_eq!(index.vector_of(&key("chien_n")).unwrap(), vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn text_row_with_wrong_width_is_rejected() {
        let text = "1 3\nchat_n 1 0\n";
        let err = Word2VecIndex::read_text(Cursor::new(text)).unwrap_err();
        assert!(matches!(err, EmbeddingError::DimensionMismatch { .. }));
    }

    #[test]
    fn bad_header_is_a_format_error() {
        let err = Word2VecIndex::read_text(Cursor::new("oops\n")).unwrap_err();
        assert!(matches!(err, EmbeddingError::Format(_)));
    }

    #[test]
    fn format_is_guessed_from_extension() {
        assert_eq!(
            Word2VecFormat::from_path(Path::new("frwac.bin")),
            Word2VecFormat::Binary
        );
        assert_eq!(
            Word2VecFormat::from_path(Path::new("cc.fr.300.VEC")),
            Word2VecFormat::Text
        );
        assert_eq!(
            Word2VecFormat::from_path(Path::new("vectors.txt")),
            Word2VecFormat::Text
        );
    }
}
