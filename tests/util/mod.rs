use cemantix_solver::embedding::{Word2VecIndex, cosine_similarity};
use cemantix_solver::model::types::WordKey;
use cemantix_solver::oracle::ScriptedOracle;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

/// Dimension of the synthetic vocabulary.
#[allow(dead_code)]
pub const DIM: usize = 8;

/// Captures tracing output for tests.
#[allow(dead_code)]
pub struct TestTracing {
    buffer: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
}

#[allow(dead_code)]
impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: std::sync::Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Assert that the captured log output contains the provided substring.
    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }
}

struct TestWriter(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.0.lock().unwrap();
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Deterministic vocabulary of `n` tagged words; `chat_n` sits at rank 17.
#[allow(dead_code)]
pub fn synthetic_vocab(n: usize) -> Vec<(WordKey, Vec<f32>)> {
    (0..n)
        .map(|i| {
            let key = if i == 17 {
                "chat_n".to_string()
            } else {
                format!("mot{i:03}_n")
            };
            let vector = (0..DIM)
                .map(|d| ((i * 31 + d * 17 + i * d * 7) % 23) as f32 / 23.0 - 0.4)
                .collect();
            (WordKey::new(key), vector)
        })
        .collect()
}

#[allow(dead_code)]
pub fn synthetic_index(n: usize) -> Word2VecIndex {
    Word2VecIndex::from_entries(DIM, synthetic_vocab(n)).expect("synthetic index")
}

/// Oracle scoring words by cosine similarity to `target`.
///
/// The target scores exactly 1.0; every other word is clamped to
/// `[0.0, cap]`. Words outside the vocabulary get no score.
#[allow(dead_code)]
pub fn cosine_oracle(vocab: &[(WordKey, Vec<f32>)], target: &str, cap: f64) -> ScriptedOracle {
    let vectors: HashMap<String, Vec<f32>> = vocab
        .iter()
        .map(|(k, v)| (k.surface_word(), v.clone()))
        .collect();
    let target_vec = vectors.get(target).cloned().expect("target in vocab");
    let target = target.to_string();
    ScriptedOracle::from_fn(move |word| {
        if word == target {
            return Some(1.0);
        }
        let v = vectors.get(word)?;
        Some(f64::from(cosine_similarity(v, &target_vec)).clamp(0.0, cap))
    })
}

/// Write entries in the word2vec binary layout.
#[allow(dead_code)]
pub fn write_word2vec_binary(path: &Path, entries: &[(WordKey, Vec<f32>)]) {
    let dim = entries.first().map_or(0, |(_, v)| v.len());
    let mut file = std::fs::File::create(path).expect("create fixture");
    writeln!(file, "{} {}", entries.len(), dim).unwrap();
    for (key, vector) in entries {
        file.write_all(key.as_str().as_bytes()).unwrap();
        file.write_all(b" ").unwrap();
        for x in vector {
            file.write_all(&x.to_le_bytes()).unwrap();
        }
        file.write_all(b"\n").unwrap();
    }
}
