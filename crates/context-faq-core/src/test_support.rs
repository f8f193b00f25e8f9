//! Deterministic embedding double shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;

/// Embedder that returns pre-scripted vectors and scores with a plain dot
/// product, so a test can dictate the exact similarity of every entry.
///
/// Stored questions get one-hot vectors (`e0`, `e1`, ...), and a query is
/// scripted with the score it should have against each position.
pub(crate) struct ScriptedEmbedder {
    dims: usize,
    vectors: HashMap<String, Vec<f32>>,
    calls: AtomicUsize,
    failing: bool,
}

impl ScriptedEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            vectors: HashMap::new(),
            calls: AtomicUsize::new(0),
            failing: false,
        }
    }

    /// Give the i-th text the i-th unit vector.
    pub fn one_hot(mut self, texts: &[&str]) -> Self {
        for (i, text) in texts.iter().enumerate() {
            let mut v = vec![0.0; self.dims];
            v[i] = 1.0;
            self.vectors.insert(text.to_string(), v);
        }
        self
    }

    /// Script a query whose score against position i is `scores[i]`.
    pub fn query(mut self, text: &str, scores: &[f32]) -> Self {
        let mut v = vec![0.0; self.dims];
        v[..scores.len()].copy_from_slice(scores);
        self.vectors.insert(text.to_string(), v);
        self
    }

    /// Script an arbitrary vector for `text`, whatever its width.
    pub fn raw(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for ScriptedEmbedder {
    fn model_name(&self) -> &str {
        "scripted"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            bail!("scripted embedder is offline");
        }
        texts
            .iter()
            .map(|t| match self.vectors.get(t) {
                Some(v) => Ok(v.clone()),
                None => bail!("no scripted vector for {:?}", t),
            })
            .collect()
    }

    fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
    }
}
