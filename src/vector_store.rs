//! Índice vectorial plano en memoria (producto interno sobre vectores
//! normalizados, equivalente a similitud coseno).
//!
//! API pública:
//!   - `FlatIndex::build(vectors)`
//!   - `FlatIndex::search(query, k)`.

use crate::llm::EmbeddingVector;

/// Normaliza a norma L2 unitaria. Un vector nulo se deja tal cual.
pub fn l2_normalize(v: &[f64]) -> EmbeddingVector {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

#[inline]
fn inner_product(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Resultado de una búsqueda: posición en el índice y puntuación.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub position: usize,
    pub score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct FlatIndex {
    dimension: usize,
    vectors: Vec<EmbeddingVector>,
}

impl FlatIndex {
    /// Construye el índice normalizando cada vector. Todos deben tener la
    /// misma dimensión.
    pub fn build(vectors: &[EmbeddingVector]) -> Result<Self, String> {
        let dimension = vectors.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = vectors.iter().position(|v| v.len() != dimension) {
            return Err(format!(
                "el vector {bad} tiene dimensión {} y se esperaba {dimension}",
                vectors[bad].len()
            ));
        }
        Ok(Self {
            dimension,
            vectors: vectors.iter().map(|v| l2_normalize(v)).collect(),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Los `k` vectores más similares a `query`. `k` se limita al tamaño del
    /// índice; los empates conservan el orden original.
    pub fn search(&self, query: &[f64], k: usize) -> Vec<Hit> {
        if self.is_empty() || k == 0 {
            return Vec::new();
        }
        let query = l2_normalize(query);
        let mut hits: Vec<Hit> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(position, v)| Hit {
                position,
                score: inner_product(v, &query),
            })
            .collect();

        // sort_by es estable: a igual puntuación manda la posición.
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k.min(self.vectors.len()));
        hits
    }
}
