// ============================================================
// Layer 5 — Scoring Model Capability
// ============================================================
// Both model variants expose the same surface so the trainer,
// the exporter and the scorer are written once:
//
//   forward_logits(sparse [B, N] Int, dense [B, D]?) → [B]
//   score(...)                                        → sigmoid
//   export_graph(&mut GraphBuilder)                   → logit node
//
// The first-order LinearTerm lives here too: logistic regression
// IS a linear term, and DeepFM adds one to its FM and deep parts.

use anyhow::{anyhow, Result};
use burn::{
    module::Param,
    nn::{Embedding, EmbeddingConfig, Initializer, Linear, LinearConfig},
    prelude::*,
    tensor::activation,
};

use crate::domain::feature_config::ModelType;
use crate::ml::onnx::graph::{EmbeddingTable, GraphBuilder, DENSE_INPUT};
use crate::ml::onnx::proto::ModelProto;

pub trait ScoringModel<B: Backend>: Module<B> {
    fn model_type(&self) -> ModelType;

    /// Raw logits, one per row: `[batch_size]`.
    fn forward_logits(&self, sparse: Tensor<B, 2, Int>, dense: Option<Tensor<B, 2>>) -> Tensor<B, 1>;

    /// Click probabilities, one per row. Strictly inside (0, 1) for
    /// logits below ~16.6; above that f32 rounds the sigmoid to 1.0.
    fn score(&self, sparse: Tensor<B, 2, Int>, dense: Option<Tensor<B, 2>>) -> Tensor<B, 1> {
        activation::sigmoid(self.forward_logits(sparse, dense))
    }

    /// Append this model's logit computation to `graph` and return the
    /// name of the `[batch_size, 1]` logit value.
    fn export_graph(&self, graph: &mut GraphBuilder) -> Result<String>;
}

/// Build the full ONNX model (logit + sigmoid + reshape) for `model`.
pub fn export_onnx<B: Backend, M: ScoringModel<B>>(
    model:      &M,
    num_sparse: usize,
    num_dense:  usize,
) -> Result<ModelProto> {
    let mut graph = GraphBuilder::new(num_sparse, num_dense);
    let logit = model.export_graph(&mut graph)?;
    let doc = format!("{} pCTR, {} params", model.model_type(), model.num_params());
    graph.finish(&logit, &doc)
}

// ─── Shared helpers ───────────────────────────────────────────────────────────

/// Copy a tensor to the host as row-major f32.
pub fn tensor_values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow!("Cannot read tensor data: {e:?}"))
}

pub(crate) fn embedding_table<B: Backend>(embedding: &Embedding<B>) -> Result<EmbeddingTable> {
    let weight = embedding.weight.val();
    let [rows, cols] = weight.dims();
    Ok(EmbeddingTable { rows, cols, values: tensor_values(weight)? })
}

/// Per-feature lookup: column i of `sparse` goes through `tables[i]`.
/// Returns `[batch, N, dim]`.
pub(crate) fn lookup<B: Backend>(tables: &[Embedding<B>], sparse: &Tensor<B, 2, Int>) -> Tensor<B, 3> {
    let [batch, _] = sparse.dims();
    let fields = tables
        .iter()
        .enumerate()
        .map(|(i, table)| table.forward(sparse.clone().slice([0..batch, i..i + 1])))
        .collect();
    Tensor::cat(fields, 1)
}

// ─── LinearTerm ───────────────────────────────────────────────────────────────
/// `Σ_i w_i[idx_i] + dense · w_dense + bias`
///
/// Every parameter starts at exactly zero, so a fresh model predicts 0.5.
#[derive(Module, Debug)]
pub struct LinearTerm<B: Backend> {
    pub tables: Vec<Embedding<B>>,
    pub dense:  Option<Linear<B>>,
    pub bias:   Param<Tensor<B, 1>>,
}

impl<B: Backend> LinearTerm<B> {
    pub fn init(vocab_sizes: &[usize], num_dense: usize, device: &B::Device) -> Self {
        let tables = vocab_sizes
            .iter()
            .map(|&v| {
                EmbeddingConfig::new(v, 1)
                    .with_initializer(Initializer::Zeros)
                    .init(device)
            })
            .collect();

        let dense = (num_dense > 0).then(|| {
            LinearConfig::new(num_dense, 1)
                .with_bias(false)
                .with_initializer(Initializer::Zeros)
                .init(device)
        });

        let bias = Param::from_tensor(Tensor::zeros([1], device));
        Self { tables, dense, bias }
    }

    pub fn forward(&self, sparse: &Tensor<B, 2, Int>, dense: Option<Tensor<B, 2>>) -> Tensor<B, 1> {
        let [batch, _] = sparse.dims();
        let mut logit: Tensor<B, 1> = lookup(&self.tables, sparse).sum_dim(1).reshape([batch]);

        if let (Some(linear), Some(dense)) = (&self.dense, dense) {
            logit = logit + linear.forward(dense).reshape([batch]);
        }
        logit + self.bias.val()
    }

    /// Emits `[batch_size, 1]`.
    pub fn export(&self, graph: &mut GraphBuilder) -> Result<String> {
        let tables = self.tables.iter().map(embedding_table).collect::<Result<Vec<_>>>()?;
        let n = tables.len();

        let weights = graph.embedding_lookup("linear_weights", &tables)?;
        let ones    = graph.constant_f32("linear_sum", &[n, 1], vec![1.0; n])?;
        let sparse  = graph.op("MatMul", &[&weights, &ones], vec![]);

        let bias = tensor_values(self.bias.val())?;
        let rest = match &self.dense {
            Some(linear) if graph.num_dense() > 0 => {
                let d = graph.num_dense();
                let w = tensor_values(linear.weight.val())?;
                graph.dense_layer("linear_dense", DENSE_INPUT, w, bias, d, 1)?
            }
            _ => graph.constant_f32("linear_bias", &[1], bias)?,
        };
        Ok(graph.op("Add", &[&sparse, &rest], vec![]))
    }
}
