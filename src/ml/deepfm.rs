// ============================================================
// Layer 5 — DeepFM
// ============================================================
// logit = linear + fm + deep
//
//   linear  LinearTerm (same as logistic regression)
//   fm      0.5 · Σ_k ((Σ_i v_ik)² − Σ_i v_ik²)      O(N·K)
//   deep    flatten(v) ⊕ dense → [Linear → BN → ReLU → Dropout]* → Linear(1)
//
// One embedding table set feeds both fm and deep. The FM
// identity equals Σ_{i<j} <v_i, v_j> without the double loop.
//
// BatchNorm and Dropout switch mode with the backend: on
// Autodiff they use batch statistics and drop units, after
// model.valid() they use running statistics and pass through.
// The exported graph is that evaluation-mode function, with
// each BatchNorm folded into the Gemm before it.

use anyhow::Result;
use burn::{
    nn::{
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Embedding, EmbeddingConfig,
        Initializer, Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation,
};

use crate::domain::feature_config::ModelType;
use crate::ml::model::{embedding_table, lookup, tensor_values, LinearTerm, ScoringModel};
use crate::ml::onnx::{
    graph::{GraphBuilder, DENSE_INPUT},
    proto::AttributeProto,
};

#[derive(Config, Debug)]
pub struct DeepFmConfig {
    pub vocab_sizes: Vec<usize>,
    pub num_dense:   usize,
    #[config(default = 8)]
    pub embedding_dim: usize,
    #[config(default = "vec![64, 32]")]
    pub hidden_units: Vec<usize>,
    #[config(default = 0.5)]
    pub dropout: f64,
}

impl DeepFmConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DeepFm<B> {
        let k = self.embedding_dim;

        // Xavier-normal variance divided by the field count N, so
        // Var(fm) ≈ 2K / (v + K)² whatever N is and the N(N-1)/2
        // pairwise products start near zero.
        let fields = self.vocab_sizes.len().max(1);
        let embeddings = self
            .vocab_sizes
            .iter()
            .map(|&v| {
                let std = (2.0 / ((v + k) * fields) as f64).sqrt();
                EmbeddingConfig::new(v, k)
                    .with_initializer(Initializer::Normal { mean: 0.0, std })
                    .init(device)
            })
            .collect();

        let mut width  = self.vocab_sizes.len() * k + self.num_dense;
        let mut blocks = Vec::with_capacity(self.hidden_units.len());
        for &units in &self.hidden_units {
            blocks.push(DeepBlock {
                linear:  LinearConfig::new(width, units).init(device),
                norm:    BatchNormConfig::new(units).init(device),
                dropout: DropoutConfig::new(self.dropout).init(),
            });
            width = units;
        }

        DeepFm {
            linear: LinearTerm::init(&self.vocab_sizes, self.num_dense, device),
            embeddings,
            blocks,
            // zero, like the first-order weights: a fresh model's logit is the FM term alone
            projection: LinearConfig::new(width, 1)
                .with_initializer(Initializer::Zeros)
                .init(device),
            embedding_dim: k,
        }
    }
}

/// The pairwise FM term for `[batch, N, K]` embeddings, as `[batch, 1]`.
pub fn fm_interaction<B: Backend>(embedded: Tensor<B, 3>) -> Tensor<B, 2> {
    let [batch, _, _] = embedded.dims();

    let sum           = embedded.clone().sum_dim(1);          // [B, 1, K]
    let square_of_sum = sum.clone() * sum;
    let sum_of_square = (embedded.clone() * embedded).sum_dim(1);

    ((square_of_sum - sum_of_square).sum_dim(2) * 0.5).reshape([batch, 1])
}

#[derive(Module, Debug)]
pub struct DeepBlock<B: Backend> {
    pub linear:  Linear<B>,
    pub norm:    BatchNorm<B, 0>,
    pub dropout: Dropout,
}

impl<B: Backend> DeepBlock<B> {
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.norm.forward(self.linear.forward(x));
        self.dropout.forward(activation::relu(x))
    }

    /// `relu(bn(x·W + b))` with bn's running statistics folded into W and b.
    fn export(&self, graph: &mut GraphBuilder, input: &str, hint: &str) -> Result<String> {
        let [d_in, d_out] = self.linear.weight.val().dims();
        let mut weights = tensor_values(self.linear.weight.val())?;
        let mut bias = match &self.linear.bias {
            Some(b) => tensor_values(b.val())?,
            None    => vec![0.0; d_out],
        };

        let gamma = tensor_values(self.norm.gamma.val())?;
        let beta  = tensor_values(self.norm.beta.val())?;
        let mean  = tensor_values(self.norm.running_mean.value())?;
        let var   = tensor_values(self.norm.running_var.value())?;

        for o in 0..d_out {
            let scale = gamma[o] as f64 / (var[o] as f64 + self.norm.epsilon).sqrt();
            for i in 0..d_in {
                let w = &mut weights[i * d_out + o];
                *w = (*w as f64 * scale) as f32;
            }
            bias[o] = ((bias[o] as f64 - mean[o] as f64) * scale + beta[o] as f64) as f32;
        }

        let affine = graph.dense_layer(hint, input, weights, bias, d_in, d_out)?;
        Ok(graph.op("Relu", &[&affine], vec![]))
    }
}

#[derive(Module, Debug)]
pub struct DeepFm<B: Backend> {
    pub linear:        LinearTerm<B>,
    pub embeddings:    Vec<Embedding<B>>,
    pub blocks:        Vec<DeepBlock<B>>,
    pub projection:    Linear<B>,
    pub embedding_dim: usize,
}

impl<B: Backend> ScoringModel<B> for DeepFm<B> {
    fn model_type(&self) -> ModelType {
        ModelType::DeepFm
    }

    fn forward_logits(&self, sparse: Tensor<B, 2, Int>, dense: Option<Tensor<B, 2>>) -> Tensor<B, 1> {
        let [batch, num_fields] = sparse.dims();

        let linear   = self.linear.forward(&sparse, dense.clone());
        let embedded = lookup(&self.embeddings, &sparse);           // [B, N, K]
        let fm: Tensor<B, 1> = fm_interaction(embedded.clone()).reshape([batch]);

        let mut x = embedded.reshape([batch, num_fields * self.embedding_dim]);
        if let Some(dense) = dense {
            x = Tensor::cat(vec![x, dense], 1);
        }
        for block in &self.blocks {
            x = block.forward(x);
        }
        let deep: Tensor<B, 1> = self.projection.forward(x).reshape([batch]);

        linear + fm + deep
    }

    fn export_graph(&self, graph: &mut GraphBuilder) -> Result<String> {
        let linear = self.linear.export(graph)?;

        let tables = self.embeddings.iter().map(embedding_table).collect::<Result<Vec<_>>>()?;
        let (n, k) = (tables.len(), self.embedding_dim);
        let flat   = graph.embedding_lookup("embeddings", &tables)?;      // [B, N·K]

        // (N·K, K) selector that sums each k over the fields
        let mut selector = vec![0.0f32; n * k * k];
        for i in 0..n {
            for j in 0..k {
                selector[(i * k + j) * k + j] = 1.0;
            }
        }
        let selector = graph.constant_f32("fm_field_sum", &[n * k, k], selector)?;
        let half     = graph.constant_f32("fm_half", &[k, 1], vec![0.5; k])?;

        let sum           = graph.op("MatMul", &[&flat, &selector], vec![]);
        let square_of_sum = graph.op("Mul", &[&sum, &sum], vec![]);
        let squares       = graph.op("Mul", &[&flat, &flat], vec![]);
        let sum_of_square = graph.op("MatMul", &[&squares, &selector], vec![]);
        let diff          = graph.op("Sub", &[&square_of_sum, &sum_of_square], vec![]);
        let fm            = graph.op("MatMul", &[&diff, &half], vec![]);

        let mut x = if graph.num_dense() > 0 {
            graph.op("Concat", &[&flat, DENSE_INPUT], vec![AttributeProto::int("axis", 1)])
        } else {
            flat
        };
        for (i, block) in self.blocks.iter().enumerate() {
            x = block.export(graph, &x, &format!("deep_{i}"))?;
        }

        let [d_in, _] = self.projection.weight.val().dims();
        let weights = tensor_values(self.projection.weight.val())?;
        let bias = match &self.projection.bias {
            Some(b) => tensor_values(b.val())?,
            None    => vec![0.0],
        };
        let deep = graph.dense_layer("deep_out", &x, weights, bias, d_in, 1)?;

        let partial = graph.op("Add", &[&linear, &fm], vec![]);
        Ok(graph.op("Add", &[&partial, &deep], vec![]))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    fn naive_pairwise(values: &[f32], n: usize, k: usize) -> f32 {
        let mut total = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                for d in 0..k {
                    total += values[i * k + d] * values[j * k + d];
                }
            }
        }
        total
    }

    #[test]
    fn test_fm_identity_matches_double_loop() {
        let device = Default::default();
        let (batch, n, k) = (3, 4, 4);
        let values: Vec<f32> = (0..batch * n * k)
            .map(|x| ((x * 37 % 23) as f32 - 11.0) / 20.0)
            .collect();

        let embedded = Tensor::<NdArray, 1>::from_floats(values.as_slice(), &device)
            .reshape([batch, n, k]);
        let fm = tensor_values(fm_interaction(embedded)).unwrap();

        for b in 0..batch {
            let expected = naive_pairwise(&values[b * n * k..(b + 1) * n * k], n, k);
            assert!((fm[b] - expected).abs() < 1e-5, "row {b}: {} vs {expected}", fm[b]);
        }
    }

    #[test]
    fn test_single_field_has_no_interaction() {
        let device = Default::default();
        let embedded = Tensor::<NdArray, 1>::from_floats([0.3, -1.2, 2.0], &device).reshape([1, 1, 3]);
        let fm = tensor_values(fm_interaction(embedded)).unwrap();
        assert!(fm[0].abs() < 1e-6);
    }

    #[test]
    fn test_probability_range() {
        let device = Default::default();
        let model: DeepFm<NdArray> = DeepFmConfig::new(vec![6, 4, 9], 2).init(&device);

        let sparse = Tensor::<NdArray, 1, Int>::from_ints([0, 1, 2, 5, 3, 8, 2, 0, 4], &device)
            .reshape([3, 3]);
        let dense = Tensor::<NdArray, 1>::from_floats([0.1, -0.3, 2.5, 1.0, -4.0, 0.0], &device)
            .reshape([3, 2]);

        let probs = tensor_values(model.score(sparse, Some(dense))).unwrap();
        assert_eq!(probs.len(), 3);
        assert!(probs.iter().all(|p| *p > 0.0 && *p < 1.0), "{probs:?}");
    }

    #[test]
    fn test_defaults() {
        let config = DeepFmConfig::new(vec![3], 0);
        assert_eq!(config.embedding_dim, 8);
        assert_eq!(config.hidden_units, vec![64, 32]);
        assert_eq!(config.dropout, 0.5);

        let model: DeepFm<NdArray> = config.init(&Default::default());
        assert_eq!(model.blocks.len(), 2);
        assert_eq!(model.projection.weight.val().dims(), [32, 1]);
    }

    /// Rows of indices below each of `vocab_sizes`, deterministic.
    fn index_rows(vocab_sizes: &[usize], rows: usize) -> Vec<Vec<u32>> {
        (0..rows)
            .map(|r| vocab_sizes.iter().enumerate().map(|(i, &v)| ((r * 7 + i * 3) % v) as u32).collect())
            .collect()
    }

    fn sparse_tensor(rows: &[Vec<u32>], device: &<NdArray as Backend>::Device) -> Tensor<NdArray, 2, Int> {
        let flat: Vec<i32> = rows.iter().flatten().map(|&i| i as i32).collect();
        Tensor::<NdArray, 1, Int>::from_ints(flat.as_slice(), device).reshape([rows.len(), rows[0].len()])
    }

    #[test]
    fn test_fresh_model_logit_is_the_fm_term() {
        let device = Default::default();
        let vocab_sizes = vec![21, 11, 16, 9, 6, 7, 6, 13, 22, 8, 6];
        let model: DeepFm<NdArray> = DeepFmConfig::new(vocab_sizes.clone(), 0).init(&device);

        let rows   = index_rows(&vocab_sizes, 64);
        let sparse = sparse_tensor(&rows, &device);
        let logits = tensor_values(model.forward_logits(sparse.clone(), None)).unwrap();
        let fm     = tensor_values(fm_interaction(lookup(&model.embeddings, &sparse))).unwrap();

        for (logit, fm) in logits.iter().zip(&fm) {
            assert!((logit - fm).abs() < 1e-6, "{logit} vs {fm}");
        }
        // 11 interacting fields still start close to p = 0.5
        let mean_abs = logits.iter().map(|l| l.abs()).sum::<f32>() / logits.len() as f32;
        assert!(mean_abs < 0.5, "mean |logit| {mean_abs}");
    }

    #[test]
    fn test_exported_graph_takes_any_batch_size() {
        use crate::ml::model::export_onnx;
        use crate::ml::onnx::{graph::encode, runtime};

        let device = Default::default();
        let vocab_sizes = vec![6, 4, 9];
        let mut model: DeepFm<NdArray> = DeepFmConfig::new(vocab_sizes.clone(), 2).init(&device);
        // non-zero projection so the deep part reaches the output
        model.projection.weight = burn::module::Param::from_tensor(Tensor::<NdArray, 2>::ones([32, 1], &device) * 0.1);

        let bytes = encode(&export_onnx(&model, 3, 2).unwrap());
        let plan  = runtime::load(&bytes);

        for batch in [1, 3] {
            let rows  = index_rows(&vocab_sizes, batch);
            let dense: Vec<Vec<f32>> = (0..batch).map(|r| vec![r as f32 * 0.5 - 1.0, 0.25]).collect();
            let flat: Vec<f32> = dense.iter().flatten().copied().collect();

            let expected = tensor_values(model.score(
                sparse_tensor(&rows, &device),
                Some(Tensor::<NdArray, 1>::from_floats(flat.as_slice(), &device).reshape([batch, 2])),
            ))
            .unwrap();
            let actual = runtime::score(&plan, &rows, &dense);

            assert_eq!(actual.len(), batch);
            for (a, e) in actual.iter().zip(&expected) {
                assert!((a - e).abs() < 1e-5, "batch {batch}: onnx {a} vs burn {e}");
            }
        }
    }
}
