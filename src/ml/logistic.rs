use anyhow::Result;
use burn::prelude::*;

use crate::domain::feature_config::ModelType;
use crate::ml::model::{LinearTerm, ScoringModel};
use crate::ml::onnx::graph::GraphBuilder;

#[derive(Config, Debug)]
pub struct LogisticRegressionConfig {
    pub vocab_sizes: Vec<usize>,
    pub num_dense:   usize,
}

impl LogisticRegressionConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> LogisticRegression<B> {
        LogisticRegression {
            linear: LinearTerm::init(&self.vocab_sizes, self.num_dense, device),
        }
    }
}

/// `sigmoid(Σ_i w_i[idx_i] + dense · w_dense + bias)`
#[derive(Module, Debug)]
pub struct LogisticRegression<B: Backend> {
    pub linear: LinearTerm<B>,
}

impl<B: Backend> ScoringModel<B> for LogisticRegression<B> {
    fn model_type(&self) -> ModelType {
        ModelType::LogisticRegression
    }

    fn forward_logits(&self, sparse: Tensor<B, 2, Int>, dense: Option<Tensor<B, 2>>) -> Tensor<B, 1> {
        self.linear.forward(&sparse, dense)
    }

    fn export_graph(&self, graph: &mut GraphBuilder) -> Result<String> {
        self.linear.export(graph)
    }
}
