// ============================================================
// Layer 5 — ONNX Graph Builder
// ============================================================
// Assembles a ModelProto node by node. The scoring models only
// append the ops for their own logit; the builder owns the
// shared plumbing:
//
//   sparse_inputs  int64 [batch_size, N]
//   dense_inputs   float [batch_size, D]
//        │
//        ▼   (model-specific ops → logit [batch_size, 1])
//   Sigmoid → Reshape([-1]) → pctr float [batch_size]
//
// Per-feature embedding tables are exported as ONE concatenated
// initializer plus an int64 offset per feature, so a single
// Add + Gather replaces N separate lookups.

use anyhow::{ensure, Result};
use prost::Message;

use crate::ml::onnx::proto::{
    tensor_shape_proto::{dimension, Dimension},
    type_proto, AttributeProto, GraphProto, ModelProto, NodeProto, OperatorSetIdProto,
    TensorProto, TensorShapeProto, TypeProto, ValueInfoProto, DATA_TYPE_FLOAT, DATA_TYPE_INT64,
};

pub const IR_VERSION: i64 = 7;
pub const OPSET_VERSION: i64 = 14;

pub const SPARSE_INPUT: &str = "sparse_inputs";
pub const DENSE_INPUT:  &str = "dense_inputs";
pub const OUTPUT_NAME:  &str = "pctr";
pub const BATCH_DIM:    &str = "batch_size";

/// A `[rows, cols]` row-major f32 table, one per categorical feature.
pub struct EmbeddingTable {
    pub rows:   usize,
    pub cols:   usize,
    pub values: Vec<f32>,
}

pub struct GraphBuilder {
    num_sparse:   usize,
    num_dense:    usize,
    nodes:        Vec<NodeProto>,
    initializers: Vec<TensorProto>,
    offset_index: Option<String>,
    next_id:      usize,
}

impl GraphBuilder {
    pub fn new(num_sparse: usize, num_dense: usize) -> Self {
        Self {
            num_sparse,
            num_dense,
            nodes:        Vec::new(),
            initializers: Vec::new(),
            offset_index: None,
            next_id:      0,
        }
    }

    pub fn num_dense(&self) -> usize { self.num_dense }

    fn fresh(&mut self, hint: &str) -> String {
        self.next_id += 1;
        format!("{hint}_{}", self.next_id)
    }

    pub fn constant_f32(&mut self, hint: &str, dims: &[usize], values: Vec<f32>) -> Result<String> {
        ensure!(
            dims.iter().product::<usize>() == values.len(),
            "initializer {hint}: shape {dims:?} does not hold {} values", values.len()
        );
        let name = self.fresh(hint);
        self.initializers.push(TensorProto {
            name:       name.clone(),
            dims:       dims.iter().map(|&d| d as i64).collect(),
            data_type:  DATA_TYPE_FLOAT,
            float_data: values,
            ..Default::default()
        });
        Ok(name)
    }

    pub fn constant_i64(&mut self, hint: &str, dims: &[usize], values: Vec<i64>) -> Result<String> {
        ensure!(
            dims.iter().product::<usize>() == values.len(),
            "initializer {hint}: shape {dims:?} does not hold {} values", values.len()
        );
        let name = self.fresh(hint);
        self.initializers.push(TensorProto {
            name:       name.clone(),
            dims:       dims.iter().map(|&d| d as i64).collect(),
            data_type:  DATA_TYPE_INT64,
            int64_data: values,
            ..Default::default()
        });
        Ok(name)
    }

    /// Append one node and return the name of its (single) output.
    pub fn op(&mut self, op_type: &str, inputs: &[&str], attribute: Vec<AttributeProto>) -> String {
        let output = self.fresh(&op_type.to_lowercase());
        self.push_node(op_type, inputs, attribute, output.clone());
        output
    }

    fn push_node(&mut self, op_type: &str, inputs: &[&str], attribute: Vec<AttributeProto>, output: String) {
        let name = format!("{op_type}_{}", self.nodes.len());
        self.nodes.push(NodeProto {
            name,
            op_type: op_type.to_string(),
            input:   inputs.iter().map(|s| s.to_string()).collect(),
            output:  vec![output],
            attribute,
            ..Default::default()
        });
    }

    /// `sparse_inputs + offsets`, computed once per graph.
    fn global_index(&mut self, tables: &[EmbeddingTable]) -> Result<String> {
        if let Some(index) = &self.offset_index {
            return Ok(index.clone());
        }
        let mut offsets = Vec::with_capacity(tables.len());
        let mut running = 0i64;
        for table in tables {
            offsets.push(running);
            running += table.rows as i64;
        }
        let offsets = self.constant_i64("sparse_offsets", &[tables.len()], offsets)?;
        let index = self.op("Add", &[SPARSE_INPUT, &offsets], vec![]);
        self.offset_index = Some(index.clone());
        Ok(index)
    }

    /// Look up every feature's row and flatten: `[batch_size, N * cols]`.
    ///
    /// All tables must share `cols`, and their row counts must be the
    /// vocabulary sizes in feature order (the offsets depend on it).
    pub fn embedding_lookup(&mut self, hint: &str, tables: &[EmbeddingTable]) -> Result<String> {
        ensure!(tables.len() == self.num_sparse, "expected {} tables, got {}", self.num_sparse, tables.len());
        let cols = tables.first().map_or(0, |t| t.cols);
        ensure!(tables.iter().all(|t| t.cols == cols), "{hint}: tables differ in width");

        let rows: usize = tables.iter().map(|t| t.rows).sum();
        let values: Vec<f32> = tables.iter().flat_map(|t| t.values.iter().copied()).collect();
        let table = self.constant_f32(hint, &[rows, cols], values)?;

        let index    = self.global_index(tables)?;
        let gathered = self.op("Gather", &[&table, &index], vec![]);
        Ok(self.op("Flatten", &[&gathered], vec![AttributeProto::int("axis", 1)]))
    }

    /// `x [batch, in] · W [in, out] + b [out]` with W in row-major `[in, out]`.
    pub fn dense_layer(
        &mut self,
        hint:    &str,
        input:   &str,
        weights: Vec<f32>,
        bias:    Vec<f32>,
        d_in:    usize,
        d_out:   usize,
    ) -> Result<String> {
        let w = self.constant_f32(&format!("{hint}_weight"), &[d_in, d_out], weights)?;
        let b = self.constant_f32(&format!("{hint}_bias"), &[d_out], bias)?;
        Ok(self.op("Gemm", &[input, &w, &b], vec![]))
    }

    /// Close the graph: `pctr = reshape(sigmoid(logit), [-1])`.
    pub fn finish(mut self, logit: &str, doc_string: &str) -> Result<ModelProto> {
        let probability = self.op("Sigmoid", &[logit], vec![]);
        let flat_shape  = self.constant_i64("pctr_shape", &[1], vec![-1])?;
        self.push_node("Reshape", &[&probability, &flat_shape], vec![], OUTPUT_NAME.to_string());

        let graph = GraphProto {
            name:        "pctr".to_string(),
            node:        self.nodes,
            initializer: self.initializers,
            input: vec![
                value_info(SPARSE_INPUT, DATA_TYPE_INT64, Some(self.num_sparse)),
                value_info(DENSE_INPUT, DATA_TYPE_FLOAT, Some(self.num_dense)),
            ],
            output: vec![value_info(OUTPUT_NAME, DATA_TYPE_FLOAT, None)],
            doc_string: doc_string.to_string(),
        };

        Ok(ModelProto {
            ir_version:       IR_VERSION,
            producer_name:    env!("CARGO_PKG_NAME").to_string(),
            producer_version: env!("CARGO_PKG_VERSION").to_string(),
            graph:            Some(graph),
            opset_import:     vec![OperatorSetIdProto { domain: String::new(), version: OPSET_VERSION }],
            ..Default::default()
        })
    }
}

/// `[batch_size, width]`, or `[batch_size]` when `width` is `None`.
fn value_info(name: &str, elem_type: i32, width: Option<usize>) -> ValueInfoProto {
    let mut dim = vec![Dimension { value: Some(dimension::Value::DimParam(BATCH_DIM.to_string())) }];
    if let Some(w) = width {
        dim.push(Dimension { value: Some(dimension::Value::DimValue(w as i64)) });
    }
    ValueInfoProto {
        name: name.to_string(),
        r#type: Some(TypeProto {
            value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                elem_type,
                shape: Some(TensorShapeProto { dim }),
            })),
        }),
    }
}

pub fn encode(model: &ModelProto) -> Vec<u8> {
    model.encode_to_vec()
}
