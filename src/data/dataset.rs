use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::data::encoder::EncodedFeatures;
use crate::domain::row::{LabeledRow, Partition};

/// One encoded row: fixed-length index and value vectors plus supervision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CtrSample {
    pub sparse:    Vec<u32>,
    pub dense:     Vec<f32>,
    pub label:     f32,
    pub partition: Partition,
}

impl CtrSample {
    pub fn is_click(&self) -> bool {
        self.label >= 0.5
    }
}

/// Zip encoder output back together with the labels and split tags.
pub fn attach_labels(encoded: EncodedFeatures, rows: &[LabeledRow]) -> Vec<CtrSample> {
    encoded
        .sparse
        .into_iter()
        .zip(encoded.dense)
        .zip(rows)
        .map(|((sparse, dense), row)| CtrSample {
            sparse,
            dense,
            label:     row.label,
            partition: row.partition,
        })
        .collect()
}

pub struct CtrDataset {
    samples: Vec<CtrSample>,
}

impl CtrDataset {
    pub fn new(samples: Vec<CtrSample>) -> Self { Self { samples } }

    pub fn positive_rate(&self) -> f64 {
        if self.samples.is_empty() { return 0.0; }
        let clicks = self.samples.iter().filter(|s| s.is_click()).count();
        clicks as f64 / self.samples.len() as f64
    }

    /// Accuracy of always predicting the more frequent class.
    pub fn majority_baseline(&self) -> f64 {
        let p = self.positive_rate();
        p.max(1.0 - p)
    }

    pub fn samples(&self) -> &[CtrSample] { &self.samples }
}

impl Dataset<CtrSample> for CtrDataset {
    fn get(&self, index: usize) -> Option<CtrSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
