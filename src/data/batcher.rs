// ============================================================
// Layer 4 — CTR Batcher
// ============================================================
// Implements burn's Batcher trait to stack a Vec<CtrSample>
// into the two model inputs:
//
//   sparse  [batch, num_sparse]  Int    (vocabulary indices)
//   dense   [batch, num_dense]   Float  (standardised values)
//
// Every sample has the same vector lengths (fixed by the
// declared feature ordering), so a flat Vec + reshape is all
// that is needed.
//
// A corpus with no numeric features yields `dense = None`
// instead of a zero-width tensor.

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::CtrSample;

#[derive(Debug, Clone)]
pub struct CtrBatch<B: Backend> {
    /// Vocabulary indices, shape [batch_size, num_sparse]
    pub sparse: Tensor<B, 2, Int>,

    /// Standardised numeric features, shape [batch_size, num_dense]
    pub dense: Option<Tensor<B, 2>>,

    /// 0/1 labels, shape [batch_size]
    pub targets: Tensor<B, 1, Int>,

    /// Host copy of the labels for accuracy bookkeeping
    pub clicks: Vec<bool>,
}

impl<B: Backend> CtrBatch<B> {
    pub fn len(&self) -> usize {
        self.clicks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clicks.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct CtrBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> CtrBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    /// Stack bare feature vectors (no labels), as the scorer needs.
    pub fn inputs(
        &self,
        sparse: &[Vec<u32>],
        dense:  &[Vec<f32>],
    ) -> (Tensor<B, 2, Int>, Option<Tensor<B, 2>>) {
        let batch_size = sparse.len();
        let num_sparse = sparse.first().map_or(0, Vec::len);
        let num_dense  = dense.first().map_or(0, Vec::len);

        let sparse_flat: Vec<i32> = sparse
            .iter()
            .flat_map(|row| row.iter().map(|&i| i as i32))
            .collect();
        let sparse = Tensor::<B, 1, Int>::from_ints(sparse_flat.as_slice(), &self.device)
            .reshape([batch_size, num_sparse]);

        let dense = (num_dense > 0).then(|| {
            let dense_flat: Vec<f32> = dense.iter().flatten().copied().collect();
            Tensor::<B, 1>::from_floats(dense_flat.as_slice(), &self.device)
                .reshape([batch_size, num_dense])
        });

        (sparse, dense)
    }
}

impl<B: Backend> Batcher<CtrSample, CtrBatch<B>> for CtrBatcher<B> {
    fn batch(&self, items: Vec<CtrSample>) -> CtrBatch<B> {
        let (sparse, dense): (Vec<Vec<u32>>, Vec<Vec<f32>>) = items
            .iter()
            .map(|s| (s.sparse.clone(), s.dense.clone()))
            .unzip();
        let (sparse, dense) = self.inputs(&sparse, &dense);

        let clicks: Vec<bool> = items.iter().map(CtrSample::is_click).collect();
        let labels: Vec<i32>  = clicks.iter().map(|&c| c as i32).collect();
        let targets = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), &self.device);

        CtrBatch { sparse, dense, targets, clicks }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::row::Partition;
    use burn::backend::NdArray;

    fn sample(sparse: Vec<u32>, dense: Vec<f32>, label: f32) -> CtrSample {
        CtrSample { sparse, dense, label, partition: Partition::Train }
    }

    #[test]
    fn test_batch_shapes() {
        let batcher = CtrBatcher::<NdArray>::new(Default::default());
        let batch = batcher.batch(vec![
            sample(vec![0, 1, 2], vec![0.5, -0.5], 1.0),
            sample(vec![3, 4, 5], vec![1.5, -1.5], 0.0),
        ]);

        assert_eq!(batch.sparse.dims(), [2, 3]);
        assert_eq!(batch.dense.as_ref().map(|d| d.dims()), Some([2, 2]));
        assert_eq!(batch.targets.dims(), [2]);
        assert_eq!(batch.clicks, vec![true, false]);

        let row_major: Vec<i64> = batch.sparse.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(row_major, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_no_dense_features() {
        let batcher = CtrBatcher::<NdArray>::new(Default::default());
        let batch = batcher.batch(vec![sample(vec![1], vec![], 0.0)]);
        assert!(batch.dense.is_none());
        assert_eq!(batch.len(), 1);
    }
}
