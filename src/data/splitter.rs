// ============================================================
// Layer 4 — Partition Splitter
// ============================================================
// Routes encoded samples into TRAIN and VALIDATE by the tag the
// upstream query derived from event timestamps:
//
//   TRAIN     events older than 6h, within the last 7 days
//   VALIDATE  events from the last 6h
//   IGNORE    everything else, dropped here
//
// No shuffling happens at this stage; the training loader
// shuffles TRAIN per epoch and VALIDATE is read in order.

use crate::data::dataset::CtrSample;
use crate::domain::error::PipelineError;
use crate::domain::row::Partition;

/// Split `samples` into (train, validate), dropping IGNORE rows.
pub fn split_by_partition(samples: Vec<CtrSample>) -> (Vec<CtrSample>, Vec<CtrSample>) {
    let total = samples.len();
    let mut train = Vec::new();
    let mut valid = Vec::new();

    for sample in samples {
        match sample.partition {
            Partition::Train    => train.push(sample),
            Partition::Validate => valid.push(sample),
            Partition::Ignore   => {}
        }
    }

    tracing::debug!(
        "Partition split: {} train, {} validate, {} ignored",
        train.len(),
        valid.len(),
        total - train.len() - valid.len(),
    );

    (train, valid)
}

/// Both partitions must be non-empty before a model is even built.
pub fn ensure_non_empty(train: &[CtrSample], valid: &[CtrSample]) -> Result<(), PipelineError> {
    if train.is_empty() {
        return Err(PipelineError::EmptyPartition { partition: Partition::Train });
    }
    if valid.is_empty() {
        return Err(PipelineError::EmptyPartition { partition: Partition::Validate });
    }
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn sample(partition: Partition) -> CtrSample {
        CtrSample { sparse: vec![0], dense: vec![], label: 0.0, partition }
    }

    #[test]
    fn test_ignore_rows_are_dropped() {
        let samples = vec![
            sample(Partition::Train),
            sample(Partition::Ignore),
            sample(Partition::Validate),
            sample(Partition::Train),
        ];
        let (train, valid) = split_by_partition(samples);
        assert_eq!(train.len(), 2);
        assert_eq!(valid.len(), 1);
        assert!(train.iter().all(|s| s.partition == Partition::Train));
    }

    #[test]
    fn test_empty_partitions_are_rejected() {
        let (train, valid) = split_by_partition(vec![sample(Partition::Train)]);
        assert_eq!(
            ensure_non_empty(&train, &valid),
            Err(PipelineError::EmptyPartition { partition: Partition::Validate })
        );

        let (train, valid) = split_by_partition(vec![sample(Partition::Validate)]);
        assert_eq!(
            ensure_non_empty(&train, &valid),
            Err(PipelineError::EmptyPartition { partition: Partition::Train })
        );
    }

    #[test]
    fn test_empty_dataset() {
        let (train, valid) = split_by_partition(Vec::new());
        assert!(train.is_empty());
        assert!(valid.is_empty());
        assert!(ensure_non_empty(&train, &valid).is_err());
    }
}
