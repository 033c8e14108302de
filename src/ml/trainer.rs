// ============================================================
// Layer 5 — Training Loop
// ============================================================
// One loop for every ScoringModel, driven by burn's DataLoader
// and Adam on binary cross-entropy over logits.
//
// Train vs. evaluation mode is a type, not a flag:
//   - M on B (Autodiff)           dropout on, BN batch statistics
//   - model.valid() on B::Inner   dropout off, BN running statistics
// so evaluation batches are built on the inner backend too.
//
//   epoch 0     fresh model evaluated (reference loss)
//   epoch 1..E  shuffled TRAIN mini-batches → VALIDATE evaluation
//
// No early stopping, no LR schedule.

use anyhow::Result;
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    module::AutodiffModule,
    nn::loss::BinaryCrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::{activation, backend::AutodiffBackend},
};

use crate::data::{
    batcher::{CtrBatch, CtrBatcher},
    dataset::{CtrDataset, CtrSample},
    splitter::ensure_non_empty,
};
use crate::infra::metrics::{EpochMetrics, MetricsLogger};
use crate::ml::model::{tensor_values, ScoringModel};

/// Probabilities strictly above this count as a predicted click.
pub const DECISION_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct TrainingOptions {
    pub epochs:     usize,
    pub batch_size: usize,
    pub lr:         f64,
    pub seed:       u64,
}

#[derive(Debug, Clone)]
pub struct TrainingReport {
    /// The untrained model, evaluated: `train_loss` is the reference loss.
    pub initial:           EpochMetrics,
    pub epochs:            Vec<EpochMetrics>,
    /// Accuracy of always predicting the VALIDATE majority class.
    pub majority_baseline: f64,
}

impl TrainingReport {
    pub fn initial_loss(&self) -> f64 {
        self.initial.train_loss
    }

    pub fn last(&self) -> &EpochMetrics {
        self.epochs.last().unwrap_or(&self.initial)
    }
}

/// Fit the model `init` builds and return its evaluation-mode copy.
///
/// Fails before `init` runs if either partition is empty.
pub fn fit<B, M>(
    init:    impl FnOnce(&B::Device) -> M,
    train:   Vec<CtrSample>,
    valid:   Vec<CtrSample>,
    options: &TrainingOptions,
    device:  &B::Device,
    metrics: Option<&MetricsLogger>,
) -> Result<(M::InnerModule, TrainingReport)>
where
    B: AutodiffBackend,
    M: ScoringModel<B> + AutodiffModule<B>,
    M::InnerModule: ScoringModel<B::InnerBackend>,
{
    ensure_non_empty(&train, &valid)?;

    B::seed(options.seed);
    let mut model = init(device);
    tracing::info!(
        "{} ready: {} parameters, {} train / {} validate rows",
        model.model_type(), model.num_params(), train.len(), valid.len(),
    );

    let train_dataset     = CtrDataset::new(train);
    let valid_dataset     = CtrDataset::new(valid);
    let majority_baseline = valid_dataset.majority_baseline();

    // ── Data loaders ─────────────────────────────────────────────────────────
    let reference_loader = DataLoaderBuilder::new(CtrBatcher::<B::InnerBackend>::new(device.clone()))
        .batch_size(options.batch_size)
        .build(CtrDataset::new(train_dataset.samples().to_vec()));

    let train_loader = DataLoaderBuilder::new(CtrBatcher::<B>::new(device.clone()))
        .batch_size(options.batch_size)
        .shuffle(options.seed)
        .build(train_dataset);

    let valid_loader = DataLoaderBuilder::new(CtrBatcher::<B::InnerBackend>::new(device.clone()))
        .batch_size(options.batch_size)
        .build(valid_dataset);

    // ── Reference loss ───────────────────────────────────────────────────────
    let fresh = model.valid();
    let (initial_loss, _) = evaluate(&fresh, reference_loader.as_ref())?;
    let (val_loss, val_accuracy) = evaluate(&fresh, valid_loader.as_ref())?;
    let initial = EpochMetrics::new(0, initial_loss, val_loss, val_accuracy);
    drop(fresh);

    println!(
        "Epoch {:>3}/{} | train_loss={:.4} | val_loss={:.4} | val_acc={:.2}% (untrained)",
        0, options.epochs, initial.train_loss, initial.val_loss, initial.val_accuracy * 100.0,
    );
    if let Some(logger) = metrics {
        logger.log(&initial)?;
    }

    let mut optim  = AdamConfig::new().init();
    let mut epochs = Vec::with_capacity(options.epochs);

    for epoch in 1..=options.epochs {
        // ── Training phase ───────────────────────────────────────────────────
        let mut loss_sum = 0.0f64;
        let mut seen     = 0usize;

        for batch in train_loader.iter() {
            let n = batch.len();
            let logits = model.forward_logits(batch.sparse, batch.dense);
            let loss = BinaryCrossEntropyLossConfig::new()
                .with_logits(true)
                .init(&logits.device())
                .forward(logits, batch.targets);

            loss_sum += loss.clone().into_scalar().elem::<f64>() * n as f64;
            seen     += n;

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(options.lr, model, grads);
        }
        let train_loss = if seen > 0 { loss_sum / seen as f64 } else { f64::NAN };

        // ── Validation phase ─────────────────────────────────────────────────
        let (val_loss, val_accuracy) = evaluate(&model.valid(), valid_loader.as_ref())?;
        let m = EpochMetrics::new(epoch, train_loss, val_loss, val_accuracy);

        println!(
            "Epoch {:>3}/{} | train_loss={:.4} | val_loss={:.4} | val_acc={:.2}%",
            epoch, options.epochs, m.train_loss, m.val_loss, m.val_accuracy * 100.0,
        );
        if let Some(logger) = metrics {
            logger.log(&m)?;
        }
        epochs.push(m);
    }

    tracing::info!("Training complete after {} epochs", options.epochs);
    let report = TrainingReport { initial, epochs, majority_baseline };
    Ok((model.valid(), report))
}

/// Sample-weighted mean loss and accuracy of `model` over `loader`.
pub fn evaluate<B: Backend, M: ScoringModel<B>>(
    model:  &M,
    loader: &dyn DataLoader<CtrBatch<B>>,
) -> Result<(f64, f64)> {
    let mut loss_sum = 0.0f64;
    let mut correct  = 0usize;
    let mut seen     = 0usize;

    for batch in loader.iter() {
        let n = batch.len();
        let logits = model.forward_logits(batch.sparse, batch.dense);
        let loss = BinaryCrossEntropyLossConfig::new()
            .with_logits(true)
            .init(&logits.device())
            .forward(logits.clone(), batch.targets);
        loss_sum += loss.into_scalar().elem::<f64>() * n as f64;

        let probs = tensor_values(activation::sigmoid(logits))?;
        correct += probs
            .iter()
            .zip(&batch.clicks)
            .filter(|(p, click)| (**p > DECISION_THRESHOLD) == **click)
            .count();
        seen += n;
    }

    if seen == 0 {
        return Ok((f64::NAN, 0.0));
    }
    Ok((loss_sum / seen as f64, correct as f64 / seen as f64))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::PipelineError;
    use crate::domain::row::Partition;
    use crate::ml::logistic::{LogisticRegression, LogisticRegressionConfig};
    use burn::backend::{Autodiff, NdArray};

    type Train = Autodiff<NdArray>;

    fn sample(index: u32, label: f32, partition: Partition) -> CtrSample {
        CtrSample { sparse: vec![index], dense: vec![], label, partition }
    }

    fn options(epochs: usize) -> TrainingOptions {
        TrainingOptions { epochs, batch_size: 16, lr: 0.05, seed: 1 }
    }

    #[test]
    fn test_empty_validate_fails_before_init() {
        let train = vec![sample(0, 1.0, Partition::Train)];
        let mut built = false;
        let err = fit::<Train, LogisticRegression<Train>>(
            |device| {
                built = true;
                LogisticRegressionConfig::new(vec![2], 0).init(device)
            },
            train,
            Vec::new(),
            &options(1),
            &Default::default(),
            None,
        )
        .unwrap_err();

        assert_eq!(
            err.downcast_ref::<PipelineError>(),
            Some(&PipelineError::EmptyPartition { partition: Partition::Validate })
        );
        assert!(!built);
    }

    #[test]
    fn test_loss_decreases_on_separable_data() {
        // index 1 always clicks, index 0 never does
        let train: Vec<CtrSample> = (0..200)
            .map(|i| sample(i % 2, (i % 2) as f32, Partition::Train))
            .collect();
        let valid: Vec<CtrSample> = (0..40)
            .map(|i| sample(i % 2, (i % 2) as f32, Partition::Validate))
            .collect();

        let (model, report) = fit::<Train, LogisticRegression<Train>>(
            |device| LogisticRegressionConfig::new(vec![3], 0).init(device),
            train,
            valid,
            &options(5),
            &Default::default(),
            None,
        )
        .unwrap();

        assert!((report.initial_loss() - std::f64::consts::LN_2).abs() < 1e-4);
        assert!(report.last().train_loss < report.initial_loss());
        assert_eq!(report.epochs.len(), 5);
        assert!((report.last().val_accuracy - 1.0).abs() < 1e-9);
        assert!(model.num_params() == 4);
    }
}
