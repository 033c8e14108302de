// ============================================================
// Layer 4 — Feature Encoder
// ============================================================
// Turns raw request attributes into the fixed-shape numeric
// input of the scoring models:
//
//   categorical  → index into a per-feature vocabulary
//   numeric      → (x - mean) / std
//
// The same code path runs at fit time and at transform time,
// and FittedEncoder <-> FeatureConfig is lossless, so a serving
// system that follows the document reproduces training-time
// encoding exactly.
//
// Data-quality problems never raise:
//   - declared column absent       → warn, constant index 0 / value 0.0
//   - null categorical value       → the literal "unknown"
//   - value unseen at fit time     → the feature's <UNK> sentinel
//   - null / unparseable numeric   → 0.0
//   - zero-variance numeric column → std stored as 1.0

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::domain::error::PipelineError;
use crate::domain::feature_config::{FeatureConfig, ModelType};
use crate::domain::row::{Corpus, RawRow};

/// Replacement for null categorical cells. A real vocabulary entry.
pub const UNKNOWN_VALUE: &str = "unknown";

/// Reserved class for values never seen at fit time. Always last.
pub const UNSEEN_SENTINEL: &str = "<UNK>";

/// Standard deviations below this are stored as 1.0.
const MIN_STD: f64 = 1e-12;

// ─── CategoricalVocabulary ────────────────────────────────────────────────────
/// Observed value → index for one categorical feature.
///
/// Indices `0..len-1` are the distinct fit-time values in sorted order;
/// index `len-1` is always [`UNSEEN_SENTINEL`].
#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalVocabulary {
    classes: Vec<String>,
    index:   HashMap<String, u32>,
}

impl CategoricalVocabulary {
    /// Build from every value observed in the fit corpus.
    pub fn fit<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let distinct: BTreeSet<&str> = values
            .into_iter()
            .filter(|v| *v != UNSEEN_SENTINEL)
            .collect();

        let mut classes: Vec<String> = distinct.into_iter().map(str::to_string).collect();
        classes.push(UNSEEN_SENTINEL.to_string());
        Self::from_sorted_classes(classes)
    }

    /// Vocabulary for a feature that was declared but never observed.
    pub fn sentinel_only() -> Self {
        Self::from_sorted_classes(vec![UNSEEN_SENTINEL.to_string()])
    }

    /// Rebuild from a serialised class list, validating the invariants.
    pub fn from_classes(feature: &str, classes: Vec<String>) -> Result<Self, PipelineError> {
        if classes.last().map(String::as_str) != Some(UNSEEN_SENTINEL) {
            return Err(PipelineError::InvalidFeatureConfig(format!(
                "class list of '{feature}' must end with {UNSEEN_SENTINEL}"
            )));
        }
        let distinct: BTreeSet<&String> = classes.iter().collect();
        if distinct.len() != classes.len() {
            return Err(PipelineError::InvalidFeatureConfig(format!(
                "class list of '{feature}' contains duplicates"
            )));
        }
        Ok(Self::from_sorted_classes(classes))
    }

    fn from_sorted_classes(classes: Vec<String>) -> Self {
        let index = classes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i as u32))
            .collect();
        Self { classes, index }
    }

    /// Index of `value`, or the sentinel index when it was never seen.
    pub fn encode(&self, value: &str) -> u32 {
        self.index
            .get(value)
            .copied()
            .unwrap_or_else(|| self.sentinel_index())
    }

    pub fn sentinel_index(&self) -> u32 {
        (self.classes.len() - 1) as u32
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

// ─── NumericScaler ────────────────────────────────────────────────────────────
/// Per-feature standardisation with population statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericScaler {
    means: Vec<f64>,
    stds:  Vec<f64>,
}

impl NumericScaler {
    /// `columns[j]` holds every (already null-filled) value of feature j.
    pub fn fit(columns: &[Vec<f64>]) -> Self {
        let mut means = Vec::with_capacity(columns.len());
        let mut stds  = Vec::with_capacity(columns.len());

        for column in columns {
            let n = column.len().max(1) as f64;
            let mean = column.iter().sum::<f64>() / n;
            let var  = column.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
            let std  = var.sqrt();

            means.push(mean);
            stds.push(if std < MIN_STD { 1.0 } else { std });
        }

        Self { means, stds }
    }

    pub fn from_parts(means: Vec<f64>, stds: Vec<f64>) -> Result<Self, PipelineError> {
        if means.len() != stds.len() {
            return Err(PipelineError::InvalidFeatureConfig(format!(
                "{} dense means but {} dense stds", means.len(), stds.len()
            )));
        }
        // A zero here would come from a hand-edited document; guard it the same way.
        let stds = stds
            .into_iter()
            .map(|s| if s.is_finite() && s >= MIN_STD { s } else { 1.0 })
            .collect();
        Ok(Self { means, stds })
    }

    pub fn scale(&self, feature: usize, value: f64) -> f32 {
        ((value - self.means[feature]) / self.stds[feature]) as f32
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn stds(&self) -> &[f64] {
        &self.stds
    }
}

// ─── EncodedFeatures ──────────────────────────────────────────────────────────
/// Row-major encoder output. `sparse[r].len()` equals the number of declared
/// categorical features for every row r, likewise for `dense`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodedFeatures {
    pub sparse: Vec<Vec<u32>>,
    pub dense:  Vec<Vec<f32>>,
}

impl EncodedFeatures {
    pub fn len(&self) -> usize {
        self.sparse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sparse.is_empty()
    }
}

// ─── FeatureEncoder ───────────────────────────────────────────────────────────
/// The unfitted encoder: just the declared feature ordering.
#[derive(Debug, Clone)]
pub struct FeatureEncoder {
    sparse_features: Vec<String>,
    dense_features:  Vec<String>,
}

impl FeatureEncoder {
    pub fn new(
        sparse_features: Vec<String>,
        dense_features:  Vec<String>,
    ) -> Result<Self, PipelineError> {
        if sparse_features.is_empty() {
            return Err(PipelineError::NoFeatures);
        }
        Ok(Self { sparse_features, dense_features })
    }

    /// Build vocabularies and scaler from `corpus`, then encode it.
    pub fn fit_transform(&self, corpus: &Corpus) -> (EncodedFeatures, FittedEncoder) {
        let vocabularies: Vec<CategoricalVocabulary> = self
            .sparse_features
            .iter()
            .map(|feature| {
                if corpus.has_column(feature) {
                    CategoricalVocabulary::fit(
                        corpus.rows.iter().map(|r| categorical_value(&r.features, feature)),
                    )
                } else {
                    tracing::warn!(
                        "Sparse feature '{}' not found in corpus, filling with index 0",
                        feature
                    );
                    CategoricalVocabulary::sentinel_only()
                }
            })
            .collect();

        let columns: Vec<Vec<f64>> = self
            .dense_features
            .iter()
            .map(|feature| {
                if !corpus.has_column(feature) {
                    tracing::warn!(
                        "Dense feature '{}' not found in corpus, filling with 0.0",
                        feature
                    );
                }
                corpus
                    .rows
                    .iter()
                    .map(|r| numeric_value(&r.features, feature))
                    .collect()
            })
            .collect();
        let scaler = NumericScaler::fit(&columns);

        for (feature, vocab) in self.sparse_features.iter().zip(&vocabularies) {
            tracing::debug!("Vocabulary '{}': {} classes", feature, vocab.len());
        }

        let fitted = FittedEncoder {
            sparse_features: self.sparse_features.clone(),
            dense_features:  self.dense_features.clone(),
            vocabularies,
            scaler,
        };
        let encoded = fitted.transform(corpus);
        (encoded, fitted)
    }
}

// ─── FittedEncoder ────────────────────────────────────────────────────────────
/// Frozen encoder state. Never mutated after `fit_transform`.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedEncoder {
    sparse_features: Vec<String>,
    dense_features:  Vec<String>,
    vocabularies:    Vec<CategoricalVocabulary>,
    scaler:          NumericScaler,
}

impl FittedEncoder {
    pub fn transform(&self, corpus: &Corpus) -> EncodedFeatures {
        let (sparse, dense) = corpus
            .rows
            .iter()
            .map(|r| self.transform_row(&r.features))
            .unzip();
        EncodedFeatures { sparse, dense }
    }

    /// Encode a single request. This is exactly what serving must do.
    pub fn transform_row(&self, row: &RawRow) -> (Vec<u32>, Vec<f32>) {
        let sparse = self
            .sparse_features
            .iter()
            .zip(&self.vocabularies)
            .map(|(feature, vocab)| vocab.encode(categorical_value(row, feature)))
            .collect();

        let dense = self
            .dense_features
            .iter()
            .enumerate()
            .map(|(j, feature)| self.scaler.scale(j, numeric_value(row, feature)))
            .collect();

        (sparse, dense)
    }

    pub fn sparse_features(&self) -> &[String] {
        &self.sparse_features
    }

    pub fn dense_features(&self) -> &[String] {
        &self.dense_features
    }

    pub fn vocabularies(&self) -> &[CategoricalVocabulary] {
        &self.vocabularies
    }

    pub fn vocab_sizes(&self) -> Vec<usize> {
        self.vocabularies.iter().map(CategoricalVocabulary::len).collect()
    }

    pub fn scaler(&self) -> &NumericScaler {
        &self.scaler
    }

    pub fn to_feature_config(&self, model_type: ModelType) -> FeatureConfig {
        let label_encoders: BTreeMap<String, Vec<String>> = self
            .sparse_features
            .iter()
            .zip(&self.vocabularies)
            .map(|(feature, vocab)| (feature.clone(), vocab.classes().to_vec()))
            .collect();

        FeatureConfig {
            sparse_features:    self.sparse_features.clone(),
            dense_features:     self.dense_features.clone(),
            sparse_vocab_sizes: self.vocab_sizes(),
            dense_means:        self.scaler.means().to_vec(),
            dense_stds:         self.scaler.stds().to_vec(),
            label_encoders,
            model_type,
        }
    }

    pub fn from_feature_config(cfg: &FeatureConfig) -> Result<Self, PipelineError> {
        if cfg.sparse_features.is_empty() {
            return Err(PipelineError::NoFeatures);
        }
        if cfg.sparse_features.len() != cfg.sparse_vocab_sizes.len() {
            return Err(PipelineError::InvalidFeatureConfig(format!(
                "{} sparse features but {} vocab sizes",
                cfg.sparse_features.len(),
                cfg.sparse_vocab_sizes.len()
            )));
        }
        if cfg.dense_features.len() != cfg.dense_means.len() {
            return Err(PipelineError::InvalidFeatureConfig(format!(
                "{} dense features but {} dense means",
                cfg.dense_features.len(),
                cfg.dense_means.len()
            )));
        }

        let mut vocabularies = Vec::with_capacity(cfg.sparse_features.len());
        for (feature, &size) in cfg.sparse_features.iter().zip(&cfg.sparse_vocab_sizes) {
            let classes = cfg.label_encoders.get(feature).cloned().ok_or_else(|| {
                PipelineError::InvalidFeatureConfig(format!("no class list for '{feature}'"))
            })?;
            if classes.len() != size {
                return Err(PipelineError::InvalidFeatureConfig(format!(
                    "'{feature}' declares vocab size {size} but lists {} classes",
                    classes.len()
                )));
            }
            vocabularies.push(CategoricalVocabulary::from_classes(feature, classes)?);
        }

        Ok(Self {
            sparse_features: cfg.sparse_features.clone(),
            dense_features:  cfg.dense_features.clone(),
            vocabularies,
            scaler: NumericScaler::from_parts(cfg.dense_means.clone(), cfg.dense_stds.clone())?,
        })
    }
}

// ─── Cell normalisation ───────────────────────────────────────────────────────

fn categorical_value<'a>(row: &'a RawRow, feature: &str) -> &'a str {
    row.get(feature).unwrap_or(UNKNOWN_VALUE)
}

fn numeric_value(row: &RawRow, feature: &str) -> f64 {
    match row.get(feature) {
        None => 0.0,
        Some(raw) => match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => v,
            _ => {
                tracing::debug!("Unparseable value '{}' for '{}', using 0.0", raw, feature);
                0.0
            }
        },
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::row::{LabeledRow, Partition};

    fn row(device: Option<&str>, bid: Option<&str>) -> LabeledRow {
        let mut raw = RawRow::new();
        if let Some(d) = device { raw.set("device", d); }
        if let Some(b) = bid    { raw.set("bid", b); }
        LabeledRow::new(raw, 0.0, Partition::Train)
    }

    fn corpus(rows: Vec<LabeledRow>) -> Corpus {
        Corpus::new(["device", "bid"], rows)
    }

    fn encoder() -> FeatureEncoder {
        FeatureEncoder::new(vec!["device".into()], vec!["bid".into()]).unwrap()
    }

    /// All indices of one categorical feature, in row order.
    fn sparse_column(encoded: &EncodedFeatures, feature: usize) -> Vec<u32> {
        encoded.sparse.iter().map(|row| row[feature]).collect()
    }

    #[test]
    fn test_vocabulary_sorted_with_sentinel_last() {
        let vocab = CategoricalVocabulary::fit(["tablet", "mobile", "desktop", "mobile"]);
        assert_eq!(vocab.classes(), ["desktop", "mobile", "tablet", "<UNK>"]);
        assert_eq!(vocab.sentinel_index(), 3);
        assert_eq!(vocab.encode("mobile"), 1);
    }

    #[test]
    fn test_vocabulary_completeness() {
        let c = corpus(vec![
            row(Some("ios"), Some("1")),
            row(Some("android"), Some("2")),
            row(Some("web"), Some("3")),
        ]);
        let (encoded, fitted) = encoder().fit_transform(&c);

        for (i, r) in c.rows.iter().enumerate() {
            let (sparse, _) = fitted.transform_row(&r.features);
            assert_eq!(sparse, encoded.sparse[i]);
        }
        // Three observed values are all distinct and below the sentinel
        let mut seen = sparse_column(&encoded, 0);
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|&i| i < fitted.vocabularies()[0].sentinel_index()));
    }

    #[test]
    fn test_unseen_value_maps_to_sentinel() {
        let c = corpus(vec![row(Some("ios"), Some("1")), row(Some("android"), Some("2"))]);
        let (_, fitted) = encoder().fit_transform(&c);
        let sentinel = fitted.vocabularies()[0].sentinel_index();

        for unseen in ["symbian", "IOS", " ios", "<UNK>"] {
            let (sparse, _) = fitted.transform_row(&RawRow::new().with("device", unseen));
            assert_eq!(sparse[0], sentinel, "value {unseen:?}");
            assert!((sparse[0] as usize) < fitted.vocab_sizes()[0]);
        }
    }

    #[test]
    fn test_null_is_unknown_not_sentinel() {
        let c = corpus(vec![row(None, Some("1")), row(Some(""), Some("2")), row(Some("ios"), None)]);
        let (encoded, fitted) = encoder().fit_transform(&c);
        let vocab = &fitted.vocabularies()[0];

        assert_eq!(vocab.classes(), ["ios", "unknown", "<UNK>"]);
        assert_eq!(encoded.sparse[0][0], vocab.encode("unknown"));
        assert_eq!(encoded.sparse[1][0], vocab.encode("unknown"));
        assert_ne!(vocab.encode("unknown"), vocab.sentinel_index());
    }

    #[test]
    fn test_missing_categorical_column_degrades_to_zero() {
        let rows = vec![row(None, Some("1")); 7];
        let c = Corpus::new(["bid"], rows);
        let enc = FeatureEncoder::new(
            vec!["device".into(), "os".into()],
            vec!["bid".into()],
        ).unwrap();

        let (encoded, fitted) = enc.fit_transform(&c);
        assert_eq!(encoded.len(), 7);
        assert_eq!(sparse_column(&encoded, 0), vec![0; 7]);
        assert_eq!(sparse_column(&encoded, 1), vec![0; 7]);
        assert_eq!(fitted.vocab_sizes(), vec![1, 1]);
    }

    #[test]
    fn test_numeric_standardisation_and_nulls() {
        let c = corpus(vec![
            row(Some("a"), Some("1")),
            row(Some("a"), Some("3")),
            row(Some("a"), None),
            row(Some("a"), Some("not-a-number")),
        ]);
        let (encoded, fitted) = encoder().fit_transform(&c);
        // Values after null-filling: 1, 3, 0, 0 → mean 1, population std 1.2247...
        let scaler = fitted.scaler();
        assert!((scaler.means()[0] - 1.0).abs() < 1e-12);
        let std = (1.5f64).sqrt();
        assert!((scaler.stds()[0] - std).abs() < 1e-12);
        assert!((encoded.dense[1][0] - (2.0 / std) as f32).abs() < 1e-6);
        assert!((encoded.dense[2][0] - (-1.0 / std) as f32).abs() < 1e-6);
    }

    #[test]
    fn test_zero_variance_is_guarded() {
        let c = corpus(vec![row(Some("a"), Some("5")); 4]);
        let (encoded, fitted) = encoder().fit_transform(&c);
        assert_eq!(fitted.scaler().stds()[0], 1.0);
        assert!(encoded.dense.iter().all(|d| d[0] == 0.0));
    }

    #[test]
    fn test_feature_config_round_trip() {
        let c = corpus(vec![
            row(Some("ios"), Some("10")),
            row(Some("android"), Some("20")),
            row(None, Some("40")),
        ]);
        let (_, fitted) = encoder().fit_transform(&c);
        let doc = fitted.to_feature_config(ModelType::DeepFm);

        let json = doc.to_json().unwrap();
        let back = FeatureConfig::from_json(&json).unwrap();
        assert_eq!(back.sparse_vocab_sizes, doc.sparse_vocab_sizes);
        assert_eq!(back.label_encoders, doc.label_encoders);
        assert_eq!(back.dense_means, doc.dense_means);
        assert_eq!(back.dense_stds, doc.dense_stds);

        let rebuilt = FittedEncoder::from_feature_config(&back).unwrap();
        assert_eq!(rebuilt, fitted);
    }

    #[test]
    fn test_inconsistent_feature_config_rejected() {
        let c = corpus(vec![row(Some("ios"), Some("1"))]);
        let (_, fitted) = encoder().fit_transform(&c);
        let mut doc = fitted.to_feature_config(ModelType::LogisticRegression);
        doc.sparse_vocab_sizes[0] += 1;
        assert!(matches!(
            FittedEncoder::from_feature_config(&doc),
            Err(PipelineError::InvalidFeatureConfig(_))
        ));
    }

    #[test]
    fn test_no_sparse_features_is_precondition_error() {
        assert_eq!(
            FeatureEncoder::new(vec![], vec!["bid".into()]).unwrap_err(),
            PipelineError::NoFeatures
        );
    }
}
