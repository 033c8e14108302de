// ============================================================
// Layer 4 — Synthetic Corpus Generator
// ============================================================
// Produces a seeded corpus in the input contract so the whole
// pipeline can run without warehouse access.
//
// Click model (positive rate ≈ 10%):
//   campaign "cmp_3"                  → p = 0.85
//   slot "slot_1" on device "mobile"  → p = 0.30   (pairwise effect)
//   everything else                   → p = 0.01
//
// "cmp_3" also bids high (4.0..5.0, everyone else 0.1..4.0), so
// one numeric feature carries the campaign signal as well.
// "city" is null in ~2% of rows so the "unknown" path is
// exercised. Partitions are 80% TRAIN / 20% VALIDATE.

use std::path::Path;

use anyhow::{Context, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::domain::row::{
    Corpus, LabeledRow, Partition, RawRow,
    DEFAULT_DENSE_FEATURES, DEFAULT_SPARSE_FEATURES, LABEL_COLUMN, SPLIT_COLUMN,
};
use crate::domain::traits::CorpusSource;

/// Distinct values per categorical feature, in `DEFAULT_SPARSE_FEATURES` order.
const CARDINALITIES: [usize; 11] = [20, 10, 15, 8, 5, 6, 5, 12, 20, 7, 5];

const DEVICES: [&str; 5] = ["mobile", "desktop", "tablet", "tv", "other"];
const BANNERS: [(u32, u32); 4] = [(300, 250), (728, 90), (160, 600), (320, 50)];

pub struct SyntheticCorpus {
    rows: usize,
    seed: u64,
}

impl SyntheticCorpus {
    pub fn new(rows: usize, seed: u64) -> Self {
        Self { rows, seed }
    }

    /// Write `corpus` as CSV with `label` and `data_split` columns last.
    pub fn write_csv(corpus: &Corpus, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Cannot create '{}'", path.display()))?;

        let columns: Vec<&String> = corpus.columns.iter().collect();
        let mut header: Vec<&str> = columns.iter().map(|c| c.as_str()).collect();
        header.push(LABEL_COLUMN);
        header.push(SPLIT_COLUMN);
        writer.write_record(&header)?;

        for row in &corpus.rows {
            let mut record: Vec<String> = columns
                .iter()
                .map(|c| row.features.get(c).unwrap_or_default().to_string())
                .collect();
            record.push(format!("{}", row.label as u8));
            record.push(row.partition.to_string());
            writer.write_record(&record)?;
        }
        writer.flush()?;

        tracing::info!("Wrote {} synthetic rows to '{}'", corpus.len(), path.display());
        Ok(())
    }

    fn categorical(feature: &str, cardinality: usize, rng: &mut StdRng) -> String {
        let k = rng.gen_range(0..cardinality);
        match feature {
            "device"      => DEVICES[k].to_string(),
            "campaign_id" => format!("cmp_{k}"),
            "slot_id"     => format!("slot_{k}"),
            _             => format!("{feature}_{k}"),
        }
    }
}

impl CorpusSource for SyntheticCorpus {
    fn load(&self) -> Result<Corpus> {
        let mut rng  = StdRng::seed_from_u64(self.seed);
        let mut rows = Vec::with_capacity(self.rows);

        for _ in 0..self.rows {
            let mut features = RawRow::new();
            for (feature, &cardinality) in DEFAULT_SPARSE_FEATURES.iter().zip(&CARDINALITIES) {
                if *feature == "city" && rng.gen_bool(0.02) {
                    continue;
                }
                features.set(*feature, Self::categorical(feature, cardinality, &mut rng));
            }

            let (width, height) = BANNERS[rng.gen_range(0..BANNERS.len())];
            features.set("banner_width", width.to_string());
            features.set("banner_height", height.to_string());
            let bid = if features.get("campaign_id") == Some("cmp_3") {
                rng.gen_range(4.0..5.0)
            } else {
                rng.gen_range(0.1..4.0)
            };
            features.set("bid", format!("{bid:.3}"));
            features.set("req_hour", rng.gen_range(0..24).to_string());
            features.set("req_dow", rng.gen_range(1..=7).to_string());

            let p = if features.get("campaign_id") == Some("cmp_3") {
                0.85
            } else if features.get("slot_id") == Some("slot_1")
                && features.get("device") == Some("mobile")
            {
                0.30
            } else {
                0.01
            };
            let label = if rng.gen_bool(p) { 1.0 } else { 0.0 };
            let partition = if rng.gen_bool(0.8) { Partition::Train } else { Partition::Validate };

            rows.push(LabeledRow::new(features, label, partition));
        }

        let columns = DEFAULT_SPARSE_FEATURES
            .iter()
            .chain(DEFAULT_DENSE_FEATURES.iter())
            .copied();
        Ok(Corpus::new(columns, rows))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::CsvCorpusLoader;

    #[test]
    fn test_generation_is_seeded() {
        let a = SyntheticCorpus::new(200, 7).load().unwrap();
        let b = SyntheticCorpus::new(200, 7).load().unwrap();
        assert_eq!(a.rows, b.rows);
    }

    #[test]
    fn test_positive_rate_near_ten_percent() {
        let corpus = SyntheticCorpus::new(10_000, 42).load().unwrap();
        let rate = corpus.rows.iter().map(|r| r.label as f64).sum::<f64>() / corpus.len() as f64;
        assert!((0.07..0.14).contains(&rate), "positive rate {rate}");
    }

    #[test]
    fn test_campaign_three_bids_high() {
        let corpus = SyntheticCorpus::new(2_000, 9).load().unwrap();
        for row in &corpus.rows {
            let bid: f64 = row.features.get("bid").unwrap().parse().unwrap();
            if row.features.get("campaign_id") == Some("cmp_3") {
                assert!(bid >= 4.0, "{bid}");
            } else {
                assert!(bid <= 4.0, "{bid}");
            }
        }
    }

    #[test]
    fn test_csv_round_trip_through_loader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("synthetic.csv");
        let corpus = SyntheticCorpus::new(50, 3).load().unwrap();
        SyntheticCorpus::write_csv(&corpus, &path).unwrap();

        let loaded = CsvCorpusLoader::labelled(&path).load().unwrap();
        assert_eq!(loaded.columns, corpus.columns);
        assert_eq!(loaded.rows, corpus.rows);
    }
}
