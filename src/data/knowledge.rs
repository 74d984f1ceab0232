use crate::data::loader::open_reader;
use anyhow::{bail, Context, Result};
use csv::ReaderBuilder;
use ndarray::Array2;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

/// Prior biological knowledge: gene-to-pathway membership weights.
///
/// Rows are genes, columns are pathways/knowledge units.
#[derive(Debug, Clone)]
pub struct KnowledgeMatrix {
    /// Gene names, one per row
    pub genes: Vec<String>,
    /// Pathway / knowledge-unit names, one per column
    pub columns: Vec<String>,
    /// Membership weights `[n_genes, n_columns]`
    pub values: Array2<f32>,
}

impl KnowledgeMatrix {
    /// Load a knowledge matrix from CSV (first column is the gene name)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading prior biological knowledge from {:?}", path);

        let (reader, format) = open_reader(path)?;
        let mut csv_reader = ReaderBuilder::new()
            .delimiter(format.delimiter())
            .has_headers(true)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()
            .context("failed to read knowledge header row")?
            .iter()
            .map(|s| s.trim().to_string())
            .collect();

        if headers.len() < 2 {
            bail!("knowledge matrix needs a gene column and at least one pathway column");
        }
        let columns: Vec<String> = headers[1..].to_vec();

        let mut genes = Vec::new();
        let mut rows: Vec<f32> = Vec::new();
        let mut seen = HashSet::new();

        for (row_idx, result) in csv_reader.records().enumerate() {
            let record =
                result.with_context(|| format!("failed to parse knowledge row {}", row_idx + 2))?;

            let gene = record.get(0).unwrap_or("").trim().to_string();
            if gene.is_empty() {
                bail!("empty gene name at knowledge row {}", row_idx + 2);
            }
            if !seen.insert(gene.clone()) {
                bail!("duplicate gene '{}' in knowledge matrix", gene);
            }

            for col in 1..headers.len() {
                let raw = record.get(col).unwrap_or("");
                let value: f32 = raw.trim().parse().with_context(|| {
                    format!(
                        "non-numeric membership '{}' at knowledge row {}, column '{}'",
                        raw,
                        row_idx + 2,
                        headers[col]
                    )
                })?;
                rows.push(value);
            }
            genes.push(gene);
        }

        if genes.is_empty() {
            bail!("knowledge matrix contains no rows");
        }

        let values = Array2::from_shape_vec((genes.len(), columns.len()), rows)
            .context("knowledge matrix is not rectangular")?;

        info!(
            "Prior biological knowledge imported, shape ({}, {})",
            genes.len(),
            columns.len()
        );

        Ok(Self {
            genes,
            columns,
            values,
        })
    }
}

/// Connectivity table of the first hidden layer.
///
/// One row per network input gene, one column per hidden unit; entries are
/// the membership weights of knowledge units and ones for dense units.
#[derive(Debug, Clone)]
pub struct HiddenLayerMask {
    /// Gene axis of the network input, in column order
    pub genes: Vec<String>,
    /// Hidden-unit names: knowledge columns followed by `dense_*`
    pub units: Vec<String>,
    /// Connectivity weights `[n_genes, n_units]`
    pub weights: Array2<f32>,
}

impl HiddenLayerMask {
    /// Number of knowledge-driven units (non-dense columns)
    pub fn n_knowledge_units(&self) -> usize {
        self.units
            .iter()
            .filter(|u| !u.starts_with("dense_"))
            .count()
    }
}

/// Recipe for assembling the hybrid first hidden layer.
#[derive(Debug, Clone, Default)]
pub struct HiddenLayerSpec {
    /// Prior biological knowledge, if any
    pub pbk: Option<KnowledgeMatrix>,
    /// Number of fully-connected dense units
    pub dense_units: usize,
    /// Restrict the gene axis to the knowledge matrix's genes
    pub filter_gene_space: bool,
}

impl HiddenLayerSpec {
    /// Spec with only dense units and no biological knowledge
    pub fn dense_only(dense_units: usize) -> Self {
        Self {
            pbk: None,
            dense_units,
            filter_gene_space: false,
        }
    }

    /// Assemble the connectivity table over `dataset_genes`.
    ///
    /// Knowledge and dense blocks are joined on the gene axis; entries for
    /// genes missing from the knowledge matrix are zero. With gene-space
    /// filtering the axis becomes the knowledge genes present in the dataset,
    /// in knowledge order; otherwise it is the dataset's gene order.
    pub fn build(&self, dataset_genes: &[String]) -> Result<HiddenLayerMask> {
        let n_pbk = self.pbk.as_ref().map(|p| p.columns.len()).unwrap_or(0);
        if n_pbk == 0 && self.dense_units == 0 {
            bail!("first hidden layer has no units: no knowledge matrix and no dense units");
        }

        if self.filter_gene_space && self.pbk.is_none() {
            warn!("--filter-gene-space has no effect without a knowledge matrix");
        }

        let genes: Vec<String> = match (&self.pbk, self.filter_gene_space) {
            (Some(pbk), true) => {
                let available: HashSet<&str> =
                    dataset_genes.iter().map(|g| g.as_str()).collect();
                let kept: Vec<String> = pbk
                    .genes
                    .iter()
                    .filter(|g| available.contains(g.as_str()))
                    .cloned()
                    .collect();
                if kept.is_empty() {
                    bail!("no knowledge-matrix gene is present in the dataset");
                }
                if kept.len() < pbk.genes.len() {
                    warn!(
                        "{} of {} knowledge genes are absent from the dataset and were dropped",
                        pbk.genes.len() - kept.len(),
                        pbk.genes.len()
                    );
                }
                info!("Gene space filtered: {} -> {}", dataset_genes.len(), kept.len());
                kept
            }
            _ => dataset_genes.to_vec(),
        };

        let n_units = n_pbk + self.dense_units;
        let mut weights = Array2::<f32>::zeros((genes.len(), n_units));

        let mut units = Vec::with_capacity(n_units);
        if let Some(pbk) = &self.pbk {
            units.extend(pbk.columns.iter().cloned());

            let pbk_rows: HashMap<&str, usize> = pbk
                .genes
                .iter()
                .enumerate()
                .map(|(i, g)| (g.as_str(), i))
                .collect();

            for (row, gene) in genes.iter().enumerate() {
                if let Some(&src) = pbk_rows.get(gene.as_str()) {
                    for col in 0..n_pbk {
                        weights[[row, col]] = pbk.values[[src, col]];
                    }
                }
            }
        }

        for i in 0..self.dense_units {
            units.push(format!("dense_{}", i + 1));
            let col = n_pbk + i;
            for row in 0..genes.len() {
                weights[[row, col]] = 1.0;
            }
        }

        info!(
            "First hidden layer assembled, shape ({}, {})",
            genes.len(),
            n_units
        );

        Ok(HiddenLayerMask {
            genes,
            units,
            weights,
        })
    }
}
