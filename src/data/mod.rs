pub mod knowledge;
pub mod loader;
pub mod split;

use anyhow::{bail, Result};
use std::collections::HashMap;

/// Dense single-cell expression matrix with one label per cell.
///
/// Rows are cells, columns are genes; `labels` holds the cell-type column
/// that closes every input file.
#[derive(Debug, Clone)]
pub struct ExpressionMatrix {
    /// Cell identifiers, one per row
    pub cells: Vec<String>,
    /// Gene names, one per column
    pub genes: Vec<String>,
    /// Expression values, row-major `[n_cells * n_genes]`
    pub values: Vec<f32>,
    /// Cell-type label per row
    pub labels: Vec<String>,
}

impl ExpressionMatrix {
    /// Number of cells (rows)
    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }

    /// Number of genes (columns)
    pub fn n_genes(&self) -> usize {
        self.genes.len()
    }

    /// Expression row for a single cell
    pub fn row(&self, cell: usize) -> &[f32] {
        let n = self.n_genes();
        &self.values[cell * n..(cell + 1) * n]
    }

    /// Distinct cell types in sorted order
    pub fn cell_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.labels.clone();
        types.sort();
        types.dedup();
        types
    }

    /// Gather the rows at `indices` into a row-major buffer plus their labels.
    pub fn subset(&self, indices: &[usize]) -> (Vec<f32>, Vec<String>) {
        let n = self.n_genes();
        let mut values = Vec::with_capacity(indices.len() * n);
        let mut labels = Vec::with_capacity(indices.len());
        for &i in indices {
            values.extend_from_slice(self.row(i));
            labels.push(self.labels[i].clone());
        }
        (values, labels)
    }

    /// Restrict the matrix to `genes`, in the given order.
    ///
    /// Used when the gene space is filtered down to the knowledge matrix.
    pub fn filter_genes(&self, genes: &[String]) -> Result<ExpressionMatrix> {
        if genes == self.genes.as_slice() {
            return Ok(self.clone());
        }

        let positions: HashMap<&str, usize> = self
            .genes
            .iter()
            .enumerate()
            .map(|(i, g)| (g.as_str(), i))
            .collect();

        let mut selected = Vec::with_capacity(genes.len());
        for gene in genes {
            match positions.get(gene.as_str()) {
                Some(&i) => selected.push(i),
                None => bail!("gene '{}' is not a column of the dataset", gene),
            }
        }

        let mut values = Vec::with_capacity(self.n_cells() * selected.len());
        for cell in 0..self.n_cells() {
            let row = self.row(cell);
            values.extend(selected.iter().map(|&i| row[i]));
        }

        Ok(ExpressionMatrix {
            cells: self.cells.clone(),
            genes: genes.to_vec(),
            values,
            labels: self.labels.clone(),
        })
    }
}

/// Maps cell-type strings to class indices.
///
/// Classes are the sorted distinct labels, matching the column order of the
/// exported probability table.
#[derive(Debug, Clone)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Build the vocabulary from a label column
    pub fn fit(labels: &[String]) -> Self {
        let mut classes: Vec<String> = labels.to_vec();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    /// Class index of a label
    pub fn encode(&self, label: &str) -> Result<usize> {
        match self.classes.binary_search_by(|c| c.as_str().cmp(label)) {
            Ok(i) => Ok(i),
            Err(_) => bail!("unknown cell type '{}'", label),
        }
    }

    /// Encode a label column into class indices
    pub fn encode_all(&self, labels: &[String]) -> Result<Vec<i64>> {
        labels
            .iter()
            .map(|l| self.encode(l).map(|i| i as i64))
            .collect()
    }

    /// Label of a class index
    pub fn decode(&self, index: usize) -> &str {
        &self.classes[index]
    }

    /// Number of classes
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// True when the vocabulary is empty
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Class names in index order
    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_matrix() -> ExpressionMatrix {
        ExpressionMatrix {
            cells: vec!["c0".into(), "c1".into(), "c2".into()],
            genes: vec!["g1".into(), "g2".into(), "g3".into()],
            values: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0],
            labels: vec!["B".into(), "T".into(), "B".into()],
        }
    }

    #[test]
    fn test_row_access() {
        let m = sample_matrix();
        assert_eq!(m.row(1), &[4.0, 5.0, 6.0]);
        assert_eq!(m.n_cells(), 3);
        assert_eq!(m.n_genes(), 3);
    }

    #[test]
    fn test_cell_types_sorted_unique() {
        let m = sample_matrix();
        assert_eq!(m.cell_types(), vec!["B".to_string(), "T".to_string()]);
    }

    #[test]
    fn test_subset() {
        let m = sample_matrix();
        let (values, labels) = m.subset(&[2, 0]);
        assert_eq!(values, vec![7.0, 8.0, 9.0, 1.0, 2.0, 3.0]);
        assert_eq!(labels, vec!["B".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_filter_genes_reorders_columns() {
        let m = sample_matrix();
        let filtered = m.filter_genes(&["g3".into(), "g1".into()]).unwrap();
        assert_eq!(filtered.genes, vec!["g3".to_string(), "g1".to_string()]);
        assert_eq!(filtered.row(0), &[3.0, 1.0]);
        assert_eq!(filtered.row(2), &[9.0, 7.0]);
    }

    #[test]
    fn test_filter_genes_unknown_gene() {
        let m = sample_matrix();
        assert!(m.filter_genes(&["nope".into()]).is_err());
    }

    #[test]
    fn test_label_encoder_roundtrip() {
        let m = sample_matrix();
        let enc = LabelEncoder::fit(&m.labels);
        assert_eq!(enc.len(), 2);
        assert_eq!(enc.encode("B").unwrap(), 0);
        assert_eq!(enc.encode("T").unwrap(), 1);
        assert_eq!(enc.decode(1), "T");
        assert_eq!(enc.encode_all(&m.labels).unwrap(), vec![0, 1, 0]);
        assert!(enc.encode("NK").is_err());
    }
}
