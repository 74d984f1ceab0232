use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

/// One classified test cell: per-class probabilities plus labels
#[derive(Debug, Clone)]
pub struct ClassificationRow {
    /// Probability per class, in vocabulary order
    pub probabilities: Vec<f32>,
    /// Predicted cell type
    pub prediction: String,
    /// True cell type
    pub ground_truth: String,
    /// Fold label
    pub index_split: String,
    /// Design name
    pub design: String,
}

/// One clustered test cell from a leave-P-groups-out fold
#[derive(Debug, Clone)]
pub struct ClusteringRow {
    /// Assigned cluster index
    pub cluster: usize,
    /// True cell type
    pub ground_truth: String,
    /// Held-out level tag, e.g. `cell_out_4`
    pub cell_out: String,
    /// Fold label
    pub index_split: String,
    /// Design name
    pub design: String,
}

/// Prediction rows accumulated across all folds of a run.
#[derive(Debug, Clone, Default)]
pub struct ResultTable {
    /// Class vocabulary naming the probability columns
    pub classes: Vec<String>,
    /// Rows from the classification modes
    pub classification: Vec<ClassificationRow>,
    /// Rows from the clustering mode
    pub clustering: Vec<ClusteringRow>,
}

impl ResultTable {
    /// Table for classification modes over a class vocabulary
    pub fn for_classes(classes: Vec<String>) -> Self {
        Self {
            classes,
            ..Default::default()
        }
    }

    /// Total number of rows
    pub fn len(&self) -> usize {
        self.classification.len() + self.clustering.len()
    }

    /// True when no fold produced rows
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the per-cell detail table.
    ///
    /// Classification rows get one probability column per class; clustering
    /// rows get the cluster assignment and the held-out level tag.
    pub fn write_detail_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("failed to create {:?}", path))?;

        if !self.clustering.is_empty() {
            writer.write_record(["prediction", "ground_truth", "cell_out", "index_split", "design"])?;
            for row in &self.clustering {
                writer.write_record([
                    row.cluster.to_string().as_str(),
                    row.ground_truth.as_str(),
                    row.cell_out.as_str(),
                    row.index_split.as_str(),
                    row.design.as_str(),
                ])?;
            }
        } else {
            let mut header: Vec<&str> = self.classes.iter().map(|c| c.as_str()).collect();
            header.extend(["prediction", "ground_truth", "index_split", "design"]);
            writer.write_record(&header)?;

            for row in &self.classification {
                let mut record: Vec<String> =
                    row.probabilities.iter().map(|p| p.to_string()).collect();
                record.push(row.prediction.clone());
                record.push(row.ground_truth.clone());
                record.push(row.index_split.clone());
                record.push(row.design.clone());
                writer.write_record(&record)?;
            }
        }

        writer.flush().context("failed to flush detail table")?;
        info!("Wrote {} result rows to {:?}", self.len(), path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_classification_detail_layout() {
        let mut table = ResultTable::for_classes(vec!["B".into(), "T".into()]);
        table.classification.push(ClassificationRow {
            probabilities: vec![0.9, 0.1],
            prediction: "B".into(),
            ground_truth: "B".into(),
            index_split: "fold_0".into(),
            design: "bio".into(),
        });
        table.classification.push(ClassificationRow {
            probabilities: vec![0.2, 0.8],
            prediction: "T".into(),
            ground_truth: "B".into(),
            index_split: "fold_1".into(),
            design: "bio".into(),
        });

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("detail.csv");
        table.write_detail_csv(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "B,T,prediction,ground_truth,index_split,design"
        );
        assert_eq!(lines.next().unwrap(), "0.9,0.1,B,B,fold_0,bio");
        assert_eq!(lines.clone().count(), 1);
    }

    #[test]
    fn test_clustering_detail_layout() {
        let mut table = ResultTable::default();
        table.clustering.push(ClusteringRow {
            cluster: 1,
            ground_truth: "NK".into(),
            cell_out: "cell_out_2".into(),
            index_split: "p2_iter0_B|NK".into(),
            design: "bio".into(),
        });

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("detail.csv");
        table.write_detail_csv(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "prediction,ground_truth,cell_out,index_split,design"
        );
        assert_eq!(lines.next().unwrap(), "1,NK,cell_out_2,p2_iter0_B|NK,bio");
    }

    #[test]
    fn test_empty_table() {
        let table = ResultTable::default();
        assert!(table.is_empty());
        assert_eq!(table.len(), 0);
    }
}
