use crate::data::ExpressionMatrix;
use anyhow::{bail, Context, Result};
use csv::ReaderBuilder;
use flate2::read::GzDecoder;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, info, warn};

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    Csv,
    Tsv,
    GzippedCsv,
    GzippedTsv,
}

impl FileFormat {
    /// Detect file format from path
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str());
        let stem = path.file_stem().and_then(|s| s.to_str());

        match (ext, stem) {
            (Some("gz"), Some(stem)) => {
                if stem.ends_with(".csv") {
                    Ok(FileFormat::GzippedCsv)
                } else if stem.ends_with(".tsv") || stem.ends_with(".txt") {
                    Ok(FileFormat::GzippedTsv)
                } else {
                    bail!("cannot determine format of gzipped file {:?}", path)
                }
            }
            (Some("csv"), _) => Ok(FileFormat::Csv),
            (Some("tsv"), _) | (Some("txt"), _) => Ok(FileFormat::Tsv),
            _ => bail!("unsupported file format {:?}", path),
        }
    }

    /// Get delimiter character
    pub fn delimiter(&self) -> u8 {
        match self {
            FileFormat::Csv | FileFormat::GzippedCsv => b',',
            FileFormat::Tsv | FileFormat::GzippedTsv => b'\t',
        }
    }

    /// Check if format is gzipped
    pub fn is_gzipped(&self) -> bool {
        matches!(self, FileFormat::GzippedCsv | FileFormat::GzippedTsv)
    }
}

/// Open a (possibly gzipped) file as a raw reader plus its detected format
pub fn open_reader<P: AsRef<Path>>(path: P) -> Result<(Box<dyn Read>, FileFormat)> {
    let path = path.as_ref();
    let format = FileFormat::from_path(path)?;
    let file = File::open(path).with_context(|| format!("failed to open {:?}", path))?;

    let reader: Box<dyn Read> = if format.is_gzipped() {
        Box::new(BufReader::new(GzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    Ok((reader, format))
}

/// Loader for single-cell expression matrices.
///
/// The expected layout is one row per cell with gene columns and the
/// cell-type label in the last column. A leading identifier column is
/// recognized by an empty header or the name `cell_id`.
pub struct ExpressionLoader;

impl ExpressionLoader {
    /// Create a new loader
    pub fn new() -> Self {
        Self
    }

    /// Load an expression matrix from file
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<ExpressionMatrix> {
        let path = path.as_ref();
        info!("Loading dataset from {:?}", path);

        let (reader, format) = open_reader(path)?;
        debug!("Detected file format: {:?}", format);

        let matrix = self.parse(reader, format)?;
        info!(
            "Loaded {} cells x {} genes, {} cell types",
            matrix.n_cells(),
            matrix.n_genes(),
            matrix.cell_types().len()
        );
        Ok(matrix)
    }

    /// Parse an expression matrix from a reader
    pub fn parse<R: Read>(&self, reader: R, format: FileFormat) -> Result<ExpressionMatrix> {
        let mut csv_reader = ReaderBuilder::new()
            .delimiter(format.delimiter())
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()
            .context("failed to read header row")?
            .iter()
            .map(|s| s.trim().to_string())
            .collect();

        if headers.len() < 2 {
            bail!("expected at least one gene column and a label column");
        }

        let has_id_column = headers[0].is_empty() || headers[0] == "cell_id";
        let first_gene = if has_id_column { 1 } else { 0 };
        let label_column = headers.len() - 1;
        if first_gene >= label_column {
            bail!("no gene columns between the identifier and label columns");
        }

        if headers[label_column] != "cell_type" {
            warn!(
                "label column is named '{}', expected 'cell_type'; using it as the label anyway",
                headers[label_column]
            );
        }

        let genes: Vec<String> = headers[first_gene..label_column].to_vec();
        let mut seen = HashSet::new();
        for gene in &genes {
            if !seen.insert(gene.as_str()) {
                bail!("duplicate gene column '{}'", gene);
            }
        }

        let mut cells = Vec::new();
        let mut values = Vec::new();
        let mut labels = Vec::new();

        for (row_idx, result) in csv_reader.records().enumerate() {
            let record = result.with_context(|| format!("failed to parse row {}", row_idx + 2))?;
            if record.len() != headers.len() {
                bail!(
                    "row {} has {} fields, expected {}",
                    row_idx + 2,
                    record.len(),
                    headers.len()
                );
            }

            let cell = if has_id_column {
                record.get(0).unwrap_or("").to_string()
            } else {
                format!("cell_{}", row_idx)
            };

            for col in first_gene..label_column {
                let raw = record.get(col).unwrap_or("");
                let value: f32 = raw.trim().parse().with_context(|| {
                    format!(
                        "non-numeric expression value '{}' at row {}, column '{}'",
                        raw,
                        row_idx + 2,
                        headers[col]
                    )
                })?;
                values.push(value);
            }

            let label = record.get(label_column).unwrap_or("").trim();
            if label.is_empty() {
                bail!("empty cell type at row {}", row_idx + 2);
            }

            cells.push(cell);
            labels.push(label.to_string());
        }

        if cells.is_empty() {
            bail!("dataset contains no rows");
        }

        Ok(ExpressionMatrix {
            cells,
            genes,
            values,
            labels,
        })
    }
}

impl Default for ExpressionLoader {
    fn default() -> Self {
        Self::new()
    }
}
