use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Ensure directory exists
pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    if !path.exists() {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {:?}", path))?;
    }
    Ok(())
}

/// Format duration as human-readable string
pub fn format_duration(secs: f64) -> String {
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else if secs < 3600.0 {
        format!("{:.1}m", secs / 60.0)
    } else {
        format!("{:.1}h", secs / 3600.0)
    }
}

/// Seconds since the unix epoch
pub fn timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Wall-clock time of day (UTC) as HH:MM:SS
pub fn clock_time() -> String {
    let secs = timestamp() % 86_400;
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Experiment name: the dataset's parent directory
pub fn experiment_name<P: AsRef<Path>>(dataset_path: P) -> String {
    dataset_path
        .as_ref()
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("default")
        .to_string()
}

/// Dataset name: the file stem without compression/table extensions
pub fn dataset_name<P: AsRef<Path>>(dataset_path: P) -> String {
    let mut name = dataset_path
        .as_ref()
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("dataset")
        .to_string();

    for ext in [".gz", ".csv", ".tsv", ".txt"] {
        if let Some(stripped) = name.strip_suffix(ext) {
            name = stripped.to_string();
        }
    }
    name
}

/// Output directory layout of a single run.
///
/// ```text
/// {root}/models/{experiment}/{split}/
/// {root}/reports/{analysis}/{experiment}/
/// {root}/logs/{experiment}/
/// ```
#[derive(Debug, Clone)]
pub struct OutputPaths {
    /// Directory receiving model checkpoints
    pub models: PathBuf,
    /// Directory receiving detail and metric tables
    pub reports: PathBuf,
    /// Directory receiving the run-report text file
    pub logs: PathBuf,
}

impl OutputPaths {
    /// Resolve the layout under `root` and create the directories
    pub fn resolve<P: AsRef<Path>>(
        root: P,
        experiment: &str,
        split: &str,
        analysis: &str,
    ) -> Result<Self> {
        let root = root.as_ref();
        let paths = Self {
            models: root.join("models").join(experiment).join(split),
            reports: root.join("reports").join(analysis).join(experiment),
            logs: root.join("logs").join(experiment),
        };
        ensure_dir(&paths.models)?;
        ensure_dir(&paths.reports)?;
        ensure_dir(&paths.logs)?;
        Ok(paths)
    }
}

/// Plain-text run report, one `info_{analysis}_{design}.txt` per run.
pub struct RunLog {
    path: PathBuf,
    file: File,
}

impl RunLog {
    /// Create (or truncate) the report file for a run
    pub fn create<P: AsRef<Path>>(dir: P, analysis: &str, design: &str) -> Result<Self> {
        ensure_dir(&dir)?;
        let path = dir
            .as_ref()
            .join(format!("info_{}_{}.txt", analysis, design));
        let file =
            File::create(&path).with_context(|| format!("failed to create run log {:?}", path))?;
        Ok(Self { path, file })
    }

    /// Append a line to the report
    pub fn save(&mut self, text: &str) -> Result<()> {
        writeln!(self.file, "{}", text).context("failed to write run log")?;
        self.file.flush().context("failed to flush run log")?;
        Ok(())
    }

    /// Location of the report file
    pub fn path(&self) -> &Path {
        &self.path
    }
}
