use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::types::HumanDuration;

/// `[input]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// JSON Lines input file; stdin when absent.
    pub path: Option<PathBuf>,
    /// Declared input partitions. When non-empty the watermark waits until
    /// every one of them has reported a timestamp.
    pub partitions: Vec<String>,
    /// Partition assigned to records that do not carry one.
    pub default_partition: String,
    /// How long timers keep running after the input is exhausted.
    pub linger: HumanDuration,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            path: None,
            partitions: Vec::new(),
            default_partition: "default".to_string(),
            linger: HumanDuration::from_millis(0),
        }
    }
}

/// `[output]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// JSON Lines file receiving window results.
    pub path: PathBuf,
    /// Late-data routes: target name → JSON Lines file.
    #[serde(default)]
    pub routes: HashMap<String, PathBuf>,
}
