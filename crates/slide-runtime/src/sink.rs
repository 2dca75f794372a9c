use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use serde_json::Value;
use slide_config::OutputConfig;
use slide_core::function::Publisher;

/// One JSON Lines file opened for appending.
struct JsonlFile {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
    lines: AtomicU64,
}

impl JsonlFile {
    fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| anyhow::anyhow!("failed to open {}: {e}", path.display()))?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
            lines: AtomicU64::new(0),
        })
    }

    fn append(&self, value: &Value) -> Result<()> {
        let json = serde_json::to_string(value)?;
        let mut w = self.writer.lock().expect("jsonl sink lock poisoned");
        w.write_all(json.as_bytes())?;
        w.write_all(b"\n")?;
        w.flush()?;
        self.lines.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Writes window results and late records as JSON Lines.
///
/// Results go to `[output] path`; late records go to the file of the named
/// route in `[output.routes]`.
pub struct JsonlPublisher {
    output: JsonlFile,
    routes: HashMap<String, JsonlFile>,
}

impl JsonlPublisher {
    /// Open every configured file. Relative paths resolve against `base_dir`.
    pub fn open(config: &OutputConfig, base_dir: &Path) -> Result<Self> {
        let output = JsonlFile::open(base_dir.join(&config.path))?;
        let routes = config
            .routes
            .iter()
            .map(|(name, path)| Ok((name.clone(), JsonlFile::open(base_dir.join(path))?)))
            .collect::<Result<HashMap<_, _>>>()?;
        Ok(Self { output, routes })
    }

    /// Lines written to the result file.
    pub fn published(&self) -> u64 {
        self.output.lines.load(Ordering::Relaxed)
    }

    /// Lines written to the named late-data route.
    pub fn forwarded(&self, route: &str) -> u64 {
        self.routes
            .get(route)
            .map_or(0, |f| f.lines.load(Ordering::Relaxed))
    }

    pub fn output_path(&self) -> &Path {
        &self.output.path
    }
}

impl Publisher<Value, Value> for JsonlPublisher {
    fn publish(&self, output: Value) -> Result<()> {
        self.output.append(&output)
    }

    fn publish_late(&self, target: &str, value: &Value) -> Result<()> {
        let route = self
            .routes
            .get(target)
            .ok_or_else(|| anyhow::anyhow!("no output route named {target:?}"))?;
        route.append(value)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
