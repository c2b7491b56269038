//! Graphviz output pass
//!
//! Writes `<dir>/<func>.dot` and optionally renders it with the external
//! `dot` binary. This is a debugging aid: failures are logged, never fatal.

use crate::function::Function;
use crate::printer::print_dot;
use log::{info, warn};
use std::path::PathBuf;
use std::process::Command;

#[derive(Debug, Clone, PartialEq)]
pub struct DotConfig {
    /// Directory receiving the `.dot` (and `.pdf`) files
    pub dir: PathBuf,
    /// Run `dot -Tpdf` on the written file
    pub render: bool,
}

impl Default for DotConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            render: false,
        }
    }
}

impl DotConfig {
    pub fn dot_path(&self, func: &str) -> PathBuf {
        self.dir.join(format!("{}.dot", func))
    }

    pub fn pdf_path(&self, func: &str) -> PathBuf {
        self.dir.join(format!("{}.pdf", func))
    }
}

pub fn write_dot(func: &mut Function, config: &DotConfig) {
    let text = print_dot(func);
    let path = config.dot_path(&func.name);
    if let Err(err) = std::fs::write(&path, text) {
        warn!("failed to write {}: {}", path.display(), err);
        return;
    }
    info!("wrote {}", path.display());

    if !config.render {
        return;
    }
    let pdf = config.pdf_path(&func.name);
    match Command::new("dot").arg("-Tpdf").arg(&path).arg("-o").arg(&pdf).status() {
        Ok(status) if status.success() => info!("rendered {}", pdf.display()),
        Ok(status) => warn!("dot exited with {} for {}", status, path.display()),
        Err(err) => warn!("failed to run dot: {}", err),
    }
}
