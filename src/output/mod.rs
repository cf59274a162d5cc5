pub mod console;
pub mod json;

use serde::{Deserialize, Serialize};

use crate::catalog::FrameworkStatus;
use crate::error::Result;
use crate::model::{Finding, ScanJob};

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Console,
    Json,
}

impl OutputFormat {
    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "console" | "text" => Some(Self::Console),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Everything a completed scan produced, ready for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub job: ScanJob,
    pub findings: Vec<Finding>,
    pub coverage: Vec<FrameworkStatus>,
}

/// Render a scan report in the requested format.
pub fn render(report: &ScanReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Console => Ok(console::render(report)),
        OutputFormat::Json => json::render(report),
    }
}
