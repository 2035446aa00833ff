//! Report exports and PDF downloads.

use std::path::{Path, PathBuf};

use tracing::info;

use super::client::{path_id, ApiClient, Download};
use super::error::ApiError;
use crate::models::{ExportFilters, PeriodFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Pdf,
    Csv,
    Excel,
}

impl ExportFormat {
    fn segment(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Csv => "csv",
            Self::Excel => "excel",
        }
    }
}

impl ApiClient {
    /// Export the request list filtered by status, type and period
    pub async fn export_requests(
        &self,
        format: ExportFormat,
        filters: &ExportFilters,
    ) -> Result<Download, ApiError> {
        self.download(
            &format!("/api/v1/export/requests/{}", format.segment()),
            &filters.query_pairs(),
        )
        .await
    }

    pub async fn export_summary_pdf(&self, period: &PeriodFilter) -> Result<Download, ApiError> {
        self.download("/api/v1/export/summary/pdf", &period.query_pairs())
            .await
    }

    /// Printable PDF of a single request
    pub async fn request_pdf(&self, id: &str) -> Result<Download, ApiError> {
        let id = path_id(id)?;
        self.download(&format!("/api/v1/requests/{}/pdf", id), &[])
            .await
    }
}

impl Download {
    /// Write into `dir` under the server-provided filename
    pub fn save_in(&self, dir: &Path) -> std::io::Result<PathBuf> {
        // Never let a server filename escape the target directory
        let name = Path::new(&self.filename)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "download".into());
        let path = dir.join(name);

        std::fs::write(&path, &self.bytes)?;
        info!(path = %path.display(), size = self.bytes.len(), "Saved download");
        Ok(path)
    }
}
