//! Import workflow state machine.
//!
//! One [`ImportSession`] per open import dialog. The session enforces the
//! client-side ordering rules: a campaign must be selected before anything
//! touches the network, an unforced import requires a fresh validation
//! report with zero invalid rows, and only one import runs at a time.
//! Invalid rows in a report are a normal business outcome; only transport
//! failures are errors here.

use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::backend::{BackendError, ImportResult, UpasApi, ValidationReport};

/// How long the UI keeps the summary on screen before the workflow closes.
pub const CLOSE_DELAY: Duration = Duration::from_secs(3);

/// Called exactly once per successful import, with the backend's result.
pub type OnImportSuccess = Box<dyn Fn(&ImportResult) + Send + Sync>;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("aucun fichier fourni")]
    MissingFile,
    #[error("aucune campagne sélectionnée")]
    NoCampaign,
    #[error("le fichier doit être validé avant l'import")]
    ValidationRequired,
    #[error("le fichier contient {0} ligne(s) invalide(s); corrigez-le ou forcez l'import")]
    InvalidRows(u64),
    #[error("un import est déjà en cours")]
    AlreadyRunning,
    #[error("validation indisponible: {0}")]
    ValidationUnavailable(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl ImportError {
    /// Preconditions never reached the network.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::MissingFile
                | Self::NoCampaign
                | Self::ValidationRequired
                | Self::InvalidRows(_)
                | Self::AlreadyRunning
        )
    }
}

/// State of one import dialog.
#[derive(Default)]
pub struct ImportSession {
    campagne_id: Option<i64>,
    last_report: Option<ValidationReport>,
    importing: bool,
    on_success: Option<OnImportSuccess>,
}

impl ImportSession {
    pub fn new(campagne_id: Option<i64>) -> Self {
        Self {
            campagne_id,
            ..Self::default()
        }
    }

    /// Changing the campaign invalidates any previous validation.
    pub fn set_campagne(&mut self, campagne_id: Option<i64>) {
        if self.campagne_id != campagne_id {
            self.campagne_id = campagne_id;
            self.last_report = None;
        }
    }

    pub fn set_on_success(&mut self, callback: OnImportSuccess) {
        self.on_success = Some(callback);
    }

    pub fn last_report(&self) -> Option<&ValidationReport> {
        self.last_report.as_ref()
    }

    pub fn is_importing(&self) -> bool {
        self.importing
    }

    /// Whether the unforced import path is currently enabled.
    pub fn can_import_unforced(&self) -> bool {
        self.last_report
            .as_ref()
            .map(|r| r.invalid_rows == 0)
            .unwrap_or(false)
    }

    /// First phase of a validation: checks the campaign precondition and
    /// drops the previous report, so a validation that fails to run can
    /// never be mistaken for "zero invalid rows". Returns the campaign id
    /// the backend call must target.
    ///
    /// Split from the network call so a caller holding a lock on the
    /// session can release it while the request is in flight.
    pub fn begin_validate(&mut self) -> Result<i64, ImportError> {
        let campagne_id = self.campagne_id.ok_or(ImportError::NoCampaign)?;
        self.last_report = None;
        Ok(campagne_id)
    }

    /// Second phase of a validation: record the backend's answer.
    pub fn record_validation(
        &mut self,
        result: Result<ValidationReport, BackendError>,
    ) -> Result<ValidationReport, ImportError> {
        match result {
            Ok(report) => {
                if report.invalid_rows > 0 {
                    info!(
                        "Validation found {} invalid row(s) out of {}",
                        report.invalid_rows,
                        report.valid_rows + report.invalid_rows
                    );
                }
                self.last_report = Some(report.clone());
                Ok(report)
            }
            Err(e) => {
                warn!("Validation call failed: {}", e);
                Err(ImportError::ValidationUnavailable(e.to_string()))
            }
        }
    }

    /// Submit the file for dry-run validation and record the report.
    ///
    /// A failed call clears any previously recorded report: a validation
    /// that could not run is never treated as "zero invalid rows".
    pub async fn validate(
        &mut self,
        api: &dyn UpasApi,
        bytes: Vec<u8>,
        filename: String,
    ) -> Result<ValidationReport, ImportError> {
        let campagne_id = self.begin_validate()?;
        let result = api.validate_file(bytes, filename, campagne_id).await;
        self.record_validation(result)
    }

    /// First phase of an import: run every local gate and mark the
    /// session busy. Rejects before any network call when the gates
    /// fail. Must be paired with [`ImportSession::finish_import`], which
    /// clears the busy flag; between the two calls the session stays
    /// visible as importing and further imports get `AlreadyRunning`.
    pub fn begin_import(&mut self, force: bool) -> Result<i64, ImportError> {
        let campagne_id = self.campagne_id.ok_or(ImportError::NoCampaign)?;
        if self.importing {
            return Err(ImportError::AlreadyRunning);
        }
        if !force {
            let report = self
                .last_report
                .as_ref()
                .ok_or(ImportError::ValidationRequired)?;
            if report.invalid_rows > 0 {
                return Err(ImportError::InvalidRows(report.invalid_rows));
            }
        }
        self.importing = true;
        Ok(campagne_id)
    }

    /// Second phase of an import: clear the busy flag and apply the
    /// outcome. On success the registered callback fires exactly once
    /// with the result and the recorded report is consumed.
    pub fn finish_import(
        &mut self,
        result: Result<ImportResult, BackendError>,
    ) -> Result<ImportResult, ImportError> {
        self.importing = false;
        match result {
            Ok(result) => {
                info!(
                    "Import finished: {} imported, {} skipped, {} in error",
                    result.imported_count, result.skipped_count, result.error_count
                );
                if let Some(callback) = &self.on_success {
                    callback(&result);
                }
                self.last_report = None;
                Ok(result)
            }
            Err(e) => Err(ImportError::Backend(e)),
        }
    }

    /// Execute the import.
    ///
    /// Unforced imports are gated locally on a recorded report with zero
    /// invalid rows; the gate rejects before any network call. On success
    /// the registered callback fires exactly once with the result and the
    /// session state resets.
    pub async fn import(
        &mut self,
        api: &dyn UpasApi,
        bytes: Vec<u8>,
        filename: String,
        ignore_doublons: bool,
        force: bool,
    ) -> Result<ImportResult, ImportError> {
        let campagne_id = self.begin_import(force)?;
        let result = api
            .import_file(bytes, filename, campagne_id, ignore_doublons, force)
            .await;
        self.finish_import(result)
    }
}
