//! Typed client for the audit backend's public REST contract.

mod client;
mod error;
mod models;

pub use client::{ApiClient, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_MS};
pub use error::ApiError;
pub use models::{
    AuditListItem, CategoryScore, CreateAuditRequest, CreateAuditResponse, Effort, Issue,
    IssueSeverity, NextJsDetection, NextJsVersion, Priority, PrioritySeverity, Report, RunStatus,
    RunStatusResponse, Scores, Site, Summary, TechDetection, TechSummary,
};
