use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} '{raw}'; expected one of: {expected:?}")]
pub struct ReportFormatError {
    pub kind: &'static str,
    pub raw: String,
    pub expected: &'static [&'static str],
}

/// Output format for `rally task report`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskReportFormat {
    #[default]
    Html,
    Junit,
}

impl TaskReportFormat {
    pub const ALL: &'static [&'static str] = &["html", "junit"];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Junit => "junit",
        }
    }

    /// File extension of the generated report.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Junit => "xml",
        }
    }
}

impl FromStr for TaskReportFormat {
    type Err = ReportFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(Self::Html),
            "junit" => Ok(Self::Junit),
            _ => Err(ReportFormatError {
                kind: "task report format",
                raw: s.to_string(),
                expected: Self::ALL,
            }),
        }
    }
}

impl fmt::Display for TaskReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format for verification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationReportFormat {
    #[default]
    Html,
    Json,
}

impl VerificationReportFormat {
    pub const ALL: &'static [&'static str] = &["html", "json"];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Json => "json",
        }
    }
}

impl FromStr for VerificationReportFormat {
    type Err = ReportFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(Self::Html),
            "json" => Ok(Self::Json),
            _ => Err(ReportFormatError {
                kind: "verification report format",
                raw: s.to_string(),
                expected: Self::ALL,
            }),
        }
    }
}

impl fmt::Display for VerificationReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_formats_parse_case_insensitively() {
        assert_eq!("HTML".parse::<TaskReportFormat>(), Ok(TaskReportFormat::Html));
        assert_eq!("junit".parse::<TaskReportFormat>(), Ok(TaskReportFormat::Junit));
        assert_eq!(TaskReportFormat::Junit.extension(), "xml");
    }

    #[test]
    fn unknown_format_lists_expected_values() {
        let err = "pdf".parse::<VerificationReportFormat>().unwrap_err();
        assert_eq!(err.raw, "pdf");
        assert!(err.to_string().contains("html"));
        assert!(err.to_string().contains("json"));
    }
}
