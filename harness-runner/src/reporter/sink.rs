// Copyright (c) The harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::ReportSinkError;
use atomicwrites::{AtomicFile, OverwriteBehavior};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use harness_metadata::{RunDiagnostics, VerboseReport};
use serde::Serialize;
use std::{
    borrow::Cow,
    io::{self, Write},
};
use tracing::debug;

/// How many suffixed names to try before giving up on finding an unused one.
const MAX_NAME_ATTEMPTS: usize = 100;

/// Writes report documents to a reports directory.
///
/// File names are derived from the run timestamp: `report-<stamp>.json`,
/// `diagnostics-<stamp>.json` and optionally `summary-<stamp>.md`, where `<stamp>` looks like
/// `20260314T092653.589Z`. Existing files are never overwritten. If any of the names is taken,
/// `-1`, `-2` and so on are appended to the stamp of every document.
#[derive(Clone, Debug)]
pub struct ReportSink {
    reports_dir: Utf8PathBuf,
}

struct Document<'a> {
    prefix: &'static str,
    extension: &'static str,
    contents: Cow<'a, [u8]>,
}

/// Where [`ReportSink::persist`] wrote each document.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PersistedReports {
    /// The verbose report.
    pub report_path: Utf8PathBuf,

    /// The diagnostics snapshot.
    pub diagnostics_path: Utf8PathBuf,

    /// The Markdown summary, if one was written.
    pub markdown_path: Option<Utf8PathBuf>,
}

impl ReportSink {
    /// Creates a sink writing to `reports_dir`. The directory is created on first use.
    pub fn new(reports_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            reports_dir: reports_dir.into(),
        }
    }

    /// Returns the reports directory.
    pub fn reports_dir(&self) -> &Utf8Path {
        &self.reports_dir
    }

    /// Writes the report, the diagnostics snapshot and, if provided, the Markdown summary.
    ///
    /// All documents of one call share the same name suffix, so they can be matched up by name.
    pub fn persist(
        &self,
        report: &VerboseReport,
        diagnostics: &RunDiagnostics,
        run_timestamp: DateTime<Utc>,
        markdown: Option<&str>,
    ) -> Result<PersistedReports, ReportSinkError> {
        std::fs::create_dir_all(&self.reports_dir).map_err(|error| ReportSinkError::CreateDir {
            path: self.reports_dir.clone(),
            error,
        })?;

        let stamp = run_timestamp.format("%Y%m%dT%H%M%S%.3fZ").to_string();

        let mut documents = vec![
            Document {
                prefix: "report",
                extension: "json",
                contents: self.to_json("report", &stamp, report)?.into(),
            },
            Document {
                prefix: "diagnostics",
                extension: "json",
                contents: self.to_json("diagnostics", &stamp, diagnostics)?.into(),
            },
        ];
        if let Some(markdown) = markdown {
            documents.push(Document {
                prefix: "summary",
                extension: "md",
                contents: markdown.as_bytes().into(),
            });
        }

        let suffix = self.write_documents(&stamp, &documents)?;
        let persisted = PersistedReports {
            report_path: self.file_path("report", &stamp, suffix, "json"),
            diagnostics_path: self.file_path("diagnostics", &stamp, suffix, "json"),
            markdown_path: markdown.map(|_| self.file_path("summary", &stamp, suffix, "md")),
        };

        debug!(
            report_path = %persisted.report_path,
            diagnostics_path = %persisted.diagnostics_path,
            "persisted reports"
        );
        Ok(persisted)
    }

    fn to_json(
        &self,
        prefix: &str,
        stamp: &str,
        value: &impl Serialize,
    ) -> Result<Vec<u8>, ReportSinkError> {
        let mut contents =
            serde_json::to_vec_pretty(value).map_err(|error| ReportSinkError::Serialize {
                path: self.file_path(prefix, stamp, None, "json"),
                error,
            })?;
        contents.push(b'\n');
        Ok(contents)
    }

    /// Writes every document under the first suffix for which none of their names is taken, and
    /// returns that suffix.
    fn write_documents(
        &self,
        stamp: &str,
        documents: &[Document<'_>],
    ) -> Result<Option<usize>, ReportSinkError> {
        'suffixes: for suffix in std::iter::once(None).chain((1..MAX_NAME_ATTEMPTS).map(Some)) {
            let paths: Vec<_> = documents
                .iter()
                .map(|doc| self.file_path(doc.prefix, stamp, suffix, doc.extension))
                .collect();
            if let Some(taken) = paths.iter().find(|path| path.symlink_metadata().is_ok()) {
                debug!(%taken, "report file already exists, trying another name");
                continue;
            }

            for (index, (doc, path)) in documents.iter().zip(&paths).enumerate() {
                let res = AtomicFile::new(path, OverwriteBehavior::DisallowOverwrite)
                    .write(|file| file.write_all(&doc.contents));
                match res {
                    Ok(()) => {}
                    Err(atomicwrites::Error::Internal(error))
                        if error.kind() == io::ErrorKind::AlreadyExists =>
                    {
                        // Another writer took the name after the check above. Back out the files
                        // written under this suffix so the set stays together.
                        debug!(%path, "report file created concurrently, trying another name");
                        for written in &paths[..index] {
                            _ = std::fs::remove_file(written);
                        }
                        continue 'suffixes;
                    }
                    Err(atomicwrites::Error::Internal(error) | atomicwrites::Error::User(error)) => {
                        return Err(ReportSinkError::Write {
                            path: path.clone(),
                            error,
                        });
                    }
                }
            }
            return Ok(suffix);
        }

        Err(ReportSinkError::NamesExhausted {
            path: self.file_path("report", stamp, None, "json"),
            attempts: MAX_NAME_ATTEMPTS,
        })
    }

    fn file_path(
        &self,
        prefix: &str,
        stamp: &str,
        suffix: Option<usize>,
        extension: &str,
    ) -> Utf8PathBuf {
        let file_name = match suffix {
            None => format!("{prefix}-{stamp}.{extension}"),
            Some(n) => format!("{prefix}-{stamp}-{n}.{extension}"),
        };
        self.reports_dir.join(file_name)
    }
}
