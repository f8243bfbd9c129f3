//! File handlers and their dispatch.
//!
//! A handler runs one migration file segment by segment and reports
//! progress through a [`StatusSink`]:
//!
//! - `Ok` after every successful segment
//! - `Error(message)` for the first failing segment, after which the file stops
//! - `Done` once the file is finished, whether or not it failed

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::conf::ConnectionConf;
use super::service::ServiceHandler;
use super::MigrationFile;
use crate::config::ServiceConfig;
use crate::core::traits::{Connector, Provider};
use crate::drivers::DbType;
use crate::error::{MigrateError, Result};

/// Progress of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Ok,
    Error(String),
    Done,
}

/// Receiver of [`FileStatus`] reports.
#[async_trait]
pub trait StatusSink: Send {
    async fn report(&mut self, file: &MigrationFile, status: FileStatus) -> Result<()>;
}

/// Which handler a file needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Sql(DbType),
    Service,
}

/// Pick the handler for a file extension and the dialect its settings declare.
pub fn select_handler(extension: &str, db_type: Option<DbType>) -> Option<HandlerKind> {
    match (extension.to_lowercase().as_str(), db_type) {
        ("sql", Some(DbType::Mysql)) => Some(HandlerKind::Sql(DbType::Mysql)),
        ("sql", Some(DbType::Mssql)) => Some(HandlerKind::Sql(DbType::Mssql)),
        ("svc", _) => Some(HandlerKind::Service),
        _ => None,
    }
}

/// An opened handler.
pub enum Handler {
    Sql(Arc<dyn Provider>),
    Service(ServiceHandler),
}

impl Handler {
    /// Open the handler for `kind` with the file's resolved settings.
    pub async fn open(
        kind: HandlerKind,
        conf: &ConnectionConf,
        connector: &dyn Connector,
        service: &ServiceConfig,
    ) -> Result<Self> {
        match kind {
            HandlerKind::Sql(_) => {
                let config = conf.to_database_config()?;
                let provider = connector.connect(&config).await?;
                Ok(Handler::Sql(provider))
            }
            HandlerKind::Service => Ok(Handler::Service(ServiceHandler::new(conf, service)?)),
        }
    }

    /// Run every segment of the file, reporting through `sink`.
    ///
    /// Fails with the handler's execution error when a segment failed or the
    /// file could not be read. Sink errors are returned as they are.
    pub async fn execute(&self, file: &MigrationFile, sink: &mut dyn StatusSink) -> Result<()> {
        info!("Processing file {}", file.display_name());

        let text = match tokio::fs::read_to_string(&file.file).await {
            Ok(text) => text,
            Err(e) => {
                let message = format!("cannot read {}: {}", file.file.display(), e);
                sink.report(file, FileStatus::Error(message.clone())).await?;
                sink.report(file, FileStatus::Done).await?;
                return Err(self.failure(file, message));
            }
        };

        let mut failure = None;
        for segment in split_statements(&text) {
            match self.run_segment(&segment).await {
                Ok(()) => sink.report(file, FileStatus::Ok).await?,
                Err(message) => {
                    sink.report(file, FileStatus::Error(message.clone())).await?;
                    failure = Some(message);
                    break;
                }
            }
        }
        sink.report(file, FileStatus::Done).await?;

        match failure {
            Some(message) => Err(self.failure(file, message)),
            None => Ok(()),
        }
    }

    async fn run_segment(&self, segment: &str) -> std::result::Result<(), String> {
        match self {
            Handler::Sql(provider) => {
                debug!("Executing: {}", segment);
                provider
                    .execute(segment, &[])
                    .await
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            }
            Handler::Service(service) => service.invoke(segment).await,
        }
    }

    fn failure(&self, file: &MigrationFile, message: String) -> MigrateError {
        match self {
            Handler::Sql(_) => MigrateError::statement(file.display_name(), message),
            Handler::Service(_) => {
                MigrateError::ServiceInvocation(format!("{}: {}", file.display_name(), message))
            }
        }
    }

    pub async fn close(&self) -> Result<()> {
        match self {
            Handler::Sql(provider) => provider.close().await,
            Handler::Service(_) => Ok(()),
        }
    }
}

/// Split a script into segments.
///
/// Blank lines and lines starting with `#` are dropped. A line ending in `;`
/// closes the current segment; the `;` itself is not kept. Trailing text
/// without a terminator forms a final segment.
pub fn split_statements(text: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match line.trim_end().strip_suffix(';') {
            Some(body) => {
                current.push(body);
                push_segment(&mut segments, &mut current);
            }
            None => current.push(line),
        }
    }
    push_segment(&mut segments, &mut current);
    segments
}

fn push_segment(segments: &mut Vec<String>, current: &mut Vec<&str>) {
    let segment = current.join("\n").trim().to_string();
    current.clear();
    if !segment.is_empty() {
        segments.push(segment);
    }
}
