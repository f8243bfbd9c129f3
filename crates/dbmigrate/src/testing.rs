//! Test doubles for providers and connectors.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::DatabaseConfig;
use crate::core::traits::{Connector, Provider};
use crate::core::value::{BoundParam, Entity};
use crate::drivers::DbType;
use crate::error::{MigrateError, Result};

/// One statement seen by a [`RecordingProvider`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub sql: String,
    pub params: Vec<BoundParam>,
}

/// Provider that records statements and replays canned result sets.
pub struct RecordingProvider {
    db_type: DbType,
    calls: Mutex<Vec<RecordedCall>>,
    results: Mutex<VecDeque<Vec<Entity>>>,
    failures: Mutex<Vec<(String, String)>>,
    closed: AtomicBool,
}

impl RecordingProvider {
    pub fn new(db_type: DbType) -> Self {
        Self {
            db_type,
            calls: Mutex::new(Vec::new()),
            results: Mutex::new(VecDeque::new()),
            failures: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Queue the result set returned by the next `execute`.
    pub fn push_rows(&self, rows: Vec<Entity>) {
        self.results.lock().unwrap().push_back(rows);
    }

    /// Fail every statement containing `needle`.
    pub fn fail_on(&self, needle: &str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .push((needle.to_string(), message.to_string()));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn statements(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.sql).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for RecordingProvider {
    fn db_type(&self) -> DbType {
        self.db_type
    }

    async fn execute(&self, sql: &str, params: &[BoundParam]) -> Result<Vec<Entity>> {
        if self.is_closed() {
            return Err(MigrateError::connection("provider is closed", "recording"));
        }
        self.calls.lock().unwrap().push(RecordedCall {
            sql: sql.to_string(),
            params: params.to_vec(),
        });

        let failure = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
            .map(|(_, message)| message.clone());
        if let Some(message) = failure {
            return Err(MigrateError::statement("recording", message));
        }

        Ok(self.results.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector handing out [`RecordingProvider`]s and remembering them.
#[derive(Default)]
pub struct FakeConnector {
    providers: Mutex<Vec<(String, Arc<RecordingProvider>)>>,
    refuse: Mutex<Vec<String>>,
    failures: Mutex<Vec<(String, String)>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse connections to `host`.
    pub fn refuse(&self, host: &str) {
        self.refuse.lock().unwrap().push(host.to_string());
    }

    /// Make every provider opened from now on fail statements containing `needle`.
    pub fn fail_on(&self, needle: &str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .push((needle.to_string(), message.to_string()));
    }

    /// `host/database` of every successful connection, in order.
    pub fn connections(&self) -> Vec<String> {
        self.providers
            .lock()
            .unwrap()
            .iter()
            .map(|(label, _)| label.clone())
            .collect()
    }

    pub fn providers(&self) -> Vec<Arc<RecordingProvider>> {
        self.providers
            .lock()
            .unwrap()
            .iter()
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// Statements executed across every provider, in connection order.
    pub fn statements(&self) -> Vec<String> {
        self.providers()
            .iter()
            .flat_map(|p| p.statements())
            .collect()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, config: &DatabaseConfig) -> Result<Arc<dyn Provider>> {
        if self.refuse.lock().unwrap().contains(&config.host) {
            return Err(MigrateError::connection(
                "connection refused",
                format!("connecting to {}", config.host),
            ));
        }

        let provider = Arc::new(RecordingProvider::new(config.r#type));
        for (needle, message) in self.failures.lock().unwrap().iter() {
            provider.fail_on(needle, message);
        }
        self.providers
            .lock()
            .unwrap()
            .push((format!("{}/{}", config.host, config.database), provider.clone()));
        Ok(provider)
    }
}
