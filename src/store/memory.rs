//! In-memory [`Persistence`] backend.
//!
//! State lives behind an `Arc<RwLock<..>>` and is lost when the last clone
//! is dropped.

use super::{Persistence, Preferences, ReportId, ReportRef, ReportSummary};
use crate::error::{CoachError, Result};
use crate::session::{UserId, Utterance};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct StoreState {
    history: HashMap<UserId, Vec<Utterance>>,
    preferences: HashMap<UserId, Preferences>,
    reports: HashMap<UserId, Vec<ReportSummary>>,
}

/// Thread-safe, cheaply cloneable in-memory store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed preferences for a user (tests and demos).
    pub async fn with_preferences(self, user: &UserId, preferences: Preferences) -> Self {
        self.state
            .write()
            .await
            .preferences
            .insert(user.clone(), preferences);
        self
    }
}

#[async_trait]
impl Persistence for InMemoryStore {
    async fn append_utterance(&self, user: &UserId, utterance: &Utterance) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .history
            .entry(user.clone())
            .or_default()
            .push(utterance.clone());
        Ok(())
    }

    async fn fetch_history(&self, user: &UserId) -> Result<Vec<Utterance>> {
        let state = self.state.read().await;
        Ok(state.history.get(user).cloned().unwrap_or_default())
    }

    async fn load_preferences(&self, user: &UserId) -> Result<Preferences> {
        let state = self.state.read().await;
        Ok(state
            .preferences
            .get(user)
            .cloned()
            .unwrap_or_default()
            .validated())
    }

    async fn update_preferences(&self, user: &UserId, preferences: &Preferences) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .preferences
            .insert(user.clone(), preferences.clone().validated());
        Ok(())
    }

    async fn save_report(&self, report: &ReportSummary) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .reports
            .entry(report.user.clone())
            .or_default()
            .push(report.clone());
        Ok(())
    }

    async fn list_reports(&self, user: &UserId) -> Result<Vec<ReportRef>> {
        let state = self.state.read().await;
        let mut refs: Vec<(usize, ReportRef)> = state
            .reports
            .get(user)
            .map(|rs| rs.iter().map(ReportSummary::reference).enumerate().collect())
            .unwrap_or_default();
        // Newest first; insertion order breaks timestamp ties.
        refs.sort_by(|(ia, a), (ib, b)| b.created_at.cmp(&a.created_at).then(ib.cmp(ia)));
        Ok(refs.into_iter().map(|(_, r)| r).collect())
    }

    async fn fetch_report_detail(&self, user: &UserId, id: &ReportId) -> Result<ReportSummary> {
        let state = self.state.read().await;
        state
            .reports
            .get(user)
            .and_then(|rs| rs.iter().find(|r| &r.id == id))
            .cloned()
            .ok_or_else(|| CoachError::Persistence(format!("report not found: {id}")))
    }
}
