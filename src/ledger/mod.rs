//! The action ledger: the only record of what controllers decided.

mod storage;

pub use storage::{ActionLog, JsonLinesLog, MemoryLog};

use crate::models::{Action, ActionType, RecommendationId};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid action: {0}")]
    InvalidAction(String),
    #[error("recommendation {recommendation_id} was already resolved by {resolved_by}")]
    AlreadyResolved {
        recommendation_id: RecommendationId,
        resolved_by: String,
    },
    #[error("ledger storage failed: {0}")]
    Storage(#[from] std::io::Error),
    #[error("failed to encode action: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("action log is corrupt at line {line}: {message}")]
    CorruptLog { line: usize, message: String },
}

/// How a recommendation was resolved, derived from its terminal action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub action_type: ActionType,
    pub controller_id: String,
    pub timestamp: NaiveDateTime,
}

/// Restricts a history to one controller and/or one recommendation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryFilter {
    #[serde(default)]
    pub controller_id: Option<String>,
    #[serde(default)]
    pub recommendation_id: Option<RecommendationId>,
}

impl HistoryFilter {
    #[must_use]
    pub fn controller(controller_id: &str) -> Self {
        Self {
            controller_id: Some(controller_id.to_string()),
            recommendation_id: None,
        }
    }

    #[must_use]
    pub fn recommendation(recommendation_id: RecommendationId) -> Self {
        Self {
            controller_id: None,
            recommendation_id: Some(recommendation_id),
        }
    }

    #[must_use]
    pub fn matches(&self, action: &Action) -> bool {
        self.controller_id
            .as_ref()
            .map_or(true, |controller| &action.controller_id == controller)
            && self
                .recommendation_id
                .map_or(true, |id| action.recommendation_id == id)
    }
}

/// A filtered view of the ledger at one point in time.
///
/// Iteration is lazy and can be restarted any number of times; actions
/// recorded after the view was taken are not visible.
#[derive(Debug, Clone)]
pub struct History {
    actions: Arc<Vec<Action>>,
    filter: HistoryFilter,
}

impl History {
    #[must_use]
    pub fn iter(&self) -> HistoryIter<'_> {
        HistoryIter {
            inner: self.actions.iter(),
            filter: &self.filter,
        }
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a Action;
    type IntoIter = HistoryIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct HistoryIter<'a> {
    inner: std::slice::Iter<'a, Action>,
    filter: &'a HistoryFilter,
}

impl<'a> Iterator for HistoryIter<'a> {
    type Item = &'a Action;

    fn next(&mut self) -> Option<Self::Item> {
        let filter = self.filter;
        self.inner.find(|action| filter.matches(action))
    }
}

struct LedgerState {
    log: Box<dyn ActionLog>,
    /// Ordered by timestamp, ties in append order
    actions: Arc<Vec<Action>>,
    resolved: HashMap<RecommendationId, Resolution>,
}

impl LedgerState {
    fn check(&self, action: &Action) -> Result<(), LedgerError> {
        validate(action)?;
        if let Some(previous) = self.resolved.get(&action.recommendation_id) {
            return Err(LedgerError::AlreadyResolved {
                recommendation_id: action.recommendation_id,
                resolved_by: previous.controller_id.clone(),
            });
        }
        Ok(())
    }

    fn insert(&mut self, action: Action) {
        self.resolved.insert(
            action.recommendation_id,
            Resolution {
                action_type: action.action_type,
                controller_id: action.controller_id.clone(),
                timestamp: action.timestamp,
            },
        );
        let actions = Arc::make_mut(&mut self.actions);
        let idx = actions.partition_point(|a| a.timestamp <= action.timestamp);
        actions.insert(idx, action);
    }
}

/// Append-only record of terminal decisions on recommendations
pub struct ActionLedger {
    state: Mutex<LedgerState>,
}

impl std::fmt::Debug for ActionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionLedger").field("len", &self.len()).finish()
    }
}

impl Default for ActionLedger {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl ActionLedger {
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(LedgerState {
                log: Box::new(MemoryLog::default()),
                actions: Arc::new(Vec::new()),
                resolved: HashMap::new(),
            }),
        }
    }

    /// Open a ledger over `log`, replaying and re-validating what it already holds
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::CorruptLog` if the stored actions break the
    /// ledger's rules, or a storage error if they cannot be read
    pub fn with_log(mut log: Box<dyn ActionLog>) -> Result<Self, LedgerError> {
        let stored = log.load()?;
        let mut state = LedgerState {
            log,
            actions: Arc::new(Vec::with_capacity(stored.len())),
            resolved: HashMap::new(),
        };
        for (i, action) in stored.into_iter().enumerate() {
            state.check(&action).map_err(|e| LedgerError::CorruptLog {
                line: i + 1,
                message: e.to_string(),
            })?;
            state.insert(action);
        }
        log::info!("Action ledger opened with {} actions", state.actions.len());
        Ok(Self {
            state: Mutex::new(state),
        })
    }

    /// Record a terminal decision.
    ///
    /// The check for an earlier resolution and the append happen under one
    /// lock, so two controllers racing on one recommendation cannot both win.
    ///
    /// # Errors
    ///
    /// `InvalidAction` for a blank controller or an override without a reason,
    /// `AlreadyResolved` if the recommendation already has a terminal action,
    /// or a storage error if the log rejects the write
    pub fn record(&self, action: Action) -> Result<(), LedgerError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = state.check(&action) {
            log::warn!("Rejected action on recommendation {}: {e}", action.recommendation_id);
            return Err(e);
        }
        state.log.append(&action)?;
        log::info!(
            "Recommendation {} {:?} by {}",
            action.recommendation_id,
            action.action_type,
            action.controller_id
        );
        state.insert(action);
        Ok(())
    }

    /// Actions matching `filter`, ordered by timestamp
    #[must_use]
    pub fn history(&self, filter: HistoryFilter) -> History {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        History {
            actions: Arc::clone(&state.actions),
            filter,
        }
    }

    #[must_use]
    pub fn resolution(&self, recommendation_id: RecommendationId) -> Option<Resolution> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.resolved.get(&recommendation_id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).actions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn validate(action: &Action) -> Result<(), LedgerError> {
    if action.controller_id.trim().is_empty() {
        return Err(LedgerError::InvalidAction("controller id must not be empty".to_string()));
    }
    let has_reason = action.reason.as_deref().is_some_and(|r| !r.trim().is_empty());
    if action.action_type == ActionType::Overridden && !has_reason {
        return Err(LedgerError::InvalidAction(
            "an override must give a reason".to_string(),
        ));
    }
    Ok(())
}
