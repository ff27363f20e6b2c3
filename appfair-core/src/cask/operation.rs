//! Per-operation state machine for cask installs

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use super::CaskAction;

/// Where a cask operation is
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "reason", rename_all = "snake_case")]
pub enum CaskPhase {
    Idle,
    FetchingCaskInfo,
    Downloading,
    VerifyingChecksum,
    InvokingPackageManager,
    Rescanning,
    Succeeded,
    Failed(String),
}

impl CaskPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CaskPhase::Succeeded | CaskPhase::Failed(_))
    }

    fn can_advance_to(&self, next: &CaskPhase) -> bool {
        use CaskPhase::*;
        match (self, next) {
            (current, Failed(_)) => !current.is_terminal(),
            (Idle, FetchingCaskInfo) | (Idle, InvokingPackageManager) => true,
            (FetchingCaskInfo, Downloading) => true,
            (Downloading, VerifyingChecksum) => true,
            (VerifyingChecksum, InvokingPackageManager) => true,
            (InvokingPackageManager, Rescanning) => true,
            (Rescanning, Succeeded) => true,
            _ => false,
        }
    }
}

impl fmt::Display for CaskPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaskPhase::Idle => f.write_str("idle"),
            CaskPhase::FetchingCaskInfo => f.write_str("fetching cask info"),
            CaskPhase::Downloading => f.write_str("downloading"),
            CaskPhase::VerifyingChecksum => f.write_str("verifying checksum"),
            CaskPhase::InvokingPackageManager => f.write_str("running brew"),
            CaskPhase::Rescanning => f.write_str("rescanning"),
            CaskPhase::Succeeded => f.write_str("succeeded"),
            CaskPhase::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// One install, upgrade or uninstall of a cask and the phases it went through
#[derive(Debug, Clone, Serialize)]
pub struct CaskOperation {
    pub action: CaskAction,
    pub token: String,
    phase: CaskPhase,
    history: Vec<(CaskPhase, DateTime<Utc>)>,
}

impl CaskOperation {
    pub fn new(action: CaskAction, token: impl Into<String>) -> Self {
        Self {
            action,
            token: token.into(),
            phase: CaskPhase::Idle,
            history: vec![(CaskPhase::Idle, Utc::now())],
        }
    }

    pub fn phase(&self) -> &CaskPhase {
        &self.phase
    }

    /// Phases entered so far, oldest first
    pub fn history(&self) -> impl Iterator<Item = &CaskPhase> {
        self.history.iter().map(|(phase, _)| phase)
    }

    /// Time from creation to the latest phase change
    pub fn elapsed(&self) -> chrono::TimeDelta {
        match (self.history.first(), self.history.last()) {
            (Some((_, start)), Some((_, latest))) => *latest - *start,
            _ => chrono::TimeDelta::zero(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Move to `next`; returns false and stays put on an illegal transition
    pub fn advance(&mut self, next: CaskPhase) -> bool {
        if !self.phase.can_advance_to(&next) {
            tracing::warn!(
                "Ignoring cask transition {} -> {} for {}",
                self.phase,
                next,
                self.token
            );
            return false;
        }
        tracing::debug!("{} {}: {}", self.action, self.token, next);
        self.history.push((next.clone(), Utc::now()));
        self.phase = next;
        true
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        self.advance(CaskPhase::Failed(reason.into()))
    }
}
