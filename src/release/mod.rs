//! Release records and their state machine.
//!
//! A release moves through four states:
//!
//! ```text
//! draft ──plan──▶ planned ──approve──▶ approved ──publish──▶ published
//!                   ▲  │
//!                   └──┘ plan / set_notes
//! ```
//!
//! Planning again, or editing the notes, is only possible before approval.
//! The derived views (changelog, risk report) are pure functions of the
//! record.

pub mod handlers;
pub mod store;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TransitionError;

pub use handlers::{registry, ReleaseService};
pub use store::{InMemoryStore, ReleaseStore};

/// Lifecycle state of a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseState {
    /// Created, nothing planned yet.
    Draft,
    /// Version and commits chosen.
    Planned,
    /// Signed off for publication.
    Approved,
    /// Published; the record is final.
    Published,
}

impl fmt::Display for ReleaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Draft => "draft",
            Self::Planned => "planned",
            Self::Approved => "approved",
            Self::Published => "published",
        };
        f.write_str(name)
    }
}

/// Conventional-commit category of a commit message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitKind {
    /// `feat:` commits.
    Feature,
    /// `fix:` commits.
    Fix,
    /// `perf:` commits.
    Performance,
    /// `docs:` commits.
    Documentation,
    /// Everything else.
    Other,
}

impl CommitKind {
    /// Section heading used in changelogs.
    #[must_use]
    pub const fn heading(self) -> &'static str {
        match self {
            Self::Feature => "Features",
            Self::Fix => "Fixes",
            Self::Performance => "Performance",
            Self::Documentation => "Documentation",
            Self::Other => "Other",
        }
    }
}

/// A commit included in a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Commit hash.
    pub sha: String,
    /// Full commit message.
    pub message: String,
    /// Commit author.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl Commit {
    /// The first line of the message.
    #[must_use]
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or_default().trim()
    }

    /// The hash shortened to seven characters.
    #[must_use]
    pub fn short_sha(&self) -> &str {
        self.sha.get(..7).unwrap_or(&self.sha)
    }

    /// Category derived from the conventional-commit prefix.
    #[must_use]
    pub fn kind(&self) -> CommitKind {
        let prefix = self.prefix().trim_end_matches('!');
        match prefix.split('(').next().unwrap_or_default() {
            "feat" => CommitKind::Feature,
            "fix" => CommitKind::Fix,
            "perf" => CommitKind::Performance,
            "docs" => CommitKind::Documentation,
            _ => CommitKind::Other,
        }
    }

    /// Whether the commit is marked as a breaking change.
    #[must_use]
    pub fn is_breaking(&self) -> bool {
        self.prefix().ends_with('!') || self.message.contains("BREAKING CHANGE")
    }

    fn prefix(&self) -> &str {
        self.summary()
            .split_once(':')
            .map_or("", |(prefix, _)| prefix.trim())
    }
}

/// A release record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    /// Unique identifier.
    pub id: Uuid,
    /// Repository the release belongs to.
    pub repository: String,
    /// Version being released.
    pub version: String,
    /// Lifecycle state.
    pub state: ReleaseState,
    /// Commits included in the release.
    pub commits: Vec<Commit>,
    /// Release notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Who approved the release.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver: Option<String>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record last changed.
    pub updated_at: DateTime<Utc>,
    /// When the release was published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl Release {
    /// Creates a draft release.
    #[must_use]
    pub fn draft(repository: impl Into<String>, version: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            repository: repository.into(),
            version: version.into(),
            state: ReleaseState::Draft,
            commits: Vec::new(),
            notes: None,
            approver: None,
            created_at: now,
            updated_at: now,
            published_at: None,
        }
    }

    /// Sets the version and commits.
    ///
    /// # Errors
    ///
    /// Fails once the release is approved, or if `version` is blank.
    pub fn plan(&mut self, version: &str, commits: Vec<Commit>) -> Result<(), TransitionError> {
        self.require_editable("plan")?;
        let version = non_blank(version, "version")?;

        self.version = version.to_string();
        self.commits = commits;
        self.state = ReleaseState::Planned;
        self.touch();
        Ok(())
    }

    /// Replaces the release notes.
    ///
    /// # Errors
    ///
    /// Fails once the release is approved, or if `notes` is blank.
    pub fn set_notes(&mut self, notes: &str) -> Result<(), TransitionError> {
        self.require_editable("edit the notes of")?;
        self.notes = Some(non_blank(notes, "notes")?.to_string());
        self.touch();
        Ok(())
    }

    /// Signs the release off.
    ///
    /// # Errors
    ///
    /// Fails unless the release is planned and has notes.
    pub fn approve(&mut self, approver: &str) -> Result<(), TransitionError> {
        self.require_state(ReleaseState::Planned, "approve")?;
        let approver = non_blank(approver, "approver")?;
        if self.notes.is_none() {
            return Err(TransitionError::MissingNotes {
                version: self.version.clone(),
            });
        }

        self.approver = Some(approver.to_string());
        self.state = ReleaseState::Approved;
        self.touch();
        Ok(())
    }

    /// Marks the release as published.
    ///
    /// # Errors
    ///
    /// Fails unless the release is approved.
    pub fn publish(&mut self) -> Result<(), TransitionError> {
        self.require_state(ReleaseState::Approved, "publish")?;
        self.state = ReleaseState::Published;
        self.touch();
        self.published_at = Some(self.updated_at);
        Ok(())
    }

    /// Renders the changelog as Markdown, grouped by commit kind.
    #[must_use]
    pub fn changelog(&self) -> String {
        let mut out = format!("# {} {}\n", self.repository, self.version);

        if let Some(notes) = &self.notes {
            out.push('\n');
            out.push_str(notes.trim_end());
            out.push('\n');
        }

        let breaking: Vec<&Commit> = self.commits.iter().filter(|c| c.is_breaking()).collect();
        if !breaking.is_empty() {
            out.push_str("\n## Breaking Changes\n\n");
            for commit in breaking {
                push_entry(&mut out, commit);
            }
        }

        for kind in [
            CommitKind::Feature,
            CommitKind::Fix,
            CommitKind::Performance,
            CommitKind::Documentation,
            CommitKind::Other,
        ] {
            let mut section = self.commits.iter().filter(|c| c.kind() == kind).peekable();
            if section.peek().is_none() {
                continue;
            }
            out.push_str(&format!("\n## {}\n\n", kind.heading()));
            for commit in section {
                push_entry(&mut out, commit);
            }
        }

        out
    }

    /// Assesses how risky the release is.
    #[must_use]
    pub fn risk_report(&self) -> RiskReport {
        RiskReport::assess(&self.commits)
    }

    fn require_editable(&self, action: &'static str) -> Result<(), TransitionError> {
        match self.state {
            ReleaseState::Draft | ReleaseState::Planned => Ok(()),
            state => Err(TransitionError::NotAllowed { action, state }),
        }
    }

    fn require_state(&self, expected: ReleaseState, action: &'static str) -> Result<(), TransitionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(TransitionError::NotAllowed {
                action,
                state: self.state,
            })
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

fn non_blank<'a>(value: &'a str, field: &'static str) -> Result<&'a str, TransitionError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(TransitionError::Blank { field });
    }
    Ok(value)
}

fn push_entry(out: &mut String, commit: &Commit) {
    out.push_str(&format!("- {} ({})\n", commit.summary(), commit.short_sha()));
}

/// Overall risk of a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Routine release.
    Low,
    /// Large release; review recommended.
    Medium,
    /// Contains breaking changes.
    High,
}

/// Commits above this count make a release at least medium risk.
const LARGE_RELEASE_COMMITS: usize = 20;

/// Summary of what a release changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskReport {
    /// Overall level.
    pub level: RiskLevel,
    /// Number of commits.
    pub commit_count: usize,
    /// Number of breaking commits.
    pub breaking_changes: usize,
    /// Number of feature commits.
    pub features: usize,
    /// Number of fix commits.
    pub fixes: usize,
    /// Why the level was chosen.
    pub reasons: Vec<String>,
}

impl RiskReport {
    /// Assesses a set of commits.
    #[must_use]
    pub fn assess(commits: &[Commit]) -> Self {
        let breaking_changes = commits.iter().filter(|c| c.is_breaking()).count();
        let features = commits.iter().filter(|c| c.kind() == CommitKind::Feature).count();
        let fixes = commits.iter().filter(|c| c.kind() == CommitKind::Fix).count();

        let mut level = RiskLevel::Low;
        let mut reasons = Vec::new();

        if breaking_changes > 0 {
            level = RiskLevel::High;
            reasons.push(format!("{breaking_changes} breaking change(s)"));
        }
        if commits.len() > LARGE_RELEASE_COMMITS {
            level = level.max(RiskLevel::Medium);
            reasons.push(format!("{} commits in one release", commits.len()));
        }
        if reasons.is_empty() {
            reasons.push("no breaking changes".to_string());
        }

        Self {
            level,
            commit_count: commits.len(),
            breaking_changes,
            features,
            fixes,
            reasons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(sha: &str, message: &str) -> Commit {
        Commit {
            sha: sha.to_string(),
            message: message.to_string(),
            author: None,
        }
    }

    fn planned() -> Release {
        let mut release = Release::draft("widgets", "0.1.0");
        release
            .plan(
                "1.0.0",
                vec![
                    commit("a1b2c3d4e5", "feat(api): add search"),
                    commit("b2c3d4e5f6", "fix: handle empty input"),
                    commit("c3d4e5f6a7", "chore: bump deps"),
                ],
            )
            .unwrap();
        release
    }

    #[test]
    fn commit_kinds_follow_conventional_prefixes() {
        assert_eq!(commit("1", "feat: x").kind(), CommitKind::Feature);
        assert_eq!(commit("1", "feat(ui)!: x").kind(), CommitKind::Feature);
        assert_eq!(commit("1", "fix: x").kind(), CommitKind::Fix);
        assert_eq!(commit("1", "perf: x").kind(), CommitKind::Performance);
        assert_eq!(commit("1", "docs: x").kind(), CommitKind::Documentation);
        assert_eq!(commit("1", "Merge branch main").kind(), CommitKind::Other);
    }

    #[test]
    fn breaking_changes_are_detected() {
        assert!(commit("1", "feat(ui)!: drop legacy theme").is_breaking());
        assert!(commit("1", "refactor: x\n\nBREAKING CHANGE: renamed field").is_breaking());
        assert!(!commit("1", "fix: typo").is_breaking());
    }

    #[test]
    fn full_lifecycle() {
        let mut release = planned();
        release.set_notes("First stable release.").unwrap();
        release.approve("ada").unwrap();
        release.publish().unwrap();

        assert_eq!(release.state, ReleaseState::Published);
        assert_eq!(release.approver.as_deref(), Some("ada"));
        assert!(release.published_at.is_some());
    }

    #[test]
    fn approval_requires_notes() {
        let mut release = planned();
        assert_eq!(
            release.approve("ada"),
            Err(TransitionError::MissingNotes {
                version: "1.0.0".to_string()
            })
        );
        assert_eq!(release.state, ReleaseState::Planned);
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let mut release = Release::draft("widgets", "0.1.0");
        assert_eq!(
            release.publish(),
            Err(TransitionError::NotAllowed {
                action: "publish",
                state: ReleaseState::Draft
            })
        );

        let mut approved = planned();
        approved.set_notes("notes").unwrap();
        approved.approve("ada").unwrap();
        assert!(approved.plan("2.0.0", Vec::new()).is_err());
        assert!(approved.set_notes("late edit").is_err());
    }

    #[test]
    fn blank_fields_are_rejected() {
        let mut release = Release::draft("widgets", "0.1.0");
        assert_eq!(
            release.plan("  ", Vec::new()),
            Err(TransitionError::Blank { field: "version" })
        );
        assert_eq!(release.state, ReleaseState::Draft);
    }

    #[test]
    fn changelog_groups_commits() {
        let mut release = planned();
        release.set_notes("Highlights below.").unwrap();
        let changelog = release.changelog();

        assert!(changelog.starts_with("# widgets 1.0.0\n\nHighlights below.\n"));
        assert!(changelog.contains("## Features\n\n- feat(api): add search (a1b2c3d)\n"));
        assert!(changelog.contains("## Fixes\n\n- fix: handle empty input (b2c3d4e)\n"));
        assert!(changelog.contains("## Other\n\n- chore: bump deps (c3d4e5f)\n"));
        assert!(!changelog.contains("Breaking"));
        assert!(changelog.find("## Features").unwrap() < changelog.find("## Fixes").unwrap());
    }

    #[test]
    fn risk_levels() {
        assert_eq!(planned().risk_report().level, RiskLevel::Low);

        let breaking = RiskReport::assess(&[commit("1", "feat!: remove v1 api")]);
        assert_eq!(breaking.level, RiskLevel::High);
        assert_eq!(breaking.breaking_changes, 1);

        let many: Vec<Commit> = (0..25).map(|i| commit(&i.to_string(), "fix: small")).collect();
        let large = RiskReport::assess(&many);
        assert_eq!(large.level, RiskLevel::Medium);
        assert_eq!(large.fixes, 25);
    }

    #[test]
    fn serialised_state_is_lowercase() {
        let value = serde_json::to_value(planned()).unwrap();
        assert_eq!(value["state"], serde_json::json!("planned"));
        assert!(value.get("createdAt").is_some());
    }
}
