//! MCP tools, resources, and prompts for release management.
//!
//! [`registry`] wires a [`ReleaseService`] into a handler [`Registry`]. All
//! tools except `release_status` change release state, so the dispatcher
//! refreshes the `release://` views after each of them succeeds.
//!
//! Rule violations, such as approving a release without notes, are returned
//! as tool results flagged `isError`; the model can read the message and try
//! again. Only store failures become RPC errors.

use std::collections::HashMap;
use std::future::{ready, Ready};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::RepositoryConfig;
use crate::error::{HandlerError, TransitionError};
use crate::mcp::cache::{
    CHANGELOG_URI, COMMITS_URI, CONFIG_URI, RISK_URI, STATE_DEPENDENT_URIS, STATE_URI,
};
use crate::mcp::progress::CallScope;
use crate::mcp::registry::{Registry, ToolEffect};
use crate::mcp::types::{
    CallToolResult, GetPromptResult, PromptArgument, PromptDefinition, ReadResourceResult,
    ResourceDefinition, ToolDefinition,
};
use crate::release::store::ReleaseStore;
use crate::release::{Commit, Release, ReleaseState, RiskReport};

/// Steps reported while publishing.
const PUBLISH_STEPS: [&str; 4] = [
    "Validating release",
    "Tagging version",
    "Publishing changelog",
    "Recording publication",
];

/// Release operations for one repository.
pub struct ReleaseService {
    store: Arc<dyn ReleaseStore>,
    repository: RepositoryConfig,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlanArgs {
    version: String,
    #[serde(default)]
    commits: Vec<Commit>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NotesArgs {
    notes: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ApproveArgs {
    approver: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CommitView<'a> {
    #[serde(flatten)]
    commit: &'a Commit,
    kind: crate::release::CommitKind,
    breaking: bool,
}

impl ReleaseService {
    /// Creates a service over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ReleaseStore>, repository: RepositoryConfig) -> Self {
        Self { store, repository }
    }

    /// Name of the managed repository.
    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository.name
    }

    fn current(&self) -> Result<Option<Release>, HandlerError> {
        Ok(self.store.find(&self.repository.name)?)
    }

    fn state_view(&self) -> Result<Value, HandlerError> {
        match self.current()? {
            Some(release) => to_value(&release),
            None => Ok(json!({
                "repository": self.repository.name,
                "version": self.repository.initial_version,
                "state": "none",
            })),
        }
    }

    /// `release_status`: the current release, or a placeholder if none.
    fn status(&self, _args: Value) -> Result<CallToolResult, HandlerError> {
        Ok(CallToolResult::json(&self.state_view()?))
    }

    /// `release_plan`: starts a release, or re-plans one not yet approved.
    ///
    /// A published release is final; planning after it starts a new one.
    fn plan(&self, args: Value) -> Result<CallToolResult, HandlerError> {
        let args: PlanArgs = parse_args(args)?;

        let mut release = match self.current()? {
            Some(release) if release.state != ReleaseState::Published => release,
            _ => Release::draft(&self.repository.name, &self.repository.initial_version),
        };

        self.apply(&mut release, |r| r.plan(&args.version, args.commits))
    }

    /// `release_set_notes`
    fn set_notes(&self, args: Value) -> Result<CallToolResult, HandlerError> {
        let args: NotesArgs = parse_args(args)?;
        self.update(|r| r.set_notes(&args.notes))
    }

    /// `release_approve`
    fn approve(&self, args: Value) -> Result<CallToolResult, HandlerError> {
        let args: ApproveArgs = parse_args(args)?;
        self.update(|r| r.approve(&args.approver))
    }

    /// `release_publish`: reports one progress step per publication stage.
    async fn publish(&self, scope: CallScope) -> Result<CallToolResult, HandlerError> {
        let Some(mut release) = self.current()? else {
            return Ok(self.nothing_in_progress());
        };

        let total = PUBLISH_STEPS.len() as u64;
        scope.report_progress(Some(total), Some(PUBLISH_STEPS[0]));
        if let Err(e) = release.publish() {
            return Ok(CallToolResult::error(e.to_string()));
        }

        for step in PUBLISH_STEPS.iter().skip(1) {
            tokio::task::yield_now().await;
            scope.report_progress(Some(total), Some(*step));
        }

        self.store.save(release.clone())?;
        tracing::info!(repository = %release.repository, version = %release.version, "Release published");
        Ok(CallToolResult::json(&to_value(&release)?))
    }

    fn update<F>(&self, change: F) -> Result<CallToolResult, HandlerError>
    where
        F: FnOnce(&mut Release) -> Result<(), TransitionError>,
    {
        match self.current()? {
            Some(mut release) => self.apply(&mut release, change),
            None => Ok(self.nothing_in_progress()),
        }
    }

    fn apply<F>(&self, release: &mut Release, change: F) -> Result<CallToolResult, HandlerError>
    where
        F: FnOnce(&mut Release) -> Result<(), TransitionError>,
    {
        if let Err(e) = change(release) {
            tracing::debug!(repository = %release.repository, error = %e, "Rejected release change");
            return Ok(CallToolResult::error(e.to_string()));
        }

        self.store.save(release.clone())?;
        Ok(CallToolResult::json(&to_value(&*release)?))
    }

    fn nothing_in_progress(&self) -> CallToolResult {
        CallToolResult::error(format!(
            "no release in progress for {}; plan one with release_plan",
            self.repository.name
        ))
    }

    fn read_state(&self, uri: String) -> Result<ReadResourceResult, HandlerError> {
        Ok(ReadResourceResult::json(uri, &self.state_view()?))
    }

    fn read_config(&self, uri: String) -> Result<ReadResourceResult, HandlerError> {
        let config = json!({
            "repository": self.repository.name,
            "initialVersion": self.repository.initial_version,
            "stateDependentResources": STATE_DEPENDENT_URIS,
        });
        Ok(ReadResourceResult::json(uri, &config))
    }

    fn read_commits(&self, uri: String) -> Result<ReadResourceResult, HandlerError> {
        let release = self.current()?;
        let commits: Vec<CommitView<'_>> = release
            .iter()
            .flat_map(|r| &r.commits)
            .map(|commit| CommitView {
                commit,
                kind: commit.kind(),
                breaking: commit.is_breaking(),
            })
            .collect();
        Ok(ReadResourceResult::json(uri, &to_value(&commits)?))
    }

    fn read_changelog(&self, uri: String) -> Result<ReadResourceResult, HandlerError> {
        let text = match self.current()? {
            Some(release) => release.changelog(),
            None => format!("# {}\n\nNo release in progress.\n", self.repository.name),
        };
        Ok(ReadResourceResult::markdown(uri, text))
    }

    fn risk(&self) -> Result<RiskReport, HandlerError> {
        Ok(self
            .current()?
            .map_or_else(|| RiskReport::assess(&[]), |r| r.risk_report()))
    }

    fn read_risk(&self, uri: String) -> Result<ReadResourceResult, HandlerError> {
        Ok(ReadResourceResult::json(uri, &to_value(&self.risk()?)?))
    }

    /// `release_announcement`
    fn announcement(&self, args: &HashMap<String, String>) -> Result<GetPromptResult, HandlerError> {
        let audience = args.get("audience").map_or("users", String::as_str);
        let Some(release) = self.current()? else {
            return Err(HandlerError::InvalidArguments(format!(
                "no release in progress for {}",
                self.repository.name
            )));
        };

        let text = format!(
            "Write a release announcement for {audience} about {} {}.\n\
             Keep it short and lead with what changes for them.\n\n{}",
            release.repository,
            release.version,
            release.changelog()
        );
        Ok(GetPromptResult::user_message("Release announcement", text))
    }

    /// `risk_review`
    fn risk_review(&self, _args: &HashMap<String, String>) -> Result<GetPromptResult, HandlerError> {
        let report = self.risk()?;
        let text = format!(
            "Review the risk of the upcoming {} release and recommend whether to approve it.\n\n\
             Risk level: {:?}\nCommits: {}\nBreaking changes: {}\nReasons: {}",
            self.repository.name,
            report.level,
            report.commit_count,
            report.breaking_changes,
            report.reasons.join("; ")
        );
        Ok(GetPromptResult::user_message("Release risk review", text))
    }
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, HandlerError> {
    serde_json::from_value(args).map_err(|e| HandlerError::InvalidArguments(e.to_string()))
}

fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, HandlerError> {
    serde_json::to_value(value).map_err(|e| HandlerError::Failed(e.to_string()))
}

type ToolFn = fn(&ReleaseService, Value) -> Result<CallToolResult, HandlerError>;
type ResourceFn = fn(&ReleaseService, String) -> Result<ReadResourceResult, HandlerError>;
type PromptFn = fn(&ReleaseService, &HashMap<String, String>) -> Result<GetPromptResult, HandlerError>;

fn tool_handler(
    service: &Arc<ReleaseService>,
    f: ToolFn,
) -> impl Fn(CallScope, Value) -> Ready<Result<CallToolResult, HandlerError>> + Send + Sync + 'static {
    let service = Arc::clone(service);
    move |_, args| ready(f(&service, args))
}

fn resource_handler(
    service: &Arc<ReleaseService>,
    f: ResourceFn,
) -> impl Fn(CallScope, String) -> Ready<Result<ReadResourceResult, HandlerError>> + Send + Sync + 'static {
    let service = Arc::clone(service);
    move |_, uri| ready(f(&service, uri))
}

fn prompt_handler(
    service: &Arc<ReleaseService>,
    f: PromptFn,
) -> impl Fn(CallScope, HashMap<String, String>) -> Ready<Result<GetPromptResult, HandlerError>>
       + Send
       + Sync
       + 'static {
    let service = Arc::clone(service);
    move |_, args| ready(f(&service, &args))
}

fn tool(name: &str, description: &str, input_schema: Value) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema,
        annotations: None,
    }
}

fn resource(uri: &str, name: &str, description: &str, mime_type: &str) -> ResourceDefinition {
    ResourceDefinition {
        uri: uri.to_string(),
        name: name.to_string(),
        description: Some(description.to_string()),
        mime_type: Some(mime_type.to_string()),
    }
}

/// Builds the registry of release tools, resources, and prompts.
#[must_use]
pub fn registry(service: Arc<ReleaseService>) -> Registry {
    let publisher = Arc::clone(&service);

    Registry::new()
        .tool(
            tool(
                "release_status",
                "Show the current release: version, state, commits, notes, and approver.",
                json!({"type": "object", "properties": {}}),
            ),
            ToolEffect::ReadOnly,
            tool_handler(&service, ReleaseService::status),
        )
        .tool(
            tool(
                "release_plan",
                "Plan a release with a version and its commits. Re-planning is allowed until approval.",
                json!({
                    "type": "object",
                    "properties": {
                        "version": {"type": "string", "description": "Version to release, e.g. 1.4.0"},
                        "commits": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "sha": {"type": "string"},
                                    "message": {"type": "string"},
                                    "author": {"type": "string"}
                                },
                                "required": ["sha", "message"]
                            }
                        }
                    },
                    "required": ["version"]
                }),
            ),
            ToolEffect::MutatesState,
            tool_handler(&service, ReleaseService::plan),
        )
        .tool(
            tool(
                "release_set_notes",
                "Replace the release notes of the planned release.",
                json!({
                    "type": "object",
                    "properties": {"notes": {"type": "string"}},
                    "required": ["notes"]
                }),
            ),
            ToolEffect::MutatesState,
            tool_handler(&service, ReleaseService::set_notes),
        )
        .tool(
            tool(
                "release_approve",
                "Approve the planned release. Requires release notes.",
                json!({
                    "type": "object",
                    "properties": {"approver": {"type": "string"}},
                    "required": ["approver"]
                }),
            ),
            ToolEffect::MutatesState,
            tool_handler(&service, ReleaseService::approve),
        )
        .tool(
            tool(
                "release_publish",
                "Publish the approved release. Reports progress for each stage.",
                json!({"type": "object", "properties": {}}),
            ),
            ToolEffect::MutatesState,
            move |scope, _| {
                let service = Arc::clone(&publisher);
                async move { service.publish(scope).await }
            },
        )
        .resource(
            resource(STATE_URI, "Release state", "The current release record.", "application/json"),
            resource_handler(&service, ReleaseService::read_state),
        )
        .resource(
            resource(CONFIG_URI, "Release configuration", "Repository settings.", "application/json"),
            resource_handler(&service, ReleaseService::read_config),
        )
        .resource(
            resource(
                COMMITS_URI,
                "Release commits",
                "Commits in the current release with their conventional-commit kind.",
                "application/json",
            ),
            resource_handler(&service, ReleaseService::read_commits),
        )
        .resource(
            resource(
                CHANGELOG_URI,
                "Changelog",
                "Changelog of the current release, grouped by change kind.",
                "text/markdown",
            ),
            resource_handler(&service, ReleaseService::read_changelog),
        )
        .resource(
            resource(RISK_URI, "Risk report", "Risk assessment of the current release.", "application/json"),
            resource_handler(&service, ReleaseService::read_risk),
        )
        .prompt(
            PromptDefinition {
                name: "release_announcement".to_string(),
                description: Some("Draft an announcement for the current release.".to_string()),
                arguments: vec![PromptArgument {
                    name: "audience".to_string(),
                    description: Some("Who the announcement is for (default: users)".to_string()),
                    required: false,
                }],
            },
            prompt_handler(&service, ReleaseService::announcement),
        )
        .prompt(
            PromptDefinition {
                name: "risk_review".to_string(),
                description: Some("Review the risk of the current release before approval.".to_string()),
                arguments: Vec::new(),
            },
            prompt_handler(&service, ReleaseService::risk_review),
        )
}
