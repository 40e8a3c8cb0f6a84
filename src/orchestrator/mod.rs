//! The session execution loop.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::config::{environment_snapshot, OrchestratorSettings};
use crate::error::{ConfabError, Result};
use crate::extract;
use crate::hub::ToolHub;
use crate::llm::CompletionProvider;
use crate::role::{compose_system_prompt, RoleProvider};
use crate::session::{
    Message, Session, SessionStore, ToolCallOutcome, ToolCallRecord, ToolCallStatus,
};

/// Drives one conversational session: user input in, completion out, tool
/// calls dispatched in between.
///
/// The session is an explicit owned value held by exactly one orchestrator;
/// there is no ambient current-session singleton, so several sessions can
/// coexist in one process behind separate orchestrators.
pub struct SessionOrchestrator {
    provider: Arc<dyn CompletionProvider>,
    hub: ToolHub,
    store: Option<SessionStore>,
    roles: Option<Arc<dyn RoleProvider>>,
    settings: OrchestratorSettings,
    session: Option<Session>,
}

impl SessionOrchestrator {
    pub fn new(provider: Arc<dyn CompletionProvider>, hub: ToolHub) -> Self {
        Self {
            provider,
            hub,
            store: None,
            roles: None,
            settings: OrchestratorSettings::default(),
            session: None,
        }
    }

    /// Persist snapshots through this store after every session mutation.
    pub fn with_store(mut self, store: SessionStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_roles(mut self, roles: Arc<dyn RoleProvider>) -> Self {
        self.roles = Some(roles);
        self
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn active_session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn hub(&self) -> &ToolHub {
        &self.hub
    }

    /// Begin a new session. Fails with `SessionExists` while one is active.
    pub fn start_session(
        &mut self,
        id: Option<String>,
        system_prompt: impl Into<String>,
    ) -> Result<&Session> {
        if let Some(active) = &self.session {
            return Err(ConfabError::SessionExists(active.id.clone()));
        }

        let session =
            Session::new(id, system_prompt).with_environment(environment_snapshot());
        tracing::debug!(session_id = %session.id, "session started");
        self.persist(&session);
        Ok(&*self.session.insert(session))
    }

    /// End the active session and hand it back. The persisted snapshot
    /// survives.
    pub fn end_session(&mut self) -> Result<Session> {
        let session = self.session.take().ok_or(ConfabError::NoActiveSession)?;
        tracing::debug!(session_id = %session.id, "session ended");
        Ok(session)
    }

    /// Reconstruct a session from a snapshot file or append-only log and
    /// make it active.
    pub fn resume_session(&mut self, path_or_id: &str) -> Result<&Session> {
        if let Some(active) = &self.session {
            return Err(ConfabError::SessionExists(active.id.clone()));
        }
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| ConfabError::InvalidState("no session store configured".into()))?;

        let session = store.resume(path_or_id)?;
        tracing::debug!(session_id = %session.id, "session resumed");
        Ok(&*self.session.insert(session))
    }

    /// Execute one user message: complete, dispatch at most one tool call
    /// per reply, fold the result back, and repeat until the model stops
    /// requesting tools. Returns the final reply text.
    ///
    /// The active session is mutated in place, one completed step at a
    /// time. A caller that abandons the returned future mid-turn (drops it
    /// inside a `select!` or timeout) keeps the session, with the
    /// transcript as of the last completed step.
    pub async fn execute_message(&mut self, input: impl Into<String>) -> Result<String> {
        let Self {
            provider,
            hub,
            store,
            settings,
            session,
            ..
        } = self;
        let session = session.as_mut().ok_or(ConfabError::NoActiveSession)?;

        session.messages.push(Message::user(input.into()));
        persist_snapshot(store.as_ref(), session);

        let mut tool_turns = 0usize;
        loop {
            // Nothing is appended for a failed or contentless completion;
            // the turn ends with the transcript as of the last step.
            let completion = provider.process_message(session).await?;

            let text = match completion.content.text.filter(|t| !t.trim().is_empty()) {
                Some(text) => text,
                None => {
                    return Err(ConfabError::InvalidResponse(format!(
                        "completion {} has no textual content",
                        completion.id
                    )));
                }
            };

            session.messages.push(Message::assistant(text.as_str()));
            persist_snapshot(store.as_ref(), session);

            // Extra invocation blocks in the same reply are ignored: one
            // tool call per turn bounds the loop to a single continuation.
            let Some(request) = extract::first_tool_request(&text) else {
                return Ok(text);
            };

            tool_turns += 1;
            if tool_turns > settings.max_tool_turns {
                tracing::warn!(
                    session_id = %session.id,
                    limit = settings.max_tool_turns,
                    "tool turn limit reached"
                );
                session.messages.push(Message::system(format!(
                    "Tool dispatch stopped: turn limit of {} reached.",
                    settings.max_tool_turns
                )));
                persist_snapshot(store.as_ref(), session);
                return Ok(text);
            }

            tracing::debug!(
                session_id = %session.id,
                server = %request.server_name,
                tool = %request.tool_name,
                "dispatching tool call"
            );

            let invoked_at = Utc::now();
            let started = Instant::now();
            let outcome = match hub
                .call_tool(
                    &request.server_name,
                    &request.tool_name,
                    request.arguments.clone(),
                )
                .await
            {
                Ok(output) => ToolCallOutcome {
                    status: ToolCallStatus::Success,
                    output,
                    duration_ms: started.elapsed().as_millis() as u64,
                },
                // Dispatch failures fold into the transcript; the session
                // survives and the model sees what went wrong.
                Err(err) => {
                    if err.is_tool_failure() {
                        tracing::debug!(session_id = %session.id, error = %err, "tool call failed");
                    } else {
                        tracing::warn!(session_id = %session.id, error = %err, "tool dispatch error");
                    }
                    ToolCallOutcome {
                        status: ToolCallStatus::Failure,
                        output: serde_json::json!({
                            "error": err.to_string(),
                            "code": err.code(),
                        }),
                        duration_ms: started.elapsed().as_millis() as u64,
                    }
                }
            };

            let content = render_tool_reply(&request.server_name, &request.tool_name, &outcome);
            let record = ToolCallRecord {
                tool_name: request.tool_name,
                arguments: request.arguments,
                invoked_at,
                result: outcome,
            };
            session.messages.push(Message::tool_reply(content, record));
            persist_snapshot(store.as_ref(), session);
        }
    }

    /// Switch the session to a role: narrow the hub to the role's server
    /// allow-list, rebuild the system prompt, and update role metadata.
    pub async fn select_role(&mut self, name: &str) -> Result<()> {
        if self.session.is_none() {
            return Err(ConfabError::NoActiveSession);
        }
        let roles = self
            .roles
            .as_ref()
            .ok_or_else(|| ConfabError::InvalidState("no role provider configured".into()))?;
        let role = roles.resolve(name)?;

        if let Some(allowed) = &role.allowed_servers {
            self.hub.restrict_to(allowed).await;
        }

        let prompt = compose_system_prompt(&role, self.hub.catalog());
        let session = self
            .session
            .take()
            .ok_or(ConfabError::NoActiveSession)?
            .with_system_prompt(prompt)
            .with_role(role.name.clone());
        tracing::debug!(session_id = %session.id, role = %role.name, "role selected");
        self.persist(&session);
        self.session = Some(session);
        Ok(())
    }

    /// Stop all tool servers. Call when the orchestrator is retired.
    pub async fn shutdown(&mut self) {
        self.hub.shutdown().await;
    }

    fn persist(&self, session: &Session) {
        persist_snapshot(self.store.as_ref(), session);
    }
}

/// Snapshot durability is best-effort inside a turn: a failed write is
/// logged, the conversation keeps going.
fn persist_snapshot(store: Option<&SessionStore>, session: &Session) {
    if let Some(store) = store {
        if let Err(err) = store.save(session) {
            tracing::warn!(session_id = %session.id, error = %err, "session snapshot failed");
        }
    }
}

fn render_tool_reply(server: &str, tool: &str, outcome: &ToolCallOutcome) -> String {
    let payload =
        serde_json::to_string_pretty(&outcome.output).unwrap_or_else(|_| outcome.output.to_string());
    format!("[{} result from {server}/{tool}]\n{payload}", outcome.status)
}
