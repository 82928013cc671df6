//! Step-progression engine.
//!
//! Per (learner, project) the engine is a state machine over step positions
//! `1..=N` plus a terminal COMPLETE state at `N + 1`. The only transition is
//! `position -> position + 1`, taken on a PASS verdict at that position.

use std::sync::Arc;

use stepwise_ai::{HintRequest, Judge, ReasoningError, ReasoningService, TutorGenerator};
use stepwise_core::{LearnerId, Progress, ProjectId, Reply, Step, StepwiseConfig, Tier};
use stepwise_quality::{PatternError, SafetyFilter};
use stepwise_storage::{LearnerStore, ProgressStore, ProjectCatalog, StorageError};
use tracing::{debug, info, warn};

/// Reply once every step of a project has been passed.
pub const COMPLETION_MESSAGE: &str = "CONGRATULATIONS! You have completed all steps for this project. Feel free to experiment with the code now.";

/// Errors surfaced to the request-handling layer.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The project ID does not resolve
    #[error("Project not found: {0}")]
    ProjectNotFound(ProjectId),

    /// No hint could be generated; there is no safe substitute
    #[error("The tutor is unavailable right now, please try again")]
    TutorUnavailable(#[source] ReasoningError),

    /// Progress could not be read or written
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Reply text for a passed step.
pub fn unlock_reply(language: &str, unlock_code: &str, next: Option<&Step>) -> String {
    let preview = match next {
        Some(step) => format!("Next Step: {}. {}", step.title, step.required_concept),
        None => "Project Complete!".to_string(),
    };
    format!(
        "**Correct!**\n\nHere is the implementation:\n```{}\n{}\n```\n\n{}",
        language, unlock_code, preview
    )
}

/// Orchestrates judge, tutor, and safety filter around the progress store.
pub struct ProgressionEngine {
    catalog: Arc<dyn ProjectCatalog>,
    progress: Arc<dyn ProgressStore>,
    learners: Arc<dyn LearnerStore>,
    judge: Judge,
    tutor: TutorGenerator,
    safety: SafetyFilter,
}

impl ProgressionEngine {
    /// Create an engine from its collaborators.
    pub fn new(
        catalog: Arc<dyn ProjectCatalog>,
        progress: Arc<dyn ProgressStore>,
        learners: Arc<dyn LearnerStore>,
        judge: Judge,
        tutor: TutorGenerator,
        safety: SafetyFilter,
    ) -> Self {
        Self {
            catalog,
            progress,
            learners,
            judge,
            tutor,
            safety,
        }
    }

    /// Wire an engine over one storage backend and one reasoning service.
    pub fn from_config<S>(
        storage: Arc<S>,
        service: Arc<dyn ReasoningService>,
        config: &StepwiseConfig,
    ) -> Result<Self, PatternError>
    where
        S: ProjectCatalog + ProgressStore + LearnerStore + 'static,
    {
        Ok(Self::new(
            storage.clone(),
            storage.clone(),
            storage,
            Judge::new(service.clone(), config.judge.clone()),
            TutorGenerator::new(service, config.tutor.clone()),
            SafetyFilter::new(&config.safety)?,
        ))
    }

    /// Handle one learner message for one project.
    ///
    /// Progress is advanced by exactly one step on PASS and never otherwise.
    /// Judge failures count as FAIL.
    pub async fn handle_message(
        &self,
        learner_id: LearnerId,
        project_id: ProjectId,
        message: &str,
    ) -> Result<Reply, EngineError> {
        let project = self
            .catalog
            .get_project(project_id)
            .await?
            .ok_or(EngineError::ProjectNotFound(project_id))?;

        let progress = match self.progress.get_progress(learner_id, project_id).await? {
            Some(progress) => progress,
            None => {
                info!("Learner {} starting project {}", learner_id, project.title);
                self.progress.create_progress(learner_id, project_id).await?
            }
        };

        let Some(step) = project.step(progress.current_step) else {
            debug!("Learner {} already completed {}", learner_id, project.title);
            return Ok(Reply::new(COMPLETION_MESSAGE));
        };

        debug!("Checking logic for step {}: {}", step.position, step.title);
        let verdict = self.judge.judge(&step.required_concept, message).await;

        if verdict.is_pass() {
            self.advance(&progress).await?;
            let next = project.step(step.position + 1);
            info!(
                "Learner {} passed step {} of {}",
                learner_id, step.position, project.title
            );
            return Ok(Reply::new(unlock_reply(
                &project.language,
                &step.unlock_code,
                next,
            )));
        }

        let proficiency = self.proficiency(learner_id).await;
        let raw = self
            .tutor
            .generate_hint(&HintRequest {
                project_title: &project.title,
                step_position: step.position,
                step_title: &step.title,
                concept: &step.required_concept,
                user_message: message,
                proficiency,
            })
            .await
            .map_err(|e| {
                warn!("Tutor unavailable for step {}: {}", step.position, e);
                EngineError::TutorUnavailable(e)
            })?;

        Ok(Reply::new(self.safety.sanitize(&raw, &step.required_concept)))
    }

    /// Advance once. A conflict means a concurrent request for the same
    /// learner and project already advanced past this step.
    async fn advance(&self, progress: &Progress) -> Result<(), EngineError> {
        match self.progress.advance(progress).await {
            Ok(advanced) => {
                debug!("Progress now at step {}", advanced.current_step);
                Ok(())
            }
            Err(StorageError::Conflict { expected, found, .. }) => {
                warn!(
                    "Step {} already advanced concurrently (now at {}), not advancing again",
                    expected, found
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn proficiency(&self, learner_id: LearnerId) -> Option<Tier> {
        match self.learners.get_learner(learner_id).await {
            Ok(learner) => learner.and_then(|l| l.proficiency),
            Err(e) => {
                warn!("Could not load learner {}: {}", learner_id, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use stepwise_ai::testing::ScriptedReasoning;
    use stepwise_core::config::{default_judge, default_tutor};
    use stepwise_core::{Project, SafetyConfig, StepDraft, Tier};
    use stepwise_quality::fallback_message;
    use stepwise_storage::MemoryStorage;

    struct Harness {
        storage: Arc<MemoryStorage>,
        judge: Arc<ScriptedReasoning>,
        tutor: Arc<ScriptedReasoning>,
        engine: ProgressionEngine,
        project: Project,
        learner: LearnerId,
    }

    fn step(title: &str, concept: &str, code: &str) -> StepDraft {
        StepDraft {
            title: title.to_string(),
            concept: concept.to_string(),
            code: code.to_string(),
        }
    }

    async fn harness_with(drafts: Vec<StepDraft>, judge: ScriptedReasoning) -> Harness {
        let storage = Arc::new(MemoryStorage::new());
        let project = Project::new("P", Tier::Beginner, "test project", drafts);
        storage.save_project(&project).await.unwrap();

        let judge = Arc::new(judge);
        let tutor = Arc::new(ScriptedReasoning::new());
        let engine = ProgressionEngine::new(
            storage.clone(),
            storage.clone(),
            storage.clone(),
            Judge::new(judge.clone(), default_judge()),
            TutorGenerator::new(tutor.clone(), default_tutor()),
            SafetyFilter::new(&SafetyConfig::default()).unwrap(),
        );

        Harness {
            storage,
            judge,
            tutor,
            engine,
            project,
            learner: LearnerId::new(),
        }
    }

    async fn single_step_harness() -> Harness {
        harness_with(
            vec![step("Node", "needs a pointer to next", "class Node:\n    next = None")],
            ScriptedReasoning::new(),
        )
        .await
    }

    async fn two_step_harness() -> Harness {
        harness_with(
            vec![
                step("Node", "needs a pointer to next", "class Node: ..."),
                step("Queue", "head and tail pointers", "class Queue: ..."),
            ],
            ScriptedReasoning::new(),
        )
        .await
    }

    impl Harness {
        async fn position(&self) -> Option<u32> {
            self.storage
                .get_progress(self.learner, self.project.id)
                .await
                .unwrap()
                .map(|p| p.current_step)
        }

        async fn send(&self, message: &str) -> Result<Reply, EngineError> {
            self.engine
                .handle_message(self.learner, self.project.id, message)
                .await
        }
    }

    #[tokio::test]
    async fn test_pass_unlocks_code_and_advances() {
        let h = single_step_harness().await;
        h.judge.push_ok("PASS");

        let reply = h.send("it needs a reference to the next item").await.unwrap();

        assert!(reply.reply.contains("class Node:\n    next = None"));
        assert!(reply.reply.starts_with("**Correct!**"));
        assert!(reply.reply.contains("```python\n"));
        assert!(reply.reply.ends_with("Project Complete!"));
        assert_eq!(h.position().await, Some(2));
        assert_eq!(h.tutor.call_count(), 0);
    }

    #[tokio::test]
    async fn test_fail_with_leaked_code_returns_fallback() {
        let h = single_step_harness().await;
        h.judge.push_ok("FAIL");
        h.tutor.push_ok("Here is code:\n```\nclass X: pass\n```");

        let reply = h.send("give me the code").await.unwrap();

        assert_eq!(reply.reply, fallback_message("needs a pointer to next"));
        assert_eq!(h.position().await, Some(1));
    }

    #[tokio::test]
    async fn test_complete_project_short_circuits() {
        let h = single_step_harness().await;
        let progress = h
            .storage
            .create_progress(h.learner, h.project.id)
            .await
            .unwrap();
        h.storage.advance(&progress).await.unwrap();
        h.judge.push_ok("PASS");
        h.tutor.push_ok("hint");

        for message in ["anything", "PASS", ""] {
            let reply = h.send(message).await.unwrap();
            assert_eq!(reply.reply, COMPLETION_MESSAGE);
        }

        assert_eq!(h.position().await, Some(2));
        assert_eq!(h.judge.call_count(), 0);
        assert_eq!(h.tutor.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_project() {
        let h = single_step_harness().await;
        let missing = ProjectId::new();

        let err = h
            .engine
            .handle_message(h.learner, missing, "hello")
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::ProjectNotFound(id) if id == missing));
        assert!(h
            .storage
            .get_progress(h.learner, missing)
            .await
            .unwrap()
            .is_none());
        assert_eq!(h.judge.call_count(), 0);
    }

    #[tokio::test]
    async fn test_first_message_initializes_progress() {
        let h = single_step_harness().await;
        h.judge.push_ok("FAIL");
        h.tutor.push_ok("What should each node remember?");

        assert_eq!(h.position().await, None);
        let reply = h.send("hi").await.unwrap();

        assert_eq!(reply.reply, "What should each node remember?");
        assert_eq!(h.position().await, Some(1));
    }

    #[tokio::test]
    async fn test_walk_through_project() {
        let h = two_step_harness().await;
        h.judge.push_ok("PASS");
        h.judge.push_ok("pass");

        let first = h.send("a node points to the next one").await.unwrap();
        assert!(first.reply.contains("class Node: ..."));
        assert!(first
            .reply
            .ends_with("Next Step: Queue. head and tail pointers"));
        assert_eq!(h.position().await, Some(2));

        let second = h.send("track head and tail").await.unwrap();
        assert!(second.reply.contains("class Queue: ..."));
        assert!(second.reply.ends_with("Project Complete!"));
        assert_eq!(h.position().await, Some(3));

        let third = h.send("what now?").await.unwrap();
        assert_eq!(third.reply, COMPLETION_MESSAGE);
        assert_eq!(h.position().await, Some(3));
        assert_eq!(h.judge.call_count(), 2);
    }

    #[tokio::test]
    async fn test_judge_failure_is_fail_then_recovers() {
        let h = single_step_harness().await;
        h.judge.push_err(ReasoningError::Api {
            status: 503,
            body: "overloaded".to_string(),
        });
        h.tutor.push_ok("Which field links one node to another?");
        h.judge.push_ok("PASS");

        let reply = h.send("it needs a reference to the next item").await.unwrap();
        assert_eq!(reply.reply, "Which field links one node to another?");
        assert_eq!(h.position().await, Some(1));

        let retry = h.send("it needs a reference to the next item").await.unwrap();
        assert!(retry.reply.contains("**Correct!**"));
        assert_eq!(h.position().await, Some(2));
    }

    /// Progress store whose reads or advances fail.
    struct BrokenProgress {
        inner: Arc<MemoryStorage>,
        fail_reads: bool,
        fail_advance: bool,
    }

    #[async_trait::async_trait]
    impl ProgressStore for BrokenProgress {
        async fn get_progress(
            &self,
            learner_id: LearnerId,
            project_id: ProjectId,
        ) -> stepwise_storage::Result<Option<Progress>> {
            if self.fail_reads {
                return Err(StorageError::Other("disk unavailable".to_string()));
            }
            self.inner.get_progress(learner_id, project_id).await
        }

        async fn create_progress(
            &self,
            learner_id: LearnerId,
            project_id: ProjectId,
        ) -> stepwise_storage::Result<Progress> {
            self.inner.create_progress(learner_id, project_id).await
        }

        async fn advance(&self, progress: &Progress) -> stepwise_storage::Result<Progress> {
            if self.fail_advance {
                return Err(StorageError::Other("disk full".to_string()));
            }
            self.inner.advance(progress).await
        }

        async fn list_for_learner(
            &self,
            learner_id: LearnerId,
        ) -> stepwise_storage::Result<Vec<Progress>> {
            self.inner.list_for_learner(learner_id).await
        }
    }

    impl Harness {
        fn with_progress_store(mut self, fail_reads: bool, fail_advance: bool) -> Self {
            let broken = Arc::new(BrokenProgress {
                inner: self.storage.clone(),
                fail_reads,
                fail_advance,
            });
            self.engine = ProgressionEngine::new(
                self.storage.clone(),
                broken,
                self.storage.clone(),
                Judge::new(self.judge.clone(), default_judge()),
                TutorGenerator::new(self.tutor.clone(), default_tutor()),
                SafetyFilter::new(&SafetyConfig::default()).unwrap(),
            );
            self
        }
    }

    #[tokio::test]
    async fn test_failed_advance_is_surfaced_without_unlock() {
        let h = single_step_harness().await.with_progress_store(false, true);
        h.judge.push_ok("PASS");

        let result = h.send("it needs a reference to the next item").await;

        match result {
            Err(EngineError::Storage(StorageError::Other(_))) => {}
            Err(other) => panic!("unexpected error: {other}"),
            Ok(reply) => panic!("unexpected reply: {}", reply.reply),
        }
        assert_eq!(h.position().await, Some(1));
        assert_eq!(h.judge.call_count(), 1);
        assert_eq!(h.tutor.call_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_progress_read_skips_judge() {
        let h = single_step_harness().await.with_progress_store(true, false);
        h.judge.push_ok("PASS");

        let err = h.send("it needs a reference to the next item").await.unwrap_err();

        assert!(matches!(err, EngineError::Storage(_)));
        assert_eq!(h.judge.call_count(), 0);
        assert_eq!(h.tutor.call_count(), 0);
        assert_eq!(h.position().await, None);
    }

    #[tokio::test]
    async fn test_from_config_wires_default_engine() {
        let storage = Arc::new(MemoryStorage::new());
        let project = Project::new(
            "P",
            Tier::Beginner,
            "test project",
            vec![step("Node", "needs a pointer to next", "class Node: ...")],
        );
        storage.save_project(&project).await.unwrap();
        let service = Arc::new(ScriptedReasoning::replying("PASS"));

        let engine =
            ProgressionEngine::from_config(storage.clone(), service, &StepwiseConfig::default())
                .unwrap();
        let reply = engine
            .handle_message(LearnerId::new(), project.id, "a node points to the next one")
            .await
            .unwrap();

        assert!(reply.reply.contains("class Node: ..."));
    }

    #[tokio::test]
    async fn test_tutor_failure_is_surfaced() {
        let h = single_step_harness().await;
        h.judge.push_ok("FAIL");
        h.tutor.push_err(ReasoningError::EmptyResponse);

        let err = h.send("help").await.unwrap_err();

        assert!(matches!(err, EngineError::TutorUnavailable(_)));
        assert_eq!(h.position().await, Some(1));
    }

    #[tokio::test]
    async fn test_tutor_output_headers_stripped() {
        let h = single_step_harness().await;
        h.judge.push_ok("FAIL");
        h.tutor
            .push_ok("Instructions:\nA node remembers its successor.\nWhat would the last one hold?");

        let reply = h.send("not sure").await.unwrap();
        assert_eq!(
            reply.reply,
            "A node remembers its successor.\nWhat would the last one hold?"
        );
    }

    #[tokio::test]
    async fn test_learner_proficiency_selects_persona() {
        let h = single_step_harness().await;
        let learner = h.storage.register("senior@example.com").await.unwrap();
        h.storage
            .set_proficiency(learner.id, Some(Tier::Advanced))
            .await
            .unwrap();
        h.judge.push_ok("FAIL");
        h.tutor.push_ok("Edge cases?");

        h.engine
            .handle_message(learner.id, h.project.id, "no idea")
            .await
            .unwrap();

        let calls = h.tutor.calls();
        let prompt = &calls[0].prompt;
        assert!(prompt.starts_with(stepwise_ai::persona_for(Some(Tier::Advanced))));
        assert!(prompt.contains("User Message: \"no idea\""));
    }

    #[tokio::test]
    async fn test_unknown_learner_gets_guided_persona() {
        let h = single_step_harness().await;
        h.judge.push_ok("FAIL");
        h.tutor.push_ok("Think of a train.");

        h.send("no idea").await.unwrap();

        let calls = h.tutor.calls();
        let prompt = &calls[0].prompt;
        assert!(prompt.starts_with(stepwise_ai::persona_for(None)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_pass_advances_once() {
        let judge = ScriptedReasoning::new().with_delay(Duration::from_millis(50));
        judge.push_ok("PASS");
        judge.push_ok("PASS");
        let h = harness_with(
            vec![
                step("Node", "needs a pointer to next", "class Node: ..."),
                step("Queue", "head and tail pointers", "class Queue: ..."),
            ],
            judge,
        )
        .await;

        let (a, b) = tokio::join!(
            h.send("a node points to the next one"),
            h.send("a node points to the next one")
        );

        assert!(a.unwrap().reply.contains("class Node: ..."));
        assert!(b.unwrap().reply.contains("class Node: ..."));
        assert_eq!(h.position().await, Some(2));
    }

    #[test]
    fn test_unlock_reply_format() {
        let next = Step {
            position: 2,
            title: "Queue".to_string(),
            required_concept: "head and tail".to_string(),
            unlock_code: String::new(),
        };
        assert_eq!(
            unlock_reply("rust", "struct Node;", Some(&next)),
            "**Correct!**\n\nHere is the implementation:\n```rust\nstruct Node;\n```\n\nNext Step: Queue. head and tail"
        );
    }
}
