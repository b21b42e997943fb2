use anyhow::Result;
use std::collections::HashMap;
use std::future::Future;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::event::{self, EventPayload, ResourceContext};
use crate::github::{GitHubClient, IssueOps, IssueState, REACTION_CONTENT};
use crate::labels;
use crate::rules::{ActionSet, RuleSet};
use crate::template;

/// Process one label event end to end: validate, resolve the rules, dispatch.
///
/// Events other than issue/pull-request labeled/unlabeled terminate here with
/// no effect.
pub async fn run(client: &GitHubClient, config: &Config) -> Result<()> {
    let payload = EventPayload::load(&config.event_path)?;

    if !event::is_label_event(&config.event_name, &payload) {
        info!(
            "Ignoring event {} / {:?}",
            config.event_name, payload.action
        );
        return Ok(());
    }

    let Some(label) = effective_label(&payload) else {
        warn!("Label event without a label payload, nothing to do");
        return Ok(());
    };
    let Some((kind, resource_payload)) = payload.resource() else {
        warn!("Label event without an issue or pull request payload, nothing to do");
        return Ok(());
    };
    let resource = ResourceContext::new(kind, resource_payload);

    let raw = match config.config_file.as_deref() {
        Some(path) => client.get_file_content(path).await?,
        None => None,
    };
    let rules = RuleSet::from_overrides(raw.as_deref())?;
    let actions = rules.resolve(kind, &label);

    info!("Resolved actions for label '{}': {:?}", label, actions);

    dispatch(client, &resource, &actions).await
}

/// The label key to resolve: the event's label name, `-`-prefixed when the
/// label was removed.
pub fn effective_label(payload: &EventPayload) -> Option<String> {
    let name = &payload.label.as_ref()?.name;
    if payload.action.as_deref() == Some("unlabeled") {
        Some(format!("-{}", name))
    } else {
        Some(name.clone())
    }
}

fn enabled(flag: Option<bool>) -> bool {
    flag.unwrap_or(false)
}

/// Execute the resolved action set against one resource, in fixed order.
///
/// Each step is gated by its flag and by the snapshot state; a step whose
/// precondition does not hold is skipped silently. Reaction attachments and
/// label removals are best-effort siblings; everything else propagates its
/// failure.
pub async fn dispatch<O>(ops: &O, resource: &ResourceContext, actions: &ActionSet) -> Result<()>
where
    O: IssueOps + ?Sized,
{
    if enabled(actions.pin) {
        ops.set_pinned(&resource.node_id, true).await?;
    }

    if enabled(actions.unpin) {
        ops.set_pinned(&resource.node_id, false).await?;
    }

    if let Some(candidates) = &actions.comment {
        let mut vars = HashMap::new();
        vars.insert("author", resource.author.clone());

        if let Some(body) = template::pick_comment(candidates, &vars) {
            with_unlock(ops, resource, || async move {
                let comment_id = ops.create_comment(resource.number, &body).await?;

                if let Some(reactions) = &actions.reactions {
                    for content in reactions.as_slice() {
                        if !REACTION_CONTENT.contains(&content.as_str()) {
                            warn!("Skipping unknown reaction content '{}'", content);
                            continue;
                        }
                        if let Err(e) = ops.add_reaction(comment_id, content).await {
                            warn!("Failed to add reaction '{}': {:#}", content, e);
                        }
                    }
                }

                Ok(())
            })
            .await?;
        }
    }

    if enabled(actions.open) && !resource.open {
        ops.set_state(resource.number, IssueState::Open).await?;
    }

    if enabled(actions.close) && resource.open {
        ops.set_state(resource.number, IssueState::Closed).await?;
    }

    if enabled(actions.lock) && !resource.locked {
        ops.lock(resource.number, actions.lock_reason.as_deref())
            .await?;
    }

    if enabled(actions.unlock) && resource.locked {
        ops.unlock(resource.number).await?;
    }

    if let Some(spec) = &actions.labels {
        let (to_add, to_remove) = labels::split_labels(spec);

        if !to_add.is_empty() {
            ops.add_labels(resource.number, &to_add).await?;
        }

        for name in &to_remove {
            // Removing a label that is already absent must not fail the rest.
            if let Err(e) = ops.remove_label(resource.number, name).await {
                warn!("Failed to remove label '{}': {:#}", name, e);
            }
        }
    }

    Ok(())
}

/// Run `inner` with the thread temporarily unlocked.
///
/// If the snapshot says the resource is locked: capture the lock reason,
/// unlock, run `inner`, then always attempt to restore the lock with the
/// captured reason — even when `inner` failed. The inner failure is
/// re-surfaced afterwards; a failed re-lock on an otherwise clean run is
/// itself an error. An unlocked resource runs `inner` directly.
pub async fn with_unlock<O, F, Fut>(ops: &O, resource: &ResourceContext, inner: F) -> Result<()>
where
    O: IssueOps + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    if !resource.locked {
        return inner().await;
    }

    let reason = resource.lock_reason.clone();
    ops.unlock(resource.number).await?;

    let result = inner().await;

    if let Err(e) = ops.lock(resource.number, reason.as_deref()).await {
        error!(
            "Failed to restore lock on issue #{}: {:#}",
            resource.number, e
        );
        if result.is_ok() {
            return Err(e);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ResourceKind;
    use crate::rules::OneOrMany;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        SetState(u64, IssueState),
        Lock(u64, Option<String>),
        Unlock(u64),
        CreateComment(u64, String),
        AddReaction(u64, String),
        AddLabels(u64, Vec<String>),
        RemoveLabel(u64, String),
        SetPinned(String, bool),
    }

    #[derive(Default)]
    struct MockOps {
        calls: Mutex<Vec<Call>>,
        fail_comment: bool,
        fail_reactions: bool,
        fail_remove_label: bool,
        fail_lock: bool,
    }

    impl MockOps {
        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl IssueOps for MockOps {
        async fn set_state(&self, number: u64, state: IssueState) -> Result<()> {
            self.record(Call::SetState(number, state));
            Ok(())
        }

        async fn lock(&self, number: u64, reason: Option<&str>) -> Result<()> {
            self.record(Call::Lock(number, reason.map(|r| r.to_string())));
            if self.fail_lock {
                return Err(anyhow!("lock failed"));
            }
            Ok(())
        }

        async fn unlock(&self, number: u64) -> Result<()> {
            self.record(Call::Unlock(number));
            Ok(())
        }

        async fn create_comment(&self, number: u64, body: &str) -> Result<u64> {
            self.record(Call::CreateComment(number, body.to_string()));
            if self.fail_comment {
                return Err(anyhow!("comment failed"));
            }
            Ok(1001)
        }

        async fn add_reaction(&self, comment_id: u64, content: &str) -> Result<()> {
            self.record(Call::AddReaction(comment_id, content.to_string()));
            if self.fail_reactions {
                return Err(anyhow!("reaction failed"));
            }
            Ok(())
        }

        async fn add_labels(&self, number: u64, labels: &[String]) -> Result<()> {
            self.record(Call::AddLabels(number, labels.to_vec()));
            Ok(())
        }

        async fn remove_label(&self, number: u64, name: &str) -> Result<()> {
            self.record(Call::RemoveLabel(number, name.to_string()));
            if self.fail_remove_label {
                return Err(anyhow!("label not present"));
            }
            Ok(())
        }

        async fn set_pinned(&self, node_id: &str, pinned: bool) -> Result<()> {
            self.record(Call::SetPinned(node_id.to_string(), pinned));
            Ok(())
        }
    }

    fn issue(open: bool, locked: bool, lock_reason: Option<&str>) -> ResourceContext {
        ResourceContext {
            kind: ResourceKind::Issue,
            number: 7,
            open,
            locked,
            lock_reason: lock_reason.map(|r| r.to_string()),
            author: "alice".to_string(),
            node_id: "I_abc123".to_string(),
        }
    }

    #[tokio::test]
    async fn test_heated_label_comments_reacts_and_locks() {
        let ops = MockOps::default();
        let resource = issue(true, false, None);
        let actions = RuleSet::defaults().resolve(ResourceKind::Issue, "heated");

        dispatch(&ops, &resource, &actions).await.unwrap();

        let calls = ops.calls();
        assert_eq!(calls.len(), 4);
        match &calls[0] {
            Call::CreateComment(7, body) => assert!(body.contains("temporarily locked")),
            other => panic!("expected comment first, got {:?}", other),
        }
        assert_eq!(calls[1], Call::AddReaction(1001, "eyes".to_string()));
        assert_eq!(calls[2], Call::AddReaction(1001, "heart".to_string()));
        assert_eq!(calls[3], Call::Lock(7, Some("too heated".to_string())));
    }

    #[tokio::test]
    async fn test_heated_removed_unlocks_without_comment() {
        let ops = MockOps::default();
        let resource = issue(true, true, Some("too heated"));
        let actions = RuleSet::defaults().resolve(ResourceKind::Issue, "-heated");

        dispatch(&ops, &resource, &actions).await.unwrap();

        assert_eq!(ops.calls(), vec![Call::Unlock(7)]);
    }

    #[tokio::test]
    async fn test_wontfix_removed_reopens_closed_issue() {
        let ops = MockOps::default();
        let resource = issue(false, false, None);
        let actions = RuleSet::defaults().resolve(ResourceKind::Issue, "-wontfix");

        dispatch(&ops, &resource, &actions).await.unwrap();

        assert_eq!(ops.calls(), vec![Call::SetState(7, IssueState::Open)]);
    }

    #[tokio::test]
    async fn test_feature_label_substitutes_author_then_closes() {
        let ops = MockOps::default();
        let resource = issue(true, false, None);
        let actions = RuleSet::defaults().resolve(ResourceKind::Issue, "feature");

        dispatch(&ops, &resource, &actions).await.unwrap();

        let calls = ops.calls();
        assert_eq!(calls.len(), 2);
        match &calls[0] {
            Call::CreateComment(7, body) => {
                assert!(body.contains("alice"));
                assert!(!body.contains("${"));
            }
            other => panic!("expected comment first, got {:?}", other),
        }
        assert_eq!(calls[1], Call::SetState(7, IssueState::Closed));
    }

    #[tokio::test]
    async fn test_comment_on_locked_issue_restores_original_reason() {
        let ops = MockOps::default();
        let resource = issue(true, true, Some("spam"));
        let actions = ActionSet {
            comment: Some(OneOrMany::One("hello".to_string())),
            ..Default::default()
        };

        dispatch(&ops, &resource, &actions).await.unwrap();

        assert_eq!(
            ops.calls(),
            vec![
                Call::Unlock(7),
                Call::CreateComment(7, "hello".to_string()),
                Call::Lock(7, Some("spam".to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn test_relock_runs_even_when_comment_fails() {
        let ops = MockOps {
            fail_comment: true,
            ..Default::default()
        };
        let resource = issue(true, true, Some("spam"));
        let actions = ActionSet {
            comment: Some(OneOrMany::One("hello".to_string())),
            ..Default::default()
        };

        let result = dispatch(&ops, &resource, &actions).await;
        assert!(result.is_err());

        let calls = ops.calls();
        assert_eq!(calls[0], Call::Unlock(7));
        assert_eq!(
            calls.last(),
            Some(&Call::Lock(7, Some("spam".to_string())))
        );
    }

    #[tokio::test]
    async fn test_failed_relock_surfaces_on_clean_run() {
        let ops = MockOps {
            fail_lock: true,
            ..Default::default()
        };
        let resource = issue(true, true, Some("spam"));

        let result = with_unlock(&ops, &resource, || async { Ok(()) }).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_reaction_failure_is_best_effort() {
        let ops = MockOps {
            fail_reactions: true,
            ..Default::default()
        };
        let resource = issue(true, false, None);
        let actions = RuleSet::defaults().resolve(ResourceKind::Issue, "heated");

        dispatch(&ops, &resource, &actions).await.unwrap();

        // Both reactions attempted, and the lock still applied afterwards.
        let calls = ops.calls();
        assert_eq!(calls[1], Call::AddReaction(1001, "eyes".to_string()));
        assert_eq!(calls[2], Call::AddReaction(1001, "heart".to_string()));
        assert_eq!(calls[3], Call::Lock(7, Some("too heated".to_string())));
    }

    #[tokio::test]
    async fn test_unknown_reaction_content_is_skipped() {
        let ops = MockOps::default();
        let resource = issue(true, false, None);
        let actions = ActionSet {
            comment: Some(OneOrMany::One("hi".to_string())),
            reactions: Some(OneOrMany::Many(vec![
                "sparkles".to_string(),
                "eyes".to_string(),
            ])),
            ..Default::default()
        };

        dispatch(&ops, &resource, &actions).await.unwrap();

        let calls = ops.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1], Call::AddReaction(1001, "eyes".to_string()));
    }

    #[tokio::test]
    async fn test_state_preconditions_skip_silently() {
        let ops = MockOps::default();
        // Already closed: close is a no-op. Already unlocked: unlock too.
        let resource = issue(false, false, None);
        let actions = ActionSet {
            close: Some(true),
            unlock: Some(true),
            ..Default::default()
        };

        dispatch(&ops, &resource, &actions).await.unwrap();
        assert!(ops.calls().is_empty());
    }

    #[tokio::test]
    async fn test_lock_skipped_when_already_locked() {
        let ops = MockOps::default();
        let resource = issue(true, true, Some("resolved"));
        let actions = ActionSet {
            lock: Some(true),
            lock_reason: Some("too heated".to_string()),
            ..Default::default()
        };

        dispatch(&ops, &resource, &actions).await.unwrap();
        assert!(ops.calls().is_empty());
    }

    #[tokio::test]
    async fn test_false_flags_are_inert() {
        let ops = MockOps::default();
        let resource = issue(true, false, None);
        let actions = ActionSet {
            close: Some(false),
            pin: Some(false),
            ..Default::default()
        };

        dispatch(&ops, &resource, &actions).await.unwrap();
        assert!(ops.calls().is_empty());
    }

    #[tokio::test]
    async fn test_labels_batched_add_and_individual_removes() {
        let ops = MockOps {
            fail_remove_label: true,
            ..Default::default()
        };
        let resource = issue(true, false, None);
        let actions = ActionSet {
            labels: Some(OneOrMany::One("-triage bug -stale confirmed".to_string())),
            ..Default::default()
        };

        // Removal failures (label already absent) do not fail the dispatch.
        dispatch(&ops, &resource, &actions).await.unwrap();

        assert_eq!(
            ops.calls(),
            vec![
                Call::AddLabels(7, vec!["bug".to_string(), "confirmed".to_string()]),
                Call::RemoveLabel(7, "triage".to_string()),
                Call::RemoveLabel(7, "stale".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_pin_and_unpin_dispatch_first() {
        let ops = MockOps::default();
        let resource = issue(true, false, None);
        let actions = ActionSet {
            pin: Some(true),
            comment: Some(OneOrMany::One("pinned!".to_string())),
            ..Default::default()
        };

        dispatch(&ops, &resource, &actions).await.unwrap();

        let calls = ops.calls();
        assert_eq!(calls[0], Call::SetPinned("I_abc123".to_string(), true));
        assert!(matches!(calls[1], Call::CreateComment(7, _)));
    }

    #[test]
    fn test_effective_label_negates_on_unlabeled() {
        let labeled: EventPayload = serde_json::from_value(json!({
            "action": "labeled",
            "label": { "name": "heated" }
        }))
        .unwrap();
        assert_eq!(effective_label(&labeled).as_deref(), Some("heated"));

        let unlabeled: EventPayload = serde_json::from_value(json!({
            "action": "unlabeled",
            "label": { "name": "heated" }
        }))
        .unwrap();
        assert_eq!(effective_label(&unlabeled).as_deref(), Some("-heated"));

        let missing: EventPayload = serde_json::from_value(json!({
            "action": "labeled"
        }))
        .unwrap();
        assert_eq!(effective_label(&missing), None);
    }
}
