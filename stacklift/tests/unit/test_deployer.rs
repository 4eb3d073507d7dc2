//! Stack deployer unit tests

use std::sync::Arc;

use rstest::rstest;

use stacklift::deploy::deployer::{DeployerOptions, StackDeployer, StackExistence};
use stacklift::deploy::events::EventTail;
use stacklift::deploy::waiter::{WaitSettings, WaitStage};
use stacklift::errors::DeployError;
use stacklift::models::outcome::{DeployStatus, ResourceChange};
use stacklift::models::stack::{ChangeSetType, ChangesetDesiredState, StackDesiredState};

use crate::support::{event, fast_wait, stack_id, FakeControlPlane, LogCapture, StackScript};

const STACK: &str = "network";

fn options() -> DeployerOptions {
    let mut options = DeployerOptions::new(STACK, "Resources: {}\n");
    options.wait = fast_wait();
    options
}

fn deployer(client: &Arc<FakeControlPlane>, options: DeployerOptions) -> StackDeployer {
    StackDeployer::new(client.clone(), options)
}

fn bucket_change() -> ResourceChange {
    ResourceChange::new("Add", "AWS::S3::Bucket", "Bucket")
}

#[tokio::test]
async fn test_no_op_change_set_is_unchanged() {
    let client = Arc::new(FakeControlPlane::new());
    client.script(
        STACK,
        StackScript::existing("UPDATE_COMPLETE").change_set_failed(
            "The submitted information didn't contain changes. Submit different information to create a change set.",
        ),
    );

    let outcome = deployer(&client, options()).deploy().await.unwrap();

    assert_eq!(outcome.status, DeployStatus::Unchanged);
    assert!(!outcome.has_changes());
    assert_eq!(client.count(STACK, "execute_change_set"), 0);
    assert_eq!(client.requests()[0].change_set_type, ChangeSetType::Update);
}

#[tokio::test]
async fn test_create_runs_to_completion() {
    let client = Arc::new(FakeControlPlane::new());
    client.script(
        STACK,
        StackScript::absent().with_changes(vec![bucket_change()]),
    );

    let outcome = deployer(&client, options()).deploy().await.unwrap();

    assert_eq!(outcome.status, DeployStatus::ChangeSetCompleted);
    assert_eq!(outcome.change_list, vec![bucket_change()]);
    assert_eq!(outcome.to_string().lines().count(), 2);

    let request = &client.requests()[0];
    assert_eq!(request.change_set_type, ChangeSetType::Create);
    assert_eq!(request.capabilities, vec!["CAPABILITY_IAM".to_string()]);
    assert!(request.change_set_name.starts_with("network-"));
    assert_eq!(client.count(STACK, "execute_change_set"), 1);
}

#[tokio::test]
async fn test_stack_in_review_is_created() {
    let client = Arc::new(FakeControlPlane::new());
    client.script(
        STACK,
        StackScript::existing("REVIEW_IN_PROGRESS")
            .operation_statuses(&[Some("CREATE_IN_PROGRESS"), Some("CREATE_COMPLETE")]),
    );

    let deployer = deployer(&client, options());
    assert_eq!(
        deployer.resolve_existence().await.unwrap(),
        StackExistence::Absent
    );

    let outcome = deployer.deploy().await.unwrap();
    assert_eq!(outcome.status, DeployStatus::ChangeSetCompleted);
    assert_eq!(client.requests()[0].change_set_type, ChangeSetType::Create);
}

#[tokio::test]
async fn test_existing_stack_is_updated() {
    let client = Arc::new(FakeControlPlane::new());
    client.script(STACK, StackScript::existing("CREATE_COMPLETE"));

    let deployer = deployer(&client, options());
    assert_eq!(
        deployer.resolve_existence().await.unwrap(),
        StackExistence::Present {
            stack_id: stack_id(STACK),
            status: "CREATE_COMPLETE".to_string(),
        }
    );

    let outcome = deployer.deploy().await.unwrap();
    assert_eq!(outcome.status, DeployStatus::ChangeSetCompleted);
    assert_eq!(client.requests()[0].change_set_type, ChangeSetType::Update);
}

#[rstest]
#[case(ChangesetDesiredState::Created, DeployStatus::ChangeSetCreated, 0)]
#[case(ChangesetDesiredState::Executed, DeployStatus::ChangeSetExecuted, 1)]
#[case(ChangesetDesiredState::Completed, DeployStatus::ChangeSetCompleted, 1)]
#[tokio::test]
async fn test_changeset_stop_points(
    #[case] stop_at: ChangesetDesiredState,
    #[case] expected: DeployStatus,
    #[case] executions: usize,
) {
    let client = Arc::new(FakeControlPlane::new());
    client.script(
        STACK,
        StackScript::absent().with_changes(vec![bucket_change()]),
    );

    let mut options = options();
    options.changeset_desired_state = stop_at;
    let outcome = deployer(&client, options).deploy().await.unwrap();

    assert_eq!(outcome.status, expected);
    assert_eq!(outcome.change_list.len(), 1);
    assert_eq!(client.count(STACK, "execute_change_set"), executions);

    // Nothing polls the stack after an early stop
    let after_execute = client
        .calls_for(STACK)
        .into_iter()
        .skip_while(|op| *op != "execute_change_set")
        .filter(|op| *op == "describe_stack")
        .count();
    if stop_at != ChangesetDesiredState::Completed {
        assert_eq!(after_execute, 0);
    } else {
        assert!(after_execute > 0);
    }
}

#[tokio::test]
async fn test_failed_change_set() {
    let client = Arc::new(FakeControlPlane::new());
    client.script(
        STACK,
        StackScript::absent().change_set_failed("Template format error: Unresolved resource"),
    );

    let err = deployer(&client, options()).deploy().await.unwrap_err();

    match err {
        DeployError::ChangeSetFailed { status, reason } => {
            assert_eq!(status, "FAILED");
            assert!(reason.starts_with("Template format error"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(client.count(STACK, "execute_change_set"), 0);
}

#[tokio::test]
async fn test_rolled_back_update_fails() {
    let client = Arc::new(FakeControlPlane::new());
    client.script(
        STACK,
        StackScript::existing("UPDATE_COMPLETE").operation_statuses(&[
            Some("UPDATE_IN_PROGRESS"),
            Some("UPDATE_ROLLBACK_IN_PROGRESS"),
            Some("UPDATE_ROLLBACK_COMPLETE"),
        ]),
    );

    let err = deployer(&client, options()).deploy().await.unwrap_err();

    match err {
        DeployError::OperationFailed { stack, status } => {
            assert_eq!(stack, STACK);
            assert_eq!(status, "UPDATE_ROLLBACK_COMPLETE");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

/// (status, logical id) of every logged progress line, in log order
fn logged_events(logs: &LogCapture) -> Vec<(String, String)> {
    logs.lines()
        .iter()
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let at = tokens.iter().position(|token| *token == "AWS::S3::Bucket")?;
            Some((tokens[at - 1].to_string(), tokens.get(at + 1)?.to_string()))
        })
        .collect()
}

#[tokio::test]
async fn test_rollback_logs_only_new_events() {
    let client = Arc::new(FakeControlPlane::new());
    client.script(
        STACK,
        StackScript::existing("UPDATE_COMPLETE")
            .with_history(vec![
                event("h2", "UPDATE_COMPLETE", "Legacy"),
                event("h1", "UPDATE_IN_PROGRESS", "Legacy"),
            ])
            .with_progress(vec![
                event("p1", "UPDATE_IN_PROGRESS", STACK),
                event("p2", "UPDATE_FAILED", "Bucket"),
                event("p3", "UPDATE_ROLLBACK_IN_PROGRESS", STACK),
                event("p4", "UPDATE_ROLLBACK_COMPLETE", STACK),
            ])
            .operation_statuses(&[
                Some("UPDATE_IN_PROGRESS"),
                Some("UPDATE_IN_PROGRESS"),
                Some("UPDATE_ROLLBACK_IN_PROGRESS"),
                Some("UPDATE_ROLLBACK_COMPLETE"),
            ]),
    );

    let logs = LogCapture::new();
    let _guard = logs.install();
    let err = deployer(&client, options()).deploy().await.unwrap_err();

    assert!(matches!(
        err,
        DeployError::OperationFailed { ref status, .. } if status == "UPDATE_ROLLBACK_COMPLETE"
    ));
    let expected = [
        ("UPDATE_IN_PROGRESS", STACK),
        ("UPDATE_FAILED", "Bucket"),
        ("UPDATE_ROLLBACK_IN_PROGRESS", STACK),
        ("UPDATE_ROLLBACK_COMPLETE", STACK),
    ]
    .map(|(status, logical_id)| (status.to_string(), logical_id.to_string()));
    assert_eq!(logged_events(&logs), expected.to_vec());
}

#[tokio::test]
async fn test_delete_absent_stack_is_unchanged() {
    let client = Arc::new(FakeControlPlane::new());

    let mut options = options();
    options.stack_desired_state = StackDesiredState::Deleted;
    let outcome = deployer(&client, options).deploy().await.unwrap();

    assert_eq!(outcome.status, DeployStatus::Unchanged);
    assert_eq!(client.calls_for(STACK), vec!["describe_stack"]);
}

#[tokio::test]
async fn test_delete_existing_stack() {
    let client = Arc::new(FakeControlPlane::new());
    client.script(
        STACK,
        StackScript::existing("UPDATE_COMPLETE")
            .operation_statuses(&[Some("DELETE_IN_PROGRESS"), None]),
    );

    let mut options = options();
    options.stack_desired_state = StackDesiredState::Deleted;
    let outcome = deployer(&client, options).deploy().await.unwrap();

    assert_eq!(outcome.status, DeployStatus::Deleted);
    assert_eq!(client.count(STACK, "delete_stack"), 1);
    assert_eq!(client.count(STACK, "create_change_set"), 0);
}

#[tokio::test]
async fn test_delete_failure() {
    let client = Arc::new(FakeControlPlane::new());
    client.script(
        STACK,
        StackScript::existing("UPDATE_COMPLETE").operation_statuses(&[Some("DELETE_FAILED")]),
    );

    let mut options = options();
    options.stack_desired_state = StackDesiredState::Deleted;
    let err = deployer(&client, options).deploy().await.unwrap_err();

    assert!(err.to_string().contains("DELETE_FAILED"));
}

#[tokio::test(start_paused = true)]
async fn test_change_set_wait_gives_up() {
    let client = Arc::new(FakeControlPlane::new());
    client.script(
        STACK,
        StackScript::absent().change_set_statuses(&["CREATE_PENDING"]),
    );

    let mut options = options();
    options.wait = WaitSettings::default();
    let started = tokio::time::Instant::now();
    let err = deployer(&client, options).deploy().await.unwrap_err();

    match &err {
        DeployError::WaitExhausted {
            stage,
            attempts,
            last_status,
        } => {
            assert_eq!(*stage, WaitStage::ChangeSetCreate);
            assert_eq!(*attempts, 120);
            assert_eq!(last_status, "CREATE_PENDING");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(err.to_string().contains("change set creation"));
    assert_eq!(client.count(STACK, "describe_change_set"), 120);
    assert!(started.elapsed() >= std::time::Duration::from_secs(360));
    assert_eq!(client.count(STACK, "execute_change_set"), 0);
}

#[tokio::test]
async fn test_change_set_names_are_unique() {
    let client = Arc::new(FakeControlPlane::new());

    let first = deployer(&client, options());
    let second = deployer(&client, options());

    assert_ne!(first.change_set_name(), second.change_set_name());
    assert!(first.change_set_name().starts_with("network-"));
}

#[tokio::test]
async fn test_event_tail_skips_history() {
    let client = FakeControlPlane::new().with_page_size(1);
    client.script(
        STACK,
        StackScript::existing("UPDATE_COMPLETE").with_history(vec![
            event("e2", "UPDATE_COMPLETE", STACK),
            event("e1", "UPDATE_IN_PROGRESS", STACK),
        ]),
    );

    let tail = EventTail::capture(&client, STACK).await.unwrap();
    assert_eq!(tail.cursor().await.as_deref(), Some("e2"));
    assert!(tail.flush(&client, STACK).await.unwrap().is_empty());

    client.push_event(STACK, event("e3", "UPDATE_IN_PROGRESS", STACK));
    client.push_event(STACK, event("e4", "UPDATE_IN_PROGRESS", "Bucket"));
    client.push_event(STACK, event("e5", "UPDATE_COMPLETE", "Bucket"));

    let flushed = tail.flush(&client, STACK).await.unwrap();
    let ids: Vec<&str> = flushed.iter().map(|e| e.event_id.as_str()).collect();
    assert_eq!(ids, vec!["e3", "e4", "e5"]);
    assert_eq!(tail.cursor().await.as_deref(), Some("e5"));

    assert!(tail.flush(&client, STACK).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_event_tail_of_new_stack() {
    let client = FakeControlPlane::new();
    client.script(STACK, StackScript::absent());

    let tail = EventTail::capture(&client, STACK).await.unwrap();
    assert_eq!(tail.cursor().await, None);

    let fresh = EventTail::default();
    assert_eq!(fresh.cursor().await, None);
    assert!(fresh.flush(&client, "missing").await.unwrap().is_empty());
}
