//! Test: Resume - carrying completed work into a new run

use crate::helpers::*;
use greenroom::core::{HostContext, Pipeline, PipelineKind};
use greenroom::persistence::{create_summary, InMemoryPersistence, PersistenceBackend};
use greenroom::runner::RunnerError;

/// Steps completed by an earlier run are not executed again
#[tokio::test]
async fn test_resume_skips_previously_completed_steps() {
    let workdir = temp_workdir("resume-skip");
    let recipe = recipe_from_yaml(&recipe_yaml("demo", &workdir));
    let host = HostContext::with_override("nvidia");
    let store = InMemoryPersistence::new();

    // First run dies installing requirements
    let mut first = Pipeline::setup(&recipe, &host);
    let runner = MockRunner::new();
    runner.push_result(Ok(Default::default())); // clone
    runner.push_result(Ok(Default::default())); // venv
    runner.push_result(Ok(Default::default())); // torch
    runner.push_result(Err(RunnerError::NonZeroExit {
        status: "exit status: 1".to_string(),
        stderr: "connection reset by peer".to_string(),
    }));
    let result = run_pipeline(&mut first, &recipe, host.clone(), runner).await;
    assert_run_failed(&result);

    store
        .save_run(&create_summary(&result.pipeline, &result.ctx))
        .await
        .unwrap();

    // Second run adopts the completed steps and picks up at install-deps
    let last = store
        .latest_run(&recipe.name, PipelineKind::Setup)
        .await
        .unwrap()
        .unwrap();

    let mut second = Pipeline::setup(&recipe, &host);
    let adopted = second.adopt_completed(&last.completed_step_ids());
    assert_eq!(adopted, 4);

    let runner = MockRunner::new();
    let result = run_pipeline(&mut second, &recipe, host, runner.clone()).await;

    assert_run_completed(&result);
    assert_eq!(
        runner.seen_commands(),
        vec![
            "pip install -r requirements.txt".to_string(),
            "pip install bitsandbytes".to_string(),
        ]
    );
    assert_step_completed(&result, "clone-source", "carried forward");
}

/// With the reset adopted, an existing clone is left in place
#[tokio::test]
async fn test_adopted_reset_preserves_existing_clone() {
    let workdir = temp_workdir("resume-clone");
    std::fs::create_dir_all(format!("{}/.git", workdir)).unwrap();

    let recipe = recipe_from_yaml(&recipe_yaml("demo", &workdir));
    let host = HostContext::with_override("nvidia");

    let mut pipeline = Pipeline::setup(&recipe, &host);
    pipeline.adopt_completed(&["reset-workdir".to_string()]);

    let runner = MockRunner::new();
    let result = run_pipeline(&mut pipeline, &recipe, host, runner.clone()).await;

    assert_run_completed(&result);
    assert_step_completed(&result, "clone-source", "repository already present");
    assert!(!runner.seen_commands().iter().any(|c| c.starts_with("git clone")));
    assert!(std::path::Path::new(&format!("{}/.git", workdir)).exists());

    std::fs::remove_dir_all(&workdir).unwrap();
}

/// A failed step is never adopted; best effort or not, it runs again
#[tokio::test]
async fn test_failed_steps_are_not_adopted() {
    let workdir = temp_workdir("resume-failed");
    let recipe = recipe_from_yaml(&recipe_yaml("demo", &workdir));
    let host = HostContext::with_override("nvidia");

    let mut first = Pipeline::setup(&recipe, &host);
    let runner = MockRunner::new();
    runner.push_result(Err(RunnerError::NonZeroExit {
        status: "exit status: 128".to_string(),
        stderr: "fatal: early EOF".to_string(),
    }));
    let result = run_pipeline(&mut first, &recipe, host.clone(), runner).await;
    assert_run_failed(&result);

    let summary = create_summary(&result.pipeline, &result.ctx);
    let completed = summary.completed_step_ids();
    assert!(!completed.contains(&"clone-source".to_string()));

    let mut second = Pipeline::setup(&recipe, &host);
    second.adopt_completed(&completed);

    let runner = MockRunner::new();
    let result = run_pipeline(&mut second, &recipe, host, runner.clone()).await;

    assert_run_completed(&result);
    assert!(runner.seen_commands()[0].starts_with("git clone"));
}
