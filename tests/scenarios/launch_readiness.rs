//! Test: Launch readiness - URL discovery and daemon supervision

use crate::helpers::*;
use greenroom::core::{HostContext, LaunchPhase, Pipeline};
use greenroom::execution::ExecutionEvent;
use greenroom::runner::{ServiceEvent, ServiceExit};

fn launch_recipe(workdir: &str) -> String {
    recipe_yaml("webapp", workdir)
}

/// The first matching line wins; later URLs are ignored
#[tokio::test]
async fn test_first_url_is_recorded() {
    let workdir = temp_workdir("launch-first");
    let recipe = recipe_from_yaml(&launch_recipe(&workdir));
    let mut pipeline = Pipeline::launch(&recipe);

    let runner = MockRunner::new().with_service(vec![
        ServiceEvent::Line("Loading model shards...".to_string()),
        ServiceEvent::Line("Running on local URL:  http://127.0.0.1:7860".to_string()),
        ServiceEvent::Line("Running on local URL: http://0.0.0.0:9999".to_string()),
    ]);

    let host = HostContext::with_override("nvidia");
    let result = run_pipeline(&mut pipeline, &recipe, host, runner.clone()).await;

    // A successful launch stays live as a supervised daemon
    assert!(result.is_running(), "run should stay live: {}", result.summary());
    assert!(result.service.is_some());
    assert_eq!(
        result.captured_url(),
        Some(&"http://127.0.0.1:7860".to_string())
    );
    assert_step_completed(&result, "start-app", "http://127.0.0.1:7860");
    assert_step_completed(&result, "record-url", "http://127.0.0.1:7860");
    assert_eq!(result.pipeline.state.phase, Some(LaunchPhase::Running));

    // The entry command was spawned as a service
    assert_eq!(runner.seen_commands(), vec!["python app.py"]);

    // Readiness fires exactly once, for the first URL
    let ready_urls: Vec<&String> = result
        .events
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::ServiceReady { url } => Some(url),
            _ => None,
        })
        .collect();
    assert_eq!(ready_urls, vec!["http://127.0.0.1:7860"]);
}

/// Output scanned before the match is surfaced as ServiceLine events
#[tokio::test]
async fn test_startup_output_is_forwarded() {
    let workdir = temp_workdir("launch-lines");
    let recipe = recipe_from_yaml(&launch_recipe(&workdir));
    let mut pipeline = Pipeline::launch(&recipe);

    let runner = MockRunner::new().with_service(vec![
        ServiceEvent::Line("Collecting usage analytics: disabled".to_string()),
        ServiceEvent::Line("Running on local URL: http://127.0.0.1:7860".to_string()),
    ]);

    let host = HostContext::with_override("nvidia");
    let result = run_pipeline(&mut pipeline, &recipe, host, runner).await;

    let lines: Vec<&String> = result
        .events
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::ServiceLine { line } => Some(line),
            _ => None,
        })
        .collect();

    assert!(lines.iter().any(|l| l.contains("usage analytics")));
    assert!(lines.iter().any(|l| l.contains("Running on local URL")));

    // The phase walked through watching before running
    let phases: Vec<LaunchPhase> = result
        .events
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::PhaseChanged { phase } => Some(*phase),
            _ => None,
        })
        .collect();
    assert_eq!(
        phases,
        vec![
            LaunchPhase::Starting,
            LaunchPhase::Watching,
            LaunchPhase::Ready,
            LaunchPhase::Running
        ]
    );
}

/// A custom pattern with no capture group records the whole match
#[tokio::test]
async fn test_generic_pattern_records_whole_match() {
    let workdir = temp_workdir("launch-generic");
    let yaml = format!(
        r#"
name: "generic"
repo: "https://github.com/example/generic.git"
branch: "main"
entry: "python serve.py"
workdir: "{}"
ready_pattern: "http://\\S+"
open_browser: false
"#,
        workdir
    );
    let recipe = recipe_from_yaml(&yaml);
    let mut pipeline = Pipeline::launch(&recipe);

    let runner = MockRunner::new().with_service(vec![ServiceEvent::Line(
        "INFO serving at http://localhost:3000 now".to_string(),
    )]);

    let host = HostContext::with_override("none");
    let result = run_pipeline(&mut pipeline, &recipe, host, runner).await;

    assert_eq!(
        result.captured_url(),
        Some(&"http://localhost:3000".to_string())
    );
}

/// An app that dies during startup fails the run explicitly
#[tokio::test]
async fn test_exit_before_ready_fails_the_run() {
    let workdir = temp_workdir("launch-dead");
    let recipe = recipe_from_yaml(&launch_recipe(&workdir));
    let mut pipeline = Pipeline::launch(&recipe);

    let runner = MockRunner::new().with_service(vec![
        ServiceEvent::Line("Traceback (most recent call last):".to_string()),
        ServiceEvent::Line("ModuleNotFoundError: No module named 'gradio'".to_string()),
        ServiceEvent::Exited(ServiceExit { code: Some(1) }),
    ]);

    let host = HostContext::with_override("nvidia");
    let result = run_pipeline(&mut pipeline, &recipe, host, runner).await;

    assert_run_failed(&result);
    assert!(result.service.is_none());
    assert_eq!(result.captured_url(), None);
    assert_step_failed(&result, "start-app", "exited before signalling readiness");
    assert_step_pending(&result, "record-url");
}

/// A silent app trips the ready timeout instead of hanging forever
#[tokio::test]
async fn test_ready_timeout_fails_the_run() {
    let workdir = temp_workdir("launch-timeout");
    let yaml = format!(
        r#"
name: "silent"
repo: "https://github.com/example/silent.git"
branch: "main"
entry: "python app.py"
workdir: "{}"
ready_timeout_secs: 0
open_browser: false
"#,
        workdir
    );
    let recipe = recipe_from_yaml(&yaml);
    let mut pipeline = Pipeline::launch(&recipe);

    let runner = MockRunner::new().with_silent_service();

    let host = HostContext::with_override("nvidia");
    let result = run_pipeline(&mut pipeline, &recipe, host, runner).await;

    assert_run_failed(&result);
    assert!(result.service.is_none());
    assert_step_failed(&result, "start-app", "no ready signal within 0 seconds");
}

/// After readiness, the handle keeps serving output until the app exits
#[tokio::test]
async fn test_supervision_after_ready() {
    let workdir = temp_workdir("launch-supervise");
    let recipe = recipe_from_yaml(&launch_recipe(&workdir));
    let mut pipeline = Pipeline::launch(&recipe);

    let runner = MockRunner::new().with_service(vec![
        ServiceEvent::Line("Running on local URL: http://127.0.0.1:7860".to_string()),
        ServiceEvent::Line("GET / 200".to_string()),
        ServiceEvent::Exited(ServiceExit { code: Some(0) }),
    ]);

    let host = HostContext::with_override("nvidia");
    let result = run_pipeline(&mut pipeline, &recipe, host, runner).await;

    assert!(result.is_running());
    let mut service = result.service.unwrap();

    let mut tail = Vec::new();
    let exit = service.wait_exit(|line| tail.push(line.to_string())).await;

    assert!(exit.success());
    assert_eq!(exit.code, Some(0));
    assert_eq!(tail, vec!["GET / 200"]);
}
