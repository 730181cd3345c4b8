//! Test: Setup flow - provisioning an application end to end

use crate::helpers::*;
use greenroom::core::{HostContext, Pipeline};

/// Full setup on an nvidia host runs every step in order
#[tokio::test]
async fn test_setup_runs_all_steps_in_order() {
    let workdir = temp_workdir("setup-order");
    let recipe = recipe_from_yaml(&recipe_yaml("demo", &workdir));
    let host = HostContext::with_override("nvidia");
    let mut pipeline = Pipeline::setup(&recipe, &host);

    let runner = MockRunner::new();
    let result = run_pipeline(&mut pipeline, &recipe, host, runner.clone()).await;

    assert_run_completed(&result);
    assert_eq!(
        result.completed_steps(),
        vec![
            "reset-workdir",
            "clone-source",
            "create-env",
            "install-torch",
            "install-deps",
            "extras-nvidia"
        ]
    );

    // Reset and clone go through untouched; everything after runs in the env
    assert_eq!(
        runner.seen_commands(),
        vec![
            format!(
                r#"git clone -b "main" "https://github.com/example/demo-app.git" "{}""#,
                workdir
            ),
            "python -m venv env".to_string(),
            "pip install torch torchvision torchaudio --index-url https://download.pytorch.org/whl/cu121".to_string(),
            "pip install -r requirements.txt".to_string(),
            "pip install bitsandbytes".to_string(),
        ]
    );

    // Nothing to reset on a first run, recorded as satisfied
    assert_step_completed(&result, "reset-workdir", "nothing to remove");
}

/// A recipe with no accelerator has no torch step at all
#[tokio::test]
async fn test_setup_without_accelerator_has_no_torch_step() {
    let workdir = temp_workdir("setup-plain");
    let yaml = format!(
        r#"
name: "plain"
repo: "https://github.com/example/plain.git"
branch: "main"
entry: "python app.py"
workdir: "{}"
accelerator: none
open_browser: false
"#,
        workdir
    );
    let recipe = recipe_from_yaml(&yaml);
    let host = HostContext::with_override("nvidia");
    let mut pipeline = Pipeline::setup(&recipe, &host);

    assert!(pipeline.step("install-torch").is_none());

    let runner = MockRunner::new();
    let result = run_pipeline(&mut pipeline, &recipe, host, runner.clone()).await;

    assert_run_completed(&result);
    assert_eq!(
        runner.seen_commands(),
        vec![
            format!(r#"git clone -b "main" "https://github.com/example/plain.git" "{}""#, workdir),
            "python -m venv env".to_string(),
            "pip install -r requirements.txt".to_string(),
        ]
    );
}

/// Install commands run inside the virtual environment, rooted at the workdir
#[tokio::test]
async fn test_setup_commands_run_inside_the_env() {
    let workdir = temp_workdir("setup-env");
    let recipe = recipe_from_yaml(&recipe_yaml("demo", &workdir));
    let host = HostContext::with_override("nvidia");
    let mut pipeline = Pipeline::setup(&recipe, &host);

    let runner = MockRunner::new();
    let result = run_pipeline(&mut pipeline, &recipe, host, runner.clone()).await;

    assert_run_completed(&result);

    let specs = runner.seen_specs();

    // git clone runs outside any environment
    assert!(specs[0].command.starts_with("git clone"));
    assert_eq!(specs[0].venv, None);

    // venv creation runs in the workdir, but not inside the env
    assert_eq!(specs[1].command, "python -m venv env");
    assert_eq!(specs[1].cwd.as_deref(), Some(recipe.workdir_path().as_path()));
    assert_eq!(specs[1].venv, None);

    // pip installs carry the venv and the workdir
    for spec in &specs[2..] {
        assert!(spec.command.starts_with("pip install"), "{}", spec.command);
        assert_eq!(spec.cwd.as_deref(), Some(recipe.workdir_path().as_path()));
        assert_eq!(spec.venv.as_deref(), Some(recipe.env_dir().as_path()));
    }
}

/// Re-running setup clears out the previous installation first
#[tokio::test]
async fn test_setup_resets_existing_workdir() {
    let workdir = temp_workdir("setup-reset");
    std::fs::create_dir_all(format!("{}/stale", workdir)).unwrap();

    let recipe = recipe_from_yaml(&recipe_yaml("demo", &workdir));
    let host = HostContext::with_override("nvidia");
    let mut pipeline = Pipeline::setup(&recipe, &host);

    let runner = MockRunner::new();
    let result = run_pipeline(&mut pipeline, &recipe, host, runner).await;

    assert_run_completed(&result);
    assert_step_completed(&result, "reset-workdir", "removed");
    assert!(!std::path::Path::new(&workdir).exists());
}
