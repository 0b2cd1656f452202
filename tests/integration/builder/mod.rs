//! Builder tests against an in-memory engine.
//!
//! Each test declares a small project, runs the whole pipeline and checks
//! what the engine was asked to do.

#[cfg(test)]
mod tests {
    use crate::integration::common::*;
    use anyhow::Result;
    use layercake::{Builder, CancelFlag, LayercakeError, Notifier};

    const APP_WITH_BASE: &str = r#"
build:
  images:
    base:
      from: alpine
      tags: [base:test]
      scripts:
        - run: make
    app:
      from: debian
      tags: [app:test]
      scripts:
        - import: base
        - cmd: [/out/app]
"#;

    fn root_error(err: &anyhow::Error) -> &LayercakeError {
        err.downcast_ref::<LayercakeError>()
            .unwrap_or_else(|| panic!("unexpected error: {:#}", err))
    }

    #[test]
    fn test_dependencies_built_first_and_exports_wired() -> Result<()> {
        let project = Project::new(APP_WITH_BASE)?;
        let config = project.config()?;
        let engine = FakeEngine::new().with_files("base", &["out/app"]);
        let notifier = Notifier::new(0);

        let mut builder = Builder::new(&config, &notifier, &[])?;
        assert_eq!(builder.order(), vec!["base", "app"]);
        builder.run(&engine, &CancelFlag::new())?;

        assert_eq!(engine.built(), vec!["base", "app"]);
        assert_eq!(
            engine.dockerfile_of("app").unwrap(),
            [
                "FROM sha256:base AS base",
                "FROM debian",
                "COPY --from=base /out/app /",
                r#"CMD ["/out/app"]"#,
            ]
            .join("\n")
        );
        assert_eq!(engine.dockerfile_of("base").unwrap(), "FROM alpine\nRUN make");

        // Only imported images are saved
        assert_eq!(*engine.saves.borrow(), vec!["sha256:base"]);
        let export = builder.registry().get("base").unwrap();
        assert_eq!(export.image_id, "sha256:base");
        assert_eq!(export.files, vec!["/out/app"]);
        assert!(builder.registry().get("app").is_none());
        Ok(())
    }

    #[test]
    fn test_empty_export_leaves_comment() -> Result<()> {
        let project = Project::new(APP_WITH_BASE)?;
        let config = project.config()?;
        let engine = FakeEngine::new();
        let notifier = Notifier::new(0);

        Builder::new(&config, &notifier, &[])?.run(&engine, &CancelFlag::new())?;

        let dockerfile = engine.dockerfile_of("app").unwrap();
        assert!(dockerfile.contains("# No exported files from \"base\""));
        assert!(!dockerfile.contains("COPY --from=base"));
        Ok(())
    }

    #[test]
    fn test_subset_builds_import_closure_only() -> Result<()> {
        let project = Project::new(
            r#"
build:
  images:
    base: { from: alpine, tags: [base] }
    lib:
      from: alpine
      tags: [lib]
      scripts: [{ import: base }]
    docs: { from: alpine, tags: [docs] }
"#,
        )?;
        let config = project.config()?;
        let engine = FakeEngine::new().with_files("base", &["lib/base.so"]);
        let notifier = Notifier::new(0);

        Builder::new(&config, &notifier, &["lib".to_string()])?
            .run(&engine, &CancelFlag::new())?;

        assert_eq!(engine.built(), vec!["base", "lib"]);
        Ok(())
    }

    #[test]
    fn test_build_options_merge_global_and_image_settings() -> Result<()> {
        let project = Project::new(
            r#"
build:
  no_cache: true
  memory: 536870912
  args: { A: global, B: global }
  images:
    app:
      from: alpine
      tags: [app:1.0, app:latest, registry.local:5000/app]
      args: { B: image }
      labels: { team: infra }
      cache_from: [app:latest]
"#,
        )?;
        let config = project.config()?;
        let engine = FakeEngine::new();
        let notifier = Notifier::new(0);

        Builder::new(&config, &notifier, &[])?.run(&engine, &CancelFlag::new())?;

        let builds = engine.builds.borrow();
        let options = &builds[0].options;
        assert_eq!(options.dockerfile, ".layercake/Dockerfile");
        assert_eq!(options.build_args["A"], "global");
        assert_eq!(options.build_args["B"], "image");
        assert_eq!(options.labels["team"], "infra");
        assert_eq!(options.cache_from, vec!["app:latest"]);
        assert_eq!(options.memory, Some(536870912));
        assert!(options.no_cache);
        assert!(options.remove);
        assert!(!options.force_rm);

        // The first tag goes with the build, the rest are applied afterwards
        assert_eq!(
            *engine.tags.borrow(),
            vec![
                ("sha256:app".to_string(), "app:latest".to_string()),
                ("sha256:app".to_string(), "registry.local:5000/app".to_string()),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_context_respects_dockerignore() -> Result<()> {
        let project = Project::new("build:\n  images:\n    app: { from: alpine, tags: [app] }\n")?
            .with_file("src/main.rs", "fn main() {}")?
            .with_file("secrets/token", "hunter2")?
            .with_file(".dockerignore", "secrets\n")?;
        let config = project.config()?;
        let engine = FakeEngine::new();
        let notifier = Notifier::new(0);

        Builder::new(&config, &notifier, &[])?.run(&engine, &CancelFlag::new())?;

        let context = engine.builds.borrow()[0].context.clone();
        assert!(context.contains(&"src/main.rs".to_string()));
        assert!(context.contains(&"layercake.yml".to_string()));
        assert!(!context.iter().any(|p| p.starts_with("secrets")));
        Ok(())
    }

    #[test]
    fn test_cycle_builds_nothing() -> Result<()> {
        let project = Project::new(
            r#"
build:
  images:
    a: { from: alpine, scripts: [{ import: b }] }
    b: { from: alpine, scripts: [{ import: a }] }
"#,
        )?;
        let config = project.config()?;
        let engine = FakeEngine::new();
        let notifier = Notifier::new(0);

        let err = Builder::new(&config, &notifier, &[])
            .err()
            .expect("cycle must be rejected");

        match root_error(&err) {
            LayercakeError::CycleDetected(path) => assert_eq!(path, &vec!["a", "b", "a"]),
            other => panic!("unexpected error: {}", other),
        }
        assert!(engine.builds.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn test_undefined_import_builds_nothing() -> Result<()> {
        let project = Project::new(
            r#"
build:
  images:
    app: { from: alpine, scripts: [{ import: missing }] }
"#,
        )?;
        let config = project.config()?;
        let engine = FakeEngine::new();
        let notifier = Notifier::new(0);

        let err = Builder::new(&config, &notifier, &[])
            .err()
            .expect("undefined import must be rejected");

        let root = root_error(&err);
        assert!(root.is_config_error());
        assert!(matches!(
            root,
            LayercakeError::UndefinedReference { image, import } if image == "app" && import == "missing"
        ));
        assert!(engine.builds.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn test_unknown_target() -> Result<()> {
        let project = Project::new(APP_WITH_BASE)?;
        let config = project.config()?;
        let engine = FakeEngine::new();
        let notifier = Notifier::new(0);

        let err = Builder::new(&config, &notifier, &["nope".to_string()])
            .err()
            .expect("unknown target must be rejected");

        assert!(matches!(root_error(&err), LayercakeError::UnknownTarget(t) if t == "nope"));
        Ok(())
    }

    #[test]
    fn test_failed_build_stops_run() -> Result<()> {
        let project = Project::new(APP_WITH_BASE)?;
        let config = project.config()?;
        let engine = FakeEngine::new().failing("base");
        let notifier = Notifier::new(0);

        let mut builder = Builder::new(&config, &notifier, &[])?;
        let err = builder.run(&engine, &CancelFlag::new()).unwrap_err();

        match root_error(&err) {
            LayercakeError::BuildFailed { image, reason } => {
                assert_eq!(image, "base");
                assert!(reason.contains("non-zero code"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(engine.built(), vec!["base"]);
        assert!(engine.saves.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn test_cancel_between_images() -> Result<()> {
        let project = Project::new(APP_WITH_BASE)?;
        let config = project.config()?;
        let cancel = CancelFlag::new();
        let engine = FakeEngine::new().cancel_after("base", cancel.clone());
        let notifier = Notifier::new(0);

        let err = Builder::new(&config, &notifier, &[])?
            .run(&engine, &cancel)
            .unwrap_err();

        assert!(matches!(root_error(&err), LayercakeError::Cancelled));
        assert_eq!(engine.built(), vec!["base"]);
        Ok(())
    }

    #[test]
    fn test_dry_run_builds_nothing() -> Result<()> {
        let project = Project::new(APP_WITH_BASE)?;
        let mut config = project.config()?;
        config.build.dry_run = true;
        let engine = FakeEngine::new();
        let notifier = Notifier::new(0);

        Builder::new(&config, &notifier, &[])?.run(&engine, &CancelFlag::new())?;

        assert!(engine.builds.borrow().is_empty());
        assert!(engine.saves.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn test_unscheduled_dependent_skips_export() -> Result<()> {
        let project = Project::new(APP_WITH_BASE)?;
        let config = project.config()?;
        let engine = FakeEngine::new().with_files("base", &["out/app"]);
        let notifier = Notifier::new(0);

        let mut builder = Builder::new(&config, &notifier, &["base".to_string()])?;
        builder.run(&engine, &CancelFlag::new())?;

        // app imports base but is not part of this run
        assert_eq!(engine.built(), vec!["base"]);
        assert!(engine.saves.borrow().is_empty());
        assert!(builder.registry().get("base").is_none());
        Ok(())
    }

    #[test]
    fn test_given_scratch_dir_is_used_and_left_clean() -> Result<()> {
        let project = Project::new(APP_WITH_BASE)?;
        let config = project.config()?;
        let engine = FakeEngine::new();
        let notifier = Notifier::new(0);
        let scratch = tempfile::tempdir()?;

        Builder::new(&config, &notifier, &[])?
            .with_scratch_dir(scratch.path())
            .run(&engine, &CancelFlag::new())?;

        assert_eq!(engine.built(), vec!["base", "app"]);
        assert!(scratch.path().exists(), "caller owns the scratch dir");
        assert_eq!(std::fs::read_dir(scratch.path())?.count(), 0);
        Ok(())
    }

    #[test]
    fn test_dry_run_needs_no_engine() -> Result<()> {
        let project = Project::new(APP_WITH_BASE)?;
        let mut config = project.config()?;
        config.build.dry_run = true;
        let notifier = Notifier::new(0);

        let builder = Builder::new(&config, &notifier, &[])?;
        let rendered = builder.render();
        builder.dry_run();

        let names: Vec<&str> = rendered.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!["base", "app"]);
        assert_eq!(rendered[0].1, "FROM alpine\nRUN make");
        assert!(rendered[1]
            .1
            .starts_with("FROM debian\n# No exported files from \"base\""));
        Ok(())
    }
}
