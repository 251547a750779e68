mod common;

use common::*;
use scribe_models::{BuildConfig, Config};
use scribe_packaging::{
    BuildError, BuildOptions, ImageBuilder, ImageRef, LayerCache, LayerOp, LayerStore,
    PackagingService, Stage,
};
use std::sync::Arc;
use tempfile::tempdir;

#[tokio::test]
async fn first_build_executes_every_step_and_tags_once() {
    let dir = tempdir().unwrap();
    sample_project(dir.path());
    let store = Arc::new(RecordingStore::default());

    let image = service()
        .build(store.clone(), dir.path(), None, false)
        .await
        .unwrap();

    assert_eq!(
        image.executed_stages(),
        vec![
            Stage::Workdir,
            Stage::StageManifest,
            Stage::InstallDependencies,
            Stage::StageSource,
            Stage::Expose,
            Stage::Entrypoint,
        ]
    );
    assert_eq!(
        store.tags(),
        vec![(image.image_id.clone(), "scribe:latest".to_string())]
    );
    assert_eq!(image.layers[0].image_id, BASE_ID);
}

#[tokio::test]
async fn rebuild_of_same_context_is_fully_cached() {
    let dir = tempdir().unwrap();
    sample_project(dir.path());
    let store = Arc::new(RecordingStore::default());
    let service = service();

    let first = service.build(store.clone(), dir.path(), None, false).await.unwrap();
    store.clear_log();
    let second = service.build(store.clone(), dir.path(), None, false).await.unwrap();

    assert!(store.ops().is_empty());
    assert!(second.executed_stages().is_empty());
    assert_eq!(first.image_id, second.image_id);
    let keys = |image: &scribe_packaging::BuiltImage| {
        image.layers.iter().map(|l| l.cache_key.clone()).collect::<Vec<_>>()
    };
    assert_eq!(keys(&first), keys(&second));
    assert_eq!(store.tags().len(), 1);
}

#[tokio::test]
async fn source_change_reuses_dependency_layer() {
    let dir = tempdir().unwrap();
    sample_project(dir.path());
    let store = Arc::new(RecordingStore::default());
    let service = service();

    let first = service.build(store.clone(), dir.path(), None, false).await.unwrap();
    write(dir.path(), "main.py", "from bot import app\napp.run(port=5050, debug=False)\n");
    store.clear_log();
    let second = service.build(store.clone(), dir.path(), None, false).await.unwrap();

    assert_eq!(
        second.executed_stages(),
        vec![Stage::StageSource, Stage::Expose, Stage::Entrypoint]
    );
    assert!(!store.op_kinds().contains(&"run"));
    assert_eq!(first.layers[3].image_id, second.layers[3].image_id);
    assert_ne!(first.image_id, second.image_id);
}

#[tokio::test]
async fn manifest_change_reinstalls_dependencies() {
    let dir = tempdir().unwrap();
    sample_project(dir.path());
    let store = Arc::new(RecordingStore::default());
    let service = service();

    service.build(store.clone(), dir.path(), None, false).await.unwrap();
    write(dir.path(), "requirements.txt", "requests==2.32.0\nflask==3.0.0\n");
    store.clear_log();
    let rebuilt = service.build(store.clone(), dir.path(), None, false).await.unwrap();

    assert_eq!(
        rebuilt.executed_stages(),
        vec![
            Stage::StageManifest,
            Stage::InstallDependencies,
            Stage::StageSource,
            Stage::Expose,
            Stage::Entrypoint,
        ]
    );
    assert_eq!(store.op_kinds(), vec!["copy", "run", "copy", "config", "config"]);
}

#[tokio::test]
async fn manifest_is_staged_alone_before_install_and_source() {
    let dir = tempdir().unwrap();
    sample_project(dir.path());
    let store = Arc::new(RecordingStore::default());

    service().build(store.clone(), dir.path(), None, false).await.unwrap();

    let ops = store.ops();
    assert_eq!(
        store.op_kinds(),
        vec!["workdir", "copy", "run", "copy", "config", "config"]
    );
    match &ops[1] {
        LayerOp::Copy { dest, archive } => {
            assert_eq!(dest, "/app");
            assert_eq!(archive_entries(archive), vec!["requirements.txt"]);
        }
        other => panic!("expected manifest copy, got {other:?}"),
    }
    assert_eq!(
        ops[2],
        LayerOp::Run {
            command: "pip install --no-cache-dir -r requirements.txt".to_string()
        }
    );
    match &ops[3] {
        LayerOp::Copy { archive, .. } => {
            let entries = archive_entries(archive);
            assert!(entries.contains(&"main.py".to_string()));
            assert!(entries.contains(&"bot/__init__.py".to_string()));
            assert!(!entries.iter().any(|e| e.starts_with(".git")));
        }
        other => panic!("expected source copy, got {other:?}"),
    }
}

#[tokio::test]
async fn image_exposes_only_5050_and_runs_main_py() {
    let dir = tempdir().unwrap();
    sample_project(dir.path());
    let store = Arc::new(RecordingStore::default());

    let image = service().build(store.clone(), dir.path(), None, false).await.unwrap();

    assert_eq!(image.metadata.exposed_ports, vec!["5050/tcp"]);
    assert_eq!(image.metadata.workdir, "/app");
    assert_eq!(image.metadata.entrypoint, vec!["python", "main.py"]);
    let ops = store.ops();
    assert_eq!(
        ops[4],
        LayerOp::Config {
            change: "EXPOSE 5050/tcp".to_string()
        }
    );
    assert_eq!(
        ops[5],
        LayerOp::Config {
            change: "CMD [\"python\",\"main.py\"]".to_string()
        }
    );
}

#[tokio::test]
async fn failed_install_aborts_without_tag() {
    let dir = tempdir().unwrap();
    sample_project(dir.path());
    let store = Arc::new(RecordingStore::failing_install(
        "ERROR: No matching distribution found for requests==9.9.9",
    ));
    let service = service();

    let err = service
        .build(store.clone(), dir.path(), None, false)
        .await
        .unwrap_err();

    match err {
        BuildError::DependencyInstall { exit_code, output } => {
            assert_eq!(exit_code, 1);
            assert!(output.contains("No matching distribution"));
        }
        other => panic!("expected DependencyInstall, got {other:?}"),
    }
    assert!(store.tags().is_empty());
    // nothing after the install was attempted
    assert_eq!(store.op_kinds(), vec!["workdir", "copy", "run"]);

    // layers before the failure were kept
    let cache = service.open_cache(dir.path()).unwrap();
    assert_eq!(cache.len(), 2);
}

#[tokio::test]
async fn unresolvable_base_fails_before_any_layer() {
    let dir = tempdir().unwrap();
    sample_project(dir.path());
    let config = scribe_models::BuildConfig {
        base_image: "missing:1.0".to_string(),
        ..scribe_models::Config::default().build
    };
    let service = scribe_packaging::PackagingService::new(config).unwrap();
    let store = Arc::new(RecordingStore::default());

    let err = service
        .build(store.clone(), dir.path(), None, false)
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::BaseImageUnresolvable { .. }));
    assert!(store.ops().is_empty());
    assert!(store.tags().is_empty());
}

#[tokio::test]
async fn missing_manifest_is_reported() {
    let dir = tempdir().unwrap();
    write(dir.path(), "main.py", "print('no deps')\n");
    let store = Arc::new(RecordingStore::default());

    let err = service()
        .build(store.clone(), dir.path(), None, false)
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::ManifestMissing(_)));
    assert!(store.ops().is_empty());
}

#[tokio::test]
async fn evicted_layer_is_rebuilt() {
    let dir = tempdir().unwrap();
    sample_project(dir.path());
    let store = Arc::new(RecordingStore::default());
    let service = service();

    let first = service.build(store.clone(), dir.path(), None, false).await.unwrap();
    store.evict(&first.layers[3].image_id);
    store.clear_log();
    let second = service.build(store.clone(), dir.path(), None, false).await.unwrap();

    // later keys do not depend on layer ids, so only the evicted step runs
    assert_eq!(second.executed_stages(), vec![Stage::InstallDependencies]);
    assert_eq!(store.op_kinds(), vec!["run"]);
    assert!(store.exists(&second.layers[3].image_id).await.unwrap());
}

#[tokio::test]
async fn no_cache_executes_everything_with_same_keys() {
    let dir = tempdir().unwrap();
    sample_project(dir.path());
    let store = Arc::new(RecordingStore::default());
    let service = service();

    let first = service.build(store.clone(), dir.path(), None, false).await.unwrap();
    let second = service.build(store.clone(), dir.path(), Some("scribe:fresh"), true).await.unwrap();

    assert_eq!(second.executed_stages().len(), 6);
    assert_eq!(first.image_id, second.image_id);
    assert_eq!(store.tags()[1].1, "scribe:fresh");
}

#[tokio::test]
async fn plan_predicts_hits_from_persisted_cache() {
    let dir = tempdir().unwrap();
    sample_project(dir.path());
    let service = service();

    let before = service.predict(dir.path()).unwrap();
    assert!(before.iter().all(|layer| layer.cache_key.is_none() && !layer.cached));

    let store = Arc::new(RecordingStore::default());
    let built = service.build(store, dir.path(), None, false).await.unwrap();

    let after = service.predict(dir.path()).unwrap();
    assert!(after.iter().all(|layer| layer.cached));
    let predicted: Vec<_> = after.iter().map(|l| l.cache_key.clone().unwrap()).collect();
    let actual: Vec<_> = built.layers.iter().map(|l| l.cache_key.clone()).collect();
    assert_eq!(predicted, actual);

    write(dir.path(), "bot/__init__.py", "app = object()\n");
    let changed = service.predict(dir.path()).unwrap();
    let cached: Vec<bool> = changed.iter().map(|l| l.cached).collect();
    assert_eq!(cached, vec![true, true, true, true, false, false, false]);
}

#[tokio::test]
async fn cache_dir_inside_context_keeps_rebuilds_cached() {
    let dir = tempdir().unwrap();
    sample_project(dir.path());
    let config = BuildConfig {
        cache_dir: ".scribe-cache".to_string(),
        ..Config::default().build
    };
    let service = PackagingService::new(config).unwrap();
    let store = Arc::new(RecordingStore::default());

    let first = service.build(store.clone(), dir.path(), None, false).await.unwrap();
    assert!(dir.path().join(".scribe-cache/layer_cache.json").is_file());
    store.clear_log();
    let second = service.build(store.clone(), dir.path(), None, false).await.unwrap();

    assert!(second.executed_stages().is_empty());
    assert!(store.ops().is_empty());
    assert_eq!(first.image_id, second.image_id);
}

#[tokio::test]
async fn nested_data_and_target_dirs_reach_the_image() {
    let dir = tempdir().unwrap();
    sample_project(dir.path());
    write(dir.path(), "bot/data/prompts.json", "{\"greeting\": \"hi\"}\n");
    write(dir.path(), "bot/target/x.py", "X = 1\n");
    write(dir.path(), "bot/__pycache__/x.cpython-311.pyc", "bytecode");
    let store = Arc::new(RecordingStore::default());

    service().build(store.clone(), dir.path(), None, false).await.unwrap();

    match &store.ops()[3] {
        LayerOp::Copy { archive, .. } => {
            let entries = archive_entries(archive);
            assert!(entries.contains(&"bot/data/prompts.json".to_string()));
            assert!(entries.contains(&"bot/target/x.py".to_string()));
            assert!(!entries.iter().any(|e| e.contains("__pycache__")));
            assert!(!entries.iter().any(|e| e.starts_with("data")));
        }
        other => panic!("expected source copy, got {other:?}"),
    }
}

#[tokio::test]
async fn install_error_survives_unwritable_cache() {
    let dir = tempdir().unwrap();
    sample_project(dir.path());
    let service = service();
    let context = service.scan(dir.path()).unwrap();
    let cache_dir = dir.path().join("gone");
    let mut cache = LayerCache::new(cache_dir.clone()).unwrap();
    std::fs::remove_dir_all(&cache_dir).unwrap();
    let store = Arc::new(RecordingStore::failing_install("ERROR: resolution failed"));
    let target: ImageRef = "scribe:latest".parse().unwrap();

    let err = ImageBuilder::new(store.clone())
        .build(
            service.plan(),
            &context,
            &mut cache,
            &target,
            &BuildOptions::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::DependencyInstall { .. }));
    assert!(store.tags().is_empty());
}
