//! End-to-end reconcile passes against the in-memory world.

mod common;

use common::{descriptor, mutating_calls, tenant, World, FULL_PATH, NAMESPACE, TENANT};
use repokeeper::domain::models::{
    AccessTokenConfig, CiVariable, CreationPolicy, DeletionPolicy, DeployKey, FileOp, Phase,
    RepoDescriptor, DEFAULT_FINALIZER_NAME,
};
use repokeeper::services::DELETION_PROTECTION_ANNOTATION;
use repokeeper::{Config, DomainError, ObjectStore};
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn test_first_pass_creates_repository_and_persists_object() {
    let world = World::new().await;
    let mut obj = world.admit(tenant(descriptor())).await;

    let outcome = assert_ok!(world.reconciler.reconcile(&mut obj).await);
    assert!(!outcome.requeue);

    let project = world.remote.project(FULL_PATH).await.unwrap();
    assert_eq!(project.description, "Acme Corporation");
    assert_eq!(world.remote.deploy_keys(FULL_PATH).await.len(), 2);
    let files = world.remote.files(FULL_PATH).await;
    assert_eq!(files.get("README.md").map(String::as_str), Some("# acme\n"));
    assert!(files.contains_key("clusters/.keep"));

    let stored = world.fetch().await.unwrap();
    assert!(stored.metadata.has_finalizer(DEFAULT_FINALIZER_NAME));
    assert_eq!(
        stored.metadata.annotations.get(DELETION_PROTECTION_ANNOTATION).map(String::as_str),
        Some("true")
    );
    assert_eq!(stored.status.phase, Phase::Created);
    assert_eq!(stored.status.provider_type.as_deref(), Some("memory"));
    assert_eq!(
        stored.status.url.as_deref(),
        Some("ssh://git@git.example/acme/acme-config.git")
    );
    let template = stored.spec.git_template.as_ref().unwrap();
    assert_eq!(template.display_name.as_deref(), Some("Acme Corporation"));
    assert_eq!(template.repo_type.as_deref(), Some("auto"));
}

#[tokio::test]
async fn test_create_without_template_files_skips_commit_and_update() {
    let world = World::new().await;
    let repo = RepoDescriptor::new("foo", "bar")
        .with_deploy_key("k1", DeployKey::new("ssh-ed25519", "AAAAC3Nza-k1", false));
    let mut obj = world.admit(tenant(repo)).await;

    assert_ok!(world.reconciler.reconcile(&mut obj).await);

    assert_eq!(world.remote.call_count("create_project").await, 1);
    assert_eq!(world.remote.call_count("add_deploy_key").await, 1);
    for op in [
        "create_commit",
        "list_tree_page",
        "list_deploy_keys",
        "delete_deploy_key",
        "edit_project_description",
    ] {
        assert_eq!(world.remote.call_count(op).await, 0, "{op} was called");
    }
    assert_eq!(world.remote.deploy_keys("foo/bar").await.len(), 1);
    assert_eq!(world.fetch().await.unwrap().status.phase, Phase::Created);
}

#[tokio::test]
async fn test_second_pass_is_read_only_and_writes_nothing() {
    let world = World::new().await;
    let mut template = descriptor().with_ci_variable(CiVariable::new("CLUSTER", "prod"));
    template.access_token = Some(AccessTokenConfig { name: "flux".into() });
    let mut obj = world.admit(tenant(template)).await;
    world.reconciler.reconcile(&mut obj).await.unwrap();

    let mut obj = world.fetch().await.unwrap();
    world.remote.clear_calls().await;
    let writes = world.store.write_count().await;

    world.reconciler.reconcile(&mut obj).await.unwrap();

    let mutating = mutating_calls(&world.remote).await;
    assert!(mutating.is_empty(), "unexpected remote writes: {mutating:?}");
    assert_eq!(world.store.write_count().await, writes);
}

#[tokio::test]
async fn test_descriptor_changes_converge() {
    let world = World::new().await;
    let mut obj = world.admit(tenant(descriptor())).await;
    world.reconciler.reconcile(&mut obj).await.unwrap();
    world
        .remote
        .seed_deploy_key(FULL_PATH, "manual", "ssh-rsa MANUAL", false)
        .await;

    let mut obj = world.fetch().await.unwrap();
    let template = obj.spec.git_template.as_mut().unwrap();
    template.display_name = Some("Acme Inc".into());
    template.deploy_keys.remove("ci");
    template
        .deploy_keys
        .insert("flux".into(), DeployKey::new("ssh-ed25519", "AAAAC3Nza-flux", true));
    template
        .template_files
        .insert("README.md".into(), FileOp::Delete);
    world.reconciler.reconcile(&mut obj).await.unwrap();

    let project = world.remote.project(FULL_PATH).await.unwrap();
    assert_eq!(project.description, "Acme Inc");

    let keys = world.remote.deploy_keys(FULL_PATH).await;
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].title, "flux");
    assert!(keys[0].can_push);

    assert!(!world.remote.files(FULL_PATH).await.contains_key("README.md"));
}

#[tokio::test]
async fn test_existing_template_file_content_is_not_overwritten() {
    let world = World::new().await;
    world.remote.seed_project(FULL_PATH).await;
    world
        .remote
        .seed_file(FULL_PATH, "README.md", "hand edited")
        .await;
    let mut obj = world.admit(tenant(descriptor())).await;

    world.reconciler.reconcile(&mut obj).await.unwrap();

    let files = world.remote.files(FULL_PATH).await;
    assert_eq!(files.get("README.md").map(String::as_str), Some("hand edited"));
    assert!(files.contains_key("clusters/.keep"));
}

#[tokio::test]
async fn test_deletion_removes_repository_and_releases_object() {
    let world = World::new().await;
    let mut young = tenant(descriptor());
    young.spec.deletion_policy = Some(DeletionPolicy::Delete);
    let mut obj = world.admit(young).await;
    world.reconciler.reconcile(&mut obj).await.unwrap();

    // Lift protection, then request deletion.
    let mut obj = world.fetch().await.unwrap();
    obj.metadata
        .annotations
        .insert(DELETION_PROTECTION_ANNOTATION.into(), "false".into());
    world.store.update(&obj).await.unwrap();
    world.store.request_deletion(NAMESPACE, TENANT).await.unwrap();

    let mut obj = world.fetch().await.unwrap();
    assert!(obj.metadata.deletion_timestamp.is_some());
    world.reconciler.reconcile(&mut obj).await.unwrap();

    assert!(world.remote.project(FULL_PATH).await.is_none());
    assert!(!world.store.contains(NAMESPACE, TENANT).await);
}

#[tokio::test]
async fn test_deletion_with_archive_policy() {
    let world = World::new().await;
    let mut young = tenant(descriptor());
    young.spec.deletion_policy = Some(DeletionPolicy::Archive);
    let mut obj = world.admit(young).await;
    world.reconciler.reconcile(&mut obj).await.unwrap();

    world.store.request_deletion(NAMESPACE, TENANT).await.unwrap();
    let mut obj = world.fetch().await.unwrap();
    let reconciler = world.reconciler.with_protection_override(Some(false));
    reconciler.reconcile(&mut obj).await.unwrap();

    let project = world.remote.project(FULL_PATH).await.unwrap();
    assert!(project.archived);
    assert!(!world.store.contains(NAMESPACE, TENANT).await);
}

#[tokio::test]
async fn test_deletion_retains_by_default() {
    let world = World::new().await;
    let mut obj = world.admit(tenant(descriptor())).await;
    world.reconciler.reconcile(&mut obj).await.unwrap();

    world.store.request_deletion(NAMESPACE, TENANT).await.unwrap();
    let mut obj = world.fetch().await.unwrap();
    world.remote.clear_calls().await;
    let reconciler = world.reconciler.with_protection_override(Some(false));
    reconciler.reconcile(&mut obj).await.unwrap();

    assert!(world.remote.project(FULL_PATH).await.is_some());
    assert!(mutating_calls(&world.remote).await.is_empty());
    assert!(!world.store.contains(NAMESPACE, TENANT).await);
}

#[tokio::test]
async fn test_protected_object_blocks_deletion() {
    let world = World::new().await;
    let mut young = tenant(descriptor());
    young.spec.deletion_policy = Some(DeletionPolicy::Delete);
    let mut obj = world.admit(young).await;
    world.reconciler.reconcile(&mut obj).await.unwrap();

    world.store.request_deletion(NAMESPACE, TENANT).await.unwrap();
    let mut obj = world.fetch().await.unwrap();
    let err = assert_err!(world.reconciler.reconcile(&mut obj).await);

    assert_eq!(err.step(), "HandleDeletion");
    assert!(matches!(err.source_error(), DomainError::FinalizerNotRemoved));
    assert!(world.remote.project(FULL_PATH).await.is_some());
    let stored = world.fetch().await.unwrap();
    assert!(stored.metadata.has_finalizer(DEFAULT_FINALIZER_NAME));
}

#[tokio::test]
async fn test_stale_object_requeues() {
    let world = World::new().await;
    let obj = world.admit(tenant(descriptor())).await;
    let mut first = obj.clone();
    let mut stale = obj;

    world.reconciler.reconcile(&mut first).await.unwrap();
    let outcome = world.reconciler.reconcile(&mut stale).await.unwrap();

    assert!(outcome.requeue);
    assert_eq!(world.remote.call_count("create_project").await, 1);
}

#[tokio::test]
async fn test_adopt_absent_repository_fails_and_creates_nothing() {
    let world = World::new().await;
    let mut young = tenant(descriptor());
    young.spec.creation_policy = Some(CreationPolicy::Adopt);
    let mut obj = world.admit(young).await;

    let err = assert_err!(world.reconciler.reconcile(&mut obj).await);

    assert_eq!(err.step(), "RepoConvergence");
    assert!(err.source_error().is_not_found());
    assert_eq!(world.remote.call_count("create_project").await, 0);
}

#[tokio::test]
async fn test_provider_failure_marks_phase_failed() {
    let world = World::new().await;
    world.remote.fail_on("create_project", "namespace quota exceeded").await;
    let mut obj = world.admit(tenant(descriptor())).await;

    let err = world.reconciler.reconcile(&mut obj).await.unwrap_err();
    assert_eq!(err.step(), "RepoConvergence");

    let stored = world.fetch().await.unwrap();
    assert_eq!(stored.status.phase, Phase::Failed);

    world.remote.clear_failures().await;
    let mut obj = world.fetch().await.unwrap();
    world.reconciler.reconcile(&mut obj).await.unwrap();
    assert_eq!(world.fetch().await.unwrap().status.phase, Phase::Created);
}

#[tokio::test]
async fn test_disabled_finalizer_releases_legacy_finalizer() {
    let world = World::with_config(Config {
        finalizer_name: String::new(),
        deletion_protection: false,
        ..Config::default()
    })
    .await;
    let mut young = tenant(descriptor());
    young.metadata.finalizers.push(DEFAULT_FINALIZER_NAME.into());
    let mut obj = world.admit(young).await;

    world.reconciler.reconcile(&mut obj).await.unwrap();

    let stored = world.fetch().await.unwrap();
    assert!(stored.metadata.finalizers.is_empty());
    assert!(!stored
        .metadata
        .annotations
        .contains_key(DELETION_PROTECTION_ANNOTATION));
}

#[tokio::test]
async fn test_disabled_finalizer_still_completes_pending_deletion() {
    let world = World::with_config(Config {
        finalizer_name: String::new(),
        deletion_protection: false,
        ..Config::default()
    })
    .await;
    world.remote.seed_project(FULL_PATH).await;
    let mut young = tenant(descriptor());
    young.spec.deletion_policy = Some(DeletionPolicy::Delete);
    young.metadata.finalizers.push(DEFAULT_FINALIZER_NAME.into());
    world.admit(young).await;
    world.store.request_deletion(NAMESPACE, TENANT).await.unwrap();

    let mut obj = world.fetch().await.unwrap();
    assert_ok!(world.reconciler.reconcile(&mut obj).await);

    assert!(world.remote.project(FULL_PATH).await.is_none());
    assert!(!world.store.contains(NAMESPACE, TENANT).await);
}

#[tokio::test]
async fn test_new_access_token_reaches_vault() {
    let world = World::new().await;
    let mut template = descriptor();
    template.access_token = Some(AccessTokenConfig { name: "flux".into() });
    let mut obj = world.admit(tenant(template)).await;

    world.reconciler.reconcile(&mut obj).await.unwrap();

    let stored = world.fetch().await.unwrap();
    let token = world.vault.get(FULL_PATH).await.unwrap();
    assert_eq!(stored.status.access_token_uid, Some(token.uid));
    assert!(!token.token.is_empty());
}
