//! Implementation of the `repokeeper reconcile` command.
//!
//! Runs a single pass against the real provider. The object, its
//! connection secret and the token vault live in memory for the duration
//! of the command.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::adapters::gitlab::GitLabProviderFactory;
use crate::adapters::memory::{InMemoryObjectStore, InMemorySecretSource, InMemoryTokenVault};
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Cluster, Config, RepoObject, Tenant};
use crate::domain::ports::ObjectStore;
use crate::services::{ProviderRegistry, Reconciler};

const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResourceKind {
    Tenant,
    Cluster,
}

#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// Resource definition (YAML)
    #[arg(short, long)]
    pub file: PathBuf,

    /// Connection secret (YAML map with endpoint, token and optional hostKeys)
    #[arg(short, long)]
    pub secret: PathBuf,

    /// Kind of the resource in --file
    #[arg(short, long, value_enum, default_value = "tenant")]
    pub kind: ResourceKind,

    /// Write the reconciled resource here
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Secret file contents: either a bare map or a Secret with `stringData`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SecretFile {
    Wrapped {
        #[serde(rename = "stringData")]
        string_data: BTreeMap<String, String>,
    },
    Flat(BTreeMap<String, String>),
}

impl SecretFile {
    fn into_data(self) -> BTreeMap<String, String> {
        match self {
            Self::Wrapped { string_data } => string_data,
            Self::Flat(data) => data,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReconcileOutput {
    pub kind: String,
    pub object: String,
    pub requeue: bool,
    pub phase: String,
    pub url: Option<String>,
    pub access_token_uid: Option<u64>,
    pub token_minted: bool,
}

impl CommandOutput for ReconcileOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!("{} {} reconciled", self.kind, self.object)];
        lines.push(format!("  phase: {}", if self.phase.is_empty() { "-" } else { &self.phase }));
        if let Some(url) = &self.url {
            lines.push(format!("  url: {url}"));
        }
        if let Some(uid) = self.access_token_uid {
            let note = if self.token_minted { " (newly minted)" } else { "" };
            lines.push(format!("  access token: {uid}{note}"));
        }
        if self.requeue {
            lines.push("  requeue requested".to_string());
        }
        lines.join("\n")
    }
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

async fn run_pass<T>(args: &ReconcileArgs, config: &Config) -> Result<ReconcileOutput>
where
    T: RepoObject + Serialize + DeserializeOwned,
{
    let mut object: T = read_yaml(&args.file)?;
    if object.metadata().namespace.is_empty() {
        object.metadata_mut().namespace = DEFAULT_NAMESPACE.to_string();
    }
    let secret: SecretFile = read_yaml(&args.secret)?;

    let store = Arc::new(InMemoryObjectStore::<T>::new());
    let secrets = Arc::new(InMemorySecretSource::new());
    let vault = Arc::new(InMemoryTokenVault::new());
    secrets
        .insert(&object.metadata().namespace, object.tenant_ref(), secret.into_data())
        .await;

    let registry = ProviderRegistry::new().with(Arc::new(GitLabProviderFactory::new(config.gitlab.clone())));
    let reconciler = Reconciler::new(
        config,
        Arc::new(registry),
        secrets,
        store.clone(),
        vault.clone(),
    );

    let mut object = store.insert(object).await;
    let outcome = reconciler
        .reconcile(&mut object)
        .await
        .with_context(|| format!("Reconcile of {} {} failed", object.kind(), object.key()))?;

    let namespace = object.metadata().namespace.clone();
    let name = object.metadata().name.clone();
    let stored = store.get(&namespace, &name).await?.unwrap_or(object);

    if let Some(path) = &args.output {
        let yaml = serde_yaml::to_string(&stored)?;
        std::fs::write(path, yaml).with_context(|| format!("Failed to write {}", path.display()))?;
    }

    let status = stored.repo_status();
    Ok(ReconcileOutput {
        kind: stored.kind().to_string(),
        object: stored.key(),
        requeue: outcome.requeue,
        phase: status.phase.as_str().to_string(),
        url: status.url.clone(),
        access_token_uid: status.access_token_uid,
        token_minted: !vault.is_empty().await,
    })
}

pub async fn execute(args: ReconcileArgs, config: &Config, json_mode: bool) -> Result<()> {
    let result = match args.kind {
        ResourceKind::Tenant => run_pass::<Tenant>(&args, config).await?,
        ResourceKind::Cluster => run_pass::<Cluster>(&args, config).await?,
    };
    output(&result, json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_file_shapes() {
        let flat: SecretFile = serde_yaml::from_str("endpoint: https://gitlab.com\ntoken: t\n").unwrap();
        assert_eq!(flat.into_data()["token"], "t");

        let wrapped: SecretFile = serde_yaml::from_str(
            "apiVersion: v1\nkind: Secret\nstringData:\n  endpoint: https://gitlab.com\n  token: t\n",
        )
        .unwrap();
        assert_eq!(wrapped.into_data()["endpoint"], "https://gitlab.com");
    }

    #[test]
    fn test_human_output() {
        let out = ReconcileOutput {
            kind: "Tenant".into(),
            object: "default/acme".into(),
            requeue: false,
            phase: "created".into(),
            url: Some("ssh://git@gitlab.com/acme/acme.git".into()),
            access_token_uid: Some(9),
            token_minted: true,
        };
        let text = out.to_human();
        assert!(text.contains("phase: created"));
        assert!(text.contains("access token: 9 (newly minted)"));
    }
}
