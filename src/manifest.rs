//! The Manifest Parameterizer.
//!
//! Engine templates are parameterized by literal substitution: each override
//! names the default the template ships with and the value replacing it.
//! Every substitution reports what it did, so a template whose defaults
//! changed format is detected instead of being submitted unchanged.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use snafu::{ResultExt, Snafu};

use crate::{cluster::Parameterizer, experiment::EngineParams};

/// Namespace the engine template is written for.
pub const DEFAULT_NAMESPACE: &str = "namespace: default";
/// Engine name the engine template is written for.
pub const DEFAULT_ENGINE_NAME: &str = "name: nginx-chaos";
pub const DEFAULT_APP_NAMESPACE: &str = "appns: 'default'";
pub const DEFAULT_ANNOTATION_CHECK: &str = "annotationCheck: 'true'";
pub const DEFAULT_APP_LABEL: &str = "applabel: 'app=nginx'";
pub const DEFAULT_TOTAL_CHAOS_DURATION: &str = "value: '30'";
pub const DEFAULT_CHAOS_INTERVAL: &str = "value: '10'";
pub const DEFAULT_FORCE: &str = "value: 'false'";

/// What a single substitution did to a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Substitution {
    /// The old literal was found and replaced this many times.
    Replaced(usize),
    /// The old literal is gone and the new one is in place.
    AlreadyApplied,
    /// Neither the old nor the new literal is where it was expected.
    Missing,
}

/// Replace every occurrence of `old` with `new`.
///
/// Re-running with the same pair on the result is a no-op reporting
/// [`Substitution::AlreadyApplied`], even when `new` contains `old`.
pub fn substitute(text: &str, old: &str, new: &str) -> (String, Substitution) {
    let already_applied = text.contains(new) && (!text.contains(old) || new.contains(old));
    if already_applied && old != new {
        return (text.to_owned(), Substitution::AlreadyApplied);
    }

    let replaced = text.matches(old).count();
    if replaced == 0 {
        return (text.to_owned(), Substitution::Missing);
    }
    (text.replace(old, new), Substitution::Replaced(replaced))
}

/// Replace `old` with `new` on the line following the first line naming
/// `key`, e.g. the `value:` line of a `- name: KEY` entry.
pub fn substitute_keyed(text: &str, key: &str, old: &str, new: &str) -> (String, Substitution) {
    let mut lines: Vec<String> = text.split_inclusive('\n').map(ToOwned::to_owned).collect();

    let Some(key_line) = lines.iter().position(|line| names_key(line, key)) else {
        return (text.to_owned(), Substitution::Missing);
    };
    let Some(value_line) = lines.get_mut(key_line + 1) else {
        return (text.to_owned(), Substitution::Missing);
    };

    let substitution = if value_line.contains(old) {
        let replaced = value_line.matches(old).count();
        *value_line = value_line.replace(old, new);
        Substitution::Replaced(replaced)
    } else if value_line.contains(new) {
        Substitution::AlreadyApplied
    } else {
        Substitution::Missing
    };

    (lines.concat(), substitution)
}

/// Whether `line` is a mapping entry whose scalar value is `key`.
fn names_key(line: &str, key: &str) -> bool {
    line.rsplit_once(':')
        .map(|(_, value)| value.trim().trim_matches(|c| c == '\'' || c == '"'))
        .map_or(false, |value| value == key)
}

/// How an override locates the literal it replaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Anywhere in the manifest.
    Text,
    /// On the value line of the named entry.
    Keyed(&'static str),
}

/// A single engine template override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Override {
    /// Human readable name, used in logs and errors.
    pub field: &'static str,
    pub target: Target,
    pub old: String,
    pub new: String,
}

impl Override {
    fn text(field: &'static str, old: &str, new: String) -> Self {
        Self {
            field,
            target: Target::Text,
            old: old.to_owned(),
            new,
        }
    }

    fn keyed(field: &'static str, key: &'static str, old: &str, new: String) -> Self {
        Self {
            field,
            target: Target::Keyed(key),
            old: old.to_owned(),
            new,
        }
    }

    /// Apply this override to the manifest at `path`.
    pub async fn apply(
        &self,
        parameterizer: &dyn Parameterizer,
        path: &Path,
    ) -> crate::Result<Substitution> {
        match self.target {
            Target::Text => parameterizer.parameterize(path, &self.old, &self.new).await,
            Target::Keyed(key) => {
                parameterizer
                    .parameterize_value(path, key, &self.old, &self.new)
                    .await
            }
        }
    }
}

/// Every override an engine template needs before it can be submitted.
pub fn engine_overrides(namespace: &str, params: &EngineParams) -> Vec<Override> {
    vec![
        Override::text("namespace", DEFAULT_NAMESPACE, format!("namespace: {}", namespace)),
        Override::text(
            "engine_name",
            DEFAULT_ENGINE_NAME,
            format!("name: {}", params.engine_name),
        ),
        Override::text(
            "app_namespace",
            DEFAULT_APP_NAMESPACE,
            format!("appns: '{}'", params.app_namespace),
        ),
        Override::text(
            "annotation_check",
            DEFAULT_ANNOTATION_CHECK,
            format!("annotationCheck: '{}'", params.annotation_check),
        ),
        Override::text(
            "app_label",
            DEFAULT_APP_LABEL,
            format!("applabel: '{}'", params.app_label),
        ),
        Override::keyed(
            "total_chaos_duration",
            "TOTAL_CHAOS_DURATION",
            DEFAULT_TOTAL_CHAOS_DURATION,
            format!("value: '{}'", params.total_chaos_duration),
        ),
        Override::keyed(
            "chaos_interval",
            "CHAOS_INTERVAL",
            DEFAULT_CHAOS_INTERVAL,
            format!("value: '{}'", params.chaos_interval),
        ),
        Override::keyed(
            "force",
            "FORCE",
            DEFAULT_FORCE,
            format!("value: '{}'", params.force),
        ),
    ]
}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("unable to read manifest {:?}: {}", path, source))]
    ReadManifest {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("unable to write manifest {:?}: {}", path, source))]
    WriteManifest {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Parameterizes manifests in place on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileParameterizer;

impl FileParameterizer {
    async fn rewrite<F>(&self, path: &Path, substitute: F) -> crate::Result<Substitution>
    where
        F: FnOnce(&str) -> (String, Substitution) + Send,
    {
        let text = tokio::fs::read_to_string(path)
            .await
            .context(ReadManifestSnafu { path })?;
        let (text, substitution) = substitute(&text);
        if let Substitution::Replaced(_) = substitution {
            tokio::fs::write(path, text)
                .await
                .context(WriteManifestSnafu { path })?;
        }
        Ok(substitution)
    }
}

#[async_trait]
impl Parameterizer for FileParameterizer {
    async fn parameterize(&self, path: &Path, old: &str, new: &str) -> crate::Result<Substitution> {
        self.rewrite(path, |text| substitute(text, old, new)).await
    }

    async fn parameterize_value(
        &self,
        path: &Path,
        field_key: &str,
        old: &str,
        new: &str,
    ) -> crate::Result<Substitution> {
        self.rewrite(path, |text| substitute_keyed(text, field_key, old, new))
            .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use indoc::indoc;

    use super::*;

    pub(crate) const ENGINE_TEMPLATE: &str = indoc! {"
        apiVersion: litmuschaos.io/v1alpha1
        kind: ChaosEngine
        metadata:
          name: nginx-chaos
          namespace: default
        spec:
          appinfo:
            appns: 'default'
            applabel: 'app=nginx'
            appkind: 'deployment'
          annotationCheck: 'true'
          engineState: 'active'
          chaosServiceAccount: pod-delete-sa
          experiments:
            - name: pod-delete
              spec:
                components:
                  env:
                    - name: TOTAL_CHAOS_DURATION
                      value: '30'

                    - name: CHAOS_INTERVAL
                      value: '10'

                    - name: FORCE
                      value: 'false'
    "};

    pub(crate) fn params() -> EngineParams {
        EngineParams {
            engine_name: "engine1".to_owned(),
            app_namespace: "litmus".to_owned(),
            app_label: "run=nginx".to_owned(),
            annotation_check: false,
            total_chaos_duration: 15,
            chaos_interval: 5,
            force: true,
        }
    }

    fn value_of(text: &str, key: &str) -> String {
        let mut lines = text.lines();
        lines.find(|line| names_key(line, key)).unwrap();
        lines.next().unwrap().trim().to_owned()
    }

    fn apply_all(text: &str, overrides: &[Override]) -> (String, Vec<Substitution>) {
        let mut text = text.to_owned();
        let mut results = Vec::new();
        for item in overrides {
            let (next, substitution) = match item.target {
                Target::Text => substitute(&text, &item.old, &item.new),
                Target::Keyed(key) => substitute_keyed(&text, key, &item.old, &item.new),
            };
            text = next;
            results.push(substitution);
        }
        (text, results)
    }

    #[test]
    fn text_substitution_replaces_every_occurrence() {
        let (text, substitution) = substitute("a: x\nb: x\n", "x", "y");
        assert_eq!(text, "a: y\nb: y\n");
        assert_eq!(substitution, Substitution::Replaced(2));
    }

    #[test]
    fn text_substitution_is_idempotent() {
        let (once, _) = substitute(ENGINE_TEMPLATE, DEFAULT_NAMESPACE, "namespace: litmus");
        let (twice, substitution) = substitute(&once, DEFAULT_NAMESPACE, "namespace: litmus");
        similar_asserts::assert_eq!(once, twice);
        assert_eq!(substitution, Substitution::AlreadyApplied);
    }

    #[test]
    fn text_substitution_is_idempotent_when_new_extends_old() {
        let (once, _) = substitute(ENGINE_TEMPLATE, DEFAULT_ENGINE_NAME, "name: nginx-chaos-2");
        let (twice, substitution) = substitute(&once, DEFAULT_ENGINE_NAME, "name: nginx-chaos-2");
        similar_asserts::assert_eq!(once, twice);
        assert_eq!(substitution, Substitution::AlreadyApplied);
    }

    #[test]
    fn text_substitution_reports_missing_default() {
        let (text, substitution) =
            substitute("appns: \"default\"\n", DEFAULT_APP_NAMESPACE, "appns: 'x'");
        assert_eq!(text, "appns: \"default\"\n");
        assert_eq!(substitution, Substitution::Missing);
    }

    #[test]
    fn keyed_substitution_only_touches_the_named_entry() {
        let (text, substitution) =
            substitute_keyed(ENGINE_TEMPLATE, "CHAOS_INTERVAL", "value: '10'", "value: '30'");
        assert_eq!(substitution, Substitution::Replaced(1));
        assert_eq!(value_of(&text, "TOTAL_CHAOS_DURATION"), "value: '30'");
        assert_eq!(value_of(&text, "CHAOS_INTERVAL"), "value: '30'");
        assert_eq!(value_of(&text, "FORCE"), "value: 'false'");
    }

    #[test]
    fn keyed_substitution_does_not_match_longer_keys() {
        let (_, substitution) =
            substitute_keyed(ENGINE_TEMPLATE, "CHAOS", "value: '10'", "value: '1'");
        assert_eq!(substitution, Substitution::Missing);
    }

    #[test]
    fn keyed_substitution_is_idempotent() {
        let (once, _) = substitute_keyed(ENGINE_TEMPLATE, "FORCE", DEFAULT_FORCE, "value: 'true'");
        let (twice, substitution) =
            substitute_keyed(&once, "FORCE", DEFAULT_FORCE, "value: 'true'");
        similar_asserts::assert_eq!(once, twice);
        assert_eq!(substitution, Substitution::AlreadyApplied);
    }

    #[test]
    fn keyed_substitution_at_end_of_input() {
        let (text, substitution) = substitute_keyed("- name: FORCE", "FORCE", "a", "b");
        assert_eq!(text, "- name: FORCE");
        assert_eq!(substitution, Substitution::Missing);
    }

    #[test]
    fn engine_overrides_remove_every_default() {
        let overrides = engine_overrides("litmus", &params());
        let (text, results) = apply_all(ENGINE_TEMPLATE, &overrides);

        assert!(results
            .iter()
            .all(|result| matches!(result, Substitution::Replaced(_))));
        for item in &overrides {
            assert!(!text.contains(&item.old), "{} left in place", item.field);
            assert!(text.contains(&item.new), "{} not applied", item.field);
        }
    }

    #[test]
    fn engine_overrides_rerun_is_a_no_op() {
        let overrides = engine_overrides("litmus", &params());
        let (once, _) = apply_all(ENGINE_TEMPLATE, &overrides);
        let (twice, results) = apply_all(&once, &overrides);

        similar_asserts::assert_eq!(once, twice);
        assert!(results
            .iter()
            .all(|result| *result == Substitution::AlreadyApplied));
    }

    #[tokio::test]
    async fn file_parameterizer_rewrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pod-delete-ce.yaml");
        std::fs::write(&path, ENGINE_TEMPLATE).unwrap();

        let parameterizer = FileParameterizer;
        let result = parameterizer
            .parameterize_value(
                &path,
                "TOTAL_CHAOS_DURATION",
                DEFAULT_TOTAL_CHAOS_DURATION,
                "value: '15'",
            )
            .await
            .unwrap();

        assert_eq!(result, Substitution::Replaced(1));
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(value_of(&text, "TOTAL_CHAOS_DURATION"), "value: '15'");
    }

    #[tokio::test]
    async fn file_parameterizer_leaves_file_untouched_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.yaml");
        std::fs::write(&path, "kind: ChaosEngine\n").unwrap();

        let result = FileParameterizer
            .parameterize(&path, DEFAULT_NAMESPACE, "namespace: litmus")
            .await
            .unwrap();

        assert_eq!(result, Substitution::Missing);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "kind: ChaosEngine\n");
    }

    #[tokio::test]
    async fn file_parameterizer_reports_unreadable_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let error = FileParameterizer
            .parameterize(&dir.path().join("absent.yaml"), "a", "b")
            .await
            .unwrap_err();
        assert!(error.to_string().contains("unable to read manifest"));
    }
}
