//! End-to-end runs against a mock update center.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use mockito::{Matcher, Mock, Server, ServerGuard};
use pim_cli::ops::{Context, InstallError};
use pim_cli::{Config, install_plugins};
use pim_core::metadata::MetadataUrls;
use pim_core::{NullReporter, Plugin, PluginError, PluginState};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tempfile::TempDir;

fn artifact(name: &str, version: &str) -> Vec<u8> {
    let manifest = format!(
        "Manifest-Version: 1.0\nShort-Name: {name}\nPlugin-Version: {version}\nJenkins-Version: 2.400\n"
    );
    zip_with(&[("META-INF/MANIFEST.MF", manifest.into_bytes())])
}

fn zip_with(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buf);
        for (name, bytes) in entries {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap();
    }
    buf.into_inner()
}

fn sha256_b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(Sha256::digest(bytes))
}

fn uc_entry(name: &str, version: &str, bytes: &[u8], deps: &[(&str, &str)]) -> Value {
    let deps: Vec<Value> = deps
        .iter()
        .map(|(n, v)| json!({"name": n, "version": v, "optional": false}))
        .collect();
    json!({
        "name": name,
        "version": version,
        "url": format!("https://unused.example.com/{name}.hpi"),
        "sha256": sha256_b64(bytes),
        "requiredCore": "2.400",
        "dependencies": deps,
    })
}

struct Fixture {
    server: ServerGuard,
    root: TempDir,
    mocks: Vec<Mock>,
}

impl Fixture {
    async fn new() -> Self {
        Self {
            server: Server::new_async().await,
            root: TempDir::new().unwrap(),
            mocks: Vec::new(),
        }
    }

    fn plugin_dir(&self) -> PathBuf {
        self.root.path().join("plugins")
    }

    fn urls(&self) -> MetadataUrls {
        let base = self.server.url();
        MetadataUrls {
            update_center: format!("{base}/update-center.json"),
            experimental: format!("{base}/experimental/update-center.json"),
            plugin_versions: format!("{base}/current/plugin-versions.json"),
        }
    }

    fn config(&self, plugins: Vec<Plugin>) -> Config {
        let mut config = Config::new(self.plugin_dir(), self.urls(), plugins);
        config.cache_dir = self.root.path().join("cache");
        config
    }

    /// Serve the three metadata documents. `host` selects the versioned
    /// update center query.
    async fn serve_metadata(&mut self, plugins: Value, host: Option<&str>) {
        let body = json!({"plugins": plugins, "warnings": []}).to_string();
        let mut uc = self.server.mock("GET", "/update-center.json");
        uc = match host {
            Some(v) => uc.match_query(Matcher::UrlEncoded("version".into(), v.into())),
            None => uc.match_query(Matcher::Any),
        };
        self.mocks.push(
            uc.with_status(200)
                .with_body(format!("updateCenter.post(\n{body}\n);"))
                .create_async()
                .await,
        );
        self.serve_secondary_metadata().await;
    }

    /// Empty experimental update center and plugin-versions documents.
    async fn serve_secondary_metadata(&mut self) {
        self.mocks.push(
            self.server
                .mock("GET", "/experimental/update-center.json")
                .with_status(200)
                .with_body(r#"{"plugins": {}}"#)
                .create_async()
                .await,
        );
        self.mocks.push(
            self.server
                .mock("GET", "/current/plugin-versions.json")
                .with_status(200)
                .with_body(r#"{"plugins": {}}"#)
                .create_async()
                .await,
        );
    }

    async fn serve_artifact(&mut self, name: &str, version: &str, bytes: Vec<u8>) -> Mock {
        self.server
            .mock("GET", format!("/download/plugins/{name}/{version}/{name}.hpi").as_str())
            .with_status(200)
            .with_body(bytes)
            .expect(1)
            .create_async()
            .await
    }

    async fn run(&self, config: Config) -> Result<pim_cli::InstallReport, InstallError> {
        let requested = config.plugins.clone();
        let ctx = Context::new(config, Arc::new(NullReporter)).unwrap();
        install_plugins(&ctx, requested).await
    }
}

fn manifest_version(path: &Path) -> String {
    let file = std::fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut entry = archive.by_name("META-INF/MANIFEST.MF").unwrap();
    let mut text = String::new();
    std::io::Read::read_to_string(&mut entry, &mut text).unwrap();
    text.lines()
        .find_map(|l| l.strip_prefix("Plugin-Version: "))
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_installs_dependencies_then_rerun_is_satisfied() {
    let mut fx = Fixture::new().await;
    let git = artifact("git", "2.0");
    let credentials = artifact("credentials", "1.5");
    fx.serve_metadata(
        json!({
            "git": uc_entry("git", "2.0", &git, &[("credentials", "1.5")]),
            "credentials": uc_entry("credentials", "1.5", &credentials, &[]),
        }),
        None,
    )
    .await;
    let git_mock = fx.serve_artifact("git", "2.0", git).await;
    let cred_mock = fx.serve_artifact("credentials", "1.5", credentials).await;

    let report = fx
        .run(fx.config(vec![Plugin::exact("git", "2.0")]))
        .await
        .unwrap();
    assert_eq!(report.installed, ["credentials", "git"]);
    assert!(report.is_success());
    assert_eq!(manifest_version(&fx.plugin_dir().join("git.jpi")), "2.0");
    assert_eq!(manifest_version(&fx.plugin_dir().join("credentials.jpi")), "1.5");
    assert!(!fx.plugin_dir().join("failedplugins.txt").exists());

    let rerun = fx
        .run(fx.config(vec![Plugin::exact("git", "2.0")]))
        .await
        .unwrap();
    assert!(rerun.installed.is_empty());
    assert_eq!(rerun.satisfied, ["credentials", "git"]);
    assert!(
        rerun
            .resolved
            .iter()
            .all(|p| p.state == PluginState::Satisfied)
    );

    // one download each across both runs
    git_mock.assert_async().await;
    cred_mock.assert_async().await;
}

#[tokio::test]
async fn test_checksum_mismatch_leaves_no_file() {
    let mut fx = Fixture::new().await;
    let published = artifact("solo", "1.0");
    fx.serve_metadata(
        json!({ "solo": uc_entry("solo", "1.0", &published, &[]) }),
        None,
    )
    .await;
    let _m = fx
        .serve_artifact("solo", "1.0", b"tampered bytes".to_vec())
        .await;

    let report = fx
        .run(fx.config(vec![Plugin::exact("solo", "1.0")]))
        .await
        .unwrap();

    assert!(!report.is_success());
    assert_eq!(report.failed.len(), 1);
    let failure = &report.failed[0];
    assert_eq!(failure.name, "solo");
    let expected = format!(
        "Invalid checksum for solo plugin 1.0, expected '{}', but got '{}'",
        sha256_b64(&published),
        sha256_b64(b"tampered bytes")
    );
    assert!(
        failure.reason.contains(&expected),
        "unexpected reason: {}",
        failure.reason
    );

    let dir = fx.plugin_dir();
    assert!(!dir.join("solo.jpi").exists());
    let leftovers: Vec<String> = std::fs::read_dir(&dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with(".solo-"))
        .collect();
    assert!(leftovers.is_empty(), "temp files left: {leftovers:?}");
    assert_eq!(
        std::fs::read_to_string(dir.join("failedplugins.txt")).unwrap(),
        "solo\n"
    );
}

#[tokio::test]
async fn test_upgrade_moves_previous_artifact_to_backup() {
    let mut fx = Fixture::new().await;
    let old = artifact("git", "1.0");
    std::fs::create_dir_all(fx.plugin_dir()).unwrap();
    std::fs::write(fx.plugin_dir().join("git.jpi"), &old).unwrap();

    let new = artifact("git", "2.0");
    fx.serve_metadata(json!({ "git": uc_entry("git", "2.0", &new, &[]) }), None)
        .await;
    let _m = fx.serve_artifact("git", "2.0", new).await;

    let report = fx
        .run(fx.config(vec![Plugin::exact("git", "2.0")]))
        .await
        .unwrap();

    assert_eq!(report.installed, ["git"]);
    assert_eq!(manifest_version(&fx.plugin_dir().join("git.jpi")), "2.0");
    assert_eq!(std::fs::read(fx.plugin_dir().join("git.bak")).unwrap(), old);
}

#[tokio::test]
async fn test_conflict_fails_before_downloading() {
    let mut fx = Fixture::new().await;
    let git = artifact("git", "2.0");
    let credentials = artifact("credentials", "1.5");
    fx.serve_metadata(
        json!({
            "git": uc_entry("git", "2.0", &git, &[("credentials", "1.5")]),
            "credentials": uc_entry("credentials", "1.5", &credentials, &[]),
        }),
        None,
    )
    .await;
    let never = fx
        .server
        .mock("GET", Matcher::Regex("^/download/".into()))
        .expect(0)
        .create_async()
        .await;

    let err = fx
        .run(fx.config(vec![
            Plugin::exact("credentials", "1.0"),
            Plugin::exact("git", "2.0"),
        ]))
        .await
        .unwrap_err();

    match err {
        InstallError::Plugin(PluginError::AggregatePrerequisitesNotMet(errors)) => {
            assert_eq!(errors.len(), 1);
            let msg = errors[0].to_string();
            assert!(msg.contains("credentials"), "{msg}");
            assert!(msg.contains("1.5"), "{msg}");
            assert!(msg.contains("1.0"), "{msg}");
        }
        other => panic!("unexpected error: {other}"),
    }
    never.assert_async().await;
}

#[tokio::test]
async fn test_dry_run_downloads_nothing() {
    let mut fx = Fixture::new().await;
    let git = artifact("git", "2.0");
    fx.serve_metadata(json!({ "git": uc_entry("git", "2.0", &git, &[]) }), None)
        .await;

    let mut config = fx.config(vec![Plugin::exact("git", "2.0")]);
    config.dry_run = true;
    let report = fx.run(config).await.unwrap();

    assert_eq!(report.resolved.len(), 1);
    assert_eq!(report.resolved[0].state, PluginState::VersionResolved);
    assert!(report.installed.is_empty());
    assert!(!fx.plugin_dir().join("git.jpi").exists());
}

#[tokio::test]
async fn test_bundled_dependency_and_versioned_update_center() {
    let mut fx = Fixture::new().await;
    let war = fx.root.path().join("jenkins.war");
    std::fs::write(
        &war,
        zip_with(&[
            (
                "META-INF/MANIFEST.MF",
                b"Manifest-Version: 1.0\nJenkins-Version: 2.440.1\n".to_vec(),
            ),
            (
                "WEB-INF/plugins/credentials.hpi",
                artifact("credentials", "1.6"),
            ),
        ]),
    )
    .unwrap();

    let git = artifact("git", "2.0");
    let credentials = artifact("credentials", "1.5");
    fx.serve_metadata(
        json!({
            "git": uc_entry("git", "2.0", &git, &[("credentials", "1.5")]),
            "credentials": uc_entry("credentials", "1.5", &credentials, &[]),
        }),
        Some("2.440.1"),
    )
    .await;
    let _m = fx.serve_artifact("git", "2.0", git).await;

    let mut config = fx.config(vec![Plugin::exact("git", "2.0")]);
    config.war = Some(war);
    let report = fx.run(config).await.unwrap();

    assert_eq!(report.installed, ["git"]);
    assert_eq!(report.satisfied, ["credentials"]);
    assert!(!fx.plugin_dir().join("credentials.jpi").exists());
}

#[tokio::test]
async fn test_plugin_needing_newer_host_is_rejected() {
    let mut fx = Fixture::new().await;
    let git = artifact("git", "2.0");
    let mut entry = uc_entry("git", "2.0", &git, &[]);
    entry["requiredCore"] = json!("2.500");
    fx.serve_metadata(json!({ "git": entry }), Some("2.440.1"))
        .await;

    let mut config = fx.config(vec![Plugin::exact("git", "2.0")]);
    config.host_version = Some("2.440.1".into());
    let err = fx.run(config).await.unwrap_err();

    assert!(
        err.to_string()
            .contains("requires host version 2.500, but the host is 2.440.1"),
        "{err}"
    );
}

#[tokio::test]
async fn test_latest_download_follows_host_specific_update_center() {
    let mut fx = Fixture::new().await;
    let listed = artifact("git", "5.0");
    let body = json!({
        "plugins": { "git": uc_entry("git", "5.0", &listed, &[]) },
        "warnings": [],
    });
    let redirect = fx
        .server
        .mock("GET", "/update-center.json")
        .match_query(Matcher::UrlEncoded("version".into(), "2.440.1".into()))
        .with_status(302)
        .with_header("location", "/dynamic-2.440.1/update-center.json")
        .expect(1)
        .create_async()
        .await;
    let _uc = fx
        .server
        .mock("GET", "/dynamic-2.440.1/update-center.json")
        .with_status(200)
        .with_body(body.to_string())
        .create_async()
        .await;
    fx.serve_secondary_metadata().await;

    // the global latest/ is newer than anything this host may run
    let global = fx
        .server
        .mock("GET", "/latest/git.hpi")
        .with_status(200)
        .with_body(artifact("git", "6.0"))
        .expect(0)
        .create_async()
        .await;
    let pinned = fx
        .server
        .mock("GET", "/dynamic-2.440.1/latest/git.hpi")
        .with_status(200)
        .with_body(listed)
        .expect(1)
        .create_async()
        .await;

    let mut config = fx.config(vec![Plugin::latest("git")]);
    config.host_version = Some("2.440.1".into());
    let report = fx.run(config).await.unwrap();

    assert!(report.is_success(), "{:?}", report.failed);
    assert_eq!(report.installed, ["git"]);
    assert_eq!(manifest_version(&fx.plugin_dir().join("git.jpi")), "5.0");
    redirect.assert_async().await;
    pinned.assert_async().await;
    global.assert_async().await;
}

#[tokio::test]
async fn test_missing_dependency_fails_its_dependents() {
    let mut fx = Fixture::new().await;
    let app = artifact("app", "1.0");
    let lib = artifact("lib", "1.0");
    let other = artifact("other", "1.0");
    fx.serve_metadata(
        json!({
            "app": uc_entry("app", "1.0", &app, &[("lib", "1.0")]),
            "lib": uc_entry("lib", "1.0", &lib, &[]),
            "other": uc_entry("other", "1.0", &other, &[]),
        }),
        None,
    )
    .await;
    let _app = fx.serve_artifact("app", "1.0", app).await;
    let _other = fx.serve_artifact("other", "1.0", other).await;
    // lib and its -plugin rename are both gone
    let _gone = fx
        .server
        .mock("GET", Matcher::Regex("^/download/plugins/lib".into()))
        .with_status(404)
        .create_async()
        .await;

    let mut config = fx.config(vec![Plugin::exact("app", "1.0"), Plugin::exact("other", "1.0")]);
    config.skip_failed = true;
    let report = fx.run(config).await.unwrap();

    assert_eq!(report.installed, ["other"]);
    let failed: Vec<&str> = report.failed.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(failed, ["app", "lib"]);
    assert_eq!(report.failed[0].reason, "Dependency lib failed to install");
    let app_state = report.resolved.iter().find(|p| p.name == "app").unwrap().state;
    assert_eq!(app_state, PluginState::Failed);
    assert_eq!(
        std::fs::read_to_string(fx.plugin_dir().join("failedplugins.txt")).unwrap(),
        "app\nlib\n"
    );
}
