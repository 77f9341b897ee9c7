#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn archetype(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("archetype").unwrap();
    cmd.current_dir(dir.path()).env("ARCHETYPE_ROOT", dir.path());
    cmd
}

fn init_site(dir: &TempDir) {
    archetype(dir).args(["init", "--name", "Test Site"]).assert().success();
}

const FUNNEL_SITE: &str = r#"
version: 1
site: { name: Funnels }
nonce: { secret: cli-secret }
fields:
  - { name: First name, meta_key: first_name, required: true }
  - { name: Plan, meta_key: plan, type: select, choices: { free: Free, pro: Pro }, admin: true }
forms:
  - { name: profile, fields: [first_name, plan] }
funnels:
  - name: signup
    phases:
      - { slug: tour, name: Tour, test: { type: once }, redirect: /tour }
      - { slug: profile, name: Profile, test: { type: usermeta, meta_key: first_name }, redirect: /profile }
"#;

fn funnel_site() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("archetype.yaml"), FUNNEL_SITE).unwrap();
    archetype(&dir)
        .args(["user", "create", "jo", "jo@example.com"])
        .assert()
        .success();
    dir
}

fn json_output(cmd: &mut Command) -> serde_json::Value {
    let out = cmd.output().unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    serde_json::from_slice(&out.stdout).unwrap()
}

// ---------------------------------------------------------------------------
// archetype init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_config_and_data_dirs() {
    let dir = TempDir::new().unwrap();
    archetype(&dir)
        .args(["init", "--name", "Test Site"])
        .assert()
        .success()
        .stdout(predicate::str::contains("created: archetype.yaml"));

    assert!(dir.path().join("archetype.yaml").exists());
    assert!(dir.path().join(".archetype/users").is_dir());

    let raw = std::fs::read_to_string(dir.path().join("archetype.yaml")).unwrap();
    let cfg: serde_yaml::Value = serde_yaml::from_str(&raw).unwrap();
    assert_eq!(cfg["site"]["name"].as_str(), Some("Test Site"));
}

#[test]
fn init_keeps_existing_config() {
    let dir = TempDir::new().unwrap();
    init_site(&dir);
    let before = std::fs::read_to_string(dir.path().join("archetype.yaml")).unwrap();

    archetype(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:"));

    let after = std::fs::read_to_string(dir.path().join("archetype.yaml")).unwrap();
    assert_eq!(before, after, "nonce secret must not be regenerated");
}

#[test]
fn commands_fail_before_init() {
    let dir = TempDir::new().unwrap();
    archetype(&dir)
        .arg("fields")
        .assert()
        .failure()
        .stderr(predicate::str::contains("archetype init"));
}

// ---------------------------------------------------------------------------
// archetype config
// ---------------------------------------------------------------------------

#[test]
fn config_validate_passes_on_fresh_site() {
    let dir = TempDir::new().unwrap();
    init_site(&dir);
    archetype(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_validate_fails_on_errors() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("archetype.yaml"),
        r#"
site: { name: Broken }
nonce: { secret: "" }
fields:
  - { name: Color, meta_key: color, type: select }
forms:
  - { name: profile, fields: [missing] }
"#,
    )
    .unwrap();

    archetype(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("nonce.secret is empty"))
        .stdout(predicate::str::contains("select field 'color' declares no choices"))
        .stdout(predicate::str::contains("unknown field 'missing'"));
}

#[test]
fn config_show_prints_loaded_config() {
    let dir = TempDir::new().unwrap();
    init_site(&dir);
    let v = json_output(archetype(&dir).args(["config", "show", "--json"]));
    assert_eq!(v["site"]["name"], "Test Site");
    assert_eq!(v["forms"][0]["name"], "profile");
}

// ---------------------------------------------------------------------------
// archetype fields / forms
// ---------------------------------------------------------------------------

#[test]
fn fields_lists_every_context() {
    let dir = funnel_site();
    let v = json_output(archetype(&dir).args(["fields", "--json"]));
    let pairs: Vec<(String, String)> = v
        .as_array()
        .unwrap()
        .iter()
        .map(|f| {
            (
                f["context"].as_str().unwrap().to_string(),
                f["slug"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    assert!(pairs.contains(&("admin".into(), "plan".into())));
    assert!(pairs.contains(&("frontend".into(), "first_name".into())));
    assert!(!pairs.contains(&("frontend".into(), "plan".into())));
}

#[test]
fn fields_filters_by_context() {
    let dir = funnel_site();
    archetype(&dir)
        .args(["fields", "--context", "admin"])
        .assert()
        .success()
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("first_name").not());
}

#[test]
fn fields_rejects_unknown_context() {
    let dir = funnel_site();
    archetype(&dir)
        .args(["fields", "--context", "sidebar"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown context 'sidebar'"));
}

#[test]
fn forms_lists_field_slugs() {
    let dir = funnel_site();
    archetype(&dir)
        .arg("forms")
        .assert()
        .success()
        .stdout(predicate::str::contains("profile"))
        .stdout(predicate::str::contains("first_name, plan"));
}

// ---------------------------------------------------------------------------
// archetype user
// ---------------------------------------------------------------------------

#[test]
fn user_create_list_and_meta() {
    let dir = TempDir::new().unwrap();
    init_site(&dir);

    archetype(&dir)
        .args(["user", "create", "admin", "admin@example.com", "--role", "administrator"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created user 1 (admin)"));
    archetype(&dir)
        .args(["user", "create", "jo", "jo@example.com"])
        .assert()
        .success();

    archetype(&dir)
        .args(["user", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("administrator"))
        .stdout(predicate::str::contains("jo@example.com"));

    archetype(&dir)
        .args(["user", "meta", "set", "2", "first_name", "Jo"])
        .assert()
        .success();
    archetype(&dir)
        .args(["user", "meta", "get", "2", "first_name"])
        .assert()
        .success()
        .stdout("Jo\n");

    let v = json_output(archetype(&dir).args(["user", "show", "2", "--json"]));
    assert_eq!(v["login"], "jo");
    assert_eq!(v["role"], "subscriber");
    assert_eq!(v["meta"]["first_name"], "Jo");
}

#[test]
fn user_create_rejects_duplicate_login() {
    let dir = TempDir::new().unwrap();
    init_site(&dir);
    archetype(&dir)
        .args(["user", "create", "jo", "jo@example.com"])
        .assert()
        .success();
    archetype(&dir)
        .args(["user", "create", "jo", "other@example.com"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already taken"));
}

#[test]
fn user_show_unknown_id_fails() {
    let dir = TempDir::new().unwrap();
    init_site(&dir);
    archetype(&dir)
        .args(["user", "show", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("user not found: 42"));
}

// ---------------------------------------------------------------------------
// archetype nonce
// ---------------------------------------------------------------------------

#[test]
fn nonce_prints_token() {
    let dir = funnel_site();
    let v = json_output(archetype(&dir).args(["nonce", "at_profile", "--user", "1", "--json"]));
    assert_eq!(v["action"], "at_profile");
    assert!(!v["nonce"].as_str().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// archetype funnel
// ---------------------------------------------------------------------------

#[test]
fn funnel_walks_phases_in_order() {
    let dir = funnel_site();

    let v = json_output(archetype(&dir).args(["funnel", "next", "signup", "--user", "1", "--json"]));
    assert_eq!(v["next"]["slug"], "tour");
    assert_eq!(v["completed"], false);

    archetype(&dir)
        .args(["funnel", "visit", "signup", "tour", "--user", "1"])
        .assert()
        .success();
    let v = json_output(archetype(&dir).args(["funnel", "next", "signup", "--user", "1", "--json"]));
    assert_eq!(v["next"]["slug"], "profile");

    archetype(&dir)
        .args(["user", "meta", "set", "1", "first_name", "Jo"])
        .assert()
        .success();
    archetype(&dir)
        .args(["funnel", "next", "signup", "--user", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("All phases passed."));

    archetype(&dir)
        .args(["funnel", "complete", "--user", "1"])
        .assert()
        .success();
    let v = json_output(archetype(&dir).args(["funnel", "next", "signup", "--user", "1", "--json"]));
    assert_eq!(v["completed"], true);
    assert!(v["next"].is_null());
}

#[test]
fn funnel_visit_rejects_unknown_phase() {
    let dir = funnel_site();
    archetype(&dir)
        .args(["funnel", "visit", "signup", "nope", "--user", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("has no phase 'nope'"));
    archetype(&dir)
        .args(["funnel", "next", "missing", "--user", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("funnel not found: missing"));
}
