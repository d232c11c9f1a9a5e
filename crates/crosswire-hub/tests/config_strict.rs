#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use crosswire_hub::config;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
engine:
  prefix: "api."
  timout_ms: 1000 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert!(matches!(
        err,
        crosswire_core::CrosswireError::Config(_)
    ));
}

#[test]
fn ok_minimal_config() {
    let ok = r#"
version: 1
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.version, 1);

    let engine = cfg.engine_options();
    assert_eq!(engine.timeout, Duration::from_secs(60 * 10));
    assert_eq!(engine.sweep_interval, Duration::from_secs(5));
    assert!(engine.throw_status);
    assert_eq!(cfg.server_options().emit_timeout, Duration::from_secs(60 * 8));
}

#[test]
fn rejects_unsupported_version() {
    let err = config::load_from_str("version: 3\n").expect_err("must fail");
    assert!(matches!(
        err,
        crosswire_core::CrosswireError::UnsupportedVersion
    ));
}

#[test]
fn rejects_timeout_below_sweep_interval() {
    let bad = r#"
version: 1
engine:
  timeout_ms: 100
  sweep_interval_ms: 5000
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert!(matches!(err, crosswire_core::CrosswireError::Config(_)));
}
