use ignite_di::{IgniteConfig, Ignition, Role};
use serial_test::serial;
use std::env;

const VARS: [&str; 5] = [
    "IGNITE_ROLE",
    "IGNITE_ALLOW",
    "IGNITE_INCLUDE_OPTIONAL",
    "IGNITE_MAX_IDLE_CONTEXTS",
    "IGNITE_MAX_DEPTH",
];

fn clear() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn defaults_without_environment() {
    clear();
    let config = IgniteConfig::from_env().unwrap();
    assert_eq!(config, IgniteConfig::default());
    assert_eq!(config.role, Role::Server);
    assert_eq!(config.max_idle_contexts, 16);
}

#[test]
#[serial]
fn environment_overrides_defaults() {
    clear();
    env::set_var("IGNITE_ROLE", "client");
    env::set_var("IGNITE_ALLOW", "view/Camera,view/Hud");
    env::set_var("IGNITE_INCLUDE_OPTIONAL", "view/Debug");
    env::set_var("IGNITE_MAX_DEPTH", "64");

    let config = IgniteConfig::from_env().unwrap();
    clear();

    assert_eq!(config.role, Role::Client);
    assert!(config.is_allowed("view/Hud"));
    assert!(!config.is_allowed("net/Server"));
    assert!(config.includes_optional("view/Debug"));
    assert_eq!(config.max_depth, 64);

    let ignition = Ignition::with_config(config.clone());
    assert_eq!(ignition.config(), &config);
}

#[test]
#[serial]
fn malformed_environment_is_rejected() {
    clear();
    env::set_var("IGNITE_MAX_IDLE_CONTEXTS", "many");
    let result = IgniteConfig::from_env();
    clear();
    assert!(result.is_err());
}
