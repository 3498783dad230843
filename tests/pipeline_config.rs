// tests/pipeline_config.rs
use footfall_dashboard::config::pipeline::{
    ENV_CADENCE_MINUTES, ENV_CONFIG_PATH, ENV_FETCH_TIMEOUT_SECS, ENV_SOURCE_TOKEN, ENV_SOURCE_URL,
};
use footfall_dashboard::PipelineConfig;
use std::{env, fs};

fn clear_env() {
    for k in [
        ENV_CONFIG_PATH,
        ENV_SOURCE_URL,
        ENV_SOURCE_TOKEN,
        ENV_CADENCE_MINUTES,
        ENV_FETCH_TIMEOUT_SECS,
    ] {
        env::remove_var(k);
    }
}

#[test]
fn load_from_file_reads_all_fields() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("pipeline.toml");
    fs::write(
        &p,
        r#"
source_url = "https://sensors.example.test/api"
cadence_minutes = 15
fetch_timeout_secs = 5
synthetic_seed = 9
refresh_capacity = 4
"#,
    )
    .unwrap();

    let cfg = PipelineConfig::load_from_file(&p).unwrap();
    assert_eq!(cfg.source_url.as_deref(), Some("https://sensors.example.test/api"));
    assert_eq!(cfg.cadence_minutes, 15);
    assert_eq!(cfg.fetch_timeout().as_secs(), 5);
    assert_eq!(cfg.synthetic_seed, 9);
    assert_eq!(cfg.refresh_capacity, 4);
}

#[serial_test::serial]
#[test]
fn default_uses_env_then_fallbacks() {
    // isolate CWD so the repo's own config/ is not picked up
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    clear_env();

    // 1) nothing → defaults, demo-only
    let d = PipelineConfig::load_default().unwrap();
    assert_eq!(d, PipelineConfig::default());
    assert!(d.source_url.is_none());

    // 2) fallback TOML in ./config/
    let cfg_dir = tmp.path().join("config");
    fs::create_dir_all(&cfg_dir).unwrap();
    fs::write(cfg_dir.join("pipeline.toml"), "cadence_minutes = 10\n").unwrap();
    assert_eq!(PipelineConfig::load_default().unwrap().cadence_minutes, 10);

    // 3) explicit path wins over the fallback
    let p_env = tmp.path().join("other.toml");
    fs::write(&p_env, "cadence_minutes = 30\n").unwrap();
    env::set_var(ENV_CONFIG_PATH, p_env.display().to_string());
    assert_eq!(PipelineConfig::load_default().unwrap().cadence_minutes, 30);

    // 4) single-value overrides on top
    env::set_var(ENV_CADENCE_MINUTES, "1");
    env::set_var(ENV_SOURCE_URL, "https://sensors.example.test");
    let o = PipelineConfig::load_default().unwrap();
    assert_eq!(o.cadence_minutes, 1);
    assert_eq!(o.source_url.as_deref(), Some("https://sensors.example.test"));

    // 5) missing explicit path is an error
    env::set_var(ENV_CONFIG_PATH, tmp.path().join("nope.toml").display().to_string());
    assert!(PipelineConfig::load_default().is_err());

    clear_env();
    env::set_current_dir(&old).unwrap();
}

#[serial_test::serial]
#[test]
fn token_env_placeholder_is_resolved() {
    let tmp = tempfile::tempdir().unwrap();
    clear_env();

    let p = tmp.path().join("pipeline.toml");
    fs::write(&p, "source_token = \"ENV\"\n").unwrap();
    env::set_var(ENV_CONFIG_PATH, p.display().to_string());

    // placeholder without the variable is an error
    assert!(PipelineConfig::load_default().is_err());

    env::set_var(ENV_SOURCE_TOKEN, "secret");
    let cfg = PipelineConfig::load_default().unwrap();
    assert_eq!(cfg.source_token.as_deref(), Some("secret"));

    clear_env();
}
