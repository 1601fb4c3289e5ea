use std::fs;
use std::time::Duration;

use chainrun_core::{ChainError, SampleConfig, SeedScheme, DEFAULT_BASE_SEED};

#[test]
fn yaml_config_overrides_defaults() {
    let config = SampleConfig::from_yaml_str(
        "seed: 7\nseed_scheme: substream\nmax_parallel: 2\ntimeout_secs: 30\nkeep_files: true\nnum_samples: 200\nthin: 2\nenv:\n  STAN_NUM_THREADS: \"1\"\n",
    )
    .expect("parse config");
    assert_eq!(config.seed, Some(7));
    assert_eq!(config.seed_scheme, SeedScheme::Substream);
    assert_eq!(config.max_parallel, Some(2));
    assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
    assert!(config.keep_files);
    assert_eq!(config.num_samples, 200);
    assert_eq!(config.num_warmup, 1000);
    assert_eq!(config.thin, Some(2));
    assert_eq!(config.env["STAN_NUM_THREADS"], "1");
}

#[test]
fn json_config_is_accepted() {
    let config = SampleConfig::from_yaml_str(r#"{"seed": 3, "max_parallel": 1}"#).expect("json");
    assert_eq!(config.base_seed(), 3);
    assert_eq!(config.parallelism(4), 1);
}

#[test]
fn unknown_option_is_invalid_argument() {
    let err = SampleConfig::from_yaml_str("seeed: 3\n").expect_err("typo must fail");
    assert!(matches!(err, ChainError::InvalidArgument(_)));
    assert_eq!(err.info().code, "config_parse");
}

#[test]
fn zero_parallelism_is_rejected() {
    let config = SampleConfig {
        max_parallel: Some(0),
        ..SampleConfig::default()
    };
    let err = config.validate().expect_err("zero parallelism");
    assert_eq!(err.info().code, "config_max_parallel");
}

#[test]
fn non_positive_timeout_is_rejected() {
    for bad in [0.0, -1.0, f64::NAN, f64::INFINITY, 1e30] {
        let config = SampleConfig {
            timeout_secs: Some(bad),
            ..SampleConfig::default()
        };
        let err = config.validate().expect_err("bad timeout");
        assert!(matches!(err, ChainError::InvalidArgument(_)));
        assert_eq!(err.info().code, "config_duration");
    }
    let err = SampleConfig::from_yaml_str("run_timeout_secs: 1.0e+30\n").expect_err("overflow");
    assert_eq!(err.info().context["field"], "run_timeout_secs");
}

#[test]
fn adapt_delta_must_be_a_probability() {
    let config = SampleConfig {
        adapt_delta: Some(1.0),
        ..SampleConfig::default()
    };
    assert!(config.validate().is_err());
    let config = SampleConfig {
        adapt_delta: Some(0.95),
        ..SampleConfig::default()
    };
    assert!(config.validate().is_ok());
}

#[test]
fn managed_arguments_cannot_be_smuggled_in() {
    for arg in [
        "seed=4",
        "output",
        "file=/tmp/x.csv",
        "id=9",
        "thin=5",
        "delta=0.9",
        "refresh=1",
    ] {
        let config = SampleConfig {
            extra_args: vec![arg.to_string()],
            ..SampleConfig::default()
        };
        let err = config.validate().expect_err(arg);
        assert_eq!(err.info().code, "config_extra_arg");
    }
    let config = SampleConfig {
        extra_args: vec!["init=0".to_string()],
        ..SampleConfig::default()
    };
    assert!(config.validate().is_ok());
}

#[test]
fn load_reads_from_disk_and_tags_path() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("sample.yaml");
    fs::write(&path, "max_parallel: 0\n").expect("write config");
    let err = SampleConfig::load(&path).expect_err("invalid config");
    assert_eq!(err.info().context["path"], path.display().to_string());

    fs::write(&path, "refresh: 100\n").expect("write config");
    let config = SampleConfig::load(&path).expect("valid config");
    assert_eq!(config.refresh, Some(100));
    assert_eq!(config.base_seed(), DEFAULT_BASE_SEED);
}
