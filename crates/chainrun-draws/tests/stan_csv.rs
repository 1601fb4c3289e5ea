use std::fs;

use chainrun_core::ChainError;
use chainrun_draws::{parse, parse_str, DrawTable, CHAIN_COLUMN};

const BERNOULLI: &str = "\
# stan_version_major = 2
# stan_version_minor = 30
# model = bernoulli_model
# method = sample (Default)
#   sample
#     num_samples = 3
#     num_warmup = 1000 (Default)
# id = 2
# random
#   seed = 1235
lp__,accept_stat__,stepsize__,treedepth__,n_leapfrog__,divergent__,energy__,theta
# Adaptation terminated
# Step size = 0.932037
# Diagonal elements of inverse mass matrix:
# 0.530606
-6.74802,0.957476,0.932037,1,3,0,6.96838,0.246618
-7.01756,0.935383,0.932037,1,3,0,7.28646,0.185455
-6.80231,1,0.932037,1,1,0,6.96188,0.299121
# 
#  Elapsed Time: 0.005 seconds (Warm-up)
#                0.011 seconds (Sampling)
#                0.016 seconds (Total)
# 
";

#[test]
fn parses_header_rows_and_metadata() {
    let table = parse_str(BERNOULLI).expect("parse");
    assert_eq!(table.num_columns(), 8);
    assert_eq!(table.num_draws(), 3);
    assert_eq!(table.parameter_names(), vec!["theta"]);
    assert_eq!(table.column("theta").unwrap(), vec![0.246618, 0.185455, 0.299121]);
    assert_eq!(table.metadata["id"], "2");
    assert_eq!(table.metadata["seed"], "1235");
    assert_eq!(table.metadata["num_warmup"], "1000");
}

#[test]
fn comments_between_rows_keep_alignment() {
    let text = "a,b\n1,2\n# interleaved\n3,4\n#x\n5,6\n";
    let table = parse_str(text).expect("parse");
    let second = table.draw(1).unwrap();
    assert_eq!(second.get("a"), Some(3.0));
    assert_eq!(second.get("b"), Some(4.0));
    assert_eq!(table.draw(2).unwrap().to_map()["b"], 6.0);
}

#[test]
fn header_only_output_has_no_draws() {
    let table = parse_str("# nothing sampled\nlp__,mu\n").expect("parse");
    assert_eq!(table.num_draws(), 0);
    assert_eq!(table.columns().collect::<Vec<_>>(), vec!["lp__", "mu"]);
}

#[test]
fn non_finite_tokens_are_numeric() {
    let table = parse_str("x,y,z\nnan,inf,-inf\n").expect("parse");
    let draw = table.draw(0).unwrap();
    assert!(draw.get("x").unwrap().is_nan());
    assert_eq!(draw.get("y"), Some(f64::INFINITY));
    assert_eq!(draw.get("z"), Some(f64::NEG_INFINITY));
}

#[test]
fn missing_header_is_malformed() {
    for text in ["", "# only comments\n# more\n"] {
        let err = parse_str(text).expect_err("no header");
        assert!(matches!(err, ChainError::MalformedOutput(_)));
        assert_eq!(err.info().code, "draws_missing_header");
    }
}

#[test]
fn column_count_mismatch_reports_line() {
    let err = parse_str("a,b,c\n1,2,3\n4,5\n").expect_err("short row");
    assert_eq!(err.info().code, "draws_width");
    assert_eq!(err.info().context["line"], "3");
    assert_eq!(err.info().context["expected"], "3");
    assert_eq!(err.info().context["found"], "2");
}

#[test]
fn truncated_output_is_detected() {
    let err = parse_str("a,b\n1,2\n3,4").expect_err("no trailing newline");
    assert_eq!(err.info().code, "draws_truncated");
    let err = parse_str("a,b\n1,2\n3,").expect_err("partial row");
    assert_eq!(err.info().code, "draws_truncated");
}

#[test]
fn non_numeric_field_is_malformed() {
    let err = parse_str("a,b\n1,oops\n").expect_err("text field");
    assert_eq!(err.info().code, "draws_non_numeric");
    assert_eq!(err.info().context["column"], "b");
}

#[test]
fn duplicate_header_is_malformed() {
    let err = parse_str("a,a\n1,2\n").expect_err("duplicate");
    assert_eq!(err.info().code, "draws_duplicate_column");
}

#[test]
fn parse_reads_from_disk_and_tags_path() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("output-1.csv");
    fs::write(&path, BERNOULLI).expect("write");
    assert_eq!(parse(&path).expect("parse").num_draws(), 3);

    let missing = dir.path().join("output-9.csv");
    let err = parse(&missing).expect_err("missing file");
    assert_eq!(err.info().code, "draws_read");
    assert_eq!(err.info().context["path"], missing.display().to_string());
}

#[test]
fn merge_chains_prefixes_chain_id() {
    let first = parse_str("mu\n1\n2\n").unwrap();
    let second = parse_str("mu\n3\n").unwrap();
    let merged = DrawTable::merge_chains(&[(1, &first), (2, &second)]).expect("merge");
    assert_eq!(merged.columns().next(), Some(CHAIN_COLUMN));
    assert_eq!(merged.column(CHAIN_COLUMN).unwrap(), vec![1.0, 1.0, 2.0]);
    assert_eq!(merged.column("mu").unwrap(), vec![1.0, 2.0, 3.0]);
}

#[test]
fn merge_rejects_mismatched_layouts() {
    let first = parse_str("mu,sigma\n1,2\n").unwrap();
    let swapped = parse_str("sigma,mu\n2,1\n").unwrap();
    let err = DrawTable::merge_chains(&[(1, &first), (2, &swapped)]).expect_err("layout");
    assert_eq!(err.info().code, "draws_merge_columns");
}

#[test]
fn csv_export_round_trips_through_parser() {
    let table = parse_str(BERNOULLI).unwrap();
    let mut buffer = Vec::new();
    table.write_csv(&mut buffer).expect("write csv");
    let back = parse_str(std::str::from_utf8(&buffer).unwrap()).unwrap();
    assert_eq!(back.column("theta"), table.column("theta"));
    assert_eq!(back.num_draws(), table.num_draws());
}

#[test]
fn tables_serialize_to_json() {
    let table = parse_str("mu\n0.5\n").unwrap();
    let json = serde_json::to_value(&table).expect("json");
    assert_eq!(json["columns"][0], "mu");
    assert_eq!(json["rows"][0][0], 0.5);
}
