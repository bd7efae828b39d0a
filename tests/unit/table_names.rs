use pg_migration_harness::naming::{generate_scoped_table_name, is_valid_sql_identifier};
use rstest::rstest;
use std::collections::HashSet;

#[rstest]
#[case::default_prefix("test_users")]
#[case::bench_prefix("bench_users")]
#[case::short("t")]
#[case::leading_underscore("_scratch")]
fn test_scoped_name_starts_with_prefix(#[case] prefix: &str) {
    let name = generate_scoped_table_name(prefix);
    assert!(
        name.starts_with(&format!("{}_", prefix)),
        "{} should start with {}_",
        name,
        prefix
    );
    assert!(is_valid_sql_identifier(&name));
}

#[test]
fn test_scoped_names_unique_within_process() {
    let names: HashSet<String> = (0..10)
        .map(|_| generate_scoped_table_name("test_users"))
        .collect();
    // 10 draws from 10k suffixes: a repeat is a one-in-two-hundred event at worst
    assert!(names.len() >= 9);
}
