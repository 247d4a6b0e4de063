//! End-to-end pipeline scenarios: prepare → convert → join in-process,
//! checked against the plaintext join oracle.

use std::collections::HashMap;

use mppj_core::{
    table::{gen_test_tables, plain_intersect},
    DataSource, Helper, JoinTable, PlainTable, Receiver, SourceId,
};
use mppj_crypto::pke::keys_from_seed;
use rand::Rng;

const SID: &[u8] = b"scenario-session";

fn run_pipeline(
    tables: &HashMap<SourceId, PlainTable>,
    source_ids: &[SourceId],
    n_rows: usize,
) -> JoinTable {
    let (rsk, rpk) = keys_from_seed(SID);
    let receiver = Receiver::with_keys(SID, source_ids.to_vec(), rsk, rpk);
    let ds = DataSource::new(SID, rpk);
    let helper = Helper::new(SID, source_ids, n_rows);

    let mut enc_tables = HashMap::new();
    for (id, table) in tables {
        enc_tables.insert(id.clone(), ds.prepare(table).unwrap());
    }
    let converted = helper.convert(&rpk, &enc_tables).unwrap();
    assert_eq!(converted.len(), source_ids.len() * n_rows);
    receiver.join(converted).unwrap()
}

fn table_of(rows: &[(&str, &str)]) -> PlainTable {
    let mut table = PlainTable::new();
    for (uid, val) in rows {
        table.insert(*uid, *val);
    }
    table
}

fn ids(names: &[&str]) -> Vec<SourceId> {
    names.iter().map(|n| n.to_string()).collect()
}

#[test]
fn two_sources_single_overlap() {
    let source_ids = ids(&["t1", "t2"]);
    let mut tables = HashMap::new();
    tables.insert(source_ids[0].clone(), table_of(&[("a", "x"), ("b", "y")]));
    tables.insert(source_ids[1].clone(), table_of(&[("a", "z"), ("c", "w")]));

    let joined = run_pipeline(&tables, &source_ids, 2);
    assert_eq!(joined.len(), 1);
    assert_eq!(joined.rows()[0], vec!["x".to_string(), "z".to_string()]);
}

#[test]
fn three_sources_identical_tables() {
    let source_ids = ids(&["t1", "t2", "t3"]);
    let mut tables = HashMap::new();
    for id in &source_ids {
        tables.insert(id.clone(), table_of(&[("u1", "v1")]));
    }

    let joined = run_pipeline(&tables, &source_ids, 1);
    assert_eq!(joined.len(), 1);
    assert_eq!(joined.rows()[0], vec!["v1".to_string(); 3]);
}

#[test]
fn disjoint_tables_join_empty() {
    let source_ids = ids(&["t1", "t2"]);
    let mut tables = HashMap::new();
    tables.insert(source_ids[0].clone(), table_of(&[("u1", "v1")]));
    tables.insert(source_ids[1].clone(), table_of(&[("u2", "v2")]));

    let joined = run_pipeline(&tables, &source_ids, 1);
    assert!(joined.is_empty());
}

#[test]
fn three_sources_large_tables_small_intersection() {
    // 1000 rows per source, 5 shared uids, random printable values.
    let source_ids = ids(&["t1", "t2", "t3"]);
    let n_rows = 1000;
    let mut rng = rand::thread_rng();
    let mut random_value = |len: usize| -> String {
        (0..len)
            .map(|_| char::from(rng.gen_range(b'a'..=b'z')))
            .collect()
    };

    let mut tables: HashMap<SourceId, PlainTable> = HashMap::new();
    for id in &source_ids {
        let mut table = PlainTable::new();
        for i in 0..5 {
            table.insert(format!("shared_{i}"), random_value(1 + i % 30));
        }
        for i in 0..n_rows - 5 {
            table.insert(format!("{id}_{i}"), random_value(1 + i % 30));
        }
        tables.insert(id.clone(), table);
    }

    let joined = run_pipeline(&tables, &source_ids, n_rows);
    assert_eq!(joined.len(), 5);
    assert!(joined.same_contents(&plain_intersect(&tables, &source_ids).unwrap()));
}

#[test]
fn value_of_exactly_thirty_bytes_roundtrips() {
    let source_ids = ids(&["t1", "t2"]);
    let long_value = "A".repeat(30);
    let mut tables = HashMap::new();
    tables.insert(
        source_ids[0].clone(),
        table_of(&[("u1", long_value.as_str())]),
    );
    tables.insert(source_ids[1].clone(), table_of(&[("u1", "short")]));

    let joined = run_pipeline(&tables, &source_ids, 1);
    assert_eq!(joined.len(), 1);
    assert_eq!(joined.rows()[0], vec![long_value, "short".to_string()]);
}

#[test]
fn shared_uid_with_differing_values_joins_per_column() {
    let source_ids = ids(&["t1", "t2"]);
    let mut tables = HashMap::new();
    tables.insert(source_ids[0].clone(), table_of(&[("common", "left")]));
    tables.insert(source_ids[1].clone(), table_of(&[("common", "right")]));

    let joined = run_pipeline(&tables, &source_ids, 1);
    assert_eq!(joined.len(), 1);
    assert_eq!(
        joined.rows()[0],
        vec!["left".to_string(), "right".to_string()]
    );
}

#[test]
fn pipeline_matches_plain_join_on_generated_tables() {
    let source_ids = ids(&["ds1", "ds2", "ds3"]);
    let tables = gen_test_tables(&source_ids, 10, 3);

    let joined = run_pipeline(&tables, &source_ids, 10);
    let oracle = plain_intersect(&tables, &source_ids).unwrap();
    assert_eq!(joined.len(), 3);
    assert!(joined.same_contents(&oracle));
}
