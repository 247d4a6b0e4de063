//! CSV-style table input and output.
//!
//! Input: `uid,value` rows with a header line; extra columns are joined
//! back into the value. Output: one header row of source ids, then one
//! row per joined uid. Values never contain commas in this format.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};

use anyhow::{bail, Context, Result};
use mppj_core::{JoinTable, PlainTable, MAX_VALUE_LEN};

/// Reads a plain table from a file, or stdin for `-`.
pub fn read_table(path: &str) -> Result<PlainTable> {
    match path {
        "-" => read_csv(BufReader::new(io::stdin())),
        _ => {
            let file = File::open(path).with_context(|| format!("opening {path}"))?;
            read_csv(BufReader::new(file))
        }
    }
}

fn read_csv<R: BufRead>(reader: R) -> Result<PlainTable> {
    let mut table = PlainTable::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("reading input table")?;
        if index == 0 || line.is_empty() {
            continue; // header
        }
        let Some((uid, value)) = line.split_once(',') else {
            bail!("line {} has no value column", index + 1);
        };
        if value.len() > MAX_VALUE_LEN {
            bail!(
                "value too long on line {}: {} > {}",
                index + 1,
                value.len(),
                MAX_VALUE_LEN
            );
        }
        table.insert(uid, value);
    }
    Ok(table)
}

/// Writes a join result to a file, or stdout for `-`.
pub fn write_join(table: &JoinTable, path: &str) -> Result<()> {
    match path {
        "-" => write_csv(table, &mut io::stdout().lock()),
        _ => {
            let mut file = File::create(path).with_context(|| format!("creating {path}"))?;
            write_csv(table, &mut file)
        }
    }
}

fn write_csv<W: Write>(table: &JoinTable, writer: &mut W) -> Result<()> {
    writeln!(writer, "{}", table.source_ids().join(","))?;
    for row in table.rows() {
        writeln!(writer, "{}", row.join(","))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn parses_rows_and_skips_header() {
        let input = "uid,value\nalice,100\nbob,200\n";
        let table = read_csv(BufReader::new(input.as_bytes())).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("alice"), Some("100"));
        assert_eq!(table.get("bob"), Some("200"));
    }

    #[test]
    fn rejects_rows_without_a_value() {
        let input = "uid,value\njust-a-uid\n";
        assert!(read_csv(BufReader::new(input.as_bytes())).is_err());
    }

    #[test]
    fn rejects_oversized_values() {
        let input = format!("uid,value\nu,{}\n", "x".repeat(MAX_VALUE_LEN + 1));
        assert!(read_csv(BufReader::new(input.as_bytes())).is_err());
    }

    #[test]
    fn writes_header_and_rows() {
        let mut table = JoinTable::new(vec!["a".into(), "b".into()]);
        let mut values = HashMap::new();
        values.insert("a".to_string(), "1".to_string());
        values.insert("b".to_string(), "2".to_string());
        table.insert(&values).unwrap();

        let mut out = Vec::new();
        write_csv(&table, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a,b\n1,2\n");
    }
}
