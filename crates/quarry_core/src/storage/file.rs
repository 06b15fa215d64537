//! Newline delimited json files used for on-disk extents and spilled
//! aggregate tables.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;

use quarry_error::{Result, ResultExt};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Write every item as a json line, truncating the file if it exists.
///
/// Returns the number of items written.
pub fn write_jsonl<'a, T>(path: &Path, items: impl IntoIterator<Item = &'a T>) -> Result<usize>
where
    T: Serialize + 'a,
{
    let file = File::create(path)
        .context_fn(|| format!("Failed to create file '{}'", path.display()))?;
    let mut writer = BufWriter::new(file);

    let mut count = 0;
    for item in items {
        serde_json::to_writer(&mut writer, item).context("Failed to serialize item")?;
        writer.write_all(b"\n")?;
        count += 1;
    }
    writer.flush()?;

    Ok(count)
}

pub fn read_jsonl<T>(path: &Path) -> Result<Vec<T>>
where
    T: DeserializeOwned,
{
    let file =
        File::open(path).context_fn(|| format!("Failed to open file '{}'", path.display()))?;
    let reader = BufReader::new(file);

    let mut items = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let item = serde_json::from_str(&line)
            .context_fn(|| format!("Failed to deserialize line in '{}'", path.display()))?;
        items.push(item);
    }

    Ok(items)
}

/// Remove a file, ignoring files that no longer exist.
pub fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).context_fn(|| format!("Failed to remove file '{}'", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::record::Record;
    use crate::record;

    #[test]
    fn write_read_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jsonl");

        let records = vec![record![1, "a", 1.5], record![None::<i64>, "b", true]];
        let n = write_jsonl(&path, &records).unwrap();
        assert_eq!(2, n);

        let got: Vec<Record> = read_jsonl(&path).unwrap();
        assert_eq!(records, got);

        remove_file_if_exists(&path).unwrap();
        assert!(!path.exists());
        remove_file_if_exists(&path).unwrap();
    }

    #[test]
    fn read_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let res: Result<Vec<Record>> = read_jsonl(&dir.path().join("missing.jsonl"));
        assert!(res.is_err());
    }
}
