// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn missing_file_is_not_an_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let loaded = load::<u32>(&dir.path().join("absent.json"))?;
    assert!(matches!(loaded, Loaded::Missing));
    Ok(())
}

#[test]
fn save_creates_parent_and_keeps_order() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("nested/state.json");
    let records = vec![("b".to_owned(), 2u32), ("a".to_owned(), 1u32)];
    save(&path, &records)?;

    let Loaded::Records(back) = load::<u32>(&path)? else {
        anyhow::bail!("expected records");
    };
    assert_eq!(back, records);

    // Written as a sequence of [key, record] pairs.
    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(raw, serde_json::json!([["b", 2], ["a", 1]]));
    Ok(())
}

#[test]
fn malformed_file_is_an_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("bad.json");
    std::fs::write(&path, "{not json")?;
    assert!(load::<u32>(&path).is_err());
    Ok(())
}

#[test]
fn save_leaves_no_temp_files() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("state.json");
    save(&path, &[("k".to_owned(), true)])?;
    save(&path, &[("k".to_owned(), false)])?;

    let names: Vec<String> = std::fs::read_dir(dir.path())?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["state.json".to_owned()]);
    Ok(())
}
