use std::collections::BTreeMap;
use std::fs;

use tempfile::TempDir;

use tessera::{
    Compactor, Database, DatabaseConfig, Document, OpenMode, TesseraError, WritableDatabase,
};

fn doc(text: &str, value: &str) -> tessera::Result<Document> {
    let mut doc = Document::with_data(text);
    for (i, word) in text.split_whitespace().enumerate() {
        doc.add_posting(word, i as u32 + 1)?;
    }
    doc.add_value(0, value);
    Ok(doc)
}

fn build(path: &std::path::Path, docs: &[(&str, &str)], metadata: &[(&str, &str)]) -> tessera::Result<()> {
    let mut db = WritableDatabase::open(path, DatabaseConfig::new(OpenMode::Create))?;
    for (text, value) in docs {
        db.add_document(&doc(text, value)?)?;
    }
    for (key, value) in metadata {
        db.set_metadata(key, value)?;
    }
    db.commit()
}

/// Everything about a database except document ids and metadata.
fn content(db: &Database) -> tessera::Result<Vec<(Vec<u8>, Vec<(String, u32)>, Vec<u8>)>> {
    let reader = db.reader();
    let mut docs = Vec::new();
    for doc_id in reader.doc_ids() {
        let doc = reader.document(doc_id)?;
        let terms = doc.terms().map(|(t, d)| (t.to_string(), d.wdf)).collect();
        docs.push((doc.data().to_vec(), terms, doc.value(0).to_vec()));
    }
    docs.sort();
    Ok(docs)
}

fn metadata(db: &Database) -> tessera::Result<BTreeMap<String, String>> {
    db.metadata_keys("")
        .into_iter()
        .map(|key| Ok((key.clone(), db.metadata(&key)?)))
        .collect()
}

#[test]
fn test_commit_reopen_and_snapshots() -> tessera::Result<()> {
    let dir = TempDir::new()?;
    let mut writer = WritableDatabase::open(dir.path(), DatabaseConfig::default())?;
    writer.add_document(&doc("first document", "a")?)?;
    writer.commit()?;

    let mut reader = Database::open(dir.path())?;
    assert_eq!(reader.doc_count(), 1);

    writer.add_document(&doc("second document", "b")?)?;
    assert_eq!(Database::open(dir.path())?.doc_count(), 1);
    writer.commit()?;
    assert_eq!(reader.doc_count(), 1);
    assert!(reader.reopen()?);
    assert_eq!(reader.doc_count(), 2);
    assert_eq!(reader.term_freq("document"), 2);
    assert!(!reader.reopen()?);

    writer.add_document(&doc("discarded", "c")?)?;
    drop(writer);
    let db = Database::open(dir.path())?;
    assert_eq!(db.doc_count(), 2);
    assert!(!db.term_exists("discarded"));
    Ok(())
}

#[test]
fn test_single_writer() -> tessera::Result<()> {
    let dir = TempDir::new()?;
    let _writer = WritableDatabase::open(dir.path(), DatabaseConfig::default())?;
    let second = WritableDatabase::open(dir.path(), DatabaseConfig::default());
    assert!(matches!(second, Err(TesseraError::DatabaseLock(_))));
    Ok(())
}

#[test]
fn test_corrupt_postings_fail_open() -> tessera::Result<()> {
    let dir = TempDir::new()?;
    build(dir.path(), &[("some text here", "x")], &[])?;

    let postings = fs::read_dir(dir.path())?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .find(|path| path.extension().is_some_and(|ext| ext == "postings"))
        .ok_or_else(|| TesseraError::other("no postings file written"))?;
    let mut bytes = fs::read(&postings)?;
    let middle = bytes.len() / 2;
    bytes[middle] ^= 0xff;
    fs::write(&postings, bytes)?;

    let opened = Database::open(dir.path());
    assert!(matches!(opened, Err(TesseraError::DatabaseCorrupt(_))));
    Ok(())
}

#[test]
fn test_compaction_is_associative() -> tessera::Result<()> {
    let dir = TempDir::new()?;
    let path = |name: &str| dir.path().join(name);
    build(
        &path("a"),
        &[("apple pie", "1"), ("apple tart", "2")],
        &[("owner", "a"), ("a-only", "yes")],
    )?;
    build(&path("b"), &[("banana split", "3")], &[("owner", "b")])?;
    build(
        &path("c"),
        &[("cherry pie", "4"), ("apple crumble", "5")],
        &[("owner", "c"), ("c-only", "yes")],
    )?;

    Compactor::new()
        .add_source(path("a"))
        .add_source(path("b"))
        .set_destination(path("ab"))
        .compact()?;
    Compactor::new()
        .add_source(path("ab"))
        .add_source(path("c"))
        .set_destination(path("ab_c"))
        .compact()?;
    let stats = Compactor::new()
        .add_source(path("a"))
        .add_source(path("b"))
        .add_source(path("c"))
        .set_destination(path("abc"))
        .compact()?;
    assert_eq!(stats.doc_count, 5);

    let stepwise = Database::open(path("ab_c"))?;
    let direct = Database::open(path("abc"))?;
    assert_eq!(content(&stepwise)?, content(&direct)?);
    assert_eq!(direct.term_freq("apple"), 3);
    assert_eq!(direct.last_doc_id(), 5);
    assert_eq!(direct.document(3)?.data(), b"banana split");

    // Metadata keeps the first source's value.
    assert_eq!(metadata(&direct)?.get("owner").map(String::as_str), Some("a"));
    assert_eq!(metadata(&direct)?.len(), 3);

    let reversed = Compactor::new()
        .add_source(path("c"))
        .add_source(path("b"))
        .add_source(path("a"))
        .set_destination(path("cba"))
        .compact()?;
    assert_eq!(reversed.doc_count, 5);
    let cba = Database::open(path("cba"))?;
    assert_eq!(content(&cba)?, content(&direct)?);
    assert_eq!(cba.metadata("owner")?, "c");
    Ok(())
}

#[test]
fn test_stub_database() -> tessera::Result<()> {
    let dir = TempDir::new()?;
    build(&dir.path().join("one"), &[("red fish", "1"), ("blue fish", "2")], &[])?;
    build(&dir.path().join("two"), &[("green fish", "3")], &[])?;
    let stub = dir.path().join("all.stub");
    fs::write(&stub, "# both shards\nauto one\ntwo\n")?;

    let db = Database::open(&stub)?;
    assert_eq!(db.doc_count(), 3);
    assert_eq!(db.term_freq("fish"), 3);
    // Local id 1 of shard 2 (of 2) interleaves to 2.
    assert_eq!(db.document(2)?.data(), b"green fish");
    assert_eq!(db.document(3)?.data(), b"blue fish");
    Ok(())
}
