use tessera::{
    Document, Enquire, MSetRequest, Op, Query, RSet, ValueCountMatchSpy, WritableDatabase,
};

fn words(ws: &[&str]) -> Vec<Query> {
    ws.iter().map(|w| Query::term(*w)).collect()
}

#[test]
fn test_repeated_term_document() -> tessera::Result<()> {
    let mut db = WritableDatabase::inmemory()?;
    let mut doc = Document::new();
    for (i, word) in ["is", "there", "anybody", "out", "there"].iter().enumerate() {
        doc.add_posting(word, i as u32 + 1)?;
    }
    assert_eq!(doc.termlist_count(), 4);
    let doc_id = db.add_document(&doc)?;
    db.commit()?;

    let reader = db.reader();
    let stored = reader.document(doc_id)?;
    assert_eq!(stored.termlist_count(), 4);
    assert_eq!(stored.term("there").map(|t| t.wdf), Some(2));
    assert_eq!(stored.positions("there")?, &[2, 5]);

    let mut enquire = Enquire::new(&reader);
    enquire.set_query(Query::new(Op::Or, words(&["there", "is"])))?;
    let mset = enquire.mset(0, 10)?;
    assert_eq!(mset.len(), 1);
    assert_eq!(mset.items()[0].doc_id, doc_id);
    assert_eq!(enquire.matching_terms(doc_id)?, vec!["is", "there"]);
    Ok(())
}

#[test]
fn test_scale_weight_description() -> tessera::Result<()> {
    let query = Query::scale_weight(5.0, Query::term("foo"))?;
    assert_eq!(query.description(), "Query(5 * foo)");
    Ok(())
}

#[test]
fn test_sort_by_binary_values() -> tessera::Result<()> {
    let mut db = WritableDatabase::inmemory()?;
    let values: [&[u8]; 5] = [b"ABB", b"ABC", b"ABC\0", b"ABCD", b"ABC\xff"];
    for value in values {
        let mut doc = Document::new();
        doc.add_term("foo", 1)?;
        doc.add_value(0, value);
        db.add_document(&doc)?;
    }
    db.commit()?;

    let mut enquire = Enquire::new(&db.reader());
    enquire.set_query(Query::term("foo"))?;
    enquire.set_sort_by_value(0, false);
    let ids: Vec<u64> = enquire.mset(0, 10)?.iter().map(|i| i.doc_id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);

    enquire.set_sort_by_value(0, true);
    let ids: Vec<u64> = enquire.mset(0, 10)?.iter().map(|i| i.doc_id).collect();
    assert_eq!(ids, vec![5, 4, 3, 2, 1]);
    Ok(())
}

#[test]
fn test_decider_keeps_one_document() -> tessera::Result<()> {
    let mut db = WritableDatabase::inmemory()?;
    for i in 0..10u32 {
        let mut doc = Document::with_data(format!("doc {i}"));
        doc.add_term("common", 1)?;
        db.add_document(&doc)?;
    }
    db.commit()?;

    let mut enquire = Enquire::new(&db.reader());
    enquire.set_query(Query::term("common"))?;
    let only_seven = |doc: &Document| doc.data() == b"doc 7";
    let mset = enquire.get_mset(MSetRequest::new(0, 10).decider(&only_seven))?;
    assert_eq!(mset.len(), 1);
    assert_eq!(mset.items()[0].doc_id, 8);
    Ok(())
}

#[test]
fn test_zero_bytes_round_trip() -> tessera::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let payload = b"head\0middle\0\0tail\0".to_vec();
    let doc_id = {
        let mut db = WritableDatabase::open(dir.path(), Default::default())?;
        let mut doc = Document::with_data(payload.clone());
        doc.add_value(3, b"\0\x01\0".to_vec());
        doc.add_posting("zero", 1)?;
        let doc_id = db.add_document(&doc)?;
        db.commit()?;
        doc_id
    };

    let db = tessera::Database::open(dir.path())?;
    let doc = db.document(doc_id)?;
    assert_eq!(doc.data(), payload.as_slice());
    assert_eq!(doc.value(3), b"\0\x01\0");
    assert_eq!(doc.positions("zero")?, &[1]);
    Ok(())
}

#[test]
fn test_bounds_are_ordered() -> tessera::Result<()> {
    let mut db = WritableDatabase::inmemory()?;
    for i in 0..30u32 {
        let mut doc = Document::new();
        doc.add_term(if i % 2 == 0 { "even" } else { "odd" }, 1)?;
        if i % 3 == 0 {
            doc.add_term("three", 1)?;
        }
        doc.add_value(0, (i % 4).to_string());
        db.add_document(&doc)?;
    }
    db.commit()?;
    let reader = db.reader();

    let queries = [
        Query::new(Op::Or, words(&["even", "three"])),
        Query::new(Op::And, words(&["even", "three"])),
        Query::new(Op::AndNot, words(&["odd", "three"])),
        Query::new(Op::Xor, words(&["even", "three"])),
        Query::match_nothing(),
    ];
    let rset: RSet = [1, 4].into_iter().collect();
    let not_zero = |doc: &Document| doc.value(0) != b"0";
    for query in queries {
        let mut enquire = Enquire::new(&reader);
        enquire.set_query(query.clone())?;
        for request in [
            MSetRequest::new(0, 5),
            MSetRequest::new(0, 5).rset(&rset),
            MSetRequest::new(0, 5).decider(&not_zero),
            MSetRequest::new(2, 5).rset(&rset).decider(&not_zero).collapse(0, 1),
        ] {
            let mset = enquire.get_mset(request)?;
            assert!(mset.matches_lower_bound() <= mset.matches_estimated(), "{query}");
            assert!(mset.matches_estimated() <= mset.matches_upper_bound(), "{query}");
            if query.is_empty() {
                assert_eq!(mset.matches_upper_bound(), 0);
            }
        }
    }
    Ok(())
}

#[test]
fn test_matching_terms_cover_query_terms() -> tessera::Result<()> {
    let mut db = WritableDatabase::inmemory()?;
    let texts = [
        vec!["alpha", "beta"],
        vec!["beta", "gamma"],
        vec!["gamma", "delta", "alpha"],
    ];
    for text in &texts {
        let mut doc = Document::new();
        for (i, word) in text.iter().enumerate() {
            doc.add_posting(word, i as u32 + 1)?;
        }
        db.add_document(&doc)?;
    }
    db.commit()?;

    let reader = db.reader();
    let mut enquire = Enquire::new(&reader);
    enquire.set_query(Query::new(Op::Or, words(&["alpha", "gamma", "epsilon"])))?;
    for item in &enquire.mset(0, 10)? {
        let text = &texts[item.doc_id as usize - 1];
        let matching = enquire.matching_terms(item.doc_id)?;
        for term in ["alpha", "gamma"] {
            assert_eq!(text.contains(&term), matching.iter().any(|m| m == term));
        }
        assert!(!matching.iter().any(|m| m == "epsilon"));
    }
    Ok(())
}

#[test]
fn test_facet_counts() -> tessera::Result<()> {
    let mut db = WritableDatabase::inmemory()?;
    for colour in ["red", "green", "red", "blue", "red"] {
        let mut doc = Document::new();
        doc.add_term("shirt", 1)?;
        doc.add_value(1, colour);
        db.add_document(&doc)?;
    }
    db.commit()?;

    let mut enquire = Enquire::new(&db.reader());
    enquire.set_query(Query::term("shirt"))?;
    let mut spy = ValueCountMatchSpy::new(1);
    let mset = enquire.get_mset(MSetRequest::new(0, 1).spy(&mut spy))?;
    assert_eq!(mset.len(), 1);
    assert_eq!(spy.total(), 5);
    assert_eq!(
        spy.top_values(1),
        vec![(b"red".to_vec(), 3)]
    );
    Ok(())
}
