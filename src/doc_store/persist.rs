//! On-disk form of the document store.
//!
//! `<gen>.docs` holds the id counter, every document record and the value
//! streams; `<gen>.meta` holds the metadata map. Both are checksummed
//! structured files.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::doc_store::{DocRecord, DocumentStore};
use crate::error::{Result, TesseraError};
use crate::storage::structured::{StructReader, StructWriter};
use crate::storage::{Storage, generation_file_name};

const DOCS_MAGIC: u32 = 0x5445_5244; // "TERD"
const META_MAGIC: u32 = 0x5445_524D; // "TERM"
const FORMAT_VERSION: u32 = 1;

pub const DOCS_EXTENSION: &str = "docs";
pub const META_EXTENSION: &str = "meta";

/// Write `store` as generation `generation`.
pub fn write_generation(storage: &dyn Storage, generation: u64, store: &DocumentStore) -> Result<()> {
    let docs_name = generation_file_name(generation, DOCS_EXTENSION);
    let mut docs = StructWriter::new(storage.create_output(&docs_name)?);
    docs.write_u32(DOCS_MAGIC)?;
    docs.write_u32(FORMAT_VERSION)?;
    docs.write_u64(store.last_doc_id())?;

    docs.write_varint(store.doc_count())?;
    let mut last_id = 0;
    for (doc_id, record) in store.records() {
        docs.write_varint(doc_id - last_id)?;
        last_id = doc_id;
        docs.write_bytes(&record.data)?;
        docs.write_varint(record.terms.len() as u64)?;
        for (term, wdf) in &record.terms {
            docs.write_string(term)?;
            docs.write_varint(u64::from(*wdf))?;
        }
    }

    let streams: Vec<_> = store.value_streams().collect();
    docs.write_varint(streams.len() as u64)?;
    for (slot, stream) in streams {
        docs.write_u32(slot)?;
        docs.write_varint(stream.len() as u64)?;
        let mut last_id = 0;
        for (doc_id, value) in stream {
            docs.write_varint(doc_id - last_id)?;
            last_id = *doc_id;
            docs.write_bytes(value)?;
        }
    }
    docs.close()?;

    let meta_name = generation_file_name(generation, META_EXTENSION);
    let mut meta = StructWriter::new(storage.create_output(&meta_name)?);
    meta.write_u32(META_MAGIC)?;
    meta.write_u32(FORMAT_VERSION)?;
    let entries: Vec<_> = store.metadata_entries().collect();
    meta.write_varint(entries.len() as u64)?;
    for (key, value) in entries {
        meta.write_string(key)?;
        meta.write_string(value)?;
    }
    meta.close()?;

    log::debug!(
        "wrote document store for generation {generation}: {} documents",
        store.doc_count()
    );
    Ok(())
}

/// Read generation `generation` back into memory.
pub fn read_generation(storage: &dyn Storage, generation: u64) -> Result<DocumentStore> {
    let docs_name = generation_file_name(generation, DOCS_EXTENSION);
    let mut docs = StructReader::new(storage.open_input(&docs_name)?, &docs_name)?;
    docs.expect_header(DOCS_MAGIC, FORMAT_VERSION)?;
    let last_doc_id = docs.read_u64()?;

    let doc_count = docs.read_varint()?;
    let mut records = BTreeMap::new();
    let mut doc_id = 0;
    for _ in 0..doc_count {
        doc_id = next_id(&mut docs, doc_id, &docs_name)?;
        let data = docs.read_bytes()?;
        let term_count = docs.read_varint()?;
        let mut terms = Vec::with_capacity(term_count.min(1 << 16) as usize);
        let mut length = 0u64;
        for _ in 0..term_count {
            let term = docs.read_string()?;
            let wdf = u32::try_from(docs.read_varint()?)
                .map_err(|_| TesseraError::corrupt(format!("wdf overflow in '{docs_name}'")))?;
            length += u64::from(wdf);
            terms.push((term, wdf));
        }
        records.insert(doc_id, Arc::new(DocRecord { data, terms, length }));
    }
    if doc_id > last_doc_id {
        return Err(TesseraError::corrupt(format!(
            "'{docs_name}' holds docid {doc_id} above its counter {last_doc_id}"
        )));
    }

    let slot_count = docs.read_varint()?;
    let mut values = BTreeMap::new();
    for _ in 0..slot_count {
        let slot = docs.read_u32()?;
        let entries = docs.read_varint()?;
        let mut stream = BTreeMap::new();
        let mut doc_id = 0;
        for _ in 0..entries {
            doc_id = next_id(&mut docs, doc_id, &docs_name)?;
            stream.insert(doc_id, docs.read_bytes()?);
        }
        values.insert(slot, Arc::new(stream));
    }
    if !docs.is_at_end() {
        return Err(TesseraError::corrupt(format!("trailing data in '{docs_name}'")));
    }

    let meta_name = generation_file_name(generation, META_EXTENSION);
    let mut meta = StructReader::new(storage.open_input(&meta_name)?, &meta_name)?;
    meta.expect_header(META_MAGIC, FORMAT_VERSION)?;
    let entries = meta.read_varint()?;
    let mut metadata = BTreeMap::new();
    for _ in 0..entries {
        let key = meta.read_string()?;
        let value = meta.read_string()?;
        metadata.insert(key, value);
    }

    Ok(DocumentStore::restore(records, values, metadata, last_doc_id))
}

fn next_id(reader: &mut StructReader, previous: u64, name: &str) -> Result<u64> {
    let gap = reader.read_varint()?;
    if gap == 0 {
        return Err(TesseraError::corrupt(format!(
            "document ids in '{name}' are not strictly ascending"
        )));
    }
    previous
        .checked_add(gap)
        .ok_or_else(|| TesseraError::corrupt(format!("docid overflow in '{name}'")))
}

/// Names of the files making up a generation of the document store.
pub fn generation_files(generation: u64) -> [String; 2] {
    [
        generation_file_name(generation, DOCS_EXTENSION),
        generation_file_name(generation, META_EXTENSION),
    ]
}
