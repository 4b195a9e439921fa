//! On-disk form of the term store.
//!
//! A generation stores two files:
//!
//! - `<gen>.terms`: an `fst` map from term to ordinal, wrapped in a
//!   checksummed structured file.
//! - `<gen>.postings`: one block per ordinal, in ordinal order. A block holds
//!   the posting count followed by, per posting, the doc-id gap, the wdf and
//!   the delta-coded positions, all as varints.

use fst::{Map, MapBuilder, Streamer};

use crate::error::{Result, TesseraError};
use crate::storage::structured::{StructReader, StructWriter};
use crate::storage::{Storage, generation_file_name};
use crate::term_store::{Posting, PostingList, TermStore};

const TERMS_MAGIC: u32 = 0x5445_5254; // "TERT"
const POSTINGS_MAGIC: u32 = 0x5445_5250; // "TERP"
const FORMAT_VERSION: u32 = 1;

pub const TERMS_EXTENSION: &str = "terms";
pub const POSTINGS_EXTENSION: &str = "postings";

/// Write `store` as generation `generation`.
pub fn write_generation(storage: &dyn Storage, generation: u64, store: &TermStore) -> Result<()> {
    let mut builder = MapBuilder::memory();
    let postings_name = generation_file_name(generation, POSTINGS_EXTENSION);
    let mut postings = StructWriter::new(storage.create_output(&postings_name)?);
    postings.write_u32(POSTINGS_MAGIC)?;
    postings.write_u32(FORMAT_VERSION)?;
    postings.write_varint(store.len() as u64)?;

    for (ordinal, (term, list)) in store.iter().enumerate() {
        builder.insert(term.as_bytes(), ordinal as u64)?;
        write_posting_list(&mut postings, list)?;
    }
    postings.close()?;

    let fst_bytes = builder.into_inner()?;
    let terms_name = generation_file_name(generation, TERMS_EXTENSION);
    let mut terms = StructWriter::new(storage.create_output(&terms_name)?);
    terms.write_u32(TERMS_MAGIC)?;
    terms.write_u32(FORMAT_VERSION)?;
    terms.write_bytes(&fst_bytes)?;
    terms.close()?;

    log::debug!(
        "wrote term dictionary for generation {generation}: {} terms",
        store.len()
    );
    Ok(())
}

fn write_posting_list<W: crate::storage::StorageOutput>(
    writer: &mut StructWriter<W>,
    list: &PostingList,
) -> Result<()> {
    writer.write_varint(list.len() as u64)?;
    let mut last_doc = 0;
    for posting in list.postings() {
        writer.write_varint(posting.doc_id - last_doc)?;
        last_doc = posting.doc_id;
        writer.write_varint(u64::from(posting.wdf))?;
        writer.write_varint(posting.positions.len() as u64)?;
        let mut last_pos = 0;
        for &pos in &posting.positions {
            writer.write_varint(u64::from(pos - last_pos))?;
            last_pos = pos;
        }
    }
    Ok(())
}

/// Read generation `generation` back into memory.
pub fn read_generation(storage: &dyn Storage, generation: u64) -> Result<TermStore> {
    let terms_name = generation_file_name(generation, TERMS_EXTENSION);
    let mut terms = StructReader::new(storage.open_input(&terms_name)?, &terms_name)?;
    terms.expect_header(TERMS_MAGIC, FORMAT_VERSION)?;
    let map = Map::new(terms.read_bytes()?)
        .map_err(|e| TesseraError::corrupt(format!("bad term dictionary '{terms_name}': {e}")))?;

    let postings_name = generation_file_name(generation, POSTINGS_EXTENSION);
    let mut postings = StructReader::new(storage.open_input(&postings_name)?, &postings_name)?;
    postings.expect_header(POSTINGS_MAGIC, FORMAT_VERSION)?;
    let term_count = postings.read_varint()?;
    if term_count != map.len() as u64 {
        return Err(TesseraError::corrupt(format!(
            "'{postings_name}' has {term_count} lists but the dictionary has {} terms",
            map.len()
        )));
    }

    let mut store = TermStore::new();
    let mut stream = map.stream();
    let mut expected = 0u64;
    while let Some((key, ordinal)) = stream.next() {
        if ordinal != expected {
            return Err(TesseraError::corrupt(format!(
                "term dictionary ordinal {ordinal} out of sequence in '{terms_name}'"
            )));
        }
        expected += 1;
        let term = std::str::from_utf8(key)
            .map_err(|_| TesseraError::corrupt(format!("non UTF-8 term in '{terms_name}'")))?
            .to_string();
        read_posting_list(&mut postings, &mut store, &term)?;
    }
    if !postings.is_at_end() {
        return Err(TesseraError::corrupt(format!(
            "trailing data in '{postings_name}'"
        )));
    }
    Ok(store)
}

fn read_posting_list(reader: &mut StructReader, store: &mut TermStore, term: &str) -> Result<()> {
    let count = reader.read_varint()?;
    let mut doc_id = 0u64;
    for _ in 0..count {
        let gap = reader.read_varint()?;
        if gap == 0 {
            return Err(TesseraError::corrupt(format!(
                "postings for '{term}' are not strictly ascending"
            )));
        }
        doc_id += gap;
        let wdf = u32::try_from(reader.read_varint()?)
            .map_err(|_| TesseraError::corrupt(format!("wdf overflow for '{term}'")))?;
        let position_count = reader.read_varint()?;
        let mut positions = Vec::with_capacity(position_count.min(1 << 16) as usize);
        let mut pos = 0u64;
        for _ in 0..position_count {
            pos += reader.read_varint()?;
            positions.push(
                u32::try_from(pos)
                    .map_err(|_| TesseraError::corrupt(format!("position overflow for '{term}'")))?,
            );
        }
        store.push_posting(
            term,
            Posting {
                doc_id,
                wdf,
                positions,
            },
        );
    }
    Ok(())
}

/// Names of the files making up a generation of the term store.
pub fn generation_files(generation: u64) -> [String; 2] {
    [
        generation_file_name(generation, TERMS_EXTENSION),
        generation_file_name(generation, POSTINGS_EXTENSION),
    ]
}
