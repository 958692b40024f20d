//! Heap Summariser (C5): reduces a raw pprof heap profile payload down to
//! the four scalar columns the API exposes.
//!
//! Grounded on `internal/service/heap_process/heap-process.go`'s reduction
//! of a `profile.Profile` to `object.ProfileSummary` to the four-column
//! shape but reimplemented against the crate's own minimal protobuf schema
//! rather than google/pprof's Go package.

use std::io::Read;

use flate2::read::GzDecoder;
use idlescope_common::HeapProfileSummary;
use prost::Message;

use super::pprof::Profile;
use crate::error::CoreError;

const INUSE_SPACE: &str = "inuse_space";
const INUSE_OBJECTS: &str = "inuse_objects";
const ALLOC_SPACE: &str = "alloc_space";
const ALLOC_OBJECTS: &str = "alloc_objects";

#[derive(Debug, Default, Clone, Copy)]
struct ColumnIndices {
    inuse_space: Option<usize>,
    inuse_objects: Option<usize>,
    alloc_space: Option<usize>,
    alloc_objects: Option<usize>,
}

/// Decompress a gzip-wrapped pprof payload, parse it, and sum each of the
/// four known sample-type columns across all samples. A column whose
/// `sample_type` is absent from the profile contributes 0.
pub fn summarize(gzipped_payload: &[u8]) -> Result<HeapProfileSummary, CoreError> {
    let raw = decompress(gzipped_payload)?;
    let profile = Profile::decode(raw.as_slice())
        .map_err(|e| CoreError::ParseFailure(format!("malformed pprof profile: {e}")))?;
    Ok(reduce(&profile))
}

fn decompress(payload: &[u8]) -> Result<Vec<u8>, CoreError> {
    let mut decoder = GzDecoder::new(payload);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| CoreError::ParseFailure(format!("not a valid gzip stream: {e}")))?;
    Ok(out)
}

fn locate_columns(profile: &Profile) -> ColumnIndices {
    let mut indices = ColumnIndices::default();
    for (i, value_type) in profile.sample_type.iter().enumerate() {
        let name = profile
            .string_table
            .get(value_type.r#type as usize)
            .map(String::as_str)
            .unwrap_or("");
        match name {
            INUSE_SPACE => indices.inuse_space = Some(i),
            INUSE_OBJECTS => indices.inuse_objects = Some(i),
            ALLOC_SPACE => indices.alloc_space = Some(i),
            ALLOC_OBJECTS => indices.alloc_objects = Some(i),
            _ => {}
        }
    }
    indices
}

fn column_sum(profile: &Profile, column: Option<usize>) -> i64 {
    let Some(column) = column else {
        return 0;
    };
    profile
        .sample
        .iter()
        .filter_map(|sample| sample.value.get(column))
        .sum()
}

fn reduce(profile: &Profile) -> HeapProfileSummary {
    let indices = locate_columns(profile);
    HeapProfileSummary {
        time_nanos: profile.time_nanos,
        inuse_space: column_sum(profile, indices.inuse_space),
        inuse_objects: column_sum(profile, indices.inuse_objects),
        alloc_space: column_sum(profile, indices.alloc_space),
        alloc_objects: column_sum(profile, indices.alloc_objects),
    }
}
