//! Bidirectional index between source lines and compiled-output offsets.
//!
//! Built in one pass over the assembly chunk sequence and discarded whole
//! whenever a new compile result arrives; nothing in here is patched
//! incrementally. Offsets are byte offsets into the rendered text.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::output::{CompiledChunk, SourceLocation};

/// The rendered output text plus both direction-specific lookup structures.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutputIndex {
    text: String,
    forward: HashMap<SourceLocation, Vec<(usize, usize)>>,
    backward: BTreeMap<usize, (usize, SourceLocation)>,
}

impl OutputIndex {
    /// Walk the chunk sequence once, appending `text + "\n"` per non-null
    /// chunk. The newline counts toward the next chunk's start offset. Chunks
    /// with a location land in both maps; chunks without one only advance the
    /// offset.
    pub fn build(chunks: &[CompiledChunk]) -> Self {
        let mut text = String::new();
        let mut forward: HashMap<SourceLocation, Vec<(usize, usize)>> = HashMap::new();
        let mut backward = BTreeMap::new();
        let mut offset = 0usize;
        for chunk in chunks {
            let Some(chunk_text) = &chunk.text else {
                continue;
            };
            let end = offset + chunk_text.len();
            text.push_str(chunk_text);
            text.push('\n');
            if let Some(location) = &chunk.source {
                forward
                    .entry(location.clone())
                    .or_default()
                    .push((offset, end));
                backward.insert(offset, (end, location.clone()));
            }
            offset = end + 1;
        }
        debug!(
            chunks = chunks.len(),
            attributed = backward.len(),
            bytes = text.len(),
            "rebuilt output index"
        );
        Self {
            text,
            forward,
            backward,
        }
    }

    /// The rendered output text the offsets refer to.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Backward lookup: the source location owning `offset`, or `None` when
    /// the offset falls in unattributed text or between attributed regions.
    pub fn locate_source(&self, offset: usize) -> Option<&SourceLocation> {
        let (_, (end, location)) = self.backward.range(..=offset).next_back()?;
        (*end >= offset).then_some(location)
    }

    /// Forward lookup: every range recorded for each requested location,
    /// in input order. Locations with no ranges contribute nothing.
    pub fn highlight_ranges(&self, locations: &[SourceLocation]) -> Vec<(usize, usize)> {
        locations
            .iter()
            .flat_map(|location| {
                self.forward
                    .get(location)
                    .map(Vec::as_slice)
                    .unwrap_or_default()
            })
            .copied()
            .collect()
    }
}

/// Pick the scroll target among candidate range boundaries: the start or end
/// closest to `anchor`, ties going to the earliest-encountered boundary.
pub fn nearest_boundary(anchor: usize, ranges: &[(usize, usize)]) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for &(start, end) in ranges {
        for boundary in [start, end] {
            let distance = anchor.abs_diff(boundary);
            if best.map_or(true, |(best_distance, _)| distance < best_distance) {
                best = Some((distance, boundary));
            }
        }
    }
    best.map(|(_, boundary)| boundary)
}
