//! Run-length delta codec for integer arrays.
//!
//! A diff alternates two kinds of run, always starting with a match run:
//!
//! ```text
//! <match count> <mismatch count> <literal>... <match count> <mismatch count> ...
//! ```
//!
//! A match run copies that many values from the old array. A mismatch run is
//! followed by that many literal values from the new array. When the old
//! array is empty or the lengths differ, the diff is one whole-array literal
//! run: `[0, len, values...]`.

use thiserror::Error;

/// Malformed diff stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeltaError {
    /// A run length was negative.
    #[error("negative run length {0}")]
    NegativeRun(i64),

    /// A match run reached past the end of the old array.
    #[error("match run of {len} at position {position} overruns old array of length {old_len}")]
    MatchOverrun {
        /// Output position where the run started.
        position: usize,
        /// Run length.
        len: usize,
        /// Length of the old array.
        old_len: usize,
    },

    /// A mismatch run announced more literals than the stream holds.
    #[error("mismatch run expected {expected} literals, found {found}")]
    Truncated {
        /// Announced literal count.
        expected: usize,
        /// Literals actually present.
        found: usize,
    },
}

/// Encodes `new` relative to `old`.
#[must_use]
pub fn encode(old: &[i64], new: &[i64]) -> Vec<i64> {
    if old.is_empty() || old.len() != new.len() {
        let mut diff = Vec::with_capacity(new.len() + 2);
        diff.push(0);
        diff.push(run_len(new.len()));
        diff.extend_from_slice(new);
        return diff;
    }

    let len = new.len();
    let mut diff = Vec::new();
    let mut i = 0;
    loop {
        let start = i;
        while i < len && old[i] == new[i] {
            i += 1;
        }
        diff.push(run_len(i - start));
        if i == len {
            break;
        }

        let start = i;
        while i < len && old[i] != new[i] {
            i += 1;
        }
        diff.push(run_len(i - start));
        diff.extend_from_slice(&new[start..i]);
        if i == len {
            break;
        }
    }
    diff
}

/// Rebuilds the new array from `old` and a diff produced by [`encode`].
pub fn decode(old: &[i64], diff: &[i64]) -> Result<Vec<i64>, DeltaError> {
    let mut out = Vec::with_capacity(old.len());
    let mut stream = diff.iter().copied();
    let mut matching = true;

    while let Some(raw) = stream.next() {
        let count = usize::try_from(raw).map_err(|_| DeltaError::NegativeRun(raw))?;
        if matching {
            let position = out.len();
            let run = position
                .checked_add(count)
                .and_then(|end| old.get(position..end))
                .ok_or(DeltaError::MatchOverrun {
                    position,
                    len: count,
                    old_len: old.len(),
                })?;
            out.extend_from_slice(run);
        } else {
            let before = out.len();
            out.extend(stream.by_ref().take(count));
            let found = out.len() - before;
            if found != count {
                return Err(DeltaError::Truncated {
                    expected: count,
                    found,
                });
            }
        }
        matching = !matching;
    }

    Ok(out)
}

#[allow(clippy::cast_possible_wrap)]
const fn run_len(len: usize) -> i64 {
    len as i64
}
