//! Face winding and corner reindexing.

use crate::util::{Error, Result};

/// Mapping from source face-corner index to output face-corner index.
///
/// With reversal, every face keeps its first corner and reverses the
/// rest: corner `j + k` of a face starting at `j` with `n` corners goes to
/// `j + n - k` for `k >= 1`. The same table is applied to every
/// per-corner buffer so they stay consistent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CornerPermutation {
    perm: Vec<u32>,
    reversed: bool,
}

impl CornerPermutation {
    /// Build the table for `face_counts`.
    ///
    /// Fails on negative counts.
    pub fn new(face_counts: &[i32], reverse: bool) -> Result<Self> {
        let mut perm = Vec::with_capacity(face_counts.iter().map(|&c| c.max(0) as usize).sum());
        let mut j = 0u32;
        for (face, &count) in face_counts.iter().enumerate() {
            let nv = u32::try_from(count)
                .map_err(|_| Error::invalid(format!("face {face}: negative vertex count {count}")))?;
            if nv == 0 {
                continue;
            }
            if reverse {
                perm.push(j);
                perm.extend((1..nv).map(|k| j + nv - k));
            } else {
                perm.extend(j..j + nv);
            }
            j += nv;
        }
        Ok(Self { perm, reversed: reverse })
    }

    pub fn identity(num_corners: usize) -> Self {
        Self {
            perm: (0..num_corners as u32).collect(),
            reversed: false,
        }
    }

    pub fn len(&self) -> usize {
        self.perm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.perm.is_empty()
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    /// Output corner of source corner `i`.
    #[inline]
    pub fn output(&self, i: usize) -> usize {
        self.perm[i] as usize
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.perm
    }

    /// Scatter `src` so that `out[perm[i]] = src[i]`.
    ///
    /// Returns `None` when `src` does not have one entry per corner.
    pub fn apply<T: Copy + Default>(&self, src: &[T]) -> Option<Vec<T>> {
        if src.len() != self.perm.len() {
            return None;
        }
        let mut out = vec![T::default(); src.len()];
        for (i, &p) in self.perm.iter().enumerate() {
            out[p as usize] = src[i];
        }
        Some(out)
    }

    /// Output index buffer pointing back at source corners: `out[perm[i]] = i`.
    pub fn source_indices(&self) -> Vec<u32> {
        let mut out = vec![0u32; self.perm.len()];
        for (i, &p) in self.perm.iter().enumerate() {
            out[p as usize] = i as u32;
        }
        out
    }
}
