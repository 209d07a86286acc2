use itertools::Itertools;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A comprehensive error type for basis selection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BasisError {
    #[error("A basis must contain at least one index.")]
    Empty,

    #[error("Requested {requested} basis functions, but only {available} parameter indices exist.")]
    TooLarge { requested: usize, available: usize },

    #[error("Basis index {index} is out of range for {available} parameter indices.")]
    IndexOutOfRange { index: usize, available: usize },

    #[error(
        "Basis indices must be strictly increasing; index {current} at position {position} follows {previous}."
    )]
    NotStrictlyIncreasing {
        position: usize,
        previous: usize,
        current: usize,
    },
}

/// A sorted set of distinct parameter indices in `[0, N·D)`.
///
/// The indices are kept ascending so that system assembly walks the data matrix in
/// column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedBasisSet")]
pub struct BasisSet {
    indices: Vec<usize>,
    num_params: usize,
}

/// Serialized form of a [`BasisSet`], checked by [`BasisSet::explicit`] on the way in.
#[derive(Deserialize)]
struct UncheckedBasisSet {
    indices: Vec<usize>,
    num_params: usize,
}

impl TryFrom<UncheckedBasisSet> for BasisSet {
    type Error = BasisError;

    fn try_from(raw: UncheckedBasisSet) -> Result<Self, Self::Error> {
        Self::explicit(raw.indices, raw.num_params)
    }
}

impl BasisSet {
    /// Every parameter index, `0..num_params`. This is the basis the full estimator uses.
    pub fn full(num_params: usize) -> Result<Self, BasisError> {
        if num_params == 0 {
            return Err(BasisError::Empty);
        }
        Ok(Self {
            indices: (0..num_params).collect(),
            num_params,
        })
    }

    /// Wraps a caller-supplied index sequence after checking that it is non-empty,
    /// strictly increasing and in range.
    pub fn explicit(indices: Vec<usize>, num_params: usize) -> Result<Self, BasisError> {
        if indices.is_empty() {
            return Err(BasisError::Empty);
        }
        if indices.len() > num_params {
            return Err(BasisError::TooLarge {
                requested: indices.len(),
                available: num_params,
            });
        }
        if let Some((position, (&previous, &current))) = indices
            .iter()
            .tuple_windows()
            .enumerate()
            .find(|(_, (previous, current))| previous >= current)
        {
            return Err(BasisError::NotStrictlyIncreasing {
                position: position + 1,
                previous,
                current,
            });
        }
        // Sorted, so only the last element can be out of range.
        if let Some(&last) = indices.last() {
            if last >= num_params {
                return Err(BasisError::IndexOutOfRange {
                    index: last,
                    available: num_params,
                });
            }
        }
        Ok(Self {
            indices,
            num_params,
        })
    }

    /// Draws `size` indices uniformly without replacement from a random permutation of
    /// `0..num_params`, then sorts them. Sorting happens after selection and does not
    /// bias the sample.
    pub fn random<R: Rng + ?Sized>(
        size: usize,
        num_params: usize,
        rng: &mut R,
    ) -> Result<Self, BasisError> {
        if size == 0 {
            return Err(BasisError::Empty);
        }
        if size > num_params {
            return Err(BasisError::TooLarge {
                requested: size,
                available: num_params,
            });
        }

        let mut permutation: Vec<usize> = (0..num_params).collect();
        permutation.shuffle(rng);
        permutation.truncate(size);
        permutation.sort_unstable();

        Ok(Self {
            indices: permutation,
            num_params,
        })
    }

    /// [`random`](Self::random) with a `StdRng` seeded from `seed`.
    pub fn random_seeded(size: usize, num_params: usize, seed: u64) -> Result<Self, BasisError> {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::random(size, num_params, &mut rng)
    }

    #[inline]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Number of basis functions, m.
    #[inline]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Size of the parameter space the indices were drawn from, N·D.
    #[inline]
    pub fn num_params(&self) -> usize {
        self.num_params
    }

    pub fn is_full(&self) -> bool {
        self.indices.len() == self.num_params
    }
}
