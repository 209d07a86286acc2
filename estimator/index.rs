//! Flat parameter indices.
//!
//! The stacked-gradient parameterisation has one coefficient per (sample, dimension)
//! pair. Everything outside this module talks about flat indices in `[0, N·D)`; only
//! `encode`/`decode` know that the layout is sample-major.

/// A decoded parameter index: sample `a`, dimension `i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamIndex {
    pub sample: usize,
    pub dim: usize,
}

/// Shape of the parameter space for a D-dimensional, N-sample dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterLayout {
    num_samples: usize,
    dimension: usize,
}

impl ParameterLayout {
    pub fn new(num_samples: usize, dimension: usize) -> Self {
        Self {
            num_samples,
            dimension,
        }
    }

    /// Number of parameter indices, N·D.
    #[inline]
    pub fn len(&self) -> usize {
        self.num_samples * self.dimension
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    #[inline]
    pub fn encode(&self, index: ParamIndex) -> usize {
        debug_assert!(index.sample < self.num_samples && index.dim < self.dimension);
        index.sample * self.dimension + index.dim
    }

    #[inline]
    pub fn decode(&self, flat: usize) -> ParamIndex {
        debug_assert!(flat < self.len());
        ParamIndex {
            sample: flat / self.dimension,
            dim: flat % self.dimension,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_is_sample_major() {
        let layout = ParameterLayout::new(4, 3);
        assert_eq!(layout.len(), 12);
        assert_eq!(layout.decode(0), ParamIndex { sample: 0, dim: 0 });
        assert_eq!(layout.decode(5), ParamIndex { sample: 1, dim: 2 });
        assert_eq!(layout.decode(11), ParamIndex { sample: 3, dim: 2 });
    }

    #[test]
    fn encode_inverts_decode() {
        let layout = ParameterLayout::new(7, 5);
        for flat in [0, 4, 5, 17, 34] {
            assert_eq!(layout.encode(layout.decode(flat)), flat);
        }
    }

    #[test]
    fn one_dimensional_layout_is_identity() {
        let layout = ParameterLayout::new(6, 1);
        for flat in 0..layout.len() {
            let idx = layout.decode(flat);
            assert_eq!(idx.sample, flat);
            assert_eq!(idx.dim, 0);
        }
    }
}
