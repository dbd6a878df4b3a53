// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::EtscError;

/// Zero-copy view over a batch of equal-length series.
///
/// Values are row-major `[instance][time][channel]`, so one instance
/// occupies `len * n_channels` consecutive elements.
#[derive(Clone, Copy, Debug)]
pub struct SeriesBatchView<'a> {
    pub values: &'a [f64],
    pub n_instances: usize,
    pub len: usize,
    pub n_channels: usize,
}

impl<'a> SeriesBatchView<'a> {
    /// Constructs a validated `SeriesBatchView`.
    pub fn new(
        values: &'a [f64],
        n_instances: usize,
        len: usize,
        n_channels: usize,
    ) -> Result<Self, EtscError> {
        validate_shape(values.len(), n_instances, len, n_channels)?;
        Ok(Self {
            values,
            n_instances,
            len,
            n_channels,
        })
    }

    /// Convenience constructor for univariate batches.
    pub fn univariate(
        values: &'a [f64],
        n_instances: usize,
        len: usize,
    ) -> Result<Self, EtscError> {
        Self::new(values, n_instances, len, 1)
    }

    /// Returns true when `n_channels == 1`.
    pub fn is_univariate(&self) -> bool {
        self.n_channels == 1
    }

    /// Number of values one instance occupies.
    pub fn instance_stride(&self) -> usize {
        self.len * self.n_channels
    }

    /// Borrows the samples of one instance, if in range.
    pub fn instance(&self, index: usize) -> Option<&'a [f64]> {
        if index >= self.n_instances {
            return None;
        }
        let stride = self.instance_stride();
        let start = index * stride;
        Some(&self.values[start..start + stride])
    }

    /// Copies the view into an owned batch.
    pub fn to_owned_batch(&self) -> SeriesBatch {
        SeriesBatch {
            values: self.values.to_vec(),
            n_instances: self.n_instances,
            len: self.len,
            n_channels: self.n_channels,
        }
    }
}

/// Owned batch of equal-length series, used to materialize truncated
/// prefixes for the checkpoint walk.
#[derive(Clone, Debug, PartialEq)]
pub struct SeriesBatch {
    values: Vec<f64>,
    n_instances: usize,
    len: usize,
    n_channels: usize,
}

impl SeriesBatch {
    /// Constructs a validated owned batch.
    pub fn new(
        values: Vec<f64>,
        n_instances: usize,
        len: usize,
        n_channels: usize,
    ) -> Result<Self, EtscError> {
        validate_shape(values.len(), n_instances, len, n_channels)?;
        Ok(Self {
            values,
            n_instances,
            len,
            n_channels,
        })
    }

    pub fn n_instances(&self) -> usize {
        self.n_instances
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn n_channels(&self) -> usize {
        self.n_channels
    }

    /// Borrows the batch as a view.
    pub fn view(&self) -> SeriesBatchView<'_> {
        SeriesBatchView {
            values: &self.values,
            n_instances: self.n_instances,
            len: self.len,
            n_channels: self.n_channels,
        }
    }

    /// Produces the owned prefix batch of length `len`.
    ///
    /// Each instance keeps its first `len * n_channels` samples.
    pub fn truncate_to(&self, len: usize) -> Result<SeriesBatch, EtscError> {
        if len == 0 || len > self.len {
            return Err(EtscError::invalid_input(format!(
                "truncation length must be in 1..={}; got {len}",
                self.len
            )));
        }

        let src_stride = self.len * self.n_channels;
        let dst_stride = len * self.n_channels;
        let mut values = Vec::with_capacity(self.n_instances * dst_stride);
        for instance in 0..self.n_instances {
            let start = instance * src_stride;
            values.extend_from_slice(&self.values[start..start + dst_stride]);
        }

        SeriesBatch::new(values, self.n_instances, len, self.n_channels)
    }
}

fn validate_shape(
    value_len: usize,
    n_instances: usize,
    len: usize,
    n_channels: usize,
) -> Result<(), EtscError> {
    if n_instances == 0 {
        return Err(EtscError::invalid_input("n_instances must be >= 1"));
    }
    if len == 0 {
        return Err(EtscError::invalid_input("series length must be >= 1"));
    }
    if n_channels == 0 {
        return Err(EtscError::invalid_input("n_channels must be >= 1"));
    }

    let expected_len = n_instances
        .checked_mul(len)
        .and_then(|v| v.checked_mul(n_channels))
        .ok_or_else(|| {
            EtscError::invalid_input("n_instances*len*n_channels overflow while validating shape")
        })?;

    if value_len != expected_len {
        return Err(EtscError::invalid_input(format!(
            "value length mismatch: got {value_len}, expected {expected_len} \
             (n_instances={n_instances}, len={len}, n_channels={n_channels})"
        )));
    }

    Ok(())
}
