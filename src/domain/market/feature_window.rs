use std::borrow::Cow;

/// A lookback window of feature rows handed to the predictor.
///
/// Borrowed straight from the [`BarTable`](super::BarTable) when unscaled;
/// scalers produce an owned copy.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureWindow<'a> {
    values: Cow<'a, [f64]>,
    width: usize,
}

impl<'a> FeatureWindow<'a> {
    pub fn borrowed(values: &'a [f64], width: usize) -> Self {
        Self {
            values: Cow::Borrowed(values),
            width,
        }
    }

    pub fn owned(values: Vec<f64>, width: usize) -> FeatureWindow<'static> {
        FeatureWindow {
            values: Cow::Owned(values),
            width,
        }
    }

    /// Flattened row-major values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn rows(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.values.len() / self.width
        }
    }

    pub fn row(&self, index: usize) -> &[f64] {
        &self.values[index * self.width..(index + 1) * self.width]
    }

    /// Most recent row of the window.
    pub fn last_row(&self) -> Option<&[f64]> {
        self.rows().checked_sub(1).map(|last| self.row(last))
    }

    /// True if any value is NaN or infinite.
    pub fn has_missing(&self) -> bool {
        self.values.iter().any(|value| !value.is_finite())
    }

    pub fn into_owned(self) -> FeatureWindow<'static> {
        FeatureWindow {
            values: Cow::Owned(self.values.into_owned()),
            width: self.width,
        }
    }
}
