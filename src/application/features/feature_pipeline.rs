//! Indicator and feature computation for backtest tables.
//!
//! Model features (fed to the predictor) and filter indicators (read by the
//! entry gates) are separate column sets. Each column is NaN until its own
//! warm-up is complete; leading rows with any NaN are dropped when a table is
//! built.

use crate::domain::errors::FeatureError;
use crate::domain::market::{BarTable, MarketBar};
use crate::domain::strategy::FilterParams;
use ta::indicators::{AverageTrueRange, ExponentialMovingAverage, RelativeStrengthIndex, SlowStochastic};
use ta::{DataItem, Next};
use tracing::{debug, warn};

/// Model feature columns, in the order the model was trained on.
pub const MODEL_FEATURES: [&str; 8] = [
    "log_return",
    "rsi",
    "adx",
    "stoch_k",
    "natr",
    "price_vs_ema_short",
    "price_vs_ema_medium",
    "rsi_vs_ema_rsi",
];

/// ADX with Wilder's smoothing.
///
/// Accumulates the first `period` values as sums, then smooths. Returns
/// `None` until the directional index itself has a full period behind it.
pub struct WilderAdx {
    period: usize,
    prev: Option<(f64, f64, f64)>,
    tr_sum: f64,
    plus_dm_sum: f64,
    minus_dm_sum: f64,
    tr_smooth: f64,
    plus_dm_smooth: f64,
    minus_dm_smooth: f64,
    adx_smooth: f64,
    count: usize,
}

impl WilderAdx {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            prev: None,
            tr_sum: 0.0,
            plus_dm_sum: 0.0,
            minus_dm_sum: 0.0,
            tr_smooth: 0.0,
            plus_dm_smooth: 0.0,
            minus_dm_smooth: 0.0,
            adx_smooth: 0.0,
            count: 0,
        }
    }

    pub fn next(&mut self, high: f64, low: f64, close: f64) -> Option<f64> {
        let Some((prev_high, prev_low, prev_close)) = self.prev.replace((high, low, close)) else {
            return None;
        };

        let tr = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());
        let up_move = high - prev_high;
        let down_move = prev_low - low;
        let plus_dm = if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        };
        let minus_dm = if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        };

        self.count += 1;
        let n = self.period as f64;

        if self.count <= self.period {
            self.tr_sum += tr;
            self.plus_dm_sum += plus_dm;
            self.minus_dm_sum += minus_dm;
            if self.count == self.period {
                self.tr_smooth = self.tr_sum;
                self.plus_dm_smooth = self.plus_dm_sum;
                self.minus_dm_smooth = self.minus_dm_sum;
            }
        } else {
            self.tr_smooth = self.tr_smooth - (self.tr_smooth / n) + tr;
            self.plus_dm_smooth = self.plus_dm_smooth - (self.plus_dm_smooth / n) + plus_dm;
            self.minus_dm_smooth = self.minus_dm_smooth - (self.minus_dm_smooth / n) + minus_dm;
        }

        if self.count < self.period {
            return None;
        }

        let dx = if self.tr_smooth > 0.0 {
            let plus_di = 100.0 * self.plus_dm_smooth / self.tr_smooth;
            let minus_di = 100.0 * self.minus_dm_smooth / self.tr_smooth;
            let sum_di = plus_di + minus_di;
            if sum_di > 0.0 {
                100.0 * (plus_di - minus_di).abs() / sum_di
            } else {
                0.0
            }
        } else {
            0.0
        };

        if self.count == self.period {
            self.adx_smooth = dx;
        } else {
            self.adx_smooth = (self.adx_smooth * (n - 1.0) + dx) / n;
        }

        // DX needs one more period of smoothing before ADX is meaningful
        if self.count >= 2 * self.period {
            Some(self.adx_smooth)
        } else {
            None
        }
    }
}

/// Periods of the model feature set.
#[derive(Debug, Clone, PartialEq)]
pub struct FeaturePipeline {
    pub rsi_period: usize,
    pub adx_period: usize,
    pub stoch_period: usize,
    pub stoch_smoothing: usize,
    pub atr_period: usize,
    pub ema_short_period: usize,
    pub ema_medium_period: usize,
    pub rsi_ema_period: usize,
}

impl Default for FeaturePipeline {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            adx_period: 14,
            stoch_period: 14,
            stoch_smoothing: 3,
            atr_period: 14,
            ema_short_period: 20,
            ema_medium_period: 50,
            rsi_ema_period: 21,
        }
    }
}

impl FeaturePipeline {
    /// Builds the full table: model features, the filter indicators for
    /// `filters`, and any opaque extra columns carried through from the input.
    pub fn build_table(
        &self,
        bars: Vec<MarketBar>,
        filters: &FilterParams,
        extra: Vec<(String, Vec<f64>)>,
    ) -> Result<BarTable, FeatureError> {
        let model = self.model_columns(&bars)?;
        let indicators = filter_columns(&bars, filters)?;

        let first_complete = (0..bars.len())
            .find(|&row| {
                model
                    .iter()
                    .chain(indicators.iter())
                    .all(|(_, values)| values[row].is_finite())
            })
            .ok_or(FeatureError::InsufficientHistory {
                warmup: self.warmup().max(filter_warmup(filters)),
                available: bars.len(),
            })?;

        debug!(
            "Feature pipeline: dropping {} warm-up rows of {}",
            first_complete,
            bars.len()
        );

        let trim = |columns: Vec<(String, Vec<f64>)>| -> Vec<(String, Vec<f64>)> {
            columns
                .into_iter()
                .map(|(name, values)| (name, values[first_complete..].to_vec()))
                .collect()
        };

        // Computed columns win over input columns of the same name
        let extra: Vec<(String, Vec<f64>)> = extra
            .into_iter()
            .filter(|(name, _)| {
                let shadowed = model.iter().chain(indicators.iter()).any(|(own, _)| own == name);
                if shadowed {
                    warn!("Feature pipeline: ignoring input column '{}', it is computed", name);
                }
                !shadowed
            })
            .collect();

        let mut table = BarTable::new(bars[first_complete..].to_vec())?
            .with_feature_columns(trim(model))?;
        for (name, values) in trim(indicators).into_iter().chain(trim(extra)) {
            table = table.with_indicator(name, values)?;
        }
        Ok(table)
    }

    /// Rows needed before every model feature is defined.
    pub fn warmup(&self) -> usize {
        [
            self.rsi_period,
            2 * self.adx_period,
            self.stoch_period + self.stoch_smoothing,
            self.atr_period,
            self.ema_short_period,
            self.ema_medium_period,
            self.rsi_period + self.rsi_ema_period,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }

    pub fn model_columns(&self, bars: &[MarketBar]) -> Result<Vec<(String, Vec<f64>)>, FeatureError> {
        let items = data_items(bars)?;
        let closes: Vec<f64> = bars.iter().map(|bar| bar.close).collect();

        let log_return: Vec<f64> = std::iter::once(f64::NAN)
            .chain(closes.windows(2).map(|w| (w[1] / w[0]).ln()))
            .collect();

        let mut rsi_indicator = RelativeStrengthIndex::new(self.rsi_period)
            .map_err(|e| indicator_error("rsi", e))?;
        let rsi: Vec<f64> = closes.iter().map(|&close| rsi_indicator.next(close)).collect();

        let mut rsi_ema = ExponentialMovingAverage::new(self.rsi_ema_period)
            .map_err(|e| indicator_error("ema_rsi", e))?;
        let rsi_vs_ema_rsi: Vec<f64> = rsi.iter().map(|&value| value - rsi_ema.next(value)).collect();

        let mut stoch = SlowStochastic::new(self.stoch_period, self.stoch_smoothing)
            .map_err(|e| indicator_error("stoch", e))?;
        let stoch_k: Vec<f64> = items.iter().map(|item| stoch.next(item)).collect();

        let natr = natr_series(bars, &items, self.atr_period)?;
        let adx = adx_series(bars, self.adx_period);
        let vs_short = price_vs_ema(&closes, self.ema_short_period)?;
        let vs_medium = price_vs_ema(&closes, self.ema_medium_period)?;

        let columns = vec![
            log_return,
            mask_warmup(rsi, self.rsi_period),
            adx,
            mask_warmup(stoch_k, self.stoch_period + self.stoch_smoothing),
            natr,
            mask_warmup(vs_short, self.ema_short_period),
            mask_warmup(vs_medium, self.ema_medium_period),
            mask_warmup(rsi_vs_ema_rsi, self.rsi_period + self.rsi_ema_period),
        ];

        Ok(MODEL_FEATURES
            .iter()
            .map(|name| name.to_string())
            .zip(columns)
            .collect())
    }

    /// Returns a copy of `table` carrying the filter indicators for
    /// `filters`, computing only the columns it does not have yet.
    pub fn extend_with_filters(table: &BarTable, filters: &FilterParams) -> Result<BarTable, FeatureError> {
        let missing = [
            filters.trend_column(),
            filters.volatility_column(),
            filters.strength_column(),
        ]
        .into_iter()
        .any(|column| !table.has_indicator(&column));

        if !missing {
            return Ok(table.clone());
        }

        let mut extended = table.clone();
        for (name, values) in filter_columns(table.bars(), filters)? {
            if !extended.has_indicator(&name) {
                extended = extended.with_indicator(name, values)?;
            }
        }
        Ok(extended)
    }
}

/// Trend EMA, normalized ATR and ADX for the given periods.
pub fn filter_columns(
    bars: &[MarketBar],
    filters: &FilterParams,
) -> Result<Vec<(String, Vec<f64>)>, FeatureError> {
    let items = data_items(bars)?;
    let closes: Vec<f64> = bars.iter().map(|bar| bar.close).collect();

    let mut ema = ExponentialMovingAverage::new(filters.ema_period)
        .map_err(|e| indicator_error("ema", e))?;
    let trend: Vec<f64> = closes.iter().map(|&close| ema.next(close)).collect();

    Ok(vec![
        (filters.trend_column(), mask_warmup(trend, filters.ema_period)),
        (
            filters.volatility_column(),
            natr_series(bars, &items, filters.atr_period)?,
        ),
        (filters.strength_column(), adx_series(bars, filters.adx_period)),
    ])
}

fn filter_warmup(filters: &FilterParams) -> usize {
    filters
        .ema_period
        .max(filters.atr_period)
        .max(2 * filters.adx_period)
}

fn data_items(bars: &[MarketBar]) -> Result<Vec<DataItem>, FeatureError> {
    bars.iter()
        .enumerate()
        .map(|(index, bar)| {
            DataItem::builder()
                .open(bar.open)
                .high(bar.high)
                .low(bar.low)
                .close(bar.close)
                .volume(bar.volume)
                .build()
                .map_err(|e| FeatureError::MalformedBar {
                    index,
                    reason: format!("{:?}", e),
                })
        })
        .collect()
}

/// ATR as a percentage of the close.
fn natr_series(bars: &[MarketBar], items: &[DataItem], period: usize) -> Result<Vec<f64>, FeatureError> {
    let mut atr = AverageTrueRange::new(period).map_err(|e| indicator_error("atr", e))?;
    let natr = bars
        .iter()
        .zip(items)
        .map(|(bar, item)| {
            let value = atr.next(item);
            if bar.close > 0.0 {
                value / bar.close * 100.0
            } else {
                f64::NAN
            }
        })
        .collect();
    Ok(mask_warmup(natr, period))
}

fn adx_series(bars: &[MarketBar], period: usize) -> Vec<f64> {
    let mut adx = WilderAdx::new(period);
    bars.iter()
        .map(|bar| adx.next(bar.high, bar.low, bar.close).unwrap_or(f64::NAN))
        .collect()
}

/// Percentage distance of the close from its EMA.
fn price_vs_ema(closes: &[f64], period: usize) -> Result<Vec<f64>, FeatureError> {
    let mut ema = ExponentialMovingAverage::new(period).map_err(|e| indicator_error("ema", e))?;
    Ok(closes
        .iter()
        .map(|&close| {
            let average = ema.next(close);
            (close - average) / average * 100.0
        })
        .collect())
}

fn mask_warmup(mut values: Vec<f64>, warmup: usize) -> Vec<f64> {
    let end = warmup.saturating_sub(1).min(values.len());
    values[..end].fill(f64::NAN);
    values
}

fn indicator_error(indicator: &str, error: ta::errors::TaError) -> FeatureError {
    FeatureError::Indicator {
        indicator: indicator.to_string(),
        reason: format!("{:?}", error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trending_bars(count: usize) -> Vec<MarketBar> {
        (0..count)
            .map(|i| {
                let base = 100.0 + i as f64 * 0.5 + (i as f64 * 0.7).sin() * 2.0;
                MarketBar::new(i as i64 * 3_600_000, base, base + 1.0, base - 1.0, base + 0.3, 10.0)
            })
            .collect()
    }

    #[test]
    fn test_wilder_adx_warmup() {
        let mut adx = WilderAdx::new(3);
        let bars = trending_bars(10);
        let values: Vec<Option<f64>> = bars
            .iter()
            .map(|bar| adx.next(bar.high, bar.low, bar.close))
            .collect();

        // First bar seeds, then 2 * period updates are needed
        assert!(values[..6].iter().all(Option::is_none));
        assert!(values[6].is_some());
        assert!(values[6..].iter().all(|v| v.is_some_and(|x| (0.0..=100.0).contains(&x))));
    }

    #[test]
    fn test_build_table_drops_warmup_rows() {
        let pipeline = FeaturePipeline::default();
        let filters = FilterParams {
            ema_period: 50,
            atr_period: 14,
            adx_period: 14,
        };
        let bars = trending_bars(200);
        let table = pipeline.build_table(bars, &filters, Vec::new()).unwrap();

        assert!(table.len() < 200);
        assert!(table.len() >= 200 - pipeline.warmup());
        assert_eq!(table.feature_width(), MODEL_FEATURES.len());
        assert!(table.has_indicator("ema_50"));
        assert!(table.has_indicator("natr_14"));
        assert!(table.has_indicator("adx_14"));

        let all = table.window(table.len(), table.len()).unwrap();
        assert!(!all.has_missing());
    }

    #[test]
    fn test_build_table_insufficient_history() {
        let pipeline = FeaturePipeline::default();
        let err = pipeline
            .build_table(trending_bars(20), &FilterParams::default(), Vec::new())
            .unwrap_err();
        assert!(matches!(err, FeatureError::InsufficientHistory { .. }));
    }

    #[test]
    fn test_malformed_bar_rejected() {
        let mut bars = trending_bars(100);
        bars[10].low = bars[10].high + 5.0;
        let err = FeaturePipeline::default()
            .model_columns(&bars)
            .unwrap_err();
        assert!(matches!(err, FeatureError::MalformedBar { index: 10, .. }));
    }

    #[test]
    fn test_extend_with_filters_adds_missing_columns() {
        let pipeline = FeaturePipeline::default();
        let table = pipeline
            .build_table(trending_bars(150), &FilterParams::default(), Vec::new())
            .err();
        // 150 bars cannot warm up a 200-period EMA
        assert!(table.is_some());

        let short = FilterParams {
            ema_period: 20,
            atr_period: 14,
            adx_period: 14,
        };
        let table = pipeline.build_table(trending_bars(150), &short, Vec::new()).unwrap();
        let other = FilterParams {
            ema_period: 30,
            ..short
        };
        let extended = FeaturePipeline::extend_with_filters(&table, &other).unwrap();
        assert!(extended.has_indicator("ema_20"));
        assert!(extended.has_indicator("ema_30"));
        assert_eq!(extended.len(), table.len());
        // Fresh column is masked during its own warm-up
        assert!(extended.indicator_at("ema_30", 0).unwrap().is_nan());
    }

    #[test]
    fn test_input_columns_named_like_computed_ones_are_ignored() {
        let mut csv = String::from("timestamp,open,high,low,close,volume,rsi,ema_50,funding\n");
        for bar in trending_bars(200) {
            csv.push_str(&format!(
                "{},{},{},{},{},{},-1,0,0.0001\n",
                bar.timestamp, bar.open, bar.high, bar.low, bar.close, bar.volume
            ));
        }
        let data = crate::infrastructure::persistence::read_bars(csv.as_bytes()).unwrap();
        let filters = FilterParams {
            ema_period: 50,
            atr_period: 14,
            adx_period: 14,
        };

        let table = FeaturePipeline::default()
            .build_table(data.bars, &filters, data.extra_columns)
            .unwrap();

        assert!(table.has_indicator("funding"));
        assert!(!table.has_indicator("rsi"));
        assert_eq!(table.feature_width(), MODEL_FEATURES.len());
        // Computed EMA, not the zeros from the file
        assert!(table.indicator_at("ema_50", table.len() - 1).unwrap() > 100.0);
        let rsi_column = MODEL_FEATURES.iter().position(|name| *name == "rsi").unwrap();
        let window = table.window(table.len(), 1).unwrap();
        assert!((0.0..=100.0).contains(&window.row(0)[rsi_column]));
    }
}
