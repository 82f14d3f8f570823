//! Histogram widget.
//!
//! Bucketing runs in SQL. Without overrides the bin count follows the
//! Freedman-Diaconis rule, `(max - min) / (2 * IQR * n^(1/3))`, clamped to
//! `[4, 20]` (4 when the IQR or the row count is zero). The formatter then
//! turns the sparse `GROUP BY bin` rows into a dense, contiguous array of
//! buckets.

use serde::Serialize;

use super::WidgetOverrides;
use crate::error::{MapError, Result};
use crate::mapconfig::WidgetOptions;
use crate::sql::{row_f64, row_i64, Row};

/// Lower bound of the computed bin count.
pub const MIN_BINS: u32 = 4;

/// Upper bound of the computed bin count.
pub const MAX_BINS: u32 = 20;

/// Largest bin count accepted from a declaration or request override.
pub const MAX_REQUESTED_BINS: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub bin: u32,
    pub start: f64,
    pub end: f64,
    pub freq: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramResult {
    pub bin_width: f64,
    pub bins_count: u32,
    pub bins_start: f64,
    pub nulls: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg: Option<f64>,
    pub bins: Vec<HistogramBin>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistogramWidget {
    column: String,
    bins: Option<u32>,
}

impl HistogramWidget {
    pub fn new(options: &WidgetOptions) -> Result<Self> {
        let column = options
            .column
            .clone()
            .ok_or_else(|| MapError::Config("Histogram expects 'column' option".into()))?;
        match options.bins {
            Some(0) => return Err(MapError::Config("Histogram 'bins' must be positive".into())),
            Some(bins) if bins > MAX_REQUESTED_BINS => {
                return Err(MapError::Config(format!(
                    "Histogram 'bins' must be at most {}, got {}",
                    MAX_REQUESTED_BINS, bins
                )))
            }
            _ => {}
        }
        Ok(Self {
            column,
            bins: options.bins,
        })
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    /// Checks override values before any query is built.
    pub fn validate_overrides(overrides: &WidgetOverrides) -> Result<()> {
        match overrides.bins {
            Some(0) => return Err(MapError::Validation("Histogram bins must be positive".into())),
            Some(bins) if bins > MAX_REQUESTED_BINS => {
                return Err(MapError::Validation(format!(
                    "Histogram bins must be at most {}, got {}",
                    MAX_REQUESTED_BINS, bins
                )))
            }
            _ => {}
        }
        if overrides.start.into_iter().chain(overrides.end).any(|v| !v.is_finite()) {
            return Err(MapError::Validation("Histogram start and end must be finite".into()));
        }
        if let (Some(start), Some(end)) = (overrides.start, overrides.end) {
            if start > end {
                return Err(MapError::Validation(format!(
                    "Histogram start {} is greater than end {}",
                    start, end
                )));
            }
        }
        Ok(())
    }

    pub fn build_query(&self, query: &str, overrides: &WidgetOverrides) -> Result<String> {
        Self::validate_overrides(overrides)?;
        let column = &self.column;

        let start = overrides
            .start
            .map(|v| v.to_string())
            .unwrap_or_else(|| "__cdb_min_val".to_string());
        let end = overrides
            .end
            .map(|v| v.to_string())
            .unwrap_or_else(|| "__cdb_max_val".to_string());
        let bins = match overrides.bins.or(self.bins) {
            Some(bins) => bins.to_string(),
            None => format!(
                "CASE WHEN __cdb_total_rows = 0 OR __cdb_iqr = 0 THEN {min} \
                 ELSE GREATEST({min}, LEAST({max}, CAST(ROUND((__cdb_max_val - __cdb_min_val) \
                 / (2 * __cdb_iqr * power(__cdb_total_rows, 1.0 / 3.0))) AS INT))) END",
                min = MIN_BINS,
                max = MAX_BINS
            ),
        };

        Ok(format!(
            "WITH \
             __cdb_filtered_source AS ({query}), \
             __cdb_basics AS ( \
               SELECT max({column}) AS __cdb_max_val, min({column}) AS __cdb_min_val, \
               count({column}) AS __cdb_total_rows \
               FROM __cdb_filtered_source \
             ), \
             __cdb_iqrange AS ( \
               SELECT coalesce(max(quartile_max) - min(quartile_max), 0) AS __cdb_iqr \
               FROM ( \
                 SELECT quartile, max(_cdb_iqr_column) AS quartile_max FROM ( \
                   SELECT {column} AS _cdb_iqr_column, ntile(4) OVER (ORDER BY {column}) AS quartile \
                   FROM __cdb_filtered_source WHERE {column} IS NOT NULL \
                 ) _cdb_quartiles \
                 WHERE quartile = 1 OR quartile = 3 \
                 GROUP BY quartile \
               ) __cdb_iqr_quartiles \
             ), \
             __cdb_params AS ( \
               SELECT {start} AS __cdb_start, {end} AS __cdb_end, {bins} AS __cdb_bins_number \
               FROM __cdb_basics, __cdb_iqrange \
             ), \
             __cdb_nulls AS ( \
               SELECT count(*) AS __cdb_nulls_count FROM __cdb_filtered_source WHERE {column} IS NULL \
             ) \
             SELECT \
               __cdb_start AS bins_start, \
               (__cdb_end - __cdb_start) / CAST(__cdb_bins_number AS float) AS bin_width, \
               __cdb_bins_number AS bins_number, \
               __cdb_nulls_count AS nulls_count, \
               CASE WHEN __cdb_start = __cdb_end THEN 0 \
               ELSE GREATEST(1, LEAST(__cdb_bins_number, \
                 WIDTH_BUCKET({column}, __cdb_start, __cdb_end, __cdb_bins_number))) - 1 END AS bin, \
               min({column})::numeric AS min, \
               max({column})::numeric AS max, \
               avg({column})::numeric AS avg, \
               count(*) AS freq \
             FROM __cdb_filtered_source, __cdb_params, __cdb_nulls \
             WHERE {column} IS NOT NULL AND {column} >= __cdb_start AND {column} <= __cdb_end \
             GROUP BY bin, bins_start, bin_width, bins_number, nulls_count \
             ORDER BY bin"
        ))
    }

    pub fn format(&self, rows: &[Row], overrides: &WidgetOverrides) -> HistogramResult {
        let first = rows.first();

        let bins_count = first
            .and_then(|r| row_i64(r, "bins_number"))
            .map(|b| u32::try_from(b.max(1)).unwrap_or(u32::MAX))
            .or(overrides.bins)
            .or(self.bins)
            .unwrap_or(0)
            .min(MAX_REQUESTED_BINS);
        let bins_start = first
            .and_then(|r| row_f64(r, "bins_start"))
            .or(overrides.start)
            .unwrap_or(0.0);
        let bin_width = first
            .and_then(|r| row_f64(r, "bin_width"))
            .or_else(|| match (overrides.start, overrides.end) {
                (Some(start), Some(end)) if bins_count > 0 => {
                    Some((end - start) / f64::from(bins_count))
                }
                _ => None,
            })
            .unwrap_or(0.0);
        let nulls = first.and_then(|r| row_i64(r, "nulls_count")).unwrap_or(0);

        // Without a bin count (no rows, no override) there is nothing to lay out
        if rows.is_empty() && (overrides.start.is_none() || overrides.end.is_none()) {
            return HistogramResult {
                bin_width,
                bins_count,
                bins_start,
                nulls,
                avg: None,
                bins: Vec::new(),
            };
        }

        let mut bins: Vec<HistogramBin> = (0..bins_count)
            .map(|bin| HistogramBin {
                bin,
                start: bins_start + f64::from(bin) * bin_width,
                end: bins_start + f64::from(bin + 1) * bin_width,
                freq: 0,
                min: None,
                max: None,
                avg: None,
            })
            .collect();

        let mut total = 0i64;
        let mut weighted = 0.0;
        for row in rows {
            let Some(index) = row_i64(row, "bin") else {
                continue;
            };
            let Some(bucket) = usize::try_from(index).ok().and_then(|i| bins.get_mut(i)) else {
                continue;
            };
            let freq = row_i64(row, "freq").unwrap_or(0);
            bucket.freq += freq;
            bucket.min = row_f64(row, "min");
            bucket.max = row_f64(row, "max");
            bucket.avg = row_f64(row, "avg");
            if let Some(avg) = bucket.avg {
                weighted += avg * freq as f64;
                total += freq;
            }
        }

        HistogramResult {
            bin_width,
            bins_count,
            bins_start,
            nulls,
            avg: (total > 0).then(|| weighted / total as f64),
            bins,
        }
    }
}
