/// Pre-training checks on tabular input
///
/// Both checks are pure: they read the frame and the target and either pass
/// or fail, never altering the data.
use polars::prelude::*;
use std::iter;

use crate::TrainError;

/// Ensure every feature column and the target are numeric
pub fn check_data_types(features: &DataFrame, target: &Series) -> crate::Result<()> {
    log::info!("Checking data types in features and target.");

    for column in features.get_columns() {
        if !column.dtype().is_numeric() {
            log::error!(
                "Non-numeric column found: {} with dtype: {}",
                column.name(),
                column.dtype()
            );
            return Err(non_numeric(column));
        }
    }

    if !target.dtype().is_numeric() {
        log::error!("Target variable has non-numeric dtype: {}", target.dtype());
        return Err(non_numeric(target));
    }

    log::info!("All columns are numeric.");
    Ok(())
}

/// Ensure no value is missing, NaN or infinite
///
/// Missing values (nulls and NaN) are reported before infinite ones.
pub fn check_for_nan_inf(features: &DataFrame, target: &Series) -> crate::Result<()> {
    log::info!("Checking for NaN and infinite values in the data.");

    let scans = features
        .get_columns()
        .iter()
        .chain(iter::once(target))
        .map(|series| Ok((series.name().to_string(), ValueScan::of(series)?)))
        .collect::<crate::Result<Vec<_>>>()?;

    if let Some((column, scan)) = scans.iter().find(|(_, scan)| scan.missing > 0) {
        log::error!("NaN values found in input data (column {}).", column);
        return Err(TrainError::DataIntegrity(format!(
            "NaN values detected in the input data: {} missing in column '{}'",
            scan.missing, column
        )));
    }

    if let Some((column, scan)) = scans.iter().find(|(_, scan)| scan.infinite > 0) {
        log::error!("Infinite values found in input data (column {}).", column);
        return Err(TrainError::DataIntegrity(format!(
            "Infinite values detected in the input data: {} in column '{}'",
            scan.infinite, column
        )));
    }

    log::info!("No NaN or infinite values found.");
    Ok(())
}

/// Run the type check, then the integrity check
pub fn validate_dataset(features: &DataFrame, target: &Series) -> crate::Result<()> {
    check_data_types(features, target)?;
    check_for_nan_inf(features, target)
}

/// Values of a numeric, fully populated series as f64
pub(crate) fn numeric_values(series: &Series) -> crate::Result<Vec<f64>> {
    if !series.dtype().is_numeric() {
        return Err(non_numeric(series));
    }

    let cast = series.cast(&DataType::Float64)?;
    cast.f64()?
        .into_iter()
        .map(|value| {
            value.ok_or_else(|| {
                TrainError::DataIntegrity(format!(
                    "missing value in column '{}'",
                    series.name()
                ))
            })
        })
        .collect()
}

fn non_numeric(series: &Series) -> TrainError {
    TrainError::DataType {
        column: series.name().to_string(),
        dtype: series.dtype().to_string(),
    }
}

/// Per-column tally of unusable values
#[derive(Debug, Default)]
struct ValueScan {
    /// Nulls plus NaN
    missing: usize,
    infinite: usize,
}

impl ValueScan {
    fn of(series: &Series) -> crate::Result<Self> {
        let mut scan = Self {
            missing: series.null_count(),
            infinite: 0,
        };

        // Integer columns cannot hold NaN or infinity
        if series.dtype().is_float() {
            let cast = series.cast(&DataType::Float64)?;
            for value in cast.f64()?.into_iter().flatten() {
                if value.is_nan() {
                    scan.missing += 1;
                } else if value.is_infinite() {
                    scan.infinite += 1;
                }
            }
        }

        Ok(scan)
    }
}
