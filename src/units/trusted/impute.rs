//! Missing-value imputation.
//!
//! `KnnImputer` fills each missing cell with the mean of that column over the
//! k nearest rows that have it. Distances use only coordinates present in
//! both rows, scaled up by the share of coordinates that were missing.

use crate::domain::{Dataset, DatasetError, Value};

/// A numeric matrix with missing cells
pub type Matrix = Vec<Vec<Option<f64>>>;

/// K-nearest-neighbor imputer with uniform weights
#[derive(Debug, Clone, Copy)]
pub struct KnnImputer {
    k: usize,
}

impl KnnImputer {
    pub fn new(k: usize) -> Self {
        Self { k: k.max(1) }
    }

    /// Euclidean distance over shared coordinates, reweighted for missing ones
    pub fn distance(a: &[Option<f64>], b: &[Option<f64>]) -> Option<f64> {
        let mut sum = 0.0;
        let mut present = 0usize;
        for (x, y) in a.iter().zip(b) {
            if let (Some(x), Some(y)) = (x, y) {
                sum += (x - y).powi(2);
                present += 1;
            }
        }
        if present == 0 {
            return None;
        }
        let weight = a.len() as f64 / present as f64;
        Some((weight * sum).sqrt())
    }

    /// Impute every missing cell of a column that has at least one value.
    ///
    /// Distances are computed on the input, so imputed values never feed
    /// later imputations. Columns with no values at all are left as they are.
    pub fn fit_transform(&self, matrix: &Matrix) -> Matrix {
        let width = matrix.first().map(Vec::len).unwrap_or(0);
        let means: Vec<Option<f64>> = (0..width)
            .map(|col| {
                let values: Vec<f64> = matrix.iter().filter_map(|row| row[col]).collect();
                (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
            })
            .collect();

        let mut output = matrix.clone();
        for (r, row) in matrix.iter().enumerate() {
            if row.iter().all(Option::is_some) {
                continue;
            }

            // Distances to every other row, computed once per receiver
            let distances: Vec<Option<f64>> = matrix
                .iter()
                .enumerate()
                .map(|(d, donor)| if d == r { None } else { Self::distance(row, donor) })
                .collect();

            for col in 0..width {
                if row[col].is_some() {
                    continue;
                }
                let Some(mean) = means[col] else {
                    continue;
                };

                let mut donors: Vec<(f64, usize, f64)> = matrix
                    .iter()
                    .enumerate()
                    .filter_map(|(d, donor)| Some((distances[d]?, d, donor[col]?)))
                    .collect();
                donors.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
                donors.truncate(self.k);

                output[r][col] = Some(if donors.is_empty() {
                    mean
                } else {
                    donors.iter().map(|(_, _, v)| v).sum::<f64>() / donors.len() as f64
                });
            }
        }
        output
    }
}

/// Build a matrix from dataset columns; non-numeric cells count as missing
pub fn to_matrix(data: &Dataset, columns: &[String]) -> Matrix {
    let indices: Vec<usize> = columns.iter().filter_map(|c| data.column_index(c)).collect();
    data.rows()
        .iter()
        .map(|row| indices.iter().map(|&i| row[i].as_f64()).collect())
        .collect()
}

/// KNN-impute the listed columns in place, using them all as features
pub fn impute_columns(
    data: Dataset,
    columns: &[String],
    k: usize,
) -> Result<Dataset, DatasetError> {
    let columns: Vec<String> = columns
        .iter()
        .filter(|c| data.has_column(c))
        .cloned()
        .collect();
    if columns.is_empty() || data.is_empty() {
        return Ok(data);
    }

    let imputed = KnnImputer::new(k).fit_transform(&to_matrix(&data, &columns));
    write_back(data, &columns, &imputed)
}

/// Overwrite columns with imputed values, keeping integers where possible
pub fn write_back(
    mut data: Dataset,
    columns: &[String],
    imputed: &Matrix,
) -> Result<Dataset, DatasetError> {
    for (j, column) in columns.iter().enumerate() {
        let Some(original) = data.column(column) else {
            continue;
        };
        let values: Vec<Value> = original
            .iter()
            .zip(imputed)
            .map(|(orig, row)| match (orig, row[j]) {
                (v, _) if !v.is_null() => (*v).clone(),
                (_, Some(f)) => Value::Float(f),
                (_, None) => Value::Null,
            })
            .collect();
        data = data.with_column(column, values)?;
    }
    Ok(data)
}
