//! Chart Builder - Plotly figure documents from a table
//!
//! Figures are plain JSON (`data` traces plus `layout`) so any Plotly client
//! can render them. Bins and group reductions are computed here; box traces
//! carry raw values and leave the quartiles to the renderer.

use crate::aggregate::{aggregate, output_column, AggFunc};
use crate::data_utils::{
    column_scalars, column_type, float_values, millis_to_datetime, require_column, value_counts,
    ColumnType, TEMPORAL_FORMAT,
};
use crate::error::{EngineError, Result};
use crate::safe_json::{float_to_json, sanitize, scalar_to_json};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlotKind {
    Bar,
    Pie,
    Scatter,
    Line,
    Histogram,
    Box,
}

impl PlotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlotKind::Bar => "bar",
            PlotKind::Pie => "pie",
            PlotKind::Scatter => "scatter",
            PlotKind::Line => "line",
            PlotKind::Histogram => "histogram",
            PlotKind::Box => "box",
        }
    }

    /// "Histogram chart", "Box chart", ...
    pub fn default_title(&self) -> String {
        let name = self.as_str();
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => format!("{}{} chart", first.to_ascii_uppercase(), chars.as_str()),
            None => "Chart".to_string(),
        }
    }
}

impl FromStr for PlotKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "bar" => Ok(PlotKind::Bar),
            "pie" => Ok(PlotKind::Pie),
            "scatter" => Ok(PlotKind::Scatter),
            "line" => Ok(PlotKind::Line),
            "histogram" => Ok(PlotKind::Histogram),
            "box" => Ok(PlotKind::Box),
            _ => Err(EngineError::UnsupportedChartType(s.to_string())),
        }
    }
}

impl fmt::Display for PlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build a Plotly figure for `plot_type` over `x_column` (and `y_column`)
pub fn build_chart(
    df: &DataFrame,
    plot_type: &str,
    x_column: &str,
    y_column: Option<&str>,
    title: Option<&str>,
) -> Result<Value> {
    let kind: PlotKind = plot_type.parse()?;
    let x = require_column(df, x_column)?;
    let y_column = y_column.filter(|c| !c.is_empty());
    if let Some(y) = y_column {
        require_column(df, y)?;
    }

    let title = match title {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => kind.default_title(),
    };
    debug!("Building {} chart on {} / {:?}", kind, x_column, y_column);

    let (trace, y_title) = match (kind, y_column) {
        (PlotKind::Bar, None) | (PlotKind::Pie, None) => {
            let (labels, counts) = count_labels(x)?;
            (categorical_trace(kind, labels, counts), "count".to_string())
        }
        (PlotKind::Bar, Some(y)) => {
            let (labels, values) = grouped(df, x_column, y, AggFunc::Mean)?;
            (categorical_trace(kind, labels, values), y.to_string())
        }
        (PlotKind::Pie, Some(y)) => {
            let (labels, values) = grouped(df, x_column, y, AggFunc::Sum)?;
            (categorical_trace(kind, labels, values), y.to_string())
        }
        (PlotKind::Scatter, Some(y)) | (PlotKind::Line, Some(y)) => {
            let mode = if kind == PlotKind::Scatter { "markers" } else { "lines" };
            let trace = json!({
                "type": "scatter",
                "mode": mode,
                "x": raw_values(x)?,
                "y": raw_values(require_column(df, y)?)?,
            });
            (trace, y.to_string())
        }
        (PlotKind::Scatter, None) | (PlotKind::Line, None) => {
            return Err(EngineError::MissingColumn(format!(
                "{} chart requires both x and y columns",
                kind
            )));
        }
        (PlotKind::Histogram, _) => (histogram_trace(x)?, "count".to_string()),
        (PlotKind::Box, Some(y)) => {
            let trace = json!({
                "type": "box",
                "x": raw_values(x)?,
                "y": raw_values(require_column(df, y)?)?,
            });
            (trace, y.to_string())
        }
        (PlotKind::Box, None) => {
            let trace = json!({
                "type": "box",
                "name": x_column,
                "y": raw_values(x)?,
            });
            (trace, x_column.to_string())
        }
    };

    let figure = json!({
        "data": [trace],
        "layout": {
            "title": {"text": title},
            "xaxis": {"title": {"text": x_column}},
            "yaxis": {"title": {"text": y_title}},
        },
    });
    Ok(sanitize(figure))
}

fn raw_values(series: &Series) -> Result<Vec<Value>> {
    Ok(column_scalars(series)?.iter().map(scalar_to_json).collect())
}

fn categorical_trace(kind: PlotKind, labels: Vec<Value>, values: Vec<Value>) -> Value {
    if kind == PlotKind::Pie {
        json!({"type": "pie", "labels": labels, "values": values})
    } else {
        json!({"type": "bar", "x": labels, "y": values})
    }
}

/// Value counts as parallel label/count arrays
pub fn count_labels(series: &Series) -> Result<(Vec<Value>, Vec<Value>)> {
    Ok(value_counts(series)?
        .iter()
        .map(|(value, n)| (scalar_to_json(value), Value::from(*n)))
        .unzip())
}

/// Reduce y per x group, dropping the missing-key group
fn grouped(df: &DataFrame, x: &str, y: &str, func: AggFunc) -> Result<(Vec<Value>, Vec<Value>)> {
    let reduced = aggregate(df, x, y, func.as_str())?;
    let keys = column_scalars(reduced.column(x)?)?;
    let values = column_scalars(reduced.column(&output_column(y, func))?)?;
    Ok(keys
        .iter()
        .zip(values.iter())
        .filter(|(key, _)| !key.is_null())
        .map(|(key, value)| (scalar_to_json(key), scalar_to_json(value)))
        .unzip())
}

/// Sturges' rule: ceil(log2 n) + 1
pub fn sturges_bins(n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    (n as f64).log2().ceil() as usize + 1
}

/// Equal-width bins over [min, max]; returns (edges, counts)
pub fn histogram_bins(values: &[f64]) -> (Vec<f64>, Vec<usize>) {
    let bins = sturges_bins(values.len());
    if bins == 0 {
        return (Vec::new(), Vec::new());
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if min == max {
        return (vec![min - 0.5, max + 0.5], vec![values.len()]);
    }

    let width = (max - min) / bins as f64;
    let edges = (0..=bins).map(|i| min + width * i as f64).collect();
    let mut counts = vec![0usize; bins];
    for v in values {
        let idx = (((v - min) / width).floor() as usize).min(bins - 1);
        counts[idx] += 1;
    }
    (edges, counts)
}

fn histogram_trace(x: &Series) -> Result<Value> {
    let column_type = column_type(x);
    let temporal = column_type == ColumnType::Temporal;
    if !(column_type.is_numeric() || temporal) || x.null_count() == x.len() {
        let (labels, counts) = count_labels(x)?;
        return Ok(json!({"type": "bar", "x": labels, "y": counts}));
    }

    // Temporal columns are binned on epoch milliseconds
    let values: Vec<f64> = float_values(x)?
        .into_iter()
        .flatten()
        .filter(|v| v.is_finite())
        .collect();
    let (edges, counts) = histogram_bins(&values);
    let render = |v: f64| {
        if temporal {
            millis_to_datetime(v.round() as i64).map_or(Value::Null, |t| {
                Value::String(t.format(TEMPORAL_FORMAT).to_string())
            })
        } else {
            float_to_json(v)
        }
    };
    let centers: Vec<Value> = edges.windows(2).map(|w| render((w[0] + w[1]) / 2.0)).collect();
    let ranges: Vec<Value> = edges
        .windows(2)
        .map(|w| json!([render(w[0]), render(w[1])]))
        .collect();
    let width = edges.get(1).zip(edges.first()).map(|(hi, lo)| hi - lo);

    Ok(json!({
        "type": "bar",
        "x": centers,
        "y": counts,
        "width": width.map_or(Value::Null, float_to_json),
        "customdata": ranges,
    }))
}
