//! View-to-CSV serialization.
//!
//! Runs `SELECT * FROM <view>` for each export view and writes the full
//! result set to `<outdir>/<name>.csv`, overwriting any prior file. Every
//! run is a full re-export; the BI tool just re-reads the files.

use std::path::{Path, PathBuf};

use csv::Writer;
use sqlx::postgres::PgRow;
use sqlx::{Column, Executor, Row, TypeInfo};
use tracing::info;

use crate::error::ExportError;
use crate::storage::Database;

/// View name → output file stem, in export order.
pub const EXPORTS: &[(&str, &str)] = &[
    ("vw_articles_enriched", "articles_enriched"),
    ("vw_category_counts", "category_counts"),
    ("vw_top_keywords", "top_keywords"),
    ("vw_recent_high_relevance", "recent_high_relevance"),
    ("vw_pubs_by_year", "pubs_by_year"),
    ("vw_category_over_time", "category_over_time"),
];

/// One file written by the exporter.
#[derive(Debug)]
pub struct ExportedFile {
    pub view: String,
    pub path: PathBuf,
    pub rows: usize,
}

/// Exports every view to CSV under `out_dir`, creating the directory if
/// needed. Returns the written files with their row counts.
pub async fn export_views(db: &Database, out_dir: &Path) -> Result<Vec<ExportedFile>, ExportError> {
    std::fs::create_dir_all(out_dir)?;

    let mut files = Vec::with_capacity(EXPORTS.len());
    for (view, stem) in EXPORTS {
        let file = export_view(db, view, &out_dir.join(format!("{stem}.csv"))).await?;
        info!(path = %file.path.display(), rows = file.rows, "wrote export");
        files.push(file);
    }
    Ok(files)
}

async fn export_view(db: &Database, view: &str, path: &Path) -> Result<ExportedFile, ExportError> {
    let sql = format!("SELECT * FROM {view}");
    let rows = sqlx::query(&sql).fetch_all(db.pool()).await?;

    let mut writer = Writer::from_path(path)?;

    if let Some(first) = rows.first() {
        writer.write_record(first.columns().iter().map(|c| c.name()))?;
        for row in &rows {
            writer.write_record(&render_row(row)?)?;
        }
    } else {
        // Empty view: still emit the header line so the BI tool keeps its
        // column bindings.
        let described = db.pool().describe(&sql).await?;
        writer.write_record(described.columns().iter().map(|c| c.name()))?;
    }

    writer.flush()?;
    Ok(ExportedFile {
        view: view.to_string(),
        path: path.to_path_buf(),
        rows: rows.len(),
    })
}

fn render_row(row: &PgRow) -> Result<Vec<String>, ExportError> {
    (0..row.columns().len())
        .map(|idx| render_value(row, idx))
        .collect()
}

/// Renders one column value as CSV text; NULL becomes the empty string.
fn render_value(row: &PgRow, idx: usize) -> Result<String, ExportError> {
    let column = &row.columns()[idx];
    let type_name = column.type_info().name();

    let rendered = match type_name {
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
            row.try_get::<Option<String>, _>(idx)?.unwrap_or_default()
        }
        "INT2" => opt_string(row.try_get::<Option<i16>, _>(idx)?),
        "INT4" => opt_string(row.try_get::<Option<i32>, _>(idx)?),
        "INT8" => opt_string(row.try_get::<Option<i64>, _>(idx)?),
        "FLOAT4" => opt_string(row.try_get::<Option<f32>, _>(idx)?),
        "FLOAT8" => opt_string(row.try_get::<Option<f64>, _>(idx)?),
        "BOOL" => opt_string(row.try_get::<Option<bool>, _>(idx)?),
        "DATE" => opt_string(row.try_get::<Option<chrono::NaiveDate>, _>(idx)?),
        "TIMESTAMP" => opt_string(row.try_get::<Option<chrono::NaiveDateTime>, _>(idx)?),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)?
            .map(|ts| ts.to_rfc3339())
            .unwrap_or_default(),
        "JSON" | "JSONB" => row
            .try_get::<Option<serde_json::Value>, _>(idx)?
            .map(|v| v.to_string())
            .unwrap_or_default(),
        _ => {
            return Err(ExportError::UnsupportedColumnType {
                column: column.name().to_string(),
                type_name: type_name.to_string(),
            })
        }
    };

    Ok(rendered)
}

fn opt_string<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema;

    #[test]
    fn test_every_view_has_an_export_entry() {
        let statements = schema::all_view_statements();
        assert_eq!(EXPORTS.len(), statements.len());
        for (view, _) in EXPORTS {
            assert!(
                statements.iter().any(|sql| sql.contains(view)),
                "no view statement defines {view}"
            );
        }
    }

    #[test]
    fn test_output_stems_drop_the_view_prefix() {
        for (view, stem) in EXPORTS {
            assert_eq!(*view, format!("vw_{stem}"));
        }
    }
}
