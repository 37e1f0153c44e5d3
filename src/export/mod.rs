//! CSV export of the materialized views.

pub mod csv_writer;

pub use csv_writer::{export_views, ExportedFile, EXPORTS};
