//! Schema discovery
//!
//! Objects are listed from the live catalog and filtered by the include and
//! exclude options. The include list is validated only afterwards, against
//! what discovery actually found.

use crate::adapter::TypeAdapter;
use crate::database::traits::{SourceConnection, TextRow};
use crate::schema::{
    EventInfo, RoutineInfo, RoutineKind, SchemaCatalog, TableInfo, TriggerInfo, ViewInfo,
};
use crate::settings::DumpSettings;
use crate::{Error, Result};

/// List the objects to export, in catalog order
pub async fn discover<C: SourceConnection + ?Sized>(
    source: &mut C,
    adapter: &dyn TypeAdapter,
    database: &str,
    settings: &DumpSettings,
) -> Result<SchemaCatalog> {
    let mut catalog = SchemaCatalog::default();

    let tables = first_column(source.query_text(&adapter.show_tables(database)).await?);
    catalog.tables = select_names(tables, &settings.include_tables, &settings.exclude_tables)
        .into_iter()
        .map(|name| TableInfo { name })
        .collect();

    let views = first_column(source.query_text(&adapter.show_views(database)).await?);
    catalog.views = select_names(views, &settings.include_views, &settings.exclude_tables)
        .into_iter()
        .map(|name| ViewInfo { name })
        .collect();

    if !settings.skip_triggers {
        let rows = source.query_text(&adapter.show_triggers(database)).await?;
        catalog.triggers = rows
            .into_iter()
            .filter_map(|row| match (cell(&row, 0), cell(&row, 1)) {
                (Some(name), Some(table)) => Some(TriggerInfo { name, table }),
                _ => None,
            })
            .filter(|trigger| catalog.has_table(&trigger.table))
            .collect();
    }

    if settings.routines {
        if let Some(sql) = adapter.show_routines(database) {
            let rows = source.query_text(&sql).await?;
            catalog.routines = rows
                .into_iter()
                .filter_map(|row| {
                    let name = cell(&row, 0)?;
                    let kind = RoutineKind::from_catalog(&cell(&row, 1).unwrap_or_default());
                    Some(RoutineInfo { name, kind })
                })
                .collect();
        } else {
            tracing::warn!(driver = adapter.name(), "Stored routines are not supported, skipping");
        }
    }

    if settings.events {
        if let Some(sql) = adapter.show_events(database) {
            catalog.events = first_column(source.query_text(&sql).await?)
                .into_iter()
                .map(|name| EventInfo { name })
                .collect();
        } else {
            tracing::warn!(driver = adapter.name(), "Scheduled events are not supported, skipping");
        }
    }

    tracing::debug!(
        tables = catalog.tables.len(),
        views = catalog.views.len(),
        triggers = catalog.triggers.len(),
        routines = catalog.routines.len(),
        events = catalog.events.len(),
        "Schema discovered"
    );

    Ok(catalog)
}

/// Fail when a requested table was not found by discovery
///
/// # Errors
///
/// Returns [`Error::NotFound`] naming every unmatched entry, in the order
/// they were requested.
pub fn check_includes(catalog: &SchemaCatalog, settings: &DumpSettings) -> Result<()> {
    let missing: Vec<&str> = settings
        .include_tables
        .iter()
        .filter(|name| !catalog.has_table(name))
        .map(String::as_str)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::NotFound(format!(
            "Table ({}) not found in database",
            missing.join(", ")
        )))
    }
}

/// Keep catalog names that pass the include and exclude lists
///
/// An empty include list admits everything. Catalog order is kept.
pub fn select_names(names: Vec<String>, include: &[String], exclude: &[String]) -> Vec<String> {
    names
        .into_iter()
        .filter(|name| include.is_empty() || include.contains(name))
        .filter(|name| !exclude.contains(name))
        .collect()
}

fn cell(row: &TextRow, index: usize) -> Option<String> {
    row.get(index).cloned().flatten()
}

fn first_column(rows: Vec<TextRow>) -> Vec<String> {
    rows.iter().filter_map(|row| cell(row, 0)).collect()
}
