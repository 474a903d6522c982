use crate::convert::{is_empty_geometry, IsochroneTable};
use crate::error::IsochroneError;

use serde_json::Value;
use shapefile::dbase::{FieldName, FieldValue, Record, TableWriterBuilder};
use std::path::{Path, PathBuf};

pub const MINUTES_FIELD: &str = "minutes";

// dBase limits
const MAX_FIELD_NAME_LEN: usize = 10;
const MAX_CHARACTER_LEN: usize = 254;
const NUMERIC_LEN: u8 = 20;
const NUMERIC_DECIMALS: u8 = 10;

// OTP answers in EPSG:4326
const WGS84_PRJ: &str = "GEOGCS[\"GCS_WGS_1984\",DATUM[\"D_WGS_1984\",SPHEROID[\"WGS_1984\",6378137.0,298.257223563]],PRIMEM[\"Greenwich\",0.0],UNIT[\"Degree\",0.0174532925199433]]";

#[derive(Debug, Clone, Copy, PartialEq)]
enum ColumnKind {
    Numeric,
    Logical,
    Character(u8),
}

/// A feature property carried into the attribute table.
#[derive(Debug, Clone, PartialEq)]
struct Column {
    key: String,
    field_name: String,
    kind: ColumnKind,
}

/// helper function to "mkdir -p path" - make all directories along a path
pub fn create_dirs<P: AsRef<Path>>(path: P) -> Result<(), IsochroneError> {
    let dirspath = path.as_ref();
    if !dirspath.is_dir() {
        std::fs::create_dir_all(dirspath).map_err(|source| IsochroneError::CreateDirectory {
            path: dirspath.to_path_buf(),
            source,
        })
    } else {
        Ok(())
    }
}

pub fn shapefile_path(directory: &Path, prefix: &str, point_id: &str) -> PathBuf {
    directory.join(format!("{prefix}_{point_id}.shp"))
}

/// Writes `table` to `{directory}/{prefix}_{point_id}.shp` along with its
/// `.shx`, `.dbf` and `.prj` companions, creating `directory` if needed.
///
/// The attribute table holds `minutes` followed by every feature property.
pub fn write_table(
    table: &IsochroneTable,
    directory: &Path,
    prefix: &str,
    point_id: &str,
) -> Result<PathBuf, IsochroneError> {
    let path = shapefile_path(directory, prefix, point_id);
    let to_error = |message: String| IsochroneError::Write {
        path: path.clone(),
        message,
    };

    // shapefile cannot encode a shape without points
    if let Some(index) = table.records.iter().position(|r| is_empty_geometry(&r.geometry)) {
        return Err(to_error(format!("record {index} has an empty geometry")));
    }
    create_dirs(directory)?;

    let columns = attribute_columns(table);
    let mut table_builder = TableWriterBuilder::new().add_numeric_field(
        field_name(MINUTES_FIELD).map_err(to_error)?,
        NUMERIC_LEN,
        NUMERIC_DECIMALS,
    );
    for column in columns.iter() {
        let name = field_name(&column.field_name).map_err(to_error)?;
        table_builder = match column.kind {
            ColumnKind::Numeric => table_builder.add_numeric_field(name, NUMERIC_LEN, NUMERIC_DECIMALS),
            ColumnKind::Logical => table_builder.add_logical_field(name),
            ColumnKind::Character(len) => table_builder.add_character_field(name, len),
        };
    }

    {
        let mut writer = shapefile::Writer::from_path(&path, table_builder)
            .map_err(|e| to_error(e.to_string()))?;
        for record in table.records.iter() {
            let shape = shapefile::Polygon::from(record.geometry.clone());
            let attributes = attribute_record(record.minutes, record.properties.as_ref(), &columns);
            writer
                .write_shape_and_record(&shape, &attributes)
                .map_err(|e| to_error(e.to_string()))?;
        }
    }

    let prj_path = path.with_extension("prj");
    std::fs::write(&prj_path, WGS84_PRJ).map_err(|e| IsochroneError::Write {
        path: prj_path.clone(),
        message: e.to_string(),
    })?;

    log::debug!("wrote {} records to '{}'", table.records.len(), path.display());
    Ok(path)
}

fn field_name(name: &str) -> Result<FieldName, String> {
    FieldName::try_from(name).map_err(|e| format!("invalid field name '{name}': {e:?}"))
}

// Truncates to the dBase field name limit on a char boundary
fn truncate_field_name(key: &str) -> String {
    let mut name = String::new();
    for c in key.chars() {
        if name.len() + c.len_utf8() > MAX_FIELD_NAME_LEN {
            break;
        }
        name.push(c);
    }
    name
}

fn attribute_columns(table: &IsochroneTable) -> Vec<Column> {
    let mut columns: Vec<Column> = Vec::new();
    let mut seen_keys: Vec<&str> = Vec::new();
    let mut taken = vec![MINUTES_FIELD.to_string()];

    for properties in table.records.iter().filter_map(|r| r.properties.as_ref()) {
        for key in properties.keys() {
            if seen_keys.contains(&key.as_str()) {
                continue;
            }
            seen_keys.push(key);

            let field_name = truncate_field_name(key);
            if field_name.is_empty() || taken.contains(&field_name) {
                log::warn!(
                    "dropping property '{}': field name '{}' is empty or already used",
                    key,
                    field_name
                );
                continue;
            }
            taken.push(field_name.clone());
            columns.push(Column {
                key: key.clone(),
                field_name,
                kind: column_kind(table, key),
            });
        }
    }
    columns
}

fn column_kind(table: &IsochroneTable, key: &str) -> ColumnKind {
    let values = table
        .records
        .iter()
        .filter_map(|r| r.properties.as_ref().and_then(|p| p.get(key)))
        .filter(|value| !value.is_null())
        .collect::<Vec<_>>();

    if values.iter().all(|value| value.is_number()) {
        ColumnKind::Numeric
    } else if values.iter().all(|value| value.is_boolean()) {
        ColumnKind::Logical
    } else {
        let len = values
            .iter()
            .map(|value| character_value(value).len())
            .max()
            .unwrap_or(1)
            .clamp(1, MAX_CHARACTER_LEN);
        ColumnKind::Character(len as u8)
    }
}

fn character_value(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let mut truncated = String::new();
    for c in text.chars() {
        if truncated.len() + c.len_utf8() > MAX_CHARACTER_LEN {
            break;
        }
        truncated.push(c);
    }
    truncated
}

fn attribute_record(
    minutes: f64,
    properties: Option<&serde_json::Map<String, Value>>,
    columns: &[Column],
) -> Record {
    let mut record = Record::default();
    record.insert(MINUTES_FIELD.to_string(), FieldValue::Numeric(Some(minutes)));

    for column in columns {
        let value = properties
            .and_then(|p| p.get(&column.key))
            .filter(|value| !value.is_null());
        let field_value = match column.kind {
            ColumnKind::Numeric => FieldValue::Numeric(value.and_then(Value::as_f64)),
            ColumnKind::Logical => FieldValue::Logical(value.and_then(Value::as_bool)),
            ColumnKind::Character(_) => FieldValue::Character(value.map(character_value)),
        };
        record.insert(column.field_name.clone(), field_value);
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::IsochroneRecord;
    use geo::{polygon, LineString, MultiPolygon, Polygon};
    use serde_json::json;

    fn record(minutes: f64, properties: Option<Value>) -> IsochroneRecord {
        let square = polygon![
            (x: 2.3, y: 48.8),
            (x: 2.4, y: 48.8),
            (x: 2.4, y: 48.9),
            (x: 2.3, y: 48.9),
            (x: 2.3, y: 48.8),
        ];
        IsochroneRecord {
            geometry: MultiPolygon::new(vec![square]),
            minutes,
            properties: properties.and_then(|p| p.as_object().cloned()),
        }
    }

    fn read_back(path: &Path) -> Vec<(shapefile::Polygon, Record)> {
        shapefile::read_as::<_, shapefile::Polygon, Record>(path).unwrap()
    }

    fn numeric(record: &Record, name: &str) -> Option<f64> {
        match record.get(name) {
            Some(FieldValue::Numeric(value)) => *value,
            other => panic!("expected numeric field '{name}', found {other:?}"),
        }
    }

    #[test]
    fn test_write_table_creates_directory_and_files() {
        let tmp = tempfile::tempdir().unwrap();
        let directory = tmp.path().join("car_a_insee");
        let table = IsochroneTable {
            records: vec![
                record(10.0, Some(json!({ "time": 300 }))),
                record(20.0, Some(json!({ "time": 600 }))),
            ],
            has_properties: true,
        };

        let path = write_table(&table, &directory, "c", "42").unwrap();

        assert_eq!(path, directory.join("c_42.shp"));
        assert!(path.exists());
        assert!(directory.join("c_42.shx").exists());
        assert!(directory.join("c_42.dbf").exists());
        assert!(directory.join("c_42.prj").exists());

        let rows = read_back(&path);
        assert_eq!(rows.len(), 2);
        assert_eq!(numeric(&rows[0].1, "minutes"), Some(10.0));
        assert_eq!(numeric(&rows[1].1, "minutes"), Some(20.0));
        assert_eq!(numeric(&rows[1].1, "time"), Some(600.0));
    }

    #[test]
    fn test_write_table_into_existing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let table = IsochroneTable {
            records: vec![record(0.0, None)],
            has_properties: false,
        };

        write_table(&table, tmp.path(), "t", "1").unwrap();
        write_table(&table, tmp.path(), "t", "2").unwrap();

        assert!(tmp.path().join("t_1.shp").exists());
        assert!(tmp.path().join("t_2.shp").exists());
        let rows = read_back(&tmp.path().join("t_2.shp"));
        assert_eq!(numeric(&rows[0].1, "minutes"), Some(0.0));
    }

    #[test]
    fn test_write_table_refuses_empty_geometry() {
        let tmp = tempfile::tempdir().unwrap();
        let directory = tmp.path().join("car_b_insee");
        let mut empty = record(5.0, None);
        empty.geometry = MultiPolygon::new(vec![Polygon::new(LineString::new(vec![]), vec![])]);
        let table = IsochroneTable {
            records: vec![record(10.0, None), empty],
            has_properties: false,
        };

        let result = write_table(&table, &directory, "c", "42");

        assert!(matches!(result, Err(IsochroneError::Write { .. })));
        assert!(!directory.join("c_42.shp").exists());
    }

    #[test]
    fn test_attribute_columns_kinds_and_truncation() {
        let table = IsochroneTable {
            records: vec![
                record(1.0, Some(json!({ "time": 60, "label": "inner", "walkable": true }))),
                record(2.0, Some(json!({ "time": 120, "label": null, "reachable_area": 3.5 }))),
            ],
            has_properties: true,
        };

        let columns = attribute_columns(&table);

        let summary = columns
            .iter()
            .map(|c| (c.field_name.as_str(), c.kind))
            .collect::<Vec<_>>();
        assert_eq!(
            summary,
            vec![
                ("label", ColumnKind::Character(5)),
                ("time", ColumnKind::Numeric),
                ("walkable", ColumnKind::Logical),
                ("reachable_", ColumnKind::Numeric),
            ]
        );
    }

    #[test]
    fn test_attribute_columns_drop_collisions() {
        let table = IsochroneTable {
            records: vec![record(
                1.0,
                Some(json!({ "minutes": 4, "duration_a_long": 1, "duration_a_longer": 2 })),
            )],
            has_properties: true,
        };

        let columns = attribute_columns(&table);

        let names = columns.iter().map(|c| c.key.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["duration_a_long"]);
    }

    #[test]
    fn test_truncate_field_name_respects_char_boundaries() {
        assert_eq!(truncate_field_name("time"), "time");
        assert_eq!(truncate_field_name("reachability"), "reachabili");
        assert_eq!(truncate_field_name("durée_totale"), "durée_tot");
    }
}
