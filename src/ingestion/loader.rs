/// Relation file loading: UTF-8 text, one tuple per line, fields separated by
/// `|`, `#`-prefixed lines and empty lines skipped. Skipped attributes are
/// parsed past but not stored.
use std::path::Path;

use crate::config::RelationConfig;
use crate::error::{FoilError, FoilResult};
use crate::schema::predicate::FoilPredicate;
use crate::storage::columnar::{Column, Table, Value};

/// Load the relation's fact columns from its delimited text file.
pub fn load_relation_columns(
    conf: &RelationConfig,
    file_path: &Path,
    initial_capacity: usize,
) -> FoilResult<Vec<Column>> {
    let file_name = file_path.display().to_string();
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'|')
        .comment(Some(b'#'))
        .has_headers(false)
        .flexible(true)
        .from_path(file_path)
        .map_err(|e| FoilError::data_invalid_at(e.to_string(), file_name.clone(), 0))?;

    let num_loaded_columns = conf.attributes.iter().filter(|a| !a.skip).count();
    let mut buffers: Vec<Vec<Value>> = (0..num_loaded_columns)
        .map(|_| Vec::with_capacity(initial_capacity))
        .collect();

    for (line, record) in reader.records().enumerate() {
        let record =
            record.map_err(|e| FoilError::data_invalid_at(e.to_string(), file_name.clone(), line))?;
        if record.len() == 1 && record.get(0).map(str::trim) == Some("") {
            continue;
        }
        if record.len() != conf.attributes.len() {
            return Err(FoilError::data_invalid_at(
                format!(
                    "expected {} fields, found {}",
                    conf.attributes.len(),
                    record.len()
                ),
                file_name.clone(),
                line,
            ));
        }
        let mut column_id = 0;
        for (attribute, field) in conf.attributes.iter().zip(record.iter()) {
            if attribute.skip {
                continue;
            }
            let value: Value = field.trim().parse().map_err(|_| {
                FoilError::data_invalid_at(
                    format!("unparseable value '{field}'"),
                    file_name.clone(),
                    line,
                )
            })?;
            buffers[column_id].push(value);
            column_id += 1;
        }
    }

    Ok(buffers.into_iter().map(Column::from_values).collect())
}

/// Load a relation file and wrap it as a predicate with its fact table.
pub fn load_predicate(id: i32, conf: &RelationConfig, initial_capacity: usize) -> FoilResult<FoilPredicate> {
    let columns = load_relation_columns(conf, &conf.file, initial_capacity)?;
    if columns.is_empty() {
        return Err(FoilError::data_invalid(format!(
            "relation {} has no loaded attributes",
            conf.name
        )));
    }
    Ok(FoilPredicate::new(
        id,
        conf.name.clone(),
        conf.key_position(),
        conf.loaded_argument_types(),
        Table::new(columns),
    ))
}

/// Split a loaded example table into its positive prefix and negative suffix.
pub fn split_example_table(table: &Table, num_positive: usize) -> FoilResult<(Table, Table)> {
    if num_positive > table.num_tuples() {
        return Err(FoilError::data_invalid(format!(
            "num_positive {} exceeds {} loaded tuples",
            num_positive,
            table.num_tuples()
        )));
    }
    let num_negative = table.num_tuples() - num_positive;
    let positive = table
        .columns()
        .iter()
        .map(|c| c.slice(0, num_positive))
        .collect();
    let negative = table
        .columns()
        .iter()
        .map(|c| c.slice(num_positive, num_negative))
        .collect();
    Ok((Table::new(positive), Table::new(negative)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AttributeConfig;
    use std::io::Write;

    fn relation_conf(attributes: Vec<AttributeConfig>) -> RelationConfig {
        RelationConfig {
            name: "r".to_string(),
            file: "unused".into(),
            attributes,
            key: None,
            num_positive: None,
        }
    }

    fn attribute(domain_type: i32, skip: bool) -> AttributeConfig {
        AttributeConfig { domain_type, skip }
    }

    #[test]
    fn test_load_skips_comments_and_skip_columns() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# header comment").unwrap();
        writeln!(file, "1|100|2").unwrap();
        writeln!(file, "3|200|4").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "5|300|6").unwrap();

        let conf = relation_conf(vec![
            attribute(0, false),
            attribute(1, true),
            attribute(0, false),
        ]);
        let columns = load_relation_columns(&conf, file.path(), 16).unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].as_slice(), &[1, 3, 5]);
        assert_eq!(columns[1].as_slice(), &[2, 4, 6]);
    }

    #[test]
    fn test_field_count_mismatch_is_data_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1|2").unwrap();
        writeln!(file, "3").unwrap();
        let conf = relation_conf(vec![attribute(0, false), attribute(0, false)]);
        assert!(matches!(
            load_relation_columns(&conf, file.path(), 16),
            Err(FoilError::DataInvalid { .. })
        ));
    }

    #[test]
    fn test_unparseable_value_is_data_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1|oops").unwrap();
        let conf = relation_conf(vec![attribute(0, false), attribute(0, false)]);
        assert!(matches!(
            load_relation_columns(&conf, file.path(), 16),
            Err(FoilError::DataInvalid { .. })
        ));
    }

    #[test]
    fn test_split_example_table() {
        let table = Table::new(vec![Column::from_values(vec![1, 2, 3, 4, 5])]);
        let (positive, negative) = split_example_table(&table, 3).unwrap();
        assert_eq!(positive.num_tuples(), 3);
        assert_eq!(negative.column_at(0).as_slice(), &[4, 5]);
        assert!(split_example_table(&table, 9).is_err());
    }
}
