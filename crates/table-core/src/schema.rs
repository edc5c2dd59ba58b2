use crate::error::{Result, TableError};
use arrow::datatypes::{DataType, Schema};

/// Two schemas are compatible when their fields match pairwise by type.
/// Field names are ignored so union can combine differently named inputs.
pub fn schemas_compatible(left: &Schema, right: &Schema) -> bool {
    left.fields().len() == right.fields().len()
        && left
            .fields()
            .iter()
            .zip(right.fields().iter())
            .all(|(l, r)| l.data_type() == r.data_type())
}

/// Logical types the row kernels (hash, compare, split) understand.
pub fn is_supported_type(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Boolean
            | DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
            | DataType::Utf8
            | DataType::LargeUtf8
            | DataType::Binary
            | DataType::Date32
            | DataType::Date64
    )
}

/// Rejects schemas that carry columns the kernels cannot process.
pub fn validate_supported(schema: &Schema) -> Result<()> {
    for field in schema.fields() {
        if !is_supported_type(field.data_type()) {
            return Err(TableError::Invalid(format!(
                "Column '{}' has unsupported type {}",
                field.name(),
                field.data_type()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::Field;

    #[test]
    fn test_compatible_ignores_names() {
        let left = Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, false),
        ]);
        let right = Schema::new(vec![
            Field::new("key", DataType::Int64, true),
            Field::new("label", DataType::Utf8, false),
        ]);
        assert!(schemas_compatible(&left, &right));
    }

    #[test]
    fn test_incompatible_types() {
        let left = Schema::new(vec![Field::new("id", DataType::Int64, false)]);
        let right = Schema::new(vec![Field::new("id", DataType::Utf8, false)]);
        assert!(!schemas_compatible(&left, &right));
    }

    #[test]
    fn test_incompatible_widths() {
        let left = Schema::new(vec![Field::new("id", DataType::Int64, false)]);
        let right = Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("extra", DataType::Int64, false),
        ]);
        assert!(!schemas_compatible(&left, &right));
    }

    #[test]
    fn test_validate_supported() {
        let good = Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, false),
        ]);
        assert!(validate_supported(&good).is_ok());

        let bad = Schema::new(vec![Field::new(
            "payload",
            DataType::Struct(arrow::datatypes::Fields::empty()),
            true,
        )]);
        assert!(matches!(
            validate_supported(&bad),
            Err(TableError::Invalid(_))
        ));
    }
}
