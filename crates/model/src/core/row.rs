use crate::{core::value::Value, errors::ConvertError};
use serde::{Deserialize, Serialize};

/// One named cell of a [`Row`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Field {
    pub name: String,
    pub value: Value,
}

/// A decoded database row: an ordered list of named values. Column lookup is
/// case-insensitive because the two stores of a migration do not always agree
/// on identifier casing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Row {
    pub fields: Vec<Field>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Row {
            fields: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.fields.push(Field {
            name: name.into(),
            value,
        });
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|field| field.name.eq_ignore_ascii_case(name))
            .map(|field| &field.value)
    }

    fn required(&self, name: &str) -> Result<&Value, ConvertError> {
        self.get(name)
            .ok_or_else(|| ConvertError::MissingColumn(name.to_string()))
    }

    pub fn i64(&self, name: &str) -> Result<i64, ConvertError> {
        let value = self.required(name)?;
        value.as_i64().ok_or_else(|| ConvertError::TypeMismatch {
            column: name.to_string(),
            expected: "int",
            actual: value.kind(),
        })
    }

    pub fn f64(&self, name: &str) -> Result<f64, ConvertError> {
        let value = self.required(name)?;
        value.as_f64().ok_or_else(|| ConvertError::TypeMismatch {
            column: name.to_string(),
            expected: "float",
            actual: value.kind(),
        })
    }

    pub fn bool(&self, name: &str) -> Result<bool, ConvertError> {
        let value = self.required(name)?;
        value.as_bool().ok_or_else(|| ConvertError::TypeMismatch {
            column: name.to_string(),
            expected: "bool",
            actual: value.kind(),
        })
    }

    pub fn text(&self, name: &str) -> Result<String, ConvertError> {
        let value = self.required(name)?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ConvertError::TypeMismatch {
                column: name.to_string(),
                expected: "text",
                actual: value.kind(),
            })
    }

    /// Clones the values of `columns` in order. Every column must be present;
    /// callers use this to build positional parameter lists.
    pub fn values_for(&self, columns: &[&str]) -> Result<Vec<Value>, ConvertError> {
        columns
            .iter()
            .map(|column| {
                self.get(column)
                    .cloned()
                    .ok_or_else(|| ConvertError::MissingColumn(column.to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Row {
        let mut row = Row::new();
        row.push("id", Value::Int(7));
        row.push("Name", Value::Text("xyz".to_string()));
        row.push("age", Value::Uint(100));
        row
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let row = sample();
        assert_eq!(row.text("name").unwrap(), "xyz");
        assert_eq!(row.i64("ID").unwrap(), 7);
    }

    #[test]
    fn uint_coerces_to_i64() {
        let row = sample();
        assert_eq!(row.i64("age").unwrap(), 100);
    }

    #[test]
    fn missing_column_is_reported() {
        let row = sample();
        assert!(matches!(
            row.i64("gender"),
            Err(ConvertError::MissingColumn(name)) if name == "gender"
        ));
    }

    #[test]
    fn type_mismatch_is_reported() {
        let row = sample();
        assert!(matches!(
            row.i64("name"),
            Err(ConvertError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn values_for_preserves_column_order() {
        let row = sample();
        let values = row.values_for(&["age", "id"]).unwrap();
        assert_eq!(values, vec![Value::Uint(100), Value::Int(7)]);
    }
}
