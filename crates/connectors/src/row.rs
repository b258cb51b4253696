use crate::error::DbError;
use chrono::NaiveDate;
use model::core::{row::Row, value::Value};
use tracing::warn;

/// A borrowed driver row from either store, decodable into the shared
/// [`Row`] model.
pub enum DbRow<'a> {
    MySql(&'a mysql_async::Row),
    Pg(&'a tokio_postgres::Row),
}

impl DbRow<'_> {
    pub fn to_row(&self) -> Result<Row, DbError> {
        match self {
            DbRow::MySql(row) => mysql_to_row(row),
            DbRow::Pg(row) => pg_to_row(row),
        }
    }
}

fn mysql_to_row(row: &mysql_async::Row) -> Result<Row, DbError> {
    let columns = row.columns();
    let mut out = Row::with_capacity(columns.len());
    for (i, column) in columns.iter().enumerate() {
        let name = column.name_str().into_owned();
        let raw = row
            .get_opt::<mysql_async::Value, usize>(i)
            .ok_or_else(|| DbError::Unknown(format!("column index {i} out of range")))?
            .map_err(|err| DbError::Unknown(err.to_string()))?;
        out.push(name, decode_mysql_value(raw));
    }
    Ok(out)
}

fn decode_mysql_value(value: mysql_async::Value) -> Value {
    use mysql_async::Value as V;
    match value {
        V::NULL => Value::Null,
        V::Int(v) => Value::Int(v),
        V::UInt(v) => Value::Uint(v),
        V::Float(v) => Value::Float(v as f64),
        V::Double(v) => Value::Float(v),
        V::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(text) => Value::Text(text),
            Err(err) => Value::Bytes(err.into_bytes()),
        },
        V::Date(year, month, day, hour, minute, second, micros) => {
            NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
                .and_then(|date| {
                    date.and_hms_micro_opt(hour as u32, minute as u32, second as u32, micros)
                })
                .map(Value::Timestamp)
                .unwrap_or(Value::Null)
        }
        other => {
            warn!(value = ?other, "unsupported MySQL value, storing NULL");
            Value::Null
        }
    }
}

fn pg_to_row(row: &tokio_postgres::Row) -> Result<Row, DbError> {
    let mut out = Row::with_capacity(row.len());
    for (i, column) in row.columns().iter().enumerate() {
        let value = decode_pg_value(row, i, column)?;
        out.push(column.name().to_string(), value);
    }
    Ok(out)
}

fn decode_pg_value(
    row: &tokio_postgres::Row,
    index: usize,
    column: &tokio_postgres::Column,
) -> Result<Value, DbError> {
    let value = match column.type_().name() {
        "int8" => row.try_get::<_, Option<i64>>(index)?.map(Value::Int),
        "int4" => row
            .try_get::<_, Option<i32>>(index)?
            .map(|v| Value::Int(v as i64)),
        "int2" => row
            .try_get::<_, Option<i16>>(index)?
            .map(|v| Value::Int(v as i64)),
        "float8" => row.try_get::<_, Option<f64>>(index)?.map(Value::Float),
        "float4" => row
            .try_get::<_, Option<f32>>(index)?
            .map(|v| Value::Float(v as f64)),
        "bool" => row.try_get::<_, Option<bool>>(index)?.map(Value::Bool),
        "text" | "varchar" | "bpchar" => {
            row.try_get::<_, Option<String>>(index)?.map(Value::Text)
        }
        "bytea" => row.try_get::<_, Option<Vec<u8>>>(index)?.map(Value::Bytes),
        "timestamp" => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(index)?
            .map(Value::Timestamp),
        other => {
            warn!(
                column = column.name(),
                db_type = other,
                "unsupported Postgres column type, storing NULL"
            );
            None
        }
    };
    Ok(value.unwrap_or(Value::Null))
}
