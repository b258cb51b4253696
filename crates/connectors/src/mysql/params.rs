use chrono::{Datelike, Timelike};
use model::core::value::Value;
use mysql_async::{Params, Value as MySqlValue};

pub struct MySqlParams(Vec<MySqlValue>);

impl MySqlParams {
    pub fn from_values(values: &[Value]) -> Self {
        MySqlParams(values.iter().map(encode).collect())
    }

    pub fn into_params(self) -> Params {
        if self.0.is_empty() {
            Params::Empty
        } else {
            Params::Positional(self.0)
        }
    }
}

fn encode(value: &Value) -> MySqlValue {
    match value {
        Value::Null => MySqlValue::NULL,
        Value::Bool(v) => MySqlValue::Int(if *v { 1 } else { 0 }),
        Value::Int(v) => MySqlValue::Int(*v),
        Value::Uint(v) => MySqlValue::UInt(*v),
        Value::Float(v) => MySqlValue::Double(*v),
        Value::Text(v) => MySqlValue::Bytes(v.clone().into_bytes()),
        Value::Bytes(v) => MySqlValue::Bytes(v.clone()),
        Value::Timestamp(ts) => MySqlValue::Date(
            ts.year() as u16,
            ts.month() as u8,
            ts.day() as u8,
            ts.hour() as u8,
            ts.minute() as u8,
            ts.second() as u8,
            ts.and_utc().timestamp_subsec_micros(),
        ),
    }
}
