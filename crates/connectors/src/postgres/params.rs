use model::core::value::Value;
use tokio_postgres::types::ToSql;

pub struct PgParam(Box<dyn ToSql + Sync + Send>);

impl PgParam {
    fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => PgParam(Box::new(Option::<String>::None)),
            Value::Bool(v) => PgParam(Box::new(*v)),
            Value::Int(v) => PgParam(Box::new(*v)),
            Value::Uint(v) => PgParam(Box::new(*v as i64)),
            Value::Float(v) => PgParam(Box::new(*v)),
            Value::Text(v) => PgParam(Box::new(v.clone())),
            Value::Bytes(v) => PgParam(Box::new(v.clone())),
            Value::Timestamp(v) => PgParam(Box::new(*v)),
        }
    }
}

impl AsRef<dyn ToSql + Sync> for PgParam {
    fn as_ref(&self) -> &(dyn ToSql + Sync + 'static) {
        &*self.0
    }
}

pub struct PgParams {
    params: Vec<PgParam>,
}

impl PgParams {
    pub fn from_values(values: &[Value]) -> Self {
        PgParams {
            params: values.iter().map(PgParam::from_value).collect(),
        }
    }

    pub fn as_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params.iter().map(|param| param.as_ref()).collect()
    }
}
