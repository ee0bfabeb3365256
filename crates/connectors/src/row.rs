use bigdecimal::{BigDecimal, ToPrimitive};
use model::batch::Record;
use serde_json::Value;
use tokio_postgres::Row as PgRow;

/// A row from either supported driver, convertible into the JSON record
/// shape the rest of the pipeline works with (§3: "mappings from field name
/// to JSON scalar or object").
pub enum DbRow<'a> {
    MySql(&'a mysql_async::Row),
    Postgres(&'a PgRow),
}

impl DbRow<'_> {
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        for name in self.column_names() {
            record.insert(name.clone(), self.get_value(&name));
        }
        record
    }

    pub fn column_names(&self) -> Vec<String> {
        match self {
            DbRow::MySql(row) => row
                .columns_ref()
                .iter()
                .map(|c| c.name_str().into_owned())
                .collect(),
            DbRow::Postgres(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
        }
    }

    fn get_value(&self, name: &str) -> Value {
        match self {
            DbRow::MySql(row) => mysql_value(row, name),
            DbRow::Postgres(row) => postgres_value(row, name),
        }
    }
}

fn mysql_value(row: &mysql_async::Row, name: &str) -> Value {
    use mysql_async::Value as MyValue;

    let idx = match row.columns_ref().iter().position(|c| c.name_str() == name) {
        Some(idx) => idx,
        None => return Value::Null,
    };

    match row.as_ref(idx) {
        None | Some(MyValue::NULL) => Value::Null,
        Some(MyValue::Int(i)) => Value::from(*i),
        Some(MyValue::UInt(u)) => Value::from(*u),
        Some(MyValue::Float(f)) => Value::from(*f as f64),
        Some(MyValue::Double(d)) => Value::from(*d),
        Some(MyValue::Bytes(bytes)) => match std::str::from_utf8(bytes) {
            Ok(s) => Value::String(s.to_string()),
            Err(_) => Value::String(hex_encode(bytes)),
        },
        Some(MyValue::Date(year, month, day, hour, minute, second, micros)) => Value::String(
            format!(
                "{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}.{micros:06}Z"
            ),
        ),
        Some(MyValue::Time(neg, days, hours, minutes, seconds, micros)) => {
            let sign = if *neg { "-" } else { "" };
            Value::String(format!(
                "{sign}{days}d{hours:02}:{minutes:02}:{seconds:02}.{micros:06}"
            ))
        }
    }
}

fn postgres_value(row: &PgRow, name: &str) -> Value {
    let type_name = row
        .columns()
        .iter()
        .find(|c| c.name() == name)
        .map(|c| c.type_().name())
        .unwrap_or("text");

    match type_name {
        "int2" => row.try_get::<_, Option<i16>>(name).ok().flatten().map(Value::from),
        "int4" => row.try_get::<_, Option<i32>>(name).ok().flatten().map(Value::from),
        "int8" => row.try_get::<_, Option<i64>>(name).ok().flatten().map(Value::from),
        "float4" => row
            .try_get::<_, Option<f32>>(name)
            .ok()
            .flatten()
            .map(|v| Value::from(v as f64)),
        "float8" => row.try_get::<_, Option<f64>>(name).ok().flatten().map(Value::from),
        "bool" => row.try_get::<_, Option<bool>>(name).ok().flatten().map(Value::from),
        "json" | "jsonb" => row
            .try_get::<_, Option<serde_json::Value>>(name)
            .ok()
            .flatten(),
        "timestamp" | "timestamptz" => row
            .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(name)
            .ok()
            .flatten()
            .map(|ts| Value::String(ts.to_rfc3339())),
        "date" => row
            .try_get::<_, Option<chrono::NaiveDate>>(name)
            .ok()
            .flatten()
            .map(|d| Value::String(d.to_string())),
        "uuid" => row
            .try_get::<_, Option<uuid::Uuid>>(name)
            .ok()
            .flatten()
            .map(|u| Value::String(u.to_string())),
        "numeric" => row
            .try_get::<_, Option<BigDecimal>>(name)
            .ok()
            .flatten()
            .map(|d| d.to_f64().map(Value::from).unwrap_or(Value::String(d.to_string())))
            .or(Some(Value::Null)),
        "bytea" => row
            .try_get::<_, Option<Vec<u8>>>(name)
            .ok()
            .flatten()
            .map(|b| Value::String(hex_encode(&b))),
        _ => row.try_get::<_, Option<String>>(name).ok().flatten().map(Value::String),
    }
    .unwrap_or(Value::Null)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
