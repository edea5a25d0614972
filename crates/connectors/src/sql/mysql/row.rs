use chrono::{NaiveDate, NaiveTime};
use model::{
    core::value::{FieldValue, Value},
    records::row::RowData,
};
use mysql_async::{Row, Value as MyValue};

pub fn to_row_data(table: &str, row: &Row) -> RowData {
    let fields = row
        .columns_ref()
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            let value = row.as_ref(idx).map(convert_value).unwrap_or(Value::Null);
            FieldValue::new(column.name_str().into_owned(), value)
        })
        .collect();
    RowData::new(table, fields)
}

pub fn convert_value(value: &MyValue) -> Value {
    match value {
        MyValue::NULL => Value::Null,
        MyValue::Bytes(bytes) => match String::from_utf8(bytes.clone()) {
            Ok(s) => Value::String(s),
            Err(_) => Value::Bytes(bytes.clone()),
        },
        MyValue::Int(v) => Value::Int(*v),
        MyValue::UInt(v) => Value::Uint(*v),
        MyValue::Float(v) => Value::Float(f64::from(*v)),
        MyValue::Double(v) => Value::Float(*v),
        MyValue::Date(y, m, d, h, mi, s, us) => {
            let date = NaiveDate::from_ymd_opt(i32::from(*y), u32::from(*m), u32::from(*d));
            let time = NaiveTime::from_hms_micro_opt(
                u32::from(*h),
                u32::from(*mi),
                u32::from(*s),
                *us,
            );
            match (date, time) {
                (Some(date), Some(time)) => Value::Timestamp(date.and_time(time)),
                // zero dates ('0000-00-00') have no chrono representation
                _ => Value::String(format!(
                    "{y:04}-{m:02}-{d:02} {h:02}:{mi:02}:{s:02}"
                )),
            }
        }
        MyValue::Time(neg, days, h, m, s, _us) => {
            let hours = u32::from(*h) + days * 24;
            let sign = if *neg { "-" } else { "" };
            Value::String(format!("{sign}{hours:02}:{m:02}:{s:02}"))
        }
    }
}
