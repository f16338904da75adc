//! 结果集到记录的映射
//!
//! 列按驱动报告的类型解码。无法解码的非空值返回 `ExecutionError`，不会被
//! 静默替换为 null。

use std::net::{Ipv4Addr, Ipv6Addr};

use serde_json::{Number, Value};
use sqlx::postgres::types::{PgInterval, PgTimeTz};
use sqlx::postgres::{PgRow, PgTypeInfo, PgTypeKind};
use sqlx::types::chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::{BigDecimal, Json, Uuid};
use sqlx::{Column, Decode, Postgres, Row, TypeInfo, ValueRef};

use common::errors::{AppError, AppResult};
use common::models::Record;

/// 数组元素的解码方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Element {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Text,
    Uuid,
}

impl Element {
    fn from_type_name(name: &str) -> Option<Self> {
        Some(match name {
            "BOOL" => Element::Bool,
            "INT2" => Element::Int2,
            "INT4" => Element::Int4,
            "INT8" => Element::Int8,
            "FLOAT4" => Element::Float4,
            "FLOAT8" => Element::Float8,
            "NUMERIC" => Element::Numeric,
            "TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" => Element::Text,
            "UUID" => Element::Uuid,
            _ => return None,
        })
    }
}

/// 列值的解码方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    /// NUMERIC 以文本返回，保留精度
    Numeric,
    Text,
    Json,
    Uuid,
    Date,
    Time,
    TimeTz,
    Timestamp,
    TimestampTz,
    /// ISO 8601 时长，例如 `P1DT2H`
    Interval,
    Inet,
    Cidr,
    Bytes,
    /// 用户定义的枚举，返回标签
    Enum,
    Array(Element),
    Unsupported,
}

impl ColumnKind {
    /// 按驱动报告的类型名分类
    pub fn from_type_name(name: &str) -> Self {
        let name = name.to_ascii_uppercase();
        if let Some(element) = name.strip_suffix("[]") {
            return Element::from_type_name(element)
                .map(ColumnKind::Array)
                .unwrap_or(ColumnKind::Unsupported);
        }
        match name.as_str() {
            "BOOL" => ColumnKind::Bool,
            "INT2" | "SMALLINT" | "SMALLSERIAL" => ColumnKind::Int2,
            "INT4" | "INT" | "SERIAL" => ColumnKind::Int4,
            "INT8" | "BIGINT" | "BIGSERIAL" | "OID" => ColumnKind::Int8,
            "FLOAT4" | "REAL" => ColumnKind::Float4,
            "FLOAT8" | "DOUBLE PRECISION" => ColumnKind::Float8,
            "NUMERIC" => ColumnKind::Numeric,
            "TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" | "CITEXT" => ColumnKind::Text,
            "JSON" | "JSONB" => ColumnKind::Json,
            "UUID" => ColumnKind::Uuid,
            "DATE" => ColumnKind::Date,
            "TIME" => ColumnKind::Time,
            "TIMETZ" => ColumnKind::TimeTz,
            "TIMESTAMP" => ColumnKind::Timestamp,
            "TIMESTAMPTZ" => ColumnKind::TimestampTz,
            "INTERVAL" => ColumnKind::Interval,
            "INET" => ColumnKind::Inet,
            "CIDR" => ColumnKind::Cidr,
            "BYTEA" => ColumnKind::Bytes,
            _ => ColumnKind::Unsupported,
        }
    }

    /// 分类一列；枚举按标签解码，域类型按其基础类型解码
    pub fn of(type_info: &PgTypeInfo) -> Self {
        match type_info.kind() {
            PgTypeKind::Enum(_) => ColumnKind::Enum,
            PgTypeKind::Domain(base) => Self::of(base),
            _ => Self::from_type_name(type_info.name()),
        }
    }
}

/// 映射全部行，保持结果集顺序
pub fn map_rows(rows: &[PgRow]) -> AppResult<Vec<Record>> {
    rows.iter().map(map_row).collect()
}

/// 将一行映射为按列顺序排列的记录
pub fn map_row(row: &PgRow) -> AppResult<Record> {
    row.columns()
        .iter()
        .map(|column| {
            let type_info = column.type_info();
            let value = decode(row, column.ordinal(), ColumnKind::of(type_info)).map_err(|e| {
                AppError::ExecutionError(format!(
                    "cannot decode column {} of type {}: {}",
                    column.name(),
                    type_info.name(),
                    e
                ))
            })?;
            Ok((column.name().to_string(), value))
        })
        .collect()
}

fn get<'r, T: Decode<'r, Postgres>>(row: &'r PgRow, idx: usize) -> Result<T, sqlx::Error> {
    row.try_get_unchecked::<T, _>(idx)
}

fn text(value: impl ToString) -> Value {
    Value::String(value.to_string())
}

fn decode(row: &PgRow, idx: usize, kind: ColumnKind) -> Result<Value, sqlx::Error> {
    if row.try_get_raw(idx)?.is_null() {
        return Ok(Value::Null);
    }
    Ok(match kind {
        ColumnKind::Bool => Value::Bool(get(row, idx)?),
        ColumnKind::Int2 => Value::from(get::<i16>(row, idx)?),
        ColumnKind::Int4 => Value::from(get::<i32>(row, idx)?),
        ColumnKind::Int8 => Value::from(get::<i64>(row, idx)?),
        ColumnKind::Float4 => float(get::<f32>(row, idx)? as f64),
        ColumnKind::Float8 => float(get::<f64>(row, idx)?),
        ColumnKind::Numeric => text(get::<BigDecimal>(row, idx)?),
        ColumnKind::Text | ColumnKind::Enum => Value::String(get(row, idx)?),
        ColumnKind::Json => get::<Json<Value>>(row, idx)?.0,
        ColumnKind::Uuid => text(get::<Uuid>(row, idx)?),
        ColumnKind::Date => text(get::<NaiveDate>(row, idx)?),
        ColumnKind::Time => text(get::<NaiveTime>(row, idx)?),
        ColumnKind::TimeTz => {
            let t = get::<PgTimeTz<NaiveTime, FixedOffset>>(row, idx)?;
            Value::String(format!("{}{}", t.time, t.offset))
        }
        ColumnKind::Timestamp => text(get::<NaiveDateTime>(row, idx)?.format("%Y-%m-%dT%H:%M:%S%.f")),
        ColumnKind::TimestampTz => Value::String(get::<DateTime<Utc>>(row, idx)?.to_rfc3339()),
        ColumnKind::Interval => Value::String(interval_iso(&get::<PgInterval>(row, idx)?)),
        ColumnKind::Inet | ColumnKind::Cidr => {
            let raw = get::<Vec<u8>>(row, idx)?;
            let rendered = inet_text(&raw, kind == ColumnKind::Cidr)
                .ok_or_else(|| sqlx::Error::Decode("malformed network address".into()))?;
            Value::String(rendered)
        }
        ColumnKind::Bytes => Value::String(hex_bytes(&get::<Vec<u8>>(row, idx)?)),
        ColumnKind::Array(element) => Value::Array(decode_array(row, idx, element)?),
        ColumnKind::Unsupported => {
            return Err(sqlx::Error::Decode(
                "unsupported column type; cast it to text".into(),
            ))
        }
    })
}

fn decode_array(row: &PgRow, idx: usize, element: Element) -> Result<Vec<Value>, sqlx::Error> {
    fn each<T>(items: Vec<Option<T>>, f: impl Fn(T) -> Value) -> Vec<Value> {
        items.into_iter().map(|v| v.map(&f).unwrap_or(Value::Null)).collect()
    }
    Ok(match element {
        Element::Bool => each(get::<Vec<Option<bool>>>(row, idx)?, Value::Bool),
        Element::Int2 => each(get::<Vec<Option<i16>>>(row, idx)?, Value::from),
        Element::Int4 => each(get::<Vec<Option<i32>>>(row, idx)?, Value::from),
        Element::Int8 => each(get::<Vec<Option<i64>>>(row, idx)?, Value::from),
        Element::Float4 => each(get::<Vec<Option<f32>>>(row, idx)?, |n| float(n as f64)),
        Element::Float8 => each(get::<Vec<Option<f64>>>(row, idx)?, float),
        Element::Numeric => each(get::<Vec<Option<BigDecimal>>>(row, idx)?, text),
        Element::Text => each(get::<Vec<Option<String>>>(row, idx)?, Value::String),
        Element::Uuid => each(get::<Vec<Option<Uuid>>>(row, idx)?, text),
    })
}

/// 非有限浮点数没有 JSON 表示，返回 null
fn float(n: f64) -> Value {
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

/// PostgreSQL 的 `\x` 十六进制输出格式
fn hex_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// `inet` / `cidr` 二进制格式：地址族、前缀长度、is_cidr、地址长度、地址字节
///
/// `inet` 的前缀等于地址位数时省略 `/n`，与 PostgreSQL 文本输出一致。
fn inet_text(raw: &[u8], cidr: bool) -> Option<String> {
    let [family, bits, _, len, addr @ ..] = raw else {
        return None;
    };
    if addr.len() != *len as usize {
        return None;
    }
    let (address, max_bits) = match (*family, addr.len()) {
        (2, 4) => (Ipv4Addr::new(addr[0], addr[1], addr[2], addr[3]).to_string(), 32),
        (3, 16) => {
            let octets: [u8; 16] = addr.try_into().ok()?;
            (Ipv6Addr::from(octets).to_string(), 128)
        }
        _ => return None,
    };
    if cidr || *bits != max_bits {
        Some(format!("{}/{}", address, bits))
    } else {
        Some(address)
    }
}

/// ISO 8601 时长，与 `IntervalStyle = iso_8601` 的输出一致
fn interval_iso(interval: &PgInterval) -> String {
    let mut out = String::from("P");
    let (years, months) = (interval.months / 12, interval.months % 12);
    if years != 0 {
        out.push_str(&format!("{}Y", years));
    }
    if months != 0 {
        out.push_str(&format!("{}M", months));
    }
    if interval.days != 0 {
        out.push_str(&format!("{}D", interval.days));
    }

    let micros = interval.microseconds;
    if micros != 0 || out.len() == 1 {
        out.push('T');
        let hours = micros / 3_600_000_000;
        let minutes = micros / 60_000_000 % 60;
        let seconds = micros % 60_000_000;
        if hours != 0 {
            out.push_str(&format!("{}H", hours));
        }
        if minutes != 0 {
            out.push_str(&format!("{}M", minutes));
        }
        if seconds != 0 || (hours == 0 && minutes == 0) {
            out.push_str(&format!("{}S", seconds_text(seconds)));
        }
    }
    out
}

fn seconds_text(micros: i64) -> String {
    let sign = if micros < 0 { "-" } else { "" };
    let abs = micros.unsigned_abs();
    let (whole, frac) = (abs / 1_000_000, abs % 1_000_000);
    if frac == 0 {
        format!("{}{}", sign, whole)
    } else {
        let frac = format!("{:06}", frac);
        format!("{}{}.{}", sign, whole, frac.trim_end_matches('0'))
    }
}
