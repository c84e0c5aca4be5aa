//! POI files uploaded by users
//!
//! Accepts JSON (an array, or an object with `results` / `poi_list`) and CSV
//! with a header row. Column names vary between sources, so each field is read
//! from the first populated alias. Coordinates are taken to be WGS-84 and are
//! shifted to GCJ-02 like Google results.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use serde_json::{Map, Value};

use super::coords::wgs84_to_gcj02;
use crate::models::{Location, Poi};

const NAME_FIELDS: &[&str] = &["name", "机构名称", "title", "名称", "机构名"];
const ADDRESS_FIELDS: &[&str] = &["address", "地址", "location", "full_address", "location_info"];
const TYPE_FIELDS: &[&str] = &["type", "类型", "category", "org_type", "机构类型"];
const LNG_FIELDS: &[&str] = &["lng", "longitude", "经度", "lng_value", "x"];
const LAT_FIELDS: &[&str] = &["lat", "latitude", "纬度", "lat_value", "y"];

const MAX_INVALID_EXAMPLES: usize = 5;
pub const UPLOAD_PROVIDER: &str = "upload";

#[derive(Debug, thiserror::Error)]
pub enum PoiFileError {
    #[error("不支持的文件格式: {0}")]
    UnsupportedFormat(String),

    #[error("文件解析失败: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InvalidBreakdown {
    pub missing_or_unparsed: usize,
    pub out_of_range: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvalidExample {
    pub name: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParseSummary {
    pub processed: usize,
    pub valid: usize,
    pub invalid: usize,
    pub invalid_breakdown: InvalidBreakdown,
    pub invalid_examples: Vec<InvalidExample>,
}

/// One row after field aliasing, before coordinate validation
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPoi {
    pub name: String,
    pub address: String,
    pub poi_type: String,
    pub tag: String,
    pub tel: Option<String>,
    pub rating: Option<f64>,
    pub distance: Option<f64>,
    /// GCJ-02 `(lng, lat)` when both coordinates were found
    pub location: Option<(f64, f64)>,
}

/// Rows of an uploaded file as JSON objects
pub fn parse_records(filename: &str, data: &[u8]) -> Result<Vec<Map<String, Value>>, PoiFileError> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "json" => parse_json(data),
        "csv" => parse_csv(data),
        other => Err(PoiFileError::UnsupportedFormat(format!(".{}", other))),
    }
}

fn parse_json(data: &[u8]) -> Result<Vec<Map<String, Value>>, PoiFileError> {
    let value: Value = serde_json::from_slice(data).map_err(|e| PoiFileError::Parse(e.to_string()))?;
    let rows = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match ["results", "poi_list"]
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            }) {
            Some(items) => items,
            None => vec![Value::Object(map)],
        },
        _ => return Err(PoiFileError::Parse("JSON 顶层必须是数组或对象".to_string())),
    };
    Ok(rows
        .into_iter()
        .filter_map(|row| match row {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect())
}

fn parse_csv(data: &[u8]) -> Result<Vec<Map<String, Value>>, PoiFileError> {
    let text = std::str::from_utf8(data).map_err(|_| PoiFileError::Parse("CSV 文件不是 UTF-8 编码".to_string()))?;
    let text = text.trim_start_matches('\u{feff}');

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| PoiFileError::Parse(format!("无法读取表头: {}", e)))?
        .clone();

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| PoiFileError::Parse(format!("第 {} 行: {}", index + 1, e)))?;
        let row: Map<String, Value> = headers
            .iter()
            .zip(record.iter())
            .map(|(header, value)| (header.to_string(), Value::String(value.to_string())))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

/// Scalar value as text, skipping blanks
fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite())
}

fn first_text(raw: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|f| raw.get(*f).and_then(text))
}

fn first_number(raw: &Map<String, Value>, fields: &[&str]) -> Option<f64> {
    fields.iter().find_map(|f| raw.get(*f).and_then(number))
}

fn pair(items: &[Value]) -> Option<(f64, f64)> {
    match items {
        [a, b, ..] => Some((number(a)?, number(b)?)),
        _ => None,
    }
}

/// Coordinates nested under `location`: an object, a `[lng, lat]` array or
/// an `"a,b"` string in either order
fn nested_location(location: &Value) -> (Option<f64>, Option<f64>) {
    match location {
        Value::Object(loc) => {
            let mut lng = first_number(loc, &["lng", "longitude"]);
            let mut lat = first_number(loc, &["lat", "latitude"]);
            let arrays = [
                loc.get("coordinates"),
                loc.get("geometry").and_then(|g| g.get("coordinates")),
            ];
            for coords in arrays.into_iter().flatten() {
                if let Some((a, b)) = coords.as_array().and_then(|items| pair(items)) {
                    lng = lng.or(Some(a));
                    lat = lat.or(Some(b));
                }
            }
            (lng, lat)
        }
        Value::String(s) => {
            let parts: Vec<Value> = s
                .replace(['\u{a0}', '\t'], " ")
                .split(',')
                .map(|p| Value::String(p.trim().to_string()))
                .collect();
            match pair(&parts) {
                Some((a, b)) if (-180.0..=180.0).contains(&a) && (-90.0..=90.0).contains(&b) => (Some(a), Some(b)),
                Some((a, b)) if (-90.0..=90.0).contains(&a) && (-180.0..=180.0).contains(&b) => (Some(b), Some(a)),
                _ => (None, None),
            }
        }
        Value::Array(items) => pair(items).map_or((None, None), |(a, b)| (Some(a), Some(b))),
        _ => (None, None),
    }
}

pub fn normalize(raw: &Map<String, Value>) -> NormalizedPoi {
    let name = first_text(raw, NAME_FIELDS).unwrap_or_else(|| "未知机构".to_string());
    let address = first_text(raw, ADDRESS_FIELDS).unwrap_or_else(|| "地址未知".to_string());
    let poi_type = first_text(raw, TYPE_FIELDS).unwrap_or_else(|| "其他".to_string());

    let mut lng = first_number(raw, LNG_FIELDS);
    let mut lat = first_number(raw, LAT_FIELDS);
    if lng.is_none() || lat.is_none() {
        if let Some(location) = raw.get("location") {
            let (nested_lng, nested_lat) = nested_location(location);
            lng = lng.or(nested_lng);
            lat = lat.or(nested_lat);
        }
    }
    let location = match (lng, lat) {
        (Some(lng), Some(lat)) => Some(wgs84_to_gcj02(lng, lat)),
        _ => None,
    };

    NormalizedPoi {
        tag: first_text(raw, &["tag"]).unwrap_or_else(|| poi_type.clone()),
        tel: first_text(raw, &["tel", "电话"]),
        rating: first_number(raw, &["rating", "评分"]),
        distance: first_number(raw, &["distance"]),
        name,
        address,
        poi_type,
        location,
    }
}

/// Keep rows with usable coordinates and account for the rest
pub fn validate(records: &[Map<String, Value>]) -> (Vec<Poi>, ParseSummary) {
    let mut summary = ParseSummary {
        processed: records.len(),
        ..ParseSummary::default()
    };
    let mut pois = Vec::new();

    for poi in records.iter().map(normalize) {
        let example = match poi.location {
            Some((lng, lat)) if (-180.0..=180.0).contains(&lng) && (-90.0..=90.0).contains(&lat) => {
                pois.push(Poi {
                    name: poi.name,
                    address: poi.address,
                    poi_type: poi.poi_type,
                    location: Location { lng, lat },
                    distance: poi.distance,
                    tag: poi.tag,
                    tel: poi.tel,
                    detail_url: None,
                    price: None,
                    overall_rating: poi.rating,
                    provider: UPLOAD_PROVIDER.to_string(),
                });
                continue;
            }
            Some((lng, lat)) => {
                summary.invalid_breakdown.out_of_range += 1;
                InvalidExample {
                    name: poi.name,
                    reason: "坐标超出范围".to_string(),
                    lng: Some(lng),
                    lat: Some(lat),
                }
            }
            None => {
                summary.invalid_breakdown.missing_or_unparsed += 1;
                InvalidExample {
                    name: poi.name,
                    reason: "缺少或无法解析坐标".to_string(),
                    lng: None,
                    lat: None,
                }
            }
        };
        summary.invalid += 1;
        if summary.invalid_examples.len() < MAX_INVALID_EXAMPLES {
            summary.invalid_examples.push(example);
        }
    }

    summary.valid = pois.len();
    (pois, summary)
}

/// `poi_upload_{timestamp}`
pub fn upload_id() -> String {
    format!("poi_upload_{}", Local::now().format("%Y%m%d_%H%M%S"))
}

/// Write `{dir}/{upload_id}/{upload_id}.json` and return its path
pub fn export_upload(pois: &[Poi], dir: &Path, upload_id: &str) -> Result<PathBuf> {
    let upload_dir = dir.join(upload_id);
    std::fs::create_dir_all(&upload_dir)
        .with_context(|| format!("Failed to create export directory {}", upload_dir.display()))?;

    let path = upload_dir.join(format!("{}.json", upload_id));
    let json = serde_json::to_string_pretty(pois).context("Failed to serialise uploaded POIs")?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;

    tracing::info!("Exported {} uploaded POIs to {}", pois.len(), path.display());
    Ok(path)
}
