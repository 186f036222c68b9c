use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::formats::CompactReport;
use crate::text::{self, DEFAULT_ICON, EMPTY_DESCRIPTION_HTML, NO_TEXT};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RecordError {
    #[error("record has no position.cartographicDegrees pair")]
    MissingPosition,
    #[error("record coordinates are not finite numbers")]
    InvalidCoordinates,
    #[error("record is not an object of the expected shape: {0}")]
    Malformed(String),
}

/// One entry of the monolithic source / legacy report file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyRecord {
    #[serde(default)]
    pub id: Option<Value>,
    /// Display fields accept any JSON scalar and are read through [`field_text`].
    #[serde(default)]
    pub name: Option<Value>,
    #[serde(default)]
    pub text: Option<Value>,
    #[serde(default)]
    pub icon_url: Option<Value>,
    #[serde(default)]
    pub position: Option<LegacyPosition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyPosition {
    /// `[lon, lat, height?]`; entries may be numbers or numeric strings.
    #[serde(default)]
    pub cartographic_degrees: Vec<Value>,
}

/// Fully normalized report as rendered by the client.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub id: String,
    pub lon: f64,
    pub lat: f64,
    pub name: String,
    pub text: String,
    pub description_html: String,
    pub icon_url: String,
}

impl LegacyRecord {
    pub fn from_value(value: Value) -> Result<Self, RecordError> {
        serde_json::from_value(value).map_err(|err| RecordError::Malformed(err.to_string()))
    }

    /// Finite `(lon, lat)` or the reason the record must be dropped.
    pub fn coordinates(&self) -> Result<(f64, f64), RecordError> {
        let coords = self
            .position
            .as_ref()
            .map(|p| p.cartographic_degrees.as_slice())
            .unwrap_or_default();
        if coords.len() < 2 {
            return Err(RecordError::MissingPosition);
        }
        match (coordinate_value(&coords[0]), coordinate_value(&coords[1])) {
            (Some(lon), Some(lat)) => Ok((lon, lat)),
            _ => Err(RecordError::InvalidCoordinates),
        }
    }

    /// Explicit id, or `weathernews{index}` from the record's source position.
    pub fn resolved_id(&self, index: usize) -> String {
        let explicit = field_text(self.id.as_ref());
        if explicit.is_empty() {
            format!("weathernews{index}")
        } else {
            explicit
        }
    }

    /// Compact form written into tile payloads by the builder.
    pub fn to_compact(&self, index: usize) -> Result<CompactReport, RecordError> {
        let (lon, lat) = self.coordinates()?;
        let html = field_text(self.text.as_ref());
        let plain = text::strip_tags(&html);
        let name = text::long_name(&field_text(self.name.as_ref()), &plain);
        let label = text::label_text(&plain, &name);

        Ok(CompactReport {
            id: self.resolved_id(index),
            label,
            lon: Some(lon),
            lat: Some(lat),
            img: non_empty_or(Some(field_text(self.icon_url.as_ref()).as_str()), DEFAULT_ICON),
            desc: html,
            name,
            text: plain,
        })
    }

    /// Runtime normalization used when the tiled dataset is unavailable.
    pub fn to_report(&self, index: usize) -> Result<Report, RecordError> {
        let (lon, lat) = self.coordinates()?;
        let html = field_text(self.text.as_ref());
        let plain = text::strip_tags(&html);
        let name = first_non_empty(&[field_text(self.name.as_ref()).as_str(), plain.as_str()]);

        Ok(Report {
            id: self.resolved_id(index),
            lon,
            lat,
            name,
            description_html: non_empty_or(Some(html.as_str()), EMPTY_DESCRIPTION_HTML),
            icon_url: non_empty_or(Some(field_text(self.icon_url.as_ref()).as_str()), DEFAULT_ICON),
            text: plain,
        })
    }
}

impl Report {
    pub fn from_compact(item: &CompactReport) -> Result<Self, RecordError> {
        let (Some(lon), Some(lat)) = (item.lon, item.lat) else {
            return Err(RecordError::InvalidCoordinates);
        };
        if !lon.is_finite() || !lat.is_finite() {
            return Err(RecordError::InvalidCoordinates);
        }

        Ok(Self {
            id: item.id.clone(),
            lon,
            lat,
            name: first_non_empty(&[item.name.as_str(), item.text.as_str()]),
            text: item.text.clone(),
            description_html: non_empty_or(Some(&item.desc), EMPTY_DESCRIPTION_HTML),
            icon_url: non_empty_or(Some(&item.img), DEFAULT_ICON),
        })
    }

    /// Text matched by client-side search.
    pub fn search_text(&self) -> String {
        format!("{} {}", self.name, self.text).trim().to_string()
    }

    pub fn label(&self) -> String {
        text::label_text(&self.text, &self.name)
    }
}

/// String form of a loosely typed display field.
///
/// Numbers and `true` are printed; `null`, `false`, `0`, arrays and objects
/// read as empty so the usual fallbacks apply.
pub fn field_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) if n.as_f64() != Some(0.0) => n.to_string(),
        Some(Value::Bool(true)) => "true".to_string(),
        _ => String::new(),
    }
}

fn coordinate_value(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

fn first_non_empty(candidates: &[&str]) -> String {
    candidates
        .iter()
        .find(|c| !c.is_empty())
        .copied()
        .unwrap_or(NO_TEXT)
        .to_string()
}

fn non_empty_or(value: Option<&str>, fallback: &str) -> String {
    match value {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => fallback.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(value: Value) -> LegacyRecord {
        LegacyRecord::from_value(value).expect("record")
    }

    #[test]
    fn accepts_numeric_strings_and_height() {
        let r = record(json!({"position": {"cartographicDegrees": ["141.0", 38.2, 15]}}));
        assert_eq!(r.coordinates(), Ok((141.0, 38.2)));
    }

    #[test]
    fn rejects_missing_and_non_finite_positions() {
        assert_eq!(record(json!({})).coordinates(), Err(RecordError::MissingPosition));
        assert_eq!(
            record(json!({"position": {"cartographicDegrees": [141.0]}})).coordinates(),
            Err(RecordError::MissingPosition)
        );
        assert_eq!(
            record(json!({"position": {"cartographicDegrees": [141.0, "NaN"]}})).coordinates(),
            Err(RecordError::InvalidCoordinates)
        );
        assert_eq!(
            record(json!({"position": {"cartographicDegrees": [141.0, null]}})).coordinates(),
            Err(RecordError::InvalidCoordinates)
        );
        assert_eq!(
            record(json!({"position": {"cartographicDegrees": ["east", 38.0]}})).coordinates(),
            Err(RecordError::InvalidCoordinates)
        );
    }

    #[test]
    fn record_without_a_usable_position_shape_is_malformed() {
        assert!(matches!(
            LegacyRecord::from_value(json!({"position": "35.6,139.8"})),
            Err(RecordError::Malformed(_))
        ));
        assert!(matches!(LegacyRecord::from_value(json!("x")), Err(RecordError::Malformed(_))));
    }

    #[test]
    fn scalar_display_fields_are_coerced_to_text() {
        let r = record(json!({
            "id": "n",
            "name": 311,
            "text": true,
            "iconUrl": null,
            "position": {"cartographicDegrees": [139.8, 35.6]}
        }));
        let compact = r.to_compact(0).unwrap();
        assert_eq!(compact.name, "311");
        assert_eq!(compact.text, "true");
        assert_eq!(compact.img, DEFAULT_ICON);

        let report = r.to_report(0).unwrap();
        assert_eq!(report.name, "311");
        assert_eq!(report.icon_url, DEFAULT_ICON);
    }

    #[test]
    fn falsy_and_structured_fields_read_as_empty() {
        assert_eq!(field_text(None), "");
        assert_eq!(field_text(Some(&json!(0))), "");
        assert_eq!(field_text(Some(&json!(false))), "");
        assert_eq!(field_text(Some(&json!({"en": "x"}))), "");
        assert_eq!(field_text(Some(&json!(2.5))), "2.5");
    }

    #[test]
    fn id_falls_back_to_source_index() {
        assert_eq!(record(json!({"id": "abc"})).resolved_id(3), "abc");
        assert_eq!(record(json!({"id": 42})).resolved_id(3), "42");
        assert_eq!(record(json!({"id": ""})).resolved_id(3), "weathernews3");
        assert_eq!(record(json!({})).resolved_id(7), "weathernews7");
    }

    #[test]
    fn compact_form_derives_name_label_and_icon() {
        let r = record(json!({
            "name": "Bridge...",
            "text": "<p>Bridge out on <b>route 45</b></p>",
            "position": {"cartographicDegrees": [141.3, 38.4]}
        }));
        let compact = r.to_compact(0).unwrap();
        assert_eq!(compact.id, "weathernews0");
        assert_eq!(compact.name, "Bridge out on route 45");
        assert_eq!(compact.text, "Bridge out on route 45");
        assert_eq!(compact.label, "Bridge out on route 45");
        assert_eq!(compact.desc, "<p>Bridge out on <b>route 45</b></p>");
        assert_eq!(compact.img, DEFAULT_ICON);
    }

    #[test]
    fn runtime_report_uses_placeholders() {
        let r = record(json!({"position": {"cartographicDegrees": [141.3, 38.4]}}));
        let report = r.to_report(5).unwrap();
        assert_eq!(report.name, NO_TEXT);
        assert_eq!(report.description_html, EMPTY_DESCRIPTION_HTML);
        assert_eq!(report.icon_url, DEFAULT_ICON);
        assert_eq!(report.search_text(), NO_TEXT);
    }

    #[test]
    fn compact_without_coordinates_is_rejected() {
        let item = CompactReport {
            id: "a".into(),
            name: String::new(),
            text: "water rising".into(),
            label: String::new(),
            desc: String::new(),
            lon: Some(140.0),
            lat: None,
            img: String::new(),
        };
        assert_eq!(Report::from_compact(&item), Err(RecordError::InvalidCoordinates));

        let item = CompactReport { lat: Some(38.0), ..item };
        let report = Report::from_compact(&item).unwrap();
        assert_eq!(report.name, "water rising");
        assert_eq!(report.label(), "water rising");
    }
}
