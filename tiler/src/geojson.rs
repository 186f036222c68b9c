//! GeoJSON point export of the report collection for external map tools.

use std::{fs, path::Path};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::{LegacyRecord, field_text, text};

use crate::error::BuildError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub struct FeatureCollection {
    pub metadata: ExportMetadata,
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    /// Source file as given to the exporter.
    pub source: String,
    pub generated_at: DateTime<Utc>,
    pub total_features: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub struct Feature {
    pub geometry: Point,
    pub properties: FeatureProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub struct Point {
    /// `[lon, lat]`
    pub coordinates: [f64; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureProperties {
    pub id: String,
    pub label: String,
    pub desc: String,
    pub search_text: String,
}

/// Lowercased plain text of `label` and `desc` used for substring search.
pub fn feature_search_text(label: &str, desc: &str) -> String {
    text::strip_tags(&format!("{label} {desc}"))
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// One point feature per record with finite coordinates, in source order.
pub fn build_features(records: &[Value]) -> Vec<Feature> {
    records
        .iter()
        .enumerate()
        .filter_map(|(index, value)| {
            let record = LegacyRecord::from_value(value.clone()).ok()?;
            let (lon, lat) = record.coordinates().ok()?;
            let label = field_text(record.name.as_ref());
            let mut desc = field_text(record.text.as_ref());
            if desc.is_empty() {
                desc = text::EMPTY_DESCRIPTION_HTML.to_string();
            }
            Some(Feature {
                geometry: Point {
                    coordinates: [lon, lat],
                },
                properties: FeatureProperties {
                    id: record.resolved_id(index),
                    search_text: feature_search_text(&label, &desc),
                    label,
                    desc,
                },
            })
        })
        .collect()
}

pub fn write_geojson(
    records: &[Value],
    source: &str,
    out_path: &Path,
    generated_at: DateTime<Utc>,
) -> Result<FeatureCollection, BuildError> {
    let features = build_features(records);
    let skipped = records.len() - features.len();
    if skipped > 0 {
        tracing::warn!("skipped {skipped} records without usable coordinates");
    }
    let collection = FeatureCollection {
        metadata: ExportMetadata {
            source: source.to_string(),
            generated_at,
            total_features: features.len(),
        },
        features,
    };
    if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(out_path, serde_json::to_vec(&collection)?)?;
    Ok(collection)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn search_text_is_plain_lowercase_and_decoded() {
        assert_eq!(
            feature_search_text("Route 45", "<p>Bridge&nbsp;OUT  &amp; <b>flooded</b></p>"),
            "route 45 bridge out & flooded"
        );
    }

    #[test]
    fn features_keep_source_order_and_skip_unusable_records() {
        let records = vec![
            json!({"id": "a", "name": "Flood", "text": "<p>Water</p>",
                   "position": {"cartographicDegrees": [139.8, 35.6, 10]}}),
            json!({"id": "b", "position": {"cartographicDegrees": [139.8, "NaN"]}}),
            json!({"name": 311, "position": {"cartographicDegrees": ["140.1", "36.2"]}}),
            json!(null),
        ];
        let features = build_features(&records);
        assert_eq!(features.len(), 2);

        assert_eq!(features[0].geometry.coordinates, [139.8, 35.6]);
        assert_eq!(features[0].properties.id, "a");
        assert_eq!(features[0].properties.search_text, "flood water");

        let second = &features[1].properties;
        assert_eq!(second.id, "weathernews2");
        assert_eq!(second.label, "311");
        assert_eq!(second.desc, text::EMPTY_DESCRIPTION_HTML);
    }

    #[test]
    fn writes_feature_collection_document() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("export").join("weathernews.geojson");
        let at = DateTime::from_timestamp(1_300_000_000, 0).unwrap();
        let records = vec![json!({"id": "a", "position": {"cartographicDegrees": [141.0, 38.2]}})];

        write_geojson(&records, "data/czml/weathernews.json", &out, at).unwrap();

        let document: Value = serde_json::from_slice(&fs::read(&out).unwrap()).unwrap();
        assert_eq!(document["type"], "FeatureCollection");
        assert_eq!(document["metadata"]["source"], "data/czml/weathernews.json");
        assert_eq!(document["metadata"]["totalFeatures"], 1);
        assert_eq!(document["features"][0]["type"], "Feature");
        assert_eq!(document["features"][0]["geometry"]["type"], "Point");
        assert_eq!(document["features"][0]["geometry"]["coordinates"], json!([141.0, 38.2]));
        assert_eq!(document["features"][0]["properties"]["searchText"], "no text available.");

        let parsed: FeatureCollection = serde_json::from_value(document).unwrap();
        assert_eq!(parsed.metadata.generated_at, at);
    }
}
