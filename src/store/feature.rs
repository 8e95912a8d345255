//! Target Records: Who's On First style GeoJSON features.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{PublishError, Result};

/// Placetype used for every Instagram post record.
pub const SFOMUSEUM_PLACETYPE: &str = "instagram";

pub const DEFAULT_REPO: &str = "sfomuseum-data-socialmedia-instagram";

// New records are parented by the SFO Museum building at SFO:
// https://raw.githubusercontent.com/sfomuseum-data/sfomuseum-data-architecture/master/data/115/916/086/9/1159160869.geojson
const PARENT_ID: i64 = 1159160869;
const LATITUDE: f64 = 37.616356;
const LONGITUDE: f64 = -122.386166;

const PROP_ID: &str = "wof:id";
const PROP_POST: &str = "instagram:post";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type", default = "feature_type")]
    pub kind: String,

    #[serde(default)]
    pub properties: Map<String, Value>,

    #[serde(default)]
    pub geometry: Value,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn feature_type() -> String {
    "Feature".to_string()
}

impl Feature {
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }

    /// A fresh record for a post that has never been published: a point at
    /// SFO Museum with a fixed hierarchy and no name, dates or post yet.
    pub fn new_stub(repo: &str) -> Self {
        let hierarchy = json!([{
            "building_id": PARENT_ID,
            "campus_id": 102527513,
            "continent_id": 102191575,
            "country_id": 85633793,
            "county_id": 102087579,
            "locality_id": 85922583,
            "neighbourhood_id": -1,
            "region_id": 85688637
        }]);

        let mut properties = Map::new();
        properties.insert("sfomuseum:placetype".into(), json!(SFOMUSEUM_PLACETYPE));
        properties.insert("src:geom".into(), json!("sfomuseum"));
        properties.insert("wof:country".into(), json!("US"));
        properties.insert("wof:parent_id".into(), json!(PARENT_ID));
        properties.insert("wof:placetype".into(), json!("custom"));
        properties.insert("wof:repo".into(), json!(repo));
        properties.insert("wof:hierarchy".into(), hierarchy);

        Self {
            kind: feature_type(),
            properties,
            geometry: json!({
                "type": "Point",
                "coordinates": [LONGITUDE, LATITUDE]
            }),
            extra: Map::new(),
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.properties.get(PROP_ID).and_then(Value::as_i64)
    }

    pub fn require_id(&self) -> Result<i64> {
        self.id()
            .ok_or_else(|| PublishError::missing("properties.wof:id"))
    }

    pub fn set_id(&mut self, id: i64) {
        self.properties.insert(PROP_ID.into(), json!(id));
    }

    /// The post embedded under `instagram:post`, if any.
    pub fn post(&self) -> Option<&Map<String, Value>> {
        self.properties.get(PROP_POST).and_then(Value::as_object)
    }

    /// The media identity already published with this record.
    pub fn published_media_id(&self) -> Option<&str> {
        self.post()
            .and_then(|p| p.get("media_id"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Set one field of the embedded post. Fails if there is no post.
    pub fn set_post_field(&mut self, key: &str, value: Value) -> Result<()> {
        let post = self
            .properties
            .get_mut(PROP_POST)
            .and_then(Value::as_object_mut)
            .ok_or_else(|| PublishError::missing("properties.instagram:post"))?;
        post.insert(key.to_string(), value);
        Ok(())
    }

    pub fn set_post(&mut self, post: Value) {
        self.properties.insert(PROP_POST.into(), post);
    }

    /// Record the post as a point-in-time event: inception equals cessation.
    pub fn set_dates(&mut self, created: i64, edtf: &str) {
        self.properties.insert("wof:created".into(), json!(created));
        self.properties.insert("edtf:inception".into(), json!(edtf));
        self.properties.insert("edtf:cessation".into(), json!(edtf));
    }

    pub fn set_name(&mut self, name: &str) {
        self.properties.insert("wof:name".into(), json!(name));
    }

    /// Normalize the record prior to writing: stamp `wof:lastmodified` and
    /// bring `wof:belongsto` in line with `wof:hierarchy`.
    pub fn prepare_export(&mut self) {
        self.properties
            .insert("wof:lastmodified".into(), json!(Utc::now().timestamp()));
        self.ensure_belongs_to();
    }

    /// Keep existing `wof:belongsto` entries that still appear in the
    /// hierarchy, then append hierarchy IDs not yet listed. Non-positive IDs
    /// are ignored. Records without a hierarchy keep their list as is.
    pub fn ensure_belongs_to(&mut self) {
        let mut belongs_to: Vec<i64> = self
            .properties
            .get("wof:belongsto")
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_i64).collect())
            .unwrap_or_default();

        if let Some(hierarchy) = self.properties.get("wof:hierarchy").and_then(Value::as_array) {
            let mut ids: Vec<i64> = Vec::new();
            for placetypes in hierarchy.iter().filter_map(Value::as_object) {
                for id in placetypes.values().filter_map(Value::as_i64) {
                    if id > 0 && !ids.contains(&id) {
                        ids.push(id);
                    }
                }
            }

            belongs_to.retain(|id| ids.contains(id));
            for id in ids {
                if !belongs_to.contains(&id) {
                    belongs_to.push(id);
                }
            }
        }

        self.properties
            .insert("wof:belongsto".into(), json!(belongs_to));
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_stub() {
        let stub = Feature::new_stub(DEFAULT_REPO);
        assert_eq!(stub.properties["sfomuseum:placetype"], "instagram");
        assert_eq!(stub.properties["wof:placetype"], "custom");
        assert_eq!(stub.properties["wof:repo"], DEFAULT_REPO);
        assert_eq!(stub.geometry["coordinates"], json!([-122.386166, 37.616356]));
        assert!(stub.id().is_none());
        assert!(stub.properties.get("wof:name").is_none());
        assert!(stub.published_media_id().is_none());
    }

    #[test]
    fn test_belongs_to_follows_hierarchy() {
        let mut stub = Feature::new_stub(DEFAULT_REPO);
        stub.properties
            .insert("wof:belongsto".into(), json!([102527513, 999, 85633793]));
        stub.ensure_belongs_to();

        let ids: Vec<i64> = stub.properties["wof:belongsto"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_i64().unwrap())
            .collect();

        assert_eq!(&ids[..2], &[102527513, 85633793]);
        assert!(!ids.contains(&999));
        assert!(!ids.contains(&-1));
        assert!(ids.contains(&PARENT_ID));
        assert_eq!(ids.len(), 7);
    }

    #[test]
    fn test_round_trip_keeps_unknown_members() {
        let body = br#"{"type": "Feature", "id": 7, "bbox": [1, 2, 1, 2], "properties": {"wof:id": 7}, "geometry": null}"#;
        let feature = Feature::from_slice(body).unwrap();
        assert_eq!(feature.require_id().unwrap(), 7);

        let again = Feature::from_slice(&feature.to_bytes().unwrap()).unwrap();
        assert_eq!(again.extra["bbox"], json!([1, 2, 1, 2]));
    }

    #[test]
    fn test_published_media_id_ignores_empty() {
        let mut feature = Feature::new_stub(DEFAULT_REPO);
        feature.set_post(json!({"media_id": ""}));
        assert!(feature.published_media_id().is_none());
        feature.set_post(json!({"media_id": "abc"}));
        assert_eq!(feature.published_media_id(), Some("abc"));
    }
}
