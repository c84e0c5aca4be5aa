//! Point-of-interest model shared by the map providers

use serde::{Deserialize, Serialize};

/// Longitude/latitude pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lng: f64,
    pub lat: f64,
}

/// A place returned by a map search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    pub name: String,
    #[serde(default)]
    pub address: String,
    /// Provider category, `type` on the wire
    #[serde(rename = "type", default)]
    pub poi_type: String,
    pub location: Location,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    /// The keyword that found this POI
    #[serde(default)]
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_rating: Option<f64>,
    /// `baidu` or `google`
    pub provider: String,
}

/// One page of search results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoiPage {
    pub results: Vec<Poi>,
    pub total: usize,
    pub page_num: u32,
    pub page_size: u32,
    /// Provider continuation token, if more pages exist
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poi_type_serialises_as_type() {
        let poi = Poi {
            name: "张江药谷".into(),
            address: "浦东新区".into(),
            poi_type: "产业园区".into(),
            location: Location { lng: 121.6, lat: 31.2 },
            distance: None,
            tag: "生物医药".into(),
            tel: None,
            detail_url: None,
            price: None,
            overall_rating: Some(4.5),
            provider: "baidu".into(),
        };

        let value = serde_json::to_value(&poi).unwrap();
        assert_eq!(value["type"], "产业园区");
        assert!(value.get("tel").is_none());

        let back: Poi = serde_json::from_value(value).unwrap();
        assert_eq!(back, poi);
    }
}
