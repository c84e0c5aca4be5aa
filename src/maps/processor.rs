//! POI statistics, visualisation layers and export

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;

use crate::models::Poi;

const UNKNOWN_TYPE: &str = "未知类型";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoiStatistics {
    pub total_count: usize,
    pub type_distribution: BTreeMap<String, usize>,
    pub geographic_bounds: Option<GeoBounds>,
    /// Number of distinct search tags represented
    pub region_coverage: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatPoint {
    pub lng: f64,
    pub lat: f64,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterPoint {
    pub id: usize,
    pub lng: f64,
    pub lat: f64,
    pub name: String,
    #[serde(rename = "type")]
    pub poi_type: String,
    pub size: u32,
}

pub fn statistics(pois: &[Poi]) -> PoiStatistics {
    let mut type_distribution = BTreeMap::new();
    for poi in pois {
        let key = if poi.poi_type.trim().is_empty() {
            UNKNOWN_TYPE.to_string()
        } else {
            poi.poi_type.clone()
        };
        *type_distribution.entry(key).or_insert(0) += 1;
    }

    let geographic_bounds = pois.iter().fold(None, |acc: Option<GeoBounds>, poi| {
        let (lat, lng) = (poi.location.lat, poi.location.lng);
        Some(match acc {
            None => GeoBounds {
                min_lat: lat,
                max_lat: lat,
                min_lng: lng,
                max_lng: lng,
            },
            Some(b) => GeoBounds {
                min_lat: b.min_lat.min(lat),
                max_lat: b.max_lat.max(lat),
                min_lng: b.min_lng.min(lng),
                max_lng: b.max_lng.max(lng),
            },
        })
    });

    let tags: BTreeSet<&str> = pois
        .iter()
        .map(|p| p.tag.as_str())
        .filter(|t| !t.is_empty())
        .collect();

    PoiStatistics {
        total_count: pois.len(),
        type_distribution,
        geographic_bounds,
        region_coverage: tags.len(),
    }
}

pub fn heatmap(pois: &[Poi]) -> Vec<HeatPoint> {
    pois.iter()
        .map(|p| HeatPoint {
            lng: p.location.lng,
            lat: p.location.lat,
            count: 1,
        })
        .collect()
}

pub fn clusters(pois: &[Poi]) -> Vec<ClusterPoint> {
    pois.iter()
        .enumerate()
        .map(|(id, p)| ClusterPoint {
            id,
            lng: p.location.lng,
            lat: p.location.lat,
            name: p.name.clone(),
            poi_type: p.poi_type.clone(),
            size: 1,
        })
        .collect()
}

/// Write `{dir}/poi_{timestamp}/poi_results.json` and return its path
pub fn export_json(pois: &[Poi], dir: &Path) -> Result<PathBuf> {
    let search_dir = dir.join(format!("poi_{}", Local::now().format("%Y%m%d_%H%M%S")));
    std::fs::create_dir_all(&search_dir)
        .with_context(|| format!("Failed to create export directory {}", search_dir.display()))?;

    let path = search_dir.join("poi_results.json");
    let json = serde_json::to_string_pretty(pois).context("Failed to serialise POI results")?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;

    tracing::info!("Exported {} POIs to {}", pois.len(), path.display());
    Ok(path)
}
