use serde_json::json;

use crate::jobs::geojson;
use crate::jobs::{Job, JobContext, JobResult};

/// Computes the geodesic area of the polygonal geometries in the input.
pub struct PolygonAreaJob;

impl Job for PolygonAreaJob {
    fn execute(&self, context: &JobContext<'_>) -> JobResult<serde_json::Value> {
        let input =
            geojson::parse(&context.task().input).map_err(|reason| context.failure(reason))?;

        let areas: Vec<f64> = geojson::geometries(&input)
            .into_iter()
            .filter_map(geojson::geometry_area)
            .collect();
        if areas.is_empty() {
            return Err(context.failure("input contains no Polygon or MultiPolygon geometry"));
        }

        Ok(json!({
            "area": areas.iter().sum::<f64>(),
            "unit": "square_meters",
            "polygonCount": areas.len(),
        }))
    }
}
