use serde_json::json;

use crate::jobs::geojson;
use crate::jobs::{Job, JobContext, JobResult};

/// Summarises the shape of the task's GeoJSON input.
pub struct AnalysisJob;

impl Job for AnalysisJob {
    fn execute(&self, context: &JobContext<'_>) -> JobResult<serde_json::Value> {
        let input =
            geojson::parse(&context.task().input).map_err(|reason| context.failure(reason))?;
        let geometries = geojson::geometries(&input);
        let coordinate_count: usize = geometries
            .iter()
            .filter_map(|geometry| geometry.get("coordinates"))
            .map(geojson::position_count)
            .sum();

        Ok(json!({
            "geometryType": geojson::object_type(&input),
            "featureCount": geojson::features(&input).len(),
            "geometryCount": geometries.len(),
            "coordinateCount": coordinate_count,
        }))
    }
}
