use serde_json::Value;

const EARTH_RADIUS_METERS: f64 = 6_378_137.0;

pub(crate) fn parse(input: &str) -> Result<Value, String> {
    let value: Value =
        serde_json::from_str(input).map_err(|error| format!("input is not valid JSON: {error}"))?;
    if object_type(&value).is_none() {
        return Err("input is not a GeoJSON object: missing 'type'".to_string());
    }
    Ok(value)
}

pub(crate) fn object_type(value: &Value) -> Option<&str> {
    value.get("type").and_then(Value::as_str)
}

pub(crate) fn features(value: &Value) -> Vec<&Value> {
    match object_type(value) {
        Some("FeatureCollection") => value
            .get("features")
            .and_then(Value::as_array)
            .map(|features| features.iter().collect())
            .unwrap_or_default(),
        Some("Feature") => vec![value],
        _ => Vec::new(),
    }
}

/// Flattens features, feature collections and geometry collections into bare
/// geometries.
pub(crate) fn geometries(value: &Value) -> Vec<&Value> {
    let mut collected = Vec::new();
    collect_geometries(value, &mut collected);
    collected
}

fn collect_geometries<'a>(value: &'a Value, collected: &mut Vec<&'a Value>) {
    match object_type(value) {
        Some("FeatureCollection") => {
            for feature in features(value) {
                collect_geometries(feature, collected);
            }
        }
        Some("Feature") => {
            if let Some(geometry) = value.get("geometry").filter(|g| !g.is_null()) {
                collect_geometries(geometry, collected);
            }
        }
        Some("GeometryCollection") => {
            for geometry in value
                .get("geometries")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                collect_geometries(geometry, collected);
            }
        }
        Some(_) => collected.push(value),
        None => {}
    }
}

pub(crate) fn position_count(coordinates: &Value) -> usize {
    match coordinates.as_array() {
        Some(items) if items.first().is_some_and(Value::is_number) => 1,
        Some(items) => items.iter().map(position_count).sum(),
        None => 0,
    }
}

/// Geodesic area in square metres of a Polygon or MultiPolygon geometry.
pub(crate) fn geometry_area(geometry: &Value) -> Option<f64> {
    let coordinates = geometry.get("coordinates")?.as_array()?;
    match object_type(geometry)? {
        "Polygon" => Some(polygon_area(coordinates)),
        "MultiPolygon" => Some(
            coordinates
                .iter()
                .filter_map(Value::as_array)
                .map(|polygon| polygon_area(polygon))
                .sum(),
        ),
        _ => None,
    }
}

fn polygon_area(rings: &[Value]) -> f64 {
    let mut rings = rings.iter().map(ring_positions);
    let Some(outer) = rings.next() else {
        return 0.0;
    };
    let holes: f64 = rings.map(|ring| ring_area(&ring).abs()).sum();
    ring_area(&outer).abs() - holes
}

fn ring_positions(ring: &Value) -> Vec<(f64, f64)> {
    ring.as_array()
        .into_iter()
        .flatten()
        .filter_map(|position| {
            let position = position.as_array()?;
            Some((position.first()?.as_f64()?, position.get(1)?.as_f64()?))
        })
        .collect()
}

/// Spherical excess approximation over a closed ring of (lon, lat) degrees.
fn ring_area(ring: &[(f64, f64)]) -> f64 {
    let len = ring.len();
    if len <= 2 {
        return 0.0;
    }

    let mut total = 0.0;
    for index in 0..len {
        let (lower, middle, upper) = if index == len - 2 {
            (len - 2, len - 1, 0)
        } else if index == len - 1 {
            (len - 1, 0, 1)
        } else {
            (index, index + 1, index + 2)
        };
        let (lower_lon, _) = ring[lower];
        let (_, middle_lat) = ring[middle];
        let (upper_lon, _) = ring[upper];
        total += (upper_lon.to_radians() - lower_lon.to_radians()) * middle_lat.to_radians().sin();
    }

    total * EARTH_RADIUS_METERS * EARTH_RADIUS_METERS / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: f64) -> Value {
        serde_json::json!({
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [size, 0.0], [size, size], [0.0, size], [0.0, 0.0]]]
        })
    }

    #[test]
    fn one_degree_square_at_equator_is_about_twelve_thousand_square_kilometres() {
        let area = geometry_area(&square(1.0)).unwrap();
        let square_km = area / 1_000_000.0;
        assert!((12_300.0..12_400.0).contains(&square_km), "{square_km}");
    }

    #[test]
    fn holes_are_subtracted_from_the_outer_ring() {
        let geometry = serde_json::json!({
            "type": "Polygon",
            "coordinates": [
                [[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 2.0], [0.0, 0.0]],
                [[0.5, 0.5], [1.5, 0.5], [1.5, 1.5], [0.5, 1.5], [0.5, 0.5]]
            ]
        });
        let with_hole = geometry_area(&geometry).unwrap();
        let outer = geometry_area(&square(2.0)).unwrap();
        assert!(with_hole < outer);
        assert!(with_hole > 0.0);
    }

    #[test]
    fn points_have_no_area() {
        let point = serde_json::json!({"type": "Point", "coordinates": [1.0, 2.0]});
        assert_eq!(geometry_area(&point), None);
        assert_eq!(position_count(&point["coordinates"]), 1);
    }

    #[test]
    fn geometries_are_collected_through_features() {
        let collection = serde_json::json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {}, "geometry": square(1.0)},
                {"type": "Feature", "properties": {}, "geometry": null}
            ]
        });
        assert_eq!(features(&collection).len(), 2);
        assert_eq!(geometries(&collection).len(), 1);
    }
}
