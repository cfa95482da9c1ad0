use geolayer::filter::{ORTHODROMIC_DISTANCE, PLANAR_DISTANCE};
use geolayer::{Coordinate, Envelope, Geometry, SearchFilter, Value, CARTESIAN};
use geolayer_int_test::test_util::{cleanup, create_test_context, grid_points, is_sorted, run_test};

fn distances(flows: &[geolayer::GeoPipeFlow], property: &str) -> Vec<f64> {
    flows
        .iter()
        .map(|f| f.property(property).and_then(|v| v.as_f64()).unwrap())
        .collect()
}

#[test]
fn test_bbox_within_and_window() {
    run_test(
        || create_test_context(),
        |ctx| {
            let layer = ctx.db().registry().create_wkt_layer("shapes", "", "")?;
            layer.add_wkts(&[
                "POINT (1 1)",
                "LINESTRING (1 1, 4 4)",
                "POLYGON ((8 8, 9 8, 9 9, 8 9, 8 8))",
            ])?;

            let window = Envelope::new(0.0, 0.0, 2.0, 2.0);
            assert_eq!(layer.search_within_bbox(window)?.count_matches()?, 1);
            assert_eq!(layer.search_intersect_window(window)?.count_matches()?, 2);

            // closed edges
            let edge = Envelope::new(9.0, 9.0, 10.0, 10.0);
            assert_eq!(layer.search_intersect_window(edge)?.count_matches()?, 1);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_search_within_polygon() {
    run_test(
        || create_test_context(),
        |ctx| {
            let layer = ctx.db().registry().create_point_layer("grid", "")?;
            layer.add_all(&grid_points(10, 1.0))?;

            let triangle = "POLYGON ((0 0, 9 0, 0 9, 0 0))";
            let inside = layer.search_within(triangle)?.to_vec()?;
            assert_eq!(inside.len(), 55);
            for flow in &inside {
                let c = flow.geometry().first_coordinate().unwrap();
                assert!(c.x + c.y <= 9.0);
            }
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_within_distance_sorted_nearest_first() {
    run_test(
        || create_test_context(),
        |ctx| {
            let layer = ctx.db().registry().create_point_layer("grid", "wgs84")?;
            layer.add_all(&grid_points(10, 0.1))?;

            let flows = layer
                .within_distance(Coordinate::new(0.45, 0.45), 30.0)?
                .to_vec()?;
            assert!(!flows.is_empty());
            assert!(flows.len() < 100);
            let found = distances(&flows, ORTHODROMIC_DISTANCE);
            assert!(is_sorted(found.iter().copied(), true));
            assert!(found.iter().all(|d| *d <= 30.0));

            let nearest = layer
                .within_distance(Coordinate::new(0.0, 0.0), 1.0)?
                .first_match()?
                .unwrap();
            assert_eq!(nearest.geometry(), &Geometry::point(0.0, 0.0));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_within_distance_planar_layer() {
    run_test(
        || create_test_context(),
        |ctx| {
            let layer = ctx.db().registry().create(
                "plan",
                "WKTGeometryEncoder",
                "",
                "rtree",
                Some(CARTESIAN),
            )?;
            layer.add_wkts(&["POINT (3 4)", "POINT (30 40)", "LINESTRING (0 2, 10 2)"])?;

            let flows = layer.within_distance(Coordinate::new(0.0, 0.0), 5.0)?.to_vec()?;
            assert_eq!(distances(&flows, PLANAR_DISTANCE), vec![2.0, 5.0]);
            assert!(flows[0].property(ORTHODROMIC_DISTANCE).is_none());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_pipeline_stages() {
    run_test(
        || create_test_context(),
        |ctx| {
            let layer = ctx.db().registry().create_point_layer("grid", "")?;
            layer.add_all(&grid_points(5, 1.0))?;

            let flows = layer
                .search(SearchFilter::MatchAll)?
                .with_envelope_properties()
                .filter(|f| f.geometry().first_coordinate().map_or(false, |c| c.y == 2.0))
                .derive("sum", |f| {
                    let c = f.geometry().first_coordinate().unwrap_or(Coordinate::new(0.0, 0.0));
                    Ok(Value::F64(c.x + c.y))
                })
                .sort_descending("sum")
                .skip(1)
                .limit(2)
                .to_vec()?;

            assert_eq!(flows.len(), 2);
            assert_eq!(flows[0].property("sum"), Some(&Value::F64(5.0)));
            assert_eq!(flows[1].property("sum"), Some(&Value::F64(4.0)));
            assert_eq!(flows[0].property("minX"), Some(&Value::F64(3.0)));
            assert_eq!(flows[0].property("maxY"), Some(&Value::F64(2.0)));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_search_on_empty_layer() {
    run_test(
        || create_test_context(),
        |ctx| {
            let layer = ctx.db().registry().create_wkt_layer("empty", "", "")?;
            assert_eq!(layer.search(SearchFilter::MatchAll)?.count_matches()?, 0);
            assert!(layer
                .within_distance(Coordinate::new(0.0, 0.0), 100.0)?
                .first_match()?
                .is_none());
            assert!(layer.check_integrity()?.is_valid);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
