use geolayer::filter::ORTHODROMIC_DISTANCE;
use geolayer::{Coordinate, ErrorKind, Geometry, SearchFilter};
use geolayer_int_test::test_util::{cleanup, create_test_context, grid_points, run_test};

#[test]
fn test_point_layer_within_distance() {
    run_test(
        || create_test_context(),
        |ctx| {
            let layer = ctx.db().registry().create_point_layer("points", "")?;
            layer.add(&Geometry::point(1.0, 1.0))?;

            let flows = layer.within_distance(Coordinate::new(1.0, 1.0), 0.5)?.to_vec()?;
            assert_eq!(flows.len(), 1);
            assert_eq!(flows[0].geometry(), &Geometry::point(1.0, 1.0));
            let distance = flows[0]
                .property(ORTHODROMIC_DISTANCE)
                .and_then(|v| v.as_f64())
                .unwrap();
            assert!(distance.abs() < 1e-9);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_wkt_layer_intersects_polygon() {
    run_test(
        || create_test_context(),
        |ctx| {
            let layer = ctx.db().registry().create_wkt_layer("lines", "", "")?;
            let record = layer.add_wkt("LINESTRING (0 0, 1 1)")?;

            let hits = layer
                .search_intersects("POLYGON ((0 0, 1 0, 1 1, 0 1, 0 0))")?
                .to_records()?;
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].id(), record.id());

            let misses = layer
                .search_intersects("POLYGON ((5 5, 6 5, 6 6, 5 6, 5 5))")?
                .count_matches()?;
            assert_eq!(misses, 0);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_duplicate_layer_rejected() {
    run_test(
        || create_test_context(),
        |ctx| {
            let registry = ctx.db().registry().clone();
            let roads = registry.create_wkt_layer("roads", "", "")?;

            let err = registry.create_point_layer("roads", "").err().unwrap();
            assert_eq!(err.kind(), &ErrorKind::ConfigurationError);
            assert_eq!(err.message(), "Cannot create existing layer: roads");

            roads.add_wkt("LINESTRING (0 0, 2 2)")?;
            let reloaded = registry.get("roads")?;
            assert_eq!(reloaded.encoder_kind(), "WKTGeometryEncoder");
            assert_eq!(reloaded.count()?, 1);
            assert_eq!(registry.names()?, vec!["roads".to_string()]);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_bulk_load_ten_thousand_points() {
    run_test(
        || create_test_context(),
        |ctx| {
            let layer = ctx.db().registry().create_point_layer("bulk", "")?;
            let records = layer.add_all(&grid_points(100, 0.01))?;
            assert_eq!(records.len(), 10_000);

            assert_eq!(layer.search(SearchFilter::MatchAll)?.count_matches()?, 10_000);
            assert_eq!(layer.count()?, 10_000);

            let report = layer.check_integrity()?;
            assert!(report.is_valid, "{:?}", report.errors);
            assert!(report.orphaned_pages.is_empty());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
