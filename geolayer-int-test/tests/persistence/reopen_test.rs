use geolayer::{Coordinate, ErrorKind, Geometry, SearchFilter, SpatialDatabase};
use geolayer_int_test::test_util::{cleanup, grid_points, open_file_database, random_path, run_test, TestContext};
use std::fs;

fn create_file_context() -> geolayer::GeoResult<TestContext> {
    let path = random_path();
    let db = open_file_database(&path)?;
    Ok(TestContext::new(path, db))
}

#[test]
fn test_layers_survive_reopen() {
    run_test(
        || create_file_context(),
        |ctx| {
            let db = ctx.db();
            let points = db.registry().create_point_layer("points", "wgs84")?;
            points.add_all(&grid_points(20, 0.05))?;
            let routes = db.registry().create_of_type("routes", "SimpleGraph", "")?;
            routes.add_wkt("LINESTRING (0 0, 0.5 0.5, 1 0)")?;
            db.close()?;

            let reopened = open_file_database(ctx.path())?;
            assert_eq!(reopened.registry().names()?, vec!["points", "routes"]);

            let points = reopened.layer("points")?;
            assert_eq!(points.count()?, 400);
            assert!(points.check_integrity()?.is_valid);
            let near = points
                .within_distance(Coordinate::new(0.0, 0.0), 1.0)?
                .first_match()?
                .unwrap();
            assert_eq!(near.geometry(), &Geometry::point(0.0, 0.0));

            let routes = reopened.layer("routes")?;
            let hit = routes
                .search_intersects("LINESTRING (0.5 0, 0.5 1)")?
                .first_match()?
                .unwrap();
            assert_eq!(hit.geometry().coordinates().len(), 3);

            // new ids never collide with persisted ones
            let added = points.add(&Geometry::point(9.0, 9.0))?;
            assert_eq!(points.search(SearchFilter::MatchAll)?.count_matches()?, 401);
            assert!(points.remove(added.id())?);
            reopened.close()?;
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_closed_database_rejects_work() {
    run_test(
        || create_file_context(),
        |ctx| {
            let db = ctx.db();
            let layer = db.registry().create_wkt_layer("shapes", "", "")?;
            db.close()?;
            assert!(db.is_closed());

            let err = layer.add_wkt("POINT (1 1)").err().unwrap();
            assert_eq!(err.kind(), &ErrorKind::StoreClosed);
            let err = layer.search(SearchFilter::MatchAll).err().unwrap();
            assert_eq!(err.kind(), &ErrorKind::StoreClosed);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_corrupted_file_is_rejected() {
    run_test(
        || create_file_context(),
        |ctx| {
            let db = ctx.db();
            db.registry().create_wkt_layer("shapes", "", "")?.add_wkt("POINT (1 1)")?;
            db.close()?;

            let file = ctx.store_file();
            let mut bytes = fs::read(&file)?;
            let last = bytes.len() - 1;
            bytes[last] ^= 0xFF;
            fs::write(&file, bytes)?;

            let err = SpatialDatabase::builder()
                .file_path(&file)
                .open_or_create()
                .err()
                .unwrap();
            assert_eq!(err.kind(), &ErrorKind::FileCorrupted);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
