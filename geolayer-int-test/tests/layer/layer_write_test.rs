use geolayer::store::RecordSource;
use geolayer::{Coordinate, ErrorKind, Geometry, RecordId, SearchFilter, Value};
use geolayer_int_test::test_util::{
    cleanup, create_small_node_test_context, create_test_context, grid_points, run_test,
};
use std::collections::BTreeMap;

#[test]
fn test_add_feature_keeps_attributes() {
    run_test(
        || create_test_context(),
        |ctx| {
            let layer = ctx.db().registry().create_point_layer("cities", "wgs84")?;
            let mut attributes = BTreeMap::new();
            attributes.insert("name".to_string(), Value::from("Amsterdam"));
            attributes.insert("population".to_string(), Value::from(921_402i64));
            layer.add_feature(&Geometry::point(4.9, 52.37), &attributes)?;

            let flow = layer.search(SearchFilter::MatchAll)?.first_match()?.unwrap();
            assert_eq!(flow.property("name"), Some(&Value::from("Amsterdam")));
            assert_eq!(flow.record().get("population"), Some(&Value::I64(921_402)));
            assert_eq!(flow.record().get("longitude"), Some(&Value::F64(4.9)));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_point_layer_rejects_lines() {
    run_test(
        || create_test_context(),
        |ctx| {
            let layer = ctx.db().registry().create_point_layer("points", "")?;
            let err = layer.add_wkt("LINESTRING (0 0, 1 1)").err().unwrap();
            assert_eq!(err.kind(), &ErrorKind::EncodingError);
            assert_eq!(layer.count()?, 0);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_invalid_wkt_writes_nothing() {
    run_test(
        || create_test_context(),
        |ctx| {
            let layer = ctx.db().registry().create_wkt_layer("shapes", "", "")?;
            let err = layer
                .add_wkts(&["POINT (1 1)", "POLYGON ((0 0, 1 0"])
                .err()
                .unwrap();
            assert_eq!(err.kind(), &ErrorKind::EncodingError);
            assert_eq!(layer.count()?, 0);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_remove_and_remove_strict() {
    run_test(
        || create_test_context(),
        |ctx| {
            let layer = ctx.db().registry().create_point_layer("points", "")?;
            let a = layer.add(&Geometry::point(1.0, 1.0))?;
            let b = layer.add(&Geometry::point(2.0, 2.0))?;

            assert!(layer.remove(a.id())?);
            assert!(!layer.remove(a.id())?);
            assert_eq!(layer.count()?, 1);
            assert!(ctx.db().store().snapshot()?.record(a.id()).is_none());

            let err = layer.remove_strict(RecordId::new(999_999)).err().unwrap();
            assert_eq!(err.kind(), &ErrorKind::NotFound);

            layer.remove_strict(b.id())?;
            assert_eq!(layer.search(SearchFilter::MatchAll)?.count_matches()?, 0);
            assert!(layer.check_integrity()?.is_valid);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_removal_condenses_deep_tree() {
    run_test(
        || create_small_node_test_context(),
        |ctx| {
            let layer = ctx.db().registry().create_point_layer("grid", "")?;
            let records = layer.add_all(&grid_points(20, 1.0))?;
            assert!(layer.stats()?.tree_height > 2);

            for record in records.iter().step_by(3) {
                assert!(layer.remove(record.id())?);
            }
            let remaining = records.len() - records.iter().step_by(3).count();
            assert_eq!(layer.count()?, remaining as u64);

            let report = layer.check_integrity()?;
            assert!(report.is_valid, "{:?}", report.errors);
            assert_eq!(
                layer.search(SearchFilter::MatchAll)?.count_matches()?,
                remaining
            );
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_graph_layer_remove_releases_vertices() {
    run_test(
        || create_test_context(),
        |ctx| {
            let layer = ctx.db().registry().create_of_type("routes", "SimpleGraph", "")?;
            let before = ctx.db().store().snapshot()?.record_count();
            let record = layer.add_wkt("LINESTRING (0 0, 1 1, 2 0, 3 1)")?;
            assert!(ctx.db().store().snapshot()?.record_count() > before + 1);

            let flow = layer.search(SearchFilter::MatchAll)?.first_match()?.unwrap();
            assert_eq!(
                flow.geometry(),
                &Geometry::line_string(vec![
                    Coordinate::new(0.0, 0.0),
                    Coordinate::new(1.0, 1.0),
                    Coordinate::new(2.0, 0.0),
                    Coordinate::new(3.0, 1.0),
                ])
            );

            assert!(layer.remove(record.id())?);
            assert_eq!(ctx.db().store().snapshot()?.record_count(), before);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_index_existing_records() {
    run_test(
        || create_test_context(),
        |ctx| {
            let db = ctx.db();
            let layer = db.registry().create_point_layer("manual", "")?;

            let mut tx = db.store().begin()?;
            let mut ids = Vec::new();
            for i in 0..5 {
                let mut record = tx.create_record();
                record.put("longitude", i as f64);
                record.put("latitude", 0.0);
                ids.push(record.id());
                tx.put_record(record)?;
            }
            tx.commit()?;
            assert_eq!(layer.count()?, 0);

            let envelope = layer.index_existing(ids[0])?;
            assert_eq!(envelope.min_x, 0.0);
            assert_eq!(layer.index_existing_all(&ids[1..])?, 4);
            assert_eq!(layer.count()?, 5);

            let err = layer.index_existing(RecordId::new(424_242)).err().unwrap();
            assert_eq!(err.kind(), &ErrorKind::NotFound);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_index_existing_rejects_undecodable_record() {
    run_test(
        || create_test_context(),
        |ctx| {
            let db = ctx.db();
            let layer = db.registry().create_point_layer("manual", "")?;
            let mut tx = db.store().begin()?;
            let mut record = tx.create_record();
            record.put("longitude", 1.0);
            let id = record.id();
            tx.put_record(record)?;
            tx.commit()?;

            let err = layer.index_existing(id).err().unwrap();
            assert_eq!(err.kind(), &ErrorKind::IndexError);
            assert_eq!(layer.count()?, 0);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
