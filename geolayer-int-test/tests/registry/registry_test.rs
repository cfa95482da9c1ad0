use geolayer::{layer_types, ErrorKind, Geometry, SearchFilter, WGS84};
use geolayer_int_test::test_util::{cleanup, create_test_context, run_test};

#[test]
fn test_create_every_layer_type() {
    run_test(
        || create_test_context(),
        |ctx| {
            let registry = ctx.db().registry().clone();
            for (name, layer_type) in layer_types() {
                let layer = registry.create_of_type(&name.to_lowercase(), name, "")?;
                assert_eq!(layer.encoder_kind(), layer_type.encoder_kind);
                layer.add(&Geometry::point(3.0, 4.0))?;
                let flow = layer.search(SearchFilter::MatchAll)?.first_match()?.unwrap();
                assert_eq!(flow.geometry(), &Geometry::point(3.0, 4.0));
            }
            assert_eq!(registry.names()?.len(), layer_types().len());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_unknown_kinds_write_nothing() {
    run_test(
        || create_test_context(),
        |ctx| {
            let registry = ctx.db().registry().clone();

            let err = registry.create_of_type("x", "Hexagonal", "").err().unwrap();
            assert_eq!(err.kind(), &ErrorKind::ConfigurationError);

            let err = registry.create("x", "MysteryEncoder", "", "rtree", None).err().unwrap();
            assert_eq!(err.message(), "Unknown encoder kind: MysteryEncoder");

            let err = registry.create("x", "wkt", "", "quadtree", None).err().unwrap();
            assert_eq!(err.kind(), &ErrorKind::ConfigurationError);

            let err = registry.create_point_layer("x", "mars2000").err().unwrap();
            assert_eq!(err.kind(), &ErrorKind::UnsupportedCrs);

            let err = registry.create("", "wkt", "", "rtree", None).err().unwrap();
            assert_eq!(err.kind(), &ErrorKind::ConfigurationError);

            assert!(!registry.exists("x")?);
            assert!(registry.names()?.is_empty());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_layer_signatures() {
    run_test(
        || create_test_context(),
        |ctx| {
            let registry = ctx.db().registry().clone();
            registry.create_point_layer_xy("stations", "lon", "lat", "")?;
            registry.create_wkt_layer("roads", "", "")?;

            let layers = registry.layers()?;
            assert_eq!(
                layers.keys().cloned().collect::<Vec<_>>(),
                vec!["roads".to_string(), "stations".to_string()]
            );
            assert_eq!(
                layers["stations"],
                "EditableLayer(name='stations', encoder=SimplePointEncoder(x='lon', y='lat'), crs=WGS-84)"
            );
            assert_eq!(
                layers["roads"],
                "EditableLayer(name='roads', encoder=WKTGeometryEncoder(field='geometry'), crs=unset)"
            );
            assert_eq!(registry.get("stations")?.crs(), Some(WGS84));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_delete_layer() {
    run_test(
        || create_test_context(),
        |ctx| {
            let registry = ctx.db().registry().clone();
            let layer = registry.create_of_type("routes", "SimpleGraph", "")?;
            layer.add_wkts(&["LINESTRING (0 0, 1 1)", "POINT (5 5)"])?;
            let before = ctx.db().store().snapshot()?.record_count();
            assert!(before > 2);

            assert_eq!(registry.delete("routes")?, 2);
            assert!(!registry.exists("routes")?);
            assert_eq!(ctx.db().store().snapshot()?.record_count(), 0);

            let err = registry.get("routes").err().unwrap();
            assert_eq!(err.kind(), &ErrorKind::NotFound);
            assert_eq!(err.message(), "No such layer 'routes'");
            assert_eq!(layer.count().err().unwrap().kind(), &ErrorKind::NotFound);

            // the name is free again
            registry.create_wkt_layer("routes", "", "")?;
            assert_eq!(registry.get("routes")?.count()?, 0);

            // the old handle stays detached from its successor
            let err = layer.add_wkt("POINT (1 1)").err().unwrap();
            assert_eq!(err.kind(), &ErrorKind::NotFound);
            assert_eq!(registry.get("routes")?.count()?, 0);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_attribute_names() {
    run_test(
        || create_test_context(),
        |ctx| {
            let registry = ctx.db().registry().clone();
            let layer = registry.create_with_attributes(
                "parcels",
                "WKBGeometryEncoder",
                "",
                "rtree",
                None,
                vec!["owner".to_string()],
            )?;
            assert_eq!(layer.attribute_names()?, vec!["owner".to_string()]);

            layer.set_attribute_names(vec!["owner".to_string(), "area".to_string()])?;
            assert_eq!(registry.get("parcels")?.attribute_names()?.len(), 2);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
