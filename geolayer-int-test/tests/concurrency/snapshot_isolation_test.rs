use geolayer::{Geometry, SearchFilter};
use geolayer_int_test::test_util::{cleanup, create_test_context, grid_points, run_test};
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_open_search_ignores_later_commits() {
    run_test(
        || create_test_context(),
        |ctx| {
            let layer = ctx.db().registry().create_point_layer("points", "")?;
            layer.add_all(&grid_points(10, 1.0))?;

            let pending = layer.search(SearchFilter::MatchAll)?;

            let writer = {
                let db = ctx.db();
                thread::spawn(move || {
                    let layer = db.layer("points")?;
                    layer.add_all(&grid_points(5, 100.0))
                })
            };
            let added = writer.join().unwrap()?;
            assert_eq!(added.len(), 25);

            assert_eq!(pending.count_matches()?, 100);
            assert_eq!(layer.search(SearchFilter::MatchAll)?.count_matches()?, 125);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_parallel_writers_on_one_layer() {
    run_test(
        || create_test_context(),
        |ctx| {
            ctx.db().registry().create_point_layer("shared", "")?;

            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let db = ctx.db();
                    thread::spawn(move || {
                        let layer = db.layer("shared")?;
                        let mut rng = rand::thread_rng();
                        for _ in 0..50 {
                            let x = rng.gen_range(-180.0..180.0);
                            let y = rng.gen_range(-90.0..90.0);
                            layer.add(&Geometry::point(x, y))?;
                        }
                        Ok::<usize, geolayer::GeoError>(t)
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap()?;
            }

            let layer = ctx.db().layer("shared")?;
            assert_eq!(layer.count()?, 200);
            let report = layer.check_integrity()?;
            assert!(report.is_valid, "{:?}", report.errors);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_writers_on_separate_layers() {
    run_test(
        || create_test_context(),
        |ctx| {
            let registry = ctx.db().registry().clone();
            for name in ["a", "b", "c"] {
                registry.create_point_layer(name, "")?;
            }

            let handles: Vec<_> = ["a", "b", "c"]
                .into_iter()
                .map(|name| {
                    let db = ctx.db();
                    thread::spawn(move || {
                        let layer = db.layer(name)?;
                        for i in 0..30 {
                            layer.add(&Geometry::point(i as f64, 0.0))?;
                        }
                        Ok::<(), geolayer::GeoError>(())
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap()?;
            }

            for name in ["a", "b", "c"] {
                assert_eq!(registry.get(name)?.count()?, 30);
            }
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_reader_observes_progress_monotonically() {
    run_test(
        || create_test_context(),
        |ctx| {
            let layer = ctx.db().registry().create_point_layer("growing", "")?;
            let done = Arc::new(AtomicBool::new(false));
            let regressions = Arc::new(AtomicUsize::new(0));

            let reader = {
                let layer = layer.clone();
                let done = done.clone();
                let regressions = regressions.clone();
                thread::spawn(move || {
                    let mut last = 0;
                    while !done.load(Ordering::SeqCst) {
                        if let Ok(count) = layer.search(SearchFilter::MatchAll).and_then(|p| p.count_matches()) {
                            if count < last || count % 10 != 0 {
                                regressions.fetch_add(1, Ordering::SeqCst);
                            }
                            last = count;
                        }
                        thread::sleep(Duration::from_millis(1));
                    }
                })
            };

            for batch in 0..10 {
                let points: Vec<Geometry> = (0..10)
                    .map(|i| Geometry::point(batch as f64, i as f64))
                    .collect();
                layer.add_all(&points)?;
            }

            awaitility::at_most(Duration::from_secs(10))
                .until(|| layer.count().map_or(false, |c| c == 100));
            done.store(true, Ordering::SeqCst);
            reader.join().unwrap();

            assert_eq!(regressions.load(Ordering::SeqCst), 0);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
