use geolayer::{ErrorKind, GeoError, GeoResult, Geometry, SpatialDatabase};
use std::backtrace::Backtrace;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use std::{env, fs, thread};

/// Runs a test with retry logic and error handling.
/// Tests run on the current thread to avoid thread exhaustion when running many tests in parallel.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> GeoResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    B: Fn() -> GeoResult<TestContext> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    A: Fn(TestContext) -> GeoResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
{
    const MAX_RETRIES: u32 = 3;
    let mut last_error: Option<String> = None;
    let mut last_backtrace: Option<String> = None;

    for attempt in 1..=MAX_RETRIES {
        let start_time = Instant::now();

        let result = std::panic::catch_unwind(|| {
            let backtrace = Backtrace::capture();
            match before() {
                Ok(ctx) => match test(ctx.clone()) {
                    Ok(_) => match after(ctx.clone()) {
                        Ok(_) => Ok(()),
                        Err(e) => Err((format!("After run failed: {:?}", e), backtrace.to_string())),
                    },
                    Err(e) => {
                        let _ = after(ctx.clone());
                        Err((format!("Test failed: {:?}", e), backtrace.to_string()))
                    }
                },
                Err(e) => Err((format!("Before run failed: {:?}", e), backtrace.to_string())),
            }
        });

        let elapsed = start_time.elapsed();

        match result {
            Ok(Ok(_)) => return,
            Ok(Err((e, bt))) => {
                if attempt < MAX_RETRIES {
                    eprintln!(
                        "\n========== Test Attempt {}/{} Failed (took {:?}) ==========",
                        attempt, MAX_RETRIES, elapsed
                    );
                    eprintln!("Error: {}", e);
                    eprintln!("Retrying in {}ms...\n", 100 * attempt);
                    thread::sleep(Duration::from_millis(100 * attempt as u64));
                }
                last_error = Some(e);
                last_backtrace = Some(bt);
            }
            Err(panic_err) => {
                let err_msg = if let Some(s) = panic_err.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_err.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                let message = format!("Panic: {}", err_msg);

                if attempt < MAX_RETRIES {
                    eprintln!(
                        "\n========== Test Attempt {}/{} Panicked (took {:?}) ==========",
                        attempt, MAX_RETRIES, elapsed
                    );
                    eprintln!("{}", message);
                    eprintln!("Retrying in {}ms...\n", 100 * attempt);
                    thread::sleep(Duration::from_millis(100 * attempt as u64));
                }
                last_error = Some(message);
                last_backtrace = Some(Backtrace::capture().to_string());
            }
        }
    }

    eprintln!("\n==================== TEST FAILED ====================");
    eprintln!("Failed after {} attempts", MAX_RETRIES);
    eprintln!("Last error: {}", last_error.as_deref().unwrap_or("Unknown"));
    if let Some(bt) = &last_backtrace {
        if !bt.is_empty() && !bt.contains("disabled") {
            eprintln!("\nBacktrace:\n{}", bt);
        }
    }
    eprintln!("=====================================================\n");

    panic!(
        "Test failed after {} attempts. Last error: {}",
        MAX_RETRIES,
        last_error.unwrap_or_default()
    );
}

#[derive(Clone)]
pub struct TestContext {
    path: String,
    db: SpatialDatabase,
}

impl TestContext {
    pub fn new(path: String, db: SpatialDatabase) -> Self {
        Self { path, db }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Location of the store file inside the context directory.
    pub fn store_file(&self) -> PathBuf {
        store_file(&self.path)
    }

    pub fn db(&self) -> SpatialDatabase {
        self.db.clone()
    }
}

pub fn random_path() -> String {
    let id = uuid::Uuid::new_v4();
    env::temp_dir().join(id.to_string()).to_string_lossy().to_string()
}

fn store_file(dir: &str) -> PathBuf {
    PathBuf::from(dir).join("layers.db")
}

/// Opens a database whose store file lives in `path`, creating the directory.
pub fn open_file_database(path: &str) -> GeoResult<SpatialDatabase> {
    fs::create_dir_all(path)?;
    SpatialDatabase::builder()
        .file_path(store_file(path))
        .open_or_create()
}

#[cfg(not(feature = "memory"))]
pub fn create_test_context() -> GeoResult<TestContext> {
    const MAX_ATTEMPTS: u32 = 3;
    let mut last_error: Option<GeoError> = None;

    for attempt in 1..=MAX_ATTEMPTS {
        let path = random_path();
        match open_file_database(&path) {
            Ok(db) => return Ok(TestContext::new(path, db)),
            Err(e) => {
                let _ = fs::remove_dir_all(&path);
                if attempt < MAX_ATTEMPTS {
                    eprintln!(
                        "Warning: Failed to create test context (attempt {}/{}): {:?}",
                        attempt, MAX_ATTEMPTS, e
                    );
                    thread::sleep(Duration::from_millis(50 * attempt as u64));
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        GeoError::new("Failed to create test context", ErrorKind::InternalError)
    }))
}

#[cfg(feature = "memory")]
pub fn create_test_context() -> GeoResult<TestContext> {
    create_memory_test_context()
}

/// A context whose database never touches the file system.
pub fn create_memory_test_context() -> GeoResult<TestContext> {
    let db = SpatialDatabase::builder().in_memory().open_or_create()?;
    Ok(TestContext::new(random_path(), db))
}

/// A context with small index nodes so that modest data sets build deep trees.
pub fn create_small_node_test_context() -> GeoResult<TestContext> {
    let db = SpatialDatabase::builder()
        .in_memory()
        .max_entries(4)
        .min_entries(2)
        .bulk_batch_size(50)
        .open_or_create()?;
    Ok(TestContext::new(random_path(), db))
}

pub fn cleanup(ctx: TestContext) -> GeoResult<()> {
    if !ctx.db().is_closed() {
        if let Err(e) = ctx.db().close() {
            eprintln!("Warning: Failed to close database: {:?}", e);
        }
    }

    let path = ctx.path().to_string();
    let max_retries = 5;
    for retry in 0..max_retries {
        if !std::path::Path::new(&path).exists() {
            return Ok(());
        }
        match fs::remove_dir_all(&path) {
            Ok(_) => return Ok(()),
            Err(e) if retry < max_retries - 1 => {
                eprintln!(
                    "Warning: Failed to remove {} (attempt {}/{}): {}",
                    path,
                    retry + 1,
                    max_retries,
                    e
                );
                thread::sleep(Duration::from_millis(50 * (retry + 1) as u64));
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// A `side` x `side` grid of points spaced `step` apart, starting at the origin.
pub fn grid_points(side: usize, step: f64) -> Vec<Geometry> {
    (0..side * side)
        .map(|i| Geometry::point((i % side) as f64 * step, (i / side) as f64 * step))
        .collect()
}

pub fn is_sorted<T: PartialOrd>(iterable: impl IntoIterator<Item = T>, ascending: bool) -> bool {
    let items: Vec<T> = iterable.into_iter().collect();
    items.windows(2).all(|w| {
        if ascending {
            w[0] <= w[1]
        } else {
            w[0] >= w[1]
        }
    })
}
