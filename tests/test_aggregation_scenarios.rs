use approx::assert_relative_eq;
use chrono::NaiveDate;
use verdine::core::tiling::QuadkeyScheme;
use verdine::io::raster::MemoryRasterSource;
use verdine::io::reports::TraceLog;
use verdine::{AggregationEngine, BoundingBox, MemoryCatalog, SensorConfig, SensorKind};

const NODATA: f64 = -32768.0;

// Root 1024x1024; lod-1 tiles are 512x512, so a gsd of 128 gives 4x4 rasters.
fn scheme() -> QuadkeyScheme {
    QuadkeyScheme::new(BoundingBox::new(0.0, 0.0, 1024.0, 1024.0))
}

fn sensors() -> SensorConfig {
    SensorConfig::new("AVH", "MOD")
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn run(
    catalog: &MemoryCatalog,
    source: MemoryRasterSource,
    rois: &[i64],
    first: NaiveDate,
    last: NaiveDate,
) -> verdine::AggregationOutcome {
    let _ = env_logger::builder().is_test(true).try_init();
    let sensors = sensors();
    let mut trace = TraceLog::new(Vec::new());
    let mut engine = AggregationEngine::new(catalog, &sensors, Box::new(source));
    engine
        .run(rois, first, last, &mut trace)
        .expect("aggregation run failed")
}

#[test]
fn test_single_tile_roi_with_four_samples() {
    let day = date(2017, 6, 15);
    let mut catalog = MemoryCatalog::new(scheme(), 100_000);
    catalog
        .register_raster(
            &sensors(),
            "AVH_2017166_t0.tif",
            "0",
            day,
            1.0,
            0.0,
            128.0,
            7,
        )
        .unwrap();

    // tile "0" spans (0,512)..(512,1024); this parcel covers exactly the
    // 2x2 north-west block of cell centers, kept clear of neighbor cells
    let roi = catalog
        .insert_roi_wkt(1, 7, "POLYGON((4 772,252 772,252 1020,4 1020,4 772))")
        .unwrap();

    // the four covered cells carry 1000/2000/3000/4000; everything else is
    // a decoy value that must not be sampled
    let mut values = vec![9_999; 16];
    values[0] = 1_000;
    values[1] = 2_000;
    values[4] = 3_000;
    values[5] = 4_000;
    let mut source = MemoryRasterSource::new();
    source
        .insert_grid("AVH_2017166_t0.tif", 4, 4, values, NODATA)
        .unwrap();

    let outcome = run(&catalog, source, &[roi], day, day);
    let stats = outcome.stats(roi, SensorKind::Primary, day).unwrap();
    assert_eq!(stats.count, 4);
    assert_relative_eq!(stats.mean, 0.25, epsilon = 1e-12);
    assert_relative_eq!(stats.std_dev, 0.129_099_44, epsilon = 1e-7);
}

#[test]
fn test_multi_tile_roi_combines_buckets_across_tiles() {
    let day = date(2017, 6, 15);
    let mut catalog = MemoryCatalog::new(scheme(), 100_000);
    for (name, key) in [("AVH_2017166_t0.tif", "0"), ("AVH_2017166_t1.tif", "1")] {
        catalog
            .register_raster(&sensors(), name, key, day, 1.0, 0.0, 128.0, 7)
            .unwrap();
    }

    // two parcel parts: three cell centers in tile "0", two in tile "1"
    let roi = catalog
        .insert_roi_wkt(
            2,
            3,
            "MULTIPOLYGON(((4 900,380 900,380 1020,4 1020,4 900)),\
             ((516 900,760 900,760 1020,516 1020,516 900)))",
        )
        .unwrap();

    let mut t0 = vec![9_999; 16];
    t0[0] = 1_000;
    t0[1] = 2_000;
    t0[2] = 3_000;
    let mut t1 = vec![9_999; 16];
    t1[0] = 4_000;
    t1[1] = 5_000;
    let mut source = MemoryRasterSource::new();
    source.insert_grid("AVH_2017166_t0.tif", 4, 4, t0, NODATA).unwrap();
    source.insert_grid("AVH_2017166_t1.tif", 4, 4, t1, NODATA).unwrap();

    let outcome = run(&catalog, source, &[roi], day, day);
    let stats = outcome.stats(roi, SensorKind::Primary, day).unwrap();
    // the bucket finalizes only after both tiles, combining all 5 samples
    assert_eq!(stats.count, 5);
    assert_relative_eq!(stats.mean, 0.3, epsilon = 1e-12);
    assert_relative_eq!(stats.std_dev, 0.158_113_88, epsilon = 1e-7);
}

#[test]
fn test_contained_tile_samples_every_valid_cell() {
    let day = date(2017, 6, 15);
    let mut catalog = MemoryCatalog::new(scheme(), 100_000);
    catalog
        .register_raster(
            &sensors(),
            "AVH_2017166_t3.tif",
            "3",
            day,
            1.0,
            0.0,
            128.0,
            7,
        )
        .unwrap();

    // parcel swallowing tile "3" ((512,0)..(1024,512)) with margin
    let roi = catalog
        .insert_roi_wkt(3, 1, "POLYGON((500 -10,1040 -10,1040 520,500 520,500 -10))")
        .unwrap();

    // three nodata holes; the other 13 cells all carry 2000
    let mut values = vec![2_000; 16];
    values[3] = -32_768;
    values[7] = -32_768;
    values[12] = -32_768;
    let mut source = MemoryRasterSource::new();
    source
        .insert_grid("AVH_2017166_t3.tif", 4, 4, values, NODATA)
        .unwrap();

    let outcome = run(&catalog, source, &[roi], day, day);
    let stats = outcome.stats(roi, SensorKind::Primary, day).unwrap();
    assert_eq!(stats.count, 13);
    assert_relative_eq!(stats.mean, 0.2, epsilon = 1e-12);
    assert_relative_eq!(stats.std_dev, 0.0, epsilon = 1e-12);
}

#[test]
fn test_gain_and_offset_applied_before_requantization() {
    let day = date(2017, 6, 15);
    let mut catalog = MemoryCatalog::new(scheme(), 100_000);
    catalog
        .register_raster(
            &sensors(),
            "MOD_2017166_t0.tif",
            "0",
            day,
            0.5,
            0.1,
            128.0,
            7,
        )
        .unwrap();

    // parcel around the first cell center only
    let roi = catalog
        .insert_roi_wkt(4, 2, "POLYGON((8 904,120 904,120 1016,8 1016,8 904))")
        .unwrap();

    let mut values = vec![9_999; 16];
    values[0] = 5_000;
    let mut source = MemoryRasterSource::new();
    source
        .insert_grid("MOD_2017166_t0.tif", 4, 4, values, NODATA)
        .unwrap();

    let outcome = run(&catalog, source, &[roi], day, day);
    let stats = outcome.stats(roi, SensorKind::Secondary, day).unwrap();
    // 5000/10000 * 0.5 + 0.1 = 0.35
    assert_eq!(stats.count, 1);
    assert_relative_eq!(stats.mean, 0.35, epsilon = 1e-12);
    assert_eq!(stats.std_dev, 0.0);
}

#[test]
fn test_edge_of_swath_duplicates_merge_into_one_bucket() {
    let day = date(2017, 6, 15);
    let mut catalog = MemoryCatalog::new(scheme(), 100_000);
    for name in ["AVH_2017166_a.tif", "AVH_2017166_b.tif"] {
        catalog
            .register_raster(&sensors(), name, "0", day, 1.0, 0.0, 128.0, 7)
            .unwrap();
    }
    let roi = catalog
        .insert_roi_wkt(5, 1, "POLYGON((8 904,120 904,120 1016,8 1016,8 904))")
        .unwrap();

    let mut a = vec![9_999; 16];
    a[0] = 1_000;
    let mut b = vec![9_999; 16];
    b[0] = 3_000;
    let mut source = MemoryRasterSource::new();
    source.insert_grid("AVH_2017166_a.tif", 4, 4, a, NODATA).unwrap();
    source.insert_grid("AVH_2017166_b.tif", 4, 4, b, NODATA).unwrap();

    let outcome = run(&catalog, source, &[roi], day, day);
    let stats = outcome.stats(roi, SensorKind::Primary, day).unwrap();
    // both files of the tile/date pair contribute to the same bucket
    assert_eq!(stats.count, 2);
    assert_relative_eq!(stats.mean, 0.2, epsilon = 1e-12);
}

#[test]
fn test_unmatched_sensor_aborts_the_run() {
    let day = date(2017, 6, 15);
    let registration_sensors = SensorConfig::new("AVH", "MOD");
    let mut catalog = MemoryCatalog::new(scheme(), 100_000);
    catalog
        .register_raster(
            &registration_sensors,
            "AVH_2017166_t0.tif",
            "0",
            day,
            1.0,
            0.0,
            128.0,
            7,
        )
        .unwrap();
    let roi = catalog
        .insert_roi_wkt(6, 1, "POLYGON((8 904,120 904,120 1016,8 1016,8 904))")
        .unwrap();

    let mut source = MemoryRasterSource::new();
    source
        .insert_grid("AVH_2017166_t0.tif", 4, 4, vec![1_000; 16], NODATA)
        .unwrap();

    // the run is configured for different platforms: the filename matches
    // neither identifier and the whole run must fail
    let run_sensors = SensorConfig::new("PROBA", "SPOT");
    let mut trace = TraceLog::new(Vec::new());
    let mut engine = AggregationEngine::new(&catalog, &run_sensors, Box::new(source));
    let err = engine.run(&[roi], day, day, &mut trace).unwrap_err();
    assert!(matches!(err, verdine::NdviError::Configuration(_)));
    assert!(err.chain_string().contains("AVH_2017166_t0.tif"));
}
