use approx::assert_abs_diff_eq;
use polars::prelude::*;

use crop_shocks::schema::{baseline, correlation, series, summary};
use crop_shocks::series::aggregate as series_of;
use crop_shocks::{
    calories, correlation as comovement, frequency, ingest, shocks, smoothing, CalorieTable,
    DetectionConfig, PipelineConfig, ProductionRecord, ShockDirection, ShockError, ShockPipeline,
    SmoothingConfig,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn production(rows: &[(&str, &str, i32, f64)]) -> DataFrame {
    let records: Vec<_> = rows
        .iter()
        .map(|&(c, k, y, p)| ProductionRecord::new(c, k, y, p))
        .collect();
    ingest::production_from_records(&records).unwrap()
}

fn two_country_scenario() -> DataFrame {
    let a = [1000.0, 1000.0, 1000.0, 1000.0, 1000.0];
    let b = [1000.0, 1000.0, 1000.0, 500.0, 1000.0];
    let mut rows = Vec::new();
    for (i, year) in (2000..2005).enumerate() {
        rows.push(("A", "Wheat", year, a[i]));
        rows.push(("B", "Wheat", year, b[i]));
    }
    production(&rows)
}

#[test]
fn end_to_end_flags_the_dip() {
    init_tracing();
    let config = PipelineConfig {
        smoothing: SmoothingConfig::new(5, 1).unwrap(),
        ..Default::default()
    };
    let table = CalorieTable::new([("Wheat", 4.0)]).unwrap();
    let out = ShockPipeline::new(config, table)
        .unwrap()
        .run(&two_country_scenario())
        .unwrap();

    let records = shocks::read_shocks(&out.shocks).unwrap();
    assert_eq!(records.len(), 10);

    let a: Vec<_> = records.iter().filter(|r| r.country == "A").collect();
    assert!(a.iter().all(|r| !r.is_shock));
    for r in &a {
        assert_abs_diff_eq!(r.actual, 4000.0);
        assert_abs_diff_eq!(r.baseline, 4000.0, epsilon = 1e-9);
    }

    let dip = records
        .iter()
        .find(|r| r.country == "B" && r.year == 2003)
        .unwrap();
    assert_abs_diff_eq!(dip.actual, 2000.0);
    assert!(dip.is_shock);
    assert!(dip.relative_deviation < -0.05);

    let largest = frequency::largest_shocks(&out.shocks).unwrap();
    let year = largest
        .column(crop_shocks::schema::largest::YEAR_OF_SHOCK)
        .unwrap()
        .i32()
        .unwrap();
    assert_eq!(year.get(1), Some(2003));

    let counts = out
        .summary
        .column(summary::SHOCK_COUNT)
        .unwrap()
        .u32()
        .unwrap();
    assert_eq!(counts.get(0), Some(0));
    assert!(counts.get(1).unwrap() >= 1);
}

#[test]
fn calories_are_exact_products() {
    let table = CalorieTable::fao_staples();
    let df = production(&[
        ("A", "Rice", 2000, 123.456),
        ("A", "Wheat", 2000, 0.001),
        ("B", "Potatoes", 2000, 98765.4321),
    ]);
    let out = calories::convert(&df, &table).unwrap();
    let records = ingest::read_records(&out.frame).unwrap();

    for (i, r) in records.iter().enumerate() {
        let col = out
            .frame
            .column(&crop_shocks::schema::calories::column_for(&r.crop))
            .unwrap()
            .f64()
            .unwrap();
        assert_eq!(col.get(i), Some(r.production * table.factor(&r.crop).unwrap()));
    }
}

#[test]
fn conversion_and_aggregation_are_idempotent() {
    let table = CalorieTable::new([("Wheat", 3.5), ("Rice", 1.25)]).unwrap();
    let df = production(&[
        ("A", "Rice", 2000, 1.1),
        ("A", "Wheat", 2000, 2.2),
        ("A", "Wheat", 2001, 3.3),
        ("B", "Rice", 2001, 4.4),
    ]);
    let aggregate = || series_of(&calories::convert(&df, &table).unwrap()).unwrap();
    let first = aggregate();
    let second = aggregate();
    assert!(first.equals_missing(&second));

    let totals = first.column(series::TOTAL_CALORIES).unwrap().f64().unwrap();
    assert_eq!(totals.get(0), Some(1.1 * 1.25 + 2.2 * 3.5));
}

#[test]
fn linear_calorie_series_has_itself_as_baseline() {
    let countries = vec!["A".to_string(); 11];
    let years: Vec<i32> = (1990..2001).collect();
    let values: Vec<f64> = (0..11).map(|i| 5000.0 + 100.0 * f64::from(i)).collect();
    let df = df!(
        series::COUNTRY => &countries,
        series::YEAR => &years,
        series::TOTAL_CALORIES => &values,
    )
    .unwrap();

    for (w, p) in [(3, 1), (5, 2), (7, 1), (9, 4), (11, 3)] {
        let config = SmoothingConfig::new(w, p).unwrap();
        let out = smoothing::smooth_frame(&df, &config).unwrap();
        let base = out.column(baseline::BASELINE).unwrap().f64().unwrap();
        for (got, want) in base.into_iter().zip(&values) {
            assert_abs_diff_eq!(got.unwrap(), *want, epsilon = 1e-6);
        }
    }
}

#[test]
fn short_series_is_reported_not_skipped() {
    let rows: Vec<_> = (2000..2005).map(|y| ("A", "Rice", y, 10.0)).collect();
    let table = CalorieTable::new([("Rice", 1.0)]).unwrap();
    let series_df = series_of(&calories::convert(&production(&rows), &table).unwrap()).unwrap();

    let config = SmoothingConfig::new(7, 2).unwrap();
    let err = smoothing::smooth_frame(&series_df, &config).unwrap_err();
    match err {
        ShockError::SeriesTooShort { country, len, window } => {
            assert_eq!(country, "A");
            assert_eq!(len, 5);
            assert_eq!(window, 7);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn zero_baseline_fails_detection() {
    let series_df = df!(
        series::COUNTRY => ["A"],
        series::YEAR => [2000i32],
        series::TOTAL_CALORIES => [10.0],
    )
    .unwrap();
    for b in [0.0, -5.0] {
        let baseline_df = df!(
            baseline::COUNTRY => ["A"],
            baseline::YEAR => [2000i32],
            baseline::BASELINE => [b],
        )
        .unwrap();
        let err =
            shocks::detect(&series_df, &baseline_df, &DetectionConfig::default()).unwrap_err();
        assert!(matches!(err, ShockError::InvalidBaseline { .. }));
    }
}

#[test]
fn config_file_drives_the_pipeline() {
    init_tracing();
    let dir = std::env::temp_dir().join(format!("crop-shocks-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let config_path = dir.join("pipeline.toml");
    let table_path = dir.join("calories.toml");
    let config_toml = r#"
        [smoothing]
        window_length = 5
        polyorder = 1

        [detection]
        threshold = 0.1
        direction = "decline"
    "#;
    std::fs::write(&config_path, config_toml).unwrap();
    std::fs::write(&table_path, "units = \"kcal_per_100g\"\n[crops]\nWheat = 334\n").unwrap();

    let config = PipelineConfig::from_path(&config_path).unwrap();
    let table = CalorieTable::from_path(&table_path).unwrap();
    assert_eq!(config.detection.direction, ShockDirection::Decline);
    assert_eq!(table.factor("Wheat"), Some(3_340_000.0));

    let out = ShockPipeline::new(config, table)
        .unwrap()
        .run(&two_country_scenario())
        .unwrap();
    let records = shocks::read_shocks(&out.shocks).unwrap();
    // declines only: B's dip, nothing for A
    let flagged: Vec<_> = records.iter().filter(|r| r.is_shock).collect();
    assert!(flagged.iter().all(|r| r.relative_deviation < 0.0));
    assert!(flagged.iter().any(|r| r.country == "B" && r.year == 2003));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn pipeline_output_feeds_rest_of_world_correlation() {
    let config = PipelineConfig {
        smoothing: SmoothingConfig::new(5, 1).unwrap(),
        ..Default::default()
    };
    let table = CalorieTable::new([("Wheat", 1.0)]).unwrap();
    let a = [100.0, 120.0, 90.0, 130.0, 80.0, 140.0, 95.0, 125.0, 85.0, 135.0, 110.0];
    let mut rows = Vec::new();
    for (i, year) in (1990..2001).enumerate() {
        rows.push(("A", "Wheat", year, a[i]));
        rows.push(("B", "Wheat", year, 3.0 * a[i]));
    }
    let out = ShockPipeline::new(config, table)
        .unwrap()
        .run(&production(&rows))
        .unwrap();

    let rho = comovement::country_world_correlations(&out.series, &out.shocks, &config.smoothing)
        .unwrap();
    let countries = rho.column(correlation::COUNTRY).unwrap().str().unwrap();
    assert_eq!(countries.into_iter().flatten().collect::<Vec<_>>(), ["A", "B"]);
    for r in rho.column(correlation::CORRELATION).unwrap().f64().unwrap() {
        assert_abs_diff_eq!(r.unwrap(), 1.0, epsilon = 1e-9);
    }

    let matrix = comovement::correlation_matrix(&out.shocks).unwrap();
    assert_eq!(matrix.shape(), (2, 3));
}

#[test]
fn missing_config_file_is_an_io_error() {
    let err = PipelineConfig::from_path("/nonexistent/crop-shocks.toml").unwrap_err();
    assert!(matches!(err, ShockError::Io(_)));
}
