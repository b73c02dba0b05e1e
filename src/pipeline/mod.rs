//! The census and soil lead workflow, run start to finish.
//!
//! Each stage is a public function so it can be driven on its own; [`run`]
//! chains them in order and writes the outputs.

pub mod report;

use std::sync::Arc;
use std::time::Instant;

use arrow::array::Float64Array;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;

use crate::algorithm::{
    Classification, Design, MlLag, Moran, MoranScatter, Ols, Scheme, SpatialJoinSummary,
    SpatialWeights, Transform, assign_crs, classify, cross_check, describe, dissolve,
    group_mean, group_sum, merge_frame, sjoin_within,
};
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};
use crate::frame::GeoFrame;
use crate::io::{read_csv, read_csv_headerless, read_shapefile, read_table, write_csv, write_shapefile};
use crate::schema::{TypeCompatibility, cast_column, check_type_compatibility};
use crate::utils::arrow::{column_f64, get_column, numeric_columns, required_f64};
use crate::utils::logging::log_batch_summary;
use crate::utils::{create_dir_and_check_existence, validate_directory};

pub use report::{AggregationReport, AnalysisReport, InputShape, OutputFiles};

/// Tract identifier shared by the tract and block-group layers
pub const TRACT: &str = "TRACT";
/// Block-group identifier joining the census table
pub const BKG_KEY: &str = "BKG_KEY";
/// Total population
pub const POPULATION: &str = "POP2000";
/// Tract identifier in the metals table
pub const METALS_KEY: &str = "ID";
/// Lead concentration of a soil sample
pub const LEAD: &str = "ppm";
/// Mean lead concentration per tract
pub const LEAD_MEAN: &str = "pb_ppm";
/// Percentage Hispanic population
pub const HISPANIC: &str = "perc_hispa";
/// Columns of the headerless soil sample file
pub const SOIL_COLUMNS: [&str; 4] = ["x", "y", "ID", "ppm"];
/// Stem of the joined output files
pub const OUTPUT_STEM: &str = "census_metals_pb";
/// Stem of the run summary
pub const SUMMARY_STEM: &str = "analysis_summary";

const TOTAL_STEPS: usize = 7;

/// Raw inputs of a run
#[derive(Debug, Clone)]
pub struct Inputs {
    pub tracts: GeoFrame,
    pub block_groups: GeoFrame,
    pub blocks: GeoFrame,
    pub census: RecordBatch,
    pub metals: RecordBatch,
    pub soil: RecordBatch,
}

/// Tract-level layers produced by the aggregation stage
#[derive(Debug, Clone)]
pub struct Aggregation {
    /// Block groups dissolved to tracts
    pub dissolved: GeoFrame,
    /// Tract layer joined with the attribute-only tract sums
    pub tracts: GeoFrame,
    pub report: AggregationReport,
}

/// Output of the spatial join stage
#[derive(Debug, Clone)]
pub struct LeadByTract {
    /// Tracts with census sums, metals and mean lead
    pub frame: GeoFrame,
    pub join: SpatialJoinSummary,
}

/// Results of the spatial statistics stage
#[derive(Debug, Clone)]
pub struct Statistics {
    pub weights: SpatialWeights,
    pub moran: Moran,
    pub scatter: MoranScatter,
    pub ols: Ols,
    pub residual_moran: Moran,
    pub ml_lag: MlLag,
}

fn step(index: usize, message: &str) {
    log::info!("[Step {index}/{TOTAL_STEPS}] {message}");
}

/// Bring `column` to `target` when the types differ but can be converted
fn align_key(batch: &RecordBatch, column: &str, target: &DataType) -> Result<RecordBatch> {
    let current = get_column(batch, column)?.data_type().clone();
    match check_type_compatibility(&current, target) {
        TypeCompatibility::Exact => Ok(batch.clone()),
        TypeCompatibility::Compatible => {
            log::info!("Casting key {column} from {current} to {target}");
            cast_column(batch, column, target)
        }
        TypeCompatibility::Incompatible => Err(AnalysisError::KeyTypeMismatch {
            left: column.to_string(),
            left_type: current,
            right: column.to_string(),
            right_type: target.clone(),
        }),
    }
}

fn align_frame_key(frame: GeoFrame, column: &str, target: &DataType) -> Result<GeoFrame> {
    let batch = align_key(frame.batch(), column, target)?;
    frame.with_batch(batch)
}

/// Resolve and create the output directory
pub fn prepare_output(config: &AnalysisConfig) -> Result<std::path::PathBuf> {
    config.validate()?;
    validate_directory(&config.in_dir)?;
    let out = config.output_dir();
    if config.create_out_dir {
        if create_dir_and_check_existence(&out)? {
            log::info!("Created output directory {}", out.display());
        }
    } else {
        validate_directory(&out)?;
    }
    Ok(out)
}

/// Read every input layer and table
pub fn load_inputs(config: &AnalysisConfig) -> Result<Inputs> {
    let na = config.na_value;
    let path = |file: &str| config.input_path(file);

    let tracts = read_shapefile(&path(&config.tract_file), na)?;
    let block_groups = read_shapefile(&path(&config.block_group_file), na)?;
    let blocks = read_shapefile(&path(&config.block_file), na)?;
    let census = read_csv(&path(&config.census_table_file), na)?;
    let soil = read_csv_headerless(&path(&config.soil_pb_file), &SOIL_COLUMNS, na)?;
    let metals = read_table(&path(&config.metals_table_file), na)?;

    let inputs = Inputs {
        tracts,
        block_groups,
        blocks,
        census,
        metals,
        soil,
    };
    for shape in inputs.shapes() {
        log::info!("{}: {} rows x {} columns", shape.name, shape.rows, shape.columns);
    }
    if !numeric_columns(inputs.tracts.batch(), &[]).is_empty() {
        let description = describe(inputs.tracts.batch())?;
        log::info!("Tract attributes\n{}", pretty_format_batches(&[description])?);
    }
    Ok(inputs)
}

impl Inputs {
    /// Rows and columns of each input
    #[must_use]
    pub fn shapes(&self) -> Vec<InputShape> {
        let shape = |name: &str, batch: &RecordBatch| InputShape {
            name: name.to_string(),
            rows: batch.num_rows(),
            columns: batch.num_columns(),
        };
        vec![
            shape("tracts", self.tracts.batch()),
            shape("block_groups", self.block_groups.batch()),
            shape("blocks", self.blocks.batch()),
            shape("census", &self.census),
            shape("metals", &self.metals),
            shape("soil_pb", &self.soil),
        ]
    }
}

/// Join census attributes onto block groups and aggregate them to tracts
///
/// Tracts are built twice: by dissolving block groups, and by summing their
/// attributes and joining the sums onto the tract layer. The two must agree.
pub fn aggregate_to_tracts(inputs: &Inputs) -> Result<Aggregation> {
    let census_key = get_column(&inputs.census, BKG_KEY)?.data_type().clone();
    let block_groups = align_frame_key(inputs.block_groups.clone(), BKG_KEY, &census_key)?;
    let block_groups = merge_frame(&block_groups, &inputs.census, BKG_KEY, BKG_KEY)?;
    let block_groups = align_frame_key(block_groups, TRACT, &DataType::Int64)?;
    log_batch_summary("block groups with census", block_groups.batch());

    let dissolved = dissolve(&block_groups, TRACT)?;
    let grouped = group_sum(block_groups.batch(), TRACT)?;

    let tracts = align_frame_key(inputs.tracts.clone(), TRACT, &DataType::Int64)?;
    let tracts = merge_frame(&tracts, &grouped, TRACT, TRACT)?;

    // Row counts and every shared sum must agree between the two routes
    let check = cross_check(dissolved.batch(), tracts.batch(), TRACT)?;
    log::info!(
        "Aggregated {} block groups to {} tracts; {} columns agree",
        block_groups.num_rows(),
        dissolved.num_rows(),
        check.columns.len()
    );

    Ok(Aggregation {
        report: AggregationReport {
            block_groups: block_groups.num_rows(),
            tracts: dissolved.num_rows(),
            check,
        },
        dissolved,
        tracts,
    })
}

/// Quantile and equal-interval classes of tract population
pub fn classify_population(dissolved: &GeoFrame, k: usize) -> Result<Vec<Classification>> {
    let population: Vec<f64> = column_f64(dissolved.batch(), POPULATION)?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect();
    [Scheme::Quantiles, Scheme::EqualInterval]
        .into_iter()
        .map(|scheme| {
            let classes = classify(&population, scheme, k)?;
            log::info!("{POPULATION} {classes}");
            let table = classes.table()?;
            log::debug!("\n{}", pretty_format_batches(&[table])?);
            Ok(classes)
        })
        .collect()
}

/// Attach metals and mean soil lead to the tracts
pub fn join_lead_samples(inputs: &Inputs, aggregation: &Aggregation) -> Result<LeadByTract> {
    let tract_key = get_column(aggregation.tracts.batch(), TRACT)?.data_type().clone();
    let metals = align_key(&inputs.metals, METALS_KEY, &tract_key)?;
    let census_metals = merge_frame(&aggregation.tracts, &metals, TRACT, METALS_KEY)?;

    let mut points = GeoFrame::points_from_xy(inputs.soil.clone(), SOIL_COLUMNS[0], SOIL_COLUMNS[1])?;
    assign_crs(&mut points, &census_metals)?;
    let (joined, join) = sjoin_within(&points, &aggregation.dissolved)?;

    let lead = group_mean(joined.batch(), TRACT, LEAD, LEAD_MEAN)?;
    let frame = merge_frame(&census_metals, &lead, TRACT, TRACT)?;
    log::info!(
        "{} of {} tracts have soil lead samples",
        frame.num_rows(),
        census_metals.num_rows()
    );
    Ok(LeadByTract { frame, join })
}

/// Spatial weights, autocorrelation and regression on mean lead
///
/// Adds the `y` and `y_lag` columns to `frame`.
pub fn spatial_statistics(frame: &mut GeoFrame, config: &AnalysisConfig) -> Result<Statistics> {
    let mut weights = SpatialWeights::queen(frame, Some(TRACT))?;
    weights.set_transform(Transform::Row);
    log::info!(
        "Queen weights over {} tracts, {:.2} neighbours on average",
        weights.n(),
        weights.mean_neighbors()
    );

    let y = required_f64(frame.batch(), LEAD_MEAN)?;
    let moran = Moran::new(&y, &weights, config.permutations, config.seed)?;
    log::info!(
        "Moran's I of {LEAD_MEAN}: {:.4} (E[I] {:.4}, p_sim {:?}, z_sim {:?})",
        moran.i,
        moran.ei,
        moran.p_sim,
        moran.z_sim
    );

    let lag = weights.lag(&y)?;
    frame.set_column("y", Arc::new(Float64Array::from(y.clone())))?;
    frame.set_column("y_lag", Arc::new(Float64Array::from(lag)))?;
    let scatter = MoranScatter::new(&y, &weights)?;
    log::debug!("Moran scatter slope {:.4}", scatter.slope);

    let x = required_f64(frame.batch(), HISPANIC)?;
    let design = Design::new(LEAD_MEAN, &y, &[(HISPANIC, x.as_slice())])?;
    let ols = Ols::fit(&design)?;
    log::info!("\n{ols}");

    let residual_moran = Moran::new(&ols.residuals(), &weights, config.permutations, config.seed)?;
    log::info!(
        "Moran's I of OLS residuals: {:.4} (p_sim {:?})",
        residual_moran.i,
        residual_moran.p_sim
    );

    let ml_lag = MlLag::fit(&design, &weights)?;
    log::info!("\n{ml_lag}");

    Ok(Statistics {
        weights,
        moran,
        scatter,
        ols,
        residual_moran,
        ml_lag,
    })
}

/// Run the whole workflow and write its outputs
pub fn run(config: &AnalysisConfig) -> Result<AnalysisReport> {
    let start = Instant::now();
    log::info!("Starting analysis");
    log::info!("Configuration: {config}");

    step(1, "Preparing output directory");
    let out = prepare_output(config)?;

    step(2, "Reading census layers, tables and soil samples");
    let inputs = load_inputs(config)?;

    step(3, "Joining census attributes and aggregating block groups to tracts");
    let aggregation = aggregate_to_tracts(&inputs)?;

    step(4, "Classifying tract population");
    let population_classes = classify_population(&aggregation.dissolved, config.classification_k)?;

    step(5, "Joining soil lead samples to tracts");
    let LeadByTract { mut frame, join } = join_lead_samples(&inputs, &aggregation)?;
    let csv = config.output_file(OUTPUT_STEM, "csv");
    let shapefile = config.output_file(OUTPUT_STEM, "shp");
    write_csv(frame.batch(), &csv)?;
    write_shapefile(&frame, &shapefile)?;

    step(6, "Computing spatial weights, autocorrelation and regressions");
    let tracts_with_lead = frame.num_rows();
    let stats = spatial_statistics(&mut frame, config)?;

    step(7, "Writing run summary");
    let summary = config.output_file(SUMMARY_STEM, "json");
    let report = AnalysisReport {
        generated_at: chrono::Utc::now(),
        config: config.clone(),
        inputs: inputs.shapes(),
        aggregation: aggregation.report,
        population_classes,
        spatial_join: join,
        tracts_with_lead,
        weights: stats.weights.summary(),
        moran_scatter_slope: stats.scatter.slope,
        moran: stats.moran,
        ols: stats.ols,
        residual_moran: stats.residual_moran,
        ml_lag: stats.ml_lag,
        outputs: OutputFiles {
            csv,
            shapefile,
            summary: summary.clone(),
        },
    };
    report.write_json(&summary)?;

    log::info!(
        "Analysis complete in {:?}; outputs in {}",
        start.elapsed(),
        out.display()
    );
    Ok(report)
}
