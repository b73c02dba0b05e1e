use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use geo::{Geometry, Rect, coord};
use syracuse_pb::{AnalysisConfig, Crs, GeoFrame, write_shapefile};

/// UTM zone 18N, as shipped with the census layers
pub const UTM_18N: &str = r#"PROJCS["NAD_1983_UTM_Zone_18N",GEOGCS["GCS_North_American_1983",DATUM["D_North_American_1983",SPHEROID["GRS_1980",6378137.0,298.257222101]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Transverse_Mercator"],PARAMETER["False_Easting",500000.0],PARAMETER["False_Northing",0.0],PARAMETER["Central_Meridian",-75.0],PARAMETER["Scale_Factor",0.9996],PARAMETER["Latitude_Of_Origin",0.0],UNIT["Meter",1.0]]"#;

pub const ORIGIN_X: f64 = 400_000.0;
pub const ORIGIN_Y: f64 = 4_760_000.0;
pub const CELL: f64 = 1_000.0;

/// Offsets of the soil samples inside each tract
const SAMPLE_OFFSETS: [(f64, f64, f64); 3] = [(250.0, 250.0, -5.0), (750.0, 500.0, 0.0), (500.0, 750.0, 5.0)];

/// Census tract number of grid cell `(row, col)`
#[must_use]
pub fn tract_code(row: usize, col: usize, side: usize) -> i64 {
    ((row * side + col + 1) * 100) as i64
}

/// Grid cell of a tract number
#[must_use]
pub fn tract_cell(code: i64, side: usize) -> (usize, usize) {
    let idx = (code / 100 - 1) as usize;
    (idx / side, idx % side)
}

/// Mean soil lead sampled in cell `(row, col)`
#[must_use]
pub fn expected_lead(row: usize, col: usize) -> f64 {
    50.0 + 40.0 * row as f64 + 30.0 * col as f64
}

/// Percentage Hispanic of one block group; a tract sums its two halves
#[must_use]
pub fn block_group_hispanic(row: usize, col: usize) -> f64 {
    let spread = ((row * 7 + col * 3) % 5) as f64;
    (5.0 + 2.0 * row as f64 + 3.0 * col as f64 + 0.7 * spread) / 2.0
}

#[must_use]
pub fn block_group_population(row: usize, col: usize, bg: usize) -> i64 {
    (500 + 37 * row + 11 * col + 50 * bg) as i64
}

fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Geometry<f64> {
    Geometry::Polygon(Rect::new(coord! { x: x0, y: y0 }, coord! { x: x1, y: y1 }).to_polygon())
}

fn cell_origin(row: usize, col: usize) -> (f64, f64) {
    (ORIGIN_X + col as f64 * CELL, ORIGIN_Y + row as f64 * CELL)
}

fn utf8(values: Vec<String>) -> ArrayRef {
    Arc::new(StringArray::from(values))
}

/// One square tract per grid cell, `TRACT` stored as zero-padded text
#[must_use]
pub fn tract_layer(side: usize) -> GeoFrame {
    let mut tracts = Vec::new();
    let mut areas = Vec::new();
    let mut geometry = Vec::new();
    for row in 0..side {
        for col in 0..side {
            let (x0, y0) = cell_origin(row, col);
            tracts.push(format!("{:06}", tract_code(row, col, side)));
            areas.push(CELL * CELL);
            geometry.push(rect(x0, y0, x0 + CELL, y0 + CELL));
        }
    }
    let n = tracts.len();
    let batch = RecordBatch::try_new(
        Arc::new(Schema::new(vec![
            Field::new("TRACT", DataType::Utf8, true),
            Field::new("CNTY_FIPS", DataType::Utf8, true),
            Field::new("AREA", DataType::Float64, true),
        ])),
        vec![
            utf8(tracts),
            utf8(vec!["067".to_string(); n]),
            Arc::new(Float64Array::from(areas)),
        ],
    )
    .unwrap();
    GeoFrame::new(batch, geometry, Some(Crs::from_wkt(UTM_18N))).unwrap()
}

/// Two block groups per tract, splitting it into west and east halves
#[must_use]
pub fn block_group_layer(side: usize) -> GeoFrame {
    let mut keys = Vec::new();
    let mut tracts = Vec::new();
    let mut areas = Vec::new();
    let mut geometry = Vec::new();
    for row in 0..side {
        for col in 0..side {
            let (x0, y0) = cell_origin(row, col);
            let tract = format!("{:06}", tract_code(row, col, side));
            for bg in 1..=2 {
                let left = x0 + (bg - 1) as f64 * CELL / 2.0;
                keys.push(format!("36067{tract}{bg}"));
                tracts.push(tract.clone());
                areas.push(CELL * CELL / 2.0);
                geometry.push(rect(left, y0, left + CELL / 2.0, y0 + CELL));
            }
        }
    }
    let batch = RecordBatch::try_new(
        Arc::new(Schema::new(vec![
            Field::new("BKG_KEY", DataType::Utf8, true),
            Field::new("TRACT", DataType::Utf8, true),
            Field::new("AREA", DataType::Float64, true),
        ])),
        vec![utf8(keys), utf8(tracts), Arc::new(Float64Array::from(areas))],
    )
    .unwrap();
    GeoFrame::new(batch, geometry, Some(Crs::from_wkt(UTM_18N))).unwrap()
}

/// Census attributes keyed by the numeric block-group key
#[must_use]
pub fn census_csv(side: usize) -> String {
    let mut text = String::from("BKG_KEY,POP2000,perc_hispa\n");
    for row in 0..side {
        for col in 0..side {
            let tract = tract_code(row, col, side);
            for bg in 1..=2 {
                writeln!(
                    text,
                    "36067{tract:06}{bg},{},{:.3}",
                    block_group_population(row, col, bg),
                    block_group_hispanic(row, col)
                )
                .unwrap();
            }
        }
    }
    text
}

#[must_use]
pub fn metals_csv(side: usize) -> String {
    let mut text = String::from("ID,Pb,As,Cr\n");
    for row in 0..side {
        for col in 0..side {
            writeln!(
                text,
                "{},{:.1},{:.2},{:.2}",
                tract_code(row, col, side),
                expected_lead(row, col) * 1.1,
                3.0 + row as f64 * 0.25,
                12.0 + col as f64 * 0.5
            )
            .unwrap();
        }
    }
    text
}

/// Headerless `x, y, ID, ppm` samples, three per tract plus one far outside
#[must_use]
pub fn soil_csv(side: usize) -> String {
    soil_csv_skipping(side, &[])
}

/// [`soil_csv`] without any samples in the `unsampled` grid cells
#[must_use]
pub fn soil_csv_skipping(side: usize, unsampled: &[(usize, usize)]) -> String {
    let mut text = String::new();
    let mut id = 1;
    for row in 0..side {
        for col in 0..side {
            if unsampled.contains(&(row, col)) {
                continue;
            }
            let (x0, y0) = cell_origin(row, col);
            for (dx, dy, spread) in SAMPLE_OFFSETS {
                writeln!(
                    text,
                    "{:.1},{:.1},{id},{:.1}",
                    x0 + dx,
                    y0 + dy,
                    expected_lead(row, col) + spread
                )
                .unwrap();
                id += 1;
            }
        }
    }
    writeln!(text, "{:.1},{:.1},{id},99.0", ORIGIN_X - 5_000.0, ORIGIN_Y - 5_000.0).unwrap();
    text
}

/// Number of soil samples written by [`soil_csv`]
#[must_use]
pub fn sample_count(side: usize) -> usize {
    side * side * SAMPLE_OFFSETS.len() + 1
}

/// Write a full synthetic input set under `dir/data` and return a config
/// reading it and writing to `dir/outputs`
#[must_use]
pub fn write_inputs(dir: &Path, side: usize) -> AnalysisConfig {
    let data = dir.join("data");
    std::fs::create_dir_all(&data).unwrap();
    let config = AnalysisConfig {
        in_dir: data.clone(),
        out_dir: dir.join("outputs"),
        out_suffix: "test".to_string(),
        metals_table_file: "SYR_metals.csv".to_string(),
        permutations: 99,
        ..Default::default()
    };

    write_shapefile(&tract_layer(side), &data.join(&config.tract_file)).unwrap();
    let block_groups = block_group_layer(side);
    write_shapefile(&block_groups, &data.join(&config.block_group_file)).unwrap();
    write_shapefile(&block_groups, &data.join(&config.block_file)).unwrap();
    std::fs::write(data.join(&config.census_table_file), census_csv(side)).unwrap();
    std::fs::write(data.join(&config.metals_table_file), metals_csv(side)).unwrap();
    std::fs::write(data.join(&config.soil_pb_file), soil_csv(side)).unwrap();
    config
}
