//! cr2raw CLI - drives the CR2 decode core end to end.
//!
//! The library deliberately takes entropy-coded bytes plus metadata; this
//! tool plays the host: it walks the markers of a bare lossless JPEG
//! stream, feeds the decompressor, and runs the sensor pipeline through to
//! a viewable preview.

use clap::{Parser, Subcommand, ValueEnum};
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use cr2raw_rs::colorspace::{self, Matrix3};
use cr2raw_rs::cr2::{self, Borders};
use cr2raw_rs::debayer::{debayer, DebayerAlgorithm, DebayerOptions};
use cr2raw_rs::lossless::{Decompressor, HuffmanTable};
use cr2raw_rs::SensorPlane;

/// Canon CR2 sensor decode pipeline
#[derive(Parser)]
#[command(name = "cr2raw")]
#[command(author = "cr2raw-rs contributors")]
#[command(version)]
#[command(about = "Decode lossless JPEG sensor data and develop it to RGB", long_about = None)]
#[command(after_help = "EXAMPLES:
    cr2raw decode -i sensor.ljpg -o plane.pgm
    cr2raw decode -i sensor.ljpg -o plane.pgm --slices 2,1728
    cr2raw develop -i plane.raw -o preview.ppm -w 5184 -H 3456 \\
        --borders 50,5233,3505,140 --white-balance 2.1,1,1,1.5
    cr2raw info -i sensor.ljpg")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a bare lossless JPEG (SOF3) stream to a sensor plane
    ///
    /// The input must start with SOI and contain DHT, SOF3, and SOS
    /// segments; that marker walk is host-side glue around the core
    /// decompressor.
    #[command(visible_alias = "d")]
    Decode {
        /// Input lossless JPEG stream
        #[arg(short, long)]
        input: PathBuf,

        /// Output PGM file (16-bit)
        #[arg(short, long)]
        output: PathBuf,

        /// CR2 slice descriptor "N,W"; omit if the stream is unsliced
        #[arg(short, long)]
        slices: Option<String>,
    },

    /// Develop a decoded sensor plane into an RGB preview
    #[command(visible_alias = "v")]
    Develop {
        /// Input plane, raw big-endian 16-bit samples
        #[arg(short, long)]
        input: PathBuf,

        /// Output PPM file
        #[arg(short, long)]
        output: PathBuf,

        /// Plane width in pixels
        #[arg(short, long)]
        width: usize,

        /// Plane height in pixels
        #[arg(short = 'H', long)]
        height: usize,

        /// Sensor borders "top,right,bottom,left"; enables black-level
        /// estimation, phase detection, and trimming
        #[arg(short, long)]
        borders: Option<String>,

        /// Interpolation algorithm
        #[arg(short, long, default_value = "bilinear", value_enum)]
        algorithm: Algorithm,

        /// White-balance multipliers "r,g1,g2,b"
        #[arg(long, default_value = "1,1,1,1")]
        white_balance: String,

        /// Camera-to-XYZ matrix, nine comma-separated row-major values;
        /// enables conversion to the working color space
        #[arg(long)]
        cam_xyz: Option<String>,

        /// 3x3 median refinement passes after LMMSE interpolation
        #[arg(long, default_value_t = 0)]
        median_passes: usize,
    },

    /// Display frame information for a lossless JPEG stream
    #[command(visible_alias = "i")]
    Info {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Algorithm {
    /// Neighbor-averaging interpolation
    Bilinear,
    /// Zhang-Wu directional LMMSE
    Lmmse,
}

impl From<Algorithm> for DebayerAlgorithm {
    fn from(value: Algorithm) -> Self {
        match value {
            Algorithm::Bilinear => DebayerAlgorithm::Bilinear,
            Algorithm::Lmmse => DebayerAlgorithm::Lmmse,
        }
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Decode {
            input,
            output,
            slices,
        } => decode_stream(&input, &output, slices.as_deref()),
        Commands::Develop {
            input,
            output,
            width,
            height,
            borders,
            algorithm,
            white_balance,
            cam_xyz,
            median_passes,
        } => develop_plane(
            &input,
            &output,
            width,
            height,
            borders.as_deref(),
            algorithm,
            &white_balance,
            cam_xyz.as_deref(),
            median_passes,
        ),
        Commands::Info { input } => show_info(&input),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn decode_stream(
    input: &PathBuf,
    output: &PathBuf,
    slices: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    let data = fs::read(input)?;
    let (mut dec, scan_offset) = parse_lossless_stream(&data)?;
    dec.decompress(&data, scan_offset)?;

    let width = dec.samples_per_line() * dec.components();
    let height = dec.lines();

    let plane = match slices {
        Some(descriptor) => {
            let values = parse_numbers(descriptor, 2)?;
            cr2::unslice(&dec, [values[0] as usize, values[1] as usize], width, height)?
        }
        None => SensorPlane {
            data: dec.into_output(),
            width,
            height,
        },
    };

    write_pgm16(output, &plane.data, plane.width, plane.height)?;
    println!(
        "✓ Decoded {}x{} sensor plane to {:?}",
        plane.width, plane.height, output
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn develop_plane(
    input: &PathBuf,
    output: &PathBuf,
    width: usize,
    height: usize,
    borders: Option<&str>,
    algorithm: Algorithm,
    white_balance: &str,
    cam_xyz: Option<&str>,
    median_passes: usize,
) -> Result<(), Box<dyn Error>> {
    let raw = fs::read(input)?;
    if raw.len() < width * height * 2 {
        return Err(format!(
            "plane file holds {} bytes, {}x{} needs {}",
            raw.len(),
            width,
            height,
            width * height * 2
        )
        .into());
    }
    let data: Vec<u16> = raw
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    let mut plane = SensorPlane {
        data,
        width,
        height,
    };

    // border analysis runs before the trim discards the masked area
    let (vshift, black) = match borders {
        Some(descriptor) => {
            let values = parse_numbers(descriptor, 4)?;
            let borders = Borders::from_array([
                values[0] as usize,
                values[1] as usize,
                values[2] as usize,
                values[3] as usize,
            ]);
            let vshift = cr2::bayer_shift(&plane, &borders);
            let black = cr2::black_levels(&plane, &borders);
            cr2::trim(&mut plane, &borders);
            (vshift, black)
        }
        None => (0, [0; 4]),
    };

    let wb_values = parse_numbers(white_balance, 4)?;
    let wb = [wb_values[0], wb_values[1], wb_values[2], wb_values[3]];

    let rgb = debayer(
        algorithm.into(),
        &plane,
        usize::from(vshift),
        &wb,
        &black,
        &DebayerOptions { median_passes },
    )?;

    match cam_xyz {
        Some(matrix) => {
            let values = parse_numbers(matrix, 9)?;
            let mut cam: Matrix3 = [[0.0; 3]; 3];
            for (i, value) in values.iter().enumerate() {
                cam[i / 3][i % 3] = *value;
            }
            let working = colorspace::convert_to_working(&rgb, plane.width, plane.height, &cam)?;
            write_ppm_from_float(output, &working, plane.width, plane.height)?;
        }
        None => {
            write_ppm_from_u16(output, &rgb, plane.width, plane.height)?;
        }
    }

    println!(
        "✓ Developed {}x{} image (vshift {}, black {:?}) to {:?}",
        plane.width, plane.height, vshift, black, output
    );
    Ok(())
}

fn show_info(input: &PathBuf) -> Result<(), Box<dyn Error>> {
    let data = fs::read(input)?;
    let (dec, scan_offset) = parse_lossless_stream(&data)?;

    println!("File: {:?}", input);
    println!("Size: {} bytes", data.len());
    println!();
    println!("Format: JPEG lossless (SOF3)");
    println!(
        "  Frame:      {}x{} JPEG pixels",
        dec.samples_per_line(),
        dec.lines()
    );
    println!(
        "  Sensor:     {} columns",
        dec.samples_per_line() * dec.components()
    );
    println!("  Bit depth:  {} bits", dec.precision());
    println!("  Components: {}", dec.components());
    println!("  Scan data:  offset {}", scan_offset);
    Ok(())
}

/// Walks the markers of a bare lossless JPEG stream and returns a
/// configured decompressor plus the offset of the entropy-coded data.
fn parse_lossless_stream(data: &[u8]) -> Result<(Decompressor, usize), Box<dyn Error>> {
    if data.len() < 2 || data[..2] != [0xFF, 0xD8] {
        return Err("input does not start with an SOI marker".into());
    }

    let mut pos = 2;
    let mut tables: [Option<Arc<HuffmanTable>>; 4] = [None, None, None, None];
    let mut frame: Option<Frame> = None;

    loop {
        if pos + 4 > data.len() {
            return Err("stream ended before a scan was found".into());
        }
        if data[pos] != 0xFF {
            return Err(format!("expected a marker at offset {}", pos).into());
        }
        // 0xFF fill bytes may pad the space before a marker
        if data[pos + 1] == 0xFF {
            pos += 1;
            continue;
        }
        let marker = data[pos + 1];
        pos += 2;

        if marker == 0xD9 {
            return Err("stream contains no scan".into());
        }

        let length = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
        if length < 2 || pos + length > data.len() {
            return Err(format!("segment 0x{:02X} overruns the stream", marker).into());
        }
        let segment = &data[pos + 2..pos + length];

        match marker {
            0xC3 => frame = Some(parse_sof3(segment)?),
            0xC0 | 0xC1 | 0xC2 | 0xC7 | 0xCB | 0xCF => {
                return Err("not a lossless (SOF3) stream".into());
            }
            0xC4 => parse_dht(segment, &mut tables)?,
            0xDA => {
                let frame = frame.ok_or("scan appears before the frame header")?;
                let dec = configure_scan(segment, &frame, &tables)?;
                return Ok((dec, pos + length));
            }
            _ => {} // APPn, COM, DNL and friends carry nothing we need
        }
        pos += length;
    }
}

struct Frame {
    precision: u8,
    lines: usize,
    samples_per_line: usize,
    component_ids: Vec<u8>,
}

fn parse_sof3(segment: &[u8]) -> Result<Frame, Box<dyn Error>> {
    if segment.len() < 6 {
        return Err("short SOF3 segment".into());
    }
    let precision = segment[0];
    let lines = usize::from(u16::from_be_bytes([segment[1], segment[2]]));
    let samples_per_line = usize::from(u16::from_be_bytes([segment[3], segment[4]]));
    let count = usize::from(segment[5]);
    if segment.len() < 6 + count * 3 {
        return Err("short SOF3 segment".into());
    }

    let mut component_ids = Vec::with_capacity(count);
    for i in 0..count {
        let id = segment[6 + i * 3];
        let sampling = segment[7 + i * 3];
        if sampling != 0x11 {
            return Err("subsampled components are not supported".into());
        }
        component_ids.push(id);
    }

    Ok(Frame {
        precision,
        lines,
        samples_per_line,
        component_ids,
    })
}

/// A DHT segment may define several tables back to back.
fn parse_dht(
    segment: &[u8],
    tables: &mut [Option<Arc<HuffmanTable>>; 4],
) -> Result<(), Box<dyn Error>> {
    let mut pos = 0;
    while pos < segment.len() {
        if pos + 17 > segment.len() {
            return Err("short DHT segment".into());
        }
        let class = segment[pos] >> 4;
        let dest = usize::from(segment[pos] & 0x0F);
        if class != 0 {
            return Err("AC Huffman tables have no place in a lossless scan".into());
        }
        if dest >= tables.len() {
            return Err("DHT destination out of range".into());
        }

        let counts = &segment[pos + 1..pos + 17];
        let total: usize = counts.iter().map(|&c| usize::from(c)).sum();
        if pos + 17 + total > segment.len() {
            return Err("short DHT segment".into());
        }
        let values = &segment[pos + 17..pos + 17 + total];

        // canonical code assignment, shortest codes first
        let mut table = HuffmanTable::new();
        let mut code: u16 = 0;
        let mut value_index = 0;
        for length in 1..=16 {
            for _ in 0..counts[length - 1] {
                table.add(code, length, values[value_index])?;
                code += 1;
                value_index += 1;
            }
            if length < 16 {
                code <<= 1;
            }
        }
        tables[dest] = Some(Arc::new(table));

        pos += 17 + total;
    }
    Ok(())
}

fn configure_scan(
    segment: &[u8],
    frame: &Frame,
    tables: &[Option<Arc<HuffmanTable>>; 4],
) -> Result<Decompressor, Box<dyn Error>> {
    if segment.is_empty() {
        return Err("short SOS segment".into());
    }
    let count = usize::from(segment[0]);
    if segment.len() < 1 + count * 2 + 3 {
        return Err("short SOS segment".into());
    }

    let mut dec = Decompressor::new(
        frame.samples_per_line,
        frame.lines,
        frame.precision,
        frame.component_ids.len(),
    )?;

    for (slot, table) in tables.iter().enumerate() {
        if let Some(table) = table {
            dec.add_table(slot, Arc::clone(table));
        }
    }

    for i in 0..count {
        let selector = segment[1 + i * 2];
        let dc_table = usize::from(segment[2 + i * 2] >> 4);
        if dc_table >= 4 {
            return Err("scan references a table slot out of range".into());
        }
        let component = frame
            .component_ids
            .iter()
            .position(|&id| id == selector)
            .ok_or("scan references an unknown component")?;
        dec.set_table_for_component(component, dc_table);
    }

    let predictor = segment[1 + count * 2];
    let point_transform = segment[3 + count * 2] & 0x0F;
    if point_transform != 0 {
        return Err("point transform is not supported".into());
    }
    dec.set_predictor(predictor)?;

    Ok(dec)
}

fn parse_numbers(list: &str, expected: usize) -> Result<Vec<f64>, Box<dyn Error>> {
    let values: Result<Vec<f64>, _> = list.split(',').map(|v| v.trim().parse()).collect();
    let values = values.map_err(|_| format!("could not parse number list {:?}", list))?;
    if values.len() != expected {
        return Err(format!("expected {} comma-separated values, got {}", expected, values.len()).into());
    }
    Ok(values)
}

fn write_pgm16(
    output: &PathBuf,
    plane: &[u16],
    width: usize,
    height: usize,
) -> Result<(), Box<dyn Error>> {
    let mut bytes = format!("P5\n{} {}\n65535\n", width, height).into_bytes();
    for &sample in plane {
        bytes.extend_from_slice(&sample.to_be_bytes());
    }
    fs::write(output, bytes)?;
    Ok(())
}

fn write_ppm_from_u16(
    output: &PathBuf,
    pixels: &[u16],
    width: usize,
    height: usize,
) -> Result<(), Box<dyn Error>> {
    let mut bytes = format!("P6\n{} {}\n255\n", width, height).into_bytes();
    for &sample in pixels {
        // samples live in the 14-bit sensor range
        bytes.push((u32::from(sample) * 255 / 16383).min(255) as u8);
    }
    fs::write(output, bytes)?;
    Ok(())
}

/// Working-space floats are linear and unclamped; clip to [0, 1] for the
/// 8-bit preview.
fn write_ppm_from_float(
    output: &PathBuf,
    pixels: &[f32],
    width: usize,
    height: usize,
) -> Result<(), Box<dyn Error>> {
    let mut bytes = format!("P6\n{} {}\n255\n", width, height).into_bytes();
    for &sample in pixels {
        bytes.push((sample.clamp(0.0, 1.0) * 255.0) as u8);
    }
    fs::write(output, bytes)?;
    Ok(())
}
