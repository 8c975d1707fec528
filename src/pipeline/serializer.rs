use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

use crate::{
    config::AppConfig,
    error::{PipelineError, PipelineResult},
    types::{LandmarkSeries, OutputFormat},
};

pub const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
pub const CSV_HEADER: &str = "frame_index,landmark_index,x,y,z,visibility";
const VIDEO_EXTENSION: &str = "mp4";

#[derive(Clone, Debug)]
pub struct OutputLayout {
    pub landmarks_dir: PathBuf,
    pub visualized_dir: PathBuf,
}

/// Output file names claimed for one run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReservedOutput {
    pub stamp: String,
    pub data_path: PathBuf,
    pub video_path: PathBuf,
}

impl OutputLayout {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            landmarks_dir: config.landmarks_dir(),
            visualized_dir: config.visualized_dir(),
        }
    }

    /// Picks a stamp from `now` whose data and video files both do not exist
    /// yet, appending `_1`, `_2`, ... when the plain stamp is taken.
    pub fn reserve(&self, now: DateTime<Local>, format: OutputFormat) -> PipelineResult<ReservedOutput> {
        for dir in [&self.landmarks_dir, &self.visualized_dir] {
            fs::create_dir_all(dir).map_err(|err| PipelineError::write(dir, err))?;
        }

        let base = now.format(STAMP_FORMAT).to_string();
        let mut suffix = 0u32;
        loop {
            let stamp = if suffix == 0 {
                base.clone()
            } else {
                format!("{base}_{suffix}")
            };
            let data_path = self
                .landmarks_dir
                .join(format!("{stamp}.{}", format.extension()));
            let video_path = self.visualized_dir.join(format!("{stamp}.{VIDEO_EXTENSION}"));
            if !data_path.exists() && !video_path.exists() {
                return Ok(ReservedOutput {
                    stamp,
                    data_path,
                    video_path,
                });
            }
            suffix += 1;
        }
    }
}

/// Writes `series` to `path`, refusing to replace an existing file.
pub fn write_series(series: &LandmarkSeries, format: OutputFormat, path: &Path) -> PipelineResult<()> {
    write_new_file(path, |writer| match format {
        OutputFormat::Json => write_json(series, writer),
        OutputFormat::Csv => write_csv(series, writer),
    })?;

    log::info!(
        "wrote {} frames ({} landmarks) to {}",
        series.len(),
        series.observation_count(),
        path.display()
    );
    Ok(())
}

/// Creates `path` and fills it through `fill`. A failed write removes the
/// truncated file.
fn write_new_file<F>(path: &Path, fill: F) -> PipelineResult<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let file = File::options()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|err| PipelineError::write(path, err))?;
    let mut writer = BufWriter::new(file);

    let result = fill(&mut writer).and_then(|()| writer.flush());
    if let Err(err) = result {
        drop(writer);
        if let Err(rm_err) = fs::remove_file(path) {
            log::warn!("could not remove partial {}: {rm_err}", path.display());
        }
        return Err(PipelineError::write(path, err));
    }
    Ok(())
}

fn write_json<W: Write>(series: &LandmarkSeries, writer: W) -> io::Result<()> {
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = Serializer::with_formatter(writer, formatter);
    series.serialize(&mut serializer).map_err(io::Error::from)
}

fn write_csv<W: Write>(series: &LandmarkSeries, mut writer: W) -> io::Result<()> {
    writeln!(writer, "{CSV_HEADER}")?;
    for frame in series.frames() {
        for (idx, lm) in frame.landmarks.iter().enumerate() {
            writeln!(
                writer,
                "{},{},{},{},{},{}",
                frame.frame_index, idx, lm.x, lm.y, lm.z, lm.visibility
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::pipeline::analyzer::test_support::standing_pose;

    fn sample_series() -> LandmarkSeries {
        let mut series = LandmarkSeries::default();
        series.push(standing_pose());
        series.push(Vec::new());
        series.push(standing_pose()[..5].to_vec());
        series
    }

    fn layout(root: &Path) -> OutputLayout {
        OutputLayout {
            landmarks_dir: root.join("landmarks_data"),
            visualized_dir: root.join("visualized"),
        }
    }

    fn fixed_time() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 3, 9, 14, 5, 7)
            .single()
            .expect("unambiguous local time")
    }

    #[test]
    fn json_output_parses_back_to_the_same_series() {
        let dir = tempfile::TempDir::new().expect("could not create a tmp dir");
        let path = dir.path().join("out.json");
        let series = sample_series();
        write_series(&series, OutputFormat::Json, &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("[\n    {\n        \"frame_index\": 0,"));
        let parsed: LandmarkSeries = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, series);
    }

    #[test]
    fn csv_has_one_row_per_observation() {
        let dir = tempfile::TempDir::new().expect("could not create a tmp dir");
        let path = dir.path().join("out.csv");
        let series = sample_series();
        write_series(&series, OutputFormat::Csv, &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(CSV_HEADER));
        let rows: Vec<&str> = lines.collect();
        assert_eq!(rows.len(), series.observation_count());
        assert_eq!(rows.len(), 33 + 5);
        assert!(rows[0].starts_with("0,0,"));
        assert!(rows[33].starts_with("2,0,"));
        assert_eq!(rows[0].split(',').count(), 6);
    }

    #[test]
    fn failed_write_leaves_no_truncated_file() {
        let dir = tempfile::TempDir::new().expect("could not create a tmp dir");
        let path = dir.path().join("20240309_140507.csv");

        let err = write_new_file(&path, |writer| {
            writeln!(writer, "{CSV_HEADER}")?;
            writer.flush()?;
            Err(io::Error::other("disk full"))
        })
        .unwrap_err();

        assert!(matches!(err, PipelineError::Write { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn never_overwrites_existing_files() {
        let dir = tempfile::TempDir::new().expect("could not create a tmp dir");
        let path = dir.path().join("taken.json");
        fs::write(&path, "keep me").unwrap();

        let err = write_series(&sample_series(), OutputFormat::Json, &path).unwrap_err();
        assert!(matches!(err, PipelineError::Write { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "keep me");
    }

    #[test]
    fn repeated_reservations_in_one_second_get_distinct_stamps() {
        let dir = tempfile::TempDir::new().expect("could not create a tmp dir");
        let layout = layout(dir.path());

        let first = layout.reserve(fixed_time(), OutputFormat::Json).unwrap();
        assert_eq!(first.stamp, "20240309_140507");
        assert_eq!(first.data_path, dir.path().join("landmarks_data/20240309_140507.json"));
        assert_eq!(first.video_path, dir.path().join("visualized/20240309_140507.mp4"));

        // Only the video of the first run exists; that alone blocks the stamp.
        fs::write(&first.video_path, b"").unwrap();
        let second = layout.reserve(fixed_time(), OutputFormat::Csv).unwrap();
        assert_eq!(second.stamp, "20240309_140507_1");

        write_series(&sample_series(), OutputFormat::Csv, &second.data_path).unwrap();
        let third = layout.reserve(fixed_time(), OutputFormat::Csv).unwrap();
        assert_eq!(third.stamp, "20240309_140507_2");
        assert_ne!(third.data_path, second.data_path);
    }
}
