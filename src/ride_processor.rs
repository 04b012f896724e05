//! Ride processor: read -> enrich -> score every chainring -> report.
//!
//! Works on a single GPX file or a whole folder. Each ride is optimized on
//! its own; per-file failures in folder mode end up in the results CSV
//! instead of stopping the run.

use std::fs;
use std::path::{Path, PathBuf};

use csv::Writer;
use serde::Serialize;
use tracing::info;

use crate::chainring_optimizer::{best_score, score_chainrings, ChainringScore, Drivetrain};
use crate::enrichment::enrich_samples;
use crate::ride_summary::{summarize, RideSummary};
use crate::track_reader::{collect_track_files, read_track, TrackError};

/// Full result for one ride.
#[derive(Debug, Clone)]
pub struct RideAnalysis {
    pub file_name: String,
    pub track_name: String,
    pub summary: RideSummary,
    pub scores: Vec<ChainringScore>,
    pub optimal: Option<ChainringScore>,
}

impl RideAnalysis {
    /// Index of the winning entry in `scores`. Duplicate candidates score
    /// identically, and the first of them is the winner.
    pub fn optimal_position(&self) -> Option<usize> {
        let best = self.optimal.as_ref()?;
        self.scores.iter().position(|score| score == best)
    }
}

/// One row of the folder-mode results CSV.
#[derive(Debug, Clone, Serialize)]
pub struct RideResult {
    pub file_name: String,
    pub track_name: String,
    pub points: usize,
    pub distance_km: f64,
    pub duration_min: f64,
    pub average_speed_kmh: f64,
    pub samples_with_power: usize,
    pub optimal_chainring: Option<u32>,
    pub best_score: Option<f64>,
    pub preferred_percent: Option<f64>,
    pub status: String,
}

impl RideResult {
    fn from_analysis(analysis: &RideAnalysis) -> Self {
        RideResult {
            file_name: analysis.file_name.clone(),
            track_name: analysis.track_name.clone(),
            points: analysis.summary.points,
            distance_km: analysis.summary.distance_km,
            duration_min: analysis.summary.duration_s / 60.0,
            average_speed_kmh: analysis.summary.average_speed_kmh,
            samples_with_power: analysis.summary.samples_with_power,
            optimal_chainring: analysis.optimal.as_ref().map(|s| s.chainring),
            best_score: analysis.optimal.as_ref().map(|s| s.score),
            preferred_percent: analysis.optimal.as_ref().map(|s| s.fraction_preferred * 100.0),
            status: "SUCCESS".to_string(),
        }
    }

    fn failed(file_name: String, error: &TrackError) -> Self {
        RideResult {
            file_name,
            track_name: "ERROR".to_string(),
            points: 0,
            distance_km: 0.0,
            duration_min: 0.0,
            average_speed_kmh: 0.0,
            samples_with_power: 0,
            optimal_chainring: None,
            best_score: None,
            preferred_percent: None,
            status: format!("ERROR: {}", error),
        }
    }

    fn is_success(&self) -> bool {
        self.status == "SUCCESS"
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Analyze one GPX file.
pub fn process_single_ride(path: &Path, drivetrain: &Drivetrain) -> Result<RideAnalysis, TrackError> {
    let track = read_track(path)?;
    let samples = enrich_samples(&track.samples);
    let summary = summarize(&samples);
    let scores = score_chainrings(&samples, drivetrain);
    let optimal = best_score(&scores).cloned();

    let file_name = file_name_of(path);
    info!(
        file = %file_name,
        points = summary.points,
        optimal = ?optimal.as_ref().map(|s| s.chainring),
        "ride analyzed"
    );

    Ok(RideAnalysis {
        track_name: track.name.unwrap_or_else(|| file_name.clone()),
        file_name,
        summary,
        scores,
        optimal,
    })
}

/// Analyze one file and write its per-chainring scores next to the output.
pub fn process_ride_file(
    path: &Path,
    output_folder: &Path,
    drivetrain: &Drivetrain,
) -> Result<RideAnalysis, Box<dyn std::error::Error>> {
    fs::create_dir_all(output_folder)?;

    let analysis = process_single_ride(path, drivetrain)?;
    let csv_path = scores_csv_path(output_folder, path);
    save_chainring_scores(&analysis.scores, &csv_path)?;

    print_ride_report(&analysis);
    println!("📁 Chainring scores saved to: {}", csv_path.display());

    Ok(analysis)
}

/// Analyze every GPX file under `input_folder`.
pub fn process_ride_folder(
    input_folder: &Path,
    output_folder: &Path,
    drivetrain: &Drivetrain,
) -> Result<Vec<RideResult>, Box<dyn std::error::Error>> {
    fs::create_dir_all(output_folder)?;
    println!("📁 Output folder: {}", output_folder.display());

    let files = collect_track_files(input_folder)?;
    println!("🔍 Found {} GPX files to process\n", files.len());

    let mut results = Vec::with_capacity(files.len());
    for (index, path) in files.iter().enumerate() {
        let file_name = file_name_of(path);
        println!("🔄 Processing {}/{}: {}", index + 1, files.len(), file_name);

        match process_single_ride(path, drivetrain) {
            Ok(analysis) => {
                save_chainring_scores(&analysis.scores, &scores_csv_path(output_folder, path))?;
                match analysis.optimal.as_ref() {
                    Some(best) => println!("   ✅ Optimal chainring: {}T", best.chainring),
                    None => println!("   ⚠️  No chainring could be scored"),
                }
                results.push(RideResult::from_analysis(&analysis));
            }
            Err(e) => {
                println!("   ❌ Error: {}", e);
                results.push(RideResult::failed(file_name, &e));
            }
        }
    }

    let csv_path = output_folder.join("ride_results.csv");
    save_results_to_csv(&results, &csv_path)?;
    print_processing_summary(&results);
    println!("📁 Results saved to: {}", csv_path.display());

    Ok(results)
}

fn scores_csv_path(output_folder: &Path, ride_path: &Path) -> PathBuf {
    let stem = ride_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "ride".to_string());
    output_folder.join(format!("{}_chainrings.csv", clean_filename(&stem)))
}

fn clean_filename(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

pub fn save_chainring_scores(scores: &[ChainringScore], csv_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut wtr = Writer::from_path(csv_path)?;
    for score in scores {
        wtr.serialize(score)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn save_results_to_csv(results: &[RideResult], csv_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut wtr = Writer::from_path(csv_path)?;
    for result in results {
        wtr.serialize(result)?;
    }
    wtr.flush()?;
    Ok(())
}

fn print_ride_report(analysis: &RideAnalysis) {
    let summary = &analysis.summary;

    println!("\n🚴 RIDE: {}", analysis.track_name);
    println!("====================");
    println!("• Points: {} ({} with power)", summary.points, summary.samples_with_power);
    println!("• Distance: {:.2} km", summary.distance_km);
    println!("• Duration: {:.1} min", summary.duration_s / 60.0);
    println!("• Average speed: {:.1} km/h (max {:.1})", summary.average_speed_kmh, summary.max_speed_kmh);

    println!("\n⚙️  Chainring scores:");
    let winner = analysis.optimal_position();
    for (index, score) in analysis.scores.iter().enumerate() {
        let marker = if winner == Some(index) { "🏆" } else { "  " };
        println!(
            "  {} {:>2}T  loss {:>9.2} W  preferred {:>5.1}%  score {:>9.3}",
            marker,
            score.chainring,
            score.total_power_loss_w,
            score.fraction_preferred * 100.0,
            score.score
        );
    }

    match analysis.optimal.as_ref() {
        Some(best) => println!("\n🎯 Optimal chainring: {}T", best.chainring),
        None => println!("\n⚠️  No chainring could be scored"),
    }
}

fn print_processing_summary(results: &[RideResult]) {
    let successful: Vec<&RideResult> = results.iter().filter(|r| r.is_success()).collect();
    let error_count = results.len() - successful.len();

    println!("\n🎯 PROCESSING SUMMARY");
    println!("====================");
    println!("Total files processed: {}", results.len());
    println!("✅ Successful: {}", successful.len());
    println!("❌ Errors: {}", error_count);

    let chosen: Vec<u32> = successful.iter().filter_map(|r| r.optimal_chainring).collect();
    if chosen.is_empty() {
        return;
    }

    let total_km: f64 = successful.iter().map(|r| r.distance_km).sum();
    let min = chosen.iter().min().copied().unwrap_or_default();
    let max = chosen.iter().max().copied().unwrap_or_default();
    println!("📏 Distance covered: {:.1} km", total_km);
    println!("⚙️  Optimal chainrings ranged {}T - {}T across rides", min, max);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DrivetrainConfig;

    /// Every point ridden at exactly 34/13 at 90 rpm on a 2171 mm tire.
    fn steady_ride_gpx(points: usize) -> String {
        let speed_ms = 34.0 / 13.0 * 90.0 * 2171.0 / 60_000.0;
        let dlat = speed_ms / 111_194.93; // one second apart
        let mut trkpts = String::new();
        for i in 0..points {
            trkpts.push_str(&format!(
                "<trkpt lat=\"{:.9}\" lon=\"7.0\"><ele>100</ele><time>2024-05-01T08:{:02}:{:02}Z</time>\
                 <extensions><power>250</power><gpxtpx:TrackPointExtension><gpxtpx:cad>90</gpxtpx:cad>\
                 </gpxtpx:TrackPointExtension></extensions></trkpt>\n",
                45.0 + dlat * i as f64,
                i / 60,
                i % 60
            ));
        }
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <gpx version=\"1.1\" creator=\"test\" xmlns=\"http://www.topografix.com/GPX/1/1\" \
             xmlns:gpxtpx=\"http://www.garmin.com/xmlschemas/TrackPointExtension/v1\">\
             <trk><name>Steady</name><trkseg>\n{}</trkseg></trk></gpx>\n",
            trkpts
        )
    }

    fn two_ring_drivetrain() -> Drivetrain {
        DrivetrainConfig {
            candidate_chainrings: vec![34, 50],
            ..DrivetrainConfig::default()
        }
        .build()
        .unwrap()
    }

    #[test]
    fn test_single_ride_prefers_small_ring() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("steady.gpx");
        fs::write(&path, steady_ride_gpx(30)).unwrap();

        let analysis = process_single_ride(&path, &two_ring_drivetrain()).unwrap();
        assert_eq!(analysis.track_name, "Steady");
        assert_eq!(analysis.summary.points, 30);
        assert_eq!(analysis.scores.len(), 2);
        assert_eq!(analysis.optimal.as_ref().map(|s| s.chainring), Some(34));
        // first point has no speed, so zero cadence-ratio match there
        assert_eq!(analysis.scores[0].preferred_gear_count, 29);
    }

    #[test]
    fn test_folder_mode_records_failures() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        fs::write(input.path().join("good.gpx"), steady_ride_gpx(10)).unwrap();
        fs::write(input.path().join("broken.gpx"), "this is not xml").unwrap();

        let results = process_ride_folder(input.path(), output.path(), &two_ring_drivetrain()).unwrap();
        assert_eq!(results.len(), 2);

        let broken = results.iter().find(|r| r.file_name == "broken.gpx").unwrap();
        assert!(broken.status.starts_with("ERROR"));
        let good = results.iter().find(|r| r.file_name == "good.gpx").unwrap();
        assert!(good.is_success());
        assert_eq!(good.optimal_chainring, Some(34));

        assert!(output.path().join("ride_results.csv").exists());
        assert!(output.path().join("good_chainrings.csv").exists());
    }

    #[test]
    fn test_scores_csv_has_one_row_per_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let scores = vec![
            ChainringScore {
                chainring: 34,
                total_power_loss_w: 10.0,
                preferred_gear_count: 3,
                scored_samples: 4,
                total_samples: 5,
                fraction_preferred: 0.6,
                score: 9.4,
            },
            ChainringScore {
                chainring: 50,
                total_power_loss_w: 12.0,
                preferred_gear_count: 0,
                scored_samples: 4,
                total_samples: 5,
                fraction_preferred: 0.0,
                score: 12.0,
            },
        ];
        let path = dir.path().join("scores.csv");
        save_chainring_scores(&scores, &path).unwrap();

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let headers = rdr.headers().unwrap().clone();
        assert_eq!(headers.get(0), Some("chainring"));
        assert_eq!(rdr.records().count(), 2);
    }

    #[test]
    fn test_duplicate_candidate_has_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("steady.gpx");
        fs::write(&path, steady_ride_gpx(10)).unwrap();

        let drivetrain = DrivetrainConfig {
            candidate_chainrings: vec![50, 34, 34],
            ..DrivetrainConfig::default()
        }
        .build()
        .unwrap();

        let analysis = process_single_ride(&path, &drivetrain).unwrap();
        assert_eq!(analysis.scores[1], analysis.scores[2]);
        assert_eq!(analysis.optimal_position(), Some(1));
    }

    #[test]
    fn test_clean_filename() {
        assert_eq!(clean_filename("Col du Galibier (2024)"), "Col_du_Galibier__2024_");
    }
}
