//! Ride track reader
//!
//! Decodes a GPX ride into raw samples. Position, elevation and time come
//! from the `gpx` crate; power and cadence live in `<extensions>`, which the
//! `gpx` crate skips, so a streaming quick-xml pass over the same document
//! collects them. Both passes walk `<trkpt>` in document order.
//!
//! If the standard parse fails, a few data-preserving repairs are applied and
//! the parse is retried once. Coordinates and values are never altered.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::enrichment::RawSample;

#[derive(Debug, Error)]
pub enum TrackError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("GPX parse error: {0}")]
    Gpx(#[from] gpx::errors::GpxError),
    #[error("extension scan failed: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("gpx found {positions} track points but the extension scan found {extensions}")]
    PointCountMismatch { positions: usize, extensions: usize },
    #[error("no track points found")]
    NoTrackPoints,
    #[error("walking {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// A decoded ride.
#[derive(Debug, Clone)]
pub struct Track {
    pub name: Option<String>,
    pub samples: Vec<RawSample>,
}

/// Power and cadence read from one `<trkpt>`'s extensions.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct PointExtensions {
    power_w: f64,
    cadence_rpm: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ExtensionField {
    Power,
    Cadence,
}

impl ExtensionField {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"power" | b"PowerInWatts" => Some(ExtensionField::Power),
            b"cad" | b"cadence" => Some(ExtensionField::Cadence),
            _ => None,
        }
    }
}

/// Read a ride from disk, falling back to a repaired parse.
pub fn read_track(path: &Path) -> Result<Track, TrackError> {
    let content = fs::read_to_string(path).map_err(|source| TrackError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    match parse_track(&content) {
        Ok(track) => Ok(track),
        Err(TrackError::NoTrackPoints) => Err(TrackError::NoTrackPoints),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "standard parse failed, retrying with repairs");
            let repaired = repair_gpx(&content);
            parse_track(&repaired)
        }
    }
}

/// Decode GPX text into a track.
pub fn parse_track(content: &str) -> Result<Track, TrackError> {
    let gpx = gpx::read(Cursor::new(content.as_bytes()))?;
    let extensions = scan_extensions(content)?;

    let name = gpx.tracks.iter().find_map(|track| track.name.clone());
    // every segment of every track, flagging where a later segment begins
    let points: Vec<(&gpx::Waypoint, bool)> = gpx
        .tracks
        .iter()
        .flat_map(|track| track.segments.iter())
        .filter(|segment| !segment.points.is_empty())
        .enumerate()
        .flat_map(|(index, segment)| {
            segment
                .points
                .iter()
                .enumerate()
                .map(move |(i, point)| (point, index > 0 && i == 0))
        })
        .collect();

    if points.is_empty() {
        return Err(TrackError::NoTrackPoints);
    }
    if points.len() != extensions.len() {
        return Err(TrackError::PointCountMismatch {
            positions: points.len(),
            extensions: extensions.len(),
        });
    }

    let samples: Vec<RawSample> = points
        .iter()
        .zip(&extensions)
        .map(|((point, starts_segment), ext)| RawSample {
            latitude: point.point().y(),
            longitude: point.point().x(),
            elevation_m: point.elevation.unwrap_or(0.0),
            timestamp: point
                .time
                .as_ref()
                .and_then(|time| time.format().ok())
                .unwrap_or_default(),
            power_w: ext.power_w,
            cadence_rpm: ext.cadence_rpm,
            starts_segment: *starts_segment,
        })
        .collect();

    debug!(points = samples.len(), "decoded track");
    Ok(Track { name, samples })
}

/// One entry per `<trkpt>`, in document order.
fn scan_extensions(content: &str) -> Result<Vec<PointExtensions>, TrackError> {
    let mut reader = Reader::from_str(content);
    reader.trim_text(true);

    let mut found = Vec::new();
    let mut current: Option<PointExtensions> = None;
    let mut field: Option<ExtensionField> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.local_name();
                if name.as_ref() == b"trkpt" {
                    current = Some(PointExtensions::default());
                } else if current.is_some() {
                    field = ExtensionField::from_local_name(name.as_ref());
                }
            }
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"trkpt" {
                    found.push(PointExtensions::default());
                }
            }
            Event::Text(text) => {
                if let (Some(point), Some(which)) = (current.as_mut(), field) {
                    let raw = text.unescape()?;
                    match raw.trim().parse::<f64>() {
                        Ok(value) => match which {
                            ExtensionField::Power => point.power_w = value,
                            ExtensionField::Cadence => point.cadence_rpm = value,
                        },
                        Err(_) => warn!(value = %raw, field = ?which, "ignoring unparseable extension value"),
                    }
                }
            }
            Event::End(e) => {
                if e.local_name().as_ref() == b"trkpt" {
                    if let Some(point) = current.take() {
                        found.push(point);
                    }
                }
                field = None;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(found)
}

/// Minimal repairs that never touch track data.
fn repair_gpx(content: &str) -> String {
    let mut repaired = strip_invalid_xml_chars(content);

    if !repaired.trim_start().starts_with("<?xml") {
        repaired = format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", repaired);
    }
    repaired = add_missing_version(&repaired);
    close_truncated_document(&repaired)
}

fn add_missing_version(content: &str) -> String {
    let Some(start) = content.find("<gpx") else {
        return content.to_string();
    };
    let Some(len) = content[start..].find('>') else {
        return content.to_string();
    };

    let tag = &content[start..start + len];
    if tag.contains("version=") {
        return content.to_string();
    }

    let mut repaired = String::with_capacity(content.len() + 16);
    repaired.push_str(&content[..start + 4]);
    repaired.push_str(" version=\"1.1\"");
    repaired.push_str(&content[start + 4..]);
    repaired
}

/// Close `trkseg`, `trk` and `gpx` if the file was cut off after a full point.
fn close_truncated_document(content: &str) -> String {
    let mut repaired = content.trim_end().to_string();
    if repaired.ends_with("</gpx>") || !repaired.contains("<gpx") {
        return repaired;
    }

    // drop a dangling partial point
    if let Some(last_open) = repaired.rfind("<trkpt") {
        let closed_after = repaired[last_open..].contains("</trkpt>") || repaired[last_open..].contains("/>");
        if !closed_after {
            repaired.truncate(last_open);
        }
    }

    let open_segments = repaired.matches("<trkseg>").count();
    let closed_segments = repaired.matches("</trkseg>").count();
    for _ in closed_segments..open_segments {
        repaired.push_str("\n</trkseg>");
    }

    let open_tracks = repaired.matches("<trk>").count();
    let closed_tracks = repaired.matches("</trk>").count();
    for _ in closed_tracks..open_tracks {
        repaired.push_str("\n</trk>");
    }

    repaired.push_str("\n</gpx>");
    repaired
}

fn strip_invalid_xml_chars(content: &str) -> String {
    content
        .chars()
        .filter(|&c| {
            matches!(c, '\t' | '\n' | '\r')
                || ('\u{20}'..='\u{D7FF}').contains(&c)
                || ('\u{E000}'..='\u{FFFD}').contains(&c)
                || c >= '\u{10000}'
        })
        .collect()
}

/// Every `.gpx` file under `folder`, sorted by path.
pub fn collect_track_files(folder: &Path) -> Result<Vec<PathBuf>, TrackError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder) {
        let entry = entry.map_err(|source| TrackError::Walk {
            path: folder.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_gpx = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| ext.eq_ignore_ascii_case("gpx"));
        if is_gpx {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}
