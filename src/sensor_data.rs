//! # Sensor data
//!
//! One observation session as delivered by the detection pipeline: the
//! station that recorded it, the event start time, the frame bounds, the
//! detected star dots and the meteor track samples. Pixel coordinates and
//! brightnesses arrive already extracted; no image processing happens here.
//!
//! The on-disk form is a YAML sighting record; [`SensorData::from_yaml`]
//! parses it wholesale and rejects malformed records before any state is
//! built.

use hifitime::Epoch;
use serde::{Deserialize, Serialize};

use crate::constants::{Magnitude, Pixel};
use crate::mask::ValidMask;
use crate::photometry::LogCalibration;
use crate::projection::BorovickaProjection;
use crate::skyfit_errors::SkyfitError;
use crate::spherical::AltAz;
use crate::station::Station;
use crate::time::parse_event_time;

/// One detected star dot on the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dot {
    pub x: Pixel,
    pub y: Pixel,
    /// Instrumental brightness (summed pixel intensity).
    pub intensity: f64,
}

/// One meteor track sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackSample {
    /// Video frame index within the clip.
    pub frame: u32,
    pub x: Pixel,
    pub y: Pixel,
    pub intensity: f64,
}

/// Pixel bounds of the sensor frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameRect {
    pub xmin: Pixel,
    pub ymin: Pixel,
    pub xmax: Pixel,
    pub ymax: Pixel,
}

/// The detected dots with their validity mask.
#[derive(Debug, Clone)]
pub struct DotCollection {
    dots: Vec<Dot>,
    mask: ValidMask,
}

impl DotCollection {
    pub fn new(dots: Vec<Dot>) -> Self {
        let mask = ValidMask::all_valid(dots.len());
        DotCollection { dots, mask }
    }

    pub fn count(&self) -> usize {
        self.dots.len()
    }

    pub fn count_valid(&self) -> usize {
        self.mask.count_valid()
    }

    pub fn is_valid(&self, index: usize) -> bool {
        self.mask.is_valid(index)
    }

    pub fn dots(&self) -> &[Dot] {
        &self.dots
    }

    pub fn mask(&self) -> &ValidMask {
        &self.mask
    }

    /// Invalidate every dot whose flag is set; cumulative.
    pub fn mask_where(&mut self, invalidate: &[bool]) -> Result<(), SkyfitError> {
        self.mask.combine(invalidate)
    }

    pub fn reset_mask(&mut self) {
        self.mask.reset();
    }

    /// Permanently discard invalid dots, renumbering the survivors.
    pub fn cull(&mut self) {
        let keep = self.mask.valid_indices();
        self.dots = keep.iter().map(|&i| self.dots[i]).collect();
        self.mask = ValidMask::all_valid(self.dots.len());
    }

    /// Project the dots onto the sky under a trial projection.
    ///
    /// Arguments
    /// ---------
    /// * `projection`: the distortion model to apply.
    /// * `masked`: when true, only valid dots (in order); when false, all.
    pub fn project(&self, projection: &BorovickaProjection, masked: bool) -> Vec<AltAz> {
        self.dots
            .iter()
            .enumerate()
            .filter(|(i, _)| !masked || self.mask.is_valid(*i))
            .map(|(_, d)| projection.project(d.x, d.y))
            .collect()
    }

    /// Calibrated instrumental magnitudes of the dots.
    pub fn magnitudes(&self, calibration: &LogCalibration, masked: bool) -> Vec<Magnitude> {
        self.dots
            .iter()
            .enumerate()
            .filter(|(i, _)| !masked || self.mask.is_valid(*i))
            .map(|(_, d)| calibration.magnitude(d.intensity))
            .collect()
    }
}

/// The meteor track: an ordered sequence of frame samples.
///
/// Track samples are never masked; the correction pipeline reports every
/// sample it was given.
#[derive(Debug, Clone)]
pub struct MeteorTrack {
    samples: Vec<TrackSample>,
}

impl MeteorTrack {
    pub fn new(samples: Vec<TrackSample>) -> Self {
        MeteorTrack { samples }
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }

    pub fn samples(&self) -> &[TrackSample] {
        &self.samples
    }

    /// Project every track sample onto the sky.
    pub fn project(&self, projection: &BorovickaProjection) -> Vec<AltAz> {
        self.samples
            .iter()
            .map(|s| projection.project(s.x, s.y))
            .collect()
    }
}

/// One observation session.
#[derive(Debug, Clone)]
pub struct SensorData {
    /// Identifier of the recording station.
    pub station: String,
    /// Event start time.
    pub time: Epoch,
    /// Sensor frame bounds.
    pub rect: FrameRect,
    /// Detected star dots.
    pub dots: DotCollection,
    /// Meteor track.
    pub meteor: MeteorTrack,
}

/// On-disk form of a sighting record.
#[derive(Debug, Serialize, Deserialize)]
struct SightingRecord {
    station: String,
    latitude: f64,
    longitude: f64,
    altitude: f64,
    event_start_time: String,
    frame: FrameRect,
    dots: Vec<Dot>,
    meteor: Vec<TrackSample>,
}

impl SensorData {
    /// Parse a YAML sighting record.
    ///
    /// Return
    /// ------
    /// * The session data together with the [`Station`] built from the
    ///   record's geodetic fields, or an error if any required field is
    ///   missing or the timestamp is malformed. Nothing is built on error.
    pub fn from_yaml(text: &str) -> Result<(SensorData, Station), SkyfitError> {
        let record: SightingRecord = serde_yml::from_str(text)?;
        let time = parse_event_time(&record.event_start_time)?;
        if record.frame.xmax <= record.frame.xmin || record.frame.ymax <= record.frame.ymin {
            return Err(SkyfitError::MalformedSighting(format!(
                "empty frame rectangle: {:?}",
                record.frame
            )));
        }

        let station = Station::new(
            &record.station,
            record.latitude,
            record.longitude,
            record.altitude,
        );
        let data = SensorData {
            station: record.station,
            time,
            rect: record.frame,
            dots: DotCollection::new(record.dots),
            meteor: MeteorTrack::new(record.meteor),
        };
        Ok((data, station))
    }

    /// Parse a sighting record from a file on disk.
    pub fn load(path: &str) -> Result<(SensorData, Station), SkyfitError> {
        Self::from_yaml(&std::fs::read_to_string(path)?)
    }
}
