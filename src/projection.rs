//! # All-sky distortion projection model
//!
//! The 12-parameter Borovička model maps sensor pixel coordinates onto the
//! horizontal sky frame. It is composed of three stages applied in a fixed
//! order:
//!
//! 1. [`AxisShifter`] — re-centers the pixel vector on the optical axis,
//!    removes the elliptical asymmetry of the image and rotates the plate
//!    position angle into the sky frame (`x0`, `y0`, `a0`, `A`, `F`);
//! 2. [`RadialTransform`] — rescales the distance from the optical axis into
//!    an apparent zenith distance, azimuth-preserving
//!    (`V`, `S`, `D`, `P`, `Q`);
//! 3. [`ZenithShifter`] — moves the projection center onto the true zenith,
//!    a correction that depends on the current co-altitude (`eps`, `E`).
//!
//! The model is a pure function of its parameters and input and holds no
//! mutable state; whenever a parameter changes, a new [`BorovickaProjection`]
//! is built from the updated [`ProjectionParams`]. All twelve parameters are
//! radians/pixels internally; the parameter *file* stores angular fields in
//! degrees and the conversion happens in the file record, at the boundary.

use serde::{Deserialize, Serialize};

use crate::constants::{EPS, Pixel, RADEG, Radian};
use crate::skyfit_errors::SkyfitError;
use crate::spherical::{AltAz, normalize_azimuth};

/// Name of the projection model as stored in parameter files.
const MODEL_NAME: &str = "Borovicka";

/// The immutable 12-tuple of projection parameters.
///
/// Angular fields (`a0`, `asymmetry_angle`, `eps`, `eps_azimuth`) are radians
/// here; they are converted from/to degrees when a parameter file is read or
/// written.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProjectionParams {
    /// Optical axis offset from the pixel origin.
    pub x0: Pixel,
    pub y0: Pixel,
    /// Rotation of the plate position angle into the sky frame.
    pub a0: Radian,
    /// Amplitude of the elliptical asymmetry of the image.
    pub asymmetry: f64,
    /// Direction of maximum asymmetry.
    pub asymmetry_angle: Radian,
    /// Linear radial scale (radians of zenith distance per pixel).
    pub linear: f64,
    /// Coefficient and rate of the exponential radial term.
    pub lin_coef: f64,
    pub lin_exp: f64,
    /// Coefficient and rate of the quadratic-exponential radial term.
    pub quad_coef: f64,
    pub quad_exp: f64,
    /// Angular distance between the projection center and the true zenith.
    pub eps: Radian,
    /// Azimuth towards which the projection center is shifted.
    pub eps_azimuth: Radian,
}

/// At-rest form of a parameter file: model name plus the twelve named values,
/// angular fields in degrees.
#[derive(Debug, Serialize, Deserialize)]
struct ProjectionFileRecord {
    proj: String,
    params: ParamRecord,
}

#[derive(Debug, Serialize, Deserialize)]
struct ParamRecord {
    x0: f64,
    y0: f64,
    a0: f64,
    #[serde(rename = "A")]
    asymmetry: f64,
    #[serde(rename = "F")]
    asymmetry_angle: f64,
    #[serde(rename = "V")]
    linear: f64,
    #[serde(rename = "S")]
    lin_coef: f64,
    #[serde(rename = "D")]
    lin_exp: f64,
    #[serde(rename = "P")]
    quad_coef: f64,
    #[serde(rename = "Q")]
    quad_exp: f64,
    eps: f64,
    #[serde(rename = "E")]
    eps_azimuth: f64,
}

impl ProjectionParams {
    /// Parameters of an identity-like projection: pixel radius read directly
    /// as zenith distance, no asymmetry, no zenith shift. Useful as an
    /// optimizer starting point and in tests.
    pub fn identity() -> Self {
        ProjectionParams {
            linear: 1.0,
            ..ProjectionParams::default()
        }
    }

    /// Read parameters from their YAML at-rest form.
    ///
    /// Arguments
    /// ---------
    /// * `text`: YAML document with a `proj` name and a `params` mapping,
    ///   angular fields in degrees.
    ///
    /// Return
    /// ------
    /// * The parameters in radians, or an error if the document is malformed
    ///   or names a different projection model.
    pub fn from_yaml(text: &str) -> Result<Self, SkyfitError> {
        let record: ProjectionFileRecord = serde_yml::from_str(text)?;
        if record.proj != MODEL_NAME {
            return Err(SkyfitError::UnknownProjectionModel(record.proj));
        }
        let p = record.params;
        Ok(ProjectionParams {
            x0: p.x0,
            y0: p.y0,
            a0: p.a0 * RADEG,
            asymmetry: p.asymmetry,
            asymmetry_angle: p.asymmetry_angle * RADEG,
            linear: p.linear,
            lin_coef: p.lin_coef,
            lin_exp: p.lin_exp,
            quad_coef: p.quad_coef,
            quad_exp: p.quad_exp,
            eps: p.eps * RADEG,
            eps_azimuth: p.eps_azimuth * RADEG,
        })
    }

    /// Serialize to the YAML at-rest form (angular fields in degrees).
    ///
    /// Round-trips losslessly with [`ProjectionParams::from_yaml`] up to the
    /// degree↔radian conversion.
    pub fn to_yaml(&self) -> Result<String, SkyfitError> {
        let record = ProjectionFileRecord {
            proj: MODEL_NAME.to_string(),
            params: ParamRecord {
                x0: self.x0,
                y0: self.y0,
                a0: self.a0 / RADEG,
                asymmetry: self.asymmetry,
                asymmetry_angle: self.asymmetry_angle / RADEG,
                linear: self.linear,
                lin_coef: self.lin_coef,
                lin_exp: self.lin_exp,
                quad_coef: self.quad_coef,
                quad_exp: self.quad_exp,
                eps: self.eps / RADEG,
                eps_azimuth: self.eps_azimuth / RADEG,
            },
        };
        Ok(serde_yml::to_string(&record)?)
    }

    /// Load parameters from a YAML file on disk.
    pub fn load(path: &str) -> Result<Self, SkyfitError> {
        Self::from_yaml(&std::fs::read_to_string(path)?)
    }

    /// Save parameters to a YAML file on disk.
    pub fn save(&self, path: &str) -> Result<(), SkyfitError> {
        Ok(std::fs::write(path, self.to_yaml()?)?)
    }

    /// Flatten into the optimizer's search-space order.
    pub fn to_array(&self) -> [f64; 12] {
        [
            self.x0,
            self.y0,
            self.a0,
            self.asymmetry,
            self.asymmetry_angle,
            self.linear,
            self.lin_coef,
            self.lin_exp,
            self.quad_coef,
            self.quad_exp,
            self.eps,
            self.eps_azimuth,
        ]
    }

    /// Rebuild from the optimizer's search-space order.
    pub fn from_array(values: &[f64; 12]) -> Self {
        ProjectionParams {
            x0: values[0],
            y0: values[1],
            a0: values[2],
            asymmetry: values[3],
            asymmetry_angle: values[4],
            linear: values[5],
            lin_coef: values[6],
            lin_exp: values[7],
            quad_coef: values[8],
            quad_exp: values[9],
            eps: values[10],
            eps_azimuth: values[11],
        }
    }
}

/// Stage 1: axis re-centering, asymmetry removal and rotation.
#[derive(Debug, Clone, Copy)]
pub struct AxisShifter {
    x0: Pixel,
    y0: Pixel,
    a0: Radian,
    asymmetry: f64,
    asymmetry_angle: Radian,
}

impl AxisShifter {
    /// Map pixel coordinates to polar coordinates about the optical axis.
    ///
    /// The plate position angle is measured compass-style, from the sensor
    /// +y axis towards +x, so that under an identity-like radial stage the
    /// sensor +y axis lands on azimuth 0 and +x on azimuth π/2.
    ///
    /// Return
    /// ------
    /// * `(r, b)`: corrected radial distance in pixels and position angle in
    ///   the sky frame.
    pub fn apply(&self, x: Pixel, y: Pixel) -> (f64, Radian) {
        let dx = x - self.x0;
        let dy = y - self.y0;
        let angle = dx.atan2(dy);
        let r = dx.hypot(dy) * (1.0 - self.asymmetry * (angle - self.asymmetry_angle).cos());
        (r, angle - self.a0)
    }
}

/// Stage 2: radial nonlinearity, azimuth-preserving.
#[derive(Debug, Clone, Copy)]
pub struct RadialTransform {
    linear: f64,
    lin_coef: f64,
    lin_exp: f64,
    quad_coef: f64,
    quad_exp: f64,
}

impl RadialTransform {
    /// Rescale a radial pixel distance into an apparent zenith distance.
    ///
    /// `u = V·r + S·(e^(D·r) − 1) + P·(e^(Q·r²) − 1)`
    pub fn apply(&self, r: f64) -> Radian {
        self.linear * r
            + self.lin_coef * ((self.lin_exp * r).exp() - 1.0)
            + self.quad_coef * ((self.quad_exp * r * r).exp() - 1.0)
    }
}

/// Stage 3: shift of the projection center onto the true zenith.
#[derive(Debug, Clone, Copy)]
pub struct ZenithShifter {
    eps: Radian,
    eps_azimuth: Radian,
}

impl ZenithShifter {
    /// Resolve the apparent polar coordinates `(u, b)` about the projection
    /// center into true altitude and azimuth.
    ///
    /// Solves the spherical triangle formed by the true zenith, the shifted
    /// projection center and the target. For `eps ≈ 0` the stage is an exact
    /// identity on `(u, b)`, and the azimuth degenerates to `eps_azimuth`
    /// when the target lands on the zenith itself.
    pub fn apply(&self, u: Radian, b: Radian) -> AltAz {
        if self.eps.abs() < EPS {
            return AltAz::new(crate::constants::HALF_PI - u, normalize_azimuth(b));
        }

        let cos_z = u.cos() * self.eps.cos()
            - u.sin() * self.eps.sin() * (b - self.eps_azimuth).cos();
        let z = cos_z.clamp(-1.0, 1.0).acos();
        let sin_z = z.sin();

        let az = if sin_z < EPS {
            self.eps_azimuth
        } else {
            let sin_da = (b - self.eps_azimuth).sin() * u.sin() / sin_z;
            let cos_da = (u.cos() - self.eps.cos() * cos_z) / (self.eps.sin() * sin_z);
            self.eps_azimuth + sin_da.atan2(cos_da)
        };

        AltAz::new(crate::constants::HALF_PI - z, normalize_azimuth(az))
    }
}

/// The composed pixel → sky projection.
///
/// Built wholesale from a [`ProjectionParams`]; never mutated in place.
#[derive(Debug, Clone, Copy)]
pub struct BorovickaProjection {
    params: ProjectionParams,
    axis: AxisShifter,
    radial: RadialTransform,
    zenith: ZenithShifter,
}

impl BorovickaProjection {
    pub fn new(params: ProjectionParams) -> Self {
        BorovickaProjection {
            params,
            axis: AxisShifter {
                x0: params.x0,
                y0: params.y0,
                a0: params.a0,
                asymmetry: params.asymmetry,
                asymmetry_angle: params.asymmetry_angle,
            },
            radial: RadialTransform {
                linear: params.linear,
                lin_coef: params.lin_coef,
                lin_exp: params.lin_exp,
                quad_coef: params.quad_coef,
                quad_exp: params.quad_exp,
            },
            zenith: ZenithShifter {
                eps: params.eps,
                eps_azimuth: params.eps_azimuth,
            },
        }
    }

    pub fn params(&self) -> &ProjectionParams {
        &self.params
    }

    /// Project sensor pixel coordinates onto the sky.
    ///
    /// The three stages are applied in their fixed order; each stage's
    /// output feeds the next.
    pub fn project(&self, x: Pixel, y: Pixel) -> AltAz {
        let (r, b) = self.axis.apply(x, y);
        let u = self.radial.apply(r);
        self.zenith.apply(u, b)
    }
}
