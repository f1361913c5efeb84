//! # Constants and type definitions for skyfit
//!
//! This module centralizes the **angular constants**, **conversion factors**, and **common type
//! definitions** used throughout the `skyfit` library.
//!
//! ## Overview
//!
//! - Angular constants (2π, π/2) and unit conversions (degrees ↔ radians)
//! - Core type aliases used across the crate
//!
//! These definitions are used by all main modules, including the projection model,
//! the correspondence engine, and the calibration optimizer.

// -------------------------------------------------------------------------------------------------
// Angular constants and unit conversions
// -------------------------------------------------------------------------------------------------

/// 2π, useful for trigonometric conversions
pub const DPI: f64 = 2. * std::f64::consts::PI;

/// π/2, the zenith distance of the horizon
pub const HALF_PI: f64 = std::f64::consts::FRAC_PI_2;

/// Degrees → radians
pub const RADEG: f64 = std::f64::consts::PI / 180.0;

/// Numerical epsilon used for floating-point comparisons
pub const EPS: f64 = 1e-12;

/// MJD epoch of J2000.0 (2000-01-01 12:00:00 TT)
pub const T2000: f64 = 51544.5;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in degrees
pub type Degree = f64;
/// Angle in radians
pub type Radian = f64;
/// Length in sensor pixels
pub type Pixel = f64;
/// Elevation in meters
pub type Meter = f64;
/// Stellar brightness in magnitudes
pub type Magnitude = f64;
/// Modified Julian Date (days)
pub type MJD = f64;
