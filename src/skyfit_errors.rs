use thiserror::Error;

/// Error type shared by every fallible operation in the crate.
///
/// Pure geometry and projection functions are infallible; the variants below
/// cover the enforcement points described in the matcher, the smoother and
/// the input readers. Non-convergence of the calibration optimizer is *not*
/// an error: see [`FitOutcome`](crate::optimizer::FitOutcome).
#[derive(Error, Debug)]
pub enum SkyfitError {
    #[error("correspondence mismatch: {catalogue} valid catalogue stars vs {dots} valid sensor dots")]
    CorrespondenceMismatch { catalogue: usize, dots: usize },

    #[error("ambiguous pairing: catalogue star {star} is the nearest neighbour of more than one sensor dot")]
    AmbiguousPairing { star: usize },

    #[error("all kernel weights vanished for query point ({x:.4}, {y:.4})")]
    DegenerateSmootherQuery { x: f64, y: f64 },

    #[error("kernel smoother constructed with no training data")]
    EmptySmootherTraining,

    #[error("kernel smoother training arrays differ in length: {points} points vs {residuals} residuals")]
    SmootherLengthMismatch { points: usize, residuals: usize },

    #[error("invalid smoother bandwidth: {0} (must be finite and positive)")]
    InvalidBandwidth(f64),

    #[error("smoother has not been fitted; update it from the current pairing first")]
    SmootherNotFitted,

    #[error("operation requires a paired correspondence")]
    NotPaired,

    #[error("mask length {got} does not match collection length {expected}")]
    MaskLengthMismatch { expected: usize, got: usize },

    #[error("unknown projection model: {0}")]
    UnknownProjectionModel(String),

    #[error("unknown station: {0}")]
    UnknownStation(String),

    #[error("malformed sighting record: {0}")]
    MalformedSighting(String),

    #[error("malformed timestamp: {0}")]
    MalformedTimestamp(String),

    #[error("unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("catalogue parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yml::Error),
}
