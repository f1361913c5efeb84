pub mod catalogue;
pub mod constants;
pub mod mask;
pub mod matcher;
pub mod optimizer;
pub mod photometry;
pub mod projection;
pub mod sensor_data;
pub mod skyfit_errors;
pub mod smoother;
pub mod spherical;
pub mod station;
pub mod time;

pub use catalogue::{Catalogue, Star};
pub use matcher::{CorrectedSample, Matcher, PairedMatcher, UnpairedMatcher};
pub use optimizer::{minimize, FitOutcome, FitParams};
pub use photometry::LogCalibration;
pub use projection::{BorovickaProjection, ProjectionParams};
pub use sensor_data::SensorData;
pub use skyfit_errors::SkyfitError;
pub use smoother::{Kernel, KernelSmoother};
pub use spherical::AltAz;
pub use station::Station;
