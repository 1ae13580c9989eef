pub mod grading;

pub use grading::{GradingError, GradingReport, GradingService, SheetUpload};
