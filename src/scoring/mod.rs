pub mod cvss;

pub use cvss::{base_score, score_from_vector, CvssMetrics, Severity};
