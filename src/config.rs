/// Tunable pipeline thresholds. Defaults preserve the behaviour the rest of
/// this crate is tested against; callers may override individual fields.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Fraction of sampled values that must parse as a candidate kind before a
    /// column is classified as that kind.
    pub type_threshold: f64,
    /// Maximum non-null values sampled per column during type inference.
    pub sample_rows: usize,
    /// Rows parsed per (encoding, delimiter) candidate during dialect sniffing.
    pub sniff_rows: usize,
    /// Fraction of null/empty fields above which a row is annotated as mostly
    /// empty on the document path.
    pub mostly_empty_threshold: f64,
    /// Absolute tolerance for cross-field arithmetic checks.
    pub arithmetic_tolerance: f64,
    /// Placeholder substituted for missing text during domain-rule cleaning.
    pub text_placeholder: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            type_threshold: 0.70,
            sample_rows: 100,
            sniff_rows: 5,
            mostly_empty_threshold: 0.80,
            arithmetic_tolerance: 1e-6,
            text_placeholder: "Unknown".to_string(),
        }
    }
}
