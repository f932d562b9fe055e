/// Running counters for one batch
#[derive(Debug, Clone, Default)]
pub struct ConversionStats {
    pub succeeded: u64,
    pub failed: u64,
    pub input_bytes: u64,
    pub output_bytes: u64,
    errors: Vec<ErrorRecord>,
}

#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub file_name: String,
    pub error_message: String,
}

impl ConversionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, input_size: u64, output_size: u64) {
        self.succeeded += 1;
        self.input_bytes += input_size;
        self.output_bytes += output_size;
    }

    pub fn record_error(&mut self, file_name: String, error: String) {
        self.failed += 1;
        self.errors.push(ErrorRecord {
            file_name,
            error_message: error,
        });
    }

    pub fn attempted(&self) -> u64 {
        self.succeeded + self.failed
    }

    pub fn bytes_saved(&self) -> u64 {
        self.input_bytes.saturating_sub(self.output_bytes)
    }

    /// Share of the input size removed by conversion, 0 when nothing was read
    pub fn percent_saved(&self) -> f64 {
        percent_saved(self.input_bytes, self.output_bytes)
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors
            .iter()
            .map(|e| format!("{}: {}", e.file_name, e.error_message))
            .collect()
    }
}

pub(crate) fn percent_saved(input_bytes: u64, output_bytes: u64) -> f64 {
    if input_bytes == 0 {
        return 0.0;
    }
    (input_bytes as f64 - output_bytes as f64) / input_bytes as f64 * 100.0
}
