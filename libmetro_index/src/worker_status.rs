/// What a worker is currently doing, shown as the bar color
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BarColor {
    /// Indexing ASCII logs
    #[default]
    CYAN,
    /// Composing TDC events
    MAGENTA,
    /// A channel failed and was skipped
    RED,
    /// Run finished
    GREEN,
}

impl BarColor {
    pub fn activity(&self) -> &'static str {
        match self {
            Self::CYAN => "Indexing",
            Self::MAGENTA => "Composing",
            Self::RED => "Failed",
            Self::GREEN => "Done",
        }
    }
}

/// Progress message sent from a worker thread to the UI
#[derive(Debug, Clone, Default)]
pub struct WorkerStatus {
    pub progress: f32,
    pub run_number: String,
    pub worker_id: usize,
    pub color: BarColor,
}

impl WorkerStatus {
    pub fn new(progress: f32, run_number: &str, worker_id: usize, color: BarColor) -> Self {
        Self {
            progress: progress.clamp(0.0, 1.0),
            run_number: run_number.to_string(),
            worker_id,
            color,
        }
    }
}
