/// Which pipeline a status message belongs to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Efficiency,
    Calibration,
}

#[derive(Debug, Clone, Default)]
pub struct WorkerStatus {
    pub progress: f32,
    pub group_index: usize,
    pub worker_id: usize,
    pub phase: Phase,
}

impl WorkerStatus {
    pub fn new(progress: f32, group_index: usize, worker_id: usize, phase: Phase) -> Self {
        Self {
            progress,
            group_index,
            worker_id,
            phase,
        }
    }
}
