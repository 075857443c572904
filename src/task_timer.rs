use std::time::Instant;

/// Logs how long a pipeline stage took.
pub struct TaskTimer {
    start_time: Instant,
    task_name: String,
}

impl TaskTimer {
    pub fn new(task_name: impl AsRef<str>) -> Self {
        log::debug!("Task: {} started", task_name.as_ref());
        Self {
            start_time: Instant::now(),
            task_name: task_name.as_ref().to_string(),
        }
    }

    pub fn stop(&self) {
        log::debug!(
            "Task: {} finished in {:.1}ms",
            self.task_name,
            self.start_time.elapsed().as_secs_f64() * 1000.0
        );
    }
}
