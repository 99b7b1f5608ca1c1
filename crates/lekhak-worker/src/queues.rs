//! Queue plan: pop priority order and per-source dead-letter routing.

use crate::config::QueueMode;

/// One queue with its dead-letter list and source label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    /// Queue name jobs are popped from.
    pub queue: String,
    /// Dead-letter list for jobs popped from this queue.
    pub dlq: String,
    /// Stable source label used in metrics and dead-letter records.
    pub source: &'static str,
}

/// Ordered set of queue bindings; priority follows list order, realized by
/// a single blocking pop over the ordered queue names.
#[derive(Debug, Clone)]
pub struct QueuePlan {
    bindings: Vec<QueueBinding>,
    pop_order: Vec<String>,
}

impl QueuePlan {
    /// Derive the plan from the configured queue mode.
    #[must_use]
    pub fn from_mode(mode: &QueueMode) -> Self {
        let bindings = match mode {
            QueueMode::Single { queue, dlq } => vec![QueueBinding {
                queue: queue.clone(),
                dlq: dlq.clone(),
                source: "default",
            }],
            QueueMode::Both {
                local_queue,
                local_dlq,
                cloud_queue,
                cloud_dlq,
            } => vec![
                QueueBinding {
                    queue: local_queue.clone(),
                    dlq: local_dlq.clone(),
                    source: "local",
                },
                QueueBinding {
                    queue: cloud_queue.clone(),
                    dlq: cloud_dlq.clone(),
                    source: "cloud",
                },
            ],
            QueueMode::Partitioned {
                ocr_queue,
                ocr_dlq,
                transcription_queue,
                transcription_dlq,
            } => vec![
                QueueBinding {
                    queue: ocr_queue.clone(),
                    dlq: ocr_dlq.clone(),
                    source: "ocr",
                },
                QueueBinding {
                    queue: transcription_queue.clone(),
                    dlq: transcription_dlq.clone(),
                    source: "transcription",
                },
            ],
        };
        let pop_order = bindings.iter().map(|b| b.queue.clone()).collect();
        Self {
            bindings,
            pop_order,
        }
    }

    /// Queue names in pop priority order.
    #[must_use]
    pub fn pop_order(&self) -> &[String] {
        &self.pop_order
    }

    /// All bindings in priority order.
    #[must_use]
    pub fn bindings(&self) -> &[QueueBinding] {
        &self.bindings
    }

    /// Binding for the queue a job was popped from; falls back to the
    /// highest-priority binding for unknown names.
    #[must_use]
    pub fn binding_for(&self, queue: &str) -> &QueueBinding {
        self.bindings
            .iter()
            .find(|b| b.queue == queue)
            .unwrap_or(&self.bindings[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_mode_has_one_binding() {
        let plan = QueuePlan::from_mode(&QueueMode::Single {
            queue: "jobs".to_string(),
            dlq: "jobs:dlq".to_string(),
        });
        assert_eq!(plan.pop_order(), ["jobs".to_string()]);
        assert_eq!(plan.binding_for("jobs").dlq, "jobs:dlq");
        assert_eq!(plan.binding_for("jobs").source, "default");
    }

    #[test]
    fn both_mode_prioritizes_local() {
        let plan = QueuePlan::from_mode(&QueueMode::Both {
            local_queue: "local_jobs".to_string(),
            local_dlq: "local_jobs:dlq".to_string(),
            cloud_queue: "cloud_jobs".to_string(),
            cloud_dlq: "cloud_jobs:dlq".to_string(),
        });
        assert_eq!(
            plan.pop_order(),
            ["local_jobs".to_string(), "cloud_jobs".to_string()]
        );
        assert_eq!(plan.binding_for("cloud_jobs").source, "cloud");
        // Unknown queue names fall back to the highest-priority binding.
        assert_eq!(plan.binding_for("mystery").source, "local");
    }

    #[test]
    fn partitioned_mode_routes_per_type() {
        let plan = QueuePlan::from_mode(&QueueMode::Partitioned {
            ocr_queue: "ocr_jobs".to_string(),
            ocr_dlq: "ocr_jobs:dlq".to_string(),
            transcription_queue: "tr_jobs".to_string(),
            transcription_dlq: "tr_jobs:dlq".to_string(),
        });
        assert_eq!(plan.bindings().len(), 2);
        assert_eq!(plan.binding_for("tr_jobs").dlq, "tr_jobs:dlq");
    }
}
