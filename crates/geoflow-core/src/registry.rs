use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};

use crate::jobs::{AnalysisJob, Job, NotificationJob, PolygonAreaJob, ReportGenerationJob};
use crate::models::{CoreError, CoreErrorKind};

pub type JobFactory = fn() -> Box<dyn Job>;

#[derive(Clone, Copy)]
pub struct JobDescriptor {
    pub task_type: &'static str,
    pub display_name: &'static str,
    pub factory: JobFactory,
}

impl Debug for JobDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDescriptor")
            .field("task_type", &self.task_type)
            .field("display_name", &self.display_name)
            .finish()
    }
}

fn analysis_job() -> Box<dyn Job> {
    Box::new(AnalysisJob)
}

fn notification_job() -> Box<dyn Job> {
    Box::new(NotificationJob)
}

fn polygon_area_job() -> Box<dyn Job> {
    Box::new(PolygonAreaJob)
}

fn report_generation_job() -> Box<dyn Job> {
    Box::new(ReportGenerationJob)
}

const BUILTIN_JOBS: [JobDescriptor; 4] = [
    JobDescriptor {
        task_type: "analysis",
        display_name: "GeoJSON analysis",
        factory: analysis_job,
    },
    JobDescriptor {
        task_type: "notification",
        display_name: "Client notification",
        factory: notification_job,
    },
    JobDescriptor {
        task_type: "polygon_area",
        display_name: "Polygon area",
        factory: polygon_area_job,
    },
    JobDescriptor {
        task_type: crate::jobs::report_generation::REPORT_GENERATION,
        display_name: "Report generation",
        factory: report_generation_job,
    },
];

pub fn builtin_jobs() -> &'static [JobDescriptor] {
    &BUILTIN_JOBS
}

pub fn builtin_job(task_type: &str) -> Option<&'static JobDescriptor> {
    BUILTIN_JOBS
        .iter()
        .find(|descriptor| descriptor.task_type == task_type)
}

/// Immutable table from task type to job factory, built once at startup.
#[derive(Clone, Debug)]
pub struct JobRegistry {
    jobs: BTreeMap<&'static str, JobDescriptor>,
}

impl JobRegistry {
    pub fn builtin() -> Self {
        Self {
            jobs: BUILTIN_JOBS
                .iter()
                .map(|descriptor| (descriptor.task_type, *descriptor))
                .collect(),
        }
    }

    pub fn with_jobs(jobs: impl IntoIterator<Item = JobDescriptor>) -> Result<Self, CoreError> {
        let mut mapped = BTreeMap::new();
        for descriptor in jobs {
            if mapped.insert(descriptor.task_type, descriptor).is_some() {
                return Err(CoreError::new(
                    CoreErrorKind::InvalidInput,
                    format!(
                        "duplicate job registration for task type '{}'",
                        descriptor.task_type
                    ),
                )
                .task_type(descriptor.task_type));
            }
        }

        Ok(Self { jobs: mapped })
    }

    pub fn resolve(&self, task_type: &str) -> Result<Box<dyn Job>, CoreError> {
        let descriptor = self.jobs.get(task_type).ok_or_else(|| {
            CoreError::new(
                CoreErrorKind::UnknownTaskType,
                format!("no job is registered for task type '{task_type}'"),
            )
            .task_type(task_type)
        })?;
        Ok((descriptor.factory)())
    }

    pub fn contains(&self, task_type: &str) -> bool {
        self.jobs.contains_key(task_type)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &JobDescriptor> {
        self.jobs.values()
    }

    pub fn task_types(&self) -> Vec<&'static str> {
        self.jobs.keys().copied().collect()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
