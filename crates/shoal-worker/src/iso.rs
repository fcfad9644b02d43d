use std::path::{Path, PathBuf};
use std::process::Command;

use shoal_domain::atomic::write_atomic;
use shoal_domain::Job;

use crate::error::WorkerError;

/// Packages a job's task-ISO staging directory into the final image
/// (spec.md §4.10 step c). The default implementation shells out to
/// `genisoimage`, the same "pluggable external-tool invocation" shape the
/// partition planner uses for `sgdisk`/`mkfs.*`, just run directly instead
/// of emitted as a command line for a caller to run.
pub trait IsoBuilder: Send + Sync {
    fn build(&self, staging_dir: &Path, output_path: &Path) -> Result<(), WorkerError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GenIsoImageBuilder;

impl IsoBuilder for GenIsoImageBuilder {
    fn build(&self, staging_dir: &Path, output_path: &Path) -> Result<(), WorkerError> {
        let status = Command::new("genisoimage")
            .arg("-quiet")
            .arg("-J")
            .arg("-R")
            .arg("-o")
            .arg(output_path)
            .arg(staging_dir)
            .status()?;
        if !status.success() {
            return Err(WorkerError::Internal(format!("genisoimage exited with {status}")));
        }
        Ok(())
    }
}

/// Flattens a payload key into a safe filename component — recipe keys are
/// schema-validated but a stray `/` shouldn't escape the payload directory.
fn sanitize_filename(key: &str) -> String {
    key.replace(['/', '\\'], "_")
}

/// Builds the staging tree (`recipe.json`, `recipe.schema.json`,
/// `payload/<key>`) for `job` and hands it to `builder`. Returns the final
/// `task.iso` path.
pub fn build_task_iso(
    builder: &dyn IsoBuilder,
    task_root: &Path,
    job: &Job,
) -> Result<PathBuf, WorkerError> {
    let job_dir = task_root.join(job.id.to_string());
    let staging = job_dir.join("staging");
    std::fs::create_dir_all(&staging)?;

    write_atomic(&staging.join("recipe.json"), &serde_json::to_vec_pretty(&job.recipe)?)?;
    write_atomic(&staging.join("recipe.schema.json"), shoal_config::RECIPE_SCHEMA_JSON.as_bytes())?;

    let payload_dir = staging.join("payload");
    std::fs::create_dir_all(&payload_dir)?;
    for (name, field) in job.recipe.payload_files() {
        let value = field.resolve()?;
        write_atomic(&payload_dir.join(sanitize_filename(name)), value.as_bytes())?;
    }

    let output = job_dir.join("task.iso");
    builder.build(&staging, &output)?;
    Ok(output)
}

#[cfg(test)]
pub mod testing {
    use super::*;

    /// Records the staging tree it was handed without invoking any external
    /// tool — worker tests run without `genisoimage` on `PATH`.
    #[derive(Debug, Default)]
    pub struct FakeIsoBuilder;

    impl IsoBuilder for FakeIsoBuilder {
        fn build(&self, staging_dir: &Path, output_path: &Path) -> Result<(), WorkerError> {
            let mut manifest = Vec::new();
            for entry in walk(staging_dir)? {
                manifest.push(entry.strip_prefix(staging_dir).unwrap().to_string_lossy().to_string());
            }
            manifest.sort();
            write_atomic(output_path, manifest.join("\n").as_bytes())?;
            Ok(())
        }
    }

    fn walk(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                out.extend(walk(&path)?);
            } else {
                out.push(path);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeIsoBuilder;
    use super::*;
    use shoal_domain::{PayloadField, Recipe};

    fn sample_job() -> Job {
        let mut recipe = Recipe::minimal("install-linux.target", "/dev/sda");
        recipe.user_data = Some(PayloadField::Inline("#cloud-config\n".to_string()));
        Job::new_queued("SER1".to_string(), recipe, "http://media/maintenance.iso".to_string())
    }

    #[test]
    fn builds_staging_tree_and_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let job = sample_job();
        let output = build_task_iso(&FakeIsoBuilder, dir.path(), &job).unwrap();

        assert!(output.ends_with("task.iso"));
        assert!(output.exists());

        let job_dir = dir.path().join(job.id.to_string());
        assert!(job_dir.join("staging/recipe.json").exists());
        assert!(job_dir.join("staging/recipe.schema.json").exists());
        assert!(job_dir.join("staging/payload/user-data").exists());
        let payload = std::fs::read_to_string(job_dir.join("staging/payload/user-data")).unwrap();
        assert_eq!(payload, "#cloud-config\n");
    }

    #[test]
    fn rejects_unresolved_payload_field() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = sample_job();
        job.recipe.unattend_xml = Some(PayloadField::Url { url: "http://x/y".to_string() });
        assert!(build_task_iso(&FakeIsoBuilder, dir.path(), &job).is_err());
    }
}
