//! Executor that treats a local directory as the remote grid.
//!
//! Remote logical paths map under `grid_root`; replicas of a path on a named
//! resource live under `grid_root/.replicas/<resource>/`.

use crate::executor::error::{ExecutorError, ExecutorResult};
use crate::executor::types::{ExecutionRequest, FileProgressEvent, ProgressSink};
use crate::executor::TransferExecutor;
use crate::job::TransferKind;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::path::{Path, PathBuf};
use tokio::fs;

const REPLICA_DIR: &str = ".replicas";

pub struct LocalFsExecutor {
    grid_root: PathBuf,
}

/// Where one job reads from and writes to, both on disk and as reported paths.
struct TransferPlan {
    source_fs: PathBuf,
    source_logical: String,
    target_fs: PathBuf,
    target_logical: String,
}

struct Entry {
    source_logical: String,
    source_fs: PathBuf,
    relative: PathBuf,
    is_directory: bool,
}

impl LocalFsExecutor {
    pub fn new(grid_root: impl Into<PathBuf>) -> Self {
        Self {
            grid_root: grid_root.into(),
        }
    }

    pub fn grid_root(&self) -> &Path {
        &self.grid_root
    }

    /// On-disk location of a remote logical path
    pub fn remote_path(&self, logical: &str) -> PathBuf {
        self.grid_root.join(logical.trim_start_matches('/'))
    }

    /// On-disk location of a replica of `logical` on `resource`
    pub fn replica_path(&self, resource: &str, logical: &str) -> PathBuf {
        self.grid_root
            .join(REPLICA_DIR)
            .join(resource)
            .join(logical.trim_start_matches('/'))
    }

    fn plan(&self, request: &ExecutionRequest) -> ExecutorResult<TransferPlan> {
        let base = Path::new(&request.source_path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let plan = match request.kind {
            TransferKind::Put => {
                let target_logical = join_logical(&request.target_path, &base);
                TransferPlan {
                    source_fs: PathBuf::from(&request.source_path),
                    source_logical: request.source_path.clone(),
                    target_fs: self.remote_path(&target_logical),
                    target_logical,
                }
            }
            TransferKind::Get => {
                let target_fs = PathBuf::from(&request.target_path).join(&base);
                TransferPlan {
                    source_fs: self.remote_path(&request.source_path),
                    source_logical: request.source_path.clone(),
                    target_logical: target_fs.to_string_lossy().into_owned(),
                    target_fs,
                }
            }
            TransferKind::Replicate => {
                if request.resource.is_empty() {
                    return Err(ExecutorError::failed("replication needs a target resource"));
                }
                TransferPlan {
                    source_fs: self.remote_path(&request.source_path),
                    source_logical: request.source_path.clone(),
                    target_fs: self.replica_path(&request.resource, &request.source_path),
                    target_logical: format!("{}:{}", request.resource, request.source_path),
                }
            }
        };

        Ok(plan)
    }

    async fn run(&self, request: ExecutionRequest, progress: ProgressSink) -> ExecutorResult<()> {
        let plan = self.plan(&request)?;

        let entries = collect_entries(&plan).await.map_err(|e| ExecutorError::Failed {
            message: format!("cannot read source {}: {e}", plan.source_logical),
            trace: format!("{e:?}"),
        })?;

        tracing::debug!(
            "Job {} ({}): {} entries under {}",
            request.job_id,
            request.kind,
            entries.len(),
            plan.source_logical
        );

        for entry in entries {
            if request.control.is_cancel_requested() {
                return Err(ExecutorError::Cancelled);
            }
            if request.is_already_transferred(&entry.source_logical) {
                continue;
            }

            let target_fs = if entry.relative.as_os_str().is_empty() {
                plan.target_fs.clone()
            } else {
                plan.target_fs.join(&entry.relative)
            };
            let target_logical = join_logical(&plan.target_logical, &relative_str(&entry.relative));

            let outcome = if entry.is_directory {
                fs::create_dir_all(&target_fs).await
            } else {
                copy_file(&entry.source_fs, &target_fs).await
            };

            let event = match outcome {
                Ok(()) => FileProgressEvent::success(
                    entry.source_logical,
                    target_logical,
                    entry.is_directory,
                ),
                Err(e) => {
                    tracing::warn!("Job {}: {} failed: {}", request.job_id, entry.source_logical, e);
                    let mut event =
                        FileProgressEvent::failure(entry.source_logical, target_logical, e.to_string());
                    event.is_directory = entry.is_directory;
                    event
                }
            };

            if !progress.emit(event) {
                return Err(ExecutorError::failed("progress receiver went away"));
            }
        }

        Ok(())
    }
}

impl TransferExecutor for LocalFsExecutor {
    fn execute(
        &self,
        request: ExecutionRequest,
        progress: ProgressSink,
    ) -> BoxFuture<'_, ExecutorResult<()>> {
        self.run(request, progress).boxed()
    }
}

async fn copy_file(source: &Path, target: &Path) -> std::io::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::copy(source, target).await?;
    Ok(())
}

/// Every file and directory under the plan's source, in lexical order of the
/// reported source path. Checkpoints compare against that same order.
async fn collect_entries(plan: &TransferPlan) -> std::io::Result<Vec<Entry>> {
    let root = &plan.source_fs;
    let metadata = fs::metadata(root).await?;

    let mut entries = vec![Entry {
        source_logical: plan.source_logical.clone(),
        source_fs: root.clone(),
        relative: PathBuf::new(),
        is_directory: metadata.is_dir(),
    }];

    if metadata.is_dir() {
        let mut pending = vec![root.clone()];
        while let Some(dir) = pending.pop() {
            let mut read_dir = fs::read_dir(&dir).await?;
            while let Some(child) = read_dir.next_entry().await? {
                let path = child.path();
                let file_type = child.file_type().await?;
                if !file_type.is_dir() && !file_type.is_file() {
                    continue;
                }

                let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
                if file_type.is_dir() {
                    pending.push(path.clone());
                }
                entries.push(Entry {
                    source_logical: join_logical(&plan.source_logical, &relative_str(&relative)),
                    source_fs: path,
                    relative,
                    is_directory: file_type.is_dir(),
                });
            }
        }
    }

    entries.sort_by(|a, b| a.source_logical.cmp(&b.source_logical));
    Ok(entries)
}

fn relative_str(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn join_logical(root: &str, relative: &str) -> String {
    if relative.is_empty() {
        root.to_string()
    } else {
        format!("{}/{}", root.trim_end_matches('/'), relative)
    }
}
