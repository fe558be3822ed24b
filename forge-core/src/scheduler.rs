//! Scheduler (§4.G): the single-writer cooperative dispatch/poll loop.
//! Grounded on the teacher's tick-loop shape (`cloud-service/src/lib.rs`) and
//! on `original_source/app/services/scheduler.py` for the dispatch/poll split
//! and node-ranking tie-break.

use rand::rngs::OsRng;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use forge_compiler::staging::FileStore;
use forge_compiler::{compile, CompileInput};

use crate::model::{ExecutionStatus, Job, JobExecutionId, JobStatus, WorkerNode};
use crate::normalize::normalize_result;
use crate::progress::ProgressRegistry;
use crate::repo::job::JobRepo;
use crate::repo::job_execution::JobExecutionRepo;
use crate::repo::worker_node::WorkerNodeRepo;
use crate::repo::workflow::WorkflowRepo;
use crate::staging::{stage_uploaded_files, FileStoreMaskMerger};
use crate::worker_client::WorkerHttpClient;

pub struct SchedulerConfig {
    pub tick_interval: Duration,
    pub dispatch_batch_size: i64,
    pub poll_batch_size: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            dispatch_batch_size: 5,
            poll_batch_size: 10,
        }
    }
}

pub struct Scheduler {
    jobs: JobRepo,
    executions: JobExecutionRepo,
    nodes: WorkerNodeRepo,
    workflows: WorkflowRepo,
    worker_client: WorkerHttpClient,
    progress: Arc<ProgressRegistry>,
    file_store: Arc<dyn FileStore>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        jobs: JobRepo,
        executions: JobExecutionRepo,
        nodes: WorkerNodeRepo,
        workflows: WorkflowRepo,
        worker_client: WorkerHttpClient,
        progress: Arc<ProgressRegistry>,
        file_store: Arc<dyn FileStore>,
        config: SchedulerConfig,
    ) -> Self {
        Self { jobs, executions, nodes, workflows, worker_client, progress, file_store, config }
    }

    /// Runs forever on `config.tick_interval`. One member of the process's
    /// `tokio::task::JoinSet`.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                error!(error = %e, "scheduler tick failed");
            }
        }
    }

    pub async fn tick(&self) -> anyhow::Result<()> {
        self.dispatch_phase().await?;
        self.poll_phase().await?;
        Ok(())
    }

    /// §4.G step 1-3.
    async fn dispatch_phase(&self) -> anyhow::Result<()> {
        let queued = self.jobs.list_queued(self.config.dispatch_batch_size).await?;
        if queued.is_empty() {
            return Ok(());
        }

        for job in queued {
            let Some(node) = self.select_node().await? else {
                info!("no qualifying node, skipping dispatch this tick");
                break;
            };
            if let Err(e) = self.dispatch_one(&job, &node).await {
                warn!(job = %job.id, error = %e, "failed to dispatch job");
            }
        }
        Ok(())
    }

    /// §4.G step 2: among active nodes, rank by
    /// `(active_execution_count ASC, last_seen DESC)`, tie-break by priority
    /// then id (DESIGN.md Open Question decision). Nodes at `max_queue`
    /// capacity are excluded.
    async fn select_node(&self) -> anyhow::Result<Option<WorkerNode>> {
        let candidates = self.nodes.list_active().await?;
        let mut ranked = Vec::with_capacity(candidates.len());
        for node in candidates {
            let active = self.executions.count_active_for_node(node.id).await?;
            if active >= node.max_queue as i64 {
                continue;
            }
            ranked.push((active, node));
        }

        ranked.sort_by(|(a_count, a_node), (b_count, b_node)| {
            a_count
                .cmp(b_count)
                .then_with(|| b_node.last_seen.cmp(&a_node.last_seen))
                .then_with(|| a_node.priority.cmp(&b_node.priority))
                .then_with(|| a_node.id.cmp(&b_node.id))
        });

        Ok(ranked.into_iter().next().map(|(_, node)| node))
    }

    async fn dispatch_one(&self, job: &Job, node: &WorkerNode) -> anyhow::Result<()> {
        let execution = self.executions.create_running(job.id, node.id).await?;
        self.jobs.mark_running(job.id, &job.prepared_workflow.clone().unwrap_or(Value::Null)).await?;

        let workflow = self
            .workflows
            .get(job.workflow_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("workflow {} not found", job.workflow_id))?;

        let schema = match self.worker_client.object_info(&node.base_url).await {
            Ok(catalog) => Some(catalog),
            Err(e) => {
                warn!(node = %node.id, error = %e, "schema catalog unavailable, using catalog-free fallback");
                None
            }
        };

        let graph = match forge_compiler::Graph::parse(&workflow.ui_graph) {
            Ok(g) => g,
            Err(e) => {
                self.fail(job.id, execution.id, &e.to_string()).await?;
                return Ok(());
            }
        };

        let (text_inputs, param_inputs) = split_inputs(&workflow.spec, &job.inputs);

        let compile_input = CompileInput {
            graph: &graph,
            spec: &workflow.spec,
            schema: schema.as_ref(),
            text_inputs,
            param_inputs,
            uploaded_files: job.files.clone(),
            mode: job.mode.clone(),
            previous_seed: None,
        };

        let mut rng = OsRng;
        let merger = FileStoreMaskMerger::new(self.file_store.clone());
        let mut compiled = match compile(compile_input, &mut rng, &merger) {
            Ok(output) => output,
            Err(e) => {
                self.fail(job.id, execution.id, &e.to_string()).await?;
                return Ok(());
            }
        };

        if let Err(e) =
            stage_uploaded_files(&self.worker_client, &node.base_url, self.file_store.as_ref(), &mut compiled).await
        {
            self.fail(job.id, execution.id, &e.to_string()).await?;
            return Ok(());
        }

        let prompt_value = Value::Object(compiled.prompt.clone());
        self.jobs.mark_running(job.id, &prompt_value).await?;

        match self.worker_client.submit(&node.base_url, compiled.prompt, compiled.extra_pnginfo).await {
            Ok(prompt_id) => {
                self.executions.set_prompt_id(execution.id, &prompt_id).await?;
                self.progress.ensure_tracking(self.worker_client.clone(), node.clone(), prompt_id).await;
            }
            Err(e) => {
                self.fail(job.id, execution.id, &e.to_string()).await?;
            }
        }
        Ok(())
    }

    async fn fail(&self, job_id: crate::model::JobId, execution_id: JobExecutionId, message: &str) -> anyhow::Result<()> {
        self.executions.finalize(execution_id, ExecutionStatus::Error, Some(message)).await?;
        self.jobs.finalize(job_id, JobStatus::Error, None, Some(message)).await?;
        Ok(())
    }

    /// §4.G step 4.
    async fn poll_phase(&self) -> anyhow::Result<()> {
        let polling = self.executions.list_polling(self.config.poll_batch_size).await?;
        for execution in polling {
            let Some(prompt_id) = execution.prompt_id.clone() else { continue };
            let Some(node) = self.nodes.get(execution.node_id).await? else { continue };

            match self.worker_client.history(&node.base_url, &prompt_id).await {
                Ok(None) => {}
                Ok(Some(outputs)) => {
                    let result = normalize_result(&outputs);
                    self.executions.finalize(execution.id, ExecutionStatus::Done, None).await?;
                    let result_value = serde_json::to_value(&result).unwrap_or(Value::Null);
                    self.jobs.finalize(execution.job_id, JobStatus::Done, Some(&result_value), None).await?;
                }
                Err(e) => {
                    self.executions.finalize(execution.id, ExecutionStatus::Error, Some(&e.to_string())).await?;
                    self.jobs
                        .finalize(execution.job_id, JobStatus::Error, None, Some(&e.to_string()))
                        .await?;
                }
            }
        }
        Ok(())
    }
}

/// Splits the user-echoed `Job.inputs` map into the Compiler's
/// `text_inputs`/`param_inputs` shape, using the Workflow's own Spec to
/// decide which declared key belongs to which bucket.
fn split_inputs(spec: &forge_compiler::Spec, inputs: &Value) -> (HashMap<String, String>, HashMap<String, Value>) {
    let mut text_inputs = HashMap::new();
    let mut param_inputs = HashMap::new();
    let Some(obj) = inputs.as_object() else {
        return (text_inputs, param_inputs);
    };

    for text in &spec.inputs.text {
        if let Some(v) = obj.get(&text.key) {
            if let Some(s) = v.as_str() {
                text_inputs.insert(text.key.clone(), s.to_string());
            }
        }
    }
    for param in &spec.inputs.params {
        if let Some(v) = obj.get(&param.key) {
            param_inputs.insert(param.key.clone(), v.clone());
        }
    }
    (text_inputs, param_inputs)
}
