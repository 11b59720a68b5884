//! Tool registry and dispatcher.
//!
//! Every call runs the same sequence: existence, enabled flag, rate limit,
//! required parameters, invocation, stats. Any failure along the way comes
//! back as a `ToolOutcome` with `success = false`; nothing propagates.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use shihui_core::error::ToolError;
use shihui_core::event::{DomainEvent, EventBus};
use shihui_core::plan::Plan;
use shihui_core::tool::{Tool, ToolCategory, ToolMetadata, ToolOutcome, ToolParams};
use tracing::{debug, error, info, warn};

use crate::rate_limit::RateLimiter;

struct Entry {
    tool: Arc<dyn Tool>,
    metadata: ToolMetadata,
    enabled: AtomicBool,
}

impl Entry {
    fn snapshot(&self) -> ToolMetadata {
        let mut metadata = self.metadata.clone();
        metadata.enabled = self.enabled.load(Ordering::Relaxed);
        metadata
    }
}

/// Lifetime counters for one tool.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolStats {
    pub executions: u64,
    pub last_execution: Option<DateTime<Utc>>,
}

/// A registered tool plus its counters.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    #[serde(flatten)]
    pub metadata: ToolMetadata,
    pub execution_count: u64,
}

/// Status of a single tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolStatus {
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub execution_count: u64,
    pub last_execution: Option<DateTime<Utc>>,
    pub rate_limit: Option<u32>,
}

/// Registry-wide counters.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionStats {
    pub total_tools: usize,
    pub enabled_tools: usize,
    pub total_executions: u64,
    pub tool_stats: BTreeMap<String, ToolStats>,
}

/// Outcomes of a plan, one per distinct tool name, in plan order.
///
/// A tool named twice keeps its first position and its last outcome.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlanResults {
    outcomes: Vec<ToolOutcome>,
}

impl PlanResults {
    pub fn insert(&mut self, outcome: ToolOutcome) {
        match self.outcomes.iter_mut().find(|o| o.tool_name == outcome.tool_name) {
            Some(existing) => *existing = outcome,
            None => self.outcomes.push(outcome),
        }
    }

    pub fn get(&self, tool_name: &str) -> Option<&ToolOutcome> {
        self.outcomes.iter().find(|o| o.tool_name == tool_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolOutcome> {
        self.outcomes.iter()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.outcomes.iter().map(|o| o.tool_name.clone()).collect()
    }
}

impl IntoIterator for PlanResults {
    type Item = ToolOutcome;
    type IntoIter = std::vec::IntoIter<ToolOutcome>;

    fn into_iter(self) -> Self::IntoIter {
        self.outcomes.into_iter()
    }
}

/// Registry of tools with validated, rate-limited dispatch.
pub struct ToolRegistry {
    tools: BTreeMap<String, Entry>,
    limiter: RateLimiter,
    stats: Mutex<HashMap<String, ToolStats>>,
    event_bus: Option<Arc<EventBus>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
            limiter: RateLimiter::new(),
            stats: Mutex::new(HashMap::new()),
            event_bus: None,
        }
    }

    /// Publish a `ToolExecuted` event for every dispatched call.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Register a tool. Unnamed and duplicate tools are rejected.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let metadata = tool.metadata();
        let name = metadata.name.trim().to_string();
        if name.is_empty() {
            return Err(ToolError::InvalidRegistration("工具名称不能为空".into()));
        }
        if self.tools.contains_key(&name) {
            return Err(ToolError::InvalidRegistration(format!("工具 '{name}' 已注册")));
        }

        info!(tool = %name, category = metadata.category.as_str(), "Registered tool");
        self.tools.insert(
            name,
            Entry {
                tool,
                enabled: AtomicBool::new(metadata.enabled),
                metadata,
            },
        );
        Ok(())
    }

    /// Override a tool's per-minute limit (`None` removes it).
    pub fn set_rate_limit(&mut self, name: &str, limit: Option<u32>) -> Result<(), ToolError> {
        let entry = self
            .tools
            .get_mut(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        entry.metadata.rate_limit = limit;
        Ok(())
    }

    pub fn enable_tool(&self, name: &str) -> Result<(), ToolError> {
        self.toggle(name, true)
    }

    pub fn disable_tool(&self, name: &str) -> Result<(), ToolError> {
        self.toggle(name, false)
    }

    fn toggle(&self, name: &str, enabled: bool) -> Result<(), ToolError> {
        let entry = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        entry.enabled.store(enabled, Ordering::Relaxed);
        info!(tool = %name, enabled, "Tool toggled");
        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::ToolToggled {
                tool_name: name.to_string(),
                enabled,
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn metadata(&self, name: &str) -> Option<ToolMetadata> {
        self.tools.get(name).map(Entry::snapshot)
    }

    /// Names of enabled tools.
    pub fn available_tools(&self) -> Vec<String> {
        self.tools
            .iter()
            .filter(|(_, e)| e.enabled.load(Ordering::Relaxed))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Metadata of enabled tools, restricted to `allowed` when non-empty.
    pub fn enabled_metadata(&self, allowed: &BTreeSet<String>) -> Vec<ToolMetadata> {
        self.tools
            .iter()
            .filter(|(name, e)| {
                e.enabled.load(Ordering::Relaxed) && (allowed.is_empty() || allowed.contains(*name))
            })
            .map(|(_, e)| e.snapshot())
            .collect()
    }

    /// Enabled tools in a category.
    pub fn tools_by_category(&self, category: ToolCategory) -> Vec<String> {
        self.tools
            .iter()
            .filter(|(_, e)| e.metadata.category == category && e.enabled.load(Ordering::Relaxed))
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn stats_for(&self, name: &str) -> ToolStats {
        self.stats
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Every registered tool with its execution count.
    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|(name, e)| ToolInfo {
                metadata: e.snapshot(),
                execution_count: self.stats_for(name).executions,
            })
            .collect()
    }

    pub fn tool_status(&self, name: &str) -> Result<ToolStatus, ToolError> {
        let entry = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        let stats = self.stats_for(name);
        Ok(ToolStatus {
            name: name.to_string(),
            description: entry.metadata.description.clone(),
            enabled: entry.enabled.load(Ordering::Relaxed),
            execution_count: stats.executions,
            last_execution: stats.last_execution,
            rate_limit: entry.metadata.rate_limit,
        })
    }

    pub fn execution_stats(&self) -> ExecutionStats {
        let tool_stats: BTreeMap<String, ToolStats> = self
            .tools
            .keys()
            .map(|name| (name.clone(), self.stats_for(name)))
            .collect();
        ExecutionStats {
            total_tools: self.tools.len(),
            enabled_tools: self.available_tools().len(),
            total_executions: tool_stats.values().map(|s| s.executions).sum(),
            tool_stats,
        }
    }

    fn record_success(&self, name: &str) {
        let mut stats = self.stats.lock().unwrap_or_else(|p| p.into_inner());
        let entry = stats.entry(name.to_string()).or_default();
        entry.executions += 1;
        entry.last_execution = Some(Utc::now());
    }

    /// Execute one tool call. Never fails; errors are reported in the outcome.
    pub async fn execute(&self, tool_name: &str, params: ToolParams) -> ToolOutcome {
        info!(tool = %tool_name, params = %serde_json::Value::Object(params.clone()), "Tool call");
        let outcome = self.dispatch(tool_name, &params).await;

        if outcome.success {
            info!(tool = %tool_name, secs = outcome.execution_time, "Tool call succeeded");
        } else {
            warn!(
                tool = %tool_name,
                error = outcome.error.as_deref().unwrap_or_default(),
                "Tool call failed"
            );
        }

        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::ToolExecuted {
                tool_name: tool_name.to_string(),
                success: outcome.success,
                duration_ms: (outcome.execution_time * 1000.0) as u64,
                timestamp: Utc::now(),
            });
        }
        outcome
    }

    async fn dispatch(&self, tool_name: &str, params: &ToolParams) -> ToolOutcome {
        let Some(entry) = self.tools.get(tool_name) else {
            return ToolOutcome::failed(tool_name, ToolError::NotFound(tool_name.into()), 0.0);
        };

        if !entry.enabled.load(Ordering::Relaxed) {
            return ToolOutcome::failed(tool_name, ToolError::Disabled(tool_name.into()), 0.0);
        }

        let permit = match entry.metadata.rate_limit {
            Some(limit) => match self.limiter.try_acquire(tool_name, limit) {
                Some(permit) => Some(permit),
                None => {
                    let err = ToolError::RateLimited {
                        tool_name: tool_name.into(),
                        limit,
                    };
                    return ToolOutcome::failed(tool_name, err, 0.0);
                }
            },
            None => None,
        };

        if let Some(missing) = entry.metadata.parameters.first_missing(params) {
            return ToolOutcome::failed(tool_name, ToolError::MissingParameter(missing.into()), 0.0);
        }

        debug!(tool = %tool_name, "Invoking tool");
        let started = Instant::now();
        let result = AssertUnwindSafe(entry.tool.execute(params)).catch_unwind().await;
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(Ok(value)) => {
                if let Some(permit) = permit {
                    permit.commit();
                }
                self.record_success(tool_name);
                ToolOutcome::ok(tool_name, value, elapsed)
            }
            Ok(Err(e)) => ToolOutcome::failed(tool_name, e, elapsed),
            Err(panic) => {
                let msg = panic_message(&panic);
                error!(tool = %tool_name, panic = %msg, "Tool panicked during execution");
                ToolOutcome::failed(tool_name, ToolError::failed(tool_name, "tool crashed"), elapsed)
            }
        }
    }

    /// Execute a plan's tools sequentially, in plan order.
    ///
    /// Each tool's failure is isolated; the rest still run.
    pub async fn execute_plan(&self, plan: &Plan) -> PlanResults {
        let mut results = PlanResults::default();
        for tool_name in &plan.tools {
            let outcome = self.execute(tool_name, plan.params_for(tool_name)).await;
            results.insert(outcome);
        }
        results
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    panic
        .downcast_ref::<String>()
        .map(|s| s.as_str())
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic")
        .to_string()
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
