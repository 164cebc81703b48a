//! Request pipeline: recognize, build, validate, execute.
//!
//! `Context` holds the shared collaborators and is built once per process.
//! A `Pipeline` is cheap to share between threads; requests only meet in the
//! cache.

use crate::aliases::{AliasLookup, AliasResolver};
use crate::audit_log::AuditLog;
use crate::cache::Cache;
use crate::command::{Command, CommandBuilder};
use crate::config::NixieConfig;
use crate::executor::backend::{self, ProcessBackend};
use crate::executor::{Confirmer, ExecutionMode, ExecutionResult, ExecutionStatus, SafeExecutor};
use crate::intent::{entity, Intent, IntentKind};
use crate::knowledge;
use crate::recognizer::IntentRecognizer;
use crate::security::{RiskLevel, SecurityValidator, ValidationResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Shared collaborators. No process-wide singletons.
#[derive(Clone)]
pub struct Context {
    pub config: NixieConfig,
    pub cache: Arc<Cache>,
    pub backend: Arc<dyn ProcessBackend>,
    pub audit: Option<Arc<AuditLog>>,
}

impl Context {
    /// Everything from config: cache tiers, probed backend, audit log.
    pub fn from_config(config: NixieConfig) -> Self {
        let cache = Arc::new(Cache::from_settings(&config.cache));
        let backend = backend::select_backend(&config.backend);
        let audit = config.audit.log_path().map(|path| Arc::new(AuditLog::new(path)));
        tracing::debug!(
            backend = backend.name(),
            persistent_cache = cache.is_persistent(),
            audit = audit.is_some(),
            "context ready"
        );
        Self {
            config,
            cache,
            backend,
            audit,
        }
    }

    /// Explicit collaborators, used by tests and embedders.
    pub fn new(config: NixieConfig, cache: Arc<Cache>, backend: Arc<dyn ProcessBackend>) -> Self {
        Self {
            config,
            cache,
            backend,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }
}

/// How a request ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Not understood well enough to act
    Clarify { message: String },
    /// Informational request answered from built-in knowledge
    Answer { text: String },
    Rejected {
        reason: String,
        risk: RiskLevel,
        suggestion: Option<String>,
    },
    /// The program is not installed on this host
    Unavailable { program: String },
    Declined { command: String },
    Completed { result: ExecutionResult },
}

impl Outcome {
    /// Cannot-proceed outcomes a caller should surface as failures.
    pub fn is_refusal(&self) -> bool {
        matches!(self, Outcome::Rejected { .. } | Outcome::Unavailable { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Clarify { .. } => "clarify",
            Outcome::Answer { .. } => "answer",
            Outcome::Rejected { .. } => "rejected",
            Outcome::Unavailable { .. } => "unavailable",
            Outcome::Declined { .. } => "declined",
            Outcome::Completed { .. } => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub request_id: String,
    pub mode: ExecutionMode,
    pub intent: Intent,
    pub command: Option<Command>,
    pub validation: Option<ValidationResult>,
    pub outcome: Outcome,
}

const CLARIFY_MESSAGE: &str =
    "I didn't understand that. Try something like 'install firefox', 'rollback' or 'help'.";

pub struct Pipeline {
    ctx: Context,
    recognizer: IntentRecognizer,
    builder: CommandBuilder,
    validator: SecurityValidator,
    executor: SafeExecutor,
    min_confidence: f32,
}

impl Pipeline {
    pub fn new(ctx: Context) -> Self {
        let recognizer = IntentRecognizer::with_aliases(Self::aliases(&ctx));
        let mut validator = SecurityValidator::new();
        let mut executor = SafeExecutor::new(ctx.backend.clone(), ctx.config.executor.clone());
        if let Some(audit) = &ctx.audit {
            validator = validator.with_audit(audit.clone());
            executor = executor.with_audit(audit.clone());
        }
        let min_confidence = ctx.config.recognizer.effective_min_confidence();
        Self {
            ctx,
            recognizer,
            builder: CommandBuilder::new(),
            validator,
            executor,
            min_confidence,
        }
    }

    /// Resolve package phrases the alias table misses through `lookup`.
    pub fn with_alias_lookup(mut self, lookup: Box<dyn AliasLookup>) -> Self {
        self.recognizer = IntentRecognizer::with_aliases(Self::aliases(&self.ctx).with_lookup(lookup));
        self
    }

    pub fn with_confirmer(mut self, confirmer: Arc<dyn Confirmer>) -> Self {
        self.executor = self.executor.with_confirmer(confirmer);
        self
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn default_mode(&self) -> ExecutionMode {
        self.ctx.config.executor.default_mode
    }

    fn aliases(ctx: &Context) -> AliasResolver {
        AliasResolver::new().with_cache(
            ctx.cache.clone(),
            Duration::from_secs(ctx.config.cache.alias_ttl_secs),
        )
    }

    /// Handle one request end to end.
    pub fn process(&self, text: &str, mode: ExecutionMode) -> PipelineReport {
        let request_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("request", id = %request_id, mode = %mode);
        let _enter = span.enter();

        let intent = self.recognizer.recognize(text);
        let mut report = PipelineReport {
            request_id: request_id.clone(),
            mode,
            intent,
            command: None,
            validation: None,
            outcome: Outcome::Clarify {
                message: CLARIFY_MESSAGE.to_string(),
            },
        };

        let text_check = self.validator.validate_text(text);
        if !text_check.valid {
            self.validator.record(&request_id, text, None, &text_check);
            report.outcome = rejected(&text_check);
            report.validation = Some(text_check);
            return report;
        }

        if report.intent.is_unknown() || report.intent.confidence < self.min_confidence {
            tracing::info!(
                kind = %report.intent.kind,
                confidence = report.intent.confidence,
                "request needs clarification"
            );
            return report;
        }

        if report.intent.kind.is_informational() {
            if let Some(text) = knowledge::answer(&report.intent) {
                report.validation = Some(text_check);
                report.outcome = Outcome::Answer { text };
            }
            return report;
        }

        let Some(command) = self.builder.build(&report.intent) else {
            tracing::info!(kind = %report.intent.kind, "no command for intent");
            return report;
        };
        let command = self.executor.prepare(command, mode);
        report.command = Some(command.clone());

        let validated = match self.validator.approve(&request_id, text, command) {
            Ok(validated) => validated,
            Err(result) => {
                report.outcome = rejected(&result);
                report.validation = Some(result);
                return report;
            }
        };
        report.validation = Some(validated.validation().clone());

        let search_key = self.search_cache_key(&report.intent, mode);
        if let Some(key) = &search_key {
            if let Some(mut cached) = self.ctx.cache.get::<ExecutionResult>(key) {
                tracing::debug!(key = %key, "search served from cache");
                cached.from_cache = true;
                self.executor.record_cached(&request_id, &validated, &cached);
                report.outcome = Outcome::Completed { result: cached };
                return report;
            }
        }

        let result = self.executor.run(&request_id, &validated, mode);
        report.outcome = match result.status {
            ExecutionStatus::NotFound => Outcome::Unavailable {
                program: validated.command().program.clone(),
            },
            ExecutionStatus::Declined => Outcome::Declined {
                command: result.command_text,
            },
            _ => {
                if let (Some(key), true) = (&search_key, result.success) {
                    let ttl = Duration::from_secs(self.ctx.config.cache.search_ttl_secs);
                    self.ctx.cache.set(key, &result, Some(ttl));
                }
                Outcome::Completed { result }
            }
        };
        report
    }

    /// Only real search runs are worth caching.
    fn search_cache_key(&self, intent: &Intent, mode: ExecutionMode) -> Option<String> {
        if intent.kind != IntentKind::Search || mode != ExecutionMode::Execute {
            return None;
        }
        intent.entity(entity::QUERY).map(|q| format!("search:{}", q))
    }
}

fn rejected(result: &ValidationResult) -> Outcome {
    Outcome::Rejected {
        reason: result.reason.clone().unwrap_or_else(|| "rejected".to_string()),
        risk: result.risk,
        suggestion: result.suggestion().map(str::to_string),
    }
}
