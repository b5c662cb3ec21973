//! # Assessment Service
//!
//! [`AssessmentService`] admits evidence, resolves dependencies between
//! evidences, evaluates them with a [`PolicyEvaluator`] and fans the results
//! out to hooks and streams.
//!
//! ## Admission
//!
//! 1. Validate the evidence. A rejected evidence leaves no trace in the
//!    store or the registry.
//! 2. Collect its related resource ids, deduplicated, without its own
//!    resource id. If there are any, register the evidence as waiting; a
//!    second evidence with the same id is rejected while the first waits.
//! 3. Store the evidence under its resource id and announce that resource
//!    id to every other waiting request. Availability is announced at
//!    admission, so two evidences that depend on each other both become
//!    ready once the later one is admitted.
//! 4. If every related resource is already stored, assess immediately and
//!    answer `Assessed`. Otherwise spawn a task that drains the request's
//!    notifications, assesses once nothing is outstanding, and removes the
//!    registration; answer `WaitingForRelated`.
//!
//! ## Assessment
//!
//! The evidence is evaluated with its related resources as context. An
//! evaluation error drops the whole result set. On success the evidence is
//! forwarded to the evidence stream (if any), and each result is handed to
//! every hook and then to the results stream (if any). Stream failures are
//! reported to hooks but do not change the evidence's status.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;
use vigil_core::{
    AssessEvidenceResponse, AssessmentResult, Evidence, MetricChangeEvent, MetricConfiguration,
    Resource, ResultConfiguration,
};
use vigil_policy::{
    CachingConfigurationSource, ConfigurationOverrides, ConfigurationSource, PolicyCatalog,
    PolicyError, PolicyEvaluator, PolicyResult, RuleCatalog,
};

use crate::config::{AssessmentConfig, DEFAULT_STREAM_BUFFER};
use crate::error::AssessmentError;
use crate::hooks::{HookRegistry, ResultHook};
use crate::sink::{LazyStream, StreamConnector};
use crate::store::{AdmittedEvidence, EvidenceStore};
use crate::waiting::{Pending, WaitingRegistry, WaitingRequest};

/// Name of the results stream in logs.
pub const RESULTS_STREAM: &str = "assessment-results";

/// Name of the evidence stream in logs.
pub const EVIDENCE_STREAM: &str = "evidence-store";

struct Inner {
    evaluator: PolicyEvaluator,
    configurations: Arc<dyn ConfigurationSource>,
    configuration_cache: Option<Arc<CachingConfigurationSource>>,
    overrides: Option<Arc<ConfigurationOverrides>>,
    evidences: EvidenceStore,
    registry: WaitingRegistry,
    pending: Pending,
    hooks: HookRegistry,
    results_stream: Option<LazyStream<AssessmentResult>>,
    evidence_stream: Option<LazyStream<Evidence>>,
    stream_buffer: usize,
}

/// Continuous assessment of tool-submitted evidence.
///
/// Cheaply cloneable via `Arc`; all clones share caches, store and
/// registry. Separate instances share nothing.
#[derive(Clone)]
pub struct AssessmentService {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for AssessmentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssessmentService")
            .field("evidences", &self.inner.evidences.len())
            .field("waiting", &self.inner.registry.len())
            .field("hooks", &self.inner.hooks.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles an [`AssessmentService`].
pub struct AssessmentServiceBuilder {
    catalog: Arc<dyn PolicyCatalog>,
    configurations: Arc<dyn ConfigurationSource>,
    configuration_cache: Option<Arc<CachingConfigurationSource>>,
    overrides: Option<Arc<ConfigurationOverrides>>,
    results: Option<Arc<dyn StreamConnector<AssessmentResult>>>,
    evidence: Option<Arc<dyn StreamConnector<Evidence>>>,
    stream_buffer: usize,
}

impl AssessmentServiceBuilder {
    /// Start from a catalog and a configuration source.
    pub fn new(
        catalog: Arc<dyn PolicyCatalog>,
        configurations: Arc<dyn ConfigurationSource>,
    ) -> Self {
        Self {
            catalog,
            configurations,
            configuration_cache: None,
            overrides: None,
            results: None,
            evidence: None,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }

    /// Load the rule catalog named by `config` and layer runtime overrides
    /// and a configuration cache on top of its defaults.
    pub fn from_config(config: &AssessmentConfig) -> Result<Self, PolicyError> {
        let catalog = Arc::new(RuleCatalog::from_dir(&config.policy_dir)?);
        let overrides = Arc::new(ConfigurationOverrides::new(catalog.clone()));
        let cache = Arc::new(CachingConfigurationSource::new(
            overrides.clone(),
            config.config_ttl,
        ));
        let mut builder = Self::new(catalog, cache.clone()).stream_buffer(config.stream_buffer);
        builder.configuration_cache = Some(cache);
        builder.overrides = Some(overrides);
        Ok(builder)
    }

    /// Send every result to this stream.
    pub fn results_stream(mut self, connector: Arc<dyn StreamConnector<AssessmentResult>>) -> Self {
        self.results = Some(connector);
        self
    }

    /// Forward every successfully evaluated evidence to this stream.
    pub fn evidence_stream(mut self, connector: Arc<dyn StreamConnector<Evidence>>) -> Self {
        self.evidence = Some(connector);
        self
    }

    /// Capacity of response streams returned by
    /// [`AssessmentService::assess_evidences`].
    pub fn stream_buffer(mut self, capacity: usize) -> Self {
        self.stream_buffer = capacity.max(1);
        self
    }

    /// Build the service.
    pub fn build(self) -> AssessmentService {
        AssessmentService {
            inner: Arc::new(Inner {
                evaluator: PolicyEvaluator::new(self.catalog),
                configurations: self.configurations,
                configuration_cache: self.configuration_cache,
                overrides: self.overrides,
                evidences: EvidenceStore::new(),
                registry: WaitingRegistry::new(),
                pending: Pending::default(),
                hooks: HookRegistry::new(),
                results_stream: self
                    .results
                    .map(|c| LazyStream::new(RESULTS_STREAM, c)),
                evidence_stream: self
                    .evidence
                    .map(|c| LazyStream::new(EVIDENCE_STREAM, c)),
                stream_buffer: self.stream_buffer,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

impl AssessmentService {
    /// A service without streams.
    pub fn new(
        catalog: Arc<dyn PolicyCatalog>,
        configurations: Arc<dyn ConfigurationSource>,
    ) -> Self {
        Self::builder(catalog, configurations).build()
    }

    /// Start assembling a service.
    pub fn builder(
        catalog: Arc<dyn PolicyCatalog>,
        configurations: Arc<dyn ConfigurationSource>,
    ) -> AssessmentServiceBuilder {
        AssessmentServiceBuilder::new(catalog, configurations)
    }

    /// Add a result hook.
    pub fn register_result_hook(&self, hook: Arc<dyn ResultHook>) {
        self.inner.hooks.register(hook);
    }

    /// Assess one evidence.
    pub async fn assess_evidence(&self, evidence: Evidence) -> AssessEvidenceResponse {
        match self.admit(evidence).await {
            Ok(response) => response,
            Err(e) => {
                self.report(&e);
                e.into_response()
            }
        }
    }

    /// Assess a stream of evidences, answering each in arrival order.
    ///
    /// Must be called within a Tokio runtime. The response stream ends when
    /// the evidence stream ends or the response receiver is dropped.
    pub fn assess_evidences(
        &self,
        mut evidences: mpsc::Receiver<Evidence>,
    ) -> mpsc::Receiver<AssessEvidenceResponse> {
        let (tx, rx) = mpsc::channel(self.inner.stream_buffer);
        let service = self.clone();
        tokio::spawn(async move {
            while let Some(evidence) = evidences.recv().await {
                let response = service.assess_evidence(evidence).await;
                if tx.send(response).await.is_err() {
                    tracing::debug!("response stream closed by receiver");
                    break;
                }
            }
        });
        rx
    }

    /// Wait until every waiting request has been assessed or dropped.
    pub async fn wait_idle(&self) {
        self.inner.pending.wait_idle().await;
    }

    /// Number of evidences waiting for related resources.
    pub fn waiting_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Ids of the evidences waiting for related resources.
    pub fn waiting_evidence_ids(&self) -> Vec<String> {
        self.inner.registry.evidence_ids()
    }

    /// Drop cached state derived from a changed metric.
    pub fn handle_metric_event(&self, event: &MetricChangeEvent) -> usize {
        if let Some(cache) = &self.inner.configuration_cache {
            cache.invalidate_metric(&event.metric_id);
        }
        self.inner.evaluator.handle_metric_event(event)
    }

    /// Override a metric's configuration for one certification target.
    ///
    /// Returns `false` if the service was built without an override layer.
    pub fn set_metric_configuration(&self, config: MetricConfiguration) -> bool {
        let Some(overrides) = &self.inner.overrides else {
            return false;
        };
        let (target_id, metric_id) = (config.target_id.clone(), config.metric_id.clone());
        overrides.set(config);
        if let Some(cache) = &self.inner.configuration_cache {
            cache.invalidate(&target_id, &metric_id);
        }
        true
    }

    /// The policy evaluator and its caches.
    pub fn evaluator(&self) -> &PolicyEvaluator {
        &self.inner.evaluator
    }

    async fn admit(&self, evidence: Evidence) -> Result<AssessEvidenceResponse, AssessmentError> {
        evidence.validate()?;
        let resource = evidence.resource()?;
        let related = related_ids(&evidence, &resource.id);
        let evidence_id = evidence.id.clone();
        let admitted = Arc::new(AdmittedEvidence { evidence, resource });

        let rx = if related.is_empty() {
            None
        } else {
            Some(
                self.inner
                    .registry
                    .register(&evidence_id, &admitted.resource.id)?,
            )
        };

        self.inner.evidences.insert(Arc::clone(&admitted));
        let informed = self.inner.registry.inform(&admitted.resource.id);
        tracing::debug!(
            evidence_id = %evidence_id,
            resource_id = %admitted.resource.id,
            informed,
            "announced resource to waiting requests"
        );

        if let Some(rx) = rx {
            let missing = self.inner.evidences.missing(&related);
            if !missing.is_empty() {
                tracing::info!(
                    evidence_id = %evidence_id,
                    missing = missing.len(),
                    "evidence waiting for related resources"
                );
                self.inner.pending.start();
                let request = WaitingRequest::new(admitted, missing, rx);
                let service = self.clone();
                tokio::spawn(async move { service.run_waiting(request).await });
                return Ok(AssessEvidenceResponse::waiting());
            }
            self.inner.registry.remove(&evidence_id);
        }

        self.assess(&admitted, &related).await?;
        Ok(AssessEvidenceResponse::assessed())
    }

    async fn run_waiting(self, mut request: WaitingRequest<Arc<AdmittedEvidence>>) {
        let evidence_id = request.payload.evidence.id.clone();
        if request.wait_ready().await {
            tracing::info!(
                evidence_id = %evidence_id,
                waited_ms = u64::try_from(request.waited().as_millis()).unwrap_or(u64::MAX),
                "related resources arrived; assessing"
            );
            let admitted = Arc::clone(&request.payload);
            let related = related_ids(&admitted.evidence, &admitted.resource.id);
            if let Err(e) = self.assess(&admitted, &related).await {
                self.report(&e);
            }
            self.inner.registry.remove(&evidence_id);
        } else {
            tracing::debug!(evidence_id = %evidence_id, "waiting request closed");
        }
        self.inner.pending.finish();
    }

    async fn assess(
        &self,
        admitted: &AdmittedEvidence,
        related_ids: &[String],
    ) -> Result<(), AssessmentError> {
        let related = self.related_resources(&admitted.evidence.id, related_ids);
        let results = self.inner.evaluator.evaluate(
            &admitted.evidence,
            &admitted.resource,
            &related,
            self.inner.configurations.as_ref(),
        )?;
        tracing::info!(
            evidence_id = %admitted.evidence.id,
            resource_id = %admitted.resource.id,
            results = results.len(),
            "evidence assessed"
        );

        if let Some(stream) = &self.inner.evidence_stream {
            if let Err(e) = stream.send(admitted.evidence.clone()).await {
                self.report(&AssessmentError::Connectivity(e));
            }
        }

        for result in results {
            let record = to_record(admitted, result);
            self.inner.hooks.inform(Some(&record), None);
            if let Some(stream) = &self.inner.results_stream {
                if let Err(e) = stream.send(record).await {
                    self.report(&AssessmentError::Connectivity(e));
                }
            }
        }
        Ok(())
    }

    fn related_resources(&self, evidence_id: &str, related_ids: &[String]) -> Vec<Resource> {
        related_ids
            .iter()
            .filter_map(|id| match self.inner.evidences.get(id) {
                Some(admitted) => Some(admitted.resource.clone()),
                None => {
                    tracing::error!(
                        evidence_id = %evidence_id,
                        related_resource_id = %id,
                        "related evidence not found; omitting it from the assessment"
                    );
                    None
                }
            })
            .collect()
    }

    fn report(&self, error: &AssessmentError) {
        tracing::warn!(error = %error, "assessment failure");
        self.inner.hooks.inform(None, Some(error));
    }
}

/// Related resource ids in submission order, without duplicates and
/// without the evidence's own resource.
fn related_ids(evidence: &Evidence, own_resource_id: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    evidence
        .related_resource_ids
        .iter()
        .filter(|id| id.as_str() != own_resource_id && seen.insert(id.as_str()))
        .cloned()
        .collect()
}

fn to_record(admitted: &AdmittedEvidence, result: PolicyResult) -> AssessmentResult {
    let non_compliance_comments = if result.compliant {
        String::new()
    } else {
        result
            .message
            .unwrap_or_else(|| format!("{} is not satisfied", result.metric_id))
    };
    AssessmentResult {
        id: Uuid::new_v4(),
        timestamp: Utc::now(),
        metric_id: result.metric_id,
        metric_configuration: ResultConfiguration {
            operator: result.operator,
            target_value: result.target_value,
        },
        applicable: result.applicable,
        compliant: result.compliant,
        evidence_id: admitted.evidence.id.clone(),
        resource_id: admitted.resource.id.clone(),
        resource_types: admitted.resource.types.clone(),
        certification_target_id: admitted.evidence.certification_target_id.clone(),
        tool_id: admitted.evidence.tool_id.clone(),
        non_compliance_comments,
    }
}
