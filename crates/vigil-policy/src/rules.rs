//! # Declarative Rule Catalog
//!
//! A [`RuleCatalog`] is a [`PolicyCatalog`] built from YAML rule bundles,
//! one per metric:
//!
//! ```yaml
//! id: BootLoggingEnabled
//! name: Boot Logging Enabled
//! description: Boot logs are collected for the virtual machine.
//! category: Logging
//! applicableTypes: [VirtualMachine]
//! property: bootLogging.enabled
//! defaultConfiguration:
//!   operator: "=="
//!   targetValue: true
//! ```
//!
//! A bundle applies to a resource whose type tags include any of
//! `applicableTypes`. The resource complies when the value at the dotted
//! `property` path satisfies the configured operator against the target
//! value; a missing property never complies.
//!
//! The catalog also serves each bundle's `defaultConfiguration` as a
//! [`ConfigurationSource`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use vigil_core::{Metric, MetricConfiguration};

use crate::catalog::{PolicyCatalog, PreparedQuery};
use crate::error::PolicyError;
use crate::operators::Operator;
use crate::source::ConfigurationSource;

/// Default operator and target value declared by a bundle.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultConfiguration {
    /// Comparison operator.
    pub operator: String,
    /// Target value.
    pub target_value: Value,
}

/// One metric definition.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleBundle {
    /// Metric id.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// What the metric checks.
    #[serde(default)]
    pub description: String,
    /// Grouping category.
    #[serde(default)]
    pub category: String,
    /// Type tags the metric applies to.
    pub applicable_types: Vec<String>,
    /// Dotted path of the checked property.
    pub property: String,
    /// Catalog default configuration.
    #[serde(default)]
    pub default_configuration: Option<DefaultConfiguration>,
}

impl RuleBundle {
    /// Parse a bundle from YAML text.
    pub fn from_yaml(source: &str, text: &str) -> Result<Self, PolicyError> {
        let bundle: Self = serde_yaml::from_str(text).map_err(|e| PolicyError::Bundle {
            path: source.to_string(),
            reason: e.to_string(),
        })?;
        if bundle.id.is_empty() || bundle.property.is_empty() {
            return Err(PolicyError::Bundle {
                path: source.to_string(),
                reason: "id and property must not be empty".to_string(),
            });
        }
        Ok(bundle)
    }

    fn metric(&self) -> Metric {
        Metric {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            category: self.category.clone(),
        }
    }
}

/// Metric definitions loaded from rule bundles, ordered by metric id.
#[derive(Debug, Clone, Default)]
pub struct RuleCatalog {
    bundles: BTreeMap<String, RuleBundle>,
}

impl RuleCatalog {
    /// Build a catalog, rejecting duplicate metric ids.
    pub fn new(bundles: impl IntoIterator<Item = RuleBundle>) -> Result<Self, PolicyError> {
        let mut map = BTreeMap::new();
        for bundle in bundles {
            if map.contains_key(&bundle.id) {
                return Err(PolicyError::DuplicateMetric {
                    metric_id: bundle.id,
                });
            }
            map.insert(bundle.id.clone(), bundle);
        }
        Ok(Self { bundles: map })
    }

    /// Load every `*.yaml` / `*.yml` bundle in a directory.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            let is_yaml = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml" | "yml")
            );
            if path.is_file() && is_yaml {
                paths.push(path);
            }
        }
        paths.sort();

        let mut bundles = Vec::with_capacity(paths.len());
        for path in &paths {
            let text = std::fs::read_to_string(path)?;
            bundles.push(RuleBundle::from_yaml(&path.display().to_string(), &text)?);
        }
        let catalog = Self::new(bundles)?;
        tracing::info!(
            dir = %dir.as_ref().display(),
            metrics = catalog.len(),
            "loaded rule catalog"
        );
        Ok(catalog)
    }

    /// The bundle of a metric.
    pub fn get(&self, metric_id: &str) -> Option<&RuleBundle> {
        self.bundles.get(metric_id)
    }

    /// Number of metrics.
    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    fn bundle(&self, metric_id: &str) -> Result<&RuleBundle, PolicyError> {
        self.bundles
            .get(metric_id)
            .ok_or_else(|| PolicyError::MetricNotFound {
                metric_id: metric_id.to_string(),
            })
    }
}

impl PolicyCatalog for RuleCatalog {
    fn metrics(&self) -> Vec<Metric> {
        self.bundles.values().map(RuleBundle::metric).collect()
    }

    fn prepare(
        &self,
        metric_id: &str,
        config: &MetricConfiguration,
    ) -> Result<Arc<dyn PreparedQuery>, PolicyError> {
        let bundle = self.bundle(metric_id)?;
        let operator = config
            .operator
            .parse::<Operator>()
            .map_err(|e| PolicyError::Prepare {
                metric_id: metric_id.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Arc::new(RuleQuery {
            applicable_types: bundle.applicable_types.clone(),
            property: bundle.property.clone(),
            path: bundle.property.split('.').map(str::to_string).collect(),
            operator,
            target_value: config.target_value.clone(),
        }))
    }
}

impl ConfigurationSource for RuleCatalog {
    fn metric_configuration(
        &self,
        _target_id: &str,
        metric_id: &str,
    ) -> Result<MetricConfiguration, PolicyError> {
        let bundle = self.bundle(metric_id)?;
        let default = bundle
            .default_configuration
            .as_ref()
            .ok_or_else(|| PolicyError::ConfigurationNotFound {
                metric_id: metric_id.to_string(),
                target_id: String::new(),
            })?;
        let mut config =
            MetricConfiguration::new(metric_id, &default.operator, default.target_value.clone());
        config.is_default = true;
        Ok(config)
    }
}

/// A bundle bound to one configuration.
#[derive(Debug)]
struct RuleQuery {
    applicable_types: Vec<String>,
    property: String,
    path: Vec<String>,
    operator: Operator,
    target_value: Value,
}

impl RuleQuery {
    fn applicable(&self, input: &Value) -> bool {
        input
            .get("type")
            .and_then(Value::as_array)
            .map(|types| {
                types
                    .iter()
                    .filter_map(Value::as_str)
                    .any(|t| self.applicable_types.iter().any(|a| a == t))
            })
            .unwrap_or(false)
    }

    fn lookup<'a>(&self, input: &'a Value) -> Option<&'a Value> {
        self.path
            .iter()
            .try_fold(input, |value, segment| value.get(segment.as_str()))
    }
}

impl PreparedQuery for RuleQuery {
    fn eval(&self, input: &Value) -> Result<Vec<Value>, PolicyError> {
        let applicable = self.applicable(input);
        let actual = self.lookup(input);
        let compliant = applicable
            && actual.map_or(false, |a| self.operator.compare(a, &self.target_value));
        let message = match (applicable && !compliant, actual) {
            (false, _) => Value::Null,
            (true, Some(a)) => Value::String(format!(
                "{} is {a}, expected {} {}",
                self.property, self.operator, self.target_value
            )),
            (true, None) => Value::String(format!("{} is not set", self.property)),
        };
        Ok(vec![json!({
            "applicable": applicable,
            "compliant": compliant,
            "operator": self.operator.as_str(),
            "target_value": self.target_value,
            "message": message,
        })])
    }
}
