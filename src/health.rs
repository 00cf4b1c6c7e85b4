//! System health report.
//!
//! Three components are probed: the configured embedding and language model
//! providers, the `OPENAI_API_KEY` credential (only when a configured
//! provider needs it) and the vector index.
//!
//! The overall status rolls these up into two capabilities. The model side
//! is usable when neither provider is `disabled` and the credential is not
//! missing; the index side is usable when a collection is loaded. The
//! status is `healthy` when both are usable and `degraded` when exactly one
//! is. When neither is, the status is `unhealthy`: nothing can be answered
//! and no index can be built. This third state goes beyond a plain
//! healthy/degraded report, and it is the only one for which the `health`
//! command exits non-zero.
//!
//! Probing never fails; problems are reported inside the payload.

use serde::Serialize;

use crate::config::Config;
use crate::index::{self, VectorIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Configured,
    Missing,
    NotRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    Configured,
    Disabled,
}

impl ProviderStatus {
    fn of(provider: &str) -> Self {
        if provider == "disabled" {
            ProviderStatus::Disabled
        } else {
            ProviderStatus::Configured
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelStatus {
    pub embedding: ProviderStatus,
    pub llm: ProviderStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VectorStoreStatus {
    Loaded { collection: String, chunks: u64 },
    NotLoaded,
    Error { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Components {
    pub models: ModelStatus,
    pub credentials: CredentialStatus,
    pub vector_store: VectorStoreStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub status: OverallStatus,
    pub components: Components,
}

impl HealthStatus {
    fn from_components(components: Components) -> Self {
        let models_ok = components.models.embedding == ProviderStatus::Configured
            && components.models.llm == ProviderStatus::Configured
            && components.credentials != CredentialStatus::Missing;
        let index_ok = matches!(components.vector_store, VectorStoreStatus::Loaded { .. });

        let status = match (models_ok, index_ok) {
            (true, true) => OverallStatus::Healthy,
            (false, false) => OverallStatus::Unhealthy,
            _ => OverallStatus::Degraded,
        };

        Self { status, components }
    }
}

fn model_status(config: &Config) -> ModelStatus {
    ModelStatus {
        embedding: ProviderStatus::of(&config.embedding.provider),
        llm: ProviderStatus::of(&config.llm.provider),
    }
}

fn credential_status(config: &Config) -> CredentialStatus {
    if !config.requires_openai_key() {
        return CredentialStatus::NotRequired;
    }
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => CredentialStatus::Configured,
        _ => CredentialStatus::Missing,
    }
}

async fn index_status(index: Option<&VectorIndex>) -> VectorStoreStatus {
    let Some(index) = index else {
        return VectorStoreStatus::NotLoaded;
    };
    match index.count().await {
        Ok(chunks) => VectorStoreStatus::Loaded {
            collection: index.collection_id().to_string(),
            chunks,
        },
        Err(e) => VectorStoreStatus::Error {
            error: e.to_string(),
        },
    }
}

/// Report health for an index the caller already holds (or `None`).
pub async fn check_health(config: &Config, index: Option<&VectorIndex>) -> HealthStatus {
    HealthStatus::from_components(Components {
        models: model_status(config),
        credentials: credential_status(config),
        vector_store: index_status(index).await,
    })
}

/// Report health for whatever index is currently persisted, without
/// building one.
pub async fn check_persisted_health(config: &Config) -> HealthStatus {
    let vector_store = match index::open_persisted(&config.index.persist_path).await {
        Ok(index) => index_status(index.as_ref()).await,
        Err(e) => VectorStoreStatus::Error {
            error: e.to_string(),
        },
    };

    HealthStatus::from_components(Components {
        models: model_status(config),
        credentials: credential_status(config),
        vector_store,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENABLED: ModelStatus = ModelStatus {
        embedding: ProviderStatus::Configured,
        llm: ProviderStatus::Configured,
    };

    fn loaded() -> VectorStoreStatus {
        VectorStoreStatus::Loaded {
            collection: "policy_documents_v1".to_string(),
            chunks: 12,
        }
    }

    fn status(
        models: ModelStatus,
        credentials: CredentialStatus,
        vector_store: VectorStoreStatus,
    ) -> OverallStatus {
        HealthStatus::from_components(Components {
            models,
            credentials,
            vector_store,
        })
        .status
    }

    #[test]
    fn test_status_matrix() {
        let cases = [
            (CredentialStatus::Configured, loaded(), OverallStatus::Healthy),
            (CredentialStatus::NotRequired, loaded(), OverallStatus::Healthy),
            (CredentialStatus::Missing, loaded(), OverallStatus::Degraded),
            (CredentialStatus::Configured, VectorStoreStatus::NotLoaded, OverallStatus::Degraded),
            (
                CredentialStatus::Configured,
                VectorStoreStatus::Error { error: "boom".to_string() },
                OverallStatus::Degraded,
            ),
            (CredentialStatus::Missing, VectorStoreStatus::NotLoaded, OverallStatus::Unhealthy),
        ];

        for (credentials, vector_store, want) in cases {
            assert_eq!(status(ENABLED, credentials, vector_store), want);
        }
    }

    #[test]
    fn test_disabled_provider_degrades() {
        let llm_off = ModelStatus {
            embedding: ProviderStatus::Configured,
            llm: ProviderStatus::Disabled,
        };
        let embedding_off = ModelStatus {
            embedding: ProviderStatus::Disabled,
            llm: ProviderStatus::Configured,
        };

        assert_eq!(
            status(llm_off, CredentialStatus::NotRequired, loaded()),
            OverallStatus::Degraded
        );
        assert_eq!(
            status(embedding_off, CredentialStatus::Configured, loaded()),
            OverallStatus::Degraded
        );
        assert_eq!(
            status(llm_off, CredentialStatus::NotRequired, VectorStoreStatus::NotLoaded),
            OverallStatus::Unhealthy
        );
    }

    #[test]
    fn test_json_shape() {
        let health = HealthStatus::from_components(Components {
            models: ModelStatus {
                embedding: ProviderStatus::Configured,
                llm: ProviderStatus::Disabled,
            },
            credentials: CredentialStatus::NotRequired,
            vector_store: loaded(),
        });
        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["components"]["models"]["embedding"], "configured");
        assert_eq!(json["components"]["models"]["llm"], "disabled");
        assert_eq!(json["components"]["credentials"], "not_required");
        assert_eq!(json["components"]["vector_store"]["status"], "loaded");
        assert_eq!(json["components"]["vector_store"]["chunks"], 12);
    }

    #[tokio::test]
    async fn test_local_providers_without_index() {
        let mut config = Config::for_corpus("./policies", "./index_db");
        config.embedding.provider = "ollama".to_string();
        config.llm.provider = "ollama".to_string();

        let health = check_health(&config, None).await;
        assert_eq!(health.components.models, ENABLED);
        assert_eq!(health.components.credentials, CredentialStatus::NotRequired);
        assert_eq!(health.components.vector_store, VectorStoreStatus::NotLoaded);
        assert_eq!(health.status, OverallStatus::Degraded);
    }

    #[tokio::test]
    async fn test_disabled_providers_without_index() {
        let mut config = Config::for_corpus("./policies", "./index_db");
        config.embedding.provider = "disabled".to_string();
        config.llm.provider = "disabled".to_string();

        let health = check_health(&config, None).await;
        assert_eq!(health.components.models.embedding, ProviderStatus::Disabled);
        assert_eq!(health.components.models.llm, ProviderStatus::Disabled);
        assert_eq!(health.status, OverallStatus::Unhealthy);
    }
}
