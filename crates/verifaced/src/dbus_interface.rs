use std::sync::Arc;

use uuid::Uuid;
use zbus::interface;

use veriface_core::{Engine, EngineError, VerifyOutcome};

/// D-Bus interface for the Veriface daemon.
///
/// Bus name: dev.veriface.Engine1
/// Object path: /dev/veriface/Engine1
pub struct VerifaceService {
    engine: Arc<Engine>,
    degraded: bool,
}

impl VerifaceService {
    pub fn new(engine: Arc<Engine>, degraded: bool) -> Self {
        Self { engine, degraded }
    }
}

/// Map engine errors to D-Bus errors. Caller-fixable failures carry
/// their guidance text; store failures get a generic message plus an
/// incident id so internal paths never leak to clients.
fn to_dbus_error(err: EngineError) -> zbus::fdo::Error {
    if err.is_caller_fixable() {
        zbus::fdo::Error::InvalidArgs(err.to_string())
    } else {
        let incident = Uuid::new_v4();
        tracing::error!(%incident, error = %err, "internal failure");
        zbus::fdo::Error::Failed(format!(
            "internal storage failure (incident {incident}), see daemon logs"
        ))
    }
}

fn join_error(err: tokio::task::JoinError) -> zbus::fdo::Error {
    tracing::error!(error = %err, "worker task failed");
    zbus::fdo::Error::Failed("internal failure, see daemon logs".into())
}

#[interface(name = "dev.veriface.Engine1")]
impl VerifaceService {
    /// Enroll (or re-enroll) an identity from an uploaded photo.
    /// Returns a JSON object with `identity_key`, `was_update` and
    /// `source_ref`.
    async fn enroll(
        &self,
        identity_key: String,
        image: Vec<u8>,
        content_type: String,
    ) -> zbus::fdo::Result<String> {
        tracing::info!(identity_key, bytes = image.len(), "enroll requested");
        let engine = self.engine.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            engine.enroll(&identity_key, &image, &content_type)
        })
        .await
        .map_err(join_error)?
        .map_err(to_dbus_error)?;

        Ok(serde_json::json!({
            "identity_key": outcome.identity_key,
            "was_update": outcome.was_update,
            "source_ref": outcome.source_ref,
        })
        .to_string())
    }

    /// Verify an uploaded photo against every enrolled identity.
    /// Returns a JSON object: `{"verified": true, "identity_key": …,
    /// "similarity": …}` or `{"verified": false, "best_similarity": …}`.
    async fn verify(&self, image: Vec<u8>, content_type: String) -> zbus::fdo::Result<String> {
        tracing::info!(bytes = image.len(), "verify requested");
        let engine = self.engine.clone();
        let outcome =
            tokio::task::spawn_blocking(move || engine.verify(&image, &content_type))
                .await
                .map_err(join_error)?
                .map_err(to_dbus_error)?;

        let body = match outcome {
            VerifyOutcome::Verified {
                identity_key,
                similarity,
            } => serde_json::json!({
                "verified": true,
                "identity_key": identity_key,
                "similarity": similarity,
            }),
            VerifyOutcome::NoMatch { best_similarity } => serde_json::json!({
                "verified": false,
                "best_similarity": best_similarity,
            }),
        };
        Ok(body.to_string())
    }

    /// Delete an identity's embedding. Returns whether one existed.
    async fn remove(&self, identity_key: String) -> zbus::fdo::Result<bool> {
        tracing::info!(identity_key, "remove requested");
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || engine.remove(&identity_key))
            .await
            .map_err(join_error)?
            .map_err(to_dbus_error)
    }

    /// JSON array of enrolled identity summaries, insertion order.
    async fn list(&self) -> zbus::fdo::Result<String> {
        let engine = self.engine.clone();
        let records = tokio::task::spawn_blocking(move || engine.list())
            .await
            .map_err(join_error)?
            .map_err(to_dbus_error)?;

        serde_json::to_string(&records).map_err(|err| {
            tracing::error!(error = %err, "serializing listing");
            zbus::fdo::Error::Failed("internal failure, see daemon logs".into())
        })
    }

    /// Daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let engine = self.engine.clone();
        let enrolled = tokio::task::spawn_blocking(move || engine.list())
            .await
            .map_err(join_error)?
            .map(|r| r.len())
            .unwrap_or(0);
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "detector": if self.degraded { "geometric-only" } else { "learned+geometric" },
            "descriptor_dim": self.engine.descriptor_len(),
            "enrolled": enrolled,
        })
        .to_string())
    }
}
